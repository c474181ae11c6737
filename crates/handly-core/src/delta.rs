use std::fmt;
use std::path::PathBuf;

use bitflags::bitflags;

use crate::element::{Element, ElementKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeltaKind {
    Added,
    Removed,
    Changed,
}

impl DeltaKind {
    fn marker(self) -> char {
        match self {
            DeltaKind::Added => '+',
            DeltaKind::Removed => '-',
            DeltaKind::Changed => '*',
        }
    }
}

bitflags! {
    /// Details of an element change.
    ///
    /// The low 32 bits are defined here; models may use the high 32 bits for
    /// their own flags (see [`DeltaFlags::model_specific`]).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DeltaFlags: u64 {
        const CONTENT = 1 << 0;
        const CHILDREN = 1 << 1;
        const MOVED_FROM = 1 << 2;
        const MOVED_TO = 1 << 3;
        const REORDER = 1 << 4;
        const FINE_GRAINED = 1 << 5;
        const OPEN = 1 << 6;
        const DESCRIPTION = 1 << 7;
        const SYNC = 1 << 8;
        const MARKERS = 1 << 9;
        const WORKING_COPY = 1 << 10;
        const UNDERLYING_RESOURCE = 1 << 11;

        const _ = !0;
    }
}

impl DeltaFlags {
    /// The `bit`-th model-specific flag.
    pub const fn model_specific(bit: u32) -> Self {
        assert!(bit < 32, "model-specific delta flags use bits 0..32");
        Self::from_bits_retain(1 << (32 + bit))
    }
}

/// Renders as `CHILDREN | CONTENT`; model-specific bits as `MODEL_<n>`.
impl fmt::Display for DeltaFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        let mut sep = |f: &mut fmt::Formatter<'_>| -> fmt::Result {
            if !std::mem::take(&mut first) {
                f.write_str(" | ")?;
            }
            Ok(())
        };
        for (name, _) in self.iter_names() {
            sep(f)?;
            f.write_str(name)?;
        }
        let model_bits = self.bits() >> 32;
        for bit in 0..32 {
            if model_bits & (1 << bit) != 0 {
                sep(f)?;
                write!(f, "MODEL_{bit}")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceDeltaKind {
    Added,
    Removed,
    Changed,
}

/// A change to a non-element resource (a file the model does not represent
/// as an element, such as a build descriptor) attached to an element delta.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceDelta {
    pub path: PathBuf,
    pub kind: ResourceDeltaKind,
}

impl ResourceDelta {
    pub fn new(path: impl Into<PathBuf>, kind: ResourceDeltaKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// An immutable tree describing how a subtree of elements changed.
///
/// Produced by [`crate::ElementDeltaBuilder::build`]. Unchanged subtrees are
/// absent; a delta with no children, no flags and no resource deltas is
/// empty.
#[derive(Clone, PartialEq, Eq)]
pub struct ElementDelta<K: ElementKind> {
    pub(crate) element: Element<K>,
    pub(crate) kind: DeltaKind,
    pub(crate) flags: DeltaFlags,
    pub(crate) moved_from: Option<Element<K>>,
    pub(crate) moved_to: Option<Element<K>>,
    pub(crate) resource_deltas: Vec<ResourceDelta>,
    pub(crate) children: Vec<ElementDelta<K>>,
}

impl<K: ElementKind> ElementDelta<K> {
    pub fn element(&self) -> &Element<K> {
        &self.element
    }

    pub fn kind(&self) -> DeltaKind {
        self.kind
    }

    pub fn flags(&self) -> DeltaFlags {
        self.flags
    }

    /// For an `Added` delta with [`DeltaFlags::MOVED_FROM`], where the
    /// element came from.
    pub fn moved_from_element(&self) -> Option<&Element<K>> {
        self.moved_from.as_ref()
    }

    /// For a `Removed` delta with [`DeltaFlags::MOVED_TO`], where the element
    /// went.
    pub fn moved_to_element(&self) -> Option<&Element<K>> {
        self.moved_to.as_ref()
    }

    pub fn resource_deltas(&self) -> &[ResourceDelta] {
        &self.resource_deltas
    }

    pub fn affected_children(&self) -> &[ElementDelta<K>] {
        &self.children
    }

    pub fn added_children(&self) -> impl Iterator<Item = &ElementDelta<K>> {
        self.children_of_kind(DeltaKind::Added)
    }

    pub fn removed_children(&self) -> impl Iterator<Item = &ElementDelta<K>> {
        self.children_of_kind(DeltaKind::Removed)
    }

    pub fn changed_children(&self) -> impl Iterator<Item = &ElementDelta<K>> {
        self.children_of_kind(DeltaKind::Changed)
    }

    fn children_of_kind(&self, kind: DeltaKind) -> impl Iterator<Item = &ElementDelta<K>> {
        self.children.iter().filter(move |child| child.kind == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.kind == DeltaKind::Changed
            && self.flags.is_empty()
            && self.children.is_empty()
            && self.resource_deltas.is_empty()
    }

    /// The delta for `element` in this tree, if any.
    pub fn find_delta(&self, element: &Element<K>) -> Option<&ElementDelta<K>> {
        if self.element == *element {
            return Some(self);
        }
        if !self.element.is_ancestor_of(element) {
            return None;
        }
        self.children
            .iter()
            .find_map(|child| child.find_delta(element))
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        write!(
            f,
            "{:indent$}{}[{}]: {{{}}}",
            "",
            self.element.to_string_name(),
            self.kind.marker(),
            self.flags,
            indent = depth * 2
        )?;
        if let Some(from) = &self.moved_from {
            write!(f, " MOVED_FROM({from})")?;
        }
        if let Some(to) = &self.moved_to {
            write!(f, " MOVED_TO({to})")?;
        }
        for child in &self.children {
            f.write_str("\n")?;
            child.write_indented(f, depth + 1)?;
        }
        for resource in &self.resource_deltas {
            write!(
                f,
                "\n{:indent$}ResourceDelta({})[{}]",
                "",
                resource.path.display(),
                match resource.kind {
                    ResourceDeltaKind::Added => '+',
                    ResourceDeltaKind::Removed => '-',
                    ResourceDeltaKind::Changed => '*',
                },
                indent = (depth + 1) * 2
            )?;
        }
        Ok(())
    }
}

/// Multi-line rendering, one element per line indented two spaces per
/// level, e.g.
///
/// ```text
/// a.foo[*]: {CHILDREN}
///   f[+]: {}
///   g[*]: {CONTENT}
/// ```
impl<K: ElementKind> fmt::Display for ElementDelta<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

impl<K: ElementKind> fmt::Debug for ElementDelta<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElementDelta(\n{self}\n)")
    }
}
