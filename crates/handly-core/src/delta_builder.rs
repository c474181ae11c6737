use indexmap::IndexMap;

use crate::delta::{DeltaFlags, DeltaKind, ElementDelta, ResourceDelta};
use crate::element::{Element, ElementKind};

/// Incrementally assembles an [`ElementDelta`] tree rooted at one element.
///
/// Recording a change for a descendant creates `Changed | CHILDREN` nodes
/// for every intermediate ancestor. Changes below an `Added` or `Removed`
/// node are subsumed by it and dropped. Repeated changes to the same
/// element merge:
///
/// * added, then removed: the two cancel out;
/// * changed, then removed: removed (its child deltas are discarded);
/// * changed, then added: added (its child deltas are discarded);
/// * a further change to an added or removed element only adds flags.
///
/// Flags only ever accumulate.
#[derive(Debug)]
pub struct ElementDeltaBuilder<K: ElementKind> {
    root: Node<K>,
}

#[derive(Debug)]
struct Node<K: ElementKind> {
    element: Element<K>,
    kind: DeltaKind,
    flags: DeltaFlags,
    moved_from: Option<Element<K>>,
    moved_to: Option<Element<K>>,
    resource_deltas: Vec<ResourceDelta>,
    children: IndexMap<Element<K>, Node<K>>,
}

struct Change<K: ElementKind> {
    kind: DeltaKind,
    flags: DeltaFlags,
    moved_from: Option<Element<K>>,
    moved_to: Option<Element<K>>,
    resource_delta: Option<ResourceDelta>,
}

impl<K: ElementKind> Change<K> {
    fn new(kind: DeltaKind, flags: DeltaFlags) -> Self {
        Self {
            kind,
            flags,
            moved_from: None,
            moved_to: None,
            resource_delta: None,
        }
    }
}

#[derive(PartialEq, Eq)]
enum Merged {
    Kept,
    Cancelled,
}

impl<K: ElementKind> Node<K> {
    fn new(element: Element<K>) -> Self {
        Self {
            element,
            kind: DeltaKind::Changed,
            flags: DeltaFlags::empty(),
            moved_from: None,
            moved_to: None,
            resource_deltas: Vec::new(),
            children: IndexMap::new(),
        }
    }

    fn from_change(element: Element<K>, change: Change<K>) -> Self {
        let mut node = Self::new(element);
        node.kind = change.kind;
        node.flags = change.flags;
        node.moved_from = change.moved_from;
        node.moved_to = change.moved_to;
        node.resource_deltas.extend(change.resource_delta);
        node
    }

    fn is_subsuming(&self) -> bool {
        matches!(self.kind, DeltaKind::Added | DeltaKind::Removed)
    }

    /// A `Changed` node that only exists to hold children that are gone.
    fn is_vacant(&self) -> bool {
        self.kind == DeltaKind::Changed
            && self.children.is_empty()
            && self.resource_deltas.is_empty()
            && self.flags.difference(DeltaFlags::CHILDREN).is_empty()
    }

    /// Records `change` for the last element of `path`; the other elements
    /// are the intermediate ancestors below `self`, outermost first.
    ///
    /// Returns whether `self` became vacant and should be pruned.
    fn insert(&mut self, path: &[Element<K>], change: Change<K>) -> bool {
        if self.is_subsuming() {
            return false;
        }
        let Some((next, rest)) = path.split_first() else {
            return false;
        };
        self.flags |= DeltaFlags::CHILDREN;

        let prune_child = if rest.is_empty() {
            match self.children.get_mut(next) {
                Some(existing) => existing.merge(change) == Merged::Cancelled,
                None => {
                    self.children
                        .insert(next.clone(), Node::from_change(next.clone(), change));
                    false
                }
            }
        } else {
            self.children
                .entry(next.clone())
                .or_insert_with(|| Node::new(next.clone()))
                .insert(rest, change)
        };

        if prune_child {
            self.children.shift_remove(next);
            if self.children.is_empty() {
                self.flags.remove(DeltaFlags::CHILDREN);
            }
            return self.is_vacant();
        }
        false
    }

    fn merge(&mut self, change: Change<K>) -> Merged {
        match (self.kind, change.kind) {
            (DeltaKind::Added, DeltaKind::Removed) => return Merged::Cancelled,
            (DeltaKind::Removed, DeltaKind::Added) => {
                debug_assert!(
                    false,
                    "{} re-added after being removed in the same delta",
                    self.element
                );
                self.kind = DeltaKind::Changed;
                self.flags |= DeltaFlags::CONTENT;
            }
            (DeltaKind::Changed, kind @ (DeltaKind::Added | DeltaKind::Removed)) => {
                self.kind = kind;
                self.children.clear();
                self.flags.remove(DeltaFlags::CHILDREN | DeltaFlags::FINE_GRAINED);
            }
            _ => {}
        }
        self.flags |= change.flags;
        if change.moved_from.is_some() {
            self.moved_from = change.moved_from;
        }
        if change.moved_to.is_some() {
            self.moved_to = change.moved_to;
        }
        self.resource_deltas.extend(change.resource_delta);
        Merged::Kept
    }

    fn into_delta(self) -> ElementDelta<K> {
        ElementDelta {
            element: self.element,
            kind: self.kind,
            flags: self.flags,
            moved_from: self.moved_from,
            moved_to: self.moved_to,
            resource_deltas: self.resource_deltas,
            children: self.children.into_values().map(Node::into_delta).collect(),
        }
    }
}

impl<K: ElementKind> ElementDeltaBuilder<K> {
    pub fn new(root: Element<K>) -> Self {
        Self {
            root: Node::new(root),
        }
    }

    pub fn root_element(&self) -> &Element<K> {
        &self.root.element
    }

    pub fn added(&mut self, element: &Element<K>) -> &mut Self {
        self.added_with_flags(element, DeltaFlags::empty())
    }

    pub fn added_with_flags(&mut self, element: &Element<K>, flags: DeltaFlags) -> &mut Self {
        self.record(element, Change::new(DeltaKind::Added, flags))
    }

    pub fn removed(&mut self, element: &Element<K>) -> &mut Self {
        self.removed_with_flags(element, DeltaFlags::empty())
    }

    pub fn removed_with_flags(&mut self, element: &Element<K>, flags: DeltaFlags) -> &mut Self {
        self.record(element, Change::new(DeltaKind::Removed, flags))
    }

    pub fn changed(&mut self, element: &Element<K>, flags: DeltaFlags) -> &mut Self {
        self.record(element, Change::new(DeltaKind::Changed, flags))
    }

    /// `element` was added as the result of moving `from`.
    pub fn moved_from(&mut self, element: &Element<K>, from: &Element<K>) -> &mut Self {
        let mut change = Change::new(DeltaKind::Added, DeltaFlags::MOVED_FROM);
        change.moved_from = Some(from.clone());
        self.record(element, change)
    }

    /// `element` was removed as the result of moving it to `to`.
    pub fn moved_to(&mut self, element: &Element<K>, to: &Element<K>) -> &mut Self {
        let mut change = Change::new(DeltaKind::Removed, DeltaFlags::MOVED_TO);
        change.moved_to = Some(to.clone());
        self.record(element, change)
    }

    /// Attaches a non-element resource change to `element`, marking its
    /// content as changed.
    pub fn add_resource_delta(
        &mut self,
        element: &Element<K>,
        resource_delta: ResourceDelta,
    ) -> &mut Self {
        let mut change = Change::new(DeltaKind::Changed, DeltaFlags::CONTENT);
        change.resource_delta = Some(resource_delta);
        self.record(element, change)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_vacant() && !self.root.flags.contains(DeltaFlags::CHILDREN)
    }

    pub fn build(self) -> ElementDelta<K> {
        self.root.into_delta()
    }

    fn record(&mut self, element: &Element<K>, change: Change<K>) -> &mut Self {
        if *element == self.root.element {
            if self.root.merge(change) == Merged::Cancelled {
                self.root = Node::new(self.root.element.clone());
            }
            return self;
        }

        let mut path: Vec<Element<K>> = Vec::new();
        path.push(element.clone());
        for ancestor in element.ancestors() {
            if *ancestor == self.root.element {
                path.reverse();
                self.root.insert(&path, change);
                return self;
            }
            path.push(ancestor.clone());
        }
        panic!(
            "{element} is not a descendant of delta root {}",
            self.root.element
        );
    }
}
