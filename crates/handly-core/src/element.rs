use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use smol_str::SmolStr;

/// Coarse classification of element kinds.
///
/// The body cache is segmented by category, and the open protocol uses it to
/// decide whether an element builds its own structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementCategory {
    /// The single root of a model.
    Model,
    Project,
    RootFolder,
    Package,
    SourceFile,
    /// A nested source construct (type, method, field, ...). Its body is
    /// built together with the enclosing source file.
    SourceConstruct,
}

impl ElementCategory {
    pub const COUNT: usize = 6;

    pub fn all() -> [ElementCategory; Self::COUNT] {
        [
            ElementCategory::Model,
            ElementCategory::Project,
            ElementCategory::RootFolder,
            ElementCategory::Package,
            ElementCategory::SourceFile,
            ElementCategory::SourceConstruct,
        ]
    }

    pub(crate) fn index(self) -> usize {
        match self {
            ElementCategory::Model => 0,
            ElementCategory::Project => 1,
            ElementCategory::RootFolder => 2,
            ElementCategory::Package => 3,
            ElementCategory::SourceFile => 4,
            ElementCategory::SourceConstruct => 5,
        }
    }
}

/// Model-specific tag identifying the concrete kind of an element.
///
/// Models define a closed enum of their node kinds and map each one to a
/// coarse [`ElementCategory`].
pub trait ElementKind: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    fn category(self) -> ElementCategory;
}

/// A lightweight, equality-based handle to a model element.
///
/// Handles are created freely on every navigation call and never interned.
/// Two handles are equal iff they have the same kind, equal parents, equal
/// names, equal occurrence counts and equal file identities. A handle does
/// not own the element's state; that lives in a [`crate::Body`] held by the
/// element manager while the element is open.
pub struct Element<K: ElementKind> {
    inner: Arc<ElementData<K>>,
}

struct ElementData<K: ElementKind> {
    kind: K,
    parent: Option<Element<K>>,
    name: Option<SmolStr>,
    occurrence_count: u32,
    file: Option<Arc<Path>>,
    hash: u64,
}

impl<K: ElementKind> Element<K> {
    /// Creates a root handle (no parent).
    pub fn root(kind: K, name: Option<&str>) -> Self {
        Self::from_parts(kind, None, name.map(SmolStr::new), 1, None)
    }

    /// Creates a child handle of `self`.
    pub fn child(&self, kind: K, name: impl AsRef<str>) -> Self {
        Self::from_parts(
            kind,
            Some(self.clone()),
            Some(SmolStr::new(name.as_ref())),
            1,
            None,
        )
    }

    /// Returns a copy of this handle with the given occurrence count.
    ///
    /// Structure builders use this to disambiguate syntactically identical
    /// siblings before the handles are published.
    pub fn with_occurrence_count(&self, occurrence_count: u32) -> Self {
        assert!(occurrence_count > 0, "occurrence count must be positive");
        Self::from_parts(
            self.inner.kind,
            self.inner.parent.clone(),
            self.inner.name.clone(),
            occurrence_count,
            self.inner.file.clone(),
        )
    }

    /// Returns a copy of this handle bound to an underlying file identity.
    pub fn with_file(&self, file: impl Into<PathBuf>) -> Self {
        let file: PathBuf = file.into();
        Self::from_parts(
            self.inner.kind,
            self.inner.parent.clone(),
            self.inner.name.clone(),
            self.inner.occurrence_count,
            Some(Arc::from(file.as_path())),
        )
    }

    fn from_parts(
        kind: K,
        parent: Option<Element<K>>,
        name: Option<SmolStr>,
        occurrence_count: u32,
        file: Option<Arc<Path>>,
    ) -> Self {
        let mut hasher = DefaultHasher::new();
        kind.hash(&mut hasher);
        parent.as_ref().map(|p| p.inner.hash).hash(&mut hasher);
        name.hash(&mut hasher);
        occurrence_count.hash(&mut hasher);
        file.hash(&mut hasher);
        Self {
            inner: Arc::new(ElementData {
                kind,
                parent,
                name,
                occurrence_count,
                file,
                hash: hasher.finish(),
            }),
        }
    }

    pub fn kind(&self) -> K {
        self.inner.kind
    }

    pub fn category(&self) -> ElementCategory {
        self.inner.kind.category()
    }

    pub fn parent(&self) -> Option<&Element<K>> {
        self.inner.parent.as_ref()
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    pub fn occurrence_count(&self) -> u32 {
        self.inner.occurrence_count
    }

    pub fn file(&self) -> Option<&Path> {
        self.inner.file.as_deref()
    }

    /// Iterates over the proper ancestors of this element, nearest first.
    pub fn ancestors(&self) -> Ancestors<'_, K> {
        Ancestors {
            next: self.parent(),
        }
    }

    /// The root of the tree this handle belongs to.
    pub fn root_element(&self) -> &Element<K> {
        self.ancestors().last().unwrap_or(self)
    }

    /// Number of ancestors; roots have depth 0.
    pub fn depth(&self) -> usize {
        self.ancestors().count()
    }

    /// Returns whether `self` is a proper ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &Element<K>) -> bool {
        other.ancestors().any(|ancestor| ancestor == self)
    }

    /// Short name used in delta renderings: the name plus `#n` when the
    /// occurrence count disambiguates it.
    pub fn to_string_name(&self) -> String {
        let name = self.name().unwrap_or("<root>");
        if self.occurrence_count() > 1 {
            format!("{name}#{}", self.occurrence_count())
        } else {
            name.to_string()
        }
    }
}

impl<K: ElementKind> Clone for Element<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: ElementKind> PartialEq for Element<K> {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return true;
        }
        let (a, b) = (&*self.inner, &*other.inner);
        a.hash == b.hash
            && a.kind == b.kind
            && a.occurrence_count == b.occurrence_count
            && a.name == b.name
            && a.file == b.file
            && a.parent == b.parent
    }
}

impl<K: ElementKind> Eq for Element<K> {}

impl<K: ElementKind> Hash for Element<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.inner.hash);
    }
}

impl<K: ElementKind> fmt::Debug for Element<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({self})", self.inner.kind)
    }
}

/// Renders the slash-separated path of names from the root, e.g.
/// `proj/a.foo/f#2`. Unnamed roots are omitted.
impl<K: ElementKind> fmt::Display for Element<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut chain: Vec<&Element<K>> = self.ancestors().collect();
        chain.reverse();
        chain.push(self);
        let mut first = true;
        for element in chain {
            if element.parent().is_none() && element.name().is_none() {
                continue;
            }
            if !first {
                f.write_str("/")?;
            }
            first = false;
            f.write_str(&element.to_string_name())?;
        }
        if first {
            f.write_str("<root>")?;
        }
        Ok(())
    }
}

pub struct Ancestors<'a, K: ElementKind> {
    next: Option<&'a Element<K>>,
}

impl<'a, K: ElementKind> Iterator for Ancestors<'a, K> {
    type Item = &'a Element<K>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.parent();
        Some(current)
    }
}
