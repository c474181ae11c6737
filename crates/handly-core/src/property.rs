use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A typed key into a [`PropertyMap`].
///
/// Properties are identified by name; the type parameter only guards reads,
/// so a lookup with a mismatching type yields `None`.
pub struct Property<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Property<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for Property<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Property<T> {}

impl<T> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Property").field(&self.name).finish()
    }
}

/// Values storable in a [`PropertyMap`]. Implemented for every
/// `PartialEq + Debug + Send + Sync` type.
pub trait PropertyValue: Any + Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn eq_value(&self, other: &dyn PropertyValue) -> bool;
}

impl<T> PropertyValue for T
where
    T: Any + PartialEq + Send + Sync + fmt::Debug,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_value(&self, other: &dyn PropertyValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }
}

/// A typed property bag.
///
/// Cloning is cheap: values are shared behind `Arc`.
#[derive(Clone, Default)]
pub struct PropertyMap {
    values: HashMap<&'static str, Arc<dyn PropertyValue>>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: PropertyValue>(&self, property: Property<T>) -> Option<&T> {
        self.values
            .get(property.name)
            .and_then(|value| value.as_any().downcast_ref::<T>())
    }

    pub fn set<T: PropertyValue>(&mut self, property: Property<T>, value: T) {
        self.values.insert(property.name, Arc::new(value));
    }

    pub fn remove<T: PropertyValue>(&mut self, property: Property<T>) -> bool {
        self.values.remove(property.name).is_some()
    }

    pub fn contains<T>(&self, property: Property<T>) -> bool {
        self.values.contains_key(property.name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Copies all entries of `other` into `self`, overwriting on conflict.
    pub fn extend_from(&mut self, other: &PropertyMap) {
        for (name, value) in &other.values {
            self.values.insert(name, Arc::clone(value));
        }
    }

    /// Names of properties whose values differ between `self` and `other`,
    /// including properties present on only one side. Sorted for stable output.
    pub fn changed_properties(&self, other: &PropertyMap) -> Vec<&'static str> {
        let mut changed: Vec<&'static str> = Vec::new();
        for (name, value) in &self.values {
            match other.values.get(name) {
                Some(other_value) if value.eq_value(other_value.as_ref()) => {}
                _ => changed.push(name),
            }
        }
        for name in other.values.keys() {
            if !self.values.contains_key(name) {
                changed.push(name);
            }
        }
        changed.sort_unstable();
        changed
    }
}

impl fmt::Debug for PropertyMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<_> = self.values.iter().collect();
        entries.sort_by_key(|(name, _)| **name);
        f.debug_map().entries(entries).finish()
    }
}
