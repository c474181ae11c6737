use std::fmt;
use std::sync::Arc;

use crate::buffer::Snapshot;
use crate::property::{Property, PropertyMap, PropertyValue};

/// Rebuild the structure even if the element is already open, and publish
/// the result unconditionally.
pub const FORCE_OPEN: Property<bool> = Property::new("handly.force_open");

/// Source text the structure builder should parse instead of reading the
/// underlying store.
pub const SOURCE_CONTENTS: Property<Arc<str>> = Property::new("handly.source_contents");

/// Snapshot the [`SOURCE_CONTENTS`] were taken from, if any.
pub const SOURCE_SNAPSHOT: Property<Snapshot> = Property::new("handly.source_snapshot");

/// Options passed through the open and reconcile protocols.
///
/// A context is an immutable-by-convention property bag; use [`Context::with`]
/// to derive an extended copy.
#[derive(Clone, Default)]
pub struct Context {
    properties: PropertyMap,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T: PropertyValue>(mut self, property: Property<T>, value: T) -> Self {
        self.properties.set(property, value);
        self
    }

    pub fn get<T: PropertyValue>(&self, property: Property<T>) -> Option<&T> {
        self.properties.get(property)
    }

    pub fn get_or_default<T: PropertyValue + Default + Clone>(&self, property: Property<T>) -> T {
        self.get(property).cloned().unwrap_or_default()
    }

    pub fn contains<T>(&self, property: Property<T>) -> bool {
        self.properties.contains(property)
    }

    pub fn is_force_open(&self) -> bool {
        self.get_or_default(FORCE_OPEN)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Context").field(&self.properties).finish()
    }
}
