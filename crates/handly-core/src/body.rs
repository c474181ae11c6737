use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::element::{Element, ElementKind};
use crate::property::{Property, PropertyMap, PropertyValue};

/// Materialized state of an open element: its ordered children plus a typed
/// property bag.
///
/// Bodies are shared as `Arc<Body<K>>` once published to the element cache.
/// Properties are fixed at that point; the child list can still be edited in
/// place (delta processors add and remove children of open containers).
/// Callers that need to know whether an element changed compare bodies by
/// identity, so a rebuilt element always gets a fresh body.
pub struct Body<K: ElementKind> {
    children: RwLock<Arc<[Element<K>]>>,
    properties: PropertyMap,
}

impl<K: ElementKind> Body<K> {
    pub fn new() -> Self {
        Self {
            children: RwLock::new(Arc::from(Vec::new())),
            properties: PropertyMap::new(),
        }
    }

    pub fn with_children(children: Vec<Element<K>>) -> Self {
        let body = Self::new();
        body.set_children(children);
        body
    }

    /// Snapshot of the current child list.
    pub fn children(&self) -> Arc<[Element<K>]> {
        Arc::clone(&self.children.read())
    }

    pub fn set_children(&self, children: Vec<Element<K>>) {
        *self.children.write() = Arc::from(children);
    }

    /// Appends `child` unless it is already present.
    pub fn add_child(&self, child: Element<K>) {
        let mut children = self.children.write();
        if children.contains(&child) {
            return;
        }
        let mut updated = children.to_vec();
        updated.push(child);
        *children = Arc::from(updated);
    }

    /// Removes `child`; returns whether it was present.
    pub fn remove_child(&self, child: &Element<K>) -> bool {
        let mut children = self.children.write();
        let Some(index) = children.iter().position(|c| c == child) else {
            return false;
        };
        let mut updated = children.to_vec();
        updated.remove(index);
        *children = Arc::from(updated);
        true
    }

    pub fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    pub fn get<T: PropertyValue>(&self, property: Property<T>) -> Option<&T> {
        self.properties.get(property)
    }

    /// Sets a property. Only possible while the body is still exclusively
    /// owned, i.e. during structure building.
    pub fn set<T: PropertyValue>(&mut self, property: Property<T>, value: T) {
        self.properties.set(property, value);
    }
}

impl<K: ElementKind> Default for Body<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ElementKind> fmt::Debug for Body<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body")
            .field("children", &self.children())
            .field("properties", &self.properties)
            .finish()
    }
}
