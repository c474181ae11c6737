//! Before/after comparison of element trees.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use crate::body::Body;
use crate::cancel::CancellationToken;
use crate::context::Context;
use crate::delta::DeltaFlags;
use crate::delta_builder::ElementDeltaBuilder;
use crate::element::{Element, ElementKind};
use crate::manager::ElementManager;
use crate::model::Model;

/// Records the state of an element subtree so that, after the subtree has
/// been changed (typically rebuilt with [`crate::FORCE_OPEN`]), the
/// differences can be reported as a delta.
///
/// ```text
/// recorder.begin_recording(&file, None, usize::MAX);
/// manager.open(&file, &Context::new().with(FORCE_OPEN, true), &cancel)?;
/// let delta = recorder.end_recording().build();
/// ```
///
/// Only bodies that are open when recording begins are compared; elements
/// below `max_depth` are reported as a coarse `CONTENT` change of their
/// ancestor at that depth. A recorder can be reused, but not nested.
pub struct ElementChangeRecorder<'m, M: Model> {
    manager: &'m ElementManager<M>,
    recording: Option<Recording<M::Kind>>,
}

struct Recording<K: ElementKind> {
    root: Element<K>,
    builder: ElementDeltaBuilder<K>,
    max_depth: usize,
    old_bodies: IndexMap<Element<K>, Arc<Body<K>>>,
    /// Elements that existed but had no open body when recording began.
    old_unopened: IndexSet<Element<K>>,
    old_positions: HashMap<Element<K>, ListItem<K>>,
    new_positions: HashMap<Element<K>, ListItem<K>>,
    added: HashSet<Element<K>>,
    removed: HashSet<Element<K>>,
}

/// Neighbours of an element among its siblings.
#[derive(Clone)]
struct ListItem<K: ElementKind> {
    previous: Option<Element<K>>,
    next: Option<Element<K>>,
}

impl<K: ElementKind> ListItem<K> {
    fn detached() -> Self {
        Self {
            previous: None,
            next: None,
        }
    }
}

impl<'m, M: Model> ElementChangeRecorder<'m, M> {
    pub fn new(manager: &'m ElementManager<M>) -> Self {
        Self {
            manager,
            recording: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    /// Snapshots the open bodies of `root` and its descendants down to
    /// `max_depth` (the root is at depth 0). Changes are recorded into
    /// `builder` if given, so one builder can collect several recordings.
    ///
    /// # Panics
    ///
    /// If already recording, or if `builder` is rooted elsewhere than at
    /// `root` or one of its ancestors.
    pub fn begin_recording(
        &mut self,
        root: &Element<M::Kind>,
        builder: Option<ElementDeltaBuilder<M::Kind>>,
        max_depth: usize,
    ) {
        assert!(!self.is_recording(), "recorder is already recording");
        let builder = builder.unwrap_or_else(|| ElementDeltaBuilder::new(root.clone()));
        let builder_root = builder.root_element();
        assert!(
            builder_root == root || builder_root.is_ancestor_of(root),
            "delta builder rooted at {builder_root} cannot record changes of {root}"
        );

        let mut old_positions = HashMap::new();
        old_positions.insert(root.clone(), ListItem::detached());
        let mut recording = Recording {
            root: root.clone(),
            builder,
            max_depth,
            old_bodies: IndexMap::new(),
            old_unopened: IndexSet::new(),
            old_positions,
            new_positions: HashMap::new(),
            added: HashSet::new(),
            removed: HashSet::new(),
        };
        recording.record_body(self.manager, root, 0);
        tracing::trace!(
            target: "handly.recorder",
            root = %root,
            recorded = recording.old_bodies.len(),
            "recording started"
        );
        self.recording = Some(recording);
    }

    /// Compares the current state against the recorded one and returns the
    /// builder holding the differences.
    ///
    /// # Panics
    ///
    /// If not recording.
    pub fn end_recording(&mut self) -> ElementDeltaBuilder<M::Kind> {
        let mut recording = self
            .recording
            .take()
            .unwrap_or_else(|| panic!("recorder is not recording"));
        let root = recording.root.clone();
        let manager = self.manager;

        recording
            .new_positions
            .insert(root.clone(), ListItem::detached());
        recording.record_new_positions(manager, &root, 0);
        recording.find_additions(manager, &root, 0);
        recording.find_deletions();
        recording.find_changes_in_positioning(manager, &root, 0);
        tracing::trace!(target: "handly.recorder", root = %root, "recording finished");
        recording.builder
    }
}

impl<K: ElementKind> Recording<K> {
    fn record_body<M: Model<Kind = K>>(
        &mut self,
        manager: &ElementManager<M>,
        element: &Element<K>,
        depth: usize,
    ) {
        if depth >= self.max_depth {
            return;
        }
        let Some(body) = manager.peek(element) else {
            self.old_unopened.insert(element.clone());
            return;
        };
        let children = body.children();
        self.old_bodies.insert(element.clone(), body);
        insert_positions(&mut self.old_positions, &children);
        for child in children.iter() {
            self.record_body(manager, child, depth + 1);
        }
    }

    /// Positions only matter for children of elements that existed before.
    fn record_new_positions<M: Model<Kind = K>>(
        &mut self,
        manager: &ElementManager<M>,
        element: &Element<K>,
        depth: usize,
    ) {
        if depth >= self.max_depth || !self.old_bodies.contains_key(element) {
            return;
        }
        let Some(body) = current_body(manager, element) else {
            return;
        };
        let children = body.children();
        insert_positions(&mut self.new_positions, &children);
        for child in children.iter() {
            self.record_new_positions(manager, child, depth + 1);
        }
    }

    fn find_additions<M: Model<Kind = K>>(
        &mut self,
        manager: &ElementManager<M>,
        element: &Element<K>,
        depth: usize,
    ) {
        let old_body = self.old_bodies.shift_remove(element);
        let existed = old_body.is_some() || self.old_unopened.shift_remove(element);
        if !existed && depth < self.max_depth {
            self.builder.added(element);
            self.mark_added(element);
        }
        if depth >= self.max_depth {
            self.builder.changed(element, DeltaFlags::CONTENT);
            return;
        }
        let Some(old_body) = old_body else {
            return;
        };
        let Some(new_body) = current_body(manager, element) else {
            self.builder.removed(element);
            self.mark_removed(element);
            return;
        };
        if !Arc::ptr_eq(&old_body, &new_body) {
            manager
                .model()
                .find_content_change(element, &old_body, &new_body, &mut self.builder);
        }
        for child in new_body.children().iter() {
            self.find_additions(manager, child, depth + 1);
        }
    }

    fn find_deletions(&mut self) {
        let mut remaining: Vec<Element<K>> = self.old_bodies.drain(..).map(|(e, _)| e).collect();
        remaining.extend(self.old_unopened.drain(..));
        for element in remaining {
            self.builder.removed(&element);
            self.mark_removed(&element);
        }
    }

    fn find_changes_in_positioning<M: Model<Kind = K>>(
        &mut self,
        manager: &ElementManager<M>,
        element: &Element<K>,
        depth: usize,
    ) {
        if depth >= self.max_depth || self.added.contains(element) || self.removed.contains(element)
        {
            return;
        }
        if !self.is_positioned_correctly(element) {
            let mut flags = DeltaFlags::REORDER;
            if depth + 1 < self.max_depth {
                flags |= DeltaFlags::FINE_GRAINED;
            }
            self.builder.changed(element, flags);
        }
        let Some(body) = manager.peek(element) else {
            return;
        };
        for child in body.children().iter() {
            self.find_changes_in_positioning(manager, child, depth + 1);
        }
    }

    fn is_positioned_correctly(&self, element: &Element<K>) -> bool {
        match (
            self.old_positions.get(element),
            self.new_positions.get(element),
        ) {
            (Some(old), Some(new)) => old.previous == new.previous,
            _ => false,
        }
    }

    fn mark_added(&mut self, element: &Element<K>) {
        self.added.insert(element.clone());
        splice_out(&mut self.new_positions, element);
    }

    fn mark_removed(&mut self, element: &Element<K>) {
        self.removed.insert(element.clone());
        splice_out(&mut self.old_positions, element);
    }
}

fn current_body<M: Model>(
    manager: &ElementManager<M>,
    element: &Element<M::Kind>,
) -> Option<Arc<Body<M::Kind>>> {
    manager.peek(element).or_else(|| {
        manager
            .open(element, &Context::new(), &CancellationToken::new())
            .ok()
    })
}

fn insert_positions<K: ElementKind>(
    positions: &mut HashMap<Element<K>, ListItem<K>>,
    children: &[Element<K>],
) {
    for (index, child) in children.iter().enumerate() {
        let previous = index.checked_sub(1).map(|i| children[i].clone());
        let next = children.get(index + 1).cloned();
        positions.insert(child.clone(), ListItem { previous, next });
    }
}

/// Links the neighbours of `element` to each other, so that an addition or
/// removal does not count as a reordering of its siblings.
fn splice_out<K: ElementKind>(positions: &mut HashMap<Element<K>, ListItem<K>>, element: &Element<K>) {
    let Some(item) = positions.get(element).cloned() else {
        return;
    };
    if let Some(previous) = &item.previous {
        if let Some(previous_item) = positions.get_mut(previous) {
            previous_item.next = item.next.clone();
        }
    }
    if let Some(next) = &item.next {
        if let Some(next_item) = positions.get_mut(next) {
            next_item.previous = item.previous.clone();
        }
    }
}
