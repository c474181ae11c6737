//! Body caching.
//!
//! [`BodyCache`] is the pluggable contract the element manager relies on;
//! [`ElementCache`] is the default implementation: independent LRU segments
//! per [`ElementCategory`], each with its own space limit.
//!
//! Eviction is cooperative. Evicting an element means closing it (dropping
//! its body and the bodies of its cached descendants); if the configured
//! close policy refuses, the entry stays cached and the segment overflows
//! until a later sweep succeeds.

use std::fmt;
use std::sync::Arc;

use lru::LruCache;

use crate::body::Body;
use crate::element::{Element, ElementCategory, ElementKind};

/// A body removed by eviction. The element manager runs the model's
/// `removing` hook for these after releasing its lock.
#[derive(Debug)]
pub struct Evicted<K: ElementKind> {
    pub element: Element<K>,
    pub body: Arc<Body<K>>,
}

/// Handle → body storage used by the element manager.
///
/// Implementations are driven under the manager's lock and must not call back
/// into the manager.
pub trait BodyCache<K: ElementKind>: Send {
    /// Returns the cached body and marks it as recently used.
    fn get(&mut self, element: &Element<K>) -> Option<Arc<Body<K>>>;

    /// Returns the cached body without affecting recency.
    fn peek(&self, element: &Element<K>) -> Option<Arc<Body<K>>>;

    /// Caches `body`, returning whatever had to be evicted to make room.
    fn put(&mut self, element: Element<K>, body: Arc<Body<K>>) -> Vec<Evicted<K>>;

    fn remove(&mut self, element: &Element<K>) -> Option<Arc<Body<K>>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Installs the predicate consulted before an element is evicted. Caches
    /// that never evict can ignore it.
    fn set_close_policy(&mut self, _policy: ClosePolicy<K>) {}
}

/// Decides whether an element chosen for eviction may be closed.
pub type ClosePolicy<K> = Arc<dyn Fn(&Element<K>) -> bool + Send + Sync>;

/// Space limits per cache segment, in number of entries.
///
/// `None` means unbounded. The model root segment is always unbounded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheLimits {
    pub project: Option<usize>,
    pub root_folder: Option<usize>,
    pub package: Option<usize>,
    pub source_file: Option<usize>,
    /// Source constructs are dropped together with their source file, so this
    /// segment is unbounded by default.
    pub source_construct: Option<usize>,
    /// Fraction of a segment's limit kept after an eviction sweep. `1.0`
    /// evicts only what is strictly needed.
    pub load_factor: f64,
}

impl CacheLimits {
    pub const DEFAULT_PROJECT: usize = 5;
    pub const DEFAULT_ROOT_FOLDER: usize = 50;
    pub const DEFAULT_PACKAGE: usize = 500;
    pub const DEFAULT_SOURCE_FILE: usize = 250;
    pub const DEFAULT_LOAD_FACTOR: f64 = 1.0 / 3.0;

    /// Default limits scaled by `ratio`.
    pub fn scaled(ratio: f64) -> Self {
        let scale = |base: usize| Some(((base as f64) * ratio).round().max(1.0) as usize);
        Self {
            project: scale(Self::DEFAULT_PROJECT),
            root_folder: scale(Self::DEFAULT_ROOT_FOLDER),
            package: scale(Self::DEFAULT_PACKAGE),
            source_file: scale(Self::DEFAULT_SOURCE_FILE),
            source_construct: None,
            load_factor: Self::DEFAULT_LOAD_FACTOR,
        }
    }

    pub fn limit_for(&self, category: ElementCategory) -> Option<usize> {
        match category {
            ElementCategory::Model => None,
            ElementCategory::Project => self.project,
            ElementCategory::RootFolder => self.root_folder,
            ElementCategory::Package => self.package,
            ElementCategory::SourceFile => self.source_file,
            ElementCategory::SourceConstruct => self.source_construct,
        }
    }
}

impl Default for CacheLimits {
    /// Default limits scaled by [`memory_ratio`].
    fn default() -> Self {
        Self::scaled(memory_ratio())
    }
}

/// Ratio of installed memory to a 4 GiB baseline, clamped to `[0.5, 4.0]`.
pub fn memory_ratio() -> f64 {
    const BASELINE: f64 = 4.0 * 1024.0 * 1024.0 * 1024.0;

    let mut system = sysinfo::System::new();
    system.refresh_memory();
    let total = system.total_memory();
    if total == 0 {
        return 1.0;
    }
    ((total as f64) / BASELINE).clamp(0.5, 4.0)
}

/// Point-in-time view of one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentStats {
    pub category: ElementCategory,
    pub len: usize,
    pub space_limit: Option<usize>,
    pub overflow: usize,
}

struct Segment<K: ElementKind> {
    category: ElementCategory,
    entries: LruCache<Element<K>, Arc<Body<K>>>,
    space_limit: Option<usize>,
    default_limit: Option<usize>,
    /// The element whose children most recently forced the limit up. A single
    /// slot: a second grower replaces the first, and only the second's removal
    /// restores the default.
    space_limit_parent: Option<Element<K>>,
    overflow: usize,
}

/// Segmented, overflow-tolerant LRU implementation of [`BodyCache`].
pub struct ElementCache<K: ElementKind> {
    segments: Vec<Segment<K>>,
    load_factor: f64,
    close_policy: ClosePolicy<K>,
}

impl<K: ElementKind> ElementCache<K> {
    pub fn new(limits: CacheLimits) -> Self {
        let segments = ElementCategory::all()
            .into_iter()
            .map(|category| {
                let limit = limits.limit_for(category);
                Segment {
                    category,
                    entries: LruCache::unbounded(),
                    space_limit: limit,
                    default_limit: limit,
                    space_limit_parent: None,
                    overflow: 0,
                }
            })
            .collect();
        Self {
            segments,
            load_factor: limits.load_factor.clamp(0.0, 1.0),
            close_policy: Arc::new(|_| true),
        }
    }

    pub fn with_close_policy(mut self, policy: ClosePolicy<K>) -> Self {
        self.close_policy = policy;
        self
    }

    pub fn space_limit(&self, category: ElementCategory) -> Option<usize> {
        self.segment(category).space_limit
    }

    pub fn len_of(&self, category: ElementCategory) -> usize {
        self.segment(category).entries.len()
    }

    pub fn stats(&self) -> Vec<SegmentStats> {
        self.segments
            .iter()
            .map(|segment| SegmentStats {
                category: segment.category,
                len: segment.entries.len(),
                space_limit: segment.space_limit,
                overflow: segment.overflow,
            })
            .collect()
    }

    /// Makes sure `child_count` children of `parent` fit into `category`'s
    /// segment without evicting each other, growing the limit if necessary.
    pub fn ensure_space_limit(
        &mut self,
        category: ElementCategory,
        child_count: usize,
        parent: &Element<K>,
    ) -> Vec<Evicted<K>> {
        let segment = self.segment(category);
        let Some(limit) = segment.space_limit else {
            return Vec::new();
        };
        let needed =
            1 + ((1.0 + self.load_factor) * ((child_count + segment.overflow) as f64)) as usize;
        if limit >= needed {
            return Vec::new();
        }

        let evicted = self.shrink(category);
        let segment = self.segment_mut(category);
        segment.space_limit = Some(needed);
        segment.space_limit_parent = Some(parent.clone());
        tracing::debug!(
            target: "handly.cache",
            ?category,
            from = limit,
            to = needed,
            parent = %parent,
            "grew segment space limit"
        );
        evicted
    }

    /// Restores `category`'s limit to `default_limit` if `parent` is the
    /// element that last grew it.
    pub fn reset_space_limit(
        &mut self,
        category: ElementCategory,
        default_limit: Option<usize>,
        parent: &Element<K>,
    ) {
        let segment = self.segment_mut(category);
        if segment.space_limit_parent.as_ref() != Some(parent) {
            return;
        }
        tracing::debug!(
            target: "handly.cache",
            ?category,
            to = ?default_limit,
            parent = %parent,
            "reset segment space limit"
        );
        segment.space_limit = default_limit;
        segment.space_limit_parent = None;
    }

    fn segment(&self, category: ElementCategory) -> &Segment<K> {
        &self.segments[category.index()]
    }

    fn segment_mut(&mut self, category: ElementCategory) -> &mut Segment<K> {
        &mut self.segments[category.index()]
    }

    /// Drops overflow, if any.
    fn shrink(&mut self, category: ElementCategory) -> Vec<Evicted<K>> {
        if self.segment(category).overflow > 0 {
            self.make_space(category, 0)
        } else {
            Vec::new()
        }
    }

    fn make_space(&mut self, category: ElementCategory, space: usize) -> Vec<Evicted<K>> {
        let segment = self.segment(category);
        let Some(limit) = segment.space_limit else {
            return Vec::new();
        };
        if segment.overflow == 0 && segment.entries.len() + space <= limit {
            return Vec::new();
        }

        let needed = (((1.0 - self.load_factor) * (limit as f64)) as usize).max(space);
        // Least recently used first. Collected up front so closing does not
        // disturb the iteration.
        let candidates: Vec<Element<K>> = segment
            .entries
            .iter()
            .rev()
            .map(|(element, _)| element.clone())
            .collect();

        let mut evicted = Vec::new();
        for candidate in candidates {
            let segment = self.segment(category);
            if segment.entries.len() + needed <= limit {
                break;
            }
            if !segment.entries.contains(&candidate) {
                // Already closed as a descendant of an earlier candidate.
                continue;
            }
            self.close_evicted(&candidate, &mut evicted);
        }

        let segment = self.segment_mut(category);
        let current = segment.entries.len();
        if current + space <= limit {
            segment.overflow = 0;
        } else {
            segment.overflow = current + space - limit;
            tracing::debug!(
                target: "handly.cache",
                ?category,
                limit,
                overflow = segment.overflow,
                "segment overflowing; close refused for remaining entries"
            );
        }
        evicted
    }

    fn close_evicted(&mut self, element: &Element<K>, evicted: &mut Vec<Evicted<K>>) {
        if !(self.close_policy)(element) {
            tracing::debug!(target: "handly.cache", element = %element, "close refused; keeping body cached");
            return;
        }
        let Some(body) = self.remove_entry(element) else {
            return;
        };
        tracing::trace!(target: "handly.cache", element = %element, "evicted");
        let children = body.children();
        evicted.push(Evicted {
            element: element.clone(),
            body,
        });
        for child in children.iter() {
            if self.segment(child.category()).entries.contains(child) {
                self.close_evicted(child, evicted);
            }
        }
    }

    fn remove_entry(&mut self, element: &Element<K>) -> Option<Arc<Body<K>>> {
        let body = self.segment_mut(element.category()).entries.pop(element)?;
        for index in 0..self.segments.len() {
            let category = self.segments[index].category;
            let default_limit = self.segments[index].default_limit;
            self.reset_space_limit(category, default_limit, element);
        }
        Some(body)
    }
}

impl<K: ElementKind> BodyCache<K> for ElementCache<K> {
    fn get(&mut self, element: &Element<K>) -> Option<Arc<Body<K>>> {
        self.segment_mut(element.category())
            .entries
            .get(element)
            .cloned()
    }

    fn peek(&self, element: &Element<K>) -> Option<Arc<Body<K>>> {
        self.segment(element.category())
            .entries
            .peek(element)
            .cloned()
    }

    fn put(&mut self, element: Element<K>, body: Arc<Body<K>>) -> Vec<Evicted<K>> {
        let mut evicted = Vec::new();
        let mut child_counts = [0usize; ElementCategory::COUNT];
        for child in body.children().iter() {
            child_counts[child.category().index()] += 1;
        }
        for category in ElementCategory::all() {
            let count = child_counts[category.index()];
            if count > 0 {
                evicted.extend(self.ensure_space_limit(category, count, &element));
            }
        }

        let category = element.category();
        if !self.segment(category).entries.contains(&element) {
            evicted.extend(self.make_space(category, 1));
        }
        self.segment_mut(category).entries.put(element, body);
        evicted
    }

    fn remove(&mut self, element: &Element<K>) -> Option<Arc<Body<K>>> {
        self.remove_entry(element)
    }

    fn len(&self) -> usize {
        self.segments.iter().map(|segment| segment.entries.len()).sum()
    }

    fn set_close_policy(&mut self, policy: ClosePolicy<K>) {
        self.close_policy = policy;
    }
}

impl<K: ElementKind> fmt::Debug for ElementCache<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementCache")
            .field("segments", &self.stats())
            .field("load_factor", &self.load_factor)
            .finish()
    }
}
