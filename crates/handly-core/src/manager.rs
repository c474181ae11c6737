use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::body::Body;
use crate::cache::{BodyCache, CacheLimits, ElementCache, Evicted};
use crate::element::{Element, ElementKind};
use crate::model::{CloseHint, Model};
use crate::notification::NotificationManager;
use crate::working_copy::WorkingCopyRegistry;

/// Default interval at which a thread waiting for another thread's
/// working-copy initialization re-checks its cancellation token.
pub const DEFAULT_INIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct ManagerOptions {
    pub cache_limits: CacheLimits,
    pub init_poll_interval: Duration,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            cache_limits: CacheLimits::default(),
            init_poll_interval: DEFAULT_INIT_POLL_INTERVAL,
        }
    }
}

/// Bodies built by one open operation, not yet published.
///
/// Frames nest: opening an element pushes a frame, the structure builder
/// inserts into the top frame, and lookups see every frame so a builder can
/// find bodies its ancestors' builders produced earlier in the same
/// operation.
pub struct TemporaryCache<K: ElementKind> {
    frames: Vec<HashMap<Element<K>, Arc<Body<K>>>>,
}

impl<K: ElementKind> TemporaryCache<K> {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    /// Adds a body to the top frame and returns the shared handle to it.
    pub fn insert(&mut self, element: Element<K>, body: Body<K>) -> Arc<Body<K>> {
        let body = Arc::new(body);
        if self.frames.is_empty() {
            self.frames.push(HashMap::new());
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(element, Arc::clone(&body));
        }
        body
    }

    pub fn get(&self, element: &Element<K>) -> Option<&Arc<Body<K>>> {
        self.frames.iter().rev().find_map(|frame| frame.get(element))
    }

    pub fn contains(&self, element: &Element<K>) -> bool {
        self.get(element).is_some()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn push(&mut self) {
        self.frames.push(HashMap::new());
    }

    pub(crate) fn pop(&mut self) -> HashMap<Element<K>, Arc<Body<K>>> {
        self.frames.pop().unwrap_or_default()
    }
}

impl<K: ElementKind> Default for TemporaryCache<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ElementKind> fmt::Debug for TemporaryCache<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemporaryCache")
            .field("frames", &self.frames.len())
            .field("bodies", &self.frames.iter().map(HashMap::len).sum::<usize>())
            .finish()
    }
}

/// Central owner of element state for one model.
///
/// Holds the body cache, the working-copy registry and the listener list.
/// All methods take `&self`; the manager is meant to be shared across
/// threads behind an `Arc`.
///
/// Lock order: the cache lock may be held while the working-copy registry
/// is consulted, never the other way round. Model hooks and listeners are
/// always invoked with no lock held.
pub struct ElementManager<M: Model> {
    pub(crate) model: Arc<M>,
    cache: Mutex<Box<dyn BodyCache<M::Kind>>>,
    pub(crate) working_copies: WorkingCopyRegistry<M>,
    pub(crate) notifications: NotificationManager<M::Kind>,
    pub(crate) init_poll_interval: Duration,
}

impl<M: Model> ElementManager<M> {
    pub fn new(model: M) -> Self {
        Self::with_options(model, ManagerOptions::default())
    }

    pub fn with_options(model: M, options: ManagerOptions) -> Self {
        let cache: Box<dyn BodyCache<M::Kind>> = Box::new(ElementCache::new(options.cache_limits));
        Self::with_cache(model, cache, options.init_poll_interval)
    }

    /// Uses a caller-supplied cache implementation. The manager installs its
    /// close policy on it.
    pub fn with_cache(
        model: M,
        mut cache: Box<dyn BodyCache<M::Kind>>,
        init_poll_interval: Duration,
    ) -> Self {
        let model = Arc::new(model);
        let working_copies = WorkingCopyRegistry::<M>::default();

        let policy_model = Arc::clone(&model);
        let policy_registry = Arc::clone(&working_copies);
        cache.set_close_policy(Arc::new(move |element| {
            !policy_registry.lock().contains_key(element) && policy_model.can_close(element)
        }));

        Self {
            model,
            cache: Mutex::new(cache),
            working_copies,
            notifications: NotificationManager::new(),
            init_poll_interval,
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn notifications(&self) -> &NotificationManager<M::Kind> {
        &self.notifications
    }

    /// Cached body, refreshing its recency.
    pub fn get(&self, element: &Element<M::Kind>) -> Option<Arc<Body<M::Kind>>> {
        self.cache.lock().get(element)
    }

    /// Cached body, without touching recency.
    pub fn peek(&self, element: &Element<M::Kind>) -> Option<Arc<Body<M::Kind>>> {
        self.cache.lock().peek(element)
    }

    /// Looks in the unpublished bodies of `scope` first, then the cache.
    pub fn get_in(
        &self,
        element: &Element<M::Kind>,
        scope: &TemporaryCache<M::Kind>,
    ) -> Option<Arc<Body<M::Kind>>> {
        match scope.get(element) {
            Some(body) => Some(Arc::clone(body)),
            None => self.get(element),
        }
    }

    pub fn peek_in(
        &self,
        element: &Element<M::Kind>,
        scope: &TemporaryCache<M::Kind>,
    ) -> Option<Arc<Body<M::Kind>>> {
        match scope.get(element) {
            Some(body) => Some(Arc::clone(body)),
            None => self.peek(element),
        }
    }

    pub fn is_open(&self, element: &Element<M::Kind>) -> bool {
        self.peek(element).is_some()
    }

    /// Caches a single body. Bodies evicted to make room are closed.
    pub fn put(&self, element: Element<M::Kind>, body: Arc<Body<M::Kind>>) {
        let evicted = self.cache.lock().put(element, body);
        self.finish_evictions(evicted);
    }

    /// Drops a cached body without running any hooks.
    pub fn remove(&self, element: &Element<M::Kind>) -> Option<Arc<Body<M::Kind>>> {
        self.cache.lock().remove(element)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Publishes the bodies built for `element`, replacing whatever is cached.
    ///
    /// Descendants cached under the previous body that the new build did not
    /// produce are removed. Working copies are left alone.
    pub(crate) fn put_all(
        &self,
        element: &Element<M::Kind>,
        mut new_bodies: HashMap<Element<M::Kind>, Arc<Body<M::Kind>>>,
    ) {
        let mut stale = Vec::new();
        let mut evicted = Vec::new();
        {
            let mut cache = self.cache.lock();
            if let Some(old_body) = cache.peek(element) {
                let mut seen = HashSet::new();
                self.collect_stale(&**cache, &old_body, &new_bodies, &mut seen, &mut stale);
                for (child, _) in &stale {
                    cache.remove(child);
                }
            }
            if let Some(body) = new_bodies.remove(element) {
                evicted.extend(cache.put(element.clone(), body));
            }
            for (child, body) in new_bodies {
                evicted.extend(cache.put(child, body));
            }
        }
        for (child, body) in stale {
            self.model.removing(&child, &body, CloseHint::ParentClosing);
        }
        self.finish_evictions(evicted);
    }

    /// Publishes the bodies built for `element` unless another thread already
    /// published one, in which case the winner's body is returned and the new
    /// bodies are discarded.
    pub(crate) fn put_all_if_absent(
        &self,
        element: &Element<M::Kind>,
        mut new_bodies: HashMap<Element<M::Kind>, Arc<Body<M::Kind>>>,
    ) -> Option<Arc<Body<M::Kind>>> {
        let mut evicted = Vec::new();
        let body = {
            let mut cache = self.cache.lock();
            if let Some(existing) = cache.get(element) {
                return Some(existing);
            }
            let body = new_bodies.remove(element)?;
            evicted.extend(cache.put(element.clone(), Arc::clone(&body)));
            for (child, child_body) in new_bodies {
                if cache.peek(&child).is_none() {
                    evicted.extend(cache.put(child, child_body));
                }
            }
            body
        };
        self.finish_evictions(evicted);
        Some(body)
    }

    fn collect_stale(
        &self,
        cache: &dyn BodyCache<M::Kind>,
        body: &Body<M::Kind>,
        new_bodies: &HashMap<Element<M::Kind>, Arc<Body<M::Kind>>>,
        seen: &mut HashSet<Element<M::Kind>>,
        stale: &mut Vec<(Element<M::Kind>, Arc<Body<M::Kind>>)>,
    ) {
        for child in body.children().iter() {
            if !seen.insert(child.clone()) {
                continue;
            }
            let Some(child_body) = cache.peek(child) else {
                continue;
            };
            self.collect_stale(cache, &child_body, new_bodies, seen, stale);
            if !new_bodies.contains_key(child) && !self.working_copies.lock().contains_key(child) {
                stale.push((child.clone(), child_body));
            }
        }
    }

    pub(crate) fn finish_evictions(&self, evicted: Vec<Evicted<M::Kind>>) {
        if evicted.is_empty() {
            return;
        }
        tracing::debug!(
            target: "handly.manager",
            count = evicted.len(),
            "closing evicted elements"
        );
        for Evicted { element, body } in evicted {
            self.model.removing(&element, &body, CloseHint::CacheOverflow);
        }
    }
}

impl<M: Model> fmt::Debug for ElementManager<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementManager")
            .field("cached", &self.cache.lock().len())
            .field("working_copies", &self.working_copies.lock().len())
            .field("listeners", &self.notifications.len())
            .finish()
    }
}
