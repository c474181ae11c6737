use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use arc_swap::ArcSwap;
use bitflags::bitflags;
use parking_lot::Mutex;

use crate::delta::ElementDelta;
use crate::element::ElementKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A change to the published element state.
    PostChange,
    /// A working copy was reconciled with its buffer.
    PostReconcile,
}

bitflags! {
    /// The event kinds a listener subscribes to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventMask: u32 {
        const POST_CHANGE = 1 << 0;
        const POST_RECONCILE = 1 << 1;
    }
}

impl EventKind {
    pub fn mask(self) -> EventMask {
        match self {
            EventKind::PostChange => EventMask::POST_CHANGE,
            EventKind::PostReconcile => EventMask::POST_RECONCILE,
        }
    }
}

/// A batch of top-level deltas of one kind.
#[derive(Debug, Clone)]
pub struct ElementChangeEvent<K: ElementKind> {
    kind: EventKind,
    deltas: Vec<ElementDelta<K>>,
}

impl<K: ElementKind> ElementChangeEvent<K> {
    /// # Panics
    ///
    /// If `deltas` is empty.
    pub fn new(kind: EventKind, deltas: Vec<ElementDelta<K>>) -> Self {
        assert!(!deltas.is_empty(), "element change event without deltas");
        Self { kind, deltas }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn deltas(&self) -> &[ElementDelta<K>] {
        &self.deltas
    }

    /// The first delta; events always carry at least one.
    pub fn delta(&self) -> &ElementDelta<K> {
        &self.deltas[0]
    }
}

pub trait ElementChangeListener<K: ElementKind>: Send + Sync {
    fn element_changed(&self, event: &ElementChangeEvent<K>);
}

impl<K, F> ElementChangeListener<K> for F
where
    K: ElementKind,
    F: Fn(&ElementChangeEvent<K>) + Send + Sync,
{
    fn element_changed(&self, event: &ElementChangeEvent<K>) {
        self(event)
    }
}

struct ListenerEntry<K: ElementKind> {
    listener: Arc<dyn ElementChangeListener<K>>,
    mask: EventMask,
}

impl<K: ElementKind> Clone for ListenerEntry<K> {
    fn clone(&self) -> Self {
        Self {
            listener: Arc::clone(&self.listener),
            mask: self.mask,
        }
    }
}

fn same_listener<K: ElementKind>(
    a: &Arc<dyn ElementChangeListener<K>>,
    b: &Arc<dyn ElementChangeListener<K>>,
) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Delivers element change events to registered listeners.
///
/// The listener list is copy-on-write: firing iterates a snapshot and never
/// blocks registration, so listeners may add or remove listeners (including
/// themselves) while being notified. Listeners run synchronously on the
/// firing thread; a panicking listener is logged and does not prevent
/// delivery to the others.
pub struct NotificationManager<K: ElementKind> {
    listeners: ArcSwap<Vec<ListenerEntry<K>>>,
    write_lock: Mutex<()>,
}

impl<K: ElementKind> NotificationManager<K> {
    pub fn new() -> Self {
        Self {
            listeners: ArcSwap::from_pointee(Vec::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Subscribes `listener` to post-change events.
    pub fn add_listener(&self, listener: Arc<dyn ElementChangeListener<K>>) {
        self.add_listener_with_mask(listener, EventMask::POST_CHANGE);
    }

    /// Subscribes `listener` to the given event kinds. Adding a listener
    /// that is already registered replaces its mask.
    pub fn add_listener_with_mask(&self, listener: Arc<dyn ElementChangeListener<K>>, mask: EventMask) {
        let _guard = self.write_lock.lock();
        let mut entries = Vec::clone(&self.listeners.load());
        match entries
            .iter_mut()
            .find(|entry| same_listener(&entry.listener, &listener))
        {
            Some(entry) => entry.mask = mask,
            None => entries.push(ListenerEntry { listener, mask }),
        }
        self.listeners.store(Arc::new(entries));
    }

    pub fn remove_listener(&self, listener: &Arc<dyn ElementChangeListener<K>>) -> bool {
        let _guard = self.write_lock.lock();
        let mut entries = Vec::clone(&self.listeners.load());
        let before = entries.len();
        entries.retain(|entry| !same_listener(&entry.listener, listener));
        let removed = entries.len() != before;
        if removed {
            self.listeners.store(Arc::new(entries));
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.listeners.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers `event` to every listener subscribed to its kind.
    pub fn fire(&self, event: &ElementChangeEvent<K>) {
        let entries = self.listeners.load_full();
        let mask = event.kind().mask();
        for entry in entries.iter().filter(|entry| entry.mask.intersects(mask)) {
            let delivered = catch_unwind(AssertUnwindSafe(|| entry.listener.element_changed(event)));
            if let Err(payload) = delivered {
                tracing::error!(
                    target: "handly.notify",
                    kind = ?event.kind(),
                    panic = %panic_message(payload.as_ref()),
                    "element change listener panicked"
                );
            }
        }
    }
}

impl<K: ElementKind> Default for NotificationManager<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ElementKind> fmt::Debug for NotificationManager<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationManager")
            .field("listeners", &self.len())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}
