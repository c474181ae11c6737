//! Working copies: source files whose structure is built from an in-memory
//! buffer instead of the underlying store.
//!
//! A working copy is reference counted. The first thread to become a
//! working copy registers it and runs its initialization callback (which
//! must reconcile at least once); concurrent callers wait for that to finish
//! and share the result. The working copy is discarded when the last
//! reference is released.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::buffer::{Buffer, Snapshot};
use crate::cancel::{check_cancelled, CancellationToken};
use crate::delta::DeltaFlags;
use crate::delta_builder::ElementDeltaBuilder;
use crate::element::Element;
use crate::error::{Error, Result};
use crate::manager::ElementManager;
use crate::model::Model;
use crate::notification::{ElementChangeEvent, EventKind};
use crate::reconcile::{NotifyingReconcileStrategy, ReconcileStrategy};

pub(crate) type WorkingCopyRegistry<M> =
    Arc<Mutex<HashMap<Element<<M as Model>::Kind>, WorkingCopyEntry<M>>>>;

pub(crate) struct WorkingCopyEntry<M: Model> {
    info: Arc<WorkingCopyInfo<M>>,
    ref_count: usize,
}

/// Hooks run when a working copy is set up and torn down.
pub trait WorkingCopyCallback<M: Model>: Send + Sync {
    /// Runs exactly once, on the thread that registered the working copy.
    /// Must leave the working copy created, normally by reconciling it.
    fn on_init(
        &self,
        manager: &ElementManager<M>,
        element: &Element<M::Kind>,
        info: &WorkingCopyInfo<M>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        manager.reconcile_working_copy(element, info, true, cancel)
    }

    /// Runs when the last reference is released, if `on_init` ran.
    fn on_dispose(&self) {}
}

/// Callback with the default behavior: reconcile on init, nothing on
/// dispose.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultWorkingCopyCallback;

impl<M: Model> WorkingCopyCallback<M> for DefaultWorkingCopyCallback {}

/// State shared by every holder of one working copy.
pub struct WorkingCopyInfo<M: Model> {
    buffer: Mutex<Option<Arc<dyn Buffer>>>,
    callback: Arc<dyn WorkingCopyCallback<M>>,
    strategy: Arc<dyn ReconcileStrategy<M>>,
    init: InitTask,
    created: AtomicBool,
    disposed: AtomicBool,
    /// Last reconciled snapshot; also serializes reconciles.
    pub(crate) last_reconciled: Mutex<Option<Snapshot>>,
}

impl<M: Model> WorkingCopyInfo<M> {
    pub fn new(buffer: Arc<dyn Buffer>) -> Self {
        Self::with_callback(buffer, Arc::new(DefaultWorkingCopyCallback))
    }

    pub fn with_callback(buffer: Arc<dyn Buffer>, callback: Arc<dyn WorkingCopyCallback<M>>) -> Self {
        Self {
            buffer: Mutex::new(Some(buffer)),
            callback,
            strategy: Arc::new(NotifyingReconcileStrategy),
            init: InitTask::new(),
            created: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            last_reconciled: Mutex::new(None),
        }
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn ReconcileStrategy<M>>) -> Self {
        self.strategy = strategy;
        self
    }

    /// The buffer, until the working copy is disposed.
    pub fn buffer(&self) -> Option<Arc<dyn Buffer>> {
        self.buffer.lock().clone()
    }

    pub fn strategy(&self) -> &Arc<dyn ReconcileStrategy<M>> {
        &self.strategy
    }

    /// Whether the initial structure has been built from the buffer.
    pub fn is_created(&self) -> bool {
        self.created.load(Ordering::Acquire)
    }

    /// Reconcile strategies call this once they have published the
    /// structure built from the buffer.
    pub fn mark_created(&self) {
        self.created.store(true, Ordering::Release);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn dispose(&self) {
        if self.init.has_started() {
            self.callback.on_dispose();
        }
        self.buffer.lock().take();
        self.disposed.store(true, Ordering::Release);
    }
}

impl<M: Model> fmt::Debug for WorkingCopyInfo<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkingCopyInfo")
            .field("created", &self.is_created())
            .field("disposed", &self.is_disposed())
            .field(
                "last_reconciled",
                &self.last_reconciled.try_lock().map(|snapshot| snapshot.clone()),
            )
            .finish()
    }
}

#[derive(Debug, Clone)]
enum InitState {
    Pending,
    Running,
    Done(std::result::Result<(), String>),
}

/// One-shot initialization others can wait on.
struct InitTask {
    state: Mutex<InitState>,
    done: Condvar,
}

/// Marks the task failed if initialization unwinds.
struct InitGuard<'a> {
    task: &'a InitTask,
    armed: bool,
}

impl Drop for InitGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.task
                .finish(Err("working copy initialization panicked".to_string()));
        }
    }
}

impl InitTask {
    fn new() -> Self {
        Self {
            state: Mutex::new(InitState::Pending),
            done: Condvar::new(),
        }
    }

    fn has_started(&self) -> bool {
        !matches!(*self.state.lock(), InitState::Pending)
    }

    fn run(&self, init: impl FnOnce() -> Result<()>) -> Result<()> {
        *self.state.lock() = InitState::Running;
        let mut guard = InitGuard {
            task: self,
            armed: true,
        };
        let result = init();
        guard.armed = false;
        self.finish(result.as_ref().map(|_| ()).map_err(ToString::to_string));
        result
    }

    fn finish(&self, outcome: std::result::Result<(), String>) {
        *self.state.lock() = InitState::Done(outcome);
        self.done.notify_all();
    }

    /// The outcome, if initialization finishes within `timeout`.
    fn wait_timeout(&self, timeout: Duration) -> Option<std::result::Result<(), String>> {
        let mut state = self.state.lock();
        if let InitState::Done(outcome) = &*state {
            return Some(outcome.clone());
        }
        self.done.wait_for(&mut state, timeout);
        match &*state {
            InitState::Done(outcome) => Some(outcome.clone()),
            _ => None,
        }
    }
}

impl<M: Model> ElementManager<M> {
    /// Registers `info` for `element` if nothing is registered yet, with a
    /// reference count of one, and returns `None`. Otherwise increments the
    /// existing registration's count and returns it; `info` is dropped.
    pub fn put_working_copy_info_if_absent(
        &self,
        element: &Element<M::Kind>,
        info: Arc<WorkingCopyInfo<M>>,
    ) -> Option<Arc<WorkingCopyInfo<M>>> {
        let mut registry = self.working_copies.lock();
        match registry.get_mut(element) {
            Some(entry) => {
                entry.ref_count += 1;
                Some(Arc::clone(&entry.info))
            }
            None => {
                registry.insert(element.clone(), WorkingCopyEntry { info, ref_count: 1 });
                None
            }
        }
    }

    /// The registered info, incrementing its reference count.
    pub fn get_working_copy_info(&self, element: &Element<M::Kind>) -> Option<Arc<WorkingCopyInfo<M>>> {
        let mut registry = self.working_copies.lock();
        let entry = registry.get_mut(element)?;
        entry.ref_count += 1;
        Some(Arc::clone(&entry.info))
    }

    /// The registered info, leaving the reference count alone.
    pub fn peek_at_working_copy_info(
        &self,
        element: &Element<M::Kind>,
    ) -> Option<Arc<WorkingCopyInfo<M>>> {
        self.working_copies
            .lock()
            .get(element)
            .map(|entry| Arc::clone(&entry.info))
    }

    pub fn is_working_copy(&self, element: &Element<M::Kind>) -> bool {
        self.working_copies.lock().contains_key(element)
    }

    /// Elements currently registered as working copies.
    pub fn working_copies(&self) -> Vec<Element<M::Kind>> {
        self.working_copies.lock().keys().cloned().collect()
    }

    /// Decrements the reference count. When it reaches zero the registration
    /// is removed and the info disposed, after the registry lock is released.
    ///
    /// Returns the info, or `None` if `element` was not registered.
    pub fn release_working_copy_info(
        &self,
        element: &Element<M::Kind>,
    ) -> Option<Arc<WorkingCopyInfo<M>>> {
        let (info, last) = {
            let mut registry = self.working_copies.lock();
            let entry = registry.get_mut(element)?;
            entry.ref_count -= 1;
            if entry.ref_count == 0 {
                let entry = registry.remove(element)?;
                (entry.info, true)
            } else {
                (Arc::clone(&entry.info), false)
            }
        };
        if last {
            info.dispose();
            tracing::debug!(target: "handly.working_copy", element = %element, "working copy disposed");
        }
        Some(info)
    }

    /// Makes `element` a working copy backed by `buffer`, or joins the
    /// existing one. Every successful call must be balanced by
    /// [`ElementManager::release_working_copy`].
    pub fn become_working_copy(
        &self,
        element: &Element<M::Kind>,
        buffer: Arc<dyn Buffer>,
        cancel: &CancellationToken,
    ) -> Result<Arc<WorkingCopyInfo<M>>> {
        self.become_working_copy_with(element, WorkingCopyInfo::new(buffer), cancel)
    }

    /// Like [`ElementManager::become_working_copy`] with a custom callback
    /// or reconcile strategy. If a working copy already exists, `info` is
    /// discarded without being initialized.
    pub fn become_working_copy_with(
        &self,
        element: &Element<M::Kind>,
        info: WorkingCopyInfo<M>,
        cancel: &CancellationToken,
    ) -> Result<Arc<WorkingCopyInfo<M>>> {
        let info = Arc::new(info);
        if let Some(existing) = self.put_working_copy_info_if_absent(element, Arc::clone(&info)) {
            drop(info);
            if let Err(err) = self.wait_for_init(element, &existing, cancel) {
                self.discard_working_copy(element);
                return Err(err);
            }
            return Ok(existing);
        }

        tracing::debug!(target: "handly.working_copy", element = %element, "initializing working copy");
        let initialized = info.init.run(|| {
            info.callback.on_init(self, element, &info, cancel)?;
            assert!(
                info.is_created(),
                "working copy callback for {element} did not create the working copy"
            );
            Ok(())
        });
        if let Err(err) = initialized {
            self.discard_working_copy(element);
            return Err(err);
        }
        self.fire_working_copy_changed(element);
        Ok(info)
    }

    /// Joins the working copy registered for `element`, if any, waiting for
    /// its initialization. Balance a `Some` result with
    /// [`ElementManager::release_working_copy`].
    pub fn acquire_existing_working_copy(
        &self,
        element: &Element<M::Kind>,
        cancel: &CancellationToken,
    ) -> Result<Option<Arc<WorkingCopyInfo<M>>>> {
        let Some(info) = self.get_working_copy_info(element) else {
            return Ok(None);
        };
        if let Err(err) = self.wait_for_init(element, &info, cancel) {
            self.discard_working_copy(element);
            return Err(err);
        }
        Ok(Some(info))
    }

    /// Drops one reference. Releasing the last one disposes the working
    /// copy, closes the element so it is rebuilt from the store when next
    /// opened, and fires a `WORKING_COPY` change.
    pub fn release_working_copy(&self, element: &Element<M::Kind>) -> Result<()> {
        if self.discard_working_copy(element).is_none() {
            return Err(Error::NotWorkingCopy {
                element: element.to_string(),
            });
        }
        Ok(())
    }

    fn discard_working_copy(&self, element: &Element<M::Kind>) -> Option<Arc<WorkingCopyInfo<M>>> {
        let info = self.release_working_copy_info(element)?;
        if info.is_disposed() {
            self.close(element);
            if info.is_created() {
                self.fire_working_copy_changed(element);
            }
        }
        Some(info)
    }

    fn wait_for_init(
        &self,
        element: &Element<M::Kind>,
        info: &WorkingCopyInfo<M>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        loop {
            check_cancelled(cancel)?;
            match info.init.wait_timeout(self.init_poll_interval) {
                Some(Ok(())) => return Ok(()),
                Some(Err(message)) => {
                    return Err(Error::WorkingCopyInit {
                        element: element.to_string(),
                        message,
                    })
                }
                None => {}
            }
        }
    }

    fn fire_working_copy_changed(&self, element: &Element<M::Kind>) {
        let mut builder = ElementDeltaBuilder::new(element.root_element().clone());
        builder.changed(element, DeltaFlags::WORKING_COPY);
        self.notifications
            .fire(&ElementChangeEvent::new(EventKind::PostChange, vec![builder.build()]));
    }
}
