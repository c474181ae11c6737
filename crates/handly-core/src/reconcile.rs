use std::sync::Arc;

use crate::buffer::Snapshot;
use crate::cancel::{check_cancelled, CancellationToken};
use crate::context::{Context, FORCE_OPEN, SOURCE_CONTENTS, SOURCE_SNAPSHOT};
use crate::element::Element;
use crate::error::{Error, Result};
use crate::manager::ElementManager;
use crate::model::Model;
use crate::notification::{ElementChangeEvent, EventKind};
use crate::recorder::ElementChangeRecorder;
use crate::working_copy::WorkingCopyInfo;

/// How a working copy's structure is brought in line with its buffer.
pub trait ReconcileStrategy<M: Model>: Send + Sync {
    /// Rebuilds `element` from the buffer contents in `context` (which holds
    /// [`SOURCE_CONTENTS`] and [`SOURCE_SNAPSHOT`]). Must call
    /// [`WorkingCopyInfo::mark_created`] once the structure is published.
    ///
    /// The returned event is fired by the manager once the reconcile lock
    /// is released, so listeners may reconcile the same working copy.
    fn reconcile(
        &self,
        manager: &ElementManager<M>,
        element: &Element<M::Kind>,
        info: &WorkingCopyInfo<M>,
        context: &Context,
        cancel: &CancellationToken,
    ) -> Result<Option<ElementChangeEvent<M::Kind>>>;
}

/// Force-opens the working copy and, if it was already open, reports a
/// post-reconcile event describing what changed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotifyingReconcileStrategy;

impl<M: Model> ReconcileStrategy<M> for NotifyingReconcileStrategy {
    fn reconcile(
        &self,
        manager: &ElementManager<M>,
        element: &Element<M::Kind>,
        info: &WorkingCopyInfo<M>,
        context: &Context,
        cancel: &CancellationToken,
    ) -> Result<Option<ElementChangeEvent<M::Kind>>> {
        let mut recorder = ElementChangeRecorder::new(manager);
        let was_open = manager.is_open(element);
        if was_open {
            recorder.begin_recording(element, None, usize::MAX);
        }

        manager.open(element, &context.clone().with(FORCE_OPEN, true), cancel)?;
        info.mark_created();

        if !was_open {
            return Ok(None);
        }
        let delta = recorder.end_recording().build();
        if delta.is_empty() {
            tracing::trace!(target: "handly.working_copy", element = %element, "reconciled without changes");
            return Ok(None);
        }
        Ok(Some(ElementChangeEvent::new(EventKind::PostReconcile, vec![delta])))
    }
}

impl<M: Model> ElementManager<M> {
    /// Reconciles the working copy `element` with its buffer.
    ///
    /// Does nothing if the buffer has not changed since the last reconcile,
    /// unless `force` is set.
    pub fn reconcile(
        &self,
        element: &Element<M::Kind>,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let info = self
            .peek_at_working_copy_info(element)
            .ok_or_else(|| Error::NotWorkingCopy {
                element: element.to_string(),
            })?;
        self.reconcile_working_copy(element, &info, force, cancel)
    }

    /// Reconciles using an info the caller already holds. Reconciles of one
    /// working copy are serialized; the resulting event is fired after the
    /// reconcile lock is released.
    pub fn reconcile_working_copy(
        &self,
        element: &Element<M::Kind>,
        info: &WorkingCopyInfo<M>,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        check_cancelled(cancel)?;
        let buffer = info.buffer().ok_or_else(|| Error::NotWorkingCopy {
            element: element.to_string(),
        })?;

        let event = {
            let mut last_reconciled = info.last_reconciled.lock();
            let snapshot = buffer.snapshot();
            if !force && last_reconciled.as_ref() == Some(&snapshot) {
                return Ok(());
            }
            let event = self.reconcile_locked(element, info, &snapshot, force, cancel)?;
            *last_reconciled = Some(snapshot);
            event
        };

        if let Some(event) = event {
            self.notifications().fire(&event);
        }
        Ok(())
    }

    fn reconcile_locked(
        &self,
        element: &Element<M::Kind>,
        info: &WorkingCopyInfo<M>,
        snapshot: &Snapshot,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<Option<ElementChangeEvent<M::Kind>>> {
        let context = Context::new()
            .with(SOURCE_CONTENTS, Arc::clone(snapshot.contents()))
            .with(SOURCE_SNAPSHOT, snapshot.clone());
        tracing::debug!(
            target: "handly.working_copy",
            element = %element,
            stamp = snapshot.stamp(),
            force,
            "reconciling"
        );
        info.strategy().reconcile(self, element, info, &context, cancel)
    }
}
