//! Translates resource changes into Foo element deltas.
//!
//! The host reports what changed in the store after the fact. The
//! processor updates the open part of the element tree to match and
//! describes the changes in one delta rooted at the model root.

use std::path::PathBuf;

use handly_core::{
    check_cancelled, CancellationToken, Context, DeltaFlags, ElementChangeEvent,
    ElementChangeRecorder, ElementDelta, ElementDeltaBuilder, ElementManager, EventKind,
    ResourceDelta, ResourceDeltaKind, Result, FORCE_OPEN,
};

use crate::store::SourceStore;
use crate::{foo_file, foo_model, foo_project, is_foo_file_name, FooElement, FooKind, FooModel};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceChange {
    ProjectAdded { project: String },
    ProjectRemoved { project: String },
    FileAdded { project: String, file: String },
    FileRemoved { project: String, file: String },
    FileChanged { project: String, file: String },
}

impl ResourceChange {
    /// Store-relative path of the changed resource.
    pub fn path(&self) -> PathBuf {
        match self {
            ResourceChange::ProjectAdded { project } | ResourceChange::ProjectRemoved { project } => {
                PathBuf::from(project)
            }
            ResourceChange::FileAdded { project, file }
            | ResourceChange::FileRemoved { project, file }
            | ResourceChange::FileChanged { project, file } => PathBuf::from(project).join(file),
        }
    }
}

pub struct FooDeltaProcessor<'m, S: SourceStore> {
    manager: &'m ElementManager<FooModel<S>>,
    builder: ElementDeltaBuilder<FooKind>,
}

impl<'m, S: SourceStore> FooDeltaProcessor<'m, S> {
    pub fn new(manager: &'m ElementManager<FooModel<S>>) -> Self {
        Self {
            manager,
            builder: ElementDeltaBuilder::new(foo_model()),
        }
    }

    pub fn process(&mut self, change: &ResourceChange, cancel: &CancellationToken) -> Result<()> {
        check_cancelled(cancel)?;
        tracing::trace!(target: "handly.foo", ?change, "processing resource change");
        match change {
            ResourceChange::ProjectAdded { project } => {
                let project = foo_project(project);
                self.add_to_parent(&project);
                self.builder.added(&project);
            }
            ResourceChange::ProjectRemoved { project } => {
                let project = foo_project(project);
                self.remove_from_model(&project);
                self.builder.removed(&project);
            }
            ResourceChange::FileAdded { project, file } if is_foo_file_name(file) => {
                let file = foo_file(project, file);
                self.add_to_parent(&file);
                self.builder.added(&file);
            }
            ResourceChange::FileRemoved { project, file } if is_foo_file_name(file) => {
                let file = foo_file(project, file);
                if self.manager.is_working_copy(&file) {
                    // The buffer still holds the contents.
                    self.builder.changed(&file, DeltaFlags::UNDERLYING_RESOURCE);
                } else {
                    self.remove_from_model(&file);
                    self.builder.removed(&file);
                }
            }
            ResourceChange::FileChanged { project, file } if is_foo_file_name(file) => {
                self.file_changed(&foo_file(project, file), cancel)?;
            }
            ResourceChange::FileAdded { project, .. } => {
                self.non_foo_resource(project, change.path(), ResourceDeltaKind::Added)
            }
            ResourceChange::FileRemoved { project, .. } => {
                self.non_foo_resource(project, change.path(), ResourceDeltaKind::Removed)
            }
            ResourceChange::FileChanged { project, .. } => {
                self.non_foo_resource(project, change.path(), ResourceDeltaKind::Changed)
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.builder.is_empty()
    }

    pub fn finish(self) -> ElementDelta<FooKind> {
        self.builder.build()
    }

    fn file_changed(&mut self, file: &FooElement, cancel: &CancellationToken) -> Result<()> {
        if self.manager.is_working_copy(file) {
            self.builder
                .changed(file, DeltaFlags::CONTENT | DeltaFlags::UNDERLYING_RESOURCE);
            return Ok(());
        }
        if !self.manager.is_open(file) {
            self.builder.changed(file, DeltaFlags::CONTENT);
            return Ok(());
        }

        let builder = std::mem::replace(&mut self.builder, ElementDeltaBuilder::new(foo_model()));
        let mut recorder = ElementChangeRecorder::new(self.manager);
        recorder.begin_recording(file, Some(builder), usize::MAX);
        let rebuilt = self
            .manager
            .open(file, &Context::new().with(FORCE_OPEN, true), cancel);
        self.builder = recorder.end_recording();

        if let Err(err) = rebuilt {
            if err.is_cancelled() {
                return Err(err);
            }
            tracing::debug!(
                target: "handly.foo",
                file = %file,
                error = %err,
                "rebuilding changed file failed; closing it"
            );
            self.manager.close(file);
            self.builder.changed(file, DeltaFlags::CONTENT);
        }
        Ok(())
    }

    fn non_foo_resource(&mut self, project: &str, path: PathBuf, kind: ResourceDeltaKind) {
        self.builder
            .add_resource_delta(&foo_project(project), ResourceDelta::new(path, kind));
    }

    fn add_to_parent(&self, element: &FooElement) {
        if let Some(body) = element.parent().and_then(|parent| self.manager.peek(parent)) {
            body.add_child(element.clone());
        }
    }

    fn remove_from_model(&self, element: &FooElement) {
        self.manager.close(element);
        if let Some(body) = element.parent().and_then(|parent| self.manager.peek(parent)) {
            body.remove_child(element);
        }
    }
}

/// Processes `changes` in order and fires a `POST_CHANGE` event with the
/// resulting delta. Returns `None`, and fires nothing, when no element was
/// affected.
pub fn process_resource_changes<S: SourceStore>(
    manager: &ElementManager<FooModel<S>>,
    changes: &[ResourceChange],
    cancel: &CancellationToken,
) -> Result<Option<ElementDelta<FooKind>>> {
    let mut processor = FooDeltaProcessor::new(manager);
    for change in changes {
        processor.process(change, cancel)?;
    }
    if processor.is_empty() {
        return Ok(None);
    }
    let delta = processor.finish();
    manager
        .notifications()
        .fire(&ElementChangeEvent::new(EventKind::PostChange, vec![delta.clone()]));
    Ok(Some(delta))
}
