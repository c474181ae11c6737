//! A handle-based framework for building source-code models.
//!
//! Clients navigate a model through cheap, immutable [`Element`] handles.
//! The state of an element lives in a [`Body`] that the [`ElementManager`]
//! builds on demand (the open protocol), caches within memory limits and
//! discards again under pressure. Changes are described as [`ElementDelta`]
//! trees and broadcast to listeners. Source files can be turned into
//! working copies whose structure follows an in-memory [`Buffer`].
//!
//! A concrete model implements [`Model`] for its own [`ElementKind`].

mod body;
mod buffer;
mod cache;
mod cancel;
mod context;
mod delta;
mod delta_builder;
mod element;
mod error;
mod manager;
mod model;
mod notification;
mod open;
mod property;
mod reconcile;
mod recorder;
mod source;
mod working_copy;

pub use body::Body;
pub use buffer::{Buffer, BufferChange, Snapshot, TextBuffer};
pub use cache::{
    memory_ratio, BodyCache, CacheLimits, ClosePolicy, ElementCache, Evicted, SegmentStats,
};
pub use cancel::{check_cancelled, CancellationToken};
pub use context::{Context, FORCE_OPEN, SOURCE_CONTENTS, SOURCE_SNAPSHOT};
pub use delta::{DeltaFlags, DeltaKind, ElementDelta, ResourceDelta, ResourceDeltaKind};
pub use delta_builder::ElementDeltaBuilder;
pub use element::{Ancestors, Element, ElementCategory, ElementKind};
pub use error::{Error, Result};
pub use manager::{ElementManager, ManagerOptions, TemporaryCache, DEFAULT_INIT_POLL_INTERVAL};
pub use model::{CloseHint, Model};
pub use notification::{
    ElementChangeEvent, ElementChangeListener, EventKind, EventMask, NotificationManager,
};
pub use property::{Property, PropertyMap, PropertyValue};
pub use reconcile::{NotifyingReconcileStrategy, ReconcileStrategy};
pub use recorder::ElementChangeRecorder;
pub use source::{default_content_change, IDENTIFYING_RANGE, SNAPSHOT, TEXT_RANGE};
pub use text_size::{TextRange, TextSize};
pub use working_copy::{DefaultWorkingCopyCallback, WorkingCopyCallback, WorkingCopyInfo};
