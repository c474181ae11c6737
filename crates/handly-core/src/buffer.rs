use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use text_size::{TextRange, TextSize};

use crate::error::{Error, Result};

static NEXT_STAMP: AtomicU64 = AtomicU64::new(1);

/// An immutable view of a buffer's contents at one point in time.
///
/// Snapshots compare by stamp: two snapshots are equal iff they were taken
/// from the same buffer state, regardless of textual equality.
#[derive(Clone)]
pub struct Snapshot {
    contents: Arc<str>,
    stamp: u64,
}

impl Snapshot {
    pub fn new(contents: impl Into<Arc<str>>) -> Self {
        Self {
            contents: contents.into(),
            stamp: NEXT_STAMP.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn contents(&self) -> &Arc<str> {
        &self.contents
    }

    pub fn stamp(&self) -> u64 {
        self.stamp
    }

    pub fn len(&self) -> TextSize {
        TextSize::of(&*self.contents)
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.stamp == other.stamp
    }
}

impl Eq for Snapshot {}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("stamp", &self.stamp)
            .field("len", &self.contents.len())
            .finish()
    }
}

/// A replacement of a byte range. `range: None` replaces the whole buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferChange {
    pub range: Option<TextRange>,
    pub text: String,
}

impl BufferChange {
    pub fn full(text: impl Into<String>) -> Self {
        Self {
            range: None,
            text: text.into(),
        }
    }

    pub fn replace(range: TextRange, text: impl Into<String>) -> Self {
        Self {
            range: Some(range),
            text: text.into(),
        }
    }
}

/// Text storage backing a working copy.
///
/// Buffers are shared as `Arc<dyn Buffer>`; the working copy that owns one
/// keeps it alive until it is discarded.
pub trait Buffer: Send + Sync {
    fn snapshot(&self) -> Snapshot;

    /// Applies `change`. When `base` is given it must still be the current
    /// snapshot, otherwise the change is rejected as stale.
    fn apply_change(&self, change: &BufferChange, base: Option<&Snapshot>) -> Result<Snapshot>;
}

/// In-memory [`Buffer`].
pub struct TextBuffer {
    label: String,
    current: RwLock<Snapshot>,
}

impl TextBuffer {
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self::named("<buffer>", text)
    }

    /// A buffer whose stale-snapshot errors mention `label`.
    pub fn named(label: impl Into<String>, text: impl Into<Arc<str>>) -> Self {
        Self {
            label: label.into(),
            current: RwLock::new(Snapshot::new(text)),
        }
    }

    pub fn text(&self) -> Arc<str> {
        Arc::clone(self.current.read().contents())
    }
}

impl Buffer for TextBuffer {
    fn snapshot(&self) -> Snapshot {
        self.current.read().clone()
    }

    fn apply_change(&self, change: &BufferChange, base: Option<&Snapshot>) -> Result<Snapshot> {
        let mut current = self.current.write();
        if let Some(base) = base {
            if *base != *current {
                return Err(Error::StaleSnapshot {
                    element: self.label.clone(),
                });
            }
        }

        let text = current.contents();
        let updated = match change.range {
            None => change.text.clone(),
            Some(range) => {
                let (start, end) = (usize::from(range.start()), usize::from(range.end()));
                if end > text.len() || !text.is_char_boundary(start) || !text.is_char_boundary(end)
                {
                    return Err(Error::model(format!(
                        "invalid range {range:?} for {} (length {})",
                        self.label,
                        text.len()
                    )));
                }
                let mut updated = String::with_capacity(text.len() + change.text.len());
                updated.push_str(&text[..start]);
                updated.push_str(&change.text);
                updated.push_str(&text[end..]);
                updated
            }
        };

        *current = Snapshot::new(updated);
        Ok(current.clone())
    }
}

impl fmt::Debug for TextBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextBuffer")
            .field("label", &self.label)
            .field("snapshot", &*self.current.read())
            .finish()
    }
}
