//! Properties and queries specific to source files and constructs.

use text_size::{TextRange, TextSize};

use crate::body::Body;
use crate::buffer::Snapshot;
use crate::delta::DeltaFlags;
use crate::delta_builder::ElementDeltaBuilder;
use crate::element::{Element, ElementKind};
use crate::error::{Error, Result};
use crate::manager::ElementManager;
use crate::model::Model;
use crate::property::Property;

/// Full text range of a source file or construct.
pub const TEXT_RANGE: Property<TextRange> = Property::new("handly.text_range");

/// Range of the construct's identifying token (usually its name).
pub const IDENTIFYING_RANGE: Property<TextRange> = Property::new("handly.identifying_range");

/// Snapshot a source file body was built from.
pub const SNAPSHOT: Property<Snapshot> = Property::new("handly.snapshot");

/// Properties that shift with unrelated edits and do not count as a content
/// change.
const POSITIONAL: [&str; 3] = [TEXT_RANGE.name(), IDENTIFYING_RANGE.name(), SNAPSHOT.name()];

/// Flags `element` with `CONTENT` if any non-positional property differs
/// between the two bodies.
pub fn default_content_change<K: ElementKind>(
    element: &Element<K>,
    old_body: &Body<K>,
    new_body: &Body<K>,
    builder: &mut ElementDeltaBuilder<K>,
) {
    let changed = old_body
        .properties()
        .changed_properties(new_body.properties())
        .into_iter()
        .any(|name| !POSITIONAL.contains(&name));
    if changed {
        builder.changed(element, DeltaFlags::CONTENT);
    }
}

impl<M: Model> ElementManager<M> {
    /// The innermost element of `file` whose text range contains `offset`.
    ///
    /// Returns the file itself if no construct contains the offset, and
    /// `None` if the offset is outside the file. If `base` is given it must
    /// be the snapshot the file's current structure was built from.
    pub fn source_element_at(
        &self,
        file: &Element<M::Kind>,
        offset: TextSize,
        base: Option<&Snapshot>,
    ) -> Result<Option<Element<M::Kind>>> {
        let body = self.body(file)?;
        if let Some(base) = base {
            if body.get(SNAPSHOT) != Some(base) {
                return Err(Error::StaleSnapshot {
                    element: file.to_string(),
                });
            }
        }
        if let Some(range) = body.get(TEXT_RANGE) {
            if !range.contains_inclusive(offset) {
                return Ok(None);
            }
        }

        let mut current = file.clone();
        let mut children = body.children();
        'descend: loop {
            for child in children.iter() {
                let child_body = self.body(child)?;
                let contains = child_body
                    .get(TEXT_RANGE)
                    .is_some_and(|range| range.contains_inclusive(offset));
                if contains {
                    current = child.clone();
                    children = child_body.children();
                    continue 'descend;
                }
            }
            return Ok(Some(current));
        }
    }
}
