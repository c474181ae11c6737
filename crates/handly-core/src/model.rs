use crate::body::Body;
use crate::cancel::CancellationToken;
use crate::context::Context;
use crate::delta_builder::ElementDeltaBuilder;
use crate::element::{Element, ElementCategory, ElementKind};
use crate::error::Result;
use crate::manager::TemporaryCache;
use crate::source;

/// Why an element is being closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseHint {
    /// Someone asked for this element to be closed.
    Explicit,
    /// An ancestor is being closed, or rebuilt without this element.
    ParentClosing,
    /// The body cache evicted the element to stay within its space limit.
    CacheOverflow,
}

/// Model-specific behavior plugged into an [`crate::ElementManager`].
///
/// The manager owns the generic protocols (open, close, caching, working
/// copies, delta computation); a model only says how to tell whether an
/// element exists and how to build its structure.
pub trait Model: Send + Sync + 'static {
    type Kind: ElementKind;

    /// Whether the element builds its own body. Source constructs are built
    /// together with their enclosing source file.
    fn is_openable(&self, element: &Element<Self::Kind>) -> bool {
        element.category() != ElementCategory::SourceConstruct
    }

    /// Fails with [`crate::Error::DoesNotExist`] if `element` cannot be
    /// opened. Only called for openable elements that are not working
    /// copies, after the parent has been opened.
    fn validate_existence(&self, element: &Element<Self::Kind>, context: &Context) -> Result<()>;

    /// Builds the body of `element`, and of any non-openable descendants,
    /// into the top frame of `new_bodies`. Must insert a body for `element`
    /// itself unless it fails.
    fn build_structure(
        &self,
        element: &Element<Self::Kind>,
        context: &Context,
        new_bodies: &mut TemporaryCache<Self::Kind>,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Records into `builder` how the content of `element` changed between
    /// two bodies. Children are compared separately.
    fn find_content_change(
        &self,
        element: &Element<Self::Kind>,
        old_body: &Body<Self::Kind>,
        new_body: &Body<Self::Kind>,
        builder: &mut ElementDeltaBuilder<Self::Kind>,
    ) {
        source::default_content_change(element, old_body, new_body, builder);
    }

    /// Called just before the body of `element` leaves the cache.
    fn removing(&self, _element: &Element<Self::Kind>, _body: &Body<Self::Kind>, _hint: CloseHint) {}

    /// Whether the cache may evict `element`. Working copies are never
    /// evicted regardless of this answer.
    fn can_close(&self, _element: &Element<Self::Kind>) -> bool {
        true
    }
}
