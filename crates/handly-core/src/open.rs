//! The open/close protocol.

use std::sync::Arc;

use crate::body::Body;
use crate::cancel::{check_cancelled, CancellationToken};
use crate::context::{Context, SOURCE_CONTENTS, SOURCE_SNAPSHOT};
use crate::element::Element;
use crate::error::{Error, Result};
use crate::manager::{ElementManager, TemporaryCache};
use crate::model::{CloseHint, Model};

impl<M: Model> ElementManager<M> {
    /// Returns the body of `element`, building and caching it (and any
    /// unopened ancestors) if necessary.
    ///
    /// With [`crate::FORCE_OPEN`] in `context` the structure is rebuilt and
    /// published even if a body is cached. Otherwise, if another thread
    /// publishes first, its body wins and is returned.
    pub fn open(
        &self,
        element: &Element<M::Kind>,
        context: &Context,
        cancel: &CancellationToken,
    ) -> Result<Arc<Body<M::Kind>>> {
        let mut scope = TemporaryCache::new();
        self.open_in(element, context, &mut scope, cancel)
    }

    /// Like [`ElementManager::open`], seeing bodies already built (but not
    /// yet published) in `scope`.
    pub fn open_in(
        &self,
        element: &Element<M::Kind>,
        context: &Context,
        scope: &mut TemporaryCache<M::Kind>,
        cancel: &CancellationToken,
    ) -> Result<Arc<Body<M::Kind>>> {
        check_cancelled(cancel)?;
        let force = context.is_force_open();
        if !force {
            if let Some(body) = self.get_in(element, scope) {
                return Ok(body);
            }
        }

        let working_copy = self
            .peek_at_working_copy_info(element)
            .and_then(|info| info.buffer());
        if working_copy.is_none() {
            self.open_parent(element, scope, cancel)?;
        }

        if !self.model.is_openable(element) {
            return self
                .get_in(element, scope)
                .ok_or_else(|| Error::does_not_exist(element));
        }

        let context = match &working_copy {
            Some(buffer) if !context.contains(SOURCE_CONTENTS) => {
                let snapshot = buffer.snapshot();
                context
                    .clone()
                    .with(SOURCE_CONTENTS, Arc::clone(snapshot.contents()))
                    .with(SOURCE_SNAPSHOT, snapshot)
            }
            _ => context.clone(),
        };
        if working_copy.is_none() {
            self.model.validate_existence(element, &context)?;
        }

        tracing::trace!(target: "handly.manager", element = %element, force, "building structure");
        scope.push();
        let built = self.model.build_structure(element, &context, scope, cancel);
        let new_bodies = scope.pop();
        built?;

        let Some(body) = new_bodies.get(element).cloned() else {
            panic!("structure builder did not create a body for {element}");
        };

        if force {
            self.put_all(element, new_bodies);
            Ok(body)
        } else {
            Ok(self.put_all_if_absent(element, new_bodies).unwrap_or(body))
        }
    }

    fn open_parent(
        &self,
        element: &Element<M::Kind>,
        scope: &mut TemporaryCache<M::Kind>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let Some(parent) = element.parent() else {
            return Ok(());
        };
        if self.peek_in(parent, scope).is_some() {
            return Ok(());
        }
        self.open_in(parent, &Context::new(), scope, cancel)
            .map(drop)
    }

    /// Body of `element`, opening it with a default context if needed.
    pub fn body(&self, element: &Element<M::Kind>) -> Result<Arc<Body<M::Kind>>> {
        match self.get(element) {
            Some(body) => Ok(body),
            None => self.open(element, &Context::new(), &CancellationToken::new()),
        }
    }

    pub fn children(&self, element: &Element<M::Kind>) -> Result<Arc<[Element<M::Kind>]>> {
        Ok(self.body(element)?.children())
    }

    /// Whether `element` exists. Open elements trivially do; openable ones
    /// are asked to validate themselves; constructs are looked up in their
    /// (possibly freshly opened) enclosing structure.
    pub fn exists(&self, element: &Element<M::Kind>) -> bool {
        if self.peek(element).is_some() {
            return true;
        }
        if self.model.is_openable(element) {
            if let Some(parent) = element.parent() {
                if !self.exists(parent) {
                    return false;
                }
            }
            return self.model.validate_existence(element, &Context::new()).is_ok();
        }
        self.body(element).is_ok()
    }

    /// Closes `element` and its cached descendants.
    ///
    /// Working copies refuse to close; releasing the working copy closes it.
    pub fn close(&self, element: &Element<M::Kind>) {
        self.close_with_hint(element, CloseHint::Explicit);
    }

    pub(crate) fn close_with_hint(&self, element: &Element<M::Kind>, hint: CloseHint) {
        if self.is_working_copy(element) {
            tracing::trace!(target: "handly.manager", element = %element, "working copy stays open");
            return;
        }
        let Some(body) = self.peek(element) else {
            return;
        };
        self.model.removing(element, &body, hint);
        self.remove(element);
        for child in body.children().iter() {
            self.close_with_hint(child, CloseHint::ParentClosing);
        }
    }
}
