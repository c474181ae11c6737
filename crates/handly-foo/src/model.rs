use std::collections::HashMap;
use std::sync::Arc;

use handly_core::{
    check_cancelled, Body, CancellationToken, Context, Error, Model, Property, Result,
    TemporaryCache, TextRange, TextSize, IDENTIFYING_RANGE, SNAPSHOT, SOURCE_CONTENTS,
    SOURCE_SNAPSHOT, TEXT_RANGE,
};

use crate::store::SourceStore;
use crate::syntax::{self, DeclarationKind, SyntaxError};
use crate::{file_location, is_foo_file_name, FooElement, FooKind};

/// Parameter names of a `def`, in declaration order.
pub const PARAMETERS: Property<Vec<String>> = Property::new("foo.parameters");

/// Syntax errors of a Foo file. Absent when the file parsed cleanly.
pub const SYNTAX_ERRORS: Property<Vec<SyntaxError>> = Property::new("foo.syntax_errors");

pub struct FooModel<S> {
    store: S,
}

impl<S: SourceStore> FooModel<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn build_file(
        &self,
        file: &FooElement,
        context: &Context,
        new_bodies: &mut TemporaryCache<FooKind>,
    ) -> Result<()> {
        let text: Arc<str> = match context.get(SOURCE_CONTENTS) {
            Some(text) => Arc::clone(text),
            None => {
                let (project, name) =
                    file_location(file).ok_or_else(|| Error::does_not_exist(file))?;
                Arc::from(self.store.read(project, name)?)
            }
        };
        let unit = syntax::parse(&text);

        let mut occurrences: HashMap<(FooKind, &str), u32> = HashMap::new();
        let mut children = Vec::with_capacity(unit.declarations.len());
        for declaration in &unit.declarations {
            let kind = match declaration.kind {
                DeclarationKind::Var => FooKind::Var,
                DeclarationKind::Def { .. } => FooKind::Def,
            };
            let count = occurrences
                .entry((kind, declaration.name.as_str()))
                .or_insert(0);
            *count += 1;
            let mut element = file.child(kind, &declaration.name);
            if *count > 1 {
                element = element.with_occurrence_count(*count);
            }

            let mut body = Body::new();
            body.set(TEXT_RANGE, declaration.range);
            body.set(IDENTIFYING_RANGE, declaration.name_range);
            if let DeclarationKind::Def { parameters } = &declaration.kind {
                body.set(PARAMETERS, parameters.clone());
            }
            new_bodies.insert(element.clone(), body);
            children.push(element);
        }

        tracing::trace!(
            target: "handly.foo",
            file = %file,
            declarations = children.len(),
            errors = unit.errors.len(),
            "built file structure"
        );

        let mut body = Body::with_children(children);
        body.set(TEXT_RANGE, TextRange::up_to(TextSize::of(&*text)));
        if let Some(snapshot) = context.get(SOURCE_SNAPSHOT) {
            body.set(SNAPSHOT, snapshot.clone());
        }
        if !unit.errors.is_empty() {
            body.set(SYNTAX_ERRORS, unit.errors);
        }
        new_bodies.insert(file.clone(), body);
        Ok(())
    }
}

impl<S: SourceStore> Model for FooModel<S> {
    type Kind = FooKind;

    fn validate_existence(&self, element: &FooElement, _context: &Context) -> Result<()> {
        let exists = match element.kind() {
            FooKind::Model => true,
            FooKind::Project => element
                .name()
                .is_some_and(|name| self.store.project_exists(name)),
            FooKind::File => file_location(element).is_some_and(|(project, name)| {
                is_foo_file_name(name) && self.store.file_exists(project, name)
            }),
            FooKind::Var | FooKind::Def => true,
        };
        if exists {
            Ok(())
        } else {
            Err(Error::does_not_exist(element))
        }
    }

    fn build_structure(
        &self,
        element: &FooElement,
        context: &Context,
        new_bodies: &mut TemporaryCache<FooKind>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        check_cancelled(cancel)?;
        match element.kind() {
            FooKind::Model => {
                let children = self
                    .store
                    .projects()?
                    .into_iter()
                    .map(|name| element.child(FooKind::Project, name))
                    .collect();
                new_bodies.insert(element.clone(), Body::with_children(children));
            }
            FooKind::Project => {
                let name = element
                    .name()
                    .ok_or_else(|| Error::does_not_exist(element))?;
                let children = self
                    .store
                    .files(name)?
                    .into_iter()
                    .filter(|file| is_foo_file_name(file))
                    .map(|file| element.child(FooKind::File, file))
                    .collect();
                new_bodies.insert(element.clone(), Body::with_children(children));
            }
            FooKind::File => self.build_file(element, context, new_bodies)?,
            FooKind::Var | FooKind::Def => {
                return Err(Error::model(format!(
                    "{element} is built together with its file"
                )));
            }
        }
        Ok(())
    }
}
