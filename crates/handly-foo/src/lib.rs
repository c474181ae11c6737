//! The Foo model: a small language plugged into `handly-core`.
//!
//! Foo source files (`*.foo`) declare variables and functions:
//!
//! ```text
//! var x;
//! def f(a, b) { ... }
//! ```
//!
//! The element tree is model root, then projects, then Foo files, then the
//! `var` and `def` declarations of each file. Projects and files come from a
//! [`SourceStore`]. Resource changes reported by the store's host are turned
//! into element deltas by [`FooDeltaProcessor`].

use std::path::Path;

use handly_core::{Element, ElementCategory, ElementKind};

mod delta_processor;
mod model;
mod store;
pub mod syntax;

pub use delta_processor::{process_resource_changes, FooDeltaProcessor, ResourceChange};
pub use model::{FooModel, PARAMETERS, SYNTAX_ERRORS};
pub use store::{LocalStore, MemoryStore, SourceStore};

pub const FILE_EXTENSION: &str = "foo";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FooKind {
    Model,
    Project,
    File,
    Var,
    Def,
}

impl ElementKind for FooKind {
    fn category(self) -> ElementCategory {
        match self {
            FooKind::Model => ElementCategory::Model,
            FooKind::Project => ElementCategory::Project,
            FooKind::File => ElementCategory::SourceFile,
            FooKind::Var | FooKind::Def => ElementCategory::SourceConstruct,
        }
    }
}

pub type FooElement = Element<FooKind>;

pub fn foo_model() -> FooElement {
    Element::root(FooKind::Model, None)
}

pub fn foo_project(name: &str) -> FooElement {
    foo_model().child(FooKind::Project, name)
}

pub fn foo_file(project: &str, name: &str) -> FooElement {
    foo_project(project).child(FooKind::File, name)
}

pub fn foo_var(file: &FooElement, name: &str) -> FooElement {
    file.child(FooKind::Var, name)
}

pub fn foo_def(file: &FooElement, name: &str) -> FooElement {
    file.child(FooKind::Def, name)
}

pub fn is_foo_file_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|extension| extension == FILE_EXTENSION)
}

/// The project and file names of a Foo file handle.
pub(crate) fn file_location(file: &FooElement) -> Option<(&str, &str)> {
    Some((file.parent()?.name()?, file.name()?))
}
