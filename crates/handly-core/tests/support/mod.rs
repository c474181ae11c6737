#![allow(dead_code)]

//! A small in-memory model used by the integration tests.
//!
//! Projects hold files; each non-empty line of a file declares a member,
//! optionally with a value (`name = value`). Lines indented by two spaces
//! declare members nested in the previous top-level member.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use handly_core::{
    Body, CacheLimits, CancellationToken, CloseHint, Context, Element, ElementCategory,
    ElementKind, ElementManager, Error, ManagerOptions, Model, Property, Result, TemporaryCache,
    TextRange, TextSize, SNAPSHOT, SOURCE_CONTENTS, SOURCE_SNAPSHOT, TEXT_RANGE,
};

pub const VALUE: Property<String> = Property::new("tree.value");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Root,
    Project,
    File,
    Member,
}

impl ElementKind for Kind {
    fn category(self) -> ElementCategory {
        match self {
            Kind::Root => ElementCategory::Model,
            Kind::Project => ElementCategory::Project,
            Kind::File => ElementCategory::SourceFile,
            Kind::Member => ElementCategory::SourceConstruct,
        }
    }
}

#[derive(Default)]
pub struct TreeModel {
    files: RwLock<BTreeMap<String, BTreeMap<String, String>>>,
    build_log: Mutex<Vec<String>>,
    close_log: Mutex<Vec<(String, CloseHint)>>,
}

impl TreeModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, project: &str, file: &str, text: &str) -> Self {
        self.set_file(project, file, text);
        self
    }

    pub fn set_file(&self, project: &str, file: &str, text: &str) {
        self.files
            .write()
            .unwrap()
            .entry(project.to_string())
            .or_default()
            .insert(file.to_string(), text.to_string());
    }

    pub fn delete_file(&self, project: &str, file: &str) {
        if let Some(files) = self.files.write().unwrap().get_mut(project) {
            files.remove(file);
        }
    }

    pub fn build_log(&self) -> Vec<String> {
        self.build_log.lock().unwrap().clone()
    }

    pub fn close_log(&self) -> Vec<(String, CloseHint)> {
        self.close_log.lock().unwrap().clone()
    }

    fn stored_text(&self, file: &Element<Kind>) -> Option<String> {
        let project = file.parent()?.name()?;
        let files = self.files.read().unwrap();
        files.get(project)?.get(file.name()?).cloned()
    }
}

impl Model for TreeModel {
    type Kind = Kind;

    fn validate_existence(&self, element: &Element<Kind>, _context: &Context) -> Result<()> {
        let exists = match element.kind() {
            Kind::Root => true,
            Kind::Project => element
                .name()
                .is_some_and(|name| self.files.read().unwrap().contains_key(name)),
            Kind::File => self.stored_text(element).is_some(),
            Kind::Member => true,
        };
        if exists {
            Ok(())
        } else {
            Err(Error::does_not_exist(element))
        }
    }

    fn build_structure(
        &self,
        element: &Element<Kind>,
        context: &Context,
        new_bodies: &mut TemporaryCache<Kind>,
        _cancel: &CancellationToken,
    ) -> Result<()> {
        self.build_log.lock().unwrap().push(element.to_string());
        match element.kind() {
            Kind::Root => {
                let files = self.files.read().unwrap();
                let children = files
                    .keys()
                    .map(|name| element.child(Kind::Project, name))
                    .collect();
                new_bodies.insert(element.clone(), Body::with_children(children));
            }
            Kind::Project => {
                let files = self.files.read().unwrap();
                let children = element
                    .name()
                    .and_then(|name| files.get(name))
                    .map(|files| {
                        files
                            .keys()
                            .map(|name| element.child(Kind::File, name))
                            .collect()
                    })
                    .unwrap_or_default();
                new_bodies.insert(element.clone(), Body::with_children(children));
            }
            Kind::File => {
                let text = match context.get(SOURCE_CONTENTS) {
                    Some(text) => text.to_string(),
                    None => self
                        .stored_text(element)
                        .ok_or_else(|| Error::does_not_exist(element))?,
                };
                let decls = parse(&text);
                let children = build_members(element, &decls, new_bodies);
                let mut body = Body::with_children(children);
                body.set(TEXT_RANGE, TextRange::up_to(TextSize::of(text.as_str())));
                if let Some(snapshot) = context.get(SOURCE_SNAPSHOT) {
                    body.set(SNAPSHOT, snapshot.clone());
                }
                new_bodies.insert(element.clone(), body);
            }
            Kind::Member => {
                return Err(Error::model(format!("{element} is built with its file")));
            }
        }
        Ok(())
    }

    fn removing(&self, element: &Element<Kind>, _body: &Body<Kind>, hint: CloseHint) {
        self.close_log
            .lock()
            .unwrap()
            .push((element.to_string(), hint));
    }
}

struct Decl {
    name: String,
    value: Option<String>,
    range: TextRange,
    children: Vec<Decl>,
}

fn parse(text: &str) -> Vec<Decl> {
    let mut decls: Vec<Decl> = Vec::new();
    let mut offset = 0usize;
    for line in text.split_inclusive('\n') {
        let start = offset;
        offset += line.len();
        let content = line.trim_end_matches(|c: char| c == '\n' || c == '\r');
        let trimmed = content.trim();
        if trimmed.is_empty() {
            continue;
        }
        let lead = content.len() - content.trim_start().len();
        let (name, value) = match trimmed.split_once('=') {
            Some((name, value)) => (name.trim(), Some(value.trim().to_string())),
            None => (trimmed, None),
        };
        let range = TextRange::new(
            TextSize::from((start + lead) as u32),
            TextSize::from((start + content.trim_end().len()) as u32),
        );
        let decl = Decl {
            name: name.to_string(),
            value,
            range,
            children: Vec::new(),
        };
        if content.starts_with("  ") {
            if let Some(parent) = decls.last_mut() {
                parent.range = parent.range.cover(decl.range);
                parent.children.push(decl);
                continue;
            }
        }
        decls.push(decl);
    }
    decls
}

fn build_members(
    parent: &Element<Kind>,
    decls: &[Decl],
    new_bodies: &mut TemporaryCache<Kind>,
) -> Vec<Element<Kind>> {
    let mut occurrences: HashMap<&str, u32> = HashMap::new();
    let mut children = Vec::with_capacity(decls.len());
    for decl in decls {
        let count = occurrences.entry(decl.name.as_str()).or_insert(0);
        *count += 1;
        let mut element = parent.child(Kind::Member, &decl.name);
        if *count > 1 {
            element = element.with_occurrence_count(*count);
        }
        let grandchildren = build_members(&element, &decl.children, new_bodies);
        let mut body = Body::with_children(grandchildren);
        body.set(TEXT_RANGE, decl.range);
        if let Some(value) = &decl.value {
            body.set(VALUE, value.clone());
        }
        new_bodies.insert(element.clone(), body);
        children.push(element);
    }
    children
}

pub fn root() -> Element<Kind> {
    Element::root(Kind::Root, None)
}

pub fn project(name: &str) -> Element<Kind> {
    root().child(Kind::Project, name)
}

pub fn file(project_name: &str, name: &str) -> Element<Kind> {
    project(project_name).child(Kind::File, name)
}

pub fn member(parent: &Element<Kind>, name: &str) -> Element<Kind> {
    parent.child(Kind::Member, name)
}

pub fn manager(model: TreeModel) -> ElementManager<TreeModel> {
    ElementManager::new(model)
}

/// A manager whose source file segment holds at most `source_files`
/// bodies and evicts only what is needed.
pub fn manager_with_file_limit(model: TreeModel, source_files: usize) -> ElementManager<TreeModel> {
    let options = ManagerOptions {
        cache_limits: CacheLimits {
            project: None,
            root_folder: None,
            package: None,
            source_file: Some(source_files),
            source_construct: None,
            load_factor: 1.0,
        },
        ..ManagerOptions::default()
    };
    ElementManager::with_options(model, options)
}

pub fn open(manager: &ElementManager<TreeModel>, element: &Element<Kind>) -> Result<Arc<Body<Kind>>> {
    manager.open(element, &Context::new(), &CancellationToken::new())
}

pub fn child_names(manager: &ElementManager<TreeModel>, element: &Element<Kind>) -> Vec<String> {
    manager
        .children(element)
        .unwrap()
        .iter()
        .map(Element::to_string_name)
        .collect()
}
