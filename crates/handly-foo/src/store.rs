//! Where Foo projects and files live.
//!
//! A store is a two-level tree: projects containing files. It lists every
//! file, Foo or not; the model decides which files become elements.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use handly_core::{Error, Result};
use parking_lot::RwLock;

pub trait SourceStore: Send + Sync + 'static {
    fn projects(&self) -> Result<Vec<String>>;

    fn project_exists(&self, project: &str) -> bool;

    /// Names of the files directly in `project`, sorted.
    fn files(&self, project: &str) -> Result<Vec<String>>;

    fn file_exists(&self, project: &str, file: &str) -> bool;

    fn read(&self, project: &str, file: &str) -> Result<String>;
}

/// Projects and files held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    projects: RwLock<BTreeMap<String, BTreeMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, project: &str, file: &str, text: &str) -> Self {
        self.write_file(project, file, text);
        self
    }

    pub fn add_project(&self, project: &str) {
        self.projects.write().entry(project.to_string()).or_default();
    }

    pub fn remove_project(&self, project: &str) -> bool {
        self.projects.write().remove(project).is_some()
    }

    /// Creates or overwrites a file, creating its project if needed.
    pub fn write_file(&self, project: &str, file: &str, text: &str) {
        self.projects
            .write()
            .entry(project.to_string())
            .or_default()
            .insert(file.to_string(), text.to_string());
    }

    pub fn remove_file(&self, project: &str, file: &str) -> bool {
        self.projects
            .write()
            .get_mut(project)
            .is_some_and(|files| files.remove(file).is_some())
    }
}

fn missing(path: impl AsRef<Path>) -> Error {
    Error::does_not_exist(path.as_ref().display())
}

impl SourceStore for MemoryStore {
    fn projects(&self) -> Result<Vec<String>> {
        Ok(self.projects.read().keys().cloned().collect())
    }

    fn project_exists(&self, project: &str) -> bool {
        self.projects.read().contains_key(project)
    }

    fn files(&self, project: &str) -> Result<Vec<String>> {
        self.projects
            .read()
            .get(project)
            .map(|files| files.keys().cloned().collect())
            .ok_or_else(|| missing(project))
    }

    fn file_exists(&self, project: &str, file: &str) -> bool {
        self.projects
            .read()
            .get(project)
            .is_some_and(|files| files.contains_key(file))
    }

    fn read(&self, project: &str, file: &str) -> Result<String> {
        self.projects
            .read()
            .get(project)
            .and_then(|files| files.get(file))
            .cloned()
            .ok_or_else(|| missing(Path::new(project).join(file)))
    }
}

/// Projects are the subdirectories of a root directory; their files are the
/// regular files directly inside them.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn project_path(&self, project: &str) -> PathBuf {
        self.root.join(project)
    }

    pub fn file_path(&self, project: &str, file: &str) -> PathBuf {
        self.root.join(project).join(file)
    }

    fn entries(&self, dir: &Path, want_dirs: bool) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let wanted = if want_dirs {
                file_type.is_dir()
            } else {
                file_type.is_file()
            };
            if !wanted {
                continue;
            }
            // Names that are not valid UTF-8 cannot be element names.
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

impl SourceStore for LocalStore {
    fn projects(&self) -> Result<Vec<String>> {
        self.entries(&self.root, true)
    }

    fn project_exists(&self, project: &str) -> bool {
        self.project_path(project).is_dir()
    }

    fn files(&self, project: &str) -> Result<Vec<String>> {
        let path = self.project_path(project);
        if !path.is_dir() {
            return Err(missing(path));
        }
        self.entries(&path, false)
    }

    fn file_exists(&self, project: &str, file: &str) -> bool {
        self.file_path(project, file).is_file()
    }

    fn read(&self, project: &str, file: &str) -> Result<String> {
        let path = self.file_path(project, file);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(text),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(missing(path)),
            Err(err) => Err(err.into()),
        }
    }
}
