use std::fs;

use handly_core::{CancellationToken, ElementManager};
use handly_foo::{
    foo_file, foo_project, process_resource_changes, FooModel, LocalStore, ResourceChange,
};
use pretty_assertions::assert_eq;

use super::{child_names, open};

#[test]
fn tracks_a_directory_tree() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("p")).unwrap();
    fs::write(dir.path().join("p/a.foo"), "var x;\n").unwrap();
    fs::write(dir.path().join("p/build.txt"), "").unwrap();

    let manager = ElementManager::new(FooModel::new(LocalStore::new(dir.path())));
    let a = foo_file("p", "a.foo");
    assert_eq!(child_names(&manager, &foo_project("p")), vec!["a.foo"]);
    assert_eq!(child_names(&manager, &a), vec!["x"]);

    fs::write(dir.path().join("p/a.foo"), "var x;\nvar y;\n").unwrap();
    let delta = process_resource_changes(
        &manager,
        &[ResourceChange::FileChanged {
            project: "p".to_string(),
            file: "a.foo".to_string(),
        }],
        &CancellationToken::new(),
    )
    .unwrap()
    .expect("delta");
    assert_eq!(
        delta.to_string(),
        "<root>[*]: {CHILDREN}\n  p[*]: {CHILDREN}\n    a.foo[*]: {CHILDREN}\n      y[+]: {}"
    );

    fs::remove_file(dir.path().join("p/a.foo")).unwrap();
    process_resource_changes(
        &manager,
        &[ResourceChange::FileRemoved {
            project: "p".to_string(),
            file: "a.foo".to_string(),
        }],
        &CancellationToken::new(),
    )
    .unwrap();
    assert!(child_names(&manager, &foo_project("p")).is_empty());
    assert!(open(&manager, &a).unwrap_err().is_does_not_exist());
}
