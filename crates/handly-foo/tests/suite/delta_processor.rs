use handly_core::{CancellationToken, EventMask};
use handly_foo::{
    foo_file, foo_model, foo_project, process_resource_changes, FooDeltaProcessor, MemoryStore,
    ResourceChange,
};
use pretty_assertions::assert_eq;

use super::{child_names, open, record_events};

fn file_changed(project: &str, file: &str) -> ResourceChange {
    ResourceChange::FileChanged {
        project: project.to_string(),
        file: file.to_string(),
    }
}

#[test]
fn open_files_get_fine_grained_deltas() {
    let manager = super::manager(MemoryStore::new().with_file("p", "a.foo", "var x;\ndef f(a) {}\n"));
    let a = foo_file("p", "a.foo");
    open(&manager, &a).unwrap();
    let events = record_events(&manager, EventMask::POST_CHANGE);

    manager
        .model()
        .store()
        .write_file("p", "a.foo", "var x;\ndef f(a, b) {}\nvar y;\n");
    let delta = process_resource_changes(
        &manager,
        &[file_changed("p", "a.foo")],
        &CancellationToken::new(),
    )
    .unwrap()
    .expect("delta");

    let expected = "<root>[*]: {CHILDREN}\n  \
                    p[*]: {CHILDREN}\n    \
                    a.foo[*]: {CHILDREN}\n      \
                    f[*]: {CONTENT}\n      \
                    y[+]: {}";
    assert_eq!(delta.to_string(), expected);
    assert_eq!(*events.lock().unwrap(), vec![format!("PostChange\n{expected}")]);
    assert_eq!(child_names(&manager, &a), vec!["x", "f", "y"]);
}

#[test]
fn closed_files_get_coarse_deltas() {
    let manager = super::manager(MemoryStore::new().with_file("p", "a.foo", "var x;\n"));
    open(&manager, &foo_project("p")).unwrap();

    manager.model().store().write_file("p", "a.foo", "var y;\n");
    let delta = process_resource_changes(
        &manager,
        &[file_changed("p", "a.foo")],
        &CancellationToken::new(),
    )
    .unwrap()
    .expect("delta");

    assert_eq!(
        delta.to_string(),
        "<root>[*]: {CHILDREN}\n  p[*]: {CHILDREN}\n    a.foo[*]: {CONTENT}"
    );
}

#[test]
fn layout_only_edits_are_not_reported() {
    let manager = super::manager(MemoryStore::new().with_file("p", "a.foo", "var x;\n"));
    let a = foo_file("p", "a.foo");
    open(&manager, &a).unwrap();
    let events = record_events(&manager, EventMask::POST_CHANGE);

    manager
        .model()
        .store()
        .write_file("p", "a.foo", "\n\nvar   x ;  // moved\n");
    let delta = process_resource_changes(
        &manager,
        &[file_changed("p", "a.foo")],
        &CancellationToken::new(),
    )
    .unwrap();

    assert!(delta.is_none(), "unexpected delta: {delta:?}");
    assert!(events.lock().unwrap().is_empty());
}

#[test]
fn added_and_removed_files_update_open_projects() {
    let manager = super::manager(MemoryStore::new().with_file("p", "a.foo", "var x;\n"));
    let a = foo_file("p", "a.foo");
    open(&manager, &a).unwrap();

    let store = manager.model().store();
    store.write_file("p", "b.foo", "var y;\n");
    store.remove_file("p", "a.foo");
    let delta = process_resource_changes(
        &manager,
        &[
            ResourceChange::FileAdded {
                project: "p".to_string(),
                file: "b.foo".to_string(),
            },
            ResourceChange::FileRemoved {
                project: "p".to_string(),
                file: "a.foo".to_string(),
            },
        ],
        &CancellationToken::new(),
    )
    .unwrap()
    .expect("delta");

    assert_eq!(
        delta.to_string(),
        "<root>[*]: {CHILDREN}\n  p[*]: {CHILDREN}\n    b.foo[+]: {}\n    a.foo[-]: {}"
    );
    assert!(!manager.is_open(&a));
    assert_eq!(child_names(&manager, &foo_project("p")), vec!["b.foo"]);
}

#[test]
fn other_files_become_resource_deltas() {
    let manager = super::manager(MemoryStore::new().with_file("p", "notes.txt", "hello"));

    let delta = process_resource_changes(
        &manager,
        &[ResourceChange::FileAdded {
            project: "p".to_string(),
            file: "notes.txt".to_string(),
        }],
        &CancellationToken::new(),
    )
    .unwrap()
    .expect("delta");

    assert_eq!(
        delta.to_string(),
        "<root>[*]: {CHILDREN}\n  p[*]: {CONTENT}\n    ResourceDelta(p/notes.txt)[+]"
    );
    let project = delta.find_delta(&foo_project("p")).unwrap();
    assert_eq!(project.resource_deltas().len(), 1);
}

#[test]
fn projects_come_and_go() {
    let manager = super::manager(MemoryStore::new().with_file("p", "a.foo", ""));
    assert_eq!(child_names(&manager, &foo_model()), vec!["p"]);

    let store = manager.model().store();
    store.add_project("q");
    store.remove_project("p");
    let delta = process_resource_changes(
        &manager,
        &[
            ResourceChange::ProjectAdded {
                project: "q".to_string(),
            },
            ResourceChange::ProjectRemoved {
                project: "p".to_string(),
            },
        ],
        &CancellationToken::new(),
    )
    .unwrap()
    .expect("delta");

    assert_eq!(delta.to_string(), "<root>[*]: {CHILDREN}\n  q[+]: {}\n  p[-]: {}");
    assert_eq!(child_names(&manager, &foo_model()), vec!["q"]);
}

#[test]
fn cancellation_stops_processing() {
    let manager = super::manager(MemoryStore::new().with_file("p", "a.foo", ""));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut processor = FooDeltaProcessor::new(&manager);
    let err = processor
        .process(&file_changed("p", "a.foo"), &cancel)
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(processor.is_empty());
}
