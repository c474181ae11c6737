use std::sync::Arc;

use handly_core::{Buffer, BufferChange, CancellationToken, EventMask, TextBuffer};
use handly_foo::{foo_file, process_resource_changes, MemoryStore, ResourceChange};
use pretty_assertions::assert_eq;

use super::{child_names, record_events};

#[test]
fn working_copies_follow_their_buffer() {
    let manager = super::manager(MemoryStore::new().with_file("p", "a.foo", "var x;\n"));
    let a = foo_file("p", "a.foo");
    let changes = record_events(&manager, EventMask::POST_CHANGE);
    let reconciles = record_events(&manager, EventMask::POST_RECONCILE);

    let buffer = Arc::new(TextBuffer::named("a.foo", "var x;\nvar y;\n"));
    manager
        .become_working_copy(&a, buffer.clone(), &CancellationToken::new())
        .unwrap();
    assert_eq!(child_names(&manager, &a), vec!["x", "y"]);

    // The file changes on disk; the working copy keeps the buffer's view.
    manager.model().store().write_file("p", "a.foo", "var z;\n");
    process_resource_changes(
        &manager,
        &[ResourceChange::FileChanged {
            project: "p".to_string(),
            file: "a.foo".to_string(),
        }],
        &CancellationToken::new(),
    )
    .unwrap();
    assert_eq!(child_names(&manager, &a), vec!["x", "y"]);

    buffer
        .apply_change(&BufferChange::full("var x;\n"), None)
        .unwrap();
    manager
        .reconcile(&a, false, &CancellationToken::new())
        .unwrap();
    assert_eq!(child_names(&manager, &a), vec!["x"]);
    assert_eq!(
        *reconciles.lock().unwrap(),
        vec!["PostReconcile\na.foo[*]: {CHILDREN}\n  y[-]: {}"]
    );

    // Releasing the last reference goes back to the stored contents.
    manager.release_working_copy(&a).unwrap();
    assert_eq!(child_names(&manager, &a), vec!["z"]);

    assert_eq!(
        *changes.lock().unwrap(),
        vec![
            "PostChange\n<root>[*]: {CHILDREN}\n  p[*]: {CHILDREN}\n    a.foo[*]: {WORKING_COPY}",
            "PostChange\n<root>[*]: {CHILDREN}\n  p[*]: {CHILDREN}\n    a.foo[*]: {CONTENT | UNDERLYING_RESOURCE}",
            "PostChange\n<root>[*]: {CHILDREN}\n  p[*]: {CHILDREN}\n    a.foo[*]: {WORKING_COPY}",
        ]
    );
}

#[test]
fn removed_working_copy_stays_open() {
    let manager = super::manager(MemoryStore::new().with_file("p", "a.foo", "var x;\n"));
    let a = foo_file("p", "a.foo");
    manager
        .become_working_copy(
            &a,
            Arc::new(TextBuffer::named("a.foo", "var w;\n")),
            &CancellationToken::new(),
        )
        .unwrap();

    manager.model().store().remove_file("p", "a.foo");
    let delta = process_resource_changes(
        &manager,
        &[ResourceChange::FileRemoved {
            project: "p".to_string(),
            file: "a.foo".to_string(),
        }],
        &CancellationToken::new(),
    )
    .unwrap()
    .expect("delta");

    assert_eq!(
        delta.to_string(),
        "<root>[*]: {CHILDREN}\n  p[*]: {CHILDREN}\n    a.foo[*]: {UNDERLYING_RESOURCE}"
    );
    assert!(manager.is_open(&a));
    assert_eq!(child_names(&manager, &a), vec!["w"]);
}
