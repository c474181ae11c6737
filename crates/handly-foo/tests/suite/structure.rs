use handly_core::{TextRange, TextSize, IDENTIFYING_RANGE, TEXT_RANGE};
use handly_foo::{
    foo_def, foo_file, foo_model, foo_project, foo_var, FooKind, MemoryStore, PARAMETERS,
    SYNTAX_ERRORS,
};
use pretty_assertions::assert_eq;

use super::{child_names, open};

fn range(start: u32, end: u32) -> TextRange {
    TextRange::new(start.into(), end.into())
}

#[test]
fn file_declarations_become_children() {
    let manager = super::manager(
        MemoryStore::new().with_file("p", "a.foo", "var x;\ndef f(a, b) {}\n"),
    );
    let a = foo_file("p", "a.foo");

    assert_eq!(child_names(&manager, &a), vec!["x", "f"]);

    let x = open(&manager, &foo_var(&a, "x")).unwrap();
    assert_eq!(x.get(TEXT_RANGE), Some(&range(0, 6)));
    assert_eq!(x.get(IDENTIFYING_RANGE), Some(&range(4, 5)));
    assert_eq!(x.get(PARAMETERS), None);

    let f = open(&manager, &foo_def(&a, "f")).unwrap();
    assert_eq!(f.get(TEXT_RANGE), Some(&range(7, 21)));
    assert_eq!(f.get(IDENTIFYING_RANGE), Some(&range(11, 12)));
    assert_eq!(
        f.get(PARAMETERS),
        Some(&vec!["a".to_string(), "b".to_string()])
    );
}

#[test]
fn projects_list_only_foo_files() {
    let manager = super::manager(
        MemoryStore::new()
            .with_file("p", "a.foo", "")
            .with_file("p", "notes.txt", "")
            .with_file("p", "b.foo", "")
            .with_file("q", "c.foo", ""),
    );

    assert_eq!(child_names(&manager, &foo_model()), vec!["p", "q"]);
    assert_eq!(child_names(&manager, &foo_project("p")), vec!["a.foo", "b.foo"]);
    assert!(manager.exists(&foo_file("p", "a.foo")));
    assert!(!manager.exists(&foo_file("p", "notes.txt")));
    assert!(!manager.exists(&foo_file("p", "missing.foo")));
    assert!(!manager.exists(&foo_project("r")));
}

#[test]
fn duplicate_declarations_get_occurrence_counts() {
    let manager = super::manager(
        MemoryStore::new().with_file("p", "a.foo", "def f() {}\ndef f(a) {}\nvar f;\n"),
    );
    let a = foo_file("p", "a.foo");

    let children = manager.children(&a).unwrap();
    let kinds: Vec<_> = children.iter().map(|c| (c.kind(), c.to_string_name())).collect();
    assert_eq!(
        kinds,
        vec![
            (FooKind::Def, "f".to_string()),
            (FooKind::Def, "f#2".to_string()),
            (FooKind::Var, "f".to_string()),
        ]
    );

    let second = open(&manager, &foo_def(&a, "f").with_occurrence_count(2)).unwrap();
    assert_eq!(second.get(PARAMETERS), Some(&vec!["a".to_string()]));
}

#[test]
fn syntax_errors_are_kept_on_the_file() {
    let manager = super::manager(MemoryStore::new().with_file("p", "a.foo", "var ;\nvar y;\n"));
    let a = foo_file("p", "a.foo");

    let body = open(&manager, &a).unwrap();
    let errors = body.get(SYNTAX_ERRORS).unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "expected a variable name");
    assert_eq!(errors[0].range, range(4, 5));
    assert_eq!(child_names(&manager, &a), vec!["y"]);
}

#[test]
fn source_element_at_finds_declarations() {
    let manager = super::manager(
        MemoryStore::new().with_file("p", "a.foo", "var x;\ndef f(a) {\n}\n"),
    );
    let a = foo_file("p", "a.foo");
    let at = |offset: u32| {
        manager
            .source_element_at(&a, TextSize::from(offset), None)
            .unwrap()
    };

    assert_eq!(at(2), Some(foo_var(&a, "x")));
    assert_eq!(at(12), Some(foo_def(&a, "f")));
    assert_eq!(at(20), Some(a.clone()));
}

#[test]
fn missing_elements_do_not_exist() {
    let manager = super::manager(MemoryStore::new().with_file("p", "a.foo", "var x;"));

    assert!(open(&manager, &foo_project("q"))
        .unwrap_err()
        .is_does_not_exist());
    assert!(open(&manager, &foo_var(&foo_file("p", "a.foo"), "y"))
        .unwrap_err()
        .is_does_not_exist());
}
