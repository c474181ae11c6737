mod support;

use std::sync::{Arc, Barrier};

use handly_core::{CancellationToken, CloseHint, Context, TextSize, FORCE_OPEN};
use pretty_assertions::assert_eq;
use support::{child_names, file, member, open, project, root, TreeModel, VALUE};

#[test]
fn opening_a_member_opens_its_ancestors() {
    let manager = support::manager(TreeModel::new().with_file("p1", "a.tree", "x = 1\ny\n"));
    let a = file("p1", "a.tree");
    let x = member(&a, "x");

    let body = open(&manager, &x).unwrap();
    assert_eq!(body.get(VALUE).map(String::as_str), Some("1"));

    for element in [root(), project("p1"), a.clone(), member(&a, "y")] {
        assert!(manager.is_open(&element), "{element} should be open");
    }
    assert_eq!(manager.model().build_log(), vec!["<root>", "p1", "p1/a.tree"]);

    // Already open: served from the cache.
    open(&manager, &x).unwrap();
    open(&manager, &a).unwrap();
    assert_eq!(manager.model().build_log().len(), 3);
}

#[test]
fn missing_elements_do_not_exist() {
    let manager = support::manager(TreeModel::new().with_file("p1", "a.tree", "x\n"));
    let a = file("p1", "a.tree");

    assert!(open(&manager, &file("p1", "missing.tree"))
        .unwrap_err()
        .is_does_not_exist());
    assert!(open(&manager, &member(&a, "z"))
        .unwrap_err()
        .is_does_not_exist());
    assert!(open(&manager, &file("nope", "a.tree"))
        .unwrap_err()
        .is_does_not_exist());

    assert!(manager.exists(&a));
    assert!(manager.exists(&member(&a, "x")));
    assert!(!manager.exists(&member(&a, "z")));
    assert!(!manager.exists(&project("nope")));
    assert!(!manager.exists(&file("nope", "a.tree")));
}

#[test]
fn duplicate_names_get_occurrence_counts() {
    let manager = support::manager(TreeModel::new().with_file("p1", "a.tree", "f\nf\ng\n"));
    let a = file("p1", "a.tree");

    assert_eq!(child_names(&manager, &a), vec!["f", "f#2", "g"]);
    assert!(manager.is_open(&member(&a, "f").with_occurrence_count(2)));
}

#[test]
fn close_removes_descendants_and_runs_hooks() {
    let manager = support::manager(TreeModel::new().with_file("p1", "a.tree", "outer\n  inner\n"));
    let a = file("p1", "a.tree");
    let outer = member(&a, "outer");
    let inner = member(&outer, "inner");

    open(&manager, &inner).unwrap();
    manager.close(&a);

    assert!(!manager.is_open(&a));
    assert!(!manager.is_open(&outer));
    assert!(!manager.is_open(&inner));
    assert!(manager.is_open(&project("p1")));
    assert_eq!(
        manager.model().close_log(),
        vec![
            ("p1/a.tree".to_string(), CloseHint::Explicit),
            ("p1/a.tree/outer".to_string(), CloseHint::ParentClosing),
            ("p1/a.tree/outer/inner".to_string(), CloseHint::ParentClosing),
        ]
    );

    // Closing something that is not open is a no-op.
    manager.close(&a);
    assert_eq!(manager.model().close_log().len(), 3);
}

#[test]
fn force_open_replaces_structure() {
    let manager = support::manager(TreeModel::new().with_file("p1", "a.tree", "x\ny\n"));
    let a = file("p1", "a.tree");
    let before = open(&manager, &a).unwrap();

    manager.model().set_file("p1", "a.tree", "x\nz\n");
    let cached = open(&manager, &a).unwrap();
    assert!(Arc::ptr_eq(&before, &cached));
    assert_eq!(child_names(&manager, &a), vec!["x", "y"]);

    let forced = Context::new().with(FORCE_OPEN, true);
    let rebuilt = manager
        .open(&a, &forced, &CancellationToken::new())
        .unwrap();
    assert!(!Arc::ptr_eq(&before, &rebuilt));
    assert_eq!(child_names(&manager, &a), vec!["x", "z"]);

    assert!(!manager.is_open(&member(&a, "y")));
    assert!(manager.is_open(&member(&a, "z")));
    assert_eq!(
        manager.model().close_log(),
        vec![("p1/a.tree/y".to_string(), CloseHint::ParentClosing)]
    );
}

#[test]
fn cancelled_open_builds_nothing() {
    let manager = support::manager(TreeModel::new().with_file("p1", "a.tree", "x\n"));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = manager
        .open(&file("p1", "a.tree"), &Context::new(), &cancel)
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(manager.model().build_log().is_empty());
    assert_eq!(manager.cached_len(), 0);
}

#[test]
fn cache_evicts_least_recently_used_files() {
    let mut model = TreeModel::new();
    for p in ["p1", "p2", "p3"] {
        model = model.with_file(p, "a.tree", "x\n").with_file(p, "b.tree", "x\n");
    }
    let manager = support::manager_with_file_limit(model, 5);

    let files: Vec<_> = ["p1", "p2", "p3"]
        .into_iter()
        .flat_map(|p| [file(p, "a.tree"), file(p, "b.tree")])
        .collect();
    for f in &files {
        open(&manager, f).unwrap();
    }

    assert!(!manager.is_open(&files[0]));
    assert!(!manager.is_open(&member(&files[0], "x")));
    for f in &files[1..] {
        assert!(manager.is_open(f), "{f} should still be open");
    }
    assert_eq!(
        manager.model().close_log(),
        vec![
            ("p1/a.tree".to_string(), CloseHint::CacheOverflow),
            ("p1/a.tree/x".to_string(), CloseHint::CacheOverflow),
        ]
    );

    // Evicted elements reopen transparently.
    open(&manager, &member(&files[0], "x")).unwrap();
    assert!(manager.is_open(&files[0]));
}

#[test]
fn concurrent_opens_share_one_published_body() {
    const THREADS: usize = 8;

    let manager = support::manager(TreeModel::new().with_file("p1", "a.tree", "x\ny\n"));
    let a = file("p1", "a.tree");
    let barrier = Barrier::new(THREADS);

    let bodies: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    open(&manager, &a).unwrap()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    });

    let published = manager.peek(&a).unwrap();
    for body in &bodies {
        assert!(Arc::ptr_eq(body, &published));
    }
}

#[test]
fn source_element_at_finds_innermost_construct() {
    let manager = support::manager(
        TreeModel::new().with_file("p1", "a.tree", "outer\n  inner = 1\nlast\n"),
    );
    let a = file("p1", "a.tree");
    let outer = member(&a, "outer");
    let at = |offset: u32| {
        manager
            .source_element_at(&a, TextSize::from(offset), None)
            .unwrap()
    };

    assert_eq!(at(0), Some(outer.clone()));
    assert_eq!(at(10), Some(member(&outer, "inner")));
    assert_eq!(at(20), Some(member(&a, "last")));
    assert_eq!(at(23), Some(a.clone()));
    assert_eq!(at(30), None);
}
