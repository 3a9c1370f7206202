//! End-to-end tests for the flyweight pool, dynamic loading, and the
//! incremental rendering contract.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use proptest::prelude::*;

use flytree::{
    CLASS_COLLAPSED, CLASS_EXPANDED, CLASS_LOADING, CLASS_NO_CHILDREN, RawRecord, RecordingSink,
    Resume, SinkOp, TreeManager, children_element_id,
};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Loader double: stashes every resume and counts invocations.
#[derive(Clone, Default)]
struct StashLoader {
    pending: Rc<RefCell<Vec<Resume>>>,
    calls: Rc<Cell<usize>>,
}

impl StashLoader {
    fn install(manager: TreeManager) -> (TreeManager, StashLoader) {
        let loader = StashLoader::default();
        let handle = loader.clone();
        let manager = manager.with_loader(move |_node, resume| {
            handle.calls.set(handle.calls.get() + 1);
            handle.pending.borrow_mut().push(resume);
        });
        (manager, loader)
    }

    fn take(&self) -> Resume {
        self.pending.borrow_mut().pop().expect("no pending resume")
    }
}

fn class_swaps(sink: &RecordingSink, element: &str) -> Vec<(String, String)> {
    sink.ops()
        .into_iter()
        .filter_map(|op| match op {
            SinkOp::ReplaceClass { element: e, old, new } if e == element => Some((old, new)),
            _ => None,
        })
        .collect()
}

// =============================================================================
// Rendering keeps the pool bounded
// =============================================================================

#[test]
fn rendering_large_tree_uses_depth_bounded_pool() {
    init_logs();
    let manager = TreeManager::new();
    let grandchildren = |p: usize| {
        (0..4)
            .map(|i| RawRecord::new(format!("leaf {p}.{i}")))
            .collect::<Vec<_>>()
    };
    let children = (0..5)
        .map(|p| RawRecord::new(format!("branch {p}")).with_children(grandchildren(p)))
        .collect::<Vec<_>>();
    manager
        .attach_roots(vec![RawRecord::new("root").with_children(children)])
        .unwrap();

    manager.render_into("tree");

    // 26 records, but one wrapper per recursion level: root, branch, leaf.
    assert_eq!(manager.pool_size(), 3);
    assert_eq!(manager.pool_free(), 3);
}

#[test]
fn leaked_wrappers_cost_exactly_one_slot_each() {
    init_logs();
    let manager = TreeManager::new();
    let records = manager
        .attach_roots((0..4).map(|i| RawRecord::new(format!("r{i}"))).collect())
        .unwrap();

    // Fetch and drop without returning: each leak pins one slot.
    for (i, &record) in records.iter().enumerate() {
        let node = manager.fetch(record).unwrap();
        drop(node);
        assert_eq!(manager.pool_size(), i + 1);
        assert_eq!(manager.pool_free(), 0);
    }

    // Refetching a leaked record reuses its still-bound slot.
    let node = manager.fetch(records[0]).unwrap();
    assert_eq!(manager.pool_size(), 4);
    manager.return_node(node);
    assert_eq!(manager.pool_free(), 1);
}

proptest! {
    #[test]
    fn pool_growth_bounded_by_max_concurrent_live(
        batches in prop::collection::vec(1usize..=8, 1..20),
    ) {
        let manager = TreeManager::new();
        let records = manager
            .attach_roots((0..8).map(|i| RawRecord::new(format!("r{i}"))).collect())
            .unwrap();

        let mut max_live = 0;
        for batch in batches {
            let live: Vec<_> = records
                .iter()
                .take(batch)
                .map(|&r| manager.fetch(r).unwrap())
                .collect();
            max_live = max_live.max(batch);
            prop_assert!(manager.pool_size() <= max_live);
            for node in live {
                manager.return_node(node);
            }
            prop_assert_eq!(manager.pool_free(), manager.pool_size());
        }
    }
}

// =============================================================================
// Dynamic loading
// =============================================================================

fn loadable_tree() -> (TreeManager, StashLoader, RecordingSink) {
    let sink = RecordingSink::new();
    let (manager, loader) = StashLoader::install(TreeManager::new().with_sink(sink.clone()));
    manager
        .attach_roots(vec![RawRecord::new("root").with_id("r")])
        .unwrap();
    manager.render_into("tree");
    sink.clear();
    (manager, loader, sink)
}

#[test]
fn expand_triggers_load_and_resume_attaches_children() {
    init_logs();
    let (manager, loader, sink) = loadable_tree();

    let root = manager.fetch_by_id("r").unwrap();
    root.set_expanded(true);
    assert_eq!(loader.calls.get(), 1);
    assert_eq!(
        class_swaps(&sink, "r"),
        vec![(CLASS_COLLAPSED.to_string(), CLASS_LOADING.to_string())]
    );

    loader.take().resume(Some(vec![
        RawRecord::new("alpha").with_id("a"),
        RawRecord::new("beta").with_id("b"),
    ]));

    assert!(root.expanded());
    assert_eq!(
        class_swaps(&sink, "r"),
        vec![
            (CLASS_COLLAPSED.to_string(), CLASS_LOADING.to_string()),
            (CLASS_LOADING.to_string(), CLASS_EXPANDED.to_string()),
        ]
    );
    let content: Vec<_> = sink
        .ops()
        .into_iter()
        .filter(|op| matches!(op, SinkOp::SetContent { element, .. } if element == &children_element_id("r")))
        .collect();
    assert_eq!(content.len(), 1);
    let SinkOp::SetContent { markup, .. } = &content[0] else {
        unreachable!();
    };
    assert!(markup.contains("id=\"a\""));
    assert!(markup.contains("id=\"b\""));

    // Loaded children arrived through the normal attach path.
    let alpha = manager.fetch_by_id("a").unwrap();
    assert_eq!(alpha.depth(), 1);
    manager.return_node(alpha);
    manager.return_node(root);
}

#[test]
fn expand_requests_during_load_are_ignored() {
    init_logs();
    let (manager, loader, sink) = loadable_tree();

    let root = manager.fetch_by_id("r").unwrap();
    root.set_expanded(true);
    root.set_expanded(true);
    root.toggle();
    assert_eq!(loader.calls.get(), 1);
    assert_eq!(class_swaps(&sink, "r").len(), 1);

    loader.take().resume(Some(vec![RawRecord::new("kid")]));
    assert_eq!(loader.calls.get(), 1);
    manager.return_node(root);
}

#[test]
fn empty_resume_marks_leaf_and_never_reloads() {
    init_logs();
    let (manager, loader, sink) = loadable_tree();

    let root = manager.fetch_by_id("r").unwrap();
    root.set_expanded(true);
    loader.take().resume(None);

    assert!(root.is_leaf());
    assert_eq!(
        class_swaps(&sink, "r"),
        vec![
            (CLASS_COLLAPSED.to_string(), CLASS_LOADING.to_string()),
            (CLASS_LOADING.to_string(), CLASS_NO_CHILDREN.to_string()),
        ]
    );
    sink.clear();

    // Subsequent expands flip the flag only: no loader call, no sink ops.
    root.set_expanded(true);
    assert_eq!(loader.calls.get(), 1);
    assert!(sink.ops().is_empty());
    manager.return_node(root);
}

#[test]
fn resume_for_detached_record_is_dropped() {
    init_logs();
    let (manager, loader, sink) = loadable_tree();

    let root = manager.fetch_by_id("r").unwrap();
    root.set_expanded(true);
    manager.return_node(root);

    let record = manager.lookup("r").unwrap();
    manager.detach(record).unwrap();
    sink.clear();

    loader.take().resume(Some(vec![RawRecord::new("orphan")]));
    assert!(sink.ops().is_empty());
    assert!(manager.roots().is_empty());
    assert_eq!(manager.lookup("orphan"), None);
}

#[test]
fn resume_outliving_its_manager_is_a_no_op() {
    init_logs();
    let (manager, loader, _sink) = loadable_tree();

    let root = manager.fetch_by_id("r").unwrap();
    root.set_expanded(true);
    manager.return_node(root);
    let resume = loader.take();
    drop(manager);

    resume.resume(Some(vec![RawRecord::new("late")]));
}

// =============================================================================
// Detach invalidates bound wrappers
// =============================================================================

#[test]
#[should_panic(expected = "used after being returned")]
fn detach_staleness_is_detected() {
    let manager = TreeManager::new();
    let roots = manager
        .attach_roots(vec![RawRecord::new("root").with_children(vec![
            RawRecord::new("kid").with_id("k"),
        ])])
        .unwrap();

    let kid = manager.fetch_by_id("k").unwrap();
    manager.detach(roots[0]).unwrap();
    let _ = kid.label();
}

// =============================================================================
// Serde input
// =============================================================================

#[cfg(feature = "serde")]
#[test]
fn attach_from_json_fixture() {
    init_logs();
    let raw: Vec<RawRecord> = serde_json::from_str(
        r#"[{
            "id": "src",
            "label": "src",
            "children": [
                {"label": "lib.rs", "is_leaf": true},
                {"label": "main.rs", "is_leaf": true}
            ]
        }]"#,
    )
    .unwrap();

    let sink = RecordingSink::new();
    let manager = TreeManager::new().with_sink(sink.clone());
    manager.attach_roots(raw).unwrap();
    manager.render_into("tree");

    let SinkOp::SetContent { markup, .. } = &sink.ops()[0] else {
        panic!("expected content write");
    };
    assert!(markup.contains("lib.rs"));
    assert!(markup.contains("main.rs"));
}
