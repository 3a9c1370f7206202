//! The flyweight node handle.
//!
//! A [`Node`] is a thin handle over one wrapper slot. While bound, every
//! structural read and write acts through to the bound record, so any two
//! handles over the same slot behave identically to the record they
//! currently represent. Handles hold no durable state of their own beyond
//! the wrapper-local override store.
//!
//! Resource discipline: every handle obtained from a fetch must be returned
//! exactly once via [`TreeManager::return_node`](crate::manager::TreeManager::return_node),
//! unless the record is held. [`Node::for_some_children`] fetches and returns
//! automatically for its own iteration. Using a handle after its slot went
//! back to the pool panics.

use std::rc::Rc;

use log::debug;
use rustc_hash::FxHashMap;

use crate::manager::{Resume, Shared};
use crate::render::{
    CLASS_CHILDREN, CLASS_COLLAPSED, CLASS_EXPANDED, CLASS_LOADING, children_element_id,
    class_list, classes_for, state_class,
};
use crate::types::{RecordId, SlotId, TreeError};

/// A pooled wrapper bound to one live tree record.
pub struct Node {
    pub(crate) shared: Rc<Shared>,
    pub(crate) slot: SlotId,
}

/// Point-in-time copy of the bound record, taken under one short borrow so
/// no `RefCell` borrow is held across recursion or user callbacks.
struct Snapshot {
    id: String,
    label: String,
    template: Option<String>,
    expanded: bool,
    is_leaf: bool,
    loading: bool,
    rendered: bool,
    children_rendered: bool,
    children: Vec<RecordId>,
}

impl Node {
    pub(crate) fn bind(shared: Rc<Shared>, slot: SlotId) -> Self {
        Self { shared, slot }
    }

    /// The record this wrapper currently represents.
    ///
    /// Panics if the wrapper was returned to the pool: stale-handle use is
    /// a contract violation, not a recoverable condition.
    pub fn record(&self) -> RecordId {
        self.shared
            .pool
            .borrow()
            .bound_of(self.slot)
            .expect("flyweight node used after being returned to the pool")
    }

    /// Identity of the underlying wrapper slot.
    ///
    /// Two handles with equal slot ids alias the identical wrapper instance.
    pub fn slot_id(&self) -> SlotId {
        self.slot
    }

    fn snapshot(&self) -> Snapshot {
        let record = self.record();
        let arena = self.shared.arena.borrow();
        let rec = arena
            .get(record)
            .expect("record bound to a live wrapper must be alive");
        Snapshot {
            id: rec.id.clone(),
            label: rec.label.clone(),
            template: rec.template.clone(),
            expanded: rec.expanded,
            is_leaf: rec.is_leaf,
            loading: rec.loading,
            rendered: rec.rendered,
            children_rendered: rec.children_rendered,
            children: rec.children.to_vec(),
        }
    }

    fn fetch_node(&self, record: RecordId) -> Node {
        let slot = {
            let mut pool = self.shared.pool.borrow_mut();
            let mut arena = self.shared.arena.borrow_mut();
            pool.fetch(&mut arena, record)
        };
        Node::bind(self.shared.clone(), slot)
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    pub fn id(&self) -> String {
        self.snapshot().id
    }

    /// Rewrite the record's id, remapping the manager's id table.
    ///
    /// Fails if another live record already carries the id. Markup emitted
    /// under the old id keeps its element ids until the next render.
    pub fn set_id(&self, id: impl Into<String>) -> Result<(), TreeError> {
        let record = self.record();
        self.shared.arena.borrow_mut().rename(record, id.into())
    }

    pub fn label(&self) -> String {
        self.snapshot().label
    }

    pub fn set_label(&self, label: impl Into<String>) {
        let record = self.record();
        if let Some(rec) = self.shared.arena.borrow_mut().get_mut(record) {
            rec.label = label.into();
        }
    }

    pub fn template(&self) -> Option<String> {
        self.snapshot().template
    }

    pub fn set_template(&self, template: Option<String>) {
        let record = self.record();
        if let Some(rec) = self.shared.arena.borrow_mut().get_mut(record) {
            rec.template = template;
        }
    }

    pub fn expanded(&self) -> bool {
        self.snapshot().expanded
    }

    pub fn is_leaf(&self) -> bool {
        self.snapshot().is_leaf
    }

    /// Computed distance from the top level; never stored.
    pub fn depth(&self) -> usize {
        let record = self.record();
        self.shared.arena.borrow().depth(record)
    }

    /// True iff the bound record sits at the top level of the tree.
    pub fn is_root(&self) -> bool {
        let record = self.record();
        let arena = self.shared.arena.borrow();
        arena.get(record).and_then(|r| r.parent) == Some(arena.sentinel())
    }

    /// Store a value on the wrapper itself, bypassing the record.
    ///
    /// Locals shadow record attributes during placeholder substitution and
    /// are dropped when the slot rebinds.
    pub fn set_local(&self, key: impl Into<String>, value: impl Into<String>) {
        let _ = self.record();
        self.shared
            .pool
            .borrow_mut()
            .set_local(self.slot, key.into(), value.into());
    }

    pub fn local(&self, key: &str) -> Option<String> {
        let _ = self.record();
        self.shared.pool.borrow().local(self.slot, key)
    }

    // =========================================================================
    // Hold / release
    // =========================================================================

    /// Pin this wrapper to its record, excluding it from pool churn.
    ///
    /// Every later fetch of the record yields this same wrapper until
    /// [`release`](Self::release). The escape hatch for long-lived handles.
    pub fn hold(&self) {
        let record = self.record();
        if let Some(rec) = self.shared.arena.borrow_mut().get_mut(record) {
            rec.held = Some(self.slot);
        }
    }

    /// Unpin the wrapper. It stays bound until returned.
    pub fn release(&self) {
        let record = self.record();
        if let Some(rec) = self.shared.arena.borrow_mut().get_mut(record) {
            if rec.held == Some(self.slot) {
                rec.held = None;
            }
        }
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    /// Fetch a wrapper for the parent record, or `None` at the top level.
    ///
    /// The caller is responsible for returning the wrapper.
    pub fn get_parent(&self) -> Option<Node> {
        let record = self.record();
        let parent = {
            let arena = self.shared.arena.borrow();
            let parent = arena.get(record)?.parent?;
            if parent == arena.sentinel() {
                return None;
            }
            parent
        };
        Some(self.fetch_node(parent))
    }

    pub fn get_next_sibling(&self) -> Option<Node> {
        self.sibling(1)
    }

    pub fn get_previous_sibling(&self) -> Option<Node> {
        self.sibling(-1)
    }

    fn sibling(&self, offset: isize) -> Option<Node> {
        let record = self.record();
        let target = {
            let arena = self.shared.arena.borrow();
            let parent = arena.get(record)?.parent?;
            // Top-level records have no siblings, by contract.
            if parent == arena.sentinel() {
                return None;
            }
            let siblings = &arena.get(parent)?.children;
            // Graceful None when the backing record was already detached.
            let position = siblings.iter().position(|&c| c == record)?;
            let index = position as isize + offset;
            if index < 0 || index as usize >= siblings.len() {
                return None;
            }
            siblings[index as usize]
        };
        Some(self.fetch_node(target))
    }

    /// Iterate children in stored order, one pooled wrapper at a time.
    ///
    /// Each child wrapper is fetched, passed to `f` with its index and the
    /// full sibling id sequence, then returned to the pool before the next
    /// iteration. Stops early and returns true when `f` returns true.
    pub fn for_some_children<F>(&self, mut f: F) -> bool
    where
        F: FnMut(&Node, usize, &[RecordId]) -> bool,
    {
        let record = self.record();
        let children = self.shared.arena.borrow().children(record);
        for (index, &child) in children.iter().enumerate() {
            let node = self.fetch_node(child);
            let stop = f(&node, index, &children);
            {
                let mut pool = self.shared.pool.borrow_mut();
                let mut arena = self.shared.arena.borrow_mut();
                pool.put_back(&mut arena, node.slot);
            }
            if stop {
                return true;
            }
        }
        false
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Produce markup for the bound record at the given sibling position.
    ///
    /// Pure in its output (a function of record state at call time) but
    /// marks the record rendered, and children-rendered when it recursed
    /// into an expanded child sequence. Collapsed nodes emit an empty
    /// children slot; it is repopulated lazily on expand.
    pub fn get_html(&self, index: usize, sibling_count: usize, depth: usize) -> String {
        let record = self.record();
        let snap = self.snapshot();
        let loadable = self.shared.loader_configured();
        let has_children = !snap.children.is_empty();
        let expandable = has_children || (!snap.is_leaf && loadable);
        let render_children = snap.expanded && has_children;

        let children_markup = if render_children {
            render_children_markup(&self.shared, record, depth)
        } else {
            String::new()
        };

        let classes = classes_for(
            snap.expanded,
            has_children,
            expandable,
            snap.loading,
            index,
            sibling_count,
        );

        {
            let mut arena = self.shared.arena.borrow_mut();
            if let Some(rec) = arena.get_mut(record) {
                rec.rendered = true;
                rec.rendered_class = Some(state_class(classes));
                if render_children {
                    rec.children_rendered = true;
                }
            }
        }

        let template = match snap.template {
            Some(template) => template,
            None => self.shared.resolver.borrow().resolve(self),
        };

        let mut attrs: FxHashMap<String, String> = FxHashMap::default();
        attrs.insert("id".to_string(), snap.id.clone());
        attrs.insert("label".to_string(), snap.label);
        attrs.insert("depth".to_string(), depth.to_string());
        attrs.insert("node_classes".to_string(), class_list(classes));
        attrs.insert("children_id".to_string(), children_element_id(&snap.id));
        attrs.insert("children_classes".to_string(), CLASS_CHILDREN.to_string());
        attrs.insert("children".to_string(), children_markup);
        {
            let pool = self.shared.pool.borrow();
            for (key, value) in pool.locals(self.slot) {
                attrs.insert(key.clone(), value.clone());
            }
        }
        crate::render::substitute(&template, &attrs)
    }

    // =========================================================================
    // Expand / collapse
    // =========================================================================

    /// Flip the expanded state.
    pub fn toggle(&self) {
        let expanded = self.expanded();
        self.set_expanded(!expanded);
    }

    /// Drive the expand/collapse state machine.
    ///
    /// Expanding a record whose children were never rendered renders them
    /// first; expanding a childless, non-leaf record with a loader
    /// configured starts a dynamic load instead. Collapsing is a
    /// classification change only. Requests arriving while a load is in
    /// flight are ignored.
    pub fn set_expanded(&self, value: bool) {
        let record = self.record();
        let snap = self.snapshot();
        if snap.loading {
            return;
        }

        let has_children = !snap.children.is_empty();
        if value == snap.expanded {
            // A redundant expand still repopulates stale children markup
            // (children attached since the last render pass).
            let stale = value && has_children && snap.rendered && !snap.children_rendered;
            if !stale {
                return;
            }
        }

        if !value {
            if let Some(rec) = self.shared.arena.borrow_mut().get_mut(record) {
                rec.expanded = false;
            }
            if snap.rendered && has_children {
                self.shared
                    .swap_state_class(record, &snap.id, CLASS_COLLAPSED);
            }
            return;
        }

        if !has_children && !snap.is_leaf && self.shared.loader_configured() {
            self.begin_load(record, &snap);
            return;
        }

        if let Some(rec) = self.shared.arena.borrow_mut().get_mut(record) {
            rec.expanded = true;
        }
        if !has_children {
            // Leaf: the flag flips but the classification stays no-children.
            return;
        }
        if !snap.rendered {
            // Never drawn; the first render pass picks the flag up.
            return;
        }

        if !snap.children_rendered {
            let depth = self.depth();
            let markup = render_children_markup(&self.shared, record, depth);
            if let Some(rec) = self.shared.arena.borrow_mut().get_mut(record) {
                rec.children_rendered = true;
            }
            self.shared
                .set_content(&children_element_id(&snap.id), &markup);
        }
        self.shared
            .swap_state_class(record, &snap.id, CLASS_EXPANDED);
    }

    fn begin_load(&self, record: RecordId, snap: &Snapshot) {
        if let Some(rec) = self.shared.arena.borrow_mut().get_mut(record) {
            rec.loading = true;
        }
        if snap.rendered {
            self.shared
                .swap_state_class(record, &snap.id, CLASS_LOADING);
        }
        debug!("dynamic load requested for record `{}`", snap.id);

        let loader = self.shared.loader.borrow().clone();
        if let Some(loader) = loader {
            let resume = Resume::new(Rc::downgrade(&self.shared), record);
            loader(self, resume);
        }
    }
}

// =============================================================================
// Internal render helpers
// =============================================================================

/// Render one record through a transiently fetched wrapper.
pub(crate) fn render_record(
    shared: &Rc<Shared>,
    record: RecordId,
    index: usize,
    sibling_count: usize,
    depth: usize,
) -> String {
    let slot = {
        let mut pool = shared.pool.borrow_mut();
        let mut arena = shared.arena.borrow_mut();
        pool.fetch(&mut arena, record)
    };
    let node = Node::bind(shared.clone(), slot);
    let html = node.get_html(index, sibling_count, depth);
    let mut pool = shared.pool.borrow_mut();
    let mut arena = shared.arena.borrow_mut();
    pool.put_back(&mut arena, slot);
    html
}

/// Concatenated markup of a record's children, in stored order.
pub(crate) fn render_children_markup(
    shared: &Rc<Shared>,
    parent: RecordId,
    depth: usize,
) -> String {
    let children = shared.arena.borrow().children(parent);
    let count = children.len();
    let mut out = String::new();
    for (index, &child) in children.iter().enumerate() {
        out.push_str(&render_record(shared, child, index, count, depth + 1));
    }
    out
}

#[cfg(test)]
mod tests {
    use crate::manager::TreeManager;
    use crate::record::RawRecord;
    use crate::types::TreeError;

    fn siblings_tree() -> TreeManager {
        let manager = TreeManager::new();
        manager
            .attach_roots(vec![RawRecord::new("root").with_id("root").with_children(
                vec![
                    RawRecord::new("x").with_id("x"),
                    RawRecord::new("y").with_id("y"),
                    RawRecord::new("z").with_id("z"),
                ],
            )])
            .unwrap();
        manager
    }

    #[test]
    fn test_sibling_boundaries() {
        let manager = siblings_tree();

        let x = manager.fetch_by_id("x").unwrap();
        assert!(x.get_previous_sibling().is_none());
        manager.return_node(x);

        let z = manager.fetch_by_id("z").unwrap();
        assert!(z.get_next_sibling().is_none());
        manager.return_node(z);

        let y = manager.fetch_by_id("y").unwrap();
        let next = y.get_next_sibling().unwrap();
        assert_eq!(next.id(), "z");
        manager.return_node(next);
        let prev = y.get_previous_sibling().unwrap();
        assert_eq!(prev.id(), "x");
        manager.return_node(prev);
        manager.return_node(y);
    }

    #[test]
    fn test_root_has_no_parent_and_no_siblings() {
        let manager = siblings_tree();
        let root = manager.fetch_by_id("root").unwrap();
        assert!(root.is_root());
        assert!(root.get_parent().is_none());
        assert!(root.get_next_sibling().is_none());
        assert!(root.get_previous_sibling().is_none());
        manager.return_node(root);
    }

    #[test]
    fn test_parent_navigation() {
        let manager = siblings_tree();
        let y = manager.fetch_by_id("y").unwrap();
        let parent = y.get_parent().unwrap();
        assert_eq!(parent.id(), "root");
        assert!(!y.is_root());
        manager.return_node(parent);
        manager.return_node(y);
    }

    #[test]
    fn test_for_some_children_short_circuits_and_recycles() {
        let manager = siblings_tree();
        let root = manager.fetch_by_id("root").unwrap();

        let mut visited = Vec::new();
        let stopped = root.for_some_children(|child, index, siblings| {
            assert_eq!(siblings.len(), 3);
            visited.push((child.id(), index));
            child.id() == "y"
        });
        assert!(stopped);
        assert_eq!(
            visited,
            vec![("x".to_string(), 0), ("y".to_string(), 1)]
        );

        // Iteration recycled its wrappers: one for the root, one churned
        // through the children.
        assert_eq!(manager.pool_size(), 2);

        let all = root.for_some_children(|_, _, _| false);
        assert!(!all);
        manager.return_node(root);
    }

    #[test]
    fn test_depth_through_handles() {
        let manager = TreeManager::new();
        manager
            .attach_roots(vec![RawRecord::new("root").with_id("r").with_children(
                vec![RawRecord::new("a").with_id("a").with_children(vec![
                    RawRecord::new("b").with_id("b").with_children(vec![
                        RawRecord::new("c").with_id("c"),
                    ]),
                ])],
            )])
            .unwrap();

        for (id, depth) in [("r", 0), ("a", 1), ("b", 2), ("c", 3)] {
            let node = manager.fetch_by_id(id).unwrap();
            assert_eq!(node.depth(), depth, "depth of {id}");
            manager.return_node(node);
        }
    }

    #[test]
    fn test_set_id_remaps_lookup() {
        let manager = siblings_tree();
        let y = manager.fetch_by_id("y").unwrap();
        y.set_id("why").unwrap();
        assert_eq!(y.id(), "why");
        manager.return_node(y);

        assert!(manager.fetch_by_id("y").is_none());
        let y = manager.fetch_by_id("why").unwrap();
        let err = y.set_id("x").unwrap_err();
        assert!(matches!(err, TreeError::DuplicateId(id) if id == "x"));
        manager.return_node(y);
    }

    #[test]
    fn test_locals_shadow_record_attributes() {
        let manager = TreeManager::new();
        manager
            .attach_roots(vec![RawRecord::new("real")
                .with_id("n")
                .with_template("<i>{label}</i>")])
            .unwrap();

        let node = manager.fetch_by_id("n").unwrap();
        node.set_local("label", "shadowed");
        assert_eq!(node.get_html(0, 1, 0), "<i>shadowed</i>");
        assert_eq!(node.label(), "real");
        manager.return_node(node);

        // Locals do not survive a rebind.
        let node = manager.fetch_by_id("n").unwrap();
        assert_eq!(node.local("label"), None);
        manager.return_node(node);
    }

    #[test]
    #[should_panic(expected = "used after being returned")]
    fn test_stale_handle_panics() {
        let manager = siblings_tree();
        let x = manager.fetch_by_id("x").unwrap();
        let alias = manager.fetch_by_id("x").unwrap();
        manager.return_node(x);
        // `alias` shared the slot; the slot is back in the pool now.
        let _ = alias.label();
    }
}
