//! The tree manager: per-instance configuration and the pool surface.
//!
//! A [`TreeManager`] owns one record arena and one wrapper pool, plus the
//! three injected collaborators: the dynamic loader, the markup sink, and
//! the template resolver. Nothing is global; two managers never share
//! state.
//!
//! Dynamic loading is a two-phase operation. Expanding an eligible record
//! invokes the loader with the node and a single-use [`Resume`] token; the
//! loader calls [`Resume::resume`] later (same thread) with the child data,
//! or with nothing to mark the record a permanent leaf.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use log::{debug, warn};

use crate::node::{self, Node};
use crate::pool::SlotPool;
use crate::record::RawRecord;
use crate::render::{
    CLASS_COLLAPSED, CLASS_EXPANDED, CLASS_NO_CHILDREN, DefaultTemplates, MarkupSink, NullSink,
    TemplateResolver, children_element_id,
};
use crate::store::RecordArena;
use crate::types::{RecordId, TreeError};

pub(crate) type Loader = Rc<dyn Fn(&Node, Resume)>;

/// State shared between the manager and its node handles.
pub(crate) struct Shared {
    pub(crate) arena: RefCell<RecordArena>,
    pub(crate) pool: RefCell<SlotPool>,
    pub(crate) loader: RefCell<Option<Loader>>,
    pub(crate) sink: RefCell<Box<dyn MarkupSink>>,
    pub(crate) resolver: RefCell<Box<dyn TemplateResolver>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            arena: RefCell::new(RecordArena::new()),
            pool: RefCell::new(SlotPool::new()),
            loader: RefCell::new(None),
            sink: RefCell::new(Box::new(NullSink)),
            resolver: RefCell::new(Box::new(DefaultTemplates)),
        }
    }

    pub(crate) fn loader_configured(&self) -> bool {
        self.loader.borrow().is_some()
    }

    pub(crate) fn set_content(&self, element_id: &str, markup: &str) {
        self.sink.borrow_mut().set_content(element_id, markup);
    }

    pub(crate) fn replace_class(&self, element_id: &str, old: &str, new: &str) {
        self.sink.borrow_mut().replace_class(element_id, old, new);
    }

    /// Swap the record's state class in the emitted markup.
    ///
    /// The old side comes from the class the markup actually carries, not
    /// from the current record state - attaching children under a rendered
    /// record changes the state without touching the markup. No-op when the
    /// element already carries `new`.
    pub(crate) fn swap_state_class(&self, record: RecordId, element_id: &str, new: &'static str) {
        let old = self
            .arena
            .borrow_mut()
            .get_mut(record)
            .and_then(|rec| rec.rendered_class.replace(new));
        if let Some(old) = old {
            if old != new {
                self.replace_class(element_id, old, new);
            }
        }
    }
}

// =============================================================================
// Manager
// =============================================================================

/// Flyweight manager over one tree.
pub struct TreeManager {
    shared: Rc<Shared>,
}

impl TreeManager {
    pub fn new() -> Self {
        Self {
            shared: Rc::new(Shared::new()),
        }
    }

    /// Configure the dynamic child loader.
    ///
    /// With a loader configured, childless records not explicitly marked
    /// leaf become load-on-expand.
    pub fn with_loader(self, loader: impl Fn(&Node, Resume) + 'static) -> Self {
        *self.shared.loader.borrow_mut() = Some(Rc::new(loader));
        self
    }

    /// Configure where markup updates go. Defaults to a discarding sink.
    pub fn with_sink(self, sink: impl MarkupSink + 'static) -> Self {
        *self.shared.sink.borrow_mut() = Box::new(sink);
        self
    }

    /// Configure the per-tree template strategy.
    pub fn with_resolver(self, resolver: impl TemplateResolver + 'static) -> Self {
        *self.shared.resolver.borrow_mut() = Box::new(resolver);
        self
    }

    // =========================================================================
    // Structure
    // =========================================================================

    /// Attach raw data at the top level of the tree.
    pub fn attach_roots(&self, raw: Vec<RawRecord>) -> Result<Vec<RecordId>, TreeError> {
        let sentinel = self.shared.arena.borrow().sentinel();
        self.attach(sentinel, raw)
    }

    /// Attach raw data under an existing record.
    ///
    /// Normalizes it into records: ids generated where absent, parent links
    /// set, leaves marked. The parent's markup is considered stale until the
    /// next render or expand.
    pub fn attach(
        &self,
        parent: RecordId,
        raw: Vec<RawRecord>,
    ) -> Result<Vec<RecordId>, TreeError> {
        let loadable = self.shared.loader_configured();
        self.shared.arena.borrow_mut().attach(parent, raw, loadable)
    }

    /// Detach a record and its whole subtree.
    ///
    /// Wrappers bound anywhere in the subtree are recycled; handles over
    /// them become stale.
    pub fn detach(&self, record: RecordId) -> Result<(), TreeError> {
        let slots = self.shared.arena.borrow_mut().detach(record)?;
        self.shared.pool.borrow_mut().unbind_detached(&slots);
        Ok(())
    }

    /// Top-level records, in attach order.
    pub fn roots(&self) -> Vec<RecordId> {
        self.shared.arena.borrow().roots()
    }

    /// Resolve a string id to its record.
    pub fn lookup(&self, id: &str) -> Option<RecordId> {
        self.shared.arena.borrow().lookup(id)
    }

    // =========================================================================
    // Pool surface
    // =========================================================================

    /// Fetch a wrapper bound to `record`.
    ///
    /// A held record yields its pinned wrapper; otherwise a pooled one is
    /// rebound (allocating only when the free list is empty). The caller
    /// must return it exactly once via [`return_node`](Self::return_node)
    /// unless the record is held.
    pub fn fetch(&self, record: RecordId) -> Result<Node, TreeError> {
        if !self.shared.arena.borrow().is_alive(record) {
            return Err(TreeError::UnknownRecord(record));
        }
        let slot = {
            let mut pool = self.shared.pool.borrow_mut();
            let mut arena = self.shared.arena.borrow_mut();
            pool.fetch(&mut arena, record)
        };
        Ok(Node::bind(self.shared.clone(), slot))
    }

    /// Fetch by string id.
    pub fn fetch_by_id(&self, id: &str) -> Option<Node> {
        let record = self.lookup(id)?;
        self.fetch(record).ok()
    }

    /// Return a wrapper to the pool.
    ///
    /// No-op when the bound record is held. The handle (and any aliases of
    /// its slot) must not be used afterwards.
    pub fn return_node(&self, node: Node) {
        let mut pool = self.shared.pool.borrow_mut();
        let mut arena = self.shared.arena.borrow_mut();
        pool.put_back(&mut arena, node.slot);
    }

    /// Total wrapper slots ever allocated (live + free).
    pub fn pool_size(&self) -> usize {
        self.shared.pool.borrow().size()
    }

    /// Wrapper slots currently free.
    pub fn pool_free(&self) -> usize {
        self.shared.pool.borrow().free_len()
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Render every top-level record into the given container element.
    pub fn render_into(&self, element_id: &str) {
        let roots = self.roots();
        let count = roots.len();
        let mut markup = String::new();
        for (index, &record) in roots.iter().enumerate() {
            markup.push_str(&node::render_record(&self.shared, record, index, count, 0));
        }
        self.shared.set_content(element_id, &markup);
    }
}

impl Default for TreeManager {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Dynamic load resume
// =============================================================================

/// Second phase of a dynamic load.
///
/// Handed to the loader together with the expanding node; consumed by
/// [`resume`](Self::resume), so it can be invoked at most once. Holds only
/// a weak reference: a resume that outlives its manager is dropped
/// silently.
pub struct Resume {
    shared: Weak<Shared>,
    record: RecordId,
}

impl Resume {
    pub(crate) fn new(shared: Weak<Shared>, record: RecordId) -> Self {
        Self { shared, record }
    }

    /// The record whose children were requested.
    pub fn record(&self) -> RecordId {
        self.record
    }

    /// Deliver the load result.
    ///
    /// `None` or an empty sequence marks the record a permanent leaf - no
    /// result is indistinguishable from no children, and the record is
    /// never asked to load again. A non-empty result is attached as the
    /// record's children, rendered, and the node transitions to expanded.
    pub fn resume(self, children: Option<Vec<RawRecord>>) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let state = {
            let arena = shared.arena.borrow();
            arena
                .get(self.record)
                .map(|r| (r.id.clone(), r.loading, r.rendered))
        };
        let Some((id, loading, rendered)) = state else {
            warn!("dynamic load resumed for a detached record, dropping result");
            return;
        };
        if !loading {
            warn!("dynamic load resumed for record `{id}` that is not loading, ignoring");
            return;
        }

        let children = children.unwrap_or_default();
        if children.is_empty() {
            if let Some(rec) = shared.arena.borrow_mut().get_mut(self.record) {
                rec.loading = false;
                rec.is_leaf = true;
            }
            if rendered {
                shared.swap_state_class(self.record, &id, CLASS_NO_CHILDREN);
            }
            debug!("dynamic load for `{id}` returned nothing, marking leaf");
            return;
        }

        let loadable = shared.loader_configured();
        let attached = shared
            .arena
            .borrow_mut()
            .attach(self.record, children, loadable);
        let count = match attached {
            Ok(records) => records.len(),
            Err(err) => {
                warn!("dynamic load result for `{id}` rejected: {err}");
                if let Some(rec) = shared.arena.borrow_mut().get_mut(self.record) {
                    rec.loading = false;
                }
                if rendered {
                    shared.swap_state_class(self.record, &id, CLASS_COLLAPSED);
                }
                return;
            }
        };

        // Settle the record's state before producing any markup from it.
        if let Some(rec) = shared.arena.borrow_mut().get_mut(self.record) {
            rec.loading = false;
            rec.expanded = true;
            rec.children_rendered = rendered;
        }
        // Only a node that is actually in the markup gets its children
        // patched in; an undrawn node picks them up on its first render.
        if rendered {
            let depth = shared.arena.borrow().depth(self.record);
            let markup = node::render_children_markup(&shared, self.record, depth);
            shared.set_content(&children_element_id(&id), &markup);
            shared.swap_state_class(self.record, &id, CLASS_EXPANDED);
        }
        debug!("dynamic load for `{id}` attached {count} children");
    }
}
