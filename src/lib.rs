//! # flytree
//!
//! Flyweight tree-node manager: represent and render an arbitrarily large
//! hierarchy while allocating only a small, bounded number of view wrappers.
//!
//! ## Architecture
//!
//! Records live in an arena and carry all durable state (label, expanded,
//! structural links, render flags). Wrappers are pooled slots that are
//! transiently bound onto records on demand:
//!
//! ```text
//! RawRecord → attach (arena) → fetch (pool) → Node ops → return (pool)
//! ```
//!
//! Memory for views is O(pool size), not O(tree size): the pool grows only
//! to the maximum number of concurrently live wrappers and is never shrunk.
//! Rendering is incremental - expanding a node patches exactly its children
//! container and swaps one class on its element - and child loading is lazy
//! via a two-phase request/resume protocol.
//!
//! ## Modules
//!
//! - [`types`] - identifier newtypes, [`NodeClasses`] flags, [`TreeError`]
//! - [`record`] - the plain record data and the [`RawRecord`] input shape
//! - [`manager`] - [`TreeManager`], pool surface, dynamic-load [`Resume`]
//! - [`node`] - [`Node`], the bound flyweight handle
//! - [`render`] - placeholder substitution, class lists, sink and template
//!   traits
//!
//! ## Example
//!
//! ```
//! use flytree::{RawRecord, RecordingSink, TreeManager};
//!
//! let sink = RecordingSink::new();
//! let manager = TreeManager::new().with_sink(sink.clone());
//! manager
//!     .attach_roots(vec![RawRecord::new("src").with_children(vec![
//!         RawRecord::new("lib.rs").leaf(),
//!         RawRecord::new("main.rs").leaf(),
//!     ])])
//!     .unwrap();
//! manager.render_into("tree");
//!
//! let root = manager.fetch(manager.roots()[0]).unwrap();
//! root.toggle(); // collapse: one class swap, no re-render
//! manager.return_node(root);
//! ```

pub mod manager;
pub mod node;
pub mod record;
pub mod render;
pub mod types;

mod pool;
mod store;

pub use types::{NodeClasses, RecordId, SlotId, TreeError};

pub use record::RawRecord;

pub use manager::{Resume, TreeManager};

pub use node::Node;

pub use render::{
    CLASS_CHILDREN, CLASS_COLLAPSED, CLASS_EXPANDED, CLASS_FIRST_CHILD, CLASS_LAST_CHILD,
    CLASS_LOADING, CLASS_NO_CHILDREN, CLASS_NODE, DEFAULT_TEMPLATE, DefaultTemplates, MarkupSink,
    NullSink, RecordingSink, SinkOp, TemplateResolver, children_element_id, class_list,
    classes_for, state_class, substitute,
};
