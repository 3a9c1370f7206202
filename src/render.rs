//! Markup contract: placeholder substitution, class lists, and the sink.
//!
//! The core never touches a real DOM. It produces markup strings from
//! templates and issues exactly two operations against an abstract sink:
//! `set_content` and `replace_class`, keyed by the record's element id and
//! its children-container id. Templates are plain strings with `{name}`
//! tokens; unknown tokens pass through untouched.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::node::Node;
use crate::types::NodeClasses;

// =============================================================================
// Class vocabulary
// =============================================================================

pub const CLASS_NODE: &str = "ft-node";
pub const CLASS_EXPANDED: &str = "ft-expanded";
pub const CLASS_COLLAPSED: &str = "ft-collapsed";
pub const CLASS_NO_CHILDREN: &str = "ft-no-children";
pub const CLASS_LOADING: &str = "ft-loading";
pub const CLASS_FIRST_CHILD: &str = "ft-first-child";
pub const CLASS_LAST_CHILD: &str = "ft-last-child";
pub const CLASS_CHILDREN: &str = "ft-children";

/// Template used when neither the record nor the resolver supplies one.
pub const DEFAULT_TEMPLATE: &str = "<div id=\"{id}\" class=\"{node_classes}\">\
<span class=\"ft-label\">{label}</span>\
<div id=\"{children_id}\" class=\"{children_classes}\">{children}</div>\
</div>";

/// Element id of a record's children container.
pub fn children_element_id(record_id: &str) -> String {
    format!("{record_id}_children")
}

/// Classify a node from its current record state and sibling position.
pub fn classes_for(
    expanded: bool,
    has_children: bool,
    expandable: bool,
    loading: bool,
    index: usize,
    sibling_count: usize,
) -> NodeClasses {
    let mut classes = if loading {
        NodeClasses::LOADING
    } else if !expandable {
        NodeClasses::NO_CHILDREN
    } else if expanded && has_children {
        NodeClasses::EXPANDED
    } else {
        NodeClasses::COLLAPSED
    };
    if index == 0 {
        classes |= NodeClasses::FIRST_CHILD;
    }
    if index + 1 == sibling_count {
        classes |= NodeClasses::LAST_CHILD;
    }
    classes
}

/// The one mutually-exclusive state class out of a classification.
///
/// Same precedence as [`classes_for`]; positional flags are ignored. This is
/// the class that `replace_class` swaps on state transitions.
pub fn state_class(classes: NodeClasses) -> &'static str {
    if classes.contains(NodeClasses::LOADING) {
        CLASS_LOADING
    } else if classes.contains(NodeClasses::NO_CHILDREN) {
        CLASS_NO_CHILDREN
    } else if classes.contains(NodeClasses::EXPANDED) {
        CLASS_EXPANDED
    } else {
        CLASS_COLLAPSED
    }
}

/// Render a classification as a space-separated class list.
///
/// `ft-node` is always present.
pub fn class_list(classes: NodeClasses) -> String {
    const NAMES: [(NodeClasses, &str); 6] = [
        (NodeClasses::EXPANDED, CLASS_EXPANDED),
        (NodeClasses::COLLAPSED, CLASS_COLLAPSED),
        (NodeClasses::NO_CHILDREN, CLASS_NO_CHILDREN),
        (NodeClasses::LOADING, CLASS_LOADING),
        (NodeClasses::FIRST_CHILD, CLASS_FIRST_CHILD),
        (NodeClasses::LAST_CHILD, CLASS_LAST_CHILD),
    ];
    let mut list = String::from(CLASS_NODE);
    for (flag, name) in NAMES {
        if classes.contains(flag) {
            list.push(' ');
            list.push_str(name);
        }
    }
    list
}

// =============================================================================
// Substitution
// =============================================================================

/// Substitute `{name}` tokens from the attribute map.
///
/// Tokens with no matching attribute are emitted verbatim, braces included,
/// so downstream template passes can still see them.
pub fn substitute(template: &str, attrs: &FxHashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let token = &after[..close];
                match attrs.get(token) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(token);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                // Unterminated brace: emit the remainder as-is.
                out.push_str(&rest[open..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

// =============================================================================
// Template resolution
// =============================================================================

/// Strategy for per-tree-type templates.
///
/// Replaces subclass-provided static templates: inject one resolver per
/// manager instead of deriving a node class per tree flavor. A record's own
/// `template` attribute still wins over the resolver.
pub trait TemplateResolver {
    fn resolve(&self, node: &Node) -> String;
}

/// Resolver that always yields [`DEFAULT_TEMPLATE`].
#[derive(Debug, Default)]
pub struct DefaultTemplates;

impl TemplateResolver for DefaultTemplates {
    fn resolve(&self, _node: &Node) -> String {
        DEFAULT_TEMPLATE.to_string()
    }
}

// =============================================================================
// Markup sink
// =============================================================================

/// Where incremental markup updates go.
///
/// The two operations mirror the DOM primitives the original design consumed:
/// replace an element's inner markup, and swap one class for another on an
/// element's class list.
pub trait MarkupSink {
    fn set_content(&mut self, element_id: &str, markup: &str);
    fn replace_class(&mut self, element_id: &str, old: &str, new: &str);
}

/// Sink that discards every operation. The default until one is configured.
#[derive(Debug, Default)]
pub struct NullSink;

impl MarkupSink for NullSink {
    fn set_content(&mut self, _element_id: &str, _markup: &str) {}
    fn replace_class(&mut self, _element_id: &str, _old: &str, _new: &str) {}
}

/// One recorded sink operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkOp {
    SetContent {
        element: String,
        markup: String,
    },
    ReplaceClass {
        element: String,
        old: String,
        new: String,
    },
}

/// Sink that records every operation, for tests and debugging.
///
/// Clones share the same log, so a copy can be kept after the original is
/// handed to the manager.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    ops: Rc<RefCell<Vec<SinkOp>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> Vec<SinkOp> {
        self.ops.borrow().clone()
    }

    pub fn clear(&self) {
        self.ops.borrow_mut().clear();
    }
}

impl MarkupSink for RecordingSink {
    fn set_content(&mut self, element_id: &str, markup: &str) {
        self.ops.borrow_mut().push(SinkOp::SetContent {
            element: element_id.to_string(),
            markup: markup.to_string(),
        });
    }

    fn replace_class(&mut self, element_id: &str, old: &str, new: &str) {
        self.ops.borrow_mut().push(SinkOp::ReplaceClass {
            element: element_id.to_string(),
            old: old.to_string(),
            new: new.to_string(),
        });
    }
}
