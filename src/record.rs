//! Tree records: the persistent data the flyweight wrappers slide over.
//!
//! A [`TreeRecord`] is a plain arena entry. It owns its children (by id),
//! keeps a weak back-reference to its parent (also by id), and carries the
//! transient render flags the expand/collapse machinery reads. All behavior
//! lives on the wrapper side; records are state only.

use smallvec::SmallVec;

use crate::types::{RecordId, SlotId};

/// Arena entry for one tree node.
#[derive(Debug)]
pub(crate) struct TreeRecord {
    /// Stable identifier, also the markup element id.
    pub id: String,
    pub label: String,
    pub expanded: bool,
    pub is_leaf: bool,
    /// Per-record template override; wins over the injected resolver.
    pub template: Option<String>,
    /// Ordered children, owned by this record.
    pub children: SmallVec<[RecordId; 4]>,
    /// Non-owning back-reference for navigation.
    pub parent: Option<RecordId>,
    /// Markup for this record has been produced at least once.
    pub rendered: bool,
    /// State class the emitted markup currently carries. Kept in sync by
    /// every render and class swap; the old side of the next swap.
    pub rendered_class: Option<&'static str>,
    /// Markup currently reflects the current children sequence.
    pub children_rendered: bool,
    /// Dynamic child load in flight.
    pub loading: bool,
    /// Wrapper pinned against this record, excluded from pool churn.
    pub held: Option<SlotId>,
    /// Wrapper currently bound to this record, held or not.
    pub bound: Option<SlotId>,
}

impl TreeRecord {
    pub fn new(id: String, label: String) -> Self {
        Self {
            id,
            label,
            expanded: true,
            is_leaf: false,
            template: None,
            children: SmallVec::new(),
            parent: None,
            rendered: false,
            rendered_class: None,
            children_rendered: false,
            loading: false,
            held: None,
            bound: None,
        }
    }
}

// =============================================================================
// Raw input
// =============================================================================

/// Plain input shape accepted by attach operations and dynamic-load resumes.
///
/// Missing ids are generated on attach; `expanded` defaults to true for
/// records that arrive with children and false otherwise.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RawRecord {
    pub id: Option<String>,
    pub label: String,
    pub expanded: Option<bool>,
    pub is_leaf: bool,
    pub template: Option<String>,
    pub children: Vec<RawRecord>,
}

impl RawRecord {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with_children(mut self, children: Vec<RawRecord>) -> Self {
        self.children = children;
        self
    }

    /// Mark the record as a leaf, suppressing dynamic loading for it.
    pub fn leaf(mut self) -> Self {
        self.is_leaf = true;
        self
    }

    pub fn expanded(mut self, expanded: bool) -> Self {
        self.expanded = Some(expanded);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_record_builder() {
        let raw = RawRecord::new("docs")
            .with_id("docs-1")
            .with_children(vec![RawRecord::new("readme").leaf()]);

        assert_eq!(raw.id.as_deref(), Some("docs-1"));
        assert_eq!(raw.label, "docs");
        assert_eq!(raw.children.len(), 1);
        assert!(raw.children[0].is_leaf);
        assert_eq!(raw.expanded, None);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_raw_record_from_json() {
        let raw: RawRecord = serde_json::from_str(
            r#"{"label": "src", "children": [{"label": "main.rs", "is_leaf": true}]}"#,
        )
        .unwrap();

        assert_eq!(raw.label, "src");
        assert_eq!(raw.id, None);
        assert_eq!(raw.children[0].label, "main.rs");
        assert!(raw.children[0].is_leaf);
    }
}
