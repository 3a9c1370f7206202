//! Core types for flytree.
//!
//! These types define the foundation that everything builds on: the two
//! identifier newtypes (records vs. wrapper slots), the node classification
//! flags that drive the markup contract, and the crate error type.

use bitflags::bitflags;
use thiserror::Error;

// =============================================================================
// Identifiers
// =============================================================================

/// Index of a record in the tree arena.
///
/// Records are the persistent entities; a `RecordId` stays valid until the
/// record is detached from the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId(pub(crate) u32);

impl RecordId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a wrapper slot in the flyweight pool.
///
/// Slots are transient views; the same `SlotId` is rebound onto different
/// records over its lifetime. Two handles with the same `SlotId` refer to
/// the identical wrapper instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(pub(crate) u32);

impl SlotId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

// =============================================================================
// Node classification
// =============================================================================

bitflags! {
    /// Visual classification of a rendered node.
    ///
    /// Exactly one of the four state flags is set at a time; the positional
    /// flags combine freely with it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NodeClasses: u8 {
        /// Children visible.
        const EXPANDED = 1 << 0;
        /// Children hidden (or not yet loaded).
        const COLLAPSED = 1 << 1;
        /// Terminal: no children and none will ever load.
        const NO_CHILDREN = 1 << 2;
        /// Dynamic child load in flight.
        const LOADING = 1 << 3;
        /// First entry of its sibling sequence.
        const FIRST_CHILD = 1 << 4;
        /// Last entry of its sibling sequence.
        const LAST_CHILD = 1 << 5;
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Errors surfaced by tree mutation entry points.
///
/// Normal absence (no parent, no sibling, no children) is expressed as
/// `None`, never as an error. Wrapper misuse (stale handle, double return)
/// is a contract violation and panics instead.
#[derive(Debug, Error)]
pub enum TreeError {
    /// The record id does not name a live record in this tree.
    #[error("record {0:?} is not attached to this tree")]
    UnknownRecord(RecordId),

    /// An attached record carried an id that is already in use.
    #[error("duplicate record id `{0}`")]
    DuplicateId(String),
}
