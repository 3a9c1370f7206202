//! Record arena - index allocation and structural links for tree records.
//!
//! Manages the lifecycle of record indices:
//! - id ↔ index bidirectional mapping
//! - free index pool for O(1) reuse after detach
//! - sentinel super-root owning the top-level records
//! - attach normalization (generated ids, parent links, leaf marking)
//!
//! The arena is per-manager state; nothing here is global.

use rustc_hash::FxHashMap;

use crate::record::{RawRecord, TreeRecord};
use crate::types::{RecordId, SlotId, TreeError};

pub(crate) struct RecordArena {
    records: Vec<Option<TreeRecord>>,
    free: Vec<RecordId>,
    ids: FxHashMap<String, RecordId>,
    id_counter: usize,
    sentinel: RecordId,
}

impl RecordArena {
    /// Create an arena holding only the sentinel super-root.
    ///
    /// The sentinel owns the top-level records but is never exposed: depth
    /// counting, navigation, and rendering all stop just above it.
    pub fn new() -> Self {
        let mut sentinel = TreeRecord::new("#root".to_string(), String::new());
        sentinel.rendered = true;
        Self {
            records: vec![Some(sentinel)],
            free: Vec::new(),
            ids: FxHashMap::default(),
            id_counter: 0,
            sentinel: RecordId(0),
        }
    }

    #[inline]
    pub fn sentinel(&self) -> RecordId {
        self.sentinel
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    pub fn get(&self, id: RecordId) -> Option<&TreeRecord> {
        self.records.get(id.index()).and_then(|r| r.as_ref())
    }

    pub fn get_mut(&mut self, id: RecordId) -> Option<&mut TreeRecord> {
        self.records.get_mut(id.index()).and_then(|r| r.as_mut())
    }

    pub fn is_alive(&self, id: RecordId) -> bool {
        self.get(id).is_some()
    }

    /// Resolve a string id to its record index.
    pub fn lookup(&self, id: &str) -> Option<RecordId> {
        self.ids.get(id).copied()
    }

    /// Top-level records, in attach order.
    pub fn roots(&self) -> Vec<RecordId> {
        self.get(self.sentinel)
            .map(|r| r.children.to_vec())
            .unwrap_or_default()
    }

    pub fn children(&self, id: RecordId) -> Vec<RecordId> {
        self.get(id).map(|r| r.children.to_vec()).unwrap_or_default()
    }

    /// Distance from the top level, walking parent links.
    ///
    /// Top-level records report 0; the sentinel is excluded from the count.
    pub fn depth(&self, id: RecordId) -> usize {
        let mut depth = 0;
        let mut current = id;
        while let Some(parent) = self.get(current).and_then(|r| r.parent) {
            if parent == self.sentinel {
                break;
            }
            depth += 1;
            current = parent;
        }
        depth
    }

    // =========================================================================
    // Attach
    // =========================================================================

    /// Normalize raw data into records under `parent`.
    ///
    /// Assigns generated ids where absent, sets parent back-references, and
    /// marks leaves: a record with no children and no loader configured (or
    /// explicitly flagged) is a leaf. Returns the ids of the top-level
    /// attached records.
    ///
    /// Explicit ids are validated against the whole batch and the live tree
    /// before anything is inserted, so a duplicate id leaves the arena
    /// untouched.
    pub fn attach(
        &mut self,
        parent: RecordId,
        raw: Vec<RawRecord>,
        loadable: bool,
    ) -> Result<Vec<RecordId>, TreeError> {
        if !self.is_alive(parent) {
            return Err(TreeError::UnknownRecord(parent));
        }
        let mut seen = Vec::new();
        for record in &raw {
            self.validate_ids(record, &mut seen)?;
        }

        let attached: Vec<RecordId> = raw
            .into_iter()
            .map(|record| self.insert(parent, record, loadable))
            .collect();

        if let Some(rec) = self.get_mut(parent) {
            if !attached.is_empty() {
                rec.is_leaf = false;
                // Existing markup no longer reflects the children sequence.
                rec.children_rendered = false;
            }
        }
        Ok(attached)
    }

    fn validate_ids<'a>(
        &self,
        raw: &'a RawRecord,
        seen: &mut Vec<&'a str>,
    ) -> Result<(), TreeError> {
        if let Some(id) = raw.id.as_deref() {
            if self.ids.contains_key(id) || seen.contains(&id) {
                return Err(TreeError::DuplicateId(id.to_string()));
            }
            seen.push(id);
        }
        for child in &raw.children {
            self.validate_ids(child, seen)?;
        }
        Ok(())
    }

    fn insert(&mut self, parent: RecordId, raw: RawRecord, loadable: bool) -> RecordId {
        let id = raw.id.unwrap_or_else(|| self.generate_id());
        let mut record = TreeRecord::new(id.clone(), raw.label);
        record.is_leaf = raw.is_leaf || (raw.children.is_empty() && !loadable);
        record.expanded = raw.expanded.unwrap_or(!raw.children.is_empty());
        record.template = raw.template;
        record.parent = Some(parent);

        let rid = self.allocate(record);
        self.ids.insert(id, rid);
        if let Some(parent_rec) = self.get_mut(parent) {
            parent_rec.children.push(rid);
        }

        for child in raw.children {
            self.insert(rid, child, loadable);
        }
        rid
    }

    fn allocate(&mut self, record: TreeRecord) -> RecordId {
        match self.free.pop() {
            Some(rid) => {
                self.records[rid.index()] = Some(record);
                rid
            }
            None => {
                let rid = RecordId(self.records.len() as u32);
                self.records.push(Some(record));
                rid
            }
        }
    }

    fn generate_id(&mut self) -> String {
        loop {
            let id = format!("n{}", self.id_counter);
            self.id_counter += 1;
            if !self.ids.contains_key(&id) {
                return id;
            }
        }
    }

    /// Rewrite a record's string id, keeping the id table consistent.
    ///
    /// Renaming a record to its current id is a no-op. Markup emitted under
    /// the old id is not patched; it picks the new id up on the next render.
    pub fn rename(&mut self, record: RecordId, new_id: String) -> Result<(), TreeError> {
        match self.ids.get(&new_id) {
            Some(&existing) if existing == record => return Ok(()),
            Some(_) => return Err(TreeError::DuplicateId(new_id)),
            None => {}
        }
        let Some(rec) = self.get_mut(record) else {
            return Err(TreeError::UnknownRecord(record));
        };
        let old = std::mem::replace(&mut rec.id, new_id.clone());
        self.ids.remove(&old);
        self.ids.insert(new_id, record);
        Ok(())
    }

    // =========================================================================
    // Detach
    // =========================================================================

    /// Remove a record and its whole subtree.
    ///
    /// Returns the wrapper slots that were bound anywhere in the removed
    /// subtree so the pool can unbind them; handles over those slots become
    /// stale.
    pub fn detach(&mut self, id: RecordId) -> Result<Vec<SlotId>, TreeError> {
        if id == self.sentinel || !self.is_alive(id) {
            return Err(TreeError::UnknownRecord(id));
        }
        if let Some(parent) = self.get(id).and_then(|r| r.parent) {
            if let Some(parent_rec) = self.get_mut(parent) {
                parent_rec.children.retain(|c| *c != id);
                parent_rec.children_rendered = false;
            }
        }
        let mut slots = Vec::new();
        self.release(id, &mut slots);
        Ok(slots)
    }

    fn release(&mut self, id: RecordId, slots: &mut Vec<SlotId>) {
        // Children first, collected up front to avoid mutating while walking.
        for child in self.children(id) {
            self.release(child, slots);
        }
        if let Some(record) = self.records[id.index()].take() {
            self.ids.remove(&record.id);
            if let Some(slot) = record.bound {
                slots.push(slot);
            }
            self.free.push(id);
        }
    }
}
