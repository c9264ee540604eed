//! Group Object Table storage
//!
//! A fixed number of slots, each empty or holding one entry. Lookups are
//! linear scans; the table is small and never grows.

use std::collections::BTreeSet;

use knx_cfgmgr_common::{KnxMgrError, KnxMgrResult};
use tracing::{debug, info};

use crate::types::{GroupAddress, GroupObjectEntry, Slot};

/// Fixed-capacity Group Object Table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupObjectTable {
    slots: Vec<Slot>,
}

impl GroupObjectTable {
    /// Create a table with `capacity` empty slots
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![Slot::Empty; capacity],
        }
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| !s.is_empty()).count()
    }

    /// True if no slot is occupied
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Slot::is_empty)
    }

    /// Slot at `index`
    pub fn slot(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    /// Entry at `index`, if occupied
    pub fn entry(&self, index: usize) -> Option<&GroupObjectEntry> {
        self.slots.get(index).and_then(Slot::entry)
    }

    /// Occupied slots with their index
    pub fn iter_occupied(&self) -> impl Iterator<Item = (usize, &GroupObjectEntry)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.entry().map(|entry| (index, entry)))
    }

    /// First slot free for a new entry
    ///
    /// A slot already holding `id` is never returned; duplicates are
    /// rejected by [`GroupObjectTable::insert`] before this is consulted.
    pub fn find_empty_slot(&self, id: i32) -> Option<usize> {
        self.slots.iter().position(|slot| match slot {
            Slot::Empty => true,
            Slot::Occupied(entry) => entry.id != id && entry.ga.is_empty(),
        })
    }

    /// Index of the occupied slot holding `id`
    pub fn find_index_by_id(&self, id: i32) -> Option<usize> {
        self.iter_occupied()
            .find(|(_, entry)| entry.id == id)
            .map(|(index, _)| index)
    }

    /// Index of the occupied slot bound to `uri`
    pub fn find_url_index(&self, uri: &str) -> Option<usize> {
        self.iter_occupied()
            .find(|(_, entry)| entry.href == uri)
            .map(|(index, _)| index)
    }

    /// Number of group addresses in slot `index` (0 for empty or invalid)
    pub fn count_group_entries(&self, index: usize) -> usize {
        self.entry(index).map_or(0, GroupObjectEntry::ga_len)
    }

    /// Move `entry` into slot `index`
    ///
    /// No uniqueness check is done here; use [`GroupObjectTable::insert`].
    pub fn set_entry(&mut self, index: usize, entry: GroupObjectEntry) -> KnxMgrResult<()> {
        let capacity = self.capacity();
        let slot = self.slots.get_mut(index).ok_or_else(|| {
            KnxMgrError::invalid_argument(
                "index",
                format!("slot {} out of range (capacity {})", index, capacity),
            )
        })?;
        *slot = Slot::Occupied(entry);
        Ok(())
    }

    /// Free slot `index`, returning the entry it held
    ///
    /// Deleting an empty or out-of-range slot is a no-op.
    pub fn delete_entry(&mut self, index: usize) -> Option<GroupObjectEntry> {
        let slot = self.slots.get_mut(index)?;
        match std::mem::take(slot) {
            Slot::Empty => None,
            Slot::Occupied(entry) => {
                debug!(index, id = entry.id, "Deleted Group Object Table entry");
                Some(entry)
            }
        }
    }

    /// Validate and insert `entry`, returning the slot it landed in
    ///
    /// Rejections leave the table unchanged.
    pub fn insert(&mut self, entry: GroupObjectEntry) -> KnxMgrResult<usize> {
        self.validate(&entry)?;
        let index = self
            .find_empty_slot(entry.id)
            .ok_or(KnxMgrError::TableFull {
                capacity: self.capacity(),
            })?;

        self.set_entry(index, entry)?;
        Ok(index)
    }

    /// Validate and insert `entry` into the given slot
    ///
    /// Used when restoring persisted slots, which must keep their index.
    pub fn insert_at(&mut self, index: usize, entry: GroupObjectEntry) -> KnxMgrResult<()> {
        self.validate(&entry)?;
        match self.slot(index) {
            Some(Slot::Empty) => self.set_entry(index, entry),
            Some(Slot::Occupied(_)) => Err(KnxMgrError::invalid_argument(
                "index",
                format!("slot {} already occupied", index),
            )),
            None => Err(KnxMgrError::invalid_argument(
                "index",
                format!("slot {} out of range (capacity {})", index, self.capacity()),
            )),
        }
    }

    fn validate(&self, entry: &GroupObjectEntry) -> KnxMgrResult<()> {
        if entry.href.is_empty() {
            return Err(KnxMgrError::invalid_argument("href", "empty URI"));
        }
        if entry.ga.is_empty() {
            return Err(KnxMgrError::invalid_argument(
                "ga",
                "at least one group address is required",
            ));
        }
        if self.find_index_by_id(entry.id).is_some() {
            return Err(KnxMgrError::DuplicateId { id: entry.id });
        }
        Ok(())
    }

    /// Remove the entry holding `id`
    pub fn remove(&mut self, id: i32) -> KnxMgrResult<(usize, GroupObjectEntry)> {
        let index = self
            .find_index_by_id(id)
            .ok_or(KnxMgrError::NotFound { id })?;
        let entry = self
            .delete_entry(index)
            .ok_or_else(|| KnxMgrError::internal(format!("slot {} emptied during remove", index)))?;
        Ok((index, entry))
    }

    /// Empty every slot
    pub fn clear(&mut self) {
        self.slots.fill(Slot::Empty);
    }

    /// Union of the group addresses of all occupied slots
    pub fn group_addresses(&self) -> BTreeSet<GroupAddress> {
        self.iter_occupied()
            .flat_map(|(_, entry)| entry.ga.iter().copied())
            .collect()
    }

    /// Text rendering of slot `index`
    pub fn dump_entry(&self, index: usize) -> Option<String> {
        self.entry(index).map(|entry| entry.render(index).join("\n"))
    }

    /// Emit slot `index` on the operator log
    pub fn print_entry(&self, index: usize) {
        if let Some(entry) = self.entry(index) {
            for line in entry.render(index) {
                info!("{}", line);
            }
        }
    }

    /// Rendering of every occupied slot
    pub fn render(&self) -> Vec<String> {
        self.iter_occupied()
            .flat_map(|(index, entry)| entry.render(index))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(id: i32, href: &str, ga: Vec<GroupAddress>) -> GroupObjectEntry {
        GroupObjectEntry::new(id, href, 20, ga)
    }

    #[test]
    fn test_new_table_is_empty() {
        let table = GroupObjectTable::new(4);
        assert_eq!(table.capacity(), 4);
        assert_eq!(table.len(), 0);
        assert!(table.is_empty());
        assert_eq!(table.find_empty_slot(1), Some(0));
        assert!(table.group_addresses().is_empty());
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut table = GroupObjectTable::new(4);
        assert_eq!(table.insert(entry(1, "/p/o_1_1", vec![1])).unwrap(), 0);
        assert_eq!(table.insert(entry(2, "/p/o_1_2", vec![2, 3])).unwrap(), 1);

        assert_eq!(table.find_index_by_id(2), Some(1));
        assert_eq!(table.find_url_index("/p/o_1_1"), Some(0));
        assert_eq!(table.find_url_index("/p/o_9"), None);
        assert_eq!(table.count_group_entries(1), 2);
        assert_eq!(table.entry(1), Some(&entry(2, "/p/o_1_2", vec![2, 3])));
        assert_eq!(table.group_addresses(), BTreeSet::from([1, 2, 3]));
    }

    #[test]
    fn test_insert_duplicate_id_leaves_table_unchanged() {
        let mut table = GroupObjectTable::new(4);
        table.insert(entry(1, "/p/o_1_1", vec![1])).unwrap();
        let before = table.clone();

        let err = table.insert(entry(1, "/p/o_1_2", vec![5])).unwrap_err();
        assert!(matches!(err, KnxMgrError::DuplicateId { id: 1 }));
        assert_eq!(table, before);
    }

    #[test]
    fn test_insert_into_full_table() {
        let mut table = GroupObjectTable::new(2);
        table.insert(entry(1, "/p/o_1_1", vec![1])).unwrap();
        table.insert(entry(2, "/p/o_1_2", vec![2])).unwrap();
        let before = table.clone();

        let err = table.insert(entry(3, "/p/o_1_3", vec![3])).unwrap_err();
        assert!(matches!(err, KnxMgrError::TableFull { capacity: 2 }));
        assert_eq!(table, before);
    }

    #[test]
    fn test_insert_rejects_empty_fields() {
        let mut table = GroupObjectTable::new(2);
        assert!(matches!(
            table.insert(entry(1, "/p/o_1_1", vec![])),
            Err(KnxMgrError::InvalidArgument { .. })
        ));
        assert!(matches!(
            table.insert(entry(1, "", vec![1])),
            Err(KnxMgrError::InvalidArgument { .. })
        ));
        assert!(table.is_empty());
    }

    #[test]
    fn test_remove() {
        let mut table = GroupObjectTable::new(4);
        table.insert(entry(1, "/p/o_1_1", vec![1])).unwrap();

        let err = table.remove(7).unwrap_err();
        assert!(matches!(err, KnxMgrError::NotFound { id: 7 }));
        assert_eq!(table.len(), 1);

        let (index, removed) = table.remove(1).unwrap();
        assert_eq!(index, 0);
        assert_eq!(removed.href, "/p/o_1_1");
        assert_eq!(table.count_group_entries(0), 0);
        assert_eq!(table.find_index_by_id(1), None);
    }

    #[test]
    fn test_delete_entry_is_idempotent() {
        let mut table = GroupObjectTable::new(2);
        table.insert(entry(1, "/p/o_1_1", vec![1])).unwrap();

        assert!(table.delete_entry(0).is_some());
        assert!(table.delete_entry(0).is_none());
        assert!(table.delete_entry(99).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_reclaimed_slot_holds_only_new_entry() {
        let mut table = GroupObjectTable::new(2);
        table.insert(entry(1, "/p/o_1_1", vec![1, 2, 3, 4])).unwrap();
        table.insert(entry(2, "/p/o_1_2", vec![5])).unwrap();
        table.remove(1).unwrap();

        let index = table.insert(entry(9, "/p/x", vec![7])).unwrap();
        assert_eq!(index, 0);
        assert_eq!(table.entry(0), Some(&entry(9, "/p/x", vec![7])));
        assert_eq!(table.count_group_entries(0), 1);
        assert_eq!(table.group_addresses(), BTreeSet::from([5, 7]));
    }

    #[test]
    fn test_set_entry_out_of_range() {
        let mut table = GroupObjectTable::new(1);
        assert!(table.set_entry(1, entry(1, "/p/o_1_1", vec![1])).is_err());
    }

    #[test]
    fn test_find_empty_slot_skips_occupied() {
        let mut table = GroupObjectTable::new(3);
        table.insert(entry(1, "/p/o_1_1", vec![1])).unwrap();
        assert_eq!(table.find_empty_slot(2), Some(1));
        assert_eq!(table.find_empty_slot(1), Some(1));
    }

    #[test]
    fn test_count_group_entries_invalid_index() {
        let table = GroupObjectTable::new(1);
        assert_eq!(table.count_group_entries(0), 0);
        assert_eq!(table.count_group_entries(5), 0);
    }

    #[test]
    fn test_dump_and_render() {
        let mut table = GroupObjectTable::new(2);
        table.insert(entry(1, "/p/o_1_1", vec![1])).unwrap();

        let dump = table.dump_entry(0).unwrap();
        assert!(dump.contains("id     : 1"));
        assert!(dump.contains("href   : /p/o_1_1"));
        assert_eq!(table.dump_entry(1), None);
        assert_eq!(table.render().len(), 5);
    }

    #[test]
    fn test_insert_at_keeps_index() {
        let mut table = GroupObjectTable::new(3);
        table.insert_at(2, entry(4, "/p/o_1_2", vec![4])).unwrap();
        assert_eq!(table.find_index_by_id(4), Some(2));

        assert!(table.insert_at(2, entry(5, "/p/o_1_1", vec![5])).is_err());
        assert!(table.insert_at(3, entry(5, "/p/o_1_1", vec![5])).is_err());
        assert!(matches!(
            table.insert_at(0, entry(4, "/p/o_1_1", vec![5])),
            Err(KnxMgrError::DuplicateId { id: 4 })
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_clear() {
        let mut table = GroupObjectTable::new(2);
        table.insert(entry(1, "/p/o_1_1", vec![1])).unwrap();
        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.capacity(), 2);
    }
}
