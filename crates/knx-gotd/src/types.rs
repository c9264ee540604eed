//! Type definitions for knx-gotd

use std::fmt;

use serde::{Deserialize, Serialize};

/// KNX group address
pub type GroupAddress = u32;

/// Communication flags of a group object
///
/// Stored and reported as a plain bitmask; the table itself never
/// interprets them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommunicationFlags(pub u32);

impl CommunicationFlags {
    /// Transmission (t)
    pub const TRANSMISSION: u32 = 1 << 2;
    /// Read (r)
    pub const READ: u32 = 1 << 3;
    /// Write (w)
    pub const WRITE: u32 = 1 << 4;
    /// Init (i)
    pub const INIT: u32 = 1 << 6;
    /// Update (u)
    pub const UPDATE: u32 = 1 << 7;

    /// Returns the raw bitmask
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Returns true if every bit of `flag` is set
    pub fn contains(&self, flag: u32) -> bool {
        self.0 & flag == flag
    }
}

impl From<u32> for CommunicationFlags {
    fn from(bits: u32) -> Self {
        Self(bits)
    }
}

impl fmt::Display for CommunicationFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::READ, "r"),
            (Self::WRITE, "w"),
            (Self::INIT, "i"),
            (Self::TRANSMISSION, "t"),
            (Self::UPDATE, "u"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "{}", set.join(" "))
    }
}

/// One row of the Group Object Table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupObjectEntry {
    /// Identifier, unique across occupied slots
    pub id: i32,
    /// Resource URI the entry is bound to
    pub href: String,
    /// Communication flags
    pub cflags: CommunicationFlags,
    /// Group addresses, in configuration order
    pub ga: Vec<GroupAddress>,
}

impl GroupObjectEntry {
    /// Create a new GroupObjectEntry
    pub fn new(
        id: i32,
        href: impl Into<String>,
        cflags: u32,
        ga: Vec<GroupAddress>,
    ) -> Self {
        Self {
            id,
            href: href.into(),
            cflags: CommunicationFlags(cflags),
            ga,
        }
    }

    /// Number of group addresses
    pub fn ga_len(&self) -> usize {
        self.ga.len()
    }

    /// Render the entry for the operator channel
    pub fn render(&self, index: usize) -> Vec<String> {
        let ga = self
            .ga
            .iter()
            .map(|ga| ga.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        vec![
            format!("  index {}", index),
            format!("    id     : {}", self.id),
            format!("    href   : {}", self.href),
            format!("    cflags : {} string: {}", self.cflags.bits(), self.cflags),
            format!("    ga ({}) : [ {} ]", self.ga_len(), ga),
        ]
    }
}

/// One Group Object Table slot
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Slot {
    /// Free for a new entry
    #[default]
    Empty,
    /// Holds an entry
    Occupied(GroupObjectEntry),
}

impl Slot {
    /// Returns the entry, if any
    pub fn entry(&self) -> Option<&GroupObjectEntry> {
        match self {
            Slot::Empty => None,
            Slot::Occupied(entry) => Some(entry),
        }
    }

    /// Returns true for an empty slot
    pub fn is_empty(&self) -> bool {
        matches!(self, Slot::Empty)
    }
}

/// Outcome of a committed table mutation
///
/// The in-memory change is committed even when `warnings` is not empty;
/// warnings report persistence or multicast failures that follow it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReport {
    /// Slot touched by the mutation
    pub index: Option<usize>,
    /// Rendering of the slot as committed, empty when it was freed
    pub rendered: Vec<String>,
    /// Failures after the in-memory commit
    pub warnings: Vec<String>,
}

impl CommitReport {
    /// Create a report for a slot
    pub fn at(index: usize) -> Self {
        Self {
            index: Some(index),
            ..Default::default()
        }
    }

    /// True if nothing failed after the commit
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Outcome of restoring persisted state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Entries restored into the table
    pub entries: usize,
    /// Records skipped or failures during restore
    pub warnings: Vec<String>,
}

/// Counters kept by the manager
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GotMgrStats {
    pub entries_added: u64,
    pub entries_removed: u64,
    pub rejected: u64,
    pub persist_failures: u64,
    pub multicast_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cflags_display() {
        assert_eq!(CommunicationFlags(20).to_string(), "w t");
        assert_eq!(CommunicationFlags(8).to_string(), "r");
        assert_eq!(CommunicationFlags(0).to_string(), "");
        assert!(CommunicationFlags(20).contains(CommunicationFlags::WRITE));
        assert!(!CommunicationFlags(20).contains(CommunicationFlags::READ));
    }

    #[test]
    fn test_entry_new() {
        let entry = GroupObjectEntry::new(1, "/p/o_1_1", 20, vec![1, 2]);
        assert_eq!(entry.id, 1);
        assert_eq!(entry.href, "/p/o_1_1");
        assert_eq!(entry.cflags.bits(), 20);
        assert_eq!(entry.ga_len(), 2);
    }

    #[test]
    fn test_entry_render() {
        let entry = GroupObjectEntry::new(2, "/p/o_1_2", 20, vec![2, 3]);
        let lines = entry.render(1);
        assert_eq!(lines[0], "  index 1");
        assert_eq!(lines[1], "    id     : 2");
        assert_eq!(lines[3], "    cflags : 20 string: w t");
        assert_eq!(lines[4], "    ga (2) : [ 2 3 ]");
    }

    #[test]
    fn test_entry_json_shape() {
        let entry = GroupObjectEntry::new(1, "/p/o_1_1", 20, vec![1]);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"id": 1, "href": "/p/o_1_1", "cflags": 20, "ga": [1]})
        );
    }

    #[test]
    fn test_slot() {
        assert!(Slot::default().is_empty());
        let slot = Slot::Occupied(GroupObjectEntry::new(1, "/p/o_1_1", 20, vec![1]));
        assert_eq!(slot.entry().map(|e| e.id), Some(1));
    }

    #[test]
    fn test_commit_report() {
        let mut report = CommitReport::at(3);
        assert!(report.is_clean());
        report.warnings.push("not persisted".to_string());
        assert!(!report.is_clean());
    }
}
