//! Test fixtures for Group Object Table changes
//!
//! A [`GotChange`] describes one table mutation and can be applied either
//! through the manager API or rendered as the operator command line.

use std::collections::BTreeSet;

use knx_cfgmgr_common::KnxMgrResult;
use knx_gotd::{CommitReport, GotMgr, GroupAddress, GroupObjectEntry};

/// Table change operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GotOp {
    Add(GroupObjectEntry),
    Remove(i32),
}

/// One Group Object Table change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GotChange {
    pub op: GotOp,
}

impl GotChange {
    /// Add an entry with write and transmit flags
    pub fn add(id: i32, href: impl Into<String>, ga: Vec<GroupAddress>) -> Self {
        Self::add_with_flags(id, href, 20, ga)
    }

    pub fn add_with_flags(
        id: i32,
        href: impl Into<String>,
        cflags: u32,
        ga: Vec<GroupAddress>,
    ) -> Self {
        Self {
            op: GotOp::Add(GroupObjectEntry::new(id, href, cflags, ga)),
        }
    }

    pub fn remove(id: i32) -> Self {
        Self {
            op: GotOp::Remove(id),
        }
    }

    /// The operator command performing this change
    pub fn command_line(&self) -> String {
        match &self.op {
            GotOp::Add(entry) => {
                let ga: Vec<String> = entry.ga.iter().map(|ga| ga.to_string()).collect();
                format!(
                    "knx_got add {} {} {} ga {}",
                    entry.id,
                    entry.href,
                    entry.cflags.bits(),
                    ga.join(" ")
                )
            }
            GotOp::Remove(id) => format!("knx_got remove {}", id),
        }
    }

    /// Apply the change through the manager API
    pub async fn apply(&self, mgr: &GotMgr) -> KnxMgrResult<CommitReport> {
        match &self.op {
            GotOp::Add(entry) => mgr.add_entry(entry.clone()).await,
            GotOp::Remove(id) => mgr.remove_entry(*id).await,
        }
    }
}

/// Entries of the example applications
pub mod got_fixtures {
    use super::*;

    /// First data point on group 1
    pub fn first_switch() -> GotChange {
        GotChange::add(1, "/p/o_1_1", vec![1])
    }

    /// Second data point on groups 2 and 3
    pub fn second_switch() -> GotChange {
        GotChange::add(2, "/p/o_1_2", vec![2, 3])
    }

    /// `count` entries with consecutive ids, one group each
    pub fn numbered(count: usize) -> Vec<GotChange> {
        (0..count)
            .map(|i| {
                let id = i as i32 + 1;
                GotChange::add(id, format!("/p/o_{}", id), vec![id as GroupAddress])
            })
            .collect()
    }

    /// A stored record as written by the manager
    pub fn stored_record(id: i32, href: &str, cflags: u32, ga: &[GroupAddress]) -> Vec<u8> {
        serde_json::json!({ "id": id, "href": href, "cflags": cflags, "ga": ga })
            .to_string()
            .into_bytes()
    }
}

/// Multi-step scenario with the groups expected afterwards
#[derive(Debug)]
pub struct TestScenario {
    pub name: String,
    pub changes: Vec<GotChange>,
    pub expected_groups: BTreeSet<GroupAddress>,
}

impl TestScenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            changes: Vec::new(),
            expected_groups: BTreeSet::new(),
        }
    }

    pub fn with_change(mut self, change: GotChange) -> Self {
        self.changes.push(change);
        self
    }

    pub fn expect_groups(mut self, groups: impl IntoIterator<Item = GroupAddress>) -> Self {
        self.expected_groups = groups.into_iter().collect();
        self
    }

    /// Apply every change in order, stopping at the first rejection
    pub async fn run(&self, mgr: &GotMgr) -> KnxMgrResult<Vec<CommitReport>> {
        let mut reports = Vec::with_capacity(self.changes.len());
        for change in &self.changes {
            reports.push(change.apply(mgr).await?);
        }
        Ok(reports)
    }
}
