//! IPv6 multicast group subscriptions derived from the Group Object Table
//!
//! Every group address referenced by an occupied slot is reachable on one
//! multicast address per configured scope. [`MulticastSync`] keeps the set
//! of joined groups equal to the set the table requires.

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv6Addr;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::types::GroupAddress;

/// IPv6 multicast scope used for group communication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MulticastScope {
    /// Link-local (2)
    LinkLocal,
    /// Site-local (5)
    SiteLocal,
}

impl MulticastScope {
    /// Scope nibble of the address
    pub fn value(&self) -> u8 {
        match self {
            MulticastScope::LinkLocal => 2,
            MulticastScope::SiteLocal => 5,
        }
    }

    /// Parses a scope nibble
    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            2 => Some(MulticastScope::LinkLocal),
            5 => Some(MulticastScope::SiteLocal),
            _ => None,
        }
    }
}

/// Scopes a device joins by default
pub const DEFAULT_SCOPES: [MulticastScope; 2] = [MulticastScope::LinkLocal, MulticastScope::SiteLocal];

const IID_MASK: u64 = (1 << 40) - 1;

/// Multicast address of group `ga` in installation `iid`
///
/// Layout: `ff3s:0030:fd` then the low 40 bits of the installation id,
/// two zero bytes and the 32-bit group address.
pub fn group_multicast_address(ga: GroupAddress, iid: u64, scope: MulticastScope) -> Ipv6Addr {
    let mut octets = [0u8; 16];
    octets[0] = 0xff;
    octets[1] = 0x30 | scope.value();
    octets[2] = 0x00;
    octets[3] = 0x30;
    octets[4] = 0xfd;
    octets[5..10].copy_from_slice(&(iid & IID_MASK).to_be_bytes()[3..8]);
    octets[12..16].copy_from_slice(&ga.to_be_bytes());
    Ipv6Addr::from(octets)
}

/// Network side of multicast group membership
pub trait MulticastRegistrar: Send + Sync {
    fn subscribe(&self, ga: GroupAddress, addresses: &[Ipv6Addr]) -> Result<(), String>;
    fn unsubscribe(&self, ga: GroupAddress, addresses: &[Ipv6Addr]) -> Result<(), String>;
}

/// Registrar that only logs and tracks membership
///
/// Used by the daemon when no network stack is attached.
#[derive(Debug, Default)]
pub struct LoggingRegistrar {
    joined: Mutex<BTreeMap<GroupAddress, Vec<Ipv6Addr>>>,
}

impl LoggingRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Groups currently joined
    pub fn joined(&self) -> BTreeSet<GroupAddress> {
        let joined = self.joined.lock().unwrap_or_else(|e| e.into_inner());
        joined.keys().copied().collect()
    }
}

impl MulticastRegistrar for LoggingRegistrar {
    fn subscribe(&self, ga: GroupAddress, addresses: &[Ipv6Addr]) -> Result<(), String> {
        for addr in addresses {
            info!("Subscribing to group {} at {}", ga, addr);
        }
        let mut joined = self.joined.lock().unwrap_or_else(|e| e.into_inner());
        joined.insert(ga, addresses.to_vec());
        Ok(())
    }

    fn unsubscribe(&self, ga: GroupAddress, addresses: &[Ipv6Addr]) -> Result<(), String> {
        for addr in addresses {
            info!("Unsubscribing from group {} at {}", ga, addr);
        }
        let mut joined = self.joined.lock().unwrap_or_else(|e| e.into_inner());
        joined.remove(&ga);
        Ok(())
    }
}

/// Book-keeping of joined groups
#[derive(Debug, Clone)]
pub struct MulticastSync {
    scopes: Vec<MulticastScope>,
    iid: Option<u64>,
    subscribed: BTreeMap<GroupAddress, Vec<Ipv6Addr>>,
}

impl MulticastSync {
    pub fn new(scopes: Vec<MulticastScope>) -> Self {
        Self {
            scopes,
            iid: None,
            subscribed: BTreeMap::new(),
        }
    }

    /// Addresses of `ga` on every configured scope
    pub fn addresses(&self, ga: GroupAddress, iid: u64) -> Vec<Ipv6Addr> {
        self.scopes
            .iter()
            .map(|scope| group_multicast_address(ga, iid, *scope))
            .collect()
    }

    /// Groups recorded as joined
    pub fn subscribed_groups(&self) -> BTreeSet<GroupAddress> {
        self.subscribed.keys().copied().collect()
    }

    /// Addresses recorded for a joined group
    pub fn subscribed_addresses(&self, ga: GroupAddress) -> Option<&[Ipv6Addr]> {
        self.subscribed.get(&ga).map(Vec::as_slice)
    }

    /// Brings joined groups in line with `required`
    ///
    /// A different `iid` than the last pass re-derives every address, so
    /// all groups are left and joined again. Groups that fail to join stay
    /// unrecorded and are retried on the next pass. Returns one warning per
    /// registrar failure.
    pub fn reconcile(
        &mut self,
        required: &BTreeSet<GroupAddress>,
        iid: u64,
        registrar: &dyn MulticastRegistrar,
    ) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.iid.is_some_and(|last| last != iid) && !self.subscribed.is_empty() {
            info!(
                "Installation id changed, re-deriving {} multicast groups",
                self.subscribed.len()
            );
            warnings.extend(self.unsubscribe_all(registrar));
        }
        self.iid = Some(iid);

        let stale: Vec<GroupAddress> = self
            .subscribed
            .keys()
            .filter(|ga| !required.contains(ga))
            .copied()
            .collect();
        for ga in stale {
            if let Some(addresses) = self.subscribed.remove(&ga) {
                if let Err(e) = registrar.unsubscribe(ga, &addresses) {
                    warn!("Failed to unsubscribe group {}: {}", ga, e);
                    warnings.push(format!("unsubscribe of group {} failed: {}", ga, e));
                }
            }
        }

        for &ga in required {
            if self.subscribed.contains_key(&ga) {
                continue;
            }
            let addresses = self.addresses(ga, iid);
            match registrar.subscribe(ga, &addresses) {
                Ok(()) => {
                    debug!("Subscribed group {}", ga);
                    self.subscribed.insert(ga, addresses);
                }
                Err(e) => {
                    warn!("Failed to subscribe group {}: {}", ga, e);
                    warnings.push(format!("subscribe of group {} failed: {}", ga, e));
                }
            }
        }

        warnings
    }

    /// Leaves every joined group
    pub fn unsubscribe_all(&mut self, registrar: &dyn MulticastRegistrar) -> Vec<String> {
        let mut warnings = Vec::new();
        for (ga, addresses) in std::mem::take(&mut self.subscribed) {
            if let Err(e) = registrar.unsubscribe(ga, &addresses) {
                warn!("Failed to unsubscribe group {}: {}", ga, e);
                warnings.push(format!("unsubscribe of group {} failed: {}", ga, e));
            }
        }
        warnings
    }
}

impl Default for MulticastSync {
    fn default() -> Self {
        Self::new(DEFAULT_SCOPES.to_vec())
    }
}
