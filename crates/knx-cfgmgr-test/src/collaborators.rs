//! Recording collaborators for manager tests
//!
//! Each collaborator records what the manager asked of it and can be told
//! to fail, so tests can check both the happy path and degraded commits.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::net::Ipv6Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use knx_cfgmgr_common::{MemoryStore, PersistenceStore, StoreError, StoreResult};
use knx_gotd::{GroupAddress, MulticastRegistrar, SModeMessage, SModeSender};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// One registrar call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrarCall {
    Subscribe(GroupAddress, Vec<Ipv6Addr>),
    Unsubscribe(GroupAddress, Vec<Ipv6Addr>),
}

/// Multicast registrar that records calls and joined groups
#[derive(Debug, Default)]
pub struct RecordingRegistrar {
    calls: Mutex<Vec<RegistrarCall>>,
    joined: Mutex<BTreeMap<GroupAddress, Vec<Ipv6Addr>>>,
    rejected: Mutex<HashSet<GroupAddress>>,
}

impl RecordingRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subscription of `ga` fail until [`Self::accept`]
    pub fn reject(&self, ga: GroupAddress) {
        lock(&self.rejected).insert(ga);
    }

    pub fn accept(&self, ga: GroupAddress) {
        lock(&self.rejected).remove(&ga);
    }

    /// Groups joined on the network side
    pub fn joined(&self) -> BTreeSet<GroupAddress> {
        lock(&self.joined).keys().copied().collect()
    }

    /// Addresses a group was joined with
    pub fn joined_addresses(&self, ga: GroupAddress) -> Option<Vec<Ipv6Addr>> {
        lock(&self.joined).get(&ga).cloned()
    }

    pub fn calls(&self) -> Vec<RegistrarCall> {
        lock(&self.calls).clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }
}

impl MulticastRegistrar for RecordingRegistrar {
    fn subscribe(&self, ga: GroupAddress, addresses: &[Ipv6Addr]) -> Result<(), String> {
        if lock(&self.rejected).contains(&ga) {
            return Err(format!("group {} rejected", ga));
        }
        lock(&self.calls).push(RegistrarCall::Subscribe(ga, addresses.to_vec()));
        lock(&self.joined).insert(ga, addresses.to_vec());
        Ok(())
    }

    fn unsubscribe(&self, ga: GroupAddress, addresses: &[Ipv6Addr]) -> Result<(), String> {
        lock(&self.calls).push(RegistrarCall::Unsubscribe(ga, addresses.to_vec()));
        lock(&self.joined).remove(&ga);
        Ok(())
    }
}

/// Memory store whose writes can be switched off
#[derive(Debug, Default)]
pub struct FailingStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write and erase fail from now on
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Namespaced keys currently stored
    pub fn keys(&self) -> Vec<String> {
        self.inner.keys()
    }

    fn check(&self, store: &str) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io {
                key: store.to_string(),
                source: std::io::Error::other("injected write failure"),
            });
        }
        Ok(())
    }
}

impl PersistenceStore for FailingStore {
    fn read(&self, store: &str) -> StoreResult<Option<Vec<u8>>> {
        self.inner.read(store)
    }

    fn write(&self, store: &str, data: &[u8]) -> StoreResult<()> {
        self.check(store)?;
        self.inner.write(store, data)
    }

    fn erase(&self, store: &str) -> StoreResult<()> {
        self.check(store)?;
        self.inner.erase(store)
    }

    fn list_keys(&self) -> StoreResult<Vec<String>> {
        self.inner.list_keys()
    }
}

/// S-mode sender that records every message
#[derive(Debug, Default)]
pub struct RecordingSModeSender {
    sent: Mutex<Vec<SModeMessage>>,
}

impl RecordingSModeSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SModeMessage> {
        lock(&self.sent).clone()
    }
}

impl SModeSender for RecordingSModeSender {
    fn send(&self, message: &SModeMessage) -> Result<(), String> {
        lock(&self.sent).push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_registrar() {
        let registrar = RecordingRegistrar::new();
        registrar.subscribe(1, &[]).unwrap();
        registrar.reject(2);
        assert!(registrar.subscribe(2, &[]).is_err());
        registrar.unsubscribe(1, &[]).unwrap();

        assert_eq!(
            registrar.calls(),
            vec![
                RegistrarCall::Subscribe(1, vec![]),
                RegistrarCall::Unsubscribe(1, vec![])
            ]
        );
        assert!(registrar.joined().is_empty());

        registrar.accept(2);
        assert!(registrar.subscribe(2, &[]).is_ok());
    }

    #[test]
    fn test_failing_store() {
        let store = FailingStore::new();
        store.write("GOT_STORE_0", b"{}").unwrap();
        store.fail_writes(true);
        assert!(store.write("GOT_STORE_1", b"{}").is_err());
        assert!(store.erase("GOT_STORE_0").is_err());
        assert_eq!(store.read("GOT_STORE_0").unwrap(), Some(b"{}".to_vec()));
        assert_eq!(store.keys(), vec!["knx/GOT_STORE_0"]);
    }
}
