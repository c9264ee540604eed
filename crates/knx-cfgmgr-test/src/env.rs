//! Manager test environment
//!
//! Wires a [`GotMgr`] to a recording registrar and either a volatile or a
//! file-backed store. A file-backed environment can be restarted to check
//! that state survives a reboot.

use std::sync::Arc;

use knx_cfgmgr_common::{FileStore, KnxMgrResult, LoadState, MemoryStore, PersistenceStore, Shell};
use knx_gotd::{build_shell, GotMgr, GotMgrConfig, LoadReport};
use tempfile::TempDir;
use tracing::debug;

use crate::collaborators::{FailingStore, RecordingRegistrar};

/// A manager with inspectable collaborators
pub struct GotTestEnv {
    pub mgr: GotMgr,
    pub registrar: Arc<RecordingRegistrar>,
    store: Arc<dyn PersistenceStore>,
    config: GotMgrConfig,
    dir: Option<TempDir>,
}

impl GotTestEnv {
    fn with_store(capacity: usize, store: Arc<dyn PersistenceStore>, dir: Option<TempDir>) -> Self {
        let config = GotMgrConfig {
            capacity,
            ..Default::default()
        };
        let registrar = Arc::new(RecordingRegistrar::new());
        let mgr = GotMgr::new(config.clone(), registrar.clone(), store.clone());
        Self {
            mgr,
            registrar,
            store,
            config,
            dir,
        }
    }

    /// Environment on a volatile store
    pub fn memory(capacity: usize) -> Self {
        Self::with_store(capacity, Arc::new(MemoryStore::new()), None)
    }

    /// Environment on a caller-provided store
    pub fn with_failing_store(capacity: usize, store: Arc<FailingStore>) -> Self {
        Self::with_store(capacity, store, None)
    }

    /// Environment on a file store in a fresh temporary directory
    pub fn file(capacity: usize) -> std::io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let store = FileStore::open(dir.path()).map_err(std::io::Error::other)?;
        debug!("Test store at {}", dir.path().display());
        Ok(Self::with_store(capacity, Arc::new(store), Some(dir)))
    }

    pub fn store(&self) -> &dyn PersistenceStore {
        self.store.as_ref()
    }

    /// Storage directory of a file-backed environment
    pub fn storage_dir(&self) -> Option<&std::path::Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    /// Simulate a reboot: fresh manager and registrar on the same store
    pub async fn restart(&mut self) -> KnxMgrResult<LoadReport> {
        self.registrar = Arc::new(RecordingRegistrar::new());
        self.mgr = GotMgr::new(self.config.clone(), self.registrar.clone(), self.store.clone());
        self.mgr.load().await
    }

    /// Reboot with a different table capacity on the same store
    pub async fn restart_with_capacity(&mut self, capacity: usize) -> KnxMgrResult<LoadReport> {
        self.config.capacity = capacity;
        self.restart().await
    }

    /// Assign ia and iid and mark the application loaded
    pub async fn enter_runtime(&self, ia: u32, iid: u64) {
        self.mgr.set_ia(Some(ia)).await;
        self.mgr.set_iid(iid).await;
        self.mgr.set_load_state(LoadState::Loaded).await;
    }

    /// Operator shell bound to the manager
    pub fn shell(&self) -> Shell {
        build_shell(&self.mgr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_env() {
        let env = GotTestEnv::memory(4);
        assert_eq!(env.mgr.config().capacity, 4);
        assert!(env.storage_dir().is_none());
        env.enter_runtime(1, 1).await;
        assert!(env.mgr.is_in_runtime().await);
    }

    #[tokio::test]
    async fn test_file_env_restart() {
        let mut env = GotTestEnv::file(4).unwrap();
        assert!(env.storage_dir().is_some_and(|dir| dir.join("knx").is_dir()));
        env.mgr.set_ia(Some(3)).await;

        let report = env.restart().await.unwrap();
        assert_eq!(report.entries, 0);
        assert_eq!(env.mgr.device_info().await.ia, Some(3));

        env.restart_with_capacity(2).await.unwrap();
        assert_eq!(env.mgr.config().capacity, 2);
    }
}
