//! Group Object Table Manager - table ownership, persistence and multicast sync

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use knx_cfgmgr_common::{
    KnxMgr, KnxMgrError, KnxMgrResult, LoadState, PersistenceStore, ResetCode, StoreResult,
};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::device::DeviceInfo;
use crate::multicast::{MulticastRegistrar, MulticastScope, MulticastSync, DEFAULT_SCOPES};
use crate::table::GroupObjectTable;
use crate::tables::*;
use crate::types::*;

/// Manager configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GotMgrConfig {
    /// Number of table slots
    pub capacity: usize,
    /// Scopes every group is joined on
    pub scopes: Vec<MulticastScope>,
}

impl Default for GotMgrConfig {
    fn default() -> Self {
        Self {
            capacity: GOT_MAX_ENTRIES,
            scopes: DEFAULT_SCOPES.to_vec(),
        }
    }
}

struct GotState {
    table: GroupObjectTable,
    device: DeviceInfo,
    multicast: MulticastSync,
    stats: GotMgrStats,
}

impl GotState {
    fn persist(&mut self, store: &dyn PersistenceStore, key: &str, data: &[u8], warnings: &mut Vec<String>) {
        if let Err(e) = store.write(key, data) {
            warn!("Failed to persist {}: {}", key, e);
            self.stats.persist_failures += 1;
            warnings.push(format!("{} not persisted: {}", key, e));
        }
    }

    fn erase(&mut self, store: &dyn PersistenceStore, key: &str, warnings: &mut Vec<String>) {
        if let Err(e) = store.erase(key) {
            warn!("Failed to erase {}: {}", key, e);
            self.stats.persist_failures += 1;
            warnings.push(format!("{} not erased: {}", key, e));
        }
    }

    fn resync(&mut self, registrar: &dyn MulticastRegistrar) -> Vec<String> {
        let required = self.table.group_addresses();
        let iid = self.device.multicast_iid();
        let warnings = self.multicast.reconcile(&required, iid, registrar);
        self.stats.multicast_failures += warnings.len() as u64;
        warnings
    }
}

/// Group Object Table Manager
///
/// Cloneable handle to the single table of the device. Every logical
/// operation holds one lock from validation through persistence and
/// multicast resync, so callers never observe a half-applied change.
#[derive(Clone)]
pub struct GotMgr {
    inner: Arc<Mutex<GotState>>,
    registrar: Arc<dyn MulticastRegistrar>,
    store: Arc<dyn PersistenceStore>,
    config: GotMgrConfig,
}

impl GotMgr {
    /// Create a new GotMgr with an empty table
    pub fn new(
        config: GotMgrConfig,
        registrar: Arc<dyn MulticastRegistrar>,
        store: Arc<dyn PersistenceStore>,
    ) -> Self {
        info!(
            "GotMgr initialized with {} slots on {} scopes",
            config.capacity,
            config.scopes.len()
        );

        let state = GotState {
            table: GroupObjectTable::new(config.capacity),
            device: DeviceInfo::default(),
            multicast: MulticastSync::new(config.scopes.clone()),
            stats: GotMgrStats::default(),
        };

        Self {
            inner: Arc::new(Mutex::new(state)),
            registrar,
            store,
            config,
        }
    }

    pub fn config(&self) -> &GotMgrConfig {
        &self.config
    }

    /// Add an entry to the table
    ///
    /// Rejections leave table, store and subscriptions untouched. Once the
    /// entry is in the table it stays there; later persistence or
    /// multicast failures are returned as warnings.
    #[instrument(skip(self))]
    pub async fn add_entry(&self, entry: GroupObjectEntry) -> KnxMgrResult<CommitReport> {
        let mut state = self.inner.lock().await;
        self.commit_add(&mut state, entry)
    }

    /// Add an entry only while the device is in runtime
    ///
    /// The runtime check and the insertion happen under the same lock, so
    /// a concurrent reset cannot slip in between.
    #[instrument(skip(self))]
    pub async fn add_entry_in_runtime(&self, entry: GroupObjectEntry) -> KnxMgrResult<CommitReport> {
        let mut state = self.inner.lock().await;
        if let Err(e) = state.device.require_runtime() {
            state.stats.rejected += 1;
            debug!("Rejected entry {}: {}", entry.id, e);
            return Err(e);
        }
        self.commit_add(&mut state, entry)
    }

    fn commit_add(&self, state: &mut GotState, entry: GroupObjectEntry) -> KnxMgrResult<CommitReport> {
        let data = serde_json::to_vec(&entry)
            .map_err(|e| KnxMgrError::internal(format!("entry {} not encodable: {}", entry.id, e)))?;
        let id = entry.id;

        let index = match state.table.insert(entry) {
            Ok(index) => index,
            Err(e) => {
                state.stats.rejected += 1;
                debug!("Rejected entry {}: {}", id, e);
                return Err(e);
            }
        };

        let mut report = CommitReport::at(index);
        report.rendered = state
            .table
            .entry(index)
            .map(|entry| entry.render(index))
            .unwrap_or_default();
        state.persist(self.store.as_ref(), &got_store_key(index), &data, &mut report.warnings);
        let warnings = state.resync(self.registrar.as_ref());
        report.warnings.extend(warnings);
        state.stats.entries_added += 1;

        info!("Added Group Object Table entry {} at slot {}", id, index);
        Ok(report)
    }

    /// Remove the entry carrying `id`
    #[instrument(skip(self))]
    pub async fn remove_entry(&self, id: i32) -> KnxMgrResult<CommitReport> {
        let mut state = self.inner.lock().await;

        let (index, entry) = match state.table.remove(id) {
            Ok(removed) => removed,
            Err(e) => {
                state.stats.rejected += 1;
                debug!("Rejected removal of {}: {}", id, e);
                return Err(e);
            }
        };

        let mut report = CommitReport::at(index);
        state.erase(self.store.as_ref(), &got_store_key(index), &mut report.warnings);
        let warnings = state.resync(self.registrar.as_ref());
        report.warnings.extend(warnings);
        state.stats.entries_removed += 1;

        info!(
            "Removed Group Object Table entry {} ({}) from slot {}",
            id, entry.href, index
        );
        Ok(report)
    }

    pub async fn find_index_by_id(&self, id: i32) -> Option<usize> {
        self.inner.lock().await.table.find_index_by_id(id)
    }

    pub async fn find_url_index(&self, uri: &str) -> Option<usize> {
        self.inner.lock().await.table.find_url_index(uri)
    }

    pub async fn count_group_entries(&self, index: usize) -> usize {
        self.inner.lock().await.table.count_group_entries(index)
    }

    /// Snapshot of the entry in slot `index`
    pub async fn entry(&self, index: usize) -> Option<GroupObjectEntry> {
        self.inner.lock().await.table.entry(index).cloned()
    }

    /// Snapshot of every occupied slot
    pub async fn entries(&self) -> Vec<(usize, GroupObjectEntry)> {
        let state = self.inner.lock().await;
        state
            .table
            .iter_occupied()
            .map(|(index, entry)| (index, entry.clone()))
            .collect()
    }

    /// Number of occupied slots
    pub async fn len(&self) -> usize {
        self.inner.lock().await.table.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.table.is_empty()
    }

    /// Group addresses bound to `uri`
    pub async fn group_addresses_for_url(&self, uri: &str) -> Option<Vec<GroupAddress>> {
        let state = self.inner.lock().await;
        let index = state.table.find_url_index(uri)?;
        state.table.entry(index).map(|entry| entry.ga.clone())
    }

    /// URIs that accept writes addressed to `ga`
    pub async fn find_urls_for_group(&self, ga: GroupAddress) -> Vec<String> {
        let state = self.inner.lock().await;
        state
            .table
            .iter_occupied()
            .filter(|(_, entry)| {
                entry.cflags.contains(CommunicationFlags::WRITE) && entry.ga.contains(&ga)
            })
            .map(|(_, entry)| entry.href.clone())
            .collect()
    }

    /// Bring multicast subscriptions in line with the table
    ///
    /// Idempotent. Returns one warning per registrar failure.
    #[instrument(skip(self))]
    pub async fn register_group_multicasts(&self) -> Vec<String> {
        let mut state = self.inner.lock().await;
        state.resync(self.registrar.as_ref())
    }

    /// Groups currently joined
    pub async fn subscribed_groups(&self) -> BTreeSet<GroupAddress> {
        self.inner.lock().await.multicast.subscribed_groups()
    }

    /// Rendering of every occupied slot
    pub async fn show(&self) -> Vec<String> {
        self.inner.lock().await.table.render()
    }

    pub async fn dump_entry(&self, index: usize) -> Option<String> {
        self.inner.lock().await.table.dump_entry(index)
    }

    pub async fn print_entry(&self, index: usize) {
        self.inner.lock().await.table.print_entry(index);
    }

    /// Restore device identity and table from the store
    ///
    /// Undecodable, invalid or duplicate records are skipped with a
    /// warning. Every slot keeps the index it was stored under.
    #[instrument(skip(self))]
    pub async fn load(&self) -> KnxMgrResult<LoadReport> {
        let mut state = self.inner.lock().await;
        let store = self.store.as_ref();
        let mut report = LoadReport::default();
        let capacity = state.table.capacity();

        state.table.clear();
        state.device = restore_device(store, &mut report.warnings);

        for index in 0..capacity {
            let key = got_store_key(index);
            let data = match store.read(&key) {
                Ok(Some(data)) => data,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Failed to read {}: {}", key, e);
                    report.warnings.push(format!("{} not readable: {}", key, e));
                    continue;
                }
            };

            let entry: GroupObjectEntry = match serde_json::from_slice(&data) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping undecodable record {}: {}", key, e);
                    report.warnings.push(format!("{} not decodable: {}", key, e));
                    continue;
                }
            };

            let id = entry.id;
            match state.table.insert_at(index, entry) {
                Ok(()) => {
                    debug!("Restored entry {} into slot {}", id, index);
                    report.entries += 1;
                }
                Err(e) => {
                    warn!("Skipping record {}: {}", key, e);
                    report.warnings.push(format!("{} skipped: {}", key, e));
                }
            }
        }

        match stored_got_indices(store) {
            Ok(indices) => {
                for index in indices.into_iter().filter(|index| *index >= capacity) {
                    let key = got_store_key(index);
                    warn!("Record {} lies outside the {} table slots, not restored", key, capacity);
                    report
                        .warnings
                        .push(format!("{} outside table of {} slots", key, capacity));
                }
            }
            Err(e) => {
                warn!("Failed to list stored records: {}", e);
                report.warnings.push(format!("stored records not listable: {}", e));
            }
        }

        let warnings = state.resync(self.registrar.as_ref());
        report.warnings.extend(warnings);

        info!(
            "Restored {} Group Object Table entries ({} warnings)",
            report.entries,
            report.warnings.len()
        );
        Ok(report)
    }

    /// Wipe the table, identity and every stored record
    ///
    /// Records stored beyond the current capacity are erased too, so they
    /// cannot reappear after a restart with more slots.
    #[instrument(skip(self))]
    pub async fn factory_reset(&self) -> CommitReport {
        let mut state = self.inner.lock().await;
        let store = self.store.as_ref();
        let mut report = CommitReport::default();

        let mut indices: BTreeSet<usize> = (0..self.config.capacity).collect();
        match stored_got_indices(store) {
            Ok(stored) => indices.extend(stored),
            Err(e) => {
                warn!("Failed to list stored records: {}", e);
                state.stats.persist_failures += 1;
                report.warnings.push(format!("stored records not listable: {}", e));
            }
        }

        state.table.clear();
        for index in indices {
            state.erase(store, &got_store_key(index), &mut report.warnings);
        }
        for key in DEVICE_STORAGE_KEYS {
            state.erase(store, key, &mut report.warnings);
        }
        state.device = DeviceInfo::default();

        let registrar = self.registrar.as_ref();
        let warnings = state.multicast.unsubscribe_all(registrar);
        state.stats.multicast_failures += warnings.len() as u64;
        report.warnings.extend(warnings);

        info!("Factory reset complete");
        report
    }

    pub async fn stats(&self) -> GotMgrStats {
        self.inner.lock().await.stats.clone()
    }

    pub async fn device_info(&self) -> DeviceInfo {
        self.inner.lock().await.device.clone()
    }

    pub async fn is_in_runtime(&self) -> bool {
        self.inner.lock().await.device.is_in_runtime()
    }

    /// Set or clear the individual address
    #[instrument(skip(self))]
    pub async fn set_ia(&self, ia: Option<u32>) -> CommitReport {
        let mut state = self.inner.lock().await;
        let mut report = CommitReport::default();
        state.device.ia = ia;
        match ia {
            Some(ia) => state.persist(
                self.store.as_ref(),
                KNX_STORAGE_IA,
                ia.to_string().as_bytes(),
                &mut report.warnings,
            ),
            None => state.erase(self.store.as_ref(), KNX_STORAGE_IA, &mut report.warnings),
        }
        info!("Individual address set to {:?}", ia);
        report
    }

    /// Set the installation id and re-derive multicast addresses
    #[instrument(skip(self))]
    pub async fn set_iid(&self, iid: u64) -> CommitReport {
        let mut state = self.inner.lock().await;
        let mut report = CommitReport::default();
        state.device.iid = Some(iid);
        state.persist(
            self.store.as_ref(),
            KNX_STORAGE_IID,
            iid.to_string().as_bytes(),
            &mut report.warnings,
        );
        let warnings = state.resync(self.registrar.as_ref());
        report.warnings.extend(warnings);
        info!("Installation id set to {}", iid);
        report
    }

    #[instrument(skip(self))]
    pub async fn set_fid(&self, fid: u64) -> CommitReport {
        let mut state = self.inner.lock().await;
        let mut report = CommitReport::default();
        state.device.fid = fid;
        state.persist(
            self.store.as_ref(),
            KNX_STORAGE_FID,
            fid.to_string().as_bytes(),
            &mut report.warnings,
        );
        info!("Fabric id set to {}", fid);
        report
    }

    #[instrument(skip(self))]
    pub async fn set_programming_mode(&self, enabled: bool) -> CommitReport {
        let mut state = self.inner.lock().await;
        let mut report = CommitReport::default();
        state.device.programming_mode = enabled;
        state.persist(
            self.store.as_ref(),
            KNX_STORAGE_PM,
            if enabled { b"1" } else { b"0" },
            &mut report.warnings,
        );
        info!("Programming mode {}", if enabled { "on" } else { "off" });
        report
    }

    /// Load state is owned by the stack and not persisted here
    pub async fn set_load_state(&self, load_state: LoadState) {
        let mut state = self.inner.lock().await;
        state.device.load_state = load_state;
        info!("Load state {}", load_state.as_str());
    }
}

/// Slot indices of every stored table record
fn stored_got_indices(store: &dyn PersistenceStore) -> StoreResult<Vec<usize>> {
    Ok(store
        .list_keys()?
        .iter()
        .filter_map(|key| parse_got_store_key(key))
        .collect())
}

fn restore_value<T: std::str::FromStr>(
    store: &dyn PersistenceStore,
    key: &str,
    warnings: &mut Vec<String>,
) -> Option<T> {
    let data = match store.read(key) {
        Ok(data) => data?,
        Err(e) => {
            warn!("Failed to read {}: {}", key, e);
            warnings.push(format!("{} not readable: {}", key, e));
            return None;
        }
    };
    let parsed = std::str::from_utf8(&data)
        .ok()
        .and_then(|text| text.trim().parse::<T>().ok());
    if parsed.is_none() {
        warn!("Skipping undecodable record {}", key);
        warnings.push(format!("{} not decodable", key));
    }
    parsed
}

fn restore_device(store: &dyn PersistenceStore, warnings: &mut Vec<String>) -> DeviceInfo {
    DeviceInfo {
        ia: restore_value(store, KNX_STORAGE_IA, warnings),
        iid: restore_value(store, KNX_STORAGE_IID, warnings),
        fid: restore_value(store, KNX_STORAGE_FID, warnings).unwrap_or_default(),
        programming_mode: restore_value::<u8>(store, KNX_STORAGE_PM, warnings)
            .is_some_and(|pm| pm != 0),
        load_state: LoadState::default(),
    }
}

#[async_trait]
impl KnxMgr for GotMgr {
    fn name(&self) -> &str {
        "gotmgr"
    }

    fn storage_keys(&self) -> Vec<String> {
        (0..self.config.capacity)
            .map(got_store_key)
            .chain(DEVICE_STORAGE_KEYS.iter().map(|key| key.to_string()))
            .collect()
    }

    async fn restore(&self) -> KnxMgrResult<usize> {
        Ok(self.load().await?.entries)
    }

    async fn reset(&self, code: ResetCode) -> KnxMgrResult<()> {
        match code {
            ResetCode::Restart => {
                info!("Restart requested, configuration kept");
            }
            ResetCode::FactoryReset => {
                self.factory_reset().await;
            }
            ResetCode::ResetIa => {
                self.set_ia(None).await;
            }
        }
        Ok(())
    }

    async fn dump_state(&self) -> Vec<String> {
        let mut lines = self.device_info().await.render();
        lines.extend(self.show().await);
        lines
    }
}
