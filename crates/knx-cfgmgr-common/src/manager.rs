//! Manager trait and common abstractions.
//!
//! This module provides the base trait implemented by every KNX manager,
//! together with the device load-state and reset-code enums shared by the
//! command shell and the managers.

use async_trait::async_trait;

use crate::error::KnxMgrResult;

/// KNX load-state machine states relevant to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadState {
    /// Application not configured.
    #[default]
    Unloaded,
    /// Configuration download in progress.
    Loading,
    /// Application configured and running.
    Loaded,
    /// Last load failed.
    Error,
}

impl LoadState {
    /// Returns the state name as used by the `/a/lsm` resource.
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadState::Unloaded => "unloaded",
            LoadState::Loading => "loading",
            LoadState::Loaded => "loaded",
            LoadState::Error => "error",
        }
    }
}

/// KNX reset codes accepted by device storage reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResetCode {
    /// Restart the application; configuration is kept.
    Restart,
    /// Reset to factory defaults, wiping tables and identity.
    FactoryReset,
    /// Clear the individual address only.
    ResetIa,
}

impl ResetCode {
    /// Returns the numeric code.
    pub fn code(&self) -> u8 {
        match self {
            ResetCode::Restart => 1,
            ResetCode::FactoryReset => 2,
            ResetCode::ResetIa => 3,
        }
    }

    /// Parses a numeric code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(ResetCode::Restart),
            2 => Some(ResetCode::FactoryReset),
            3 => Some(ResetCode::ResetIa),
            _ => None,
        }
    }
}

/// Base trait for KNX manager components.
///
/// Managers own a piece of persistent device state. The daemon restores
/// every manager at startup and forwards reset requests to all of them.
///
/// # Example
///
/// ```ignore
/// use knx_cfgmgr_common::{KnxMgr, KnxMgrResult, ResetCode};
///
/// struct MyMgr;
///
/// #[async_trait]
/// impl KnxMgr for MyMgr {
///     fn name(&self) -> &str { "mymgr" }
///     fn storage_keys(&self) -> Vec<String> { vec!["my_key".to_string()] }
///     async fn restore(&self) -> KnxMgrResult<usize> { Ok(0) }
///     async fn reset(&self, _code: ResetCode) -> KnxMgrResult<()> { Ok(()) }
/// }
/// ```
#[async_trait]
pub trait KnxMgr: Send + Sync {
    /// Returns the manager name (for logging).
    fn name(&self) -> &str;

    /// Returns every storage key this manager may write.
    fn storage_keys(&self) -> Vec<String>;

    /// Restores state from the persistence store.
    ///
    /// Returns the number of records restored.
    async fn restore(&self) -> KnxMgrResult<usize>;

    /// Applies a device reset.
    async fn reset(&self, code: ResetCode) -> KnxMgrResult<()>;

    /// Dumps current state for debugging.
    async fn dump_state(&self) -> Vec<String> {
        vec![]
    }
}
