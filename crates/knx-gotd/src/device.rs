//! Device identity held next to the Group Object Table

use knx_cfgmgr_common::{KnxMgrError, KnxMgrResult, LoadState};

/// Identity and mode of the device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Individual address
    pub ia: Option<u32>,
    /// Installation identifier
    pub iid: Option<u64>,
    /// Fabric identifier
    pub fid: u64,
    pub programming_mode: bool,
    pub load_state: LoadState,
}

impl DeviceInfo {
    /// True when addressed, part of an installation and loaded
    pub fn is_in_runtime(&self) -> bool {
        self.ia.is_some() && self.iid.is_some() && self.load_state == LoadState::Loaded
    }

    /// Installation id used for multicast derivation
    pub fn multicast_iid(&self) -> u64 {
        self.iid.unwrap_or(0)
    }

    /// Rejects the request unless the device is in runtime
    pub fn require_runtime(&self) -> KnxMgrResult<()> {
        if self.is_in_runtime() {
            return Ok(());
        }
        Err(KnxMgrError::invalid_state(format!(
            "device not in runtime (ia: {}, iid: {}, load state: {})",
            self.ia.map_or_else(|| "unset".to_string(), |ia| ia.to_string()),
            self.iid.map_or_else(|| "unset".to_string(), |iid| iid.to_string()),
            self.load_state.as_str()
        )))
    }

    /// Lines printed by the identity commands
    pub fn render(&self) -> Vec<String> {
        vec![
            format!("ia   : {}", self.ia.map_or_else(|| "unset".to_string(), |v| v.to_string())),
            format!("iid  : {}", self.iid.map_or_else(|| "unset".to_string(), |v| v.to_string())),
            format!("fid  : {}", self.fid),
            format!("pm   : {}", u8::from(self.programming_mode)),
            format!("lsm  : {}", self.load_state.as_str()),
        ]
    }
}
