//! Storage key and resource constants for knx-gotd

/// Number of Group Object Table slots on the device
pub const GOT_MAX_ENTRIES: usize = 20;

// Persistence store keys
/// Prefix of the per-slot Group Object Table keys (`GOT_STORE_<index>`)
pub const GOT_STORE_PREFIX: &str = "GOT_STORE";

/// Individual address key
pub const KNX_STORAGE_IA: &str = "dev_knx_ia";

/// Installation identifier key
pub const KNX_STORAGE_IID: &str = "dev_knx_iid";

/// Fabric identifier key
pub const KNX_STORAGE_FID: &str = "dev_knx_fid";

/// Programming mode key
pub const KNX_STORAGE_PM: &str = "dev_knx_pm";

/// Every device identity key, in restore order
pub const DEVICE_STORAGE_KEYS: [&str; 4] = [
    KNX_STORAGE_IA,
    KNX_STORAGE_IID,
    KNX_STORAGE_FID,
    KNX_STORAGE_PM,
];

/// Returns the storage key of a Group Object Table slot
pub fn got_store_key(index: usize) -> String {
    format!("{}_{}", GOT_STORE_PREFIX, index)
}

/// Slot index of a Group Object Table storage key
///
/// Only keys produced by [`got_store_key`] are recognized.
pub fn parse_got_store_key(key: &str) -> Option<usize> {
    let index: usize = key
        .strip_prefix(GOT_STORE_PREFIX)?
        .strip_prefix('_')?
        .parse()
        .ok()?;
    (got_store_key(index) == key).then_some(index)
}

// Application resources
/// URI of the first data point
pub const FIRST_URI_PATH: &str = "/p/o_1_1";

/// URI of the second data point
pub const SECOND_URI_PATH: &str = "/p/o_1_2";

/// Resource metadata values
pub mod resource {
    /// Switching actuator data point (LSAB)
    pub const RT_ACTUATOR: &str = "urn:knx:dpa.417.61";

    /// Push button sensor data point (LSSB)
    pub const RT_SENSOR: &str = "urn:knx:dpa.421.61";

    /// Switch data point type
    pub const DPT_SWITCH: &str = "urn:knx:dpt.switch";

    /// Actuator interface
    pub const IF_ACTUATOR: &str = "if.a";

    /// Sensor interface
    pub const IF_SENSOR: &str = "if.s";

    /// Prefix of the unique resource identifier
    pub const ID_PREFIX: &str = "urn:knx:sn:";
}

/// Query parameter values understood by the metadata handler
pub mod meta {
    /// Unique identifier
    pub const ID: &str = "id";

    /// Resource type
    pub const RT: &str = "rt";

    /// Interface
    pub const IF: &str = "if";

    /// Data point type
    pub const DPT: &str = "dpt";

    /// Group addresses
    pub const GA: &str = "ga";

    /// Every value above
    pub const ALL: &str = "*";
}
