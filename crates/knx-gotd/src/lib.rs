//! KNX-IoT Group Object Table manager daemon
//!
//! Owns the Group Object Table of a KNX-IoT device: the fixed set of slots
//! binding data point URIs to group addresses. The table is changed from the
//! operator shell, by provisioning and by factory reset; every change is
//! persisted per slot and keeps the joined IPv6 multicast groups in sync.

pub mod app;
mod commands;
mod device;
mod got_mgr;
pub mod multicast;
pub mod query;
pub mod s_mode;
mod table;
mod tables;
mod types;

pub use app::{event_channel, AppKind, DeviceEvent, KnxApp};
pub use commands::*;
pub use device::DeviceInfo;
pub use got_mgr::{GotMgr, GotMgrConfig};
pub use multicast::{group_multicast_address, LoggingRegistrar, MulticastRegistrar, MulticastScope};
pub use s_mode::{LoggingSModeSender, SModeMessage, SModeSender, SModeService};
pub use table::GroupObjectTable;
pub use tables::*;
pub use types::*;
