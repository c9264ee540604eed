//! Common infrastructure for KNX-IoT device managers.
//!
//! This crate provides shared functionality for the KNX manager daemons:
//!
//! - [`shell`]: Operator command shell with OpenThread CLI status codes
//! - [`storage`]: Key/value persistence store with file and memory backends
//! - [`KnxMgr`]: Base trait for managers owning persistent device state
//! - [`error`]: Error types for manager operations
//!
//! # Architecture
//!
//! Managers follow this pattern:
//!
//! 1. Restore persisted state from the store at startup
//! 2. Accept mutations from the command shell and the protocol layer
//! 3. Persist each committed change under its own key
//! 4. Keep derived network state (multicast subscriptions) in sync
//!
//! # Example
//!
//! ```ignore
//! use knx_cfgmgr_common::{
//!     storage::{FileStore, PersistenceStore},
//!     error::KnxMgrResult,
//! };
//!
//! fn store_ia(store: &dyn PersistenceStore, ia: u32) -> KnxMgrResult<()> {
//!     store.write("dev_knx_ia", ia.to_string().as_bytes())?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod manager;
pub mod shell;
pub mod storage;

// Re-export commonly used items at crate root
pub use error::{KnxMgrError, KnxMgrResult};
pub use manager::{KnxMgr, LoadState, ResetCode};
pub use shell::{CommandOutput, Shell, ShellCommand, ShellResponse, ShellStatus};
pub use storage::{FileStore, MemoryStore, PersistenceStore, StoreError, StoreResult};
