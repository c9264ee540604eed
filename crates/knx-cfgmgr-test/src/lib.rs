//! Integration test infrastructure for KNX-IoT device managers
//!
//! Provides:
//! - Recording collaborators with failure injection
//! - A test environment wiring a manager to memory or file storage
//! - Test fixtures for table changes and command lines
//! - Store and subscription verification helpers

mod collaborators;
mod env;
pub mod fixtures;
mod verification;

pub use collaborators::*;
pub use env::GotTestEnv;
pub use fixtures::*;
pub use verification::*;
