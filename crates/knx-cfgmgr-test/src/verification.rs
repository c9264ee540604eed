//! Verification helpers for Group Object Table tests
//!
//! Checks the manager's table against its store and the registrar.

use std::collections::BTreeSet;

use knx_cfgmgr_common::StoreError;
use knx_gotd::{got_store_key, parse_got_store_key, GroupAddress, GroupObjectEntry};
use thiserror::Error;

use crate::env::GotTestEnv;

/// Verification error types
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Expected entry {id} not found in the table")]
    EntryNotFound { id: i32 },

    #[error("Entry mismatch at slot {index}: expected {expected:?}, got {actual:?}")]
    EntryMismatch {
        index: usize,
        expected: Box<GroupObjectEntry>,
        actual: Box<GroupObjectEntry>,
    },

    #[error("Expected key '{key}' not found in the store")]
    KeyNotFound { key: String },

    #[error("Key '{key}' unexpectedly present in the store")]
    UnexpectedKey { key: String },

    #[error("Record '{key}' does not decode: {message}")]
    Undecodable { key: String, message: String },

    #[error("Subscriptions mismatch: expected {expected:?}, got {actual:?}")]
    SubscriptionMismatch {
        expected: BTreeSet<GroupAddress>,
        actual: BTreeSet<GroupAddress>,
    },
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

/// Table, store and subscription verifier
pub struct StateVerifier<'a> {
    env: &'a GotTestEnv,
}

impl<'a> StateVerifier<'a> {
    pub fn new(env: &'a GotTestEnv) -> Self {
        Self { env }
    }

    /// Verify that `expected` is in the table, returning its slot
    pub async fn assert_entry(&self, expected: &GroupObjectEntry) -> VerifyResult<usize> {
        let mgr = &self.env.mgr;
        let index = mgr
            .find_index_by_id(expected.id)
            .await
            .ok_or(VerificationError::EntryNotFound { id: expected.id })?;
        let actual = mgr
            .entry(index)
            .await
            .ok_or(VerificationError::EntryNotFound { id: expected.id })?;

        if &actual != expected || mgr.find_url_index(&expected.href).await != Some(index) {
            return Err(VerificationError::EntryMismatch {
                index,
                expected: Box::new(expected.clone()),
                actual: Box::new(actual),
            });
        }
        Ok(index)
    }

    /// Verify the record stored for slot `index`
    pub fn assert_stored(&self, index: usize, expected: &GroupObjectEntry) -> VerifyResult<()> {
        let key = got_store_key(index);
        let data = self
            .env
            .store()
            .read(&key)?
            .ok_or_else(|| VerificationError::KeyNotFound { key: key.clone() })?;
        let actual: GroupObjectEntry =
            serde_json::from_slice(&data).map_err(|e| VerificationError::Undecodable {
                key: key.clone(),
                message: e.to_string(),
            })?;

        if &actual != expected {
            return Err(VerificationError::EntryMismatch {
                index,
                expected: Box::new(expected.clone()),
                actual: Box::new(actual),
            });
        }
        Ok(())
    }

    /// Verify that nothing is stored under `key`
    pub fn assert_key_absent(&self, key: &str) -> VerifyResult<()> {
        match self.env.store().read(key)? {
            Some(_) => Err(VerificationError::UnexpectedKey {
                key: key.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Verify that no table record is stored, whatever its slot
    pub fn assert_no_table_records(&self) -> VerifyResult<()> {
        for key in self.env.store().list_keys()? {
            if parse_got_store_key(&key).is_some() {
                return Err(VerificationError::UnexpectedKey { key });
            }
        }
        for index in 0..self.env.mgr.config().capacity {
            self.assert_key_absent(&got_store_key(index))?;
        }
        Ok(())
    }

    /// Verify that the manager and the registrar both hold `expected`
    pub async fn assert_subscriptions(&self, expected: &BTreeSet<GroupAddress>) -> VerifyResult<()> {
        let recorded = self.env.mgr.subscribed_groups().await;
        let joined = self.env.registrar.joined();
        for actual in [recorded, joined] {
            if &actual != expected {
                return Err(VerificationError::SubscriptionMismatch {
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        Ok(())
    }

    /// Verify that joined groups equal the union of the table's addresses
    pub async fn assert_subscriptions_match_table(&self) -> VerifyResult<()> {
        let required: BTreeSet<GroupAddress> = self
            .env
            .mgr
            .entries()
            .await
            .into_iter()
            .flat_map(|(_, entry)| entry.ga)
            .collect();
        self.assert_subscriptions(&required).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_state_verifier() {
        let env = GotTestEnv::memory(4);
        let entry = GroupObjectEntry::new(1, "/p/o_1_1", 20, vec![1]);
        env.mgr.add_entry(entry.clone()).await.unwrap();

        let verifier = StateVerifier::new(&env);
        assert_eq!(verifier.assert_entry(&entry).await.unwrap(), 0);
        assert!(verifier.assert_stored(0, &entry).is_ok());
        assert!(verifier.assert_subscriptions_match_table().await.is_ok());
        assert!(verifier.assert_key_absent("GOT_STORE_1").is_ok());

        let other = GroupObjectEntry::new(1, "/p/o_1_1", 20, vec![2]);
        assert!(matches!(
            verifier.assert_entry(&other).await,
            Err(VerificationError::EntryMismatch { .. })
        ));
        assert!(verifier.assert_key_absent("GOT_STORE_0").is_err());
        assert!(verifier.assert_no_table_records().is_err());
    }
}
