//! Data point resources and their metadata queries
//!
//! A GET carrying `m` query values returns a metadata object instead of the
//! data point value. Objects are built as JSON values; the CBOR encoding on
//! the wire belongs to the protocol stack.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::got_mgr::GotMgr;
use crate::tables::{meta, resource};

/// Key of the unique identifier in a metadata object
pub const ID_KEY: &str = "0";

/// Key of the data point value
pub const VALUE_KEY: &str = "1";

/// One data point resource of the application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub uri: String,
    /// Resource type
    pub rt: String,
    pub interface: String,
    /// Data point type
    pub dpt: String,
}

impl Resource {
    /// Switching actuator data point at `uri`
    pub fn actuator(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            rt: resource::RT_ACTUATOR.to_string(),
            interface: resource::IF_ACTUATOR.to_string(),
            dpt: resource::DPT_SWITCH.to_string(),
        }
    }

    /// Push button sensor data point at `uri`
    pub fn sensor(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            rt: resource::RT_SENSOR.to_string(),
            interface: resource::IF_SENSOR.to_string(),
            dpt: resource::DPT_SWITCH.to_string(),
        }
    }

    /// Unique identifier, `urn:knx:sn:<serial><uri>`
    pub fn unique_id(&self, serial: &str) -> String {
        format!("{}{}{}", resource::ID_PREFIX, serial, self.uri)
    }
}

fn wants(values: &[&str], name: &str) -> bool {
    values.iter().any(|v| *v == name || *v == meta::ALL)
}

/// Metadata object for the `m` query values
///
/// Unknown values are ignored. `ga` is omitted when no table entry is
/// bound to the resource.
pub async fn metadata(mgr: &GotMgr, serial: &str, res: &Resource, values: &[&str]) -> Value {
    let mut object = Map::new();

    if wants(values, meta::ID) {
        object.insert(ID_KEY.to_string(), Value::from(res.unique_id(serial)));
    }
    if wants(values, meta::RT) {
        object.insert(meta::RT.to_string(), Value::from(res.rt.clone()));
    }
    if wants(values, meta::IF) {
        object.insert(meta::IF.to_string(), Value::from(res.interface.clone()));
    }
    if wants(values, meta::DPT) {
        object.insert(meta::DPT.to_string(), Value::from(res.dpt.clone()));
    }
    if wants(values, meta::GA) {
        match mgr.group_addresses_for_url(&res.uri).await {
            Some(ga) => {
                object.insert(meta::GA.to_string(), Value::from(ga));
            }
            None => debug!("No Group Object Table entry for {}", res.uri),
        }
    }

    Value::Object(object)
}

/// Value object returned by a plain GET
pub fn value_object(state: bool) -> Value {
    let mut object = Map::new();
    object.insert(VALUE_KEY.to_string(), Value::Bool(state));
    Value::Object(object)
}

/// New data point value carried by a PUT payload
pub fn parse_value_update(payload: &Value) -> Option<bool> {
    payload.get(VALUE_KEY).and_then(Value::as_bool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::got_mgr::GotMgrConfig;
    use crate::multicast::LoggingRegistrar;
    use crate::tables::FIRST_URI_PATH;
    use crate::types::GroupObjectEntry;
    use knx_cfgmgr_common::MemoryStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn mgr() -> GotMgr {
        GotMgr::new(
            GotMgrConfig::default(),
            Arc::new(LoggingRegistrar::new()),
            Arc::new(MemoryStore::new()),
        )
    }

    #[test]
    fn test_unique_id() {
        let res = Resource::actuator(FIRST_URI_PATH);
        assert_eq!(res.unique_id("deadbeef0002"), "urn:knx:sn:deadbeef0002/p/o_1_1");
    }

    #[tokio::test]
    async fn test_metadata_all() {
        let mgr = mgr();
        mgr.add_entry(GroupObjectEntry::new(1, FIRST_URI_PATH, 20, vec![1, 5]))
            .await
            .unwrap();

        let value = metadata(&mgr, "deadbeef0002", &Resource::actuator(FIRST_URI_PATH), &["*"]).await;
        assert_eq!(
            value,
            json!({
                "0": "urn:knx:sn:deadbeef0002/p/o_1_1",
                "rt": "urn:knx:dpa.417.61",
                "if": "if.a",
                "dpt": "urn:knx:dpt.switch",
                "ga": [1, 5]
            })
        );
    }

    #[tokio::test]
    async fn test_metadata_selected_values() {
        let mgr = mgr();
        let res = Resource::sensor(FIRST_URI_PATH);

        let value = metadata(&mgr, "deadbeef0001", &res, &["rt", "if", "bogus"]).await;
        assert_eq!(value, json!({"rt": "urn:knx:dpa.421.61", "if": "if.s"}));
    }

    #[tokio::test]
    async fn test_metadata_ga_omitted_without_entry() {
        let mgr = mgr();
        let value = metadata(&mgr, "x", &Resource::sensor("/p/o_1_2"), &["ga"]).await;
        assert_eq!(value, json!({}));
    }

    #[test]
    fn test_value_object() {
        assert_eq!(value_object(true), json!({"1": true}));
        assert_eq!(parse_value_update(&json!({"1": false})), Some(false));
        assert_eq!(parse_value_update(&json!({"1": 3})), None);
        assert_eq!(parse_value_update(&json!({})), None);
    }
}
