//! Device application task
//!
//! Button presses, group writes and operator command lines arrive as
//! [`DeviceEvent`] messages on one channel and are handled in order by
//! [`KnxApp::run`].

use std::sync::Arc;

use clap::ValueEnum;
use knx_cfgmgr_common::{Shell, ShellResponse};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::commands::build_shell;
use crate::got_mgr::GotMgr;
use crate::query::{metadata, parse_value_update, value_object, Resource};
use crate::s_mode::{SModeMessage, SModeSender, SModeService};
use crate::tables::{FIRST_URI_PATH, SECOND_URI_PATH};
use crate::types::GroupAddress;

/// Depth of the event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Example application profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AppKind {
    /// Light switching actuator (LSAB 417)
    Actuator,
    /// Push button sensor (LSSB 421.61)
    Sensor,
}

impl AppKind {
    /// Device serial number
    pub fn serial(&self) -> &'static str {
        match self {
            AppKind::Actuator => "deadbeef0002",
            AppKind::Sensor => "deadbeef0001",
        }
    }

    /// Application name
    pub fn name(&self) -> &'static str {
        match self {
            AppKind::Actuator => "Actuator (LSAB) 417",
            AppKind::Sensor => "Sensor (LSSB) 421.61",
        }
    }

    /// Data points, indexed by button
    pub fn resources(&self) -> Vec<Resource> {
        [FIRST_URI_PATH, SECOND_URI_PATH]
            .into_iter()
            .map(|uri| match self {
                AppKind::Actuator => Resource::actuator(uri),
                AppKind::Sensor => Resource::sensor(uri),
            })
            .collect()
    }
}

/// Message delivered to the application task
#[derive(Debug)]
pub enum DeviceEvent {
    /// Board button `index` was pressed
    ButtonPressed { index: usize },
    /// A group value write was received
    GroupWrite { ga: GroupAddress, value: bool },
    /// Operator command line, answered on `reply`
    Command {
        line: String,
        reply: oneshot::Sender<ShellResponse>,
    },
    Shutdown,
}

/// Create the event channel of the application task
pub fn event_channel() -> (mpsc::Sender<DeviceEvent>, mpsc::Receiver<DeviceEvent>) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}

/// Application state and event handling
pub struct KnxApp {
    kind: AppKind,
    mgr: GotMgr,
    shell: Shell,
    sender: Arc<dyn SModeSender>,
    resources: Vec<Resource>,
    states: Vec<bool>,
}

impl KnxApp {
    pub fn new(kind: AppKind, mgr: GotMgr, sender: Arc<dyn SModeSender>) -> Self {
        let resources = kind.resources();
        let states = vec![false; resources.len()];
        info!(
            "{} application, serial {}, {} data points",
            kind.name(),
            kind.serial(),
            resources.len()
        );
        Self {
            kind,
            shell: build_shell(&mgr),
            mgr,
            sender,
            resources,
            states,
        }
    }

    pub fn kind(&self) -> AppKind {
        self.kind
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Local value of data point `index`
    pub fn state(&self, index: usize) -> Option<bool> {
        self.states.get(index).copied()
    }

    pub fn shell(&self) -> &Shell {
        &self.shell
    }

    /// Toggle data point `index` and announce the new value
    ///
    /// The value is sent to the first group address of the entry bound to
    /// the data point, once per configured scope. Returns the messages sent.
    pub async fn button_pressed(&mut self, index: usize) -> Vec<SModeMessage> {
        let Some(state) = self.states.get_mut(index) else {
            warn!("No data point for button {}", index);
            return Vec::new();
        };
        *state = !*state;
        let value = *state;
        let uri = self.resources[index].uri.clone();

        if !self.mgr.is_in_runtime().await {
            warn!("KNX app is not running or parameters are not set, ignoring button pressing");
            return Vec::new();
        }

        let Some(ga) = self
            .mgr
            .group_addresses_for_url(&uri)
            .await
            .and_then(|ga| ga.first().copied())
        else {
            warn!("No group address bound to {}, ignoring button pressing", uri);
            return Vec::new();
        };

        let mut sent = Vec::new();
        for scope in self.mgr.config().scopes.iter().copied() {
            let message = SModeMessage {
                scope,
                uri: uri.clone(),
                ga,
                service: SModeService::Write,
                value,
            };
            match self.sender.send(&message) {
                Ok(()) => sent.push(message),
                Err(e) => warn!("Failed to send S-mode message on scope {}: {}", scope.value(), e),
            }
        }
        sent
    }

    /// Apply a received group write to every data point listening on `ga`
    ///
    /// Returns the URIs whose value changed.
    pub async fn group_write(&mut self, ga: GroupAddress, value: bool) -> Vec<String> {
        let uris = self.mgr.find_urls_for_group(ga).await;
        let mut updated = Vec::new();
        for (resource, state) in self.resources.iter().zip(self.states.iter_mut()) {
            if uris.contains(&resource.uri) {
                *state = value;
                info!("{} set to {} by group {}", resource.uri, value, ga);
                updated.push(resource.uri.clone());
            }
        }
        if updated.is_empty() {
            debug!("Group write to {} matched no data point", ga);
        }
        updated
    }

    /// GET on data point `index`
    ///
    /// With `m` query values the metadata object is returned, otherwise the
    /// current value.
    pub async fn get(&self, index: usize, query_values: &[&str]) -> Option<Value> {
        let resource = self.resources.get(index)?;
        if query_values.is_empty() {
            return self.state(index).map(value_object);
        }
        Some(metadata(&self.mgr, self.kind.serial(), resource, query_values).await)
    }

    /// PUT on data point `index`; false for a payload without a value
    pub fn put(&mut self, index: usize, payload: &Value) -> bool {
        let (Some(state), Some(value)) = (self.states.get_mut(index), parse_value_update(payload))
        else {
            return false;
        };
        *state = value;
        info!("{} set to {}", self.resources[index].uri, value);
        true
    }

    /// Handle one event; returns false on shutdown
    pub async fn handle_event(&mut self, event: DeviceEvent) -> bool {
        match event {
            DeviceEvent::ButtonPressed { index } => {
                self.button_pressed(index).await;
            }
            DeviceEvent::GroupWrite { ga, value } => {
                self.group_write(ga, value).await;
            }
            DeviceEvent::Command { line, reply } => {
                let response = self.shell.execute(&line).await;
                if reply.send(response).is_err() {
                    debug!("Command reply receiver dropped");
                }
            }
            DeviceEvent::Shutdown => {
                info!("Application shutting down");
                return false;
            }
        }
        true
    }

    /// Process events until shutdown or until every sender is gone
    pub async fn run(mut self, mut events: mpsc::Receiver<DeviceEvent>) {
        info!("Application event loop started");
        while let Some(event) = events.recv().await {
            if !self.handle_event(event).await {
                break;
            }
        }
        info!("Application event loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::got_mgr::GotMgrConfig;
    use crate::multicast::{LoggingRegistrar, MulticastScope};
    use crate::types::GroupObjectEntry;
    use knx_cfgmgr_common::{LoadState, MemoryStore};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockSender {
        sent: Mutex<Vec<SModeMessage>>,
    }

    impl SModeSender for MockSender {
        fn send(&self, message: &SModeMessage) -> Result<(), String> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    async fn app() -> (KnxApp, GotMgr, Arc<MockSender>) {
        let mgr = GotMgr::new(
            GotMgrConfig::default(),
            Arc::new(LoggingRegistrar::new()),
            Arc::new(MemoryStore::new()),
        );
        let sender = Arc::new(MockSender::default());
        let app = KnxApp::new(AppKind::Sensor, mgr.clone(), sender.clone());
        (app, mgr, sender)
    }

    async fn enter_runtime(mgr: &GotMgr) {
        mgr.set_ia(Some(1)).await;
        mgr.set_iid(1).await;
        mgr.set_load_state(LoadState::Loaded).await;
    }

    #[test]
    fn test_app_kind() {
        assert_eq!(AppKind::Actuator.serial(), "deadbeef0002");
        assert_eq!(AppKind::Sensor.name(), "Sensor (LSSB) 421.61");
        let resources = AppKind::Sensor.resources();
        assert_eq!(resources[1].uri, SECOND_URI_PATH);
        assert_eq!(resources[0].rt, "urn:knx:dpa.421.61");
    }

    #[tokio::test]
    async fn test_button_ignored_outside_runtime() {
        let (mut app, _, sender) = app().await;
        assert!(app.button_pressed(0).await.is_empty());
        assert_eq!(app.state(0), Some(true));
        assert!(sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_button_sends_on_both_scopes() {
        let (mut app, mgr, sender) = app().await;
        enter_runtime(&mgr).await;
        mgr.add_entry(GroupObjectEntry::new(1, FIRST_URI_PATH, 20, vec![7, 8]))
            .await
            .unwrap();

        let sent = app.button_pressed(0).await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].scope, MulticastScope::LinkLocal);
        assert_eq!(sent[1].scope, MulticastScope::SiteLocal);
        assert!(sent.iter().all(|m| m.ga == 7 && m.value && m.service == SModeService::Write));
        assert_eq!(sender.sent.lock().unwrap().len(), 2);

        let sent = app.button_pressed(0).await;
        assert!(!sent[0].value);
    }

    #[tokio::test]
    async fn test_button_without_entry() {
        let (mut app, mgr, _) = app().await;
        enter_runtime(&mgr).await;
        assert!(app.button_pressed(1).await.is_empty());
        assert!(app.button_pressed(5).await.is_empty());
    }

    #[tokio::test]
    async fn test_group_write_updates_listeners() {
        let (mut app, mgr, _) = app().await;
        mgr.add_entry(GroupObjectEntry::new(1, SECOND_URI_PATH, 20, vec![3]))
            .await
            .unwrap();

        assert_eq!(app.group_write(3, true).await, vec![SECOND_URI_PATH.to_string()]);
        assert_eq!(app.state(1), Some(true));
        assert!(app.group_write(4, true).await.is_empty());
    }

    #[tokio::test]
    async fn test_get_and_put() {
        let (mut app, mgr, _) = app().await;
        mgr.add_entry(GroupObjectEntry::new(1, FIRST_URI_PATH, 20, vec![9]))
            .await
            .unwrap();

        assert_eq!(app.get(0, &[]).await, Some(serde_json::json!({"1": false})));
        assert!(app.put(0, &serde_json::json!({"1": true})));
        assert_eq!(app.state(0), Some(true));
        assert!(!app.put(0, &serde_json::json!({"value": true})));
        assert!(!app.put(4, &serde_json::json!({"1": true})));

        let meta = app.get(0, &["ga", "id"]).await.unwrap();
        assert_eq!(meta["ga"], serde_json::json!([9]));
        assert_eq!(meta["0"], "urn:knx:sn:deadbeef0001/p/o_1_1");
        assert_eq!(app.get(3, &["*"]).await, None);
    }

    #[tokio::test]
    async fn test_run_event_loop() {
        let (app, mgr, _) = app().await;
        enter_runtime(&mgr).await;
        let (tx, rx) = event_channel();
        let task = tokio::spawn(app.run(rx));

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(DeviceEvent::Command {
            line: "knx_got add 1 /p/o_1_1 20 ga 1".to_string(),
            reply: reply_tx,
        })
        .await
        .unwrap();
        assert!(reply_rx.await.unwrap().is_done());

        tx.send(DeviceEvent::ButtonPressed { index: 0 }).await.unwrap();
        tx.send(DeviceEvent::Shutdown).await.unwrap();
        task.await.unwrap();

        assert_eq!(mgr.find_index_by_id(1).await, Some(0));
    }
}
