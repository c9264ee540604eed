//! S-mode group messages emitted by the device

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::multicast::MulticastScope;
use crate::types::GroupAddress;

/// S-mode service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SModeService {
    /// Group value write (`w`)
    #[serde(rename = "w")]
    Write,
    /// Group value read (`r`)
    #[serde(rename = "r")]
    Read,
    /// Group value response (`a`)
    #[serde(rename = "a")]
    Response,
}

impl SModeService {
    pub fn as_str(&self) -> &'static str {
        match self {
            SModeService::Write => "w",
            SModeService::Read => "r",
            SModeService::Response => "a",
        }
    }
}

impl fmt::Display for SModeService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One S-mode message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SModeMessage {
    pub scope: MulticastScope,
    /// Resource the value belongs to
    pub uri: String,
    pub ga: GroupAddress,
    pub service: SModeService,
    pub value: bool,
}

/// Transmit side of S-mode messaging
pub trait SModeSender: Send + Sync {
    fn send(&self, message: &SModeMessage) -> Result<(), String>;
}

/// Sender that only logs
#[derive(Debug, Default)]
pub struct LoggingSModeSender;

impl SModeSender for LoggingSModeSender {
    fn send(&self, message: &SModeMessage) -> Result<(), String> {
        info!(
            "S-mode {} {} = {} to group {} (scope {})",
            message.service,
            message.uri,
            message.value,
            message.ga,
            message.scope.value()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_names() {
        assert_eq!(SModeService::Write.to_string(), "w");
        assert_eq!(
            serde_json::to_value(SModeService::Response).unwrap(),
            serde_json::json!("a")
        );
    }

    #[test]
    fn test_logging_sender() {
        let message = SModeMessage {
            scope: MulticastScope::SiteLocal,
            uri: "/p/o_1_1".to_string(),
            ga: 1,
            service: SModeService::Write,
            value: true,
        };
        assert!(LoggingSModeSender.send(&message).is_ok());
    }
}
