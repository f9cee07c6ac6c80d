//! Stats socket request and response messages.

use crate::error::{Result, VigilError};
use crate::types::{DomainStats, Filesystem, Vm};
use serde::{Deserialize, Serialize};

/// Request sent to a VM's stats socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum StatsRequest {
    /// Current domain stats
    DomainStats,
    /// Guest filesystem usage
    Filesystems,
    /// VM identity and migration state
    VmInfo,
}

/// Response from a VM's stats socket.
///
/// Only the fields relevant to the request are set. A non-empty `error`
/// means the request failed on the server side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Whether the domain still exists (`domain_stats`)
    pub exists: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<DomainStats>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filesystems: Vec<Filesystem>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vm: Option<Vm>,
}

impl StatsResponse {
    pub fn error(message: impl Into<String>) -> Self {
        Self { error: Some(message.into()), ..Default::default() }
    }

    /// Turn a server-side error into `Err`.
    pub fn into_result(self) -> Result<Self> {
        match self.error {
            Some(message) if !message.is_empty() => Err(VigilError::Remote { message }),
            _ => Ok(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_names() {
        let json = serde_json::to_string(&StatsRequest::Filesystems).unwrap();
        assert_eq!(json, r#"{"method":"filesystems"}"#);
        let parsed: StatsRequest = serde_json::from_str(r#"{"method":"vm_info"}"#).unwrap();
        assert_eq!(parsed, StatsRequest::VmInfo);
    }

    #[test]
    fn test_error_response() {
        let resp: StatsResponse = serde_json::from_str(r#"{"error":"domain locked"}"#).unwrap();
        match resp.into_result() {
            Err(VigilError::Remote { message }) => assert_eq!(message, "domain locked"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_partial_response() {
        let resp: StatsResponse =
            serde_json::from_str(r#"{"exists":true,"stats":{"name":"dom"}}"#).unwrap();
        let resp = resp.into_result().unwrap();
        assert!(resp.exists);
        assert_eq!(resp.stats.unwrap().name, "dom");
        assert!(resp.filesystems.is_empty());
    }
}
