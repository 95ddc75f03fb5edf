use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Header carrying the caller's identity on every request and on the feed
/// handshake.
pub const IDENTITY_HEADER: &str = "X-Identity";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Delete,
}

/// One add/delete notification, as pushed by the feed and returned by the
/// recent-changes endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub domains: Vec<String>,
}

/// The remote reputation service, abstracted for mocking.
#[async_trait::async_trait]
pub trait ReputationRemote: Send + Sync {
    /// Every domain currently flagged by the service.
    async fn fetch_full_list(&self) -> Result<Vec<String>>;

    async fn check_domain(&self, domain: &str) -> Result<bool>;

    async fn fetch_database_size(&self) -> Result<u64>;

    /// Changes within the last `seconds` (1..=604800, validated by the caller).
    async fn fetch_recent(&self, seconds: u32) -> Result<Vec<ChangeEvent>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_event_wire_shape() {
        let event: ChangeEvent =
            serde_json::from_str(r#"{"type":"delete","domains":["a.example","b.example"]}"#)
                .unwrap();
        assert_eq!(event.kind, ChangeKind::Delete);
        assert_eq!(event.domains, vec!["a.example", "b.example"]);

        let json = serde_json::to_value(ChangeEvent {
            kind: ChangeKind::Add,
            domains: vec!["evil.example".into()],
        })
        .unwrap();
        assert_eq!(json["type"], "add");
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let res = serde_json::from_str::<ChangeEvent>(r#"{"type":"rename","domains":[]}"#);
        assert!(res.is_err());
    }
}
