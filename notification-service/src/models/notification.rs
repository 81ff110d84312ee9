use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    WhatsApp,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::WhatsApp => "whatsapp",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a successful dispatch, returned to callers and kept for
/// idempotent replays.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchReceipt {
    pub notification_id: Uuid,
    pub channel: Channel,
    pub provider: String,
    pub provider_id: Option<String>,
    /// Calls made to the provider, including retries.
    pub attempts: u32,
    pub sent_utc: DateTime<Utc>,
    /// True when this receipt was served from an earlier request with the same key.
    #[serde(default)]
    pub replayed: bool,
}
