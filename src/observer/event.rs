use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallState {
    Ringing,
    Connected,
    Held,
    Disconnected,
    Unknown,
}

impl From<String> for CallState {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "RINGING" | "ALERTING" => Self::Ringing,
            "CONNECTED" | "ACTIVE" => Self::Connected,
            "HELD" | "ON_HOLD" => Self::Held,
            "DISCONNECTED" | "ENDED" => Self::Disconnected,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallDirection {
    Inbound,
    Outbound,
    Unknown,
}

impl From<String> for CallDirection {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "INBOUND" | "RECEIVED" | "INCOMING" => Self::Inbound,
            "OUTBOUND" | "OUTGOING" | "DIALED" => Self::Outbound,
            _ => Self::Unknown,
        }
    }
}

/// One notification from the call-state stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEvent {
    #[serde(default)]
    pub call_id: Option<String>,
    pub state: CallState,
    pub direction: CallDirection,
    #[serde(default)]
    pub remote_caller_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl CallEvent {
    pub fn inbound_connected(remote_caller_id: impl Into<String>) -> Self {
        Self {
            call_id: None,
            state: CallState::Connected,
            direction: CallDirection::Inbound,
            remote_caller_id: Some(remote_caller_id.into()),
            timestamp: Some(chrono::Utc::now().timestamp_millis()),
        }
    }

    pub fn is_actionable(&self) -> bool {
        self.state == CallState::Connected && self.direction == CallDirection::Inbound
    }
}

/// Emitted once per newly seen inbound connected call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRequest {
    pub phone_number: String,
    pub recipient: Option<String>,
}
