use super::RecipientKey;
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stored job payload: `mailbox/{key}/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenPopRecord {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    /// Milliseconds since the Unix epoch at write time.
    pub timestamp: i64,
    #[serde(default)]
    pub processed: bool,
}

impl ScreenPopRecord {
    pub fn new(uri: impl Into<String>, phone_number: Option<String>) -> Self {
        Self {
            uri: uri.into(),
            phone_number,
            timestamp: chrono::Utc::now().timestamp_millis(),
            processed: false,
        }
    }

    /// Validate a raw mailbox child against the record schema.
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let object = value.as_object().ok_or(ValidationError::NotAnObject)?;

        let uri = match object.get("uri") {
            None | Some(Value::Null) => return Err(ValidationError::MissingUri),
            Some(Value::String(uri)) if uri.trim().is_empty() => {
                return Err(ValidationError::MissingUri);
            }
            Some(Value::String(uri)) => uri.clone(),
            Some(_) => {
                return Err(ValidationError::WrongType {
                    field: "uri",
                    expected: "string",
                });
            }
        };

        let phone_number = match object.get("phoneNumber") {
            None | Some(Value::Null) => None,
            Some(Value::String(number)) => Some(number.clone()),
            Some(_) => {
                return Err(ValidationError::WrongType {
                    field: "phoneNumber",
                    expected: "string",
                });
            }
        };

        let timestamp = match object.get("timestamp") {
            None | Some(Value::Null) => return Err(ValidationError::MissingField("timestamp")),
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .ok_or(ValidationError::WrongType {
                    field: "timestamp",
                    expected: "number",
                })?,
            Some(_) => {
                return Err(ValidationError::WrongType {
                    field: "timestamp",
                    expected: "number",
                });
            }
        };

        let processed = match object.get("processed") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(flag)) => *flag,
            Some(_) => {
                return Err(ValidationError::WrongType {
                    field: "processed",
                    expected: "boolean",
                });
            }
        };

        Ok(Self {
            uri,
            phone_number,
            timestamp,
            processed,
        })
    }
}

/// A validated job as seen by the agent's subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenPopJob {
    pub id: String,
    pub recipient: RecipientKey,
    pub record: ScreenPopRecord,
}
