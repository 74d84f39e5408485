//! Server-sent event framing for the streaming subscription and the
//! translation of store events into ordered "child added" notifications.

use super::ChildAdded;
use crate::error::MailboxError;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;

/// Raw bytes are held until a whole block has arrived, so neither a
/// multibyte character nor a CRLF pair split across network chunks is
/// damaged. Line endings are normalized to `\n` on the way in.
#[derive(Debug, Default)]
pub struct SseBuffer {
    buffer: Vec<u8>,
    pending_cr: bool,
}

impl SseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_chunk(&mut self, chunk: &[u8]) {
        self.buffer.reserve(chunk.len());
        for &byte in chunk {
            if std::mem::take(&mut self.pending_cr) {
                self.buffer.push(b'\n');
                if byte == b'\n' {
                    continue;
                }
            }
            if byte == b'\r' {
                self.pending_cr = true;
            } else {
                self.buffer.push(byte);
            }
        }
    }

    pub fn next_event_block(&mut self) -> Option<String> {
        let boundary = self.buffer.windows(2).position(|w| w == b"\n\n")?;
        let remaining = self.buffer.split_off(boundary + 2);
        let event_block = std::mem::replace(&mut self.buffer, remaining);
        Some(String::from_utf8_lossy(&event_block).into_owned())
    }
}

/// `(event, data)` pairs of one block; a `data:` line without a preceding
/// `event:` line is ignored.
pub fn parse_event_data_pairs(event_block: &str) -> Vec<(&str, &str)> {
    let mut events = Vec::new();
    let mut current_event = None;

    for line in event_block.lines() {
        if let Some(event_type) = line.strip_prefix("event:") {
            current_event = Some(event_type.trim());
        } else if let Some(data) = line.strip_prefix("data:")
            && let Some(event_type) = current_event.take()
        {
            events.push((event_type, data.trim()));
        }
    }

    events
}

#[derive(Debug, Deserialize)]
struct PathData {
    path: String,
    #[serde(default)]
    data: Value,
}

/// Remembers which children of the subscribed partition exist so that
/// snapshot replays (`put /`) and field updates never re-announce a child.
#[derive(Debug, Default)]
pub struct ChildTracker {
    known: BTreeSet<String>,
}

impl ChildTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_known(&self, id: &str) -> bool {
        self.known.contains(id)
    }

    /// Apply one server event; returns newly added children in key order.
    pub fn apply(&mut self, event: &str, data: &str) -> Result<Vec<ChildAdded>, MailboxError> {
        match event {
            "put" => {
                let payload = parse_path_data(data)?;
                Ok(self.apply_put(&payload.path, payload.data))
            }
            "patch" => {
                let payload = parse_path_data(data)?;
                Ok(self.apply_patch(&payload.path, payload.data))
            }
            "keep-alive" => Ok(Vec::new()),
            "cancel" => Err(MailboxError::Stream(format!(
                "subscription cancelled by server: {data}"
            ))),
            "auth_revoked" => Err(MailboxError::Stream(
                "subscription credential revoked".to_string(),
            )),
            other => {
                tracing::debug!(event = other, "ignoring unknown mailbox stream event");
                Ok(Vec::new())
            }
        }
    }

    fn apply_put(&mut self, path: &str, data: Value) -> Vec<ChildAdded> {
        let segments = path_segments(path);
        match segments.as_slice() {
            [] => {
                // Full snapshot of the partition replaces what we knew.
                let Value::Object(children) = data else {
                    self.known.clear();
                    return Vec::new();
                };
                self.known.retain(|id| children.contains_key(id));
                self.announce(children)
            }
            [id] => {
                if data.is_null() {
                    self.known.remove(*id);
                    Vec::new()
                } else if self.known.insert((*id).to_string()) {
                    vec![ChildAdded {
                        id: (*id).to_string(),
                        value: data,
                    }]
                } else {
                    Vec::new()
                }
            }
            // Field-level write on an existing child.
            _ => Vec::new(),
        }
    }

    fn apply_patch(&mut self, path: &str, data: Value) -> Vec<ChildAdded> {
        if !path_segments(path).is_empty() {
            return Vec::new();
        }
        let Value::Object(children) = data else {
            return Vec::new();
        };
        let mut added = Vec::new();
        for (id, value) in children {
            if value.is_null() {
                self.known.remove(&id);
            } else if self.known.insert(id.clone()) {
                added.push(ChildAdded { id, value });
            }
        }
        added.sort_by(|a, b| a.id.cmp(&b.id));
        added
    }

    fn announce(&mut self, children: serde_json::Map<String, Value>) -> Vec<ChildAdded> {
        let mut added: Vec<ChildAdded> = children
            .into_iter()
            .filter(|(_, value)| !value.is_null())
            .filter_map(|(id, value)| {
                self.known
                    .insert(id.clone())
                    .then_some(ChildAdded { id, value })
            })
            .collect();
        added.sort_by(|a, b| a.id.cmp(&b.id));
        added
    }
}

fn parse_path_data(data: &str) -> Result<PathData, MailboxError> {
    serde_json::from_str(data).map_err(|e| MailboxError::Decode(format!("{e}: {data}")))
}

fn path_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}
