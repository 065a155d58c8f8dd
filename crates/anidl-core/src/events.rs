//! Status channel event definitions and inbound frame decoding

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Discriminator carried by frames that announce a daemon status change.
pub const STATUS_UPDATE_TYPE: &str = "status_update";

// ─────────────────────────────────────────────────────────
// StatusEvent
// ─────────────────────────────────────────────────────────

/// Daemon status delivered to status channel subscribers.
///
/// Only ever built from a successfully decoded `status_update` frame; see
/// [`decode_frame`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StatusEvent {
    /// Daemon-defined state label (`"running"`, `"checking"`, ...).
    pub status: String,
    /// Timestamp of the daemon's last check, passed through unvalidated.
    pub last_check: String,
    pub has_error: bool,
}

impl StatusEvent {
    pub fn new(status: impl Into<String>, last_check: impl Into<String>, has_error: bool) -> Self {
        Self {
            status: status.into(),
            last_check: last_check.into(),
            has_error,
        }
    }

    /// Parse `last_check` as RFC 3339, if it is one.
    pub fn last_check_time(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.last_check).ok()
    }
}

// ─────────────────────────────────────────────────────────
// Frame decoding
// ─────────────────────────────────────────────────────────

/// Outcome of decoding one inbound text frame.
#[derive(Debug)]
pub enum FrameDecode {
    /// A well-formed status update.
    Status(StatusEvent),
    /// Valid JSON that is not a status update (heartbeats, unknown types,
    /// missing or misshapen `data`).
    Ignored,
    /// Not JSON at all.
    Malformed(serde_json::Error),
}

/// Decode a text frame received on the status channel.
///
/// Frame shape: `{"type": "status_update", "data": {"status": .., "last_check": .., "has_error": ..}}`.
pub fn decode_frame(text: &str) -> FrameDecode {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => return FrameDecode::Malformed(e),
    };

    if value.get("type").and_then(|t| t.as_str()) != Some(STATUS_UPDATE_TYPE) {
        return FrameDecode::Ignored;
    }

    match value.get("data") {
        Some(data) if data.is_object() => match StatusEvent::deserialize(data) {
            Ok(event) => FrameDecode::Status(event),
            Err(e) => {
                tracing::trace!("status_update frame with unexpected data shape: {}", e);
                FrameDecode::Ignored
            }
        },
        _ => FrameDecode::Ignored,
    }
}
