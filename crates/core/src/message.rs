//! Queue message payloads.
//!
//! Messages carry no unique message ID. Identity for deduplication is
//! (queue, entity id), and redelivering the same id must converge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, ValidationErrorCode};

/// Message sources.
pub mod source {
    pub const SYNC: &str = "sync";
    pub const REFRESH: &str = "refresh";
    pub const REDISQ: &str = "redisq";
}

/// Entity sync request: `{"entityId": 1, "queuedAt": "...", "source": "sync"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMessage {
    pub entity_id: i64,
    pub queued_at: DateTime<Utc>,
    pub source: String,
}

impl QueueMessage {
    pub fn new(entity_id: i64, source: impl Into<String>) -> Self {
        Self {
            entity_id,
            queued_at: Utc::now(),
            source: source.into(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode and sanity-check a payload off the wire.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let msg: Self = serde_json::from_slice(bytes).map_err(|e| {
            Error::validation_code(ValidationErrorCode::MalformedMessage, e.to_string())
        })?;
        if msg.entity_id <= 0 {
            return Err(Error::validation_code(
                ValidationErrorCode::MalformedMessage,
                format!("entity id must be positive, got {}", msg.entity_id),
            ));
        }
        Ok(msg)
    }
}

/// Killmail feed entry: enough to fetch the full killmail upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KillmailRef {
    pub killmail_id: i64,
    pub hash: String,
    pub queued_at: DateTime<Utc>,
    pub source: String,
}

impl KillmailRef {
    pub fn new(killmail_id: i64, hash: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            killmail_id,
            hash: hash.into(),
            queued_at: Utc::now(),
            source: source.into(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let msg: Self = serde_json::from_slice(bytes).map_err(|e| {
            Error::validation_code(ValidationErrorCode::MalformedMessage, e.to_string())
        })?;
        if msg.killmail_id <= 0 || msg.hash.is_empty() {
            return Err(Error::validation_code(
                ValidationErrorCode::MalformedMessage,
                format!("bad killmail reference {}/{}", msg.killmail_id, msg.hash),
            ));
        }
        Ok(msg)
    }
}
