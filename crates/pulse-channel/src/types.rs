use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::color::ThreadColor;

/// Payload-level backend error code meaning the session cookies went stale and
/// the caller's `AuthSession` must reauthenticate before pulling again.
pub const STALE_SESSION_ERROR_CODE: i64 = 1_357_004;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `ThreadType` values.
pub enum ThreadType {
    User,
    Group,
}

impl ThreadType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Identifies one conversation and whether it is one-to-one or a group.
pub struct ThreadKey {
    pub thread_id: String,
    pub thread_type: ThreadType,
}

impl ThreadKey {
    pub fn user(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            thread_type: ThreadType::User,
        }
    }

    pub fn group(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            thread_type: ThreadType::Group,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Public struct `NewMessage` used across Pulse components.
pub struct NewMessage {
    pub message_id: String,
    pub author_id: String,
    pub thread: ThreadKey,
    pub timestamp_ms: u64,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Public struct `ParticipantsAdded` used across Pulse components.
pub struct ParticipantsAdded {
    pub message_id: String,
    pub author_id: String,
    pub thread: ThreadKey,
    pub timestamp_ms: u64,
    pub added_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Public struct `ParticipantRemoved` used across Pulse components.
pub struct ParticipantRemoved {
    pub message_id: String,
    pub author_id: String,
    pub thread: ThreadKey,
    pub timestamp_ms: u64,
    pub removed_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Public struct `ThreadColorChanged` used across Pulse components.
pub struct ThreadColorChanged {
    pub message_id: String,
    pub author_id: String,
    pub thread: ThreadKey,
    pub timestamp_ms: u64,
    pub new_color: ThreadColor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Public struct `ThreadEmojiChanged` used across Pulse components.
pub struct ThreadEmojiChanged {
    pub message_id: String,
    pub author_id: String,
    pub thread: ThreadKey,
    pub timestamp_ms: u64,
    pub new_emoji: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Public struct `ThreadTitleChanged` used across Pulse components.
pub struct ThreadTitleChanged {
    pub message_id: String,
    pub author_id: String,
    pub thread: ThreadKey,
    pub timestamp_ms: u64,
    pub new_title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Public struct `NicknameChanged` used across Pulse components.
pub struct NicknameChanged {
    pub message_id: String,
    pub author_id: String,
    pub thread: ThreadKey,
    pub timestamp_ms: u64,
    pub changed_for: String,
    pub new_nickname: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Public struct `DeliveryReceipt` used across Pulse components.
pub struct DeliveryReceipt {
    pub message_ids: Vec<String>,
    pub delivered_for: String,
    pub thread: ThreadKey,
    pub delivered_ts_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Public struct `ReadReceipt` used across Pulse components.
pub struct ReadReceipt {
    pub seen_by: String,
    pub thread: ThreadKey,
    pub seen_ts_ms: u64,
    pub delivered_ts_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Public struct `ThreadsMarkedRead` used across Pulse components.
pub struct ThreadsMarkedRead {
    /// Empty when the receipt is scoped to folders rather than explicit threads.
    pub threads: Vec<ThreadKey>,
    pub seen_ts_ms: u64,
    pub delivered_ts_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Public struct `InboxUpdate` used across Pulse components.
pub struct InboxUpdate {
    pub unseen: u64,
    pub unread: u64,
    pub recent_unread: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Buddy-list presence snapshot; values are last-active Unix timestamps.
pub struct PresenceUpdate {
    pub buddy_list: BTreeMap<String, Option<u64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Public struct `Primer` used across Pulse components.
pub struct Primer {
    pub made_ts_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// An envelope item whose discriminator matched no known kind.
pub struct UnknownEvent {
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// An envelope item that failed to decode; carries the raw item and the cause.
pub struct DecodeFailure {
    pub raw: Value,
    pub cause: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
/// Enumerates supported `Event` values.
pub enum Event {
    NewMessage(NewMessage),
    ParticipantsAdded(ParticipantsAdded),
    ParticipantRemoved(ParticipantRemoved),
    ThreadColorChanged(ThreadColorChanged),
    ThreadEmojiChanged(ThreadEmojiChanged),
    ThreadTitleChanged(ThreadTitleChanged),
    NicknameChanged(NicknameChanged),
    DeliveryReceipt(DeliveryReceipt),
    ReadReceipt(ReadReceipt),
    ThreadsMarkedRead(ThreadsMarkedRead),
    InboxUpdate(InboxUpdate),
    PresenceUpdate(PresenceUpdate),
    Primer(Primer),
    Unknown(UnknownEvent),
    DecodeFailure(DecodeFailure),
}

#[derive(Debug, Error)]
/// Enumerates supported `TransportError` values.
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connectivity failure: {message}")]
    Connectivity { message: String },
    #[error("transport failure: {message}")]
    Other { message: String },
}

#[derive(Debug, Error)]
/// Enumerates supported `ChannelError` values.
pub enum ChannelError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("backend returned non-success status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("backend error {code}: {summary}")]
    Api { code: i64, summary: String },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("callback failed: {0}")]
    Callback(anyhow::Error),
}

impl ChannelError {
    /// True for the two backend statuses that mean the pull edge is overloaded
    /// or unavailable and the channel should be rotated.
    pub fn is_overload(&self) -> bool {
        matches!(self, Self::HttpStatus { status: 502 | 503, .. })
    }

    pub fn is_stale_session(&self) -> bool {
        matches!(
            self,
            Self::Api {
                code: STALE_SESSION_ERROR_CODE,
                ..
            }
        )
    }
}

// Backend payloads carry ids and timestamps as either JSON numbers or numeric
// strings depending on the field; normalize both shapes.

pub(crate) fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

pub(crate) fn value_to_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
