//! Long-poll event-ingestion engine for a Messenger-style backend.
//!
//! Bootstraps a server-held pull channel, runs the ping/pull cycle, tracks the
//! sequence cursor, decodes envelope payloads into typed events, and
//! dispatches them to an application-supplied handler — transparently
//! surviving transient network loss, backend overload, and session rotation.

mod bootstrap;
mod color;
mod decode;
mod dispatch;
mod endpoints;
mod listen;
mod session;
mod transport;
mod types;

pub use bootstrap::bootstrap;
pub use color::ThreadColor;
pub use decode::decode_envelope;
pub use dispatch::{dispatch, EventHandler};
pub use endpoints::{Endpoints, DEFAULT_EDGE_HOST_TEMPLATE, PULL_CHANNEL_COUNT};
pub use listen::{ChannelListener, ListenConfig, ListenState, StopHandle};
pub use session::{AuthSession, SessionContext};
pub use transport::{parse_payload, HttpTransport, Transport, TransportResponse};
pub use types::{
    ChannelError, DecodeFailure, DeliveryReceipt, Event, InboxUpdate, NewMessage, NicknameChanged,
    ParticipantRemoved, ParticipantsAdded, PresenceUpdate, Primer, ReadReceipt, ThreadColorChanged,
    ThreadEmojiChanged, ThreadKey, ThreadTitleChanged, ThreadType, ThreadsMarkedRead,
    TransportError, UnknownEvent, STALE_SESSION_ERROR_CODE,
};
