// ABOUTME: Inbound notifications delivered by a remote session
// ABOUTME: Connection changes, item added/updated, presence, and token renewal failures

use crate::traits::{Item, Presence};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

/// Boxed stream of events for one logged-on session
pub type EventStream = Pin<Box<dyn Stream<Item = SessionEvent> + Send>>;

/// Registration state reported by the remote service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Reconnecting,
    Disconnected,
}

/// An event emitted by a remote session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Registration state of the session changed
    ConnectionStateChanged { state: ConnectionState },
    /// A new item appeared in a conversation the user participates in
    ItemAdded { item: Item },
    /// An existing item changed (edit, like, unlike)
    ItemUpdated { item: Item },
    /// A subscribed user's presence changed
    PresenceChanged { presence: Presence },
    /// The service could not renew the session token
    RenewTokenError { reason: String },
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::ConnectionStateChanged { .. } => EventKind::ConnectionStateChanged,
            SessionEvent::ItemAdded { .. } => EventKind::ItemAdded,
            SessionEvent::ItemUpdated { .. } => EventKind::ItemUpdated,
            SessionEvent::PresenceChanged { .. } => EventKind::PresenceChanged,
            SessionEvent::RenewTokenError { .. } => EventKind::RenewTokenError,
        }
    }

    /// True for a registration change to `Disconnected`
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            SessionEvent::ConnectionStateChanged {
                state: ConnectionState::Disconnected
            }
        )
    }
}

/// Tag used to route events to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    ConnectionStateChanged,
    ItemAdded,
    ItemUpdated,
    PresenceChanged,
    RenewTokenError,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::ConnectionStateChanged,
        EventKind::ItemAdded,
        EventKind::ItemUpdated,
        EventKind::PresenceChanged,
        EventKind::RenewTokenError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ConnectionStateChanged => "connection_state_changed",
            EventKind::ItemAdded => "item_added",
            EventKind::ItemUpdated => "item_updated",
            EventKind::PresenceChanged => "presence_changed",
            EventKind::RenewTokenError => "renew_token_error",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
