// ABOUTME: Observer tables mapping event kinds to async handlers
// ABOUTME: One handler per kind; registering a kind again replaces the earlier handler

use crate::events::{EventKind, SessionEvent};
use crate::traits::RemoteSession;
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Handler invoked with the session that delivered the event.
///
/// Handlers only see what they captured at registration time plus the
/// delivering session; they never touch scenario state.
pub type EventHandler = Arc<
    dyn Fn(Arc<dyn RemoteSession>, SessionEvent) -> BoxFuture<'static, anyhow::Result<()>>
        + Send
        + Sync,
>;

/// Box an async closure into an [`EventHandler`]
pub fn event_handler<F, Fut>(handler: F) -> EventHandler
where
    F: Fn(Arc<dyn RemoteSession>, SessionEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(
        move |session: Arc<dyn RemoteSession>,
              event: SessionEvent|
              -> BoxFuture<'static, anyhow::Result<()>> { Box::pin(handler(session, event)) },
    )
}

/// Event kind → handler
#[derive(Clone, Default)]
pub struct ObserverTable {
    handlers: BTreeMap<EventKind, EventHandler>,
}

impl ObserverTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration from an async closure
    pub fn on<F, Fut>(mut self, kind: EventKind, handler: F) -> Self
    where
        F: Fn(Arc<dyn RemoteSession>, SessionEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.insert(kind, event_handler(handler));
        self
    }

    /// Register a handler, returning the one it replaced
    pub fn insert(&mut self, kind: EventKind, handler: EventHandler) -> Option<EventHandler> {
        self.handlers.insert(kind, handler)
    }

    pub fn get(&self, kind: EventKind) -> Option<EventHandler> {
        self.handlers.get(&kind).cloned()
    }

    pub fn remove(&mut self, kind: EventKind) -> Option<EventHandler> {
        self.handlers.remove(&kind)
    }

    /// Overlay another table; its handlers win for kinds present in both
    pub fn merge(&mut self, other: ObserverTable) {
        self.handlers.extend(other.handlers);
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.handlers.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// A table that logs every event kind
    pub fn logging() -> Self {
        let mut table = Self::new();
        for kind in EventKind::ALL {
            table.insert(
                kind,
                event_handler(|session, event| async move {
                    log_event(session.user_id(), &event);
                    Ok(())
                }),
            );
        }
        table
    }
}

impl fmt::Debug for ObserverTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverTable")
            .field("kinds", &self.kinds())
            .finish()
    }
}

/// Structured log line for an inbound event
pub fn log_event(user_id: &str, event: &SessionEvent) {
    match event {
        SessionEvent::ConnectionStateChanged { state } => {
            tracing::info!(user_id, state = ?state, "Registration state changed");
        }
        SessionEvent::ItemAdded { item } => {
            tracing::info!(
                user_id,
                item_id = %item.item_id,
                conv_id = %item.conv_id,
                parent = ?item.parent_item_id,
                text = %item.content,
                "Item added"
            );
        }
        SessionEvent::ItemUpdated { item } => {
            tracing::info!(
                user_id,
                item_id = %item.item_id,
                likes = item.liked_by.len(),
                text = %item.content,
                "Item updated"
            );
        }
        SessionEvent::PresenceChanged { presence } => {
            tracing::info!(
                user_id,
                peer = %presence.user_id,
                state = ?presence.state,
                "Presence changed"
            );
        }
        SessionEvent::RenewTokenError { reason } => {
            tracing::warn!(user_id, reason = %reason, "Token renewal failed");
        }
    }
}
