// ABOUTME: SessionConnector / RemoteSession implementations backed by the loopback world
// ABOUTME: Each session owns one event channel; logout closes it with a Disconnected event

use crate::world::World;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use convoy_core::{
    ConnectionState, Conversation, ConversationKind, Credentials, EventStream, Item, ItemContent,
    Presence, PresenceState, RemoteSession, ServiceError, ServiceResult, SessionConnector,
    SessionEvent, SessionInfo,
};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

pub(crate) fn lock(world: &Mutex<World>) -> MutexGuard<'_, World> {
    world.lock().unwrap_or_else(|e| e.into_inner())
}

/// Logs actors on against a [`LoopbackService`](crate::LoopbackService)
#[derive(Clone)]
pub struct LoopbackConnector {
    pub(crate) world: Arc<Mutex<World>>,
    pub(crate) logon_delay: Option<Duration>,
}

#[async_trait]
impl SessionConnector for LoopbackConnector {
    fn service_id(&self) -> &'static str {
        "loopback"
    }

    async fn logon(
        &self,
        credentials: &Credentials,
        domain: &str,
    ) -> ServiceResult<Arc<dyn RemoteSession>> {
        if let Some(delay) = self.logon_delay {
            tokio::time::sleep(delay).await;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let (session_id, user_id, display_name) =
            lock(&self.world).open_session(credentials, domain, tx.clone())?;
        let _ = tx.send(SessionEvent::ConnectionStateChanged {
            state: ConnectionState::Connected,
        });
        tracing::debug!(identity = %credentials.identity(), %user_id, session_id, "Loopback logon");

        Ok(Arc::new(LoopbackSession {
            session_id,
            info: SessionInfo {
                user_id,
                identity: credentials.identity().to_string(),
                display_name,
            },
            events: Mutex::new(Some(rx)),
            world: Arc::clone(&self.world),
        }))
    }
}

pub struct LoopbackSession {
    session_id: u64,
    info: SessionInfo,
    events: Mutex<Option<mpsc::UnboundedReceiver<SessionEvent>>>,
    world: Arc<Mutex<World>>,
}

impl LoopbackSession {
    /// Run `op` against the world as the session user, if still logged on
    fn with_world<T>(
        &self,
        op: impl FnOnce(&mut World, &str) -> ServiceResult<T>,
    ) -> ServiceResult<T> {
        let mut world = lock(&self.world);
        let user_id = world.require_live(self.session_id)?;
        op(&mut world, &user_id)
    }
}

#[async_trait]
impl RemoteSession for LoopbackSession {
    fn info(&self) -> &SessionInfo {
        &self.info
    }

    async fn event_stream(&self) -> ServiceResult<EventStream> {
        let rx = self
            .events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| ServiceError::Remote("event stream already taken".to_string()))?;
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn logout(&self) -> ServiceResult<()> {
        lock(&self.world).close_session(self.session_id);
        Ok(())
    }

    async fn get_direct_conversation(&self, peer: &str) -> ServiceResult<Conversation> {
        self.with_world(|world, me| world.direct_conversation(me, peer))
    }

    async fn create_direct_conversation(&self, peer: &str) -> ServiceResult<Conversation> {
        self.with_world(|world, me| {
            world.create_conversation(me, ConversationKind::Direct, &[peer.to_string()], None)
        })
    }

    async fn get_conversation(&self, conv_id: &str) -> ServiceResult<Conversation> {
        self.with_world(|world, me| world.visible_conversation(me, conv_id))
    }

    async fn create_group_conversation(
        &self,
        member_ids: &[String],
        title: &str,
    ) -> ServiceResult<Conversation> {
        self.with_world(|world, me| {
            world.create_conversation(
                me,
                ConversationKind::Group,
                member_ids,
                Some(title.to_string()),
            )
        })
    }

    async fn add_text_item(&self, conv_id: &str, content: ItemContent) -> ServiceResult<Item> {
        self.with_world(|world, me| world.add_item(me, conv_id, content))
    }

    async fn update_text_item(&self, item_id: &str, content: ItemContent) -> ServiceResult<Item> {
        self.with_world(|world, me| world.update_item(me, item_id, content))
    }

    async fn get_item(&self, item_id: &str) -> ServiceResult<Item> {
        self.with_world(|world, me| world.item(me, item_id))
    }

    async fn like_item(&self, item_id: &str) -> ServiceResult<()> {
        self.with_world(|world, me| world.set_like(me, item_id, true).map(|_| ()))
    }

    async fn unlike_item(&self, item_id: &str) -> ServiceResult<()> {
        self.with_world(|world, me| world.set_like(me, item_id, false).map(|_| ()))
    }

    async fn set_flag(&self, conv_id: &str, item_id: &str) -> ServiceResult<()> {
        self.with_world(|world, me| world.set_flag(me, conv_id, item_id, true))
    }

    async fn clear_flag(&self, conv_id: &str, item_id: &str) -> ServiceResult<()> {
        self.with_world(|world, me| world.set_flag(me, conv_id, item_id, false))
    }

    async fn flagged_items(&self, conv_id: &str) -> ServiceResult<Vec<String>> {
        self.with_world(|world, me| world.flagged(me, conv_id))
    }

    async fn mark_as_read(&self, conv_id: &str, until: DateTime<Utc>) -> ServiceResult<()> {
        self.with_world(|world, me| world.mark_read(me, conv_id, until))
    }

    async fn get_presence(&self, user_ids: &[String]) -> ServiceResult<Vec<Presence>> {
        self.with_world(|world, _me| world.presence(user_ids))
    }

    async fn subscribe_presence(&self, user_ids: &[String]) -> ServiceResult<()> {
        self.with_world(|world, me| world.subscribe(me, user_ids))
    }

    async fn set_presence(&self, state: PresenceState) -> ServiceResult<()> {
        self.with_world(|world, me| world.set_presence(me, state))
    }
}

impl Drop for LoopbackSession {
    fn drop(&mut self) {
        // A session dropped without logout stops receiving events
        lock(&self.world).sessions.remove(&self.session_id);
    }
}
