// ABOUTME: Mock SessionConnector / RemoteSession shared by the convoy-core integration tests
// ABOUTME: Records logons and logouts and lets tests push events into a live session

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use convoy_core::{
    ActorConfig, ConnectionState, Conversation, Credentials, EventStream, Item, ItemContent,
    Presence, PresenceState, RemoteSession, ServiceError, ServiceResult, SessionConnector,
    SessionEvent, SessionInfo,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

#[derive(Default)]
struct MockState {
    rejected: HashSet<String>,
    logon_attempts: Vec<String>,
    logouts: Vec<String>,
    /// Sender of the most recent session per identity
    senders: HashMap<String, mpsc::UnboundedSender<SessionEvent>>,
    /// Events queued into every new session before its stream is handed out
    greeting: Vec<SessionEvent>,
}

/// Connector whose sessions are driven entirely by the test
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
    logon_delay: Option<Duration>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_logon_delay(mut self, delay: Duration) -> Self {
        self.logon_delay = Some(delay);
        self
    }

    /// Every session created from now on starts with these events queued
    pub fn with_greeting(self, events: Vec<SessionEvent>) -> Self {
        self.state.lock().unwrap().greeting = events;
        self
    }

    pub fn reject(&self, identity: &str) {
        self.state.lock().unwrap().rejected.insert(identity.to_string());
    }

    pub fn accept(&self, identity: &str) {
        self.state.lock().unwrap().rejected.remove(identity);
    }

    pub fn logon_attempts(&self, identity: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .logon_attempts
            .iter()
            .filter(|id| id.as_str() == identity)
            .count()
    }

    pub fn logouts(&self, identity: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .logouts
            .iter()
            .filter(|id| id.as_str() == identity)
            .count()
    }

    /// Push an event into the identity's latest session
    pub fn emit(&self, identity: &str, event: SessionEvent) {
        let state = self.state.lock().unwrap();
        let sender = state.senders.get(identity).expect("no session for identity");
        sender.send(event).expect("session stream closed");
    }

    pub fn disconnect(&self, identity: &str) {
        self.emit(
            identity,
            SessionEvent::ConnectionStateChanged {
                state: ConnectionState::Disconnected,
            },
        );
    }
}

#[async_trait]
impl SessionConnector for MockConnector {
    fn service_id(&self) -> &'static str {
        "mock"
    }

    async fn logon(
        &self,
        credentials: &Credentials,
        domain: &str,
    ) -> ServiceResult<Arc<dyn RemoteSession>> {
        let identity = credentials.identity().to_string();
        self.state
            .lock()
            .unwrap()
            .logon_attempts
            .push(identity.clone());

        if let Some(delay) = self.logon_delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        if state.rejected.contains(&identity) {
            return Err(ServiceError::Auth("bad credential".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        for event in &state.greeting {
            let _ = tx.send(event.clone());
        }
        state.senders.insert(identity.clone(), tx.clone());

        Ok(Arc::new(MockSession {
            info: SessionInfo {
                user_id: format!("u-{}@{}", identity, domain),
                identity,
                display_name: None,
            },
            events: Mutex::new(Some(rx)),
            sender: tx,
            connector: Arc::clone(&self.state),
        }))
    }
}

pub struct MockSession {
    info: SessionInfo,
    events: Mutex<Option<mpsc::UnboundedReceiver<SessionEvent>>>,
    sender: mpsc::UnboundedSender<SessionEvent>,
    connector: Arc<Mutex<MockState>>,
}

fn unsupported<T>() -> ServiceResult<T> {
    Err(ServiceError::Remote("unsupported by mock".to_string()))
}

#[async_trait]
impl RemoteSession for MockSession {
    fn info(&self) -> &SessionInfo {
        &self.info
    }

    async fn event_stream(&self) -> ServiceResult<EventStream> {
        let rx = self
            .events
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ServiceError::Remote("event stream already taken".to_string()))?;
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn logout(&self) -> ServiceResult<()> {
        self.connector
            .lock()
            .unwrap()
            .logouts
            .push(self.info.identity.clone());
        let _ = self.sender.send(SessionEvent::ConnectionStateChanged {
            state: ConnectionState::Disconnected,
        });
        Ok(())
    }

    async fn get_direct_conversation(&self, _peer: &str) -> ServiceResult<Conversation> {
        unsupported()
    }
    async fn create_direct_conversation(&self, _peer: &str) -> ServiceResult<Conversation> {
        unsupported()
    }
    async fn get_conversation(&self, _conv_id: &str) -> ServiceResult<Conversation> {
        unsupported()
    }
    async fn create_group_conversation(
        &self,
        _member_ids: &[String],
        _title: &str,
    ) -> ServiceResult<Conversation> {
        unsupported()
    }
    async fn add_text_item(&self, _conv_id: &str, _content: ItemContent) -> ServiceResult<Item> {
        unsupported()
    }
    async fn update_text_item(&self, _item_id: &str, _content: ItemContent) -> ServiceResult<Item> {
        unsupported()
    }
    async fn get_item(&self, _item_id: &str) -> ServiceResult<Item> {
        unsupported()
    }
    async fn like_item(&self, _item_id: &str) -> ServiceResult<()> {
        unsupported()
    }
    async fn unlike_item(&self, _item_id: &str) -> ServiceResult<()> {
        unsupported()
    }
    async fn set_flag(&self, _conv_id: &str, _item_id: &str) -> ServiceResult<()> {
        unsupported()
    }
    async fn clear_flag(&self, _conv_id: &str, _item_id: &str) -> ServiceResult<()> {
        unsupported()
    }
    async fn flagged_items(&self, _conv_id: &str) -> ServiceResult<Vec<String>> {
        unsupported()
    }
    async fn mark_as_read(&self, _conv_id: &str, _until: DateTime<Utc>) -> ServiceResult<()> {
        unsupported()
    }
    async fn get_presence(&self, _user_ids: &[String]) -> ServiceResult<Vec<Presence>> {
        unsupported()
    }
    async fn subscribe_presence(&self, _user_ids: &[String]) -> ServiceResult<()> {
        unsupported()
    }
    async fn set_presence(&self, _state: PresenceState) -> ServiceResult<()> {
        unsupported()
    }
}

pub fn alice() -> ActorConfig {
    ActorConfig::new("A", Credentials::password("alice@example.com", "hunter2"))
}

pub fn bob() -> ActorConfig {
    ActorConfig::new("B", Credentials::password("bob@example.com", "hunter3"))
}

pub fn bot() -> ActorConfig {
    ActorConfig::new("bot", Credentials::client("bot-client", "s3cret"))
}

pub fn item(item_id: &str) -> Item {
    let now = Utc::now();
    Item {
        item_id: item_id.to_string(),
        conv_id: "conv-1".to_string(),
        creator_id: "u-peer".to_string(),
        parent_item_id: None,
        subject: None,
        content: format!("content of {}", item_id),
        attachments: vec![],
        liked_by: vec![],
        creation_time: now,
        modification_time: now,
    }
}

pub fn item_added(item_id: &str) -> SessionEvent {
    SessionEvent::ItemAdded {
        item: item(item_id),
    }
}

/// Let spawned pump tasks drain without moving the clock far
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
