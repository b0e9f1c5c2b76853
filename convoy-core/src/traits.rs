// ABOUTME: Service boundary consumed by the harness: SessionConnector and RemoteSession
// ABOUTME: Credentials plus the conversation, item, attachment, and presence data types

use crate::error::ServiceError;
use crate::events::EventStream;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

// =============================================================================
// Credentials & Identity
// =============================================================================

/// Secret material used to log an actor on
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Credentials {
    /// Regular user account
    Password { email: String, password: String },
    /// Bot / application account
    Client {
        client_id: String,
        client_secret: String,
    },
}

impl Credentials {
    pub fn password(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Password {
            email: email.into(),
            password: password.into(),
        }
    }

    pub fn client(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self::Client {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Identity the actor is known by (email or client id)
    pub fn identity(&self) -> &str {
        match self {
            Credentials::Password { email, .. } => email,
            Credentials::Client { client_id, .. } => client_id,
        }
    }

    pub fn secret(&self) -> &str {
        match self {
            Credentials::Password { password, .. } => password,
            Credentials::Client { client_secret, .. } => client_secret,
        }
    }

    /// Replace the secret, keeping the identity
    pub fn set_secret(&mut self, secret: String) {
        match self {
            Credentials::Password { password, .. } => *password = secret,
            Credentials::Client { client_secret, .. } => *client_secret = secret,
        }
    }
}

// Custom Debug impl to redact secrets
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Password { email, .. } => f
                .debug_struct("Password")
                .field("email", email)
                .field("password", &"[REDACTED]")
                .finish(),
            Credentials::Client { client_id, .. } => f
                .debug_struct("Client")
                .field("client_id", client_id)
                .field("client_secret", &"[REDACTED]")
                .finish(),
        }
    }
}

/// Identity resolved by a successful logon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Service-assigned user id
    pub user_id: String,
    /// Email or client id used to log on
    pub identity: String,
    pub display_name: Option<String>,
}

// =============================================================================
// Conversations
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    /// 1:1 conversation
    Direct,
    Group,
}

/// A conversation as returned by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub conv_id: String,
    pub kind: ConversationKind,
    pub title: Option<String>,
    /// User ids of all participants
    pub participants: Vec<String>,
    pub creator_id: String,
    pub creation_time: DateTime<Utc>,
}

impl Conversation {
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }
}

// =============================================================================
// Items
// =============================================================================

/// A file stored by the service and attached to an item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub file_id: String,
    pub file_name: String,
    pub mime_type: String,
    pub size: u64,
}

/// A local file to upload with an item
#[derive(Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub file_name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl fmt::Debug for FileUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileUpload")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("size", &self.data.len())
            .finish()
    }
}

/// Outgoing item payload: plain text or structured (subject, parent, attachments)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemContent {
    pub subject: Option<String>,
    pub content: String,
    /// Parent item id when posting a reply/comment
    pub parent_id: Option<String>,
    pub attachments: Vec<FileUpload>,
}

impl ItemContent {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn reply(parent_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            parent_id: Some(parent_id.into()),
            ..Self::default()
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<FileUpload>) -> Self {
        self.attachments = attachments;
        self
    }
}

/// An item (message, comment) as stored by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub item_id: String,
    pub conv_id: String,
    pub creator_id: String,
    pub parent_item_id: Option<String>,
    pub subject: Option<String>,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// User ids that currently like this item
    #[serde(default)]
    pub liked_by: Vec<String>,
    pub creation_time: DateTime<Utc>,
    pub modification_time: DateTime<Utc>,
}

impl Item {
    pub fn is_reply(&self) -> bool {
        self.parent_item_id.is_some()
    }

    pub fn is_liked_by(&self, user_id: &str) -> bool {
        self.liked_by.iter().any(|u| u == user_id)
    }
}

// =============================================================================
// Presence
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceState {
    Available,
    Away,
    Busy,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    pub user_id: String,
    pub state: PresenceState,
}

// =============================================================================
// Service Boundary
// =============================================================================

/// Entry point to a remote messaging service: turns credentials into sessions.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    /// Service identifier for logging (e.g., "loopback")
    fn service_id(&self) -> &'static str;

    /// Log on with the given credentials against a home domain
    async fn logon(
        &self,
        credentials: &Credentials,
        domain: &str,
    ) -> ServiceResult<Arc<dyn RemoteSession>>;
}

/// A logged-on session. Opaque to the harness beyond these calls.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Identity resolved at logon
    fn info(&self) -> &SessionInfo;

    fn user_id(&self) -> &str {
        &self.info().user_id
    }

    /// Events for this session. Each session hands out its stream once.
    async fn event_stream(&self) -> ServiceResult<EventStream>;

    async fn logout(&self) -> ServiceResult<()>;

    /// Existing direct conversation with a peer (user id or identity); NotFound if none
    async fn get_direct_conversation(&self, peer: &str) -> ServiceResult<Conversation>;

    async fn create_direct_conversation(&self, peer: &str) -> ServiceResult<Conversation>;

    async fn get_conversation(&self, conv_id: &str) -> ServiceResult<Conversation>;

    async fn create_group_conversation(
        &self,
        member_ids: &[String],
        title: &str,
    ) -> ServiceResult<Conversation>;

    /// Post an item; fails with `ServiceError::Send` when the service refuses it
    async fn add_text_item(&self, conv_id: &str, content: ItemContent) -> ServiceResult<Item>;

    async fn update_text_item(&self, item_id: &str, content: ItemContent) -> ServiceResult<Item>;

    async fn get_item(&self, item_id: &str) -> ServiceResult<Item>;

    async fn like_item(&self, item_id: &str) -> ServiceResult<()>;

    async fn unlike_item(&self, item_id: &str) -> ServiceResult<()>;

    async fn set_flag(&self, conv_id: &str, item_id: &str) -> ServiceResult<()>;

    async fn clear_flag(&self, conv_id: &str, item_id: &str) -> ServiceResult<()>;

    /// Item ids the current user flagged in a conversation
    async fn flagged_items(&self, conv_id: &str) -> ServiceResult<Vec<String>>;

    /// Move the read marker of a conversation up to `until`
    async fn mark_as_read(&self, conv_id: &str, until: DateTime<Utc>) -> ServiceResult<()>;

    async fn get_presence(&self, user_ids: &[String]) -> ServiceResult<Vec<Presence>>;

    async fn subscribe_presence(&self, user_ids: &[String]) -> ServiceResult<()>;

    async fn set_presence(&self, state: PresenceState) -> ServiceResult<()>;
}

// =============================================================================
// Tests
// =============================================================================
