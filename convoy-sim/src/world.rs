// ABOUTME: In-memory state of the loopback service: accounts, conversations, items, presence
// ABOUTME: Every mutation fans out SessionEvents to the live sessions of affected users

use chrono::{DateTime, Utc};
use convoy_core::{
    Attachment, ConnectionState, Conversation, ConversationKind, Credentials, FileUpload, Item,
    ItemContent, Presence, PresenceState, ServiceError, ServiceResult, SessionEvent,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use tokio::sync::mpsc;

pub(crate) struct Account {
    pub user_id: String,
    pub credentials: Credentials,
    pub domain: String,
    pub display_name: Option<String>,
    pub presence: PresenceState,
}

pub(crate) struct LiveSession {
    pub user_id: String,
    pub identity: String,
    pub events: mpsc::UnboundedSender<SessionEvent>,
}

#[derive(Default)]
pub(crate) struct World {
    /// Keyed by identity (email or client id)
    pub accounts: HashMap<String, Account>,
    /// Conversations in creation order
    pub conversations: Vec<Conversation>,
    pub items: HashMap<String, Item>,
    /// Item ids per conversation, in posting order
    pub timeline: HashMap<String, Vec<String>>,
    /// (user id, conversation id) -> flagged item ids
    pub flags: HashMap<(String, String), BTreeSet<String>>,
    /// (user id, conversation id) -> read marker
    pub read_markers: HashMap<(String, String), DateTime<Utc>>,
    /// Subscriber user id -> watched user ids
    pub subscriptions: HashMap<String, HashSet<String>>,
    pub sessions: HashMap<u64, LiveSession>,
    pub next_session_id: u64,
    /// Identities whose logons are refused regardless of credentials
    pub rejected: HashSet<String>,
    /// Identities whose replies are refused with a send failure
    pub refused_replies: HashSet<String>,
    pub logon_attempts: HashMap<String, usize>,
    pub logouts: HashMap<String, usize>,
}

impl World {
    /// Accept a user id or an identity
    pub fn resolve_user(&self, peer: &str) -> Option<String> {
        if let Some(account) = self.accounts.get(peer) {
            return Some(account.user_id.clone());
        }
        self.accounts
            .values()
            .find(|a| a.user_id == peer)
            .map(|a| a.user_id.clone())
    }

    fn require_user(&self, peer: &str) -> ServiceResult<String> {
        self.resolve_user(peer)
            .ok_or_else(|| ServiceError::NotFound(format!("user {}", peer)))
    }

    /// Check credentials and domain; registers a live session on success
    pub fn open_session(
        &mut self,
        credentials: &Credentials,
        domain: &str,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> ServiceResult<(u64, String, Option<String>)> {
        let identity = credentials.identity().to_string();
        *self.logon_attempts.entry(identity.clone()).or_default() += 1;

        if self.rejected.contains(&identity) {
            return Err(ServiceError::Auth("bad credential".to_string()));
        }
        let account = self
            .accounts
            .get(&identity)
            .filter(|a| a.credentials == *credentials)
            .ok_or_else(|| ServiceError::Auth("bad credential".to_string()))?;
        if account.domain != domain {
            return Err(ServiceError::Auth(format!(
                "{} is not a member of {}",
                identity, domain
            )));
        }

        let user_id = account.user_id.clone();
        let display_name = account.display_name.clone();
        self.next_session_id += 1;
        let session_id = self.next_session_id;
        self.sessions.insert(
            session_id,
            LiveSession {
                user_id: user_id.clone(),
                identity,
                events,
            },
        );
        Ok((session_id, user_id, display_name))
    }

    /// Drop a session, telling it the connection is gone
    pub fn close_session(&mut self, session_id: u64) {
        if let Some(session) = self.sessions.remove(&session_id) {
            *self.logouts.entry(session.identity).or_default() += 1;
            let _ = session.events.send(SessionEvent::ConnectionStateChanged {
                state: ConnectionState::Disconnected,
            });
        }
    }

    pub fn require_live(&self, session_id: u64) -> ServiceResult<String> {
        self.sessions
            .get(&session_id)
            .map(|s| s.user_id.clone())
            .ok_or_else(|| ServiceError::Remote("session is logged out".to_string()))
    }

    /// Deliver an event to every live session of the given users
    pub fn notify<'a>(&self, user_ids: impl IntoIterator<Item = &'a String>, event: &SessionEvent) {
        let targets: HashSet<&String> = user_ids.into_iter().collect();
        for session in self.sessions.values() {
            if targets.contains(&session.user_id) {
                let _ = session.events.send(event.clone());
            }
        }
    }

    /// Deliver an event to every live session of one identity
    pub fn notify_identity(&self, identity: &str, event: SessionEvent) -> usize {
        let mut delivered = 0;
        for session in self.sessions.values().filter(|s| s.identity == identity) {
            if session.events.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    // =========================================================================
    // Conversations
    // =========================================================================

    pub fn conversation(&self, conv_id: &str) -> ServiceResult<&Conversation> {
        self.conversations
            .iter()
            .find(|c| c.conv_id == conv_id)
            .ok_or_else(|| ServiceError::NotFound(format!("conversation {}", conv_id)))
    }

    fn member_conversation(&self, user_id: &str, conv_id: &str) -> ServiceResult<&Conversation> {
        let conversation = self.conversation(conv_id)?;
        if !conversation.has_participant(user_id) {
            return Err(ServiceError::Remote(format!(
                "{} is not a participant of {}",
                user_id, conv_id
            )));
        }
        Ok(conversation)
    }

    pub fn direct_conversation(&self, user_id: &str, peer: &str) -> ServiceResult<Conversation> {
        let peer_id = self.require_user(peer)?;
        self.conversations
            .iter()
            .find(|c| {
                c.kind == ConversationKind::Direct
                    && c.has_participant(user_id)
                    && c.has_participant(&peer_id)
            })
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("direct conversation with {}", peer)))
    }

    pub fn create_conversation(
        &mut self,
        creator_id: &str,
        kind: ConversationKind,
        members: &[String],
        title: Option<String>,
    ) -> ServiceResult<Conversation> {
        let mut participants = vec![creator_id.to_string()];
        for member in members {
            let member_id = self.require_user(member)?;
            if !participants.contains(&member_id) {
                participants.push(member_id);
            }
        }
        if kind == ConversationKind::Direct && participants.len() != 2 {
            return Err(ServiceError::Remote(
                "a direct conversation needs exactly one peer".to_string(),
            ));
        }

        let conversation = Conversation {
            conv_id: format!("conv-{}", uuid::Uuid::new_v4()),
            kind,
            title,
            participants,
            creator_id: creator_id.to_string(),
            creation_time: Utc::now(),
        };
        self.conversations.push(conversation.clone());
        Ok(conversation)
    }

    pub fn visible_conversation(&self, user_id: &str, conv_id: &str) -> ServiceResult<Conversation> {
        self.member_conversation(user_id, conv_id).cloned()
    }

    // =========================================================================
    // Items
    // =========================================================================

    pub fn add_item(
        &mut self,
        user_id: &str,
        conv_id: &str,
        content: ItemContent,
    ) -> ServiceResult<Item> {
        let participants = match self.member_conversation(user_id, conv_id) {
            Ok(conversation) => conversation.participants.clone(),
            Err(e) => return Err(ServiceError::Send(e.to_string())),
        };
        if let Some(parent_id) = &content.parent_id {
            if self.refuses_replies_from(user_id) {
                return Err(ServiceError::Send(format!("reply to {} refused", parent_id)));
            }
            match self.items.get(parent_id) {
                Some(parent) if parent.conv_id == conv_id => {}
                _ => {
                    return Err(ServiceError::Send(format!(
                        "parent item {} is not in {}",
                        parent_id, conv_id
                    )))
                }
            }
        }
        if content.content.is_empty() && content.attachments.is_empty() {
            return Err(ServiceError::Send("item has no content".to_string()));
        }

        let now = Utc::now();
        let item = Item {
            item_id: format!("item-{}", uuid::Uuid::new_v4()),
            conv_id: conv_id.to_string(),
            creator_id: user_id.to_string(),
            parent_item_id: content.parent_id,
            subject: content.subject,
            content: content.content,
            attachments: content.attachments.iter().map(stored_attachment).collect(),
            liked_by: Vec::new(),
            creation_time: now,
            modification_time: now,
        };
        self.items.insert(item.item_id.clone(), item.clone());
        self.timeline
            .entry(conv_id.to_string())
            .or_default()
            .push(item.item_id.clone());

        self.notify(&participants, &SessionEvent::ItemAdded { item: item.clone() });
        Ok(item)
    }

    fn refuses_replies_from(&self, user_id: &str) -> bool {
        self.accounts
            .iter()
            .any(|(identity, a)| a.user_id == user_id && self.refused_replies.contains(identity))
    }

    pub fn item(&self, user_id: &str, item_id: &str) -> ServiceResult<Item> {
        let item = self
            .items
            .get(item_id)
            .ok_or_else(|| ServiceError::NotFound(format!("item {}", item_id)))?;
        self.member_conversation(user_id, &item.conv_id)?;
        Ok(item.clone())
    }

    /// Apply `change` to a visible item and announce the result
    fn modify_item(
        &mut self,
        user_id: &str,
        item_id: &str,
        change: impl FnOnce(&mut Item) -> ServiceResult<()>,
    ) -> ServiceResult<Item> {
        let conv_id = self.item(user_id, item_id)?.conv_id;
        let participants = self.conversation(&conv_id)?.participants.clone();

        let item = self
            .items
            .get_mut(item_id)
            .ok_or_else(|| ServiceError::NotFound(format!("item {}", item_id)))?;
        change(item)?;
        item.modification_time = Utc::now();
        let item = item.clone();

        self.notify(&participants, &SessionEvent::ItemUpdated { item: item.clone() });
        Ok(item)
    }

    pub fn update_item(
        &mut self,
        user_id: &str,
        item_id: &str,
        content: ItemContent,
    ) -> ServiceResult<Item> {
        self.modify_item(user_id, item_id, |item| {
            if item.creator_id != user_id {
                return Err(ServiceError::Remote(format!(
                    "only the creator may update {}",
                    item.item_id
                )));
            }
            item.content = content.content;
            if content.subject.is_some() {
                item.subject = content.subject;
            }
            if !content.attachments.is_empty() {
                item.attachments = content.attachments.iter().map(stored_attachment).collect();
            }
            Ok(())
        })
    }

    pub fn set_like(&mut self, user_id: &str, item_id: &str, liked: bool) -> ServiceResult<Item> {
        self.modify_item(user_id, item_id, |item| {
            item.liked_by.retain(|u| u != user_id);
            if liked {
                item.liked_by.push(user_id.to_string());
            }
            Ok(())
        })
    }

    pub fn set_flag(
        &mut self,
        user_id: &str,
        conv_id: &str,
        item_id: &str,
        flagged: bool,
    ) -> ServiceResult<()> {
        let item = self.item(user_id, item_id)?;
        if item.conv_id != conv_id {
            return Err(ServiceError::NotFound(format!(
                "item {} in {}",
                item_id, conv_id
            )));
        }
        let flags = self
            .flags
            .entry((user_id.to_string(), conv_id.to_string()))
            .or_default();
        if flagged {
            flags.insert(item_id.to_string());
        } else {
            flags.remove(item_id);
        }
        Ok(())
    }

    pub fn flagged(&self, user_id: &str, conv_id: &str) -> ServiceResult<Vec<String>> {
        self.member_conversation(user_id, conv_id)?;
        Ok(self
            .flags
            .get(&(user_id.to_string(), conv_id.to_string()))
            .map(|flags| flags.iter().cloned().collect())
            .unwrap_or_default())
    }

    pub fn mark_read(
        &mut self,
        user_id: &str,
        conv_id: &str,
        until: DateTime<Utc>,
    ) -> ServiceResult<()> {
        self.member_conversation(user_id, conv_id)?;
        let marker = self
            .read_markers
            .entry((user_id.to_string(), conv_id.to_string()))
            .or_insert(until);
        // Read markers only move forward
        if until > *marker {
            *marker = until;
        }
        Ok(())
    }

    // =========================================================================
    // Presence
    // =========================================================================

    pub fn presence(&self, user_ids: &[String]) -> ServiceResult<Vec<Presence>> {
        user_ids
            .iter()
            .map(|peer| {
                let user_id = self.require_user(peer)?;
                let state = self
                    .accounts
                    .values()
                    .find(|a| a.user_id == user_id)
                    .map(|a| a.presence)
                    .unwrap_or(PresenceState::Offline);
                Ok(Presence { user_id, state })
            })
            .collect()
    }

    pub fn subscribe(&mut self, subscriber: &str, user_ids: &[String]) -> ServiceResult<()> {
        let resolved = user_ids
            .iter()
            .map(|peer| self.require_user(peer))
            .collect::<ServiceResult<Vec<_>>>()?;
        self.subscriptions
            .entry(subscriber.to_string())
            .or_default()
            .extend(resolved);
        Ok(())
    }

    pub fn set_presence(&mut self, user_id: &str, state: PresenceState) -> ServiceResult<()> {
        let account = self
            .accounts
            .values_mut()
            .find(|a| a.user_id == user_id)
            .ok_or_else(|| ServiceError::NotFound(format!("user {}", user_id)))?;
        account.presence = state;

        let watchers: Vec<String> = self
            .subscriptions
            .iter()
            .filter(|(_, watched)| watched.contains(user_id))
            .map(|(subscriber, _)| subscriber.clone())
            .collect();
        self.notify(
            &watchers,
            &SessionEvent::PresenceChanged {
                presence: Presence {
                    user_id: user_id.to_string(),
                    state,
                },
            },
        );
        Ok(())
    }
}

fn stored_attachment(upload: &FileUpload) -> Attachment {
    Attachment {
        file_id: format!("file-{}", uuid::Uuid::new_v4()),
        file_name: upload.file_name.clone(),
        mime_type: upload.mime_type.clone(),
        size: upload.data.len() as u64,
    }
}
