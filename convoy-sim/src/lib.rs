// ABOUTME: Loopback messaging service - an in-memory implementation of the convoy service traits
// ABOUTME: Deterministic scenarios and tests with fault injection and call accounting

//! # Example
//!
//! ```no_run
//! use convoy_core::{ActorConfig, Credentials, RunnerConfig, ScenarioRunner};
//! use convoy_sim::LoopbackService;
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let service = LoopbackService::new();
//! let alice = ActorConfig::new("A", Credentials::password("alice@example.com", "hunter2"));
//! service.seed(&[alice.clone()], "example.com");
//!
//! let runner = ScenarioRunner::new(Arc::new(service.connector()), RunnerConfig::new("example.com"));
//! let registry = runner.logon_all(&[alice]).await.unwrap();
//! assert!(registry.session("A").is_ok());
//! # }
//! ```

mod session;
mod world;

pub use session::{LoopbackConnector, LoopbackSession};

use chrono::{DateTime, Utc};
use convoy_core::{
    ActorConfig, ConnectionState, Conversation, Credentials, Item, PresenceState, SessionEvent,
};
use session::lock;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use world::{Account, World};

/// Handle to one in-memory service instance. Clones share the same state.
#[derive(Clone, Default)]
pub struct LoopbackService {
    world: Arc<Mutex<World>>,
    logon_delay: Option<Duration>,
}

impl LoopbackService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every logon, for exercising concurrent logons
    pub fn with_logon_delay(mut self, delay: Duration) -> Self {
        self.logon_delay = Some(delay);
        self
    }

    pub fn connector(&self) -> LoopbackConnector {
        LoopbackConnector {
            world: Arc::clone(&self.world),
            logon_delay: self.logon_delay,
        }
    }

    /// Create (or re-key) an account and return its user id
    pub fn register_user(
        &self,
        credentials: &Credentials,
        domain: &str,
        display_name: Option<&str>,
    ) -> String {
        let mut world = lock(&self.world);
        let identity = credentials.identity().to_string();
        if let Some(account) = world.accounts.get_mut(&identity) {
            account.credentials = credentials.clone();
            account.domain = domain.to_string();
            return account.user_id.clone();
        }

        let user_id = format!("u-{}", uuid::Uuid::new_v4());
        tracing::debug!(%identity, %user_id, domain, "Registering loopback account");
        world.accounts.insert(
            identity,
            Account {
                user_id: user_id.clone(),
                credentials: credentials.clone(),
                domain: domain.to_string(),
                display_name: display_name.map(str::to_string),
                presence: PresenceState::Available,
            },
        );
        user_id
    }

    /// Register an account for every configured actor
    pub fn seed(&self, actors: &[ActorConfig], default_domain: &str) {
        for actor in actors {
            self.register_user(
                &actor.credentials,
                actor.domain_or(default_domain),
                actor.display_name.as_deref(),
            );
        }
    }

    pub fn user_id(&self, identity: &str) -> Option<String> {
        lock(&self.world)
            .accounts
            .get(identity)
            .map(|a| a.user_id.clone())
    }

    // =========================================================================
    // Fault injection
    // =========================================================================

    /// Refuse every further logon of this identity with `Auth("bad credential")`
    pub fn reject_logons(&self, identity: &str) {
        lock(&self.world).rejected.insert(identity.to_string());
    }

    pub fn accept_logons(&self, identity: &str) {
        lock(&self.world).rejected.remove(identity);
    }

    /// Fail every reply (item with a parent) posted by this identity
    pub fn refuse_replies(&self, identity: &str) {
        lock(&self.world).refused_replies.insert(identity.to_string());
    }

    /// Report a lost connection to every live session of the identity.
    /// Returns how many sessions were told.
    pub fn disconnect(&self, identity: &str) -> usize {
        lock(&self.world).notify_identity(
            identity,
            SessionEvent::ConnectionStateChanged {
                state: ConnectionState::Disconnected,
            },
        )
    }

    /// Report a failed token renewal to every live session of the identity
    pub fn renew_token_error(&self, identity: &str, reason: &str) -> usize {
        lock(&self.world).notify_identity(
            identity,
            SessionEvent::RenewTokenError {
                reason: reason.to_string(),
            },
        )
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn logon_attempts(&self, identity: &str) -> usize {
        lock(&self.world)
            .logon_attempts
            .get(identity)
            .copied()
            .unwrap_or(0)
    }

    pub fn logouts(&self, identity: &str) -> usize {
        lock(&self.world).logouts.get(identity).copied().unwrap_or(0)
    }

    pub fn active_sessions(&self, identity: &str) -> usize {
        lock(&self.world)
            .sessions
            .values()
            .filter(|s| s.identity == identity)
            .count()
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        lock(&self.world).conversations.clone()
    }

    /// Items of a conversation in posting order
    pub fn items_in(&self, conv_id: &str) -> Vec<Item> {
        let world = lock(&self.world);
        world
            .timeline
            .get(conv_id)
            .map(|ids| ids.iter().filter_map(|id| world.items.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    pub fn last_read(&self, user_id: &str, conv_id: &str) -> Option<DateTime<Utc>> {
        lock(&self.world)
            .read_markers
            .get(&(user_id.to_string(), conv_id.to_string()))
            .copied()
    }
}
