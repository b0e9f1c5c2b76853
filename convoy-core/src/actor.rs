// ABOUTME: Actors (logged-on sessions) with event pumps and the reconnection policy
// ABOUTME: ActorRegistry owns every actor of a scenario run, keyed by identity

use crate::config::ActorConfig;
use crate::error::{HarnessError, ServiceError};
use crate::events::{EventKind, EventStream, SessionEvent};
use crate::metrics;
use crate::observers::ObserverTable;
use crate::traits::{Credentials, RemoteSession, SessionConnector, SessionInfo};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Connection lifecycle of one actor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorState {
    LoggedOut,
    LoggingOn,
    LoggedOn,
    /// Lost the connection; a reconnection timer is pending
    Disconnected,
}

struct ActorInner {
    state: ActorState,
    session: Option<Arc<dyn RemoteSession>>,
    info: Option<SessionInfo>,
    observers: ObserverTable,
    /// Task delivering the current session's events to observers
    pump: Option<JoinHandle<()>>,
    /// At most one pending timed logon
    reconnect_timer: Option<JoinHandle<()>>,
    /// Bumped on every arm so a fired timer can tell whether it was replaced
    timer_generation: u64,
    /// Bumped on every explicit logout; logons started earlier are discarded
    logout_epoch: u64,
}

/// A named participant bound to one [`ActorConfig`].
///
/// Always handled through `Arc<Actor>`: the event pump and the reconnection
/// timer hold weak references back to it.
pub struct Actor {
    name: String,
    credentials: Credentials,
    domain: String,
    connector: Arc<dyn SessionConnector>,
    min_logon_interval: Duration,
    inner: Mutex<ActorInner>,
}

impl Actor {
    pub fn new(
        config: &ActorConfig,
        default_domain: &str,
        connector: Arc<dyn SessionConnector>,
        min_logon_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: config.name.clone(),
            credentials: config.credentials.clone(),
            domain: config.domain_or(default_domain).to_string(),
            connector,
            min_logon_interval,
            inner: Mutex::new(ActorInner {
                state: ActorState::LoggedOut,
                session: None,
                info: None,
                observers: ObserverTable::new(),
                pump: None,
                reconnect_timer: None,
                timer_generation: 0,
                logout_epoch: 0,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ActorInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Email or client id
    pub fn identity(&self) -> &str {
        self.credentials.identity()
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn state(&self) -> ActorState {
        self.lock().state
    }

    /// Identity resolved by the last successful logon
    pub fn info(&self) -> Option<SessionInfo> {
        self.lock().info.clone()
    }

    /// Service user id from the last successful logon
    pub fn user_id(&self) -> Option<String> {
        self.lock().info.as_ref().map(|info| info.user_id.clone())
    }

    /// Current session, if logged on
    pub fn session(&self) -> Option<Arc<dyn RemoteSession>> {
        self.lock().session.clone()
    }

    pub fn has_pending_reconnect(&self) -> bool {
        self.lock().reconnect_timer.is_some()
    }

    pub fn observer_kinds(&self) -> Vec<EventKind> {
        self.lock().observers.kinds()
    }

    fn logout_epoch(&self) -> u64 {
        self.lock().logout_epoch
    }

    /// No explicit logout happened since `epoch` was read
    fn is_current(&self, epoch: u64) -> bool {
        self.lock().logout_epoch == epoch
    }

    /// Log on and start delivering events to the registered observers
    pub async fn logon(self: &Arc<Self>) -> Result<SessionInfo, ServiceError> {
        self.logon_with(None).await
    }

    /// Log on; on success install `observers` before the first event is delivered.
    /// A failed logon leaves the observer table untouched.
    pub async fn logon_with(
        self: &Arc<Self>,
        observers: Option<ObserverTable>,
    ) -> Result<SessionInfo, ServiceError> {
        let epoch = self.logout_epoch();
        self.connect(epoch, observers).await
    }

    /// Logon attempt that only takes effect if no logout happened since `epoch`
    async fn connect(
        self: &Arc<Self>,
        epoch: u64,
        observers: Option<ObserverTable>,
    ) -> Result<SessionInfo, ServiceError> {
        {
            let mut inner = self.lock();
            if inner.logout_epoch != epoch {
                return Err(logged_out());
            }
            inner.state = ActorState::LoggingOn;
        }
        tracing::info!(
            actor = %self.name,
            identity = %self.identity(),
            domain = %self.domain,
            service = self.connector.service_id(),
            "Logging on"
        );

        let connected = async {
            let session = self.connector.logon(&self.credentials, &self.domain).await?;
            let events = session.event_stream().await?;
            Ok::<_, ServiceError>((session, events))
        }
        .await;

        match connected {
            Ok((session, events)) => {
                let info = session.info().clone();
                let installed = {
                    let mut inner = self.lock();
                    if inner.logout_epoch != epoch {
                        false
                    } else {
                        if let Some(observers) = observers {
                            inner.observers.merge(observers);
                        }
                        if let Some(previous) = inner.pump.take() {
                            previous.abort();
                        }
                        inner.pump = Some(self.spawn_pump(Arc::clone(&session), events));
                        inner.session = Some(Arc::clone(&session));
                        inner.info = Some(info.clone());
                        inner.state = ActorState::LoggedOn;
                        true
                    }
                };
                if !installed {
                    tracing::info!(actor = %self.name, "Logged out while logging on, dropping session");
                    if let Err(e) = session.logout().await {
                        tracing::warn!(actor = %self.name, error = %e, "Logout of dropped session failed");
                    }
                    return Err(logged_out());
                }

                metrics::record_logon("success");
                tracing::info!(
                    actor = %self.name,
                    user_id = %info.user_id,
                    "Logon success"
                );
                Ok(info)
            }
            Err(e) => {
                {
                    let mut inner = self.lock();
                    if inner.logout_epoch == epoch {
                        inner.state = ActorState::LoggedOut;
                    }
                }
                metrics::record_logon("failure");
                tracing::warn!(actor = %self.name, error = %e, "Logon failure");
                Err(e)
            }
        }
    }

    /// Attach handlers; a kind registered again replaces its earlier handler
    pub fn register_observers(&self, observers: ObserverTable) {
        tracing::debug!(
            actor = %self.name,
            kinds = ?observers.kinds(),
            "Registering event observers"
        );
        self.lock().observers.merge(observers);
    }

    /// Explicit logout: cancels pending reconnects and stops event delivery
    pub async fn logout(&self) -> Result<(), ServiceError> {
        let session = {
            let mut inner = self.lock();
            inner.state = ActorState::LoggedOut;
            inner.logout_epoch += 1;
            if let Some(timer) = inner.reconnect_timer.take() {
                timer.abort();
            }
            if let Some(pump) = inner.pump.take() {
                pump.abort();
            }
            inner.session.take()
        };

        if let Some(session) = session {
            tracing::info!(actor = %self.name, "Logging out");
            session.logout().await?;
        }
        Ok(())
    }

    /// Immediate logout + logon, independent of the timed reconnection policy
    pub async fn force_reconnect(self: &Arc<Self>) -> Result<(), ServiceError> {
        let (epoch, session) = {
            let mut inner = self.lock();
            if inner.state == ActorState::LoggedOut {
                tracing::debug!(actor = %self.name, "Logged out, not forcing a reconnect");
                return Ok(());
            }
            if inner.state == ActorState::LoggingOn {
                tracing::debug!(actor = %self.name, "Logon already in progress, not forcing another");
                return Ok(());
            }
            if let Some(timer) = inner.reconnect_timer.take() {
                timer.abort();
            }
            inner.state = ActorState::LoggingOn;
            (inner.logout_epoch, inner.session.take())
        };

        metrics::record_reconnect("renew_token_error");
        tracing::info!(actor = %self.name, "Forcing reconnect");
        if let Some(session) = session {
            if let Err(e) = session.logout().await {
                tracing::warn!(actor = %self.name, error = %e, "Logout before reconnect failed");
            }
        }
        self.connect(epoch, None).await.map(|_| ())
    }

    fn spawn_pump(
        self: &Arc<Self>,
        session: Arc<dyn RemoteSession>,
        mut events: EventStream,
    ) -> JoinHandle<()> {
        let actor = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let Some(actor) = actor.upgrade() else {
                    break;
                };
                actor.dispatch(&session, event).await;
            }
            tracing::debug!(user_id = %session.user_id(), "Event stream ended");
        })
    }

    async fn dispatch(self: &Arc<Self>, session: &Arc<dyn RemoteSession>, event: SessionEvent) {
        let kind = event.kind();
        metrics::record_event(kind.as_str());

        let current = self
            .lock()
            .session
            .as_ref()
            .is_some_and(|live| std::ptr::addr_eq(Arc::as_ptr(live), Arc::as_ptr(session)));
        if !current && (event.is_disconnect() || kind == EventKind::RenewTokenError) {
            tracing::debug!(actor = %self.name, kind = %kind, "Ignoring event from a replaced session");
        } else if event.is_disconnect() {
            self.on_disconnected();
        } else if let SessionEvent::RenewTokenError { reason } = &event {
            tracing::warn!(actor = %self.name, reason = %reason, "Token renewal failed, reconnecting");
            // Runs outside the pump: reconnecting replaces this pump task
            let actor = Arc::clone(self);
            let epoch = self.logout_epoch();
            tokio::spawn(async move {
                if let Err(e) = actor.force_reconnect().await {
                    if actor.is_current(epoch) {
                        tracing::error!(actor = %actor.name, error = %e, "Forced reconnect failed");
                        actor.schedule_reconnect();
                    }
                }
            });
        }

        let handler = self.lock().observers.get(kind);
        if let Some(handler) = handler {
            if let Err(e) = handler(Arc::clone(session), event).await {
                tracing::error!(
                    actor = %self.name,
                    kind = %kind,
                    error = %e,
                    "Event observer failed"
                );
            }
        }
    }

    fn on_disconnected(self: &Arc<Self>) {
        let state = self.state();
        match state {
            ActorState::LoggedOn | ActorState::Disconnected => {
                tracing::info!(
                    actor = %self.name,
                    retry_in = ?self.min_logon_interval,
                    "Disconnected, scheduling logon"
                );
                self.schedule_reconnect();
            }
            ActorState::LoggingOn | ActorState::LoggedOut => {
                tracing::debug!(actor = %self.name, state = ?state, "Ignoring disconnect");
            }
        }
    }

    /// Arm the reconnection timer, replacing any pending one
    fn schedule_reconnect(self: &Arc<Self>) {
        let mut inner = self.lock();
        inner.state = ActorState::Disconnected;
        if let Some(previous) = inner.reconnect_timer.take() {
            previous.abort();
            tracing::debug!(actor = %self.name, "Re-arming reconnection timer");
        }

        inner.timer_generation += 1;
        let generation = inner.timer_generation;

        let epoch = inner.logout_epoch;
        let actor: Weak<Actor> = Arc::downgrade(self);
        let delay = self.min_logon_interval;
        inner.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(actor) = actor.upgrade() else {
                return;
            };
            {
                let mut inner = actor.lock();
                if inner.timer_generation != generation {
                    return;
                }
                inner.reconnect_timer = None;
            }
            metrics::record_reconnect("disconnected");
            if let Err(e) = actor.connect(epoch, None).await {
                if actor.is_current(epoch) {
                    tracing::warn!(actor = %actor.name, error = %e, "Reconnect failed, retrying later");
                    actor.schedule_reconnect();
                }
            }
        }));
    }
}

fn logged_out() -> ServiceError {
    ServiceError::Remote("actor was logged out during logon".to_string())
}

impl Drop for Actor {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(timer) = inner.reconnect_timer.take() {
            timer.abort();
        }
        if let Some(pump) = inner.pump.take() {
            pump.abort();
        }
    }
}

impl std::fmt::Debug for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Actor")
            .field("name", &self.name)
            .field("identity", &self.identity())
            .field("domain", &self.domain)
            .field("state", &self.state())
            .finish()
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Every actor of one scenario run, keyed by identity (email or client id).
/// Lookups also accept the actor's configured name.
#[derive(Debug, Default)]
pub struct ActorRegistry {
    actors: HashMap<String, Arc<Actor>>,
    /// Identities in configuration order
    order: Vec<String>,
}

impl ActorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an actor. An identity can only be registered once.
    pub fn insert(&mut self, actor: Arc<Actor>) -> Result<(), HarnessError> {
        let identity = actor.identity().to_string();
        if self.actors.contains_key(&identity) {
            return Err(HarnessError::DuplicateActor(identity));
        }
        self.order.push(identity.clone());
        self.actors.insert(identity, actor);
        Ok(())
    }

    /// Find an actor by identity, falling back to its name
    pub fn get(&self, key: &str) -> Option<&Arc<Actor>> {
        self.actors
            .get(key)
            .or_else(|| self.actors.values().find(|a| a.name() == key))
    }

    pub fn actor(&self, key: &str) -> Result<&Arc<Actor>, HarnessError> {
        self.get(key)
            .ok_or_else(|| HarnessError::UnknownActor(key.to_string()))
    }

    /// Current session of an actor; fails when unknown or not logged on
    pub fn session(&self, key: &str) -> Result<Arc<dyn RemoteSession>, HarnessError> {
        let actor = self.actor(key)?;
        actor
            .session()
            .ok_or_else(|| HarnessError::NotLoggedOn(actor.name().to_string()))
    }

    /// Service user id of an actor
    pub fn user_id(&self, key: &str) -> Result<String, HarnessError> {
        let actor = self.actor(key)?;
        actor
            .user_id()
            .ok_or_else(|| HarnessError::NotLoggedOn(actor.name().to_string()))
    }

    pub fn identities(&self) -> &[String] {
        &self.order
    }

    /// Actors in configuration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Actor>> {
        self.order.iter().filter_map(|id| self.actors.get(id))
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Log every actor out; failures are logged and do not stop the others
    pub async fn shutdown(&self) {
        let logouts = self.iter().map(|actor| async move {
            if let Err(e) = actor.logout().await {
                tracing::warn!(actor = %actor.name(), error = %e, "Logout failed");
            }
        });
        futures::future::join_all(logouts).await;
    }
}
