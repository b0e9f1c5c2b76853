// ABOUTME: Scenario orchestration harness for remote messaging services
// ABOUTME: Logs actors on, wires their event observers, and drives ordered scenario steps

pub mod actor;
pub mod config;
pub mod conversation;
pub mod error;
pub mod events;
pub mod metrics;
pub mod observers;
pub mod paths;
pub mod runner;
pub mod state;
pub mod traits;

pub use actor::{Actor, ActorRegistry, ActorState};
pub use config::{ActorConfig, Config};
pub use error::{HarnessError, ServiceError, StateError};
pub use events::{ConnectionState, EventKind, EventStream, SessionEvent};
pub use observers::{EventHandler, ObserverTable};
pub use runner::{terminate, PipelineState, RunnerConfig, ScenarioRunner, ScenarioStep};
pub use state::ScenarioState;

// Re-export the service boundary for convenient access
pub use traits::{
    // Connecting
    Credentials, RemoteSession, ServiceResult, SessionConnector, SessionInfo,
    // Data Types
    Attachment, Conversation, ConversationKind, FileUpload, Item, ItemContent, Presence,
    PresenceState,
};
