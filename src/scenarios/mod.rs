// ABOUTME: Scenario catalog - named step pipelines and observer tables run by the binary
// ABOUTME: Each scenario binds its roles (client, peer) to configured actors by position

pub mod conversation;
pub mod direct_reply;
pub mod presence;
pub mod reactions;

use anyhow::{Context, Result};
use convoy_core::config::ScenarioConfig;
use convoy_core::conversation::get_or_create_direct_conversation;
use convoy_core::{
    ActorConfig, ActorRegistry, ObserverTable, RunnerConfig, ScenarioRunner, ScenarioState,
    ScenarioStep, SessionConnector,
};
use std::sync::Arc;

/// Scenario names accepted in `scenario.name`
pub const CATALOG: [&str; 4] = ["conversation", "direct-reply", "reactions", "presence"];

/// A ready-to-run scenario
pub struct Scenario {
    pub name: &'static str,
    /// Observers every actor gets
    pub observers: ObserverTable,
    /// Extra observers per actor name
    pub actor_observers: Vec<(String, ObserverTable)>,
    pub steps: Vec<ScenarioStep>,
}

impl Scenario {
    fn new(name: &'static str, steps: Vec<ScenarioStep>) -> Self {
        Self {
            name,
            observers: ObserverTable::logging(),
            actor_observers: Vec::new(),
            steps,
        }
    }

    fn with_actor_observers(mut self, actor: &str, observers: ObserverTable) -> Self {
        self.actor_observers.push((actor.to_string(), observers));
        self
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Log every actor on, run the steps, log everyone out
    pub async fn run(
        &self,
        connector: Arc<dyn SessionConnector>,
        config: RunnerConfig,
        actors: &[ActorConfig],
    ) -> Result<ScenarioState> {
        let mut runner = ScenarioRunner::new(connector, config).with_observers(self.observers.clone());
        for (actor, observers) in &self.actor_observers {
            runner = runner.with_actor_observers(actor.clone(), observers.clone());
        }

        tracing::info!(scenario = self.name, steps = ?self.step_names(), "Starting scenario");
        let state = runner.run(actors, &self.steps).await?;
        Ok(state)
    }
}

/// Build a catalog scenario for the configured actors
pub fn build(name: &str, config: &ScenarioConfig, actors: &[ActorConfig]) -> Result<Scenario> {
    match name {
        "conversation" => conversation::build(config, actors),
        "direct-reply" => direct_reply::build(actors),
        "reactions" => reactions::build(actors),
        "presence" => presence::build(actors),
        other => anyhow::bail!(
            "unknown scenario '{}' (available: {})",
            other,
            CATALOG.join(", ")
        ),
    }
}

/// Actor at `index`, or an error naming the scenario that needs it
fn role<'a>(scenario: &str, actors: &'a [ActorConfig], index: usize) -> Result<&'a ActorConfig> {
    actors.get(index).with_context(|| {
        format!(
            "scenario '{}' needs at least {} actors, {} configured",
            scenario,
            index + 1,
            actors.len()
        )
    })
}

/// `client` and `conversation`: the client's direct conversation with `peer`
fn direct_conversation_step(client: &str, peer: &str) -> ScenarioStep {
    let client = client.to_string();
    let peer = peer.to_string();
    ScenarioStep::new(
        "direct conversation",
        move |registry: Arc<ActorRegistry>, mut state: ScenarioState| {
            let client = client.clone();
            let peer = peer.clone();
            async move {
                let session = registry.session(&client)?;
                let conversation = get_or_create_direct_conversation(session.as_ref(), &peer)
                    .await
                    .with_context(|| format!("Failed to get direct conversation with {}", peer))?;
                tracing::info!(conv_id = %conversation.conv_id, peer = %peer, "Direct conversation ready");

                state.insert("client", session.info())?;
                state.insert("conversation", &conversation)?;
                Ok(state)
            }
        },
    )
}
