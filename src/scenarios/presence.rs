// ABOUTME: "presence" scenario - group conversation, A subscribes to its peers, B goes busy
// ABOUTME: A reads back the peers' presence; every actor after the first is a peer

use super::{role, Scenario};
use anyhow::Result;
use convoy_core::{
    ActorConfig, ActorRegistry, Conversation, PresenceState, ScenarioState, ScenarioStep,
};
use std::sync::Arc;

pub const GROUP_TITLE: &str = "convoy group";

pub fn build(actors: &[ActorConfig]) -> Result<Scenario> {
    let a = role("presence", actors, 0)?.identity().to_string();
    let b = role("presence", actors, 1)?.identity().to_string();
    let peers: Vec<String> = actors[1..].iter().map(|p| p.identity().to_string()).collect();

    let steps = vec![
        group_step(a.clone(), peers.clone()),
        subscribe_step(a.clone(), peers.clone()),
        busy_step(b),
        read_presence_step(a, peers),
    ];
    Ok(Scenario::new("presence", steps))
}

fn user_ids(registry: &ActorRegistry, identities: &[String]) -> Result<Vec<String>> {
    identities
        .iter()
        .map(|identity| Ok(registry.user_id(identity)?))
        .collect()
}

fn group_step(owner: String, peers: Vec<String>) -> ScenarioStep {
    ScenarioStep::new(
        "group conversation",
        move |registry: Arc<ActorRegistry>, mut state: ScenarioState| {
            let owner = owner.clone();
            let peers = peers.clone();
            async move {
                let members = user_ids(&registry, &peers)?;
                let session = registry.session(&owner)?;
                let conversation = session
                    .create_group_conversation(&members, GROUP_TITLE)
                    .await?;
                tracing::info!(
                    conv_id = %conversation.conv_id,
                    members = conversation.participants.len(),
                    "Group conversation created"
                );
                state.insert("client", session.info())?;
                state.insert("conversation", &conversation)?;
                Ok(state)
            }
        },
    )
}

fn subscribe_step(subscriber: String, peers: Vec<String>) -> ScenarioStep {
    ScenarioStep::new(
        "subscribe presence",
        move |registry: Arc<ActorRegistry>, state: ScenarioState| {
            let subscriber = subscriber.clone();
            let peers = peers.clone();
            async move {
                // Only members of the conversation are watched
                let conversation: Conversation = state.get("conversation")?;
                let watched: Vec<String> = user_ids(&registry, &peers)?
                    .into_iter()
                    .filter(|id| conversation.has_participant(id))
                    .collect();
                registry
                    .session(&subscriber)?
                    .subscribe_presence(&watched)
                    .await?;
                Ok(state)
            }
        },
    )
}

fn busy_step(actor: String) -> ScenarioStep {
    ScenarioStep::new(
        "set busy",
        move |registry: Arc<ActorRegistry>, state: ScenarioState| {
            let actor = actor.clone();
            async move {
                registry
                    .session(&actor)?
                    .set_presence(PresenceState::Busy)
                    .await?;
                Ok(state)
            }
        },
    )
}

fn read_presence_step(reader: String, peers: Vec<String>) -> ScenarioStep {
    ScenarioStep::new(
        "read presence",
        move |registry: Arc<ActorRegistry>, mut state: ScenarioState| {
            let reader = reader.clone();
            let peers = peers.clone();
            async move {
                let watched = user_ids(&registry, &peers)?;
                let presence = registry
                    .session(&reader)?
                    .get_presence(&watched)
                    .await?;
                for p in &presence {
                    tracing::info!(user_id = %p.user_id, state = ?p.state, "Presence");
                }
                state.insert("presence", &presence)?;
                Ok(state)
            }
        },
    )
}
