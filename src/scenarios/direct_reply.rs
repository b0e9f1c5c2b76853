// ABOUTME: "direct-reply" scenario - A greets B in their direct conversation, B replies to that item
// ABOUTME: Final state: client = A, conversation, message = A's post, item = B's reply

use super::{direct_conversation_step, role, Scenario};
use anyhow::Result;
use convoy_core::{
    ActorConfig, ActorRegistry, Conversation, Item, ItemContent, ScenarioState, ScenarioStep,
};
use std::sync::Arc;

pub const GREETING: &str = "Hello from A";
pub const REPLY: &str = "Hello from B";

pub fn build(actors: &[ActorConfig]) -> Result<Scenario> {
    let a = role("direct-reply", actors, 0)?;
    let b = role("direct-reply", actors, 1)?;

    let steps = vec![
        direct_conversation_step(a.identity(), b.identity()),
        post_step(a.identity()),
        reply_step(b.identity()),
    ];
    Ok(Scenario::new("direct-reply", steps))
}

fn post_step(author: &str) -> ScenarioStep {
    let author = author.to_string();
    ScenarioStep::new(
        "post greeting",
        move |registry: Arc<ActorRegistry>, mut state: ScenarioState| {
            let author = author.clone();
            async move {
                let conversation: Conversation = state.get("conversation")?;
                let item = registry
                    .session(&author)?
                    .add_text_item(&conversation.conv_id, ItemContent::text(GREETING))
                    .await?;
                tracing::info!(item_id = %item.item_id, "Greeting posted");
                state.insert("message", &item)?;
                Ok(state)
            }
        },
    )
}

fn reply_step(replier: &str) -> ScenarioStep {
    let replier = replier.to_string();
    ScenarioStep::new(
        "reply",
        move |registry: Arc<ActorRegistry>, mut state: ScenarioState| {
            let replier = replier.clone();
            async move {
                let conversation: Conversation = state.get("conversation")?;
                let message: Item = state.get("message")?;
                let reply = registry
                    .session(&replier)?
                    .add_text_item(
                        &conversation.conv_id,
                        ItemContent::reply(&message.item_id, REPLY),
                    )
                    .await?;
                tracing::info!(item_id = %reply.item_id, parent = %message.item_id, "Reply posted");
                state.insert("item", &reply)?;
                Ok(state)
            }
        },
    )
}
