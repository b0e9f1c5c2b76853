// ABOUTME: "reactions" scenario - post, edit, like/unlike/like, flag and clear, mark as read
// ABOUTME: A owns the item; B toggles its like three times so it ends up liked

use super::{direct_conversation_step, role, Scenario};
use anyhow::{Context, Result};
use chrono::Utc;
use convoy_core::{
    ActorConfig, ActorRegistry, Conversation, Item, ItemContent, ScenarioState, ScenarioStep,
};
use std::sync::Arc;

pub const POST_TEXT: &str = "reactions test";
pub const EDITED_TEXT: &str = "reactions test (edited)";

pub fn build(actors: &[ActorConfig]) -> Result<Scenario> {
    let a = role("reactions", actors, 0)?.identity().to_string();
    let b = role("reactions", actors, 1)?.identity().to_string();

    let steps = vec![
        direct_conversation_step(&a, &b),
        post_step(a.clone()),
        update_step(a.clone()),
        like_step(b),
        flag_step(a.clone()),
        mark_read_step(a),
    ];
    Ok(Scenario::new("reactions", steps))
}

fn post_step(author: String) -> ScenarioStep {
    ScenarioStep::new(
        "post",
        move |registry: Arc<ActorRegistry>, mut state: ScenarioState| {
            let author = author.clone();
            async move {
                let conversation: Conversation = state.get("conversation")?;
                let item = registry
                    .session(&author)?
                    .add_text_item(&conversation.conv_id, ItemContent::text(POST_TEXT))
                    .await?;
                state.insert("item", &item)?;
                Ok(state)
            }
        },
    )
}

fn update_step(author: String) -> ScenarioStep {
    ScenarioStep::new(
        "update",
        move |registry: Arc<ActorRegistry>, mut state: ScenarioState| {
            let author = author.clone();
            async move {
                let item: Item = state.get("item")?;
                let updated = registry
                    .session(&author)?
                    .update_text_item(&item.item_id, ItemContent::text(EDITED_TEXT))
                    .await?;
                tracing::info!(item_id = %updated.item_id, text = %updated.content, "Item updated");
                state.insert("updated", &updated)?;
                Ok(state)
            }
        },
    )
}

fn like_step(liker: String) -> ScenarioStep {
    ScenarioStep::new(
        "like",
        move |registry: Arc<ActorRegistry>, mut state: ScenarioState| {
            let liker = liker.clone();
            async move {
                let item: Item = state.get("item")?;
                let session = registry.session(&liker)?;

                session.like_item(&item.item_id).await.context("like")?;
                session.unlike_item(&item.item_id).await.context("unlike")?;
                session.like_item(&item.item_id).await.context("like again")?;

                let liked = session
                    .get_item(&item.item_id)
                    .await?
                    .is_liked_by(session.user_id());
                tracing::info!(item_id = %item.item_id, liked, "Like toggled three times");
                state.insert("liked", &liked)?;
                Ok(state)
            }
        },
    )
}

fn flag_step(owner: String) -> ScenarioStep {
    ScenarioStep::new(
        "flag",
        move |registry: Arc<ActorRegistry>, mut state: ScenarioState| {
            let owner = owner.clone();
            async move {
                let conversation: Conversation = state.get("conversation")?;
                let item: Item = state.get("item")?;
                let session = registry.session(&owner)?;

                session.set_flag(&conversation.conv_id, &item.item_id).await?;
                let flagged = session
                    .flagged_items(&conversation.conv_id)
                    .await?
                    .contains(&item.item_id);
                if !flagged {
                    anyhow::bail!("item {} is not flagged after set_flag", item.item_id);
                }

                session.clear_flag(&conversation.conv_id, &item.item_id).await?;
                let still_flagged = session
                    .flagged_items(&conversation.conv_id)
                    .await?
                    .contains(&item.item_id);
                if still_flagged {
                    anyhow::bail!("item {} is still flagged after clear_flag", item.item_id);
                }
                // Seen flagged after set_flag; "flagged" mirrors the service afterwards
                state.insert("flag_verified", &flagged)?;
                state.insert("flagged", &still_flagged)?;
                Ok(state)
            }
        },
    )
}

fn mark_read_step(reader: String) -> ScenarioStep {
    ScenarioStep::new(
        "mark as read",
        move |registry: Arc<ActorRegistry>, state: ScenarioState| {
            let reader = reader.clone();
            async move {
                let conversation: Conversation = state.get("conversation")?;
                registry
                    .session(&reader)?
                    .mark_as_read(&conversation.conv_id, Utc::now())
                    .await?;
                Ok(state)
            }
        },
    )
}
