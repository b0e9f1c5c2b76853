// ABOUTME: "conversation" scenario - upload attachments, send a message, comment on new top-level items
// ABOUTME: Uses the configured conversation id, or a direct conversation with the second actor

use super::{direct_conversation_step, role, Scenario};
use crate::attachments;
use anyhow::{Context, Result};
use convoy_core::config::ScenarioConfig;
use convoy_core::conversation::get_conversation;
use convoy_core::{
    ActorConfig, ActorRegistry, Conversation, EventKind, Item, ItemContent, ObserverTable,
    ScenarioState, ScenarioStep, SessionEvent,
};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

pub const UPLOAD_TEXT: &str = "file upload test";
pub const MESSAGE_TEXT: &str = "send message test";
pub const COMMENT_TEXT: &str = "send comment test";

/// What the comment observer has done so far
#[derive(Debug, Default)]
struct CommentProgress {
    /// Ids of items that received a comment
    commented: HashSet<String>,
    /// First comment failure; fatal to the scenario
    failure: Option<String>,
}

pub fn build(config: &ScenarioConfig, actors: &[ActorConfig]) -> Result<Scenario> {
    let client = role("conversation", actors, 0)?.name.clone();
    let files_path = PathBuf::from(&config.files_path);
    let (progress_tx, progress_rx) = watch::channel(CommentProgress::default());

    let open = match &config.conversation_id {
        Some(conv_id) => configured_conversation_step(&client, conv_id),
        None => {
            let peer = role("conversation", actors, 1)
                .context("no scenario.conversation_id configured")?;
            direct_conversation_step(&client, peer.identity())
        }
    };

    let steps = vec![
        open,
        upload_step(files_path),
        message_step(),
        await_comments_step(progress_rx),
    ];
    Ok(Scenario::new("conversation", steps)
        .with_actor_observers(&client, comment_observer(Arc::new(progress_tx))))
}

fn configured_conversation_step(client: &str, conv_id: &str) -> ScenarioStep {
    let client = client.to_string();
    let conv_id = conv_id.to_string();
    ScenarioStep::new(
        "get conversation",
        move |registry: Arc<ActorRegistry>, mut state: ScenarioState| {
            let client = client.clone();
            let conv_id = conv_id.clone();
            async move {
                let session = registry.session(&client)?;
                let conversation = get_conversation(session.as_ref(), &conv_id)
                    .await
                    .with_context(|| format!("Failed to get conversation {}", conv_id))?;
                state.insert("client", session.info())?;
                state.insert("conversation", &conversation)?;
                Ok(state)
            }
        },
    )
}

fn upload_step(files_path: PathBuf) -> ScenarioStep {
    ScenarioStep::new(
        "upload files",
        move |registry: Arc<ActorRegistry>, mut state: ScenarioState| {
            let files_path = files_path.clone();
            async move {
                let conversation: Conversation = state.get("conversation")?;
                let client: convoy_core::SessionInfo = state.get("client")?;
                let session = registry.session(&client.identity)?;

                let uploads = attachments::collect(&files_path).await?;
                tracing::info!(
                    files = uploads.len(),
                    path = %files_path.display(),
                    "Uploading attachments"
                );
                let item = session
                    .add_text_item(
                        &conversation.conv_id,
                        ItemContent::text(UPLOAD_TEXT).with_attachments(uploads),
                    )
                    .await?;
                state.insert("upload", &item)?;
                Ok(state)
            }
        },
    )
}

fn message_step() -> ScenarioStep {
    ScenarioStep::new(
        "send message",
        |registry: Arc<ActorRegistry>, mut state: ScenarioState| async move {
            let conversation: Conversation = state.get("conversation")?;
            let client: convoy_core::SessionInfo = state.get("client")?;
            let session = registry.session(&client.identity)?;

            let item = session
                .add_text_item(&conversation.conv_id, ItemContent::text(MESSAGE_TEXT))
                .await?;
            state.insert("item", &item)?;
            Ok(state)
        },
    )
}

/// Wait until both posts of this scenario are commented, or a comment failed
fn await_comments_step(progress: watch::Receiver<CommentProgress>) -> ScenarioStep {
    ScenarioStep::new(
        "await comments",
        move |_registry: Arc<ActorRegistry>, state: ScenarioState| {
            let mut progress = progress.clone();
            async move {
                let upload: Item = state.get("upload")?;
                let message: Item = state.get("item")?;
                let posted = [upload.item_id, message.item_id];

                let failure = progress
                    .wait_for(|p| {
                        p.failure.is_some() || posted.iter().all(|id| p.commented.contains(id))
                    })
                    .await
                    .context("comment observer went away")?
                    .failure
                    .clone();
                if let Some(failure) = failure {
                    anyhow::bail!("commenting failed: {}", failure);
                }
                Ok(state)
            }
        },
    )
}

/// Comment on every top-level item; comments themselves are only logged
fn comment_observer(progress: Arc<watch::Sender<CommentProgress>>) -> ObserverTable {
    ObserverTable::new().on(EventKind::ItemAdded, move |session, event| {
        let progress = Arc::clone(&progress);
        async move {
            let SessionEvent::ItemAdded { item } = event else {
                return Ok(());
            };
            if is_comment(&item) {
                tracing::info!(item_id = %item.item_id, text = %item.content, "Comment added");
                return Ok(());
            }

            let comment = session
                .add_text_item(&item.conv_id, ItemContent::reply(&item.item_id, COMMENT_TEXT))
                .await
                .with_context(|| format!("Failed to comment on {}", item.item_id));
            match comment {
                Ok(comment) => {
                    tracing::info!(item_id = %item.item_id, comment_id = %comment.item_id, "Commented");
                    progress.send_modify(|p| {
                        p.commented.insert(item.item_id.clone());
                    });
                    Ok(())
                }
                Err(e) => {
                    progress.send_modify(|p| {
                        p.failure.get_or_insert_with(|| format!("{:#}", e));
                    });
                    Err(e)
                }
            }
        }
    })
}

fn is_comment(item: &Item) -> bool {
    item.parent_item_id.is_some()
}
