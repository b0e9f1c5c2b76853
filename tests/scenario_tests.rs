// ABOUTME: End-to-end tests running the scenario catalog against the loopback service
// ABOUTME: Checks the final scenario state and what the service recorded

use convoy::scenarios::{self, conversation, direct_reply, reactions};
use convoy_core::config::ScenarioConfig;
use convoy_core::{
    ActorConfig, Conversation, Credentials, HarnessError, Item, Presence, PresenceState,
    RunnerConfig, ServiceError, SessionConnector, SessionInfo,
};
use convoy_sim::LoopbackService;
use std::sync::Arc;
use std::time::Duration;

const DOMAIN: &str = "example.com";

fn actors() -> Vec<ActorConfig> {
    vec![
        ActorConfig::new("A", Credentials::password("alice@example.com", "hunter2"))
            .with_display_name("Alice"),
        ActorConfig::new("B", Credentials::client("bob-bot", "s3cret")),
    ]
}

fn loopback(actors: &[ActorConfig]) -> LoopbackService {
    let service = LoopbackService::new();
    service.seed(actors, DOMAIN);
    service
}

fn runner_config() -> RunnerConfig {
    RunnerConfig::new(DOMAIN)
        .with_min_logon_interval(Duration::from_millis(100))
        .with_step_timeout(Duration::from_secs(10))
}

#[tokio::test]
async fn test_direct_reply_end_to_end() {
    let actors = actors();
    let service = loopback(&actors);
    let scenario = scenarios::build("direct-reply", &ScenarioConfig::default(), &actors).unwrap();
    assert_eq!(
        scenario.step_names(),
        vec!["direct conversation", "post greeting", "reply"]
    );

    let state = scenario
        .run(Arc::new(service.connector()), runner_config(), &actors)
        .await
        .unwrap();

    let client: SessionInfo = state.get("client").unwrap();
    let conversation: Conversation = state.get("conversation").unwrap();
    let message: Item = state.get("message").unwrap();
    let reply: Item = state.get("item").unwrap();

    assert_eq!(client.identity, "alice@example.com");
    assert_eq!(client.display_name.as_deref(), Some("Alice"));
    assert_eq!(message.content, direct_reply::GREETING);
    assert_eq!(reply.content, direct_reply::REPLY);
    assert_eq!(reply.parent_item_id.as_deref(), Some(message.item_id.as_str()));
    assert_eq!(Some(reply.creator_id.clone()), service.user_id("bob-bot"));
    assert_eq!(reply.conv_id, conversation.conv_id);

    assert_eq!(service.conversations().len(), 1);
    assert_eq!(service.items_in(&conversation.conv_id).len(), 2);
    // Everyone is logged out once the scenario completes
    assert_eq!(service.active_sessions("alice@example.com"), 0);
    assert_eq!(service.active_sessions("bob-bot"), 0);
}

#[tokio::test]
async fn test_rejected_logon_runs_no_steps() {
    let actors = actors();
    let service = loopback(&actors);
    service.reject_logons("bob-bot");
    let scenario = scenarios::build("direct-reply", &ScenarioConfig::default(), &actors).unwrap();

    let err = scenario
        .run(Arc::new(service.connector()), runner_config(), &actors)
        .await
        .unwrap_err();
    match err.downcast_ref::<HarnessError>() {
        Some(HarnessError::Logon { identity, source }) => {
            assert_eq!(identity, "bob-bot");
            assert_eq!(source, &ServiceError::Auth("bad credential".to_string()));
        }
        other => panic!("expected logon failure, got {:?}", other),
    }
    assert!(service.conversations().is_empty());
}

#[tokio::test]
async fn test_reactions_end_to_end() {
    let actors = actors();
    let service = loopback(&actors);
    let scenario = scenarios::build("reactions", &ScenarioConfig::default(), &actors).unwrap();

    let state = scenario
        .run(Arc::new(service.connector()), runner_config(), &actors)
        .await
        .unwrap();

    let client: SessionInfo = state.get("client").unwrap();
    let conversation: Conversation = state.get("conversation").unwrap();
    let updated: Item = state.get("updated").unwrap();
    assert!(state.get::<bool>("liked").unwrap());
    assert!(state.get::<bool>("flag_verified").unwrap());
    assert!(!state.get::<bool>("flagged").unwrap());
    assert_eq!(updated.content, reactions::EDITED_TEXT);

    let stored = &service.items_in(&conversation.conv_id)[0];
    assert_eq!(stored.content, reactions::EDITED_TEXT);
    assert_eq!(stored.liked_by, vec![service.user_id("bob-bot").unwrap()]);
    assert!(service
        .last_read(&client.user_id, &conversation.conv_id)
        .is_some());
}

#[tokio::test]
async fn test_presence_end_to_end() {
    let actors = actors();
    let service = loopback(&actors);
    let scenario = scenarios::build("presence", &ScenarioConfig::default(), &actors).unwrap();

    let state = scenario
        .run(Arc::new(service.connector()), runner_config(), &actors)
        .await
        .unwrap();

    let conversation: Conversation = state.get("conversation").unwrap();
    assert_eq!(conversation.title.as_deref(), Some("convoy group"));
    assert_eq!(conversation.participants.len(), 2);

    let presence: Vec<Presence> = state.get("presence").unwrap();
    assert_eq!(presence.len(), 1);
    assert_eq!(Some(presence[0].user_id.clone()), service.user_id("bob-bot"));
    assert_eq!(presence[0].state, PresenceState::Busy);
}

#[tokio::test]
async fn test_conversation_scenario_uploads_and_comments() {
    let actors = actors();
    let service = loopback(&actors);
    let files = tempfile::tempdir().unwrap();
    std::fs::write(files.path().join("b.png"), [0x89, b'P', b'N', b'G']).unwrap();
    std::fs::write(files.path().join("a.txt"), "hello").unwrap();

    let config = ScenarioConfig {
        files_path: files.path().to_string_lossy().to_string(),
        ..ScenarioConfig::default()
    };
    let scenario = scenarios::build("conversation", &config, &actors).unwrap();
    let state = scenario
        .run(Arc::new(service.connector()), runner_config(), &actors)
        .await
        .unwrap();

    let conversation: Conversation = state.get("conversation").unwrap();
    let upload: Item = state.get("upload").unwrap();
    let message: Item = state.get("item").unwrap();
    assert_eq!(upload.content, conversation::UPLOAD_TEXT);
    let names: Vec<&str> = upload
        .attachments
        .iter()
        .map(|a| a.file_name.as_str())
        .collect();
    assert_eq!(names, vec!["a.txt", "b.png"]);
    assert_eq!(upload.attachments[1].mime_type, "image/png");
    assert_eq!(message.content, conversation::MESSAGE_TEXT);

    let comments: Vec<Item> = service
        .items_in(&conversation.conv_id)
        .into_iter()
        .filter(|item| item.is_reply())
        .collect();
    assert_eq!(comments.len(), 2);
    for comment in &comments {
        assert_eq!(comment.content, conversation::COMMENT_TEXT);
    }
    let mut parents: Vec<String> = comments
        .iter()
        .filter_map(|c| c.parent_item_id.clone())
        .collect();
    parents.sort();
    let mut expected = vec![upload.item_id.clone(), message.item_id.clone()];
    expected.sort();
    assert_eq!(parents, expected);
}

#[tokio::test]
async fn test_conversation_scenario_uses_configured_conversation() {
    let actors = actors();
    let service = loopback(&actors);

    // A group conversation created out of band, as an operator would
    let session = service
        .connector()
        .logon(&actors[0].credentials, DOMAIN)
        .await
        .unwrap();
    let existing = session
        .create_group_conversation(&[], "operators")
        .await
        .unwrap();
    session.logout().await.unwrap();

    let files = tempfile::tempdir().unwrap();
    let config = ScenarioConfig {
        conversation_id: Some(existing.conv_id.clone()),
        files_path: files.path().to_string_lossy().to_string(),
        ..ScenarioConfig::default()
    };
    let solo = &actors[..1];
    let scenario = scenarios::build("conversation", &config, solo).unwrap();
    let state = scenario
        .run(Arc::new(service.connector()), runner_config(), solo)
        .await
        .unwrap();

    let conversation: Conversation = state.get("conversation").unwrap();
    assert_eq!(conversation.conv_id, existing.conv_id);
    let upload: Item = state.get("upload").unwrap();
    assert!(upload.attachments.is_empty());
    assert_eq!(service.items_in(&existing.conv_id).len(), 4);
}

#[tokio::test]
async fn test_missing_attachment_directory_fails_the_step() {
    let actors = actors();
    let service = loopback(&actors);
    let config = ScenarioConfig {
        files_path: "/nonexistent/convoy-files".to_string(),
        ..ScenarioConfig::default()
    };
    let scenario = scenarios::build("conversation", &config, &actors).unwrap();

    let err = scenario
        .run(Arc::new(service.connector()), runner_config(), &actors)
        .await
        .unwrap_err();
    let harness = err.downcast_ref::<HarnessError>().unwrap();
    assert_eq!(harness.step_name(), Some("upload files"));
    assert!(format!("{:#}", err).contains("/nonexistent/convoy-files"));
}

#[tokio::test]
async fn test_failed_comment_fails_the_conversation_scenario() {
    let actors = actors();
    let service = loopback(&actors);
    service.refuse_replies("alice@example.com");
    let files = tempfile::tempdir().unwrap();
    let config = ScenarioConfig {
        files_path: files.path().to_string_lossy().to_string(),
        ..ScenarioConfig::default()
    };
    let scenario = scenarios::build("conversation", &config, &actors).unwrap();

    // Default runner config: no step timeout to fall back on
    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        scenario.run(Arc::new(service.connector()), RunnerConfig::new(DOMAIN), &actors),
    )
    .await
    .expect("scenario hung after a failed comment");

    let err = outcome.unwrap_err();
    let harness = err.downcast_ref::<HarnessError>().unwrap();
    assert_eq!(harness.step_name(), Some("await comments"));
    assert!(format!("{:#}", err).contains("refused"));
}
