// ABOUTME: Conversation lookup helpers shared by scenario steps
// ABOUTME: Direct conversations are fetched first and created only when the service has none

use crate::error::ServiceError;
use crate::traits::{Conversation, RemoteSession};

/// Direct conversation between the session user and `peer`; created when
/// the service reports none. Every other lookup failure is returned as is.
pub async fn get_or_create_direct_conversation(
    session: &dyn RemoteSession,
    peer: &str,
) -> Result<Conversation, ServiceError> {
    match session.get_direct_conversation(peer).await {
        Ok(conversation) => {
            tracing::debug!(
                user_id = %session.user_id(),
                conv_id = %conversation.conv_id,
                "Using existing direct conversation"
            );
            Ok(conversation)
        }
        Err(e) if e.is_not_found() => {
            tracing::info!(
                user_id = %session.user_id(),
                peer,
                "No direct conversation yet, creating one"
            );
            session.create_direct_conversation(peer).await
        }
        Err(e) => Err(e),
    }
}

/// Existing conversation by id
pub async fn get_conversation(
    session: &dyn RemoteSession,
    conv_id: &str,
) -> Result<Conversation, ServiceError> {
    session.get_conversation(conv_id).await
}
