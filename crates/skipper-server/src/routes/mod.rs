//! API route modules.

pub mod agent;
pub mod chat;
pub mod conversations;
pub mod executions;

use axum::Router;

use skipper_core::storage::{AiBinding, AiBindingStore, Conversation, ConversationStore, Database};

use crate::auth::Principal;
use crate::error::AppError;
use crate::AppState;

pub fn api_router() -> Router<AppState> {
    Router::new().nest(
        "/ai",
        chat::router()
            .merge(conversations::router())
            .nest("/agent", agent::router()),
    )
}

/// Resolve an LM binding and verify it belongs to the caller's org.
pub(crate) fn resolve_binding(
    db: &Database,
    principal: &Principal,
    ai_id: &str,
) -> Result<AiBinding, AppError> {
    let binding = AiBindingStore::new(db)
        .get(ai_id)?
        .ok_or_else(|| AppError::NotFound(format!("AI binding {} not found", ai_id)))?;
    if binding.organization_id != principal.organization_id {
        return Err(AppError::NotFound(format!("AI binding {} not found", ai_id)));
    }
    if !binding.enabled {
        return Err(AppError::BadRequest(format!("AI binding {} is disabled", ai_id)));
    }
    Ok(binding)
}

/// Load an existing conversation (verifying ownership) or create one.
pub(crate) fn ensure_conversation(
    db: &Database,
    principal: &Principal,
    conversation_id: Option<&str>,
    ai_id: &str,
    title_seed: &str,
) -> Result<Conversation, AppError> {
    let store = ConversationStore::new(db);
    match conversation_id {
        Some(id) => {
            let conversation = store
                .get(id)?
                .ok_or_else(|| AppError::NotFound(format!("Conversation {} not found", id)))?;
            if conversation.owner_user_id != principal.user_id
                || conversation.organization_id != principal.organization_id
            {
                return Err(AppError::NotFound(format!("Conversation {} not found", id)));
            }
            Ok(conversation)
        }
        None => {
            let title = skipper_core::storage::title_from_content(title_seed);
            let id = store.create(
                &principal.user_id,
                &principal.organization_id,
                ai_id,
                principal.project_id.as_deref(),
                principal.server_id.as_deref(),
                &title,
            )?;
            store
                .get(&id)?
                .ok_or_else(|| AppError::Internal("conversation vanished".into()))
        }
    }
}
