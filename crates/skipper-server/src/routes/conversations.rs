//! Conversation and LM-binding routes.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use skipper_core::storage::{
    AiBindingMasked, AiBindingStore, ConversationStore, Database, OrgRole, OrgStore,
};

use crate::auth::CurrentPrincipal;
use crate::error::AppError;
use crate::types::{CreateConversationRequest, CreateConversationResponse, MessageResponse};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/conversations", post(create_conversation).get(list_conversations))
        .route("/conversations/:id/messages", get(list_messages))
        .route("/ais", get(list_ais))
}

async fn create_conversation(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Json(req): Json<CreateConversationRequest>,
) -> Result<Json<CreateConversationResponse>, AppError> {
    let db = Database::new(&state.db_path)?;
    super::resolve_binding(&db, &principal, &req.ai_id)?;

    let conversation_id = ConversationStore::new(&db).create(
        &principal.user_id,
        &principal.organization_id,
        &req.ai_id,
        req.project_id.as_deref().or(principal.project_id.as_deref()),
        req.server_id.as_deref().or(principal.server_id.as_deref()),
        "New conversation",
    )?;
    Ok(Json(CreateConversationResponse { conversation_id }))
}

/// Own conversations; an org owner sees the whole organization for audit.
async fn list_conversations(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> Result<Json<Value>, AppError> {
    let db = Database::new(&state.db_path)?;
    let store = ConversationStore::new(&db);

    let is_owner = OrgStore::new(&db)
        .get_member(&principal.user_id, &principal.organization_id)?
        .map(|m| m.role == OrgRole::Owner)
        .unwrap_or(false);

    let conversations = if is_owner {
        store.list_for_org(&principal.organization_id)?
    } else {
        store.list_for_user(&principal.user_id, &principal.organization_id)?
    };
    Ok(Json(json!({"conversations": conversations})))
}

async fn list_messages(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(conversation_id): Path<String>,
) -> Result<Json<Vec<MessageResponse>>, AppError> {
    let db = Database::new(&state.db_path)?;
    let store = ConversationStore::new(&db);
    let conversation = store
        .get(&conversation_id)?
        .ok_or_else(|| AppError::NotFound("Conversation not found".into()))?;

    if conversation.organization_id != principal.organization_id {
        return Err(AppError::NotFound("Conversation not found".into()));
    }
    if conversation.owner_user_id != principal.user_id {
        let is_owner = OrgStore::new(&db)
            .get_member(&principal.user_id, &principal.organization_id)?
            .map(|m| m.role == OrgRole::Owner)
            .unwrap_or(false);
        if !is_owner {
            return Err(AppError::NotFound("Conversation not found".into()));
        }
    }

    let messages = store
        .list_messages(&conversation_id)?
        .into_iter()
        .map(|m| MessageResponse {
            message_id: m.id,
            role: m.role,
            content: m.content,
            tool_calls: m.tool_calls,
            status: m.status,
            created_at: m.created_at,
        })
        .collect();
    Ok(Json(messages))
}

/// Configured LM bindings, masked.
async fn list_ais(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> Result<Json<Vec<AiBindingMasked>>, AppError> {
    let db = Database::new(&state.db_path)?;
    let bindings = AiBindingStore::new(&db).list(&principal.organization_id)?;
    Ok(Json(bindings.iter().map(AiBindingMasked::from).collect()))
}
