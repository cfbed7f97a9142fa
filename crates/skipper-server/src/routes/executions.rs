//! Out-of-band approval mutations for pending tool executions.

use axum::{extract::State, Json};
use serde_json::{json, Value};

use skipper_core::storage::{
    ConversationStore, Database, DecisionOutcome, ExecutionStatus, ExecutionStore, ToolExecution,
};
use skipper_core::tools::ToolResult;

use crate::auth::{CurrentPrincipal, Principal};
use crate::error::AppError;
use crate::types::{ApproveRequest, ExecuteRequest, ExecutionStatusResponse, ExecutionsRequest};
use crate::AppState;

/// Load an execution and verify the caller owns its conversation.
fn load_owned_execution(
    db: &Database,
    principal: &Principal,
    execution_id: &str,
) -> Result<ToolExecution, AppError> {
    let execution = ExecutionStore::new(db)
        .get(execution_id)?
        .ok_or_else(|| AppError::NotFound(format!("Execution {} not found", execution_id)))?;
    let conversation = ConversationStore::new(db)
        .get(&execution.conversation_id)?
        .ok_or_else(|| AppError::NotFound("Conversation not found".into()))?;
    if conversation.organization_id != principal.organization_id
        || conversation.owner_user_id != principal.user_id
    {
        return Err(AppError::NotFound(format!(
            "Execution {} not found",
            execution_id
        )));
    }
    Ok(execution)
}

/// `ai.agent.approve` — record the decision and wake any suspended run.
/// A second decision on the same execution is a no-op reporting the
/// earlier terminal state.
pub async fn approve(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Json(req): Json<ApproveRequest>,
) -> Result<Json<Value>, AppError> {
    let db = Database::new(&state.db_path)?;
    load_owned_execution(&db, &principal, &req.execution_id)?;

    let outcome = ExecutionStore::new(&db).set_decision(&req.execution_id, req.approved)?;
    state.signals.notify(&req.execution_id);

    let (status, already_decided) = match outcome {
        DecisionOutcome::Applied(status) => (status, false),
        DecisionOutcome::AlreadyDecided(status) => (status, true),
    };
    Ok(Json(json!({
        "execution_id": req.execution_id,
        "status": status.as_str(),
        "already_decided": already_decided,
    })))
}

/// `ai.agent.execute` — run an approved execution through the registry.
/// Idempotent: a finished execution returns its cached result without
/// re-triggering anything.
pub async fn execute(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Json(req): Json<ExecuteRequest>,
) -> Result<Json<ToolResult>, AppError> {
    let db = Database::new(&state.db_path)?;
    let execution = load_owned_execution(&db, &principal, &req.execution_id)?;

    match execution.status {
        ExecutionStatus::Completed | ExecutionStatus::Failed => {
            let cached: ToolResult = execution
                .result
                .as_ref()
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .ok_or_else(|| AppError::Internal("execution has no stored result".into()))?;
            return Ok(Json(cached));
        }
        ExecutionStatus::Rejected => {
            return Ok(Json(ToolResult::failure(
                "Execution was rejected by the user",
                "BAD_REQUEST",
            )));
        }
        ExecutionStatus::PendingApproval => {
            return Err(AppError::BadRequest(format!(
                "Execution {} has not been approved",
                req.execution_id
            )));
        }
        ExecutionStatus::Executing => {
            return Err(AppError::Conflict(format!(
                "Execution {} is already running",
                req.execution_id
            )));
        }
        ExecutionStatus::Approved => {}
    }

    let store = ExecutionStore::new(&db);
    if !store.mark_executing(&req.execution_id)? {
        return Err(AppError::Conflict(format!(
            "Execution {} was claimed concurrently",
            req.execution_id
        )));
    }
    drop(db);

    let ctx = principal.tool_context(&state);
    let result = state
        .registry
        .execute(&execution.tool_name, execution.arguments.clone(), &ctx)
        .await;

    let db = Database::new(&state.db_path)?;
    let payload = serde_json::to_value(&result)?;
    ExecutionStore::new(&db).finish(&req.execution_id, result.success, &payload)?;
    ConversationStore::new(&db).append_message(
        &execution.conversation_id,
        "tool",
        Some(&payload.to_string()),
        Some(&json!({"tool_call_id": execution.tool_call_id})),
        "sent",
    )?;
    state.signals.notify(&req.execution_id);

    Ok(Json(result))
}

/// `ai.agent.getExecutions` — hydrate execution statuses for the UI.
pub async fn get_executions(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Json(req): Json<ExecutionsRequest>,
) -> Result<Json<Vec<ExecutionStatusResponse>>, AppError> {
    let db = Database::new(&state.db_path)?;
    let mut out = Vec::with_capacity(req.execution_ids.len());
    for execution_id in &req.execution_ids {
        match load_owned_execution(&db, &principal, execution_id) {
            Ok(execution) => out.push(ExecutionStatusResponse {
                execution_id: execution.id,
                status: execution.status.as_str().to_string(),
                result: execution.result,
            }),
            Err(AppError::NotFound(_)) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(Json(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestWorld;

    /// S5 (second half): approve then execute triggers the deployment
    /// exactly once; a repeat execute returns the cached result.
    #[tokio::test]
    async fn approve_execute_is_exactly_once() {
        let world = TestWorld::new();
        let execution_id = world.create_pending_execution(
            "application_deploy",
            json!({"application_id": world.application_id.clone()}),
        );

        let approved = approve(
            State(world.state.clone()),
            world.principal(),
            Json(ApproveRequest {
                execution_id: execution_id.clone(),
                approved: true,
            }),
        )
        .await
        .unwrap();
        assert_eq!(approved.0["status"], "approved");
        assert_eq!(approved.0["already_decided"], false);

        let first = execute(
            State(world.state.clone()),
            world.principal(),
            Json(ExecuteRequest {
                execution_id: execution_id.clone(),
                conversation_id: None,
            }),
        )
        .await
        .unwrap();
        assert!(first.0.success);
        assert_eq!(world.deployer.trigger_count(), 1);

        // Idempotent repeat: cached result, no second trigger.
        let second = execute(
            State(world.state.clone()),
            world.principal(),
            Json(ExecuteRequest {
                execution_id: execution_id.clone(),
                conversation_id: None,
            }),
        )
        .await
        .unwrap();
        assert!(second.0.success);
        assert_eq!(world.deployer.trigger_count(), 1);
    }

    /// Invariant 4: the second approval is a no-op reporting the first
    /// decision.
    #[tokio::test]
    async fn second_approval_is_noop() {
        let world = TestWorld::new();
        let execution_id = world.create_pending_execution(
            "application_deploy",
            json!({"application_id": world.application_id.clone()}),
        );

        let first = approve(
            State(world.state.clone()),
            world.principal(),
            Json(ApproveRequest {
                execution_id: execution_id.clone(),
                approved: false,
            }),
        )
        .await
        .unwrap();
        assert_eq!(first.0["status"], "rejected");

        let second = approve(
            State(world.state.clone()),
            world.principal(),
            Json(ApproveRequest {
                execution_id: execution_id.clone(),
                approved: true,
            }),
        )
        .await
        .unwrap();
        assert_eq!(second.0["status"], "rejected");
        assert_eq!(second.0["already_decided"], true);
    }

    #[tokio::test]
    async fn unapproved_execution_cannot_run() {
        let world = TestWorld::new();
        let execution_id = world.create_pending_execution(
            "application_deploy",
            json!({"application_id": world.application_id.clone()}),
        );

        let err = execute(
            State(world.state.clone()),
            world.principal(),
            Json(ExecuteRequest {
                execution_id,
                conversation_id: None,
            }),
        )
        .await;
        assert!(matches!(err, Err(AppError::BadRequest(_))));
        assert_eq!(world.deployer.trigger_count(), 0);
    }

    #[tokio::test]
    async fn foreign_principal_cannot_see_executions() {
        let world = TestWorld::new();
        let execution_id = world.create_pending_execution(
            "application_deploy",
            json!({"application_id": world.application_id.clone()}),
        );

        let result = approve(
            State(world.state.clone()),
            world.foreign_principal(),
            Json(ApproveRequest {
                execution_id,
                approved: true,
            }),
        )
        .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn get_executions_filters_to_owned_rows() {
        let world = TestWorld::new();
        let execution_id = world.create_pending_execution(
            "application_deploy",
            json!({"application_id": world.application_id.clone()}),
        );

        let listed = get_executions(
            State(world.state.clone()),
            world.principal(),
            Json(ExecutionsRequest {
                execution_ids: vec![execution_id.clone(), "missing".to_string()],
            }),
        )
        .await
        .unwrap();
        assert_eq!(listed.0.len(), 1);
        assert_eq!(listed.0[0].execution_id, execution_id);
        assert_eq!(listed.0[0].status, "pending_approval");
    }
}
