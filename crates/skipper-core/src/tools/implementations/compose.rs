//! Compose stack tools.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::open_db;
use crate::safety::{ensure_org_binding, require_org_member};
use crate::storage::{AppStore, BackupStore, ComposeStack, Database};
use crate::tools::registry::{
    parse_params, RiskLevel, Tool, ToolCategory, ToolContext, ToolResult,
};
use crate::tools::schema::{Field, ParamSchema};

fn load_compose(
    db: &Database,
    ctx: &ToolContext,
    compose_id: &str,
) -> Result<ComposeStack, ToolResult> {
    let compose = match AppStore::new(db).get_compose(compose_id) {
        Ok(Some(compose)) => compose,
        Ok(None) => return Err(ToolResult::not_found("Compose stack not found")),
        Err(e) => return Err(ToolResult::failure("Failed to load compose stack", e.to_string())),
    };
    ensure_org_binding(ctx, &compose.organization_id, json!({}))?;
    Ok(compose)
}

#[derive(Deserialize)]
struct ComposeIdParams {
    compose_id: String,
}

pub struct ComposeListTool;

#[async_trait]
impl Tool for ComposeListTool {
    fn name(&self) -> &'static str {
        "compose_list"
    }
    fn description(&self) -> &str {
        "List all compose stacks in the current organization."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Compose
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> ToolResult {
        let db = match open_db(ctx) {
            Ok(db) => db,
            Err(e) => return e,
        };
        if let Err(denied) = require_org_member(&db, ctx) {
            return denied;
        }
        match AppStore::new(&db).list_compose(&ctx.organization_id) {
            Ok(stacks) => ToolResult::success_data(json!(stacks)),
            Err(e) => ToolResult::failure("Failed to list compose stacks", e.to_string()),
        }
    }
}

pub struct ComposeGetTool;

#[async_trait]
impl Tool for ComposeGetTool {
    fn name(&self) -> &'static str {
        "compose_get"
    }
    fn description(&self) -> &str {
        "Get one compose stack by id."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Compose
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new().field(Field::string("compose_id", "Compose stack id"))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: ComposeIdParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let db = match open_db(ctx) {
            Ok(db) => db,
            Err(e) => return e,
        };
        if let Err(denied) = require_org_member(&db, ctx) {
            return denied;
        }
        match load_compose(&db, ctx, &params.compose_id) {
            Ok(compose) => ToolResult::success_data(json!(compose)),
            Err(denied) => denied,
        }
    }
}

pub struct ComposeDeployTool;

#[async_trait]
impl Tool for ComposeDeployTool {
    fn name(&self) -> &'static str {
        "compose_deploy"
    }
    fn description(&self) -> &str {
        "Trigger a deployment of a compose stack."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Compose
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new().field(Field::string("compose_id", "Compose stack id"))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: ComposeIdParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let db = match open_db(ctx) {
            Ok(db) => db,
            Err(e) => return e,
        };
        if let Err(denied) = require_org_member(&db, ctx) {
            return denied;
        }
        let compose = match load_compose(&db, ctx, &params.compose_id) {
            Ok(compose) => compose,
            Err(denied) => return denied,
        };

        if let Err(e) = BackupStore::new(&db).create_deployment(
            "compose",
            &compose.id,
            &format!("Deploy {}", compose.name),
        ) {
            return ToolResult::failure("Failed to record deployment", e.to_string());
        }
        if let Err(e) = ctx.services.deployer.trigger("compose", &compose.id).await {
            return ToolResult::failure("Failed to trigger deployment", e.to_string());
        }
        let _ = AppStore::new(&db).set_compose_status(&compose.id, "deploying");

        ToolResult::success_with(
            format!("Deployment of '{}' triggered", compose.name),
            json!({"compose_id": compose.id, "status": "deploying"}),
        )
    }
}

pub struct ComposeDeleteTool;

#[async_trait]
impl Tool for ComposeDeleteTool {
    fn name(&self) -> &'static str {
        "compose_delete"
    }
    fn description(&self) -> &str {
        "Delete a compose stack. Irreversible."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Compose
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::High
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("compose_id", "Compose stack id"))
            .field(Field::literal(
                "confirm",
                "CONFIRM_DELETE",
                "Type CONFIRM_DELETE to confirm the deletion",
            ))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: ComposeIdParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let db = match open_db(ctx) {
            Ok(db) => db,
            Err(e) => return e,
        };
        if let Err(denied) = require_org_member(&db, ctx) {
            return denied;
        }
        let compose = match load_compose(&db, ctx, &params.compose_id) {
            Ok(compose) => compose,
            Err(denied) => return denied,
        };
        match AppStore::new(&db).delete_compose(&compose.id) {
            Ok(()) => ToolResult::success(format!("Compose stack '{}' deleted", compose.name)),
            Err(e) => ToolResult::failure("Failed to delete compose stack", e.to_string()),
        }
    }
}
