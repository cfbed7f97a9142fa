//! Deployment record read models.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::open_db;
use crate::safety::{ensure_org_binding, require_org_member};
use crate::storage::{AppStore, BackupStore, DatabaseServiceStore};
use crate::tools::registry::{parse_params, Tool, ToolCategory, ToolContext, ToolResult};
use crate::tools::schema::{Field, ParamSchema};

const TARGET_TYPES: &[&str] = &["application", "compose", "database"];

fn ensure_target(
    db: &crate::storage::Database,
    ctx: &ToolContext,
    target_type: &str,
    target_id: &str,
) -> Result<(), ToolResult> {
    let org = match target_type {
        "database" => match DatabaseServiceStore::new(db).get(target_id) {
            Ok(Some(service)) => Some(service.organization_id),
            Ok(None) => None,
            Err(e) => return Err(ToolResult::failure("Failed to resolve target", e.to_string())),
        },
        _ => match AppStore::new(db).service_org(target_type, target_id) {
            Ok(org) => org,
            Err(e) => return Err(ToolResult::failure("Failed to resolve target", e.to_string())),
        },
    };
    match org {
        Some(org) => ensure_org_binding(ctx, &org, json!({})),
        None => Err(ToolResult::not_found("Target not found")),
    }
}

pub struct DeploymentListTool;

#[derive(Deserialize)]
struct DeploymentListParams {
    target_type: String,
    target_id: String,
}

#[async_trait]
impl Tool for DeploymentListTool {
    fn name(&self) -> &'static str {
        "deployment_list"
    }
    fn description(&self) -> &str {
        "List deployment records of a service or database, newest first."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Deployment
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::enumeration("target_type", TARGET_TYPES, "Target kind"))
            .field(Field::string("target_id", "Target id"))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: DeploymentListParams = match parse_params(params) {
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
        if let Err(denied) = ensure_target(&db, ctx, &params.target_type, &params.target_id) {
            return denied;
        }
        match BackupStore::new(&db).list_deployments(&params.target_type, &params.target_id) {
            Ok(deployments) => ToolResult::success_data(json!(deployments)),
            Err(e) => ToolResult::failure("Failed to list deployments", e.to_string()),
        }
    }
}

pub struct DeploymentGetTool;

#[derive(Deserialize)]
struct DeploymentIdParams {
    deployment_id: String,
}

#[async_trait]
impl Tool for DeploymentGetTool {
    fn name(&self) -> &'static str {
        "deployment_get"
    }
    fn description(&self) -> &str {
        "Get one deployment record with its log."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Deployment
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new().field(Field::string("deployment_id", "Deployment id"))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: DeploymentIdParams = match parse_params(params) {
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

        let deployment = match BackupStore::new(&db).get_deployment(&params.deployment_id) {
            Ok(Some(deployment)) => deployment,
            Ok(None) => return ToolResult::not_found("Deployment not found"),
            Err(e) => return ToolResult::failure("Failed to load deployment", e.to_string()),
        };
        if let Err(denied) = ensure_target(
            &db,
            ctx,
            &deployment.target_type,
            &deployment.target_id,
        ) {
            return denied;
        }
        ToolResult::success_data(json!(deployment))
    }
}
