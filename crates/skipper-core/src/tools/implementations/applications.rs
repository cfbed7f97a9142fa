//! Application tools.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::open_db;
use crate::safety::{ensure_org_binding, require_org_member};
use crate::storage::{masked_application_payload, AppStore, Application, BackupStore, Database};
use crate::tools::registry::{
    parse_params, RiskLevel, Tool, ToolCategory, ToolContext, ToolResult,
};
use crate::tools::schema::{Field, ParamSchema};

/// Load an application and enforce its org binding.
pub(super) fn load_application(
    db: &Database,
    ctx: &ToolContext,
    application_id: &str,
) -> Result<Application, ToolResult> {
    let application = match AppStore::new(db).get_application(application_id) {
        Ok(Some(application)) => application,
        Ok(None) => return Err(ToolResult::not_found("Application not found")),
        Err(e) => return Err(ToolResult::failure("Failed to load application", e.to_string())),
    };
    ensure_org_binding(ctx, &application.organization_id, masked_application_payload())?;
    Ok(application)
}

#[derive(Deserialize)]
struct ApplicationIdParams {
    application_id: String,
}

pub struct ApplicationListTool;

#[async_trait]
impl Tool for ApplicationListTool {
    fn name(&self) -> &'static str {
        "application_list"
    }
    fn description(&self) -> &str {
        "List all applications in the current organization."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Application
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
        match AppStore::new(&db).list_applications(&ctx.organization_id) {
            Ok(applications) => ToolResult::success_data(json!(applications)),
            Err(e) => ToolResult::failure("Failed to list applications", e.to_string()),
        }
    }
}

pub struct ApplicationGetTool;

#[async_trait]
impl Tool for ApplicationGetTool {
    fn name(&self) -> &'static str {
        "application_get"
    }
    fn description(&self) -> &str {
        "Get one application by id."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Application
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new().field(Field::string("application_id", "Application id"))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: ApplicationIdParams = match parse_params(params) {
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
        match load_application(&db, ctx, &params.application_id) {
            Ok(application) => ToolResult::success_data(json!(application)),
            Err(denied) => denied,
        }
    }
}

pub struct ApplicationCreateTool;

#[derive(Deserialize)]
struct ApplicationCreateParams {
    environment_id: String,
    name: String,
}

#[async_trait]
impl Tool for ApplicationCreateTool {
    fn name(&self) -> &'static str {
        "application_create"
    }
    fn description(&self) -> &str {
        "Create an application inside an environment."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Application
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("environment_id", "Environment id"))
            .field(Field::string("name", "Application name"))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: ApplicationCreateParams = match parse_params(params) {
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

        let environment = match crate::storage::ProjectStore::new(&db)
            .get_environment(&params.environment_id)
        {
            Ok(Some(environment)) => environment,
            Ok(None) => return ToolResult::not_found("Environment not found"),
            Err(e) => return ToolResult::failure("Failed to load environment", e.to_string()),
        };
        if let Err(denied) = ensure_org_binding(ctx, &environment.organization_id, json!({})) {
            return denied;
        }

        match AppStore::new(&db).create_application(&environment.id, &params.name) {
            Ok(application_id) => ToolResult::success_with(
                format!("Application '{}' created", params.name),
                json!({"application_id": application_id}),
            ),
            Err(e) => ToolResult::failure("Failed to create application", e.to_string()),
        }
    }
}

pub struct ApplicationUpdateTool;

#[derive(Deserialize)]
struct ApplicationUpdateParams {
    application_id: String,
    name: String,
}

#[async_trait]
impl Tool for ApplicationUpdateTool {
    fn name(&self) -> &'static str {
        "application_update"
    }
    fn description(&self) -> &str {
        "Rename an application."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Application
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("application_id", "Application id"))
            .field(Field::string("name", "New application name"))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: ApplicationUpdateParams = match parse_params(params) {
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
        let application = match load_application(&db, ctx, &params.application_id) {
            Ok(application) => application,
            Err(denied) => return denied,
        };
        match AppStore::new(&db).update_application_name(&application.id, &params.name) {
            Ok(()) => ToolResult::success("Application updated"),
            Err(e) => ToolResult::failure("Failed to update application", e.to_string()),
        }
    }
}

pub struct ApplicationDeployTool;

#[async_trait]
impl Tool for ApplicationDeployTool {
    fn name(&self) -> &'static str {
        "application_deploy"
    }
    fn description(&self) -> &str {
        "Trigger a deployment of an application."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Application
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new().field(Field::string("application_id", "Application id"))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: ApplicationIdParams = match parse_params(params) {
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
        let application = match load_application(&db, ctx, &params.application_id) {
            Ok(application) => application,
            Err(denied) => return denied,
        };

        if let Err(e) = BackupStore::new(&db).create_deployment(
            "application",
            &application.id,
            &format!("Deploy {}", application.name),
        ) {
            return ToolResult::failure("Failed to record deployment", e.to_string());
        }
        if let Err(e) = ctx
            .services
            .deployer
            .trigger("application", &application.id)
            .await
        {
            return ToolResult::failure("Failed to trigger deployment", e.to_string());
        }
        let _ = AppStore::new(&db).set_application_status(&application.id, "deploying");

        ToolResult::success_with(
            format!("Deployment of '{}' triggered", application.name),
            json!({"application_id": application.id, "status": "deploying"}),
        )
    }
}

pub struct ApplicationStartTool;

#[async_trait]
impl Tool for ApplicationStartTool {
    fn name(&self) -> &'static str {
        "application_start"
    }
    fn description(&self) -> &str {
        "Start a stopped application."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Application
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new().field(Field::string("application_id", "Application id"))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        set_status(self_params(params), ctx, "running", "started").await
    }
}

pub struct ApplicationStopTool;

#[async_trait]
impl Tool for ApplicationStopTool {
    fn name(&self) -> &'static str {
        "application_stop"
    }
    fn description(&self) -> &str {
        "Stop a running application."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Application
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new().field(Field::string("application_id", "Application id"))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        set_status(self_params(params), ctx, "stopped", "stopped").await
    }
}

pub struct ApplicationRestartTool;

#[derive(Deserialize)]
struct ApplicationRestartParams {
    application_id: String,
}

#[async_trait]
impl Tool for ApplicationRestartTool {
    fn name(&self) -> &'static str {
        "application_restart"
    }
    fn description(&self) -> &str {
        "Restart an application's container."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Application
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("application_id", "Application id"))
            .field(Field::literal(
                "confirm",
                "RESTART_CONTAINER",
                "Type RESTART_CONTAINER to confirm the restart",
            ))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: ApplicationRestartParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        set_status(Ok(params.application_id), ctx, "running", "restarted").await
    }
}

pub struct ApplicationDeleteTool;

#[async_trait]
impl Tool for ApplicationDeleteTool {
    fn name(&self) -> &'static str {
        "application_delete"
    }
    fn description(&self) -> &str {
        "Delete an application. Irreversible."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Application
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::High
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("application_id", "Application id"))
            .field(Field::literal(
                "confirm",
                "CONFIRM_DELETE",
                "Type CONFIRM_DELETE to confirm the deletion",
            ))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: ApplicationIdParams = match parse_params(params) {
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
        let application = match load_application(&db, ctx, &params.application_id) {
            Ok(application) => application,
            Err(denied) => return denied,
        };
        match AppStore::new(&db).delete_application(&application.id) {
            Ok(()) => ToolResult::success(format!("Application '{}' deleted", application.name)),
            Err(e) => ToolResult::failure("Failed to delete application", e.to_string()),
        }
    }
}

fn self_params(params: Value) -> Result<String, ToolResult> {
    parse_params::<ApplicationIdParams>(params).map(|p| p.application_id)
}

async fn set_status(
    application_id: Result<String, ToolResult>,
    ctx: &ToolContext,
    status: &str,
    verb: &str,
) -> ToolResult {
    let application_id = match application_id {
        Ok(id) => id,
        Err(e) => return e,
    };
    let db = match open_db(ctx) {
        Ok(db) => db,
        Err(e) => return e,
    };
    if let Err(denied) = require_org_member(&db, ctx) {
        return denied;
    }
    let application = match load_application(&db, ctx, &application_id) {
        Ok(application) => application,
        Err(denied) => return denied,
    };
    match AppStore::new(&db).set_application_status(&application.id, status) {
        Ok(()) => ToolResult::success_with(
            format!("Application '{}' {}", application.name, verb),
            json!({"application_id": application.id, "status": status}),
        ),
        Err(e) => ToolResult::failure("Failed to change application state", e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::implementations::tests::{seed_context, SeedOptions};

    #[tokio::test]
    async fn deploy_records_deployment_and_triggers_once() {
        let seed = seed_context(SeedOptions::default());
        let result = ApplicationDeployTool
            .execute(json!({"application_id": seed.application_id}), &seed.ctx)
            .await;
        assert!(result.success);
        assert_eq!(result.data.unwrap()["status"], "deploying");
        assert_eq!(seed.deployer.trigger_count(), 1);

        let db = seed.db();
        let deployments = BackupStore::new(&db)
            .list_deployments("application", &seed.application_id)
            .unwrap();
        assert_eq!(deployments.len(), 1);
    }

    #[tokio::test]
    async fn restart_requires_exact_confirm_literal() {
        let seed = seed_context(SeedOptions::default());
        let schema = ApplicationRestartTool.schema();
        let err = schema
            .validate(&json!({"application_id": seed.application_id, "confirm": "yes"}))
            .unwrap_err();
        assert!(err.contains("RESTART_CONTAINER"));
    }

    #[tokio::test]
    async fn cross_org_deploy_is_denied_with_masked_payload() {
        let seed = seed_context(SeedOptions::default());
        let foreign = seed.foreign_ctx();
        let result = ApplicationDeployTool
            .execute(json!({"application_id": seed.application_id}), &foreign)
            .await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("UNAUTHORIZED"));
        assert!(result.data.unwrap()["name"].is_null());
        assert_eq!(seed.deployer.trigger_count(), 0);
    }
}
