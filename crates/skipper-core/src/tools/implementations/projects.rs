//! Project and environment tools.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::open_db;
use crate::safety::{ensure_org_binding, require_org_member};
use crate::storage::ProjectStore;
use crate::tools::registry::{
    parse_params, RiskLevel, Tool, ToolCategory, ToolContext, ToolResult,
};
use crate::tools::schema::{Field, ParamSchema};

pub struct ProjectListTool;

#[async_trait]
impl Tool for ProjectListTool {
    fn name(&self) -> &'static str {
        "project_list"
    }
    fn description(&self) -> &str {
        "List all projects in the current organization."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Project
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
        match ProjectStore::new(&db).list(&ctx.organization_id) {
            Ok(projects) => ToolResult::success_data(json!(projects)),
            Err(e) => ToolResult::failure("Failed to list projects", e.to_string()),
        }
    }
}

pub struct ProjectGetTool;

#[derive(Deserialize)]
struct ProjectIdParams {
    project_id: String,
}

#[async_trait]
impl Tool for ProjectGetTool {
    fn name(&self) -> &'static str {
        "project_get"
    }
    fn description(&self) -> &str {
        "Get one project by id, including its environments."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Project
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new().field(Field::string("project_id", "Project id"))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: ProjectIdParams = match parse_params(params) {
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

        let store = ProjectStore::new(&db);
        let project = match store.get(&params.project_id) {
            Ok(Some(project)) => project,
            Ok(None) => return ToolResult::not_found("Project not found"),
            Err(e) => return ToolResult::failure("Failed to load project", e.to_string()),
        };
        if let Err(denied) = ensure_org_binding(ctx, &project.organization_id, json!({})) {
            return denied;
        }

        let environments = store.list_environments(&project.id).unwrap_or_default();
        ToolResult::success_data(json!({
            "project": project,
            "environments": environments,
        }))
    }
}

pub struct ProjectCreateTool;

#[derive(Deserialize)]
struct ProjectCreateParams {
    name: String,
    description: Option<String>,
}

#[async_trait]
impl Tool for ProjectCreateTool {
    fn name(&self) -> &'static str {
        "project_create"
    }
    fn description(&self) -> &str {
        "Create a project with a default production environment."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Project
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("name", "Project name"))
            .field(Field::string("description", "Optional project description").optional())
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: ProjectCreateParams = match parse_params(params) {
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

        let store = ProjectStore::new(&db);
        let project_id = match store.create(
            &ctx.organization_id,
            &params.name,
            params.description.as_deref(),
        ) {
            Ok(id) => id,
            Err(e) => return ToolResult::failure("Failed to create project", e.to_string()),
        };
        let environment_id = match store.create_environment(&project_id, "production") {
            Ok(id) => id,
            Err(e) => return ToolResult::failure("Failed to create environment", e.to_string()),
        };

        ToolResult::success_with(
            format!("Project '{}' created", params.name),
            json!({"project_id": project_id, "environment_id": environment_id}),
        )
    }
}

pub struct ProjectUpdateTool;

#[derive(Deserialize)]
struct ProjectUpdateParams {
    project_id: String,
    name: Option<String>,
    description: Option<String>,
}

#[async_trait]
impl Tool for ProjectUpdateTool {
    fn name(&self) -> &'static str {
        "project_update"
    }
    fn description(&self) -> &str {
        "Rename a project or change its description."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Project
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("project_id", "Project id"))
            .field(Field::string("name", "New project name").optional())
            .field(Field::string("description", "New description").optional())
            .at_least_one_of(&["name", "description"])
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: ProjectUpdateParams = match parse_params(params) {
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

        let store = ProjectStore::new(&db);
        let project = match store.get(&params.project_id) {
            Ok(Some(project)) => project,
            Ok(None) => return ToolResult::not_found("Project not found"),
            Err(e) => return ToolResult::failure("Failed to load project", e.to_string()),
        };
        if let Err(denied) = ensure_org_binding(ctx, &project.organization_id, json!({})) {
            return denied;
        }

        match store.update(
            &project.id,
            params.name.as_deref(),
            params.description.as_deref(),
        ) {
            Ok(()) => ToolResult::success("Project updated"),
            Err(e) => ToolResult::failure("Failed to update project", e.to_string()),
        }
    }
}

pub struct ProjectDeleteTool;

#[derive(Deserialize)]
struct ProjectDeleteParams {
    project_id: String,
}

#[async_trait]
impl Tool for ProjectDeleteTool {
    fn name(&self) -> &'static str {
        "project_delete"
    }
    fn description(&self) -> &str {
        "Delete a project and everything in it. Irreversible."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Project
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::High
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("project_id", "Project id"))
            .field(Field::literal(
                "confirm",
                "CONFIRM_DELETE",
                "Type CONFIRM_DELETE to confirm the deletion",
            ))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: ProjectDeleteParams = match parse_params(params) {
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

        let store = ProjectStore::new(&db);
        let project = match store.get(&params.project_id) {
            Ok(Some(project)) => project,
            Ok(None) => return ToolResult::not_found("Project not found"),
            Err(e) => return ToolResult::failure("Failed to load project", e.to_string()),
        };
        if let Err(denied) = ensure_org_binding(ctx, &project.organization_id, json!({})) {
            return denied;
        }

        match store.delete(&project.id) {
            Ok(()) => ToolResult::success(format!("Project '{}' deleted", project.name)),
            Err(e) => ToolResult::failure("Failed to delete project", e.to_string()),
        }
    }
}

pub struct EnvironmentListTool;

#[async_trait]
impl Tool for EnvironmentListTool {
    fn name(&self) -> &'static str {
        "environment_list"
    }
    fn description(&self) -> &str {
        "List environments of a project."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Environment
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new().field(Field::string("project_id", "Project id"))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: ProjectIdParams = match parse_params(params) {
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

        let store = ProjectStore::new(&db);
        let project = match store.get(&params.project_id) {
            Ok(Some(project)) => project,
            Ok(None) => return ToolResult::not_found("Project not found"),
            Err(e) => return ToolResult::failure("Failed to load project", e.to_string()),
        };
        if let Err(denied) = ensure_org_binding(ctx, &project.organization_id, json!({})) {
            return denied;
        }

        match store.list_environments(&project.id) {
            Ok(environments) => ToolResult::success_data(json!(environments)),
            Err(e) => ToolResult::failure("Failed to list environments", e.to_string()),
        }
    }
}

pub struct EnvironmentCreateTool;

#[derive(Deserialize)]
struct EnvironmentCreateParams {
    project_id: String,
    name: String,
}

#[async_trait]
impl Tool for EnvironmentCreateTool {
    fn name(&self) -> &'static str {
        "environment_create"
    }
    fn description(&self) -> &str {
        "Create an environment inside a project."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Environment
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("project_id", "Project id"))
            .field(Field::string("name", "Environment name, e.g. staging"))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: EnvironmentCreateParams = match parse_params(params) {
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

        let store = ProjectStore::new(&db);
        let project = match store.get(&params.project_id) {
            Ok(Some(project)) => project,
            Ok(None) => return ToolResult::not_found("Project not found"),
            Err(e) => return ToolResult::failure("Failed to load project", e.to_string()),
        };
        if let Err(denied) = ensure_org_binding(ctx, &project.organization_id, json!({})) {
            return denied;
        }

        match store.create_environment(&project.id, &params.name) {
            Ok(environment_id) => ToolResult::success_with(
                format!("Environment '{}' created", params.name),
                json!({"environment_id": environment_id}),
            ),
            Err(e) => ToolResult::failure("Failed to create environment", e.to_string()),
        }
    }
}

pub struct EnvironmentDeleteTool;

#[derive(Deserialize)]
struct EnvironmentDeleteParams {
    environment_id: String,
}

#[async_trait]
impl Tool for EnvironmentDeleteTool {
    fn name(&self) -> &'static str {
        "environment_delete"
    }
    fn description(&self) -> &str {
        "Delete an environment and its services. Irreversible."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Environment
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::High
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("environment_id", "Environment id"))
            .field(Field::literal(
                "confirm",
                "CONFIRM_DELETE",
                "Type CONFIRM_DELETE to confirm the deletion",
            ))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: EnvironmentDeleteParams = match parse_params(params) {
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

        let store = ProjectStore::new(&db);
        let environment = match store.get_environment(&params.environment_id) {
            Ok(Some(environment)) => environment,
            Ok(None) => return ToolResult::not_found("Environment not found"),
            Err(e) => return ToolResult::failure("Failed to load environment", e.to_string()),
        };
        if let Err(denied) = ensure_org_binding(ctx, &environment.organization_id, json!({})) {
            return denied;
        }

        match store.delete_environment(&environment.id) {
            Ok(()) => ToolResult::success(format!("Environment '{}' deleted", environment.name)),
            Err(e) => ToolResult::failure("Failed to delete environment", e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::implementations::tests::{seed_context, SeedOptions};

    #[tokio::test]
    async fn project_lifecycle_roundtrip() {
        let seed = seed_context(SeedOptions::default());
        let ctx = &seed.ctx;

        let created = ProjectCreateTool
            .execute(json!({"name": "web"}), ctx)
            .await;
        assert!(created.success);
        let project_id = created.data.unwrap()["project_id"].as_str().unwrap().to_string();

        let listed = ProjectListTool.execute(json!({}), ctx).await;
        assert!(listed.success);
        // seed project + the one just created
        assert_eq!(listed.data.unwrap().as_array().unwrap().len(), 2);

        let deleted = ProjectDeleteTool
            .execute(
                json!({"project_id": project_id, "confirm": "CONFIRM_DELETE"}),
                ctx,
            )
            .await;
        assert!(deleted.success);
    }

    #[tokio::test]
    async fn cross_org_project_access_is_denied() {
        let seed = seed_context(SeedOptions::default());
        let foreign = seed.foreign_ctx();

        let result = ProjectGetTool
            .execute(json!({"project_id": seed.project_id}), &foreign)
            .await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("UNAUTHORIZED"));
    }
}
