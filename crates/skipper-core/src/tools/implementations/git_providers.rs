//! Git provider tools.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::open_db;
use crate::safety::{ensure_org_binding, require_org_member};
use crate::storage::{GitProviderMasked, IntegrationStore};
use crate::tools::registry::{
    parse_params, RiskLevel, Tool, ToolCategory, ToolContext, ToolResult,
};
use crate::tools::schema::{Field, ParamSchema};

pub struct GitProviderListTool;

#[async_trait]
impl Tool for GitProviderListTool {
    fn name(&self) -> &'static str {
        "git_provider_list"
    }
    fn description(&self) -> &str {
        "List connected git providers. Access tokens are masked."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Github
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
        match IntegrationStore::new(&db).list_git_providers(&ctx.organization_id) {
            Ok(providers) => {
                let masked: Vec<GitProviderMasked> =
                    providers.iter().map(GitProviderMasked::from).collect();
                ToolResult::success_data(json!(masked))
            }
            Err(e) => ToolResult::failure("Failed to list git providers", e.to_string()),
        }
    }
}

pub struct GitProviderCreateTool;

#[derive(Deserialize)]
struct GitProviderCreateParams {
    kind: String,
    name: String,
    access_token: String,
}

#[async_trait]
impl Tool for GitProviderCreateTool {
    fn name(&self) -> &'static str {
        "git_provider_create"
    }
    fn description(&self) -> &str {
        "Connect a git provider with a personal access token."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Github
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::enumeration(
                "kind",
                &["github", "gitlab", "bitbucket", "gitea"],
                "Provider kind",
            ))
            .field(Field::string("name", "Connection display name"))
            .field(Field::string("access_token", "Personal access token"))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: GitProviderCreateParams = match parse_params(params) {
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
        match IntegrationStore::new(&db).create_git_provider(
            &ctx.organization_id,
            &params.kind,
            &params.name,
            &params.access_token,
        ) {
            Ok(provider_id) => ToolResult::success_with(
                format!("Git provider '{}' connected", params.name),
                json!({"git_provider_id": provider_id}),
            ),
            Err(e) => ToolResult::failure("Failed to create git provider", e.to_string()),
        }
    }
}

pub struct GitProviderDeleteTool;

#[derive(Deserialize)]
struct GitProviderIdParams {
    git_provider_id: String,
}

#[async_trait]
impl Tool for GitProviderDeleteTool {
    fn name(&self) -> &'static str {
        "git_provider_delete"
    }
    fn description(&self) -> &str {
        "Disconnect a git provider and discard its token."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Github
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::High
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("git_provider_id", "Git provider id"))
            .field(Field::literal(
                "confirm",
                "CONFIRM_DELETE",
                "Type CONFIRM_DELETE to confirm the deletion",
            ))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: GitProviderIdParams = match parse_params(params) {
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

        let store = IntegrationStore::new(&db);
        let provider = match store.get_git_provider(&params.git_provider_id) {
            Ok(Some(provider)) => provider,
            Ok(None) => return ToolResult::not_found("Git provider not found"),
            Err(e) => return ToolResult::failure("Failed to load git provider", e.to_string()),
        };
        if let Err(denied) = ensure_org_binding(ctx, &provider.organization_id, json!({})) {
            return denied;
        }

        match store.delete_git_provider(&provider.id) {
            Ok(()) => ToolResult::success(format!("Git provider '{}' removed", provider.name)),
            Err(e) => ToolResult::failure("Failed to delete git provider", e.to_string()),
        }
    }
}
