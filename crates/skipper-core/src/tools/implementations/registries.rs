//! Container registry tools.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::open_db;
use crate::safety::{ensure_org_binding, require_org_member};
use crate::storage::{IntegrationStore, RegistryMasked};
use crate::tools::registry::{
    parse_params, RiskLevel, Tool, ToolCategory, ToolContext, ToolResult,
};
use crate::tools::schema::{Field, ParamSchema};

pub struct RegistryListTool;

#[async_trait]
impl Tool for RegistryListTool {
    fn name(&self) -> &'static str {
        "registry_list"
    }
    fn description(&self) -> &str {
        "List container registries of the organization. Passwords are masked."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Settings
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
        match IntegrationStore::new(&db).list_registries(&ctx.organization_id) {
            Ok(registries) => {
                let masked: Vec<RegistryMasked> =
                    registries.iter().map(RegistryMasked::from).collect();
                ToolResult::success_data(json!(masked))
            }
            Err(e) => ToolResult::failure("Failed to list registries", e.to_string()),
        }
    }
}

pub struct RegistryCreateTool;

#[derive(Deserialize)]
struct RegistryCreateParams {
    name: String,
    url: String,
    username: String,
    password: String,
}

#[async_trait]
impl Tool for RegistryCreateTool {
    fn name(&self) -> &'static str {
        "registry_create"
    }
    fn description(&self) -> &str {
        "Register a container registry for image pulls."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Settings
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("name", "Registry display name"))
            .field(Field::string("url", "Registry URL"))
            .field(Field::string("username", "Login username"))
            .field(Field::string("password", "Login password or token"))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: RegistryCreateParams = match parse_params(params) {
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
        match IntegrationStore::new(&db).create_registry(
            &ctx.organization_id,
            &params.name,
            &params.url,
            &params.username,
            &params.password,
        ) {
            Ok(registry_id) => ToolResult::success_with(
                format!("Registry '{}' created", params.name),
                json!({"registry_id": registry_id}),
            ),
            Err(e) => ToolResult::failure("Failed to create registry", e.to_string()),
        }
    }
}

pub struct RegistryUpdateTool;

#[derive(Deserialize)]
struct RegistryUpdateParams {
    registry_id: String,
    name: Option<String>,
    password: Option<String>,
}

#[async_trait]
impl Tool for RegistryUpdateTool {
    fn name(&self) -> &'static str {
        "registry_update"
    }
    fn description(&self) -> &str {
        "Rename a registry or replace its password."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Settings
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("registry_id", "Registry id"))
            .field(Field::string("name", "New display name").optional())
            .field(Field::string("password", "New password or token").optional())
            .at_least_one_of(&["name", "password"])
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: RegistryUpdateParams = match parse_params(params) {
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
        let registry = match store.get_registry(&params.registry_id) {
            Ok(Some(registry)) => registry,
            Ok(None) => return ToolResult::not_found("Registry not found"),
            Err(e) => return ToolResult::failure("Failed to load registry", e.to_string()),
        };
        if let Err(denied) = ensure_org_binding(ctx, &registry.organization_id, json!({})) {
            return denied;
        }

        match store.update_registry(
            &registry.id,
            params.name.as_deref(),
            params.password.as_deref(),
        ) {
            Ok(()) => ToolResult::success("Registry updated"),
            Err(e) => ToolResult::failure("Failed to update registry", e.to_string()),
        }
    }
}

pub struct RegistryDeleteTool;

#[derive(Deserialize)]
struct RegistryIdParams {
    registry_id: String,
}

#[async_trait]
impl Tool for RegistryDeleteTool {
    fn name(&self) -> &'static str {
        "registry_delete"
    }
    fn description(&self) -> &str {
        "Remove a container registry."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Settings
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::High
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("registry_id", "Registry id"))
            .field(Field::literal(
                "confirm",
                "CONFIRM_DELETE",
                "Type CONFIRM_DELETE to confirm the deletion",
            ))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: RegistryIdParams = match parse_params(params) {
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
        let registry = match store.get_registry(&params.registry_id) {
            Ok(Some(registry)) => registry,
            Ok(None) => return ToolResult::not_found("Registry not found"),
            Err(e) => return ToolResult::failure("Failed to load registry", e.to_string()),
        };
        if let Err(denied) = ensure_org_binding(ctx, &registry.organization_id, json!({})) {
            return denied;
        }

        match store.delete_registry(&registry.id) {
            Ok(()) => ToolResult::success(format!("Registry '{}' deleted", registry.name)),
            Err(e) => ToolResult::failure("Failed to delete registry", e.to_string()),
        }
    }
}
