//! S3 destination tools. Credentials are masked in every response.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::open_db;
use crate::safety::{ensure_org_binding, require_org_member};
use crate::storage::{Database, Destination, DestinationMasked, IntegrationStore};
use crate::tools::registry::{
    parse_params, RiskLevel, Tool, ToolCategory, ToolContext, ToolResult,
};
use crate::tools::schema::{Field, ParamSchema};

const CONFIRM: &str = "CONFIRM_DESTINATION_CHANGE";

fn masked_shape() -> Value {
    json!({
        "id": null,
        "name": null,
        "endpoint": null,
        "access_key_id_masked": true,
        "access_key_id_present": false,
        "secret_access_key_masked": true,
        "secret_access_key_present": false,
    })
}

fn load_destination(
    db: &Database,
    ctx: &ToolContext,
    destination_id: &str,
) -> Result<Destination, ToolResult> {
    let destination = match IntegrationStore::new(db).get_destination(destination_id) {
        Ok(Some(destination)) => destination,
        Ok(None) => return Err(ToolResult::not_found("Destination not found")),
        Err(e) => return Err(ToolResult::failure("Failed to load destination", e.to_string())),
    };
    ensure_org_binding(ctx, &destination.organization_id, masked_shape())?;
    Ok(destination)
}

pub struct DestinationListTool;

#[async_trait]
impl Tool for DestinationListTool {
    fn name(&self) -> &'static str {
        "destination_list"
    }
    fn description(&self) -> &str {
        "List S3 backup destinations of the organization. Credentials are masked."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Backup
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
        match IntegrationStore::new(&db).list_destinations(&ctx.organization_id) {
            Ok(destinations) => {
                let masked: Vec<DestinationMasked> =
                    destinations.iter().map(DestinationMasked::from).collect();
                ToolResult::success_data(json!(masked))
            }
            Err(e) => ToolResult::failure("Failed to list destinations", e.to_string()),
        }
    }
}

pub struct DestinationCreateTool;

#[derive(Deserialize)]
struct DestinationCreateParams {
    name: String,
    endpoint: String,
    region: String,
    bucket: String,
    access_key_id: String,
    secret_access_key: String,
}

#[async_trait]
impl Tool for DestinationCreateTool {
    fn name(&self) -> &'static str {
        "destination_create"
    }
    fn description(&self) -> &str {
        "Register an S3-compatible backup destination."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Backup
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::High
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("name", "Destination display name"))
            .field(Field::string("endpoint", "S3 endpoint URL"))
            .field(Field::string("region", "Bucket region"))
            .field(Field::string("bucket", "Bucket name"))
            .field(Field::string("access_key_id", "Access key id"))
            .field(Field::string("secret_access_key", "Secret access key"))
            .field(Field::literal(
                "confirm",
                CONFIRM,
                "Type CONFIRM_DESTINATION_CHANGE to confirm",
            ))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: DestinationCreateParams = match parse_params(params) {
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
        match IntegrationStore::new(&db).create_destination(
            &ctx.organization_id,
            &params.name,
            &params.endpoint,
            &params.region,
            &params.bucket,
            &params.access_key_id,
            &params.secret_access_key,
        ) {
            Ok(destination_id) => ToolResult::success_with(
                format!("Destination '{}' created", params.name),
                json!({"destination_id": destination_id}),
            ),
            Err(e) => ToolResult::failure("Failed to create destination", e.to_string()),
        }
    }
}

pub struct DestinationUpdateTool;

#[derive(Deserialize)]
struct DestinationUpdateParams {
    destination_id: String,
    name: Option<String>,
    endpoint: Option<String>,
}

#[async_trait]
impl Tool for DestinationUpdateTool {
    fn name(&self) -> &'static str {
        "destination_update"
    }
    fn description(&self) -> &str {
        "Rename a destination or change its endpoint."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Backup
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::High
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("destination_id", "Destination id"))
            .field(Field::string("name", "New display name").optional())
            .field(Field::string("endpoint", "New endpoint URL").optional())
            .field(Field::literal(
                "confirm",
                CONFIRM,
                "Type CONFIRM_DESTINATION_CHANGE to confirm",
            ))
            .at_least_one_of(&["name", "endpoint"])
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: DestinationUpdateParams = match parse_params(params) {
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
        let destination = match load_destination(&db, ctx, &params.destination_id) {
            Ok(destination) => destination,
            Err(denied) => return denied,
        };
        match IntegrationStore::new(&db).update_destination(
            &destination.id,
            params.name.as_deref(),
            params.endpoint.as_deref(),
        ) {
            Ok(()) => ToolResult::success("Destination updated"),
            Err(e) => ToolResult::failure("Failed to update destination", e.to_string()),
        }
    }
}

pub struct DestinationDeleteTool;

#[derive(Deserialize)]
struct DestinationIdParams {
    destination_id: String,
}

#[async_trait]
impl Tool for DestinationDeleteTool {
    fn name(&self) -> &'static str {
        "destination_delete"
    }
    fn description(&self) -> &str {
        "Delete an S3 destination. Backups pointing at it stop working."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Backup
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::High
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("destination_id", "Destination id"))
            .field(Field::literal(
                "confirm",
                CONFIRM,
                "Type CONFIRM_DESTINATION_CHANGE to confirm",
            ))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: DestinationIdParams = match parse_params(params) {
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
        let destination = match load_destination(&db, ctx, &params.destination_id) {
            Ok(destination) => destination,
            Err(denied) => return denied,
        };
        match IntegrationStore::new(&db).delete_destination(&destination.id) {
            Ok(()) => ToolResult::success(format!("Destination '{}' deleted", destination.name)),
            Err(e) => ToolResult::failure("Failed to delete destination", e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::implementations::tests::{seed_context, SeedOptions};

    #[tokio::test]
    async fn delete_without_confirm_is_schema_rejected() {
        let seed = seed_context(SeedOptions::default());
        let err = DestinationDeleteTool
            .schema()
            .validate(&json!({"destination_id": seed.destination_id}))
            .unwrap_err();
        assert!(err.contains("confirm: is required"));

        // The destination is untouched.
        let db = seed.db();
        assert!(IntegrationStore::new(&db)
            .get_destination(&seed.destination_id)
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn list_never_contains_secret_bytes() {
        let seed = seed_context(SeedOptions::default());
        let result = DestinationListTool.execute(json!({}), &seed.ctx).await;
        let serialized = serde_json::to_string(&result).unwrap();
        assert!(!serialized.contains(&seed.destination_secret));
        assert!(serialized.contains("secret_access_key_masked"));
    }
}
