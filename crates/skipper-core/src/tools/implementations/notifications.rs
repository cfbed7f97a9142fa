//! Notification channel tools.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::open_db;
use crate::safety::{ensure_org_binding, require_org_member};
use crate::storage::{Database, IntegrationStore, NotificationChannel, NotificationChannelMasked};
use crate::tools::registry::{
    parse_params, RiskLevel, Tool, ToolCategory, ToolContext, ToolResult,
};
use crate::tools::schema::{Field, ParamSchema};

fn load_channel(
    db: &Database,
    ctx: &ToolContext,
    channel_id: &str,
) -> Result<NotificationChannel, ToolResult> {
    let channel = match IntegrationStore::new(db).get_notification_channel(channel_id) {
        Ok(Some(channel)) => channel,
        Ok(None) => return Err(ToolResult::not_found("Notification channel not found")),
        Err(e) => {
            return Err(ToolResult::failure(
                "Failed to load notification channel",
                e.to_string(),
            ))
        }
    };
    ensure_org_binding(ctx, &channel.organization_id, json!({}))?;
    Ok(channel)
}

pub struct NotificationListTool;

#[async_trait]
impl Tool for NotificationListTool {
    fn name(&self) -> &'static str {
        "notification_list"
    }
    fn description(&self) -> &str {
        "List notification channels. Webhook URLs are masked."
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
        match IntegrationStore::new(&db).list_notification_channels(&ctx.organization_id) {
            Ok(channels) => {
                let masked: Vec<NotificationChannelMasked> = channels
                    .iter()
                    .map(NotificationChannelMasked::from)
                    .collect();
                ToolResult::success_data(json!(masked))
            }
            Err(e) => ToolResult::failure("Failed to list notification channels", e.to_string()),
        }
    }
}

pub struct NotificationCreateTool;

#[derive(Deserialize)]
struct NotificationCreateParams {
    kind: String,
    name: String,
    webhook_url: String,
}

#[async_trait]
impl Tool for NotificationCreateTool {
    fn name(&self) -> &'static str {
        "notification_create"
    }
    fn description(&self) -> &str {
        "Create a notification channel (slack, discord, telegram or generic webhook)."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Settings
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::enumeration(
                "kind",
                &["slack", "discord", "telegram", "email", "webhook"],
                "Channel kind",
            ))
            .field(Field::string("name", "Channel display name"))
            .field(Field::string("webhook_url", "Webhook URL or bot endpoint"))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: NotificationCreateParams = match parse_params(params) {
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
        match IntegrationStore::new(&db).create_notification_channel(
            &ctx.organization_id,
            &params.kind,
            &params.name,
            &params.webhook_url,
        ) {
            Ok(channel_id) => ToolResult::success_with(
                format!("Notification channel '{}' created", params.name),
                json!({"notification_id": channel_id}),
            ),
            Err(e) => ToolResult::failure("Failed to create notification channel", e.to_string()),
        }
    }
}

pub struct NotificationUpdateTool;

#[derive(Deserialize)]
struct NotificationUpdateParams {
    notification_id: String,
    name: Option<String>,
    webhook_url: Option<String>,
}

#[async_trait]
impl Tool for NotificationUpdateTool {
    fn name(&self) -> &'static str {
        "notification_update"
    }
    fn description(&self) -> &str {
        "Rename a notification channel or replace its webhook URL."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Settings
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("notification_id", "Notification channel id"))
            .field(Field::string("name", "New display name").optional())
            .field(Field::string("webhook_url", "New webhook URL").optional())
            .at_least_one_of(&["name", "webhook_url"])
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: NotificationUpdateParams = match parse_params(params) {
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
        let channel = match load_channel(&db, ctx, &params.notification_id) {
            Ok(channel) => channel,
            Err(denied) => return denied,
        };
        match IntegrationStore::new(&db).update_notification_channel(
            &channel.id,
            params.name.as_deref(),
            params.webhook_url.as_deref(),
        ) {
            Ok(()) => ToolResult::success("Notification channel updated"),
            Err(e) => ToolResult::failure("Failed to update notification channel", e.to_string()),
        }
    }
}

pub struct NotificationDeleteTool;

#[derive(Deserialize)]
struct NotificationIdParams {
    notification_id: String,
}

#[async_trait]
impl Tool for NotificationDeleteTool {
    fn name(&self) -> &'static str {
        "notification_delete"
    }
    fn description(&self) -> &str {
        "Delete a notification channel."
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
            .field(Field::string("notification_id", "Notification channel id"))
            .field(Field::literal(
                "confirm",
                "CONFIRM_DELETE",
                "Type CONFIRM_DELETE to confirm the deletion",
            ))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: NotificationIdParams = match parse_params(params) {
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
        let channel = match load_channel(&db, ctx, &params.notification_id) {
            Ok(channel) => channel,
            Err(denied) => return denied,
        };
        match IntegrationStore::new(&db).delete_notification_channel(&channel.id) {
            Ok(()) => ToolResult::success(format!("Notification channel '{}' deleted", channel.name)),
            Err(e) => ToolResult::failure("Failed to delete notification channel", e.to_string()),
        }
    }
}
