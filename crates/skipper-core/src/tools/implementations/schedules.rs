//! Scheduled task tools, wired to the scheduler interface.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::open_db;
use crate::safety::{ensure_org_binding, require_org_member};
use crate::scheduler::ScheduleJob;
use crate::storage::{BackupStore, Database, Schedule};
use crate::tools::registry::{
    parse_params, RiskLevel, Tool, ToolCategory, ToolContext, ToolResult,
};
use crate::tools::schema::{Field, ParamSchema};

fn schedule_job(schedule: &Schedule) -> ScheduleJob {
    ScheduleJob {
        id: schedule.id.clone(),
        kind: "schedule".to_string(),
        cron_expression: schedule.cron_expression.clone(),
        payload: json!({
            "target_type": schedule.target_type,
            "target_id": schedule.target_id,
            "command": schedule.command,
        }),
    }
}

fn load_schedule(
    db: &Database,
    ctx: &ToolContext,
    schedule_id: &str,
) -> Result<Schedule, ToolResult> {
    let schedule = match BackupStore::new(db).get_schedule(schedule_id) {
        Ok(Some(schedule)) => schedule,
        Ok(None) => return Err(ToolResult::not_found("Schedule not found")),
        Err(e) => return Err(ToolResult::failure("Failed to load schedule", e.to_string())),
    };
    ensure_org_binding(ctx, &schedule.organization_id, json!({}))?;
    Ok(schedule)
}

pub struct ScheduleListTool;

#[async_trait]
impl Tool for ScheduleListTool {
    fn name(&self) -> &'static str {
        "schedule_list"
    }
    fn description(&self) -> &str {
        "List scheduled tasks of the organization."
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
        match BackupStore::new(&db).list_schedules(&ctx.organization_id) {
            Ok(schedules) => ToolResult::success_data(json!(schedules)),
            Err(e) => ToolResult::failure("Failed to list schedules", e.to_string()),
        }
    }
}

pub struct ScheduleCreateTool;

#[derive(Deserialize)]
struct ScheduleCreateParams {
    target_type: String,
    target_id: String,
    cron_expression: String,
    command: String,
}

#[async_trait]
impl Tool for ScheduleCreateTool {
    fn name(&self) -> &'static str {
        "schedule_create"
    }
    fn description(&self) -> &str {
        "Create a scheduled command against an application or compose stack."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Settings
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::enumeration(
                "target_type",
                &["application", "compose"],
                "Target service type",
            ))
            .field(Field::string("target_id", "Target service id"))
            .field(Field::string("cron_expression", "Cron expression, e.g. 0 4 * * *"))
            .field(Field::string("command", "Command to run inside the service"))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: ScheduleCreateParams = match parse_params(params) {
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
        match crate::storage::AppStore::new(&db)
            .service_org(&params.target_type, &params.target_id)
        {
            Ok(Some(org)) => {
                if let Err(denied) = ensure_org_binding(ctx, &org, json!({})) {
                    return denied;
                }
            }
            Ok(None) => return ToolResult::not_found("Target service not found"),
            Err(e) => return ToolResult::failure("Failed to resolve target", e.to_string()),
        }

        let (schedule_id, schedule) = {
            let store = BackupStore::new(&db);
            let schedule_id = match store.create_schedule(
                &ctx.organization_id,
                &params.target_type,
                &params.target_id,
                &params.cron_expression,
                &params.command,
            ) {
                Ok(id) => id,
                Err(e) => return ToolResult::failure("Failed to create schedule", e.to_string()),
            };
            let schedule = store.get_schedule(&schedule_id).ok().flatten();
            (schedule_id, schedule)
        };
        if let Some(schedule) = schedule {
            if let Err(e) = ctx.services.scheduler.create(&schedule_job(&schedule)).await {
                return ToolResult::failure("Failed to register schedule", e.to_string());
            }
        }
        ToolResult::success_with("Schedule created", json!({"schedule_id": schedule_id}))
    }
}

pub struct ScheduleUpdateTool;

#[derive(Deserialize)]
struct ScheduleUpdateParams {
    schedule_id: String,
    cron_expression: Option<String>,
    command: Option<String>,
    enabled: Option<bool>,
}

#[async_trait]
impl Tool for ScheduleUpdateTool {
    fn name(&self) -> &'static str {
        "schedule_update"
    }
    fn description(&self) -> &str {
        "Change a schedule's cron expression, command or enabled state."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Settings
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("schedule_id", "Schedule id"))
            .field(Field::string("cron_expression", "New cron expression").optional())
            .field(Field::string("command", "New command").optional())
            .field(Field::boolean("enabled", "Enable or disable").optional())
            .at_least_one_of(&["cron_expression", "command", "enabled"])
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: ScheduleUpdateParams = match parse_params(params) {
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
        let schedule = match load_schedule(&db, ctx, &params.schedule_id) {
            Ok(schedule) => schedule,
            Err(denied) => return denied,
        };

        let updated = {
            let store = BackupStore::new(&db);
            if let Err(e) = store.update_schedule(
                &schedule.id,
                params.cron_expression.as_deref(),
                params.command.as_deref(),
                params.enabled,
            ) {
                return ToolResult::failure("Failed to update schedule", e.to_string());
            }
            store.get_schedule(&schedule.id).ok().flatten()
        };
        if let Some(updated) = updated {
            if let Err(e) = ctx.services.scheduler.update(&schedule_job(&updated)).await {
                return ToolResult::failure("Failed to update registered schedule", e.to_string());
            }
        }
        ToolResult::success("Schedule updated")
    }
}

pub struct ScheduleDeleteTool;

#[derive(Deserialize)]
struct ScheduleIdParams {
    schedule_id: String,
}

#[async_trait]
impl Tool for ScheduleDeleteTool {
    fn name(&self) -> &'static str {
        "schedule_delete"
    }
    fn description(&self) -> &str {
        "Delete a scheduled task."
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
            .field(Field::string("schedule_id", "Schedule id"))
            .field(Field::literal(
                "confirm",
                "CONFIRM_DELETE",
                "Type CONFIRM_DELETE to confirm the deletion",
            ))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: ScheduleIdParams = match parse_params(params) {
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
        let schedule = match load_schedule(&db, ctx, &params.schedule_id) {
            Ok(schedule) => schedule,
            Err(denied) => return denied,
        };

        if let Err(e) = BackupStore::new(&db).delete_schedule(&schedule.id) {
            return ToolResult::failure("Failed to delete schedule", e.to_string());
        }
        let _ = ctx.services.scheduler.remove(&schedule.id).await;
        ToolResult::success("Schedule deleted")
    }
}
