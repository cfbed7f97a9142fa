//! Volume backup tools.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::open_db;
use crate::safety::{ensure_org_binding, require_org_member};
use crate::scheduler::ScheduleJob;
use crate::storage::{AppStore, BackupStore, Database, VolumeBackup};
use crate::tools::registry::{
    parse_params, RiskLevel, Tool, ToolCategory, ToolContext, ToolResult,
};
use crate::tools::schema::{Field, ParamSchema};

const CONFIRM: &str = "CONFIRM_VOLUME_BACKUP_CHANGE";

fn ensure_service(
    db: &Database,
    ctx: &ToolContext,
    service_type: &str,
    service_id: &str,
) -> Result<(), ToolResult> {
    match AppStore::new(db).service_org(service_type, service_id) {
        Ok(Some(org)) => ensure_org_binding(ctx, &org, json!({})),
        Ok(None) => Err(ToolResult::not_found("Service not found")),
        Err(e) => Err(ToolResult::failure("Failed to resolve service", e.to_string())),
    }
}

fn load_volume_backup(
    db: &Database,
    ctx: &ToolContext,
    volume_backup_id: &str,
) -> Result<VolumeBackup, ToolResult> {
    let backup = match BackupStore::new(db).get_volume_backup(volume_backup_id) {
        Ok(Some(backup)) => backup,
        Ok(None) => return Err(ToolResult::not_found("Volume backup not found")),
        Err(e) => return Err(ToolResult::failure("Failed to load volume backup", e.to_string())),
    };
    ensure_service(db, ctx, &backup.service_type, &backup.service_id)?;
    Ok(backup)
}

fn volume_backup_job(backup: &VolumeBackup) -> ScheduleJob {
    ScheduleJob {
        id: backup.id.clone(),
        kind: "volume_backup".to_string(),
        cron_expression: backup.cron_expression.clone(),
        payload: json!({
            "service_type": backup.service_type,
            "service_id": backup.service_id,
            "volume_name": backup.volume_name,
            "destination_id": backup.destination_id,
        }),
    }
}

pub struct VolumeBackupListTool;

#[derive(Deserialize)]
struct VolumeBackupListParams {
    service_type: String,
    service_id: String,
}

#[async_trait]
impl Tool for VolumeBackupListTool {
    fn name(&self) -> &'static str {
        "volume_backup_list"
    }
    fn description(&self) -> &str {
        "List volume backups of a service."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Backup
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::enumeration(
                "service_type",
                &["application", "compose"],
                "Owning service type",
            ))
            .field(Field::string("service_id", "Owning service id"))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: VolumeBackupListParams = match parse_params(params) {
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
        if let Err(denied) = ensure_service(&db, ctx, &params.service_type, &params.service_id) {
            return denied;
        }
        match BackupStore::new(&db).list_volume_backups(&params.service_type, &params.service_id) {
            Ok(backups) => ToolResult::success_data(json!(backups)),
            Err(e) => ToolResult::failure("Failed to list volume backups", e.to_string()),
        }
    }
}

pub struct VolumeBackupCreateTool;

#[derive(Deserialize)]
struct VolumeBackupCreateParams {
    service_type: String,
    service_id: String,
    volume_name: String,
    destination_id: String,
    cron_expression: String,
}

#[async_trait]
impl Tool for VolumeBackupCreateTool {
    fn name(&self) -> &'static str {
        "volume_backup_create"
    }
    fn description(&self) -> &str {
        "Create a scheduled backup of a service volume into an S3 destination."
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
            .field(Field::enumeration(
                "service_type",
                &["application", "compose"],
                "Owning service type",
            ))
            .field(Field::string("service_id", "Owning service id"))
            .field(Field::string("volume_name", "Docker volume to back up"))
            .field(Field::string("destination_id", "S3 destination id"))
            .field(Field::string("cron_expression", "Cron expression, e.g. 0 3 * * *"))
            .field(Field::literal(
                "confirm",
                CONFIRM,
                "Type CONFIRM_VOLUME_BACKUP_CHANGE to confirm",
            ))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: VolumeBackupCreateParams = match parse_params(params) {
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
        if let Err(denied) = ensure_service(&db, ctx, &params.service_type, &params.service_id) {
            return denied;
        }

        let store = BackupStore::new(&db);
        let id = match store.create_volume_backup(
            &params.service_type,
            &params.service_id,
            &params.volume_name,
            &params.destination_id,
            &params.cron_expression,
        ) {
            Ok(id) => id,
            Err(e) => return ToolResult::failure("Failed to create volume backup", e.to_string()),
        };

        let backup = store.get_volume_backup(&id).ok().flatten();
        drop(store);
        if let Some(backup) = backup {
            if let Err(e) = ctx
                .services
                .scheduler
                .create(&volume_backup_job(&backup))
                .await
            {
                return ToolResult::failure(
                    "Failed to register volume backup schedule",
                    e.to_string(),
                );
            }
        }

        ToolResult::success_with("Volume backup created", json!({"volume_backup_id": id}))
    }
}

pub struct VolumeBackupUpdateTool;

#[derive(Deserialize)]
struct VolumeBackupUpdateParams {
    volume_backup_id: String,
    cron_expression: Option<String>,
    enabled: Option<bool>,
}

#[async_trait]
impl Tool for VolumeBackupUpdateTool {
    fn name(&self) -> &'static str {
        "volume_backup_update"
    }
    fn description(&self) -> &str {
        "Change a volume backup's cron expression or enable/disable it."
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
            .field(Field::string("volume_backup_id", "Volume backup id"))
            .field(Field::string("cron_expression", "New cron expression").optional())
            .field(Field::boolean("enabled", "Enable or disable").optional())
            .field(Field::literal(
                "confirm",
                CONFIRM,
                "Type CONFIRM_VOLUME_BACKUP_CHANGE to confirm",
            ))
            .at_least_one_of(&["cron_expression", "enabled"])
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: VolumeBackupUpdateParams = match parse_params(params) {
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
        let backup = match load_volume_backup(&db, ctx, &params.volume_backup_id) {
            Ok(backup) => backup,
            Err(denied) => return denied,
        };

        let store = BackupStore::new(&db);
        if let Err(e) = store.update_volume_backup(
            &backup.id,
            params.cron_expression.as_deref(),
            params.enabled,
        ) {
            return ToolResult::failure("Failed to update volume backup", e.to_string());
        }
        let updated = store.get_volume_backup(&backup.id).ok().flatten();
        drop(store);
        if let Some(updated) = updated {
            if let Err(e) = ctx
                .services
                .scheduler
                .update(&volume_backup_job(&updated))
                .await
            {
                return ToolResult::failure(
                    "Failed to update volume backup schedule",
                    e.to_string(),
                );
            }
        }
        ToolResult::success("Volume backup updated")
    }
}

pub struct VolumeBackupDeleteTool;

#[derive(Deserialize)]
struct VolumeBackupIdParams {
    volume_backup_id: String,
}

#[async_trait]
impl Tool for VolumeBackupDeleteTool {
    fn name(&self) -> &'static str {
        "volume_backup_delete"
    }
    fn description(&self) -> &str {
        "Delete a volume backup schedule."
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
            .field(Field::string("volume_backup_id", "Volume backup id"))
            .field(Field::literal(
                "confirm",
                CONFIRM,
                "Type CONFIRM_VOLUME_BACKUP_CHANGE to confirm",
            ))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: VolumeBackupIdParams = match parse_params(params) {
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
        let backup = match load_volume_backup(&db, ctx, &params.volume_backup_id) {
            Ok(backup) => backup,
            Err(denied) => return denied,
        };

        if let Err(e) = BackupStore::new(&db).delete_volume_backup(&backup.id) {
            return ToolResult::failure("Failed to delete volume backup", e.to_string());
        }
        let _ = ctx.services.scheduler.remove(&backup.id).await;
        ToolResult::success("Volume backup deleted")
    }
}
