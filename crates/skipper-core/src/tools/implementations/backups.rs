//! Database backup tools.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::databases::load_database;
use super::open_db;
use crate::safety::{ensure_org_binding, require_org_member};
use crate::scheduler::ScheduleJob;
use crate::storage::{Backup, BackupStore, Database, IntegrationStore};
use crate::tools::registry::{
    parse_params, RiskLevel, Tool, ToolCategory, ToolContext, ToolResult,
};
use crate::tools::schema::{Field, ParamSchema};

/// Load a backup, resolve its database and enforce the org binding.
fn load_backup(
    db: &Database,
    ctx: &ToolContext,
    backup_id: &str,
) -> Result<(Backup, crate::storage::DatabaseService), ToolResult> {
    let backup = match BackupStore::new(db).get_backup(backup_id) {
        Ok(Some(backup)) => backup,
        Ok(None) => return Err(ToolResult::not_found("Backup not found")),
        Err(e) => return Err(ToolResult::failure("Failed to load backup", e.to_string())),
    };
    let service = load_database(db, ctx, &backup.database_id)?;
    Ok((backup, service))
}

fn backup_job(backup: &Backup) -> ScheduleJob {
    ScheduleJob {
        id: backup.id.clone(),
        kind: "backup".to_string(),
        cron_expression: backup.schedule.clone(),
        payload: json!({
            "database_id": backup.database_id,
            "destination_id": backup.destination_id,
            "prefix": backup.prefix,
        }),
    }
}

pub struct BackupListTool;

#[derive(Deserialize)]
struct BackupListParams {
    database_id: String,
}

#[async_trait]
impl Tool for BackupListTool {
    fn name(&self) -> &'static str {
        "backup_list"
    }
    fn description(&self) -> &str {
        "List scheduled backups of a managed database."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Backup
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new().field(Field::string("database_id", "Database id"))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: BackupListParams = match parse_params(params) {
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
        let service = match load_database(&db, ctx, &params.database_id) {
            Ok(service) => service,
            Err(denied) => return denied,
        };
        match BackupStore::new(&db).list_backups_for_database(&service.id) {
            Ok(backups) => ToolResult::success_data(json!(backups)),
            Err(e) => ToolResult::failure("Failed to list backups", e.to_string()),
        }
    }
}

pub struct BackupCreateTool;

#[derive(Deserialize)]
struct BackupCreateParams {
    database_id: String,
    destination_id: String,
    schedule: String,
    prefix: Option<String>,
}

#[async_trait]
impl Tool for BackupCreateTool {
    fn name(&self) -> &'static str {
        "backup_create"
    }
    fn description(&self) -> &str {
        "Create a scheduled backup of a managed database into an S3 destination."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Backup
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("database_id", "Database id"))
            .field(Field::string("destination_id", "S3 destination id"))
            .field(Field::string("schedule", "Cron expression, e.g. 0 3 * * *"))
            .field(Field::string("prefix", "Key prefix inside the bucket").optional())
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: BackupCreateParams = match parse_params(params) {
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
        let service = match load_database(&db, ctx, &params.database_id) {
            Ok(service) => service,
            Err(denied) => return denied,
        };

        // Destination must exist and belong to this organization.
        let destination = match IntegrationStore::new(&db).get_destination(&params.destination_id) {
            Ok(Some(destination)) => destination,
            Ok(None) => return ToolResult::not_found("Destination not found"),
            Err(e) => return ToolResult::failure("Failed to load destination", e.to_string()),
        };
        if let Err(denied) = ensure_org_binding(ctx, &destination.organization_id, json!({})) {
            return denied;
        }

        let (backup_id, backup) = {
            let store = BackupStore::new(&db);
            let backup_id = match store.create_backup(
                &service.id,
                &destination.id,
                &params.schedule,
                params.prefix.as_deref().unwrap_or(""),
            ) {
                Ok(id) => id,
                Err(e) => return ToolResult::failure("Failed to create backup", e.to_string()),
            };
            let backup = store.get_backup(&backup_id).ok().flatten();
            (backup_id, backup)
        };

        if let Some(backup) = backup {
            if let Err(e) = ctx.services.scheduler.create(&backup_job(&backup)).await {
                return ToolResult::failure("Failed to register backup schedule", e.to_string());
            }
        }

        ToolResult::success_with(
            "Backup schedule created",
            json!({"backup_id": backup_id}),
        )
    }
}

pub struct BackupUpdateTool;

#[derive(Deserialize)]
struct BackupUpdateParams {
    backup_id: String,
    schedule: Option<String>,
    enabled: Option<bool>,
}

#[async_trait]
impl Tool for BackupUpdateTool {
    fn name(&self) -> &'static str {
        "backup_update"
    }
    fn description(&self) -> &str {
        "Change a backup's schedule or enable/disable it."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Backup
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("backup_id", "Backup id"))
            .field(Field::string("schedule", "New cron expression").optional())
            .field(Field::boolean("enabled", "Enable or disable the backup").optional())
            .at_least_one_of(&["schedule", "enabled"])
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: BackupUpdateParams = match parse_params(params) {
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
        let (backup, _service) = match load_backup(&db, ctx, &params.backup_id) {
            Ok(found) => found,
            Err(denied) => return denied,
        };

        let updated = {
            let store = BackupStore::new(&db);
            if let Err(e) =
                store.update_backup(&backup.id, params.schedule.as_deref(), params.enabled)
            {
                return ToolResult::failure("Failed to update backup", e.to_string());
            }
            store.get_backup(&backup.id).ok().flatten()
        };
        if let Some(updated) = updated {
            if let Err(e) = ctx.services.scheduler.update(&backup_job(&updated)).await {
                return ToolResult::failure("Failed to update backup schedule", e.to_string());
            }
        }
        ToolResult::success("Backup updated")
    }
}

pub struct BackupDeleteTool;

#[derive(Deserialize)]
struct BackupIdParams {
    backup_id: String,
}

#[async_trait]
impl Tool for BackupDeleteTool {
    fn name(&self) -> &'static str {
        "backup_delete"
    }
    fn description(&self) -> &str {
        "Delete a backup schedule. Stored backup files are not touched."
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
            .field(Field::string("backup_id", "Backup id"))
            .field(Field::literal(
                "confirm",
                "CONFIRM_DELETE",
                "Type CONFIRM_DELETE to confirm the deletion",
            ))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: BackupIdParams = match parse_params(params) {
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
        let (backup, _service) = match load_backup(&db, ctx, &params.backup_id) {
            Ok(found) => found,
            Err(denied) => return denied,
        };

        if let Err(e) = BackupStore::new(&db).delete_backup(&backup.id) {
            return ToolResult::failure("Failed to delete backup", e.to_string());
        }
        let _ = ctx.services.scheduler.remove(&backup.id).await;
        ToolResult::success("Backup schedule deleted")
    }
}

pub struct BackupRunTool;

#[async_trait]
impl Tool for BackupRunTool {
    fn name(&self) -> &'static str {
        "backup_run"
    }
    fn description(&self) -> &str {
        "Trigger one immediate run of a backup, out of schedule."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Backup
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new().field(Field::string("backup_id", "Backup id"))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: BackupIdParams = match parse_params(params) {
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
        let (backup, service) = match load_backup(&db, ctx, &params.backup_id) {
            Ok(found) => found,
            Err(denied) => return denied,
        };

        match ctx.services.scheduler.run(&backup.id).await {
            Ok(()) => ToolResult::success_with(
                format!("Backup of '{}' started", service.name),
                json!({"backup_id": backup.id}),
            ),
            Err(e) => ToolResult::failure("Failed to start backup run", e.to_string()),
        }
    }
}

pub struct BackupRestoreTool;

#[derive(Deserialize)]
struct BackupRestoreParams {
    backup_id: String,
    backup_file: String,
    database_name: Option<String>,
}

#[async_trait]
impl Tool for BackupRestoreTool {
    fn name(&self) -> &'static str {
        "backup_restore"
    }
    fn description(&self) -> &str {
        "Restore a backup file into a managed database. Overwrites data; irreversible."
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
            .field(Field::string("backup_id", "Backup id"))
            .field(Field::string("backup_file", "Backup file key inside the destination"))
            .field(Field::string("database_name", "Restore into this database instead").optional())
            .field(Field::literal(
                "confirm",
                "RESTORE",
                "Type RESTORE to confirm overwriting the database",
            ))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: BackupRestoreParams = match parse_params(params) {
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
        let (backup, service) = match load_backup(&db, ctx, &params.backup_id) {
            Ok(found) => found,
            Err(denied) => return denied,
        };

        let target_database = params
            .database_name
            .unwrap_or_else(|| service.database_name.clone());

        // Deployment record carries the restore log for the UI.
        let deployment_id = {
            let store = BackupStore::new(&db);
            match store.create_deployment(
                "database",
                &service.id,
                &format!("Restore {} into {}", params.backup_file, target_database),
            ) {
                Ok(id) => id,
                Err(e) => return ToolResult::failure("Failed to record restore", e.to_string()),
            }
        };

        if let Err(e) = ctx.services.deployer.trigger("restore", &backup.id).await {
            let _ = BackupStore::new(&db).set_deployment_status(&deployment_id, "error");
            return ToolResult::failure_data(
                "Failed to start restore",
                e.to_string(),
                json!({"deployment_id": deployment_id}),
            );
        }

        ToolResult::success_with(
            format!("Restore of '{}' started", params.backup_file),
            json!({
                "deployment_id": deployment_id,
                "backup_id": backup.id,
                "database_name": target_database,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::implementations::tests::{seed_context, SeedOptions};

    #[tokio::test]
    async fn restore_without_confirm_fails_validation() {
        let schema = BackupRestoreTool.schema();
        let err = schema
            .validate(&json!({"backup_id": "b-1", "backup_file": "dump.sql"}))
            .unwrap_err();
        assert!(err.contains("confirm: is required"));
    }

    #[tokio::test]
    async fn restore_creates_deployment_record() {
        let seed = seed_context(SeedOptions::default());
        let created = BackupCreateTool
            .execute(
                json!({
                    "database_id": seed.database_id,
                    "destination_id": seed.destination_id,
                    "schedule": "0 3 * * *",
                }),
                &seed.ctx,
            )
            .await;
        assert!(created.success);
        let backup_id = created.data.unwrap()["backup_id"].as_str().unwrap().to_string();

        let restored = BackupRestoreTool
            .execute(
                json!({
                    "backup_id": backup_id,
                    "backup_file": "2024-01-01.dump",
                    "confirm": "RESTORE",
                }),
                &seed.ctx,
            )
            .await;
        assert!(restored.success);

        let db = seed.db();
        let deployments = BackupStore::new(&db)
            .list_deployments("database", &seed.database_id)
            .unwrap();
        assert_eq!(deployments.len(), 1);
        assert_eq!(deployments[0].status, "running");
    }
}
