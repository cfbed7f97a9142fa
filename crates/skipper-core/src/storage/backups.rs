//! Backups, volume backups, schedules and deployment records.

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use super::database::Database;

#[derive(Debug, Clone, Serialize)]
pub struct Backup {
    pub id: String,
    pub database_id: String,
    pub destination_id: String,
    pub schedule: String,
    pub prefix: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct VolumeBackup {
    pub id: String,
    pub service_type: String,
    pub service_id: String,
    pub volume_name: String,
    pub destination_id: String,
    pub cron_expression: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Schedule {
    pub id: String,
    pub organization_id: String,
    pub target_type: String,
    pub target_id: String,
    pub cron_expression: String,
    pub command: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Deployment {
    pub id: String,
    pub target_type: String,
    pub target_id: String,
    pub title: String,
    pub status: String,
    pub log: String,
    pub created_at: String,
}

pub struct BackupStore<'a> {
    db: &'a Database,
}

impl<'a> BackupStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn create_backup(
        &self,
        database_id: &str,
        destination_id: &str,
        schedule: &str,
        prefix: &str,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.db.conn().execute(
            "INSERT INTO backups (id, database_id, destination_id, schedule, prefix, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, database_id, destination_id, schedule, prefix, now],
        )?;
        Ok(id)
    }

    pub fn get_backup(&self, backup_id: &str) -> Result<Option<Backup>> {
        self.db
            .conn()
            .query_row(
                "SELECT id, database_id, destination_id, schedule, prefix, enabled
                 FROM backups WHERE id = ?1",
                [backup_id],
                |row| {
                    Ok(Backup {
                        id: row.get(0)?,
                        database_id: row.get(1)?,
                        destination_id: row.get(2)?,
                        schedule: row.get(3)?,
                        prefix: row.get(4)?,
                        enabled: row.get(5)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn list_backups_for_database(&self, database_id: &str) -> Result<Vec<Backup>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT id, database_id, destination_id, schedule, prefix, enabled
             FROM backups WHERE database_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map([database_id], |row| {
            Ok(Backup {
                id: row.get(0)?,
                database_id: row.get(1)?,
                destination_id: row.get(2)?,
                schedule: row.get(3)?,
                prefix: row.get(4)?,
                enabled: row.get(5)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn update_backup(
        &self,
        backup_id: &str,
        schedule: Option<&str>,
        enabled: Option<bool>,
    ) -> Result<()> {
        if let Some(schedule) = schedule {
            self.db.conn().execute(
                "UPDATE backups SET schedule = ?1 WHERE id = ?2",
                params![schedule, backup_id],
            )?;
        }
        if let Some(enabled) = enabled {
            self.db.conn().execute(
                "UPDATE backups SET enabled = ?1 WHERE id = ?2",
                params![enabled, backup_id],
            )?;
        }
        Ok(())
    }

    pub fn delete_backup(&self, backup_id: &str) -> Result<()> {
        self.db
            .conn()
            .execute("DELETE FROM backups WHERE id = ?1", [backup_id])?;
        Ok(())
    }

    pub fn create_volume_backup(
        &self,
        service_type: &str,
        service_id: &str,
        volume_name: &str,
        destination_id: &str,
        cron_expression: &str,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.db.conn().execute(
            "INSERT INTO volume_backups
             (id, service_type, service_id, volume_name, destination_id, cron_expression, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![id, service_type, service_id, volume_name, destination_id, cron_expression, now],
        )?;
        Ok(id)
    }

    pub fn get_volume_backup(&self, volume_backup_id: &str) -> Result<Option<VolumeBackup>> {
        self.db
            .conn()
            .query_row(
                "SELECT id, service_type, service_id, volume_name, destination_id, cron_expression, enabled
                 FROM volume_backups WHERE id = ?1",
                [volume_backup_id],
                |row| {
                    Ok(VolumeBackup {
                        id: row.get(0)?,
                        service_type: row.get(1)?,
                        service_id: row.get(2)?,
                        volume_name: row.get(3)?,
                        destination_id: row.get(4)?,
                        cron_expression: row.get(5)?,
                        enabled: row.get(6)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn list_volume_backups(&self, service_type: &str, service_id: &str) -> Result<Vec<VolumeBackup>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT id, service_type, service_id, volume_name, destination_id, cron_expression, enabled
             FROM volume_backups WHERE service_type = ?1 AND service_id = ?2 ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![service_type, service_id], |row| {
            Ok(VolumeBackup {
                id: row.get(0)?,
                service_type: row.get(1)?,
                service_id: row.get(2)?,
                volume_name: row.get(3)?,
                destination_id: row.get(4)?,
                cron_expression: row.get(5)?,
                enabled: row.get(6)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn update_volume_backup(
        &self,
        volume_backup_id: &str,
        cron_expression: Option<&str>,
        enabled: Option<bool>,
    ) -> Result<()> {
        if let Some(cron) = cron_expression {
            self.db.conn().execute(
                "UPDATE volume_backups SET cron_expression = ?1 WHERE id = ?2",
                params![cron, volume_backup_id],
            )?;
        }
        if let Some(enabled) = enabled {
            self.db.conn().execute(
                "UPDATE volume_backups SET enabled = ?1 WHERE id = ?2",
                params![enabled, volume_backup_id],
            )?;
        }
        Ok(())
    }

    pub fn delete_volume_backup(&self, volume_backup_id: &str) -> Result<()> {
        self.db.conn().execute(
            "DELETE FROM volume_backups WHERE id = ?1",
            [volume_backup_id],
        )?;
        Ok(())
    }

    pub fn create_schedule(
        &self,
        organization_id: &str,
        target_type: &str,
        target_id: &str,
        cron_expression: &str,
        command: &str,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.db.conn().execute(
            "INSERT INTO schedules
             (id, organization_id, target_type, target_id, cron_expression, command, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![id, organization_id, target_type, target_id, cron_expression, command, now],
        )?;
        Ok(id)
    }

    pub fn get_schedule(&self, schedule_id: &str) -> Result<Option<Schedule>> {
        self.db
            .conn()
            .query_row(
                "SELECT id, organization_id, target_type, target_id, cron_expression, command, enabled
                 FROM schedules WHERE id = ?1",
                [schedule_id],
                |row| {
                    Ok(Schedule {
                        id: row.get(0)?,
                        organization_id: row.get(1)?,
                        target_type: row.get(2)?,
                        target_id: row.get(3)?,
                        cron_expression: row.get(4)?,
                        command: row.get(5)?,
                        enabled: row.get(6)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn list_schedules(&self, organization_id: &str) -> Result<Vec<Schedule>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT id, organization_id, target_type, target_id, cron_expression, command, enabled
             FROM schedules WHERE organization_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map([organization_id], |row| {
            Ok(Schedule {
                id: row.get(0)?,
                organization_id: row.get(1)?,
                target_type: row.get(2)?,
                target_id: row.get(3)?,
                cron_expression: row.get(4)?,
                command: row.get(5)?,
                enabled: row.get(6)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn update_schedule(
        &self,
        schedule_id: &str,
        cron_expression: Option<&str>,
        command: Option<&str>,
        enabled: Option<bool>,
    ) -> Result<()> {
        if let Some(cron) = cron_expression {
            self.db.conn().execute(
                "UPDATE schedules SET cron_expression = ?1 WHERE id = ?2",
                params![cron, schedule_id],
            )?;
        }
        if let Some(command) = command {
            self.db.conn().execute(
                "UPDATE schedules SET command = ?1 WHERE id = ?2",
                params![command, schedule_id],
            )?;
        }
        if let Some(enabled) = enabled {
            self.db.conn().execute(
                "UPDATE schedules SET enabled = ?1 WHERE id = ?2",
                params![enabled, schedule_id],
            )?;
        }
        Ok(())
    }

    pub fn delete_schedule(&self, schedule_id: &str) -> Result<()> {
        self.db
            .conn()
            .execute("DELETE FROM schedules WHERE id = ?1", [schedule_id])?;
        Ok(())
    }

    pub fn create_deployment(
        &self,
        target_type: &str,
        target_id: &str,
        title: &str,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.db.conn().execute(
            "INSERT INTO deployments (id, target_type, target_id, title, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, target_type, target_id, title, now],
        )?;
        Ok(id)
    }

    pub fn get_deployment(&self, deployment_id: &str) -> Result<Option<Deployment>> {
        self.db
            .conn()
            .query_row(
                "SELECT id, target_type, target_id, title, status, log, created_at
                 FROM deployments WHERE id = ?1",
                [deployment_id],
                |row| {
                    Ok(Deployment {
                        id: row.get(0)?,
                        target_type: row.get(1)?,
                        target_id: row.get(2)?,
                        title: row.get(3)?,
                        status: row.get(4)?,
                        log: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn list_deployments(&self, target_type: &str, target_id: &str) -> Result<Vec<Deployment>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT id, target_type, target_id, title, status, log, created_at
             FROM deployments WHERE target_type = ?1 AND target_id = ?2
             ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![target_type, target_id], |row| {
            Ok(Deployment {
                id: row.get(0)?,
                target_type: row.get(1)?,
                target_id: row.get(2)?,
                title: row.get(3)?,
                status: row.get(4)?,
                log: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn set_deployment_status(&self, deployment_id: &str, status: &str) -> Result<()> {
        self.db.conn().execute(
            "UPDATE deployments SET status = ?1 WHERE id = ?2",
            params![status, deployment_id],
        )?;
        Ok(())
    }

    pub fn append_deployment_log(&self, deployment_id: &str, chunk: &str) -> Result<()> {
        self.db.conn().execute(
            "UPDATE deployments SET log = log || ?1 WHERE id = ?2",
            params![chunk, deployment_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn deployment_lifecycle() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(&dir.path().join("test.db")).unwrap();
        let store = BackupStore::new(&db);

        let id = store
            .create_deployment("database", "db-1", "Restore backup")
            .unwrap();
        store.append_deployment_log(&id, "starting\n").unwrap();
        store.set_deployment_status(&id, "error").unwrap();

        let dep = store.get_deployment(&id).unwrap().unwrap();
        assert_eq!(dep.status, "error");
        assert!(dep.log.contains("starting"));
    }
}
