//! Service mounts (bind, volume, file).

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use super::database::Database;

#[derive(Debug, Clone, Serialize)]
pub struct Mount {
    pub id: String,
    pub service_type: String,
    pub service_id: String,
    pub mount_type: String,
    pub mount_path: String,
    pub host_path: Option<String>,
    pub volume_name: Option<String>,
    pub file_path: Option<String>,
    pub content: Option<String>,
}

pub struct NewMount<'p> {
    pub service_type: &'p str,
    pub service_id: &'p str,
    pub mount_type: &'p str,
    pub mount_path: &'p str,
    pub host_path: Option<&'p str>,
    pub volume_name: Option<&'p str>,
    pub file_path: Option<&'p str>,
    pub content: Option<&'p str>,
}

pub struct MountStore<'a> {
    db: &'a Database,
}

impl<'a> MountStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn create(&self, mount: &NewMount<'_>) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.db.conn().execute(
            "INSERT INTO mounts
             (id, service_type, service_id, mount_type, mount_path, host_path, volume_name, file_path, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                id,
                mount.service_type,
                mount.service_id,
                mount.mount_type,
                mount.mount_path,
                mount.host_path,
                mount.volume_name,
                mount.file_path,
                mount.content,
                now
            ],
        )?;
        Ok(id)
    }

    pub fn get(&self, mount_id: &str) -> Result<Option<Mount>> {
        self.db
            .conn()
            .query_row(
                "SELECT id, service_type, service_id, mount_type, mount_path, host_path, volume_name, file_path, content
                 FROM mounts WHERE id = ?1",
                [mount_id],
                Self::from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn list(&self, service_type: &str, service_id: &str) -> Result<Vec<Mount>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT id, service_type, service_id, mount_type, mount_path, host_path, volume_name, file_path, content
             FROM mounts WHERE service_type = ?1 AND service_id = ?2 ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![service_type, service_id], Self::from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn update_mount_path(&self, mount_id: &str, mount_path: &str) -> Result<()> {
        self.db.conn().execute(
            "UPDATE mounts SET mount_path = ?1 WHERE id = ?2",
            params![mount_path, mount_id],
        )?;
        Ok(())
    }

    pub fn delete(&self, mount_id: &str) -> Result<()> {
        self.db
            .conn()
            .execute("DELETE FROM mounts WHERE id = ?1", [mount_id])?;
        Ok(())
    }

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Mount> {
        Ok(Mount {
            id: row.get(0)?,
            service_type: row.get(1)?,
            service_id: row.get(2)?,
            mount_type: row.get(3)?,
            mount_path: row.get(4)?,
            host_path: row.get(5)?,
            volume_name: row.get(6)?,
            file_path: row.get(7)?,
            content: row.get(8)?,
        })
    }
}
