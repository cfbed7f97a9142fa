//! Managed database services (postgres, mysql, mariadb, mongo, redis).

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use super::database::Database;

pub const DATABASE_KINDS: &[&str] = &["postgres", "mysql", "mariadb", "mongo", "redis"];

/// Full database service row; the credential never leaves the storage or
/// executor layer.
#[derive(Debug, Clone)]
pub struct DatabaseService {
    pub id: String,
    pub environment_id: String,
    pub kind: String,
    pub name: String,
    pub database_name: String,
    pub database_user: String,
    pub database_password: String,
    pub container_id: Option<String>,
    pub status: String,
    pub organization_id: String,
}

/// Masked projection of a [`DatabaseService`] for tool payloads.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseServiceMasked {
    pub id: String,
    pub environment_id: String,
    pub kind: String,
    pub name: String,
    pub database_name: String,
    pub database_user: String,
    pub database_password_masked: bool,
    pub database_password_present: bool,
    pub status: String,
}

impl From<&DatabaseService> for DatabaseServiceMasked {
    fn from(svc: &DatabaseService) -> Self {
        Self {
            id: svc.id.clone(),
            environment_id: svc.environment_id.clone(),
            kind: svc.kind.clone(),
            name: svc.name.clone(),
            database_name: svc.database_name.clone(),
            database_user: svc.database_user.clone(),
            database_password_masked: true,
            database_password_present: !svc.database_password.is_empty(),
            status: svc.status.clone(),
        }
    }
}

const COLUMNS: &str = "d.id, d.environment_id, d.kind, d.name, d.database_name, d.database_user,
    d.database_password, d.container_id, d.status, p.organization_id";

fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DatabaseService> {
    Ok(DatabaseService {
        id: row.get(0)?,
        environment_id: row.get(1)?,
        kind: row.get(2)?,
        name: row.get(3)?,
        database_name: row.get(4)?,
        database_user: row.get(5)?,
        database_password: row.get(6)?,
        container_id: row.get(7)?,
        status: row.get(8)?,
        organization_id: row.get(9)?,
    })
}

pub struct DatabaseServiceStore<'a> {
    db: &'a Database,
}

impl<'a> DatabaseServiceStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &self,
        environment_id: &str,
        kind: &str,
        name: &str,
        database_name: &str,
        database_user: &str,
        database_password: &str,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.db.conn().execute(
            "INSERT INTO databases
             (id, environment_id, kind, name, database_name, database_user, database_password, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![id, environment_id, kind, name, database_name, database_user, database_password, now],
        )?;
        Ok(id)
    }

    pub fn get(&self, database_id: &str) -> Result<Option<DatabaseService>> {
        self.db
            .conn()
            .query_row(
                &format!(
                    "SELECT {COLUMNS}
                     FROM databases d
                     JOIN environments e ON e.id = d.environment_id
                     JOIN projects p ON p.id = e.project_id
                     WHERE d.id = ?1"
                ),
                [database_id],
                from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn list(&self, organization_id: &str) -> Result<Vec<DatabaseService>> {
        let mut stmt = self.db.conn().prepare(&format!(
            "SELECT {COLUMNS}
             FROM databases d
             JOIN environments e ON e.id = d.environment_id
             JOIN projects p ON p.id = e.project_id
             WHERE p.organization_id = ?1
             ORDER BY d.created_at"
        ))?;
        let rows = stmt.query_map([organization_id], from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn set_status(&self, database_id: &str, status: &str) -> Result<()> {
        self.db.conn().execute(
            "UPDATE databases SET status = ?1 WHERE id = ?2",
            params![status, database_id],
        )?;
        Ok(())
    }

    pub fn delete(&self, database_id: &str) -> Result<()> {
        self.db
            .conn()
            .execute("DELETE FROM databases WHERE id = ?1", [database_id])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::orgs::OrgStore;
    use crate::storage::projects::ProjectStore;
    use tempfile::TempDir;

    #[test]
    fn masked_projection_never_serializes_password() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(&dir.path().join("test.db")).unwrap();
        let org = OrgStore::new(&db).create_organization("acme").unwrap();
        let projects = ProjectStore::new(&db);
        let project = projects.create(&org, "web", None).unwrap();
        let env = projects.create_environment(&project, "prod").unwrap();

        let store = DatabaseServiceStore::new(&db);
        let id = store
            .create(&env, "postgres", "main-db", "app", "app", "pg-secret-123")
            .unwrap();

        let full = store.get(&id).unwrap().unwrap();
        assert_eq!(full.organization_id, org);

        let masked = DatabaseServiceMasked::from(&full);
        let json = serde_json::to_string(&masked).unwrap();
        assert!(!json.contains("pg-secret-123"));
        assert!(masked.database_password_present);
    }
}
