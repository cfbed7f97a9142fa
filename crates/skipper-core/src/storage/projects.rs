//! Projects and environments.

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use super::database::Database;

#[derive(Debug, Clone, Serialize)]
pub struct Project {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
}

/// Environment with its owning organization resolved through the project.
#[derive(Debug, Clone, Serialize)]
pub struct Environment {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub organization_id: String,
}

pub struct ProjectStore<'a> {
    db: &'a Database,
}

impl<'a> ProjectStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn create(
        &self,
        organization_id: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.db.conn().execute(
            "INSERT INTO projects (id, organization_id, name, description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, organization_id, name, description, now],
        )?;
        Ok(id)
    }

    pub fn get(&self, project_id: &str) -> Result<Option<Project>> {
        self.db
            .conn()
            .query_row(
                "SELECT id, organization_id, name, description, created_at
                 FROM projects WHERE id = ?1",
                [project_id],
                |row| {
                    Ok(Project {
                        id: row.get(0)?,
                        organization_id: row.get(1)?,
                        name: row.get(2)?,
                        description: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn list(&self, organization_id: &str) -> Result<Vec<Project>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT id, organization_id, name, description, created_at
             FROM projects WHERE organization_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map([organization_id], |row| {
            Ok(Project {
                id: row.get(0)?,
                organization_id: row.get(1)?,
                name: row.get(2)?,
                description: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn update(
        &self,
        project_id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<()> {
        if let Some(name) = name {
            self.db.conn().execute(
                "UPDATE projects SET name = ?1 WHERE id = ?2",
                params![name, project_id],
            )?;
        }
        if let Some(description) = description {
            self.db.conn().execute(
                "UPDATE projects SET description = ?1 WHERE id = ?2",
                params![description, project_id],
            )?;
        }
        Ok(())
    }

    pub fn delete(&self, project_id: &str) -> Result<()> {
        self.db
            .conn()
            .execute("DELETE FROM projects WHERE id = ?1", [project_id])?;
        Ok(())
    }

    pub fn create_environment(&self, project_id: &str, name: &str) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.db.conn().execute(
            "INSERT INTO environments (id, project_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, project_id, name, now],
        )?;
        Ok(id)
    }

    pub fn get_environment(&self, environment_id: &str) -> Result<Option<Environment>> {
        self.db
            .conn()
            .query_row(
                "SELECT e.id, e.project_id, e.name, p.organization_id
                 FROM environments e
                 JOIN projects p ON p.id = e.project_id
                 WHERE e.id = ?1",
                [environment_id],
                |row| {
                    Ok(Environment {
                        id: row.get(0)?,
                        project_id: row.get(1)?,
                        name: row.get(2)?,
                        organization_id: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn list_environments(&self, project_id: &str) -> Result<Vec<Environment>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT e.id, e.project_id, e.name, p.organization_id
             FROM environments e
             JOIN projects p ON p.id = e.project_id
             WHERE e.project_id = ?1 ORDER BY e.created_at",
        )?;
        let rows = stmt.query_map([project_id], |row| {
            Ok(Environment {
                id: row.get(0)?,
                project_id: row.get(1)?,
                name: row.get(2)?,
                organization_id: row.get(3)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn delete_environment(&self, environment_id: &str) -> Result<()> {
        self.db
            .conn()
            .execute("DELETE FROM environments WHERE id = ?1", [environment_id])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::orgs::OrgStore;
    use tempfile::TempDir;

    #[test]
    fn environment_resolves_owning_organization() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(&dir.path().join("test.db")).unwrap();
        let org = OrgStore::new(&db).create_organization("acme").unwrap();

        let store = ProjectStore::new(&db);
        let project = store.create(&org, "web", None).unwrap();
        let env = store.create_environment(&project, "production").unwrap();

        let loaded = store.get_environment(&env).unwrap().unwrap();
        assert_eq!(loaded.organization_id, org);
        assert_eq!(loaded.project_id, project);
    }
}
