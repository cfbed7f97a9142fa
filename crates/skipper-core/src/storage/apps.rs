//! Applications, compose stacks and per-application security rules.

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use serde_json::json;

use super::database::Database;

/// Application with its owning organization resolved through
/// environment → project.
#[derive(Debug, Clone, Serialize)]
pub struct Application {
    pub id: String,
    pub environment_id: String,
    pub name: String,
    pub status: String,
    pub organization_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComposeStack {
    pub id: String,
    pub environment_id: String,
    pub name: String,
    pub status: String,
    pub organization_id: String,
}

/// HTTP basic-auth rule. Full form; never leaves the storage/domain layer.
#[derive(Debug, Clone)]
pub struct SecurityRule {
    pub id: String,
    pub application_id: String,
    pub username: String,
    pub password: String,
    pub organization_id: String,
}

/// Masked projection of a [`SecurityRule`] for tool payloads.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityRuleMasked {
    pub id: String,
    pub application_id: String,
    pub username: String,
    pub password_masked: bool,
    pub password_present: bool,
}

impl From<&SecurityRule> for SecurityRuleMasked {
    fn from(rule: &SecurityRule) -> Self {
        Self {
            id: rule.id.clone(),
            application_id: rule.application_id.clone(),
            username: rule.username.clone(),
            password_masked: true,
            password_present: !rule.password.is_empty(),
        }
    }
}

const APPLICATION_COLUMNS: &str = "a.id, a.environment_id, a.name, a.status, p.organization_id";

pub struct AppStore<'a> {
    db: &'a Database,
}

impl<'a> AppStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn create_application(&self, environment_id: &str, name: &str) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.db.conn().execute(
            "INSERT INTO applications (id, environment_id, name, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, environment_id, name, now],
        )?;
        Ok(id)
    }

    pub fn get_application(&self, application_id: &str) -> Result<Option<Application>> {
        self.db
            .conn()
            .query_row(
                &format!(
                    "SELECT {APPLICATION_COLUMNS}
                     FROM applications a
                     JOIN environments e ON e.id = a.environment_id
                     JOIN projects p ON p.id = e.project_id
                     WHERE a.id = ?1"
                ),
                [application_id],
                |row| {
                    Ok(Application {
                        id: row.get(0)?,
                        environment_id: row.get(1)?,
                        name: row.get(2)?,
                        status: row.get(3)?,
                        organization_id: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn list_applications(&self, organization_id: &str) -> Result<Vec<Application>> {
        let mut stmt = self.db.conn().prepare(&format!(
            "SELECT {APPLICATION_COLUMNS}
             FROM applications a
             JOIN environments e ON e.id = a.environment_id
             JOIN projects p ON p.id = e.project_id
             WHERE p.organization_id = ?1
             ORDER BY a.created_at"
        ))?;
        let rows = stmt.query_map([organization_id], |row| {
            Ok(Application {
                id: row.get(0)?,
                environment_id: row.get(1)?,
                name: row.get(2)?,
                status: row.get(3)?,
                organization_id: row.get(4)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn update_application_name(&self, application_id: &str, name: &str) -> Result<()> {
        self.db.conn().execute(
            "UPDATE applications SET name = ?1 WHERE id = ?2",
            params![name, application_id],
        )?;
        Ok(())
    }

    pub fn set_application_status(&self, application_id: &str, status: &str) -> Result<()> {
        self.db.conn().execute(
            "UPDATE applications SET status = ?1 WHERE id = ?2",
            params![status, application_id],
        )?;
        Ok(())
    }

    pub fn delete_application(&self, application_id: &str) -> Result<()> {
        self.db
            .conn()
            .execute("DELETE FROM applications WHERE id = ?1", [application_id])?;
        Ok(())
    }

    pub fn create_compose(&self, environment_id: &str, name: &str) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.db.conn().execute(
            "INSERT INTO compose_stacks (id, environment_id, name, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, environment_id, name, now],
        )?;
        Ok(id)
    }

    pub fn get_compose(&self, compose_id: &str) -> Result<Option<ComposeStack>> {
        self.db
            .conn()
            .query_row(
                "SELECT c.id, c.environment_id, c.name, c.status, p.organization_id
                 FROM compose_stacks c
                 JOIN environments e ON e.id = c.environment_id
                 JOIN projects p ON p.id = e.project_id
                 WHERE c.id = ?1",
                [compose_id],
                |row| {
                    Ok(ComposeStack {
                        id: row.get(0)?,
                        environment_id: row.get(1)?,
                        name: row.get(2)?,
                        status: row.get(3)?,
                        organization_id: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn list_compose(&self, organization_id: &str) -> Result<Vec<ComposeStack>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT c.id, c.environment_id, c.name, c.status, p.organization_id
             FROM compose_stacks c
             JOIN environments e ON e.id = c.environment_id
             JOIN projects p ON p.id = e.project_id
             WHERE p.organization_id = ?1
             ORDER BY c.created_at",
        )?;
        let rows = stmt.query_map([organization_id], |row| {
            Ok(ComposeStack {
                id: row.get(0)?,
                environment_id: row.get(1)?,
                name: row.get(2)?,
                status: row.get(3)?,
                organization_id: row.get(4)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn set_compose_status(&self, compose_id: &str, status: &str) -> Result<()> {
        self.db.conn().execute(
            "UPDATE compose_stacks SET status = ?1 WHERE id = ?2",
            params![status, compose_id],
        )?;
        Ok(())
    }

    pub fn delete_compose(&self, compose_id: &str) -> Result<()> {
        self.db
            .conn()
            .execute("DELETE FROM compose_stacks WHERE id = ?1", [compose_id])?;
        Ok(())
    }

    /// Owning organization of a polymorphic (service_type, service_id)
    /// reference. `None` when the service does not exist.
    pub fn service_org(&self, service_type: &str, service_id: &str) -> Result<Option<String>> {
        let sql = match service_type {
            "application" => {
                "SELECT p.organization_id
                 FROM applications a
                 JOIN environments e ON e.id = a.environment_id
                 JOIN projects p ON p.id = e.project_id
                 WHERE a.id = ?1"
            }
            "compose" => {
                "SELECT p.organization_id
                 FROM compose_stacks c
                 JOIN environments e ON e.id = c.environment_id
                 JOIN projects p ON p.id = e.project_id
                 WHERE c.id = ?1"
            }
            _ => return Ok(None),
        };
        self.db
            .conn()
            .query_row(sql, [service_id], |row| row.get(0))
            .optional()
            .map_err(Into::into)
    }

    pub fn create_security_rule(
        &self,
        application_id: &str,
        username: &str,
        password: &str,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.db.conn().execute(
            "INSERT INTO security_rules (id, application_id, username, password, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, application_id, username, password, now],
        )?;
        Ok(id)
    }

    pub fn get_security_rule(&self, rule_id: &str) -> Result<Option<SecurityRule>> {
        self.db
            .conn()
            .query_row(
                "SELECT s.id, s.application_id, s.username, s.password, p.organization_id
                 FROM security_rules s
                 JOIN applications a ON a.id = s.application_id
                 JOIN environments e ON e.id = a.environment_id
                 JOIN projects p ON p.id = e.project_id
                 WHERE s.id = ?1",
                [rule_id],
                |row| {
                    Ok(SecurityRule {
                        id: row.get(0)?,
                        application_id: row.get(1)?,
                        username: row.get(2)?,
                        password: row.get(3)?,
                        organization_id: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn list_security_rules(&self, application_id: &str) -> Result<Vec<SecurityRule>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT s.id, s.application_id, s.username, s.password, p.organization_id
             FROM security_rules s
             JOIN applications a ON a.id = s.application_id
             JOIN environments e ON e.id = a.environment_id
             JOIN projects p ON p.id = e.project_id
             WHERE s.application_id = ?1
             ORDER BY s.created_at",
        )?;
        let rows = stmt.query_map([application_id], |row| {
            Ok(SecurityRule {
                id: row.get(0)?,
                application_id: row.get(1)?,
                username: row.get(2)?,
                password: row.get(3)?,
                organization_id: row.get(4)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn delete_security_rule(&self, rule_id: &str) -> Result<()> {
        self.db
            .conn()
            .execute("DELETE FROM security_rules WHERE id = ?1", [rule_id])?;
        Ok(())
    }
}

/// Masked application snapshot returned on access-control failures so the
/// client still renders a consistent shape.
pub fn masked_application_payload() -> serde_json::Value {
    json!({
        "id": null,
        "environment_id": null,
        "name": null,
        "status": null,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::orgs::OrgStore;
    use crate::storage::projects::ProjectStore;
    use tempfile::TempDir;

    fn seeded() -> (Database, TempDir, String, String) {
        let dir = TempDir::new().unwrap();
        let db = Database::new(&dir.path().join("test.db")).unwrap();
        let org = OrgStore::new(&db).create_organization("acme").unwrap();
        let projects = ProjectStore::new(&db);
        let project = projects.create(&org, "web", None).unwrap();
        let env = projects.create_environment(&project, "prod").unwrap();
        (db, dir, org, env)
    }

    #[test]
    fn application_carries_resolved_org() {
        let (db, _dir, org, env) = seeded();
        let store = AppStore::new(&db);
        let app = store.create_application(&env, "api").unwrap();

        let loaded = store.get_application(&app).unwrap().unwrap();
        assert_eq!(loaded.organization_id, org);
        assert_eq!(loaded.status, "idle");
    }

    #[test]
    fn service_org_resolves_both_kinds() {
        let (db, _dir, org, env) = seeded();
        let store = AppStore::new(&db);
        let app = store.create_application(&env, "api").unwrap();
        let compose = store.create_compose(&env, "stack").unwrap();

        assert_eq!(store.service_org("application", &app).unwrap().unwrap(), org);
        assert_eq!(store.service_org("compose", &compose).unwrap().unwrap(), org);
        assert!(store.service_org("application", "missing").unwrap().is_none());
    }

    #[test]
    fn security_rule_masked_projection_hides_password() {
        let (db, _dir, _org, env) = seeded();
        let store = AppStore::new(&db);
        let app = store.create_application(&env, "api").unwrap();
        let rule = store
            .create_security_rule(&app, "admin", "hunter2-secret")
            .unwrap();

        let full = store.get_security_rule(&rule).unwrap().unwrap();
        let masked = SecurityRuleMasked::from(&full);
        let json = serde_json::to_string(&masked).unwrap();
        assert!(!json.contains("hunter2-secret"));
        assert!(masked.password_masked);
        assert!(masked.password_present);
    }
}
