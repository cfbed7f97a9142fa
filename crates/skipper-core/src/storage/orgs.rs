//! Organizations, membership, users and per-org AI policies.

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::database::Database;

/// Membership role inside an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrgRole {
    Owner,
    Member,
}

impl OrgRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Member => "member",
        }
    }

    fn from_str(s: &str) -> Self {
        if s == "owner" {
            Self::Owner
        } else {
            Self::Member
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrgMember {
    pub user_id: String,
    pub organization_id: String,
    pub role: OrgRole,
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
}

pub struct OrgStore<'a> {
    db: &'a Database,
}

impl<'a> OrgStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn create_organization(&self, name: &str) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.db.conn().execute(
            "INSERT INTO organizations (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![id, name, now],
        )?;
        Ok(id)
    }

    pub fn add_member(&self, user_id: &str, organization_id: &str, role: OrgRole) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.db.conn().execute(
            "INSERT OR REPLACE INTO organization_members (user_id, organization_id, role, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id, organization_id, role.as_str(), now],
        )?;
        Ok(())
    }

    pub fn get_member(&self, user_id: &str, organization_id: &str) -> Result<Option<OrgMember>> {
        self.db
            .conn()
            .query_row(
                "SELECT user_id, organization_id, role FROM organization_members
                 WHERE user_id = ?1 AND organization_id = ?2",
                params![user_id, organization_id],
                |row| {
                    Ok(OrgMember {
                        user_id: row.get(0)?,
                        organization_id: row.get(1)?,
                        role: OrgRole::from_str(&row.get::<_, String>(2)?),
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn create_user(&self, email: &str, name: &str) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.db.conn().execute(
            "INSERT INTO users (id, email, name, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, email, name, now],
        )?;
        Ok(id)
    }

    pub fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        self.db
            .conn()
            .query_row(
                "SELECT id, email, name FROM users WHERE id = ?1",
                [user_id],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        name: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    /// All users that are members of the organization.
    pub fn list_users(&self, organization_id: &str) -> Result<Vec<(User, OrgRole)>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT u.id, u.email, u.name, m.role
             FROM users u
             JOIN organization_members m ON m.user_id = u.id
             WHERE m.organization_id = ?1
             ORDER BY u.email",
        )?;
        let rows = stmt.query_map([organization_id], |row| {
            Ok((
                User {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    name: row.get(2)?,
                },
                OrgRole::from_str(&row.get::<_, String>(3)?),
            ))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Bind-mount allowlist for the organization; empty when never set.
    pub fn bind_mount_allow_prefixes(&self, organization_id: &str) -> Result<Vec<String>> {
        let raw: Option<String> = self
            .db
            .conn()
            .query_row(
                "SELECT bind_mount_allow_prefixes FROM org_ai_policies WHERE organization_id = ?1",
                [organization_id],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(json) => Ok(serde_json::from_str(&json).unwrap_or_default()),
            None => Ok(Vec::new()),
        }
    }

    pub fn set_bind_mount_allow_prefixes(
        &self,
        organization_id: &str,
        prefixes: &[String],
    ) -> Result<()> {
        let json = serde_json::to_string(prefixes)?;
        let now = Utc::now().to_rfc3339();
        self.db.conn().execute(
            "INSERT INTO org_ai_policies (organization_id, bind_mount_allow_prefixes, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (organization_id)
             DO UPDATE SET bind_mount_allow_prefixes = ?2, updated_at = ?3",
            params![organization_id, json, now],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_db() -> (Database, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = Database::new(&dir.path().join("test.db")).unwrap();
        (db, dir)
    }

    #[test]
    fn membership_roundtrip() {
        let (db, _dir) = test_db();
        let store = OrgStore::new(&db);
        let org = store.create_organization("acme").unwrap();
        let user = store.create_user("a@acme.io", "Alice").unwrap();
        store.add_member(&user, &org, OrgRole::Owner).unwrap();

        let member = store.get_member(&user, &org).unwrap().unwrap();
        assert_eq!(member.role, OrgRole::Owner);
        assert!(store.get_member("nobody", &org).unwrap().is_none());
    }

    #[test]
    fn allowlist_defaults_empty_and_updates() {
        let (db, _dir) = test_db();
        let store = OrgStore::new(&db);
        let org = store.create_organization("acme").unwrap();

        assert!(store.bind_mount_allow_prefixes(&org).unwrap().is_empty());

        store
            .set_bind_mount_allow_prefixes(&org, &["/var/lib/skipper".to_string()])
            .unwrap();
        assert_eq!(
            store.bind_mount_allow_prefixes(&org).unwrap(),
            vec!["/var/lib/skipper".to_string()]
        );
    }
}
