//! Server fleet and SSH keys.

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use super::database::Database;

#[derive(Debug, Clone, Serialize)]
pub struct Server {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub ip_address: String,
    pub port: u16,
    pub username: String,
    pub ssh_key_id: Option<String>,
    pub status: String,
}

/// Full SSH key pair; only the reveal tool may surface `private_key`.
#[derive(Debug, Clone)]
pub struct SshKey {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub public_key: String,
    pub private_key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SshKeyMasked {
    pub id: String,
    pub name: String,
    pub public_key: String,
    pub private_key_masked: bool,
    pub private_key_present: bool,
}

impl From<&SshKey> for SshKeyMasked {
    fn from(key: &SshKey) -> Self {
        Self {
            id: key.id.clone(),
            name: key.name.clone(),
            public_key: key.public_key.clone(),
            private_key_masked: true,
            private_key_present: !key.private_key.is_empty(),
        }
    }
}

pub struct ServerStore<'a> {
    db: &'a Database,
}

impl<'a> ServerStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn create(
        &self,
        organization_id: &str,
        name: &str,
        ip_address: &str,
        port: u16,
        username: &str,
        ssh_key_id: Option<&str>,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.db.conn().execute(
            "INSERT INTO servers (id, organization_id, name, ip_address, port, username, ssh_key_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![id, organization_id, name, ip_address, port, username, ssh_key_id, now],
        )?;
        Ok(id)
    }

    pub fn get(&self, server_id: &str) -> Result<Option<Server>> {
        self.db
            .conn()
            .query_row(
                "SELECT id, organization_id, name, ip_address, port, username, ssh_key_id, status
                 FROM servers WHERE id = ?1",
                [server_id],
                |row| {
                    Ok(Server {
                        id: row.get(0)?,
                        organization_id: row.get(1)?,
                        name: row.get(2)?,
                        ip_address: row.get(3)?,
                        port: row.get::<_, i64>(4)? as u16,
                        username: row.get(5)?,
                        ssh_key_id: row.get(6)?,
                        status: row.get(7)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn list(&self, organization_id: &str) -> Result<Vec<Server>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT id, organization_id, name, ip_address, port, username, ssh_key_id, status
             FROM servers WHERE organization_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map([organization_id], |row| {
            Ok(Server {
                id: row.get(0)?,
                organization_id: row.get(1)?,
                name: row.get(2)?,
                ip_address: row.get(3)?,
                port: row.get::<_, i64>(4)? as u16,
                username: row.get(5)?,
                ssh_key_id: row.get(6)?,
                status: row.get(7)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn set_status(&self, server_id: &str, status: &str) -> Result<()> {
        self.db.conn().execute(
            "UPDATE servers SET status = ?1 WHERE id = ?2",
            params![status, server_id],
        )?;
        Ok(())
    }

    pub fn delete(&self, server_id: &str) -> Result<()> {
        self.db
            .conn()
            .execute("DELETE FROM servers WHERE id = ?1", [server_id])?;
        Ok(())
    }

    pub fn create_ssh_key(
        &self,
        organization_id: &str,
        name: &str,
        public_key: &str,
        private_key: &str,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.db.conn().execute(
            "INSERT INTO ssh_keys (id, organization_id, name, public_key, private_key, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, organization_id, name, public_key, private_key, now],
        )?;
        Ok(id)
    }

    pub fn get_ssh_key(&self, key_id: &str) -> Result<Option<SshKey>> {
        self.db
            .conn()
            .query_row(
                "SELECT id, organization_id, name, public_key, private_key
                 FROM ssh_keys WHERE id = ?1",
                [key_id],
                |row| {
                    Ok(SshKey {
                        id: row.get(0)?,
                        organization_id: row.get(1)?,
                        name: row.get(2)?,
                        public_key: row.get(3)?,
                        private_key: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn list_ssh_keys(&self, organization_id: &str) -> Result<Vec<SshKey>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT id, organization_id, name, public_key, private_key
             FROM ssh_keys WHERE organization_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map([organization_id], |row| {
            Ok(SshKey {
                id: row.get(0)?,
                organization_id: row.get(1)?,
                name: row.get(2)?,
                public_key: row.get(3)?,
                private_key: row.get(4)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn delete_ssh_key(&self, key_id: &str) -> Result<()> {
        self.db
            .conn()
            .execute("DELETE FROM ssh_keys WHERE id = ?1", [key_id])?;
        Ok(())
    }
}
