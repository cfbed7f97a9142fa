//! Domains and port mappings.

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use super::database::Database;

#[derive(Debug, Clone, Serialize)]
pub struct DomainEntry {
    pub id: String,
    pub service_type: String,
    pub service_id: String,
    pub host: String,
    pub https: bool,
    pub certificate_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortMapping {
    pub id: String,
    pub application_id: String,
    pub published_port: u16,
    pub target_port: u16,
    pub protocol: String,
}

pub struct NetworkStore<'a> {
    db: &'a Database,
}

impl<'a> NetworkStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn create_domain(
        &self,
        service_type: &str,
        service_id: &str,
        host: &str,
        https: bool,
        certificate_id: Option<&str>,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.db.conn().execute(
            "INSERT INTO domains (id, service_type, service_id, host, https, certificate_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![id, service_type, service_id, host, https, certificate_id, now],
        )?;
        Ok(id)
    }

    pub fn get_domain(&self, domain_id: &str) -> Result<Option<DomainEntry>> {
        self.db
            .conn()
            .query_row(
                "SELECT id, service_type, service_id, host, https, certificate_id
                 FROM domains WHERE id = ?1",
                [domain_id],
                |row| {
                    Ok(DomainEntry {
                        id: row.get(0)?,
                        service_type: row.get(1)?,
                        service_id: row.get(2)?,
                        host: row.get(3)?,
                        https: row.get(4)?,
                        certificate_id: row.get(5)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn list_domains(&self, service_type: &str, service_id: &str) -> Result<Vec<DomainEntry>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT id, service_type, service_id, host, https, certificate_id
             FROM domains WHERE service_type = ?1 AND service_id = ?2 ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![service_type, service_id], |row| {
            Ok(DomainEntry {
                id: row.get(0)?,
                service_type: row.get(1)?,
                service_id: row.get(2)?,
                host: row.get(3)?,
                https: row.get(4)?,
                certificate_id: row.get(5)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn delete_domain(&self, domain_id: &str) -> Result<()> {
        self.db
            .conn()
            .execute("DELETE FROM domains WHERE id = ?1", [domain_id])?;
        Ok(())
    }

    pub fn create_port(
        &self,
        application_id: &str,
        published_port: u16,
        target_port: u16,
        protocol: &str,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.db.conn().execute(
            "INSERT INTO ports (id, application_id, published_port, target_port, protocol, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, application_id, published_port, target_port, protocol, now],
        )?;
        Ok(id)
    }

    pub fn get_port(&self, port_id: &str) -> Result<Option<PortMapping>> {
        self.db
            .conn()
            .query_row(
                "SELECT id, application_id, published_port, target_port, protocol
                 FROM ports WHERE id = ?1",
                [port_id],
                |row| {
                    Ok(PortMapping {
                        id: row.get(0)?,
                        application_id: row.get(1)?,
                        published_port: row.get::<_, i64>(2)? as u16,
                        target_port: row.get::<_, i64>(3)? as u16,
                        protocol: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn list_ports(&self, application_id: &str) -> Result<Vec<PortMapping>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT id, application_id, published_port, target_port, protocol
             FROM ports WHERE application_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map([application_id], |row| {
            Ok(PortMapping {
                id: row.get(0)?,
                application_id: row.get(1)?,
                published_port: row.get::<_, i64>(2)? as u16,
                target_port: row.get::<_, i64>(3)? as u16,
                protocol: row.get(4)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn delete_port(&self, port_id: &str) -> Result<()> {
        self.db
            .conn()
            .execute("DELETE FROM ports WHERE id = ?1", [port_id])?;
        Ok(())
    }
}
