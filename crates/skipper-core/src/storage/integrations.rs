//! Organization-level integrations: S3 destinations, container registries,
//! git providers, notification channels and TLS certificates.
//!
//! Every secret-bearing entity here follows the two-type discipline: the
//! full struct stays inside the domain layer; tools only ever serialize the
//! `…Masked` projection.

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use super::database::Database;

// ── Destinations ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Destination {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DestinationMasked {
    pub id: String,
    pub name: String,
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key_id_masked: bool,
    pub access_key_id_present: bool,
    pub secret_access_key_masked: bool,
    pub secret_access_key_present: bool,
}

impl From<&Destination> for DestinationMasked {
    fn from(d: &Destination) -> Self {
        Self {
            id: d.id.clone(),
            name: d.name.clone(),
            endpoint: d.endpoint.clone(),
            region: d.region.clone(),
            bucket: d.bucket.clone(),
            access_key_id_masked: true,
            access_key_id_present: !d.access_key_id.is_empty(),
            secret_access_key_masked: true,
            secret_access_key_present: !d.secret_access_key.is_empty(),
        }
    }
}

// ── Registries ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Registry {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub url: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistryMasked {
    pub id: String,
    pub name: String,
    pub url: String,
    pub username: String,
    pub password_masked: bool,
    pub password_present: bool,
}

impl From<&Registry> for RegistryMasked {
    fn from(r: &Registry) -> Self {
        Self {
            id: r.id.clone(),
            name: r.name.clone(),
            url: r.url.clone(),
            username: r.username.clone(),
            password_masked: true,
            password_present: !r.password.is_empty(),
        }
    }
}

// ── Git providers ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct GitProvider {
    pub id: String,
    pub organization_id: String,
    pub kind: String,
    pub name: String,
    pub access_token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GitProviderMasked {
    pub id: String,
    pub kind: String,
    pub name: String,
    pub access_token_masked: bool,
    pub access_token_present: bool,
}

impl From<&GitProvider> for GitProviderMasked {
    fn from(g: &GitProvider) -> Self {
        Self {
            id: g.id.clone(),
            kind: g.kind.clone(),
            name: g.name.clone(),
            access_token_masked: true,
            access_token_present: !g.access_token.is_empty(),
        }
    }
}

// ── Notification channels ────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NotificationChannel {
    pub id: String,
    pub organization_id: String,
    pub kind: String,
    pub name: String,
    pub webhook_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationChannelMasked {
    pub id: String,
    pub kind: String,
    pub name: String,
    pub webhook_url_masked: bool,
    pub webhook_url_present: bool,
}

impl From<&NotificationChannel> for NotificationChannelMasked {
    fn from(n: &NotificationChannel) -> Self {
        Self {
            id: n.id.clone(),
            kind: n.kind.clone(),
            name: n.name.clone(),
            webhook_url_masked: true,
            webhook_url_present: !n.webhook_url.is_empty(),
        }
    }
}

// ── Certificates ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Certificate {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub domain: String,
    pub certificate_data: String,
    pub private_key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CertificateMasked {
    pub id: String,
    pub name: String,
    pub domain: String,
    pub certificate_data_masked: bool,
    pub certificate_data_present: bool,
    pub private_key_masked: bool,
    pub private_key_present: bool,
}

impl From<&Certificate> for CertificateMasked {
    fn from(c: &Certificate) -> Self {
        Self {
            id: c.id.clone(),
            name: c.name.clone(),
            domain: c.domain.clone(),
            certificate_data_masked: true,
            certificate_data_present: !c.certificate_data.is_empty(),
            private_key_masked: true,
            private_key_present: !c.private_key.is_empty(),
        }
    }
}

pub struct IntegrationStore<'a> {
    db: &'a Database,
}

impl<'a> IntegrationStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_destination(
        &self,
        organization_id: &str,
        name: &str,
        endpoint: &str,
        region: &str,
        bucket: &str,
        access_key_id: &str,
        secret_access_key: &str,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.db.conn().execute(
            "INSERT INTO destinations
             (id, organization_id, name, endpoint, region, bucket, access_key_id, secret_access_key, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![id, organization_id, name, endpoint, region, bucket, access_key_id, secret_access_key, now],
        )?;
        Ok(id)
    }

    pub fn get_destination(&self, destination_id: &str) -> Result<Option<Destination>> {
        self.db
            .conn()
            .query_row(
                "SELECT id, organization_id, name, endpoint, region, bucket, access_key_id, secret_access_key
                 FROM destinations WHERE id = ?1",
                [destination_id],
                |row| {
                    Ok(Destination {
                        id: row.get(0)?,
                        organization_id: row.get(1)?,
                        name: row.get(2)?,
                        endpoint: row.get(3)?,
                        region: row.get(4)?,
                        bucket: row.get(5)?,
                        access_key_id: row.get(6)?,
                        secret_access_key: row.get(7)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn list_destinations(&self, organization_id: &str) -> Result<Vec<Destination>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT id, organization_id, name, endpoint, region, bucket, access_key_id, secret_access_key
             FROM destinations WHERE organization_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map([organization_id], |row| {
            Ok(Destination {
                id: row.get(0)?,
                organization_id: row.get(1)?,
                name: row.get(2)?,
                endpoint: row.get(3)?,
                region: row.get(4)?,
                bucket: row.get(5)?,
                access_key_id: row.get(6)?,
                secret_access_key: row.get(7)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn update_destination(
        &self,
        destination_id: &str,
        name: Option<&str>,
        endpoint: Option<&str>,
    ) -> Result<()> {
        if let Some(name) = name {
            self.db.conn().execute(
                "UPDATE destinations SET name = ?1 WHERE id = ?2",
                params![name, destination_id],
            )?;
        }
        if let Some(endpoint) = endpoint {
            self.db.conn().execute(
                "UPDATE destinations SET endpoint = ?1 WHERE id = ?2",
                params![endpoint, destination_id],
            )?;
        }
        Ok(())
    }

    pub fn delete_destination(&self, destination_id: &str) -> Result<()> {
        self.db
            .conn()
            .execute("DELETE FROM destinations WHERE id = ?1", [destination_id])?;
        Ok(())
    }

    pub fn create_registry(
        &self,
        organization_id: &str,
        name: &str,
        url: &str,
        username: &str,
        password: &str,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.db.conn().execute(
            "INSERT INTO registries (id, organization_id, name, url, username, password, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![id, organization_id, name, url, username, password, now],
        )?;
        Ok(id)
    }

    pub fn get_registry(&self, registry_id: &str) -> Result<Option<Registry>> {
        self.db
            .conn()
            .query_row(
                "SELECT id, organization_id, name, url, username, password
                 FROM registries WHERE id = ?1",
                [registry_id],
                |row| {
                    Ok(Registry {
                        id: row.get(0)?,
                        organization_id: row.get(1)?,
                        name: row.get(2)?,
                        url: row.get(3)?,
                        username: row.get(4)?,
                        password: row.get(5)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn list_registries(&self, organization_id: &str) -> Result<Vec<Registry>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT id, organization_id, name, url, username, password
             FROM registries WHERE organization_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map([organization_id], |row| {
            Ok(Registry {
                id: row.get(0)?,
                organization_id: row.get(1)?,
                name: row.get(2)?,
                url: row.get(3)?,
                username: row.get(4)?,
                password: row.get(5)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn update_registry(
        &self,
        registry_id: &str,
        name: Option<&str>,
        password: Option<&str>,
    ) -> Result<()> {
        if let Some(name) = name {
            self.db.conn().execute(
                "UPDATE registries SET name = ?1 WHERE id = ?2",
                params![name, registry_id],
            )?;
        }
        if let Some(password) = password {
            self.db.conn().execute(
                "UPDATE registries SET password = ?1 WHERE id = ?2",
                params![password, registry_id],
            )?;
        }
        Ok(())
    }

    pub fn delete_registry(&self, registry_id: &str) -> Result<()> {
        self.db
            .conn()
            .execute("DELETE FROM registries WHERE id = ?1", [registry_id])?;
        Ok(())
    }

    pub fn create_git_provider(
        &self,
        organization_id: &str,
        kind: &str,
        name: &str,
        access_token: &str,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.db.conn().execute(
            "INSERT INTO git_providers (id, organization_id, kind, name, access_token, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, organization_id, kind, name, access_token, now],
        )?;
        Ok(id)
    }

    pub fn get_git_provider(&self, provider_id: &str) -> Result<Option<GitProvider>> {
        self.db
            .conn()
            .query_row(
                "SELECT id, organization_id, kind, name, access_token
                 FROM git_providers WHERE id = ?1",
                [provider_id],
                |row| {
                    Ok(GitProvider {
                        id: row.get(0)?,
                        organization_id: row.get(1)?,
                        kind: row.get(2)?,
                        name: row.get(3)?,
                        access_token: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn list_git_providers(&self, organization_id: &str) -> Result<Vec<GitProvider>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT id, organization_id, kind, name, access_token
             FROM git_providers WHERE organization_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map([organization_id], |row| {
            Ok(GitProvider {
                id: row.get(0)?,
                organization_id: row.get(1)?,
                kind: row.get(2)?,
                name: row.get(3)?,
                access_token: row.get(4)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn delete_git_provider(&self, provider_id: &str) -> Result<()> {
        self.db
            .conn()
            .execute("DELETE FROM git_providers WHERE id = ?1", [provider_id])?;
        Ok(())
    }

    pub fn create_notification_channel(
        &self,
        organization_id: &str,
        kind: &str,
        name: &str,
        webhook_url: &str,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.db.conn().execute(
            "INSERT INTO notification_channels (id, organization_id, kind, name, webhook_url, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, organization_id, kind, name, webhook_url, now],
        )?;
        Ok(id)
    }

    pub fn get_notification_channel(
        &self,
        channel_id: &str,
    ) -> Result<Option<NotificationChannel>> {
        self.db
            .conn()
            .query_row(
                "SELECT id, organization_id, kind, name, webhook_url
                 FROM notification_channels WHERE id = ?1",
                [channel_id],
                |row| {
                    Ok(NotificationChannel {
                        id: row.get(0)?,
                        organization_id: row.get(1)?,
                        kind: row.get(2)?,
                        name: row.get(3)?,
                        webhook_url: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn list_notification_channels(
        &self,
        organization_id: &str,
    ) -> Result<Vec<NotificationChannel>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT id, organization_id, kind, name, webhook_url
             FROM notification_channels WHERE organization_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map([organization_id], |row| {
            Ok(NotificationChannel {
                id: row.get(0)?,
                organization_id: row.get(1)?,
                kind: row.get(2)?,
                name: row.get(3)?,
                webhook_url: row.get(4)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn update_notification_channel(
        &self,
        channel_id: &str,
        name: Option<&str>,
        webhook_url: Option<&str>,
    ) -> Result<()> {
        if let Some(name) = name {
            self.db.conn().execute(
                "UPDATE notification_channels SET name = ?1 WHERE id = ?2",
                params![name, channel_id],
            )?;
        }
        if let Some(url) = webhook_url {
            self.db.conn().execute(
                "UPDATE notification_channels SET webhook_url = ?1 WHERE id = ?2",
                params![url, channel_id],
            )?;
        }
        Ok(())
    }

    pub fn delete_notification_channel(&self, channel_id: &str) -> Result<()> {
        self.db.conn().execute(
            "DELETE FROM notification_channels WHERE id = ?1",
            [channel_id],
        )?;
        Ok(())
    }

    pub fn create_certificate(
        &self,
        organization_id: &str,
        name: &str,
        domain: &str,
        certificate_data: &str,
        private_key: &str,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.db.conn().execute(
            "INSERT INTO certificates (id, organization_id, name, domain, certificate_data, private_key, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![id, organization_id, name, domain, certificate_data, private_key, now],
        )?;
        Ok(id)
    }

    pub fn get_certificate(&self, certificate_id: &str) -> Result<Option<Certificate>> {
        self.db
            .conn()
            .query_row(
                "SELECT id, organization_id, name, domain, certificate_data, private_key
                 FROM certificates WHERE id = ?1",
                [certificate_id],
                |row| {
                    Ok(Certificate {
                        id: row.get(0)?,
                        organization_id: row.get(1)?,
                        name: row.get(2)?,
                        domain: row.get(3)?,
                        certificate_data: row.get(4)?,
                        private_key: row.get(5)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn list_certificates(&self, organization_id: &str) -> Result<Vec<Certificate>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT id, organization_id, name, domain, certificate_data, private_key
             FROM certificates WHERE organization_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map([organization_id], |row| {
            Ok(Certificate {
                id: row.get(0)?,
                organization_id: row.get(1)?,
                name: row.get(2)?,
                domain: row.get(3)?,
                certificate_data: row.get(4)?,
                private_key: row.get(5)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn delete_certificate(&self, certificate_id: &str) -> Result<()> {
        self.db
            .conn()
            .execute("DELETE FROM certificates WHERE id = ?1", [certificate_id])?;
        Ok(())
    }
}
