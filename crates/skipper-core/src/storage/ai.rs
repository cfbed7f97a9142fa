//! Configured LM bindings.

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use super::database::Database;

/// Full LM binding; `api_key` stays inside the model provider.
#[derive(Debug, Clone)]
pub struct AiBinding {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AiBindingMasked {
    pub id: String,
    pub name: String,
    pub api_url: String,
    pub api_key_masked: bool,
    pub api_key_present: bool,
    pub model: String,
    pub enabled: bool,
}

impl From<&AiBinding> for AiBindingMasked {
    fn from(b: &AiBinding) -> Self {
        Self {
            id: b.id.clone(),
            name: b.name.clone(),
            api_url: b.api_url.clone(),
            api_key_masked: true,
            api_key_present: !b.api_key.is_empty(),
            model: b.model.clone(),
            enabled: b.enabled,
        }
    }
}

pub struct AiBindingStore<'a> {
    db: &'a Database,
}

impl<'a> AiBindingStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn create(
        &self,
        organization_id: &str,
        name: &str,
        api_url: &str,
        api_key: &str,
        model: &str,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.db.conn().execute(
            "INSERT INTO ai_bindings (id, organization_id, name, api_url, api_key, model, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![id, organization_id, name, api_url, api_key, model, now],
        )?;
        Ok(id)
    }

    pub fn get(&self, ai_id: &str) -> Result<Option<AiBinding>> {
        self.db
            .conn()
            .query_row(
                "SELECT id, organization_id, name, api_url, api_key, model, enabled
                 FROM ai_bindings WHERE id = ?1",
                [ai_id],
                |row| {
                    Ok(AiBinding {
                        id: row.get(0)?,
                        organization_id: row.get(1)?,
                        name: row.get(2)?,
                        api_url: row.get(3)?,
                        api_key: row.get(4)?,
                        model: row.get(5)?,
                        enabled: row.get(6)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn list(&self, organization_id: &str) -> Result<Vec<AiBinding>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT id, organization_id, name, api_url, api_key, model, enabled
             FROM ai_bindings WHERE organization_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map([organization_id], |row| {
            Ok(AiBinding {
                id: row.get(0)?,
                organization_id: row.get(1)?,
                name: row.get(2)?,
                api_url: row.get(3)?,
                api_key: row.get(4)?,
                model: row.get(5)?,
                enabled: row.get(6)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}
