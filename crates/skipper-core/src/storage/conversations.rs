//! Conversations and their append-only message log.

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use serde_json::Value;

use super::database::Database;

#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub id: String,
    pub owner_user_id: String,
    pub organization_id: String,
    pub project_id: Option<String>,
    pub server_id: Option<String>,
    pub ai_id: String,
    pub title: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: String,
    pub content: Option<String>,
    pub tool_calls: Option<Value>,
    pub status: String,
    pub created_at: String,
}

pub struct ConversationStore<'a> {
    db: &'a Database,
}

impl<'a> ConversationStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn create(
        &self,
        owner_user_id: &str,
        organization_id: &str,
        ai_id: &str,
        project_id: Option<&str>,
        server_id: Option<&str>,
        title: &str,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.db.conn().execute(
            "INSERT INTO conversations
             (id, owner_user_id, organization_id, project_id, server_id, ai_id, title, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![id, owner_user_id, organization_id, project_id, server_id, ai_id, title, now],
        )?;
        Ok(id)
    }

    pub fn get(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        self.db
            .conn()
            .query_row(
                "SELECT id, owner_user_id, organization_id, project_id, server_id, ai_id, title, created_at
                 FROM conversations WHERE id = ?1",
                [conversation_id],
                Self::conversation_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn list_for_user(&self, owner_user_id: &str, organization_id: &str) -> Result<Vec<Conversation>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT id, owner_user_id, organization_id, project_id, server_id, ai_id, title, created_at
             FROM conversations
             WHERE owner_user_id = ?1 AND organization_id = ?2
             ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![owner_user_id, organization_id], Self::conversation_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Org-wide enumeration for owner audit.
    pub fn list_for_org(&self, organization_id: &str) -> Result<Vec<Conversation>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT id, owner_user_id, organization_id, project_id, server_id, ai_id, title, created_at
             FROM conversations WHERE organization_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([organization_id], Self::conversation_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn delete(&self, conversation_id: &str) -> Result<()> {
        self.db
            .conn()
            .execute("DELETE FROM messages WHERE conversation_id = ?1", [conversation_id])?;
        self.db.conn().execute(
            "DELETE FROM tool_executions WHERE conversation_id = ?1",
            [conversation_id],
        )?;
        self.db
            .conn()
            .execute("DELETE FROM conversations WHERE id = ?1", [conversation_id])?;
        Ok(())
    }

    /// Append a message; the log is ordered by insertion.
    pub fn append_message(
        &self,
        conversation_id: &str,
        role: &str,
        content: Option<&str>,
        tool_calls: Option<&Value>,
        status: &str,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let tool_calls_json = tool_calls.map(|v| v.to_string());
        self.db.conn().execute(
            "INSERT INTO messages (id, conversation_id, role, content, tool_calls, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![id, conversation_id, role, content, tool_calls_json, status, now],
        )?;
        Ok(id)
    }

    pub fn update_message_content(&self, message_id: &str, content: &str) -> Result<()> {
        self.db.conn().execute(
            "UPDATE messages SET content = ?1 WHERE id = ?2",
            params![content, message_id],
        )?;
        Ok(())
    }

    pub fn update_message_tool_calls(&self, message_id: &str, tool_calls: &Value) -> Result<()> {
        self.db.conn().execute(
            "UPDATE messages SET tool_calls = ?1 WHERE id = ?2",
            params![tool_calls.to_string(), message_id],
        )?;
        Ok(())
    }

    pub fn set_message_status(&self, message_id: &str, status: &str) -> Result<()> {
        self.db.conn().execute(
            "UPDATE messages SET status = ?1 WHERE id = ?2",
            params![status, message_id],
        )?;
        Ok(())
    }

    /// Messages in append order.
    pub fn list_messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT id, conversation_id, role, content, tool_calls, status, created_at
             FROM messages WHERE conversation_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map([conversation_id], |row| {
            let tool_calls: Option<String> = row.get(4)?;
            Ok(StoredMessage {
                id: row.get(0)?,
                conversation_id: row.get(1)?,
                role: row.get(2)?,
                content: row.get(3)?,
                tool_calls: tool_calls.and_then(|t| serde_json::from_str(&t).ok()),
                status: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn conversation_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
        Ok(Conversation {
            id: row.get(0)?,
            owner_user_id: row.get(1)?,
            organization_id: row.get(2)?,
            project_id: row.get(3)?,
            server_id: row.get(4)?,
            ai_id: row.get(5)?,
            title: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

/// Derive a short conversation title from the first user message.
pub fn title_from_content(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return "New conversation".to_string();
    }
    let mut title: String = trimmed.chars().take(64).collect();
    if trimmed.chars().count() > 64 {
        title.push('…');
    }
    title
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn test_db() -> (Database, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = Database::new(&dir.path().join("test.db")).unwrap();
        (db, dir)
    }

    #[test]
    fn messages_preserve_append_order() {
        let (db, _dir) = test_db();
        let store = ConversationStore::new(&db);
        let conv = store
            .create("user-1", "org-1", "ai-1", None, None, "t")
            .unwrap();

        store.append_message(&conv, "user", Some("one"), None, "sent").unwrap();
        store
            .append_message(
                &conv,
                "assistant",
                Some("two"),
                Some(&json!([{"id": "tc-1", "function": {"name": "project_list", "arguments": "{}"}}])),
                "sent",
            )
            .unwrap();
        store.append_message(&conv, "tool", Some("three"), None, "sent").unwrap();

        let messages = store.list_messages(&conv).unwrap();
        let contents: Vec<_> = messages.iter().filter_map(|m| m.content.as_deref()).collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
        assert!(messages[1].tool_calls.is_some());
    }

    #[test]
    fn delete_cascades_to_messages_and_executions() {
        let (db, _dir) = test_db();
        let store = ConversationStore::new(&db);
        let conv = store
            .create("user-1", "org-1", "ai-1", None, None, "t")
            .unwrap();
        store.append_message(&conv, "user", Some("hi"), None, "sent").unwrap();

        store.delete(&conv).unwrap();
        assert!(store.get(&conv).unwrap().is_none());
        assert!(store.list_messages(&conv).unwrap().is_empty());
    }

    #[test]
    fn title_is_clipped() {
        assert_eq!(title_from_content("  hello  "), "hello");
        let long = "x".repeat(100);
        let title = title_from_content(&long);
        assert!(title.ends_with('…'));
    }
}
