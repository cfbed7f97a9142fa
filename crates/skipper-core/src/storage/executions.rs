//! Pending tool-execution lifecycle.
//!
//! Rows move pending_approval → approved|rejected → executing →
//! completed|failed. Every transition is a small guarded UPDATE whose
//! status precondition makes approval at-most-once.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use dashmap::DashMap;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Notify;

use super::database::Database;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    PendingApproval,
    Approved,
    Rejected,
    Executing,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingApproval => "pending_approval",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "approved" => Self::Approved,
            "rejected" => Self::Rejected,
            "executing" => Self::Executing,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::PendingApproval,
        }
    }

    /// Terminal for the approval decision (not necessarily for the run).
    pub fn is_decided(&self) -> bool {
        !matches!(self, Self::PendingApproval)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolExecution {
    pub id: String,
    pub conversation_id: String,
    pub tool_call_id: String,
    pub tool_name: String,
    pub arguments: Value,
    pub status: ExecutionStatus,
    pub result: Option<Value>,
}

/// Outcome of an approval decision write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionOutcome {
    /// This call performed the transition.
    Applied(ExecutionStatus),
    /// The row was already decided; the prior status is returned.
    AlreadyDecided(ExecutionStatus),
}

pub struct ExecutionStore<'a> {
    db: &'a Database,
}

impl<'a> ExecutionStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn create_pending(
        &self,
        conversation_id: &str,
        tool_call_id: &str,
        tool_name: &str,
        arguments: &Value,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.db.conn().execute(
            "INSERT INTO tool_executions
             (id, conversation_id, tool_call_id, tool_name, arguments, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![id, conversation_id, tool_call_id, tool_name, arguments.to_string(), now],
        )?;
        Ok(id)
    }

    pub fn get(&self, execution_id: &str) -> Result<Option<ToolExecution>> {
        self.db
            .conn()
            .query_row(
                "SELECT id, conversation_id, tool_call_id, tool_name, arguments, status, result
                 FROM tool_executions WHERE id = ?1",
                [execution_id],
                |row| {
                    let arguments: String = row.get(4)?;
                    let result: Option<String> = row.get(6)?;
                    Ok(ToolExecution {
                        id: row.get(0)?,
                        conversation_id: row.get(1)?,
                        tool_call_id: row.get(2)?,
                        tool_name: row.get(3)?,
                        arguments: serde_json::from_str(&arguments).unwrap_or(Value::Null),
                        status: ExecutionStatus::parse(&row.get::<_, String>(5)?),
                        result: result.and_then(|r| serde_json::from_str(&r).ok()),
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn list_by_ids(&self, execution_ids: &[String]) -> Result<Vec<ToolExecution>> {
        let mut out = Vec::with_capacity(execution_ids.len());
        for id in execution_ids {
            if let Some(execution) = self.get(id)? {
                out.push(execution);
            }
        }
        Ok(out)
    }

    /// Record the approval decision. The `status = 'pending_approval'`
    /// precondition makes a second decision a no-op that reports the
    /// earlier terminal state.
    pub fn set_decision(&self, execution_id: &str, approved: bool) -> Result<DecisionOutcome> {
        let target = if approved {
            ExecutionStatus::Approved
        } else {
            ExecutionStatus::Rejected
        };
        let now = Utc::now().to_rfc3339();
        let affected = self.db.conn().execute(
            "UPDATE tool_executions SET status = ?1, updated_at = ?2
             WHERE id = ?3 AND status = 'pending_approval'",
            params![target.as_str(), now, execution_id],
        )?;

        if affected == 1 {
            return Ok(DecisionOutcome::Applied(target));
        }

        let current = self
            .get(execution_id)?
            .map(|e| e.status)
            .ok_or_else(|| anyhow::anyhow!("execution {} not found", execution_id))?;
        Ok(DecisionOutcome::AlreadyDecided(current))
    }

    /// Claim an approved row for execution. Exactly one caller wins.
    pub fn mark_executing(&self, execution_id: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let affected = self.db.conn().execute(
            "UPDATE tool_executions SET status = 'executing', updated_at = ?1
             WHERE id = ?2 AND status = 'approved'",
            params![now, execution_id],
        )?;
        Ok(affected == 1)
    }

    pub fn finish(&self, execution_id: &str, success: bool, result: &Value) -> Result<()> {
        let status = if success {
            ExecutionStatus::Completed
        } else {
            ExecutionStatus::Failed
        };
        let now = Utc::now().to_rfc3339();
        self.db.conn().execute(
            "UPDATE tool_executions SET status = ?1, result = ?2, updated_at = ?3
             WHERE id = ?4 AND status = 'executing'",
            params![status.as_str(), result.to_string(), now, execution_id],
        )?;
        Ok(())
    }
}

/// Process-wide wake-ups for approval transitions, keyed by execution id.
/// The agent loop subscribes before checking status and falls back to a
/// short poll, so a missed notification only costs one poll interval.
#[derive(Default)]
pub struct ExecutionSignals {
    waiters: DashMap<String, Arc<Notify>>,
}

impl ExecutionSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, execution_id: &str) -> Arc<Notify> {
        self.waiters
            .entry(execution_id.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    pub fn notify(&self, execution_id: &str) {
        if let Some(entry) = self.waiters.get(execution_id) {
            entry.notify_waiters();
        }
    }

    pub fn forget(&self, execution_id: &str) {
        self.waiters.remove(execution_id);
    }
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
    fn approval_is_at_most_once() {
        let (db, _dir) = test_db();
        let store = ExecutionStore::new(&db);
        let id = store
            .create_pending("conv-1", "tc-1", "application_deploy", &json!({"application_id": "a-1"}))
            .unwrap();

        let first = store.set_decision(&id, true).unwrap();
        assert_eq!(first, DecisionOutcome::Applied(ExecutionStatus::Approved));

        let second = store.set_decision(&id, false).unwrap();
        assert_eq!(
            second,
            DecisionOutcome::AlreadyDecided(ExecutionStatus::Approved)
        );
    }

    #[test]
    fn executing_claim_is_exclusive() {
        let (db, _dir) = test_db();
        let store = ExecutionStore::new(&db);
        let id = store
            .create_pending("conv-1", "tc-1", "application_deploy", &json!({}))
            .unwrap();
        store.set_decision(&id, true).unwrap();

        assert!(store.mark_executing(&id).unwrap());
        assert!(!store.mark_executing(&id).unwrap());

        store.finish(&id, true, &json!({"success": true})).unwrap();
        let row = store.get(&id).unwrap().unwrap();
        assert_eq!(row.status, ExecutionStatus::Completed);
        assert!(row.result.is_some());
    }

    #[test]
    fn rejected_rows_cannot_execute() {
        let (db, _dir) = test_db();
        let store = ExecutionStore::new(&db);
        let id = store
            .create_pending("conv-1", "tc-1", "project_delete", &json!({}))
            .unwrap();
        store.set_decision(&id, false).unwrap();
        assert!(!store.mark_executing(&id).unwrap());
    }

    #[tokio::test]
    async fn signals_wake_subscribers() {
        let signals = ExecutionSignals::new();
        let notify = signals.subscribe("e-1");

        let waiter = tokio::spawn(async move { notify.notified().await });
        tokio::task::yield_now().await;
        signals.notify("e-1");
        waiter.await.unwrap();
    }
}
