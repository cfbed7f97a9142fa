//! SQLite connection wrapper with schema initialization.

use std::path::Path;

use anyhow::Result;
use rusqlite::Connection;

/// One open SQLite handle. Connections are cheap to open per request;
/// callers hold one for the duration of an invocation.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (creating if needed) the database at `path` and ensure the
    /// schema exists.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS organizations (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS organization_members (
            user_id         TEXT NOT NULL,
            organization_id TEXT NOT NULL,
            role            TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            PRIMARY KEY (user_id, organization_id)
        );

        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            email       TEXT NOT NULL,
            name        TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS org_ai_policies (
            organization_id          TEXT PRIMARY KEY,
            bind_mount_allow_prefixes TEXT NOT NULL DEFAULT '[]',
            updated_at               TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS projects (
            id              TEXT PRIMARY KEY,
            organization_id TEXT NOT NULL,
            name            TEXT NOT NULL,
            description     TEXT,
            created_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_projects_org
            ON projects (organization_id, created_at);

        CREATE TABLE IF NOT EXISTS environments (
            id          TEXT PRIMARY KEY,
            project_id  TEXT NOT NULL,
            name        TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS applications (
            id              TEXT PRIMARY KEY,
            environment_id  TEXT NOT NULL,
            name            TEXT NOT NULL,
            status          TEXT NOT NULL DEFAULT 'idle',
            created_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS compose_stacks (
            id              TEXT PRIMARY KEY,
            environment_id  TEXT NOT NULL,
            name            TEXT NOT NULL,
            status          TEXT NOT NULL DEFAULT 'idle',
            created_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS databases (
            id                TEXT PRIMARY KEY,
            environment_id    TEXT NOT NULL,
            kind              TEXT NOT NULL,
            name              TEXT NOT NULL,
            database_name     TEXT NOT NULL,
            database_user     TEXT NOT NULL,
            database_password TEXT NOT NULL,
            container_id      TEXT,
            status            TEXT NOT NULL DEFAULT 'idle',
            created_at        TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS servers (
            id              TEXT PRIMARY KEY,
            organization_id TEXT NOT NULL,
            name            TEXT NOT NULL,
            ip_address      TEXT NOT NULL,
            port            INTEGER NOT NULL DEFAULT 22,
            username        TEXT NOT NULL DEFAULT 'root',
            ssh_key_id      TEXT,
            status          TEXT NOT NULL DEFAULT 'offline',
            created_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_servers_org
            ON servers (organization_id, created_at);

        CREATE TABLE IF NOT EXISTS ssh_keys (
            id              TEXT PRIMARY KEY,
            organization_id TEXT NOT NULL,
            name            TEXT NOT NULL,
            public_key      TEXT NOT NULL,
            private_key     TEXT NOT NULL,
            created_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_ssh_keys_org
            ON ssh_keys (organization_id, created_at);

        CREATE TABLE IF NOT EXISTS destinations (
            id                 TEXT PRIMARY KEY,
            organization_id    TEXT NOT NULL,
            name               TEXT NOT NULL,
            endpoint           TEXT NOT NULL,
            region             TEXT NOT NULL,
            bucket             TEXT NOT NULL,
            access_key_id      TEXT NOT NULL,
            secret_access_key  TEXT NOT NULL,
            created_at         TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_destinations_org
            ON destinations (organization_id, created_at);

        CREATE TABLE IF NOT EXISTS registries (
            id              TEXT PRIMARY KEY,
            organization_id TEXT NOT NULL,
            name            TEXT NOT NULL,
            url             TEXT NOT NULL,
            username        TEXT NOT NULL,
            password        TEXT NOT NULL,
            created_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_registries_org
            ON registries (organization_id, created_at);

        CREATE TABLE IF NOT EXISTS git_providers (
            id              TEXT PRIMARY KEY,
            organization_id TEXT NOT NULL,
            kind            TEXT NOT NULL,
            name            TEXT NOT NULL,
            access_token    TEXT NOT NULL,
            created_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_git_providers_org
            ON git_providers (organization_id, created_at);

        CREATE TABLE IF NOT EXISTS notification_channels (
            id              TEXT PRIMARY KEY,
            organization_id TEXT NOT NULL,
            kind            TEXT NOT NULL,
            name            TEXT NOT NULL,
            webhook_url     TEXT NOT NULL,
            created_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_notification_channels_org
            ON notification_channels (organization_id, created_at);

        CREATE TABLE IF NOT EXISTS security_rules (
            id             TEXT PRIMARY KEY,
            application_id TEXT NOT NULL,
            username       TEXT NOT NULL,
            password       TEXT NOT NULL,
            created_at     TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS certificates (
            id               TEXT PRIMARY KEY,
            organization_id  TEXT NOT NULL,
            name             TEXT NOT NULL,
            domain           TEXT NOT NULL,
            certificate_data TEXT NOT NULL,
            private_key      TEXT NOT NULL,
            created_at       TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_certificates_org
            ON certificates (organization_id, created_at);

        CREATE TABLE IF NOT EXISTS domains (
            id             TEXT PRIMARY KEY,
            service_type   TEXT NOT NULL,
            service_id     TEXT NOT NULL,
            host           TEXT NOT NULL,
            https          INTEGER NOT NULL DEFAULT 1,
            certificate_id TEXT,
            created_at     TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS ports (
            id             TEXT PRIMARY KEY,
            application_id TEXT NOT NULL,
            published_port INTEGER NOT NULL,
            target_port    INTEGER NOT NULL,
            protocol       TEXT NOT NULL DEFAULT 'tcp',
            created_at     TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS mounts (
            id           TEXT PRIMARY KEY,
            service_type TEXT NOT NULL,
            service_id   TEXT NOT NULL,
            mount_type   TEXT NOT NULL,
            mount_path   TEXT NOT NULL,
            host_path    TEXT,
            volume_name  TEXT,
            file_path    TEXT,
            content      TEXT,
            created_at   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS backups (
            id             TEXT PRIMARY KEY,
            database_id    TEXT NOT NULL,
            destination_id TEXT NOT NULL,
            schedule       TEXT NOT NULL,
            prefix         TEXT NOT NULL DEFAULT '',
            enabled        INTEGER NOT NULL DEFAULT 1,
            created_at     TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS volume_backups (
            id              TEXT PRIMARY KEY,
            service_type    TEXT NOT NULL,
            service_id      TEXT NOT NULL,
            volume_name     TEXT NOT NULL,
            destination_id  TEXT NOT NULL,
            cron_expression TEXT NOT NULL,
            enabled         INTEGER NOT NULL DEFAULT 1,
            created_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS schedules (
            id              TEXT PRIMARY KEY,
            organization_id TEXT NOT NULL,
            target_type     TEXT NOT NULL,
            target_id       TEXT NOT NULL,
            cron_expression TEXT NOT NULL,
            command         TEXT NOT NULL,
            enabled         INTEGER NOT NULL DEFAULT 1,
            created_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_schedules_org
            ON schedules (organization_id, created_at);

        CREATE TABLE IF NOT EXISTS deployments (
            id          TEXT PRIMARY KEY,
            target_type TEXT NOT NULL,
            target_id   TEXT NOT NULL,
            title       TEXT NOT NULL,
            status      TEXT NOT NULL DEFAULT 'running',
            log         TEXT NOT NULL DEFAULT '',
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS ai_bindings (
            id              TEXT PRIMARY KEY,
            organization_id TEXT NOT NULL,
            name            TEXT NOT NULL,
            api_url         TEXT NOT NULL,
            api_key         TEXT NOT NULL,
            model           TEXT NOT NULL,
            enabled         INTEGER NOT NULL DEFAULT 1,
            created_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_ai_bindings_org
            ON ai_bindings (organization_id, created_at);

        CREATE TABLE IF NOT EXISTS conversations (
            id              TEXT PRIMARY KEY,
            owner_user_id   TEXT NOT NULL,
            organization_id TEXT NOT NULL,
            project_id      TEXT,
            server_id       TEXT,
            ai_id           TEXT NOT NULL,
            title           TEXT NOT NULL DEFAULT '',
            created_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_conversations_org
            ON conversations (organization_id, created_at);

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL,
            role            TEXT NOT NULL,
            content         TEXT,
            tool_calls      TEXT,
            status          TEXT NOT NULL DEFAULT 'sent',
            created_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages (conversation_id);

        CREATE TABLE IF NOT EXISTS tool_executions (
            id              TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL,
            tool_call_id    TEXT NOT NULL,
            tool_name       TEXT NOT NULL,
            arguments       TEXT NOT NULL,
            status          TEXT NOT NULL DEFAULT 'pending_approval',
            result          TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_tool_executions_status
            ON tool_executions (status);
        ",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn schema_initializes_idempotently() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");
        let _first = Database::new(&path).unwrap();
        let second = Database::new(&path).unwrap();

        let count: i64 = second
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='tool_executions'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }
}
