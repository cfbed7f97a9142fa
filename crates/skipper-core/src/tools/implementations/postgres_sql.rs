//! Postgres SQL tools: classified read-only queries, DML, and admin SQL.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::open_db;
use super::databases::load_database;
use crate::safety::require_org_member;
use crate::safety::sql::{
    admin_script, contains_meta_command, dml_script, is_dml, is_read_only, read_only_script,
};
use crate::services::CommandOutput;
use crate::tools::registry::{
    parse_params, RiskLevel, Tool, ToolCategory, ToolContext, ToolResult,
};
use crate::tools::schema::{Field, ParamSchema};
use crate::tools::truncation::{clamp_output_chars, truncate_output};

const DEFAULT_MAX_ROWS: i64 = 200;
const DEFAULT_STATEMENT_TIMEOUT_MS: i64 = 10_000;
const MAX_STATEMENT_TIMEOUT_MS: i64 = 600_000;
const META_COMMAND_MESSAGE: &str = "psql meta-commands (\\…) are not allowed";

#[derive(Deserialize)]
struct SqlParams {
    postgres_id: String,
    sql: String,
    max_rows: Option<i64>,
    statement_timeout_ms: Option<i64>,
    max_output_chars: Option<usize>,
    transaction: Option<bool>,
}

fn sql_schema(extra: fn(ParamSchema) -> ParamSchema) -> ParamSchema {
    let base = ParamSchema::new()
        .field(Field::string("postgres_id", "Postgres service id"))
        .field(Field::string("sql", "SQL text to run"))
        .field(
            Field::integer_range(
                "statement_timeout_ms",
                "Per-statement timeout in milliseconds",
                1,
                MAX_STATEMENT_TIMEOUT_MS,
            )
            .optional(),
        )
        .field(
            Field::integer_range(
                "max_output_chars",
                "Cap on returned stdout/stderr characters",
                1,
                200_000,
            )
            .optional(),
        );
    extra(base)
}

/// Run a prepared script and build the truncated output envelope.
async fn run_script(
    ctx: &ToolContext,
    service: &crate::storage::DatabaseService,
    script: String,
    timeout_ms: i64,
    max_output_chars: Option<usize>,
) -> ToolResult {
    let timeout = Duration::from_millis(timeout_ms as u64 + 2_000);
    let output: CommandOutput = match ctx.services.sql.run_script(service, &script, timeout).await {
        Ok(output) => output,
        Err(e) => return ToolResult::failure("SQL execution failed", e.to_string()),
    };

    let limit = clamp_output_chars(max_output_chars);
    let combined = if output.stderr.is_empty() {
        output.stdout.clone()
    } else {
        format!("{}\n{}", output.stdout, output.stderr)
    };
    let truncated = truncate_output(&combined, limit);

    let data = json!({
        "output": truncated.text,
        "exit_code": output.exit_code,
        "script": script,
    });

    if output.exit_code != 0 {
        return ToolResult::failure_data(
            "SQL command exited with an error",
            format!("exit code {}", output.exit_code),
            data,
        );
    }

    let message = match truncated.notice(limit) {
        Some(notice) => format!("SQL executed ({})", notice),
        None => "SQL executed".to_string(),
    };
    ToolResult::success_with(message, data)
}

pub struct PostgresSqlQueryTool;

#[async_trait]
impl Tool for PostgresSqlQueryTool {
    fn name(&self) -> &'static str {
        "postgres_sql_query"
    }
    fn description(&self) -> &str {
        "Run a read-only SQL query (SELECT/WITH/EXPLAIN/SHOW) against a managed Postgres. \
         Wrapped in a read-only transaction with a timeout and an automatic LIMIT; always rolled back."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Postgres
    }
    fn schema(&self) -> ParamSchema {
        sql_schema(|schema| {
            schema.field(
                Field::integer_range("max_rows", "Automatic LIMIT for the query", 1, 10_000)
                    .optional(),
            )
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: SqlParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let db = match open_db(ctx) {
            Ok(db) => db,
            Err(e) => return e,
        };
        if let Err(denied) = require_org_member(&db, ctx) {
            return denied;
        }
        let service = match load_database(&db, ctx, &params.postgres_id) {
            Ok(service) => service,
            Err(denied) => return denied,
        };
        if service.kind != "postgres" {
            return ToolResult::bad_request("Service is not a Postgres database");
        }

        if contains_meta_command(&params.sql) {
            return ToolResult::failure(META_COMMAND_MESSAGE, "BAD_REQUEST");
        }
        if !is_read_only(&params.sql) {
            return ToolResult::bad_request(
                "Only read-only statements (SELECT, WITH, EXPLAIN, SHOW) are accepted here; \
                 use postgres_sql_execute_dml or postgres_sql_execute_admin",
            );
        }

        let max_rows = params.max_rows.unwrap_or(DEFAULT_MAX_ROWS) as u32;
        let timeout_ms = params
            .statement_timeout_ms
            .unwrap_or(DEFAULT_STATEMENT_TIMEOUT_MS);
        let script = read_only_script(&params.sql, max_rows, timeout_ms as u32);
        run_script(ctx, &service, script, timeout_ms, params.max_output_chars).await
    }
}

pub struct PostgresSqlExecuteDmlTool;

#[async_trait]
impl Tool for PostgresSqlExecuteDmlTool {
    fn name(&self) -> &'static str {
        "postgres_sql_execute_dml"
    }
    fn description(&self) -> &str {
        "Run INSERT/UPDATE/DELETE against a managed Postgres inside a transaction with a timeout."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Postgres
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn schema(&self) -> ParamSchema {
        sql_schema(|schema| {
            schema.field(
                Field::boolean("transaction", "Wrap in a transaction (default true)").optional(),
            )
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: SqlParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let db = match open_db(ctx) {
            Ok(db) => db,
            Err(e) => return e,
        };
        if let Err(denied) = require_org_member(&db, ctx) {
            return denied;
        }
        let service = match load_database(&db, ctx, &params.postgres_id) {
            Ok(service) => service,
            Err(denied) => return denied,
        };
        if service.kind != "postgres" {
            return ToolResult::bad_request("Service is not a Postgres database");
        }

        if contains_meta_command(&params.sql) {
            return ToolResult::failure(META_COMMAND_MESSAGE, "BAD_REQUEST");
        }
        if !is_dml(&params.sql) {
            return ToolResult::bad_request(
                "Statement is not DML; read-only queries go to postgres_sql_query, \
                 DDL goes to postgres_sql_execute_admin",
            );
        }

        let timeout_ms = params
            .statement_timeout_ms
            .unwrap_or(DEFAULT_STATEMENT_TIMEOUT_MS);
        let script = dml_script(
            &params.sql,
            timeout_ms as u32,
            params.transaction.unwrap_or(true),
        );
        run_script(ctx, &service, script, timeout_ms, params.max_output_chars).await
    }
}

pub struct PostgresSqlExecuteAdminTool;

#[async_trait]
impl Tool for PostgresSqlExecuteAdminTool {
    fn name(&self) -> &'static str {
        "postgres_sql_execute_admin"
    }
    fn description(&self) -> &str {
        "Run arbitrary admin SQL (DDL included) against a managed Postgres inside a transaction \
         with a timeout. Unclassified and dangerous."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Postgres
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::High
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn schema(&self) -> ParamSchema {
        sql_schema(|schema| schema)
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: SqlParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let db = match open_db(ctx) {
            Ok(db) => db,
            Err(e) => return e,
        };
        if let Err(denied) = require_org_member(&db, ctx) {
            return denied;
        }
        let service = match load_database(&db, ctx, &params.postgres_id) {
            Ok(service) => service,
            Err(denied) => return denied,
        };
        if service.kind != "postgres" {
            return ToolResult::bad_request("Service is not a Postgres database");
        }

        if contains_meta_command(&params.sql) {
            return ToolResult::failure(META_COMMAND_MESSAGE, "BAD_REQUEST");
        }

        let timeout_ms = params
            .statement_timeout_ms
            .unwrap_or(DEFAULT_STATEMENT_TIMEOUT_MS);
        let script = admin_script(&params.sql, timeout_ms as u32);
        run_script(ctx, &service, script, timeout_ms, params.max_output_chars).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::implementations::tests::{seed_context, SeedOptions};

    #[tokio::test]
    async fn query_wraps_in_read_only_transaction_with_auto_limit() {
        let seed = seed_context(SeedOptions::default());
        let result = PostgresSqlQueryTool
            .execute(
                json!({"postgres_id": seed.database_id, "sql": "SELECT * FROM users"}),
                &seed.ctx,
            )
            .await;
        assert!(result.success);
        assert_eq!(
            seed.sql.last_script().unwrap(),
            "BEGIN READ ONLY; SET LOCAL statement_timeout='10000ms'; SELECT * FROM users LIMIT 200; ROLLBACK;"
        );
    }

    #[tokio::test]
    async fn meta_commands_are_rejected_before_execution() {
        let seed = seed_context(SeedOptions::default());
        let result = PostgresSqlQueryTool
            .execute(json!({"postgres_id": seed.database_id, "sql": "\\dt"}), &seed.ctx)
            .await;
        assert!(!result.success);
        assert_eq!(result.message.as_deref(), Some(META_COMMAND_MESSAGE));
        assert!(seed.sql.last_script().is_none());
    }

    #[tokio::test]
    async fn dml_tool_rejects_non_dml() {
        let seed = seed_context(SeedOptions::default());
        let result = PostgresSqlExecuteDmlTool
            .execute(
                json!({"postgres_id": seed.database_id, "sql": "SELECT 1"}),
                &seed.ctx,
            )
            .await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("BAD_REQUEST"));
    }

    #[tokio::test]
    async fn query_rejects_dml() {
        let seed = seed_context(SeedOptions::default());
        let result = PostgresSqlQueryTool
            .execute(
                json!({"postgres_id": seed.database_id, "sql": "DELETE FROM users"}),
                &seed.ctx,
            )
            .await;
        assert!(!result.success);
        assert!(seed.sql.last_script().is_none());
    }

    #[tokio::test]
    async fn long_output_is_truncated_with_notice() {
        let seed = seed_context(SeedOptions::default());
        seed.sql.set_stdout(&"x".repeat(500));
        let result = PostgresSqlQueryTool
            .execute(
                json!({
                    "postgres_id": seed.database_id,
                    "sql": "SELECT * FROM big",
                    "max_output_chars": 100,
                }),
                &seed.ctx,
            )
            .await;
        assert!(result.success);
        assert!(result.message.unwrap().contains("truncated to 100 chars"));
        let output = result.data.unwrap()["output"].as_str().unwrap().to_string();
        assert!(output.contains("…(truncated to 100 chars)"));
    }
}
