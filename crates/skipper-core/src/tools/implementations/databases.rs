//! Managed database tools (create per engine, lifecycle, listing).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::open_db;
use crate::safety::{ensure_org_binding, require_org_member};
use crate::storage::{
    Database, DatabaseService, DatabaseServiceMasked, DatabaseServiceStore, ProjectStore,
};
use crate::tools::registry::{
    parse_params, RiskLevel, Tool, ToolCategory, ToolContext, ToolResult,
};
use crate::tools::schema::{Field, ParamSchema};

/// Load a database service and enforce its org binding. The masked shape
/// is returned on mismatch so credentials never leak.
pub(super) fn load_database(
    db: &Database,
    ctx: &ToolContext,
    database_id: &str,
) -> Result<DatabaseService, ToolResult> {
    let service = match DatabaseServiceStore::new(db).get(database_id) {
        Ok(Some(service)) => service,
        Ok(None) => return Err(ToolResult::not_found("Database not found")),
        Err(e) => return Err(ToolResult::failure("Failed to load database", e.to_string())),
    };
    ensure_org_binding(
        ctx,
        &service.organization_id,
        json!({
            "id": null,
            "kind": null,
            "name": null,
            "database_password_masked": true,
            "database_password_present": false,
        }),
    )?;
    Ok(service)
}

pub struct DatabaseListTool;

#[async_trait]
impl Tool for DatabaseListTool {
    fn name(&self) -> &'static str {
        "database_list"
    }
    fn description(&self) -> &str {
        "List all managed databases in the current organization. Credentials are masked."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Database
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> ToolResult {
        let db = match open_db(ctx) {
            Ok(db) => db,
            Err(e) => return e,
        };
        if let Err(denied) = require_org_member(&db, ctx) {
            return denied;
        }
        match DatabaseServiceStore::new(&db).list(&ctx.organization_id) {
            Ok(services) => {
                let masked: Vec<DatabaseServiceMasked> =
                    services.iter().map(DatabaseServiceMasked::from).collect();
                ToolResult::success_data(json!(masked))
            }
            Err(e) => ToolResult::failure("Failed to list databases", e.to_string()),
        }
    }
}

pub struct DatabaseGetTool;

#[derive(Deserialize)]
struct DatabaseIdParams {
    database_id: String,
}

#[async_trait]
impl Tool for DatabaseGetTool {
    fn name(&self) -> &'static str {
        "database_get"
    }
    fn description(&self) -> &str {
        "Get one managed database by id. Credentials are masked."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Database
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new().field(Field::string("database_id", "Database id"))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: DatabaseIdParams = match parse_params(params) {
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
        match load_database(&db, ctx, &params.database_id) {
            Ok(service) => ToolResult::success_data(json!(DatabaseServiceMasked::from(&service))),
            Err(denied) => denied,
        }
    }
}

/// Shared implementation behind the per-engine create tools.
struct CreateDatabase {
    kind: &'static str,
}

#[derive(Deserialize)]
struct DatabaseCreateParams {
    environment_id: String,
    name: String,
    database_name: String,
    database_user: String,
    database_password: String,
}

impl CreateDatabase {
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("environment_id", "Environment id"))
            .field(Field::string("name", "Service display name"))
            .field(Field::string("database_name", "Name of the initial database"))
            .field(Field::string("database_user", "Database user"))
            .field(Field::string("database_password", "Database password"))
    }

    async fn run(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: DatabaseCreateParams = match parse_params(params) {
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

        let environment = match ProjectStore::new(&db).get_environment(&params.environment_id) {
            Ok(Some(environment)) => environment,
            Ok(None) => return ToolResult::not_found("Environment not found"),
            Err(e) => return ToolResult::failure("Failed to load environment", e.to_string()),
        };
        if let Err(denied) = ensure_org_binding(ctx, &environment.organization_id, json!({})) {
            return denied;
        }

        match DatabaseServiceStore::new(&db).create(
            &environment.id,
            self.kind,
            &params.name,
            &params.database_name,
            &params.database_user,
            &params.database_password,
        ) {
            Ok(database_id) => ToolResult::success_with(
                format!("{} service '{}' created", self.kind, params.name),
                json!({"database_id": database_id, "kind": self.kind}),
            ),
            Err(e) => ToolResult::failure("Failed to create database", e.to_string()),
        }
    }
}

macro_rules! create_tool {
    ($tool:ident, $name:literal, $kind:literal, $category:expr, $desc:literal) => {
        pub struct $tool;

        #[async_trait]
        impl Tool for $tool {
            fn name(&self) -> &'static str {
                $name
            }
            fn description(&self) -> &str {
                $desc
            }
            fn category(&self) -> ToolCategory {
                $category
            }
            fn risk_level(&self) -> RiskLevel {
                RiskLevel::Medium
            }
            fn requires_approval(&self) -> bool {
                true
            }
            fn schema(&self) -> ParamSchema {
                CreateDatabase { kind: $kind }.schema()
            }
            async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
                CreateDatabase { kind: $kind }.run(params, ctx).await
            }
        }
    };
}

create_tool!(
    PostgresCreateTool,
    "postgres_create",
    "postgres",
    ToolCategory::Postgres,
    "Create a managed PostgreSQL service in an environment."
);
create_tool!(
    MysqlCreateTool,
    "mysql_create",
    "mysql",
    ToolCategory::Mysql,
    "Create a managed MySQL service in an environment."
);
create_tool!(
    MariadbCreateTool,
    "mariadb_create",
    "mariadb",
    ToolCategory::Mariadb,
    "Create a managed MariaDB service in an environment."
);
create_tool!(
    MongoCreateTool,
    "mongo_create",
    "mongo",
    ToolCategory::Mongo,
    "Create a managed MongoDB service in an environment."
);
create_tool!(
    RedisCreateTool,
    "redis_create",
    "redis",
    ToolCategory::Redis,
    "Create a managed Redis service in an environment."
);

async fn set_status(params: Value, ctx: &ToolContext, status: &str, verb: &str) -> ToolResult {
    let params: DatabaseIdParams = match parse_params(params) {
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
    let service = match load_database(&db, ctx, &params.database_id) {
        Ok(service) => service,
        Err(denied) => return denied,
    };
    match DatabaseServiceStore::new(&db).set_status(&service.id, status) {
        Ok(()) => ToolResult::success_with(
            format!("Database '{}' {}", service.name, verb),
            json!({"database_id": service.id, "status": status}),
        ),
        Err(e) => ToolResult::failure("Failed to change database state", e.to_string()),
    }
}

pub struct DatabaseStartTool;

#[async_trait]
impl Tool for DatabaseStartTool {
    fn name(&self) -> &'static str {
        "database_start"
    }
    fn description(&self) -> &str {
        "Start a stopped managed database."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Database
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new().field(Field::string("database_id", "Database id"))
    }
    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        set_status(params, ctx, "running", "started").await
    }
}

pub struct DatabaseStopTool;

#[async_trait]
impl Tool for DatabaseStopTool {
    fn name(&self) -> &'static str {
        "database_stop"
    }
    fn description(&self) -> &str {
        "Stop a running managed database."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Database
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new().field(Field::string("database_id", "Database id"))
    }
    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        set_status(params, ctx, "stopped", "stopped").await
    }
}

pub struct DatabaseRestartTool;

#[derive(Deserialize)]
struct DatabaseRestartParams {
    database_id: String,
}

#[async_trait]
impl Tool for DatabaseRestartTool {
    fn name(&self) -> &'static str {
        "database_restart"
    }
    fn description(&self) -> &str {
        "Restart a managed database's container."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Database
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("database_id", "Database id"))
            .field(Field::literal(
                "confirm",
                "RESTART_CONTAINER",
                "Type RESTART_CONTAINER to confirm the restart",
            ))
    }
    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: DatabaseRestartParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        set_status(json!({"database_id": params.database_id}), ctx, "running", "restarted").await
    }
}

pub struct DatabaseDeleteTool;

#[async_trait]
impl Tool for DatabaseDeleteTool {
    fn name(&self) -> &'static str {
        "database_delete"
    }
    fn description(&self) -> &str {
        "Delete a managed database and its data. Irreversible."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Database
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::High
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("database_id", "Database id"))
            .field(Field::literal(
                "confirm",
                "CONFIRM_DELETE",
                "Type CONFIRM_DELETE to confirm the deletion",
            ))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: DatabaseIdParams = match parse_params(params) {
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
        let service = match load_database(&db, ctx, &params.database_id) {
            Ok(service) => service,
            Err(denied) => return denied,
        };
        match DatabaseServiceStore::new(&db).delete(&service.id) {
            Ok(()) => ToolResult::success(format!("Database '{}' deleted", service.name)),
            Err(e) => ToolResult::failure("Failed to delete database", e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::implementations::tests::{seed_context, SeedOptions};

    #[tokio::test]
    async fn list_masks_credentials() {
        let seed = seed_context(SeedOptions::default());
        let result = DatabaseListTool.execute(json!({}), &seed.ctx).await;
        assert!(result.success);
        let serialized = serde_json::to_string(&result).unwrap();
        assert!(!serialized.contains(&seed.database_password));
        assert!(serialized.contains("database_password_masked"));
    }

    #[tokio::test]
    async fn per_engine_create_tools_tag_the_kind() {
        let seed = seed_context(SeedOptions::default());
        let result = RedisCreateTool
            .execute(
                json!({
                    "environment_id": seed.environment_id,
                    "name": "cache",
                    "database_name": "0",
                    "database_user": "default",
                    "database_password": "cache-secret",
                }),
                &seed.ctx,
            )
            .await;
        assert!(result.success);
        assert_eq!(result.data.unwrap()["kind"], "redis");
    }
}
