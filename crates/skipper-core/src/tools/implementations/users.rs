//! User tools. Enumeration is owner-only.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::open_db;
use crate::safety::{require_org_member, require_org_owner};
use crate::storage::OrgStore;
use crate::tools::registry::{parse_params, Tool, ToolCategory, ToolContext, ToolResult};
use crate::tools::schema::{Field, ParamSchema};

pub struct UserListTool;

#[async_trait]
impl Tool for UserListTool {
    fn name(&self) -> &'static str {
        "user_list"
    }
    fn description(&self) -> &str {
        "List members of the organization. Owner only."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::User
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> ToolResult {
        let db = match open_db(ctx) {
            Ok(db) => db,
            Err(e) => return e,
        };
        if let Err(denied) = require_org_owner(&db, ctx) {
            return denied;
        }
        match OrgStore::new(&db).list_users(&ctx.organization_id) {
            Ok(users) => {
                let listed: Vec<Value> = users
                    .into_iter()
                    .map(|(user, role)| {
                        json!({
                            "id": user.id,
                            "email": user.email,
                            "name": user.name,
                            "role": role,
                        })
                    })
                    .collect();
                ToolResult::success_data(json!(listed))
            }
            Err(e) => ToolResult::failure("Failed to list users", e.to_string()),
        }
    }
}

pub struct UserGetTool;

#[derive(Deserialize)]
struct UserIdParams {
    user_id: String,
}

#[async_trait]
impl Tool for UserGetTool {
    fn name(&self) -> &'static str {
        "user_get"
    }
    fn description(&self) -> &str {
        "Get one organization member by id."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::User
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new().field(Field::string("user_id", "User id"))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: UserIdParams = match parse_params(params) {
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

        let store = OrgStore::new(&db);
        // Only members of this organization are visible.
        let membership = match store.get_member(&params.user_id, &ctx.organization_id) {
            Ok(Some(membership)) => membership,
            Ok(None) => return ToolResult::not_found("User not found in this organization"),
            Err(e) => return ToolResult::failure("Failed to load membership", e.to_string()),
        };
        match store.get_user(&params.user_id) {
            Ok(Some(user)) => ToolResult::success_data(json!({
                "id": user.id,
                "email": user.email,
                "name": user.name,
                "role": membership.role,
            })),
            Ok(None) => ToolResult::not_found("User not found"),
            Err(e) => ToolResult::failure("Failed to load user", e.to_string()),
        }
    }
}
