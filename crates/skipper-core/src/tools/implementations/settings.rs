//! Organization settings tools: the bind-mount allowlist and
//! per-application security rules.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::applications::load_application;
use super::open_db;
use crate::safety::{ensure_org_binding, normalize_posix_path, require_org_member, require_org_owner};
use crate::storage::{AppStore, OrgStore, SecurityRuleMasked};
use crate::tools::registry::{
    parse_params, RiskLevel, Tool, ToolCategory, ToolContext, ToolResult,
};
use crate::tools::schema::{Field, ParamSchema};

pub struct AllowlistGetTool;

#[async_trait]
impl Tool for AllowlistGetTool {
    fn name(&self) -> &'static str {
        "org_bind_mount_allowlist_get"
    }
    fn description(&self) -> &str {
        "Show the host-path prefixes bind mounts may point under."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Settings
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
        match OrgStore::new(&db).bind_mount_allow_prefixes(&ctx.organization_id) {
            Ok(prefixes) => ToolResult::success_data(json!({"allow_prefixes": prefixes})),
            Err(e) => ToolResult::failure("Failed to load allowlist", e.to_string()),
        }
    }
}

pub struct AllowlistUpdateTool;

#[derive(Deserialize)]
struct AllowlistUpdateParams {
    add_prefixes: Option<Vec<String>>,
    remove_prefixes: Option<Vec<String>>,
}

#[async_trait]
impl Tool for AllowlistUpdateTool {
    fn name(&self) -> &'static str {
        "org_bind_mount_allowlist_update"
    }
    fn description(&self) -> &str {
        "Add or remove allowed bind-mount host-path prefixes. Owner only."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Settings
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::High
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string_array("add_prefixes", "POSIX path prefixes to allow").optional())
            .field(
                Field::string_array("remove_prefixes", "POSIX path prefixes to remove").optional(),
            )
            .field(Field::literal(
                "confirm",
                "CONFIRM_ALLOWLIST_CHANGE",
                "Type CONFIRM_ALLOWLIST_CHANGE to confirm",
            ))
            .at_least_one_of(&["add_prefixes", "remove_prefixes"])
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: AllowlistUpdateParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let db = match open_db(ctx) {
            Ok(db) => db,
            Err(e) => return e,
        };
        if let Err(denied) = require_org_owner(&db, ctx) {
            return denied;
        }

        let store = OrgStore::new(&db);
        let mut prefixes = match store.bind_mount_allow_prefixes(&ctx.organization_id) {
            Ok(prefixes) => prefixes,
            Err(e) => return ToolResult::failure("Failed to load allowlist", e.to_string()),
        };

        for prefix in params.add_prefixes.unwrap_or_default() {
            let normalized = normalize_posix_path(&prefix);
            if !normalized.starts_with('/') {
                return ToolResult::bad_request(format!(
                    "Prefix '{}' is not an absolute POSIX path",
                    prefix
                ));
            }
            if !prefixes.contains(&normalized) {
                prefixes.push(normalized);
            }
        }
        for prefix in params.remove_prefixes.unwrap_or_default() {
            let normalized = normalize_posix_path(&prefix);
            prefixes.retain(|p| p != &normalized);
        }

        match store.set_bind_mount_allow_prefixes(&ctx.organization_id, &prefixes) {
            Ok(()) => ToolResult::success_with(
                "Allowlist updated",
                json!({"allow_prefixes": prefixes}),
            ),
            Err(e) => ToolResult::failure("Failed to update allowlist", e.to_string()),
        }
    }
}

pub struct SecurityRuleListTool;

#[derive(Deserialize)]
struct SecurityRuleListParams {
    application_id: String,
}

#[async_trait]
impl Tool for SecurityRuleListTool {
    fn name(&self) -> &'static str {
        "security_rule_list"
    }
    fn description(&self) -> &str {
        "List basic-auth security rules of an application. Passwords are masked."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Settings
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new().field(Field::string("application_id", "Application id"))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: SecurityRuleListParams = match parse_params(params) {
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
        let application = match load_application(&db, ctx, &params.application_id) {
            Ok(application) => application,
            Err(denied) => return denied,
        };
        match AppStore::new(&db).list_security_rules(&application.id) {
            Ok(rules) => {
                let masked: Vec<SecurityRuleMasked> =
                    rules.iter().map(SecurityRuleMasked::from).collect();
                ToolResult::success_data(json!(masked))
            }
            Err(e) => ToolResult::failure("Failed to list security rules", e.to_string()),
        }
    }
}

pub struct SecurityRuleCreateTool;

#[derive(Deserialize)]
struct SecurityRuleCreateParams {
    application_id: String,
    username: String,
    password: String,
}

#[async_trait]
impl Tool for SecurityRuleCreateTool {
    fn name(&self) -> &'static str {
        "security_rule_create"
    }
    fn description(&self) -> &str {
        "Add a basic-auth rule to an application."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Settings
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("application_id", "Application id"))
            .field(Field::string("username", "Basic-auth username"))
            .field(Field::string("password", "Basic-auth password"))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: SecurityRuleCreateParams = match parse_params(params) {
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
        let application = match load_application(&db, ctx, &params.application_id) {
            Ok(application) => application,
            Err(denied) => return denied,
        };
        match AppStore::new(&db).create_security_rule(
            &application.id,
            &params.username,
            &params.password,
        ) {
            Ok(rule_id) => ToolResult::success_with(
                "Security rule created",
                json!({"security_rule_id": rule_id}),
            ),
            Err(e) => ToolResult::failure("Failed to create security rule", e.to_string()),
        }
    }
}

pub struct SecurityRuleRevealTool;

#[derive(Deserialize)]
struct SecurityRuleIdParams {
    security_rule_id: String,
}

#[async_trait]
impl Tool for SecurityRuleRevealTool {
    fn name(&self) -> &'static str {
        "security_rule_reveal"
    }
    fn description(&self) -> &str {
        "Reveal the plaintext password of a security rule. Gated behind \
         approval and an explicit confirm."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Settings
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::High
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("security_rule_id", "Security rule id"))
            .field(Field::literal(
                "confirm",
                "REVEAL_SECURITY_RULE",
                "Type REVEAL_SECURITY_RULE to confirm revealing the password",
            ))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: SecurityRuleIdParams = match parse_params(params) {
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

        let rule = match AppStore::new(&db).get_security_rule(&params.security_rule_id) {
            Ok(Some(rule)) => rule,
            Ok(None) => return ToolResult::not_found("Security rule not found"),
            Err(e) => return ToolResult::failure("Failed to load security rule", e.to_string()),
        };
        if let Err(denied) = ensure_org_binding(
            ctx,
            &rule.organization_id,
            json!({
                "id": null,
                "username": null,
                "password_masked": true,
                "password_present": false,
            }),
        ) {
            return denied;
        }

        ToolResult::success_with(
            "Security rule revealed",
            json!({
                "security_rule_id": rule.id,
                "username": rule.username,
                "password": rule.password,
            }),
        )
    }
}

pub struct SecurityRuleDeleteTool;

#[async_trait]
impl Tool for SecurityRuleDeleteTool {
    fn name(&self) -> &'static str {
        "security_rule_delete"
    }
    fn description(&self) -> &str {
        "Delete a basic-auth rule from an application."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Settings
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::High
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("security_rule_id", "Security rule id"))
            .field(Field::literal(
                "confirm",
                "CONFIRM_DELETE",
                "Type CONFIRM_DELETE to confirm the deletion",
            ))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: SecurityRuleIdParams = match parse_params(params) {
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

        let store = AppStore::new(&db);
        let rule = match store.get_security_rule(&params.security_rule_id) {
            Ok(Some(rule)) => rule,
            Ok(None) => return ToolResult::not_found("Security rule not found"),
            Err(e) => return ToolResult::failure("Failed to load security rule", e.to_string()),
        };
        if let Err(denied) = ensure_org_binding(ctx, &rule.organization_id, json!({})) {
            return denied;
        }

        match store.delete_security_rule(&rule.id) {
            Ok(()) => ToolResult::success("Security rule deleted"),
            Err(e) => ToolResult::failure("Failed to delete security rule", e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::OrgRole;
    use crate::tools::implementations::tests::{seed_context, SeedOptions};

    #[tokio::test]
    async fn allowlist_update_is_owner_only() {
        let seed = seed_context(SeedOptions { role: OrgRole::Member });
        let result = AllowlistUpdateTool
            .execute(
                json!({"add_prefixes": ["/srv"], "confirm": "CONFIRM_ALLOWLIST_CHANGE"}),
                &seed.ctx,
            )
            .await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("UNAUTHORIZED"));
    }

    #[tokio::test]
    async fn allowlist_add_then_remove_roundtrip() {
        let seed = seed_context(SeedOptions::default());

        let added = AllowlistUpdateTool
            .execute(
                json!({"add_prefixes": ["/srv/data/", "/var//lib/skipper"], "confirm": "CONFIRM_ALLOWLIST_CHANGE"}),
                &seed.ctx,
            )
            .await;
        assert!(added.success);
        let prefixes = added.data.unwrap()["allow_prefixes"].clone();
        assert_eq!(prefixes, json!(["/srv/data", "/var/lib/skipper"]));

        let removed = AllowlistUpdateTool
            .execute(
                json!({"remove_prefixes": ["/srv/data"], "confirm": "CONFIRM_ALLOWLIST_CHANGE"}),
                &seed.ctx,
            )
            .await;
        assert_eq!(
            removed.data.unwrap()["allow_prefixes"],
            json!(["/var/lib/skipper"])
        );
    }

    #[tokio::test]
    async fn relative_prefix_is_rejected() {
        let seed = seed_context(SeedOptions::default());
        let result = AllowlistUpdateTool
            .execute(
                json!({"add_prefixes": ["relative/path"], "confirm": "CONFIRM_ALLOWLIST_CHANGE"}),
                &seed.ctx,
            )
            .await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("BAD_REQUEST"));
    }
}
