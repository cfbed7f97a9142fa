//! Mount tools. Bind mounts are gated by the per-organization host-path
//! allowlist; rejections carry a remediation payload the agent loop can
//! replay.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::open_db;
use crate::safety::{
    ensure_org_binding, is_path_allowed, remediation_steps, require_org_member,
};
use crate::storage::{AppStore, Database, Mount, MountStore, NewMount, OrgStore};
use crate::tools::registry::{
    parse_params, RiskLevel, Tool, ToolCategory, ToolContext, ToolResult,
};
use crate::tools::schema::{Field, ParamSchema};

const CONFIRM: &str = "CONFIRM_MOUNT_CHANGE";

fn ensure_service(
    db: &Database,
    ctx: &ToolContext,
    service_type: &str,
    service_id: &str,
) -> Result<(), ToolResult> {
    match AppStore::new(db).service_org(service_type, service_id) {
        Ok(Some(org)) => ensure_org_binding(ctx, &org, json!({})),
        Ok(None) => Err(ToolResult::not_found("Service not found")),
        Err(e) => Err(ToolResult::failure("Failed to resolve service", e.to_string())),
    }
}

fn load_mount(db: &Database, ctx: &ToolContext, mount_id: &str) -> Result<Mount, ToolResult> {
    let mount = match MountStore::new(db).get(mount_id) {
        Ok(Some(mount)) => mount,
        Ok(None) => return Err(ToolResult::not_found("Mount not found")),
        Err(e) => return Err(ToolResult::failure("Failed to load mount", e.to_string())),
    };
    ensure_service(db, ctx, &mount.service_type, &mount.service_id)?;
    Ok(mount)
}

pub struct MountListTool;

#[derive(Deserialize)]
struct MountListParams {
    service_type: String,
    service_id: String,
}

#[async_trait]
impl Tool for MountListTool {
    fn name(&self) -> &'static str {
        "mount_list"
    }
    fn description(&self) -> &str {
        "List mounts of a service."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Application
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::enumeration(
                "service_type",
                &["application", "compose"],
                "Owning service type",
            ))
            .field(Field::string("service_id", "Owning service id"))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: MountListParams = match parse_params(params) {
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
        if let Err(denied) = ensure_service(&db, ctx, &params.service_type, &params.service_id) {
            return denied;
        }
        match MountStore::new(&db).list(&params.service_type, &params.service_id) {
            Ok(mounts) => ToolResult::success_data(json!(mounts)),
            Err(e) => ToolResult::failure("Failed to list mounts", e.to_string()),
        }
    }
}

pub struct MountCreateTool;

#[derive(Deserialize)]
struct MountCreateParams {
    service_type: String,
    service_id: String,
    #[serde(rename = "type")]
    mount_type: String,
    mount_path: String,
    host_path: Option<String>,
    volume_name: Option<String>,
    file_path: Option<String>,
    content: Option<String>,
    apply: Option<bool>,
}

#[async_trait]
impl Tool for MountCreateTool {
    fn name(&self) -> &'static str {
        "mount_create"
    }
    fn description(&self) -> &str {
        "Add a bind, volume or file mount to a service. Bind mounts must point \
         under an allowlisted host path; set apply=true to redeploy the service."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Application
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::High
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::enumeration(
                "service_type",
                &["application", "compose"],
                "Owning service type",
            ))
            .field(Field::string("service_id", "Owning service id"))
            .field(Field::enumeration(
                "type",
                &["bind", "volume", "file"],
                "Mount kind",
            ))
            .field(Field::string("mount_path", "Path inside the container"))
            .field(Field::string("host_path", "Host path (bind mounts)").optional())
            .field(Field::string("volume_name", "Volume name (volume mounts)").optional())
            .field(Field::string("file_path", "Relative file path (file mounts)").optional())
            .field(Field::string("content", "File content (file mounts)").optional())
            .field(Field::boolean("apply", "Redeploy the service after creating").optional())
            .field(Field::literal(
                "confirm",
                CONFIRM,
                "Type CONFIRM_MOUNT_CHANGE to confirm",
            ))
            .refine("bind mounts require host_path, volume mounts volume_name, file mounts file_path", |params| {
                let mount_type = params.get("type").and_then(|t| t.as_str()).unwrap_or("");
                let has = |key: &str| params.get(key).and_then(|v| v.as_str()).map(|s| !s.is_empty()).unwrap_or(false);
                match mount_type {
                    "bind" if !has("host_path") => Err("host_path is required for bind mounts".into()),
                    "volume" if !has("volume_name") => Err("volume_name is required for volume mounts".into()),
                    "file" if !has("file_path") => Err("file_path is required for file mounts".into()),
                    _ => Ok(()),
                }
            })
    }

    async fn execute(&self, params_raw: Value, ctx: &ToolContext) -> ToolResult {
        let params: MountCreateParams = match parse_params(params_raw.clone()) {
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
        if let Err(denied) = ensure_service(&db, ctx, &params.service_type, &params.service_id) {
            return denied;
        }

        if params.mount_type == "bind" {
            let host_path = params.host_path.as_deref().unwrap_or_default();
            let prefixes = match OrgStore::new(&db).bind_mount_allow_prefixes(&ctx.organization_id)
            {
                Ok(prefixes) => prefixes,
                Err(e) => return ToolResult::failure("Failed to load allowlist", e.to_string()),
            };
            if !is_path_allowed(&prefixes, host_path) {
                return ToolResult::failure_data(
                    format!(
                        "Host path '{}' is not under any allowlisted prefix",
                        host_path
                    ),
                    "BAD_REQUEST",
                    json!({
                        "allow_prefixes": prefixes,
                        "suggested_next_steps":
                            remediation_steps(host_path, "mount_create", &params_raw),
                    }),
                );
            }
        }

        let mount_id = match MountStore::new(&db).create(&NewMount {
            service_type: &params.service_type,
            service_id: &params.service_id,
            mount_type: &params.mount_type,
            mount_path: &params.mount_path,
            host_path: params.host_path.as_deref(),
            volume_name: params.volume_name.as_deref(),
            file_path: params.file_path.as_deref(),
            content: params.content.as_deref(),
        }) {
            Ok(id) => id,
            Err(e) => return ToolResult::failure("Failed to create mount", e.to_string()),
        };

        let mut applied = false;
        if params.apply.unwrap_or(false) {
            if let Err(e) = ctx
                .services
                .deployer
                .trigger(&params.service_type, &params.service_id)
                .await
            {
                return ToolResult::failure_data(
                    "Mount created but redeploy failed",
                    e.to_string(),
                    json!({"mount_id": mount_id}),
                );
            }
            applied = true;
        }

        ToolResult::success_with(
            "Mount created",
            json!({"mount_id": mount_id, "applied": applied}),
        )
    }
}

pub struct MountUpdateTool;

#[derive(Deserialize)]
struct MountUpdateParams {
    mount_id: String,
    mount_path: String,
}

#[async_trait]
impl Tool for MountUpdateTool {
    fn name(&self) -> &'static str {
        "mount_update"
    }
    fn description(&self) -> &str {
        "Change the container path of a mount."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Application
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::High
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("mount_id", "Mount id"))
            .field(Field::string("mount_path", "New path inside the container"))
            .field(Field::literal(
                "confirm",
                CONFIRM,
                "Type CONFIRM_MOUNT_CHANGE to confirm",
            ))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: MountUpdateParams = match parse_params(params) {
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
        let mount = match load_mount(&db, ctx, &params.mount_id) {
            Ok(mount) => mount,
            Err(denied) => return denied,
        };
        match MountStore::new(&db).update_mount_path(&mount.id, &params.mount_path) {
            Ok(()) => ToolResult::success("Mount updated"),
            Err(e) => ToolResult::failure("Failed to update mount", e.to_string()),
        }
    }
}

pub struct MountDeleteTool;

#[derive(Deserialize)]
struct MountDeleteParams {
    mount_id: String,
}

#[async_trait]
impl Tool for MountDeleteTool {
    fn name(&self) -> &'static str {
        "mount_delete"
    }
    fn description(&self) -> &str {
        "Remove a mount from a service."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Application
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::High
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("mount_id", "Mount id"))
            .field(Field::literal(
                "confirm",
                CONFIRM,
                "Type CONFIRM_MOUNT_CHANGE to confirm",
            ))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: MountDeleteParams = match parse_params(params) {
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
        let mount = match load_mount(&db, ctx, &params.mount_id) {
            Ok(mount) => mount,
            Err(denied) => return denied,
        };
        match MountStore::new(&db).delete(&mount.id) {
            Ok(()) => ToolResult::success("Mount deleted"),
            Err(e) => ToolResult::failure("Failed to delete mount", e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::implementations::tests::{seed_context, SeedOptions};

    #[tokio::test]
    async fn rejected_bind_mount_suggests_remediation_and_creates_nothing() {
        let seed = seed_context(SeedOptions::default());
        {
            let db = seed.db();
            OrgStore::new(&db)
                .set_bind_mount_allow_prefixes(
                    &seed.org_id,
                    &["/var/lib/skipper".to_string()],
                )
                .unwrap();
        }

        let params = json!({
            "service_type": "application",
            "service_id": seed.application_id,
            "type": "bind",
            "mount_path": "/data",
            "host_path": "/srv/foo",
            "confirm": CONFIRM,
        });
        let result = MountCreateTool.execute(params.clone(), &seed.ctx).await;

        assert!(!result.success);
        let data = result.data.unwrap();
        let steps = &data["suggested_next_steps"];
        assert_eq!(steps[0]["tool"], "org_bind_mount_allowlist_update");
        assert_eq!(steps[0]["params"]["add_prefixes"][0], "/srv/foo");
        assert_eq!(steps[1]["tool"], "mount_create");
        assert_eq!(steps[1]["params"]["host_path"], "/srv/foo");

        let db = seed.db();
        assert!(MountStore::new(&db)
            .list("application", &seed.application_id)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn allowlisted_bind_mount_with_apply_triggers_redeploy() {
        let seed = seed_context(SeedOptions::default());
        {
            let db = seed.db();
            OrgStore::new(&db)
                .set_bind_mount_allow_prefixes(&seed.org_id, &["/srv".to_string()])
                .unwrap();
        }

        let result = MountCreateTool
            .execute(
                json!({
                    "service_type": "application",
                    "service_id": seed.application_id,
                    "type": "bind",
                    "mount_path": "/data",
                    "host_path": "/srv/foo",
                    "apply": true,
                    "confirm": CONFIRM,
                }),
                &seed.ctx,
            )
            .await;

        assert!(result.success);
        assert_eq!(result.data.unwrap()["applied"], true);
        assert_eq!(seed.deployer.trigger_count(), 1);
    }

    #[test]
    fn volume_mount_without_volume_name_fails_refinement() {
        let err = MountCreateTool
            .schema()
            .validate(&json!({
                "service_type": "application",
                "service_id": "app-1",
                "type": "volume",
                "mount_path": "/data",
                "confirm": CONFIRM,
            }))
            .unwrap_err();
        assert!(err.contains("volume_name is required"));
    }
}
