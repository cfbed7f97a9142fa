//! Server fleet and SSH key tools.

use async_trait::async_trait;
use base64::Engine;
use ed25519_dalek::pkcs8::EncodePrivateKey;
use pkcs8::LineEnding;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use serde::Deserialize;
use serde_json::{json, Value};

use super::open_db;
use crate::safety::{ensure_org_binding, require_org_member};
use crate::storage::{Database, Server, ServerStore, SshKey, SshKeyMasked};
use crate::tools::registry::{
    parse_params, RiskLevel, Tool, ToolCategory, ToolContext, ToolResult,
};
use crate::tools::schema::{Field, ParamSchema};

fn load_server(db: &Database, ctx: &ToolContext, server_id: &str) -> Result<Server, ToolResult> {
    let server = match ServerStore::new(db).get(server_id) {
        Ok(Some(server)) => server,
        Ok(None) => return Err(ToolResult::not_found("Server not found")),
        Err(e) => return Err(ToolResult::failure("Failed to load server", e.to_string())),
    };
    ensure_org_binding(ctx, &server.organization_id, json!({}))?;
    Ok(server)
}

fn load_ssh_key(db: &Database, ctx: &ToolContext, key_id: &str) -> Result<SshKey, ToolResult> {
    let key = match ServerStore::new(db).get_ssh_key(key_id) {
        Ok(Some(key)) => key,
        Ok(None) => return Err(ToolResult::not_found("SSH key not found")),
        Err(e) => return Err(ToolResult::failure("Failed to load SSH key", e.to_string())),
    };
    ensure_org_binding(
        ctx,
        &key.organization_id,
        json!({
            "id": null,
            "name": null,
            "private_key_masked": true,
            "private_key_present": false,
        }),
    )?;
    Ok(key)
}

/// OpenSSH wire encoding of an ed25519 public key.
fn openssh_public_key(key: &SigningKey, comment: &str) -> String {
    let public = key.verifying_key();
    let mut wire: Vec<u8> = Vec::new();
    for field in [b"ssh-ed25519" as &[u8], public.as_bytes()] {
        wire.extend_from_slice(&(field.len() as u32).to_be_bytes());
        wire.extend_from_slice(field);
    }
    format!(
        "ssh-ed25519 {} {}",
        base64::engine::general_purpose::STANDARD.encode(wire),
        comment
    )
}

pub struct ServerListTool;

#[async_trait]
impl Tool for ServerListTool {
    fn name(&self) -> &'static str {
        "server_list"
    }
    fn description(&self) -> &str {
        "List servers of the organization."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Server
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
        match ServerStore::new(&db).list(&ctx.organization_id) {
            Ok(servers) => ToolResult::success_data(json!(servers)),
            Err(e) => ToolResult::failure("Failed to list servers", e.to_string()),
        }
    }
}

pub struct ServerGetTool;

#[derive(Deserialize)]
struct ServerIdParams {
    server_id: String,
}

#[async_trait]
impl Tool for ServerGetTool {
    fn name(&self) -> &'static str {
        "server_get"
    }
    fn description(&self) -> &str {
        "Get one server by id."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Server
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new().field(Field::string("server_id", "Server id"))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: ServerIdParams = match parse_params(params) {
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
        match load_server(&db, ctx, &params.server_id) {
            Ok(server) => ToolResult::success_data(json!(server)),
            Err(denied) => denied,
        }
    }
}

pub struct ServerCreateTool;

#[derive(Deserialize)]
struct ServerCreateParams {
    name: String,
    ip_address: String,
    port: Option<u16>,
    username: Option<String>,
    ssh_key_id: Option<String>,
}

#[async_trait]
impl Tool for ServerCreateTool {
    fn name(&self) -> &'static str {
        "server_create"
    }
    fn description(&self) -> &str {
        "Register a remote server in the fleet."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Server
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("name", "Server display name"))
            .field(Field::string("ip_address", "Reachable IP address"))
            .field(Field::integer_range("port", "SSH port (default 22)", 1, 65535).optional())
            .field(Field::string("username", "SSH user (default root)").optional())
            .field(Field::string("ssh_key_id", "SSH key to connect with").optional())
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: ServerCreateParams = match parse_params(params) {
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

        if let Some(key_id) = &params.ssh_key_id {
            if let Err(denied) = load_ssh_key(&db, ctx, key_id) {
                return denied;
            }
        }

        match ServerStore::new(&db).create(
            &ctx.organization_id,
            &params.name,
            &params.ip_address,
            params.port.unwrap_or(22),
            params.username.as_deref().unwrap_or("root"),
            params.ssh_key_id.as_deref(),
        ) {
            Ok(server_id) => ToolResult::success_with(
                format!("Server '{}' registered", params.name),
                json!({"server_id": server_id}),
            ),
            Err(e) => ToolResult::failure("Failed to create server", e.to_string()),
        }
    }
}

pub struct ServerDeleteTool;

#[async_trait]
impl Tool for ServerDeleteTool {
    fn name(&self) -> &'static str {
        "server_delete"
    }
    fn description(&self) -> &str {
        "Remove a server from the fleet. Workloads on it are not migrated."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Server
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::High
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("server_id", "Server id"))
            .field(Field::literal(
                "confirm",
                "CONFIRM_DELETE",
                "Type CONFIRM_DELETE to confirm the deletion",
            ))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: ServerIdParams = match parse_params(params) {
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
        let server = match load_server(&db, ctx, &params.server_id) {
            Ok(server) => server,
            Err(denied) => return denied,
        };
        match ServerStore::new(&db).delete(&server.id) {
            Ok(()) => ToolResult::success(format!("Server '{}' removed", server.name)),
            Err(e) => ToolResult::failure("Failed to delete server", e.to_string()),
        }
    }
}

pub struct ServerSetupMonitoringTool;

#[derive(Deserialize)]
struct ServerMonitoringParams {
    server_id: String,
}

#[async_trait]
impl Tool for ServerSetupMonitoringTool {
    fn name(&self) -> &'static str {
        "server_setup_monitoring"
    }
    fn description(&self) -> &str {
        "Install the monitoring agent on a server."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Server
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("server_id", "Server id"))
            .field(Field::literal(
                "confirm",
                "SETUP_MONITORING",
                "Type SETUP_MONITORING to confirm installing the agent",
            ))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: ServerMonitoringParams = match parse_params(params) {
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
        let server = match load_server(&db, ctx, &params.server_id) {
            Ok(server) => server,
            Err(denied) => return denied,
        };

        if let Err(e) = ctx.services.deployer.trigger("monitoring", &server.id).await {
            return ToolResult::failure("Failed to start monitoring setup", e.to_string());
        }
        ToolResult::success_with(
            format!("Monitoring setup started on '{}'", server.name),
            json!({"server_id": server.id}),
        )
    }
}

pub struct SshKeyListTool;

#[async_trait]
impl Tool for SshKeyListTool {
    fn name(&self) -> &'static str {
        "ssh_key_list"
    }
    fn description(&self) -> &str {
        "List SSH keys of the organization. Private keys are masked."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Server
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
        match ServerStore::new(&db).list_ssh_keys(&ctx.organization_id) {
            Ok(keys) => {
                let masked: Vec<SshKeyMasked> = keys.iter().map(SshKeyMasked::from).collect();
                ToolResult::success_data(json!(masked))
            }
            Err(e) => ToolResult::failure("Failed to list SSH keys", e.to_string()),
        }
    }
}

pub struct SshKeyGenerateTool;

#[derive(Deserialize)]
struct SshKeyGenerateParams {
    name: String,
}

#[async_trait]
impl Tool for SshKeyGenerateTool {
    fn name(&self) -> &'static str {
        "ssh_key_generate"
    }
    fn description(&self) -> &str {
        "Generate a new ed25519 SSH key pair for the organization. The public \
         key is returned; the private key stays stored and masked."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Server
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::High
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("name", "Key display name"))
            .field(Field::literal(
                "confirm",
                "CONFIRM_SSH_KEY_GENERATE",
                "Type CONFIRM_SSH_KEY_GENERATE to confirm",
            ))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: SshKeyGenerateParams = match parse_params(params) {
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

        let signing = SigningKey::generate(&mut OsRng);
        let private_pem = match signing.to_pkcs8_pem(LineEnding::LF) {
            Ok(pem) => pem.to_string(),
            Err(e) => return ToolResult::failure("Failed to encode private key", e.to_string()),
        };
        let public_key = openssh_public_key(&signing, &params.name);

        match ServerStore::new(&db).create_ssh_key(
            &ctx.organization_id,
            &params.name,
            &public_key,
            &private_pem,
        ) {
            Ok(key_id) => ToolResult::success_with(
                format!("SSH key '{}' generated", params.name),
                json!({"ssh_key_id": key_id, "public_key": public_key}),
            ),
            Err(e) => ToolResult::failure("Failed to store SSH key", e.to_string()),
        }
    }
}

pub struct SshKeyRevealTool;

#[derive(Deserialize)]
struct SshKeyIdParams {
    ssh_key_id: String,
}

#[async_trait]
impl Tool for SshKeyRevealTool {
    fn name(&self) -> &'static str {
        "ssh_key_reveal"
    }
    fn description(&self) -> &str {
        "Reveal the plaintext private key of a stored SSH key. Dangerous; \
         gated behind approval and an explicit confirm."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Server
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::High
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("ssh_key_id", "SSH key id"))
            .field(Field::literal(
                "confirm",
                "REVEAL_SSH_KEY",
                "Type REVEAL_SSH_KEY to confirm revealing the private key",
            ))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: SshKeyIdParams = match parse_params(params) {
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
        let key = match load_ssh_key(&db, ctx, &params.ssh_key_id) {
            Ok(key) => key,
            Err(denied) => return denied,
        };
        ToolResult::success_with(
            format!("Private key of '{}' revealed", key.name),
            json!({
                "ssh_key_id": key.id,
                "public_key": key.public_key,
                "private_key": key.private_key,
            }),
        )
    }
}

pub struct SshKeyDeleteTool;

#[async_trait]
impl Tool for SshKeyDeleteTool {
    fn name(&self) -> &'static str {
        "ssh_key_delete"
    }
    fn description(&self) -> &str {
        "Delete a stored SSH key."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Server
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::High
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("ssh_key_id", "SSH key id"))
            .field(Field::literal(
                "confirm",
                "CONFIRM_DELETE",
                "Type CONFIRM_DELETE to confirm the deletion",
            ))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: SshKeyIdParams = match parse_params(params) {
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
        let key = match load_ssh_key(&db, ctx, &params.ssh_key_id) {
            Ok(key) => key,
            Err(denied) => return denied,
        };
        match ServerStore::new(&db).delete_ssh_key(&key.id) {
            Ok(()) => ToolResult::success(format!("SSH key '{}' deleted", key.name)),
            Err(e) => ToolResult::failure("Failed to delete SSH key", e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::implementations::tests::{seed_context, SeedOptions};

    #[tokio::test]
    async fn generated_key_is_masked_in_listings_and_revealable() {
        let seed = seed_context(SeedOptions::default());
        let generated = SshKeyGenerateTool
            .execute(
                json!({"name": "deploy", "confirm": "CONFIRM_SSH_KEY_GENERATE"}),
                &seed.ctx,
            )
            .await;
        assert!(generated.success);
        let data = generated.data.unwrap();
        let key_id = data["ssh_key_id"].as_str().unwrap().to_string();
        assert!(data["public_key"].as_str().unwrap().starts_with("ssh-ed25519 "));
        // The generation result itself never returns the private key.
        assert!(data.get("private_key").is_none());

        let listed = SshKeyListTool.execute(json!({}), &seed.ctx).await;
        let listed_json = serde_json::to_string(&listed).unwrap();
        assert!(!listed_json.contains("PRIVATE KEY"));

        let revealed = SshKeyRevealTool
            .execute(
                json!({"ssh_key_id": key_id, "confirm": "REVEAL_SSH_KEY"}),
                &seed.ctx,
            )
            .await;
        assert!(revealed.success);
        assert!(revealed.data.unwrap()["private_key"]
            .as_str()
            .unwrap()
            .contains("PRIVATE KEY"));
    }
}
