//! Domain, certificate and port tools.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::applications::load_application;
use super::open_db;
use crate::safety::{ensure_org_binding, require_org_member};
use crate::storage::{AppStore, CertificateMasked, Database, IntegrationStore, NetworkStore};
use crate::tools::registry::{
    parse_params, RiskLevel, Tool, ToolCategory, ToolContext, ToolResult,
};
use crate::tools::schema::{Field, ParamSchema};

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

// ── Domains ──────────────────────────────────────────────────────────

pub struct DomainListTool;

#[derive(Deserialize)]
struct DomainListParams {
    service_type: String,
    service_id: String,
}

#[async_trait]
impl Tool for DomainListTool {
    fn name(&self) -> &'static str {
        "domain_list"
    }
    fn description(&self) -> &str {
        "List domains attached to a service."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Domain
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
        let params: DomainListParams = match parse_params(params) {
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
        match NetworkStore::new(&db).list_domains(&params.service_type, &params.service_id) {
            Ok(domains) => ToolResult::success_data(json!(domains)),
            Err(e) => ToolResult::failure("Failed to list domains", e.to_string()),
        }
    }
}

pub struct DomainCreateTool;

#[derive(Deserialize)]
struct DomainCreateParams {
    service_type: String,
    service_id: String,
    host: String,
    https: Option<bool>,
    certificate_id: Option<String>,
}

#[async_trait]
impl Tool for DomainCreateTool {
    fn name(&self) -> &'static str {
        "domain_create"
    }
    fn description(&self) -> &str {
        "Attach a domain to a service."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Domain
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::enumeration(
                "service_type",
                &["application", "compose"],
                "Owning service type",
            ))
            .field(Field::string("service_id", "Owning service id"))
            .field(Field::string("host", "Fully qualified host name"))
            .field(Field::boolean("https", "Serve over HTTPS (default true)").optional())
            .field(Field::string("certificate_id", "Use this certificate").optional())
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: DomainCreateParams = match parse_params(params) {
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

        if let Some(certificate_id) = &params.certificate_id {
            match IntegrationStore::new(&db).get_certificate(certificate_id) {
                Ok(Some(cert)) => {
                    if let Err(denied) = ensure_org_binding(ctx, &cert.organization_id, json!({})) {
                        return denied;
                    }
                }
                Ok(None) => return ToolResult::not_found("Certificate not found"),
                Err(e) => return ToolResult::failure("Failed to load certificate", e.to_string()),
            }
        }

        match NetworkStore::new(&db).create_domain(
            &params.service_type,
            &params.service_id,
            &params.host,
            params.https.unwrap_or(true),
            params.certificate_id.as_deref(),
        ) {
            Ok(domain_id) => ToolResult::success_with(
                format!("Domain '{}' attached", params.host),
                json!({"domain_id": domain_id}),
            ),
            Err(e) => ToolResult::failure("Failed to create domain", e.to_string()),
        }
    }
}

pub struct DomainDeleteTool;

#[derive(Deserialize)]
struct DomainIdParams {
    domain_id: String,
}

#[async_trait]
impl Tool for DomainDeleteTool {
    fn name(&self) -> &'static str {
        "domain_delete"
    }
    fn description(&self) -> &str {
        "Detach a domain from its service."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Domain
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::High
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("domain_id", "Domain id"))
            .field(Field::literal(
                "confirm",
                "CONFIRM_DELETE",
                "Type CONFIRM_DELETE to confirm the deletion",
            ))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: DomainIdParams = match parse_params(params) {
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

        let store = NetworkStore::new(&db);
        let domain = match store.get_domain(&params.domain_id) {
            Ok(Some(domain)) => domain,
            Ok(None) => return ToolResult::not_found("Domain not found"),
            Err(e) => return ToolResult::failure("Failed to load domain", e.to_string()),
        };
        if let Err(denied) = ensure_service(&db, ctx, &domain.service_type, &domain.service_id) {
            return denied;
        }

        match store.delete_domain(&domain.id) {
            Ok(()) => ToolResult::success(format!("Domain '{}' removed", domain.host)),
            Err(e) => ToolResult::failure("Failed to delete domain", e.to_string()),
        }
    }
}

// ── Certificates ─────────────────────────────────────────────────────

pub struct CertificateListTool;

#[async_trait]
impl Tool for CertificateListTool {
    fn name(&self) -> &'static str {
        "certificate_list"
    }
    fn description(&self) -> &str {
        "List TLS certificates of the organization. Key material is masked."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Certificate
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
        match IntegrationStore::new(&db).list_certificates(&ctx.organization_id) {
            Ok(certs) => {
                let masked: Vec<CertificateMasked> =
                    certs.iter().map(CertificateMasked::from).collect();
                ToolResult::success_data(json!(masked))
            }
            Err(e) => ToolResult::failure("Failed to list certificates", e.to_string()),
        }
    }
}

pub struct CertificateCreateTool;

#[derive(Deserialize)]
struct CertificateCreateParams {
    name: String,
    domain: String,
    certificate_data: String,
    private_key: String,
}

#[async_trait]
impl Tool for CertificateCreateTool {
    fn name(&self) -> &'static str {
        "certificate_create"
    }
    fn description(&self) -> &str {
        "Store a TLS certificate for the organization."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Certificate
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("name", "Certificate display name"))
            .field(Field::string("domain", "Domain the certificate covers"))
            .field(Field::string("certificate_data", "PEM certificate chain"))
            .field(Field::string("private_key", "PEM private key"))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: CertificateCreateParams = match parse_params(params) {
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
        match IntegrationStore::new(&db).create_certificate(
            &ctx.organization_id,
            &params.name,
            &params.domain,
            &params.certificate_data,
            &params.private_key,
        ) {
            Ok(certificate_id) => ToolResult::success_with(
                format!("Certificate '{}' stored", params.name),
                json!({"certificate_id": certificate_id}),
            ),
            Err(e) => ToolResult::failure("Failed to store certificate", e.to_string()),
        }
    }
}

pub struct CertificateDeleteTool;

#[derive(Deserialize)]
struct CertificateIdParams {
    certificate_id: String,
}

#[async_trait]
impl Tool for CertificateDeleteTool {
    fn name(&self) -> &'static str {
        "certificate_delete"
    }
    fn description(&self) -> &str {
        "Delete a stored TLS certificate."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Certificate
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::High
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("certificate_id", "Certificate id"))
            .field(Field::literal(
                "confirm",
                "CONFIRM_DELETE",
                "Type CONFIRM_DELETE to confirm the deletion",
            ))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: CertificateIdParams = match parse_params(params) {
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

        let store = IntegrationStore::new(&db);
        let certificate = match store.get_certificate(&params.certificate_id) {
            Ok(Some(certificate)) => certificate,
            Ok(None) => return ToolResult::not_found("Certificate not found"),
            Err(e) => return ToolResult::failure("Failed to load certificate", e.to_string()),
        };
        if let Err(denied) = ensure_org_binding(ctx, &certificate.organization_id, json!({})) {
            return denied;
        }

        match store.delete_certificate(&certificate.id) {
            Ok(()) => ToolResult::success(format!("Certificate '{}' deleted", certificate.name)),
            Err(e) => ToolResult::failure("Failed to delete certificate", e.to_string()),
        }
    }
}

// ── Ports ────────────────────────────────────────────────────────────

pub struct PortListTool;

#[derive(Deserialize)]
struct PortListParams {
    application_id: String,
}

#[async_trait]
impl Tool for PortListTool {
    fn name(&self) -> &'static str {
        "port_list"
    }
    fn description(&self) -> &str {
        "List published ports of an application."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Application
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new().field(Field::string("application_id", "Application id"))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: PortListParams = match parse_params(params) {
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
        match NetworkStore::new(&db).list_ports(&application.id) {
            Ok(ports) => ToolResult::success_data(json!(ports)),
            Err(e) => ToolResult::failure("Failed to list ports", e.to_string()),
        }
    }
}

pub struct PortCreateTool;

#[derive(Deserialize)]
struct PortCreateParams {
    application_id: String,
    published_port: u16,
    target_port: u16,
    protocol: Option<String>,
}

#[async_trait]
impl Tool for PortCreateTool {
    fn name(&self) -> &'static str {
        "port_create"
    }
    fn description(&self) -> &str {
        "Publish a container port of an application."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Application
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("application_id", "Application id"))
            .field(Field::integer_range(
                "published_port",
                "Port exposed on the host",
                1,
                65535,
            ))
            .field(Field::integer_range(
                "target_port",
                "Port inside the container",
                1,
                65535,
            ))
            .field(Field::enumeration("protocol", &["tcp", "udp"], "Protocol (default tcp)").optional())
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: PortCreateParams = match parse_params(params) {
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
        match NetworkStore::new(&db).create_port(
            &application.id,
            params.published_port,
            params.target_port,
            params.protocol.as_deref().unwrap_or("tcp"),
        ) {
            Ok(port_id) => ToolResult::success_with(
                format!(
                    "Port {}→{} published",
                    params.published_port, params.target_port
                ),
                json!({"port_id": port_id}),
            ),
            Err(e) => ToolResult::failure("Failed to create port", e.to_string()),
        }
    }
}

pub struct PortDeleteTool;

#[derive(Deserialize)]
struct PortIdParams {
    port_id: String,
}

#[async_trait]
impl Tool for PortDeleteTool {
    fn name(&self) -> &'static str {
        "port_delete"
    }
    fn description(&self) -> &str {
        "Remove a published port from an application."
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
            .field(Field::string("port_id", "Port id"))
            .field(Field::literal(
                "confirm",
                "CONFIRM_DELETE",
                "Type CONFIRM_DELETE to confirm the deletion",
            ))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: PortIdParams = match parse_params(params) {
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

        let store = NetworkStore::new(&db);
        let port = match store.get_port(&params.port_id) {
            Ok(Some(port)) => port,
            Ok(None) => return ToolResult::not_found("Port not found"),
            Err(e) => return ToolResult::failure("Failed to load port", e.to_string()),
        };
        if let Err(denied) = load_application(&db, ctx, &port.application_id).map(|_| ()) {
            return denied;
        }

        match store.delete_port(&port.id) {
            Ok(()) => ToolResult::success("Port removed"),
            Err(e) => ToolResult::failure("Failed to delete port", e.to_string()),
        }
    }
}
