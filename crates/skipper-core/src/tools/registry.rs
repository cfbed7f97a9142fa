//! Tool registry and dispatch.
//!
//! The registry is assembled once at boot by the per-domain registration
//! functions and is immutable afterwards; dispatch takes no locks. Every
//! invocation goes through schema validation first, and a tool that fails
//! validation is never entered.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::services::Services;
use crate::storage::Database;
use crate::tools::schema::ParamSchema;

/// Closed set of tool categories advertised to the LM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    Project,
    Environment,
    Application,
    Compose,
    Database,
    Postgres,
    Mysql,
    Mariadb,
    Mongo,
    Redis,
    Server,
    Domain,
    Certificate,
    Backup,
    Github,
    Deployment,
    Settings,
    User,
    Stripe,
}

impl ToolCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Environment => "environment",
            Self::Application => "application",
            Self::Compose => "compose",
            Self::Database => "database",
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
            Self::Mariadb => "mariadb",
            Self::Mongo => "mongo",
            Self::Redis => "redis",
            Self::Server => "server",
            Self::Domain => "domain",
            Self::Certificate => "certificate",
            Self::Backup => "backup",
            Self::Github => "github",
            Self::Deployment => "deployment",
            Self::Settings => "settings",
            Self::User => "user",
            Self::Stripe => "stripe",
        }
    }
}

/// Risk classification surfaced to the approval UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Uniform result envelope returned by every tool.
///
/// `success=true` never carries `error`; transports must forward `error`
/// untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: None,
            error: None,
        }
    }

    pub fn success_data(data: Value) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            error: None,
        }
    }

    pub fn success_with(message: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
            error: Some(error.into()),
        }
    }

    pub fn failure_data(
        message: impl Into<String>,
        error: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: Some(data),
            error: Some(error.into()),
        }
    }

    /// Schema rejection; aggregated field messages in `error`.
    pub fn invalid_parameters(detail: impl Into<String>) -> Self {
        Self::failure("Invalid parameters", detail.into()).tagged("VALIDATION")
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::failure(message, "UNAUTHORIZED")
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::failure(message, "NOT_FOUND")
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::failure(message, "BAD_REQUEST")
    }

    fn tagged(mut self, code: &str) -> Self {
        // VALIDATION keeps the aggregated detail; the identifier goes first.
        self.error = Some(match self.error.take() {
            Some(detail) if !detail.is_empty() => format!("{}: {}", code, detail),
            _ => code.to_string(),
        });
        self
    }
}

/// Deserialize validated params into a typed struct.
pub fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, ToolResult> {
    serde_json::from_value(params)
        .map_err(|e| ToolResult::invalid_parameters(format!("Invalid parameters: {}", e)))
}

/// Authorized identity a tool runs under, plus the capability handles all
/// external effects must go through.
#[derive(Clone)]
pub struct ToolContext {
    pub user_id: String,
    pub organization_id: String,
    pub project_id: Option<String>,
    pub server_id: Option<String>,
    db_path: Arc<PathBuf>,
    pub services: Arc<Services>,
}

impl ToolContext {
    pub fn new(
        user_id: impl Into<String>,
        organization_id: impl Into<String>,
        db_path: Arc<PathBuf>,
        services: Arc<Services>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            organization_id: organization_id.into(),
            project_id: None,
            server_id: None,
            db_path,
            services,
        }
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_server(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = Some(server_id.into());
        self
    }

    /// Open a storage handle for this invocation.
    pub fn db(&self) -> Result<Database> {
        Database::new(&self.db_path)
    }

    pub fn db_path(&self) -> &Arc<PathBuf> {
        &self.db_path
    }
}

/// Trait for tool implementations.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (id), globally unique.
    fn name(&self) -> &'static str;

    /// Tool description for the LM.
    fn description(&self) -> &str;

    fn category(&self) -> ToolCategory;

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Low
    }

    fn requires_approval(&self) -> bool {
        false
    }

    /// Parameter schema; validated by the registry before `execute`.
    fn schema(&self) -> ParamSchema;

    /// Execute with validated parameters. All external effects go through
    /// `ctx`.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult;
}

/// Tool descriptor advertised to the LM.
#[derive(Debug, Clone, Serialize)]
pub struct AdvertisedTool {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub category: ToolCategory,
    pub risk_level: RiskLevel,
    pub requires_approval: bool,
}

/// Verbs that force `high` risk + approval on any tool carrying one as a
/// name segment.
const DESTRUCTIVE_VERBS: &[&str] = &[
    "delete",
    "remove",
    "destroy",
    "purge",
    "uninstall",
    "reset",
    "rotate",
    "revoke",
    "restore",
];

fn has_destructive_segment(name: &str) -> bool {
    name.split('_').any(|seg| DESTRUCTIVE_VERBS.contains(&seg))
}

/// Boot-time registry assembly. Duplicate names and destructive-verb
/// policy violations are fatal.
#[derive(Default)]
pub struct ToolRegistryBuilder {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        if has_destructive_segment(&name)
            && (tool.risk_level() != RiskLevel::High || !tool.requires_approval())
        {
            bail!(
                "tool '{}' carries a destructive verb and must be high-risk with approval",
                name
            );
        }
        if self.tools.insert(name.clone(), tool).is_some() {
            bail!("duplicate tool registration: '{}'", name);
        }
        Ok(())
    }

    pub fn build(self) -> ToolRegistry {
        ToolRegistry { tools: self.tools }
    }
}

/// Immutable, process-wide tool catalog.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// All tools, sorted by name for a deterministic catalog.
    pub fn get_all(&self) -> Vec<&Arc<dyn Tool>> {
        let mut tools: Vec<_> = self.tools.values().collect();
        tools.sort_by_key(|t| t.name());
        tools
    }

    pub fn get_by_category(&self, category: ToolCategory) -> Vec<&Arc<dyn Tool>> {
        let mut tools: Vec<_> = self
            .tools
            .values()
            .filter(|t| t.category() == category)
            .collect();
        tools.sort_by_key(|t| t.name());
        tools
    }

    pub fn advertised(&self) -> Vec<AdvertisedTool> {
        self.get_all()
            .into_iter()
            .map(|t| AdvertisedTool {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.schema().to_json_schema(),
                category: t.category(),
                risk_level: t.risk_level(),
                requires_approval: t.requires_approval(),
            })
            .collect()
    }

    /// Fail closed: unknown tools require approval.
    pub fn requires_approval(&self, name: &str) -> bool {
        self.tools
            .get(name)
            .map(|t| t.requires_approval())
            .unwrap_or(true)
    }

    /// Fail closed: unknown tools are high risk.
    pub fn risk_level(&self, name: &str) -> RiskLevel {
        self.tools
            .get(name)
            .map(|t| t.risk_level())
            .unwrap_or(RiskLevel::High)
    }

    /// Validate and dispatch. Unknown tool and validation failures return
    /// an error envelope without touching any side effect.
    pub async fn execute(&self, name: &str, raw_params: Value, ctx: &ToolContext) -> ToolResult {
        let Some(tool) = self.tools.get(name) else {
            return ToolResult {
                success: false,
                message: Some(format!("Unknown tool: {}", name)),
                data: None,
                error: Some(format!("Unknown tool: {}", name)),
            };
        };

        let validated = match tool.schema().validate(&raw_params) {
            Ok(params) => params,
            Err(detail) => {
                tracing::debug!(tool = name, %detail, "parameter validation failed");
                return ToolResult::invalid_parameters(detail);
            }
        };

        tracing::info!(tool = name, risk = tool.risk_level().as_str(), "executing tool");

        // A panicking tool must not take the dispatcher down with it.
        match std::panic::AssertUnwindSafe(tool.execute(validated, ctx))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let text = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "tool panicked".to_string());
                tracing::error!(tool = name, %text, "tool panicked");
                ToolResult::failure(format!("Tool '{}' failed", name), text)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::schema::Field;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_context() -> ToolContext {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        // Leak the tempdir so the database outlives the helper.
        std::mem::forget(dir);
        ToolContext::new(
            "user-1",
            "org-1",
            Arc::new(path),
            Arc::new(Services::for_tests()),
        )
    }

    static EXECUTIONS: AtomicUsize = AtomicUsize::new(0);

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo validated params"
        }
        fn category(&self) -> ToolCategory {
            ToolCategory::Settings
        }
        fn schema(&self) -> ParamSchema {
            ParamSchema::new().field(Field::string("text", "Text to echo"))
        }
        async fn execute(&self, params: Value, _ctx: &ToolContext) -> ToolResult {
            EXECUTIONS.fetch_add(1, Ordering::SeqCst);
            ToolResult::success_data(params)
        }
    }

    struct PanicTool;

    #[async_trait]
    impl Tool for PanicTool {
        fn name(&self) -> &'static str {
            "panic_probe"
        }
        fn description(&self) -> &str {
            "Always panics"
        }
        fn category(&self) -> ToolCategory {
            ToolCategory::Settings
        }
        fn schema(&self) -> ParamSchema {
            ParamSchema::new()
        }
        async fn execute(&self, _params: Value, _ctx: &ToolContext) -> ToolResult {
            panic!("boom");
        }
    }

    fn registry() -> ToolRegistry {
        let mut builder = ToolRegistryBuilder::new();
        builder.register(Arc::new(EchoTool)).unwrap();
        builder.register(Arc::new(PanicTool)).unwrap();
        builder.build()
    }

    #[tokio::test]
    async fn unknown_tool_returns_error_without_side_effects() {
        let before = EXECUTIONS.load(Ordering::SeqCst);
        let result = registry()
            .execute("nonexistent", json!({}), &test_context())
            .await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Unknown tool: nonexistent"));
        assert_eq!(EXECUTIONS.load(Ordering::SeqCst), before);
    }

    #[tokio::test]
    async fn validation_failure_never_enters_execute() {
        let before = EXECUTIONS.load(Ordering::SeqCst);
        let result = registry()
            .execute("echo", json!({"text": 42}), &test_context())
            .await;
        assert!(!result.success);
        assert_eq!(result.message.as_deref(), Some("Invalid parameters"));
        assert!(result.error.unwrap().contains("text: must be a string"));
        assert_eq!(EXECUTIONS.load(Ordering::SeqCst), before);
    }

    #[tokio::test]
    async fn valid_params_reach_execute() {
        let result = registry()
            .execute("echo", json!({"text": "hi"}), &test_context())
            .await;
        assert!(result.success);
        assert_eq!(result.data.unwrap()["text"], "hi");
    }

    #[tokio::test]
    async fn panic_is_trapped_into_failure_envelope() {
        let result = registry().execute("panic_probe", json!({}), &test_context()).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("boom"));
    }

    #[test]
    fn unknown_names_fail_closed() {
        let reg = registry();
        assert!(reg.requires_approval("does_not_exist"));
        assert_eq!(reg.risk_level("does_not_exist"), RiskLevel::High);
    }

    #[test]
    fn duplicate_registration_is_fatal() {
        let mut builder = ToolRegistryBuilder::new();
        builder.register(Arc::new(EchoTool)).unwrap();
        assert!(builder.register(Arc::new(EchoTool)).is_err());
    }

    struct MisdeclaredDelete;

    #[async_trait]
    impl Tool for MisdeclaredDelete {
        fn name(&self) -> &'static str {
            "widget_delete"
        }
        fn description(&self) -> &str {
            "Deletes a widget but forgot its risk declaration"
        }
        fn category(&self) -> ToolCategory {
            ToolCategory::Settings
        }
        fn schema(&self) -> ParamSchema {
            ParamSchema::new()
        }
        async fn execute(&self, _params: Value, _ctx: &ToolContext) -> ToolResult {
            ToolResult::success("deleted")
        }
    }

    #[test]
    fn destructive_verb_without_high_risk_is_fatal() {
        let mut builder = ToolRegistryBuilder::new();
        let err = builder.register(Arc::new(MisdeclaredDelete)).unwrap_err();
        assert!(err.to_string().contains("destructive verb"));
    }
}
