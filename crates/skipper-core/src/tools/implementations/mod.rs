//! Domain tool catalog.
//!
//! One module per domain; every module's tools are registered into the
//! boot-time registry by [`register_all_tools`]. Each tool is a
//! self-describing record: name, description, category, risk, approval
//! requirement and parameter schema.

pub mod applications;
pub mod backups;
pub mod compose;
pub mod databases;
pub mod deployments;
pub mod destinations;
pub mod git_providers;
pub mod mounts;
pub mod network;
pub mod notifications;
pub mod postgres_sql;
pub mod projects;
pub mod registries;
pub mod schedules;
pub mod servers;
pub mod settings;
pub mod stripe;
pub mod users;
pub mod volume_backups;

use std::sync::Arc;

use anyhow::Result;

use crate::tools::registry::{ToolContext, ToolRegistry, ToolRegistryBuilder, ToolResult};
use crate::storage::Database;

/// Open the invocation-scoped storage handle, mapping failures into the
/// tool result envelope.
pub(crate) fn open_db(ctx: &ToolContext) -> Result<Database, ToolResult> {
    ctx.db()
        .map_err(|e| ToolResult::failure("Storage unavailable", e.to_string()))
}

/// Register every built-in tool. Duplicate names or destructive-verb
/// policy violations abort boot.
pub fn register_all_tools(builder: &mut ToolRegistryBuilder) -> Result<()> {
    // project / environment
    builder.register(Arc::new(projects::ProjectListTool))?;
    builder.register(Arc::new(projects::ProjectGetTool))?;
    builder.register(Arc::new(projects::ProjectCreateTool))?;
    builder.register(Arc::new(projects::ProjectUpdateTool))?;
    builder.register(Arc::new(projects::ProjectDeleteTool))?;
    builder.register(Arc::new(projects::EnvironmentListTool))?;
    builder.register(Arc::new(projects::EnvironmentCreateTool))?;
    builder.register(Arc::new(projects::EnvironmentDeleteTool))?;

    // application
    builder.register(Arc::new(applications::ApplicationListTool))?;
    builder.register(Arc::new(applications::ApplicationGetTool))?;
    builder.register(Arc::new(applications::ApplicationCreateTool))?;
    builder.register(Arc::new(applications::ApplicationUpdateTool))?;
    builder.register(Arc::new(applications::ApplicationDeployTool))?;
    builder.register(Arc::new(applications::ApplicationStartTool))?;
    builder.register(Arc::new(applications::ApplicationStopTool))?;
    builder.register(Arc::new(applications::ApplicationRestartTool))?;
    builder.register(Arc::new(applications::ApplicationDeleteTool))?;

    // compose
    builder.register(Arc::new(compose::ComposeListTool))?;
    builder.register(Arc::new(compose::ComposeGetTool))?;
    builder.register(Arc::new(compose::ComposeDeployTool))?;
    builder.register(Arc::new(compose::ComposeDeleteTool))?;

    // databases
    builder.register(Arc::new(databases::DatabaseListTool))?;
    builder.register(Arc::new(databases::DatabaseGetTool))?;
    builder.register(Arc::new(databases::PostgresCreateTool))?;
    builder.register(Arc::new(databases::MysqlCreateTool))?;
    builder.register(Arc::new(databases::MariadbCreateTool))?;
    builder.register(Arc::new(databases::MongoCreateTool))?;
    builder.register(Arc::new(databases::RedisCreateTool))?;
    builder.register(Arc::new(databases::DatabaseStartTool))?;
    builder.register(Arc::new(databases::DatabaseStopTool))?;
    builder.register(Arc::new(databases::DatabaseRestartTool))?;
    builder.register(Arc::new(databases::DatabaseDeleteTool))?;

    // postgres SQL
    builder.register(Arc::new(postgres_sql::PostgresSqlQueryTool))?;
    builder.register(Arc::new(postgres_sql::PostgresSqlExecuteDmlTool))?;
    builder.register(Arc::new(postgres_sql::PostgresSqlExecuteAdminTool))?;

    // backups
    builder.register(Arc::new(backups::BackupListTool))?;
    builder.register(Arc::new(backups::BackupCreateTool))?;
    builder.register(Arc::new(backups::BackupUpdateTool))?;
    builder.register(Arc::new(backups::BackupDeleteTool))?;
    builder.register(Arc::new(backups::BackupRunTool))?;
    builder.register(Arc::new(backups::BackupRestoreTool))?;

    // volume backups
    builder.register(Arc::new(volume_backups::VolumeBackupListTool))?;
    builder.register(Arc::new(volume_backups::VolumeBackupCreateTool))?;
    builder.register(Arc::new(volume_backups::VolumeBackupUpdateTool))?;
    builder.register(Arc::new(volume_backups::VolumeBackupDeleteTool))?;

    // mounts
    builder.register(Arc::new(mounts::MountListTool))?;
    builder.register(Arc::new(mounts::MountCreateTool))?;
    builder.register(Arc::new(mounts::MountUpdateTool))?;
    builder.register(Arc::new(mounts::MountDeleteTool))?;

    // domains / certificates / ports
    builder.register(Arc::new(network::DomainListTool))?;
    builder.register(Arc::new(network::DomainCreateTool))?;
    builder.register(Arc::new(network::DomainDeleteTool))?;
    builder.register(Arc::new(network::CertificateListTool))?;
    builder.register(Arc::new(network::CertificateCreateTool))?;
    builder.register(Arc::new(network::CertificateDeleteTool))?;
    builder.register(Arc::new(network::PortListTool))?;
    builder.register(Arc::new(network::PortCreateTool))?;
    builder.register(Arc::new(network::PortDeleteTool))?;

    // destinations
    builder.register(Arc::new(destinations::DestinationListTool))?;
    builder.register(Arc::new(destinations::DestinationCreateTool))?;
    builder.register(Arc::new(destinations::DestinationUpdateTool))?;
    builder.register(Arc::new(destinations::DestinationDeleteTool))?;

    // registries
    builder.register(Arc::new(registries::RegistryListTool))?;
    builder.register(Arc::new(registries::RegistryCreateTool))?;
    builder.register(Arc::new(registries::RegistryUpdateTool))?;
    builder.register(Arc::new(registries::RegistryDeleteTool))?;

    // git providers
    builder.register(Arc::new(git_providers::GitProviderListTool))?;
    builder.register(Arc::new(git_providers::GitProviderCreateTool))?;
    builder.register(Arc::new(git_providers::GitProviderDeleteTool))?;

    // notifications
    builder.register(Arc::new(notifications::NotificationListTool))?;
    builder.register(Arc::new(notifications::NotificationCreateTool))?;
    builder.register(Arc::new(notifications::NotificationUpdateTool))?;
    builder.register(Arc::new(notifications::NotificationDeleteTool))?;

    // schedules
    builder.register(Arc::new(schedules::ScheduleListTool))?;
    builder.register(Arc::new(schedules::ScheduleCreateTool))?;
    builder.register(Arc::new(schedules::ScheduleUpdateTool))?;
    builder.register(Arc::new(schedules::ScheduleDeleteTool))?;

    // servers / SSH keys
    builder.register(Arc::new(servers::ServerListTool))?;
    builder.register(Arc::new(servers::ServerGetTool))?;
    builder.register(Arc::new(servers::ServerCreateTool))?;
    builder.register(Arc::new(servers::ServerDeleteTool))?;
    builder.register(Arc::new(servers::ServerSetupMonitoringTool))?;
    builder.register(Arc::new(servers::SshKeyListTool))?;
    builder.register(Arc::new(servers::SshKeyGenerateTool))?;
    builder.register(Arc::new(servers::SshKeyRevealTool))?;
    builder.register(Arc::new(servers::SshKeyDeleteTool))?;

    // settings
    builder.register(Arc::new(settings::AllowlistGetTool))?;
    builder.register(Arc::new(settings::AllowlistUpdateTool))?;
    builder.register(Arc::new(settings::SecurityRuleListTool))?;
    builder.register(Arc::new(settings::SecurityRuleCreateTool))?;
    builder.register(Arc::new(settings::SecurityRuleRevealTool))?;
    builder.register(Arc::new(settings::SecurityRuleDeleteTool))?;

    // deployments
    builder.register(Arc::new(deployments::DeploymentListTool))?;
    builder.register(Arc::new(deployments::DeploymentGetTool))?;

    // users
    builder.register(Arc::new(users::UserListTool))?;
    builder.register(Arc::new(users::UserGetTool))?;

    // stripe
    builder.register(Arc::new(stripe::StripeCheckoutSessionCreateTool))?;
    builder.register(Arc::new(stripe::StripePortalSessionCreateTool))?;

    Ok(())
}

/// Build the full boot registry.
pub fn build_registry() -> Result<ToolRegistry> {
    let mut builder = ToolRegistryBuilder::new();
    register_all_tools(&mut builder)?;
    Ok(builder.build())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use tempfile::TempDir;

    use crate::scheduler::LocalScheduler;
    use crate::services::testing::{RecordingDeployer, RecordingSqlExecutor, StaticBilling};
    use crate::services::Services;
    use crate::storage::{
        AppStore, Database, DatabaseServiceStore, IntegrationStore, OrgRole, OrgStore,
        ProjectStore,
    };
    use crate::tools::registry::ToolContext;
    use crate::config::Config;

    pub struct SeedOptions {
        pub role: OrgRole,
    }

    impl Default for SeedOptions {
        fn default() -> Self {
            Self {
                role: OrgRole::Owner,
            }
        }
    }

    /// A seeded single-org world with one project/environment/application,
    /// a postgres service and an S3 destination, plus recording doubles
    /// for every capability.
    pub struct Seed {
        pub ctx: ToolContext,
        pub org_id: String,
        pub user_id: String,
        pub project_id: String,
        pub environment_id: String,
        pub application_id: String,
        pub database_id: String,
        pub database_password: String,
        pub destination_id: String,
        pub destination_secret: String,
        pub deployer: Arc<RecordingDeployer>,
        pub sql: Arc<RecordingSqlExecutor>,
        db_path: Arc<PathBuf>,
        services: Arc<Services>,
        _dir: TempDir,
    }

    impl Seed {
        pub fn db(&self) -> Database {
            Database::new(&self.db_path).unwrap()
        }

        /// Context of a user who belongs to a different organization.
        pub fn foreign_ctx(&self) -> ToolContext {
            let db = self.db();
            let orgs = OrgStore::new(&db);
            let foreign_org = orgs.create_organization("rival").unwrap();
            let foreign_user = orgs.create_user("mallory@rival.io", "Mallory").unwrap();
            orgs.add_member(&foreign_user, &foreign_org, OrgRole::Owner)
                .unwrap();
            ToolContext::new(
                foreign_user,
                foreign_org,
                self.db_path.clone(),
                self.services.clone(),
            )
        }
    }

    pub fn seed_context(options: SeedOptions) -> Seed {
        let dir = TempDir::new().unwrap();
        let db_path = Arc::new(dir.path().join("test.db"));
        let db = Database::new(&db_path).unwrap();

        let orgs = OrgStore::new(&db);
        let org_id = orgs.create_organization("acme").unwrap();
        let user_id = orgs.create_user("alice@acme.io", "Alice").unwrap();
        orgs.add_member(&user_id, &org_id, options.role).unwrap();

        let projects = ProjectStore::new(&db);
        let project_id = projects.create(&org_id, "web", None).unwrap();
        let environment_id = projects.create_environment(&project_id, "production").unwrap();

        let application_id = AppStore::new(&db)
            .create_application(&environment_id, "api")
            .unwrap();

        let database_password = "pg-secret-seed".to_string();
        let database_id = DatabaseServiceStore::new(&db)
            .create(
                &environment_id,
                "postgres",
                "main-db",
                "appdb",
                "app",
                &database_password,
            )
            .unwrap();

        let destination_secret = "s3-secret-seed".to_string();
        let destination_id = IntegrationStore::new(&db)
            .create_destination(
                &org_id,
                "backups",
                "https://s3.example.com",
                "us-east-1",
                "acme-backups",
                "AKIA-seed",
                &destination_secret,
            )
            .unwrap();

        let deployer = Arc::new(RecordingDeployer::default());
        let sql = Arc::new(RecordingSqlExecutor::default());
        let services = Arc::new(Services {
            deployer: deployer.clone(),
            sql: sql.clone(),
            scheduler: Arc::new(LocalScheduler::new()),
            billing: Arc::new(StaticBilling),
            config: Arc::new(Config {
                base_price_monthly_id: Some("price_monthly_test".to_string()),
                base_annual_monthly_id: Some("price_annual_test".to_string()),
                ..Config::default()
            }),
        });

        let ctx = ToolContext::new(
            user_id.clone(),
            org_id.clone(),
            db_path.clone(),
            services.clone(),
        );

        Seed {
            ctx,
            org_id,
            user_id,
            project_id,
            environment_id,
            application_id,
            database_id,
            database_password,
            destination_id,
            destination_secret,
            deployer,
            sql,
            db_path,
            services,
            _dir: dir,
        }
    }

    mod registry_policy {
        use crate::tools::implementations::build_registry;
        use crate::tools::registry::RiskLevel;

        #[test]
        fn registry_builds_without_conflicts() {
            let registry = build_registry().unwrap();
            assert!(registry.get("project_list").is_some());
            assert!(registry.get("stripe_portal_session_create").is_some());
        }

        #[test]
        fn every_destructive_tool_is_high_risk_with_approval() {
            let registry = build_registry().unwrap();
            for tool in registry.get_all() {
                let destructive = tool
                    .name()
                    .split('_')
                    .any(|seg| matches!(seg, "delete" | "remove" | "destroy" | "purge"
                        | "uninstall" | "reset" | "rotate" | "revoke" | "restore"));
                if destructive {
                    assert_eq!(tool.risk_level(), RiskLevel::High, "{}", tool.name());
                    assert!(tool.requires_approval(), "{}", tool.name());
                }
            }
        }

        #[test]
        fn advertised_catalog_is_sorted_and_documented() {
            let registry = build_registry().unwrap();
            let advertised = registry.advertised();
            let mut names: Vec<&str> = advertised.iter().map(|t| t.name.as_str()).collect();
            let sorted = {
                let mut s = names.clone();
                s.sort();
                s
            };
            assert_eq!(names, sorted);
            names.dedup();
            assert_eq!(names.len(), advertised.len());
            for tool in &advertised {
                assert!(!tool.description.is_empty(), "{}", tool.name);
                assert_eq!(tool.parameters["type"], "object", "{}", tool.name);
            }
        }

        #[test]
        fn reveal_tools_are_confirm_gated() {
            let registry = build_registry().unwrap();
            for name in ["ssh_key_reveal", "security_rule_reveal"] {
                let tool = registry.get(name).unwrap();
                assert!(tool.requires_approval());
                assert_eq!(tool.risk_level(), RiskLevel::High);
                let schema = tool.schema().to_json_schema();
                assert!(schema["properties"]["confirm"]["const"].is_string(), "{}", name);
            }
        }
    }
}
