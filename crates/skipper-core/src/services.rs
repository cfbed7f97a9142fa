//! Capability interfaces the tools reach external systems through.
//!
//! The actual orchestrator, Docker daemon and S3 backends live outside
//! this crate; tools see them only as these traits, carried on the
//! `ToolContext` via [`Services`].

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::billing::{BillingGateway, StripeGateway};
use crate::config::Config;
use crate::safety::shell_quote;
use crate::scheduler::{scheduler_from_config, Scheduler};
use crate::storage::DatabaseService;

/// Captured output of an executed command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Asynchronous deployment trigger. The core never awaits completion of
/// the rollout itself.
#[async_trait]
pub trait Deployer: Send + Sync {
    async fn trigger(&self, target_type: &str, target_id: &str) -> Result<()>;
}

/// Default deployer: hands the trigger to the platform's deployment queue
/// (modeled as a log line here; the orchestrator consumes it out-of-band).
pub struct LogDeployer;

#[async_trait]
impl Deployer for LogDeployer {
    async fn trigger(&self, target_type: &str, target_id: &str) -> Result<()> {
        tracing::info!(target_type, target_id, "deployment triggered");
        Ok(())
    }
}

/// Runs a prepared SQL script against a managed database container.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn run_script(
        &self,
        service: &DatabaseService,
        script: &str,
        timeout: Duration,
    ) -> Result<CommandOutput>;
}

/// Build the docker-exec psql command line for a prepared script. All
/// user-derived strings are shell-quoted; the container id was created by
/// the platform, never by the caller.
pub fn psql_command(service: &DatabaseService, script: &str) -> String {
    let container = service
        .container_id
        .as_deref()
        .unwrap_or(service.id.as_str());
    format!(
        "docker exec -i {} psql -U {} -d {} -v ON_ERROR_STOP=1 -c {}",
        shell_quote(container),
        shell_quote(&service.database_user),
        shell_quote(&service.database_name),
        shell_quote(script),
    )
}

/// Executes psql scripts through `docker exec` on the local daemon.
pub struct DockerSqlExecutor;

#[async_trait]
impl SqlExecutor for DockerSqlExecutor {
    async fn run_script(
        &self,
        service: &DatabaseService,
        script: &str,
        timeout: Duration,
    ) -> Result<CommandOutput> {
        let command_line = psql_command(service, script);
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&command_line)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Close stdin explicitly; psql reads the script from -c.
        if let Some(mut stdin) = child.stdin.take() {
            stdin.shutdown().await.ok();
        }

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                anyhow::bail!("sql command timed out after {:?}", timeout);
            }
        };

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

/// Capability bundle carried by every `ToolContext`.
pub struct Services {
    pub deployer: Arc<dyn Deployer>,
    pub sql: Arc<dyn SqlExecutor>,
    pub scheduler: Arc<dyn Scheduler>,
    pub billing: Arc<dyn BillingGateway>,
    pub config: Arc<Config>,
}

impl Services {
    /// Production wiring from the process config.
    pub fn from_config(config: Arc<Config>) -> Self {
        Self {
            deployer: Arc::new(LogDeployer),
            sql: Arc::new(DockerSqlExecutor),
            scheduler: scheduler_from_config(&config),
            billing: Arc::new(StripeGateway::new(config.clone())),
            config,
        }
    }

    /// Inert wiring for unit tests.
    pub fn for_tests() -> Self {
        let config = Arc::new(Config {
            base_price_monthly_id: Some("price_monthly_test".to_string()),
            base_annual_monthly_id: Some("price_annual_test".to_string()),
            ..Config::default()
        });
        Self {
            deployer: Arc::new(testing::RecordingDeployer::default()),
            sql: Arc::new(testing::RecordingSqlExecutor::default()),
            scheduler: scheduler_from_config(&config),
            billing: Arc::new(testing::StaticBilling),
            config,
        }
    }
}

/// Test doubles shared by unit and integration tests.
pub mod testing {
    use std::sync::Mutex;

    use super::*;
    use crate::billing::BillingSession;

    /// Records every trigger instead of deploying.
    #[derive(Default)]
    pub struct RecordingDeployer {
        pub triggers: Mutex<Vec<(String, String)>>,
    }

    impl RecordingDeployer {
        pub fn trigger_count(&self) -> usize {
            self.triggers.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Deployer for RecordingDeployer {
        async fn trigger(&self, target_type: &str, target_id: &str) -> Result<()> {
            self.triggers
                .lock()
                .unwrap()
                .push((target_type.to_string(), target_id.to_string()));
            Ok(())
        }
    }

    /// Records the prepared scripts and returns canned output.
    #[derive(Default)]
    pub struct RecordingSqlExecutor {
        pub scripts: Mutex<Vec<String>>,
        pub canned_stdout: Mutex<String>,
    }

    impl RecordingSqlExecutor {
        pub fn last_script(&self) -> Option<String> {
            self.scripts.lock().unwrap().last().cloned()
        }

        pub fn set_stdout(&self, stdout: &str) {
            *self.canned_stdout.lock().unwrap() = stdout.to_string();
        }
    }

    #[async_trait]
    impl SqlExecutor for RecordingSqlExecutor {
        async fn run_script(
            &self,
            _service: &DatabaseService,
            script: &str,
            _timeout: Duration,
        ) -> Result<CommandOutput> {
            self.scripts.lock().unwrap().push(script.to_string());
            Ok(CommandOutput {
                stdout: self.canned_stdout.lock().unwrap().clone(),
                stderr: String::new(),
                exit_code: 0,
            })
        }
    }

    /// Mints deterministic billing sessions.
    pub struct StaticBilling;

    #[async_trait]
    impl BillingGateway for StaticBilling {
        async fn create_checkout_session(
            &self,
            _organization_id: &str,
            price_id: &str,
            _site_url: &str,
        ) -> Result<BillingSession> {
            Ok(BillingSession {
                id: format!("cs_test_{}", price_id),
                url: format!("https://checkout.stripe.test/{}", price_id),
            })
        }

        async fn create_portal_session(
            &self,
            organization_id: &str,
            _site_url: &str,
        ) -> Result<BillingSession> {
            Ok(BillingSession {
                id: format!("bps_test_{}", organization_id),
                url: "https://billing.stripe.test/portal".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> DatabaseService {
        DatabaseService {
            id: "db-1".to_string(),
            environment_id: "env-1".to_string(),
            kind: "postgres".to_string(),
            name: "main".to_string(),
            database_name: "appdb".to_string(),
            database_user: "app".to_string(),
            database_password: "secret".to_string(),
            container_id: Some("pg-container".to_string()),
            status: "running".to_string(),
            organization_id: "org-1".to_string(),
        }
    }

    #[test]
    fn psql_command_quotes_every_user_field() {
        let mut svc = service();
        svc.database_name = "app'; rm -rf /".to_string();
        let cmd = psql_command(&svc, "SELECT 1;");
        assert!(cmd.contains("'app'\\''; rm -rf /'"));
        assert!(cmd.starts_with("docker exec -i 'pg-container' psql -U 'app'"));
        assert!(cmd.ends_with("-c 'SELECT 1;'"));
    }
}
