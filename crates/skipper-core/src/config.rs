//! Process-wide configuration.
//!
//! Environment variables are read once at startup into a typed `Config`
//! value that is passed by reference; nothing re-reads the environment at
//! runtime.

use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_AGENT_RUN_TIMEOUT_SECS: u64 = 600;

/// Typed view of the process environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Hosted mode: schedulers go through the remote jobs service.
    pub is_cloud: bool,
    /// Remote jobs service endpoint (hosted mode).
    pub jobs_url: Option<String>,
    /// API key sent to the jobs service as `X-API-Key`.
    pub jobs_api_key: Option<String>,
    /// Stripe secret key for the billing tools.
    pub stripe_secret_key: Option<String>,
    pub base_price_monthly_id: Option<String>,
    pub base_annual_monthly_id: Option<String>,
    /// Public site URL used for billing redirect URLs.
    pub site_url: String,
    /// Dev vs production defaults (derived URLs only).
    pub production: bool,
    /// SQLite database location.
    pub db_path: PathBuf,
    /// Listen port for the HTTP server.
    pub port: u16,
    /// Upper bound on a single agent run.
    pub agent_run_timeout: Duration,
}

impl Config {
    /// Read the environment into a `Config`. Missing optional values stay
    /// `None`; the corresponding tools report a configuration error when
    /// invoked.
    pub fn from_env() -> Self {
        let production = std::env::var("NODE_ENV")
            .map(|v| v == "production")
            .unwrap_or(false);

        let site_url = std::env::var("SITE_URL").unwrap_or_else(|_| {
            if production {
                "https://app.skipper.sh".to_string()
            } else {
                "http://localhost:3000".to_string()
            }
        });

        let db_path = std::env::var("SKIPPER_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("skipper.db"));

        let agent_run_timeout = std::env::var("SKIPPER_AGENT_RUN_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_AGENT_RUN_TIMEOUT_SECS));

        Self {
            is_cloud: env_flag("IS_CLOUD"),
            jobs_url: env_opt("JOBS_URL"),
            jobs_api_key: env_opt("API_KEY"),
            stripe_secret_key: env_opt("STRIPE_SECRET_KEY"),
            base_price_monthly_id: env_opt("BASE_PRICE_MONTHLY_ID"),
            base_annual_monthly_id: env_opt("BASE_ANNUAL_MONTHLY_ID"),
            site_url,
            production,
            db_path,
            port: std::env::var("SKIPPER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            agent_run_timeout,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            is_cloud: false,
            jobs_url: None,
            jobs_api_key: None,
            stripe_secret_key: None,
            base_price_monthly_id: None,
            base_annual_monthly_id: None,
            site_url: "http://localhost:3000".to_string(),
            production: false,
            db_path: PathBuf::from("skipper.db"),
            port: 3000,
            agent_run_timeout: Duration::from_secs(DEFAULT_AGENT_RUN_TIMEOUT_SECS),
        }
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes"))
        .unwrap_or(false)
}
