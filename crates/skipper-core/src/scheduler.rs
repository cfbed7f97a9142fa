//! Scheduler interface.
//!
//! Self-hosted deployments register jobs with the in-process scheduler;
//! the hosted platform forwards them to the remote jobs service over HTTP
//! (selected by `IS_CLOUD`). Cron expressions are stored and forwarded
//! verbatim; parsing them is the consumer's concern.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Config;

/// A registered job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleJob {
    pub id: String,
    /// Job family: `backup`, `volume_backup` or `schedule`.
    pub kind: String,
    pub cron_expression: String,
    pub payload: Value,
}

#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn create(&self, job: &ScheduleJob) -> Result<()>;
    async fn update(&self, job: &ScheduleJob) -> Result<()>;
    async fn remove(&self, job_id: &str) -> Result<()>;
    /// Trigger one immediate run out of schedule.
    async fn run(&self, job_id: &str) -> Result<()>;
}

/// In-process job table for self-hosted mode. The runner daemon drains it;
/// the tools only manage registrations.
#[derive(Default)]
pub struct LocalScheduler {
    jobs: DashMap<String, ScheduleJob>,
}

impl LocalScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job(&self, job_id: &str) -> Option<ScheduleJob> {
        self.jobs.get(job_id).map(|j| j.clone())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[async_trait]
impl Scheduler for LocalScheduler {
    async fn create(&self, job: &ScheduleJob) -> Result<()> {
        tracing::info!(job_id = %job.id, kind = %job.kind, cron = %job.cron_expression, "job registered");
        self.jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn update(&self, job: &ScheduleJob) -> Result<()> {
        self.jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn remove(&self, job_id: &str) -> Result<()> {
        self.jobs.remove(job_id);
        Ok(())
    }

    async fn run(&self, job_id: &str) -> Result<()> {
        let job = self
            .jobs
            .get(job_id)
            .map(|j| j.clone())
            .with_context(|| format!("job {} not registered", job_id))?;
        tracing::info!(job_id = %job.id, kind = %job.kind, "immediate job run requested");
        Ok(())
    }
}

/// HTTP client for the hosted jobs service.
pub struct RemoteScheduler {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RemoteScheduler {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl Scheduler for RemoteScheduler {
    async fn create(&self, job: &ScheduleJob) -> Result<()> {
        self.client
            .post(self.url("/jobs"))
            .header("X-API-Key", &self.api_key)
            .json(job)
            .send()
            .await?
            .error_for_status()
            .context("jobs service rejected create")?;
        Ok(())
    }

    async fn update(&self, job: &ScheduleJob) -> Result<()> {
        self.client
            .patch(self.url(&format!("/jobs/{}", job.id)))
            .header("X-API-Key", &self.api_key)
            .json(job)
            .send()
            .await?
            .error_for_status()
            .context("jobs service rejected update")?;
        Ok(())
    }

    async fn remove(&self, job_id: &str) -> Result<()> {
        self.client
            .delete(self.url(&format!("/jobs/{}", job_id)))
            .header("X-API-Key", &self.api_key)
            .send()
            .await?
            .error_for_status()
            .context("jobs service rejected remove")?;
        Ok(())
    }

    async fn run(&self, job_id: &str) -> Result<()> {
        self.client
            .post(self.url(&format!("/jobs/{}/run", job_id)))
            .header("X-API-Key", &self.api_key)
            .send()
            .await?
            .error_for_status()
            .context("jobs service rejected run")?;
        Ok(())
    }
}

/// Select the scheduler implementation for this deployment.
pub fn scheduler_from_config(config: &Config) -> Arc<dyn Scheduler> {
    if config.is_cloud {
        if let (Some(url), Some(key)) = (&config.jobs_url, &config.jobs_api_key) {
            return Arc::new(RemoteScheduler::new(url.clone(), key.clone()));
        }
        tracing::warn!("IS_CLOUD set without JOBS_URL/API_KEY; falling back to local scheduler");
    }
    Arc::new(LocalScheduler::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn local_scheduler_tracks_registrations() {
        let scheduler = LocalScheduler::new();
        let job = ScheduleJob {
            id: "vb-1".to_string(),
            kind: "volume_backup".to_string(),
            cron_expression: "0 3 * * *".to_string(),
            payload: json!({"volume_name": "data"}),
        };

        scheduler.create(&job).await.unwrap();
        assert_eq!(scheduler.len(), 1);

        let mut updated = job.clone();
        updated.cron_expression = "0 4 * * *".to_string();
        scheduler.update(&updated).await.unwrap();
        assert_eq!(scheduler.job("vb-1").unwrap().cron_expression, "0 4 * * *");

        assert!(scheduler.run("vb-1").await.is_ok());
        assert!(scheduler.run("missing").await.is_err());

        scheduler.remove("vb-1").await.unwrap();
        assert!(scheduler.is_empty());
    }

    #[test]
    fn config_selects_local_without_cloud_flag() {
        let config = Config::default();
        let scheduler = scheduler_from_config(&config);
        // Local scheduler accepts registrations without any network.
        let job = ScheduleJob {
            id: "s-1".into(),
            kind: "schedule".into(),
            cron_expression: "* * * * *".into(),
            payload: json!({}),
        };
        tokio::runtime::Runtime::new()
            .unwrap()
            .block_on(scheduler.create(&job))
            .unwrap();
    }
}
