//! Billing gateway (Stripe).

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::Config;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Externally minted checkout/portal session.
#[derive(Debug, Clone)]
pub struct BillingSession {
    pub id: String,
    pub url: String,
}

#[async_trait]
pub trait BillingGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        organization_id: &str,
        price_id: &str,
        site_url: &str,
    ) -> Result<BillingSession>;

    async fn create_portal_session(
        &self,
        organization_id: &str,
        site_url: &str,
    ) -> Result<BillingSession>;
}

#[derive(Deserialize)]
struct StripeSessionResponse {
    id: String,
    url: String,
}

/// Stripe REST client using the secret key from config.
pub struct StripeGateway {
    client: reqwest::Client,
    config: Arc<Config>,
}

impl StripeGateway {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn secret_key(&self) -> Result<&str> {
        self.config
            .stripe_secret_key
            .as_deref()
            .context("STRIPE_SECRET_KEY is not configured")
    }
}

#[async_trait]
impl BillingGateway for StripeGateway {
    async fn create_checkout_session(
        &self,
        organization_id: &str,
        price_id: &str,
        site_url: &str,
    ) -> Result<BillingSession> {
        let key = self.secret_key()?;
        let params = [
            ("mode", "subscription"),
            ("line_items[0][price]", price_id),
            ("line_items[0][quantity]", "1"),
            ("client_reference_id", organization_id),
            (
                "success_url",
                &format!("{}/settings/billing?checkout=success", site_url),
            ),
            (
                "cancel_url",
                &format!("{}/settings/billing?checkout=cancelled", site_url),
            ),
        ];

        let response: StripeSessionResponse = self
            .client
            .post(format!("{}/checkout/sessions", STRIPE_API_BASE))
            .basic_auth(key, None::<&str>)
            .form(&params)
            .send()
            .await?
            .error_for_status()
            .context("stripe rejected checkout session")?
            .json()
            .await?;

        Ok(BillingSession {
            id: response.id,
            url: response.url,
        })
    }

    async fn create_portal_session(
        &self,
        organization_id: &str,
        site_url: &str,
    ) -> Result<BillingSession> {
        let key = self.secret_key()?;
        let params = [
            ("customer", organization_id),
            ("return_url", &format!("{}/settings/billing", site_url)),
        ];

        let response: StripeSessionResponse = self
            .client
            .post(format!("{}/billing_portal/sessions", STRIPE_API_BASE))
            .basic_auth(key, None::<&str>)
            .form(&params)
            .send()
            .await?
            .error_for_status()
            .context("stripe rejected portal session")?
            .json()
            .await?;

        Ok(BillingSession {
            id: response.id,
            url: response.url,
        })
    }
}
