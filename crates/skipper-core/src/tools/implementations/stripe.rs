//! Billing tools. Owner-only; sessions are minted by the billing gateway.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::open_db;
use crate::safety::require_org_owner;
use crate::tools::registry::{
    parse_params, RiskLevel, Tool, ToolCategory, ToolContext, ToolResult,
};
use crate::tools::schema::{Field, ParamSchema};

pub struct StripeCheckoutSessionCreateTool;

#[derive(Deserialize)]
struct CheckoutParams {
    plan: String,
}

#[async_trait]
impl Tool for StripeCheckoutSessionCreateTool {
    fn name(&self) -> &'static str {
        "stripe_checkout_session_create"
    }
    fn description(&self) -> &str {
        "Create a Stripe checkout session for the organization's subscription. Owner only."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Stripe
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
                "plan",
                &["monthly", "annual"],
                "Billing period",
            ))
            .field(Field::literal(
                "confirm",
                "CONFIRM_CHECKOUT",
                "Type CONFIRM_CHECKOUT to confirm starting checkout",
            ))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: CheckoutParams = match parse_params(params) {
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

        let config = &ctx.services.config;
        let price_id = match params.plan.as_str() {
            "annual" => config.base_annual_monthly_id.as_deref(),
            _ => config.base_price_monthly_id.as_deref(),
        };
        let Some(price_id) = price_id else {
            return ToolResult::failure(
                "Billing is not configured",
                "price id missing from configuration",
            );
        };

        match ctx
            .services
            .billing
            .create_checkout_session(&ctx.organization_id, price_id, &config.site_url)
            .await
        {
            Ok(session) => ToolResult::success_with(
                "Checkout session created",
                json!({"session_id": session.id, "url": session.url}),
            ),
            Err(e) => ToolResult::failure("Failed to create checkout session", e.to_string()),
        }
    }
}

pub struct StripePortalSessionCreateTool;

#[async_trait]
impl Tool for StripePortalSessionCreateTool {
    fn name(&self) -> &'static str {
        "stripe_portal_session_create"
    }
    fn description(&self) -> &str {
        "Create a Stripe billing-portal session for the organization. Owner only."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Stripe
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::High
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn schema(&self) -> ParamSchema {
        ParamSchema::new().field(Field::literal(
            "confirm",
            "CONFIRM_PORTAL",
            "Type CONFIRM_PORTAL to confirm opening the billing portal",
        ))
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> ToolResult {
        let db = match open_db(ctx) {
            Ok(db) => db,
            Err(e) => return e,
        };
        if let Err(denied) = require_org_owner(&db, ctx) {
            return denied;
        }

        match ctx
            .services
            .billing
            .create_portal_session(&ctx.organization_id, &ctx.services.config.site_url)
            .await
        {
            Ok(session) => ToolResult::success_with(
                "Billing portal session created",
                json!({"session_id": session.id, "url": session.url}),
            ),
            Err(e) => ToolResult::failure("Failed to create portal session", e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::OrgRole;
    use crate::tools::implementations::tests::{seed_context, SeedOptions};

    #[tokio::test]
    async fn checkout_is_owner_only() {
        let seed = seed_context(SeedOptions { role: OrgRole::Member });
        let result = StripeCheckoutSessionCreateTool
            .execute(json!({"plan": "monthly", "confirm": "CONFIRM_CHECKOUT"}), &seed.ctx)
            .await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("UNAUTHORIZED"));
    }

    #[tokio::test]
    async fn checkout_returns_externally_minted_url() {
        let seed = seed_context(SeedOptions::default());
        let result = StripeCheckoutSessionCreateTool
            .execute(json!({"plan": "monthly", "confirm": "CONFIRM_CHECKOUT"}), &seed.ctx)
            .await;
        assert!(result.success);
        let data = result.data.unwrap();
        assert!(data["url"].as_str().unwrap().starts_with("https://"));
        assert!(data["session_id"].as_str().unwrap().starts_with("cs_"));
    }
}
