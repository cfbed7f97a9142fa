//! Multi-tenant access gates.

use serde_json::Value;

use crate::storage::{Database, OrgMember, OrgRole, OrgStore};
use crate::tools::registry::{ToolContext, ToolResult};

/// Load the caller's membership row; absence is the domain's not-found.
pub fn require_org_member(db: &Database, ctx: &ToolContext) -> Result<OrgMember, ToolResult> {
    match OrgStore::new(db).get_member(&ctx.user_id, &ctx.organization_id) {
        Ok(Some(member)) => Ok(member),
        Ok(None) => Err(ToolResult::not_found("Organization membership not found")),
        Err(e) => Err(ToolResult::failure("Failed to load membership", e.to_string())),
    }
}

/// Owner-only gate.
pub fn require_org_owner(db: &Database, ctx: &ToolContext) -> Result<OrgMember, ToolResult> {
    let member = require_org_member(db, ctx)?;
    if member.role != OrgRole::Owner {
        return Err(ToolResult::unauthorized(
            "Only organization owner can perform this operation",
        ));
    }
    Ok(member)
}

/// Resource-org binding check. On mismatch the caller gets UNAUTHORIZED
/// with the provided masked payload so no entity field leaks while the
/// client still renders a consistent shape.
pub fn ensure_org_binding(
    ctx: &ToolContext,
    entity_organization_id: &str,
    masked: Value,
) -> Result<(), ToolResult> {
    if entity_organization_id == ctx.organization_id {
        return Ok(());
    }
    Err(ToolResult::failure_data(
        "Access denied",
        "UNAUTHORIZED",
        masked,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::Services;
    use crate::storage::masked_application_payload;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn seeded_ctx(role: OrgRole) -> (ToolContext, TempDir) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");
        let db = Database::new(&path).unwrap();
        let orgs = OrgStore::new(&db);
        let org = orgs.create_organization("acme").unwrap();
        let user = orgs.create_user("a@acme.io", "Alice").unwrap();
        orgs.add_member(&user, &org, role).unwrap();

        let ctx = ToolContext::new(
            user,
            org,
            Arc::new(PathBuf::from(&path)),
            Arc::new(Services::for_tests()),
        );
        (ctx, dir)
    }

    #[test]
    fn member_gate_passes_for_members() {
        let (ctx, _dir) = seeded_ctx(OrgRole::Member);
        let db = ctx.db().unwrap();
        assert!(require_org_member(&db, &ctx).is_ok());
    }

    #[test]
    fn owner_gate_rejects_plain_members() {
        let (ctx, _dir) = seeded_ctx(OrgRole::Member);
        let db = ctx.db().unwrap();
        let err = require_org_owner(&db, &ctx).unwrap_err();
        assert_eq!(err.error.as_deref(), Some("UNAUTHORIZED"));
    }

    #[test]
    fn missing_membership_is_not_found() {
        let (ctx, _dir) = seeded_ctx(OrgRole::Member);
        let stranger = ToolContext::new(
            "stranger",
            ctx.organization_id.clone(),
            ctx.db_path().clone(),
            ctx.services.clone(),
        );
        let db = stranger.db().unwrap();
        let err = require_org_member(&db, &stranger).unwrap_err();
        assert_eq!(err.error.as_deref(), Some("NOT_FOUND"));
    }

    #[test]
    fn org_binding_mismatch_returns_masked_payload() {
        let (ctx, _dir) = seeded_ctx(OrgRole::Owner);
        let err = ensure_org_binding(&ctx, "other-org", masked_application_payload()).unwrap_err();
        assert_eq!(err.error.as_deref(), Some("UNAUTHORIZED"));
        assert!(err.data.unwrap().get("name").unwrap().is_null());
    }
}
