//! Identity middleware.
//!
//! Session authentication happens upstream; by the time a request reaches
//! this server the session has been resolved into identity headers:
//! `X-User-Id` and `X-Organization-Id` (required), `X-Project-Id` and
//! `X-Server-Id` (optional scope). The middleware folds them into the
//! `ToolContext` identity every handler runs under.

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use skipper_core::tools::ToolContext;

use crate::AppState;

/// Authorized identity attached to request extensions.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: String,
    pub organization_id: String,
    pub project_id: Option<String>,
    pub server_id: Option<String>,
}

impl Principal {
    /// Build the tool-execution context for this request.
    pub fn tool_context(&self, state: &AppState) -> ToolContext {
        let mut ctx = ToolContext::new(
            self.user_id.clone(),
            self.organization_id.clone(),
            state.db_path.clone(),
            state.services.clone(),
        );
        if let Some(project_id) = &self.project_id {
            ctx = ctx.with_project(project_id.clone());
        }
        if let Some(server_id) = &self.server_id {
            ctx = ctx.with_server(server_id.clone());
        }
        ctx
    }
}

/// Extractor for routes that need the caller's identity.
pub struct CurrentPrincipal(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentPrincipal
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(CurrentPrincipal)
            .ok_or((StatusCode::UNAUTHORIZED, "Not authenticated"))
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Middleware that requires the identity headers on every API route.
pub async fn auth_middleware(
    State(_state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    let headers = request.headers();
    let user_id = header(headers, "X-User-Id");
    let organization_id = header(headers, "X-Organization-Id");

    let (Some(user_id), Some(organization_id)) = (user_id, organization_id) else {
        return Err((StatusCode::UNAUTHORIZED, "Missing identity headers"));
    };

    let principal = Principal {
        user_id,
        organization_id,
        project_id: header(request.headers(), "X-Project-Id"),
        server_id: header(request.headers(), "X-Server-Id"),
    };

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}
