use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Admin Router Module
///
/// Nested under `/api/v1/admin`. The router is wrapped in the authentication layer;
/// handlers then require the admin audience (ADMIN, SUPER_ADMIN or MAESTRO) and answer
/// 403 otherwise.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /api/v1/admin/audit
        // Paged, filtered audit log with sensitive metadata redacted.
        .route("/audit", get(handlers::list_audit_entries))
}
