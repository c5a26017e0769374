use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Unauthenticated, read-only endpoints. Nothing here may depend on a session being
/// present; menus degrade to the guest audience when none resolves.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(handlers::health))
        // GET /sitemap.xml
        // Guest-visible menu paths plus every published event.
        .route("/sitemap.xml", get(handlers::get_sitemap))
        // GET /api/v1/menus/{name}
        // A named navigation menu filtered for the caller's audience and roles.
        .route("/api/v1/menus/{name}", get(handlers::get_menu))
        // GET /api/v1/referrals/resolve?code=...
        // Case-insensitive referral code lookup.
        .route("/api/v1/referrals/resolve", get(handlers::resolve_referral))
}
