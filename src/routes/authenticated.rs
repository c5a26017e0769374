use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Authenticated Router Module
///
/// Routes for any caller with a valid session. The layer in `create_router` rejects
/// anonymous requests with 401 before these handlers run; each handler still takes
/// `SessionUser` to learn who the caller is.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /api/v1/me
        // The session identity and its navigation audience.
        .route("/api/v1/me", get(handlers::get_me))
        // PUT /api/v1/account/profile
        // Partial profile update. Audited.
        .route("/api/v1/account/profile", put(handlers::update_profile))
        // POST /api/v1/account/avatar/presigned
        // Short-lived (10-minute) presigned PUT URL for an avatar image. Audited.
        .route("/api/v1/account/avatar/presigned", post(handlers::create_avatar_upload))
        // GET /api/v1/onboarding/progress
        // Completed steps plus the derived progress view.
        .route("/api/v1/onboarding/progress", get(handlers::get_onboarding_progress))
}
