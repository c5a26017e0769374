use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Dev Router Module
///
/// Nested under `/api/v1/dev`. Always mounted; the handlers consult the injected
/// `AppConfig` and answer 404 unless running in `Env::Local`.
pub fn dev_routes() -> Router<AppState> {
    Router::new()
        // GET /api/v1/dev/users
        // Up to 50 active users, ordered by email, for the local user switcher.
        .route("/users", get(handlers::list_dev_users))
}
