/// Router Module Index
///
/// Splits the API into access-segregated routers. Access control is applied per module
/// (via Axum layers in `create_router`), so a route cannot end up unprotected by being
/// registered in the wrong place.

/// Routes accessible to everyone. A session, when present, only changes menu filtering.
pub mod public;

/// Routes protected by the `SessionUser` extractor middleware.
pub mod authenticated;

/// Routes that additionally require the admin audience (checked in the handlers).
pub mod admin;

/// Local-development helpers. Answer 404 outside `Env::Local`.
pub mod dev;
