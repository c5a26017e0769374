use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod audit;
pub mod auth;
pub mod config;
pub mod error;
pub mod format;
pub mod handlers;
pub mod menu;
pub mod models;
pub mod onboarding;
pub mod repository;
pub mod sitemap;
pub mod storage;

// Router segregation (Public, Authenticated, Admin, Dev).
pub mod routes;
use models::SessionUser;
use routes::{admin, authenticated, dev, public};

// --- Public Re-exports ---

pub use audit::{AuditSink, PgAuditStore};
pub use config::AppConfig;
pub use repository::{PostgresRepository, RepositoryState};
pub use storage::{MockStorageService, S3StorageClient, StorageState};

/// ApiDoc
///
/// Aggregates every `#[utoipa::path]` handler and `ToSchema` model into the OpenAPI
/// document served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health, handlers::get_me, handlers::update_profile,
        handlers::get_onboarding_progress, handlers::resolve_referral, handlers::list_dev_users,
        handlers::get_menu, handlers::get_sitemap, handlers::list_audit_entries,
        handlers::create_avatar_upload
    ),
    components(
        schemas(
            models::SessionUser, models::DevUser, models::UpdateProfileRequest,
            models::AvatarUploadRequest, models::AvatarUploadResponse, models::SuccessResponse,
            models::MeResponse, models::ReferralResolveResponse, models::DevUsersResponse,
            models::HalLink, models::OnboardingLinks, models::OnboardingProgressResponse,
            models::MenuResponse, models::AuditListResponse,
            onboarding::OnboardingProgress, onboarding::OnboardingStep,
            menu::MenuName, menu::MenuAudience, menu::MatchMode, menu::MenuItem,
            audit::AuditEntry, audit::ActorType, audit::TargetType,
            error::ProblemDetails, error::ValidationIssue,
        )
    ),
    tags(
        (name = "lms-portal", description = "LMS Portal API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single shared container of application services and configuration,
/// cloned cheaply into every request.
#[derive(Clone)]
pub struct AppState {
    /// Repository Layer: sessions, profiles, referrals, events and the audit read side.
    pub repo: RepositoryState,
    /// Storage Layer: S3/MinIO presigned uploads.
    pub storage: StorageState,
    /// Audit write side. Opens its own connection per record.
    pub audit: AuditSink,
    /// Configuration: The loaded, immutable environment configuration.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

// Let extractors (notably `SessionUser`) pull single components out of `AppState`.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for AuditSink {
    fn from_ref(app_state: &AppState) -> AuditSink {
        app_state.audit.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Guards `authenticated_routes`. Extracting `SessionUser` rejects the request with a
/// 401 Problem Details body before the handler runs when no session resolves.
async fn auth_middleware(_session: SessionUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the routing structure, applies global and scoped middleware,
/// and registers the application state.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Public Routes: the session, when present, only widens what menus show.
        .merge(public::public_routes())
        // Authenticated Routes: Protected by the `auth_middleware`.
        .merge(
            authenticated::authenticated_routes()
                .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware)),
        )
        // Admin Routes: authenticated by the same layer; the admin audience check
        // happens inside the handlers.
        .nest(
            "/api/v1/admin",
            admin::admin_routes()
                .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware)),
        )
        // Dev Routes: gated on `Env::Local` inside the handlers.
        .nest("/api/v1/dev", dev::dev_routes())
        .with_state(state);

    // 3. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                // 3a. Request ID Generation: a UUID for every incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 3b. Request Tracing: one span per request, tagged with the request id.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 3c. Request ID Propagation: echo x-request-id back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS Layer
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the `TraceLayer` span so every log line for a request carries its id.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
