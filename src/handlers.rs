use crate::{
    AppState,
    audit::{AuditRecord, TargetType, clamp_limit, clamp_offset},
    auth::{RequestId, cookie_header},
    error::{ApiError, ProblemDetails, ValidationIssue},
    menu::{self, MenuContext, MenuName},
    models::{
        AuditFilter, AuditListResponse, AvatarUploadRequest, AvatarUploadResponse, DevUsersResponse, HalLink,
        MeResponse, MenuResponse, OnboardingLinks, OnboardingProgressResponse, ReferralQuery,
        ReferralResolveResponse, SessionUser, SuccessResponse, UpdateProfileRequest,
    },
    onboarding, sitemap, storage,
};
use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::{HeaderMap, header},
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::{Map, Value, json};

/// Maximum number of users the local user switcher lists.
const DEV_USER_LIMIT: i64 = 50;

/// health
///
/// Liveness probe for load balancers. Never touches the database.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = String))
)]
pub async fn health() -> &'static str {
    "ok"
}

/// get_me
///
/// [Authenticated Route] Returns the resolved session identity and its navigation audience.
#[utoipa::path(
    get,
    path = "/api/v1/me",
    responses(
        (status = 200, description = "Current user", body = MeResponse),
        (status = 401, description = "No session", body = ProblemDetails)
    )
)]
pub async fn get_me(user: SessionUser) -> Json<MeResponse> {
    let audience = MenuContext::for_session(Some(&user)).audience;
    Json(MeResponse {
        id: user.id,
        email: user.email,
        roles: user.roles,
        audience,
    })
}

/// update_profile
///
/// [Authenticated Route] Partially updates the caller's profile and records an audit entry.
///
/// A body that is not a JSON object is reported as a single `root` issue; field rules are
/// checked by `UpdateProfileRequest::validate`.
#[utoipa::path(
    put,
    path = "/api/v1/account/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = SuccessResponse),
        (status = 400, description = "Invalid body", body = ProblemDetails),
        (status = 401, description = "No session", body = ProblemDetails)
    )
)]
pub async fn update_profile(
    user: SessionUser,
    State(state): State<AppState>,
    request_id: RequestId,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let Json(payload) = payload.map_err(|rejection| {
        ApiError::Validation(vec![ValidationIssue::new("root", rejection.body_text())])
    })?;
    let payload = payload.validate().map_err(ApiError::Validation)?;

    state.repo.update_profile(user.id, &payload).await?;

    // Only the names of the changed fields are recorded, never their values.
    let fields: Vec<&str> = [
        ("display_name", payload.display_name.is_some()),
        ("bio", payload.bio.is_some()),
        ("profile_picture_url", payload.profile_picture_url.is_some()),
    ]
    .into_iter()
    .filter_map(|(name, present)| present.then_some(name))
    .collect();

    let mut metadata = Map::new();
    metadata.insert("fields".to_string(), json!(fields));

    state
        .audit
        .record(
            AuditRecord::new("api.account.profile.update", request_id.as_str(), TargetType::User)
                .by_user(user.id)
                .target(user.id.to_string())
                .metadata(metadata),
        )
        .await?;

    tracing::info!(user_id = %user.id, "profile updated");
    Ok(Json(SuccessResponse { success: true }))
}

/// get_onboarding_progress
///
/// [Authenticated Route] Returns the caller's completed steps and the derived progress view.
#[utoipa::path(
    get,
    path = "/api/v1/onboarding/progress",
    responses(
        (status = 200, description = "Onboarding progress", body = OnboardingProgressResponse),
        (status = 401, description = "No session", body = ProblemDetails)
    )
)]
pub async fn get_onboarding_progress(
    user: SessionUser,
    State(state): State<AppState>,
) -> Result<Json<OnboardingProgressResponse>, ApiError> {
    let completions = state.repo.get_onboarding_completions(user.id).await?;
    let progress =
        onboarding::build_onboarding_progress(&completions, onboarding::includes_client_steps(&completions));

    Ok(Json(OnboardingProgressResponse {
        user_id: user.id,
        completions,
        progress,
        links: OnboardingLinks {
            self_link: HalLink::new("/api/v1/onboarding/progress"),
            profile: HalLink::new("/api/v1/account/profile"),
            events: HalLink::new("/events"),
        },
    }))
}

/// resolve_referral
///
/// [Public Route] Looks up who owns a referral code. Codes are matched case-insensitively
/// by normalizing to upper case before the query.
#[utoipa::path(
    get,
    path = "/api/v1/referrals/resolve",
    params(ReferralQuery),
    responses(
        (status = 200, description = "Referrer found", body = ReferralResolveResponse),
        (status = 400, description = "Missing code", body = ProblemDetails),
        (status = 404, description = "Unknown code", body = ProblemDetails)
    )
)]
pub async fn resolve_referral(
    State(state): State<AppState>,
    Query(query): Query<ReferralQuery>,
) -> Result<Json<ReferralResolveResponse>, ApiError> {
    let code = query
        .code
        .as_deref()
        .map(|code| code.trim().to_uppercase())
        .filter(|code| !code.is_empty())
        .ok_or_else(|| ApiError::BadRequest("A referral code is required.".to_string()))?;

    let referrer = state
        .repo
        .find_referrer_by_code(&code)
        .await?
        .ok_or_else(|| ApiError::NotFound("Referral code not found.".to_string()))?;

    Ok(Json(ReferralResolveResponse {
        display_name: referrer.display_name,
    }))
}

/// list_dev_users
///
/// [Dev Route] Lists active users for the local user switcher. Answers 404 outside
/// `Env::Local` so the route is indistinguishable from a missing one.
#[utoipa::path(
    get,
    path = "/api/v1/dev/users",
    responses(
        (status = 200, description = "Active users", body = DevUsersResponse),
        (status = 404, description = "Not available in this environment", body = ProblemDetails)
    )
)]
pub async fn list_dev_users(State(state): State<AppState>) -> Result<Json<DevUsersResponse>, ApiError> {
    if !state.config.dev_tools_enabled() {
        return Err(ApiError::NotFound("Not found.".to_string()));
    }

    let users = state.repo.list_active_users(DEV_USER_LIMIT).await?;
    Ok(Json(DevUsersResponse { users }))
}

/// get_menu
///
/// [Public Route] Resolves a named menu for the caller's audience. The session is
/// optional here: lookup failures degrade to the guest menu instead of erroring.
#[utoipa::path(
    get,
    path = "/api/v1/menus/{name}",
    params(("name" = String, Path, description = "Menu name, e.g. publicHeader")),
    responses(
        (status = 200, description = "Filtered menu", body = MenuResponse),
        (status = 404, description = "Unknown menu", body = ProblemDetails)
    )
)]
pub async fn get_menu(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<Json<MenuResponse>, ApiError> {
    let menu_name: MenuName = name
        .parse()
        .map_err(|_| ApiError::NotFound(format!("Unknown menu '{}'.", name)))?;

    let context = menu::get_menu_context(cookie_header(&headers), state.repo.as_ref()).await;
    let items = menu::resolve_menu_for_context(menu_name, &context);

    Ok(Json(MenuResponse {
        menu: menu_name,
        audience: context.audience,
        items,
    }))
}

/// get_sitemap
///
/// [Public Route] Renders the sitemap from the guest-visible menu paths plus every
/// published event.
#[utoipa::path(
    get,
    path = "/sitemap.xml",
    responses(
        (status = 200, description = "Sitemap XML", content_type = "application/xml", body = String),
        (status = 500, description = "Event listing failed", body = ProblemDetails)
    )
)]
pub async fn get_sitemap(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let event_paths = sitemap::collect_published_event_paths(state.repo.as_ref()).await?;
    let static_paths = menu::sitemap_static_paths();

    let entries = sitemap::build_sitemap(&state.config.site_url, &static_paths, &event_paths, Utc::now());
    let xml = sitemap::render_sitemap_xml(&entries);

    Ok(([(header::CONTENT_TYPE, "application/xml")], xml))
}

/// list_audit_entries
///
/// [Admin Route] Pages through the audit log, newest first, with sensitive metadata redacted.
#[utoipa::path(
    get,
    path = "/api/v1/admin/audit",
    params(AuditFilter),
    responses(
        (status = 200, description = "Audit entries", body = AuditListResponse),
        (status = 401, description = "No session", body = ProblemDetails),
        (status = 403, description = "Not an admin", body = ProblemDetails)
    )
)]
pub async fn list_audit_entries(
    user: SessionUser,
    State(state): State<AppState>,
    Query(filter): Query<AuditFilter>,
) -> Result<Json<AuditListResponse>, ApiError> {
    if !user.is_admin() {
        return Err(ApiError::Forbidden);
    }

    let limit = clamp_limit(filter.limit);
    let offset = clamp_offset(filter.offset);
    let items = state.repo.list_audit_entries(&filter, limit, offset).await?;

    Ok(Json(AuditListResponse {
        count: items.len(),
        limit,
        offset,
        items,
    }))
}

/// create_avatar_upload
///
/// [Authenticated Route] Issues a presigned PUT URL for a new avatar under the caller's
/// prefix. The returned `file_url` is what the client later saves as `profile_picture_url`.
#[utoipa::path(
    post,
    path = "/api/v1/account/avatar/presigned",
    request_body = AvatarUploadRequest,
    responses(
        (status = 200, description = "Upload URL", body = AvatarUploadResponse),
        (status = 400, description = "Unsupported type or size", body = ProblemDetails),
        (status = 401, description = "No session", body = ProblemDetails)
    )
)]
pub async fn create_avatar_upload(
    user: SessionUser,
    State(state): State<AppState>,
    request_id: RequestId,
    payload: Result<Json<AvatarUploadRequest>, JsonRejection>,
) -> Result<Json<AvatarUploadResponse>, ApiError> {
    let Json(payload) = payload.map_err(|rejection| {
        ApiError::Validation(vec![ValidationIssue::new("root", rejection.body_text())])
    })?;
    let extension =
        storage::validate_avatar_upload(&payload.content_type, payload.size_bytes).map_err(ApiError::Validation)?;

    let key = storage::avatar_key(user.id, extension);
    let upload_url = state.storage.presign_upload(&key, &payload.content_type).await?;

    let mut metadata = Map::new();
    metadata.insert("content_type".to_string(), Value::String(payload.content_type));
    metadata.insert("size_bytes".to_string(), json!(payload.size_bytes));

    state
        .audit
        .record(
            AuditRecord::new("api.account.avatar.presign", request_id.as_str(), TargetType::User)
                .by_user(user.id)
                .target(key.clone())
                .metadata(metadata),
        )
        .await?;

    Ok(Json(AvatarUploadResponse {
        upload_url,
        file_url: storage::file_url(&key),
        resource_key: key,
    }))
}
