use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    audit::AuditEntry,
    error::ValidationIssue,
    menu::{MenuAudience, MenuItem, MenuName},
    onboarding::OnboardingProgress,
};

// --- Core Application Schemas (Mapped to Database) ---

/// SessionUser
///
/// The verified identity behind a request: the `users` row plus its aggregated role names.
/// Resolved from the session cookie (or the local `x-user-id` bypass) by the auth extractor.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct SessionUser {
    pub id: Uuid,
    pub email: String,
    // 'ACTIVE', 'SUSPENDED' or 'DELETED'. Only ACTIVE users resolve from a session.
    pub status: String,
    // Role names such as 'USER', 'ADMIN', 'SUPER_ADMIN', 'MAESTRO', 'APPRENTICE'.
    pub roles: Vec<String>,
}

/// DevUser
///
/// Row shape for the local-only user switcher listing.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct DevUser {
    pub id: Uuid,
    pub email: String,
    pub roles: Vec<String>,
}

/// ReferralMatch
///
/// The referring member behind a referral code. Display name is optional on profiles.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct ReferralMatch {
    pub display_name: Option<String>,
}

/// OnboardingCompletion
///
/// One completed onboarding step, keyed by step id.
#[derive(Debug, Clone, FromRow)]
pub struct OnboardingCompletion {
    pub step_id: String,
    pub completed_at: DateTime<Utc>,
}

// --- Request Payloads (Input Schemas) ---

pub const DISPLAY_NAME_MAX: usize = 80;
pub const BIO_MAX: usize = 500;
pub const PICTURE_URL_MAX: usize = 2048;

/// UpdateProfileRequest
///
/// Partial update payload for PUT /api/v1/account/profile. Absent fields are left
/// untouched by the repository (COALESCE update).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateProfileRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_picture_url: Option<String>,
}

impl UpdateProfileRequest {
    /// Checks every provided field and reports one issue per offending field.
    /// `display_name` is returned trimmed on success.
    pub fn validate(mut self) -> Result<Self, Vec<ValidationIssue>> {
        let mut issues = Vec::new();

        if let Some(name) = self.display_name.as_mut() {
            let trimmed = name.trim().to_string();
            let len = trimmed.chars().count();
            if len == 0 {
                issues.push(ValidationIssue::new("display_name", "must not be empty"));
            } else if len > DISPLAY_NAME_MAX {
                issues.push(ValidationIssue::new(
                    "display_name",
                    format!("must be at most {} characters", DISPLAY_NAME_MAX),
                ));
            }
            *name = trimmed;
        }

        if let Some(bio) = &self.bio {
            if bio.chars().count() > BIO_MAX {
                issues.push(ValidationIssue::new(
                    "bio",
                    format!("must be at most {} characters", BIO_MAX),
                ));
            }
        }

        if let Some(url) = &self.profile_picture_url {
            let allowed_prefix = ["https://", "http://", "/api/v1/files/"]
                .iter()
                .any(|prefix| url.starts_with(prefix));
            if url.len() > PICTURE_URL_MAX {
                issues.push(ValidationIssue::new(
                    "profile_picture_url",
                    format!("must be at most {} characters", PICTURE_URL_MAX),
                ));
            } else if !allowed_prefix {
                issues.push(ValidationIssue::new(
                    "profile_picture_url",
                    "must be an http(s) URL or an uploaded file path",
                ));
            }
        }

        if issues.is_empty() {
            Ok(self)
        } else {
            Err(issues)
        }
    }
}

/// ReferralQuery
///
/// Query parameters for GET /api/v1/referrals/resolve.
#[derive(Debug, Deserialize, IntoParams)]
pub struct ReferralQuery {
    /// The referral code as typed by the visitor. Matched case-insensitively.
    pub code: Option<String>,
}

/// AvatarUploadRequest
///
/// Input payload for requesting a short-lived avatar upload URL.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct AvatarUploadRequest {
    #[schema(example = "image/png")]
    pub content_type: String,
    #[schema(example = 524288)]
    pub size_bytes: u64,
}

/// AuditFilter
///
/// Query parameters for the admin audit listing.
#[derive(Debug, Clone, Deserialize, IntoParams, Default)]
pub struct AuditFilter {
    pub action: Option<String>,
    pub actor_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// --- Response Schemas (Output) ---

/// SuccessResponse
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct SuccessResponse {
    pub success: bool,
}

/// MeResponse
///
/// The authenticated caller's identity and derived navigation audience (GET /api/v1/me).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct MeResponse {
    pub id: Uuid,
    pub email: String,
    pub roles: Vec<String>,
    pub audience: MenuAudience,
}

/// ReferralResolveResponse
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct ReferralResolveResponse {
    pub display_name: Option<String>,
}

/// DevUsersResponse
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct DevUsersResponse {
    pub users: Vec<DevUser>,
}

/// HalLink
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, PartialEq)]
#[ts(export)]
pub struct HalLink {
    pub href: String,
}

impl HalLink {
    pub fn new(href: impl Into<String>) -> Self {
        Self { href: href.into() }
    }
}

/// OnboardingLinks
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct OnboardingLinks {
    #[serde(rename = "self")]
    pub self_link: HalLink,
    pub profile: HalLink,
    pub events: HalLink,
}

/// OnboardingProgressResponse
///
/// HAL-style body for GET /api/v1/onboarding/progress.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingProgressResponse {
    pub user_id: Uuid,
    // Step id -> completion timestamp.
    #[ts(type = "Record<string, string>")]
    pub completions: BTreeMap<String, DateTime<Utc>>,
    pub progress: OnboardingProgress,
    #[serde(rename = "_links")]
    pub links: OnboardingLinks,
}

/// AvatarUploadResponse
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct AvatarUploadResponse {
    /// The time-limited URL for the PUT request.
    pub upload_url: String,
    /// The object key where the file will be stored.
    pub resource_key: String,
    /// The value to store as `profile_picture_url` once the upload completes.
    pub file_url: String,
}

/// MenuResponse
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct MenuResponse {
    pub menu: MenuName,
    pub audience: MenuAudience,
    pub items: Vec<MenuItem>,
}

/// AuditListResponse
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct AuditListResponse {
    pub count: usize,
    pub limit: i64,
    pub offset: i64,
    pub items: Vec<AuditEntry>,
}
