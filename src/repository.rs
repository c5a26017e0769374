use crate::audit::{redact_metadata, ActorType, AuditEntry, TargetType};
use crate::auth::SessionLookup;
use crate::models::{AuditFilter, DevUser, OnboardingCompletion, ReferralMatch, SessionUser, UpdateProfileRequest};
use crate::sitemap::{EventListing, EventPage, EventQuery, EventSummary};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{query_builder::QueryBuilder, types::Json, FromRow, PgPool};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Sessions older than this are rejected regardless of their sliding expiry.
const SESSION_ABSOLUTE_TTL_DAYS: i32 = 30;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Repository Trait
///
/// Defines the abstract contract for all persistence operations, so handlers interact with
/// the data layer without knowing the specific implementation (Postgres, Mock, etc.).
///
/// Session lookup and event listing are separate supertraits because the auth extractor,
/// the menu resolver and the sitemap builder only need those narrow views.
///
/// **Send + Sync + async_trait** are required to make the trait object (`Arc<dyn Repository>`)
/// safely shareable across Axum's asynchronous task boundaries.
#[async_trait]
pub trait Repository: SessionLookup + EventListing + Send + Sync {
    // --- Account ---
    // Partial update: absent fields keep their stored value.
    async fn update_profile(&self, user_id: Uuid, req: &UpdateProfileRequest) -> Result<(), RepoError>;
    async fn get_onboarding_completions(&self, user_id: Uuid) -> Result<BTreeMap<String, DateTime<Utc>>, RepoError>;

    // --- Referrals ---
    // `code` is expected already normalized (trimmed, uppercased).
    async fn find_referrer_by_code(&self, code: &str) -> Result<Option<ReferralMatch>, RepoError>;

    // --- Dev tools ---
    async fn list_active_users(&self, limit: i64) -> Result<Vec<DevUser>, RepoError>;

    // --- Audit (read side) ---
    async fn list_audit_entries(&self, filter: &AuditFilter, limit: i64, offset: i64) -> Result<Vec<AuditEntry>, RepoError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer access across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by the PostgreSQL database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Aggregates role names per user; users without roles get an empty array, not NULL.
const USER_WITH_ROLES: &str = r#"
    SELECT u.id, u.email, u.status,
           COALESCE(array_agg(r.name ORDER BY r.name) FILTER (WHERE r.name IS NOT NULL), '{}') AS roles
    FROM users u
    LEFT JOIN user_roles ur ON ur.user_id = u.id
    LEFT JOIN roles r ON r.id = ur.role_id
"#;

#[derive(FromRow)]
struct AuditRow {
    id: Uuid,
    actor_type: String,
    actor_id: Option<Uuid>,
    action: String,
    target_type: String,
    target_id: Option<String>,
    metadata: Option<Json<Value>>,
    created_at: DateTime<Utc>,
    request_id: String,
}

impl From<AuditRow> for AuditEntry {
    fn from(row: AuditRow) -> Self {
        let actor_type = match row.actor_type.as_str() {
            "USER" => ActorType::User,
            _ => ActorType::Service,
        };
        let target_type = match row.target_type.as_str() {
            "event" => TargetType::Event,
            "registration" => TargetType::Registration,
            "user" => TargetType::User,
            _ => TargetType::System,
        };
        AuditEntry {
            id: row.id,
            actor_type,
            actor_id: row.actor_id,
            action: row.action,
            target_type,
            target_id: row.target_id,
            metadata: redact_metadata(row.metadata.map(|Json(value)| value)),
            created_at: row.created_at,
            request_id: row.request_id,
        }
    }
}

#[async_trait]
impl SessionLookup for PostgresRepository {
    /// find_session_user
    ///
    /// A session is valid while it is unrevoked, before its sliding expiry, and inside the
    /// absolute lifetime. Sessions past the absolute lifetime are revoked on sight. When
    /// `last_seen_at` is more than an hour old, both `last_seen_at` and `expires_at` move
    /// forward; lookups inside that hour leave the row untouched.
    async fn find_session_user(&self, token_hash: &str) -> Result<Option<SessionUser>, RepoError> {
        let revoked = sqlx::query(
            r#"
            UPDATE api_sessions
            SET revoked_at = NOW()
            WHERE token_hash = $1
              AND revoked_at IS NULL
              AND created_at <= NOW() - make_interval(days => $2)
            "#,
        )
        .bind(token_hash)
        .bind(SESSION_ABSOLUTE_TTL_DAYS)
        .execute(&self.pool)
        .await?;

        if revoked.rows_affected() > 0 {
            tracing::debug!("session past absolute lifetime revoked");
            return Ok(None);
        }

        let session: Option<(Uuid, Uuid)> = sqlx::query_as(
            r#"
            UPDATE api_sessions s
            SET last_seen_at = CASE
                    WHEN s.last_seen_at < NOW() - INTERVAL '1 hour' THEN NOW()
                    ELSE s.last_seen_at
                END,
                expires_at = CASE
                    WHEN s.last_seen_at < NOW() - INTERVAL '1 hour' THEN NOW() + INTERVAL '7 days'
                    ELSE s.expires_at
                END
            WHERE s.token_hash = $1
              AND s.revoked_at IS NULL
              AND s.expires_at > NOW()
              AND s.created_at > NOW() - make_interval(days => $2)
            RETURNING s.id, s.user_id
            "#,
        )
        .bind(token_hash)
        .bind(SESSION_ABSOLUTE_TTL_DAYS)
        .fetch_optional(&self.pool)
        .await?;

        let Some((session_id, user_id)) = session else {
            return Ok(None);
        };
        tracing::debug!(%session_id, %user_id, "session resolved");

        self.find_active_user(user_id).await
    }

    async fn find_active_user(&self, id: Uuid) -> Result<Option<SessionUser>, RepoError> {
        let query = format!("{USER_WITH_ROLES} WHERE u.id = $1 AND u.status = 'ACTIVE' GROUP BY u.id");
        let user = sqlx::query_as::<_, SessionUser>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }
}

#[async_trait]
impl EventListing for PostgresRepository {
    async fn list_events(&self, query: EventQuery) -> Result<EventPage, RepoError> {
        let items = sqlx::query_as::<_, EventSummary>(
            r#"
            SELECT slug, title FROM events
            WHERE status = $1
            ORDER BY starts_at ASC, id ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(query.status.as_str())
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(EventPage { items })
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    /// update_profile
    ///
    /// Uses `COALESCE` so only the fields present in `req` overwrite the stored row.
    async fn update_profile(&self, user_id: Uuid, req: &UpdateProfileRequest) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            UPDATE users
            SET display_name = COALESCE($2, display_name),
                bio = COALESCE($3, bio),
                profile_picture_url = COALESCE($4, profile_picture_url),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(&req.display_name)
        .bind(&req.bio)
        .bind(&req.profile_picture_url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_onboarding_completions(&self, user_id: Uuid) -> Result<BTreeMap<String, DateTime<Utc>>, RepoError> {
        let rows = sqlx::query_as::<_, OnboardingCompletion>(
            "SELECT step_id, completed_at FROM onboarding_completions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.step_id, row.completed_at))
            .collect())
    }

    /// find_referrer_by_code
    ///
    /// Only active codes owned by ACTIVE users resolve.
    async fn find_referrer_by_code(&self, code: &str) -> Result<Option<ReferralMatch>, RepoError> {
        let found = sqlx::query_as::<_, ReferralMatch>(
            r#"
            SELECT u.display_name
            FROM referral_codes rc
            JOIN users u ON u.id = rc.user_id
            WHERE rc.code = $1 AND rc.is_active = true AND u.status = 'ACTIVE'
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found)
    }

    async fn list_active_users(&self, limit: i64) -> Result<Vec<DevUser>, RepoError> {
        let query = format!("{USER_WITH_ROLES} WHERE u.status = 'ACTIVE' GROUP BY u.id ORDER BY u.email ASC LIMIT $1");
        let users = sqlx::query_as::<_, DevUser>(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    /// list_audit_entries
    ///
    /// Builds the filter with `QueryBuilder` so every value is a bound parameter.
    /// Metadata is redacted before it leaves the repository.
    async fn list_audit_entries(&self, filter: &AuditFilter, limit: i64, offset: i64) -> Result<Vec<AuditEntry>, RepoError> {
        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
            r#"
            SELECT id, actor_type, actor_id, action, target_type, target_id,
                   metadata, created_at, request_id
            FROM audit_log
            WHERE 1 = 1
            "#,
        );

        if let Some(action) = &filter.action {
            builder.push(" AND action = ");
            builder.push_bind(action.clone());
        }
        if let Some(actor_id) = filter.actor_id {
            builder.push(" AND actor_id = ");
            builder.push_bind(actor_id);
        }
        if let Some(from) = filter.from {
            builder.push(" AND created_at >= ");
            builder.push_bind(from);
        }
        if let Some(to) = filter.to {
            builder.push(" AND created_at <= ");
            builder.push_bind(to);
        }

        builder.push(" ORDER BY created_at DESC LIMIT ");
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(offset);

        let rows = builder
            .build_query_as::<AuditRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(AuditEntry::from).collect())
    }
}
