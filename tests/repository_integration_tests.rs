//! Postgres-backed repository tests. Run with a migrated database:
//! `DATABASE_URL=postgres://... cargo test -- --ignored`

use chrono::{DateTime, Duration, Utc};
use lms_portal::{
    audit::{AuditRecord, AuditSink, PgAuditStore, TargetType},
    auth::{SessionLookup, hash_session_token},
    models::{AuditFilter, UpdateProfileRequest},
    repository::{PostgresRepository, Repository},
    sitemap::{EventListing, EventQuery, EventStatus, collect_published_event_paths},
};
use serde_json::{Map, json};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

// --- Test Context and Setup ---

/// A simple structure to hold the database pool for testing
struct DbTestContext {
    pool: PgPool,
    db_url: String,
}

impl DbTestContext {
    async fn setup() -> Self {
        dotenv::dotenv().ok();

        let db_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set to run integration tests");

        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run database migrations.");

        DbTestContext { pool, db_url }
    }

    fn repository(&self) -> PostgresRepository {
        PostgresRepository::new(self.pool.clone())
    }
}

// --- Test Data Helpers ---

async fn create_test_user(pool: &PgPool, roles: &[&str]) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, email, display_name) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(format!("{}@test.example", id))
        .bind("Tester")
        .execute(pool)
        .await
        .unwrap();

    for role in roles {
        sqlx::query(
            "INSERT INTO user_roles (user_id, role_id) SELECT $1, id FROM roles WHERE name = $2",
        )
        .bind(id)
        .bind(*role)
        .execute(pool)
        .await
        .unwrap();
    }
    id
}

async fn create_session(pool: &PgPool, user_id: Uuid, token: &str, created_days_ago: i64) {
    create_session_at(
        pool,
        user_id,
        token,
        Duration::days(created_days_ago),
        Duration::days(created_days_ago),
        Duration::days(7),
    )
    .await;
}

async fn create_session_at(
    pool: &PgPool,
    user_id: Uuid,
    token: &str,
    created_ago: Duration,
    last_seen_ago: Duration,
    expires_in: Duration,
) {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO api_sessions (id, user_id, token_hash, created_at, last_seen_at, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(hash_session_token(token))
    .bind(now - created_ago)
    .bind(now - last_seen_ago)
    .bind(now + expires_in)
    .execute(pool)
    .await
    .unwrap();
}

async fn session_times(pool: &PgPool, token: &str) -> (DateTime<Utc>, DateTime<Utc>, Option<DateTime<Utc>>) {
    sqlx::query_as("SELECT last_seen_at, expires_at, revoked_at FROM api_sessions WHERE token_hash = $1")
        .bind(hash_session_token(token))
        .fetch_one(pool)
        .await
        .unwrap()
}

// --- Tests ---

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_session_lookup_aggregates_roles() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let user_id = create_test_user(&ctx.pool, &["USER", "ADMIN"]).await;
    let token = Uuid::new_v4().to_string();
    create_session(&ctx.pool, user_id, &token, 0).await;

    let user = repo
        .find_session_user(&hash_session_token(&token))
        .await
        .unwrap()
        .expect("session should resolve");

    assert_eq!(user.id, user_id);
    assert_eq!(user.status, "ACTIVE");
    assert_eq!(user.roles, vec!["ADMIN", "USER"]);
    assert!(user.is_admin());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_session_outside_absolute_lifetime_is_rejected() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let user_id = create_test_user(&ctx.pool, &[]).await;
    let token = Uuid::new_v4().to_string();
    create_session(&ctx.pool, user_id, &token, 31).await;

    let user = repo.find_session_user(&hash_session_token(&token)).await.unwrap();
    assert!(user.is_none());

    let (_, _, revoked_at) = session_times(&ctx.pool, &token).await;
    assert!(revoked_at.is_some(), "expired session should be revoked");
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_stale_session_slides_expiry_forward() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let user_id = create_test_user(&ctx.pool, &["USER"]).await;
    let token = Uuid::new_v4().to_string();
    create_session_at(
        &ctx.pool,
        user_id,
        &token,
        Duration::days(2),
        Duration::hours(2),
        Duration::days(1),
    )
    .await;

    let user = repo.find_session_user(&hash_session_token(&token)).await.unwrap();
    assert!(user.is_some());

    let (last_seen_at, expires_at, _) = session_times(&ctx.pool, &token).await;
    let now = Utc::now();
    assert!(now - last_seen_at < Duration::minutes(1));
    let drift = (expires_at - (now + Duration::days(7))).num_seconds().abs();
    assert!(drift < 60, "expiry should be about seven days out, drift {}s", drift);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_recent_lookups_leave_activity_window_intact() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let user_id = create_test_user(&ctx.pool, &["USER"]).await;
    let token = Uuid::new_v4().to_string();
    create_session_at(
        &ctx.pool,
        user_id,
        &token,
        Duration::days(2),
        Duration::minutes(50),
        Duration::days(1),
    )
    .await;
    let (seeded_last_seen, seeded_expires, _) = session_times(&ctx.pool, &token).await;

    // Lookups inside the hour must not reset the activity clock.
    for _ in 0..3 {
        let user = repo.find_session_user(&hash_session_token(&token)).await.unwrap();
        assert!(user.is_some());
    }
    let (last_seen_at, expires_at, _) = session_times(&ctx.pool, &token).await;
    assert_eq!(last_seen_at, seeded_last_seen);
    assert_eq!(expires_at, seeded_expires);

    // Once the last activity is over an hour old, the next lookup slides the expiry.
    sqlx::query("UPDATE api_sessions SET last_seen_at = NOW() - INTERVAL '70 minutes' WHERE token_hash = $1")
        .bind(hash_session_token(&token))
        .execute(&ctx.pool)
        .await
        .unwrap();
    repo.find_session_user(&hash_session_token(&token)).await.unwrap();

    let (_, expires_at, _) = session_times(&ctx.pool, &token).await;
    assert!(expires_at - Utc::now() > Duration::days(6));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_user_without_roles_has_empty_role_list() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let user_id = create_test_user(&ctx.pool, &[]).await;

    let user = repo.find_active_user(user_id).await.unwrap().unwrap();
    assert!(user.roles.is_empty());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_update_profile_keeps_absent_fields() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let user_id = create_test_user(&ctx.pool, &["USER"]).await;

    repo.update_profile(
        user_id,
        &UpdateProfileRequest {
            bio: Some("New bio".to_string()),
            ..UpdateProfileRequest::default()
        },
    )
    .await
    .unwrap();

    let (display_name, bio): (Option<String>, Option<String>) =
        sqlx::query_as("SELECT display_name, bio FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(&ctx.pool)
            .await
            .unwrap();
    assert_eq!(display_name.as_deref(), Some("Tester"));
    assert_eq!(bio.as_deref(), Some("New bio"));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_referral_lookup_by_normalized_code() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let user_id = create_test_user(&ctx.pool, &["USER"]).await;
    let code = format!("R{}", &Uuid::new_v4().simple().to_string()[..8]).to_uppercase();

    sqlx::query("INSERT INTO referral_codes (code, user_id) VALUES ($1, $2)")
        .bind(&code)
        .bind(user_id)
        .execute(&ctx.pool)
        .await
        .unwrap();

    let found = repo.find_referrer_by_code(&code).await.unwrap().unwrap();
    assert_eq!(found.display_name.as_deref(), Some("Tester"));
    assert!(repo.find_referrer_by_code("NO-SUCH-CODE").await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_published_events_page_in_order() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let prefix = Uuid::new_v4().simple().to_string();

    for (i, status) in ["PUBLISHED", "DRAFT", "PUBLISHED"].iter().enumerate() {
        sqlx::query(
            "INSERT INTO events (id, slug, title, status, starts_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::new_v4())
        .bind(format!("{}-{}", prefix, i))
        .bind(format!("Event {}", i))
        .bind(*status)
        .bind(Utc::now() + Duration::days(i as i64))
        .execute(&ctx.pool)
        .await
        .unwrap();
    }

    let page = repo
        .list_events(EventQuery {
            status: EventStatus::Published,
            limit: 1000,
            offset: 0,
        })
        .await
        .unwrap();
    let ours: Vec<&str> = page
        .items
        .iter()
        .map(|e| e.slug.as_str())
        .filter(|slug| slug.starts_with(&prefix))
        .collect();
    assert_eq!(ours, vec![format!("{}-0", prefix), format!("{}-2", prefix)]);

    let paths = collect_published_event_paths(&repo).await.unwrap();
    assert!(paths.contains(&format!("/events/{}-0", prefix)));
    assert!(!paths.contains(&format!("/events/{}-1", prefix)));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_audit_round_trip_redacts_on_read() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let sink = AuditSink::new(Arc::new(PgAuditStore::new(ctx.db_url.clone())));
    let actor = create_test_user(&ctx.pool, &["USER"]).await;

    let mut metadata = Map::new();
    metadata.insert("email".to_string(), json!("ada@example.com"));
    metadata.insert("fields".to_string(), json!(["bio"]));

    sink.record(
        AuditRecord::new("api.test.redaction", "req-db", TargetType::User)
            .by_user(actor)
            .metadata(metadata),
    )
    .await
    .unwrap();

    let filter = AuditFilter {
        actor_id: Some(actor),
        ..AuditFilter::default()
    };
    let entries = repo.list_audit_entries(&filter, 10, 0).await.unwrap();

    assert_eq!(entries.len(), 1);
    let stored = entries[0].metadata.as_ref().unwrap();
    assert_eq!(stored["email"], json!("[REDACTED]"));
    assert_eq!(stored["fields"], json!(["bio"]));
    assert_eq!(entries[0].request_id, "req-db");
}
