use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::{Connection, PgConnection, types::Json};
use std::sync::Arc;
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    System,
    Event,
    Registration,
    User,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::System => "system",
            TargetType::Event => "event",
            TargetType::Registration => "registration",
            TargetType::User => "user",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, TS, Default)]
#[ts(export)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActorType {
    User,
    #[default]
    Service,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorType::User => "USER",
            ActorType::Service => "SERVICE",
        }
    }
}

/// AuditRecord
///
/// What a caller hands to the sink at the moment of a side-effecting action.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub action: String,
    pub request_id: String,
    pub target_type: TargetType,
    pub target_id: Option<String>,
    pub actor_type: ActorType,
    pub actor_id: Option<Uuid>,
    pub metadata: Option<Map<String, Value>>,
}

impl AuditRecord {
    /// A SERVICE-attributed record with no target id or metadata.
    pub fn new(action: impl Into<String>, request_id: impl Into<String>, target_type: TargetType) -> Self {
        Self {
            action: action.into(),
            request_id: request_id.into(),
            target_type,
            target_id: None,
            actor_type: ActorType::Service,
            actor_id: None,
            metadata: None,
        }
    }

    pub fn by_user(mut self, user_id: Uuid) -> Self {
        self.actor_type = ActorType::User;
        self.actor_id = Some(user_id);
        self
    }

    pub fn target(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    pub fn metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// AuditEntry
///
/// A persisted row of `audit_log`: the record plus server-generated id and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct AuditEntry {
    pub id: Uuid,
    pub actor_type: ActorType,
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub target_type: TargetType,
    pub target_id: Option<String>,
    #[ts(type = "Record<string, unknown> | null")]
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<Map<String, Value>>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    pub request_id: String,
}

impl AuditEntry {
    fn stamp(record: AuditRecord, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor_type: record.actor_type,
            actor_id: record.actor_id,
            action: record.action,
            target_type: record.target_type,
            target_id: record.target_id,
            metadata: record.metadata,
            created_at: now,
            request_id: record.request_id,
        }
    }
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("failed to open audit store: {0}")]
    Open(#[source] sqlx::Error),

    #[error("failed to append audit entry: {0}")]
    Append(#[source] sqlx::Error),

    #[error("failed to close audit store: {0}")]
    Close(#[source] sqlx::Error),

    #[error("audit store unavailable: {0}")]
    Unavailable(String),
}

/// AuditStore
///
/// Opens a dedicated connection for a single append. No pooling or reuse across calls.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn open(&self) -> Result<Box<dyn AuditConnection>, AuditError>;
}

/// AuditConnection
///
/// A live handle to the audit datastore. `close` consumes the handle and must be
/// called on every path; Rust has no async drop to do it implicitly.
#[async_trait]
pub trait AuditConnection: Send {
    async fn append(&mut self, entry: &AuditEntry) -> Result<(), AuditError>;
    async fn close(self: Box<Self>) -> Result<(), AuditError>;
}

/// AuditSink
///
/// Append-only audit recorder shared through the application state.
#[derive(Clone)]
pub struct AuditSink {
    store: Arc<dyn AuditStore>,
}

impl AuditSink {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// record
    ///
    /// Opens a connection, appends one entry stamped with a fresh id and the current time,
    /// then closes the connection whether or not the append succeeded. An append error is
    /// returned after the close; a close error surfaces only when the append succeeded.
    /// Not idempotent: every call appends a new row.
    pub async fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        let entry = AuditEntry::stamp(record, Utc::now());
        let mut conn = self.store.open().await?;

        let appended = conn.append(&entry).await;
        let closed = conn.close().await;

        match (appended, closed) {
            (Err(append_err), Err(close_err)) => {
                tracing::warn!(error = ?close_err, "audit connection close failed after append error");
                Err(append_err)
            }
            (Err(append_err), Ok(())) => Err(append_err),
            (Ok(()), closed) => {
                closed?;
                tracing::debug!(action = %entry.action, request_id = %entry.request_id, "audit entry recorded");
                Ok(())
            }
        }
    }
}

/// PgAuditStore
///
/// Postgres-backed audit store. Each `open` establishes a fresh `PgConnection`.
pub struct PgAuditStore {
    db_url: String,
}

impl PgAuditStore {
    pub fn new(db_url: impl Into<String>) -> Self {
        Self {
            db_url: db_url.into(),
        }
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn open(&self) -> Result<Box<dyn AuditConnection>, AuditError> {
        let conn = PgConnection::connect(&self.db_url)
            .await
            .map_err(AuditError::Open)?;
        Ok(Box::new(PgAuditConnection { conn }))
    }
}

struct PgAuditConnection {
    conn: PgConnection,
}

#[async_trait]
impl AuditConnection for PgAuditConnection {
    async fn append(&mut self, entry: &AuditEntry) -> Result<(), AuditError> {
        sqlx::query(
            r#"
            INSERT INTO audit_log
                (id, actor_type, actor_id, action, target_type, target_id, metadata, created_at, request_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id)
        .bind(entry.actor_type.as_str())
        .bind(entry.actor_id)
        .bind(&entry.action)
        .bind(entry.target_type.as_str())
        .bind(&entry.target_id)
        .bind(entry.metadata.clone().map(|m| Json(Value::Object(m))))
        .bind(entry.created_at)
        .bind(&entry.request_id)
        .execute(&mut self.conn)
        .await
        .map_err(AuditError::Append)?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), AuditError> {
        self.conn.close().await.map_err(AuditError::Close)
    }
}

// --- Read-side redaction ---

const REDACTED: &str = "[REDACTED]";

fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    ["token", "password", "secret", "email"]
        .iter()
        .any(|needle| key.contains(needle))
}

/// Replaces the value of every sensitive key, at any depth, with `[REDACTED]`.
pub fn redact_value(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(redact_value).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, nested)| {
                    if is_sensitive_key(&key) {
                        (key, Value::String(REDACTED.to_string()))
                    } else {
                        (key, redact_value(nested))
                    }
                })
                .collect(),
        ),
        other => other,
    }
}

/// Redacts stored metadata for display. Non-object payloads are wrapped as `{value: ...}`.
pub fn redact_metadata(raw: Option<Value>) -> Option<Map<String, Value>> {
    match redact_value(raw?) {
        Value::Null => None,
        Value::Object(map) => Some(map),
        other => {
            let mut wrapped = Map::new();
            wrapped.insert("value".to_string(), other);
            Some(wrapped)
        }
    }
}

/// Clamps a requested page size into `[1, 200]`, defaulting to 50.
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(50).clamp(1, 200)
}

pub fn clamp_offset(offset: Option<i64>) -> i64 {
    offset.unwrap_or(0).max(0)
}
