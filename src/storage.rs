use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::presigning::PresigningConfig;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::error::ValidationIssue;

/// Largest avatar accepted for upload (5 MiB).
pub const AVATAR_MAX_BYTES: u64 = 5 * 1024 * 1024;

/// Lifetime of a presigned upload URL.
const PRESIGN_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid presigning configuration: {0}")]
    Config(String),

    #[error("failed to presign upload: {0}")]
    Presign(String),
}

/// StorageService
///
/// Abstract contract for the object storage layer, so handlers work the same against
/// S3/MinIO (`S3StorageClient`) and the in-memory `MockStorageService`.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Ensures the configured bucket exists. Used in the `Env::Local` setup to provision
    /// the bucket in MinIO.
    async fn ensure_bucket_exists(&self);

    /// Generates a short-lived signed URL allowing a client to PUT `key` directly.
    /// The signature pins the `Content-Type` the client must send.
    async fn presign_upload(&self, key: &str, content_type: &str) -> Result<String, StorageError>;
}

/// S3StorageClient
///
/// Works against MinIO locally and any S3-compatible endpoint in production.
/// `force_path_style(true)` is required for MinIO.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
}

impl S3StorageClient {
    pub async fn new(endpoint: &str, region: &str, access_key: &str, secret_key: &str, bucket: &str) -> Self {
        let credentials = s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            bucket_name: bucket.to_string(),
        }
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    /// CreateBucket is idempotent enough for startup use; "already owned" errors are ignored.
    async fn ensure_bucket_exists(&self) {
        if let Err(e) = self.client.create_bucket().bucket(&self.bucket_name).send().await {
            tracing::debug!(bucket = %self.bucket_name, error = %e, "create_bucket skipped");
        }
    }

    async fn presign_upload(&self, key: &str, content_type: &str) -> Result<String, StorageError> {
        let presigning = PresigningConfig::expires_in(PRESIGN_TTL).map_err(|e| StorageError::Config(e.to_string()))?;

        let presigned_req = self
            .client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .content_type(content_type)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::Presign(e.to_string()))?;

        Ok(presigned_req.uri().to_string())
    }
}

/// Maps an accepted avatar content type to the file extension used in its key.
pub fn avatar_extension(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

/// validate_avatar_upload
///
/// Checks the declared type and size of an avatar and returns the extension to use.
pub fn validate_avatar_upload(content_type: &str, size_bytes: u64) -> Result<&'static str, Vec<ValidationIssue>> {
    let mut issues = Vec::new();

    let extension = avatar_extension(content_type);
    if extension.is_none() {
        issues.push(ValidationIssue::new(
            "content_type",
            "must be one of image/jpeg, image/png, image/webp, image/gif",
        ));
    }
    if size_bytes == 0 || size_bytes > AVATAR_MAX_BYTES {
        issues.push(ValidationIssue::new(
            "size_bytes",
            format!("must be between 1 and {} bytes", AVATAR_MAX_BYTES),
        ));
    }

    match extension {
        Some(ext) if issues.is_empty() => Ok(ext),
        _ => Err(issues),
    }
}

/// Object key for a new avatar: `avatars/{user_id}/{uuid}.{ext}`.
pub fn avatar_key(user_id: Uuid, extension: &str) -> String {
    format!("avatars/{}/{}.{}", user_id, Uuid::new_v4(), extension)
}

/// Public path the API serves an uploaded object from.
pub fn file_url(key: &str) -> String {
    format!("/api/v1/files/{}", key)
}

/// sanitize_key
///
/// Drops `..`, `.` and empty segments so a key can never escape its prefix.
fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// MockStorageService
///
/// In-memory stand-in for tests. Produces deterministic URLs, or fails on demand.
#[derive(Clone, Default)]
pub struct MockStorageService {
    /// When true, all operations return a simulated failure.
    pub should_fail: bool,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self { should_fail: false }
    }

    pub fn new_failing() -> Self {
        Self { should_fail: true }
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) {}

    async fn presign_upload(&self, key: &str, _content_type: &str) -> Result<String, StorageError> {
        if self.should_fail {
            return Err(StorageError::Presign("Mock Storage Error: Simulation requested".to_string()));
        }

        Ok(format!(
            "http://localhost:9000/mock-bucket/{}?signature=fake",
            sanitize_key(key)
        ))
    }
}

/// StorageState
///
/// The concrete type used to share the storage service access across the application state.
pub type StorageState = Arc<dyn StorageService>;
