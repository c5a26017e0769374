mod common;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use common::{MockRepo, TestOptions, body_json, context_with, member};
use lms_portal::{create_router, models::AvatarUploadResponse, storage::MockStorageService};
use tower::util::ServiceExt;
use uuid::Uuid;

fn app(storage: MockStorageService, user_id: Uuid) -> Router {
    let mut user = member("ada@example.com", &["USER"]);
    user.id = user_id;
    let ctx = context_with(
        MockRepo::default().with_user(user),
        TestOptions {
            storage,
            ..TestOptions::default()
        },
    );
    create_router(ctx.state)
}

fn presign_request(user_id: Uuid, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/account/avatar/presigned")
        .header("Content-Type", "application/json")
        .header("x-user-id", user_id.to_string())
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_presigned_avatar_url_success() {
    let user_id = Uuid::new_v4();
    let app = app(MockStorageService::new(), user_id);

    let response = app
        .oneshot(presign_request(
            user_id,
            serde_json::json!({ "content_type": "image/jpeg", "size_bytes": 1024 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body_json: AvatarUploadResponse = serde_json::from_slice(&body_bytes).unwrap();

    assert!(body_json.upload_url.contains("signature=fake"));
    assert!(body_json.resource_key.starts_with(&format!("avatars/{}/", user_id)));
    assert!(body_json.resource_key.ends_with(".jpg"));
    assert!(body_json.file_url.starts_with("/api/v1/files/avatars/"));
}

#[tokio::test]
async fn test_presigned_avatar_rejects_unsupported_type() {
    let user_id = Uuid::new_v4();
    let app = app(MockStorageService::new(), user_id);

    let response = app
        .oneshot(presign_request(
            user_id,
            serde_json::json!({ "content_type": "application/x-msdownload", "size_bytes": 1024 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["issues"][0]["path"], "content_type");
}

#[tokio::test]
async fn test_presigned_avatar_malformed_body_is_root_issue() {
    let user_id = Uuid::new_v4();
    let app = app(MockStorageService::new(), user_id);

    let response = app
        .oneshot(presign_request(user_id, serde_json::json!(["not", "an", "object"])))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["issues"][0]["path"], "root");
}

#[tokio::test]
async fn test_presigned_avatar_storage_failure() {
    let user_id = Uuid::new_v4();
    let app = app(MockStorageService::new_failing(), user_id);

    let response = app
        .oneshot(presign_request(
            user_id,
            serde_json::json!({ "content_type": "image/png", "size_bytes": 10 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["detail"], "An unexpected error occurred.");
}

#[tokio::test]
async fn test_profile_update_through_router() {
    let user_id = Uuid::new_v4();
    let app = app(MockStorageService::new(), user_id);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/api/v1/account/profile")
                .header("Content-Type", "application/json")
                .header("x-user-id", user_id.to_string())
                .body(Body::from(r#"{"display_name":"Ada","profile_picture_url":"/api/v1/files/avatars/a.png"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["success"], true);

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/api/v1/account/profile")
                .header("Content-Type", "application/json")
                .header("x-user-id", user_id.to_string())
                .body(Body::from("not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
