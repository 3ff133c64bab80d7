#![allow(dead_code)]

use actix_web::body::MessageBody;
use actix_web::dev::ServiceResponse;
use actix_web::http::StatusCode;
use actix_web::{test, web};
use common::Database;
use nwt_service::state::AppState;
use nwt_service::storage::ObjectStorage;
use serde_json::Value;

pub const CDN: &str = "https://cdn.test";
pub const HELIO_TOKEN: &str = "helio-secret";
pub const CONFIRM_TOKEN: &str = "checkout-secret";
pub const UPLOAD_LIMIT: usize = 1024;

/// Builds the service around `state` with every route registered.
macro_rules! init_app {
    ($state:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data($state.clone())
                .configure(nwt_service::configure),
        )
        .await
    };
}

/// Sends a `TestRequest` and yields `(StatusCode, serde_json::Value)`.
macro_rules! call {
    ($app:expr, $req:expr) => {
        support::read_json(actix_web::test::call_service(&$app, $req.to_request()).await).await
    };
}

pub async fn test_state() -> web::Data<AppState> {
    let db = Database::in_memory().await.unwrap();
    let root = std::env::temp_dir().join(format!("nwt-test-{}", uuid::Uuid::new_v4()));
    let storage = ObjectStorage::new(root, CDN).await.unwrap();
    web::Data::new(AppState {
        db,
        storage,
        ipfs: None,
        max_upload_bytes: UPLOAD_LIMIT,
        helio_webhook_token: Some(HELIO_TOKEN.to_string()),
        payment_confirm_token: Some(CONFIRM_TOKEN.to_string()),
    })
}

pub async fn read_json<B: MessageBody>(resp: ServiceResponse<B>) -> (StatusCode, Value) {
    let status = resp.status();
    let body = test::read_body(resp).await;
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

pub fn as_user(req: test::TestRequest, user_id: &str) -> test::TestRequest {
    req.insert_header(("x-user-id", user_id.to_string()))
}

/// Error bodies always carry the uniform failure envelope.
pub fn assert_failure(body: &Value) {
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());
    assert!(body["timestamp"].is_string());
}
