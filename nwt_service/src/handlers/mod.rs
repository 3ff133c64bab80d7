mod comics;
mod creators;
mod upload;
mod wallet;
mod webhooks;

use std::future::{Ready, ready};

use actix_web::{
    FromRequest, HttpRequest, HttpResponse, Responder, dev::Payload, get, http::header, web,
};
use serde_json::json;
use subtle::ConstantTimeEq;

pub use comics::*;
pub use creators::*;
pub use upload::*;
pub use wallet::*;
pub use webhooks::*;

use crate::error::ApiError;
use crate::response::success;
use crate::state::AppState;

/// Header the upstream gateway sets to the authenticated user's id.
pub const USER_ID_HEADER: &str = "x-user-id";

const MAX_USER_ID_LEN: usize = 128;

/// Caller identity taken from [`USER_ID_HEADER`].
#[derive(Debug, Clone)]
pub struct UserId(pub String);

impl FromRequest for UserId {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let user_id = req
            .headers()
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty() && value.len() <= MAX_USER_ID_LEN);

        ready(match user_id {
            Some(user_id) => Ok(UserId(user_id.to_string())),
            None => Err(ApiError::Unauthorized(format!(
                "Missing or invalid {} header",
                USER_ID_HEADER
            ))),
        })
    }
}

/// True when `Authorization: Bearer <token>` carries `expected`. The token
/// bytes are compared in constant time.
pub(crate) fn bearer_matches(req: &HttpRequest, expected: &str) -> bool {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|provided| bool::from(provided.as_bytes().ct_eq(expected.as_bytes())))
}

#[get("/")]
pub async fn index() -> impl Responder {
    HttpResponse::Ok().body("Welcome to NWT Wallet Service!")
}

#[get("/health")]
pub async fn health(app_state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    app_state
        .db
        .ping()
        .await
        .map_err(|e| ApiError::internal("Database is unavailable", e))?;
    Ok(success(json!({ "status": "ok" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn bearer_token_must_match_exactly() {
        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Bearer s3cret"))
            .to_http_request();
        assert!(bearer_matches(&req, "s3cret"));
        assert!(!bearer_matches(&req, "s3cre"));
        assert!(!bearer_matches(&req, "s3cret!"));

        let basic = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Basic s3cret"))
            .to_http_request();
        assert!(!bearer_matches(&basic, "s3cret"));
        assert!(!bearer_matches(&TestRequest::default().to_http_request(), "s3cret"));
    }
}
