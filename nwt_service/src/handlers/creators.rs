use actix_web::{HttpResponse, get, post, put, web};
use common::{Creator, CreatorUpdate, NewCreator};
use serde::Deserialize;

use super::UserId;
use crate::error::ApiError;
use crate::response::{created, success};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

pub(crate) async fn load_creator(app_state: &AppState, creator_id: i64) -> Result<Creator, ApiError> {
    app_state
        .db
        .get_creator(creator_id)
        .await
        .map_err(|e| ApiError::internal("Failed to get creator", e))?
        .ok_or_else(|| {
            log::warn!("Creator not found: {}", creator_id);
            ApiError::NotFound("Creator with provided ID not found.".to_string())
        })
}

pub(crate) fn ensure_owner(creator: &Creator, user: &UserId) -> Result<(), ApiError> {
    if creator.user_id != user.0 {
        log::warn!(
            "User {} is not the owner of creator {}",
            user.0,
            creator.id
        );
        return Err(ApiError::Unauthorized(
            "You are not the owner of this creator profile".to_string(),
        ));
    }
    Ok(())
}

#[post("/creators")]
pub async fn create_creator(
    user: UserId,
    body: web::Json<NewCreator>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let creator = app_state.db.create_creator(&user.0, &body).await?;
    Ok(created(creator))
}

#[get("/creators")]
pub async fn get_creators(
    query: web::Query<PageQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let creators = app_state
        .db
        .list_creators(query.limit, query.offset)
        .await
        .map_err(|e| ApiError::internal("Failed to get creators", e))?;
    Ok(success(creators))
}

#[get("/creators/{creator_id}")]
pub async fn get_creator_by_id(
    path: web::Path<i64>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let creator = load_creator(&app_state, path.into_inner()).await?;
    Ok(success(creator))
}

#[put("/creators/{creator_id}")]
pub async fn update_creator(
    user: UserId,
    path: web::Path<i64>,
    body: web::Json<CreatorUpdate>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let creator = load_creator(&app_state, path.into_inner()).await?;
    ensure_owner(&creator, &user)?;

    let updated = app_state.db.update_creator(creator.id, &body).await?;
    Ok(success(updated))
}
