use actix_web::{HttpResponse, get, post, put, web};
use common::{Comic, ComicFilter, ComicUpdate, NewComic};

use super::UserId;
use super::creators::{ensure_owner, load_creator};
use crate::error::ApiError;
use crate::response::{created, success};
use crate::state::AppState;

async fn load_comic(app_state: &AppState, comic_id: i64) -> Result<Comic, ApiError> {
    app_state
        .db
        .get_comic(comic_id)
        .await
        .map_err(|e| ApiError::internal("Failed to get comic", e))?
        .ok_or_else(|| ApiError::NotFound("Comic with provided ID not found.".to_string()))
}

#[post("/comics")]
pub async fn create_comic(
    user: UserId,
    body: web::Json<NewComic>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let creator = load_creator(&app_state, body.creator_id).await?;
    ensure_owner(&creator, &user)?;

    let comic = app_state.db.create_comic(&body).await?;
    Ok(created(comic))
}

#[get("/comics")]
pub async fn get_comics(
    query: web::Query<ComicFilter>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let comics = app_state
        .db
        .list_comics(&query)
        .await
        .map_err(|e| ApiError::internal("Failed to get comics", e))?;
    Ok(success(comics))
}

#[get("/comics/{comic_id}")]
pub async fn get_comic_by_id(
    path: web::Path<i64>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let comic = load_comic(&app_state, path.into_inner()).await?;
    Ok(success(comic))
}

#[put("/comics/{comic_id}")]
pub async fn update_comic(
    user: UserId,
    path: web::Path<i64>,
    body: web::Json<ComicUpdate>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let comic = load_comic(&app_state, path.into_inner()).await?;
    let creator = load_creator(&app_state, comic.creator_id).await?;
    ensure_owner(&creator, &user)?;

    let updated = app_state.db.update_comic(comic.id, &body).await?;
    Ok(success(updated))
}
