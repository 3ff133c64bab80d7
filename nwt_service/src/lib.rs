pub mod config;
pub mod error;
pub mod handlers;
pub mod ipfs;
pub mod response;
pub mod state;
pub mod storage;

use actix_web::web;

use crate::error::ApiError;

/// Registers every route plus extractor configs that render malformed input
/// in the uniform error shape.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        ApiError::BadRequest(format!("Invalid JSON body: {}", err)).into()
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _req| {
        ApiError::BadRequest(format!("Invalid query string: {}", err)).into()
    }))
    .app_data(web::PathConfig::default().error_handler(|err, _req| {
        ApiError::BadRequest(format!("Invalid path parameter: {}", err)).into()
    }))
    .service(handlers::index)
    .service(handlers::health)
    .service(handlers::get_wallet)
    .service(handlers::connect_wallet)
    .service(handlers::create_purchase)
    .service(handlers::confirm_purchase)
    .service(handlers::spend)
    .service(handlers::get_transactions)
    .service(handlers::reconcile_wallet)
    .service(handlers::helio_webhook)
    .service(handlers::stripe_webhook)
    .service(handlers::upload_files)
    .service(handlers::delete_file)
    .service(handlers::create_creator)
    .service(handlers::get_creators)
    .service(handlers::get_creator_by_id)
    .service(handlers::update_creator)
    .service(handlers::create_comic)
    .service(handlers::get_comics)
    .service(handlers::get_comic_by_id)
    .service(handlers::update_comic);
}
