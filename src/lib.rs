pub mod catalog;
pub mod config;
pub mod dto;
pub mod errors;
pub mod handlers;
pub mod media;
pub mod models;
pub mod notifier;
pub mod orders;
pub mod state;
pub mod store;
pub mod submissions;

use actix_cors::Cors;
use actix_files::Files;
use actix_web::web;
use std::path::Path;
use tracing::{info, warn};

use crate::config::CorsOrigins;
use crate::errors::AppError;
use crate::handlers::{
    create_contact, create_order, delete_contact, delete_order, featured_products,
    get_category, get_contact, get_order, get_product, list_categories, list_contacts,
    list_orders, list_products, products_by_category, subscribe, update_order_status,
};

/// Registers the `/store` API. Shared state must be added separately as
/// `web::Data<AppState>`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _| AppError::BadRequest(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _| AppError::BadRequest(err.to_string()).into()),
    )
    .service(
        web::scope("/store")
            .route("/categories", web::get().to(list_categories))
            .route("/categories/{slug}", web::get().to(get_category))
            .route("/categories/{slug}/details", web::get().to(get_category))
            .route("/products", web::get().to(list_products))
            .route("/products/featured", web::get().to(featured_products))
            .route("/products/by-category/{slug}", web::get().to(products_by_category))
            .route("/products/{id}", web::get().to(get_product))
            .route("/contact", web::post().to(create_contact))
            .route("/contact", web::get().to(list_contacts))
            .route("/contact/{id}", web::get().to(get_contact))
            .route("/contact/{id}", web::delete().to(delete_contact))
            .route("/newsletter", web::post().to(subscribe))
            .route("/orders", web::post().to(create_order))
            .route("/orders", web::get().to(list_orders))
            .route("/orders/{id}", web::get().to(get_order))
            .route("/orders/{id}", web::patch().to(update_order_status))
            .route("/orders/{id}", web::delete().to(delete_order)),
    );
}

/// Serves uploaded files from `media_root` under `media_url`. Only a local
/// path can be mounted; an absolute URL means another host serves them.
pub fn configure_media(cfg: &mut web::ServiceConfig, media_url: &str, media_root: &Path) {
    if !media_url.starts_with('/') {
        warn!("MEDIA_URL {} is not a local path, media files are not served", media_url);
        return;
    }
    info!("Serving {} from {}", media_url, media_root.display());
    cfg.service(Files::new(media_url.trim_end_matches('/'), media_root));
}

/// CORS middleware for the configured origins. Without any configured
/// origins only same-origin requests pass.
pub fn cors(origins: &CorsOrigins) -> Cors {
    match origins {
        CorsOrigins::SameOrigin => Cors::default(),
        CorsOrigins::Any => {
            warn!("CORS_ALLOWED_ORIGINS=* lets any website call this API");
            Cors::permissive()
        }
        CorsOrigins::List(origins) => origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allow_any_method()
            .allow_any_header(),
    }
}
