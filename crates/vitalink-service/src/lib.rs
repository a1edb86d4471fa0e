use axum::Router;
use diesel::sqlite::SqliteConnection;
use std::sync::{Arc, Mutex};

pub mod amazon;
pub mod config;
pub mod db;
pub mod description;
pub mod errors;
pub mod fetch;
pub mod images;
pub mod models;
pub mod preview;
pub mod repositories;
pub mod rewriter;
pub mod routes;
pub mod schema;
pub mod validation;
pub mod youtube;

#[cfg(test)]
mod test_helpers;

use config::Config;
use fetch::PageFetcher;
use images::ImageCache;
use preview::{PreviewCache, PreviewResolver};
use repositories::{ProductRepository, SqliteProductRepository};
use youtube::YouTubeClient;

pub trait AppState: Clone + Send + Sync + 'static {
    type Products: ProductRepository;

    fn product_repo(&self) -> &Self::Products;
    fn previews(&self) -> &PreviewResolver;
    fn youtube(&self) -> &YouTubeClient;
}

#[derive(Clone)]
pub struct DefaultAppState {
    products: SqliteProductRepository,
    previews: Arc<PreviewResolver>,
    youtube: Arc<YouTubeClient>,
}

impl DefaultAppState {
    pub fn new(
        db: Arc<Mutex<SqliteConnection>>,
        fetcher: Arc<dyn PageFetcher>,
        config: &Config,
    ) -> Self {
        let images = ImageCache::new(
            fetcher.clone(),
            config.assets_dir.clone(),
            config.public_image_prefix.clone(),
        );

        Self {
            products: SqliteProductRepository::new(db),
            previews: Arc::new(PreviewResolver::new(
                fetcher.clone(),
                images,
                PreviewCache::new(config.preview_cache_ttl, config.preview_cache_capacity),
            )),
            youtube: Arc::new(YouTubeClient::new(fetcher)),
        }
    }
}

impl AppState for DefaultAppState {
    type Products = SqliteProductRepository;

    fn product_repo(&self) -> &Self::Products {
        &self.products
    }

    fn previews(&self) -> &PreviewResolver {
        &self.previews
    }

    fn youtube(&self) -> &YouTubeClient {
        &self.youtube
    }
}

pub fn create_app(state: DefaultAppState, config: &Config) -> Router {
    routes::create_router()
        .nest_service(
            &config.public_image_prefix,
            tower_http::services::ServeDir::new(&config.assets_dir),
        )
        .with_state(state)
}
