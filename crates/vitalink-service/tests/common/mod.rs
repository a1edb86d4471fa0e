#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use diesel::sqlite::SqliteConnection;
use reqwest::StatusCode;
use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};
use vitalink_service::{
    config::Config,
    db,
    fetch::{FetchError, FetchedBody, PageFetcher},
};

pub const IMAGE_PREFIX: &str = "/images/products";

pub fn establish_test_connection() -> SqliteConnection {
    db::establish_connection(":memory:").expect("Failed to create in-memory database")
}

/// Serves canned pages, images and redirects, and records every URL asked for.
#[derive(Default)]
pub struct StubFetcher {
    pages: HashMap<String, String>,
    images: HashMap<String, (Bytes, Option<String>)>,
    redirects: HashMap<String, String>,
    requests: Mutex<Vec<String>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), body.to_string());
        self
    }

    pub fn with_image(mut self, url: &str, bytes: &'static [u8], content_type: &str) -> Self {
        self.images.insert(
            url.to_string(),
            (Bytes::from_static(bytes), Some(content_type.to_string())),
        );
        self
    }

    pub fn with_redirect(mut self, from: &str, to: &str) -> Self {
        self.redirects.insert(from.to_string(), to.to_string());
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests().iter().filter(|seen| *seen == url).count()
    }

    fn record(&self, url: &str) {
        self.requests.lock().unwrap().push(url.to_string());
    }

    fn not_found(url: &str) -> FetchError {
        FetchError::Status {
            url: url.to_string(),
            status: StatusCode::NOT_FOUND,
        }
    }
}

#[async_trait]
impl PageFetcher for StubFetcher {
    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        self.record(url);
        self.pages.get(url).cloned().ok_or_else(|| Self::not_found(url))
    }

    async fn get_bytes(&self, url: &str) -> Result<FetchedBody, FetchError> {
        self.record(url);
        self.images
            .get(url)
            .map(|(bytes, content_type)| FetchedBody {
                bytes: bytes.clone(),
                content_type: content_type.clone(),
            })
            .ok_or_else(|| Self::not_found(url))
    }

    async fn resolve_redirects(&self, url: &str) -> Result<String, FetchError> {
        self.record(url);
        self.redirects.get(url).cloned().ok_or_else(|| Self::not_found(url))
    }
}

pub fn test_config(assets_dir: &Path) -> Config {
    Config {
        database_url: ":memory:".to_string(),
        bind_address: "127.0.0.1:0".to_string(),
        assets_dir: assets_dir.to_path_buf(),
        public_image_prefix: IMAGE_PREFIX.to_string(),
        http_timeout: Duration::from_secs(5),
        preview_cache_ttl: Duration::from_secs(60),
        preview_cache_capacity: 64,
        request_timeout: Duration::from_secs(5),
    }
}

pub mod server_utils {
    use super::*;
    use axum_test::TestServer;
    use tempfile::TempDir;
    use vitalink_service::{DefaultAppState, create_app};

    pub struct TestContext {
        pub server: TestServer,
        pub db: Arc<Mutex<SqliteConnection>>,
        pub fetcher: Arc<StubFetcher>,
        pub assets: TempDir,
    }

    pub fn create_test_server(fetcher: StubFetcher) -> TestContext {
        let assets = tempfile::tempdir().expect("Failed to create asset directory");
        let config = test_config(assets.path());

        let db = Arc::new(Mutex::new(establish_test_connection()));
        let fetcher = Arc::new(fetcher);

        let state = DefaultAppState::new(db.clone(), fetcher.clone(), &config);
        let app = create_app(state, &config);

        let server = TestServer::new(app).unwrap();
        TestContext {
            server,
            db,
            fetcher,
            assets,
        }
    }
}

pub mod test_utils {
    use diesel::prelude::*;
    use diesel::sqlite::SqliteConnection;
    use vitalink_service::{models::AmazonProductRecord, schema::amazon_products};

    pub fn count_products(conn: &mut SqliteConnection) -> i64 {
        amazon_products::table
            .count()
            .get_result(conn)
            .expect("Failed to count products")
    }

    pub fn all_products(conn: &mut SqliteConnection) -> Vec<AmazonProductRecord> {
        amazon_products::table
            .select(AmazonProductRecord::as_select())
            .order(amazon_products::id.asc())
            .load(conn)
            .expect("Failed to load products")
    }
}

pub mod fixtures {
    pub const SCRAPED_ASIN: &str = "B0TESTASIN";
    pub const SCRAPED_PAGE_URL: &str = "https://www.amazon.com/dp/B0TESTASIN";
    pub const SCRAPED_IMAGE_URL: &str = "https://m.media-amazon.com/images/I/foam-roller.png";

    pub const PRODUCT_PAGE: &str = r#"
        <html>
          <head><title>Amazon.com: Foam Roller : Sports &amp; Outdoors</title></head>
          <body>
            <span id="productTitle">High Density Foam Roller</span>
            <div id="feature-bullets"><ul>
              <li><span class="a-list-item">Firm support for deep tissue work.</span></li>
            </ul></div>
            <img id="landingImage" data-old-hires="https://m.media-amazon.com/images/I/foam-roller.png">
            <div id="corePrice_feature_div"><span class="a-price"><span class="a-offscreen">$24.99</span></span></div>
            <span id="acrPopover" title="4.7 out of 5 stars"></span>
            <span id="acrCustomerReviewText">12,345 ratings</span>
          </body>
        </html>
    "#;

    pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nstub";
    pub const JPEG_BYTES: &[u8] = b"\xff\xd8\xff\xe0stub";

    pub const BANDS_ASIN: &str = "B01AVDVHTI";
    pub const BANDS_IMAGE_URL: &str =
        "https://m.media-amazon.com/images/I/71x6V9KzVJL._AC_SL1500_.jpg";
}
