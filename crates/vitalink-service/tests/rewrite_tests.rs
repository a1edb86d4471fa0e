use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use common::{
    IMAGE_PREFIX, StubFetcher, establish_test_connection,
    fixtures::{BANDS_ASIN, PRODUCT_PAGE, SCRAPED_ASIN, SCRAPED_PAGE_URL},
    test_utils,
};
use diesel::sqlite::SqliteConnection;
use tempfile::TempDir;
use vitalink_service::{
    amazon::known_product,
    images::ImageCache,
    models::NewAmazonProduct,
    preview::{PreviewCache, PreviewResolver},
    repositories::{ProductRepository, SqliteProductRepository},
    rewriter::{ContentRewriter, render_preview_block},
};

mod common;

struct Harness {
    resolver: PreviewResolver,
    repo: SqliteProductRepository,
    db: Arc<Mutex<SqliteConnection>>,
    fetcher: Arc<StubFetcher>,
    _assets: TempDir,
}

impl Harness {
    fn new(fetcher: StubFetcher) -> Self {
        let assets = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(fetcher);
        let images = ImageCache::new(fetcher.clone(), assets.path(), IMAGE_PREFIX);
        let db = Arc::new(Mutex::new(establish_test_connection()));
        Self {
            resolver: PreviewResolver::new(
                fetcher.clone(),
                images,
                PreviewCache::new(Duration::from_secs(60), 64),
            ),
            repo: SqliteProductRepository::new(db.clone()),
            db,
            fetcher,
            _assets: assets,
        }
    }

    fn rewriter(&self) -> ContentRewriter<'_, SqliteProductRepository> {
        ContentRewriter::new(&self.resolver, &self.repo)
    }

    fn product_count(&self) -> i64 {
        test_utils::count_products(&mut self.db.lock().unwrap())
    }
}

#[tokio::test]
async fn test_known_link_is_replaced_and_cataloged() {
    let harness = Harness::new(StubFetcher::new());
    let content = "Grab these bands: https://www.amazon.com/dp/B01AVDVHTI. They are great.";

    let outcome = harness.rewriter().rewrite_content(content).await;

    let block = render_preview_block(&known_product(BANDS_ASIN).unwrap());
    assert_eq!(
        outcome.content,
        format!("Grab these bands: {block}. They are great.")
    );
    assert_eq!(outcome.detected, 1);
    assert_eq!(outcome.replaced, 1);
    assert_eq!(outcome.products, vec![BANDS_ASIN.to_string()]);
    assert_eq!(outcome.cataloged, vec![BANDS_ASIN.to_string()]);

    let stored = test_utils::all_products(&mut harness.db.lock().unwrap());
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].asin, BANDS_ASIN);
    assert_eq!(stored[0].price, "$10.95");
    assert_eq!(
        stored[0].tag_list(),
        vec!["resistance bands", "mobility", "warm-up"]
    );
}

#[tokio::test]
async fn test_rewriting_output_again_is_a_no_op() {
    let harness = Harness::new(StubFetcher::new().with_page(SCRAPED_PAGE_URL, PRODUCT_PAGE));
    let content = "Roll out with amazon.com/dp/B0TESTASIN\nand band up with https://www.amazon.com/dp/B01AVDVHTI";

    let first = harness.rewriter().rewrite_content(content).await;
    assert_eq!(first.replaced, 2);

    let second = harness.rewriter().rewrite_content(&first.content).await;
    assert_eq!(second.content, first.content);
    assert_eq!(second.replaced, 0);
    assert!(second.cataloged.is_empty());
    assert_eq!(harness.product_count(), 2);
}

#[tokio::test]
async fn test_repeated_url_resolves_once_and_catalogs_once() {
    let harness = Harness::new(StubFetcher::new().with_page(SCRAPED_PAGE_URL, PRODUCT_PAGE));
    let content = format!("{SCRAPED_PAGE_URL} and again {SCRAPED_PAGE_URL}");

    let outcome = harness.rewriter().rewrite_content(&content).await;

    assert_eq!(outcome.detected, 2);
    assert_eq!(outcome.replaced, 2);
    assert_eq!(outcome.products, vec![SCRAPED_ASIN.to_string()]);
    assert_eq!(outcome.cataloged, vec![SCRAPED_ASIN.to_string()]);
    assert_eq!(harness.fetcher.request_count(SCRAPED_PAGE_URL), 1);
    assert_eq!(harness.product_count(), 1);
}

#[tokio::test]
async fn test_existing_catalog_entry_is_not_duplicated() {
    let harness = Harness::new(StubFetcher::new());
    harness
        .repo
        .insert_if_absent(&NewAmazonProduct::from(&known_product(BANDS_ASIN).unwrap()))
        .await
        .unwrap();

    let outcome = harness
        .rewriter()
        .rewrite_content("https://www.amazon.com/dp/B01AVDVHTI")
        .await;

    assert_eq!(outcome.replaced, 1);
    assert_eq!(outcome.products, vec![BANDS_ASIN.to_string()]);
    assert!(outcome.cataloged.is_empty());
    assert_eq!(harness.product_count(), 1);
}

#[tokio::test]
async fn test_unresolvable_links_are_left_untouched() {
    let harness = Harness::new(StubFetcher::new());
    let content = "Search results: https://www.amazon.com/s?k=kettlebell and amzn.to/deadlink";

    let outcome = harness.rewriter().rewrite_content(content).await;

    assert_eq!(outcome.content, content);
    assert_eq!(outcome.detected, 2);
    assert_eq!(outcome.replaced, 0);
    assert_eq!(harness.product_count(), 0);
}

#[tokio::test]
async fn test_anchor_is_replaced_as_a_whole() {
    let harness = Harness::new(
        StubFetcher::new().with_redirect("https://amzn.to/bands", "https://www.amazon.com/dp/B01AVDVHTI"),
    );
    let content = r#"<p>Get them <a href="https://amzn.to/bands">here</a>.</p>"#;

    let outcome = harness.rewriter().rewrite_content(content).await;

    let block = render_preview_block(&known_product(BANDS_ASIN).unwrap());
    assert_eq!(outcome.content, format!("<p>Get them {block}.</p>"));
    assert_eq!(outcome.replaced, 1);
}

#[tokio::test]
async fn test_links_inside_other_tags_are_skipped() {
    let harness = Harness::new(StubFetcher::new());
    let content = r#"<img src="https://www.amazon.com/dp/B01AVDVHTI/photo.jpg" alt="bands">"#;

    let outcome = harness.rewriter().rewrite_content(content).await;

    assert_eq!(outcome.content, content);
    assert_eq!(outcome.detected, 1);
    assert_eq!(outcome.replaced, 0);
}

#[tokio::test]
async fn test_content_without_links_is_returned_verbatim() {
    let harness = Harness::new(StubFetcher::new());

    let outcome = harness.rewriter().rewrite_content("").await;
    assert_eq!(outcome.content, "");
    assert_eq!(outcome.detected, 0);

    let outcome = harness
        .rewriter()
        .rewrite_content("Visit notamazon.com/dp/B01AVDVHTI for nothing")
        .await;
    assert_eq!(outcome.detected, 0);
    assert!(harness.fetcher.requests().is_empty());
}

#[tokio::test]
async fn test_placeholder_product_pages_are_not_cataloged() {
    let harness = Harness::new(
        StubFetcher::new()
            .with_page(
                "https://www.amazon.com/dp/B0CAPTCHA1",
                "<html><head><title>Robot Check</title></head><body></body></html>",
            )
            .with_page("https://www.amazon.com/dp/B0EMPTYPG1", "<html><body></body></html>"),
    );
    let content = "Blocked: https://www.amazon.com/dp/B0CAPTCHA1 and empty: https://www.amazon.com/dp/B0EMPTYPG1";

    let outcome = harness.rewriter().rewrite_content(content).await;

    assert_eq!(outcome.content, content);
    assert_eq!(outcome.detected, 2);
    assert_eq!(outcome.replaced, 0);
    assert!(outcome.products.is_empty());
    assert!(outcome.cataloged.is_empty());
    assert_eq!(harness.product_count(), 0);
}

#[tokio::test]
async fn test_stray_angle_bracket_does_not_hide_later_links() {
    let harness = Harness::new(StubFetcher::new());
    let content = "Keep rest < 60s between sets. Bands: https://www.amazon.com/dp/B01AVDVHTI";

    let outcome = harness.rewriter().rewrite_content(content).await;

    let block = render_preview_block(&known_product(BANDS_ASIN).unwrap());
    assert_eq!(
        outcome.content,
        format!("Keep rest < 60s between sets. Bands: {block}")
    );
    assert_eq!(outcome.replaced, 1);
}

#[tokio::test]
async fn test_foreign_anchor_with_amazon_text_is_kept() {
    let harness = Harness::new(StubFetcher::new());
    let content = r#"Read <a href="https://example.com">amazon.com/dp/B01AVDVHTI</a> first"#;

    let outcome = harness.rewriter().rewrite_content(content).await;

    assert_eq!(outcome.content, content);
    assert_eq!(outcome.detected, 1);
    assert_eq!(outcome.replaced, 0);
    assert_eq!(harness.product_count(), 0);
}
