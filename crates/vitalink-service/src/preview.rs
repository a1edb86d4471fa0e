use std::{
    num::NonZeroUsize,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use lru::LruCache;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::{
    amazon::{self, AmazonProduct},
    fetch::PageFetcher,
    images::ImageCache,
    validation::{AMAZON_SHORT_HOSTS, with_default_scheme},
};

pub const FALLBACK_TITLE: &str = "Amazon Product";
pub const FALLBACK_DESCRIPTION: &str = "Click to view this product on Amazon";
pub const FALLBACK_PRICE: &str = "Check price on Amazon";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkPreview {
    pub title: String,
    pub description: String,
    pub image: String,
    pub price: Option<String>,
    pub rating: Option<f64>,
    pub reviews: Option<u32>,
    pub availability: Option<String>,
    pub is_prime: Option<bool>,
    pub url: String,
    pub asin: Option<String>,
    /// Set on the generic placeholder and on products with no real details.
    pub fallback: bool,
}

impl LinkPreview {
    pub fn fallback(url: &str) -> Self {
        LinkPreview {
            title: FALLBACK_TITLE.to_string(),
            description: FALLBACK_DESCRIPTION.to_string(),
            image: amazon::PLACEHOLDER_IMAGE.to_string(),
            price: Some(FALLBACK_PRICE.to_string()),
            rating: Some(amazon::DEFAULT_RATING),
            reviews: None,
            availability: None,
            is_prime: None,
            url: url.to_string(),
            asin: None,
            fallback: true,
        }
    }
}

impl From<AmazonProduct> for LinkPreview {
    fn from(product: AmazonProduct) -> Self {
        let fallback = !product.is_genuine();
        LinkPreview {
            title: product.title,
            description: product.description,
            image: product.image,
            price: Some(product.price),
            rating: Some(product.rating),
            reviews: Some(product.reviews),
            availability: product.availability,
            is_prime: Some(product.is_prime),
            url: product.url,
            asin: Some(product.asin),
            fallback,
        }
    }
}

/// Bounded, time-limited memo of resolved products.
///
/// Product links are keyed by their canonical `/dp/` URL so tracking
/// parameters share one slot. Anything else is keyed by the requested URL.
pub struct PreviewCache {
    ttl: Duration,
    entries: Option<Mutex<LruCache<String, (Instant, AmazonProduct)>>>,
}

impl PreviewCache {
    /// A zero `ttl` or `capacity` disables caching.
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        let entries = NonZeroUsize::new(capacity)
            .filter(|_| !ttl.is_zero())
            .map(|capacity| Mutex::new(LruCache::new(capacity)));
        Self { ttl, entries }
    }

    pub fn is_enabled(&self) -> bool {
        self.entries.is_some()
    }

    pub fn get(&self, url: &str) -> Option<AmazonProduct> {
        let mut entries = self.entries.as_ref()?.lock().unwrap_or_else(PoisonError::into_inner);
        let key = cache_key(url);
        let (stored_at, product) = entries.get(&key)?;
        if stored_at.elapsed() < self.ttl {
            return Some(product.clone());
        }
        entries.pop(&key);
        None
    }

    pub fn insert(&self, url: &str, product: AmazonProduct) {
        let Some(entries) = &self.entries else {
            return;
        };
        let mut entries = entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.put(cache_key(url), (Instant::now(), product));
    }

    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, |entries| {
            entries.lock().unwrap_or_else(PoisonError::into_inner).len()
        })
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn cache_key(url: &str) -> String {
    match amazon::extract_asin(url) {
        Some(asin) => amazon::canonical_product_url(&asin),
        None => with_default_scheme(url),
    }
}

pub struct PreviewResolver {
    fetcher: Arc<dyn PageFetcher>,
    images: ImageCache,
    cache: PreviewCache,
}

impl PreviewResolver {
    pub fn new(fetcher: Arc<dyn PageFetcher>, images: ImageCache, cache: PreviewCache) -> Self {
        Self {
            fetcher,
            images,
            cache,
        }
    }

    pub fn cache(&self) -> &PreviewCache {
        &self.cache
    }

    /// Always produces a preview; unresolvable links get the generic
    /// fallback with `fallback == true`.
    #[instrument(skip(self))]
    pub async fn resolve_preview(&self, url: &str) -> LinkPreview {
        match self.resolve_product(url).await {
            Some(product) => LinkPreview::from(product),
            None => {
                info!("Falling back to generic preview");
                LinkPreview::fallback(url)
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn resolve_product(&self, url: &str) -> Option<AmazonProduct> {
        if let Some(product) = self.cache.get(url) {
            debug!(asin = %product.asin, "Preview cache hit");
            return Some(product);
        }

        let target = with_default_scheme(url);
        let target = if is_short_link(&target) {
            self.expand_short_link(&target).await
        } else {
            target
        };

        let mut product = amazon::extract_product(self.fetcher.as_ref(), &target)
            .await
            .filter(AmazonProduct::is_genuine)?;

        if let Some(local) = self
            .images
            .ensure_local_image(&product.image, &product.asin)
            .await
        {
            product.image = local;
        }

        if amazon::extract_asin(url).is_none() {
            self.cache.insert(&product.url, product.clone());
        }
        self.cache.insert(url, product.clone());
        Some(product)
    }

    async fn expand_short_link(&self, url: &str) -> String {
        match self.fetcher.resolve_redirects(url).await {
            Ok(resolved) => {
                debug!(short = %url, resolved = %resolved, "Expanded short link");
                resolved
            }
            Err(err) => {
                warn!(short = %url, error = %err, "Short link resolution failed, using original URL");
                url.to_string()
            }
        }
    }
}

pub fn is_short_link(url: &str) -> bool {
    url::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_ascii_lowercase))
        .is_some_and(|host| AMAZON_SHORT_HOSTS.contains(&host.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amazon::known_product;

    #[test]
    fn test_short_link_detection() {
        assert!(is_short_link("https://amzn.to/3xYzAbC"));
        assert!(is_short_link("https://A.CO/d/abc"));
        assert!(!is_short_link("https://www.amazon.com/dp/B001ARYU58"));
        assert!(!is_short_link("not a url"));
    }

    #[test]
    fn test_fallback_preview_is_flagged() {
        let preview = LinkPreview::fallback("https://amzn.to/x");
        assert!(preview.fallback);
        assert_eq!(preview.title, FALLBACK_TITLE);
        assert_eq!(preview.url, "https://amzn.to/x");
    }

    #[test]
    fn test_preview_from_product_carries_asin() {
        let preview = LinkPreview::from(known_product("B01AVDVHTI").unwrap());
        assert!(!preview.fallback);
        assert_eq!(preview.asin.as_deref(), Some("B01AVDVHTI"));
        assert_eq!(preview.price.as_deref(), Some("$10.95"));
    }

    #[test]
    fn test_preview_from_placeholder_product_is_flagged() {
        let mut product = known_product("B01AVDVHTI").unwrap();
        product.title = amazon::DEFAULT_TITLE.to_string();
        assert!(LinkPreview::from(product).fallback);
    }

    #[test]
    fn test_disabled_cache_stores_nothing() {
        for cache in [
            PreviewCache::new(Duration::ZERO, 16),
            PreviewCache::new(Duration::from_secs(60), 0),
        ] {
            cache.insert("u", known_product("B01AVDVHTI").unwrap());
            assert!(!cache.is_enabled());
            assert!(cache.is_empty());
            assert!(cache.get("u").is_none());
        }
    }

    #[test]
    fn test_cache_is_bounded() {
        let cache = PreviewCache::new(Duration::from_secs(60), 2);
        for asin in ["B001ARYU58", "B001ARYU5I", "B01AVDVHTI"] {
            cache.insert(&amazon::canonical_product_url(asin), known_product(asin).unwrap());
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.get("https://www.amazon.com/dp/B001ARYU58").is_none());
        assert!(cache.get("https://www.amazon.com/dp/B01AVDVHTI").is_some());
    }

    #[test]
    fn test_query_variants_share_one_entry() {
        let cache = PreviewCache::new(Duration::from_secs(60), 16);
        for i in 0..50 {
            let url = format!("https://www.amazon.com/dp/B01AVDVHTI?ref={i}");
            cache.insert(&url, known_product("B01AVDVHTI").unwrap());
        }
        assert_eq!(cache.len(), 1);
        assert!(cache.get("amazon.com/dp/B01AVDVHTI/ref=sr_1_1").is_some());
    }

    #[test]
    fn test_cache_returns_fresh_entries() {
        let cache = PreviewCache::new(Duration::from_secs(60), 16);
        cache.insert("u", known_product("B01AVDVHTI").unwrap());
        assert_eq!(cache.get("u").map(|p| p.asin), Some("B01AVDVHTI".to_string()));
        assert!(cache.get("other").is_none());
    }

    #[test]
    fn test_cache_evicts_expired_entries() {
        let cache = PreviewCache::new(Duration::from_millis(1), 16);
        cache.insert("u", known_product("B01AVDVHTI").unwrap());
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("u").is_none());
        assert!(cache.is_empty());
    }
}
