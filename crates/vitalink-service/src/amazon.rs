//! Amazon product extraction.
//!
//! A small curated table of products is answered from static data. Anything
//! else is scraped from the live product page, where every field is an
//! ordered list of extraction strategies and the first non-empty result
//! wins. Missing fields degrade to fixed defaults.

use regex::Regex;
use scraper::{Html, Selector};
use serde::Serialize;
use std::sync::LazyLock;
use tracing::{debug, instrument, warn};

use crate::fetch::PageFetcher;

pub const DEFAULT_TITLE: &str = "Amazon Product";
pub const DEFAULT_DESCRIPTION: &str = "View this product on Amazon for full details.";
pub const DEFAULT_PRICE: &str = "$--";
pub const DEFAULT_RATING: f64 = 4.5;
pub const DEFAULT_REVIEWS: u32 = 1000;
pub const DEFAULT_CATEGORY: &str = "Fitness Gear";
pub const PLACEHOLDER_IMAGE: &str = "/images/placeholder-product.png";

const MAX_DESCRIPTION_CHARS: usize = 300;

static ASIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)/(?:dp|gp/product)/([a-z0-9]{10})(?:[/?#&]|$)").expect("valid ASIN regex")
});

static RATING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:[.,]\d+)?)").expect("valid rating regex"));

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmazonProduct {
    pub asin: String,
    pub title: String,
    pub description: String,
    pub price: String,
    pub rating: f64,
    pub reviews: u32,
    pub image: String,
    pub url: String,
    pub availability: Option<String>,
    pub is_prime: bool,
    pub category: String,
    pub tags: Vec<String>,
}

impl AmazonProduct {
    /// False for pages that yielded nothing product specific, such as
    /// captcha interstitials or empty responses.
    pub fn is_genuine(&self) -> bool {
        let title = self.title.trim();
        if title.is_empty() || title == DEFAULT_TITLE {
            return false;
        }
        !(self.price == DEFAULT_PRICE
            && self.image == PLACEHOLDER_IMAGE
            && self.description == DEFAULT_DESCRIPTION)
    }
}

pub fn extract_asin(url: &str) -> Option<String> {
    ASIN_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_ascii_uppercase())
}

pub fn canonical_product_url(asin: &str) -> String {
    format!("https://www.amazon.com/dp/{asin}")
}

struct KnownProduct {
    asin: &'static str,
    title: &'static str,
    description: &'static str,
    price: &'static str,
    rating: f64,
    reviews: u32,
    image: &'static str,
    category: &'static str,
    tags: &'static [&'static str],
}

const KNOWN_PRODUCTS: &[KnownProduct] = &[
    KnownProduct {
        asin: "B001ARYU58",
        title: "Optimum Nutrition Gold Standard 100% Whey Protein Powder, Double Rich Chocolate, 5 Pound",
        description: "24g of blended whey protein per serving to support muscle recovery, with 5.5g of naturally occurring BCAAs. Mixes easily with a spoon or shaker.",
        price: "$74.99",
        rating: 4.6,
        reviews: 98_412,
        image: "https://m.media-amazon.com/images/I/71mPp6ZvtQL._AC_SL1500_.jpg",
        category: "Supplements",
        tags: &["protein", "supplements", "recovery"],
    },
    KnownProduct {
        asin: "B001ARYU5I",
        title: "Bowflex SelectTech 552 Adjustable Dumbbells (Pair)",
        description: "Adjusts from 5 to 52.5 lbs with a turn of the dial, replacing 15 sets of weights. A compact option for home strength training.",
        price: "$429.00",
        rating: 4.8,
        reviews: 22_675,
        image: "https://m.media-amazon.com/images/I/81ZrP0mXsPL._AC_SL1500_.jpg",
        category: "Equipment",
        tags: &["dumbbells", "strength", "home gym"],
    },
    KnownProduct {
        asin: "B01AVDVHTI",
        title: "Fit Simplify Resistance Loop Exercise Bands, Set of 5",
        description: "Five resistance levels for glute activation, mobility work and warm-ups. Includes a carry bag and instruction guide.",
        price: "$10.95",
        rating: 4.5,
        reviews: 151_203,
        image: "https://m.media-amazon.com/images/I/71x6V9KzVJL._AC_SL1500_.jpg",
        category: "Accessories",
        tags: &["resistance bands", "mobility", "warm-up"],
    },
];

impl KnownProduct {
    fn to_product(&self) -> AmazonProduct {
        AmazonProduct {
            asin: self.asin.to_string(),
            title: self.title.to_string(),
            description: self.description.to_string(),
            price: self.price.to_string(),
            rating: self.rating,
            reviews: self.reviews,
            image: self.image.to_string(),
            url: canonical_product_url(self.asin),
            availability: Some("In Stock".to_string()),
            is_prime: true,
            category: self.category.to_string(),
            tags: self.tags.iter().map(|tag| tag.to_string()).collect(),
        }
    }
}

/// Curated products are answered without touching the network.
pub fn known_product(asin: &str) -> Option<AmazonProduct> {
    KNOWN_PRODUCTS
        .iter()
        .find(|known| known.asin.eq_ignore_ascii_case(asin))
        .map(KnownProduct::to_product)
}

#[instrument(skip(fetcher))]
pub async fn extract_product(fetcher: &dyn PageFetcher, url: &str) -> Option<AmazonProduct> {
    let Some(asin) = extract_asin(url) else {
        debug!("No ASIN in URL");
        return None;
    };

    if let Some(product) = known_product(&asin) {
        debug!(asin = %asin, "Serving curated product");
        return Some(product);
    }

    let page_url = canonical_product_url(&asin);
    match fetcher.get_text(&page_url).await {
        Ok(html) => {
            let product = scrape_product(&asin, &html);
            if !product.is_genuine() {
                warn!(asin = %asin, title = %product.title, "Product page had no product details");
                return None;
            }
            debug!(asin = %asin, title = %product.title, "Scraped product page");
            Some(product)
        }
        Err(err) => {
            warn!(asin = %asin, error = %err, "Failed to fetch product page");
            None
        }
    }
}

type Strategy<T> = fn(&Html) -> Option<T>;

fn first_match<T>(document: &Html, strategies: &[Strategy<T>]) -> Option<T> {
    strategies.iter().find_map(|strategy| strategy(document))
}

/// Builds a product from a product page. Never fails; unmatched fields fall
/// back to defaults.
pub fn scrape_product(asin: &str, html: &str) -> AmazonProduct {
    let document = Html::parse_document(html);

    let title = first_match(
        &document,
        &[
            |d| select_text(d, "#productTitle"),
            |d| select_text(d, "#title"),
            |d| meta_content(d, "property", "og:title"),
            |d| meta_content(d, "name", "title").map(|t| clean_page_title(&t)),
            |d| select_text(d, "title").map(|t| clean_page_title(&t)),
        ],
    )
    .filter(|title| !title.is_empty())
    .unwrap_or_else(|| DEFAULT_TITLE.to_string());

    let description = first_match(
        &document,
        &[
            feature_bullets,
            |d| select_text(d, "#productDescription p"),
            |d| select_text(d, "#productDescription"),
            |d| meta_content(d, "name", "description"),
            |d| meta_content(d, "property", "og:description"),
        ],
    )
    .map(|text| truncate_chars(&text, MAX_DESCRIPTION_CHARS))
    .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());

    let image = first_match(
        &document,
        &[
            |d| select_attr(d, "#landingImage", "data-old-hires"),
            |d| select_attr(d, "#landingImage", "src"),
            |d| select_attr(d, "#imgBlkFront", "src"),
            |d| select_attr(d, "#main-image", "src"),
            dynamic_image,
            |d| meta_content(d, "property", "og:image"),
        ],
    )
    .filter(|src| src.starts_with("http"))
    .unwrap_or_else(|| PLACEHOLDER_IMAGE.to_string());

    let price = first_match(
        &document,
        &[
            |d| select_text(d, "#corePrice_feature_div .a-price .a-offscreen"),
            |d| select_text(d, "#corePriceDisplay_desktop_feature_div .a-price .a-offscreen"),
            |d| select_text(d, "#priceblock_ourprice"),
            |d| select_text(d, "#priceblock_dealprice"),
            |d| select_text(d, ".a-price .a-offscreen"),
            split_price,
        ],
    )
    .filter(|price| price.chars().any(|c| c.is_ascii_digit()))
    .unwrap_or_else(|| DEFAULT_PRICE.to_string());

    let rating = first_match(
        &document,
        &[
            |d| select_attr(d, "#acrPopover", "title").and_then(|t| parse_rating(&t)),
            |d| select_text(d, "[data-hook=\"rating-out-of-text\"]").and_then(|t| parse_rating(&t)),
            |d| select_text(d, "#averageCustomerReviews .a-icon-alt").and_then(|t| parse_rating(&t)),
            |d| select_text(d, "i.a-icon-star span.a-icon-alt").and_then(|t| parse_rating(&t)),
        ],
    )
    .unwrap_or(DEFAULT_RATING);

    let reviews = first_match(
        &document,
        &[
            |d| select_text(d, "#acrCustomerReviewText").and_then(|t| parse_count(&t)),
            |d| select_text(d, "[data-hook=\"total-review-count\"]").and_then(|t| parse_count(&t)),
        ],
    )
    .unwrap_or(DEFAULT_REVIEWS);

    let availability = first_match(
        &document,
        &[
            |d| select_text(d, "#availability span"),
            |d| select_text(d, "#availability"),
        ],
    );

    let is_prime = ["#prime-badge", "i.a-icon-prime", "#primeBadge", "[aria-label=\"Amazon Prime\"]"]
        .iter()
        .any(|css| matches_any(&document, css));

    let breadcrumbs = select_all_text(&document, "#wayfinding-breadcrumbs_feature_div ul li a");
    let category = breadcrumbs
        .first()
        .cloned()
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
    let tags = breadcrumbs
        .iter()
        .take(3)
        .map(|crumb| crumb.to_lowercase())
        .collect();

    AmazonProduct {
        asin: asin.to_string(),
        title,
        description,
        price,
        rating,
        reviews,
        image,
        url: canonical_product_url(asin),
        availability,
        is_prime,
        category,
        tags,
    }
}

fn feature_bullets(document: &Html) -> Option<String> {
    let bullets = select_all_text(document, "#feature-bullets ul li span.a-list-item");
    if bullets.is_empty() {
        return None;
    }
    Some(bullets.into_iter().take(3).collect::<Vec<_>>().join(" "))
}

/// `data-a-dynamic-image` holds a JSON object keyed by image URL.
fn dynamic_image(document: &Html) -> Option<String> {
    let raw = select_attr(document, "img[data-a-dynamic-image]", "data-a-dynamic-image")?;
    let parsed: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&raw).ok()?;
    parsed.keys().next().cloned()
}

fn split_price(document: &Html) -> Option<String> {
    let whole = select_text(document, ".a-price-whole")?;
    let whole = whole.trim_end_matches('.');
    let fraction = select_text(document, ".a-price-fraction").unwrap_or_else(|| "00".to_string());
    Some(format!("${whole}.{fraction}"))
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn select_text(document: &Html, css: &str) -> Option<String> {
    let selector = selector(css)?;
    document
        .select(&selector)
        .map(|el| normalize_whitespace(&el.text().collect::<String>()))
        .find(|text| !text.is_empty())
}

fn select_all_text(document: &Html, css: &str) -> Vec<String> {
    let Some(selector) = selector(css) else {
        return Vec::new();
    };
    document
        .select(&selector)
        .map(|el| normalize_whitespace(&el.text().collect::<String>()))
        .filter(|text| !text.is_empty())
        .collect()
}

fn select_attr(document: &Html, css: &str, attr: &str) -> Option<String> {
    let selector = selector(css)?;
    document
        .select(&selector)
        .filter_map(|el| el.value().attr(attr))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

fn meta_content(document: &Html, attr: &str, value: &str) -> Option<String> {
    select_attr(document, &format!("meta[{attr}=\"{value}\"]"), "content")
        .map(|content| normalize_whitespace(&content))
}

fn matches_any(document: &Html, css: &str) -> bool {
    selector(css).is_some_and(|selector| document.select(&selector).next().is_some())
}

/// `"Amazon.com: Resistance Bands : Sports & Outdoors"` -> `"Resistance Bands"`
fn clean_page_title(raw: &str) -> String {
    let title = raw.trim();
    let title = title
        .strip_prefix("Amazon.com:")
        .or_else(|| title.strip_prefix("Amazon.com :"))
        .unwrap_or(title)
        .trim();
    title
        .split(" : ")
        .next()
        .unwrap_or(title)
        .trim()
        .to_string()
}

fn parse_rating(text: &str) -> Option<f64> {
    RATING_RE
        .captures(text)
        .and_then(|caps| caps[1].replace(',', ".").parse::<f64>().ok())
        .filter(|rating| (0.0..=5.0).contains(rating))
}

fn parse_count(text: &str) -> Option<u32> {
    let digits: String = text
        .split_whitespace()
        .next()?
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", text[..idx].trim_end()),
        None => text.to_string(),
    }
}
