//! Amazon link detection and content rewriting.
//!
//! Content is scanned for Amazon links; every link that resolves to a real
//! product is cataloged and swapped for a rendered preview block. Links
//! inside an existing preview block, or inside any other tag's attributes,
//! are left alone so rewriting its own output is a no-op. An `<a>` element
//! whose `href` is an Amazon link is replaced as a whole; Amazon URLs that
//! only appear as the text of some other anchor stay put.

use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::LazyLock;

use html_escape::{encode_double_quoted_attribute, encode_text};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::amazon::AmazonProduct;
use crate::models::NewAmazonProduct;
use crate::preview::PreviewResolver;
use crate::repositories::ProductRepository;

pub const PREVIEW_BLOCK_CLASS: &str = "amazon-product-preview";
const PREVIEW_BLOCK_END: &str = "<!-- /amazon-product-preview -->";
const CONTEXT_CHARS: usize = 50;
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']', '}', '\''];

static AMAZON_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:https?://)?(?:[a-z0-9-]+\.)*(?:amzn\.to|amazon\.com)/[^\s<>"']+"#)
        .expect("valid Amazon link regex")
});

static PREVIEW_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<div class="amazon-product-preview"[^>]*>.*?<!-- /amazon-product-preview -->"#)
        .expect("valid preview block regex")
});

static ANCHOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<a\b[^>]*>.*?</a>").expect("valid anchor regex"));

static ANCHOR_HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)^<a\b[^>]*?\shref\s*=\s*["']([^"']*)["']"#).expect("valid href regex")
});

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[a-zA-Z/!][^<>]*>").expect("valid tag regex"));

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedLink {
    pub url: String,
    /// Byte offsets of `url` within the scanned text.
    pub start: usize,
    pub end: usize,
    pub context: String,
}

pub fn detect_amazon_links(text: &str) -> Vec<DetectedLink> {
    AMAZON_LINK_RE
        .find_iter(text)
        .filter(|m| {
            // reject lookalike hosts such as `notamazon.com`
            text[..m.start()]
                .chars()
                .next_back()
                .is_none_or(|c| !(c.is_ascii_alphanumeric() || c == '-' || c == '.'))
        })
        .filter_map(|m| {
            let url = m.as_str().trim_end_matches(TRAILING_PUNCTUATION);
            let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
            if without_scheme
                .split_once('/')
                .is_none_or(|(_, path)| path.is_empty())
            {
                return None;
            }
            let start = m.start();
            let end = start + url.len();
            Some(DetectedLink {
                url: url.to_string(),
                start,
                end,
                context: context_window(text, start, end),
            })
        })
        .collect()
}

fn context_window(text: &str, start: usize, end: usize) -> String {
    let from = text[..start]
        .char_indices()
        .rev()
        .nth(CONTEXT_CHARS - 1)
        .map(|(idx, _)| idx)
        .unwrap_or(0);
    let to = text[end..]
        .char_indices()
        .nth(CONTEXT_CHARS)
        .map(|(idx, _)| end + idx)
        .unwrap_or(text.len());
    text[from..to].to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RewriteOutcome {
    pub content: String,
    /// Amazon links found anywhere in the input.
    pub detected: usize,
    /// Occurrences swapped for a preview block.
    pub replaced: usize,
    /// ASINs rendered into the content, in order of first appearance.
    pub products: Vec<String>,
    /// ASINs newly added to the catalog by this call.
    pub cataloged: Vec<String>,
}

/// A span of the input that will be swapped for a preview block.
struct Replacement {
    span: Range<usize>,
    url: String,
}

struct Anchor {
    span: Range<usize>,
    /// Byte range of the `href` value, when present.
    href: Option<Range<usize>>,
}

fn find_anchors(text: &str) -> Vec<Anchor> {
    ANCHOR_RE
        .find_iter(text)
        .map(|m| {
            let href = ANCHOR_HREF_RE
                .captures(m.as_str())
                .and_then(|caps| caps.get(1))
                .map(|value| m.start() + value.start()..m.start() + value.end());
            Anchor {
                span: m.range(),
                href,
            }
        })
        .collect()
}

fn plan_replacements(text: &str, links: &[DetectedLink]) -> Vec<Replacement> {
    let blocks: Vec<Range<usize>> = PREVIEW_BLOCK_RE
        .find_iter(text)
        .map(|m| m.range())
        .collect();
    let anchors = find_anchors(text);
    let tags: Vec<Range<usize>> = TAG_RE.find_iter(text).map(|m| m.range()).collect();

    let mut planned: Vec<Replacement> = Vec::new();
    for link in links {
        if blocks.iter().any(|block| block.contains(&link.start)) {
            continue;
        }

        let span = if let Some(anchor) = anchors.iter().find(|a| a.span.contains(&link.start)) {
            let is_href = anchor
                .href
                .as_ref()
                .is_some_and(|href| href.contains(&link.start));
            if !is_href {
                continue;
            }
            anchor.span.clone()
        } else if inside_tag(&tags, link.start) {
            continue;
        } else {
            link.start..link.end
        };

        // an anchor contributes one replacement even when its text repeats the URL
        if planned.last().is_some_and(|prev| prev.span.end > span.start) {
            continue;
        }
        planned.push(Replacement {
            span,
            url: link.url.clone(),
        });
    }
    planned
}

fn inside_tag(tags: &[Range<usize>], pos: usize) -> bool {
    tags.iter().any(|tag| tag.start < pos && pos < tag.end)
}

pub struct ContentRewriter<'a, R: ProductRepository> {
    resolver: &'a PreviewResolver,
    products: &'a R,
}

impl<'a, R: ProductRepository> ContentRewriter<'a, R> {
    pub fn new(resolver: &'a PreviewResolver, products: &'a R) -> Self {
        Self { resolver, products }
    }

    #[instrument(skip_all, fields(content_length = text.len()))]
    pub async fn rewrite_content(&self, text: &str) -> RewriteOutcome {
        let links = detect_amazon_links(text);
        let planned = plan_replacements(text, &links);
        debug!(
            detected = links.len(),
            candidates = planned.len(),
            "Scanned content for Amazon links"
        );

        let mut resolved: HashMap<String, Option<AmazonProduct>> = HashMap::new();
        for replacement in &planned {
            if !resolved.contains_key(&replacement.url) {
                let product = self.resolver.resolve_product(&replacement.url).await;
                if product.is_none() {
                    debug!(url = %replacement.url, "No product behind link, leaving it untouched");
                }
                resolved.insert(replacement.url.clone(), product);
            }
        }

        let mut outcome = RewriteOutcome {
            detected: links.len(),
            ..RewriteOutcome::default()
        };
        let mut seen_asins = HashSet::new();
        let mut content = String::with_capacity(text.len());
        let mut cursor = 0;

        for replacement in &planned {
            let Some(Some(product)) = resolved.get(&replacement.url) else {
                continue;
            };
            if !product.is_genuine() {
                continue;
            }

            if seen_asins.insert(product.asin.clone()) {
                outcome.products.push(product.asin.clone());
                self.catalog(product, &mut outcome.cataloged).await;
            }

            content.push_str(&text[cursor..replacement.span.start]);
            content.push_str(&render_preview_block(product));
            cursor = replacement.span.end;
            outcome.replaced += 1;
        }
        content.push_str(&text[cursor..]);
        outcome.content = content;

        info!(
            detected = outcome.detected,
            replaced = outcome.replaced,
            cataloged = outcome.cataloged.len(),
            "Rewrote content"
        );
        outcome
    }

    /// Catalog failures are logged and never abort the rewrite.
    async fn catalog(&self, product: &AmazonProduct, cataloged: &mut Vec<String>) {
        match self
            .products
            .insert_if_absent(&NewAmazonProduct::from(product))
            .await
        {
            Ok(true) => {
                info!(asin = %product.asin, "Cataloged new product");
                cataloged.push(product.asin.clone());
            }
            Ok(false) => {}
            Err(err) => warn!(asin = %product.asin, error = %err, "Failed to catalog product"),
        }
    }
}

pub fn render_preview_block(product: &AmazonProduct) -> String {
    format!(
        concat!(
            r#"<div class="{class}" data-asin="{asin}">"#,
            r#"<img class="amazon-product-image" src="{image}" alt="{alt}" loading="lazy">"#,
            r#"<div class="amazon-product-details">"#,
            r#"<h4 class="amazon-product-title">{title}</h4>"#,
            r#"<p class="amazon-product-description">{description}</p>"#,
            r#"<div class="amazon-product-meta">"#,
            r#"<span class="amazon-product-price">{price}</span> "#,
            r#"<span class="amazon-product-rating">★ {rating:.1} ({reviews} reviews)</span>"#,
            r#"</div>"#,
            r#"<a class="amazon-product-link" href="{url}" target="_blank" rel="noopener noreferrer sponsored">View on Amazon</a>"#,
            r#"</div></div>{end}"#
        ),
        class = PREVIEW_BLOCK_CLASS,
        asin = encode_double_quoted_attribute(&product.asin),
        image = encode_double_quoted_attribute(&product.image),
        alt = encode_double_quoted_attribute(&product.title),
        title = encode_text(&product.title),
        description = encode_text(&product.description),
        price = encode_text(&product.price),
        rating = product.rating,
        reviews = format_thousands(product.reviews),
        url = encode_double_quoted_attribute(&product.url),
        end = PREVIEW_BLOCK_END,
    )
}

fn format_thousands(value: u32) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
