//! YouTube video metadata.
//!
//! oEmbed supplies the title, channel and thumbnail. The watch page is then
//! mined for the full description using an ordered list of strategies.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::fetch::{FetchError, PageFetcher};

pub const OEMBED_ENDPOINT: &str = "https://www.youtube.com/oembed";

/// YouTube's site-wide description, served when a page has none of its own.
const GENERIC_DESCRIPTION_MARKER: &str = "Enjoy the videos and music you love";

static VIDEO_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i:youtube(?:-nocookie)?\.com/(?:watch\?(?:[^#\s]*&)?v=|embed/|shorts/|v/|live/)|youtu\.be/)([A-Za-z0-9_-]{11})(?:[^A-Za-z0-9_-]|$)",
    )
    .expect("valid video id regex")
});

static INITIAL_DATA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)(?:var\s+ytInitialData|window\["ytInitialData"\])\s*=\s*(\{.*?\});\s*</script>"#)
        .expect("valid ytInitialData regex")
});

static SHORT_DESCRIPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""shortDescription"\s*:\s*"((?:[^"\\]|\\.)*)""#)
        .expect("valid shortDescription regex")
});

static LENGTH_SECONDS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""lengthSeconds"\s*:\s*"(\d+)""#).expect("valid lengthSeconds regex")
});

#[derive(Error, Debug)]
pub enum YouTubeError {
    #[error("not a recognized YouTube video URL: {0}")]
    UnrecognizedUrl(String),

    #[error("oEmbed request failed: {0}")]
    OEmbed(#[source] FetchError),

    #[error("oEmbed response was not valid JSON: {0}")]
    OEmbedParse(#[source] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YouTubeVideoMetadata {
    pub title: String,
    pub description: String,
    pub thumbnail: String,
    pub video_id: String,
    pub channel_name: String,
    pub duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OEmbedResponse {
    title: String,
    #[serde(default)]
    author_name: String,
    #[serde(default)]
    thumbnail_url: Option<String>,
}

pub fn extract_video_id(url: &str) -> Option<String> {
    VIDEO_ID_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

fn oembed_url(watch_url: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(watch_url.as_bytes()).collect();
    format!("{OEMBED_ENDPOINT}?url={encoded}&format=json")
}

pub struct YouTubeClient {
    fetcher: Arc<dyn PageFetcher>,
}

impl YouTubeClient {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }

    /// Fails only when the URL carries no video id or oEmbed is unreachable;
    /// a missing description is replaced with filler text.
    #[instrument(skip(self))]
    pub async fn fetch_video_metadata(&self, url: &str) -> Result<YouTubeVideoMetadata, YouTubeError> {
        let video_id =
            extract_video_id(url).ok_or_else(|| YouTubeError::UnrecognizedUrl(url.to_string()))?;
        let watch_url = watch_url(&video_id);

        let body = self
            .fetcher
            .get_text(&oembed_url(&watch_url))
            .await
            .map_err(|err| {
                warn!(video_id = %video_id, error = %err, "oEmbed request failed");
                YouTubeError::OEmbed(err)
            })?;
        let oembed: OEmbedResponse =
            serde_json::from_str(&body).map_err(YouTubeError::OEmbedParse)?;

        let (description, duration) = match self.fetcher.get_text(&watch_url).await {
            Ok(html) => (extract_description(&html), extract_duration(&html)),
            Err(err) => {
                warn!(video_id = %video_id, error = %err, "Watch page unavailable, using filler description");
                (None, None)
            }
        };

        let description = description.unwrap_or_else(|| {
            debug!(video_id = %video_id, "No usable description found");
            filler_description(&oembed.title, &oembed.author_name)
        });

        let thumbnail = oembed
            .thumbnail_url
            .filter(|thumb| !thumb.is_empty())
            .unwrap_or_else(|| format!("https://i.ytimg.com/vi/{video_id}/hqdefault.jpg"));

        Ok(YouTubeVideoMetadata {
            title: oembed.title,
            description,
            thumbnail,
            video_id,
            channel_name: oembed.author_name,
            duration,
        })
    }
}

struct WatchPage<'a> {
    raw: &'a str,
    document: Html,
}

type DescriptionStrategy = fn(&WatchPage<'_>) -> Option<String>;

const DESCRIPTION_STRATEGIES: &[(&str, DescriptionStrategy)] = &[
    ("ytInitialData", from_initial_data),
    ("shortDescription", from_short_description),
    ("meta description", from_meta_description),
    ("og:description", from_og_description),
    ("json-ld", from_json_ld),
];

/// Runs each strategy in order and returns the first usable description.
pub fn extract_description(html: &str) -> Option<String> {
    let page = WatchPage {
        raw: html,
        document: Html::parse_document(html),
    };

    DESCRIPTION_STRATEGIES.iter().find_map(|(name, strategy)| {
        let description = strategy(&page).filter(|text| is_usable_description(text))?;
        debug!(strategy = *name, length = description.len(), "Extracted description");
        Some(description)
    })
}

pub fn is_usable_description(text: &str) -> bool {
    let trimmed = text.trim();
    !trimmed.is_empty() && !trimmed.contains(GENERIC_DESCRIPTION_MARKER)
}

fn from_initial_data(page: &WatchPage<'_>) -> Option<String> {
    let raw = INITIAL_DATA_RE.captures(page.raw)?.get(1)?.as_str();
    let data: Value = serde_json::from_str(raw).ok()?;

    data.pointer("/contents/twoColumnWatchNextResults/results/results/contents")?
        .as_array()?
        .iter()
        .filter_map(|item| item.get("videoSecondaryInfoRenderer"))
        .find_map(|renderer| {
            renderer
                .pointer("/attributedDescription/content")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| {
                    let runs = renderer.pointer("/description/runs")?.as_array()?;
                    let text: String = runs
                        .iter()
                        .filter_map(|run| run.get("text").and_then(Value::as_str))
                        .collect();
                    Some(text)
                })
        })
}

fn from_short_description(page: &WatchPage<'_>) -> Option<String> {
    let escaped = SHORT_DESCRIPTION_RE.captures(page.raw)?.get(1)?.as_str();
    serde_json::from_str::<String>(&format!("\"{escaped}\"")).ok()
}

fn from_meta_description(page: &WatchPage<'_>) -> Option<String> {
    meta_content(&page.document, "meta[name=\"description\"]")
}

fn from_og_description(page: &WatchPage<'_>) -> Option<String> {
    meta_content(&page.document, "meta[property=\"og:description\"]")
}

fn from_json_ld(page: &WatchPage<'_>) -> Option<String> {
    let selector = Selector::parse("script[type=\"application/ld+json\"]").ok()?;
    page.document.select(&selector).find_map(|script| {
        let json: Value = serde_json::from_str(&script.text().collect::<String>()).ok()?;
        let candidates = match json {
            Value::Array(items) => items,
            other => vec![other],
        };
        candidates.iter().find_map(|item| {
            item.get("description")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
    })
}

fn meta_content(document: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("content"))
        .map(|content| content.trim().to_string())
        .find(|content| !content.is_empty())
}

pub fn extract_duration(html: &str) -> Option<String> {
    let seconds: u64 = LENGTH_SECONDS_RE.captures(html)?.get(1)?.as_str().parse().ok()?;
    (seconds > 0).then(|| format_duration(seconds))
}

pub fn format_duration(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

pub fn filler_description(title: &str, channel: &str) -> String {
    if channel.trim().is_empty() {
        format!("{title}\n\nWatch the full video on YouTube.")
    } else {
        format!("{title}\n\nWatch the full video from {channel} on YouTube.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_video_id_supported_shapes() {
        let id = "dQw4w9WgXcQ";
        for url in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtube.com/watch?feature=share&v=dQw4w9WgXcQ&t=42s",
            "https://youtu.be/dQw4w9WgXcQ?si=abc",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "https://www.youtube-nocookie.com/embed/dQw4w9WgXcQ",
            "https://www.youtube.com/shorts/dQw4w9WgXcQ",
            "HTTPS://WWW.YOUTUBE.COM/watch?v=dQw4w9WgXcQ",
        ] {
            assert_eq!(extract_video_id(url).as_deref(), Some(id), "{url}");
        }
    }

    #[test]
    fn test_extract_video_id_rejects_other_urls() {
        assert_eq!(extract_video_id("https://www.youtube.com/channel/UC123"), None);
        assert_eq!(extract_video_id("https://youtu.be/short"), None);
        assert_eq!(extract_video_id("https://vimeo.com/123456789"), None);
        assert_eq!(extract_video_id("https://youtu.be/dQw4w9WgXcQextra"), None);
    }

    #[test]
    fn test_oembed_url_encodes_watch_url() {
        assert_eq!(
            oembed_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            "https://www.youtube.com/oembed?url=https%3A%2F%2Fwww.youtube.com%2Fwatch%3Fv%3DdQw4w9WgXcQ&format=json"
        );
    }

    #[test]
    fn test_description_from_initial_data_runs() {
        let html = r#"<script>var ytInitialData = {"contents":{"twoColumnWatchNextResults":{"results":{"results":{"contents":[{"videoPrimaryInfoRenderer":{}},{"videoSecondaryInfoRenderer":{"description":{"runs":[{"text":"Full body "},{"text":"workout"}]}}}]}}}}};</script>"#;
        assert_eq!(extract_description(html).as_deref(), Some("Full body workout"));
    }

    #[test]
    fn test_description_from_attributed_description() {
        let html = r#"<script>var ytInitialData = {"contents":{"twoColumnWatchNextResults":{"results":{"results":{"contents":[{"videoSecondaryInfoRenderer":{"attributedDescription":{"content":"Leg day"}}}]}}}}};</script>"#;
        assert_eq!(extract_description(html).as_deref(), Some("Leg day"));
    }

    #[test]
    fn test_description_from_short_description_unescapes() {
        let html = r#"<script>var ytInitialPlayerResponse = {"videoDetails":{"shortDescription":"Line one\nLine \"two\""}};</script>"#;
        assert_eq!(
            extract_description(html).as_deref(),
            Some("Line one\nLine \"two\"")
        );
    }

    #[test]
    fn test_description_skips_generic_meta_and_uses_og() {
        let html = r#"<html><head>
            <meta name="description" content="Enjoy the videos and music you love, upload original content, and share it all with friends, family, and the world on YouTube.">
            <meta property="og:description" content="Mobility flow for runners">
        </head></html>"#;
        assert_eq!(
            extract_description(html).as_deref(),
            Some("Mobility flow for runners")
        );
    }

    #[test]
    fn test_description_from_json_ld() {
        let html = r#"<html><head><script type="application/ld+json">[{"@type":"VideoObject","description":"Core circuit"}]</script></head></html>"#;
        assert_eq!(extract_description(html).as_deref(), Some("Core circuit"));
    }

    #[test]
    fn test_description_none_when_nothing_usable() {
        assert_eq!(extract_description("<html><body></body></html>"), None);
    }

    #[test]
    fn test_duration_parsing_and_formatting() {
        assert_eq!(
            extract_duration(r#"{"lengthSeconds":"3723"}"#).as_deref(),
            Some("1:02:03")
        );
        assert_eq!(format_duration(59), "0:59");
        assert_eq!(format_duration(605), "10:05");
        assert_eq!(extract_duration(r#"{"lengthSeconds":"0"}"#), None);
    }

    #[test]
    fn test_filler_description_mentions_title() {
        let filler = filler_description("Push Day", "Coach Sam");
        assert!(filler.starts_with("Push Day"));
        assert!(filler.contains("Coach Sam"));
        assert!(is_usable_description(&filler));
    }
}
