//! On-disk image cache for product images.
//!
//! One file per `(source, identifier)`, named `{source}_{identifier}.{ext}`.
//! An existing file is never re-downloaded.

use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use bytes::Bytes;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use crate::fetch::PageFetcher;

pub const AMAZON_SOURCE: &str = "amazon";

const KNOWN_EXTENSIONS: &[&str] = &["jpg", "png", "webp", "gif"];

#[derive(Clone)]
pub struct ImageCache {
    fetcher: Arc<dyn PageFetcher>,
    dir: PathBuf,
    public_prefix: String,
    source: &'static str,
}

impl ImageCache {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        dir: impl Into<PathBuf>,
        public_prefix: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            dir: dir.into(),
            public_prefix: public_prefix.into().trim_end_matches('/').to_string(),
            source: AMAZON_SOURCE,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the public path of a local copy of `remote_url`, downloading
    /// it on first use. `None` means the caller should keep the remote URL.
    #[instrument(skip(self))]
    pub async fn ensure_local_image(&self, remote_url: &str, identifier: &str) -> Option<String> {
        if remote_url.starts_with('/') {
            return Some(remote_url.to_string());
        }

        let identifier = sanitize_identifier(identifier);
        if identifier.is_empty() {
            warn!("Refusing to cache image without an identifier");
            return None;
        }
        let stem = format!("{}_{}", self.source, identifier);

        match self.find_cached(&stem).await {
            Ok(Some(file_name)) => {
                debug!(file = %file_name, "Using cached image");
                return Some(self.public_path(&file_name));
            }
            Ok(None) => {}
            Err(err) => {
                warn!(dir = %self.dir.display(), error = %err, "Failed to read image directory");
            }
        }

        let body = match self.fetcher.get_bytes(remote_url).await {
            Ok(body) => body,
            Err(err) => {
                warn!(error = %err, "Failed to download image");
                return None;
            }
        };

        let extension = extension_for(body.content_type.as_deref(), remote_url);
        let file_name = format!("{stem}.{extension}");

        let size = body.bytes.len();
        if let Err(err) = self.write_atomically(&file_name, body.bytes).await {
            warn!(file = %file_name, error = %err, "Failed to write cached image");
            return None;
        }

        info!(file = %file_name, bytes = size, "Cached product image");
        Some(self.public_path(&file_name))
    }

    async fn find_cached(&self, stem: &str) -> std::io::Result<Option<String>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let matches = name
                .strip_prefix(stem)
                .and_then(|rest| rest.strip_prefix('.'))
                .is_some_and(|ext| KNOWN_EXTENSIONS.contains(&ext));
            if matches {
                return Ok(Some(name.to_string()));
            }
        }

        Ok(None)
    }

    /// Each writer fills its own uniquely named temp file in the cache
    /// directory and renames it over `file_name`, so concurrent downloads of
    /// one identifier never interleave.
    async fn write_atomically(&self, file_name: &str, bytes: Bytes) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir).await?;

        let dir = self.dir.clone();
        let final_path = self.dir.join(file_name);
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut tmp = tempfile::Builder::new()
                .prefix(".image-")
                .suffix(".tmp")
                .tempfile_in(&dir)?;
            tmp.write_all(&bytes)?;
            tmp.persist(&final_path).map_err(|err| err.error)?;
            Ok(())
        })
        .await
        .map_err(std::io::Error::other)?
    }

    fn public_path(&self, file_name: &str) -> String {
        format!("{}/{}", self.public_prefix, file_name)
    }
}

fn sanitize_identifier(identifier: &str) -> String {
    identifier
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

fn extension_for(content_type: Option<&str>, url: &str) -> &'static str {
    let from_header = content_type.and_then(|value| {
        let mime = value.split(';').next().unwrap_or(value).trim();
        match mime.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some("jpg"),
            "image/png" => Some("png"),
            "image/webp" => Some("webp"),
            "image/gif" => Some("gif"),
            _ => None,
        }
    });

    from_header
        .or_else(|| {
            let path = url.split(['?', '#']).next().unwrap_or(url);
            let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
            match ext.as_str() {
                "jpg" | "jpeg" => Some("jpg"),
                "png" => Some("png"),
                "webp" => Some("webp"),
                "gif" => Some("gif"),
                _ => None,
            }
        })
        .unwrap_or("jpg")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_prefers_content_type() {
        assert_eq!(
            extension_for(Some("image/png; charset=binary"), "https://x/a.jpg"),
            "png"
        );
        assert_eq!(extension_for(Some("IMAGE/WEBP"), "https://x/a"), "webp");
    }

    #[test]
    fn test_extension_falls_back_to_url_then_jpg() {
        assert_eq!(
            extension_for(Some("application/octet-stream"), "https://x/a.JPEG?v=2"),
            "jpg"
        );
        assert_eq!(extension_for(None, "https://x/image.gif"), "gif");
        assert_eq!(extension_for(None, "https://x/image"), "jpg");
    }

    #[test]
    fn test_sanitize_identifier_strips_path_characters() {
        assert_eq!(sanitize_identifier("../B001ARYU58"), "B001ARYU58");
        assert_eq!(sanitize_identifier("/..//"), "");
    }
}
