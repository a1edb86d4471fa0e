use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use thiserror::Error;
use url::{Host, Url};

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("URL cannot be empty")]
    EmptyUrl,
    #[error("Malformed URL: {0}")]
    MalformedUrl(String),
    #[error("URL must have a host")]
    MissingHost,
    #[error("Local addresses not allowed: {0}")]
    LocalAddress(String),
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
}

/// Hosts that redirect to a canonical Amazon product page.
pub const AMAZON_SHORT_HOSTS: &[&str] = &["amzn.to", "a.co", "amzn.eu"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    AmazonProduct,
    AmazonShortLink,
    YouTube,
    Other,
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkKind::AmazonProduct => write!(f, "amazon_product"),
            LinkKind::AmazonShortLink => write!(f, "amazon_short_link"),
            LinkKind::YouTube => write!(f, "youtube"),
            LinkKind::Other => write!(f, "other"),
        }
    }
}

/// A link that is safe to fetch from the public internet.
/// Guarantees: http/https scheme, non-empty host, no local addresses
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedLink {
    pub url: Url,

    /// lowercased, never local
    pub host: String,

    pub kind: LinkKind,
}

impl ValidatedLink {
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl fmt::Display for ValidatedLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

impl TryFrom<Url> for ValidatedLink {
    type Error = ValidationError;

    fn try_from(url: Url) -> Result<Self, Self::Error> {
        match url.scheme() {
            "http" | "https" => {}
            scheme => return Err(ValidationError::UnsupportedScheme(scheme.to_string())),
        }

        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or(ValidationError::MissingHost)?
            .to_lowercase();

        if url.host().is_some_and(|parsed| is_local_host(&parsed)) {
            return Err(ValidationError::LocalAddress(host));
        }

        let kind = classify_host(&host);

        Ok(ValidatedLink { url, host, kind })
    }
}

/// Loopback, private, link-local and unspecified addresses, plus `localhost`.
fn is_local_host(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(domain) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            domain == "localhost" || domain.ends_with(".localhost")
        }
        Host::Ipv4(ip) => is_local_ipv4(ip),
        Host::Ipv6(ip) => is_local_ipv6(ip),
    }
}

fn is_local_ipv4(ip: &Ipv4Addr) -> bool {
    ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
}

fn is_local_ipv6(ip: &Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        // unique local fc00::/7
        || (first & 0xfe00) == 0xfc00
        // link-local fe80::/10
        || (first & 0xffc0) == 0xfe80
        || ip.to_ipv4_mapped().is_some_and(|v4| is_local_ipv4(&v4))
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

pub fn classify_host(host: &str) -> LinkKind {
    if AMAZON_SHORT_HOSTS.contains(&host) {
        LinkKind::AmazonShortLink
    } else if host_matches(host, "amazon.com") {
        LinkKind::AmazonProduct
    } else if host_matches(host, "youtube.com")
        || host_matches(host, "youtube-nocookie.com")
        || host == "youtu.be"
    {
        LinkKind::YouTube
    } else {
        LinkKind::Other
    }
}

/// Content often carries links without a scheme (`amzn.to/abc`); those are
/// treated as https.
pub fn with_default_scheme(raw: &str) -> String {
    let lower = raw.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") || raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{}", raw.trim_start_matches('/'))
    }
}

pub fn validate_link(url_str: &str) -> Result<ValidatedLink, ValidationError> {
    let trimmed = url_str.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyUrl);
    }

    let candidate = if trimmed.contains(':') {
        trimmed.to_string()
    } else {
        with_default_scheme(trimmed)
    };

    let url =
        Url::parse(&candidate).map_err(|_| ValidationError::MalformedUrl(url_str.to_string()))?;
    ValidatedLink::try_from(url)
}
