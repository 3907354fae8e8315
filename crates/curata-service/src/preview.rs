use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::debug;
use url::Url;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = "CurataBot/1.0";
const HEAD_LIMIT: usize = 100_000;

pub const PLACEHOLDER_IMAGE: &str = "/previews/placeholder.svg";

const PLACEHOLDER_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="400" height="240"><rect width="100%" height="100%" fill="#f2e6d3"/><text x="50%" y="50%" font-family="Arial, sans-serif" font-size="18" fill="#6b645c" text-anchor="middle" dominant-baseline="middle">No preview</text></svg>"##;

/// Page metadata scraped for display. `image` is always a servable path
/// or URL, falling back to the placeholder.
#[derive(Debug, Clone, Default)]
pub struct Preview {
    pub title: Option<String>,
    pub image: String,
}

#[async_trait]
pub trait FetchPreview: Send + Sync {
    /// Degrades on every failure; never returns an error.
    async fn fetch_preview(&self, url: &str) -> Preview;
}

pub struct HttpPreviewFetcher {
    client: reqwest::Client,
    preview_dir: PathBuf,
}

impl HttpPreviewFetcher {
    pub fn new(preview_dir: impl Into<PathBuf>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to build preview HTTP client");
        Self {
            client,
            preview_dir: preview_dir.into(),
        }
    }

    async fn fetch_page_meta(&self, url: &str) -> (Option<String>, Option<String>) {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(err) => {
                debug!(url, error = %err, "Preview fetch failed");
                return (None, None);
            }
        };

        if !response.status().is_success() {
            return (None, None);
        }

        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.contains("text/html"))
            .unwrap_or(false);
        if !is_html {
            return (None, None);
        }

        let html = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                debug!(url, error = %err, "Preview body read failed");
                return (None, None);
            }
        };

        let image = extract_meta(&html, "og:image").or_else(|| extract_meta(&html, "twitter:image"));
        let title = extract_meta(&html, "og:title").or_else(|| extract_title(&html));
        (title, image)
    }

    /// Download an image into the content-addressed cache. Returns a
    /// servable `/previews/...` path; failures degrade to the placeholder.
    async fn download_image(&self, image_url: &str) -> String {
        self.ensure_preview_dir();
        if image_url.is_empty() {
            return PLACEHOLDER_IMAGE.to_string();
        }

        let key = cache_key(image_url);
        if let Some(cached) = self.find_cached(&key) {
            return format!("/previews/{cached}");
        }

        let response = match self.client.get(image_url).send().await {
            Ok(response) if response.status().is_success() => response,
            _ => return PLACEHOLDER_IMAGE.to_string(),
        };

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(_) => return PLACEHOLDER_IMAGE.to_string(),
        };

        let ext = extension_from_content_type(&content_type)
            .or_else(|| extension_from_url(image_url))
            .unwrap_or_else(|| ".jpg".to_string());
        let filename = format!("{key}{ext}");

        if std::fs::write(self.preview_dir.join(&filename), &bytes).is_err() {
            return PLACEHOLDER_IMAGE.to_string();
        }
        format!("/previews/{filename}")
    }

    fn find_cached(&self, key: &str) -> Option<String> {
        let entries = std::fs::read_dir(&self.preview_dir).ok()?;
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(key) {
                return Some(name);
            }
        }
        None
    }

    fn ensure_preview_dir(&self) {
        let _ = std::fs::create_dir_all(&self.preview_dir);
        let placeholder = self.preview_dir.join("placeholder.svg");
        if !placeholder.exists() {
            let _ = std::fs::write(placeholder, PLACEHOLDER_SVG);
        }
    }
}

#[async_trait]
impl FetchPreview for HttpPreviewFetcher {
    async fn fetch_preview(&self, url: &str) -> Preview {
        let (title, image) = self.fetch_page_meta(url).await;

        let resolved = image
            .and_then(|candidate| resolve_image_url(&candidate, url))
            .or_else(|| favicon_url(url));

        let image = match resolved {
            Some(image_url) => self.download_image(&image_url).await,
            None => {
                self.ensure_preview_dir();
                PLACEHOLDER_IMAGE.to_string()
            }
        };

        Preview { title, image }
    }
}

/// First `HEAD_LIMIT` bytes of the document, backed off to a char
/// boundary. Metadata lives in the head; scanning megabytes of body is
/// wasted work.
fn head_of(html: &str) -> &str {
    if html.len() <= HEAD_LIMIT {
        return html;
    }
    let mut end = HEAD_LIMIT;
    while !html.is_char_boundary(end) {
        end -= 1;
    }
    &html[..end]
}

/// Pull a `<meta property|name=... content=...>` value out of raw HTML,
/// tolerating either attribute order.
fn extract_meta(html: &str, property: &str) -> Option<String> {
    let head = head_of(html);
    let escaped = regex::escape(property);

    let forward = Regex::new(&format!(
        r#"(?i)<meta[^>]+(?:property|name)\s*=\s*["']{escaped}["'][^>]+content\s*=\s*["']([^"']+)["']"#
    ))
    .expect("Invalid meta regex");
    if let Some(cap) = forward.captures(head) {
        return Some(cap[1].to_string());
    }

    let reversed = Regex::new(&format!(
        r#"(?i)<meta[^>]+content\s*=\s*["']([^"']+)["'][^>]+(?:property|name)\s*=\s*["']{escaped}["']"#
    ))
    .expect("Invalid meta regex");
    reversed.captures(head).map(|cap| cap[1].to_string())
}

fn extract_title(html: &str) -> Option<String> {
    let head = head_of(html);
    let re = Regex::new(r"(?i)<title[^>]*>([^<]+)</title>").expect("Invalid title regex");
    re.captures(head)
        .map(|cap| cap[1].trim().to_string())
        .filter(|title| !title.is_empty())
}

/// Resolve a possibly relative or protocol-relative image URL against
/// the page it was found on.
fn resolve_image_url(candidate: &str, base: &str) -> Option<String> {
    if candidate.is_empty() {
        return None;
    }
    if let Some(rest) = candidate.strip_prefix("//") {
        return Some(format!("https://{rest}"));
    }
    let base = Url::parse(base).ok()?;
    base.join(candidate).ok().map(|url| url.to_string())
}

fn favicon_url(page_url: &str) -> Option<String> {
    let parsed = Url::parse(page_url).ok()?;
    let origin = parsed.origin().ascii_serialization();
    let encoded: String = url::form_urlencoded::byte_serialize(origin.as_bytes()).collect();
    Some(format!(
        "https://www.google.com/s2/favicons?sz=128&domain_url={encoded}"
    ))
}

/// Content-address for a resolved image URL; any cached file sharing
/// this prefix is a hit.
fn cache_key(image_url: &str) -> String {
    let digest = Sha256::digest(image_url.as_bytes());
    hex::encode(digest)[..16].to_string()
}

fn extension_from_content_type(content_type: &str) -> Option<String> {
    let ext = match content_type.to_lowercase().as_str() {
        "image/png" => ".png",
        "image/jpeg" | "image/jpg" => ".jpg",
        "image/webp" => ".webp",
        "image/gif" => ".gif",
        "image/svg+xml" => ".svg",
        _ => return None,
    };
    Some(ext.to_string())
}

fn extension_from_url(image_url: &str) -> Option<String> {
    let parsed = Url::parse(image_url).ok()?;
    let path = parsed.path();
    let dot = path.rfind('.')?;
    let ext = &path[dot..];
    if ext.len() > 1 && ext.len() <= 5 && !ext.contains('/') {
        Some(ext.to_string())
    } else {
        None
    }
}
