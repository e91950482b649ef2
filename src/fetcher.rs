use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Window;
use crate::error::{ClientError, FetchError};
use crate::store::Item;

pub const DEFAULT_BASE_URL: &str = "https://www.reddit.com";

const PERMALINK_HOST: &str = "https://reddit.com";
const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

/// Fetches one source's top items and normalizes them into [`Item`]s.
///
/// Implementations only normalize. Filtering on image presence or adult
/// content is left to the caller.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(
        &self,
        source_id: &str,
        limit: u32,
        window: Window,
    ) -> Result<Vec<Item>, FetchError>;
}

pub struct RedditFetcher {
    client: Client,
    base_url: Url,
}

impl RedditFetcher {
    pub fn new(timeout: Duration) -> Result<Self, ClientError> {
        Self::with_base_url(DEFAULT_BASE_URL, timeout)
    }

    /// The base URL must be an absolute http(s) URL; it is checked here so a
    /// bad setting fails at startup instead of on every fetch.
    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url).map_err(|e| ClientError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: "expected an http or https URL".to_string(),
            });
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent())
            .build()?;

        Ok(Self { client, base_url })
    }

    fn listing_url(&self, source_id: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["r", source_id, "top.json"]);
        }
        url
    }
}

#[async_trait]
impl SourceFetcher for RedditFetcher {
    async fn fetch(
        &self,
        source_id: &str,
        limit: u32,
        window: Window,
    ) -> Result<Vec<Item>, FetchError> {
        let url = self.listing_url(source_id);
        info!("Fetching top posts for '{}' (limit={}, t={})", source_id, limit, window);

        let response = self
            .client
            .get(url)
            .query(&[("limit", limit.to_string()), ("t", window.to_string())])
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(source_id, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                source_id: source_id.to_string(),
                status,
            });
        }

        let listing: Listing = response
            .json()
            .await
            .map_err(|e| FetchError::from_reqwest(source_id, e))?;

        let items = normalize_listing(source_id, listing);
        debug!("Normalized {} posts for '{}'", items.len(), source_id);
        Ok(items)
    }
}

fn user_agent() -> String {
    format!(
        "pr1sm/{} ({} {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

// Upstream listing shape, only the fields we read

#[derive(Debug, Default, Deserialize)]
pub struct Listing {
    #[serde(default)]
    pub data: ListingData,
}

/// Children stay raw so one malformed post cannot sink the whole listing.
#[derive(Debug, Default, Deserialize)]
pub struct ListingData {
    #[serde(default)]
    pub children: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct Child {
    pub data: Post,
}

#[derive(Debug, Default, Deserialize)]
pub struct Post {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub permalink: Option<String>,
    #[serde(default)]
    pub ups: Option<i64>,
    #[serde(default)]
    pub over_18: bool,
    #[serde(default)]
    pub preview: Option<Preview>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub url_overridden_by_dest: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Preview {
    #[serde(default)]
    pub images: Vec<PreviewImage>,
}

#[derive(Debug, Deserialize)]
pub struct PreviewImage {
    pub source: Option<ImageSource>,
}

#[derive(Debug, Deserialize)]
pub struct ImageSource {
    pub url: Option<String>,
}

pub fn normalize_listing(source_id: &str, listing: Listing) -> Vec<Item> {
    listing
        .data
        .children
        .into_iter()
        .filter_map(|raw| match serde_json::from_value::<Child>(raw) {
            Ok(child) => Some(normalize_post(source_id, child.data)),
            Err(e) => {
                warn!("Skipping malformed post in '{}': {}", source_id, e);
                None
            }
        })
        .collect()
}

pub fn normalize_post(source_id: &str, post: Post) -> Item {
    let image = resolve_image(&post);
    Item {
        id: post.id.unwrap_or_default(),
        source_id: source_id.to_string(),
        title: post.title.unwrap_or_default(),
        image,
        permalink: format!("{}{}", PERMALINK_HOST, post.permalink.unwrap_or_default()),
        score: post.ups.unwrap_or(0).max(0) as u64,
        adult: post.over_18,
    }
}

/// Pick the post's image. The first rule that matches wins:
/// preview source, absolute thumbnail, then a destination URL that points
/// straight at a raster image.
pub fn resolve_image(post: &Post) -> Option<String> {
    if let Some(url) = preview_url(post) {
        return Some(url.replace("&amp;", "&"));
    }

    if let Some(thumb) = post.thumbnail.as_deref() {
        if is_absolute_http(thumb) {
            return Some(thumb.to_string());
        }
    }

    if let Some(dest) = post.url_overridden_by_dest.as_deref() {
        if has_image_extension(dest) {
            return Some(dest.to_string());
        }
    }

    None
}

fn preview_url(post: &Post) -> Option<&str> {
    post.preview
        .as_ref()?
        .images
        .first()?
        .source
        .as_ref()?
        .url
        .as_deref()
        .filter(|u| !u.is_empty())
}

// Reddit uses sentinels like "self", "default" and "nsfw" for thumbnails
fn is_absolute_http(candidate: &str) -> bool {
    Url::parse(candidate)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

pub fn has_image_extension(candidate: &str) -> bool {
    let Ok(url) = Url::parse(candidate) else {
        return false;
    };
    let path = url.path().to_lowercase();
    IMAGE_EXTENSIONS
        .iter()
        .any(|ext| path.ends_with(&format!(".{}", ext)))
}
