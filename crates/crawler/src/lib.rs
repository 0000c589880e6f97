pub mod listing;
pub mod meta;

use async_trait::async_trait;
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use url::Url;

pub use listing::{ListingPage, SongSummary, END_OF_LISTING};
pub use meta::{extract_meta_content, STREAM_META_NAME};

#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("smule-archiver/{}", env!("CARGO_PKG_VERSION")),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Status line, content type and body of a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn new(status: u16, content_type: Option<&str>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type: content_type.map(str::to_string),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Status and size of a streamed download. `bytes` is zero when nothing was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadHead {
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes: u64,
}

impl DownloadHead {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Outbound HTTP used by the harvester. Non-success statuses are returned, not raised.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn get(&self, url: &str) -> Result<FetchResponse, CrawlerError>;
    async fn post(&self, url: &str) -> Result<FetchResponse, CrawlerError>;
    /// GETs `url` and streams a successful body into `dest`, which is created or truncated.
    /// `dest` is left untouched for non-success statuses.
    async fn download_to(&self, url: &str, dest: &Path) -> Result<DownloadHead, CrawlerError>;
}

fn content_type_of(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, CrawlerError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.timeout)
            .cookie_store(true)
            .build()?;
        Ok(Self {
            client,
            timeout: config.timeout,
        })
    }

    async fn read(response: reqwest::Response) -> Result<FetchResponse, CrawlerError> {
        let status = response.status().as_u16();
        let content_type = content_type_of(&response);
        let body = response.bytes().await?.to_vec();
        Ok(FetchResponse {
            status,
            content_type,
            body,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, url: &str) -> Result<FetchResponse, CrawlerError> {
        debug!("GET {}", url);
        let response = self.client.get(url).timeout(self.timeout).send().await?;
        Self::read(response).await
    }

    async fn post(&self, url: &str) -> Result<FetchResponse, CrawlerError> {
        debug!("POST {}", url);
        let response = self.client.post(url).timeout(self.timeout).send().await?;
        Self::read(response).await
    }

    async fn download_to(&self, url: &str, dest: &Path) -> Result<DownloadHead, CrawlerError> {
        debug!("GET {} -> {:?}", url, dest);
        // Only the connect timeout applies to media bodies.
        let response = self.client.get(url).send().await?;
        let mut head = DownloadHead {
            status: response.status().as_u16(),
            content_type: content_type_of(&response),
            bytes: 0,
        };
        if !head.is_success() {
            return Ok(head);
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            head.bytes += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(head)
    }
}

/// URL layout of the platform.
#[derive(Debug, Clone)]
pub struct Endpoints {
    site: String,
    recording_base: String,
}

impl Endpoints {
    pub const SITE: &'static str = "https://www.smule.com";
    pub const RECORDING_BASE: &'static str = "https://smule.com/recording";

    pub fn new(site: &str, recording_base: &str) -> Result<Self, CrawlerError> {
        for base in [site, recording_base] {
            Url::parse(base).map_err(|e| CrawlerError::InvalidUrl(format!("{}: {}", base, e)))?;
        }

        Ok(Self {
            site: site.trim_end_matches('/').to_string(),
            recording_base: recording_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn profile_url(&self, username: &str) -> String {
        format!("{}/{}", self.site, username)
    }

    pub fn listing_url(&self, username: &str, offset: i64) -> String {
        format!(
            "{}/s/profile/performance/{}/sing?offset={}&size=0",
            self.site, username, offset
        )
    }

    pub fn render_url(&self, key: &str) -> String {
        format!("{}/p/{}/render", self.site, key)
    }

    /// Recording page for a listing `web_url`, which is usually a path.
    pub fn recording_url(&self, web_url: &str) -> String {
        if web_url.starts_with("http://") || web_url.starts_with("https://") {
            return web_url.to_string();
        }
        if web_url.starts_with('/') {
            format!("{}{}", self.recording_base, web_url)
        } else {
            format!("{}/{}", self.recording_base, web_url)
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            site: Self::SITE.to_string(),
            recording_base: Self::RECORDING_BASE.to_string(),
        }
    }
}
