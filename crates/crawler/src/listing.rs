use serde::Deserialize;

use crate::CrawlerError;

/// `next_offset` value marking the last page.
pub const END_OF_LISTING: i64 = -1;

/// One page of the performance listing endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ListingPage {
    #[serde(default)]
    pub list: Vec<SongSummary>,
    pub next_offset: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SongSummary {
    pub key: String,
    #[serde(default)]
    pub title: Option<String>,
    pub web_url: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl ListingPage {
    pub fn parse(body: &[u8]) -> Result<Self, CrawlerError> {
        serde_json::from_slice(body)
            .map_err(|e| CrawlerError::ParseError(format!("listing page: {}", e)))
    }

    pub fn is_last(&self) -> bool {
        self.next_offset == END_OF_LISTING
    }
}

impl SongSummary {
    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or_default()
    }
}
