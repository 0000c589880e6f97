//! Song discovery, media URL resolution and downloading for Smule profiles.
//!
//! [`Harvester`] ties the three collaborators together: a [`Fetcher`] for
//! HTTP, a [`SongRepository`] for persistence and, for the fix pass, a
//! [`browser::PageDriver`] session. Every pass is sequential.

pub mod download;
pub mod fallback;
pub mod listing;
pub mod resolve;

#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crawler::{CrawlerError, Endpoints, Fetcher};
use storage::{InvalidTransition, MediaType, Profile, SongFilter, SongRepository, SongStatus, StorageError};

pub use download::{extension_for, DownloadReport};
pub use fallback::{ClickStep, ClickStrategy, ContentCategory, FallbackConfig, FixReport};
pub use listing::ListingReport;
pub use resolve::{classify_status, resolve_html, FailureKind};

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("User profile was not found on Smule: {url} (status {status})")]
    ProfileNotFound { url: String, status: u16 },
    #[error("Listing page at offset {offset} failed: {reason}")]
    ListingFailed { offset: i64, reason: String },
    #[error("Listing cursor did not advance: offset {offset}, next {next}")]
    StalledCursor { offset: i64, next: i64 },
    #[error("Download of {url} failed with status {status}")]
    DownloadFailed { url: String, status: u16 },
    #[error("Song {0} has no media url")]
    MissingMediaUrl(String),
    #[error(transparent)]
    Crawler(#[from] CrawlerError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Transition(#[from] InvalidTransition),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Attempts per recording page before a song is considered deleted.
    pub max_fetch_attempts: u32,
    pub retry_backoff: Duration,
    pub output_dir: PathBuf,
    pub fallback: FallbackConfig,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            max_fetch_attempts: 3,
            retry_backoff: Duration::from_secs(2),
            output_dir: PathBuf::from("media"),
            fallback: FallbackConfig::default(),
        }
    }
}

/// Progress callbacks for the long-running passes.
pub trait ProgressReporter {
    fn start(&self, total: Option<u64>, label: &str);
    fn advance(&self);
    fn finish(&self);
}

pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn start(&self, _total: Option<u64>, _label: &str) {}
    fn advance(&self) {}
    fn finish(&self) {}
}

/// Per-status and per-type song counts of a profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SongCounts {
    pub audio: u64,
    pub video: u64,
    pub unknown: u64,
    pub active: u64,
    pub inactive: u64,
    pub deleted: u64,
    pub downloaded: u64,
    pub total: u64,
}

pub struct Harvester<F, R> {
    fetcher: F,
    repo: R,
    endpoints: Endpoints,
    config: HarvestConfig,
}

impl<F, R> Harvester<F, R>
where
    F: Fetcher,
    R: SongRepository,
{
    pub fn new(fetcher: F, repo: R, endpoints: Endpoints, config: HarvestConfig) -> Self {
        Self {
            fetcher,
            repo,
            endpoints,
            config,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Returns the stored verified profile, or verifies it upstream and stores it.
    pub async fn find_or_create_profile(&self, username: &str) -> Result<Profile, HarvestError> {
        if let Some(profile) = self.repo.find_profile(username)? {
            info!("Profile {} found in database", username);
            return Ok(profile);
        }

        info!("Profile {} not found in database, checking Smule", username);
        let url = self.endpoints.profile_url(username);
        let response = self.fetcher.get(&url).await?;

        if response.status != 200 {
            return Err(HarvestError::ProfileNotFound {
                url,
                status: response.status,
            });
        }

        Ok(self.repo.insert_profile(username, &url)?)
    }

    pub fn summarize(&self, profile: &Profile) -> Result<SongCounts, HarvestError> {
        let by_status = |status| self.repo.count_songs(profile, SongFilter::with_status(status));
        Ok(SongCounts {
            audio: self
                .repo
                .count_songs(profile, SongFilter::with_media_type(MediaType::Audio))?,
            video: self
                .repo
                .count_songs(profile, SongFilter::with_media_type(MediaType::Video))?,
            unknown: by_status(SongStatus::Unknown)?,
            active: by_status(SongStatus::Active)?,
            inactive: by_status(SongStatus::Inactive)?,
            deleted: by_status(SongStatus::Deleted)?,
            downloaded: by_status(SongStatus::Downloaded)?,
            total: self.repo.count_songs(profile, SongFilter::all())?,
        })
    }
}
