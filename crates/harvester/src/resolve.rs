use std::time::Duration;
use tracing::{debug, info, warn};

use crawler::{extract_meta_content, Fetcher, STREAM_META_NAME};
use storage::{Resolution, Song, SongRepository};

use crate::{HarvestError, Harvester};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Worth another attempt: timeouts, throttling, server errors.
    Transient,
    /// The page is gone.
    Permanent,
}

pub fn classify_status(status: u16) -> FailureKind {
    match status {
        408 | 425 | 429 | 500..=599 => FailureKind::Transient,
        _ => FailureKind::Permanent,
    }
}

/// Linear backoff before the next attempt, saturating instead of overflowing.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.checked_mul(attempt).unwrap_or(Duration::MAX)
}

/// Resolution of an already fetched recording page.
pub fn resolve_html(html: &str) -> Resolution {
    match extract_meta_content(html, STREAM_META_NAME) {
        Ok(Some(media_url)) => Resolution::Active(media_url),
        Ok(None) => Resolution::Inactive,
        Err(e) => {
            warn!("Could not inspect recording page: {}", e);
            Resolution::Inactive
        }
    }
}

impl<F, R> Harvester<F, R>
where
    F: Fetcher,
    R: SongRepository,
{
    /// Fetches a recording page and resolves it. Transient failures are retried
    /// up to `max_fetch_attempts` times before the page counts as deleted.
    pub async fn resolve_page(&self, url: &str) -> Resolution {
        let attempts = self.config.max_fetch_attempts.max(1);

        for attempt in 1..=attempts {
            match self.fetcher.get(url).await {
                Ok(response) if response.is_success() => {
                    let resolution = resolve_html(&response.text());
                    debug!(url, status = %resolution.status(), "Recording page resolved");
                    return resolution;
                }
                Ok(response) => match classify_status(response.status) {
                    FailureKind::Permanent => {
                        info!(url, status = response.status, "Recording page is gone");
                        return Resolution::Deleted;
                    }
                    FailureKind::Transient => {
                        warn!(
                            url,
                            status = response.status,
                            "Attempt {}/{} failed",
                            attempt,
                            attempts
                        );
                    }
                },
                Err(e) => {
                    warn!(url, "Attempt {}/{} failed: {}", attempt, attempts, e);
                }
            }

            if attempt < attempts {
                tokio::time::sleep(backoff_delay(self.config.retry_backoff, attempt)).await;
            }
        }

        warn!(url, "Giving up after {} attempts, marking as deleted", attempts);
        Resolution::Deleted
    }

    pub async fn resolve_song(&self, song: &mut Song) -> Result<(), HarvestError> {
        let resolution = self.resolve_page(&song.url).await;
        song.apply(resolution)?;
        Ok(())
    }
}
