use indexmap::IndexSet;
use tracing::{debug, info, warn};

use crawler::{Fetcher, ListingPage};
use storage::{MediaType, Profile, Song, SongRepository};

use crate::{HarvestError, Harvester, ProgressReporter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListingReport {
    pub pages: usize,
    pub discovered: usize,
    pub created: usize,
    pub existing: usize,
    pub skipped: usize,
}

impl<F, R> Harvester<F, R>
where
    F: Fetcher,
    R: SongRepository,
{
    /// Walks the profile's performance listing and stores every song not already known.
    ///
    /// With `force`, stored songs are deleted first and the whole catalog is rebuilt.
    /// New songs are resolved as they are found and committed once per page.
    pub async fn sync_songs(
        &self,
        profile: &Profile,
        force: bool,
        progress: &dyn ProgressReporter,
    ) -> Result<ListingReport, HarvestError> {
        if force {
            info!("Deleting existing songs of {} from the database", profile.username);
            self.repo.delete_songs_for_profile(profile)?;
        }

        let mut report = ListingReport::default();
        let mut seen = IndexSet::new();
        let mut offset = 0;

        progress.start(None, "Listing songs");
        loop {
            let page = self.fetch_listing_page(&profile.username, offset).await?;
            report.pages += 1;
            debug!(offset, songs = page.list.len(), next = page.next_offset, "Listing page");

            let mut created = Vec::new();
            for summary in &page.list {
                report.discovered += 1;

                if !seen.insert(summary.key.clone()) {
                    debug!("Duplicate key {} in listing", summary.key);
                    report.skipped += 1;
                    continue;
                }

                let media_type = match summary.kind.parse::<MediaType>() {
                    Ok(media_type) => media_type,
                    Err(e) => {
                        warn!("Skipping {}: {}", summary.key, e);
                        report.skipped += 1;
                        continue;
                    }
                };

                if self.repo.find_song(profile, &summary.key)?.is_some() {
                    report.existing += 1;
                    progress.advance();
                    continue;
                }

                let mut song = Song::new(
                    profile,
                    summary.key.as_str(),
                    summary.title(),
                    self.endpoints.recording_url(&summary.web_url),
                    media_type,
                );
                self.resolve_song(&mut song).await?;
                created.push(song);
                progress.advance();
            }

            if !created.is_empty() {
                self.repo.insert_songs(&created)?;
                report.created += created.len();
            }

            if page.is_last() {
                break;
            }
            if page.next_offset <= offset {
                return Err(HarvestError::StalledCursor {
                    offset,
                    next: page.next_offset,
                });
            }
            offset = page.next_offset;
        }
        progress.finish();

        info!(
            pages = report.pages,
            created = report.created,
            existing = report.existing,
            skipped = report.skipped,
            "Songs retrieved from Smule and saved in database"
        );
        Ok(report)
    }

    async fn fetch_listing_page(&self, username: &str, offset: i64) -> Result<ListingPage, HarvestError> {
        let url = self.endpoints.listing_url(username, offset);
        let failed = |reason: String| HarvestError::ListingFailed { offset, reason };

        let response = self
            .fetcher
            .get(&url)
            .await
            .map_err(|e| failed(e.to_string()))?;
        if !response.is_success() {
            return Err(failed(format!("HTTP {}", response.status)));
        }

        ListingPage::parse(&response.body).map_err(|e| failed(e.to_string()))
    }
}
