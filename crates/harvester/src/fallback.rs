use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use browser::{BrowserError, LazySession, PageDriver};
use crawler::Fetcher;
use storage::{Profile, Song, SongFilter, SongRepository, SongState, SongStatus};

use crate::{HarvestError, Harvester, ProgressReporter};

/// Page layout family of a recording, which decides what has to be clicked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentCategory {
    Solo,
    Ensemble,
}

impl ContentCategory {
    pub fn of_url(url: &str) -> Self {
        if url.contains("ensembles") {
            ContentCategory::Ensemble
        } else {
            ContentCategory::Solo
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickStep {
    pub selector: String,
    pub required: bool,
}

impl ClickStep {
    pub fn required(selector: &str) -> Self {
        Self {
            selector: selector.to_string(),
            required: true,
        }
    }

    pub fn optional(selector: &str) -> Self {
        Self {
            selector: selector.to_string(),
            required: false,
        }
    }
}

/// Ordered elements to wait for and click. Tied to the site's current markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickStrategy {
    pub steps: Vec<ClickStep>,
}

impl ClickStrategy {
    pub fn solo() -> Self {
        Self {
            steps: vec![ClickStep::required(".sc-fTNIDv.ieXpgb")],
        }
    }

    pub fn ensemble() -> Self {
        Self {
            steps: vec![
                ClickStep::optional(".video-icon-bar"),
                ClickStep::required(".album-art.playable"),
            ],
        }
    }

    /// Returns how many elements were clicked.
    pub fn run<D: PageDriver>(&self, driver: &mut D, timeout: Duration) -> Result<usize, BrowserError> {
        let mut clicked = 0;
        for step in &self.steps {
            let result = driver
                .wait_for_selector(&step.selector, timeout)
                .and_then(|_| driver.click(&step.selector));

            match result {
                Ok(()) => clicked += 1,
                Err(e) if !step.required => {
                    debug!("Optional element {} skipped: {}", step.selector, e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(clicked)
    }
}

#[derive(Debug, Clone)]
pub struct FallbackConfig {
    /// Wait after clicking, while the platform renders the media.
    pub settle: Duration,
    pub selector_timeout: Duration,
    pub screenshot_path: PathBuf,
    pub solo: ClickStrategy,
    pub ensemble: ClickStrategy,
}

impl FallbackConfig {
    pub fn strategy_for(&self, category: ContentCategory) -> &ClickStrategy {
        match category {
            ContentCategory::Solo => &self.solo,
            ContentCategory::Ensemble => &self.ensemble,
        }
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(10),
            selector_timeout: Duration::from_secs(10),
            screenshot_path: PathBuf::from("screenshots/screen.png"),
            solo: ClickStrategy::solo(),
            ensemble: ClickStrategy::ensemble(),
        }
    }
}

/// Opens a recording page and presses play so the platform generates its media.
pub async fn trigger_generation<D: PageDriver>(
    driver: &mut D,
    url: &str,
    config: &FallbackConfig,
) -> Result<(), BrowserError> {
    driver.navigate(url)?;

    let category = ContentCategory::of_url(url);
    let clicked = config
        .strategy_for(category)
        .run(driver, config.selector_timeout)?;
    debug!(url, ?category, clicked, "Play requested");

    tokio::time::sleep(config.settle).await;
    driver.screenshot(&config.screenshot_path)?;
    Ok(())
}

/// Outcome counts of a fix pass. `fixed + requested + errors + deleted == total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixReport {
    pub fixed: usize,
    pub requested: usize,
    pub errors: usize,
    pub deleted: usize,
    /// Render POSTs that were refused. Informational only.
    pub render_rejected: usize,
    pub total: usize,
}

impl FixReport {
    pub fn is_consistent(&self) -> bool {
        self.fixed + self.requested + self.errors + self.deleted == self.total
    }
}

impl<F, R> Harvester<F, R>
where
    F: Fetcher,
    R: SongRepository,
{
    /// Re-resolves every inactive song and nudges the platform for those still missing a URL.
    ///
    /// Browser failures are counted per song and never stop the pass. Songs nudged here
    /// become resolvable on a later run.
    pub async fn fix_missing_urls<D, L>(
        &self,
        profile: &Profile,
        session: &mut LazySession<D, L>,
        progress: &dyn ProgressReporter,
    ) -> Result<FixReport, HarvestError>
    where
        D: PageDriver,
        L: FnMut() -> Result<D, BrowserError>,
    {
        let songs = self
            .repo
            .find_songs(profile, SongFilter::with_status(SongStatus::Inactive))?;
        let mut report = FixReport {
            total: songs.len(),
            ..FixReport::default()
        };
        info!("Fixing {} songs with missing links", report.total);

        progress.start(Some(report.total as u64), "Fixing links");
        for mut song in songs {
            self.resolve_song(&mut song).await?;

            match &song.state {
                SongState::Active { .. } => report.fixed += 1,
                SongState::Deleted => report.deleted += 1,
                SongState::Inactive => {
                    if !self.request_render(&song).await {
                        report.render_rejected += 1;
                    }
                    match self.click_to_generate(session, &song).await {
                        Ok(()) => report.requested += 1,
                        Err(e) => {
                            warn!(url = %song.url, "Error on song: {}", e);
                            report.errors += 1;
                        }
                    }
                }
                SongState::Unknown | SongState::Downloaded { .. } => {
                    warn!(url = %song.url, "Unexpected status {} after resolution", song.status());
                    report.errors += 1;
                }
            }

            self.repo.update_song(&song)?;
            progress.advance();
        }
        progress.finish();

        Ok(report)
    }

    /// Asks the platform to render the song's media. Returns whether it accepted.
    async fn request_render(&self, song: &Song) -> bool {
        let url = self.endpoints.render_url(&song.key);
        match self.fetcher.post(&url).await {
            Ok(response) if response.is_success() => true,
            Ok(response) => {
                debug!(url = %url, status = response.status, "Render request refused");
                false
            }
            Err(e) => {
                debug!(url = %url, "Render request failed: {}", e);
                false
            }
        }
    }

    async fn click_to_generate<D, L>(
        &self,
        session: &mut LazySession<D, L>,
        song: &Song,
    ) -> Result<(), BrowserError>
    where
        D: PageDriver,
        L: FnMut() -> Result<D, BrowserError>,
    {
        let driver = session.driver()?;
        trigger_generation(driver, &song.url, &self.config.fallback).await
    }
}
