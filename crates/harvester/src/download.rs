use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crawler::Fetcher;
use storage::{MediaType, Profile, Song, SongFilter, SongRepository, SongStatus};

use crate::{HarvestError, Harvester, ProgressReporter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadReport {
    pub downloaded: usize,
    pub failed: usize,
    pub total: usize,
}

/// File extension for a media response: the content-type subtype, e.g. `audio/mpeg` gives `mpeg`.
pub fn extension_for(content_type: Option<&str>, media_type: MediaType) -> String {
    content_type
        .and_then(|value| value.split(';').next())
        .and_then(|mime| mime.trim().split_once('/'))
        .map(|(_, subtype)| subtype.trim().to_ascii_lowercase())
        .filter(|subtype| {
            !subtype.is_empty()
                && subtype != "octet-stream"
                && subtype
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '+'))
        })
        .unwrap_or_else(|| media_type.default_extension().to_string())
}

fn part_path_for(dir: &Path, song: &Song) -> PathBuf {
    dir.join(song.file_name("part"))
}

impl<F, R> Harvester<F, R>
where
    F: Fetcher,
    R: SongRepository,
{
    /// Downloads every active song of the profile. Failed songs stay active for the next run.
    pub async fn download_songs(
        &self,
        profile: &Profile,
        progress: &dyn ProgressReporter,
    ) -> Result<DownloadReport, HarvestError> {
        let songs = self
            .repo
            .find_songs(profile, SongFilter::with_status(SongStatus::Active))?;
        let mut report = DownloadReport {
            total: songs.len(),
            ..DownloadReport::default()
        };
        info!("{} songs to download", report.total);

        progress.start(Some(report.total as u64), "Downloading");
        for mut song in songs {
            match self.download_song(&song).await {
                Ok(path) => {
                    song.mark_downloaded()?;
                    self.repo.update_song(&song)?;
                    report.downloaded += 1;
                    info!(key = %song.key, "Saved {:?}", path);
                }
                Err(e) => {
                    warn!(key = %song.key, url = %song.url, "Download failed: {}", e);
                    report.failed += 1;
                }
            }
            progress.advance();
        }
        progress.finish();

        Ok(report)
    }

    /// Streams the song's media to `<output>/<type>/<slug>.<ext>` through a `.part` file.
    /// The partial file is removed when anything fails.
    pub async fn download_song(&self, song: &Song) -> Result<PathBuf, HarvestError> {
        let media_url = song
            .media_url()
            .ok_or_else(|| HarvestError::MissingMediaUrl(song.key.clone()))?;

        let dir = self.config.output_dir.join(song.media_type.as_str());
        tokio::fs::create_dir_all(&dir).await?;
        let part = part_path_for(&dir, song);

        let result = self.stream_to_part(media_url, song, &dir, &part).await;
        if result.is_err() {
            if let Err(e) = tokio::fs::remove_file(&part).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Could not remove {:?}: {}", part, e);
                }
            }
        }
        result
    }

    async fn stream_to_part(
        &self,
        media_url: &str,
        song: &Song,
        dir: &Path,
        part: &Path,
    ) -> Result<PathBuf, HarvestError> {
        let head = self.fetcher.download_to(media_url, part).await?;
        if !head.is_success() {
            return Err(HarvestError::DownloadFailed {
                url: media_url.to_string(),
                status: head.status,
            });
        }
        debug!(key = %song.key, bytes = head.bytes, "Media received");

        let extension = extension_for(head.content_type.as_deref(), song.media_type);
        let path = dir.join(song.file_name(&extension));
        tokio::fs::rename(part, &path).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{harvester_with, test_config, FakeFetcher};
    use crate::NoProgress;
    use crawler::FetchResponse;
    use storage::Resolution;

    #[test]
    fn test_extension_from_content_type() {
        assert_eq!(extension_for(Some("audio/mpeg"), MediaType::Audio), "mpeg");
        assert_eq!(extension_for(Some("video/MP4; codecs=avc1"), MediaType::Video), "mp4");
        assert_eq!(extension_for(None, MediaType::Audio), "m4a");
        assert_eq!(extension_for(Some("application/octet-stream"), MediaType::Video), "mp4");
        assert_eq!(extension_for(Some("garbage"), MediaType::Audio), "m4a");
    }

    #[tokio::test]
    async fn test_download_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FakeFetcher::default();
        fetcher.respond("https://cdn/x.mp3", FetchResponse::new(200, Some("audio/mpeg"), b"ID3".to_vec()));
        let config = crate::HarvestConfig {
            output_dir: dir.path().to_path_buf(),
            ..test_config()
        };
        let harvester = harvester_with(fetcher, config);
        let repo = harvester.repository();
        let profile = repo.insert_profile("alice", "https://www.smule.com/alice").unwrap();

        let mut song = Song::new(&profile, "k1", "My Song", "https://smule.com/recording/My-Song/k1", MediaType::Audio);
        song.apply(Resolution::Active("https://cdn/x.mp3".to_string())).unwrap();
        repo.insert_songs(&[song]).unwrap();

        let report = harvester.download_songs(&profile, &NoProgress).await.unwrap();
        assert_eq!(report, DownloadReport { downloaded: 1, failed: 0, total: 1 });

        let file = dir.path().join("audio").join("alice_my-song_k1.mpeg");
        assert_eq!(std::fs::read(&file).unwrap(), b"ID3");
        assert!(!dir.path().join("audio").join("alice_my-song_k1.part").exists());

        let stored = repo.find_song(&profile, "k1").unwrap().unwrap();
        assert_eq!(stored.status(), SongStatus::Downloaded);
        assert_eq!(stored.media_url(), Some("https://cdn/x.mp3"));
    }

    #[tokio::test]
    async fn test_rerun_only_touches_active_songs() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FakeFetcher::default();
        fetcher.respond("https://cdn/ok.mp4", FetchResponse::new(200, Some("video/mp4"), b"ok".to_vec()));
        fetcher.respond("https://cdn/broken.mp4", FetchResponse::new(403, None, ""));
        let config = crate::HarvestConfig {
            output_dir: dir.path().to_path_buf(),
            ..test_config()
        };
        let harvester = harvester_with(fetcher, config);
        let repo = harvester.repository();
        let profile = repo.insert_profile("alice", "https://www.smule.com/alice").unwrap();

        let mut ok = Song::new(&profile, "k1", "Ok", "u1", MediaType::Video);
        ok.apply(Resolution::Active("https://cdn/ok.mp4".to_string())).unwrap();
        let mut broken = Song::new(&profile, "k2", "Broken", "u2", MediaType::Video);
        broken.apply(Resolution::Active("https://cdn/broken.mp4".to_string())).unwrap();
        repo.insert_songs(&[ok, broken]).unwrap();

        let first = harvester.download_songs(&profile, &NoProgress).await.unwrap();
        assert_eq!(first, DownloadReport { downloaded: 1, failed: 1, total: 2 });
        assert!(dir.path().join("video").join("alice_ok_k1.mp4").exists());
        assert_eq!(
            repo.find_song(&profile, "k2").unwrap().unwrap().status(),
            SongStatus::Active
        );

        let second = harvester.download_songs(&profile, &NoProgress).await.unwrap();
        assert_eq!(second, DownloadReport { downloaded: 0, failed: 1, total: 1 });
        assert_eq!(harvester.fetcher.count("GET", "https://cdn/ok.mp4"), 1);
        assert_eq!(harvester.fetcher.count("GET", "https://cdn/broken.mp4"), 2);
        assert!(!dir.path().join("video").join("alice_broken_k2.part").exists());
    }

    #[tokio::test]
    async fn test_interrupted_stream_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FakeFetcher::default();
        fetcher.respond("https://cdn/cut.mp3", FetchResponse::new(200, Some("audio/mpeg"), b"ID3-half".to_vec()));
        fetcher.cut_stream("https://cdn/cut.mp3");
        let config = crate::HarvestConfig {
            output_dir: dir.path().to_path_buf(),
            ..test_config()
        };
        let harvester = harvester_with(fetcher, config);
        let repo = harvester.repository();
        let profile = repo.insert_profile("alice", "https://www.smule.com/alice").unwrap();

        let mut song = Song::new(&profile, "k1", "My Song", "u1", MediaType::Audio);
        song.apply(Resolution::Active("https://cdn/cut.mp3".to_string())).unwrap();
        repo.insert_songs(std::slice::from_ref(&song)).unwrap();

        let err = harvester.download_song(&song).await.unwrap_err();
        assert!(matches!(err, HarvestError::Crawler(_)));

        let audio = dir.path().join("audio");
        assert_eq!(std::fs::read_dir(&audio).unwrap().count(), 0);

        let report = harvester.download_songs(&profile, &NoProgress).await.unwrap();
        assert_eq!(report, DownloadReport { downloaded: 0, failed: 1, total: 1 });
        assert_eq!(
            repo.find_song(&profile, "k1").unwrap().unwrap().status(),
            SongStatus::Active
        );
    }
}
