use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::slug::song_slug;
use crate::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Audio,
    Video,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Audio => "audio",
            MediaType::Video => "video",
        }
    }

    /// Used when the media server omits a content-type header.
    pub fn default_extension(&self) -> &'static str {
        match self {
            MediaType::Audio => "m4a",
            MediaType::Video => "mp4",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = StorageError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "audio" => Ok(MediaType::Audio),
            "video" => Ok(MediaType::Video),
            other => Err(StorageError::UnknownValue {
                kind: "media type",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SongStatus {
    Unknown,
    Active,
    Inactive,
    Deleted,
    Downloaded,
}

impl SongStatus {
    pub const ALL: [SongStatus; 5] = [
        SongStatus::Unknown,
        SongStatus::Active,
        SongStatus::Inactive,
        SongStatus::Deleted,
        SongStatus::Downloaded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SongStatus::Unknown => "unknown",
            SongStatus::Active => "active",
            SongStatus::Inactive => "inactive",
            SongStatus::Deleted => "deleted",
            SongStatus::Downloaded => "downloaded",
        }
    }
}

impl fmt::Display for SongStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SongStatus {
    type Err = StorageError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        SongStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| StorageError::UnknownValue {
                kind: "song status",
                value: value.to_string(),
            })
    }
}

/// Outcome of inspecting a recording page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Active(String),
    Inactive,
    Deleted,
}

impl Resolution {
    pub fn status(&self) -> SongStatus {
        match self {
            Resolution::Active(_) => SongStatus::Active,
            Resolution::Inactive => SongStatus::Inactive,
            Resolution::Deleted => SongStatus::Deleted,
        }
    }
}

/// Resolution state of a song. Only `Active` and `Downloaded` carry a media URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SongState {
    Unknown,
    Active { media_url: String },
    Inactive,
    Deleted,
    Downloaded { media_url: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cannot {event} a song in status {from}")]
pub struct InvalidTransition {
    pub from: SongStatus,
    pub event: &'static str,
}

impl SongState {
    pub fn status(&self) -> SongStatus {
        match self {
            SongState::Unknown => SongStatus::Unknown,
            SongState::Active { .. } => SongStatus::Active,
            SongState::Inactive => SongStatus::Inactive,
            SongState::Deleted => SongStatus::Deleted,
            SongState::Downloaded { .. } => SongStatus::Downloaded,
        }
    }

    pub fn media_url(&self) -> Option<&str> {
        match self {
            SongState::Active { media_url } | SongState::Downloaded { media_url } => {
                Some(media_url)
            }
            SongState::Unknown | SongState::Inactive | SongState::Deleted => None,
        }
    }

    /// Applies a page resolution. Allowed from `unknown` and `inactive` only.
    pub fn resolve(&self, resolution: Resolution) -> Result<SongState, InvalidTransition> {
        match self {
            SongState::Unknown | SongState::Inactive => Ok(match resolution {
                Resolution::Active(media_url) => SongState::Active { media_url },
                Resolution::Inactive => SongState::Inactive,
                Resolution::Deleted => SongState::Deleted,
            }),
            SongState::Active { .. } | SongState::Deleted | SongState::Downloaded { .. } => {
                Err(InvalidTransition {
                    from: self.status(),
                    event: "resolve",
                })
            }
        }
    }

    pub fn mark_downloaded(&self) -> Result<SongState, InvalidTransition> {
        match self {
            SongState::Active { media_url } => Ok(SongState::Downloaded {
                media_url: media_url.clone(),
            }),
            SongState::Unknown
            | SongState::Inactive
            | SongState::Deleted
            | SongState::Downloaded { .. } => Err(InvalidTransition {
                from: self.status(),
                event: "download",
            }),
        }
    }

    /// Rebuilds a state from its stored columns, enforcing the media URL invariant.
    pub fn from_parts(status: SongStatus, media_url: Option<String>) -> Result<Self, StorageError> {
        match (status, media_url) {
            (SongStatus::Unknown, None) => Ok(SongState::Unknown),
            (SongStatus::Inactive, None) => Ok(SongState::Inactive),
            (SongStatus::Deleted, None) => Ok(SongState::Deleted),
            (SongStatus::Active, Some(media_url)) => Ok(SongState::Active { media_url }),
            (SongStatus::Downloaded, Some(media_url)) => Ok(SongState::Downloaded { media_url }),
            (status, media_url) => Err(StorageError::Corrupt(format!(
                "status {} with media url {:?}",
                status, media_url
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub username: String,
    pub url: String,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Song {
    pub profile_id: i64,
    pub key: String,
    pub title: String,
    pub slug: String,
    pub url: String,
    pub media_type: MediaType,
    pub state: SongState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Song {
    /// A freshly listed song, not yet resolved.
    pub fn new(
        profile: &Profile,
        key: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
        media_type: MediaType,
    ) -> Self {
        let key = key.into();
        let title = title.into();
        let now = Utc::now();
        Self {
            profile_id: profile.id,
            slug: song_slug(&profile.username, &title, &key),
            key,
            title,
            url: url.into(),
            media_type,
            state: SongState::Unknown,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> SongStatus {
        self.state.status()
    }

    pub fn media_url(&self) -> Option<&str> {
        self.state.media_url()
    }

    pub fn apply(&mut self, resolution: Resolution) -> Result<(), InvalidTransition> {
        self.state = self.state.resolve(resolution)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn mark_downloaded(&mut self) -> Result<(), InvalidTransition> {
        self.state = self.state.mark_downloaded()?;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// File name under the media type directory.
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{}", self.slug, extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> Profile {
        Profile {
            id: 1,
            username: "alice".to_string(),
            url: "https://www.smule.com/alice".to_string(),
            verified: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_new_song_is_unknown_with_slug() {
        let song = Song::new(&profile(), "k1", "My Song", "https://smule.com/recording/x", MediaType::Audio);
        assert_eq!(song.status(), SongStatus::Unknown);
        assert_eq!(song.media_url(), None);
        assert_eq!(song.slug, "alice_my-song_k1");
        assert_eq!(song.file_name("mpeg"), "alice_my-song_k1.mpeg");
    }

    #[test]
    fn test_resolution_transitions() {
        let mut song = Song::new(&profile(), "k1", "My Song", "u", MediaType::Audio);
        song.apply(Resolution::Inactive).unwrap();
        assert_eq!(song.status(), SongStatus::Inactive);
        assert_eq!(song.media_url(), None);

        song.apply(Resolution::Active("https://cdn/x.mp3".to_string())).unwrap();
        assert_eq!(song.media_url(), Some("https://cdn/x.mp3"));

        let err = song.apply(Resolution::Deleted).unwrap_err();
        assert_eq!(err.from, SongStatus::Active);

        song.mark_downloaded().unwrap();
        assert_eq!(song.status(), SongStatus::Downloaded);
        assert_eq!(song.media_url(), Some("https://cdn/x.mp3"));
        assert!(song.mark_downloaded().is_err());
    }

    #[test]
    fn test_download_requires_active() {
        for state in [SongState::Unknown, SongState::Inactive, SongState::Deleted] {
            assert!(state.mark_downloaded().is_err());
        }
    }

    #[test]
    fn test_deleted_is_terminal_for_resolution() {
        assert!(SongState::Deleted.resolve(Resolution::Inactive).is_err());
    }

    #[test]
    fn test_from_parts_enforces_media_url_invariant() {
        assert!(SongState::from_parts(SongStatus::Active, None).is_err());
        assert!(SongState::from_parts(SongStatus::Inactive, Some("x".into())).is_err());
        assert_eq!(
            SongState::from_parts(SongStatus::Downloaded, Some("x".into())).unwrap(),
            SongState::Downloaded { media_url: "x".into() }
        );
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in SongStatus::ALL {
            assert_eq!(status.as_str().parse::<SongStatus>().unwrap(), status);
        }
        assert!("broken".parse::<SongStatus>().is_err());
        assert!("karaoke".parse::<MediaType>().is_err());
    }
}
