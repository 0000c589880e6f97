use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use storage::{MediaType, Song, SongStatus};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to export data: {0}")]
    ExportFailed(String),
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
}

/// Flat view of a stored song.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongRecord {
    pub key: String,
    pub title: String,
    pub slug: String,
    pub media_type: MediaType,
    pub status: SongStatus,
    pub media_url: Option<String>,
    pub url: String,
    pub updated_at: DateTime<Utc>,
}

impl From<&Song> for SongRecord {
    fn from(song: &Song) -> Self {
        Self {
            key: song.key.clone(),
            title: song.title.clone(),
            slug: song.slug.clone(),
            media_type: song.media_type,
            status: song.status(),
            media_url: song.media_url().map(str::to_string),
            url: song.url.clone(),
            updated_at: song.updated_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(ExportError::InvalidFormat(other.to_string())),
        }
    }
}

pub struct Exporter;

impl Exporter {
    pub fn new() -> Self {
        Self
    }

    pub fn export_to_json<P: AsRef<Path>>(
        &self,
        songs: &[SongRecord],
        path: P,
    ) -> Result<(), ExportError> {
        let json = serde_json::to_string_pretty(songs)
            .map_err(|e| ExportError::ExportFailed(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn export_to_csv<P: AsRef<Path>>(
        &self,
        songs: &[SongRecord],
        path: P,
    ) -> Result<(), ExportError> {
        let mut wtr = csv::Writer::from_path(path)?;

        wtr.write_record([
            "key",
            "title",
            "slug",
            "media_type",
            "status",
            "media_url",
            "url",
            "updated_at",
        ])?;

        for song in songs {
            wtr.write_record([
                song.key.as_str(),
                song.title.as_str(),
                song.slug.as_str(),
                song.media_type.as_str(),
                song.status.as_str(),
                song.media_url.as_deref().unwrap_or_default(),
                song.url.as_str(),
                song.updated_at.to_rfc3339().as_str(),
            ])?;
        }

        wtr.flush()?;
        Ok(())
    }

    pub fn export<P: AsRef<Path>>(
        &self,
        songs: &[Song],
        path: P,
        format: ExportFormat,
    ) -> Result<usize, ExportError> {
        let records: Vec<SongRecord> = songs.iter().map(SongRecord::from).collect();
        match format {
            ExportFormat::Json => self.export_to_json(&records, path)?,
            ExportFormat::Csv => self.export_to_csv(&records, path)?,
        }
        Ok(records.len())
    }
}

impl Default for Exporter {
    fn default() -> Self {
        Self::new()
    }
}
