pub mod models;
pub mod slug;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

pub use models::{
    InvalidTransition, MediaType, Profile, Resolution, Song, SongState, SongStatus,
};
pub use slug::{slugify, song_slug};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Unknown {kind}: {value}")]
    UnknownValue { kind: &'static str, value: String },
    #[error("Corrupt record: {0}")]
    Corrupt(String),
    #[error("Song not found: {0}")]
    SongNotFound(String),
}

/// Criteria for song lookups. `None` fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SongFilter {
    pub status: Option<SongStatus>,
    pub media_type: Option<MediaType>,
}

impl SongFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_status(status: SongStatus) -> Self {
        Self {
            status: Some(status),
            media_type: None,
        }
    }

    pub fn with_media_type(media_type: MediaType) -> Self {
        Self {
            status: None,
            media_type: Some(media_type),
        }
    }
}

pub trait SongRepository {
    /// Returns the verified profile stored for `username`, if any.
    fn find_profile(&self, username: &str) -> Result<Option<Profile>, StorageError>;
    fn insert_profile(&self, username: &str, url: &str) -> Result<Profile, StorageError>;
    fn find_song(&self, profile: &Profile, key: &str) -> Result<Option<Song>, StorageError>;
    fn find_songs(&self, profile: &Profile, filter: SongFilter) -> Result<Vec<Song>, StorageError>;
    fn count_songs(&self, profile: &Profile, filter: SongFilter) -> Result<u64, StorageError>;
    fn delete_songs_for_profile(&self, profile: &Profile) -> Result<usize, StorageError>;
    /// Inserts all songs in a single transaction.
    fn insert_songs(&self, songs: &[Song]) -> Result<(), StorageError>;
    fn update_song(&self, song: &Song) -> Result<(), StorageError>;
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        info!("Opened database at {:?}", path);
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), StorageError> {
        self.conn.execute_batch(
            "PRAGMA foreign_keys = ON;
            CREATE TABLE IF NOT EXISTS profiles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                url TEXT NOT NULL,
                verified INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS songs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                profile_id INTEGER NOT NULL,
                smule_key TEXT NOT NULL,
                title TEXT NOT NULL,
                slug TEXT NOT NULL,
                url TEXT NOT NULL,
                media_type TEXT NOT NULL,
                status TEXT NOT NULL,
                media_url TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(profile_id, smule_key),
                FOREIGN KEY(profile_id) REFERENCES profiles(id)
            );
            CREATE INDEX IF NOT EXISTS songs_profile_status ON songs(profile_id, status);",
        )?;
        Ok(())
    }
}

const SONG_COLUMNS: &str =
    "profile_id, smule_key, title, slug, url, media_type, status, media_url, created_at, updated_at";

struct SongRow {
    profile_id: i64,
    key: String,
    title: String,
    slug: String,
    url: String,
    media_type: String,
    status: String,
    media_url: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl SongRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            profile_id: row.get(0)?,
            key: row.get(1)?,
            title: row.get(2)?,
            slug: row.get(3)?,
            url: row.get(4)?,
            media_type: row.get(5)?,
            status: row.get(6)?,
            media_url: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn into_song(self) -> Result<Song, StorageError> {
        let status: SongStatus = self.status.parse()?;
        Ok(Song {
            profile_id: self.profile_id,
            key: self.key,
            title: self.title,
            slug: self.slug,
            url: self.url,
            media_type: self.media_type.parse()?,
            state: SongState::from_parts(status, self.media_url)?,
            created_at: from_timestamp(self.created_at),
            updated_at: from_timestamp(self.updated_at),
        })
    }
}

fn from_timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

impl SongRepository for SqliteStore {
    fn find_profile(&self, username: &str) -> Result<Option<Profile>, StorageError> {
        let profile = self
            .conn
            .query_row(
                "SELECT id, username, url, verified, created_at FROM profiles
                 WHERE username = ?1 AND verified = 1",
                params![username],
                |row| {
                    Ok(Profile {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        url: row.get(2)?,
                        verified: row.get(3)?,
                        created_at: from_timestamp(row.get(4)?),
                    })
                },
            )
            .optional()?;
        Ok(profile)
    }

    fn insert_profile(&self, username: &str, url: &str) -> Result<Profile, StorageError> {
        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO profiles (username, url, verified, created_at) VALUES (?1, ?2, 1, ?3)
             ON CONFLICT(username) DO UPDATE SET url = excluded.url, verified = 1",
            params![username, url, now.timestamp()],
        )?;
        info!("Profile {} stored", username);

        self.find_profile(username)?
            .ok_or_else(|| StorageError::Corrupt(format!("profile {} vanished after insert", username)))
    }

    fn find_song(&self, profile: &Profile, key: &str) -> Result<Option<Song>, StorageError> {
        let sql = format!(
            "SELECT {} FROM songs WHERE profile_id = ?1 AND smule_key = ?2",
            SONG_COLUMNS
        );
        let row = self
            .conn
            .query_row(&sql, params![profile.id, key], SongRow::from_row)
            .optional()?;
        row.map(SongRow::into_song).transpose()
    }

    fn find_songs(&self, profile: &Profile, filter: SongFilter) -> Result<Vec<Song>, StorageError> {
        let sql = format!(
            "SELECT {} FROM songs
             WHERE profile_id = ?1
               AND (?2 IS NULL OR status = ?2)
               AND (?3 IS NULL OR media_type = ?3)
             ORDER BY id ASC",
            SONG_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                profile.id,
                filter.status.map(|s| s.as_str()),
                filter.media_type.map(|t| t.as_str())
            ],
            SongRow::from_row,
        )?;

        let mut songs = Vec::new();
        for row in rows {
            songs.push(row?.into_song()?);
        }
        Ok(songs)
    }

    fn count_songs(&self, profile: &Profile, filter: SongFilter) -> Result<u64, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM songs
             WHERE profile_id = ?1
               AND (?2 IS NULL OR status = ?2)
               AND (?3 IS NULL OR media_type = ?3)",
            params![
                profile.id,
                filter.status.map(|s| s.as_str()),
                filter.media_type.map(|t| t.as_str())
            ],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    fn delete_songs_for_profile(&self, profile: &Profile) -> Result<usize, StorageError> {
        let deleted = self
            .conn
            .execute("DELETE FROM songs WHERE profile_id = ?1", params![profile.id])?;
        info!("Deleted {} stored songs of {}", deleted, profile.username);
        Ok(deleted)
    }

    fn insert_songs(&self, songs: &[Song]) -> Result<(), StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let sql = format!(
                "INSERT INTO songs ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                SONG_COLUMNS
            );
            let mut stmt = tx.prepare(&sql)?;
            for song in songs {
                stmt.execute(params![
                    song.profile_id,
                    song.key,
                    song.title,
                    song.slug,
                    song.url,
                    song.media_type.as_str(),
                    song.status().as_str(),
                    song.media_url(),
                    song.created_at.timestamp(),
                    song.updated_at.timestamp(),
                ])?;
            }
        }
        tx.commit()?;
        debug!("Committed {} songs", songs.len());
        Ok(())
    }

    fn update_song(&self, song: &Song) -> Result<(), StorageError> {
        let updated = self.conn.execute(
            "UPDATE songs SET title = ?1, slug = ?2, url = ?3, media_type = ?4, status = ?5,
                 media_url = ?6, updated_at = ?7
             WHERE profile_id = ?8 AND smule_key = ?9",
            params![
                song.title,
                song.slug,
                song.url,
                song.media_type.as_str(),
                song.status().as_str(),
                song.media_url(),
                song.updated_at.timestamp(),
                song.profile_id,
                song.key,
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::SongNotFound(song.key.clone()));
        }
        Ok(())
    }
}
