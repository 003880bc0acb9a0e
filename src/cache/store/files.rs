//! Directory-backed page store.
//!
//! Each entry is one `<key>.page` file: a decimal expiry timestamp (unix seconds) on the first
//! line, followed by the page bytes. Writes go through a temporary file and an atomic rename,
//! so readers never observe a partial page.
//!
//! `clean` removes the entries it finds while scanning the directory. A `set` whose rename lands
//! after the scan survives the purge; one that landed before is removed.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tempfile::NamedTempFile;
use time::OffsetDateTime;
use tracing::debug;

use super::{MAX_TTL, PageStore, StoreError};
use crate::cache::keys::CacheKey;

const ENTRY_EXTENSION: &str = "page";

/// Page store rooted at a directory.
pub struct FileStore {
    directory: PathBuf,
}

impl FileStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.directory
            .join(format!("{}.{ENTRY_EXTENSION}", key.as_str()))
    }
}

#[async_trait]
impl PageStore for FileStore {
    fn name(&self) -> &'static str {
        "files"
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<Bytes>, StoreError> {
        let path = self.entry_path(key);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => Bytes::from(raw),
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let Some((expires_at, body_start)) = decode_header(&raw) else {
            return Err(StoreError::Corrupt { path });
        };

        if expires_at <= now_unix() {
            debug!(key = %key, "removing expired page");
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
            return Ok(None);
        }

        Ok(Some(raw.slice(body_start..)))
    }

    async fn set(&self, key: &CacheKey, value: Bytes, ttl: Duration) -> Result<(), StoreError> {
        let directory = self.directory.clone();
        let path = self.entry_path(key);
        let ttl_secs = i64::try_from(ttl.min(MAX_TTL).as_secs()).unwrap_or(i64::MAX);
        let expires_at = now_unix().saturating_add(ttl_secs);

        tokio::task::spawn_blocking(move || write_entry(&directory, &path, expires_at, &value))
            .await
            .map_err(|err| StoreError::Task(err.to_string()))?
    }

    async fn clean(&self) -> Result<(), StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        let mut removed = 0usize;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != ENTRY_EXTENSION) {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }

        debug!(removed, directory = %self.directory.display(), "page store cleaned");
        Ok(())
    }
}

fn write_entry(
    directory: &Path,
    path: &Path,
    expires_at: i64,
    body: &[u8],
) -> Result<(), StoreError> {
    std::fs::create_dir_all(directory)?;
    let mut file = NamedTempFile::new_in(directory)?;
    writeln!(file, "{expires_at}")?;
    file.write_all(body)?;
    file.flush()?;
    file.persist(path).map_err(|err| StoreError::Io(err.error))?;
    Ok(())
}

fn decode_header(raw: &[u8]) -> Option<(i64, usize)> {
    let newline = raw.iter().position(|byte| *byte == b'\n')?;
    let header = std::str::from_utf8(&raw[..newline]).ok()?;
    let expires_at = header.trim().parse().ok()?;
    Some((expires_at, newline + 1))
}

fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}
