// src/cache.rs

use crate::date::{parse_iso, DateParser};
use crate::error::{Error, Result};
use crate::extract::{MalformedPolicy, MessageExtractor};
use crate::model::Message;
use chrono::SecondsFormat;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// One cached message, as laid out on disk: `user,message,created`
#[derive(Debug, Serialize, Deserialize)]
struct CacheRow {
    user: String,
    message: String,
    created: String,
}

impl From<&Message> for CacheRow {
    fn from(m: &Message) -> Self {
        CacheRow {
            user: m.user.clone(),
            message: m.message.clone(),
            created: m.created.to_rfc3339_opts(SecondsFormat::Secs, false),
        }
    }
}

impl TryFrom<CacheRow> for Message {
    type Error = Error;

    fn try_from(row: CacheRow) -> Result<Message> {
        let created = parse_iso(&row.created)?;
        Ok(Message { user: row.user, message: row.message, created })
    }
}

/// How `ensure_cache` came by its artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// A matching artifact already existed, nothing was extracted
    Reused,
    /// The export was extracted and a new artifact written
    Built { messages: usize, skipped: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheArtifact {
    pub path: PathBuf,
    pub status: CacheStatus,
}

/// Content-addressed store of extracted conversations.
#[derive(Debug, Clone)]
pub struct CacheManager {
    cache_dir: PathBuf,
    policy: MalformedPolicy,
}

impl CacheManager {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self { cache_dir: cache_dir.into(), policy: MalformedPolicy::default() }
    }

    /// `cache/` next to the running executable.
    pub fn default_dir() -> Result<PathBuf> {
        let exe = std::env::current_exe().map_err(|e| Error::io("<current executable>", e))?;
        let exe = fs::canonicalize(&exe).unwrap_or(exe);
        let dir = exe.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Ok(dir.join("cache"))
    }

    pub fn with_policy(mut self, policy: MalformedPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Where the artifact for `source` with the given content hash lives.
    pub fn artifact_path(&self, source: &Path, hash: &str) -> PathBuf {
        let id = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.cache_dir.join(format!("{id}_{hash}.csv"))
    }

    /// Returns the artifact for `source`, extracting it first if no artifact
    /// for this exact content exists yet.
    pub fn ensure_cache(&self, source: &Path, parser: &DateParser) -> Result<CacheArtifact> {
        let hash = content_hash(source)?;
        debug!(%hash, "Determined hash sum of {}", source.display());

        let path = self.artifact_path(source, &hash);
        if path.is_file() {
            debug!("Found cached CSV file {}", path.display());
            return Ok(CacheArtifact { path, status: CacheStatus::Reused });
        }

        if !self.cache_dir.exists() {
            info!("Cache directory does not exist, creating {}", self.cache_dir.display());
        }
        fs::create_dir_all(&self.cache_dir).map_err(|e| Error::io(&self.cache_dir, e))?;

        info!("Building cache");
        let start = Instant::now();
        let (messages, skipped) = self.build(source, parser, &path)?;
        info!(messages, skipped, "Built cache in {:.2?}", start.elapsed());

        Ok(CacheArtifact { path, status: CacheStatus::Built { messages, skipped } })
    }

    fn build(&self, source: &Path, parser: &DateParser, dest: &Path) -> Result<(usize, usize)> {
        let file = File::open(source).map_err(|e| Error::io(source, e))?;
        let len = file.metadata().map(|m| m.len()).unwrap_or(0);

        let bar = ProgressBar::new(len);
        bar.set_style(
            ProgressStyle::with_template("{msg} [{bar:40}] {bytes}/{total_bytes}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_message("Extracting messages");

        let reader = BufReader::new(bar.wrap_read(file));
        let mut extractor = MessageExtractor::new(reader, parser)
            .with_policy(self.policy)
            .with_source(source);

        // Rows go to a scratch file next to the artifact and only get renamed
        // into place once complete. Dropping it on error removes it.
        let tmp = NamedTempFile::new_in(&self.cache_dir).map_err(|e| Error::io(&self.cache_dir, e))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(BufWriter::new(tmp));

        let mut count: u64 = 0;
        for message in extractor.by_ref() {
            let row = CacheRow::from(&message?);
            count += 1;
            write_row(&mut writer, count, &row)?;
        }
        bar.finish_with_message("Extraction complete");

        let tmp = writer
            .into_inner()
            .map_err(|e| Error::io(dest, io::Error::other(e.to_string())))?
            .into_inner()
            .map_err(|e| Error::io(dest, e.into_error()))?;
        tmp.as_file().sync_all().map_err(|e| Error::io(tmp.path(), e))?;
        tmp.persist(dest).map_err(|e| Error::io(dest, e.error))?;

        Ok((count as usize, extractor.skipped()))
    }

    /// Reads the messages of an artifact back, in the order they were written.
    pub fn read(path: &Path) -> Result<CachedMessages> {
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(BufReader::new(file));
        Ok(CachedMessages { rows: reader.into_deserialize(), row: 0 })
    }
}

/// Messages read back from a cache artifact
pub struct CachedMessages {
    rows: csv::DeserializeRecordsIntoIter<BufReader<File>, CacheRow>,
    row: u64,
}

impl Iterator for CachedMessages {
    type Item = Result<Message>;

    fn next(&mut self) -> Option<Result<Message>> {
        let row = self.rows.next()?;
        self.row += 1;
        let line = self.row;
        Some(
            row.map_err(|source| Error::Csv { row: line, source })
                .and_then(Message::try_from),
        )
    }
}

/// Writes one record, keeping the 1-based row number on failure.
fn write_row<W: io::Write, T: Serialize>(writer: &mut csv::Writer<W>, row: u64, record: &T) -> Result<()> {
    writer.serialize(record).map_err(|source| Error::Csv { row, source })
}

/// Hex SHA-256 of the whole file, streamed.
pub fn content_hash(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut BufReader::new(file), &mut hasher).map_err(|e| Error::io(path, e))?;
    Ok(format!("{:x}", hasher.finalize()))
}
