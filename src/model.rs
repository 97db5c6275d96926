use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::EngineError;
use crate::vk::SavedPhoto;

pub const MIN_BATCH_SIZE: usize = 1;
pub const MAX_BATCH_SIZE: usize = 9;
/// One year.
pub const MAX_INTERVAL_HOURS: i64 = 24 * 365;

/// Immutable inputs of one posting run. Built with [`RunParameters::new`],
/// which validates.
#[derive(Clone, PartialEq, Eq)]
pub struct RunParameters {
    pub token: String,
    /// Always negative: the wall of a community.
    pub group_id: i64,
    pub interval_hours: i64,
    pub source_dir: PathBuf,
    /// Anchor: publish time of batch #0, epoch seconds.
    pub start_timestamp: i64,
    pub batch_size: usize,
    pub caption: String,
    pub randomize_suffix: bool,
    pub decorations: Vec<String>,
}

impl fmt::Debug for RunParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunParameters")
            .field("group_id", &self.group_id)
            .field("interval_hours", &self.interval_hours)
            .field("source_dir", &self.source_dir)
            .field("start_timestamp", &self.start_timestamp)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl RunParameters {
    pub fn new(
        token: &str,
        group_id: &str,
        interval_hours: i64,
        source_dir: impl Into<PathBuf>,
        start_timestamp: i64,
        batch_size: usize,
    ) -> Result<Self, EngineError> {
        let params = Self {
            token: token.trim().to_string(),
            group_id: parse_group_id(group_id)?,
            interval_hours,
            source_dir: source_dir.into(),
            start_timestamp,
            batch_size,
            caption: String::new(),
            randomize_suffix: false,
            decorations: Vec::new(),
        };
        params.validate()?;
        Ok(params)
    }

    /// Also checked by [`crate::engine::PosterEngine::new`].
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.token.trim().is_empty() {
            return Err(EngineError::invalid("access token must be non-empty"));
        }
        if self.group_id >= 0 {
            return Err(EngineError::invalid("community id must be negative"));
        }
        validate_interval(self.interval_hours)?;
        validate_batch_size(self.batch_size)?;
        if !self.source_dir.is_dir() {
            return Err(EngineError::invalid(format!(
                "source directory {} not found",
                self.source_dir.display()
            )));
        }
        Ok(())
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = caption.into();
        self
    }

    pub fn with_decorations(mut self, enabled: bool, pool: Vec<String>) -> Self {
        self.randomize_suffix = enabled;
        self.decorations = pool;
        self
    }

    pub fn interval_seconds(&self) -> i64 {
        self.interval_hours * 3600
    }
}

/// Parse an operator-entered community id. Positive ids are negated since
/// posts always target a community wall.
pub fn parse_group_id(raw: &str) -> Result<i64, EngineError> {
    let id: i64 = raw
        .trim()
        .parse()
        .map_err(|_| EngineError::invalid(format!("community id must be a number, got {:?}", raw)))?;
    match id {
        0 => Err(EngineError::invalid("community id must be non-zero")),
        id if id > 0 => Ok(-id),
        id => Ok(id),
    }
}

pub fn validate_interval(hours: i64) -> Result<(), EngineError> {
    if !(1..=MAX_INTERVAL_HOURS).contains(&hours) {
        return Err(EngineError::invalid(format!(
            "interval must be within 1..={} hours, got {}",
            MAX_INTERVAL_HOURS, hours
        )));
    }
    Ok(())
}

pub fn validate_batch_size(size: usize) -> Result<(), EngineError> {
    if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&size) {
        return Err(EngineError::invalid(format!(
            "batch size must be within {}..={}, got {}",
            MIN_BATCH_SIZE, MAX_BATCH_SIZE, size
        )));
    }
    Ok(())
}

/// A slice of the discovered files that becomes exactly one post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub index: usize,
    pub files: Vec<PathBuf>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// A photo saved on the community wall album, ready to attach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedAsset {
    pub server: i64,
    pub owner_id: i64,
    pub id: i64,
}

impl UploadedAsset {
    pub fn from_saved(server: i64, saved: &SavedPhoto) -> Self {
        Self {
            server,
            owner_id: saved.owner_id,
            id: saved.id,
        }
    }

    /// Attachment token understood by `wall.post`.
    pub fn reference(&self) -> String {
        format!("photo{}_{}", self.owner_id, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSource {
    Remote,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanOutcome {
    OnSchedule,
    /// The candidate time had already elapsed and was re-based onto "now".
    Corrected { original: i64 },
}

/// Outcome of a full posting run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub batches: usize,
    pub posted: usize,
    pub failed: usize,
    pub last_publish_time: Option<i64>,
    pub aborted: bool,
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
