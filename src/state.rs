//! Resumable run state kept as a small line file (path from `app.state_file`):
//! credential, community id, batch size, and (optionally) the publish time
//! of the most recently scheduled post.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DEFAULT_STATE_FILE: &str = "last_settings.cfg";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedRunState {
    pub token: String,
    pub group_id: Option<i64>,
    pub batch_size: Option<usize>,
    pub last_post_time: Option<i64>,
}

impl PersistedRunState {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Default anchor for the next run: one interval after the last post.
    pub fn next_start(&self, interval_seconds: i64) -> Option<i64> {
        self.last_post_time
            .and_then(|t| t.checked_add(interval_seconds))
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.token);
        out.push('\n');
        if let Some(id) = self.group_id {
            out.push_str(&id.to_string());
        }
        out.push('\n');
        if let Some(size) = self.batch_size {
            out.push_str(&size.to_string());
        }
        out.push('\n');
        if let Some(t) = self.last_post_time {
            out.push_str(&t.to_string());
            out.push('\n');
        }
        out
    }

    /// Parse the line format. Anything unreadable yields the empty state.
    pub fn parse(content: &str) -> Self {
        let lines: Vec<&str> = content.lines().map(str::trim).collect();
        if lines.len() < 2 {
            return Self::default();
        }
        Self::from_lines(&lines).unwrap_or_default()
    }

    fn from_lines(lines: &[&str]) -> Option<Self> {
        let batch_size = match optional_number(lines, 2)? {
            Some(n) if n > 0 => Some(n as usize),
            Some(_) => return None,
            None => None,
        };
        Some(Self {
            token: lines[0].to_string(),
            group_id: optional_number(lines, 1)?,
            batch_size,
            last_post_time: optional_number(lines, 3)?,
        })
    }
}

/// `Some(None)` for an absent or blank line, `None` for a non-numeric one.
fn optional_number(lines: &[&str], idx: usize) -> Option<Option<i64>> {
    match lines.get(idx).copied() {
        None | Some("") => Some(None),
        Some(s) => s.parse().ok().map(Some),
    }
}

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Never fails: a missing or damaged file is "no prior state".
    pub fn load(&self) -> PersistedRunState {
        match fs::read_to_string(&self.path) {
            Ok(content) => PersistedRunState::parse(&content),
            Err(err) if err.kind() == io::ErrorKind::NotFound => PersistedRunState::default(),
            Err(err) => {
                warn!(?err, path=%self.path.display(), "unreadable state file; starting fresh");
                PersistedRunState::default()
            }
        }
    }

    /// Write through a sibling temp file so a crash never leaves a torn record.
    pub fn save(&self, state: &PersistedRunState) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, state.serialize())?;
        fs::rename(&tmp, &self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> PersistedRunState {
        PersistedRunState {
            token: "vk1.a.token".into(),
            group_id: Some(-42),
            batch_size: Some(9),
            last_post_time: Some(1_760_018_000),
        }
    }

    #[test]
    fn round_trip_through_file() {
        let td = tempdir().unwrap();
        let store = StateStore::new(td.path().join("last_settings.cfg"));
        store.save(&sample()).unwrap();
        assert_eq!(store.load(), sample());
    }

    #[test]
    fn round_trip_without_timestamp() {
        let td = tempdir().unwrap();
        let store = StateStore::new(td.path().join("last_settings.cfg"));
        let state = PersistedRunState {
            last_post_time: None,
            ..sample()
        };
        store.save(&state).unwrap();
        let loaded = store.load();
        assert_eq!(loaded.last_post_time, None);
        assert_eq!(loaded, state);
    }

    #[test]
    fn missing_file_is_empty() {
        let td = tempdir().unwrap();
        let store = StateStore::new(td.path().join("nope.cfg"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn truncated_or_damaged_content_is_empty() {
        assert!(PersistedRunState::parse("").is_empty());
        assert!(PersistedRunState::parse("only-token\n").is_empty());
        assert!(PersistedRunState::parse("tok\n-42\n9\nyesterday\n").is_empty());
        assert!(PersistedRunState::parse("tok\nclub42\n").is_empty());
        assert!(PersistedRunState::parse("tok\n-42\n0\n").is_empty());
    }

    #[test]
    fn two_line_file_keeps_credentials() {
        let state = PersistedRunState::parse("tok\n-42\n");
        assert_eq!(state.token, "tok");
        assert_eq!(state.group_id, Some(-42));
        assert_eq!(state.batch_size, None);
        assert_eq!(state.last_post_time, None);
    }

    #[test]
    fn next_start_adds_interval() {
        assert_eq!(sample().next_start(7200), Some(1_760_025_200));
        assert_eq!(PersistedRunState::default().next_start(7200), None);
        let far = PersistedRunState {
            last_post_time: Some(i64::MAX - 10),
            ..sample()
        };
        assert_eq!(far.next_start(7200), None);
    }
}
