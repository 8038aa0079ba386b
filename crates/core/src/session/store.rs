//! Flat-file session store.
//!
//! All writes go through [`atomic_write`]: the record is written to a fresh
//! file in the same directory and renamed over the canonical path, so a
//! stage program reading the temp record never sees a half-written file.

use crate::session::error::{SessionError, SessionResult};
use chrono::Local;
use pb_protocol::config_models::KioskConfig;
use pb_protocol::session_models::{Session, SessionPatch};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// File name prefix of in-flight records.
pub const TEMP_RECORD_PREFIX: &str = "temp_user_data_";

/// File name prefix of permanent records.
pub const SESSION_RECORD_PREFIX: &str = "session_";

/// File name prefix of detection stage artifacts.
pub const DETECTION_ARTIFACT_PREFIX: &str = "detection_data_";

/// File name prefix of photo stage artifacts.
pub const PHOTO_ARTIFACT_PREFIX: &str = "photo_data_";

const SNAPSHOT_PREFIX: &str = "snapshot_";
const SNAPSHOT_EXTENSION: &str = "jpg";

/// Reads and writes session records under the kiosk data directory.
#[derive(Debug, Clone)]
pub struct SessionStore {
    data_dir: PathBuf,
    snapshot_dir: PathBuf,
}

impl SessionStore {
    pub fn new(data_dir: impl Into<PathBuf>, snapshot_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            snapshot_dir: snapshot_dir.into(),
        }
    }

    pub fn from_config(config: &KioskConfig) -> Self {
        Self::new(&config.paths.data_dir, &config.paths.snapshot_dir)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Generate a fresh session id.
    ///
    /// Ids are local timestamps with millisecond precision
    /// (`YYYYmmdd_HHMMSS_mmm`), so they sort chronologically.
    pub fn new_session_id() -> String {
        Local::now().format("%Y%m%d_%H%M%S_%3f").to_string()
    }

    /// Create a fresh record for `session_id`.
    pub fn create(&self, session_id: impl Into<String>) -> Session {
        Session::new(session_id)
    }

    /// Field-wise overwrite of `session` with `patch`.
    pub fn merge(session: &mut Session, patch: &SessionPatch) {
        session.merge(patch);
    }

    /// Canonical path of the in-flight record for `session_id`.
    pub fn temp_path(&self, session_id: &str) -> PathBuf {
        self.data_dir
            .join(format!("{TEMP_RECORD_PREFIX}{session_id}.json"))
    }

    /// Atomically (re)write the in-flight record.
    pub fn write_temp(&self, session: &Session) -> SessionResult<PathBuf> {
        let path = self.temp_path(&session.session_id);
        write_session(&path, session)?;
        debug!(session_id = %session.session_id, path = %path.display(), "Temp session written");
        Ok(path)
    }

    /// Load the in-flight record for `session_id`.
    ///
    /// Returns `None` when the file is missing or cannot be parsed; parse
    /// failures are logged.
    pub fn read_temp(&self, session_id: &str) -> Option<Session> {
        let path = self.temp_path(session_id);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %err, "Failed to read temp session");
                }
                return None;
            }
        };

        match serde_json::from_str::<Session>(&content) {
            Ok(session) => Some(session),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Discarding unparseable temp session");
                None
            }
        }
    }

    /// Write the permanent record and remove the in-flight one.
    ///
    /// Sets `session.timestamp`. Failure to remove the temp file is logged,
    /// not returned.
    pub fn persist(&self, session: &mut Session) -> SessionResult<PathBuf> {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        session.timestamp = timestamp.clone();

        let path = self.unused_record_path(&timestamp);
        write_session(&path, session)?;
        info!(session_id = %session.session_id, path = %path.display(), "Session saved");

        let temp = self.temp_path(&session.session_id);
        match std::fs::remove_file(&temp) {
            Ok(()) => debug!(path = %temp.display(), "Temp session removed"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(path = %temp.display(), error = %err, "Failed to remove temp session");
            }
        }

        Ok(path)
    }

    /// `session_<timestamp>.json`, suffixed when two visits end in the same second.
    fn unused_record_path(&self, timestamp: &str) -> PathBuf {
        let base = self
            .data_dir
            .join(format!("{SESSION_RECORD_PREFIX}{timestamp}.json"));
        if !base.exists() {
            return base;
        }
        (1..)
            .map(|n| {
                self.data_dir
                    .join(format!("{SESSION_RECORD_PREFIX}{timestamp}_{n}.json"))
            })
            .find(|candidate| !candidate.exists())
            .unwrap_or(base)
    }

    /// Find the latest artifact a stage wrote for `session_id`.
    ///
    /// Matches `<prefix><session_id>*.json` in the data directory and returns
    /// the lexicographically greatest name, which is the newest one since
    /// stage programs suffix artifacts with sortable timestamps.
    pub fn find_latest_artifact(&self, session_id: &str, prefix: &str) -> Option<PathBuf> {
        let stem = format!("{prefix}{session_id}");
        latest_in(&self.data_dir, |name| {
            name.starts_with(&stem) && name.ends_with(".json")
        })
    }

    /// Read an artifact as a partial session. Unreadable files yield `None`.
    pub fn read_artifact(&self, path: &Path) -> Option<SessionPatch> {
        let content = std::fs::read_to_string(path)
            .map_err(|err| warn!(path = %path.display(), error = %err, "Failed to read artifact"))
            .ok()?;
        serde_json::from_str(&content)
            .map_err(|err| warn!(path = %path.display(), error = %err, "Failed to parse artifact"))
            .ok()
    }

    /// Merge the latest `prefix` artifact for the session into it.
    ///
    /// Only image paths, detected props and a missing story id are taken
    /// from the artifact. Returns whether anything was merged.
    pub fn absorb_latest_artifact(&self, session: &mut Session, prefix: &str) -> bool {
        let Some(path) = self.find_latest_artifact(&session.session_id, prefix) else {
            return false;
        };
        let Some(artifact) = self.read_artifact(&path) else {
            return false;
        };

        let patch = artifact.artifact_fields(session);
        if patch.is_empty() {
            return false;
        }

        debug!(path = %path.display(), "Merging stage artifact into session");
        session.merge(&patch);
        true
    }

    /// Newest `snapshot_*.jpg` in the snapshot directory.
    pub fn find_latest_snapshot(&self) -> Option<PathBuf> {
        latest_in(&self.snapshot_dir, |name| {
            name.starts_with(SNAPSHOT_PREFIX)
                && Path::new(name)
                    .extension()
                    .is_some_and(|ext| ext == SNAPSHOT_EXTENSION)
        })
    }

    /// Session ids of all in-flight records currently on disk.
    pub fn temp_session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = file_names(&self.data_dir)
            .filter_map(|name| {
                name.strip_prefix(TEMP_RECORD_PREFIX)
                    .and_then(|rest| rest.strip_suffix(".json"))
                    .map(str::to_string)
            })
            .collect();
        ids.sort();
        ids
    }

    /// Persist in-flight records left behind by a previous run.
    ///
    /// Unparseable leftovers are removed. Returns the number of sessions
    /// saved.
    pub fn recover_orphans(&self) -> usize {
        let mut recovered = 0;
        for session_id in self.temp_session_ids() {
            match self.read_temp(&session_id) {
                Some(mut session) => match self.persist(&mut session) {
                    Ok(path) => {
                        info!(session_id = %session_id, path = %path.display(), "Recovered orphaned session");
                        recovered += 1;
                    }
                    Err(err) => warn!(session_id = %session_id, error = %err, "Failed to recover orphaned session"),
                },
                None => {
                    let path = self.temp_path(&session_id);
                    if let Err(err) = std::fs::remove_file(&path) {
                        warn!(path = %path.display(), error = %err, "Failed to remove unreadable temp session");
                    }
                }
            }
        }
        recovered
    }

    /// Remove every in-flight record. Returns the number of files removed.
    pub fn cleanup_temp_files(&self) -> usize {
        let mut removed = 0;
        for session_id in self.temp_session_ids() {
            let path = self.temp_path(&session_id);
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) => warn!(path = %path.display(), error = %err, "Failed to remove temp session"),
            }
        }
        removed
    }

    /// All permanent records, newest first. Unreadable files are skipped.
    pub fn list_sessions(&self) -> Vec<(PathBuf, Session)> {
        let mut names: Vec<String> = file_names(&self.data_dir)
            .filter(|name| name.starts_with(SESSION_RECORD_PREFIX) && name.ends_with(".json"))
            .collect();
        names.sort();
        names.reverse();

        names
            .into_iter()
            .filter_map(|name| {
                let path = self.data_dir.join(name);
                let content = std::fs::read_to_string(&path).ok()?;
                let session = serde_json::from_str::<Session>(&content)
                    .map_err(|err| debug!(path = %path.display(), error = %err, "Skipping unreadable session record"))
                    .ok()?;
                Some((path, session))
            })
            .collect()
    }
}

/// Names of the regular files directly inside `dir`.
fn file_names(dir: &Path) -> impl Iterator<Item = String> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
}

fn latest_in(dir: &Path, matches: impl Fn(&str) -> bool) -> Option<PathBuf> {
    file_names(dir)
        .filter(|name| matches(name))
        .max()
        .map(|name| dir.join(name))
}

fn write_session(path: &Path, session: &Session) -> SessionResult<()> {
    let json = serde_json::to_string_pretty(session).map_err(|source| SessionError::Serialize {
        session_id: session.session_id.clone(),
        source,
    })?;
    atomic_write(path, json.as_bytes())
}

/// Writes content to a file atomically using temp file + rename.
///
/// The rename is atomic on the same filesystem, so readers observe either
/// the previous content or the new content in full.
fn atomic_write(path: &Path, contents: &[u8]) -> SessionResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir).map_err(|source| SessionError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    tmp.write_all(contents).map_err(|source| SessionError::Io {
        path: tmp.path().to_path_buf(),
        source,
    })?;

    tmp.as_file().sync_all().map_err(|source| SessionError::Io {
        path: tmp.path().to_path_buf(),
        source,
    })?;

    tmp.persist(path).map_err(|e| SessionError::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;

    Ok(())
}
