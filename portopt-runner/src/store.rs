//! Session-scoped holdings persistence.
//!
//! Holdings are insert-only: `save_all` stamps each holding with the session
//! and a fresh id and appends them, committing all or none. Sessions are
//! independent; nothing locks across them beyond what the backing structure
//! needs.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use portopt_core::domain::{Holding, HoldingId, SessionId};

use crate::error::StoreError;

pub trait HoldingsStore: Send + Sync {
    /// Stamp `holdings` with `session`, assign ids, and persist them as new
    /// rows. Returns the stored holdings.
    fn save_all(&self, holdings: &[Holding], session: &SessionId)
        -> Result<Vec<Holding>, StoreError>;

    fn list_by_session(&self, session: &SessionId) -> Result<Vec<Holding>, StoreError>;

    /// Remove every holding of `session`. Returns how many were removed;
    /// an unknown session removes nothing and is not an error.
    fn delete_by_session(&self, session: &SessionId) -> Result<usize, StoreError>;
}

fn stamp(holdings: &[Holding], session: &SessionId, mut next_id: impl FnMut() -> u64) -> Vec<Holding> {
    holdings
        .iter()
        .map(|h| Holding {
            id: Some(HoldingId(next_id())),
            ..h.stamped(session)
        })
        .collect()
}

/// Process-local store.
#[derive(Debug)]
pub struct InMemoryHoldingsStore {
    sessions: DashMap<SessionId, Vec<Holding>>,
    next_id: AtomicU64,
}

impl InMemoryHoldingsStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of sessions currently holding at least one holding.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for InMemoryHoldingsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HoldingsStore for InMemoryHoldingsStore {
    fn save_all(
        &self,
        holdings: &[Holding],
        session: &SessionId,
    ) -> Result<Vec<Holding>, StoreError> {
        let saved = stamp(holdings, session, || {
            self.next_id.fetch_add(1, Ordering::Relaxed)
        });
        if saved.is_empty() {
            return Ok(saved);
        }
        self.sessions
            .entry(session.clone())
            .or_default()
            .extend(saved.iter().cloned());
        debug!(%session, count = saved.len(), "holdings saved");
        Ok(saved)
    }

    fn list_by_session(&self, session: &SessionId) -> Result<Vec<Holding>, StoreError> {
        Ok(self
            .sessions
            .get(session)
            .map(|h| h.value().clone())
            .unwrap_or_default())
    }

    fn delete_by_session(&self, session: &SessionId) -> Result<usize, StoreError> {
        let removed = self
            .sessions
            .remove(session)
            .map(|(_, h)| h.len())
            .unwrap_or(0);
        debug!(%session, removed, "holdings deleted");
        Ok(removed)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreFile {
    next_id: u64,
    holdings: Vec<Holding>,
}

/// JSON-file store. Every mutation rewrites the file atomically
/// (write to `.tmp`, then rename), so a crash leaves either the old or the
/// new contents.
#[derive(Debug)]
pub struct FileHoldingsStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileHoldingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn load(&self) -> Result<StoreFile, StoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(StoreFile::default()),
            Err(e) => return Err(self.io_err(e)),
        };
        if text.trim().is_empty() {
            return Ok(StoreFile::default());
        }
        serde_json::from_str(&text).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    fn persist(&self, data: &StoreFile) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }

        let json = serde_json::to_vec_pretty(data).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            reason: format!("serialization failed: {e}"),
        })?;

        let tmp_path = self.path.with_extension("json.tmp");
        let written = fs::File::create(&tmp_path).and_then(|mut f| {
            f.write_all(&json)?;
            f.sync_all()
        });
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(self.io_err(e));
        }

        fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            self.io_err(e)
        })
    }
}

impl HoldingsStore for FileHoldingsStore {
    fn save_all(
        &self,
        holdings: &[Holding],
        session: &SessionId,
    ) -> Result<Vec<Holding>, StoreError> {
        let _guard = self.lock.lock();
        let mut data = self.load()?;
        let mut next_id = data.next_id.max(1);
        let saved = stamp(holdings, session, || {
            let id = next_id;
            next_id += 1;
            id
        });
        data.next_id = next_id;
        data.holdings.extend(saved.iter().cloned());
        self.persist(&data)?;
        info!(%session, count = saved.len(), path = %self.path.display(), "holdings saved");
        Ok(saved)
    }

    fn list_by_session(&self, session: &SessionId) -> Result<Vec<Holding>, StoreError> {
        let _guard = self.lock.lock();
        Ok(self
            .load()?
            .holdings
            .into_iter()
            .filter(|h| h.session_id.as_ref() == Some(session))
            .collect())
    }

    fn delete_by_session(&self, session: &SessionId) -> Result<usize, StoreError> {
        let _guard = self.lock.lock();
        let mut data = self.load()?;
        let before = data.holdings.len();
        data.holdings.retain(|h| h.session_id.as_ref() != Some(session));
        let removed = before - data.holdings.len();
        if removed > 0 {
            self.persist(&data)?;
        }
        info!(%session, removed, "holdings deleted");
        Ok(removed)
    }
}
