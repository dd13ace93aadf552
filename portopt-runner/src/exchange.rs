//! File-based hand-off of request payloads to the external process.
//!
//! Every `write` lands in a fresh file named
//! `input_{op}_{unix_millis}_{uuid}.json`, opened with `create_new` so a name
//! clash fails instead of overwriting another request's input. The returned
//! [`Artifact`] deletes its file when released or dropped.

use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::GatewayError;

/// Fresh names drawn before giving up on `AlreadyExists`.
const MAX_NAME_ATTEMPTS: usize = 8;

#[derive(Debug, Clone)]
pub struct ArtifactExchange {
    dir: PathBuf,
}

impl ArtifactExchange {
    /// The directory is not created; a missing or unwritable directory makes
    /// every `write` fail with `GatewayError::Io`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn candidate_path(&self, op: &str) -> PathBuf {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        self.dir
            .join(format!("input_{op}_{millis}_{}.json", Uuid::new_v4().simple()))
    }

    /// Serialize `payload` as UTF-8 JSON into a new, uniquely named file.
    pub fn write<T: Serialize + ?Sized>(
        &self,
        op: &str,
        payload: &T,
    ) -> Result<Artifact, GatewayError> {
        let bytes = serde_json::to_vec(payload).map_err(GatewayError::Encode)?;

        for _ in 0..MAX_NAME_ATTEMPTS {
            let path = self.candidate_path(op);
            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(f) => f,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    warn!(path = %path.display(), "artifact name collision; drawing a new name");
                    continue;
                }
                Err(e) => {
                    return Err(GatewayError::io(
                        format!("create {}", path.display()),
                        e,
                    ))
                }
            };

            // From here on the guard owns the file, so a failed write still
            // removes it.
            let artifact = Artifact::new(path);
            let written = file.write_all(&bytes).and_then(|_| file.flush());
            drop(file);
            written
                .map_err(|e| GatewayError::io(format!("write {}", artifact.path.display()), e))?;

            debug!(path = %artifact.path.display(), bytes = bytes.len(), "request artifact written");
            return Ok(artifact);
        }

        Err(GatewayError::io(
            format!("allocate artifact name in {}", self.dir.display()),
            io::Error::new(
                io::ErrorKind::AlreadyExists,
                "exhausted unique artifact names",
            ),
        ))
    }
}

/// Delete `path` if present. A missing file is not an error.
pub fn release(path: &Path) -> Result<(), GatewayError> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "request artifact released");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(GatewayError::io(format!("remove {}", path.display()), e)),
    }
}

/// Handle to a written request file. Removed on [`Artifact::release`] or drop.
#[derive(Debug)]
pub struct Artifact {
    path: PathBuf,
    released: bool,
}

impl Artifact {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            released: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file now, reporting failure instead of only logging it.
    pub fn release(mut self) -> Result<(), GatewayError> {
        self.released = true;
        release(&self.path)
    }
}

impl Drop for Artifact {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = release(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to release request artifact");
        }
    }
}
