//! Locations of the files that mark a running daemon.

use std::fs::DirBuilder;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::Config;

const LOCK_FILE: &str = "meshsdd.lock";
const PID_FILE: &str = "meshsdd.pid";
const HEALTH_FILE: &str = "meshsdd.health";

/// Lock, pid and health file locations under the configured runtime
/// directory. The pid file may be pinned elsewhere with `pid_file`.
#[derive(Debug, Clone)]
pub struct RuntimePaths {
    dir: PathBuf,
    lock: PathBuf,
    pid: PathBuf,
    health: PathBuf,
}

impl RuntimePaths {
    /// Resolves the paths for `config`, creating the runtime directory with
    /// mode 0700 when it is missing.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimePathsError::RuntimeDirectory`] when the directory
    /// cannot be created.
    pub fn from_config(config: &Config) -> Result<Self, RuntimePathsError> {
        let dir = config.runtime_dir().as_std_path().to_path_buf();
        create_private_dir(&dir)?;
        let pid = config
            .pid_file()
            .map_or_else(|| dir.join(PID_FILE), |path| path.as_std_path().to_path_buf());
        Ok(Self {
            lock: dir.join(LOCK_FILE),
            health: dir.join(HEALTH_FILE),
            pid,
            dir,
        })
    }

    /// Directory holding runtime artefacts.
    #[must_use]
    pub fn runtime_dir(&self) -> &Path {
        &self.dir
    }

    /// Singleton lock file.
    #[must_use]
    pub fn lock_path(&self) -> &Path {
        &self.lock
    }

    /// PID file.
    #[must_use]
    pub fn pid_path(&self) -> &Path {
        &self.pid
    }

    /// Health snapshot.
    #[must_use]
    pub fn health_path(&self) -> &Path {
        &self.health
    }
}

fn create_private_dir(dir: &Path) -> Result<(), RuntimePathsError> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder
        .create(dir)
        .map_err(|source| RuntimePathsError::RuntimeDirectory {
            path: dir.to_path_buf(),
            source,
        })
}

/// Errors raised while resolving runtime paths.
#[derive(Debug, Error)]
pub enum RuntimePathsError {
    /// Creating the runtime directory failed.
    #[error("failed to prepare runtime directory '{path}': {source}")]
    RuntimeDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
