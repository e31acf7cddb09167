//! Record of discovered service types and the snapshot written on dump
//! requests.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, SystemTimeError, UNIX_EPOCH};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::process::files::atomic_write;

const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");

/// Errors raised while writing a snapshot.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Serialising the snapshot failed.
    #[error("failed to serialise service snapshot: {source}")]
    Serialise {
        /// Underlying serialisation error.
        #[from]
        source: serde_json::Error,
    },
    /// Writing the snapshot failed.
    #[error("failed to write service snapshot '{path}': {source}")]
    Write {
        /// Destination path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The system clock is before the Unix epoch.
    #[error("failed to read system time: {source}")]
    Clock {
        /// Underlying clock error.
        #[from]
        source: SystemTimeError,
    },
}

/// Collaborator that remembers what the type browser reported.
///
/// Dumps are read-only with respect to the supervisor and are safe in any
/// supervisor state.
pub trait ServiceRegistry {
    /// Records a service type seen in `domain`.
    fn service_type_found(&mut self, service_type: &str, domain: &str);

    /// Forgets a service type withdrawn from `domain`.
    fn service_type_removed(&mut self, service_type: &str, domain: &str);

    /// Serialises the current contents to `destination`.
    fn dump_snapshot(&self, destination: &Path) -> Result<(), RegistryError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Sighting {
    first_seen: u64,
    last_seen: u64,
}

/// Registry kept in memory and dumped as JSON.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    entries: BTreeMap<(String, String), Sighting>,
}

#[derive(Debug, Serialize)]
struct Snapshot<'a> {
    generated_at: u64,
    service_types: Vec<SnapshotEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct SnapshotEntry<'a> {
    service_type: &'a str,
    domain: &'a str,
    first_seen: u64,
    last_seen: u64,
}

impl InMemoryRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of known service types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no service types are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `service_type` is known in `domain`.
    #[must_use]
    pub fn contains(&self, service_type: &str, domain: &str) -> bool {
        self.entries
            .contains_key(&(service_type.to_owned(), domain.to_owned()))
    }

    fn render(&self) -> Result<Vec<u8>, RegistryError> {
        let snapshot = Snapshot {
            generated_at: unix_now()?,
            service_types: self
                .entries
                .iter()
                .map(|((service_type, domain), sighting)| SnapshotEntry {
                    service_type,
                    domain,
                    first_seen: sighting.first_seen,
                    last_seen: sighting.last_seen,
                })
                .collect(),
        };
        let mut bytes = serde_json::to_vec_pretty(&snapshot)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

impl ServiceRegistry for InMemoryRegistry {
    fn service_type_found(&mut self, service_type: &str, domain: &str) {
        // A clock before the epoch only degrades the timestamps.
        let now = unix_now().unwrap_or_default();
        self.entries
            .entry((service_type.to_owned(), domain.to_owned()))
            .and_modify(|sighting| sighting.last_seen = now)
            .or_insert_with(|| {
                debug!(target: REGISTRY_TARGET, service_type, domain, "service type added");
                Sighting {
                    first_seen: now,
                    last_seen: now,
                }
            });
    }

    fn service_type_removed(&mut self, service_type: &str, domain: &str) {
        if self
            .entries
            .remove(&(service_type.to_owned(), domain.to_owned()))
            .is_some()
        {
            debug!(target: REGISTRY_TARGET, service_type, domain, "service type removed");
        }
    }

    fn dump_snapshot(&self, destination: &Path) -> Result<(), RegistryError> {
        let bytes = self.render()?;
        let write_error = |source| RegistryError::Write {
            path: destination.to_path_buf(),
            source,
        };
        if let Some(parent) = destination.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }
        atomic_write(destination, &bytes).map_err(write_error)?;
        info!(
            target: REGISTRY_TARGET,
            file = %destination.display(),
            service_types = self.entries.len(),
            "service snapshot written"
        );
        Ok(())
    }
}

fn unix_now() -> Result<u64, SystemTimeError> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}
