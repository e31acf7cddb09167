//! Test configuration loaders for scenarios covering success and failure
//! paths.

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use camino::Utf8PathBuf;
use ortho_config::{OrthoConfig, OrthoError};
use tempfile::TempDir;

use meshsd_config::Config;

use crate::bootstrap::ConfigLoader;

/// Loader that places every runtime artefact under a temporary directory.
#[derive(Clone)]
pub(crate) struct TestConfigLoader {
    dir: Arc<TempDir>,
    foreground: bool,
    restart_interval_secs: u64,
}

impl TestConfigLoader {
    pub(crate) fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temporary runtime directory");
        Self {
            dir: Arc::new(dir),
            foreground: true,
            restart_interval_secs: 64,
        }
    }

    /// Requests background mode, exercising the daemonizer.
    pub(crate) fn background(mut self) -> Self {
        self.foreground = false;
        self
    }

    pub(crate) fn with_restart_interval(mut self, secs: u64) -> Self {
        self.restart_interval_secs = secs;
        self
    }

    pub(crate) fn runtime_dir(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    pub(crate) fn output_file(&self) -> PathBuf {
        self.dir.path().join("services.json")
    }

    fn utf8(path: PathBuf) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(path).expect("temporary path was not valid UTF-8")
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(Config {
            management_socket: Self::utf8(self.dir.path().join("meshsdd.sock")),
            runtime_dir: Self::utf8(self.runtime_dir()),
            output_file: Self::utf8(self.output_file()),
            foreground: self.foreground,
            restart_interval_secs: self.restart_interval_secs,
            enable_wide_area: false,
            ..Config::default()
        })
    }
}

/// Loader that intentionally fails by passing a non-numeric restart interval.
pub(crate) struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("meshsdd"),
            OsString::from("--restart-interval-secs"),
            OsString::from("soon"),
        ];
        Config::load_from_iter(args)
    }
}
