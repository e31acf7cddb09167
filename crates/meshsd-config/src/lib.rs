//! Shared configuration for the mesh service-discovery daemon.
//!
//! Values are layered by `ortho_config`: built-in defaults, an optional TOML
//! file selected with `--config-path`, `MESHSD_*` environment variables and
//! finally command-line flags. The daemon consumes the resolved [`Config`]
//! as plain values; nothing here talks to the discovery engine.

mod defaults;
mod logging;
mod runtime;

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_BROWSE_DOMAIN, DEFAULT_LOG_FILTER, DEFAULT_RESTART_INTERVAL_SECS,
    DEFAULT_WIDE_AREA_SERVER, MAX_RESTART_INTERVAL_SECS, default_browse_domain,
    default_log_filter, default_log_filter_string, default_log_format, default_management_socket,
    default_output_file, default_runtime_dir, default_wide_area_server,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use runtime::{RuntimePaths, RuntimePathsError};

/// Resolved daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "MESHSD")]
pub struct Config {
    /// Address of the local management channel, as resolved by the launcher.
    #[ortho_config(default = default_management_socket())]
    pub management_socket: Utf8PathBuf,
    /// Directory holding the lock, pid and health files.
    #[ortho_config(default = default_runtime_dir())]
    pub runtime_dir: Utf8PathBuf,
    /// File receiving service snapshots when a dump is requested.
    #[ortho_config(default = default_output_file())]
    pub output_file: Utf8PathBuf,
    /// Explicit PID file location; derived from the runtime directory when absent.
    pub pid_file: Option<Utf8PathBuf>,
    /// Stay attached to the controlling terminal instead of detaching.
    #[ortho_config(default = false)]
    pub foreground: bool,
    /// Seconds between forced responder recycles.
    #[ortho_config(default = DEFAULT_RESTART_INTERVAL_SECS)]
    pub restart_interval_secs: u64,
    /// Domain enumerated by the service type browser.
    #[ortho_config(default = default_browse_domain())]
    pub browse_domain: String,
    /// Publish host-info, address, workstation and domain records.
    #[ortho_config(default = false)]
    pub publish_local_records: bool,
    /// Unicast DNS server used for wide-area DNS-SD. Empty disables it.
    #[ortho_config(default = default_wide_area_server())]
    pub wide_area_server: String,
    /// Toggles the wide-area resolver.
    #[ortho_config(default = true)]
    pub enable_wide_area: bool,
    /// `tracing` filter expression.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Log output format.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            management_socket: default_management_socket(),
            runtime_dir: default_runtime_dir(),
            output_file: default_output_file(),
            pid_file: None,
            foreground: false,
            restart_interval_secs: DEFAULT_RESTART_INTERVAL_SECS,
            browse_domain: default_browse_domain(),
            publish_local_records: false,
            wide_area_server: default_wide_area_server(),
            enable_wide_area: true,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Management channel address.
    #[must_use]
    pub fn management_socket(&self) -> &Utf8Path {
        self.management_socket.as_path()
    }

    /// Directory for runtime artefacts.
    #[must_use]
    pub fn runtime_dir(&self) -> &Utf8Path {
        self.runtime_dir.as_path()
    }

    /// Destination written when a dump is requested.
    #[must_use]
    pub fn output_file(&self) -> &Utf8Path {
        self.output_file.as_path()
    }

    /// Explicit PID file override.
    #[must_use]
    pub fn pid_file(&self) -> Option<&Utf8Path> {
        self.pid_file.as_deref()
    }

    /// Whether the daemon should stay attached to its terminal.
    #[must_use]
    pub fn foreground(&self) -> bool {
        self.foreground
    }

    /// Period of the forced restart timer.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroRestartInterval`] when the interval is zero,
    /// which would recycle the responder on every loop iteration, and
    /// [`ConfigError::RestartIntervalTooLarge`] above
    /// [`MAX_RESTART_INTERVAL_SECS`].
    pub fn restart_interval(&self) -> Result<Duration, ConfigError> {
        match self.restart_interval_secs {
            0 => Err(ConfigError::ZeroRestartInterval),
            secs if secs > MAX_RESTART_INTERVAL_SECS => Err(ConfigError::RestartIntervalTooLarge {
                secs,
                max: MAX_RESTART_INTERVAL_SECS,
            }),
            secs => Ok(Duration::from_secs(secs)),
        }
    }

    /// Domain enumerated by the type browser.
    #[must_use]
    pub fn browse_domain(&self) -> &str {
        &self.browse_domain
    }

    /// Whether local records are published by the engine.
    #[must_use]
    pub fn publish_local_records(&self) -> bool {
        self.publish_local_records
    }

    /// Wide-area resolver address, if one is configured.
    #[must_use]
    pub fn wide_area_server(&self) -> Option<&str> {
        let server = self.wide_area_server.trim();
        (!server.is_empty()).then_some(server)
    }

    /// Whether wide-area resolution is enabled.
    #[must_use]
    pub fn enable_wide_area(&self) -> bool {
        self.enable_wide_area
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

/// Errors raised while validating resolved configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The restart interval must be positive.
    #[error("restart interval must be greater than zero seconds")]
    ZeroRestartInterval,
    /// The restart interval exceeds the supported ceiling.
    #[error("restart interval of {secs} seconds exceeds the maximum of {max} seconds")]
    RestartIntervalTooLarge {
        /// Configured interval.
        secs: u64,
        /// Largest accepted interval.
        max: u64,
    },
}
