//! Daemon bootstrap: configuration, telemetry and validated settings.

use std::sync::Arc;
use std::time::Duration;

use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;

use meshsd_config::{Config, ConfigError};

use crate::engine::{EngineConfig, EngineConfigError};
use crate::health::HealthReporter;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The restart interval was rejected.
    #[error("invalid restart interval: {source}")]
    RestartInterval {
        /// Validation error.
        #[source]
        source: ConfigError,
    },
    /// The engine configuration could not be derived.
    #[error("invalid engine configuration: {source}")]
    Engine {
        /// Derivation error.
        #[source]
        source: EngineConfigError,
    },
}

/// Validated settings produced by a successful bootstrap.
#[derive(Debug)]
pub struct Daemon {
    config: Config,
    restart_interval: Duration,
    engine_config: EngineConfig,
    telemetry: TelemetryHandle,
}

impl Daemon {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Period of the restart timer.
    #[must_use]
    pub fn restart_interval(&self) -> Duration {
        self.restart_interval
    }

    /// Configuration handed to every engine creation.
    #[must_use]
    pub fn engine_config(&self) -> &EngineConfig {
        &self.engine_config
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }
}

/// Loads configuration, installs telemetry and validates the supervisor
/// settings.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: &dyn HealthReporter,
) -> Result<Daemon, BootstrapError> {
    reporter.bootstrap_starting();
    let fail = |error: BootstrapError| {
        reporter.bootstrap_failed(&error);
        error
    };

    let config = loader
        .load()
        .map_err(|source| fail(BootstrapError::Configuration { source }))?;
    let telemetry = telemetry::initialise(&config)
        .map_err(|source| fail(BootstrapError::Telemetry { source }))?;
    let restart_interval = config
        .restart_interval()
        .map_err(|source| fail(BootstrapError::RestartInterval { source }))?;
    let engine_config = EngineConfig::from_config(&config)
        .map_err(|source| fail(BootstrapError::Engine { source }))?;

    reporter.bootstrap_succeeded(&config);
    Ok(Daemon {
        config,
        restart_interval,
        engine_config,
        telemetry,
    })
}
