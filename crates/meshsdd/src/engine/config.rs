//! Immutable engine configuration derived once from the daemon config.

use std::net::{AddrParseError, IpAddr, SocketAddr};

use thiserror::Error;

use meshsd_config::Config;

use super::wire::DNS_PORT;

/// Local records the engine may publish about this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicationFlags {
    /// Suppress the HINFO record.
    pub suppress_host_info: bool,
    /// Suppress A/AAAA address records.
    pub suppress_addresses: bool,
    /// Suppress the workstation service.
    pub suppress_workstation: bool,
    /// Suppress domain browsing records.
    pub suppress_domain: bool,
}

impl PublicationFlags {
    /// All local records suppressed.
    #[must_use]
    pub const fn suppress_all() -> Self {
        Self {
            suppress_host_info: true,
            suppress_addresses: true,
            suppress_workstation: true,
            suppress_domain: true,
        }
    }

    /// All local records published.
    #[must_use]
    pub const fn publish_all() -> Self {
        Self {
            suppress_host_info: false,
            suppress_addresses: false,
            suppress_workstation: false,
            suppress_domain: false,
        }
    }
}

/// Error raised while deriving an [`EngineConfig`].
#[derive(Debug, Error)]
pub enum EngineConfigError {
    /// The wide-area server was not an IP address or socket address.
    #[error("invalid wide-area server '{value}': {source}")]
    WideAreaServer {
        /// Configured value.
        value: String,
        /// Parse failure.
        #[source]
        source: AddrParseError,
    },
}

/// Configuration passed to every engine creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    publication: PublicationFlags,
    wide_area_servers: Vec<SocketAddr>,
    wide_area_enabled: bool,
    browse_domain: String,
}

impl EngineConfig {
    /// Builds the engine configuration.
    pub fn from_config(config: &Config) -> Result<Self, EngineConfigError> {
        let publication = if config.publish_local_records() {
            PublicationFlags::publish_all()
        } else {
            PublicationFlags::suppress_all()
        };
        let wide_area_servers = config
            .wide_area_server()
            .map(parse_server)
            .transpose()?
            .into_iter()
            .collect();
        Ok(Self {
            publication,
            wide_area_servers,
            wide_area_enabled: config.enable_wide_area(),
            browse_domain: config.browse_domain().to_owned(),
        })
    }

    /// Which local records are published.
    #[must_use]
    pub fn publication(&self) -> PublicationFlags {
        self.publication
    }

    /// Unicast DNS servers queried for wide-area browsing. Empty when
    /// wide-area browsing is disabled.
    #[must_use]
    pub fn wide_area_servers(&self) -> &[SocketAddr] {
        if self.wide_area_enabled {
            &self.wide_area_servers
        } else {
            &[]
        }
    }

    /// Whether wide-area browsing is enabled.
    #[must_use]
    pub fn wide_area_enabled(&self) -> bool {
        self.wide_area_enabled
    }

    /// Domain the type browser enumerates.
    #[must_use]
    pub fn browse_domain(&self) -> &str {
        &self.browse_domain
    }
}

fn parse_server(value: &str) -> Result<SocketAddr, EngineConfigError> {
    let value = value.trim();
    value
        .parse::<SocketAddr>()
        .or_else(|_| {
            value
                .parse::<IpAddr>()
                .map(|ip| SocketAddr::new(ip, DNS_PORT))
        })
        .map_err(|source| EngineConfigError::WideAreaServer {
            value: value.to_owned(),
            source,
        })
}
