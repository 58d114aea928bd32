// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Server configuration: defaults, optional JSON config file, CLI overrides.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ServerdError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_server_name")]
    pub server_name: String,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub multicast_enabled: bool,

    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: usize,
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    5555
}

fn default_server_name() -> String {
    "sdr-serverd".to_string()
}

fn default_user() -> String {
    "sdr".to_string()
}

fn default_compression_threshold() -> usize {
    sdr_core::config::DEFAULT_COMPRESSION_THRESHOLD
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            server_name: default_server_name(),
            user: default_user(),
            password: String::new(),
            multicast_enabled: false,
            compression_threshold: default_compression_threshold(),
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: &Path) -> Result<Self, ServerdError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 5555);
        assert!(!config.multicast_enabled);
        assert_eq!(config.compression_threshold, sdr_core::config::DEFAULT_COMPRESSION_THRESHOLD);
    }

    #[test]
    fn round_trips_through_json() {
        let config = ServerConfig {
            port: 6000,
            multicast_enabled: true,
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.port, 6000);
        assert!(parsed.multicast_enabled);
    }
}
