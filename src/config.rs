// Copyright 2025 the wireflow authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashMap;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_PORT: u16 = 8281;
pub const DEFAULT_BUFFER_SIZE: usize = 4096;
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 500;
pub const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 5000;

/// Server-side configuration.
///
/// `selector_count` is the number of event processors (each owning one
/// readiness poller); `idle_timeout_ms == 0` disables idle eviction.
/// `params` carries free-form string options for application code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub charset: String,
    pub buffer_size: usize,
    pub selector_count: usize,
    pub poll_timeout_ms: u64,
    pub idle_timeout_ms: u64,
    pub params: HashMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            name: "default".to_string(),
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            charset: "UTF-8".to_string(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            selector_count: 1,
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            idle_timeout_ms: 0,
            params: HashMap::new(),
        }
    }
}

impl ServerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<ServerConfig> {
        load_config(path)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        resolve(&self.host, self.port)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms.max(1))
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_ms > 0).then(|| Duration::from_millis(self.idle_timeout_ms))
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// Client-side configuration.
///
/// `connection_timeout_ms == 0` makes `connect()` return without waiting for
/// the handshake. A zero reconnect or heartbeat interval leaves that service
/// disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub name: String,
    pub remote_host: String,
    pub port: u16,
    pub charset: String,
    pub buffer_size: usize,
    pub poll_timeout_ms: u64,
    pub connection_timeout_ms: u64,
    pub reconnect_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub params: HashMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            name: "default".to_string(),
            remote_host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            charset: "UTF-8".to_string(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            connection_timeout_ms: DEFAULT_CONNECTION_TIMEOUT_MS,
            reconnect_interval_ms: 0,
            heartbeat_interval_ms: 0,
            params: HashMap::new(),
        }
    }
}

impl ClientConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<ClientConfig> {
        load_config(path)
    }

    pub fn remote_addr(&self) -> Result<SocketAddr> {
        resolve(&self.remote_host, self.port)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms.max(1))
    }

    pub fn connection_timeout(&self) -> Option<Duration> {
        (self.connection_timeout_ms > 0).then(|| Duration::from_millis(self.connection_timeout_ms))
    }

    pub fn reconnect_interval(&self) -> Option<Duration> {
        (self.reconnect_interval_ms > 0).then(|| Duration::from_millis(self.reconnect_interval_ms))
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_ms > 0).then(|| Duration::from_millis(self.heartbeat_interval_ms))
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

fn load_config<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> Result<T> {
    let path_str = path
        .as_ref()
        .to_str()
        .ok_or_else(|| Error::InvalidAddress(path.as_ref().to_string_lossy().into_owned()))?;
    let settings = config::Config::builder()
        .add_source(config::File::with_name(path_str))
        .build()?;
    Ok(settings.try_deserialize()?)
}

pub(crate) fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| Error::InvalidAddress(format!("{host}:{port}: {e}")))?
        .next()
        .ok_or_else(|| Error::InvalidAddress(format!("{host}:{port}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 8281);
        assert_eq!(cfg.buffer_size, 4096);
        assert_eq!(cfg.selector_count, 1);
        assert_eq!(cfg.idle_timeout(), None);

        let cfg = ClientConfig::default();
        assert_eq!(cfg.connection_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(cfg.reconnect_interval(), None);
        assert_eq!(cfg.heartbeat_interval(), None);
    }

    #[test]
    fn resolves_bind_address() {
        let cfg = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..ServerConfig::default()
        };
        let addr = cfg.bind_addr().unwrap();
        assert!(addr.ip().is_loopback());
    }
}
