/*
 * config.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of callback-ws, a WebSocket callback client.
 *
 * callback-ws is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * callback-ws is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with callback-ws.  If not, see <http://www.gnu.org/licenses/>.
 */

use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WebSocketError};

// The client configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub context_path: String,
    pub secure: bool,
    pub client_id: String,
    pub connect_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            host: String::from("localhost"),
            port: 1080,
            context_path: String::new(),
            secure: false,
            client_id: uuid::Uuid::new_v4().to_string(),
            connect_timeout_secs: 5,
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> ClientConfig {
        ClientConfig {
            host: host.into(),
            port,
            ..ClientConfig::default()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Reject configurations that can never produce a connection.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(WebSocketError::Construction("host is empty".into()));
        }
        if self.port == 0 {
            return Err(WebSocketError::Construction("port must be non-zero".into()));
        }
        Ok(())
    }
}

/// Load the config from a JSON file. A missing file yields the defaults.
pub fn load_config(path: &Path) -> io::Result<ClientConfig> {
    if !path.exists() {
        return Ok(ClientConfig::default());
    }
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Write the config as pretty JSON, creating parent directories.
pub fn save_config(path: &Path, config: &ClientConfig) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config).map_err(io::Error::other)?;
    fs::write(path, json)
}
