// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP server configuration.

use kiln_core::config::ConfigError;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

/// Server settings not shared with the core.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on (all interfaces).
    pub http_port: u16,
    /// Log output format.
    pub log_format: LogFormat,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `KILN_HTTP_PORT`: listen port (default: 8080)
    /// - `KILN_LOG_FORMAT`: `text` or `json` (default: text)
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_port: u16 = std::env::var("KILN_HTTP_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("KILN_HTTP_PORT", "must be a port number"))?;

        let log_format = match std::env::var("KILN_LOG_FORMAT")
            .unwrap_or_else(|_| "text".to_string())
            .to_lowercase()
            .as_str()
        {
            "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            _ => return Err(ConfigError::Invalid("KILN_LOG_FORMAT", "must be 'text' or 'json'")),
        };

        Ok(Self {
            http_port,
            log_format,
        })
    }
}
