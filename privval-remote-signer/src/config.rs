// Copyright (C) 2025 Category Labs, Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Requester-side configuration.
//!
//! ## Example
//!
//! ```json
//! {
//!     "address": { "type": "unix", "socket_path": "/var/run/privval-signer.sock" },
//!     "chain_id": "test-chain",
//!     "pub_key": { "algorithm": "ed25519", "hex": "556a436f..." },
//!     "request_timeout_ms": 3000,
//!     "ping_interval_ms": 10000,
//!     "retry": { "max_retries": 5, "initial_backoff_ms": 100, "max_backoff_ms": 5000 }
//! }
//! ```
//!
//! Every field is optional and falls back to the defaults below.

use std::fs::File;
use std::io::{self, BufReader};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use privval_proto::PublicKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::liveness::LivenessConfig;
use crate::supervisor::RetryPolicy;
use crate::transport::{Connector, TcpConnector, UnixConnector};

pub const DEFAULT_SOCKET_PATH: &str = "/var/run/privval-signer.sock";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("invalid cached public key: {0}")]
    InvalidPubKey(String),
}

/// Where the signer listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignerAddress {
    Unix { socket_path: PathBuf },
    Tcp { addr: SocketAddr },
}

impl Default for SignerAddress {
    fn default() -> Self {
        SignerAddress::Unix {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
        }
    }
}

/// Public key known ahead of time, so startup does not need the signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedPubKey {
    /// `ed25519`, `secp256k1` or `dilithium`
    pub algorithm: String,
    /// Raw key bytes, hex-encoded
    pub hex: String,
}

impl CachedPubKey {
    pub fn to_public_key(&self) -> Result<PublicKey, ConfigError> {
        let bytes = hex::decode(self.hex.trim_start_matches("0x"))
            .map_err(|e| ConfigError::InvalidPubKey(format!("bad hex: {e}")))?;
        match self.algorithm.as_str() {
            "ed25519" => Ok(PublicKey::Ed25519(bytes)),
            "secp256k1" => Ok(PublicKey::Secp256k1(bytes)),
            "dilithium" => Ok(PublicKey::Dilithium(bytes)),
            other => Err(ConfigError::InvalidPubKey(format!(
                "unsupported algorithm `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignerConfig {
    pub address: SignerAddress,
    /// Sent with every request so the signer can refuse foreign chains
    pub chain_id: String,
    pub pub_key: Option<CachedPubKey>,
    pub connect_timeout_ms: u64,
    /// Bound on a single request/response exchange, 0 waits forever
    pub request_timeout_ms: u64,
    /// Keepalive interval, 0 disables the liveness monitor
    pub ping_interval_ms: u64,
    pub ping_timeout_ms: u64,
    pub retry: RetryConfig,
}

impl Default for SignerConfig {
    fn default() -> Self {
        let liveness = LivenessConfig::default();
        Self {
            address: SignerAddress::default(),
            chain_id: String::new(),
            pub_key: None,
            connect_timeout_ms: 3_000,
            request_timeout_ms: 3_000,
            ping_interval_ms: liveness.interval.as_millis() as u64,
            ping_timeout_ms: liveness.timeout.as_millis() as u64,
            retry: RetryConfig::default(),
        }
    }
}

impl SignerConfig {
    /// Read and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = File::open(path.as_ref())?;
        let config: SignerConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "connect_timeout_ms must be positive".to_string(),
            ));
        }
        if self.ping_interval_ms > 0 && self.ping_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "ping_timeout_ms must be positive when pings are enabled".to_string(),
            ));
        }
        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            return Err(ConfigError::Invalid(format!(
                "max_backoff_ms ({}) is below initial_backoff_ms ({})",
                self.retry.max_backoff_ms, self.retry.initial_backoff_ms
            )));
        }
        if let Some(key) = &self.pub_key {
            key.to_public_key()?;
        }
        Ok(())
    }

    pub fn connector(&self) -> Box<dyn Connector> {
        let write_timeout = self.request_timeout();
        match &self.address {
            SignerAddress::Unix { socket_path } => {
                Box::new(UnixConnector::new(socket_path.clone(), write_timeout))
            }
            SignerAddress::Tcp { addr } => Box::new(TcpConnector::new(
                *addr,
                Duration::from_millis(self.connect_timeout_ms),
                write_timeout,
            )),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry.max_retries,
            initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }

    pub fn liveness(&self) -> Option<LivenessConfig> {
        (self.ping_interval_ms > 0).then(|| LivenessConfig {
            interval: Duration::from_millis(self.ping_interval_ms),
            timeout: Duration::from_millis(self.ping_timeout_ms),
        })
    }

    pub fn cached_pub_key(&self) -> Result<Option<PublicKey>, ConfigError> {
        self.pub_key
            .as_ref()
            .map(CachedPubKey::to_public_key)
            .transpose()
    }
}
