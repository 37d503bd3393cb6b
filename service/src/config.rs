//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//


//! Server configuration

use crate::{RelayError, Result};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

/// Accept backlog handed to `listen`; informational, it never caps live workers
pub const DEFAULT_BACKLOG: u32 = 10;

/// Bytes requested per read from a connection
pub const DEFAULT_READ_CHUNK_SIZE: usize = 255;

/// Messages the relay queue holds before producers are suspended
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Server configuration
///
/// Use the builder methods to customize the configuration.
///
/// # Example
///
/// ```
/// use linerelay_service::ServerConfig;
/// use std::time::Duration;
///
/// let config = ServerConfig::new(4000)
///     .with_read_chunk_size(1024)
///     .with_queue_capacity(64)
///     .with_accept_backoff(Duration::from_millis(50));
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// IPv4 address to listen on (`0.0.0.0` accepts any source address)
    pub bind_ip: Ipv4Addr,

    /// Port to listen on
    pub port: u16,

    /// Listen backlog
    pub backlog: u32,

    /// Maximum bytes read per chunk
    ///
    /// Every chunk read from a connection becomes its own relay message.
    pub read_chunk_size: usize,

    /// Relay queue capacity
    ///
    /// When the queue is full, connection workers wait for the consumer
    /// instead of dropping messages.
    pub queue_capacity: usize,

    /// Backlog size at which a warning is logged
    pub backlog_warn_threshold: usize,

    /// Pause after a failed accept before accepting again
    pub accept_backoff: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_ip: Ipv4Addr::UNSPECIFIED,
            port: 0,
            backlog: DEFAULT_BACKLOG,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            backlog_warn_threshold: DEFAULT_QUEUE_CAPACITY / 4 * 3,
            accept_backoff: Duration::from_millis(100),
        }
    }
}

impl ServerConfig {
    /// Create a new configuration listening on all interfaces at `port`
    ///
    /// All other settings will use their default values.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// The socket address the listener binds to
    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.bind_ip, self.port))
    }

    /// Set the listen address
    pub fn with_bind_ip(mut self, ip: Ipv4Addr) -> Self {
        self.bind_ip = ip;
        self
    }

    /// Set the listen backlog
    pub fn with_backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Set the per-read chunk size
    pub fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size;
        self
    }

    /// Set the relay queue capacity
    ///
    /// The warning threshold is reset to three quarters of the new capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self.backlog_warn_threshold = capacity / 4 * 3;
        self
    }

    /// Set the backlog warning threshold
    pub fn with_backlog_warn_threshold(mut self, threshold: usize) -> Self {
        self.backlog_warn_threshold = threshold;
        self
    }

    /// Set the pause applied after a failed accept
    pub fn with_accept_backoff(mut self, backoff: Duration) -> Self {
        self.accept_backoff = backoff;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.backlog == 0 {
            return Err(RelayError::InvalidConfig(
                "backlog must be greater than 0".to_string(),
            ));
        }

        if self.read_chunk_size == 0 {
            return Err(RelayError::InvalidConfig(
                "read_chunk_size must be greater than 0".to_string(),
            ));
        }

        if self.queue_capacity == 0 {
            return Err(RelayError::InvalidConfig(
                "queue_capacity must be greater than 0".to_string(),
            ));
        }

        if self.backlog_warn_threshold > self.queue_capacity {
            return Err(RelayError::InvalidConfig(format!(
                "backlog_warn_threshold ({}) exceeds queue_capacity ({})",
                self.backlog_warn_threshold, self.queue_capacity
            )));
        }

        Ok(())
    }
}
