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


//! Error types for the relay server

use crate::types::ConnectionId;
use std::net::SocketAddr;
use thiserror::Error;

/// Result type for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Relay server error types
#[derive(Debug, Error)]
pub enum RelayError {
    /// Socket creation or bind failed
    #[error("Unable to bind socket on {addr}: {source}")]
    Bind {
        /// Address the bind was attempted on
        addr: SocketAddr,
        /// Underlying cause
        #[source]
        source: std::io::Error,
    },

    /// The listen call failed after a successful bind
    #[error("Listening error on {addr}: {source}")]
    Listen {
        /// Address the listener was bound to
        addr: SocketAddr,
        /// Underlying cause
        #[source]
        source: std::io::Error,
    },

    /// A single accept call failed
    #[error("Failed to accept request from a client: {0}")]
    Accept(#[source] std::io::Error),

    /// I/O failure on one accepted connection
    #[error("I/O error on connection {id}: {source}")]
    ConnectionIo {
        /// Connection the failure happened on
        id: ConnectionId,
        /// Underlying cause
        #[source]
        source: std::io::Error,
    },

    /// A connection worker could not be started
    #[error("Worker could not be created: {0}")]
    Spawn(String),

    /// The relay queue has no consumer left
    #[error("Relay queue closed")]
    QueueClosed,

    /// The listening socket is no longer usable
    #[error("Listener closed")]
    ListenerClosed,

    /// A worker or consumer task panicked or was aborted
    #[error("Failed to join task: {0}")]
    Join(String),

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error not attributed to a specific connection
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Check if the error ends the current server instance
    ///
    /// Listener-fatal errors are surfaced to the lifecycle control, which
    /// asks the restart policy whether to bind again.
    pub fn is_listener_fatal(&self) -> bool {
        matches!(
            self,
            RelayError::Bind { .. } | RelayError::Listen { .. } | RelayError::ListenerClosed
        )
    }

    /// Check if the error is scoped to a single connection
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            RelayError::ConnectionIo { .. } | RelayError::Accept(_) | RelayError::Spawn(_)
        )
    }

    /// Check if the error is recoverable
    ///
    /// Recoverable errors are logged and the surrounding loop keeps going.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RelayError::Accept(_) | RelayError::ConnectionIo { .. } | RelayError::Spawn(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn addr() -> SocketAddr {
        "0.0.0.0:4000".parse().unwrap()
    }

    #[test]
    fn test_error_is_listener_fatal() {
        let bind = RelayError::Bind {
            addr: addr(),
            source: io::Error::from(io::ErrorKind::AddrInUse),
        };
        assert!(bind.is_listener_fatal());
        assert!(RelayError::ListenerClosed.is_listener_fatal());
        assert!(!RelayError::Accept(io::Error::from(io::ErrorKind::Other)).is_listener_fatal());
        assert!(!RelayError::QueueClosed.is_listener_fatal());
    }

    #[test]
    fn test_error_is_connection_error() {
        let err = RelayError::ConnectionIo {
            id: ConnectionId::new(3),
            source: io::Error::from(io::ErrorKind::ConnectionReset),
        };
        assert!(err.is_connection_error());
        assert!(err.is_recoverable());
        assert!(RelayError::Spawn("queue closed".into()).is_connection_error());
        assert!(!RelayError::QueueClosed.is_connection_error());
    }

    #[test]
    fn test_error_display() {
        let err = RelayError::ConnectionIo {
            id: ConnectionId::new(42),
            source: io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer"),
        };
        assert_eq!(err.to_string(), "I/O error on connection 42: reset by peer");

        let err = RelayError::Bind {
            addr: addr(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        assert_eq!(err.to_string(), "Unable to bind socket on 0.0.0.0:4000: in use");
    }
}
