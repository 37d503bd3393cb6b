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


//! Core types for the relay server

use std::fmt;

/// Unique identifier for an accepted connection (monotonically increasing, never reused)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Create a new connection ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the underlying u64 value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of the listening side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No socket is held
    Stopped,
    /// Creating and binding the listening socket
    Binding,
    /// Running the accept loop
    Listening,
    /// Joining workers and releasing resources
    ShuttingDown,
}

impl LifecycleState {
    /// Check whether a transition from `self` to `next` is allowed
    ///
    /// `Listening -> Binding` and `Binding -> Binding` are the restart edges.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Stopped, Binding)
                | (Binding, Listening)
                | (Binding, Binding)
                | (Binding, ShuttingDown)
                | (Listening, Binding)
                | (Listening, ShuttingDown)
                | (Stopped, ShuttingDown)
                | (ShuttingDown, Stopped)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Binding => write!(f, "binding"),
            Self::Listening => write!(f, "listening"),
            Self::ShuttingDown => write!(f, "shutting-down"),
        }
    }
}

/// How a connection worker finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Peer closed the connection (zero-length read)
    Disconnected,
    /// Read or enqueue failed
    Failed,
    /// Server shutdown interrupted the read
    Cancelled,
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Final result of a connection worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerOutcome {
    /// Connection the worker owned
    pub id: ConnectionId,
    /// Why the worker stopped
    pub exit: WorkerExit,
    /// Chunks relayed to the queue
    pub chunks: u64,
    /// Bytes relayed to the queue
    pub bytes: u64,
}

/// Summary returned once the server has fully stopped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerReport {
    /// Number of bind attempts, including the first
    pub bind_attempts: u32,
    /// Number of operator-approved restarts
    pub restarts: u32,
    /// Connection workers joined across all instances
    pub workers_joined: usize,
    /// Messages handed to the message handler
    pub messages_consumed: u64,
    /// Failure that ended the server, `None` after a requested shutdown
    pub last_error: Option<String>,
}

impl fmt::Display for ServerReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RelayServer {{ binds: {}, restarts: {}, workers: {}, messages: {} }}",
            self.bind_attempts, self.restarts, self.workers_joined, self.messages_consumed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id() {
        let id1 = ConnectionId::new(1);
        let id2 = ConnectionId::new(2);

        assert_eq!(id1.as_u64(), 1);
        assert_ne!(id1, id2);
        assert!(id1 < id2);
        assert_eq!(id2.to_string(), "2");
    }

    #[test]
    fn test_lifecycle_transitions() {
        use LifecycleState::*;
        assert!(Stopped.can_transition_to(Binding));
        assert!(Binding.can_transition_to(Listening));
        assert!(Listening.can_transition_to(Binding));
        assert!(Listening.can_transition_to(ShuttingDown));
        assert!(ShuttingDown.can_transition_to(Stopped));

        assert!(!Stopped.can_transition_to(Listening));
        assert!(!ShuttingDown.can_transition_to(Listening));
        assert!(!Listening.can_transition_to(Stopped));
    }
}
