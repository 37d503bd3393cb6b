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


//! Lock-free metrics for the relay server

use metrics::{counter, gauge};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lock-free relay metrics
///
/// All metrics are stored as atomics and can be updated from any worker
/// without locks. Every update is mirrored to the `metrics` facade so an
/// installed recorder sees the same numbers.
#[derive(Debug)]
pub struct RelayMetrics {
    // Connection counts
    total_connections: AtomicU64,
    active_connections: AtomicU64,

    // Throughput
    chunks_relayed: AtomicU64,
    bytes_received: AtomicU64,
    messages_consumed: AtomicU64,

    // Queue depth
    backlog: AtomicU64,
    peak_backlog: AtomicU64,

    // Errors
    accept_errors: AtomicU64,
    spawn_errors: AtomicU64,
    connection_errors: AtomicU64,

    // Lifecycle
    restarts: AtomicU64,

    // Timing (stored as nanoseconds)
    total_connection_duration_ns: AtomicU64,
    closed_connections: AtomicU64,

    started_at: Instant,
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayMetrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            total_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            chunks_relayed: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            messages_consumed: AtomicU64::new(0),
            backlog: AtomicU64::new(0),
            peak_backlog: AtomicU64::new(0),
            accept_errors: AtomicU64::new(0),
            spawn_errors: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            restarts: AtomicU64::new(0),
            total_connection_duration_ns: AtomicU64::new(0),
            closed_connections: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    // Connection tracking

    /// Record a newly accepted connection
    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        counter!("linerelay.connections.total").increment(1);
        gauge!("linerelay.connections.active").increment(1.0);
    }

    /// Record a connection being closed
    pub fn connection_closed(&self, duration: Duration) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
        self.closed_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connection_duration_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        gauge!("linerelay.connections.active").decrement(1.0);
    }

    /// Get the current number of active connections
    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Get the total number of connections since server start
    pub fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    // Throughput tracking

    /// Record a chunk handed to the relay queue
    pub fn chunk_relayed(&self, bytes: usize) {
        self.chunks_relayed.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
        counter!("linerelay.chunks.relayed").increment(1);
        counter!("linerelay.bytes.received").increment(bytes as u64);
    }

    /// Record a message processed by the consumer
    pub fn message_consumed(&self) {
        self.messages_consumed.fetch_add(1, Ordering::Relaxed);
        counter!("linerelay.messages.consumed").increment(1);
    }

    /// Get the number of messages processed by the consumer
    pub fn messages_consumed(&self) -> u64 {
        self.messages_consumed.load(Ordering::Relaxed)
    }

    // Queue depth

    /// Record a message entering the queue and return the new backlog
    pub fn backlog_increment(&self) -> u64 {
        let depth = self.backlog.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_backlog.fetch_max(depth, Ordering::Relaxed);
        gauge!("linerelay.queue.backlog").set(depth as f64);
        depth
    }

    /// Record a message leaving the queue and return the new backlog
    pub fn backlog_decrement(&self) -> u64 {
        let depth = self.backlog.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
        gauge!("linerelay.queue.backlog").set(depth as f64);
        depth
    }

    /// Get the current queue backlog
    pub fn backlog(&self) -> u64 {
        self.backlog.load(Ordering::Acquire)
    }

    // Error tracking

    /// Record a failed accept
    pub fn accept_error(&self) {
        self.accept_errors.fetch_add(1, Ordering::Relaxed);
        counter!("linerelay.errors.accept").increment(1);
    }

    /// Record a worker that could not be started
    pub fn spawn_error(&self) {
        self.spawn_errors.fetch_add(1, Ordering::Relaxed);
        counter!("linerelay.errors.spawn").increment(1);
    }

    /// Record a per-connection I/O failure
    pub fn connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
        counter!("linerelay.errors.connection").increment(1);
    }

    // Lifecycle

    /// Record an operator-approved restart
    pub fn restarted(&self) {
        self.restarts.fetch_add(1, Ordering::Relaxed);
        counter!("linerelay.server.restarts").increment(1);
    }

    // Snapshot

    /// Get a snapshot of all metrics
    ///
    /// Values are loaded one at a time, so the snapshot may be slightly
    /// inconsistent while workers are running.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            chunks_relayed: self.chunks_relayed.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            messages_consumed: self.messages_consumed.load(Ordering::Relaxed),
            backlog: self.backlog.load(Ordering::Relaxed),
            peak_backlog: self.peak_backlog.load(Ordering::Relaxed),
            accept_errors: self.accept_errors.load(Ordering::Relaxed),
            spawn_errors: self.spawn_errors.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            restarts: self.restarts.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
            avg_connection_duration: self.average_connection_duration(),
        }
    }

    fn average_connection_duration(&self) -> Duration {
        let closed = self.closed_connections.load(Ordering::Relaxed);
        if closed == 0 {
            return Duration::ZERO;
        }
        let total_ns = self.total_connection_duration_ns.load(Ordering::Relaxed);
        Duration::from_nanos(total_ns / closed)
    }
}

/// A snapshot of relay metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Total connections accepted
    pub total_connections: u64,
    /// Connections with a live worker
    pub active_connections: u64,
    /// Chunks handed to the relay queue
    pub chunks_relayed: u64,
    /// Bytes read from all connections
    pub bytes_received: u64,
    /// Messages processed by the consumer
    pub messages_consumed: u64,
    /// Messages queued or waiting to be queued
    pub backlog: u64,
    /// Highest backlog observed
    pub peak_backlog: u64,
    /// Failed accepts
    pub accept_errors: u64,
    /// Workers that could not be started
    pub spawn_errors: u64,
    /// Per-connection I/O failures
    pub connection_errors: u64,
    /// Operator-approved restarts
    pub restarts: u64,
    /// Time since metrics creation
    pub uptime: Duration,
    /// Average lifetime of closed connections
    pub avg_connection_duration: Duration,
}

impl MetricsSnapshot {
    /// Calculate messages consumed per second
    pub fn messages_per_sec(&self) -> f64 {
        if self.uptime.is_zero() {
            return 0.0;
        }
        self.messages_consumed as f64 / self.uptime.as_secs_f64()
    }

    /// Calculate bytes received per second
    pub fn bytes_received_per_sec(&self) -> f64 {
        if self.uptime.is_zero() {
            return 0.0;
        }
        self.bytes_received as f64 / self.uptime.as_secs_f64()
    }

    /// Calculate total error count
    pub fn total_errors(&self) -> u64 {
        self.accept_errors + self.spawn_errors + self.connection_errors
    }
}
