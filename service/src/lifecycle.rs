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


//! Lifecycle control: restart decisions, shutdown signalling and state
//! observation for the relay server.

use crate::{LifecycleState, RelayError};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// What to do after a server instance failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    /// Bind the same port again
    Restart,
    /// Shut the server down
    Stop,
}

/// Decides whether a failed server instance is restarted
///
/// The lifecycle manager consults the policy after every listener-fatal
/// error. Interactive front ends implement this by asking the operator.
#[async_trait]
pub trait RestartPolicy: Send {
    /// Decide what happens after `error` ended the current instance
    async fn decide(&mut self, error: &RelayError) -> RestartDecision;
}

#[async_trait]
impl<P: RestartPolicy + ?Sized> RestartPolicy for Box<P> {
    async fn decide(&mut self, error: &RelayError) -> RestartDecision {
        (**self).decide(error).await
    }
}

/// Never restarts
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRestart;

#[async_trait]
impl RestartPolicy for NeverRestart {
    async fn decide(&mut self, _error: &RelayError) -> RestartDecision {
        RestartDecision::Stop
    }
}

/// Restarts up to a fixed number of times, then stops
#[derive(Debug, Clone, Copy)]
pub struct RestartLimit {
    remaining: u32,
}

impl RestartLimit {
    /// Allow at most `restarts` restarts
    pub fn new(restarts: u32) -> Self {
        Self {
            remaining: restarts,
        }
    }
}

#[async_trait]
impl RestartPolicy for RestartLimit {
    async fn decide(&mut self, _error: &RelayError) -> RestartDecision {
        if self.remaining == 0 {
            return RestartDecision::Stop;
        }
        self.remaining -= 1;
        RestartDecision::Restart
    }
}

/// Closure-based restart policy
pub struct FnPolicy<F>(pub F);

#[async_trait]
impl<F> RestartPolicy for FnPolicy<F>
where
    F: FnMut(&RelayError) -> RestartDecision + Send,
{
    async fn decide(&mut self, error: &RelayError) -> RestartDecision {
        (self.0)(error)
    }
}

/// Requests a graceful shutdown of a running server
///
/// Cloneable; any clone may trigger the shutdown, and triggering it more
/// than once has no further effect.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    token: CancellationToken,
}

impl ShutdownHandle {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Stop accepting, join all workers, drain the queue and stop
    pub fn shutdown(&self) {
        if !self.token.is_cancelled() {
            info!("Shutdown requested");
        }
        self.token.cancel();
    }

    /// Check whether shutdown has been requested
    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until shutdown has been requested
    pub async fn requested(&self) {
        self.token.cancelled().await
    }
}

/// Shared lifecycle state, written by the lifecycle manager only
#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: watch::Sender<LifecycleState>,
    tracked: AtomicUsize,
    local_addr: RwLock<Option<SocketAddr>>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: watch::Sender::new(LifecycleState::Stopped),
            tracked: AtomicUsize::new(0),
            local_addr: RwLock::new(None),
        }
    }

    pub(crate) fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub(crate) fn transition(&self, next: LifecycleState) {
        let previous = self.state.send_replace(next);
        if !previous.can_transition_to(next) {
            warn!(%previous, %next, "Unexpected lifecycle transition");
        }
        info!(%previous, %next, "Lifecycle state changed");
    }

    pub(crate) fn set_local_addr(&self, addr: Option<SocketAddr>) {
        *self.local_addr.write().unwrap_or_else(|e| e.into_inner()) = addr;
    }

    pub(crate) fn set_tracked(&self, tracked: usize) {
        self.tracked.store(tracked, Ordering::Release);
    }
}

/// Read-only view of the server lifecycle
#[derive(Debug, Clone)]
pub struct LifecycleWatch {
    inner: Arc<Lifecycle>,
}

impl LifecycleWatch {
    pub(crate) fn new(inner: Arc<Lifecycle>) -> Self {
        Self { inner }
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        self.inner.state()
    }

    /// Number of workers the current instance's registry tracks
    pub fn tracked_connections(&self) -> usize {
        self.inner.tracked.load(Ordering::Acquire)
    }

    /// Address of the listening socket while one is held
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self
            .inner
            .local_addr
            .read()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.inner.state.subscribe()
    }

    /// Wait until the server reaches `state`
    pub async fn wait_for(&self, state: LifecycleState) {
        let mut rx = self.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|current| *current == state).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::time::Duration;

    fn error() -> RelayError {
        RelayError::Listen {
            addr: "0.0.0.0:1".parse().unwrap(),
            source: io::Error::from(io::ErrorKind::Other),
        }
    }

    #[tokio::test]
    async fn test_restart_limit() {
        let mut policy = RestartLimit::new(2);
        assert_eq!(policy.decide(&error()).await, RestartDecision::Restart);
        assert_eq!(policy.decide(&error()).await, RestartDecision::Restart);
        assert_eq!(policy.decide(&error()).await, RestartDecision::Stop);
        assert_eq!(NeverRestart.decide(&error()).await, RestartDecision::Stop);
    }

    #[tokio::test]
    async fn test_fn_policy_sees_error() {
        let mut policy = FnPolicy(|e: &RelayError| {
            if e.is_listener_fatal() {
                RestartDecision::Restart
            } else {
                RestartDecision::Stop
            }
        });
        assert_eq!(policy.decide(&error()).await, RestartDecision::Restart);
        assert_eq!(
            policy.decide(&RelayError::QueueClosed).await,
            RestartDecision::Stop
        );
    }

    #[tokio::test]
    async fn test_shutdown_handle_is_idempotent() {
        let handle = ShutdownHandle::new(CancellationToken::new());
        let other = handle.clone();
        assert!(!handle.is_shutdown());

        other.shutdown();
        other.shutdown();
        assert!(handle.is_shutdown());
        tokio::time::timeout(Duration::from_secs(1), handle.requested())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_lifecycle_watch() {
        let lifecycle = Arc::new(Lifecycle::new());
        let watch = LifecycleWatch::new(lifecycle.clone());
        assert_eq!(watch.state(), LifecycleState::Stopped);

        let waiter = {
            let watch = watch.clone();
            tokio::spawn(async move { watch.wait_for(LifecycleState::Listening).await })
        };
        lifecycle.transition(LifecycleState::Binding);
        lifecycle.transition(LifecycleState::Listening);
        lifecycle.set_tracked(4);
        lifecycle.set_local_addr(Some("127.0.0.1:4000".parse().unwrap()));

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(watch.state(), LifecycleState::Listening);
        assert_eq!(watch.tracked_connections(), 4);
        assert_eq!(watch.local_addr().map(|a| a.port()), Some(4000));
    }
}
