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


//! Connection registry
//!
//! Maps each live connection to the handle of its worker task so the
//! listener can join every worker before it lets go of the listening socket.
//!
//! The registry is owned by value by the accept loop and every method takes
//! `&mut self` or `self`: the accept loop is the only writer and the only
//! reader, so there is no lock. Workers never see the registry and never
//! remove themselves from it.

use crate::{ConnectionId, RelayError, Result, WorkerOutcome};
use futures_util::future::join_all;
use std::collections::HashMap;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Worker handles keyed by connection
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    workers: HashMap<ConnectionId, JoinHandle<WorkerOutcome>>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Track the worker for `id`
    ///
    /// Connection ids are never reused, so an existing entry indicates a bug
    /// in the caller; the older handle is kept and the new one is returned.
    pub fn insert(
        &mut self,
        id: ConnectionId,
        handle: JoinHandle<WorkerOutcome>,
    ) -> std::result::Result<(), JoinHandle<WorkerOutcome>> {
        if self.workers.contains_key(&id) {
            return Err(handle);
        }
        self.workers.insert(id, handle);
        Ok(())
    }

    /// Number of tracked workers, finished or not
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Check if no workers are tracked
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Check whether `id` is tracked
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.workers.contains_key(&id)
    }

    /// Tracked connection ids in ascending order
    pub fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.workers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Join the workers that have already exited and stop tracking them
    ///
    /// Never waits on a worker that is still running.
    pub async fn reap_finished(&mut self) -> Vec<Result<WorkerOutcome>> {
        let finished: Vec<_> = self
            .workers
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(id, _)| *id)
            .collect();

        let mut outcomes = Vec::with_capacity(finished.len());
        for id in finished {
            if let Some(handle) = self.workers.remove(&id) {
                outcomes.push(join_worker(id, handle).await);
            }
        }
        if !outcomes.is_empty() {
            debug!(reaped = outcomes.len(), remaining = self.len(), "Reaped finished workers");
        }
        outcomes
    }

    /// Wait for every tracked worker to exit
    ///
    /// Consumes the registry; one result is returned per tracked worker.
    pub async fn join_all(self) -> Vec<Result<WorkerOutcome>> {
        let joins = self
            .workers
            .into_iter()
            .map(|(id, handle)| join_worker(id, handle));
        join_all(joins).await
    }
}

async fn join_worker(id: ConnectionId, handle: JoinHandle<WorkerOutcome>) -> Result<WorkerOutcome> {
    handle.await.map_err(|e| {
        error!(connection_id = %id, error = %e, "Failed to join thread.");
        RelayError::Join(format!("connection {id}: {e}"))
    })
}
