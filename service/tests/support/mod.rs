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


//! Scripted transport and collecting handler shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use linerelay_service::{
    ChannelListener, ChannelStream, ConnectionId, MessageHandler, RelayError, RelayMessage,
    Result, Transport,
};
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// What the next `Transport::open` call does
pub enum OpenPlan {
    /// Fail as if the port were taken
    FailBind,
    /// Fail after a successful bind
    FailListen,
    /// Succeed; accepts are driven by the paired [`ListenerControl`]
    Listen(mpsc::UnboundedReceiver<AcceptEvent>),
}

/// Outcome of one `ChannelListener::accept` call
pub enum AcceptEvent {
    Connection(ScriptedStream),
    Fail(io::ErrorKind),
    Close,
}

/// Feeds accept events to a scripted listener
#[derive(Clone)]
pub struct ListenerControl {
    tx: mpsc::UnboundedSender<AcceptEvent>,
}

impl ListenerControl {
    pub fn connect(&self, stream: ScriptedStream) {
        self.tx.send(AcceptEvent::Connection(stream)).ok();
    }

    pub fn fail_accept(&self) {
        self.tx
            .send(AcceptEvent::Fail(io::ErrorKind::ConnectionAborted))
            .ok();
    }

    pub fn close(&self) {
        self.tx.send(AcceptEvent::Close).ok();
    }
}

/// Create an [`OpenPlan::Listen`] and the control that drives it
pub fn listen_plan() -> (OpenPlan, ListenerControl) {
    let (tx, rx) = mpsc::unbounded_channel();
    (OpenPlan::Listen(rx), ListenerControl { tx })
}

/// Transport that follows a fixed list of plans, then refuses to bind
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    plans: Arc<Mutex<VecDeque<OpenPlan>>>,
    opened: Arc<Mutex<Vec<SocketAddr>>>,
}

impl ScriptedTransport {
    pub fn new(plans: Vec<OpenPlan>) -> Self {
        Self {
            plans: Arc::new(Mutex::new(plans.into())),
            opened: Arc::default(),
        }
    }

    /// Addresses passed to every `open` call so far
    pub fn opened(&self) -> Vec<SocketAddr> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    type Listener = ScriptedListener;

    async fn open(&self, addr: SocketAddr, _backlog: u32) -> Result<Self::Listener> {
        self.opened.lock().unwrap().push(addr);
        let plan = self.plans.lock().unwrap().pop_front();
        match plan {
            Some(OpenPlan::Listen(events)) => Ok(ScriptedListener { addr, events }),
            Some(OpenPlan::FailListen) => Err(RelayError::Listen {
                addr,
                source: io::Error::from(io::ErrorKind::InvalidInput),
            }),
            Some(OpenPlan::FailBind) | None => Err(RelayError::Bind {
                addr,
                source: io::Error::from(io::ErrorKind::AddrInUse),
            }),
        }
    }
}

pub struct ScriptedListener {
    addr: SocketAddr,
    events: mpsc::UnboundedReceiver<AcceptEvent>,
}

#[async_trait]
impl ChannelListener for ScriptedListener {
    type Stream = ScriptedStream;

    async fn accept(&mut self) -> Result<Self::Stream> {
        match self.events.recv().await {
            Some(AcceptEvent::Connection(stream)) => Ok(stream),
            Some(AcceptEvent::Fail(kind)) => Err(RelayError::Accept(io::Error::from(kind))),
            Some(AcceptEvent::Close) => Err(RelayError::ListenerClosed),
            None => std::future::pending().await,
        }
    }

    fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

/// Stream whose reads are pushed by the test through a [`StreamControl`]
///
/// Dropping the control ends the stream with EOF.
pub struct ScriptedStream {
    reads: mpsc::UnboundedReceiver<io::Result<Vec<u8>>>,
    closed: Arc<AtomicBool>,
    label: String,
}

#[derive(Clone)]
pub struct StreamControl {
    tx: mpsc::UnboundedSender<io::Result<Vec<u8>>>,
    closed: Arc<AtomicBool>,
}

impl StreamControl {
    pub fn send(&self, data: &[u8]) {
        self.tx.send(Ok(data.to_vec())).ok();
    }

    pub fn fail(&self) {
        self.tx
            .send(Err(io::Error::new(io::ErrorKind::ConnectionReset, "injected fault")))
            .ok();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub fn scripted_stream(label: &str) -> (ScriptedStream, StreamControl) {
    let (tx, rx) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));
    (
        ScriptedStream {
            reads: rx,
            closed: closed.clone(),
            label: label.to_string(),
        },
        StreamControl { tx, closed },
    )
}

#[async_trait]
impl ChannelStream for ScriptedStream {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.reads.recv().await {
            Some(Ok(data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok(n)
            }
            Some(Err(e)) => Err(e),
            None => Ok(0),
        }
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn peer(&self) -> String {
        self.label.clone()
    }
}

/// Forwards every relayed message to the test
pub struct Collector {
    tx: mpsc::UnboundedSender<(ConnectionId, Vec<u8>)>,
}

pub fn collector() -> (
    Arc<Collector>,
    mpsc::UnboundedReceiver<(ConnectionId, Vec<u8>)>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(Collector { tx }), rx)
}

#[async_trait]
impl MessageHandler for Collector {
    async fn on_message(&self, message: RelayMessage) {
        let (id, payload) = message.into_parts();
        self.tx.send((id, payload.to_vec())).ok();
    }
}

/// Receive the next relayed message or fail the test after a second
pub async fn next_message(
    rx: &mut mpsc::UnboundedReceiver<(ConnectionId, Vec<u8>)>,
) -> (ConnectionId, Vec<u8>) {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for a relayed message")
        .expect("collector closed")
}

/// Poll `condition` until it holds or two seconds pass
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
