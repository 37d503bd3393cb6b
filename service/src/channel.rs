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


//! Connection channel abstraction
//!
//! The relay core never touches sockets directly. It talks to three small
//! traits that mirror the transport primitives it needs:
//!
//! ```text
//! Transport::open ──▶ ChannelListener::accept ──▶ ChannelStream::read / close
//! ```
//!
//! Every failure is returned to the caller as-is; nothing in this module
//! retries. [`TcpTransport`] is the production implementation on top of
//! tokio; tests plug in scripted implementations of the same traits.

use crate::{RelayError, Result};
use async_trait::async_trait;
use std::fmt;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tracing::{debug, instrument, trace};

/// Creates listening endpoints
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Listener produced by [`Transport::open`]
    type Listener: ChannelListener;

    /// Create a socket, bind it to `addr` and start listening
    ///
    /// Socket creation and bind failures are reported as
    /// [`RelayError::Bind`], a failing listen call as [`RelayError::Listen`].
    async fn open(&self, addr: SocketAddr, backlog: u32) -> Result<Self::Listener>;
}

/// A bound, listening endpoint
#[async_trait]
pub trait ChannelListener: Send + 'static {
    /// Stream type yielded for each accepted connection
    type Stream: ChannelStream;

    /// Wait for the next inbound connection
    ///
    /// [`RelayError::ListenerClosed`] means the listener is unusable; any
    /// other error concerns a single accept attempt.
    async fn accept(&mut self) -> Result<Self::Stream>;

    /// Address the listener is bound to
    fn local_addr(&self) -> SocketAddr;
}

/// A byte stream owned by exactly one connection worker
#[async_trait]
pub trait ChannelStream: Send + 'static {
    /// Read up to `buf.len()` bytes; `Ok(0)` signals end of stream
    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Release the connection
    async fn close(&mut self);

    /// Human readable description of the remote end
    fn peer(&self) -> String;
}

/// TCP transport backed by tokio sockets
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

#[async_trait]
impl Transport for TcpTransport {
    type Listener = TcpChannelListener;

    #[instrument(skip(self))]
    async fn open(&self, addr: SocketAddr, backlog: u32) -> Result<Self::Listener> {
        let bind_error = |source| RelayError::Bind { addr, source };

        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(bind_error)?;

        // Allows rebinding the same port while old connections sit in TIME_WAIT.
        socket.set_reuseaddr(true).map_err(bind_error)?;
        socket.bind(addr).map_err(bind_error)?;

        let listener = socket
            .listen(backlog)
            .map_err(|source| RelayError::Listen { addr, source })?;
        let local_addr = listener.local_addr()?;

        debug!(%local_addr, backlog, "TCP listener ready");

        Ok(TcpChannelListener {
            listener,
            local_addr,
        })
    }
}

/// Listening TCP socket
#[derive(Debug)]
pub struct TcpChannelListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

#[async_trait]
impl ChannelListener for TcpChannelListener {
    type Stream = StreamChannel<TcpStream>;

    async fn accept(&mut self) -> Result<Self::Stream> {
        let (socket, peer_addr) = self.listener.accept().await.map_err(RelayError::Accept)?;
        trace!(%peer_addr, "TCP connection accepted");
        Ok(StreamChannel::new(socket, peer_addr.to_string()))
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// [`ChannelStream`] over any tokio byte stream
///
/// Closing shuts down the write half; the stream itself is released when
/// the channel is dropped.
pub struct StreamChannel<S> {
    stream: S,
    peer: String,
    closed: bool,
}

impl<S> StreamChannel<S> {
    /// Wrap a stream, labelling it with its remote end
    pub fn new(stream: S, peer: impl Into<String>) -> Self {
        Self {
            stream,
            peer: peer.into(),
            closed: false,
        }
    }

    /// Check whether [`ChannelStream::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[async_trait]
impl<S> ChannelStream for StreamChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stream.read(buf).await
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.stream.shutdown().await {
            trace!(peer = %self.peer, error = %e, "Shutdown on close failed");
        }
    }

    fn peer(&self) -> String {
        self.peer.clone()
    }
}

impl<S> fmt::Debug for StreamChannel<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamChannel")
            .field("peer", &self.peer)
            .field("closed", &self.closed)
            .finish()
    }
}
