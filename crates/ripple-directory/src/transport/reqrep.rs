// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Request/reply sockets.
//!
//! The reply side accepts any number of peers and funnels their requests into a
//! single queue. A peer's next frame is not read before the reply to its
//! previous one has been written, so each connection strictly alternates.

use super::frame::{expect_frame, read_frame, write_frame};
use super::{Endpoint, TransportError};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

const REQUEST_QUEUE_DEPTH: usize = 64;

/// An incoming request waiting for its reply.
pub struct Request {
    peer: SocketAddr,
    payload: Vec<u8>,
    reply_tx: oneshot::Sender<Vec<u8>>,
}

impl Request {
    /// Raw request bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Peer that sent this request.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Send the reply. Returns false if the peer is gone.
    pub fn reply(self, payload: Vec<u8>) -> bool {
        self.reply_tx.send(payload).is_ok()
    }
}

/// Server side of the request/reply discipline.
pub struct ReplySocket {
    local_addr: SocketAddr,
    incoming: mpsc::Receiver<Request>,
    accept_task: JoinHandle<()>,
}

impl ReplySocket {
    /// Bind and start accepting peers.
    pub async fn bind(endpoint: &Endpoint, max_frame_size: usize) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(endpoint.bind_addr()).await?;
        let local_addr = listener.local_addr()?;
        let (tx, incoming) = mpsc::channel(REQUEST_QUEUE_DEPTH);

        let accept_task = tokio::spawn(accept_loop(listener, tx, max_frame_size));

        Ok(Self {
            local_addr,
            incoming,
            accept_task,
        })
    }

    /// Bound address (useful when binding port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the next request from any peer.
    ///
    /// Returns `None` once the socket is closed.
    pub async fn recv(&mut self) -> Option<Request> {
        self.incoming.recv().await
    }

    /// Stop accepting and drop every peer connection.
    pub fn close(&mut self) {
        self.accept_task.abort();
        self.incoming.close();
    }
}

impl Drop for ReplySocket {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn accept_loop(listener: TcpListener, tx: mpsc::Sender<Request>, max_frame_size: usize) {
    // dropping the set aborts every peer task
    let mut peers = JoinSet::new();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        debug!("Request peer connected: {}", peer);
                        peers.spawn(serve_peer(stream, peer, tx.clone(), max_frame_size));
                    }
                    Err(e) => {
                        warn!("Accept error: {}", e);
                    }
                }
            }
            Some(_) = peers.join_next(), if !peers.is_empty() => {}
        }
    }
}

async fn serve_peer(
    mut stream: TcpStream,
    peer: SocketAddr,
    tx: mpsc::Sender<Request>,
    max_frame_size: usize,
) {
    loop {
        let payload = match read_frame(&mut stream, max_frame_size).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                debug!("Request peer closed: {}", peer);
                break;
            }
            Err(e) => {
                warn!("Read error from {}: {}", peer, e);
                break;
            }
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let request = Request {
            peer,
            payload,
            reply_tx,
        };
        if tx.send(request).await.is_err() {
            break;
        }

        let Ok(reply) = reply_rx.await else {
            debug!("Request from {} dropped without reply", peer);
            break;
        };

        let written = async {
            write_frame(&mut stream, &reply, max_frame_size).await?;
            stream.flush().await?;
            Ok::<_, TransportError>(())
        };
        if let Err(e) = written.await {
            warn!("Failed to send reply to {}: {}", peer, e);
            break;
        }
    }
}

/// Client side of the request/reply discipline.
///
/// `request` takes `&mut self`, so only one request is ever outstanding.
pub struct RequestSocket {
    stream: TcpStream,
    endpoint: Endpoint,
    max_frame_size: usize,
    timeout: Duration,
    broken: bool,
}

impl RequestSocket {
    /// Connect to a reply socket.
    pub async fn connect(
        endpoint: &Endpoint,
        max_frame_size: usize,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(endpoint.connect_addr()))
            .await
            .map_err(|_| TransportError::Timeout)??;
        stream.set_nodelay(true)?;

        Ok(Self {
            stream,
            endpoint: endpoint.clone(),
            max_frame_size,
            timeout,
            broken: false,
        })
    }

    /// Remote endpoint.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Send one request and wait for its reply.
    ///
    /// After a timeout or I/O failure the socket refuses further requests,
    /// since a late reply would otherwise be taken for the next one.
    pub async fn request(&mut self, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        if self.broken {
            return Err(TransportError::Closed);
        }

        let max = self.max_frame_size;
        let stream = &mut self.stream;
        let exchange = async move {
            write_frame(stream, payload, max).await?;
            stream.flush().await?;
            expect_frame(stream, max).await
        };

        let result = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        };
        if result.is_err() {
            self.broken = true;
        }
        result
    }
}
