// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publish/subscribe sockets.
//!
//! Messages are two frames: a label and a payload. Subscribers connect with a
//! list of label prefixes; the publishing side forwards only matching messages.
//!
//! # Subscription handshake
//!
//! ```text
//! subscriber                          publisher
//!     | -- ["DIR", ...] (JSON) -------> |   attach to fan-out
//!     | <------------------------ OK -- |
//!     | <---------- label, payload ---- |   every matching send after OK
//! ```
//!
//! Fan-out uses `tokio::sync::broadcast`: `send` never blocks, and a subscriber
//! that falls more than the buffer capacity behind loses the overflow.

use super::frame::{expect_frame, read_frame, write_frame};
use super::{Endpoint, TransportError};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

const SUBSCRIBE_ACK: &[u8] = b"OK";

#[derive(Debug)]
struct Outgoing {
    label: String,
    payload: Vec<u8>,
}

/// Publishing side of a one-to-many channel.
pub struct PublishSocket {
    local_addr: SocketAddr,
    tx: broadcast::Sender<Arc<Outgoing>>,
    accept_task: JoinHandle<()>,
}

impl PublishSocket {
    /// Bind and start accepting subscribers.
    ///
    /// `capacity` bounds how many messages a slow subscriber may lag behind.
    pub async fn bind(
        endpoint: &Endpoint,
        capacity: usize,
        max_frame_size: usize,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(endpoint.bind_addr()).await?;
        let local_addr = listener.local_addr()?;
        let (tx, _) = broadcast::channel(capacity.max(1));

        let accept_task = tokio::spawn(accept_loop(listener, tx.clone(), max_frame_size));

        Ok(Self {
            local_addr,
            tx,
            accept_task,
        })
    }

    /// Bound address (useful when binding port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Queue a message for every attached subscriber.
    ///
    /// Never blocks. Returns the number of subscribers the message was handed
    /// to before label filtering.
    pub fn send(&self, label: &str, payload: Vec<u8>) -> usize {
        let msg = Arc::new(Outgoing {
            label: label.to_string(),
            payload,
        });
        self.tx.send(msg).unwrap_or(0)
    }

    /// Number of attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Stop accepting and drop every subscriber connection.
    pub fn close(&self) {
        self.accept_task.abort();
    }
}

impl Drop for PublishSocket {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn accept_loop(
    listener: TcpListener,
    tx: broadcast::Sender<Arc<Outgoing>>,
    max_frame_size: usize,
) {
    let mut subscribers = JoinSet::new();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        debug!("Subscriber connected: {}", peer);
                        // attach before the handshake so nothing sent after the ack is missed
                        let rx = tx.subscribe();
                        subscribers.spawn(async move {
                            if let Err(e) = serve_subscriber(stream, rx, max_frame_size).await {
                                debug!("Subscriber {} dropped: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => {
                        warn!("Accept error: {}", e);
                    }
                }
            }
            Some(_) = subscribers.join_next(), if !subscribers.is_empty() => {}
        }
    }
}

async fn serve_subscriber(
    stream: TcpStream,
    mut rx: broadcast::Receiver<Arc<Outgoing>>,
    max_frame_size: usize,
) -> Result<(), TransportError> {
    stream.set_nodelay(true)?;
    let (mut reader, mut writer) = stream.into_split();

    let handshake = expect_frame(&mut reader, max_frame_size).await?;
    let prefixes: Vec<String> = serde_json::from_slice(&handshake)
        .map_err(|e| TransportError::Handshake(e.to_string()))?;

    write_frame(&mut writer, SUBSCRIBE_ACK, max_frame_size).await?;
    writer.flush().await?;

    loop {
        tokio::select! {
            msg = rx.recv() => {
                match msg {
                    Ok(msg) => {
                        if prefixes.iter().any(|p| msg.label.starts_with(p.as_str())) {
                            forward(&mut writer, &msg, max_frame_size).await?;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Subscriber lagging, {} message(s) dropped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return Ok(()),
                }
            }
            // subscribers send nothing after the handshake; this only detects hang-up
            frame = read_frame(&mut reader, max_frame_size) => {
                match frame {
                    Ok(Some(_)) => {}
                    Ok(None) => return Ok(()),
                    Err(e) => return Err(e),
                }
            }
        }
    }
}

async fn forward(
    writer: &mut OwnedWriteHalf,
    msg: &Outgoing,
    max_frame_size: usize,
) -> Result<(), TransportError> {
    write_frame(writer, msg.label.as_bytes(), max_frame_size).await?;
    write_frame(writer, &msg.payload, max_frame_size).await?;
    writer.flush().await?;
    Ok(())
}

/// Subscribing side of a one-to-many channel.
pub struct SubscribeSocket {
    stream: TcpStream,
    max_frame_size: usize,
}

impl SubscribeSocket {
    /// Connect and subscribe to every label starting with one of `prefixes`.
    ///
    /// Returns once the publisher acknowledged the subscription; every message
    /// it sends from then on is delivered.
    pub async fn connect(
        endpoint: &Endpoint,
        prefixes: &[String],
        max_frame_size: usize,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let handshake = async {
            let mut stream = TcpStream::connect(endpoint.connect_addr()).await?;
            stream.set_nodelay(true)?;

            let request = serde_json::to_vec(prefixes)
                .map_err(|e| TransportError::Handshake(e.to_string()))?;
            write_frame(&mut stream, &request, max_frame_size).await?;
            stream.flush().await?;

            let ack = expect_frame(&mut stream, max_frame_size).await?;
            if ack != SUBSCRIBE_ACK {
                return Err(TransportError::Handshake(
                    String::from_utf8_lossy(&ack).into_owned(),
                ));
            }
            Ok(stream)
        };

        let stream = tokio::time::timeout(timeout, handshake)
            .await
            .map_err(|_| TransportError::Timeout)??;

        Ok(Self {
            stream,
            max_frame_size,
        })
    }

    /// Receive the next frame.
    pub async fn recv_frame(&mut self) -> Result<Vec<u8>, TransportError> {
        expect_frame(&mut self.stream, self.max_frame_size).await
    }

    /// Receive the next (label, payload) message.
    pub async fn recv(&mut self) -> Result<(String, Vec<u8>), TransportError> {
        let label = self.recv_frame().await?;
        let payload = self.recv_frame().await?;
        Ok((String::from_utf8_lossy(&label).into_owned(), payload))
    }
}
