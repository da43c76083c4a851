// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Observer client.
//!
//! Keeps a local copy of the directory: one synchronous MAP_REQUEST on connect,
//! then every snapshot pushed on the broadcast endpoint.
//!
//! The broadcast subscription is acknowledged before the MAP_REQUEST is sent,
//! so a mutation racing the connect is seen at least once. Pushed snapshots
//! whose generation is not newer than the held one are ignored.

use crate::client::DirectoryClient;
use crate::config::ClientConfig;
use crate::error::{Result, RippleError};
use crate::protocol::{decode_snapshot, ProtocolError, DIRECTORY_LABEL};
use crate::registry::DirectorySnapshot;
use crate::transport::SubscribeSocket;
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Receives every reconciled snapshot.
pub trait DirectorySink: Send + Sync + 'static {
    fn on_snapshot(&self, snapshot: &DirectorySnapshot);
}

impl<F> DirectorySink for F
where
    F: Fn(&DirectorySnapshot) + Send + Sync + 'static,
{
    fn on_snapshot(&self, snapshot: &DirectorySnapshot) {
        self(snapshot)
    }
}

struct Connection {
    client: DirectoryClient,
    snapshot_rx: watch::Receiver<DirectorySnapshot>,
    cancel: Arc<Notify>,
    listener: JoinHandle<()>,
}

/// Observer client.
pub struct Observer {
    config: ClientConfig,
    sink: Arc<dyn DirectorySink>,
    connection: Option<Connection>,
}

impl Observer {
    pub fn new(config: ClientConfig, sink: impl DirectorySink) -> Self {
        Self {
            config,
            sink: Arc::new(sink),
            connection: None,
        }
    }

    /// Fetch the current snapshot, hand it to the sink and start listening.
    pub async fn connect(&mut self) -> Result<()> {
        if self.connection.is_some() {
            return Err(RippleError::AlreadyConnected);
        }
        self.config.validate()?;

        let subscription = SubscribeSocket::connect(
            &self.config.broadcast_endpoint(),
            &[DIRECTORY_LABEL.to_string()],
            self.config.max_message_size,
            self.config.request_timeout(),
        )
        .await?;

        let mut client = DirectoryClient::connect(&self.config).await?;
        let snapshot = client.map().await?;
        info!(
            "Observer connected to {} (generation {}, {} publishers)",
            self.config.command_endpoint(),
            snapshot.generation,
            snapshot.len()
        );
        self.sink.on_snapshot(&snapshot);

        let (snapshot_tx, snapshot_rx) = watch::channel(snapshot);
        let cancel = Arc::new(Notify::new());
        let listener = tokio::spawn(listen(
            subscription,
            snapshot_tx,
            self.sink.clone(),
            cancel.clone(),
        ));

        self.connection = Some(Connection {
            client,
            snapshot_rx,
            cancel,
            listener,
        });
        Ok(())
    }

    /// Stop the listener, wait for it to exit and close both channels.
    pub async fn disconnect(&mut self) -> Result<()> {
        let connection = self.connection.take().ok_or(RippleError::NotConnected)?;

        connection.cancel.notify_one();
        if let Err(e) = connection.listener.await {
            warn!("Observer listener ended abnormally: {}", e);
        }
        drop(connection.client);

        info!("Observer disconnected");
        Ok(())
    }

    /// Latest reconciled snapshot while connected.
    pub fn snapshot(&self) -> Option<DirectorySnapshot> {
        self.connection
            .as_ref()
            .map(|c| c.snapshot_rx.borrow().clone())
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Whether the background listener is still running.
    ///
    /// It stops on its own when the broadcast connection is lost or a foreign
    /// label arrives.
    pub fn is_listening(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|c| !c.listener.is_finished())
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        if let Some(connection) = &self.connection {
            connection.listener.abort();
        }
    }
}

async fn recv_snapshot(socket: &mut SubscribeSocket) -> Result<DirectorySnapshot> {
    let label = socket.recv_frame().await?;
    if label != DIRECTORY_LABEL.as_bytes() {
        let label = String::from_utf8_lossy(&label).into_owned();
        return Err(ProtocolError::UnexpectedLabel(label).into());
    }
    let payload = socket.recv_frame().await?;
    Ok(decode_snapshot(&payload)?)
}

async fn listen(
    mut socket: SubscribeSocket,
    snapshot_tx: watch::Sender<DirectorySnapshot>,
    sink: Arc<dyn DirectorySink>,
    cancel: Arc<Notify>,
) {
    loop {
        let received = tokio::select! {
            biased;
            _ = cancel.notified() => break,
            received = recv_snapshot(&mut socket) => received,
        };

        match received {
            Ok(snapshot) => {
                let held = snapshot_tx.borrow().generation;
                if snapshot.generation <= held {
                    debug!(
                        "Ignoring stale snapshot generation {} (holding {})",
                        snapshot.generation, held
                    );
                    continue;
                }
                debug!(
                    "Snapshot generation {} ({} publishers)",
                    snapshot.generation,
                    snapshot.len()
                );
                sink.on_snapshot(&snapshot);
                snapshot_tx.send_replace(snapshot);
            }
            Err(RippleError::Protocol(ProtocolError::UnexpectedLabel(label))) => {
                warn!("Unexpected broadcast label '{}', stopping listener", label);
                break;
            }
            Err(RippleError::Protocol(e)) => {
                warn!("Dropping malformed snapshot: {}", e);
            }
            Err(e) => {
                warn!("Directory broadcast lost: {}", e);
                break;
            }
        }
    }
    debug!("Observer listener stopped");
}
