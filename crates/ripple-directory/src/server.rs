// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Directory server core implementation.
//!
//! One processing loop owns the [`Registry`] exclusively. Each iteration takes
//! one request, dispatches it, replies, and broadcasts a fresh snapshot if the
//! registry changed:
//!
//! ```text
//!  awaiting command -> dispatch -> reply -> (mutated?) broadcast -> awaiting command
//! ```

use crate::config::ServerConfig;
use crate::protocol::{
    header, Command, ErrorCode, ProtocolError, RegisterReply, StatusReply, WireValue,
};
use crate::registry::{DirectorySnapshot, Registry, RegistryError};
use crate::transport::{ReplySocket, Request};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub mod broadcast;

pub use broadcast::{BroadcastStats, BroadcastStatsSnapshot, SnapshotBroadcaster};

/// Running directory server.
pub struct DirectoryServer {
    command_addr: SocketAddr,
    broadcast_addr: SocketAddr,
    snapshot_rx: watch::Receiver<DirectorySnapshot>,
    stats: Arc<BroadcastStats>,
    shutdown: Arc<Notify>,
    loop_task: Option<JoinHandle<()>>,
}

impl DirectoryServer {
    /// Bind both endpoints and launch the processing loop.
    pub async fn start(config: ServerConfig) -> Result<Self, ServerError> {
        config
            .validate()
            .map_err(|e| ServerError::Config(e.to_string()))?;

        let command_endpoint = config.command_endpoint();
        let socket = ReplySocket::bind(&command_endpoint, config.max_message_size)
            .await
            .map_err(|e| ServerError::Bind(format!("{}: {}", command_endpoint, e)))?;

        let broadcaster = SnapshotBroadcaster::bind(
            &config.broadcast_endpoint(),
            config.broadcast_capacity,
            config.max_message_size,
        )
        .await?;

        let command_addr = socket.local_addr();
        let broadcast_addr = broadcaster.local_addr();
        let stats = broadcaster.stats();
        let shutdown = Arc::new(Notify::new());
        let (snapshot_tx, snapshot_rx) = watch::channel(DirectorySnapshot::default());

        let processor = CommandProcessor {
            registry: Registry::new(),
            socket,
            broadcaster,
            snapshot_tx,
        };
        let loop_task = tokio::spawn(processor.run(shutdown.clone()));

        info!(
            "Directory server listening: commands on {}, snapshots on {}",
            command_addr, broadcast_addr
        );

        Ok(Self {
            command_addr,
            broadcast_addr,
            snapshot_rx,
            stats,
            shutdown,
            loop_task: Some(loop_task),
        })
    }

    /// Bound command address.
    pub fn command_addr(&self) -> SocketAddr {
        self.command_addr
    }

    /// Bound broadcast address.
    pub fn broadcast_addr(&self) -> SocketAddr {
        self.broadcast_addr
    }

    /// Snapshot after the last processed command.
    pub fn snapshot(&self) -> DirectorySnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Number of registered publishers.
    pub fn publisher_count(&self) -> usize {
        self.snapshot_rx.borrow().len()
    }

    /// Broadcast statistics.
    pub fn broadcast_stats(&self) -> BroadcastStatsSnapshot {
        self.stats.snapshot()
    }

    /// Check if the processing loop is still running.
    pub fn is_running(&self) -> bool {
        self.loop_task
            .as_ref()
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }

    /// Stop the server.
    ///
    /// The loop finishes the command in hand, closes both endpoints and exits;
    /// this waits for it.
    pub async fn stop(&mut self) {
        let Some(task) = self.loop_task.take() else {
            return;
        };
        self.shutdown.notify_one();
        if let Err(e) = task.await {
            error!("Directory processing loop failed: {}", e);
        }
        info!("Directory server stopped");
    }
}

impl Drop for DirectoryServer {
    fn drop(&mut self) {
        if let Some(task) = self.loop_task.take() {
            task.abort();
        }
    }
}

/// Owner of the registry; runs on its own task.
struct CommandProcessor {
    registry: Registry,
    socket: ReplySocket,
    broadcaster: SnapshotBroadcaster,
    snapshot_tx: watch::Sender<DirectorySnapshot>,
}

impl CommandProcessor {
    async fn run(mut self, shutdown: Arc<Notify>) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.notified() => {
                    debug!("Processing loop shutting down");
                    break;
                }
                request = self.socket.recv() => match request {
                    Some(request) => self.handle(request),
                    None => break,
                },
            }
        }

        self.socket.close();
        self.broadcaster.close();
    }

    fn handle(&mut self, request: Request) {
        let peer = request.peer();
        let (reply, mutated) = self.dispatch(request.payload());

        match reply.encode() {
            Ok(bytes) => {
                if !request.reply(bytes) {
                    debug!("Peer {} left before its reply", peer);
                }
            }
            Err(e) => error!("Failed to encode reply for {}: {}", peer, e),
        }

        if mutated {
            let snapshot = self.registry.snapshot();
            if let Err(e) = self.broadcaster.publish(&snapshot) {
                warn!("Snapshot broadcast failed: {}", e);
            }
            self.snapshot_tx.send_replace(snapshot);
        }
    }

    /// Apply one command frame. Returns the reply and whether the registry changed.
    fn dispatch(&mut self, frame: &[u8]) -> (WireValue, bool) {
        let command = match Command::decode(frame) {
            Ok(command) => command,
            Err(e) => {
                warn!("Rejecting command: {}", e);
                return (malformed_reply(frame.first().copied(), &e), false);
            }
        };

        match command {
            Command::Register(record) => {
                let address = record.address.clone();
                match self.registry.register(record) {
                    Ok(id) => {
                        info!("Registered publisher {} at {}", id, address);
                        (RegisterReply::Registered(id).to_wire(), true)
                    }
                    Err(e) => {
                        info!("Registration of {} refused: {}", address, e);
                        (RegisterReply::Failed(error_code(&e)).to_wire(), false)
                    }
                }
            }
            Command::Deregister(id) => match self.registry.deregister(id) {
                Ok(record) => {
                    info!("Deregistered publisher {} at {}", id, record.address);
                    (StatusReply::Ok.to_wire(), true)
                }
                Err(e) => {
                    info!("Deregistration refused: {}", e);
                    (StatusReply::Failed(error_code(&e)).to_wire(), false)
                }
            },
            Command::Update { id, topics } => match self.registry.update_topics(id, topics) {
                Ok(()) => {
                    debug!("Updated topics of publisher {}", id);
                    (StatusReply::Ok.to_wire(), true)
                }
                Err(e) => {
                    info!("Update refused: {}", e);
                    (StatusReply::Failed(error_code(&e)).to_wire(), false)
                }
            },
            Command::MapRequest => {
                debug!("Map requested ({} publishers)", self.registry.len());
                (WireValue::Directory(self.registry.snapshot()), false)
            }
        }
    }
}

fn error_code(e: &RegistryError) -> ErrorCode {
    match e {
        RegistryError::AddressAlreadyRegistered(_) => ErrorCode::AddressAlreadyRegistered,
        RegistryError::AddressParseError(_) => ErrorCode::AddressParseError,
        RegistryError::IdNotFound(_) => ErrorCode::IdNotFound,
        RegistryError::UpdateFailed(_) => ErrorCode::UpdateFailed,
        RegistryError::IdSpaceExhausted => ErrorCode::IdSpaceExhausted,
    }
}

/// Reply to a frame that could not be decoded, in the shape its command expects.
fn malformed_reply(header_byte: Option<u8>, e: &ProtocolError) -> WireValue {
    match (header_byte, e) {
        (None, _) => StatusReply::Failed(ErrorCode::MalformedCommand).to_wire(),
        (_, ProtocolError::UnknownCommand(_)) => {
            StatusReply::Failed(ErrorCode::UnknownCommand).to_wire()
        }
        (Some(header::REGISTER), _) => {
            RegisterReply::Failed(ErrorCode::AddressParseError).to_wire()
        }
        (Some(header::DEREGISTER), _) => StatusReply::Failed(ErrorCode::IdNotFound).to_wire(),
        (Some(header::UPDATE), _) => StatusReply::Failed(ErrorCode::UpdateFailed).to_wire(),
        (Some(_), _) => StatusReply::Failed(ErrorCode::MalformedCommand).to_wire(),
    }
}

/// Server error types.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bind error: {0}")]
    Bind(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<ProtocolError> for ServerError {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e.to_string())
    }
}
