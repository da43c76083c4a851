// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Snapshot broadcasting to observers.
//!
//! After every successful registry mutation the server pushes a full snapshot
//! under the `"DIR"` label. Delivery is fire-and-forget: observers that are not
//! connected yet simply miss it.

use super::ServerError;
use crate::protocol::{encode_snapshot, DIRECTORY_LABEL};
use crate::registry::DirectorySnapshot;
use crate::transport::{Endpoint, PublishSocket};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Broadcast statistics.
#[derive(Debug, Default)]
pub struct BroadcastStats {
    /// Snapshots pushed.
    pub snapshots_sent: AtomicU64,
    /// Payload bytes pushed.
    pub bytes_sent: AtomicU64,
    /// Snapshots that could not be encoded.
    pub encode_errors: AtomicU64,
}

/// Point-in-time copy of [`BroadcastStats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastStatsSnapshot {
    pub snapshots_sent: u64,
    pub bytes_sent: u64,
    pub encode_errors: u64,
}

impl BroadcastStats {
    pub fn snapshot(&self) -> BroadcastStatsSnapshot {
        BroadcastStatsSnapshot {
            snapshots_sent: self.snapshots_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            encode_errors: self.encode_errors.load(Ordering::Relaxed),
        }
    }
}

/// Pushes directory snapshots on the broadcast endpoint.
pub struct SnapshotBroadcaster {
    socket: PublishSocket,
    stats: Arc<BroadcastStats>,
}

impl SnapshotBroadcaster {
    /// Bind the broadcast endpoint.
    pub async fn bind(
        endpoint: &Endpoint,
        capacity: usize,
        max_message_size: usize,
    ) -> Result<Self, ServerError> {
        let socket = PublishSocket::bind(endpoint, capacity, max_message_size)
            .await
            .map_err(|e| ServerError::Bind(format!("{}: {}", endpoint, e)))?;

        Ok(Self {
            socket,
            stats: Arc::new(BroadcastStats::default()),
        })
    }

    /// Bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr()
    }

    /// Shared statistics handle.
    pub fn stats(&self) -> Arc<BroadcastStats> {
        self.stats.clone()
    }

    /// Push a snapshot to every connected observer.
    ///
    /// Returns the number of observers it was handed to.
    pub fn publish(&self, snapshot: &DirectorySnapshot) -> Result<usize, ServerError> {
        let payload = encode_snapshot(snapshot).map_err(|e| {
            self.stats.encode_errors.fetch_add(1, Ordering::Relaxed);
            ServerError::from(e)
        })?;
        let len = payload.len() as u64;

        let observers = self.socket.send(DIRECTORY_LABEL, payload);
        self.stats.snapshots_sent.fetch_add(1, Ordering::Relaxed);
        self.stats.bytes_sent.fetch_add(len, Ordering::Relaxed);

        debug!(
            "Broadcast snapshot generation {} ({} publishers) to {} observer(s)",
            snapshot.generation,
            snapshot.len(),
            observers
        );
        Ok(observers)
    }

    /// Number of connected observers.
    pub fn observer_count(&self) -> usize {
        self.socket.subscriber_count()
    }

    /// Stop accepting observers and drop existing ones.
    pub fn close(&self) {
        self.socket.close();
    }
}
