// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed access to the directory command endpoint.

use crate::config::ClientConfig;
use crate::error::Result;
use crate::protocol::{decode_snapshot, Command, RegisterReply, StatusReply, WireValue};
use crate::registry::{DirectorySnapshot, PublisherId, PublisherRecord};
use crate::transport::RequestSocket;
use tracing::debug;

/// Request channel to the directory server.
///
/// Every call is one request followed by its reply.
pub struct DirectoryClient {
    socket: RequestSocket,
}

impl DirectoryClient {
    /// Connect to the directory command endpoint.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let socket = RequestSocket::connect(
            &config.command_endpoint(),
            config.max_message_size,
            config.request_timeout(),
        )
        .await?;
        debug!("Connected to directory at {}", socket.endpoint());
        Ok(Self { socket })
    }

    /// REGISTER a publisher record.
    pub async fn register(&mut self, record: &PublisherRecord) -> Result<RegisterReply> {
        let reply = self.exchange(&Command::Register(record.clone())).await?;
        Ok(RegisterReply::from_wire(reply)?)
    }

    /// DEREGISTER a publisher.
    pub async fn deregister(&mut self, id: PublisherId) -> Result<StatusReply> {
        let reply = self.exchange(&Command::Deregister(id)).await?;
        Ok(StatusReply::from_wire(reply)?)
    }

    /// UPDATE the topics of a publisher.
    pub async fn update_topics(
        &mut self,
        id: PublisherId,
        topics: &[String],
    ) -> Result<StatusReply> {
        let command = Command::Update {
            id,
            topics: topics.to_vec(),
        };
        let reply = self.exchange(&command).await?;
        Ok(StatusReply::from_wire(reply)?)
    }

    /// MAP_REQUEST: fetch the current snapshot.
    pub async fn map(&mut self) -> Result<DirectorySnapshot> {
        let reply = self.socket.request(&Command::MapRequest.encode()?).await?;
        Ok(decode_snapshot(&reply)?)
    }

    /// Send an arbitrary command frame and decode the reply.
    pub async fn send_frame(&mut self, frame: &[u8]) -> Result<WireValue> {
        let reply = self.socket.request(frame).await?;
        Ok(WireValue::decode(&reply)?)
    }

    async fn exchange(&mut self, command: &Command) -> Result<WireValue> {
        self.send_frame(&command.encode()?).await
    }
}
