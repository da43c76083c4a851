// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Data-plane subscriber.
//!
//! Connects straight to a publisher's advertised address, typically taken from
//! a directory snapshot.

use crate::config::ClientConfig;
use crate::error::{Result, RippleError};
use crate::protocol::WireValue;
use crate::registry::PublisherRecord;
use crate::transport::{Endpoint, SubscribeSocket};
use tracing::{debug, info};

/// Subscription to some of one publisher's topics.
pub struct Subscriber {
    socket: SubscribeSocket,
    publisher: PublisherRecord,
    topics: Vec<String>,
}

impl Subscriber {
    /// Subscribe to `topics` of `publisher`.
    ///
    /// Every topic must be declared in the publisher's record.
    pub async fn connect(
        config: &ClientConfig,
        publisher: &PublisherRecord,
        topics: &[String],
    ) -> Result<Self> {
        if topics.is_empty() {
            return Err(RippleError::InvalidArgument("no topics to subscribe to"));
        }
        for topic in topics {
            if topic.is_empty() {
                return Err(RippleError::InvalidArgument("topic cannot be empty"));
            }
            if !publisher.has_topic(topic) {
                return Err(RippleError::TopicNotRegistered(topic.clone()));
            }
        }

        let endpoint: Endpoint = publisher
            .address
            .parse()
            .map_err(|_| RippleError::AddressParseError(publisher.address.clone()))?;

        let socket = SubscribeSocket::connect(
            &endpoint,
            topics,
            config.max_message_size,
            config.request_timeout(),
        )
        .await?;

        info!(
            "Subscribed to {:?} of '{}' at {}",
            topics, publisher.name, publisher.address
        );
        Ok(Self {
            socket,
            publisher: publisher.clone(),
            topics: topics.to_vec(),
        })
    }

    /// Next `(topic, message)`.
    ///
    /// Labels are filtered by prefix on the wire, so messages of longer topics
    /// sharing a prefix are skipped here.
    pub async fn recv(&mut self) -> Result<(String, String)> {
        loop {
            let (topic, payload) = self.socket.recv().await?;
            if !self.topics.contains(&topic) {
                debug!("Skipping message on unsubscribed topic '{}'", topic);
                continue;
            }
            let message = WireValue::decode(&payload)?.into_str()?;
            return Ok((topic, message));
        }
    }

    pub fn publisher(&self) -> &PublisherRecord {
        &self.publisher
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }
}
