// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publisher client.
//!
//! A publisher binds its own broadcast endpoint on an ephemeral port, advertises
//! it to the directory and then sends topic-scoped messages straight to its
//! subscribers. The directory is only involved in registration, topic updates
//! and deregistration.
//!
//! ```text
//! Unregistered --register--> Registered --deregister--> Deregistered
//! ```

use crate::client::DirectoryClient;
use crate::config::ClientConfig;
use crate::error::{Result, RippleError};
use crate::protocol::{ErrorCode, RegisterReply, StatusReply, WireValue};
use crate::registry::{PublisherId, PublisherRecord};
use crate::transport::{Endpoint, PublishSocket};
use tracing::{debug, info, warn};

/// Lifecycle state of a [`Publisher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherState {
    Unregistered,
    Registered,
    /// Terminal.
    Deregistered,
}

/// Sockets held while registered.
struct Session {
    id: PublisherId,
    address: String,
    client: DirectoryClient,
    socket: PublishSocket,
}

/// Publisher client.
pub struct Publisher {
    config: ClientConfig,
    bind_host: String,
    name: String,
    topics: Vec<String>,
    state: PublisherState,
    session: Option<Session>,
}

impl Publisher {
    /// Create an unregistered publisher.
    ///
    /// `bind_host` is both bound and advertised, so it must be reachable by
    /// subscribers (e.g. `127.0.0.1` or a routable interface address).
    pub fn new(
        config: ClientConfig,
        bind_host: impl Into<String>,
        name: impl Into<String>,
        topics: Vec<String>,
    ) -> Self {
        Self {
            config,
            bind_host: bind_host.into(),
            name: name.into(),
            topics,
            state: PublisherState::Unregistered,
            session: None,
        }
    }

    /// Bind the broadcast endpoint and register it with the directory.
    pub async fn register(&mut self) -> Result<PublisherId> {
        match self.state {
            PublisherState::Unregistered => {}
            PublisherState::Registered => return Err(RippleError::AlreadyRegistered),
            PublisherState::Deregistered => return Err(RippleError::NotRegistered),
        }
        self.config.validate()?;

        let socket = PublishSocket::bind(
            &Endpoint::new(self.bind_host.clone(), 0),
            self.config.publish_capacity,
            self.config.max_message_size,
        )
        .await?;
        let address = Endpoint::new(self.bind_host.clone(), socket.local_addr().port());
        let address = address.to_string();

        let mut client = DirectoryClient::connect(&self.config).await?;
        let record =
            PublisherRecord::new(address.clone(), self.name.clone(), self.topics.clone());

        match client.register(&record).await? {
            RegisterReply::Registered(id) => {
                info!(
                    "Publisher '{}' registered as {} at {} (topics: {:?})",
                    self.name, id, address, self.topics
                );
                self.session = Some(Session {
                    id,
                    address,
                    client,
                    socket,
                });
                self.state = PublisherState::Registered;
                Ok(id)
            }
            RegisterReply::Failed(code) => {
                warn!("Registration of {} rejected: {:?}", address, code);
                socket.close();
                Err(match code {
                    ErrorCode::AddressAlreadyRegistered => {
                        RippleError::AddressAlreadyRegistered(address)
                    }
                    ErrorCode::AddressParseError => RippleError::AddressParseError(address),
                    other => RippleError::Rejected(other),
                })
            }
        }
    }

    /// Send `message` under `topic` to every subscriber of that topic.
    ///
    /// Never waits for subscribers; those not connected miss the message.
    pub fn publish(&self, topic: &str, message: &str) -> Result<()> {
        if topic.is_empty() {
            return Err(RippleError::InvalidArgument("topic cannot be empty"));
        }
        if !self.topics.iter().any(|t| t == topic) {
            return Err(RippleError::TopicNotRegistered(topic.to_string()));
        }
        let session = self.session.as_ref().ok_or(RippleError::NotRegistered)?;

        let payload = WireValue::Str(message.to_string()).encode()?;
        let receivers = session.socket.send(topic, payload);
        debug!("Published on '{}' to {} subscriber(s)", topic, receivers);
        Ok(())
    }

    /// Replace the declared topic set.
    ///
    /// The local set is restored if the directory rejects the update or the
    /// exchange fails.
    pub async fn update_topics(&mut self, topics: Vec<String>) -> Result<()> {
        let session = self.session.as_mut().ok_or(RippleError::NotRegistered)?;
        let id = session.id;
        let previous = std::mem::replace(&mut self.topics, topics);

        let outcome = session.client.update_topics(id, &self.topics).await;
        match outcome {
            Ok(StatusReply::Ok) => {
                info!("Publisher {} topics updated: {:?}", id, self.topics);
                Ok(())
            }
            Ok(StatusReply::Failed(code)) => {
                warn!("Topic update of publisher {} rejected: {:?}", id, code);
                self.topics = previous;
                Err(RippleError::UpdateFailed(id))
            }
            Err(e) => {
                self.topics = previous;
                Err(e)
            }
        }
    }

    /// Deregister and release both sockets.
    ///
    /// A no-op unless registered. The publisher is torn down whatever the
    /// outcome: if the directory no longer knows the id `IdNotFound` is
    /// returned, and if the exchange fails its transport error is returned.
    pub async fn deregister(&mut self) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let id = session.id;

        let result = match session.client.deregister(id).await {
            Ok(StatusReply::Ok) => Ok(()),
            Ok(StatusReply::Failed(ErrorCode::IdNotFound)) => {
                warn!("Directory did not know publisher {}", id);
                Err(RippleError::IdNotFound(id))
            }
            Ok(StatusReply::Failed(code)) => Err(RippleError::Rejected(code)),
            Err(e) => {
                warn!("Deregistration of publisher {} failed: {}", id, e);
                Err(e)
            }
        };

        if let Some(session) = self.session.take() {
            session.socket.close();
            info!("Publisher {} deregistered from {}", id, session.address);
        }
        self.state = PublisherState::Deregistered;
        result
    }

    /// Declared topics.
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Assigned id while registered.
    pub fn id(&self) -> Option<PublisherId> {
        self.session.as_ref().map(|s| s.id)
    }

    /// Advertised broadcast address while registered.
    pub fn address(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.address.as_str())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> PublisherState {
        self.state
    }

    /// Record as the directory holds it, while registered.
    pub fn record(&self) -> Option<PublisherRecord> {
        self.session.as_ref().map(|s| PublisherRecord {
            id: Some(s.id),
            address: s.address.clone(),
            name: self.name.clone(),
            topics: self.topics.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ReplySocket;

    /// Directory stand-in answering every REGISTER with `code`.
    async fn refusing_directory(code: ErrorCode) -> ClientConfig {
        let mut socket = ReplySocket::bind(&Endpoint::new("127.0.0.1", 0), 4096)
            .await
            .unwrap();
        let port = socket.local_addr().port();

        tokio::spawn(async move {
            while let Some(request) = socket.recv().await {
                let reply = RegisterReply::Failed(code).to_wire().encode().unwrap();
                request.reply(reply);
            }
        });

        ClientConfig {
            command_port: port,
            ..ClientConfig::new("127.0.0.1")
        }
    }

    fn publisher(topics: &[&str]) -> Publisher {
        Publisher::new(
            ClientConfig::new("127.0.0.1"),
            "127.0.0.1",
            "sensor",
            topics.iter().map(|t| t.to_string()).collect(),
        )
    }

    #[test]
    fn test_new_is_unregistered() {
        let p = publisher(&["temp"]);
        assert_eq!(p.state(), PublisherState::Unregistered);
        assert_eq!(p.id(), None);
        assert_eq!(p.address(), None);
        assert_eq!(p.name(), "sensor");
        assert_eq!(p.topics(), ["temp".to_string()]);
        assert!(p.record().is_none());
    }

    #[test]
    fn test_publish_validation_order() {
        let p = publisher(&["temp"]);

        assert!(matches!(
            p.publish("", "x"),
            Err(RippleError::InvalidArgument(_))
        ));
        assert!(matches!(
            p.publish("pressure", "x"),
            Err(RippleError::TopicNotRegistered(t)) if t == "pressure"
        ));
        assert!(matches!(
            p.publish("temp", "x"),
            Err(RippleError::NotRegistered)
        ));
    }

    #[tokio::test]
    async fn test_update_requires_registration() {
        let mut p = publisher(&["temp"]);
        let err = p.update_topics(vec!["other".into()]).await.unwrap_err();
        assert!(matches!(err, RippleError::NotRegistered));
        assert_eq!(p.topics(), ["temp".to_string()]);
    }

    #[tokio::test]
    async fn test_deregister_unregistered_is_noop() {
        let mut p = publisher(&[]);
        p.deregister().await.unwrap();
        assert_eq!(p.state(), PublisherState::Unregistered);
    }

    #[tokio::test]
    async fn test_register_invalid_config() {
        let mut config = ClientConfig::new("127.0.0.1");
        config.command_port = 0;
        let mut p = Publisher::new(config, "127.0.0.1", "x", vec![]);

        assert!(matches!(
            p.register().await,
            Err(RippleError::Config(_))
        ));
        assert_eq!(p.state(), PublisherState::Unregistered);
    }

    #[tokio::test]
    async fn test_register_refused_address_taken() {
        let config = refusing_directory(ErrorCode::AddressAlreadyRegistered).await;
        let mut p = Publisher::new(config, "127.0.0.1", "sensor", vec!["temp".into()]);

        let err = p.register().await.unwrap_err();
        match &err {
            RippleError::AddressAlreadyRegistered(a) => assert!(a.starts_with("tcp://127.0.0.1:")),
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(p.state(), PublisherState::Unregistered);
        assert_eq!(p.id(), None);
        assert!(p.address().is_none());
    }

    #[tokio::test]
    async fn test_register_refused_bad_address() {
        let config = refusing_directory(ErrorCode::AddressParseError).await;
        let mut p = Publisher::new(config, "127.0.0.1", "sensor", vec![]);

        assert!(matches!(
            p.register().await,
            Err(RippleError::AddressParseError(_))
        ));
        assert_eq!(p.state(), PublisherState::Unregistered);

        // still allowed to try again
        assert!(matches!(
            p.register().await,
            Err(RippleError::AddressParseError(_))
        ));
    }
}
