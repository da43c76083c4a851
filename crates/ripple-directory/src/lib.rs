// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ripple Directory
//!
//! Directory service for decentralized publish/subscribe. Publishers send data
//! straight to their subscribers; the directory only tracks who publishes what
//! and where.
//!
//! # Components
//!
//! - **Registry**: id -> publisher record map with unique ids and addresses
//! - **Directory server**: serialized command loop plus snapshot broadcasts
//! - **Publisher**: registers its broadcast endpoint and publishes on its topics
//! - **Observer**: mirrors the directory and hands snapshots to a sink
//! - **Subscriber**: receives one publisher's topics
//!
//! # Quick Start
//!
//! ```bash
//! # Command endpoint on 5555, broadcasts on 5556
//! ripple-directory-server
//!
//! # Custom ports
//! ripple-directory-server --command-port 6555 --broadcast-port 6556
//! ```
//!
//! ```no_run
//! use ripple_directory::{ClientConfig, DirectorySnapshot, Observer, Publisher};
//!
//! # async fn demo() -> ripple_directory::Result<()> {
//! let config = ClientConfig::new("127.0.0.1");
//!
//! let mut publisher = Publisher::new(config.clone(), "127.0.0.1", "sensor", vec!["temp".into()]);
//! publisher.register().await?;
//! publisher.publish("temp", "21.5")?;
//!
//! let mut observer = Observer::new(config, |snapshot: &DirectorySnapshot| {
//!     println!("{} publishers", snapshot.len());
//! });
//! observer.connect().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod observer;
pub mod protocol;
pub mod publisher;
pub mod registry;
pub mod server;
pub mod subscriber;
pub mod transport;

pub use client::DirectoryClient;
pub use config::{ClientConfig, ConfigError, ServerConfig};
pub use error::{Result, RippleError};
pub use observer::{DirectorySink, Observer};
pub use protocol::{ErrorCode, DIRECTORY_LABEL};
pub use publisher::{Publisher, PublisherState};
pub use registry::{DirectorySnapshot, PublisherId, PublisherRecord, Registry, RegistryError};
pub use server::{DirectoryServer, ServerError};
pub use subscriber::Subscriber;
pub use transport::Endpoint;
