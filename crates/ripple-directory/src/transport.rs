// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message transport over TCP.
//!
//! Two socket disciplines are provided:
//!
//! - request/reply ([`RequestSocket`] / [`ReplySocket`]): one outstanding request
//!   per peer, strictly alternating with its reply.
//! - publish/subscribe ([`PublishSocket`] / [`SubscribeSocket`]): two-frame
//!   messages (label, payload) fanned out to every subscriber whose prefix
//!   matches the label.
//!
//! Every message travels as one length-prefixed frame, see [`frame`].

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod frame;
pub mod pubsub;
pub mod reqrep;

pub use pubsub::{PublishSocket, SubscribeSocket};
pub use reqrep::{ReplySocket, Request, RequestSocket};

const SCHEME: &str = "tcp://";

/// Transport endpoint URL, `tcp://host:port`.
///
/// A host of `*` binds all interfaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Create an endpoint from its parts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Address usable with `TcpListener::bind`.
    pub fn bind_addr(&self) -> String {
        let host = if self.host == "*" {
            "0.0.0.0"
        } else {
            self.host.as_str()
        };
        format!("{}:{}", host, self.port)
    }

    /// Address usable with `TcpStream::connect`.
    pub fn connect_addr(&self) -> String {
        let host = if self.host == "*" {
            "127.0.0.1"
        } else {
            self.host.as_str()
        };
        format!("{}:{}", host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}:{}", SCHEME, self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TransportError::InvalidEndpoint(s.to_string());

        let rest = s.strip_prefix(SCHEME).ok_or_else(invalid)?;
        let (host, port) = rest.rsplit_once(':').ok_or_else(invalid)?;
        if host.is_empty() || host.contains('/') || host.chars().any(char::is_whitespace) {
            return Err(invalid());
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;

        Ok(Self::new(host, port))
    }
}

/// Transport error types.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("frame too large: {size} > {max}")]
    FrameTooLarge { size: usize, max: usize },

    #[error("connection closed")]
    Closed,

    #[error("request timed out")]
    Timeout,

    #[error("subscription rejected: {0}")]
    Handshake(String),
}
