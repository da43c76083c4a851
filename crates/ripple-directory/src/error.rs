// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Errors surfaced to publisher, observer and subscriber callers.

use crate::config::ConfigError;
use crate::protocol::{ErrorCode, ProtocolError};
use crate::registry::PublisherId;
use crate::transport::TransportError;
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum RippleError {
    #[error("address already registered at the directory: {0}")]
    AddressAlreadyRegistered(String),

    #[error("directory could not parse address: {0}")]
    AddressParseError(String),

    #[error("publisher {0} not found at the directory")]
    IdNotFound(PublisherId),

    #[error("topic update of publisher {0} rejected")]
    UpdateFailed(PublisherId),

    #[error("topic not registered: {0}")]
    TopicNotRegistered(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("directory rejected the request: {0:?}")]
    Rejected(ErrorCode),

    #[error("publisher is not registered")]
    NotRegistered,

    #[error("publisher is already registered")]
    AlreadyRegistered,

    #[error("observer is not connected")]
    NotConnected,

    #[error("observer is already connected")]
    AlreadyConnected,

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, RippleError>;
