// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Directory wire protocol.
//!
//! Command frames on the request channel:
//! ```text
//! +-------------+----------------------------+
//! | Header (1B) | encoded WireValue (or none)|
//! +-------------+----------------------------+
//! ```
//!
//! | Code | Command     | Payload                   | Reply                          |
//! |------|-------------|---------------------------|--------------------------------|
//! | 0x01 | REGISTER    | `record` (address, name…) | `int` id, or negative code     |
//! | 0x02 | DEREGISTER  | `str` decimal id          | `str` "OK" or code             |
//! | 0x03 | MAP_REQUEST | empty                     | `directory` snapshot           |
//! | 0x04 | UPDATE      | `record` (id, topics)     | `str` "OK" or code             |
//!
//! Replies carry no header. Broadcast messages are (label, encoded value);
//! the directory always uses the [`DIRECTORY_LABEL`] label.
//!
//! Values are encoded as adjacently tagged JSON, e.g. `{"type":"int","value":3}`.

use crate::registry::{DirectorySnapshot, PublisherId, PublisherRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Label of directory snapshot broadcasts.
pub const DIRECTORY_LABEL: &str = "DIR";

/// Success reply of DEREGISTER and UPDATE.
pub const REPLY_OK: &str = "OK";

/// Command header bytes.
pub mod header {
    pub const REGISTER: u8 = 0x01;
    pub const DEREGISTER: u8 = 0x02;
    pub const MAP_REQUEST: u8 = 0x03;
    pub const UPDATE: u8 = 0x04;
}

/// Tagged value carried in every payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum WireValue {
    Int(i64),
    Str(String),
    Strings(Vec<String>),
    Record(PublisherRecord),
    Directory(DirectorySnapshot),
}

impl WireValue {
    /// Encode to bytes.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Decode from bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
    }

    /// Unwrap a `str` value.
    pub fn into_str(self) -> Result<String, ProtocolError> {
        match self {
            Self::Str(s) => Ok(s),
            other => Err(ProtocolError::unexpected("str", &other)),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Str(_) => "str",
            Self::Strings(_) => "strings",
            Self::Record(_) => "record",
            Self::Directory(_) => "directory",
        }
    }
}

/// Error codes carried in failure replies.
///
/// Always negative so they never collide with an assigned id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum ErrorCode {
    AddressAlreadyRegistered = -1,
    AddressParseError = -2,
    IdNotFound = -3,
    UpdateFailed = -4,
    IdSpaceExhausted = -5,
    MalformedCommand = -6,
    UnknownCommand = -7,
}

impl ErrorCode {
    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            -1 => Some(Self::AddressAlreadyRegistered),
            -2 => Some(Self::AddressParseError),
            -3 => Some(Self::IdNotFound),
            -4 => Some(Self::UpdateFailed),
            -5 => Some(Self::IdSpaceExhausted),
            -6 => Some(Self::MalformedCommand),
            -7 => Some(Self::UnknownCommand),
            _ => None,
        }
    }

    /// Code as carried in string replies.
    pub fn as_reply_str(self) -> String {
        self.code().to_string()
    }
}

/// Directory commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Register(PublisherRecord),
    Deregister(PublisherId),
    MapRequest,
    Update {
        id: PublisherId,
        topics: Vec<String>,
    },
}

impl Command {
    pub fn header(&self) -> u8 {
        match self {
            Self::Register(_) => header::REGISTER,
            Self::Deregister(_) => header::DEREGISTER,
            Self::MapRequest => header::MAP_REQUEST,
            Self::Update { .. } => header::UPDATE,
        }
    }

    /// Encode to a command frame.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let payload = match self {
            Self::Register(record) => Some(WireValue::Record(PublisherRecord {
                id: None,
                ..record.clone()
            })),
            Self::Deregister(id) => Some(WireValue::Str(id.to_string())),
            Self::MapRequest => None,
            Self::Update { id, topics } => Some(WireValue::Record(PublisherRecord {
                id: Some(*id),
                topics: topics.clone(),
                ..Default::default()
            })),
        };

        let mut frame = vec![self.header()];
        if let Some(payload) = payload {
            frame.extend(payload.encode()?);
        }
        Ok(frame)
    }

    /// Decode a command frame.
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let (&header, payload) = frame.split_first().ok_or(ProtocolError::EmptyFrame)?;

        match header {
            header::REGISTER => match WireValue::decode(payload)? {
                WireValue::Record(record) => Ok(Self::Register(record)),
                other => Err(ProtocolError::unexpected("record", &other)),
            },
            header::DEREGISTER => match WireValue::decode(payload)? {
                WireValue::Str(s) => s
                    .trim()
                    .parse()
                    .map(Self::Deregister)
                    .map_err(|_| ProtocolError::InvalidId(s)),
                other => Err(ProtocolError::unexpected("str", &other)),
            },
            header::MAP_REQUEST => Ok(Self::MapRequest),
            header::UPDATE => match WireValue::decode(payload)? {
                WireValue::Record(PublisherRecord {
                    id: Some(id),
                    topics,
                    ..
                }) => Ok(Self::Update { id, topics }),
                WireValue::Record(_) => Err(ProtocolError::MissingId),
                other => Err(ProtocolError::unexpected("record", &other)),
            },
            other => Err(ProtocolError::UnknownCommand(other)),
        }
    }
}

/// Outcome of REGISTER.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterReply {
    Registered(PublisherId),
    Failed(ErrorCode),
}

impl RegisterReply {
    pub fn to_wire(self) -> WireValue {
        match self {
            Self::Registered(id) => WireValue::Int(i64::from(id)),
            Self::Failed(code) => WireValue::Int(code.code()),
        }
    }

    pub fn from_wire(value: WireValue) -> Result<Self, ProtocolError> {
        match value {
            WireValue::Int(n) if n >= 0 => PublisherId::try_from(n)
                .map(Self::Registered)
                .map_err(|_| ProtocolError::InvalidId(n.to_string())),
            WireValue::Int(n) => ErrorCode::from_code(n)
                .map(Self::Failed)
                .ok_or(ProtocolError::UnknownErrorCode(n.to_string())),
            other => Err(ProtocolError::unexpected("int", &other)),
        }
    }
}

/// Outcome of DEREGISTER and UPDATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusReply {
    Ok,
    Failed(ErrorCode),
}

impl StatusReply {
    pub fn to_wire(self) -> WireValue {
        match self {
            Self::Ok => WireValue::Str(REPLY_OK.to_string()),
            Self::Failed(code) => WireValue::Str(code.as_reply_str()),
        }
    }

    pub fn from_wire(value: WireValue) -> Result<Self, ProtocolError> {
        match value {
            WireValue::Str(s) if s == REPLY_OK => Ok(Self::Ok),
            WireValue::Str(s) => s
                .parse::<i64>()
                .ok()
                .and_then(ErrorCode::from_code)
                .map(Self::Failed)
                .ok_or(ProtocolError::UnknownErrorCode(s)),
            other => Err(ProtocolError::unexpected("str", &other)),
        }
    }
}

/// Decode a snapshot carried by a MAP_REQUEST reply or a broadcast.
pub fn decode_snapshot(bytes: &[u8]) -> Result<DirectorySnapshot, ProtocolError> {
    match WireValue::decode(bytes)? {
        WireValue::Directory(snapshot) => Ok(snapshot),
        other => Err(ProtocolError::unexpected("directory", &other)),
    }
}

/// Encode a snapshot for a MAP_REQUEST reply or a broadcast.
pub fn encode_snapshot(snapshot: &DirectorySnapshot) -> Result<Vec<u8>, ProtocolError> {
    WireValue::Directory(snapshot.clone()).encode()
}

/// Protocol error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("empty frame")]
    EmptyFrame,

    #[error("unknown command header 0x{0:02x}")]
    UnknownCommand(u8),

    #[error("unexpected value: expected {expected}, got {actual}")]
    UnexpectedValue {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("invalid publisher id: {0}")]
    InvalidId(String),

    #[error("update without publisher id")]
    MissingId,

    #[error("unknown error code: {0}")]
    UnknownErrorCode(String),

    #[error("unexpected label: {0}")]
    UnexpectedLabel(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("decode error: {0}")]
    Decode(String),
}

impl ProtocolError {
    fn unexpected(expected: &'static str, actual: &WireValue) -> Self {
        Self::UnexpectedValue {
            expected,
            actual: actual.kind(),
        }
    }
}
