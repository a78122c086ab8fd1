//! Binary envelope for moving bridge records over a byte transport.
//!
//! ```text
//! [namespace:10][version:1][kind:1][body:variable]
//!  "sbx.bridge"   0x01      enum   msgpack (named fields)
//! ```

use serde::{Deserialize, Serialize};

use crate::types::{Message, Response, UiPatch, UiSnapshot, UserAction};

/// Envelope namespace prefix.
pub const NAMESPACE: &[u8; 10] = b"sbx.bridge";

/// Current envelope version.
pub const WIRE_VERSION: u8 = 0x01;

/// Header size: 10 (namespace) + 1 (version) + 1 (kind) = 12
const HEADER_SIZE: usize = 12;

/// Errors from envelope operations.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("envelope too short: {0} bytes (minimum {HEADER_SIZE})")]
    TooShort(usize),

    #[error("invalid namespace (expected 'sbx.bridge')")]
    InvalidNamespace,

    #[error("unsupported wire version: {0}")]
    UnsupportedVersion(u8),

    #[error("unknown envelope kind: 0x{0:02x}")]
    UnknownKind(u8),

    #[error("msgpack decode error: {0}")]
    MsgpackDecode(#[from] rmp_serde::decode::Error),

    #[error("msgpack encode error: {0}")]
    MsgpackEncode(#[from] rmp_serde::encode::Error),
}

/// Record kinds carried by the envelope.
///
/// - `0x01-0x0F`: broker traffic
/// - `0x10-0x1F`: sandbox → presentation
/// - `0x20-0x2F`: presentation → sandbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EnvelopeKind {
    Message = 0x01,
    Response = 0x02,
    Snapshot = 0x10,
    Patch = 0x11,
    UserAction = 0x20,
}

impl EnvelopeKind {
    /// Convert from raw byte value.
    pub fn from_byte(b: u8) -> Result<Self, WireError> {
        match b {
            0x01 => Ok(Self::Message),
            0x02 => Ok(Self::Response),
            0x10 => Ok(Self::Snapshot),
            0x11 => Ok(Self::Patch),
            0x20 => Ok(Self::UserAction),
            other => Err(WireError::UnknownKind(other)),
        }
    }
}

/// A bridge record ready for the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Message(Message),
    Response(Response),
    Snapshot(UiSnapshot),
    Patch(UiPatch),
    UserAction(UserAction),
}

impl Envelope {
    pub fn kind(&self) -> EnvelopeKind {
        match self {
            Self::Message(_) => EnvelopeKind::Message,
            Self::Response(_) => EnvelopeKind::Response,
            Self::Snapshot(_) => EnvelopeKind::Snapshot,
            Self::Patch(_) => EnvelopeKind::Patch,
            Self::UserAction(_) => EnvelopeKind::UserAction,
        }
    }

    /// Encode to envelope bytes.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let body = match self {
            Self::Message(record) => rmp_serde::to_vec_named(record)?,
            Self::Response(record) => rmp_serde::to_vec_named(record)?,
            Self::Snapshot(record) => rmp_serde::to_vec_named(record)?,
            Self::Patch(record) => rmp_serde::to_vec_named(record)?,
            Self::UserAction(record) => rmp_serde::to_vec_named(record)?,
        };
        let mut buf = Vec::with_capacity(HEADER_SIZE + body.len());
        buf.extend_from_slice(NAMESPACE);
        buf.push(WIRE_VERSION);
        buf.push(self.kind() as u8);
        buf.extend_from_slice(&body);
        Ok(buf)
    }

    /// Decode from envelope bytes.
    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        if data.len() < HEADER_SIZE {
            return Err(WireError::TooShort(data.len()));
        }

        if &data[..10] != NAMESPACE.as_slice() {
            return Err(WireError::InvalidNamespace);
        }

        let version = data[10];
        if version != WIRE_VERSION {
            return Err(WireError::UnsupportedVersion(version));
        }

        let body = &data[HEADER_SIZE..];
        let envelope = match EnvelopeKind::from_byte(data[11])? {
            EnvelopeKind::Message => Self::Message(rmp_serde::from_slice(body)?),
            EnvelopeKind::Response => Self::Response(rmp_serde::from_slice(body)?),
            EnvelopeKind::Snapshot => Self::Snapshot(rmp_serde::from_slice(body)?),
            EnvelopeKind::Patch => Self::Patch(rmp_serde::from_slice(body)?),
            EnvelopeKind::UserAction => Self::UserAction(rmp_serde::from_slice(body)?),
        };
        Ok(envelope)
    }
}
