//! Wire protocol shared between the canvas server and its clients.
//!
//! Every frame is a JSON object tagged by a kebab-case `type` field with
//! camelCase payload fields, e.g. `{"type":"move-cursor","x":10,"y":20}`.
//! Inbound frames are validated with [`ClientPacket::decode`] before they
//! reach the server core.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Shortest chaos cycle, inclusive
pub const CHAOS_MIN_DURATION_MS: u64 = 10_000;
/// Longest chaos cycle, inclusive
pub const CHAOS_MAX_DURATION_MS: u64 = 30_000;

pub const MIN_SCALE: f32 = 0.1;
pub const MAX_SCALE: f32 = 4.0;
pub const DEFAULT_SCALE: f32 = 1.0;

pub const MAX_NAME_LEN: usize = 32;
pub const MAX_COLOR_LEN: usize = 32;

/// Opaque per-connection handle assigned by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of one image asset in `[0, N)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub u32);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Display name and cursor color a client announces for itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub color: String,
}

impl Identity {
    /// Builds a validated identity, trimming surrounding whitespace
    pub fn new(name: &str, color: &str) -> Result<Self, ProtocolError> {
        let name = name.trim();
        let color = color.trim();

        if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
            return Err(ProtocolError::InvalidName);
        }
        if color.is_empty() || color.chars().count() > MAX_COLOR_LEN {
            return Err(ProtocolError::InvalidColor);
        }

        Ok(Self {
            name: name.to_string(),
            color: color.to_string(),
        })
    }
}

/// One entry of the bootstrap peer list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerIdentity {
    pub session_id: SessionId,
    pub identity: Identity,
}

/// Reasons an inbound frame is refused before reaching the server core
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed packet: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("non-finite value for `{field}`")]
    NonFinite { field: &'static str },
    #[error("display name must be between 1 and 32 characters")]
    InvalidName,
    #[error("color must be between 1 and 32 characters")]
    InvalidColor,
    #[error("binary frames are not supported")]
    UnsupportedFrame,
}

fn default_scale() -> f32 {
    DEFAULT_SCALE
}

/// Events a client sends to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientPacket {
    AnnounceIdentity {
        name: String,
        color: String,
    },
    MoveCursor {
        x: f32,
        y: f32,
    },
    PlaceResource {
        x: f32,
        y: f32,
        /// Part of a drag gesture rather than a single click
        #[serde(default)]
        is_continuation: bool,
        /// On a continuation, `Some(false)` starts a new gesture mid-drag;
        /// absent or `true` keeps the pinned resource
        #[serde(default, skip_serializing_if = "Option::is_none")]
        use_existing_resource: Option<bool>,
        #[serde(default)]
        is_chaos_variant: bool,
        #[serde(default = "default_scale")]
        scale: f32,
    },
    EndGesture,
    ClearCanvasRequest,
    ChaosTrigger,
    ChaosEnd,
}

impl ClientPacket {
    /// Parses a text frame and validates its payload
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let packet: ClientPacket = serde_json::from_str(text)?;
        packet.validate()
    }

    /// Rejects non-finite coordinates and bad identities, clamps scale
    pub fn validate(self) -> Result<Self, ProtocolError> {
        match self {
            ClientPacket::AnnounceIdentity { name, color } => {
                let identity = Identity::new(&name, &color)?;
                Ok(ClientPacket::AnnounceIdentity {
                    name: identity.name,
                    color: identity.color,
                })
            }
            ClientPacket::MoveCursor { x, y } => {
                check_finite("x", x)?;
                check_finite("y", y)?;
                Ok(ClientPacket::MoveCursor { x, y })
            }
            ClientPacket::PlaceResource {
                x,
                y,
                is_continuation,
                use_existing_resource,
                is_chaos_variant,
                scale,
            } => {
                check_finite("x", x)?;
                check_finite("y", y)?;
                check_finite("scale", scale)?;
                Ok(ClientPacket::PlaceResource {
                    x,
                    y,
                    is_continuation,
                    use_existing_resource,
                    is_chaos_variant,
                    scale: scale.clamp(MIN_SCALE, MAX_SCALE),
                })
            }
            other => Ok(other),
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

fn check_finite(field: &'static str, value: f32) -> Result<(), ProtocolError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ProtocolError::NonFinite { field })
    }
}

/// Events the server sends to one or all clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerPacket {
    Welcome {
        session_id: SessionId,
    },
    ResourceCounts {
        regular: u32,
        peaceful: u32,
    },
    PeerSnapshot {
        peers: Vec<PeerIdentity>,
    },
    IdentityUpdate {
        session_id: SessionId,
        identity: Identity,
    },
    CursorUpdate {
        session_id: SessionId,
        x: f32,
        y: f32,
    },
    Placement {
        session_id: SessionId,
        x: f32,
        y: f32,
        resource_id: Option<ResourceId>,
        scale: f32,
        is_continuation: bool,
        is_chaos_variant: bool,
    },
    CanvasCleared,
    ChaosStarted {
        resource_id: Option<ResourceId>,
        duration_ms: u64,
    },
    ChaosEnded,
    PeerLeft {
        session_id: SessionId,
    },
    ServerFull {
        reason: String,
    },
}

impl ServerPacket {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}
