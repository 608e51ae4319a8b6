//! Versioned envelope for persisted engine state.
//!
//! Everything the engine writes to durable storage is wrapped with a format
//! version so a newer build can recognise (and refuse or migrate) state
//! written by an older one.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// The current envelope version.
///
/// Version 1 stored the record list alone. Version 2 adds tombstones.
pub const CURRENT_VERSION: u32 = 2;

/// A versioned wrapper around persisted data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// The version of the envelope format.
    pub version: u32,
    /// The wrapped payload.
    pub payload: T,
}

impl<T> Envelope<T> {
    /// Creates a new envelope with the current version.
    #[must_use]
    pub fn new(payload: T) -> Self {
        Self {
            version: CURRENT_VERSION,
            payload,
        }
    }

    /// Unwraps the envelope, returning the payload.
    #[must_use]
    pub fn into_payload(self) -> T {
        self.payload
    }
}

impl<T: Serialize> Envelope<T> {
    /// Serializes the envelope to pretty-printed JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }
}

/// An envelope whose payload has not been decoded yet.
///
/// Decode this first to check the version, then decode the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEnvelope {
    /// The version of the envelope format.
    pub version: u32,
    /// The undecoded payload.
    pub payload: JsonValue,
}

impl RawEnvelope {
    /// Deserializes from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not an envelope.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Returns true if this envelope uses the current version.
    #[must_use]
    pub fn is_current_version(&self) -> bool {
        self.version == CURRENT_VERSION
    }

    /// Decodes the payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not match `T`.
    pub fn deserialize_payload<T: for<'de> Deserialize<'de>>(
        self,
    ) -> Result<Envelope<T>, serde_json::Error> {
        let payload: T = serde_json::from_value(self.payload)?;
        Ok(Envelope {
            version: self.version,
            payload,
        })
    }
}
