//! Wire codec — serializes bus payloads.
//!
//! Every process on a bus must run the same codec; the selection comes
//! from configuration, not from the messages themselves. Both formats
//! are self-describing, which the free-form `data` payload on job
//! envelopes requires.

use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};

/// Payload encoding used on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireCodec {
    /// Human-readable JSON. The default, and what the bus tooling expects.
    #[default]
    Json,
    /// MessagePack, for high-volume deployments.
    Msgpack,
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("JSON encode/decode failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("msgpack encode failed: {0}")]
    MsgpackEncode(#[from] rmp_serde::encode::Error),
    #[error("msgpack decode failed: {0}")]
    MsgpackDecode(#[from] rmp_serde::decode::Error),
}

impl WireCodec {
    /// Serialize a payload for publishing.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Bytes, CodecError> {
        let raw = match self {
            WireCodec::Json => serde_json::to_vec(value)?,
            // Named-field maps so arbitrary JSON values nest cleanly.
            WireCodec::Msgpack => rmp_serde::to_vec_named(value)?,
        };
        Ok(Bytes::from(raw))
    }

    /// Deserialize a received payload.
    pub fn decode<T: DeserializeOwned>(&self, raw: &[u8]) -> Result<T, CodecError> {
        Ok(match self {
            WireCodec::Json => serde_json::from_slice(raw)?,
            WireCodec::Msgpack => rmp_serde::from_slice(raw)?,
        })
    }
}
