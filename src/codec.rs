use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

/// A value that can be sent to another rank.
///
/// Implemented for everything serde can serialize and deserialize without borrowing.
/// Floats must be finite: JSON has no representation for infinities or NaN, so a
/// non-finite float encodes as `null` and fails to decode on the receiving rank.
pub trait Wire: Serialize + DeserializeOwned {}

impl<T: Serialize + DeserializeOwned> Wire for T {}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("cannot encode value: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("cannot decode value: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Encodes a value as JSON.
pub fn encode_to_vec<T: Wire>(value: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(value).map_err(CodecError::Encode)
}

/// Decodes exactly one value from `data`. Trailing data is an error.
pub fn decode_from_slice<T: Wire>(data: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(data).map_err(CodecError::Decode)
}
