//! Payload Codecs
//!
//! The connection only moves bytes. A [`PayloadCodec`] turns application
//! values into the bytes stored under a key and back.

use crate::error::{Error, Result};
use bytes::Bytes;

/// Converts values of type `T` to and from stored payloads.
pub trait PayloadCodec<T> {
    fn encode(&self, value: &T) -> Bytes;

    fn decode(&self, payload: Bytes) -> Result<T>;
}

/// Stores `String`s as their UTF-8 bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Codec;

impl PayloadCodec<String> for Utf8Codec {
    fn encode(&self, value: &String) -> Bytes {
        Bytes::copy_from_slice(value.as_bytes())
    }

    fn decode(&self, payload: Bytes) -> Result<String> {
        String::from_utf8(payload.to_vec())
            .map_err(|e| Error::Decode(e.to_string()))
    }
}

/// Passes payloads through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl PayloadCodec<Bytes> for RawCodec {
    fn encode(&self, value: &Bytes) -> Bytes {
        value.clone()
    }

    fn decode(&self, payload: Bytes) -> Result<Bytes> {
        Ok(payload)
    }
}
