//! Messages are serialized by external libraries: `prost` for the binary encoding and `serde` for
//! JSON.  The rest of this crate only ever talks to them through the [`Message`] trait, and only
//! ever sees their failures as a [`CodecError`], which the dispatchers turn into protocol errors
//! before anything reaches the wire.
use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::{ContentType, Result};

/// Failure reported by one of the underlying codecs.
///
/// The display form is the underlying library's message, verbatim.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("{source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
    #[error("{source}")]
    Protobuf {
        #[from]
        source: prost::DecodeError,
    },
}

/// The capabilities the protocol needs from a message type.
///
/// "Plain object" is the JSON-compatible form of a message, which for the JSON content type is
/// then rendered as text.  This is implemented for every type that has both a `prost` and a
/// `serde` implementation, which is what generated protobuf types with serde support look like.
pub trait Message: Sized + Send + Sync + 'static {
    fn from_plain_object(value: JsonValue) -> Result<Self, CodecError>;

    fn to_plain_object(&self) -> Result<JsonValue, CodecError>;

    fn decode_binary(buf: &[u8]) -> Result<Self, CodecError>;

    fn encode_binary(&self) -> Vec<u8>;
}

impl<T> Message for T
where
    T: prost::Message + Default + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn from_plain_object(value: JsonValue) -> Result<Self, CodecError> {
        Ok(serde_json::from_value(value)?)
    }

    fn to_plain_object(&self) -> Result<JsonValue, CodecError> {
        Ok(serde_json::to_value(self)?)
    }

    fn decode_binary(buf: &[u8]) -> Result<Self, CodecError> {
        Ok(<Self as prost::Message>::decode(buf)?)
    }

    fn encode_binary(&self) -> Vec<u8> {
        prost::Message::encode_to_vec(self)
    }
}

/// Decode a body in the given content type.
///
/// For JSON, text that isn't JSON at all and JSON that doesn't fit the message are both errors.
pub fn decode_message<T: Message>(content_type: ContentType, body: &[u8]) -> Result<T, CodecError> {
    match content_type {
        ContentType::Json => {
            let value: JsonValue = serde_json::from_slice(body)?;
            T::from_plain_object(value)
        }
        ContentType::Protobuf => T::decode_binary(body),
    }
}

/// Encode a message as a body in the given content type.
pub fn encode_message<T: Message>(content_type: ContentType, message: &T) -> Result<Bytes, CodecError> {
    match content_type {
        ContentType::Json => {
            let value = message.to_plain_object()?;
            Ok(serde_json::to_vec(&value)?.into())
        }
        ContentType::Protobuf => Ok(message.encode_binary().into()),
    }
}
