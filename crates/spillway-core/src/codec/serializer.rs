//! Pluggable serializers for object elements.

use std::fmt;
use std::io::{Read, Write};
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use spillway_common::types::{Object, ObjectType, ObjectValue};
use spillway_common::utils::error::CodecError;

/// Writes and reads the payload of one object type.
///
/// The codec writes the element tag; a serializer is only responsible for the
/// payload that follows it and must read back exactly the bytes it wrote.
pub trait ObjectSerializer: Send + Sync {
    /// Name of the type this serializer handles.
    fn type_name(&self) -> &str;

    /// Writes the payload of `value`.
    fn write(&self, value: &dyn Object, out: &mut dyn Write) -> Result<(), CodecError>;

    /// Reads one payload.
    fn read(&self, input: &mut dyn Read) -> Result<ObjectValue, CodecError>;
}

/// Serializes any serde-capable [`ObjectType`] with bincode.
pub struct BincodeSerializer<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> BincodeSerializer<T>
where
    T: ObjectType + Serialize + DeserializeOwned,
{
    /// Creates a serializer for `T`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }

    /// Creates a shared serializer for `T`, ready for registration.
    #[must_use]
    pub fn shared() -> Arc<dyn ObjectSerializer> {
        Arc::new(Self::new())
    }

    fn payload_error(message: impl fmt::Display) -> CodecError {
        CodecError::Payload {
            type_name: T::TYPE_NAME.to_string(),
            message: message.to_string(),
        }
    }
}

impl<T> Default for BincodeSerializer<T>
where
    T: ObjectType + Serialize + DeserializeOwned,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ObjectSerializer for BincodeSerializer<T>
where
    T: ObjectType + Serialize + DeserializeOwned,
{
    fn type_name(&self) -> &str {
        T::TYPE_NAME
    }

    fn write(&self, value: &dyn Object, mut out: &mut dyn Write) -> Result<(), CodecError> {
        let value = value.as_any().downcast_ref::<T>().ok_or_else(|| {
            Self::payload_error(format_args!("got a value of type {}", value.type_name()))
        })?;

        bincode::serde::encode_into_std_write(value, &mut out, bincode::config::standard())
            .map(|_| ())
            .map_err(|e| match e {
                bincode::error::EncodeError::Io { inner, .. } => CodecError::Io(inner),
                other => Self::payload_error(other),
            })
    }

    fn read(&self, mut input: &mut dyn Read) -> Result<ObjectValue, CodecError> {
        let value: T = bincode::serde::decode_from_std_read(&mut input, bincode::config::standard())
            .map_err(|e| match e {
                bincode::error::DecodeError::Io { inner, .. } => {
                    CodecError::from_read(inner, "object payload")
                }
                bincode::error::DecodeError::UnexpectedEnd { .. } => {
                    CodecError::Truncated("object payload")
                }
                other => Self::payload_error(other),
            })?;
        Ok(ObjectValue::new(value))
    }
}
