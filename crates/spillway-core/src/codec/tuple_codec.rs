//! Tuple encoder/decoder.

use std::io::{Read, Write};
use std::sync::Arc;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use spillway_common::types::{Tuple, Value};
use spillway_common::utils::error::CodecError;

use super::varint::{read_len, read_u32, read_u64, write_u64, zigzag_decode, zigzag_encode};
use super::{
    MAX_NESTING_DEPTH, MIN_TOKEN, Serialization, TAG_BOOL, TAG_BYTES, TAG_FLOAT64, TAG_INT32, TAG_INT64, TAG_NAMED,
    TAG_NULL, TAG_STRING, TAG_TUPLE,
};

/// Encodes and decodes tuples against a shared [`Serialization`].
///
/// Cheap to clone; every clone shares the same configuration.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use spillway_common::tuple;
/// use spillway_core::codec::{Serialization, TupleCodec};
///
/// let codec = TupleCodec::new(Arc::new(Serialization::empty()));
/// let t = tuple!["a", 1i64, tuple!["nested"]];
///
/// let bytes = codec.encode(&t).unwrap();
/// assert_eq!(codec.decode(&bytes).unwrap(), t);
/// ```
#[derive(Debug, Clone)]
pub struct TupleCodec {
    serialization: Arc<Serialization>,
}

impl TupleCodec {
    /// Creates a codec over `serialization`.
    #[must_use]
    pub fn new(serialization: Arc<Serialization>) -> Self {
        Self { serialization }
    }

    /// Returns the serialization configuration.
    #[must_use]
    pub fn serialization(&self) -> &Arc<Serialization> {
        &self.serialization
    }

    /// Encodes `tuple` into a fresh buffer.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnregisteredType`] if an object element has no
    /// serializer, [`CodecError::NestingTooDeep`] past [`MAX_NESTING_DEPTH`]
    /// nested tuples, or the serializer's own error.
    pub fn encode(&self, tuple: &Tuple) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::new();
        self.write_tuple(&mut buf, tuple)?;
        Ok(buf)
    }

    /// Decodes a tuple that occupies all of `bytes`.
    ///
    /// # Errors
    ///
    /// Fails on truncated or corrupt input, unknown tokens or type names, and
    /// when bytes remain after the tuple.
    pub fn decode(&self, bytes: &[u8]) -> Result<Tuple, CodecError> {
        let mut input = bytes;
        let tuple = self.read_tuple(&mut input)?;
        if input.is_empty() {
            Ok(tuple)
        } else {
            Err(CodecError::TrailingBytes(input.len()))
        }
    }

    /// Writes `tuple` to `out`.
    ///
    /// # Errors
    ///
    /// See [`encode`](Self::encode); I/O errors are returned as [`CodecError::Io`].
    pub fn write_tuple(&self, out: &mut dyn Write, tuple: &Tuple) -> Result<(), CodecError> {
        self.write_nested(out, tuple, 0)
    }

    /// Reads one tuple from `input`, consuming exactly the bytes it occupies.
    ///
    /// # Errors
    ///
    /// See [`decode`](Self::decode).
    pub fn read_tuple(&self, input: &mut dyn Read) -> Result<Tuple, CodecError> {
        self.read_nested(input, 0)
    }

    fn write_nested(
        &self,
        out: &mut dyn Write,
        tuple: &Tuple,
        depth: usize,
    ) -> Result<(), CodecError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(CodecError::NestingTooDeep(MAX_NESTING_DEPTH));
        }
        write_u64(out, tuple.len() as u64)?;
        for value in tuple {
            self.write_element(out, value, depth)?;
        }
        Ok(())
    }

    fn read_nested(&self, input: &mut dyn Read, depth: usize) -> Result<Tuple, CodecError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(CodecError::NestingTooDeep(MAX_NESTING_DEPTH));
        }
        let len = read_len(input, "tuple size")?;
        // the count is untrusted, so cap the preallocation
        let mut values = Vec::with_capacity(len.min(64));
        for _ in 0..len {
            values.push(self.read_element(input, depth)?);
        }
        Ok(Tuple::new(values))
    }

    fn write_element(
        &self,
        out: &mut dyn Write,
        value: &Value,
        depth: usize,
    ) -> Result<(), CodecError> {
        match value {
            Value::Null => write_u64(out, u64::from(TAG_NULL)),
            Value::Bool(b) => {
                write_u64(out, u64::from(TAG_BOOL))?;
                out.write_u8(u8::from(*b))?;
                Ok(())
            }
            Value::Int32(i) => {
                write_u64(out, u64::from(TAG_INT32))?;
                write_u64(out, zigzag_encode(i64::from(*i)))
            }
            Value::Int64(i) => {
                write_u64(out, u64::from(TAG_INT64))?;
                write_u64(out, zigzag_encode(*i))
            }
            Value::Float64(f) => {
                write_u64(out, u64::from(TAG_FLOAT64))?;
                out.write_f64::<BigEndian>(*f)?;
                Ok(())
            }
            Value::String(s) => {
                write_u64(out, u64::from(TAG_STRING))?;
                write_bytes(out, s.as_bytes())
            }
            Value::Bytes(b) => {
                write_u64(out, u64::from(TAG_BYTES))?;
                write_bytes(out, b)
            }
            Value::Tuple(t) => {
                write_u64(out, u64::from(TAG_TUPLE))?;
                self.write_nested(out, t, depth + 1)
            }
            Value::Object(object) => {
                let type_name = object.type_name();
                let (token, serializer) = self.serialization.writer_for(type_name)?;
                match token {
                    Some(token) => write_u64(out, u64::from(token))?,
                    None => {
                        write_u64(out, u64::from(TAG_NAMED))?;
                        write_bytes(out, type_name.as_bytes())?;
                    }
                }
                serializer.write(object.as_object(), out)
            }
        }
    }

    fn read_element(&self, input: &mut dyn Read, depth: usize) -> Result<Value, CodecError> {
        let tag = read_u32(input, "element tag")?;
        let value = match tag {
            TAG_NULL => Value::Null,
            TAG_BOOL => {
                let byte = input
                    .read_u8()
                    .map_err(|e| CodecError::from_read(e, "bool"))?;
                match byte {
                    0 => Value::Bool(false),
                    1 => Value::Bool(true),
                    other => {
                        return Err(CodecError::Payload {
                            type_name: "BOOL".to_string(),
                            message: format!("invalid byte {other}"),
                        });
                    }
                }
            }
            TAG_INT32 => {
                let raw = zigzag_decode(read_u64(input, "int32")?);
                Value::Int32(i32::try_from(raw).map_err(|_| CodecError::VarintOverflow)?)
            }
            TAG_INT64 => Value::Int64(zigzag_decode(read_u64(input, "int64")?)),
            TAG_FLOAT64 => Value::Float64(
                input
                    .read_f64::<BigEndian>()
                    .map_err(|e| CodecError::from_read(e, "float64"))?,
            ),
            TAG_STRING => Value::String(read_string(input)?.into()),
            TAG_BYTES => Value::Bytes(read_bytes(input, "bytes")?.into()),
            TAG_TUPLE => Value::Tuple(self.read_nested(input, depth + 1)?),
            TAG_NAMED => {
                let type_name = read_string(input)?;
                let serializer = self.serialization.reader_for_name(&type_name)?;
                Value::Object(serializer.read(input)?)
            }
            token if token >= MIN_TOKEN => {
                let serializer = self.serialization.reader_for_token(token)?;
                Value::Object(serializer.read(input)?)
            }
            other => return Err(CodecError::InvalidTag(other)),
        };
        Ok(value)
    }
}

fn write_bytes(out: &mut dyn Write, bytes: &[u8]) -> Result<(), CodecError> {
    write_u64(out, bytes.len() as u64)?;
    out.write_all(bytes)?;
    Ok(())
}

fn read_bytes(input: &mut dyn Read, what: &'static str) -> Result<Vec<u8>, CodecError> {
    let len = read_len(input, what)?;
    let mut buf = Vec::with_capacity(len.min(64 * 1024));
    let read = (&mut *input).take(len as u64).read_to_end(&mut buf)?;
    if read < len {
        return Err(CodecError::Truncated(what));
    }
    Ok(buf)
}

fn read_string(input: &mut dyn Read) -> Result<String, CodecError> {
    String::from_utf8(read_bytes(input, "string")?).map_err(|_| CodecError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::BincodeSerializer;
    use proptest::prelude::*;
    use serde::{Deserialize, Serialize};
    use spillway_common::tuple;
    use spillway_common::types::{ObjectType, ObjectValue};

    #[derive(Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    struct BooleanFlag(bool);

    impl ObjectType for BooleanFlag {
        const TYPE_NAME: &'static str = "BooleanFlag";
    }

    #[derive(Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    struct Text(String);

    impl ObjectType for Text {
        const TYPE_NAME: &'static str = "Text";
    }

    fn codec_with_tokens() -> TupleCodec {
        let serialization = Serialization::builder()
            .serializer(BincodeSerializer::<BooleanFlag>::shared())
            .serializer(BincodeSerializer::<Text>::shared())
            .tokens_from_spec("1000=BooleanFlag")
            .build()
            .unwrap();
        TupleCodec::new(Arc::new(serialization))
    }

    #[test]
    fn test_round_trip_builtins() {
        let codec = TupleCodec::new(Arc::new(Serialization::empty()));
        let t = tuple![
            Value::Null,
            true,
            -5i32,
            i64::MIN,
            3.25f64,
            "text",
            vec![1u8, 2, 3],
            tuple!["inner", Value::Null, tuple![]],
        ];
        let bytes = codec.encode(&t).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), t);
    }

    #[test]
    fn test_null_and_empty_tuple_encoding() {
        let codec = TupleCodec::new(Arc::new(Serialization::empty()));
        assert_eq!(codec.encode(&Tuple::empty()).unwrap(), vec![0]);
        assert_eq!(codec.encode(&tuple![Value::Null]).unwrap(), vec![1, 0]);
    }

    #[test]
    fn test_token_takes_precedence() {
        let codec = codec_with_tokens();
        let t = tuple![ObjectValue::new(BooleanFlag(true))];
        let bytes = codec.encode(&t).unwrap();

        // count, then token 1000 as a two byte varint
        assert_eq!(&bytes[..3], &[1, 0xE8, 0x07]);
        assert_eq!(codec.decode(&bytes).unwrap(), t);
    }

    #[test]
    fn test_named_fallback() {
        let codec = codec_with_tokens();
        let t = tuple![ObjectValue::new(Text("hi".into()))];
        let bytes = codec.encode(&t).unwrap();

        assert_eq!(bytes[1], TAG_NAMED as u8);
        let decoded = codec.decode(&bytes).unwrap();
        let object = decoded.get(0).and_then(Value::as_object).unwrap();
        assert_eq!(object.downcast_ref::<Text>(), Some(&Text("hi".into())));
    }

    #[test]
    fn test_token_decode_ignores_name_table() {
        let writer = codec_with_tokens();
        let bytes = writer
            .encode(&tuple![ObjectValue::new(BooleanFlag(false))])
            .unwrap();

        // same serializer available by name, but no token 1000
        let reader = TupleCodec::new(Arc::new(
            Serialization::builder()
                .serializer(BincodeSerializer::<BooleanFlag>::shared())
                .build()
                .unwrap(),
        ));
        assert!(matches!(
            reader.decode(&bytes),
            Err(CodecError::UnknownToken(1000))
        ));
    }

    #[test]
    fn test_token_only_serializer() {
        let serialization = Serialization::builder()
            .token_serializer(2000, BincodeSerializer::<Text>::shared())
            .build()
            .unwrap();
        let codec = TupleCodec::new(Arc::new(serialization));
        let t = tuple![ObjectValue::new(Text("x".into()))];
        assert_eq!(codec.decode(&codec.encode(&t).unwrap()).unwrap(), t);
    }

    #[test]
    fn test_unregistered_type_fails_at_write() {
        let codec = TupleCodec::new(Arc::new(Serialization::empty()));
        let t = tuple!["ok", ObjectValue::new(Text("x".into()))];
        let err = codec.encode(&t).unwrap_err();
        assert!(matches!(err, CodecError::UnregisteredType(name) if name == "Text"));
    }

    #[test]
    fn test_unknown_type_name_on_decode() {
        let codec = codec_with_tokens();
        let bytes = codec
            .encode(&tuple![ObjectValue::new(Text("x".into()))])
            .unwrap();
        let bare = TupleCodec::new(Arc::new(Serialization::empty()));
        assert!(matches!(
            bare.decode(&bytes),
            Err(CodecError::UnknownTypeName(name)) if name == "Text"
        ));
    }

    #[test]
    fn test_truncated_input() {
        let codec = TupleCodec::new(Arc::new(Serialization::empty()));
        let bytes = codec.encode(&tuple!["hello", 42i64]).unwrap();
        for cut in 1..bytes.len() {
            assert!(
                matches!(codec.decode(&bytes[..cut]), Err(CodecError::Truncated(_))),
                "cut at {cut} should be truncated"
            );
        }
    }

    #[test]
    fn test_trailing_bytes() {
        let codec = TupleCodec::new(Arc::new(Serialization::empty()));
        let mut bytes = codec.encode(&tuple![1i64]).unwrap();
        bytes.push(0);
        assert!(matches!(
            codec.decode(&bytes),
            Err(CodecError::TrailingBytes(1))
        ));
    }

    #[test]
    fn test_invalid_tag() {
        let codec = TupleCodec::new(Arc::new(Serialization::empty()));
        assert!(matches!(
            codec.decode(&[1, 42]),
            Err(CodecError::InvalidTag(42))
        ));
    }

    fn nested(levels: usize) -> Tuple {
        (0..levels).fold(tuple![1i64], |inner, _| tuple![inner])
    }

    #[test]
    fn test_nesting_limit_is_shared_by_encode_and_decode() {
        let codec = TupleCodec::new(Arc::new(Serialization::empty()));

        let deepest = nested(MAX_NESTING_DEPTH);
        let bytes = codec.encode(&deepest).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), deepest);

        assert!(matches!(
            codec.encode(&nested(MAX_NESTING_DEPTH + 1)),
            Err(CodecError::NestingTooDeep(MAX_NESTING_DEPTH))
        ));
    }

    #[test]
    fn test_corrupt_deep_nesting_is_an_error() {
        let codec = TupleCodec::new(Arc::new(Serialization::empty()));
        let corrupt = [1u8, 7].repeat(1_000_000);
        assert!(matches!(
            codec.decode(&corrupt),
            Err(CodecError::NestingTooDeep(MAX_NESTING_DEPTH))
        ));
    }

    #[test]
    fn test_sequential_tuples_share_a_stream() {
        let codec = codec_with_tokens();
        let first = tuple![1i64, ObjectValue::new(BooleanFlag(true))];
        let second = tuple!["two", ObjectValue::new(Text("t".into()))];

        let mut buf = Vec::new();
        codec.write_tuple(&mut buf, &first).unwrap();
        codec.write_tuple(&mut buf, &second).unwrap();

        let mut input = buf.as_slice();
        assert_eq!(codec.read_tuple(&mut input).unwrap(), first);
        assert_eq!(codec.read_tuple(&mut input).unwrap(), second);
        assert!(input.is_empty());
    }

    fn leaf_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i32>().prop_map(Value::Int32),
            any::<i64>().prop_map(Value::Int64),
            any::<f64>().prop_map(Value::Float64),
            ".{0,16}".prop_map(Value::from),
            proptest::collection::vec(any::<u8>(), 0..16).prop_map(Value::from),
            any::<bool>().prop_map(|b| Value::Object(ObjectValue::new(BooleanFlag(b)))),
            "[a-z]{0,8}".prop_map(|s| Value::Object(ObjectValue::new(Text(s)))),
        ]
    }

    fn tuple_strategy() -> impl Strategy<Value = Tuple> {
        let value = leaf_value().prop_recursive(3, 32, 6, |inner| {
            proptest::collection::vec(inner, 0..6).prop_map(|v| Value::Tuple(Tuple::new(v)))
        });
        proptest::collection::vec(value, 0..8).prop_map(Tuple::new)
    }

    proptest! {
        #[test]
        fn prop_round_trip(t in tuple_strategy()) {
            let codec = codec_with_tokens();
            let bytes = codec.encode(&t).unwrap();
            prop_assert_eq!(codec.decode(&bytes).unwrap(), t);
        }
    }
}
