//! Purpose: Sentinel constant and the legacy binary serializer boundary.
//! Exports: `LEGACY_SENTINEL`, `LegacyCodec`, `TaggedBinary`.
//! Role: Opaque binary collaborator recognized by the decoder's prefix check.
//! Invariants: Every encoded blob begins with the sentinel byte.
//! Invariants: Decode consumes the whole payload; trailing bytes are corrupt.

use crate::core::error::{Error, ErrorKind};
use crate::core::temporal;
use crate::core::value::{MapKey, Value};

/// Control byte marking a legacy binary payload at offset 0.
pub const LEGACY_SENTINEL: u8 = 0x04;

const FORMAT_VERSION: u8 = 0x01;

const TAG_NULL: u8 = 0x10;
const TAG_FALSE: u8 = 0x11;
const TAG_TRUE: u8 = 0x12;
const TAG_INT: u8 = 0x13;
const TAG_FLOAT: u8 = 0x14;
const TAG_TEXT: u8 = 0x15;
const TAG_SYMBOL: u8 = 0x16;
const TAG_BYTES: u8 = 0x17;
const TAG_DATE: u8 = 0x18;
const TAG_TIMESTAMP: u8 = 0x19;
const TAG_ARRAY: u8 = 0x1a;
const TAG_SET: u8 = 0x1b;
const TAG_MAP: u8 = 0x1c;

const KEY_TEXT: u8 = 0x00;
const KEY_SYMBOL: u8 = 0x01;

/// Legacy binary serializer/deserializer pair. The decoder only assumes
/// the contract: arbitrary value in, sentinel-prefixed bytes out, and the
/// reverse.
pub trait LegacyCodec: Send + Sync {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, Error>;
    fn decode(&self, bytes: &[u8]) -> Result<Value, Error>;
}

/// Built-in legacy format: sentinel, version byte, then a tag-prefixed
/// tree with little-endian lengths.
#[derive(Clone, Copy, Debug, Default)]
pub struct TaggedBinary;

impl LegacyCodec for TaggedBinary {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, Error> {
        let mut buf = vec![LEGACY_SENTINEL, FORMAT_VERSION];
        encode_value(value, &mut buf)?;
        Ok(buf)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, Error> {
        let mut reader = Reader::new(bytes);
        let sentinel = reader.read_u8()?;
        if sentinel != LEGACY_SENTINEL {
            return Err(Error::new(ErrorKind::Corrupt).with_message("missing legacy sentinel"));
        }
        let version = reader.read_u8()?;
        if version != FORMAT_VERSION {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message(format!("unsupported legacy format version {version}")));
        }
        let value = decode_value(&mut reader)?;
        if !reader.is_at_end() {
            return Err(Error::new(ErrorKind::Corrupt).with_message("trailing bytes after legacy value"));
        }
        Ok(value)
    }
}

fn encode_value(value: &Value, buf: &mut Vec<u8>) -> Result<(), Error> {
    match value {
        Value::Null => buf.push(TAG_NULL),
        Value::Bool(false) => buf.push(TAG_FALSE),
        Value::Bool(true) => buf.push(TAG_TRUE),
        Value::Int(v) => {
            buf.push(TAG_INT);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Value::Float(v) => {
            buf.push(TAG_FLOAT);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Value::Text(text) => {
            buf.push(TAG_TEXT);
            write_blob(text.as_bytes(), buf)?;
        }
        Value::Symbol(name) => {
            buf.push(TAG_SYMBOL);
            write_blob(name.as_bytes(), buf)?;
        }
        Value::Bytes(bytes) => {
            buf.push(TAG_BYTES);
            write_blob(bytes, buf)?;
        }
        Value::Date(date) => {
            buf.push(TAG_DATE);
            write_blob(temporal::format_date(date)?.as_bytes(), buf)?;
        }
        Value::Timestamp(timestamp) => {
            buf.push(TAG_TIMESTAMP);
            write_blob(temporal::format_timestamp(timestamp)?.as_bytes(), buf)?;
        }
        Value::Array(items) => {
            buf.push(TAG_ARRAY);
            write_count(items.len(), buf)?;
            for item in items {
                encode_value(item, buf)?;
            }
        }
        Value::Set(items) => {
            buf.push(TAG_SET);
            write_count(items.len(), buf)?;
            for item in items {
                encode_value(item, buf)?;
            }
        }
        Value::Map(entries) => {
            buf.push(TAG_MAP);
            write_count(entries.len(), buf)?;
            for (key, item) in entries {
                match key {
                    MapKey::Text(_) => buf.push(KEY_TEXT),
                    MapKey::Symbol(_) => buf.push(KEY_SYMBOL),
                }
                write_blob(key.as_str().as_bytes(), buf)?;
                encode_value(item, buf)?;
            }
        }
        Value::Foreign(foreign) => {
            return Err(Error::new(ErrorKind::Serialization)
                .with_message(format!("cannot serialize value: {}", foreign.describe())));
        }
    }
    Ok(())
}

fn write_count(count: usize, buf: &mut Vec<u8>) -> Result<(), Error> {
    let count = u32::try_from(count).map_err(|_| {
        Error::new(ErrorKind::Usage).with_message("collection too large for legacy encoding")
    })?;
    buf.extend_from_slice(&count.to_le_bytes());
    Ok(())
}

fn write_blob(bytes: &[u8], buf: &mut Vec<u8>) -> Result<(), Error> {
    write_count(bytes.len(), buf)?;
    buf.extend_from_slice(bytes);
    Ok(())
}

fn decode_value(reader: &mut Reader<'_>) -> Result<Value, Error> {
    let tag = reader.read_u8()?;
    let value = match tag {
        TAG_NULL => Value::Null,
        TAG_FALSE => Value::Bool(false),
        TAG_TRUE => Value::Bool(true),
        TAG_INT => Value::Int(i64::from_le_bytes(reader.read_8()?)),
        TAG_FLOAT => Value::Float(f64::from_le_bytes(reader.read_8()?)),
        TAG_TEXT => Value::Text(reader.read_str()?),
        TAG_SYMBOL => Value::Symbol(reader.read_str()?),
        TAG_BYTES => {
            let len = reader.read_u32()? as usize;
            Value::Bytes(reader.take(len)?.to_vec())
        }
        TAG_DATE => Value::Date(temporal::parse_date(&reader.read_str()?)?),
        TAG_TIMESTAMP => Value::Timestamp(temporal::parse_timestamp(&reader.read_str()?)?),
        TAG_ARRAY => Value::Array(decode_items(reader)?),
        TAG_SET => Value::Set(decode_items(reader)?),
        TAG_MAP => {
            let count = reader.read_u32()? as usize;
            let mut entries = Vec::with_capacity(count.min(4096));
            for _ in 0..count {
                let key = match reader.read_u8()? {
                    KEY_TEXT => MapKey::Text(reader.read_str()?),
                    KEY_SYMBOL => MapKey::Symbol(reader.read_str()?),
                    kind => {
                        return Err(Error::new(ErrorKind::Corrupt)
                            .with_message(format!("invalid map key kind 0x{kind:02x}")));
                    }
                };
                entries.push((key, decode_value(reader)?));
            }
            Value::Map(entries)
        }
        tag => {
            return Err(
                Error::new(ErrorKind::Corrupt).with_message(format!("unknown legacy tag 0x{tag:02x}"))
            );
        }
    };
    Ok(value)
}

fn decode_items(reader: &mut Reader<'_>) -> Result<Vec<Value>, Error> {
    let count = reader.read_u32()? as usize;
    let mut items = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        items.push(decode_value(reader)?);
    }
    Ok(items)
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn is_at_end(&self) -> bool {
        self.pos == self.bytes.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], Error> {
        let end = self.pos.checked_add(len).filter(|&end| end <= self.bytes.len());
        let Some(end) = end else {
            return Err(Error::new(ErrorKind::Corrupt).with_message("truncated legacy payload"));
        };
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32, Error> {
        let mut out = [0u8; 4];
        out.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(out))
    }

    fn read_8(&mut self) -> Result<[u8; 8], Error> {
        let mut out = [0u8; 8];
        out.copy_from_slice(self.take(8)?);
        Ok(out)
    }

    fn read_str(&mut self) -> Result<String, Error> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        let text = std::str::from_utf8(bytes).map_err(|err| {
            Error::new(ErrorKind::Corrupt)
                .with_message("invalid utf-8 in legacy string")
                .with_source(err)
        })?;
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{LEGACY_SENTINEL, LegacyCodec, TaggedBinary};
    use crate::core::error::ErrorKind;
    use crate::core::value::{MapKey, Value};
    use time::{Date, Month, OffsetDateTime};

    fn composite() -> Value {
        Value::map([
            (MapKey::symbol("id"), Value::Int(42)),
            (MapKey::text("label"), Value::text("session")),
            (
                MapKey::symbol("payload"),
                Value::array([
                    Value::Null,
                    Value::Bool(true),
                    Value::Float(1.5),
                    Value::bytes(vec![0x00, 0xff, 0x04]),
                    Value::symbol("ok"),
                ]),
            ),
            (
                MapKey::symbol("tags"),
                Value::set([Value::text("a"), Value::text("b")]),
            ),
            (
                MapKey::symbol("created_on"),
                Value::Date(Date::from_calendar_date(2026, Month::August, 6).expect("date")),
            ),
            (
                MapKey::symbol("seen_at"),
                Value::Timestamp(OffsetDateTime::from_unix_timestamp(1_754_000_000).expect("ts")),
            ),
        ])
    }

    #[test]
    fn blob_round_trips_and_starts_with_sentinel() {
        let codec = TaggedBinary;
        let value = composite();
        let blob = codec.encode(&value).expect("encode");
        assert_eq!(blob.first(), Some(&LEGACY_SENTINEL));
        assert_eq!(codec.decode(&blob).expect("decode"), value);
    }

    #[test]
    fn truncated_payload_is_corrupt() {
        let codec = TaggedBinary;
        let blob = codec.encode(&Value::text("hello")).expect("encode");
        let err = codec.decode(&blob[..blob.len() - 1]).expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn trailing_bytes_are_corrupt() {
        let codec = TaggedBinary;
        let mut blob = codec.encode(&Value::Int(1)).expect("encode");
        blob.push(0x00);
        let err = codec.decode(&blob).expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn unknown_tag_is_corrupt() {
        let codec = TaggedBinary;
        let blob = vec![LEGACY_SENTINEL, 0x01, 0x7f];
        let err = codec.decode(&blob).expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
        assert!(err.message().unwrap_or_default().contains("unknown legacy tag"));
    }

    #[test]
    fn wrong_sentinel_is_corrupt() {
        let codec = TaggedBinary;
        let err = codec.decode(b"{}").expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn foreign_values_are_rejected_on_encode() {
        let codec = TaggedBinary;
        let err = codec
            .encode(&Value::foreign(&"anything"))
            .expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::Serialization);
    }
}
