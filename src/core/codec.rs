//! Purpose: Hybrid text/binary value codec (`dump`/`load` and the
//! recursive marshal/unmarshal passes).
//! Exports: `Codec`, `CodecOptions`, `BINARY_MARKER_KEY`, `dump`, `load`.
//! Role: The wire boundary between in-memory values and stored payloads.
//! Invariants: Encode emits JSON only; the legacy sentinel is recognized,
//! never produced.
//! Invariants: Marshal/unmarshal build fresh trees; inputs are never
//! mutated.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Map as JsonMap, Number, Value as JsonValue};

use crate::core::error::{Error, ErrorKind};
use crate::core::hooks::{ContainerHook, ContainerHooks};
use crate::core::legacy::{LEGACY_SENTINEL, LegacyCodec, TaggedBinary};
use crate::core::temporal;
use crate::core::value::{MapKey, Value};

/// Reserved wrapper key for opaque bytes inside the JSON tree. User maps
/// may not use it; encode rejects them so the wrapper stays unambiguous.
pub const BINARY_MARKER_KEY: &str = "$binary";

#[derive(Clone, Copy, Debug)]
pub struct CodecOptions {
    /// Accept `Set` values on encode, converting them to arrays. With this
    /// off, sets are rejected like any other unsupported kind.
    pub set_support: bool,
    /// Consult the container hook registry for reserved mapping keys on
    /// decode. With this off, every mapping value unmarshals uniformly.
    pub container_hooks: bool,
    /// Restore date/timestamp-shaped strings to temporal values on decode.
    pub restore_temporals: bool,
}

impl CodecOptions {
    pub fn new() -> Self {
        Self {
            set_support: true,
            container_hooks: true,
            restore_temporals: true,
        }
    }
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Codec {
    options: CodecOptions,
    hooks: ContainerHooks,
    legacy: Box<dyn LegacyCodec>,
}

impl Codec {
    pub fn new() -> Self {
        Self::with_options(CodecOptions::new())
    }

    pub fn with_options(options: CodecOptions) -> Self {
        Self {
            options,
            hooks: ContainerHooks::standard(),
            legacy: Box::new(TaggedBinary),
        }
    }

    pub fn options(&self) -> CodecOptions {
        self.options
    }

    pub fn hooks(&self) -> &ContainerHooks {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut ContainerHooks {
        &mut self.hooks
    }

    pub fn with_hooks(mut self, hooks: ContainerHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_legacy_codec(mut self, legacy: impl LegacyCodec + 'static) -> Self {
        self.legacy = Box::new(legacy);
        self
    }

    /// Serializes a value to its wire payload. Fails with
    /// `ErrorKind::Serialization` on any unsupported leaf.
    pub fn dump(&self, value: &Value) -> Result<String, Error> {
        let tree = self.marshal(value)?;
        serde_json::to_string(&tree).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to serialize marshaled tree")
                .with_source(err)
        })
    }

    /// Restores a value from a stored payload. A sentinel-prefixed payload
    /// is decoded whole by the legacy codec; anything else must be UTF-8
    /// JSON. Note the sentinel check also applies to strings nested inside
    /// the JSON tree, so ordinary text beginning with the control byte is
    /// indistinguishable from an embedded legacy blob.
    pub fn load(&self, payload: &[u8]) -> Result<Value, Error> {
        if payload.first() == Some(&LEGACY_SENTINEL) {
            return self.legacy.decode(payload);
        }
        let text = std::str::from_utf8(payload).map_err(|err| {
            Error::new(ErrorKind::Parse)
                .with_message("payload is not valid utf-8")
                .with_source(err)
        })?;
        let node: JsonValue = serde_json::from_str(text).map_err(|err| {
            Error::new(ErrorKind::Parse)
                .with_message("payload is not valid json")
                .with_source(err)
        })?;
        self.unmarshal(&node)
    }

    fn marshal(&self, value: &Value) -> Result<JsonValue, Error> {
        match value {
            Value::Null => Ok(JsonValue::Null),
            Value::Bool(v) => Ok(JsonValue::Bool(*v)),
            Value::Int(v) => Ok(JsonValue::Number(Number::from(*v))),
            Value::Float(v) => Number::from_f64(*v).map(JsonValue::Number).ok_or_else(|| {
                Error::new(ErrorKind::Serialization)
                    .with_message(format!("cannot serialize non-finite float {v}"))
            }),
            Value::Text(text) => Ok(JsonValue::String(text.clone())),
            Value::Symbol(name) => Ok(JsonValue::String(name.clone())),
            Value::Bytes(bytes) => {
                let mut wrapper = JsonMap::with_capacity(1);
                wrapper.insert(
                    BINARY_MARKER_KEY.to_string(),
                    JsonValue::String(BASE64.encode(bytes)),
                );
                Ok(JsonValue::Object(wrapper))
            }
            Value::Date(date) => Ok(JsonValue::String(temporal::format_date(date)?)),
            Value::Timestamp(timestamp) => {
                Ok(JsonValue::String(temporal::format_timestamp(timestamp)?))
            }
            Value::Array(items) => self.marshal_items(items).map(JsonValue::Array),
            Value::Set(items) => {
                if !self.options.set_support {
                    return Err(Error::new(ErrorKind::Serialization)
                        .with_message(format!("cannot serialize value: {value:?}")));
                }
                self.marshal_items(items).map(JsonValue::Array)
            }
            Value::Map(entries) => {
                let mut map = JsonMap::with_capacity(entries.len());
                for (key, item) in entries {
                    if key.as_str() == BINARY_MARKER_KEY {
                        return Err(Error::new(ErrorKind::Serialization)
                            .with_message(format!(
                                "reserved key {BINARY_MARKER_KEY:?} cannot appear in a map"
                            ))
                            .with_hint("The key is claimed by the binary wrapper; rename it."));
                    }
                    map.insert(key.as_str().to_string(), self.marshal(item)?);
                }
                Ok(JsonValue::Object(map))
            }
            Value::Foreign(foreign) => Err(Error::new(ErrorKind::Serialization)
                .with_message(format!("cannot serialize value: {}", foreign.describe()))),
        }
    }

    fn marshal_items(&self, items: &[Value]) -> Result<Vec<JsonValue>, Error> {
        items.iter().map(|item| self.marshal(item)).collect()
    }

    fn unmarshal(&self, node: &JsonValue) -> Result<Value, Error> {
        match node {
            JsonValue::Object(map) => {
                if let Some(bytes) = binary_wrapper(map)? {
                    return Ok(Value::Bytes(bytes));
                }
                let mut entries = Vec::with_capacity(map.len());
                for (key, item) in map {
                    let value = match self.container_hook(key) {
                        Some(hook) => {
                            let raw = literal(item);
                            match hook.reconstruct(raw.clone()) {
                                Ok(out) => out,
                                Err(err) if err.kind() == ErrorKind::Unavailable => raw,
                                Err(err) => return Err(err),
                            }
                        }
                        None => self.unmarshal(item)?,
                    };
                    entries.push((MapKey::Symbol(key.clone()), value));
                }
                Ok(Value::Map(entries))
            }
            JsonValue::Array(items) => items
                .iter()
                .map(|item| self.unmarshal(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            JsonValue::String(text) => {
                if text.as_bytes().first() == Some(&LEGACY_SENTINEL) {
                    return self.legacy.decode(text.as_bytes());
                }
                if self.options.restore_temporals {
                    if let Some(restored) = temporal::detect(text) {
                        return Ok(restored);
                    }
                }
                Ok(Value::Text(text.clone()))
            }
            JsonValue::Bool(v) => Ok(Value::Bool(*v)),
            JsonValue::Number(number) => Ok(number_value(number)),
            JsonValue::Null => Ok(Value::Null),
        }
    }

    fn container_hook(&self, key: &str) -> Option<&Arc<dyn ContainerHook>> {
        if !self.options.container_hooks {
            return None;
        }
        self.hooks.get(key)
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

/// `Codec::dump` over a default codec.
pub fn dump(value: &Value) -> Result<String, Error> {
    Codec::new().dump(value)
}

/// `Codec::load` over a default codec.
pub fn load(payload: &[u8]) -> Result<Value, Error> {
    Codec::new().load(payload)
}

fn binary_wrapper(map: &JsonMap<String, JsonValue>) -> Result<Option<Vec<u8>>, Error> {
    if map.len() != 1 {
        return Ok(None);
    }
    let Some(JsonValue::String(body)) = map.get(BINARY_MARKER_KEY) else {
        return Ok(None);
    };
    let bytes = BASE64.decode(body).map_err(|err| {
        Error::new(ErrorKind::Parse)
            .with_message("invalid base64 in binary wrapper")
            .with_source(err)
    })?;
    Ok(Some(bytes))
}

fn number_value(number: &Number) -> Value {
    match number.as_i64() {
        Some(v) => Value::Int(v),
        // u64 beyond i64 range and proper floats both land here.
        None => Value::Float(number.as_f64().unwrap_or(0.0)),
    }
}

/// Literal conversion of a parsed JSON node: symbolized keys, nothing
/// restored. This is what a special-container hook receives, and what is
/// kept when its collaborator is absent.
fn literal(node: &JsonValue) -> Value {
    match node {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(v) => Value::Bool(*v),
        JsonValue::Number(number) => number_value(number),
        JsonValue::String(text) => Value::Text(text.clone()),
        JsonValue::Array(items) => Value::Array(items.iter().map(literal).collect()),
        JsonValue::Object(map) => Value::Map(
            map.iter()
                .map(|(key, item)| (MapKey::Symbol(key.clone()), literal(item)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::{BINARY_MARKER_KEY, Codec, CodecOptions, dump, load};
    use crate::core::error::{Error, ErrorKind};
    use crate::core::hooks::{ContainerHook, ContainerHooks};
    use crate::core::legacy::{LegacyCodec, TaggedBinary};
    use crate::core::value::{MapKey, Value};
    use std::sync::Arc;
    use time::{Date, Month, OffsetDateTime};

    fn symbol_map(entries: Vec<(&str, Value)>) -> Value {
        Value::Map(
            entries
                .into_iter()
                .map(|(key, value)| (MapKey::symbol(key), value))
                .collect(),
        )
    }

    #[test]
    fn dump_emits_plain_json_in_key_order() {
        let value = Value::map([
            (MapKey::symbol("a"), Value::Int(1)),
            (
                MapKey::symbol("b"),
                Value::array([Value::Bool(true), Value::Null, Value::text("x")]),
            ),
        ]);
        let payload = dump(&value).expect("dump");
        assert_eq!(payload, r#"{"a":1,"b":[true,null,"x"]}"#);
    }

    #[test]
    fn round_trip_restores_the_tree_with_symbol_keys() {
        let value = Value::map([
            (MapKey::text("a"), Value::Int(1)),
            (
                MapKey::symbol("b"),
                Value::array([Value::Bool(true), Value::Null, Value::text("x")]),
            ),
            (
                MapKey::symbol("inner"),
                Value::map([(MapKey::symbol("n"), Value::Float(2.5))]),
            ),
        ]);
        let restored = load(dump(&value).expect("dump").as_bytes()).expect("load");
        let expected = symbol_map(vec![
            ("a", Value::Int(1)),
            (
                "b",
                Value::array([Value::Bool(true), Value::Null, Value::text("x")]),
            ),
            ("inner", symbol_map(vec![("n", Value::Float(2.5))])),
        ]);
        assert_eq!(restored, expected);
    }

    #[test]
    fn sets_come_back_as_arrays() {
        let value = Value::set([Value::Int(3), Value::Int(1), Value::Int(2)]);
        let restored = load(dump(&value).expect("dump").as_bytes()).expect("load");
        assert_eq!(
            restored,
            Value::array([Value::Int(3), Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn symbols_collapse_to_text_on_load() {
        let restored = load(dump(&Value::symbol("ready")).expect("dump").as_bytes()).expect("load");
        assert_eq!(restored, Value::text("ready"));
    }

    #[test]
    fn foreign_leaves_are_rejected_with_their_repr() {
        #[derive(Debug)]
        struct Session {
            user: &'static str,
        }
        let value = symbol_map(vec![("session", Value::foreign(&Session { user: "ada" }))]);
        let err = dump(&value).expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::Serialization);
        let message = err.message().unwrap_or_default();
        assert!(message.contains("cannot serialize value"));
        assert!(message.contains("ada"));
    }

    #[test]
    fn opaque_bytes_round_trip_exactly() {
        let bytes = vec![0x00, 0x04, 0x9f, 0xff, 0x10];
        let payload = dump(&Value::bytes(bytes.clone())).expect("dump");
        assert!(payload.contains(BINARY_MARKER_KEY));
        let restored = load(payload.as_bytes()).expect("load");
        assert_eq!(restored, Value::Bytes(bytes));
    }

    #[test]
    fn reserved_wrapper_key_is_rejected_in_user_maps() {
        let value = Value::map([(MapKey::symbol(BINARY_MARKER_KEY), Value::Int(1))]);
        let err = dump(&value).expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::Serialization);
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        let err = dump(&Value::Float(f64::NAN)).expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::Serialization);
        let err = dump(&Value::Float(f64::INFINITY)).expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::Serialization);
    }

    #[test]
    fn legacy_payloads_are_detected_by_sentinel() {
        let value = symbol_map(vec![
            ("id", Value::Int(9)),
            ("blob", Value::bytes(vec![0xde, 0xad])),
        ]);
        let blob = TaggedBinary.encode(&value).expect("legacy encode");
        let restored = load(&blob).expect("load");
        assert_eq!(restored, value);
    }

    #[test]
    fn nested_sentinel_strings_are_legacy_restored() {
        let blob = TaggedBinary.encode(&Value::text("hi")).expect("legacy encode");
        let embedded = String::from_utf8(blob).expect("ascii-safe blob");
        let payload = serde_json::to_string(&serde_json::json!([[{ "deep": [embedded] }]]))
            .expect("payload");
        let restored = load(payload.as_bytes()).expect("load");
        let expected = Value::array([Value::array([symbol_map(vec![(
            "deep",
            Value::array([Value::text("hi")]),
        )])])]);
        assert_eq!(restored, expected);
    }

    #[test]
    fn flash_container_passes_through_when_collaborator_is_absent() {
        let restored = load(br#"{"flash": {"k": "v"}}"#).expect("load");
        let expected = symbol_map(vec![("flash", symbol_map(vec![("k", Value::text("v"))]))]);
        assert_eq!(restored, expected);
    }

    #[test]
    fn registered_hook_reconstructs_its_container() {
        struct Mark;
        impl ContainerHook for Mark {
            fn reconstruct(&self, value: Value) -> Result<Value, Error> {
                Ok(Value::array([Value::symbol("reconstructed"), value]))
            }
        }

        let mut hooks = ContainerHooks::new();
        hooks.register("wrapped", Arc::new(Mark));
        let codec = Codec::new().with_hooks(hooks);
        let restored = codec.load(br#"{"wrapped": {"k": 1}}"#).expect("load");
        let expected = symbol_map(vec![(
            "wrapped",
            Value::array([
                Value::symbol("reconstructed"),
                symbol_map(vec![("k", Value::Int(1))]),
            ]),
        )]);
        assert_eq!(restored, expected);
    }

    #[test]
    fn hook_failures_other_than_unavailable_propagate() {
        struct Broken;
        impl ContainerHook for Broken {
            fn reconstruct(&self, _value: Value) -> Result<Value, Error> {
                Err(Error::new(ErrorKind::Corrupt).with_message("bad container shape"))
            }
        }

        let mut hooks = ContainerHooks::new();
        hooks.register("flash", Arc::new(Broken));
        let codec = Codec::new().with_hooks(hooks);
        let err = codec.load(br#"{"flash": {}}"#).expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn disabling_hooks_unmarshals_reserved_keys_uniformly() {
        struct Mark;
        impl ContainerHook for Mark {
            fn reconstruct(&self, _value: Value) -> Result<Value, Error> {
                Ok(Value::symbol("reconstructed"))
            }
        }

        let options = CodecOptions {
            container_hooks: false,
            ..CodecOptions::new()
        };
        let mut hooks = ContainerHooks::new();
        hooks.register("wrapped", Arc::new(Mark));
        let codec = Codec::with_options(options).with_hooks(hooks);
        let restored = codec.load(br#"{"wrapped": {"k": 1}}"#).expect("load");
        let expected = symbol_map(vec![("wrapped", symbol_map(vec![("k", Value::Int(1))]))]);
        assert_eq!(restored, expected);
    }

    #[test]
    fn disabling_set_support_rejects_sets() {
        let options = CodecOptions {
            set_support: false,
            ..CodecOptions::new()
        };
        let codec = Codec::with_options(options);
        let err = codec
            .dump(&Value::set([Value::Int(1)]))
            .expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::Serialization);
    }

    #[test]
    fn temporals_round_trip_and_can_be_left_raw() {
        let date = Date::from_calendar_date(2026, Month::August, 6).expect("date");
        let timestamp = OffsetDateTime::from_unix_timestamp(1_754_000_000).expect("ts");
        let value = symbol_map(vec![
            ("on", Value::Date(date)),
            ("at", Value::Timestamp(timestamp)),
        ]);
        let payload = dump(&value).expect("dump");
        assert_eq!(load(payload.as_bytes()).expect("load"), value);

        let options = CodecOptions {
            restore_temporals: false,
            ..CodecOptions::new()
        };
        let codec = Codec::with_options(options);
        let raw = codec.load(payload.as_bytes()).expect("load");
        let expected = symbol_map(vec![
            ("on", Value::text("2026-08-06")),
            ("at", Value::text("2025-07-31T22:13:20Z")),
        ]);
        assert_eq!(raw, expected);
    }

    #[test]
    fn malformed_payloads_are_parse_errors() {
        assert_eq!(load(b"").expect_err("empty").kind(), ErrorKind::Parse);
        assert_eq!(load(b"{oops").expect_err("syntax").kind(), ErrorKind::Parse);
        assert_eq!(
            load(&[0xff, 0xfe, b'{', b'}']).expect_err("utf-8").kind(),
            ErrorKind::Parse
        );
    }

    #[test]
    fn malformed_binary_wrapper_is_a_parse_error() {
        let err = load(br#"{"$binary": "not base64!!"}"#).expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn large_unsigned_integers_load_as_floats() {
        let restored = load(b"18446744073709551615").expect("load");
        assert!(matches!(restored, Value::Float(_)));
    }

    #[test]
    fn substitute_legacy_codec_is_consulted() {
        struct Fixed;
        impl LegacyCodec for Fixed {
            fn encode(&self, _value: &Value) -> Result<Vec<u8>, Error> {
                Ok(vec![0x04])
            }
            fn decode(&self, _bytes: &[u8]) -> Result<Value, Error> {
                Ok(Value::symbol("fixed"))
            }
        }

        let codec = Codec::new().with_legacy_codec(Fixed);
        let restored = codec.load(&[0x04, 0x00, 0x01]).expect("load");
        assert_eq!(restored, Value::symbol("fixed"));
    }
}
