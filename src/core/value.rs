//! Purpose: Runtime value model walked by the codec.
//! Exports: `Value`, `MapKey`, `Foreign`.
//! Role: The in-memory datum side of the dump/load boundary.
//! Invariants: `Text` is valid UTF-8 by construction; opaque bytes live in `Bytes`.
//! Invariants: `Map` and `Set` preserve insertion order; no cycles (tree-shaped only).

use std::fmt;

use time::{Date, OffsetDateTime};

/// Mapping key. Keys written by this codec serialize identically either
/// way; keys read back are always `Symbol`.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum MapKey {
    Text(String),
    Symbol(String),
}

impl MapKey {
    pub fn text(name: impl Into<String>) -> Self {
        MapKey::Text(name.into())
    }

    pub fn symbol(name: impl Into<String>) -> Self {
        MapKey::Symbol(name.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            MapKey::Text(name) | MapKey::Symbol(name) => name,
        }
    }
}

impl From<&str> for MapKey {
    fn from(name: &str) -> Self {
        MapKey::Symbol(name.to_string())
    }
}

impl From<String> for MapKey {
    fn from(name: String) -> Self {
        MapKey::Symbol(name)
    }
}

/// A host value the codec does not understand. Carries enough of a debug
/// representation to produce a useful rejection message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Foreign {
    type_name: String,
    repr: String,
}

impl Foreign {
    pub fn of<T: fmt::Debug + ?Sized>(value: &T) -> Self {
        Self {
            type_name: std::any::type_name::<T>().to_string(),
            repr: format!("{value:?}"),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn describe(&self) -> String {
        format!("{} {}", self.type_name, self.repr)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Symbol(String),
    Bytes(Vec<u8>),
    Date(Date),
    Timestamp(OffsetDateTime),
    Array(Vec<Value>),
    Set(Vec<Value>),
    Map(Vec<(MapKey, Value)>),
    Foreign(Foreign),
}

impl Value {
    pub fn text(value: impl Into<String>) -> Self {
        Value::Text(value.into())
    }

    pub fn symbol(name: impl Into<String>) -> Self {
        Value::Symbol(name.into())
    }

    pub fn bytes(value: impl Into<Vec<u8>>) -> Self {
        Value::Bytes(value.into())
    }

    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(items.into_iter().collect())
    }

    /// Builds a set-like collection, dropping duplicates while keeping
    /// first-seen order.
    pub fn set(items: impl IntoIterator<Item = Value>) -> Self {
        let mut unique: Vec<Value> = Vec::new();
        for item in items {
            if !unique.contains(&item) {
                unique.push(item);
            }
        }
        Value::Set(unique)
    }

    pub fn map(entries: impl IntoIterator<Item = (MapKey, Value)>) -> Self {
        Value::Map(entries.into_iter().collect())
    }

    pub fn foreign<T: fmt::Debug + ?Sized>(value: &T) -> Self {
        Value::Foreign(Foreign::of(value))
    }

    /// Short kind label used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Symbol(_) => "symbol",
            Value::Bytes(_) => "bytes",
            Value::Date(_) => "date",
            Value::Timestamp(_) => "timestamp",
            Value::Array(_) => "array",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
            Value::Foreign(_) => "foreign",
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}
