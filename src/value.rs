// src/value.rs
//
// =============================================================================
// DAGFLOW: VALUE & TYPE SYSTEM
// =============================================================================
//
// The typed payloads that flow along workflow edges.
//
// Design principles:
// 1. Values are immutable and cheap to clone (shared payloads).
// 2. Every value carries its concrete variant type; the type algebra is keyed
//    by an (origin, args) pair so generic variants like Sequence<Integer> and
//    Sequence<Float> are distinct.
// 3. Equality and hash cover the payload only; the per-value cast-memoization
//    cell is bookkeeping and never observable.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use serde::{Serialize, Serializer};
use serde_json::Value as Json;

use crate::error::UserError;
use crate::file::{FileKind, FileRef};
use crate::record::{Record, RecordType};

// ============================================================================
// 1. TYPE ALGEBRA
// ============================================================================

/// The concrete variant type of a [`Value`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// The top type: every variant is a subtype of `Any`.
    Any,
    Null,
    Boolean,
    Integer,
    Float,
    String,
    Sequence(Box<ValueType>),
    StringMap(Box<ValueType>),
    Data(RecordType),
    File(FileKind),
}

/// A variant origin: the type with its generic arguments stripped.
///
/// Caster registration is keyed by `(source origin, target origin)`; each
/// origin inherits the casters of its ancestors, so the chain for
/// `JSONFile` is `JSONFile -> TextFile -> BlobFile -> Any`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Origin {
    Any,
    Null,
    Boolean,
    Integer,
    Float,
    String,
    Sequence,
    StringMap,
    Data,
    File(FileKind),
}

impl Origin {
    /// The origin chain from `self` (inclusive) up to `Any` (inclusive),
    /// nearest first.
    pub fn ancestors(self) -> Vec<Origin> {
        let mut chain = vec![self];
        if let Origin::File(mut kind) = self {
            while let Some(parent) = kind.parent() {
                chain.push(Origin::File(parent));
                kind = parent;
            }
        }
        if self != Origin::Any {
            chain.push(Origin::Any);
        }
        chain
    }
}

impl ValueType {
    pub fn sequence_of(item: ValueType) -> ValueType {
        ValueType::Sequence(Box::new(item))
    }

    pub fn string_map_of(item: ValueType) -> ValueType {
        ValueType::StringMap(Box::new(item))
    }

    pub fn origin(&self) -> Origin {
        match self {
            ValueType::Any => Origin::Any,
            ValueType::Null => Origin::Null,
            ValueType::Boolean => Origin::Boolean,
            ValueType::Integer => Origin::Integer,
            ValueType::Float => Origin::Float,
            ValueType::String => Origin::String,
            ValueType::Sequence(_) => Origin::Sequence,
            ValueType::StringMap(_) => Origin::StringMap,
            ValueType::Data(_) => Origin::Data,
            ValueType::File(kind) => Origin::File(*kind),
        }
    }

    /// Structural subtyping: reflexivity, `Any` as top, file-kind ancestry,
    /// and covariant containers (values are read-only, so covariance is
    /// sound).
    pub fn is_subtype_of(&self, other: &ValueType) -> bool {
        if other == &ValueType::Any {
            return true;
        }
        match (self, other) {
            (ValueType::Sequence(a), ValueType::Sequence(b)) => a.is_subtype_of(b),
            (ValueType::StringMap(a), ValueType::StringMap(b)) => a.is_subtype_of(b),
            (ValueType::File(a), ValueType::File(b)) => a.is_kind_of(*b),
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Any => write!(f, "Any"),
            ValueType::Null => write!(f, "Null"),
            ValueType::Boolean => write!(f, "Boolean"),
            ValueType::Integer => write!(f, "Integer"),
            ValueType::Float => write!(f, "Float"),
            ValueType::String => write!(f, "String"),
            ValueType::Sequence(item) => write!(f, "Sequence<{item}>"),
            ValueType::StringMap(item) => write!(f, "StringMap<{item}>"),
            ValueType::Data(record) => write!(f, "Data<{}>", record.name()),
            ValueType::File(kind) => write!(f, "{}", kind.type_name()),
        }
    }
}

// ============================================================================
// 2. VALUES
// ============================================================================

#[derive(Debug, PartialEq)]
pub(crate) enum Payload {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Sequence(Vec<Value>),
    StringMap(BTreeMap<String, Value>),
    Record(Record),
    File(FileRef),
}

/// An immutable, typed payload carrier.
///
/// Cloning shares the payload and the cast-memoization cell, so a cast
/// performed through any clone is visible to all clones of the same value
/// instance.
#[derive(Clone)]
pub struct Value {
    ty: ValueType,
    payload: Arc<Payload>,
    memo: Arc<Mutex<HashMap<ValueType, Value>>>,
}

impl Value {
    fn from_parts(ty: ValueType, payload: Payload) -> Self {
        Self {
            ty,
            payload: Arc::new(payload),
            memo: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn null() -> Self {
        Self::from_parts(ValueType::Null, Payload::Null)
    }

    pub fn boolean(value: bool) -> Self {
        Self::from_parts(ValueType::Boolean, Payload::Boolean(value))
    }

    pub fn integer(value: i64) -> Self {
        Self::from_parts(ValueType::Integer, Payload::Integer(value))
    }

    pub fn float(value: f64) -> Self {
        Self::from_parts(ValueType::Float, Payload::Float(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::from_parts(ValueType::String, Payload::String(value.into()))
    }

    pub fn file(file: FileRef) -> Self {
        Self::from_parts(ValueType::File(file.kind()), Payload::File(file))
    }

    pub fn record(record: Record) -> Self {
        Self::from_parts(
            ValueType::Data(record.record_type().clone()),
            Payload::Record(record),
        )
    }

    /// Builds a `Sequence<item>` value; every item must be a subtype of the
    /// declared item type.
    pub fn sequence(item: ValueType, items: Vec<Value>) -> Result<Self, UserError> {
        for value in &items {
            if !value.value_type().is_subtype_of(&item) {
                return Err(UserError::new(format!(
                    "sequence item has type {}, expected {item}",
                    value.value_type()
                )));
            }
        }
        Ok(Self::from_parts(
            ValueType::sequence_of(item),
            Payload::Sequence(items),
        ))
    }

    /// Builds a `StringMap<item>` value; every entry must be a subtype of the
    /// declared item type.
    pub fn string_map(
        item: ValueType,
        entries: BTreeMap<String, Value>,
    ) -> Result<Self, UserError> {
        for (key, value) in &entries {
            if !value.value_type().is_subtype_of(&item) {
                return Err(UserError::new(format!(
                    "map entry {key:?} has type {}, expected {item}",
                    value.value_type()
                )));
            }
        }
        Ok(Self::from_parts(
            ValueType::string_map_of(item),
            Payload::StringMap(entries),
        ))
    }

    pub fn value_type(&self) -> &ValueType {
        &self.ty
    }

    pub(crate) fn memo_get(&self, target: &ValueType) -> Option<Value> {
        self.memo.lock().expect("cast memo poisoned").get(target).cloned()
    }

    pub(crate) fn memo_insert(&self, target: ValueType, value: Value) {
        self.memo.lock().expect("cast memo poisoned").insert(target, value);
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn as_boolean(&self) -> Option<bool> {
        match *self.payload {
            Payload::Boolean(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match *self.payload {
            Payload::Integer(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match *self.payload {
            Payload::Float(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &*self.payload {
            Payload::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Value]> {
        match &*self.payload {
            Payload::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_string_map(&self) -> Option<&BTreeMap<String, Value>> {
        match &*self.payload {
            Payload::StringMap(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match &*self.payload {
            Payload::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileRef> {
        match &*self.payload {
            Payload::File(file) => Some(file),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(*self.payload, Payload::Null)
    }

    // ------------------------------------------------------------------------
    // JSON wire form
    // ------------------------------------------------------------------------

    /// The JSON encoding of this value: booleans as booleans, sequences as
    /// arrays, string maps and records as objects, files as
    /// `{path, metadata}`.
    pub fn to_json(&self) -> Json {
        match &*self.payload {
            Payload::Null => Json::Null,
            Payload::Boolean(b) => Json::Bool(*b),
            Payload::Integer(i) => Json::from(*i),
            Payload::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Payload::String(s) => Json::String(s.clone()),
            Payload::Sequence(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Payload::StringMap(entries) => Json::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Payload::Record(record) => record.to_json(),
            Payload::File(file) => file.to_json(),
        }
    }

    /// Interprets `json` as a value of type `ty`.
    ///
    /// This is the wire-form reader: strict per variant, with `Any` falling
    /// back to natural typing via [`Value::of_json`]. Files are expected in
    /// their serialized `{path, metadata}` form.
    pub fn from_json(ty: &ValueType, json: &Json) -> Result<Value, UserError> {
        let mismatch = || {
            UserError::new(format!(
                "cannot read {} from JSON value {json}",
                ty.clone()
            ))
        };
        match ty {
            ValueType::Any => Ok(Value::of_json(json)),
            ValueType::Null => match json {
                Json::Null => Ok(Value::null()),
                _ => Err(mismatch()),
            },
            ValueType::Boolean => json.as_bool().map(Value::boolean).ok_or_else(mismatch),
            ValueType::Integer => json.as_i64().map(Value::integer).ok_or_else(mismatch),
            ValueType::Float => json.as_f64().map(Value::float).ok_or_else(mismatch),
            ValueType::String => json
                .as_str()
                .map(|s| Value::string(s.to_string()))
                .ok_or_else(mismatch),
            ValueType::Sequence(item) => {
                let array = json.as_array().ok_or_else(mismatch)?;
                let items = array
                    .iter()
                    .map(|element| Value::from_json(item, element))
                    .collect::<Result<Vec<_>, _>>()?;
                Value::sequence((**item).clone(), items)
            }
            ValueType::StringMap(item) => {
                let object = json.as_object().ok_or_else(mismatch)?;
                let entries = object
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), Value::from_json(item, v)?)))
                    .collect::<Result<BTreeMap<_, _>, UserError>>()?;
                Value::string_map((**item).clone(), entries)
            }
            ValueType::Data(record_type) => {
                Ok(Value::record(record_type.record_from_json(json)?))
            }
            ValueType::File(kind) => Ok(Value::file(FileRef::from_json(*kind, json)?)),
        }
    }

    /// Natural typing for a raw JSON document: numbers become `Integer` when
    /// they fit in `i64` and `Float` otherwise; arrays and objects become
    /// `Sequence<Any>` / `StringMap<Any>` with concretely typed children.
    pub fn of_json(json: &Json) -> Value {
        match json {
            Json::Null => Value::null(),
            Json::Bool(b) => Value::boolean(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::integer(i),
                None => Value::float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Value::string(s.clone()),
            Json::Array(items) => Value::sequence(
                ValueType::Any,
                items.iter().map(Value::of_json).collect(),
            )
            .expect("children are subtypes of Any"),
            Json::Object(entries) => Value::string_map(
                ValueType::Any,
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::of_json(v)))
                    .collect(),
            )
            .expect("children are subtypes of Any"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.payload == other.payload
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &*self.payload {
            Payload::Null => 0u8.hash(state),
            Payload::Boolean(b) => (1u8, b).hash(state),
            Payload::Integer(i) => (2u8, i).hash(state),
            Payload::Float(f) => (3u8, f.to_bits()).hash(state),
            Payload::String(s) => (4u8, s).hash(state),
            Payload::Sequence(items) => {
                5u8.hash(state);
                items.hash(state);
            }
            Payload::StringMap(entries) => {
                6u8.hash(state);
                entries.hash(state);
            }
            Payload::Record(record) => {
                7u8.hash(state);
                record.hash(state);
            }
            Payload::File(file) => {
                8u8.hash(state);
                file.hash(state);
            }
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.ty, self.to_json())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// The raw field map a node receives before casting and validation, and the
/// shape of workflow inputs and outputs.
pub type ValueMap = BTreeMap<String, Value>;
