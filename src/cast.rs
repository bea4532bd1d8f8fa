// src/cast.rs
//
// =============================================================================
// DAGFLOW: CASTER REGISTRY & BUILTIN COERCIONS
// =============================================================================
//
// Casts convert a value of one variant into another, transparently and
// possibly through I/O (reading a JSON file into a sequence of records, or
// writing a payload out as a content-addressed JSON file).
//
// The registry is a two-level map keyed by (source origin, target origin).
// Registered entries are *generic casters*: factories that receive the
// concrete source and target types and either produce a caster or decline.
// Resolution order for a concrete pair:
//
//   1. identity, when the source is a subtype of the target;
//   2. the nearest source ancestor holding an entry for the target origin
//      (a declining factory ends the search - farther ancestors never
//      override a nearer one);
//   3. otherwise the cast does not exist.
//
// The registry freezes on first resolution; late registration is an error.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use futures::future::{try_join_all, BoxFuture};
use once_cell::sync::Lazy;
use serde_json::Value as Json;

use crate::context::Context;
use crate::error::{EngineError, UserError};
use crate::file::{FileKind, FileRef};
use crate::value::{Origin, Value, ValueType};

pub type CastFuture<'a> = BoxFuture<'a, Result<Value, UserError>>;

/// A materialized caster for one concrete `(source, target)` pair: a
/// contextual function `(value, context) -> value` that may suspend for I/O.
pub trait Caster: Send + Sync {
    fn cast<'a>(&'a self, value: Value, context: &'a dyn Context) -> CastFuture<'a>;
}

pub type BoxCaster = Arc<dyn Caster>;

/// A generic caster: given concrete source and target types, produce a caster
/// or decline.
pub type GenericCaster = fn(&ValueType, &ValueType) -> Option<BoxCaster>;

// ============================================================================
// 1. THE REGISTRY
// ============================================================================

struct CasterRegistry {
    table: RwLock<HashMap<(Origin, Origin), GenericCaster>>,
    frozen: AtomicBool,
}

impl CasterRegistry {
    fn install(
        &self,
        source: Origin,
        target: Origin,
        caster: GenericCaster,
    ) -> Result<(), EngineError> {
        if self.frozen.load(Ordering::Acquire) {
            return Err(EngineError::registry(format!(
                "cannot register a caster from {source:?} to {target:?} after casts have been resolved"
            )));
        }
        let mut table = self.table.write().expect("caster registry poisoned");
        if table.contains_key(&(source, target)) {
            return Err(EngineError::registry(format!(
                "a caster from {source:?} to {target:?} is already registered"
            )));
        }
        table.insert((source, target), caster);
        Ok(())
    }

    fn lookup(&self, source: Origin, target: Origin) -> Option<GenericCaster> {
        self.frozen.store(true, Ordering::Release);
        self.table
            .read()
            .expect("caster registry poisoned")
            .get(&(source, target))
            .copied()
    }
}

static CASTERS: Lazy<CasterRegistry> = Lazy::new(|| {
    let registry = CasterRegistry {
        table: RwLock::new(HashMap::new()),
        frozen: AtomicBool::new(false),
    };
    for (source, target, caster) in builtin_casters() {
        registry
            .install(source, target, caster)
            .expect("builtin casters are unique");
    }
    registry
});

/// Registers a custom generic caster. Must happen before the first cast
/// resolution anywhere in the process; occupied keys are rejected.
pub fn register_generic_cast(
    source: Origin,
    target: Origin,
    caster: GenericCaster,
) -> Result<(), EngineError> {
    CASTERS.install(source, target, caster)
}

fn resolve(source: &ValueType, target: &ValueType) -> Option<BoxCaster> {
    if source.is_subtype_of(target) {
        return Some(Arc::new(IdentityCaster));
    }
    let target_origin = target.origin();
    for ancestor in source.origin().ancestors() {
        if let Some(generic) = CASTERS.lookup(ancestor, target_origin) {
            return generic(source, target);
        }
    }
    None
}

impl ValueType {
    /// Whether there is any hope of casting a value of this type to `target`.
    pub fn can_cast_to(&self, target: &ValueType) -> bool {
        resolve(self, target).is_some()
    }
}

impl Value {
    pub fn can_cast_to(&self, target: &ValueType) -> bool {
        self.value_type().can_cast_to(target)
    }

    /// Casts this value to `target`, resolving a caster through the registry
    /// and memoizing the result on this value instance.
    ///
    /// The memo key is the full recursive target type, so casts to
    /// `Sequence<Integer>` and `Sequence<Float>` cache separately; a repeated
    /// cast performs no new work and no new I/O.
    pub async fn cast_to(
        &self,
        target: &ValueType,
        context: &dyn Context,
    ) -> Result<Value, UserError> {
        if let Some(hit) = self.memo_get(target) {
            return Ok(hit);
        }
        let caster = resolve(self.value_type(), target)
            .ok_or_else(|| UserError::new(format!("cannot convert {self} to {target}")))?;
        let casted = caster.cast(self.clone(), context).await?;
        self.memo_insert(target.clone(), casted.clone());
        Ok(casted)
    }
}

// ============================================================================
// 2. JSON INSTANTIATION
// ============================================================================

/// Whether `ty` can be built out of a raw JSON payload.
fn json_constructible(ty: &ValueType) -> bool {
    match ty {
        ValueType::Any
        | ValueType::Null
        | ValueType::Boolean
        | ValueType::Integer
        | ValueType::Float
        | ValueType::String
        | ValueType::Data(_) => true,
        ValueType::Sequence(item) | ValueType::StringMap(item) => json_constructible(item),
        ValueType::File(kind) => *kind == FileKind::Json,
    }
}

/// Writes `json` out as a content-addressed JSON file: the path is the md5 of
/// the serialized payload.
async fn write_json_blob(json: &Json, context: &dyn Context) -> Result<Value, UserError> {
    let text = serde_json::to_string(json)
        .map_err(|e| UserError::new(format!("cannot serialize payload: {e}")))?;
    let digest = md5::compute(text.as_bytes());
    let file = FileRef::json(format!("{digest:x}"));
    let written = file.write(context, text.as_bytes()).await?;
    Ok(Value::file(written))
}

/// Builds a value of type `target` from a parsed JSON payload.
///
/// This is the dispatch half of the read-then-dispatch file casts. Scalar,
/// container and record targets are structural; a `JSONFile` target
/// re-serializes the payload and writes a new content-addressed file, which
/// is what splits a JSON-lines file into one file per element.
pub(crate) fn instantiate_json<'a>(
    target: &'a ValueType,
    json: &'a Json,
    context: &'a dyn Context,
) -> BoxFuture<'a, Result<Value, UserError>> {
    Box::pin(async move {
        match target {
            ValueType::File(FileKind::Json) => write_json_blob(json, context).await,
            ValueType::File(kind) => Err(UserError::new(format!(
                "cannot materialize a {} from a JSON payload",
                kind.type_name()
            ))),
            ValueType::Sequence(item) => {
                let array = json
                    .as_array()
                    .ok_or_else(|| UserError::new(format!("expected a JSON array, got {json}")))?;
                let items = try_join_all(
                    array
                        .iter()
                        .map(|element| instantiate_json(item, element, context)),
                )
                .await?;
                Value::sequence((**item).clone(), items)
            }
            ValueType::StringMap(item) => {
                let object = json
                    .as_object()
                    .ok_or_else(|| UserError::new(format!("expected a JSON object, got {json}")))?;
                let entries = try_join_all(object.iter().map(|(key, element)| async move {
                    Ok::<_, UserError>((
                        key.clone(),
                        instantiate_json(item, element, context).await?,
                    ))
                }))
                .await?;
                Value::string_map((**item).clone(), entries.into_iter().collect())
            }
            other => Value::from_json(other, json),
        }
    })
}

// ============================================================================
// 3. BUILTIN CASTERS
// ============================================================================

struct IdentityCaster;

impl Caster for IdentityCaster {
    fn cast<'a>(&'a self, value: Value, _context: &'a dyn Context) -> CastFuture<'a> {
        Box::pin(async move { Ok(value) })
    }
}

struct IntegerToFloat;

impl Caster for IntegerToFloat {
    fn cast<'a>(&'a self, value: Value, _context: &'a dyn Context) -> CastFuture<'a> {
        Box::pin(async move {
            let i = value
                .as_integer()
                .ok_or_else(|| UserError::new(format!("cannot convert {value} to Float")))?;
            Ok(Value::float(i as f64))
        })
    }
}

struct FloatToInteger;

impl Caster for FloatToInteger {
    fn cast<'a>(&'a self, value: Value, _context: &'a dyn Context) -> CastFuture<'a> {
        Box::pin(async move {
            let f = value
                .as_float()
                .ok_or_else(|| UserError::new(format!("cannot convert {value} to Integer")))?;
            // exact integers only, never a silent truncation
            if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                Ok(Value::integer(f as i64))
            } else {
                Err(UserError::new(format!(
                    "cannot convert {f} to Integer without loss"
                )))
            }
        })
    }
}

/// `String -> Boolean/Integer/Float` via JSON parse of the string content.
struct StringParse {
    target: ValueType,
}

impl Caster for StringParse {
    fn cast<'a>(&'a self, value: Value, _context: &'a dyn Context) -> CastFuture<'a> {
        Box::pin(async move {
            let text = value.as_str().ok_or_else(|| {
                UserError::new(format!("cannot convert {value} to {}", self.target))
            })?;
            let json: Json = serde_json::from_str(text).map_err(|_| {
                UserError::new(format!("cannot convert {value} to {}", self.target))
            })?;
            Value::from_json(&self.target, &json)
        })
    }
}

/// Any value stringifies to its JSON encoding.
struct Stringify;

impl Caster for Stringify {
    fn cast<'a>(&'a self, value: Value, _context: &'a dyn Context) -> CastFuture<'a> {
        Box::pin(async move {
            let text = serde_json::to_string(&value.to_json())
                .map_err(|e| UserError::new(format!("cannot convert {value} to String: {e}")))?;
            Ok(Value::string(text))
        })
    }
}

/// Any value serializes into a content-addressed JSON file.
struct JsonBlob;

impl Caster for JsonBlob {
    fn cast<'a>(&'a self, value: Value, context: &'a dyn Context) -> CastFuture<'a> {
        Box::pin(async move { write_json_blob(&value.to_json(), context).await })
    }
}

struct TextFileToString;

impl Caster for TextFileToString {
    fn cast<'a>(&'a self, value: Value, context: &'a dyn Context) -> CastFuture<'a> {
        Box::pin(async move {
            let file = value
                .as_file()
                .ok_or_else(|| UserError::new(format!("cannot convert {value} to String")))?;
            Ok(Value::string(file.read_text(context).await?))
        })
    }
}

/// Read-then-dispatch: parse a JSON file and instantiate the target from the
/// payload.
struct JsonFileRead {
    target: ValueType,
}

impl Caster for JsonFileRead {
    fn cast<'a>(&'a self, value: Value, context: &'a dyn Context) -> CastFuture<'a> {
        Box::pin(async move {
            let file = value.as_file().ok_or_else(|| {
                UserError::new(format!("cannot convert {value} to {}", self.target))
            })?;
            let json = file.read_data(context).await?;
            instantiate_json(&self.target, &json, context).await
        })
    }
}

/// Line-parse a JSON-lines file, then instantiate each element.
struct JsonLinesToSequence {
    item: ValueType,
}

impl Caster for JsonLinesToSequence {
    fn cast<'a>(&'a self, value: Value, context: &'a dyn Context) -> CastFuture<'a> {
        Box::pin(async move {
            let file = value
                .as_file()
                .ok_or_else(|| UserError::new(format!("cannot convert {value} to Sequence")))?;
            let lines = file.read_lines(context).await?;
            let items = try_join_all(
                lines
                    .iter()
                    .map(|line| instantiate_json(&self.item, line, context)),
            )
            .await?;
            Value::sequence(self.item.clone(), items)
        })
    }
}

struct SequenceToSequence {
    item: ValueType,
}

impl Caster for SequenceToSequence {
    fn cast<'a>(&'a self, value: Value, context: &'a dyn Context) -> CastFuture<'a> {
        Box::pin(async move {
            let items = value
                .as_sequence()
                .ok_or_else(|| UserError::new(format!("cannot convert {value} to Sequence")))?;
            // items cast concurrently
            let casted =
                try_join_all(items.iter().map(|item| item.cast_to(&self.item, context))).await?;
            Value::sequence(self.item.clone(), casted)
        })
    }
}

struct StringMapToStringMap {
    item: ValueType,
}

impl Caster for StringMapToStringMap {
    fn cast<'a>(&'a self, value: Value, context: &'a dyn Context) -> CastFuture<'a> {
        Box::pin(async move {
            let entries = value
                .as_string_map()
                .ok_or_else(|| UserError::new(format!("cannot convert {value} to StringMap")))?;
            let casted = try_join_all(entries.iter().map(|(key, item)| async move {
                Ok::<_, UserError>((key.clone(), item.cast_to(&self.item, context).await?))
            }))
            .await?;
            Value::string_map(
                self.item.clone(),
                casted.into_iter().collect::<BTreeMap<_, _>>(),
            )
        })
    }
}

// ----------------------------------------------------------------------------
// Generic-caster factories
// ----------------------------------------------------------------------------

fn widen_integer(_source: &ValueType, _target: &ValueType) -> Option<BoxCaster> {
    Some(Arc::new(IntegerToFloat))
}

fn narrow_float(_source: &ValueType, _target: &ValueType) -> Option<BoxCaster> {
    Some(Arc::new(FloatToInteger))
}

fn parse_string(_source: &ValueType, target: &ValueType) -> Option<BoxCaster> {
    Some(Arc::new(StringParse {
        target: target.clone(),
    }))
}

fn stringify_any(_source: &ValueType, _target: &ValueType) -> Option<BoxCaster> {
    Some(Arc::new(Stringify))
}

fn serialize_any_to_json_file(_source: &ValueType, target: &ValueType) -> Option<BoxCaster> {
    if target != &ValueType::File(FileKind::Json) {
        return None;
    }
    Some(Arc::new(JsonBlob))
}

fn read_text_file(_source: &ValueType, _target: &ValueType) -> Option<BoxCaster> {
    Some(Arc::new(TextFileToString))
}

fn read_json_file(_source: &ValueType, target: &ValueType) -> Option<BoxCaster> {
    if !json_constructible(target) {
        return None;
    }
    Some(Arc::new(JsonFileRead {
        target: target.clone(),
    }))
}

fn read_json_lines_file(_source: &ValueType, target: &ValueType) -> Option<BoxCaster> {
    match target {
        ValueType::Sequence(item) if json_constructible(item) => {
            Some(Arc::new(JsonLinesToSequence {
                item: (**item).clone(),
            }))
        }
        _ => None,
    }
}

fn convert_sequence(source: &ValueType, target: &ValueType) -> Option<BoxCaster> {
    match (source, target) {
        (ValueType::Sequence(s), ValueType::Sequence(t)) if s.can_cast_to(t) => {
            Some(Arc::new(SequenceToSequence { item: (**t).clone() }))
        }
        _ => None,
    }
}

fn convert_string_map(source: &ValueType, target: &ValueType) -> Option<BoxCaster> {
    match (source, target) {
        (ValueType::StringMap(s), ValueType::StringMap(t)) if s.can_cast_to(t) => {
            Some(Arc::new(StringMapToStringMap { item: (**t).clone() }))
        }
        _ => None,
    }
}

fn builtin_casters() -> Vec<(Origin, Origin, GenericCaster)> {
    let mut casters: Vec<(Origin, Origin, GenericCaster)> = vec![
        (Origin::Integer, Origin::Float, widen_integer),
        (Origin::Float, Origin::Integer, narrow_float),
        (Origin::String, Origin::Boolean, parse_string),
        (Origin::String, Origin::Integer, parse_string),
        (Origin::String, Origin::Float, parse_string),
        (Origin::Any, Origin::String, stringify_any),
        (
            Origin::Any,
            Origin::File(FileKind::Json),
            serialize_any_to_json_file,
        ),
        (
            Origin::File(FileKind::Text),
            Origin::String,
            read_text_file,
        ),
        (
            Origin::File(FileKind::JsonLines),
            Origin::Sequence,
            read_json_lines_file,
        ),
        (Origin::Sequence, Origin::Sequence, convert_sequence),
        (Origin::StringMap, Origin::StringMap, convert_string_map),
    ];
    // read-then-dispatch: a JSON file casts to whatever its parsed payload
    // can instantiate
    for target in [
        Origin::Null,
        Origin::Boolean,
        Origin::Integer,
        Origin::Float,
        Origin::String,
        Origin::Sequence,
        Origin::StringMap,
        Origin::Data,
    ] {
        casters.push((Origin::File(FileKind::Json), target, read_json_file));
    }
    casters
}
