// src/schema.rs
//
// =============================================================================
// DAGFLOW: JSON-SCHEMA REFLECTION
// =============================================================================
//
// The subset of the JSON Schema specification the engine speaks: enough to
// describe every value variant, round-trip record contracts, and reference
// named variants registered out of band. Constraint keywords (minimum,
// maxLength, ...) are carried and range-checked but not enforced against
// payloads.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use once_cell::sync::Lazy;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value as Json};

use crate::error::{EngineError, UserError};
use crate::file::FileKind;
use crate::record::{ExtraPolicy, RecordType};
use crate::value::ValueType;

const DEFS_PREFIX: &str = "#/$defs/";

/// A schema document from the supported subset.
#[derive(Clone, Debug, PartialEq)]
pub enum Schema {
    /// The empty schema `{}`: anything.
    Any,
    Null,
    Boolean,
    Integer {
        minimum: Option<i64>,
        maximum: Option<i64>,
        multiple_of: Option<i64>,
    },
    Number {
        minimum: Option<f64>,
        maximum: Option<f64>,
    },
    String {
        min_length: Option<u64>,
        max_length: Option<u64>,
        pattern: Option<String>,
    },
    Array {
        items: Box<Schema>,
        min_items: Option<u64>,
        max_items: Option<u64>,
        unique_items: Option<bool>,
    },
    /// `{"type": "object", "additionalProperties": <schema>}`: a string map.
    Map { values: Box<Schema> },
    /// `{"type": "object", "properties": ...}`: a record.
    Record {
        properties: BTreeMap<String, Schema>,
        required: BTreeSet<String>,
        additional: bool,
    },
    /// `{"$ref": "#/$defs/<Name>"}`: a named variant.
    Ref { name: String },
}

impl Schema {
    pub fn integer() -> Self {
        Schema::Integer {
            minimum: None,
            maximum: None,
            multiple_of: None,
        }
    }

    pub fn number() -> Self {
        Schema::Number {
            minimum: None,
            maximum: None,
        }
    }

    pub fn string() -> Self {
        Schema::String {
            min_length: None,
            max_length: None,
            pattern: None,
        }
    }

    pub fn array_of(items: Schema) -> Self {
        Schema::Array {
            items: Box::new(items),
            min_items: None,
            max_items: None,
            unique_items: None,
        }
    }

    pub fn map_of(values: Schema) -> Self {
        Schema::Map {
            values: Box::new(values),
        }
    }

    /// Reflects a variant type into its schema document.
    ///
    /// Record names are not part of the wire form: a `Data` variant
    /// round-trips structurally and comes back named `ObjectData`.
    pub fn of(ty: &ValueType) -> Schema {
        match ty {
            ValueType::Any => Schema::Any,
            ValueType::Null => Schema::Null,
            ValueType::Boolean => Schema::Boolean,
            ValueType::Integer => Schema::integer(),
            ValueType::Float => Schema::number(),
            ValueType::String => Schema::string(),
            ValueType::Sequence(item) => Schema::array_of(Schema::of(item)),
            ValueType::StringMap(item) => Schema::map_of(Schema::of(item)),
            ValueType::Data(record) => Schema::Record {
                properties: record
                    .fields()
                    .map(|(key, field)| (key.to_string(), Schema::of(&field.ty)))
                    .collect(),
                required: record
                    .fields()
                    .filter(|(_, field)| field.required)
                    .map(|(key, _)| key.to_string())
                    .collect(),
                additional: record.extra_policy() == ExtraPolicy::Allow,
            },
            ValueType::File(kind) => Schema::Ref {
                name: kind.type_name().to_string(),
            },
        }
    }

    /// Reconstructs the variant type this schema describes.
    pub fn value_type(&self) -> Result<ValueType, UserError> {
        match self {
            Schema::Any => Ok(ValueType::Any),
            Schema::Null => Ok(ValueType::Null),
            Schema::Boolean => Ok(ValueType::Boolean),
            Schema::Integer { .. } => Ok(ValueType::Integer),
            Schema::Number { .. } => Ok(ValueType::Float),
            Schema::String { .. } => Ok(ValueType::String),
            Schema::Array { items, .. } => Ok(ValueType::sequence_of(items.value_type()?)),
            Schema::Map { values } => Ok(ValueType::string_map_of(values.value_type()?)),
            Schema::Record {
                properties,
                required,
                additional,
            } => {
                let fields = properties
                    .iter()
                    .map(|(key, schema)| {
                        Ok((key.clone(), schema.value_type()?, required.contains(key)))
                    })
                    .collect::<Result<Vec<_>, UserError>>()?;
                let mut record = RecordType::new("ObjectData", fields);
                if *additional {
                    record = record.with_extra_allowed();
                }
                Ok(ValueType::Data(record))
            }
            Schema::Ref { name } => lookup_value_type(name),
        }
    }

    /// The record contract this schema describes, for callers that require an
    /// object schema.
    pub fn record_type(&self) -> Result<RecordType, UserError> {
        match self.value_type()? {
            ValueType::Data(record) => Ok(record),
            other => Err(UserError::new(format!(
                "expected an object schema, got one describing {other}"
            ))),
        }
    }

    // ------------------------------------------------------------------------
    // Wire form
    // ------------------------------------------------------------------------

    pub fn to_json(&self) -> Json {
        fn insert_optional(object: &mut Map<String, Json>, key: &str, value: Option<Json>) {
            if let Some(value) = value {
                object.insert(key.to_string(), value);
            }
        }

        match self {
            Schema::Any => json!({}),
            Schema::Null => json!({"type": "null"}),
            Schema::Boolean => json!({"type": "boolean"}),
            Schema::Integer {
                minimum,
                maximum,
                multiple_of,
            } => {
                let mut object = Map::new();
                object.insert("type".into(), json!("integer"));
                insert_optional(&mut object, "minimum", minimum.map(Json::from));
                insert_optional(&mut object, "maximum", maximum.map(Json::from));
                insert_optional(&mut object, "multipleOf", multiple_of.map(Json::from));
                Json::Object(object)
            }
            Schema::Number { minimum, maximum } => {
                let mut object = Map::new();
                object.insert("type".into(), json!("number"));
                insert_optional(&mut object, "minimum", minimum.map(Json::from));
                insert_optional(&mut object, "maximum", maximum.map(Json::from));
                Json::Object(object)
            }
            Schema::String {
                min_length,
                max_length,
                pattern,
            } => {
                let mut object = Map::new();
                object.insert("type".into(), json!("string"));
                insert_optional(&mut object, "minLength", min_length.map(Json::from));
                insert_optional(&mut object, "maxLength", max_length.map(Json::from));
                insert_optional(&mut object, "pattern", pattern.clone().map(Json::from));
                Json::Object(object)
            }
            Schema::Array {
                items,
                min_items,
                max_items,
                unique_items,
            } => {
                let mut object = Map::new();
                object.insert("type".into(), json!("array"));
                object.insert("items".into(), items.to_json());
                insert_optional(&mut object, "minItems", min_items.map(Json::from));
                insert_optional(&mut object, "maxItems", max_items.map(Json::from));
                insert_optional(&mut object, "uniqueItems", unique_items.map(Json::from));
                Json::Object(object)
            }
            Schema::Map { values } => json!({
                "type": "object",
                "additionalProperties": values.to_json(),
            }),
            Schema::Record {
                properties,
                required,
                additional,
            } => json!({
                "type": "object",
                "properties": properties
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<Map<String, Json>>(),
                "required": required.iter().cloned().collect::<Vec<_>>(),
                "additionalProperties": additional,
            }),
            Schema::Ref { name } => json!({"$ref": format!("{DEFS_PREFIX}{name}")}),
        }
    }

    pub fn from_json(json: &Json) -> Result<Schema, UserError> {
        let object = json
            .as_object()
            .ok_or_else(|| UserError::new(format!("schema must be a JSON object, got {json}")))?;

        if let Some(reference) = object.get("$ref") {
            let reference = reference
                .as_str()
                .ok_or_else(|| UserError::new("schema $ref must be a string"))?;
            let name = reference.strip_prefix(DEFS_PREFIX).unwrap_or(reference);
            return Ok(Schema::Ref {
                name: name.to_string(),
            });
        }

        let Some(kind) = object.get("type") else {
            if object.is_empty() {
                return Ok(Schema::Any);
            }
            return Err(UserError::new(format!(
                "schema has neither \"type\" nor \"$ref\": {json}"
            )));
        };

        match kind.as_str() {
            Some("null") => Ok(Schema::Null),
            Some("boolean") => Ok(Schema::Boolean),
            Some("integer") => {
                let minimum = object.get("minimum").and_then(Json::as_i64);
                let maximum = object.get("maximum").and_then(Json::as_i64);
                if let (Some(lo), Some(hi)) = (minimum, maximum) {
                    if lo > hi {
                        return Err(UserError::new(format!(
                            "integer schema range is empty: {lo} > {hi}"
                        )));
                    }
                }
                Ok(Schema::Integer {
                    minimum,
                    maximum,
                    multiple_of: object.get("multipleOf").and_then(Json::as_i64),
                })
            }
            Some("number") => {
                let minimum = object.get("minimum").and_then(Json::as_f64);
                let maximum = object.get("maximum").and_then(Json::as_f64);
                if let (Some(lo), Some(hi)) = (minimum, maximum) {
                    if lo > hi {
                        return Err(UserError::new(format!(
                            "number schema range is empty: {lo} > {hi}"
                        )));
                    }
                }
                Ok(Schema::Number { minimum, maximum })
            }
            Some("string") => {
                let min_length = object.get("minLength").and_then(Json::as_u64);
                let max_length = object.get("maxLength").and_then(Json::as_u64);
                if let (Some(lo), Some(hi)) = (min_length, max_length) {
                    if lo > hi {
                        return Err(UserError::new(format!(
                            "string schema length range is empty: {lo} > {hi}"
                        )));
                    }
                }
                Ok(Schema::String {
                    min_length,
                    max_length,
                    pattern: object
                        .get("pattern")
                        .and_then(Json::as_str)
                        .map(str::to_string),
                })
            }
            Some("array") => {
                let items = object
                    .get("items")
                    .ok_or_else(|| UserError::new("array schema is missing \"items\""))?;
                Ok(Schema::Array {
                    items: Box::new(Schema::from_json(items)?),
                    min_items: object.get("minItems").and_then(Json::as_u64),
                    max_items: object.get("maxItems").and_then(Json::as_u64),
                    unique_items: object.get("uniqueItems").and_then(Json::as_bool),
                })
            }
            Some("object") => {
                if let Some(properties) = object.get("properties") {
                    let properties = properties
                        .as_object()
                        .ok_or_else(|| UserError::new("object schema \"properties\" must be an object"))?
                        .iter()
                        .map(|(k, v)| Ok((k.clone(), Schema::from_json(v)?)))
                        .collect::<Result<BTreeMap<_, _>, UserError>>()?;
                    let required = match object.get("required") {
                        None => BTreeSet::new(),
                        Some(Json::Array(keys)) => keys
                            .iter()
                            .map(|k| {
                                k.as_str().map(str::to_string).ok_or_else(|| {
                                    UserError::new("object schema \"required\" must hold strings")
                                })
                            })
                            .collect::<Result<BTreeSet<_>, _>>()?,
                        Some(other) => {
                            return Err(UserError::new(format!(
                                "object schema \"required\" must be an array, got {other}"
                            )))
                        }
                    };
                    let additional = object
                        .get("additionalProperties")
                        .and_then(Json::as_bool)
                        .unwrap_or(false);
                    Ok(Schema::Record {
                        properties,
                        required,
                        additional,
                    })
                } else if let Some(values) = object.get("additionalProperties") {
                    Ok(Schema::Map {
                        values: Box::new(Schema::from_json(values)?),
                    })
                } else {
                    Err(UserError::new(
                        "object schema needs \"properties\" or \"additionalProperties\"",
                    ))
                }
            }
            _ => Err(UserError::new(format!(
                "unsupported schema type {kind}"
            ))),
        }
    }
}

impl Serialize for Schema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Schema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = Json::deserialize(deserializer)?;
        Schema::from_json(&json).map_err(D::Error::custom)
    }
}

// ============================================================================
// NAMED VARIANT REGISTRY
// ============================================================================

struct ValueTypeRegistry {
    table: RwLock<HashMap<String, ValueType>>,
    frozen: AtomicBool,
}

static VALUE_TYPES: Lazy<ValueTypeRegistry> = Lazy::new(|| {
    let table = [
        FileKind::Blob,
        FileKind::Text,
        FileKind::Json,
        FileKind::JsonLines,
        FileKind::Pdf,
    ]
    .into_iter()
    .map(|kind| (kind.type_name().to_string(), ValueType::File(kind)))
    .collect();
    ValueTypeRegistry {
        table: RwLock::new(table),
        frozen: AtomicBool::new(false),
    }
});

/// Registers a named variant for `$ref` resolution. Must happen before the
/// first lookup; duplicate names are rejected.
pub fn register_value_type(name: &str, ty: ValueType) -> Result<(), EngineError> {
    if VALUE_TYPES.frozen.load(Ordering::Acquire) {
        return Err(EngineError::registry(format!(
            "cannot register value type {name:?} after the registry has been used"
        )));
    }
    let mut table = VALUE_TYPES.table.write().expect("value type registry poisoned");
    if table.contains_key(name) {
        return Err(EngineError::registry(format!(
            "value type {name:?} is already registered"
        )));
    }
    log::debug!("registering value type {name:?}");
    table.insert(name.to_string(), ty);
    Ok(())
}

fn lookup_value_type(name: &str) -> Result<ValueType, UserError> {
    VALUE_TYPES.frozen.store(true, Ordering::Release);
    VALUE_TYPES
        .table
        .read()
        .expect("value type registry poisoned")
        .get(name)
        .cloned()
        .ok_or_else(|| UserError::new(format!("value type {name:?} is not registered")))
}
