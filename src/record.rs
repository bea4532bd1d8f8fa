// src/record.rs
//
// =============================================================================
// DAGFLOW: DATA RECORDS
// =============================================================================
//
// Named, fixed-schema field maps over values. Record types are the input and
// output contracts of nodes and of whole workflows; records are the validated
// payloads that satisfy them.

use std::collections::BTreeMap;

use serde_json::Value as Json;

use crate::error::UserError;
use crate::value::{Value, ValueType};

/// Whether a record tolerates keys it does not declare.
///
/// Records forbid extras by default; `Allow` exists for the merged input of
/// conditional nodes, whose field set is only partially known up front.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ExtraPolicy {
    #[default]
    Forbid,
    Allow,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldType {
    pub ty: ValueType,
    pub required: bool,
}

/// A named mapping `field -> (variant, required?)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RecordType {
    name: String,
    fields: BTreeMap<String, FieldType>,
    extra: ExtraPolicy,
}

impl RecordType {
    pub fn new(
        name: impl Into<String>,
        fields: impl IntoIterator<Item = (String, ValueType, bool)>,
    ) -> Self {
        Self {
            name: name.into(),
            fields: fields
                .into_iter()
                .map(|(field, ty, required)| (field, FieldType { ty, required }))
                .collect(),
            extra: ExtraPolicy::Forbid,
        }
    }

    /// A record type with no fields at all.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
            extra: ExtraPolicy::Forbid,
        }
    }

    pub fn with_extra_allowed(mut self) -> Self {
        self.extra = ExtraPolicy::Allow;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn extra_policy(&self) -> ExtraPolicy {
        self.extra
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldType)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn field(&self, name: &str) -> Option<&FieldType> {
        self.fields.get(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Merges the fields of `other` into a copy of `self`; duplicate field
    /// names are a caller bug.
    pub fn merged(&self, name: impl Into<String>, other: &RecordType) -> Result<Self, UserError> {
        let mut fields = self.fields.clone();
        for (key, field) in &other.fields {
            if fields.insert(key.clone(), field.clone()).is_some() {
                return Err(UserError::new(format!(
                    "field {key:?} is declared by both record types being merged"
                )));
            }
        }
        Ok(Self {
            name: name.into(),
            fields,
            extra: self.extra,
        })
    }

    /// Validates a field map of already-typed values against this record
    /// type.
    ///
    /// Callers cast values to the declared field types before validating (the
    /// executor does this for every node input), so the check here is
    /// subtype-or-equal, never a coercion.
    pub fn validate(&self, fields: BTreeMap<String, Value>) -> Result<Record, UserError> {
        if self.extra == ExtraPolicy::Forbid {
            for key in fields.keys() {
                if !self.fields.contains_key(key) {
                    return Err(UserError::new(format!(
                        "record {} does not declare a field {key:?}",
                        self.name
                    )));
                }
            }
        }
        for (key, field) in &self.fields {
            match fields.get(key) {
                Some(value) => {
                    if !value.value_type().is_subtype_of(&field.ty) {
                        return Err(UserError::new(format!(
                            "record {} field {key:?} has type {}, expected {}",
                            self.name,
                            value.value_type(),
                            field.ty
                        )));
                    }
                }
                None => {
                    if field.required {
                        return Err(UserError::new(format!(
                            "record {} is missing required field {key:?}",
                            self.name
                        )));
                    }
                }
            }
        }
        Ok(Record {
            ty: self.clone(),
            fields,
        })
    }

    /// Reads a record from its JSON wire form.
    pub fn record_from_json(&self, json: &Json) -> Result<Record, UserError> {
        let object = json.as_object().ok_or_else(|| {
            UserError::new(format!(
                "record {} expects a JSON object, got {json}",
                self.name
            ))
        })?;
        let mut fields = BTreeMap::new();
        for (key, raw) in object {
            match self.fields.get(key) {
                Some(field) => {
                    fields.insert(key.clone(), Value::from_json(&field.ty, raw)?);
                }
                None => {
                    if self.extra == ExtraPolicy::Forbid {
                        return Err(UserError::new(format!(
                            "record {} does not declare a field {key:?}",
                            self.name
                        )));
                    }
                    fields.insert(key.clone(), Value::of_json(raw));
                }
            }
        }
        self.validate(fields)
    }
}

/// A record type bound to concrete, validated per-field values.
#[derive(Clone, Debug, PartialEq, Hash)]
pub struct Record {
    ty: RecordType,
    fields: BTreeMap<String, Value>,
}

impl Record {
    /// An empty record of an empty type; the output of nodes that produce
    /// nothing.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            ty: RecordType::empty(name),
            fields: BTreeMap::new(),
        }
    }

    pub fn record_type(&self) -> &RecordType {
        &self.ty
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn into_fields(self) -> BTreeMap<String, Value> {
        self.fields
    }

    pub fn to_json(&self) -> Json {
        Json::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}
