// src/nodes.rs
//
// =============================================================================
// DAGFLOW: BUILTIN NODE LIBRARY
// =============================================================================
//
// The leaf computation units shipped with the engine, one module per concern.
// Every node here registers a globally unique discriminator; the registry in
// `node.rs` installs them at initialization.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as Json;

use crate::error::{EngineError, UserError};
use crate::file::FileRef;
use crate::node::NodeConstructor;
use crate::record::Record;
use crate::value::Value;

pub mod arithmetic;
pub mod conditional;
pub mod constant;
pub mod data;
pub mod error;
pub mod iteration;
pub mod json;
pub mod text;

pub use arithmetic::AddNode;
pub use conditional::{IfElseNode, IfNode};
pub use constant::{ConstantBooleanNode, ConstantIntegerNode, ConstantStringNode};
pub use data::{
    BuildMappingNode, ExpandRecordNode, ExpandSequenceNode, ExtractKeyNode, GatherRecordNode,
    GatherSequenceNode,
};
pub use error::ErrorNode;
pub use iteration::ForEachNode;
pub use json::{ReadJsonLinesNode, ReadJsonNode, WriteJsonLinesNode, WriteJsonNode};
pub use text::AppendToFileNode;

pub(crate) fn builtin_constructors() -> Vec<(&'static str, NodeConstructor)> {
    vec![
        (AddNode::KIND, AddNode::deserialize),
        (AppendToFileNode::KIND, AppendToFileNode::deserialize),
        (BuildMappingNode::KIND, BuildMappingNode::deserialize),
        (ConstantBooleanNode::KIND, ConstantBooleanNode::deserialize),
        (ConstantIntegerNode::KIND, ConstantIntegerNode::deserialize),
        (ConstantStringNode::KIND, ConstantStringNode::deserialize),
        (ErrorNode::KIND, ErrorNode::deserialize),
        (ExpandRecordNode::KIND, ExpandRecordNode::deserialize),
        (ExpandSequenceNode::KIND, ExpandSequenceNode::deserialize),
        (ExtractKeyNode::KIND, ExtractKeyNode::deserialize),
        (ForEachNode::KIND, ForEachNode::deserialize),
        (GatherRecordNode::KIND, GatherRecordNode::deserialize),
        (GatherSequenceNode::KIND, GatherSequenceNode::deserialize),
        (IfElseNode::KIND, IfElseNode::deserialize),
        (IfNode::KIND, IfNode::deserialize),
        (ReadJsonLinesNode::KIND, ReadJsonLinesNode::deserialize),
        (ReadJsonNode::KIND, ReadJsonNode::deserialize),
        (WriteJsonLinesNode::KIND, WriteJsonLinesNode::deserialize),
        (WriteJsonNode::KIND, WriteJsonNode::deserialize),
    ]
}

// ----------------------------------------------------------------------------
// Shared helpers for concrete node implementations
// ----------------------------------------------------------------------------

pub(crate) fn parse_params<T: DeserializeOwned>(kind: &str, params: Json) -> Result<T, EngineError> {
    serde_json::from_value(params)
        .map_err(|e| EngineError::validation(format!("invalid params for node type {kind}: {e}")))
}

pub(crate) fn dump_params<T: Serialize>(params: &T) -> Json {
    serde_json::to_value(params).expect("node params serialize to JSON")
}

pub(crate) fn expect_empty_params(kind: &str, params: &Json) -> Result<(), EngineError> {
    match params {
        Json::Object(object) if object.is_empty() => Ok(()),
        Json::Null => Ok(()),
        other => Err(EngineError::validation(format!(
            "node type {kind} takes no params, got {other}"
        ))),
    }
}

pub(crate) fn integer_field(record: &Record, key: &str) -> Result<i64, UserError> {
    field(record, key)?
        .as_integer()
        .ok_or_else(|| mismatch(record, key, "an integer"))
}

pub(crate) fn boolean_field(record: &Record, key: &str) -> Result<bool, UserError> {
    field(record, key)?
        .as_boolean()
        .ok_or_else(|| mismatch(record, key, "a boolean"))
}

pub(crate) fn string_field<'a>(record: &'a Record, key: &str) -> Result<&'a str, UserError> {
    field(record, key)?
        .as_str()
        .ok_or_else(|| mismatch(record, key, "a string"))
}

pub(crate) fn file_field<'a>(record: &'a Record, key: &str) -> Result<&'a FileRef, UserError> {
    field(record, key)?
        .as_file()
        .ok_or_else(|| mismatch(record, key, "a file"))
}

pub(crate) fn sequence_field<'a>(record: &'a Record, key: &str) -> Result<&'a [Value], UserError> {
    field(record, key)?
        .as_sequence()
        .ok_or_else(|| mismatch(record, key, "a sequence"))
}

pub(crate) fn field<'a>(record: &'a Record, key: &str) -> Result<&'a Value, UserError> {
    record.get(key).ok_or_else(|| {
        UserError::new(format!(
            "record {} is missing field {key:?}",
            record.record_type().name()
        ))
    })
}

fn mismatch(record: &Record, key: &str, expected: &str) -> UserError {
    UserError::new(format!(
        "record {} field {key:?} is not {expected}",
        record.record_type().name()
    ))
}
