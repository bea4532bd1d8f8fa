// src/nodes/data.rs
//
// =============================================================================
// DAGFLOW: STRUCTURAL DATA NODES
// =============================================================================
//
// Nodes that reshape values without computing anything: building and indexing
// mappings, and the gather/expand adapters that iteration subgraphs are wired
// through (a sequence fanned out into indexed fields and back, a record
// fanned out into its fields and back).

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};

use crate::context::Context;
use crate::error::{EngineError, UserError};
use crate::node::{Node, NodeImpl, NodeOutput};
use crate::record::{Record, RecordType};
use crate::schema::Schema;
use crate::value::{Value, ValueType};

use super::{dump_params, field, parse_params};

// ----------------------------------------------------------------------------
// BuildMapping / ExtractKey
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildMappingParams {
    pub keys: Vec<String>,
}

/// Collects its inputs (one per configured key) into a single mapping.
#[derive(Clone, Debug)]
pub struct BuildMappingNode {
    id: String,
    params: BuildMappingParams,
}

impl BuildMappingNode {
    pub const KIND: &'static str = "BuildMapping";

    pub fn from_keys(id: impl Into<String>, keys: impl IntoIterator<Item = String>) -> Node {
        Node::new(Self {
            id: id.into(),
            params: BuildMappingParams {
                keys: keys.into_iter().collect(),
            },
        })
    }

    pub(crate) fn deserialize(id: String, params: Json) -> Result<Node, EngineError> {
        Ok(Node::new(Self {
            id,
            params: parse_params(Self::KIND, params)?,
        }))
    }
}

#[async_trait]
impl NodeImpl for BuildMappingNode {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn params(&self) -> Json {
        dump_params(&self.params)
    }

    fn input_type(&self) -> RecordType {
        RecordType::new(
            "BuildMappingInput",
            self.params
                .keys
                .iter()
                .map(|key| (key.clone(), ValueType::Any, true)),
        )
    }

    fn output_type(&self) -> RecordType {
        RecordType::new(
            "BuildMappingOutput",
            [(
                "mapping".to_string(),
                ValueType::string_map_of(ValueType::Any),
                true,
            )],
        )
    }

    async fn run(&self, _context: &dyn Context, input: Record) -> Result<NodeOutput, EngineError> {
        let mut entries = BTreeMap::new();
        for key in &self.params.keys {
            entries.insert(key.clone(), field(&input, key)?.clone());
        }
        let mapping = Value::string_map(ValueType::Any, entries)?;
        let output = self
            .output_type()
            .validate(BTreeMap::from([("mapping".to_string(), mapping)]))?;
        Ok(output.into())
    }

    fn clone_with_id(&self, id: String) -> Node {
        Node::new(Self {
            id,
            params: self.params.clone(),
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractKeyParams {
    pub key: String,
}

/// Extracts one value from a mapping.
#[derive(Clone, Debug)]
pub struct ExtractKeyNode {
    id: String,
    params: ExtractKeyParams,
}

impl ExtractKeyNode {
    pub const KIND: &'static str = "ExtractKey";

    pub fn from_key(id: impl Into<String>, key: impl Into<String>) -> Node {
        Node::new(Self {
            id: id.into(),
            params: ExtractKeyParams { key: key.into() },
        })
    }

    pub(crate) fn deserialize(id: String, params: Json) -> Result<Node, EngineError> {
        Ok(Node::new(Self {
            id,
            params: parse_params(Self::KIND, params)?,
        }))
    }
}

#[async_trait]
impl NodeImpl for ExtractKeyNode {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn params(&self) -> Json {
        dump_params(&self.params)
    }

    fn input_type(&self) -> RecordType {
        RecordType::new(
            "ExtractKeyInput",
            [(
                "mapping".to_string(),
                ValueType::string_map_of(ValueType::Any),
                true,
            )],
        )
    }

    fn output_type(&self) -> RecordType {
        RecordType::new(
            "ExtractKeyOutput",
            [("value".to_string(), ValueType::Any, true)],
        )
    }

    async fn run(&self, _context: &dyn Context, input: Record) -> Result<NodeOutput, EngineError> {
        let mapping = field(&input, "mapping")?
            .as_string_map()
            .ok_or_else(|| UserError::new("ExtractKey input is not a mapping"))?
            .clone();
        let value = mapping.get(&self.params.key).cloned().ok_or_else(|| {
            UserError::new(format!("mapping has no key {:?}", self.params.key))
        })?;
        let output = self
            .output_type()
            .validate(BTreeMap::from([("value".to_string(), value)]))?;
        Ok(output.into())
    }

    fn clone_with_id(&self, id: String) -> Node {
        Node::new(Self {
            id,
            params: self.params.clone(),
        })
    }
}

// ----------------------------------------------------------------------------
// Sequence adapters
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SequenceAdapterParams {
    length: usize,
    item: Schema,
}

/// The indexed field name for element `i`.
pub fn item_key(i: usize) -> String {
    format!("item_{i}")
}

/// Fans a sequence of known length out into indexed fields
/// `item_0 .. item_{n-1}`.
#[derive(Clone, Debug)]
pub struct ExpandSequenceNode {
    id: String,
    length: usize,
    item: ValueType,
}

impl ExpandSequenceNode {
    pub const KIND: &'static str = "ExpandSequence";

    pub fn from_length(id: impl Into<String>, length: usize, item: ValueType) -> Node {
        Node::new(Self {
            id: id.into(),
            length,
            item,
        })
    }

    pub(crate) fn deserialize(id: String, params: Json) -> Result<Node, EngineError> {
        let params: SequenceAdapterParams = parse_params(Self::KIND, params)?;
        Ok(Node::new(Self {
            id,
            length: params.length,
            item: params.item.value_type()?,
        }))
    }
}

#[async_trait]
impl NodeImpl for ExpandSequenceNode {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn params(&self) -> Json {
        json!({"length": self.length, "item": Schema::of(&self.item)})
    }

    fn input_type(&self) -> RecordType {
        RecordType::new(
            "ExpandSequenceInput",
            [(
                "sequence".to_string(),
                ValueType::sequence_of(self.item.clone()),
                true,
            )],
        )
    }

    fn output_type(&self) -> RecordType {
        RecordType::new(
            "ExpandSequenceOutput",
            (0..self.length).map(|i| (item_key(i), self.item.clone(), true)),
        )
    }

    async fn run(&self, _context: &dyn Context, input: Record) -> Result<NodeOutput, EngineError> {
        let items = field(&input, "sequence")?
            .as_sequence()
            .ok_or_else(|| UserError::new("ExpandSequence input is not a sequence"))?
            .to_vec();
        if items.len() != self.length {
            return Err(UserError::new(format!(
                "expected a sequence of length {}, got {}",
                self.length,
                items.len()
            ))
            .into());
        }
        let fields = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| (item_key(i), item))
            .collect();
        Ok(self.output_type().validate(fields)?.into())
    }

    fn clone_with_id(&self, id: String) -> Node {
        Node::new(Self {
            id,
            length: self.length,
            item: self.item.clone(),
        })
    }
}

/// Collects indexed fields `item_0 .. item_{n-1}` back into a sequence.
#[derive(Clone, Debug)]
pub struct GatherSequenceNode {
    id: String,
    length: usize,
    item: ValueType,
}

impl GatherSequenceNode {
    pub const KIND: &'static str = "GatherSequence";

    pub fn from_length(id: impl Into<String>, length: usize, item: ValueType) -> Node {
        Node::new(Self {
            id: id.into(),
            length,
            item,
        })
    }

    pub(crate) fn deserialize(id: String, params: Json) -> Result<Node, EngineError> {
        let params: SequenceAdapterParams = parse_params(Self::KIND, params)?;
        Ok(Node::new(Self {
            id,
            length: params.length,
            item: params.item.value_type()?,
        }))
    }
}

#[async_trait]
impl NodeImpl for GatherSequenceNode {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn params(&self) -> Json {
        json!({"length": self.length, "item": Schema::of(&self.item)})
    }

    fn input_type(&self) -> RecordType {
        RecordType::new(
            "GatherSequenceInput",
            (0..self.length).map(|i| (item_key(i), self.item.clone(), true)),
        )
    }

    fn output_type(&self) -> RecordType {
        RecordType::new(
            "GatherSequenceOutput",
            [(
                "sequence".to_string(),
                ValueType::sequence_of(self.item.clone()),
                true,
            )],
        )
    }

    async fn run(&self, _context: &dyn Context, input: Record) -> Result<NodeOutput, EngineError> {
        let items = (0..self.length)
            .map(|i| Ok(field(&input, &item_key(i))?.clone()))
            .collect::<Result<Vec<_>, UserError>>()?;
        let sequence = Value::sequence(self.item.clone(), items)?;
        let output = self
            .output_type()
            .validate(BTreeMap::from([("sequence".to_string(), sequence)]))?;
        Ok(output.into())
    }

    fn clone_with_id(&self, id: String) -> Node {
        Node::new(Self {
            id,
            length: self.length,
            item: self.item.clone(),
        })
    }
}

// ----------------------------------------------------------------------------
// Record adapters
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RecordAdapterParams {
    record: Schema,
}

/// Fans a mapping out into the fields of a record contract, casting each
/// entry to its declared field type.
#[derive(Clone, Debug)]
pub struct ExpandRecordNode {
    id: String,
    record: RecordType,
}

impl ExpandRecordNode {
    pub const KIND: &'static str = "ExpandRecord";

    pub fn from_record_type(id: impl Into<String>, record: RecordType) -> Node {
        Node::new(Self {
            id: id.into(),
            record,
        })
    }

    pub(crate) fn deserialize(id: String, params: Json) -> Result<Node, EngineError> {
        let params: RecordAdapterParams = parse_params(Self::KIND, params)?;
        Ok(Node::new(Self {
            id,
            record: params.record.record_type()?,
        }))
    }
}

#[async_trait]
impl NodeImpl for ExpandRecordNode {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn params(&self) -> Json {
        json!({"record": Schema::of(&ValueType::Data(self.record.clone()))})
    }

    fn input_type(&self) -> RecordType {
        RecordType::new(
            "ExpandRecordInput",
            [(
                "data".to_string(),
                ValueType::string_map_of(ValueType::Any),
                true,
            )],
        )
    }

    fn output_type(&self) -> RecordType {
        self.record.clone()
    }

    async fn run(&self, context: &dyn Context, input: Record) -> Result<NodeOutput, EngineError> {
        let data = field(&input, "data")?
            .as_string_map()
            .ok_or_else(|| UserError::new("ExpandRecord input is not a mapping"))?
            .clone();
        let mut fields = BTreeMap::new();
        for (key, declared) in self.record.fields() {
            match data.get(key) {
                Some(value) => {
                    fields.insert(key.to_string(), value.cast_to(&declared.ty, context).await?);
                }
                None if declared.required => {
                    return Err(UserError::new(format!(
                        "mapping is missing required field {key:?}"
                    ))
                    .into());
                }
                None => {}
            }
        }
        Ok(self.record.validate(fields)?.into())
    }

    fn clone_with_id(&self, id: String) -> Node {
        Node::new(Self {
            id,
            record: self.record.clone(),
        })
    }
}

/// Collects the fields of a record contract back into a mapping.
#[derive(Clone, Debug)]
pub struct GatherRecordNode {
    id: String,
    record: RecordType,
}

impl GatherRecordNode {
    pub const KIND: &'static str = "GatherRecord";

    pub fn from_record_type(id: impl Into<String>, record: RecordType) -> Node {
        Node::new(Self {
            id: id.into(),
            record,
        })
    }

    pub(crate) fn deserialize(id: String, params: Json) -> Result<Node, EngineError> {
        let params: RecordAdapterParams = parse_params(Self::KIND, params)?;
        Ok(Node::new(Self {
            id,
            record: params.record.record_type()?,
        }))
    }
}

#[async_trait]
impl NodeImpl for GatherRecordNode {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn params(&self) -> Json {
        json!({"record": Schema::of(&ValueType::Data(self.record.clone()))})
    }

    fn input_type(&self) -> RecordType {
        self.record.clone()
    }

    fn output_type(&self) -> RecordType {
        RecordType::new(
            "GatherRecordOutput",
            [(
                "data".to_string(),
                ValueType::string_map_of(ValueType::Any),
                true,
            )],
        )
    }

    async fn run(&self, _context: &dyn Context, input: Record) -> Result<NodeOutput, EngineError> {
        let entries: BTreeMap<String, Value> = input
            .fields()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect();
        let data = Value::string_map(ValueType::Any, entries)?;
        let output = self
            .output_type()
            .validate(BTreeMap::from([("data".to_string(), data)]))?;
        Ok(output.into())
    }

    fn clone_with_id(&self, id: String) -> Node {
        Node::new(Self {
            id,
            record: self.record.clone(),
        })
    }
}
