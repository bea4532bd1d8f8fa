// src/nodes/json.rs
//
// Nodes that move whole JSON documents between files and values.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::context::Context;
use crate::error::{EngineError, UserError};
use crate::file::{FileKind, FileRef};
use crate::node::{Node, NodeImpl, NodeOutput};
use crate::record::{Record, RecordType};
use crate::value::{Value, ValueType};

use super::{dump_params, expect_empty_params, field, file_field, parse_params, sequence_field};

/// Reads a JSON file into a value.
#[derive(Clone, Debug)]
pub struct ReadJsonNode {
    id: String,
}

impl ReadJsonNode {
    pub const KIND: &'static str = "ReadJSON";

    pub fn new(id: impl Into<String>) -> Node {
        Node::new(Self { id: id.into() })
    }

    pub(crate) fn deserialize(id: String, params: Json) -> Result<Node, EngineError> {
        expect_empty_params(Self::KIND, &params)?;
        Ok(Node::new(Self { id }))
    }
}

#[async_trait]
impl NodeImpl for ReadJsonNode {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn params(&self) -> Json {
        serde_json::json!({})
    }

    fn input_type(&self) -> RecordType {
        RecordType::new(
            "ReadJSONInput",
            [("file".to_string(), ValueType::File(FileKind::Json), true)],
        )
    }

    fn output_type(&self) -> RecordType {
        RecordType::new("ReadJSONOutput", [("data".to_string(), ValueType::Any, true)])
    }

    async fn run(&self, context: &dyn Context, input: Record) -> Result<NodeOutput, EngineError> {
        let file = file_field(&input, "file")?;
        let data = file.read_data(context).await?;
        let output = self.output_type().validate(BTreeMap::from([(
            "data".to_string(),
            Value::of_json(&data),
        )]))?;
        Ok(output.into())
    }

    fn clone_with_id(&self, id: String) -> Node {
        Node::new(Self { id })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WriteJsonParams {
    pub file_name: String,
    /// 0 means compact output.
    #[serde(default)]
    pub indent: u32,
}

/// Saves its input as a JSON file.
#[derive(Clone, Debug)]
pub struct WriteJsonNode {
    id: String,
    params: WriteJsonParams,
}

impl WriteJsonNode {
    pub const KIND: &'static str = "WriteJSON";

    pub fn from_file_name(id: impl Into<String>, file_name: impl Into<String>) -> Node {
        Node::new(Self {
            id: id.into(),
            params: WriteJsonParams {
                file_name: file_name.into(),
                indent: 0,
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
impl NodeImpl for WriteJsonNode {
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
        RecordType::new("WriteJSONInput", [("data".to_string(), ValueType::Any, true)])
    }

    fn output_type(&self) -> RecordType {
        RecordType::new(
            "WriteJSONOutput",
            [("file".to_string(), ValueType::File(FileKind::Json), true)],
        )
    }

    async fn run(&self, context: &dyn Context, input: Record) -> Result<NodeOutput, EngineError> {
        let data = field(&input, "data")?.to_json();
        let text = if self.params.indent > 0 {
            serde_json::to_string_pretty(&data)
        } else {
            serde_json::to_string(&data)
        }
        .map_err(|e| UserError::new(format!("cannot serialize data: {e}")))?;

        let file = FileRef::json(&self.params.file_name);
        let file = file.write_text(context, &text).await?;

        let output = self
            .output_type()
            .validate(BTreeMap::from([("file".to_string(), Value::file(file))]))?;
        Ok(output.into())
    }

    fn clone_with_id(&self, id: String) -> Node {
        Node::new(Self {
            id,
            params: self.params.clone(),
        })
    }
}

/// Reads a JSON-lines file into a sequence of values.
#[derive(Clone, Debug)]
pub struct ReadJsonLinesNode {
    id: String,
}

impl ReadJsonLinesNode {
    pub const KIND: &'static str = "ReadJSONLines";

    pub fn new(id: impl Into<String>) -> Node {
        Node::new(Self { id: id.into() })
    }

    pub(crate) fn deserialize(id: String, params: Json) -> Result<Node, EngineError> {
        expect_empty_params(Self::KIND, &params)?;
        Ok(Node::new(Self { id }))
    }
}

#[async_trait]
impl NodeImpl for ReadJsonLinesNode {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn params(&self) -> Json {
        serde_json::json!({})
    }

    fn input_type(&self) -> RecordType {
        RecordType::new(
            "ReadJSONLinesInput",
            [(
                "file".to_string(),
                ValueType::File(FileKind::JsonLines),
                true,
            )],
        )
    }

    fn output_type(&self) -> RecordType {
        RecordType::new(
            "ReadJSONLinesOutput",
            [(
                "data".to_string(),
                ValueType::sequence_of(ValueType::Any),
                true,
            )],
        )
    }

    async fn run(&self, context: &dyn Context, input: Record) -> Result<NodeOutput, EngineError> {
        let file = file_field(&input, "file")?;
        let lines = file.read_lines(context).await?;
        let data = Value::sequence(
            ValueType::Any,
            lines.iter().map(Value::of_json).collect(),
        )?;
        let output = self
            .output_type()
            .validate(BTreeMap::from([("data".to_string(), data)]))?;
        Ok(output.into())
    }

    fn clone_with_id(&self, id: String) -> Node {
        Node::new(Self { id })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WriteJsonLinesParams {
    pub file_name: String,
    // no indent: JSON-lines documents are one line each by definition
}

/// Saves a sequence as a JSON-lines file.
#[derive(Clone, Debug)]
pub struct WriteJsonLinesNode {
    id: String,
    params: WriteJsonLinesParams,
}

impl WriteJsonLinesNode {
    pub const KIND: &'static str = "WriteJSONLines";

    pub fn from_file_name(id: impl Into<String>, file_name: impl Into<String>) -> Node {
        Node::new(Self {
            id: id.into(),
            params: WriteJsonLinesParams {
                file_name: file_name.into(),
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
impl NodeImpl for WriteJsonLinesNode {
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
            "WriteJSONLinesInput",
            [(
                "data".to_string(),
                ValueType::sequence_of(ValueType::Any),
                true,
            )],
        )
    }

    fn output_type(&self) -> RecordType {
        RecordType::new(
            "WriteJSONLinesOutput",
            [(
                "file".to_string(),
                ValueType::File(FileKind::JsonLines),
                true,
            )],
        )
    }

    async fn run(&self, context: &dyn Context, input: Record) -> Result<NodeOutput, EngineError> {
        let items = sequence_field(&input, "data")?;
        let lines: Vec<Json> = items.iter().map(Value::to_json).collect();

        let file = FileRef::json_lines(&self.params.file_name);
        let file = file.write_lines(context, &lines).await?;

        let output = self
            .output_type()
            .validate(BTreeMap::from([("file".to_string(), Value::file(file))]))?;
        Ok(output.into())
    }

    fn clone_with_id(&self, id: String) -> Node {
        Node::new(Self {
            id,
            params: self.params.clone(),
        })
    }
}
