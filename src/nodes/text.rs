// src/nodes/text.rs

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::context::Context;
use crate::error::EngineError;
use crate::file::FileKind;
use crate::node::{Node, NodeImpl, NodeOutput};
use crate::record::{Record, RecordType};
use crate::value::{Value, ValueType};

use super::{dump_params, file_field, parse_params, string_field};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppendToFileParams {
    pub suffix: String,
}

/// Appends text to a text file, writing the result to a sibling path with the
/// configured suffix: `test.txt` + `_append` -> `test_append.txt`.
#[derive(Clone, Debug)]
pub struct AppendToFileNode {
    id: String,
    params: AppendToFileParams,
}

impl AppendToFileNode {
    pub const KIND: &'static str = "AppendToFile";

    pub fn from_suffix(id: impl Into<String>, suffix: impl Into<String>) -> Node {
        Node::new(Self {
            id: id.into(),
            params: AppendToFileParams {
                suffix: suffix.into(),
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
impl NodeImpl for AppendToFileNode {
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
            "AppendToFileInput",
            [
                ("file".to_string(), ValueType::File(FileKind::Text), true),
                ("text".to_string(), ValueType::String, true),
            ],
        )
    }

    fn output_type(&self) -> RecordType {
        RecordType::new(
            "AppendToFileOutput",
            [("file".to_string(), ValueType::File(FileKind::Text), true)],
        )
    }

    async fn run(&self, context: &dyn Context, input: Record) -> Result<NodeOutput, EngineError> {
        let file = file_field(&input, "file")?;
        let text = string_field(&input, "text")?;

        let old_text = file.read_text(context).await?;
        let new_file = file.with_suffix(&self.params.suffix);
        let new_file = new_file
            .write_text(context, &format!("{old_text}{text}"))
            .await?;

        let output = self.output_type().validate(BTreeMap::from([(
            "file".to_string(),
            Value::file(new_file),
        )]))?;
        Ok(output.into())
    }

    fn clone_with_id(&self, id: String) -> Node {
        Node::new(Self {
            id,
            params: self.params.clone(),
        })
    }
}
