// src/nodes/error.rs

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::context::Context;
use crate::error::{EngineError, UserError};
use crate::node::{Node, NodeImpl, NodeOutput};
use crate::record::{Record, RecordType};
use crate::value::ValueType;

use super::{dump_params, parse_params, string_field};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorParams {
    pub error_name: String,
}

/// A node that always fails, for exercising error interception.
#[derive(Clone, Debug)]
pub struct ErrorNode {
    id: String,
    params: ErrorParams,
}

impl ErrorNode {
    pub const KIND: &'static str = "Error";

    pub fn from_name(id: impl Into<String>, error_name: impl Into<String>) -> Node {
        Node::new(Self {
            id: id.into(),
            params: ErrorParams {
                error_name: error_name.into(),
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
impl NodeImpl for ErrorNode {
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
        RecordType::new("ErrorInput", [("info".to_string(), ValueType::String, true)])
    }

    fn output_type(&self) -> RecordType {
        RecordType::empty("Empty")
    }

    async fn run(&self, _context: &dyn Context, input: Record) -> Result<NodeOutput, EngineError> {
        let info = string_field(&input, "info")?;
        Err(UserError::new(format!("{}: {info}", self.params.error_name)).into())
    }

    fn clone_with_id(&self, id: String) -> Node {
        Node::new(Self {
            id,
            params: self.params.clone(),
        })
    }
}
