// src/nodes/arithmetic.rs

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{json, Value as Json};

use crate::context::Context;
use crate::error::{EngineError, UserError};
use crate::node::{Node, NodeImpl, NodeOutput};
use crate::record::{Record, RecordType};
use crate::value::{Value, ValueType};

use super::{expect_empty_params, integer_field};

/// `{a, b} -> {sum}` over integers.
#[derive(Clone, Debug)]
pub struct AddNode {
    id: String,
}

impl AddNode {
    pub const KIND: &'static str = "Add";

    pub fn new(id: impl Into<String>) -> Node {
        Node::new(Self { id: id.into() })
    }

    pub(crate) fn deserialize(id: String, params: Json) -> Result<Node, EngineError> {
        expect_empty_params(Self::KIND, &params)?;
        Ok(Node::new(Self { id }))
    }
}

#[async_trait]
impl NodeImpl for AddNode {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn params(&self) -> Json {
        json!({})
    }

    fn input_type(&self) -> RecordType {
        RecordType::new(
            "AddInput",
            [
                ("a".to_string(), ValueType::Integer, true),
                ("b".to_string(), ValueType::Integer, true),
            ],
        )
    }

    fn output_type(&self) -> RecordType {
        RecordType::new("AddOutput", [("sum".to_string(), ValueType::Integer, true)])
    }

    async fn run(&self, _context: &dyn Context, input: Record) -> Result<NodeOutput, EngineError> {
        let a = integer_field(&input, "a")?;
        let b = integer_field(&input, "b")?;
        let sum = a
            .checked_add(b)
            .ok_or_else(|| UserError::new(format!("integer overflow computing {a} + {b}")))?;
        let output = self.output_type().validate(BTreeMap::from([(
            "sum".to_string(),
            Value::integer(sum),
        )]))?;
        Ok(output.into())
    }

    fn clone_with_id(&self, id: String) -> Node {
        Node::new(Self { id })
    }
}
