// src/nodes/conditional.rs
//
// Branching via dynamic expansion: a conditional node's `run` returns the
// chosen inner workflow, and the executor splices it in place of the node.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::context::Context;
use crate::error::EngineError;
use crate::node::{Node, NodeImpl, NodeOutput};
use crate::record::{Record, RecordType};
use crate::value::ValueType;
use crate::workflow::Workflow;

use super::{boolean_field, dump_params, parse_params};

fn condition_base() -> RecordType {
    RecordType::new(
        "ConditionalInput",
        [("condition".to_string(), ValueType::Boolean, true)],
    )
    // downstream re-wiring may hand conditional nodes more than they declare
    .with_extra_allowed()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IfParams {
    pub if_true: Workflow,
}

/// Executes the inner workflow when the condition holds; produces nothing
/// otherwise.
#[derive(Clone, Debug)]
pub struct IfNode {
    id: String,
    params: IfParams,
    input: RecordType,
}

impl IfNode {
    pub const KIND: &'static str = "If";

    pub fn from_workflow(id: impl Into<String>, if_true: Workflow) -> Result<Node, EngineError> {
        let input = condition_base().merged("IfInput", if_true.input_type())?;
        Ok(Node::new(Self {
            id: id.into(),
            params: IfParams { if_true },
            input,
        }))
    }

    pub(crate) fn deserialize(id: String, params: Json) -> Result<Node, EngineError> {
        let params: IfParams = parse_params(Self::KIND, params)?;
        Self::from_workflow(id, params.if_true)
    }
}

#[async_trait]
impl NodeImpl for IfNode {
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
        self.input.clone()
    }

    fn output_type(&self) -> RecordType {
        // there would be no valid output when the condition is false
        RecordType::empty("Empty")
    }

    async fn run(&self, _context: &dyn Context, input: Record) -> Result<NodeOutput, EngineError> {
        if boolean_field(&input, "condition")? {
            Ok(NodeOutput::Expand(self.params.if_true.clone()))
        } else {
            Ok(Record::empty("Empty").into())
        }
    }

    fn clone_with_id(&self, id: String) -> Node {
        Node::new(Self {
            id,
            params: self.params.clone(),
            input: self.input.clone(),
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IfElseParams {
    pub if_true: Workflow,
    pub if_false: Workflow,
}

/// Executes one of two inner workflows based on the condition. The output
/// contract is the field intersection of the two arms, so either branch can
/// satisfy downstream consumers.
#[derive(Clone, Debug)]
pub struct IfElseNode {
    id: String,
    params: IfElseParams,
    input: RecordType,
    output: RecordType,
}

impl IfElseNode {
    pub const KIND: &'static str = "IfElse";

    pub fn from_workflows(
        id: impl Into<String>,
        if_true: Workflow,
        if_false: Workflow,
    ) -> Result<Node, EngineError> {
        let input = condition_base().merged("IfElseInput", if_true.input_type())?;

        let true_output = if_true.output_type();
        let false_output = if_false.output_type();
        let mut shared = Vec::new();
        for (key, field) in true_output.fields() {
            if false_output.field(key) == Some(field) {
                shared.push((key.to_string(), field.ty.clone(), true));
            }
        }
        let output = RecordType::new("IfElseOutput", shared);

        Ok(Node::new(Self {
            id: id.into(),
            params: IfElseParams { if_true, if_false },
            input,
            output,
        }))
    }

    pub(crate) fn deserialize(id: String, params: Json) -> Result<Node, EngineError> {
        let params: IfElseParams = parse_params(Self::KIND, params)?;
        Self::from_workflows(id, params.if_true, params.if_false)
    }
}

#[async_trait]
impl NodeImpl for IfElseNode {
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
        self.input.clone()
    }

    fn output_type(&self) -> RecordType {
        self.output.clone()
    }

    async fn run(&self, _context: &dyn Context, input: Record) -> Result<NodeOutput, EngineError> {
        let arm = if boolean_field(&input, "condition")? {
            &self.params.if_true
        } else {
            &self.params.if_false
        };
        Ok(NodeOutput::Expand(arm.clone()))
    }

    fn clone_with_id(&self, id: String) -> Node {
        Node::new(Self {
            id,
            params: self.params.clone(),
            input: self.input.clone(),
            output: self.output.clone(),
        })
    }
}
