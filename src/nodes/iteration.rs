// src/nodes/iteration.rs
//
// =============================================================================
// DAGFLOW: ITERATION NODES
// =============================================================================
//
// `ForEach` applies an inner workflow to every element of a sequence. Its
// `run` does no element work itself: it builds a subgraph containing one
// namespaced copy of the inner workflow per element, wired through the
// gather/expand adapters from `nodes::data`, and hands that subgraph to the
// executor for expansion.
//
//            sequence
//               |
//         [ExpandSequence]
//          /           \
//     item_0           item_{n-1}
//        |                  |
//  [ExpandRecord]     [ExpandRecord]      one per element
//        |                  |
//   [0/<inner>]       [n-1/<inner>]       namespaced inner workflows
//        |                  |
//  [GatherRecord]     [GatherRecord]
//          \           /
//         [GatherSequence]
//               |
//            sequence

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::context::Context;
use crate::edge::{Edge, InputEdge, OutputEdge};
use crate::error::{EngineError, UserError};
use crate::node::{Node, NodeImpl, NodeOutput};
use crate::record::{Record, RecordType};
use crate::value::ValueType;
use crate::workflow::Workflow;

use super::data::{
    item_key, ExpandRecordNode, ExpandSequenceNode, GatherRecordNode, GatherSequenceNode,
};
use super::{dump_params, field, parse_params};

fn item_type() -> ValueType {
    ValueType::string_map_of(ValueType::Any)
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForEachParams {
    pub workflow: Workflow,
}

/// Runs the inner workflow once per element of the input sequence; the output
/// sequence holds one result mapping per element, in order.
#[derive(Clone, Debug)]
pub struct ForEachNode {
    id: String,
    params: ForEachParams,
}

impl ForEachNode {
    pub const KIND: &'static str = "ForEach";

    pub fn from_workflow(id: impl Into<String>, workflow: Workflow) -> Node {
        Node::new(Self {
            id: id.into(),
            params: ForEachParams { workflow },
        })
    }

    pub(crate) fn deserialize(id: String, params: Json) -> Result<Node, EngineError> {
        Ok(Node::new(Self {
            id,
            params: parse_params(Self::KIND, params)?,
        }))
    }

    /// The per-element wiring: expand the sequence, adapt each item into the
    /// inner workflow's input fields, and gather the inner outputs back.
    fn build_subgraph(&self, length: usize) -> Result<Workflow, EngineError> {
        let inner = &self.params.workflow;

        let expand = ExpandSequenceNode::from_length("expand", length, item_type());
        let gather = GatherSequenceNode::from_length("gather", length, item_type());

        let mut nodes = vec![expand.clone(), gather.clone()];
        let mut edges = Vec::new();

        for i in 0..length {
            let input_adapter = ExpandRecordNode::from_record_type(
                format!("{i}/input_adapter"),
                inner.input_type().clone(),
            );
            let item_workflow = inner.with_namespace(&i.to_string())?;
            let output_adapter = GatherRecordNode::from_record_type(
                format!("{i}/output_adapter"),
                inner.output_type().clone(),
            );

            edges.push(Edge::from_nodes(
                &expand,
                item_key(i),
                &input_adapter,
                "data",
            )?);
            for input_edge in item_workflow.input_edges() {
                edges.push(Edge::new(
                    input_adapter.id(),
                    input_edge.input_key.clone(),
                    input_edge.target_id.clone(),
                    input_edge.target_key.clone(),
                ));
            }
            edges.extend(item_workflow.edges().iter().cloned());
            for output_edge in item_workflow.output_edges() {
                edges.push(Edge::new(
                    output_edge.source_id.clone(),
                    output_edge.source_key.clone(),
                    output_adapter.id(),
                    output_edge.output_key.clone(),
                ));
            }
            edges.push(Edge::from_nodes(
                &output_adapter,
                "data",
                &gather,
                item_key(i),
            )?);

            nodes.push(input_adapter);
            nodes.extend(item_workflow.nodes().iter().cloned());
            nodes.push(output_adapter);
        }

        Workflow::new(
            nodes,
            edges,
            vec![InputEdge::from_node("sequence", &expand, "sequence")?],
            vec![OutputEdge::from_node(&gather, "sequence", "sequence")?],
        )
    }
}

#[async_trait]
impl NodeImpl for ForEachNode {
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
            "ForEachInput",
            [(
                "sequence".to_string(),
                ValueType::sequence_of(item_type()),
                true,
            )],
        )
    }

    fn output_type(&self) -> RecordType {
        RecordType::new(
            "ForEachOutput",
            [(
                "sequence".to_string(),
                ValueType::sequence_of(item_type()),
                true,
            )],
        )
    }

    async fn run(&self, _context: &dyn Context, input: Record) -> Result<NodeOutput, EngineError> {
        let length = field(&input, "sequence")?
            .as_sequence()
            .ok_or_else(|| UserError::new("ForEach input is not a sequence"))?
            .len();
        Ok(NodeOutput::Expand(self.build_subgraph(length)?))
    }

    fn clone_with_id(&self, id: String) -> Node {
        Node::new(Self {
            id,
            params: self.params.clone(),
        })
    }
}
