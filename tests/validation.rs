// tests/validation.rs
//
// Structural invariants: typed edges, unique ids and in-edges, required-input
// coverage, acyclicity, the namespacing prefix rule, and discriminator
// dispatch.

mod common;

use anyhow::Result;
use async_trait::async_trait;
use dagflow::nodes::{AddNode, ConstantIntegerNode, ConstantStringNode};
use dagflow::{
    Context, Edge, EngineError, Node, NodeImpl, NodeOutput, OutputEdge, Record, RecordType, Value,
    ValueType, Workflow,
};

use common::init_logging;

/// A test-only node with arbitrary input/output contracts; never executed.
#[derive(Clone)]
struct TypedStub {
    id: String,
    input: RecordType,
    output: RecordType,
}

impl TypedStub {
    fn new(id: &str, input: RecordType, output: RecordType) -> Node {
        Node::new(Self {
            id: id.to_string(),
            input,
            output,
        })
    }

    fn source(id: &str, ty: ValueType) -> Node {
        Self::new(
            id,
            RecordType::empty("Empty"),
            RecordType::new("StubOutput", [("value".to_string(), ty, true)]),
        )
    }

    fn sink(id: &str, ty: ValueType) -> Node {
        Self::new(
            id,
            RecordType::new("StubInput", [("value".to_string(), ty, true)]),
            RecordType::empty("Empty"),
        )
    }
}

#[async_trait]
impl NodeImpl for TypedStub {
    fn kind(&self) -> &'static str {
        "TypedStub"
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn params(&self) -> serde_json::Value {
        serde_json::json!({})
    }

    fn input_type(&self) -> RecordType {
        self.input.clone()
    }

    fn output_type(&self) -> RecordType {
        self.output.clone()
    }

    async fn run(&self, _context: &dyn Context, _input: Record) -> Result<NodeOutput, EngineError> {
        Ok(Record::empty("Empty").into())
    }

    fn clone_with_id(&self, id: String) -> Node {
        Node::new(Self {
            id,
            input: self.input.clone(),
            output: self.output.clone(),
        })
    }
}

#[test]
fn edge_rejects_uncastable_types() {
    init_logging();
    let source = TypedStub::source("source", ValueType::sequence_of(ValueType::Any));
    let target = TypedStub::sink("target", ValueType::sequence_of(ValueType::Integer));

    let edge = Edge::from_nodes(&source, "value", &target, "value");
    assert!(edge.is_err(), "Sequence<Any> must not flow into Sequence<Integer>");
}

#[test]
fn edge_accepts_castable_types() -> Result<()> {
    init_logging();
    let source = TypedStub::source("source", ValueType::Integer);
    let target = TypedStub::sink("target", ValueType::Float);
    Edge::from_nodes(&source, "value", &target, "value")?;

    // and anything flows into Any
    let any_sink = TypedStub::sink("any", ValueType::Any);
    Edge::from_nodes(&source, "value", &any_sink, "value")?;
    Ok(())
}

#[test]
fn edge_rejects_unknown_fields() {
    init_logging();
    let source = ConstantIntegerNode::from_value("source", 1);
    let target = AddNode::new("add");
    assert!(Edge::from_nodes(&source, "nope", &target, "a").is_err());
    assert!(Edge::from_nodes(&source, "value", &target, "nope").is_err());
}

#[test]
fn workflow_rejects_duplicate_node_ids() {
    init_logging();
    let a = ConstantIntegerNode::from_value("dup", 1);
    let b = ConstantIntegerNode::from_value("dup", 2);
    assert!(Workflow::new(vec![a, b], vec![], vec![], vec![]).is_err());
}

#[test]
fn workflow_rejects_duplicate_in_edges() -> Result<()> {
    init_logging();
    let a = ConstantIntegerNode::from_value("a", 1);
    let b = ConstantIntegerNode::from_value("b", 2);
    let add = AddNode::new("add");

    let result = Workflow::new(
        vec![a.clone(), b.clone(), add.clone()],
        vec![
            Edge::from_nodes(&a, "value", &add, "a")?,
            Edge::from_nodes(&b, "value", &add, "a")?,
            Edge::from_nodes(&b, "value", &add, "b")?,
        ],
        vec![],
        vec![],
    );
    assert!(result.is_err(), "two edges into add.a must be rejected");
    Ok(())
}

#[test]
fn workflow_rejects_missing_required_inputs() {
    init_logging();
    let add = AddNode::new("add");
    let result = Workflow::new(vec![add], vec![], vec![], vec![]);
    assert!(result.is_err(), "add has unsatisfied required inputs");
}

#[test]
fn workflow_rejects_cycles() {
    init_logging();
    let forward = TypedStub::new(
        "forward",
        RecordType::new("In", [("value".to_string(), ValueType::Integer, true)]),
        RecordType::new("Out", [("value".to_string(), ValueType::Integer, true)]),
    );
    let backward = TypedStub::new(
        "backward",
        RecordType::new("In", [("value".to_string(), ValueType::Integer, true)]),
        RecordType::new("Out", [("value".to_string(), ValueType::Integer, true)]),
    );

    let result = Workflow::new(
        vec![forward, backward],
        vec![
            Edge::new("forward", "value", "backward", "value"),
            Edge::new("backward", "value", "forward", "value"),
        ],
        vec![],
        vec![],
    );
    assert!(result.is_err(), "cycles must be rejected");
}

#[test]
fn workflow_rejects_namespace_prefix_collisions() {
    init_logging();
    let outer = ConstantIntegerNode::from_value("ns", 1);
    let inner = ConstantIntegerNode::from_value("ns/inner", 2);
    let result = Workflow::new(vec![outer, inner], vec![], vec![], vec![]);
    assert!(result.is_err(), "\"ns\" is a namespace prefix of \"ns/inner\"");
}

#[test]
fn workflow_rejects_edges_to_unknown_nodes() -> Result<()> {
    init_logging();
    let a = ConstantIntegerNode::from_value("a", 1);
    let result = Workflow::new(
        vec![a],
        vec![Edge::new("a", "value", "ghost", "value")],
        vec![],
        vec![],
    );
    assert!(result.is_err());
    Ok(())
}

#[test]
fn unknown_discriminator_is_rejected() {
    init_logging();
    let json = r#"{
        "nodes": [{"type": "Bogus", "id": "x", "params": {}}],
        "edges": [], "input_edges": [], "output_edges": []
    }"#;
    let result: std::result::Result<Workflow, _> = serde_json::from_str(json);
    assert!(result.is_err());
}

#[test]
fn node_wire_form_roundtrips() -> Result<()> {
    init_logging();
    let node: Node = serde_json::from_str(
        r#"{"type": "ConstantInteger", "id": "c", "params": {"value": 7}}"#,
    )?;
    assert_eq!(node.kind(), "ConstantInteger");
    assert_eq!(node.id(), "c");
    assert_eq!(node.params(), serde_json::json!({"value": 7}));
    assert_eq!(
        serde_json::to_value(&node)?,
        serde_json::json!({"type": "ConstantInteger", "id": "c", "params": {"value": 7}}),
    );
    Ok(())
}

#[test]
fn node_params_reject_unknown_fields() {
    init_logging();
    let result: std::result::Result<Node, _> = serde_json::from_str(
        r#"{"type": "ConstantInteger", "id": "c", "params": {"value": 7, "extra": true}}"#,
    );
    assert!(result.is_err());
}

#[test]
fn namespacing_prefixes_ids() -> Result<()> {
    init_logging();
    let constant = ConstantStringNode::from_value("c", "x".to_string());
    let workflow = Workflow::new(
        vec![constant.clone()],
        vec![],
        vec![],
        vec![OutputEdge::from_node(&constant, "value", "value")?],
    )?;
    let namespaced = workflow.with_namespace("outer")?;
    assert_eq!(namespaced.nodes()[0].id(), "outer/c");
    assert_eq!(namespaced.output_edges()[0].source_id, "outer/c");
    // external keys stay as they are
    assert_eq!(namespaced.output_edges()[0].output_key, "value");
    Ok(())
}

#[test]
fn required_target_rejects_optional_source() {
    init_logging();
    let source = TypedStub::new(
        "source",
        RecordType::empty("Empty"),
        RecordType::new(
            "Out",
            [("value".to_string(), ValueType::Integer, false)],
        ),
    );
    let target = TypedStub::sink("target", ValueType::Integer);
    assert!(Edge::from_nodes(&source, "value", &target, "value").is_err());
}

#[test]
fn ready_set_is_monotonic() -> Result<()> {
    init_logging();
    let a = ConstantIntegerNode::from_value("a", 1);
    let b = ConstantIntegerNode::from_value("b", 2);
    let add = AddNode::new("add");
    let workflow = Workflow::new(
        vec![a.clone(), b.clone(), add.clone()],
        vec![
            Edge::from_nodes(&a, "value", &add, "a")?,
            Edge::from_nodes(&b, "value", &add, "b")?,
        ],
        vec![],
        vec![OutputEdge::from_node(&add, "sum", "sum")?],
    )?;

    let input = dagflow::ValueMap::new();
    let mut node_outputs = std::collections::BTreeMap::new();

    let ready = workflow.ready_nodes(&input, &node_outputs, &Default::default());
    assert_eq!(ready.keys().collect::<Vec<_>>(), ["a", "b"]);

    // finishing `a` keeps `b` ready and never resurrects `a`
    node_outputs.insert(
        "a".to_string(),
        a.output_type().validate(std::collections::BTreeMap::from([(
            "value".to_string(),
            Value::integer(1),
        )]))?,
    );
    let ready = workflow.ready_nodes(&input, &node_outputs, &ready);
    assert_eq!(ready.keys().collect::<Vec<_>>(), ["b"]);

    node_outputs.insert(
        "b".to_string(),
        b.output_type().validate(std::collections::BTreeMap::from([(
            "value".to_string(),
            Value::integer(2),
        )]))?,
    );
    let ready = workflow.ready_nodes(&input, &node_outputs, &ready);
    assert_eq!(ready.keys().collect::<Vec<_>>(), ["add"]);
    assert_eq!(ready["add"]["a"], Value::integer(1));

    Ok(())
}
