// tests/addition.rs
//
// The three-node addition workflow: two constants feed an add node, whose sum
// feeds a second add node together with an external input.

mod common;

use anyhow::Result;
use dagflow::nodes::{AddNode, ConstantIntegerNode};
use dagflow::{Edge, InMemoryContext, InputEdge, OutputEdge, TopologicalExecutor, Value, Workflow};

use common::{init_logging, input_of};

fn create_addition_workflow() -> Result<Workflow> {
    let a = ConstantIntegerNode::from_value("a", 42);
    let b = ConstantIntegerNode::from_value("b", 2025);
    let a_plus_b = AddNode::new("a_plus_b");
    let a_plus_b_plus_c = AddNode::new("a_plus_b_plus_c");

    let workflow = Workflow::new(
        vec![
            a.clone(),
            b.clone(),
            a_plus_b.clone(),
            a_plus_b_plus_c.clone(),
        ],
        vec![
            Edge::from_nodes(&a, "value", &a_plus_b, "a")?,
            Edge::from_nodes(&b, "value", &a_plus_b, "b")?,
            Edge::from_nodes(&a_plus_b, "sum", &a_plus_b_plus_c, "a")?,
        ],
        vec![InputEdge::from_node("c", &a_plus_b_plus_c, "b")?],
        vec![OutputEdge::from_node(&a_plus_b_plus_c, "sum", "sum")?],
    )?;
    Ok(workflow)
}

#[test]
fn workflow_serialization_roundtrip() -> Result<()> {
    init_logging();
    let workflow = create_addition_workflow()?;
    let json = serde_json::to_string(&workflow)?;
    let deserialized: Workflow = serde_json::from_str(&json)?;
    assert_eq!(deserialized, workflow);
    Ok(())
}

#[tokio::test]
async fn workflow_execution() -> Result<()> {
    init_logging();
    let workflow = create_addition_workflow()?;
    let context = InMemoryContext::new();

    let c = -256;
    let (errors, output) = TopologicalExecutor::new()
        .execute(&context, &workflow, input_of([("c", Value::integer(c))]))
        .await?;

    assert!(!errors.any());
    assert_eq!(output["sum"], Value::integer(42 + 2025 + c));
    Ok(())
}

#[tokio::test]
async fn execution_after_roundtrip_matches() -> Result<()> {
    init_logging();
    let workflow = create_addition_workflow()?;
    let json = serde_json::to_string(&workflow)?;
    let deserialized: Workflow = serde_json::from_str(&json)?;

    let context = InMemoryContext::new();
    let (errors, output) = TopologicalExecutor::new()
        .execute(
            &context,
            &deserialized,
            input_of([("c", Value::integer(0))]),
        )
        .await?;

    assert!(!errors.any());
    assert_eq!(output["sum"], Value::integer(2067));
    Ok(())
}
