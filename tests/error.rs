// tests/error.rs
//
// Node failure does not abort the workflow: the failure is recorded, the
// partial output still projects, and the hook protocol fires in order.

mod common;

use std::collections::BTreeMap;

use anyhow::Result;
use dagflow::nodes::{AddNode, ConstantIntegerNode, ConstantStringNode, ErrorNode};
use dagflow::{
    Edge, OutputEdge, TopologicalExecutor, Value, ValueMap, Workflow, WorkflowErrors,
};

use common::{init_logging, input_of, RecordingContext};

fn create_error_workflow() -> Result<Workflow> {
    let constant = ConstantStringNode::from_value("constant", "workflow-engine".to_string());
    let error = ErrorNode::from_name("err", "RuntimeError");

    let workflow = Workflow::new(
        vec![constant.clone(), error.clone()],
        vec![Edge::from_nodes(&constant, "value", &error, "info")?],
        vec![],
        vec![OutputEdge::from_node(&constant, "value", "text")?],
    )?;
    Ok(workflow)
}

#[test]
fn error_workflow_serialization_roundtrip() -> Result<()> {
    init_logging();
    let workflow = create_error_workflow()?;
    let json = serde_json::to_string(&workflow)?;
    let deserialized: Workflow = serde_json::from_str(&json)?;
    assert_eq!(deserialized, workflow);
    Ok(())
}

#[tokio::test]
async fn error_is_recorded_and_partial_output_projects() -> Result<()> {
    init_logging();
    let workflow = create_error_workflow()?;
    let context = RecordingContext::new();

    let (errors, output) = TopologicalExecutor::new()
        .execute(&context, &workflow, ValueMap::new())
        .await?;

    assert_eq!(
        errors,
        WorkflowErrors {
            workflow_errors: vec![],
            node_errors: BTreeMap::from([(
                "err".to_string(),
                vec!["RuntimeError: workflow-engine".to_string()],
            )]),
        }
    );
    assert_eq!(output["text"], Value::string("workflow-engine"));

    let events = context.events();
    assert_eq!(events.first().map(String::as_str), Some("workflow_start"));
    assert_eq!(events.last().map(String::as_str), Some("workflow_error"));
    assert!(events.contains(&"node_error:err".to_string()));
    // the failed node never reaches on_node_finish
    assert!(!events.contains(&"node_finish:err".to_string()));
    Ok(())
}

#[tokio::test]
async fn hook_ordering_per_node() -> Result<()> {
    init_logging();
    let workflow = create_error_workflow()?;
    let context = RecordingContext::new();

    TopologicalExecutor::new()
        .execute(&context, &workflow, ValueMap::new())
        .await?;

    let events = context.events();
    let position = |event: &str| {
        events
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("missing event {event}"))
    };

    assert!(position("workflow_start") < position("node_start:constant"));
    assert!(position("node_start:constant") < position("node_finish:constant"));
    assert!(position("node_start:err") < position("node_error:err"));
    assert!(position("node_error:err") < position("workflow_error"));
    Ok(())
}

#[tokio::test]
async fn workflow_start_short_circuits_all_node_hooks() -> Result<()> {
    init_logging();
    let workflow = create_error_workflow()?;
    let context = RecordingContext::new();
    let recorded = (
        WorkflowErrors::new(),
        input_of([("text", Value::string("recorded"))]),
    );
    *context.recorded_result.lock().unwrap() = Some(recorded.clone());

    let (errors, output) = TopologicalExecutor::new()
        .execute(&context, &workflow, ValueMap::new())
        .await?;

    assert!(!errors.any());
    assert_eq!(output, recorded.1);
    assert_eq!(context.events(), vec!["workflow_start".to_string()]);
    Ok(())
}

#[tokio::test]
async fn independent_branches_survive_a_failing_node() -> Result<()> {
    init_logging();

    // left branch fails; the right branch is untouched and still projects
    let constant = ConstantStringNode::from_value("constant", "boom".to_string());
    let error = ErrorNode::from_name("err", "ValueError");
    let lhs = ConstantIntegerNode::from_value("lhs", 20);
    let rhs = ConstantIntegerNode::from_value("rhs", 22);
    let add = AddNode::new("add");

    let workflow = Workflow::new(
        vec![
            constant.clone(),
            error.clone(),
            lhs.clone(),
            rhs.clone(),
            add.clone(),
        ],
        vec![
            Edge::from_nodes(&constant, "value", &error, "info")?,
            Edge::from_nodes(&lhs, "value", &add, "a")?,
            Edge::from_nodes(&rhs, "value", &add, "b")?,
        ],
        vec![],
        vec![OutputEdge::from_node(&add, "sum", "sum")?],
    )?;

    let context = RecordingContext::new();
    let (errors, output) = TopologicalExecutor::new()
        .execute(&context, &workflow, ValueMap::new())
        .await?;

    assert!(errors.any());
    assert_eq!(errors.node_errors.len(), 1);
    assert_eq!(output["sum"], Value::integer(42));
    Ok(())
}
