// src/execution.rs
//
// =============================================================================
// DAGFLOW: TOPOLOGICAL EXECUTOR
// =============================================================================
//
// The driver: a single cooperative async task that pulls nodes out of the
// ready set, runs the per-node call protocol against the context's hooks,
// splices dynamically returned subgraphs, and aggregates failures without
// aborting the rest of the graph.
//
// The only parallel work is the per-field cast fan-out while preparing one
// node's input; everything else is sequential with respect to this driver.
//
// Cancellation is cooperative: dropping the `execute` future stops the run at
// its next suspension point, and no further nodes are scheduled.

use std::collections::{BTreeMap, BTreeSet};

use futures::future::try_join_all;

use crate::context::{Context, ErrorDisposition};
use crate::error::{EngineError, UserError, WorkflowErrors};
use crate::node::{Node, NodeOutput};
use crate::record::Record;
use crate::value::{Value, ValueMap};
use crate::workflow::Workflow;

/// What one node invocation produced.
enum Invocation {
    Output(Record),
    Expanded(Workflow),
}

/// Executes workflows one node at a time, in dependency order, on the current
/// task.
#[derive(Debug, Default)]
pub struct TopologicalExecutor;

impl TopologicalExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Runs `workflow` against `context` with the given external input.
    ///
    /// The caller always receives `(errors, output)`: node failures are
    /// collected, unreachable downstream nodes are skipped, and the output is
    /// the partial projection of whatever completed. `Err` is reserved for
    /// the fatal conditions: an invalid dynamic expansion or a failing
    /// context hook at the workflow level.
    pub async fn execute(
        &self,
        context: &dyn Context,
        workflow: &Workflow,
        input: ValueMap,
    ) -> Result<(WorkflowErrors, ValueMap), EngineError> {
        if let Some((errors, output)) = context.on_workflow_start(workflow, &input).await? {
            log::info!(
                "run {}: workflow output already known, skipping execution",
                context.run_id()
            );
            return Ok((errors, output));
        }

        // dynamic expansion rewrites the graph, so the executor owns a
        // working copy
        let mut workflow = workflow.clone();
        let mut node_outputs: BTreeMap<String, Record> = BTreeMap::new();
        let mut errors = WorkflowErrors::new();
        let mut failed: BTreeSet<String> = BTreeSet::new();

        let mut ready = workflow.ready_nodes(&input, &node_outputs, &BTreeMap::new());
        loop {
            let Some(node_id) = ready.keys().find(|id| !failed.contains(*id)).cloned() else {
                break;
            };
            let raw_input = ready.remove(&node_id).expect("key taken from ready set");
            let node = workflow
                .node(&node_id)
                .expect("ready nodes exist in the graph")
                .clone();

            log::debug!("run {}: node {node_id} starting", context.run_id());
            match Self::invoke(context, &node, &raw_input).await {
                Ok(Invocation::Output(output)) => {
                    node_outputs.insert(node_id.clone(), output);
                }
                Ok(Invocation::Expanded(subgraph)) => {
                    // invalid expansions are fatal, not node failures
                    workflow = workflow.expand_node(&node_id, &subgraph)?;
                    log::info!(
                        "run {}: node {node_id} expanded into {} nodes",
                        context.run_id(),
                        subgraph.nodes().len()
                    );
                }
                Err(error) => match context.on_node_error(&node, &raw_input, error).await? {
                    ErrorDisposition::Absorb(output) => {
                        log::debug!("run {}: node {node_id} error absorbed", context.run_id());
                        node_outputs.insert(node_id.clone(), output);
                    }
                    ErrorDisposition::Propagate(error) => {
                        let wrapped = EngineError::for_node(node_id.clone(), error);
                        log::warn!("run {}: {wrapped}", context.run_id());
                        errors.push_node_error(&node_id, wrapped_message(&wrapped));
                        failed.insert(node_id.clone());
                    }
                },
            }

            ready = workflow.ready_nodes(&input, &node_outputs, &ready);
        }

        if errors.any() {
            let partial = workflow.partial_output(&node_outputs);
            return context
                .on_workflow_error(&workflow, &input, errors, partial)
                .await;
        }
        match workflow.output(&node_outputs) {
            Ok(output) => {
                let output = context.on_workflow_finish(&workflow, &input, output).await?;
                Ok((errors, output))
            }
            Err(projection_error) => {
                // no node failed, but some outputs never materialized (an
                // optional external input was withheld); surface that as a
                // workflow-level error with the partial projection
                errors.push_workflow_error(projection_error.user_message());
                let partial = workflow.partial_output(&node_outputs);
                context
                    .on_workflow_error(&workflow, &input, errors, partial)
                    .await
            }
        }
    }

    /// The per-node call protocol: skip hook, concurrent input casts, record
    /// validation, `run`.
    async fn invoke(
        context: &dyn Context,
        node: &Node,
        raw_input: &ValueMap,
    ) -> Result<Invocation, EngineError> {
        if let Some(output) = context.on_node_start(node, raw_input).await? {
            return Ok(Invocation::Output(output));
        }

        let input_type = node.input_type();
        let input_contract = &input_type;
        let casts = raw_input.iter().map(|(key, value)| async move {
            let casted = match input_contract.field(key) {
                Some(field) if value.value_type() != &field.ty => {
                    value.cast_to(&field.ty, context).await?
                }
                _ => value.clone(),
            };
            Ok::<_, UserError>((key.clone(), casted))
        });
        let cast_fields: BTreeMap<String, Value> =
            try_join_all(casts).await?.into_iter().collect();
        let input = input_type.validate(cast_fields)?;

        match node.run(context, input).await? {
            NodeOutput::Record(output) => {
                let output = context.on_node_finish(node, raw_input, output).await?;
                Ok(Invocation::Output(output))
            }
            NodeOutput::Expand(subgraph) => Ok(Invocation::Expanded(subgraph)),
        }
    }
}

fn wrapped_message(error: &EngineError) -> String {
    match error {
        EngineError::Node { source, .. } => source.user_message(),
        other => other.user_message(),
    }
}
