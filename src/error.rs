// src/error.rs
//
// =============================================================================
// DAGFLOW: ERROR TAXONOMY
// =============================================================================
//
// Three layers of failure:
// 1. `UserError`   - a problem attributable to user input (bad cast, missing
//                    file, schema mismatch). Recorded, never fatal.
// 2. `EngineError` - everything the engine can raise, including wrapped node
//                    failures and the fatal structural conditions.
// 3. `WorkflowErrors` - the aggregated, serializable record returned to the
//                    caller alongside a (possibly partial) output.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::workflow::Workflow;

/// A problem attributable to the caller or the workflow author.
///
/// User errors surface in the aggregated error record; they do not abort the
/// rest of the workflow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct UserError(pub String);

impl UserError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Any failure the engine can produce.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    User(#[from] UserError),

    /// A wrapped node-level failure.
    #[error("node {node_id} failed: {source}")]
    Node {
        node_id: String,
        #[source]
        source: Box<EngineError>,
    },

    /// A node returned a subgraph that cannot be spliced into the workflow.
    #[error("node {node_id} expanded into an invalid subgraph: {source}")]
    Expansion {
        node_id: String,
        subgraph: Box<Workflow>,
        #[source]
        source: Box<EngineError>,
    },

    /// A structural invariant of a workflow does not hold.
    #[error("workflow validation failed: {0}")]
    Validation(String),

    /// A write-after-freeze or duplicate registration in a process-wide
    /// registry.
    #[error("registry error: {0}")]
    Registry(String),
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn registry(message: impl Into<String>) -> Self {
        Self::Registry(message.into())
    }

    pub fn for_node(node_id: impl Into<String>, source: EngineError) -> Self {
        Self::Node {
            node_id: node_id.into(),
            source: Box::new(source),
        }
    }

    /// The message recorded in [`WorkflowErrors`]: user errors keep their
    /// original text, everything else uses the display form.
    pub fn user_message(&self) -> String {
        match self {
            Self::User(e) => e.0.clone(),
            other => other.to_string(),
        }
    }
}

/// The aggregated error record of one workflow run.
///
/// This is data, not an exception: it is returned (together with whatever
/// partial output could be projected) rather than raised, and it serializes
/// into the persisted run state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowErrors {
    pub workflow_errors: Vec<String>,
    pub node_errors: BTreeMap<String, Vec<String>>,
}

impl WorkflowErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn any(&self) -> bool {
        !self.workflow_errors.is_empty() || !self.node_errors.is_empty()
    }

    pub fn push_workflow_error(&mut self, message: impl Into<String>) {
        self.workflow_errors.push(message.into());
    }

    pub fn push_node_error(&mut self, node_id: &str, message: impl Into<String>) {
        self.node_errors
            .entry(node_id.to_string())
            .or_default()
            .push(message.into());
    }
}
