// src/context.rs
//
// =============================================================================
// DAGFLOW: CONTEXT CONTRACT
// =============================================================================
//
// A context is the environment one workflow run executes in. It owns the
// side-effectful concerns the engine stays out of: file storage, run
// persistence, memoization, and error interception. A context instance lives
// for exactly one run, identified by its `run_id`.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{EngineError, UserError, WorkflowErrors};
use crate::file::FileRef;
use crate::node::Node;
use crate::record::Record;
use crate::value::ValueMap;
use crate::workflow::Workflow;

pub mod in_memory;
pub mod local;

/// What a context decided to do with an intercepted node failure.
pub enum ErrorDisposition {
    /// The error is absorbed; the record becomes the node's output and
    /// execution continues as if the node had succeeded.
    Absorb(Record),
    /// The error stands and is recorded against the node.
    Propagate(EngineError),
}

/// The hook surface the engine consumes.
///
/// Every operation may suspend. The default hooks are identity
/// pass-throughs, so a minimal context only has to provide file storage.
#[async_trait]
pub trait Context: Send + Sync {
    /// The identifier of this run.
    fn run_id(&self) -> &str;

    /// Reads the bytes a file reference points at.
    async fn read(&self, file: &FileRef) -> Result<Vec<u8>, UserError>;

    /// Writes bytes for a file reference, returning the reference to use from
    /// now on (possibly with storage metadata stamped).
    async fn write(&self, file: &FileRef, content: &[u8]) -> Result<FileRef, UserError>;

    /// Called before any node runs. Returning a result short-circuits the
    /// whole run (memoization): the tuple is handed back to the caller and no
    /// node hook fires.
    async fn on_workflow_start(
        &self,
        workflow: &Workflow,
        input: &ValueMap,
    ) -> Result<Option<(WorkflowErrors, ValueMap)>, EngineError> {
        let _ = (workflow, input);
        Ok(None)
    }

    /// Called before a node executes, with the raw (uncast) input map.
    /// Returning a record skips the node and uses it as the node's output.
    async fn on_node_start(
        &self,
        node: &Node,
        input: &ValueMap,
    ) -> Result<Option<Record>, EngineError> {
        let _ = (node, input);
        Ok(None)
    }

    /// Called after a node produced an output; may transform it.
    async fn on_node_finish(
        &self,
        node: &Node,
        input: &ValueMap,
        output: Record,
    ) -> Result<Record, EngineError> {
        let _ = (node, input);
        Ok(output)
    }

    /// Called when a node failed; decides whether the failure is absorbed or
    /// recorded.
    async fn on_node_error(
        &self,
        node: &Node,
        input: &ValueMap,
        error: EngineError,
    ) -> Result<ErrorDisposition, EngineError> {
        let _ = (node, input);
        Ok(ErrorDisposition::Propagate(error))
    }

    /// Called once when a run completes without errors; may transform the
    /// output.
    async fn on_workflow_finish(
        &self,
        workflow: &Workflow,
        input: &ValueMap,
        output: ValueMap,
    ) -> Result<ValueMap, EngineError> {
        let _ = (workflow, input);
        Ok(output)
    }

    /// Called once when a run completes with errors, together with whatever
    /// partial output could be projected.
    async fn on_workflow_error(
        &self,
        workflow: &Workflow,
        input: &ValueMap,
        errors: WorkflowErrors,
        partial_output: ValueMap,
    ) -> Result<(WorkflowErrors, ValueMap), EngineError> {
        let _ = (workflow, input);
        Ok((errors, partial_output))
    }
}

/// A fresh run identifier for contexts that were not handed one.
pub fn generate_run_id() -> String {
    Uuid::new_v4().to_string()
}
