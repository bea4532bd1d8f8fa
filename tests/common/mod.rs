// tests/common/mod.rs
//
// Shared test fixtures: a context that records every hook transition and
// counts file I/O, so tests can assert ordering, memoization, and
// short-circuit behavior.
//
// Not every test binary uses every fixture.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use dagflow::{
    Context, ErrorDisposition, FileRef, InMemoryContext, Node, Record, UserError, Value, ValueMap,
    Workflow, WorkflowErrors,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Default)]
pub struct RecordingContext {
    inner: InMemoryContext,
    pub events: Mutex<Vec<String>>,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
    /// When set, `on_workflow_start` short-circuits the run with this result.
    pub recorded_result: Mutex<Option<(WorkflowErrors, ValueMap)>>,
}

impl RecordingContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_file(&self, path: &str, content: &[u8]) {
        self.inner
            .write(&FileRef::text(path), content)
            .await
            .expect("seed file");
    }

    pub fn stored(&self, path: &str) -> Option<Vec<u8>> {
        self.inner.stored(path)
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl Context for RecordingContext {
    fn run_id(&self) -> &str {
        self.inner.run_id()
    }

    async fn read(&self, file: &FileRef) -> Result<Vec<u8>, UserError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read(file).await
    }

    async fn write(&self, file: &FileRef, content: &[u8]) -> Result<FileRef, UserError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write(file, content).await
    }

    async fn on_workflow_start(
        &self,
        _workflow: &Workflow,
        _input: &ValueMap,
    ) -> Result<Option<(WorkflowErrors, ValueMap)>, dagflow::EngineError> {
        self.record("workflow_start".to_string());
        Ok(self.recorded_result.lock().unwrap().take())
    }

    async fn on_node_start(
        &self,
        node: &Node,
        _input: &ValueMap,
    ) -> Result<Option<Record>, dagflow::EngineError> {
        self.record(format!("node_start:{}", node.id()));
        Ok(None)
    }

    async fn on_node_finish(
        &self,
        node: &Node,
        _input: &ValueMap,
        output: Record,
    ) -> Result<Record, dagflow::EngineError> {
        self.record(format!("node_finish:{}", node.id()));
        Ok(output)
    }

    async fn on_node_error(
        &self,
        node: &Node,
        _input: &ValueMap,
        error: dagflow::EngineError,
    ) -> Result<ErrorDisposition, dagflow::EngineError> {
        self.record(format!("node_error:{}", node.id()));
        Ok(ErrorDisposition::Propagate(error))
    }

    async fn on_workflow_finish(
        &self,
        _workflow: &Workflow,
        _input: &ValueMap,
        output: ValueMap,
    ) -> Result<ValueMap, dagflow::EngineError> {
        self.record("workflow_finish".to_string());
        Ok(output)
    }

    async fn on_workflow_error(
        &self,
        _workflow: &Workflow,
        _input: &ValueMap,
        errors: WorkflowErrors,
        partial_output: ValueMap,
    ) -> Result<(WorkflowErrors, ValueMap), dagflow::EngineError> {
        self.record("workflow_error".to_string());
        Ok((errors, partial_output))
    }
}

/// A value map from string keys and values.
pub fn input_of(entries: impl IntoIterator<Item = (&'static str, Value)>) -> ValueMap {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
