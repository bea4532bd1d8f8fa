// src/context/local.rs
//
// =============================================================================
// DAGFLOW: LOCAL FILESYSTEM CONTEXT
// =============================================================================
//
// The persistence layer for single-machine runs. One directory per run:
//
//   <base>/<run_id>/workflow.json          the executed workflow
//   <base>/<run_id>/input.json             the external input
//   <base>/<run_id>/input/<node>.json      per-node raw input
//   <base>/<run_id>/output/<node>.json     per-node output
//   <base>/<run_id>/<node>.error.json      per-node failure
//   <base>/<run_id>/output.json            the projected output
//   <base>/<run_id>/error.json             {"errors": ..., "output": ...}
//   <base>/<run_id>/files/...              file-reference bytes
//
// All run-state writes are idempotent: writing to an existing path asserts
// byte equality, so replaying a run against the same directory either
// memoizes (recorded outputs short-circuit nodes and whole workflows) or
// fails loudly on divergence.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value as Json;

use crate::context::{generate_run_id, Context, ErrorDisposition};
use crate::error::{EngineError, UserError, WorkflowErrors};
use crate::file::FileRef;
use crate::node::Node;
use crate::record::{Record, RecordType};
use crate::value::{Value, ValueMap};
use crate::workflow::Workflow;

pub struct LocalContext {
    run_id: String,
    run_dir: PathBuf,
}

impl LocalContext {
    /// Opens (creating if needed) the run directory under `base_dir`.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self, UserError> {
        Self::with_run_id(base_dir, generate_run_id())
    }

    pub fn with_run_id(
        base_dir: impl AsRef<Path>,
        run_id: impl Into<String>,
    ) -> Result<Self, UserError> {
        let run_id = run_id.into();
        let run_dir = base_dir.as_ref().join(&run_id);
        for dir in ["files", "input", "output"] {
            std::fs::create_dir_all(run_dir.join(dir)).map_err(|e| {
                UserError::new(format!("cannot create run directory {}: {e}", run_dir.display()))
            })?;
        }
        Ok(Self { run_id, run_dir })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    fn file_path(&self, file: &FileRef) -> PathBuf {
        self.run_dir.join("files").join(file.path())
    }

    fn node_input_path(&self, node_id: &str) -> PathBuf {
        self.run_dir.join("input").join(format!("{node_id}.json"))
    }

    fn node_output_path(&self, node_id: &str) -> PathBuf {
        self.run_dir.join("output").join(format!("{node_id}.json"))
    }

    fn node_error_path(&self, node_id: &str) -> PathBuf {
        self.run_dir.join(format!("{node_id}.error.json"))
    }

    /// Writes `content`, creating parent directories; an existing path must
    /// already hold exactly these bytes.
    async fn idempotent_write(&self, path: &Path, content: &[u8]) -> Result<(), UserError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| UserError::new(format!("cannot create {}: {e}", parent.display())))?;
        }
        match tokio::fs::read(path).await {
            Ok(existing) => {
                if existing != content {
                    return Err(UserError::new(format!(
                        "refusing to overwrite {} with different content",
                        path.display()
                    )));
                }
                Ok(())
            }
            Err(_) => tokio::fs::write(path, content)
                .await
                .map_err(|e| UserError::new(format!("cannot write {}: {e}", path.display()))),
        }
    }

    async fn read_json_if_present(&self, path: &Path) -> Result<Option<Json>, UserError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let json = serde_json::from_slice(&bytes).map_err(|e| {
                    UserError::new(format!("{} is not valid JSON: {e}", path.display()))
                })?;
                Ok(Some(json))
            }
            Err(_) => Ok(None),
        }
    }
}

fn value_map_to_json(values: &ValueMap) -> Json {
    Json::Object(
        values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

/// Reads a value map back, typing each key by the record contract where it is
/// declared and falling back to natural typing for the rest.
fn value_map_from_json(contract: &RecordType, json: &Json) -> Result<ValueMap, UserError> {
    let object = json
        .as_object()
        .ok_or_else(|| UserError::new(format!("expected a JSON object, got {json}")))?;
    object
        .iter()
        .map(|(key, raw)| {
            let value = match contract.field(key) {
                Some(field) => Value::from_json(&field.ty, raw)?,
                None => Value::of_json(raw),
            };
            Ok((key.clone(), value))
        })
        .collect()
}

#[async_trait]
impl Context for LocalContext {
    fn run_id(&self) -> &str {
        &self.run_id
    }

    async fn read(&self, file: &FileRef) -> Result<Vec<u8>, UserError> {
        let path = self.file_path(file);
        tokio::fs::read(&path)
            .await
            .map_err(|e| UserError::new(format!("file {} not found: {e}", file.path())))
    }

    async fn write(&self, file: &FileRef, content: &[u8]) -> Result<FileRef, UserError> {
        let path = self.file_path(file);
        self.idempotent_write(&path, content).await?;
        Ok(file.clone())
    }

    async fn on_workflow_start(
        &self,
        workflow: &Workflow,
        input: &ValueMap,
    ) -> Result<Option<(WorkflowErrors, ValueMap)>, EngineError> {
        let input_json = serde_json::to_vec(&value_map_to_json(input))
            .map_err(|e| UserError::new(format!("cannot serialize workflow input: {e}")))?;
        self.idempotent_write(&self.run_dir.join("input.json"), &input_json)
            .await?;

        let workflow_json = serde_json::to_vec(workflow)
            .map_err(|e| UserError::new(format!("cannot serialize workflow: {e}")))?;
        self.idempotent_write(&self.run_dir.join("workflow.json"), &workflow_json)
            .await?;

        // a recorded result short-circuits the whole run
        if let Some(json) = self
            .read_json_if_present(&self.run_dir.join("error.json"))
            .await?
        {
            let errors: WorkflowErrors = serde_json::from_value(
                json.get("errors").cloned().unwrap_or(Json::Null),
            )
            .map_err(|e| UserError::new(format!("recorded error.json is malformed: {e}")))?;
            let output = value_map_from_json(
                workflow.output_type(),
                json.get("output").unwrap_or(&Json::Object(Default::default())),
            )?;
            return Ok(Some((errors, output)));
        }
        if let Some(json) = self
            .read_json_if_present(&self.run_dir.join("output.json"))
            .await?
        {
            let output = value_map_from_json(workflow.output_type(), &json)?;
            return Ok(Some((WorkflowErrors::new(), output)));
        }
        Ok(None)
    }

    async fn on_node_start(
        &self,
        node: &Node,
        input: &ValueMap,
    ) -> Result<Option<Record>, EngineError> {
        let input_json = serde_json::to_vec(&value_map_to_json(input))
            .map_err(|e| UserError::new(format!("cannot serialize node input: {e}")))?;
        self.idempotent_write(&self.node_input_path(node.id()), &input_json)
            .await?;

        // a recorded output short-circuits the node
        match self
            .read_json_if_present(&self.node_output_path(node.id()))
            .await?
        {
            Some(json) => Ok(Some(node.output_type().record_from_json(&json)?)),
            None => Ok(None),
        }
    }

    async fn on_node_finish(
        &self,
        node: &Node,
        _input: &ValueMap,
        output: Record,
    ) -> Result<Record, EngineError> {
        let output_json = serde_json::to_vec(&output.to_json())
            .map_err(|e| UserError::new(format!("cannot serialize node output: {e}")))?;
        self.idempotent_write(&self.node_output_path(node.id()), &output_json)
            .await?;
        Ok(output)
    }

    async fn on_node_error(
        &self,
        node: &Node,
        _input: &ValueMap,
        error: EngineError,
    ) -> Result<ErrorDisposition, EngineError> {
        let error_json = serde_json::to_vec(&serde_json::json!({
            "error": error.user_message(),
        }))
        .map_err(|e| UserError::new(format!("cannot serialize node error: {e}")))?;
        self.idempotent_write(&self.node_error_path(node.id()), &error_json)
            .await?;
        Ok(ErrorDisposition::Propagate(error))
    }

    async fn on_workflow_finish(
        &self,
        _workflow: &Workflow,
        _input: &ValueMap,
        output: ValueMap,
    ) -> Result<ValueMap, EngineError> {
        let output_json = serde_json::to_vec(&value_map_to_json(&output))
            .map_err(|e| UserError::new(format!("cannot serialize workflow output: {e}")))?;
        self.idempotent_write(&self.run_dir.join("output.json"), &output_json)
            .await?;
        Ok(output)
    }

    async fn on_workflow_error(
        &self,
        _workflow: &Workflow,
        _input: &ValueMap,
        errors: WorkflowErrors,
        partial_output: ValueMap,
    ) -> Result<(WorkflowErrors, ValueMap), EngineError> {
        let error_json = serde_json::to_vec(&serde_json::json!({
            "errors": errors,
            "output": value_map_to_json(&partial_output),
        }))
        .map_err(|e| UserError::new(format!("cannot serialize workflow error: {e}")))?;
        self.idempotent_write(&self.run_dir.join("error.json"), &error_json)
            .await?;
        Ok((errors, partial_output))
    }
}
