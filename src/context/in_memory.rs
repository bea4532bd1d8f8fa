// src/context/in_memory.rs
//
// Pretends to be a file system, but stores file bytes in a map. The default
// context for tests and for runs that never need persistence.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::context::{generate_run_id, Context};
use crate::error::UserError;
use crate::file::FileRef;

pub struct InMemoryContext {
    run_id: String,
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryContext {
    pub fn new() -> Self {
        Self::with_run_id(generate_run_id())
    }

    pub fn with_run_id(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            data: Mutex::new(HashMap::new()),
        }
    }

    /// A snapshot of the stored bytes at `path`, if any.
    pub fn stored(&self, path: &str) -> Option<Vec<u8>> {
        self.data.lock().expect("file store poisoned").get(path).cloned()
    }
}

impl Default for InMemoryContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Context for InMemoryContext {
    fn run_id(&self) -> &str {
        &self.run_id
    }

    async fn read(&self, file: &FileRef) -> Result<Vec<u8>, UserError> {
        self.stored(file.path())
            .ok_or_else(|| UserError::new(format!("file {} not found", file.path())))
    }

    async fn write(&self, file: &FileRef, content: &[u8]) -> Result<FileRef, UserError> {
        // last writer wins; concurrent-writer policy is a context choice
        self.data
            .lock()
            .expect("file store poisoned")
            .insert(file.path().to_string(), content.to_vec());
        Ok(file.clone())
    }
}
