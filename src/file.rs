// src/file.rs
//
// =============================================================================
// DAGFLOW: FILE REFERENCE VALUES
// =============================================================================
//
// A file value is a reference, not content: `{path, metadata, kind}`. The
// bytes live wherever the run's context puts them, and every read or write
// goes through that context.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::context::Context;
use crate::error::UserError;

// ============================================================================
// 1. FILE KINDS
// ============================================================================

/// The kind of a file reference, which fixes its mime type and preferred
/// extension.
///
/// Kinds form a small ancestry used for caster inheritance: `Json` and
/// `JsonLines` are text kinds, `Text` and `Pdf` are blob kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileKind {
    Blob,
    Text,
    Json,
    JsonLines,
    Pdf,
}

impl FileKind {
    pub fn mime_type(self) -> &'static str {
        match self {
            FileKind::Blob => "application/octet-stream",
            FileKind::Text => "text/plain",
            FileKind::Json => "application/json",
            FileKind::JsonLines => "application/jsonl",
            FileKind::Pdf => "application/pdf",
        }
    }

    pub fn extension(self) -> Option<&'static str> {
        match self {
            FileKind::Blob => None,
            FileKind::Text => Some("txt"),
            FileKind::Json => Some("json"),
            FileKind::JsonLines => Some("jsonl"),
            FileKind::Pdf => Some("pdf"),
        }
    }

    pub fn parent(self) -> Option<FileKind> {
        match self {
            FileKind::Blob => None,
            FileKind::Text => Some(FileKind::Blob),
            FileKind::Json => Some(FileKind::Text),
            FileKind::JsonLines => Some(FileKind::Text),
            FileKind::Pdf => Some(FileKind::Blob),
        }
    }

    pub fn is_kind_of(self, other: FileKind) -> bool {
        let mut kind = self;
        loop {
            if kind == other {
                return true;
            }
            match kind.parent() {
                Some(parent) => kind = parent,
                None => return false,
            }
        }
    }

    /// The value-type name this kind reflects as in schemas.
    pub fn type_name(self) -> &'static str {
        match self {
            FileKind::Blob => "BlobFile",
            FileKind::Text => "TextFile",
            FileKind::Json => "JSONFile",
            FileKind::JsonLines => "JSONLinesFile",
            FileKind::Pdf => "PDFFile",
        }
    }

    /// Appends the kind's extension when the path does not already carry it.
    pub fn normalize_path(self, path: &str) -> String {
        match self.extension() {
            Some(ext) if !path.ends_with(&format!(".{ext}")) => format!("{path}.{ext}"),
            _ => path.to_string(),
        }
    }
}

// ============================================================================
// 2. FILE REFERENCES
// ============================================================================

/// An immutable reference to an externally stored file.
#[derive(Clone, Debug, PartialEq)]
pub struct FileRef {
    kind: FileKind,
    path: String,
    metadata: BTreeMap<String, Json>,
}

impl FileRef {
    pub fn new(kind: FileKind, path: impl AsRef<str>) -> Self {
        Self {
            kind,
            path: kind.normalize_path(path.as_ref()),
            metadata: BTreeMap::new(),
        }
    }

    pub fn text(path: impl AsRef<str>) -> Self {
        Self::new(FileKind::Text, path)
    }

    pub fn json(path: impl AsRef<str>) -> Self {
        Self::new(FileKind::Json, path)
    }

    pub fn json_lines(path: impl AsRef<str>) -> Self {
        Self::new(FileKind::JsonLines, path)
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn mime_type(&self) -> &'static str {
        self.kind.mime_type()
    }

    pub fn metadata(&self) -> &BTreeMap<String, Json> {
        &self.metadata
    }

    pub fn metadata_value(&self, key: &str) -> Option<&Json> {
        self.metadata.get(key)
    }

    /// Returns a copy with the metadata key stamped.
    ///
    /// Stamping is idempotent: re-stamping an existing key with the same
    /// value is a no-op, a different value is an error.
    pub fn write_metadata(&self, key: &str, value: Json) -> Result<FileRef, UserError> {
        if let Some(existing) = self.metadata.get(key) {
            if existing != &value {
                return Err(UserError::new(format!(
                    "file {} metadata {key:?} is already {existing}, refusing to restamp as {value}",
                    self.path
                )));
            }
            return Ok(self.clone());
        }
        let mut copy = self.clone();
        copy.metadata.insert(key.to_string(), value);
        Ok(copy)
    }

    /// Derives a sibling path with `suffix` inserted before the extension:
    /// `report.txt` + `_v2` becomes `report_v2.txt`.
    pub fn with_suffix(&self, suffix: &str) -> FileRef {
        let path = match self.path.rsplit_once('.') {
            Some((stem, ext)) => format!("{stem}{suffix}.{ext}"),
            None => format!("{}{suffix}", self.path),
        };
        FileRef::new(self.kind, path)
    }

    // ------------------------------------------------------------------------
    // JSON wire form
    // ------------------------------------------------------------------------

    pub fn to_json(&self) -> Json {
        serde_json::json!({
            "path": self.path,
            "metadata": Json::Object(self.metadata.clone().into_iter().collect()),
        })
    }

    pub fn from_json(kind: FileKind, json: &Json) -> Result<FileRef, UserError> {
        let object = json
            .as_object()
            .ok_or_else(|| UserError::new(format!("file reference expects an object, got {json}")))?;
        let path = object
            .get("path")
            .and_then(Json::as_str)
            .ok_or_else(|| UserError::new("file reference is missing a string \"path\""))?;
        let metadata = match object.get("metadata") {
            None | Some(Json::Null) => BTreeMap::new(),
            Some(Json::Object(entries)) => entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            Some(other) => {
                return Err(UserError::new(format!(
                    "file reference metadata must be an object, got {other}"
                )))
            }
        };
        Ok(FileRef {
            kind,
            path: kind.normalize_path(path),
            metadata,
        })
    }

    // ------------------------------------------------------------------------
    // Content access (through the context)
    // ------------------------------------------------------------------------

    pub async fn read(&self, context: &dyn Context) -> Result<Vec<u8>, UserError> {
        context.read(self).await
    }

    /// Writes the content through the context; the context may hand back an
    /// updated reference (e.g. with storage metadata stamped).
    pub async fn write(&self, context: &dyn Context, content: &[u8]) -> Result<FileRef, UserError> {
        context.write(self, content).await
    }

    pub async fn read_text(&self, context: &dyn Context) -> Result<String, UserError> {
        self.require_kind(FileKind::Text)?;
        let bytes = self.read(context).await?;
        String::from_utf8(bytes)
            .map_err(|e| UserError::new(format!("file {} is not valid UTF-8: {e}", self.path)))
    }

    pub async fn write_text(
        &self,
        context: &dyn Context,
        text: &str,
    ) -> Result<FileRef, UserError> {
        self.require_kind(FileKind::Text)?;
        self.write(context, text.as_bytes()).await
    }

    /// Reads a JSON file into its document.
    pub async fn read_data(&self, context: &dyn Context) -> Result<Json, UserError> {
        self.require_kind(FileKind::Json)?;
        let text = self.read_text(context).await?;
        serde_json::from_str(&text)
            .map_err(|e| UserError::new(format!("file {} is not valid JSON: {e}", self.path)))
    }

    pub async fn write_data(
        &self,
        context: &dyn Context,
        data: &Json,
    ) -> Result<FileRef, UserError> {
        self.require_kind(FileKind::Json)?;
        let text = serde_json::to_string(data)
            .map_err(|e| UserError::new(format!("cannot serialize data for {}: {e}", self.path)))?;
        self.write_text(context, &text).await
    }

    /// Reads a JSON-lines file: one document per line.
    pub async fn read_lines(&self, context: &dyn Context) -> Result<Vec<Json>, UserError> {
        self.require_kind(FileKind::JsonLines)?;
        let text = self.read_text(context).await?;
        text.lines()
            .map(|line| {
                serde_json::from_str(line).map_err(|e| {
                    UserError::new(format!("file {} has an invalid JSON line: {e}", self.path))
                })
            })
            .collect()
    }

    /// Writes a JSON-lines file: one document per line, no trailing newline.
    pub async fn write_lines(
        &self,
        context: &dyn Context,
        data: &[Json],
    ) -> Result<FileRef, UserError> {
        self.require_kind(FileKind::JsonLines)?;
        let lines = data
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| UserError::new(format!("cannot serialize lines for {}: {e}", self.path)))?;
        self.write_text(context, &lines.join("\n")).await
    }

    fn require_kind(&self, expected: FileKind) -> Result<(), UserError> {
        if self.kind.is_kind_of(expected) {
            Ok(())
        } else {
            Err(UserError::new(format!(
                "file {} has kind {}, expected a {} file",
                self.path,
                self.kind.type_name(),
                expected.type_name()
            )))
        }
    }
}

impl Hash for FileRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // metadata values are raw JSON and not hashable; path + kind is a
        // consistent (if coarser) hash for the equality above
        self.kind.hash(state);
        self.path.hash(state);
    }
}
