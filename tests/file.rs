// tests/file.rs
//
// File references: kinds, path normalization, metadata stamping, typed
// content access, and the local-filesystem context's run persistence.

mod common;

use anyhow::Result;
use chrono::{TimeZone, Utc};
use dagflow::nodes::{AddNode, ConstantIntegerNode};
use dagflow::{
    Edge, FileKind, FileRef, InMemoryContext, LocalContext, OutputEdge, TopologicalExecutor,
    Value, Workflow,
};

use common::{init_logging, input_of};

#[test]
fn kinds_fix_mime_types_and_extensions() {
    init_logging();
    assert_eq!(FileKind::Text.mime_type(), "text/plain");
    assert_eq!(FileKind::Json.mime_type(), "application/json");
    assert_eq!(FileKind::JsonLines.mime_type(), "application/jsonl");
    assert_eq!(FileKind::Pdf.mime_type(), "application/pdf");

    assert_eq!(FileRef::text("notes").path(), "notes.txt");
    assert_eq!(FileRef::text("notes.txt").path(), "notes.txt");
    assert_eq!(FileRef::json("data").path(), "data.json");
    assert_eq!(FileRef::json_lines("rows").path(), "rows.jsonl");
    assert_eq!(FileRef::new(FileKind::Blob, "raw.bin").path(), "raw.bin");
}

#[test]
fn kind_ancestry() {
    init_logging();
    assert!(FileKind::Json.is_kind_of(FileKind::Text));
    assert!(FileKind::Json.is_kind_of(FileKind::Blob));
    assert!(FileKind::JsonLines.is_kind_of(FileKind::Text));
    assert!(FileKind::Pdf.is_kind_of(FileKind::Blob));
    assert!(!FileKind::Pdf.is_kind_of(FileKind::Text));
    assert!(!FileKind::Text.is_kind_of(FileKind::Json));
}

#[test]
fn metadata_stamping_is_idempotent() -> Result<()> {
    init_logging();
    let file = FileRef::text("doc");
    let stamped = file.write_metadata("file_id", serde_json::json!("abc-123"))?;
    assert_eq!(
        stamped.metadata_value("file_id"),
        Some(&serde_json::json!("abc-123"))
    );

    // same value: fine; different value: rejected
    let again = stamped.write_metadata("file_id", serde_json::json!("abc-123"))?;
    assert_eq!(again, stamped);
    assert!(stamped
        .write_metadata("file_id", serde_json::json!("other"))
        .is_err());

    // the original is untouched
    assert!(file.metadata_value("file_id").is_none());
    Ok(())
}

#[tokio::test]
async fn json_files_roundtrip_documents() -> Result<()> {
    init_logging();
    let context = InMemoryContext::new();
    let file = FileRef::json("payload");

    let document = serde_json::json!({"x": [1, 2, 3], "y": {"nested": true}});
    let file = file.write_data(&context, &document).await?;
    assert_eq!(file.read_data(&context).await?, document);
    Ok(())
}

#[tokio::test]
async fn dates_serialize_as_iso_8601() -> Result<()> {
    init_logging();
    let context = InMemoryContext::new();
    let file = FileRef::json("stamped");

    let moment = Utc.with_ymd_and_hms(2024, 5, 17, 8, 30, 0).unwrap();
    let document = serde_json::to_value(serde_json::json!({"created_at": moment}))?;
    let file = file.write_data(&context, &document).await?;

    let text = file.read_text(&context).await?;
    assert!(
        text.contains("2024-05-17T08:30:00Z"),
        "expected an ISO-8601 timestamp in {text}"
    );
    Ok(())
}

#[tokio::test]
async fn json_lines_have_no_trailing_newline() -> Result<()> {
    init_logging();
    let context = InMemoryContext::new();
    let file = FileRef::json_lines("rows");

    let file = file
        .write_lines(
            &context,
            &[serde_json::json!(1), serde_json::json!(2)],
        )
        .await?;
    assert_eq!(file.read_text(&context).await?, "1\n2");
    assert_eq!(
        file.read_lines(&context).await?,
        vec![serde_json::json!(1), serde_json::json!(2)]
    );
    Ok(())
}

#[tokio::test]
async fn wrong_kind_accessors_are_rejected() {
    init_logging();
    let context = InMemoryContext::new();
    let pdf = FileRef::new(FileKind::Pdf, "doc");
    assert!(pdf.read_text(&context).await.is_err());
    assert!(pdf.read_data(&context).await.is_err());
}

fn scratch_dir(tag: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("dagflow-test-{tag}-{}", std::process::id()))
}

fn addition_workflow() -> Result<Workflow> {
    let a = ConstantIntegerNode::from_value("a", 40);
    let b = ConstantIntegerNode::from_value("b", 2);
    let add = AddNode::new("add");
    Ok(Workflow::new(
        vec![a.clone(), b.clone(), add.clone()],
        vec![
            Edge::from_nodes(&a, "value", &add, "a")?,
            Edge::from_nodes(&b, "value", &add, "b")?,
        ],
        vec![],
        vec![OutputEdge::from_node(&add, "sum", "sum")?],
    )?)
}

#[tokio::test]
async fn local_context_persists_the_run_layout() -> Result<()> {
    init_logging();
    let base = scratch_dir("layout");
    let context = LocalContext::with_run_id(&base, "run-1")?;
    let workflow = addition_workflow()?;

    let (errors, output) = TopologicalExecutor::new()
        .execute(&context, &workflow, input_of([]))
        .await?;
    assert!(!errors.any());
    assert_eq!(output["sum"], Value::integer(42));

    let run = context.run_dir();
    assert!(run.join("workflow.json").exists());
    assert!(run.join("input.json").exists());
    assert!(run.join("input/add.json").exists());
    assert!(run.join("output/add.json").exists());
    assert!(run.join("output.json").exists());
    assert!(!run.join("error.json").exists());

    let recorded: serde_json::Value =
        serde_json::from_slice(&std::fs::read(run.join("output/add.json"))?)?;
    assert_eq!(recorded, serde_json::json!({"sum": 42}));

    std::fs::remove_dir_all(&base).ok();
    Ok(())
}

#[tokio::test]
async fn local_context_memoizes_a_replayed_run() -> Result<()> {
    init_logging();
    let base = scratch_dir("replay");
    let workflow = addition_workflow()?;

    {
        let context = LocalContext::with_run_id(&base, "run-2")?;
        TopologicalExecutor::new()
            .execute(&context, &workflow, input_of([]))
            .await?;
    }

    // same run id: the recorded output short-circuits the whole run
    let context = LocalContext::with_run_id(&base, "run-2")?;
    let (errors, output) = TopologicalExecutor::new()
        .execute(&context, &workflow, input_of([]))
        .await?;
    assert!(!errors.any());
    assert_eq!(output["sum"], Value::integer(42));

    std::fs::remove_dir_all(&base).ok();
    Ok(())
}
