// tests/append.rs
//
// Appending to a text file writes a sibling file with the configured suffix
// and does not touch the original.

mod common;

use anyhow::Result;
use dagflow::nodes::AppendToFileNode;
use dagflow::{FileRef, InputEdge, OutputEdge, TopologicalExecutor, Value, Workflow};

use common::{init_logging, input_of, RecordingContext};

#[tokio::test]
async fn append_to_file() -> Result<()> {
    init_logging();

    let append = AppendToFileNode::from_suffix("append", "_append");
    let workflow = Workflow::new(
        vec![append.clone()],
        vec![],
        vec![
            InputEdge::from_node("file", &append, "file")?,
            InputEdge::from_node("text", &append, "text")?,
        ],
        vec![OutputEdge::from_node(&append, "file", "file")?],
    )?;

    let context = RecordingContext::new();
    context.seed_file("test.txt", b"Hello, world!").await;

    let (errors, output) = TopologicalExecutor::new()
        .execute(
            &context,
            &workflow,
            input_of([
                ("file", Value::file(FileRef::text("test.txt"))),
                (
                    "text",
                    Value::string("This text will be appended to the file."),
                ),
            ]),
        )
        .await?;

    assert!(!errors.any());
    let file = output["file"].as_file().expect("output is a file");
    assert_eq!(file.path(), "test_append.txt");
    assert_eq!(
        context.stored("test_append.txt"),
        Some(b"Hello, world!This text will be appended to the file.".to_vec()),
    );
    // the original is untouched
    assert_eq!(context.stored("test.txt"), Some(b"Hello, world!".to_vec()));
    Ok(())
}
