// tests/casting.rs
//
// The coercion network: identity, widening/narrowing, string parsing,
// stringify, file casts, memoization, and the JSON-lines fan-out.

mod common;

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;

use anyhow::Result;
use dagflow::{FileKind, FileRef, InMemoryContext, Value, ValueType};

use common::{init_logging, RecordingContext};

#[tokio::test]
async fn cast_identity_for_subtypes() -> Result<()> {
    init_logging();
    let context = InMemoryContext::new();

    let value = Value::integer(7);
    let casted = value.cast_to(&ValueType::Any, &context).await?;
    assert_eq!(casted, value);

    let casted = value.cast_to(&ValueType::Integer, &context).await?;
    assert_eq!(casted, value);
    Ok(())
}

#[tokio::test]
async fn integer_widens_and_float_narrows_guarded() -> Result<()> {
    init_logging();
    let context = InMemoryContext::new();

    let widened = Value::integer(3).cast_to(&ValueType::Float, &context).await?;
    assert_eq!(widened, Value::float(3.0));

    let narrowed = Value::float(4.0)
        .cast_to(&ValueType::Integer, &context)
        .await?;
    assert_eq!(narrowed, Value::integer(4));

    let lossy = Value::float(4.5).cast_to(&ValueType::Integer, &context).await;
    assert!(lossy.is_err());
    Ok(())
}

#[tokio::test]
async fn strings_parse_into_scalars() -> Result<()> {
    init_logging();
    let context = InMemoryContext::new();

    assert_eq!(
        Value::string("true")
            .cast_to(&ValueType::Boolean, &context)
            .await?,
        Value::boolean(true)
    );
    assert_eq!(
        Value::string("42")
            .cast_to(&ValueType::Integer, &context)
            .await?,
        Value::integer(42)
    );
    assert_eq!(
        Value::string("2.5")
            .cast_to(&ValueType::Float, &context)
            .await?,
        Value::float(2.5)
    );
    assert!(Value::string("not a number")
        .cast_to(&ValueType::Integer, &context)
        .await
        .is_err());
    Ok(())
}

#[tokio::test]
async fn anything_stringifies_to_json() -> Result<()> {
    init_logging();
    let context = InMemoryContext::new();

    assert_eq!(
        Value::integer(5).cast_to(&ValueType::String, &context).await?,
        Value::string("5")
    );
    let sequence = Value::sequence(
        ValueType::Integer,
        vec![Value::integer(1), Value::integer(2)],
    )?;
    assert_eq!(
        sequence.cast_to(&ValueType::String, &context).await?,
        Value::string("[1,2]")
    );
    // a string is already a string: identity, not a quoted re-encoding
    assert_eq!(
        Value::string("plain")
            .cast_to(&ValueType::String, &context)
            .await?,
        Value::string("plain")
    );
    Ok(())
}

#[tokio::test]
async fn sequence_items_cast_elementwise() -> Result<()> {
    init_logging();
    let context = InMemoryContext::new();

    let integers = Value::sequence(
        ValueType::Integer,
        vec![Value::integer(1), Value::integer(2), Value::integer(3)],
    )?;
    let floats = integers
        .cast_to(&ValueType::sequence_of(ValueType::Float), &context)
        .await?;
    assert_eq!(
        floats,
        Value::sequence(
            ValueType::Float,
            vec![Value::float(1.0), Value::float(2.0), Value::float(3.0)],
        )?
    );
    Ok(())
}

#[test]
fn sequence_of_any_does_not_cast_to_sequence_of_integer() {
    init_logging();
    let source = ValueType::sequence_of(ValueType::Any);
    let target = ValueType::sequence_of(ValueType::Integer);
    assert!(!source.can_cast_to(&target));
    // the covariant direction is fine
    assert!(ValueType::sequence_of(ValueType::Integer)
        .can_cast_to(&ValueType::sequence_of(ValueType::Any)));
}

#[tokio::test]
async fn cast_idempotence_for_pure_casts() -> Result<()> {
    init_logging();
    let context = InMemoryContext::new();

    let float = Value::integer(9).cast_to(&ValueType::Float, &context).await?;
    let again = float.cast_to(&ValueType::Float, &context).await?;
    assert_eq!(float, again);
    Ok(())
}

#[tokio::test]
async fn cast_memoization_performs_no_new_io() -> Result<()> {
    init_logging();
    let context = RecordingContext::new();
    context.seed_file("notes.txt", b"memoize me").await;

    let file = Value::file(FileRef::text("notes.txt"));
    let first = file.cast_to(&ValueType::String, &context).await?;
    assert_eq!(first, Value::string("memoize me"));
    assert_eq!(context.reads.load(Ordering::SeqCst), 1);

    let second = file.cast_to(&ValueType::String, &context).await?;
    assert_eq!(second, first);
    assert_eq!(context.reads.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn memoization_is_keyed_by_the_full_recursive_type() -> Result<()> {
    init_logging();
    let context = InMemoryContext::new();

    let integers = Value::sequence(
        ValueType::Integer,
        vec![Value::integer(1), Value::integer(2)],
    )?;
    let floats = integers
        .cast_to(&ValueType::sequence_of(ValueType::Float), &context)
        .await?;
    let identity = integers
        .cast_to(&ValueType::sequence_of(ValueType::Integer), &context)
        .await?;
    assert_ne!(floats, identity);
    Ok(())
}

#[tokio::test]
async fn json_lines_cast_to_typed_sequences_and_file_fanout() -> Result<()> {
    init_logging();
    let context = InMemoryContext::new();

    let jsonl = FileRef::json_lines("input");
    assert_eq!(jsonl.path(), "input.jsonl");
    jsonl
        .write_lines(
            &context,
            &[
                serde_json::json!({"a": 1}),
                serde_json::json!({"b": 2}),
                serde_json::json!({"c": 3}),
            ],
        )
        .await?;
    assert_eq!(
        jsonl.read_text(&context).await?,
        "{\"a\":1}\n{\"b\":2}\n{\"c\":3}"
    );

    let value = Value::file(jsonl);

    // typed parse: Sequence<StringMap<Integer>>
    let target = ValueType::sequence_of(ValueType::string_map_of(ValueType::Integer));
    let parsed = value.cast_to(&target, &context).await?;
    let expected = Value::sequence(
        ValueType::string_map_of(ValueType::Integer),
        vec![
            Value::string_map(
                ValueType::Integer,
                BTreeMap::from([("a".to_string(), Value::integer(1))]),
            )?,
            Value::string_map(
                ValueType::Integer,
                BTreeMap::from([("b".to_string(), Value::integer(2))]),
            )?,
            Value::string_map(
                ValueType::Integer,
                BTreeMap::from([("c".to_string(), Value::integer(3))]),
            )?,
        ],
    )?;
    assert_eq!(parsed, expected);

    // file fan-out: Sequence<JSONFile>, one content-addressed file per line
    let fanout = value
        .cast_to(
            &ValueType::sequence_of(ValueType::File(FileKind::Json)),
            &context,
        )
        .await?;
    let files = fanout.as_sequence().expect("a sequence of files");
    assert_eq!(files.len(), 3);

    let mut paths = Vec::new();
    for (file, expected) in files.iter().zip([
        serde_json::json!({"a": 1}),
        serde_json::json!({"b": 2}),
        serde_json::json!({"c": 3}),
    ]) {
        let file = file.as_file().expect("a file reference");
        assert!(file.path().ends_with(".json"));
        paths.push(file.path().to_string());
        assert_eq!(file.read_data(&context).await?, expected);
    }
    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), 3, "file references are distinct");
    Ok(())
}

#[tokio::test]
async fn any_value_serializes_into_a_json_file() -> Result<()> {
    init_logging();
    let context = InMemoryContext::new();

    let value = Value::string_map(
        ValueType::Integer,
        BTreeMap::from([("answer".to_string(), Value::integer(42))]),
    )?;
    let file = value
        .cast_to(&ValueType::File(FileKind::Json), &context)
        .await?;
    let file = file.as_file().expect("a file reference");

    // content-addressed path: the md5 of the serialized payload
    let payload = serde_json::to_string(&serde_json::json!({"answer": 42}))?;
    assert_eq!(
        file.path(),
        format!("{:x}.json", md5::compute(payload.as_bytes()))
    );
    assert_eq!(file.read_data(&context).await?, serde_json::json!({"answer": 42}));
    Ok(())
}
