// tests/schema.rs
//
// The JSON-Schema subset: variant reflection, record contracts, named refs,
// and range validation.

mod common;

use anyhow::Result;
use dagflow::{FileKind, RecordType, Schema, ValueType};

use common::init_logging;

fn parse(json: serde_json::Value) -> Result<Schema> {
    Ok(Schema::from_json(&json)?)
}

#[test]
fn scalar_schemas_reflect_scalar_variants() -> Result<()> {
    init_logging();
    assert_eq!(
        parse(serde_json::json!({"type": "integer"}))?.value_type()?,
        ValueType::Integer
    );
    assert_eq!(
        parse(serde_json::json!({"type": "number"}))?.value_type()?,
        ValueType::Float
    );
    assert_eq!(
        parse(serde_json::json!({"type": "boolean"}))?.value_type()?,
        ValueType::Boolean
    );
    assert_eq!(
        parse(serde_json::json!({"type": "null"}))?.value_type()?,
        ValueType::Null
    );
    assert_eq!(
        parse(serde_json::json!({"type": "string"}))?.value_type()?,
        ValueType::String
    );
    assert_eq!(parse(serde_json::json!({}))?.value_type()?, ValueType::Any);
    Ok(())
}

#[test]
fn constraints_are_carried_and_range_checked() -> Result<()> {
    init_logging();
    let schema = parse(serde_json::json!({
        "type": "integer", "minimum": 0, "maximum": 100
    }))?;
    assert_eq!(
        schema,
        Schema::Integer {
            minimum: Some(0),
            maximum: Some(100),
            multiple_of: None,
        }
    );

    assert!(Schema::from_json(&serde_json::json!({
        "type": "integer", "minimum": 100, "maximum": 0
    }))
    .is_err());
    assert!(Schema::from_json(&serde_json::json!({
        "type": "string", "minLength": 10, "maxLength": 1
    }))
    .is_err());
    Ok(())
}

#[test]
fn array_and_map_schemas_nest() -> Result<()> {
    init_logging();
    let schema = parse(serde_json::json!({
        "type": "array",
        "items": {"type": "object", "additionalProperties": {"type": "integer"}},
    }))?;
    assert_eq!(
        schema.value_type()?,
        ValueType::sequence_of(ValueType::string_map_of(ValueType::Integer))
    );
    Ok(())
}

#[test]
fn record_schemas_roundtrip() -> Result<()> {
    init_logging();
    let record = RecordType::new(
        "Person",
        [
            ("name".to_string(), ValueType::String, true),
            ("age".to_string(), ValueType::Integer, false),
        ],
    );
    let schema = Schema::of(&ValueType::Data(record));
    assert_eq!(
        schema.to_json(),
        serde_json::json!({
            "type": "object",
            "properties": {
                "age": {"type": "integer"},
                "name": {"type": "string"},
            },
            "required": ["name"],
            "additionalProperties": false,
        })
    );

    // structural roundtrip: field names, types and requiredness survive
    let rebuilt = Schema::from_json(&schema.to_json())?.record_type()?;
    assert!(rebuilt.field("name").expect("name kept").required);
    assert!(!rebuilt.field("age").expect("age kept").required);
    assert_eq!(rebuilt.field("name").unwrap().ty, ValueType::String);
    assert_eq!(rebuilt.field("age").unwrap().ty, ValueType::Integer);
    Ok(())
}

#[test]
fn file_kinds_reflect_as_named_refs() -> Result<()> {
    init_logging();
    let schema = Schema::of(&ValueType::File(FileKind::Json));
    assert_eq!(
        schema.to_json(),
        serde_json::json!({"$ref": "#/$defs/JSONFile"})
    );
    assert_eq!(schema.value_type()?, ValueType::File(FileKind::Json));

    // bare names resolve as well
    let bare = parse(serde_json::json!({"$ref": "TextFile"}))?;
    assert_eq!(bare.value_type()?, ValueType::File(FileKind::Text));
    Ok(())
}

#[test]
fn unknown_refs_fail_on_resolution() -> Result<()> {
    init_logging();
    let schema = parse(serde_json::json!({"$ref": "#/$defs/NoSuchType"}))?;
    assert!(schema.value_type().is_err());
    Ok(())
}

#[test]
fn schema_serde_roundtrip() -> Result<()> {
    init_logging();
    let ty = ValueType::sequence_of(ValueType::Data(RecordType::new(
        "Row",
        [
            ("id".to_string(), ValueType::Integer, true),
            ("tags".to_string(), ValueType::sequence_of(ValueType::String), false),
        ],
    )));
    let schema = Schema::of(&ty);
    let json = serde_json::to_string(&schema)?;
    let back: Schema = serde_json::from_str(&json)?;
    assert_eq!(back, schema);
    Ok(())
}

#[test]
fn malformed_schemas_are_rejected() {
    init_logging();
    assert!(Schema::from_json(&serde_json::json!({"type": "array"})).is_err());
    assert!(Schema::from_json(&serde_json::json!({"type": "object"})).is_err());
    assert!(Schema::from_json(&serde_json::json!({"type": "wibble"})).is_err());
    assert!(Schema::from_json(&serde_json::json!({"unexpected": true})).is_err());
}
