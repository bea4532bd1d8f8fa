// src/nodes/constant.rs
//
// Nodes whose params *are* their output: the simplest way to feed literal
// values into a graph.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::context::Context;
use crate::error::EngineError;
use crate::node::{Node, NodeImpl, NodeOutput};
use crate::record::{Record, RecordType};
use crate::value::{Value, ValueType};

use super::{dump_params, parse_params};

macro_rules! constant_node {
    ($node:ident, $params:ident, $kind:literal, $rust_ty:ty, $value_ty:expr, $build:expr) => {
        #[derive(Clone, Debug, Serialize, Deserialize)]
        #[serde(deny_unknown_fields)]
        pub struct $params {
            pub value: $rust_ty,
        }

        #[derive(Clone, Debug)]
        pub struct $node {
            id: String,
            params: $params,
        }

        impl $node {
            pub const KIND: &'static str = $kind;

            pub fn from_value(id: impl Into<String>, value: $rust_ty) -> Node {
                Node::new(Self {
                    id: id.into(),
                    params: $params { value },
                })
            }

            pub(crate) fn deserialize(id: String, params: Json) -> Result<Node, EngineError> {
                Ok(Node::new(Self {
                    id,
                    params: parse_params(Self::KIND, params)?,
                }))
            }
        }

        #[async_trait]
        impl NodeImpl for $node {
            fn kind(&self) -> &'static str {
                Self::KIND
            }

            fn id(&self) -> &str {
                &self.id
            }

            fn params(&self) -> Json {
                dump_params(&self.params)
            }

            fn input_type(&self) -> RecordType {
                RecordType::empty("Empty")
            }

            fn output_type(&self) -> RecordType {
                RecordType::new(
                    concat!($kind, "Output"),
                    [("value".to_string(), $value_ty, true)],
                )
            }

            async fn run(
                &self,
                _context: &dyn Context,
                _input: Record,
            ) -> Result<NodeOutput, EngineError> {
                let build: fn(&$params) -> Value = $build;
                let output = self.output_type().validate(BTreeMap::from([(
                    "value".to_string(),
                    build(&self.params),
                )]))?;
                Ok(output.into())
            }

            fn clone_with_id(&self, id: String) -> Node {
                Node::new(Self {
                    id,
                    params: self.params.clone(),
                })
            }
        }
    };
}

constant_node!(
    ConstantStringNode,
    ConstantStringParams,
    "ConstantString",
    String,
    ValueType::String,
    |params| Value::string(params.value.clone())
);

constant_node!(
    ConstantIntegerNode,
    ConstantIntegerParams,
    "ConstantInteger",
    i64,
    ValueType::Integer,
    |params| Value::integer(params.value)
);

constant_node!(
    ConstantBooleanNode,
    ConstantBooleanParams,
    "ConstantBoolean",
    bool,
    ValueType::Boolean,
    |params| Value::boolean(params.value)
);
