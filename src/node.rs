// src/node.rs
//
// =============================================================================
// DAGFLOW: NODE CONTRACT & TYPE REGISTRY
// =============================================================================
//
// A node is an immutable `{type, id, params}` tuple whose input and output
// contracts (record types) may be derived from its params. Concrete node
// implementations live behind the `NodeImpl` trait; the serialized form is
// dispatched to them through a process-wide registry keyed by the `type`
// discriminator.
//
// The registry follows an explicit register-then-freeze discipline: builtin
// types are installed at initialization, custom types may be added until the
// first deserialization, and everything after that is read-only.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as Json;

use crate::context::Context;
use crate::error::EngineError;
use crate::record::{Record, RecordType};
use crate::workflow::Workflow;

// ============================================================================
// 1. THE NODE CONTRACT
// ============================================================================

/// What a node's `run` produced: either its output record, or a subgraph the
/// executor must splice in place of the node (dynamic expansion).
pub enum NodeOutput {
    Record(Record),
    Expand(Workflow),
}

impl From<Record> for NodeOutput {
    fn from(record: Record) -> Self {
        NodeOutput::Record(record)
    }
}

/// The single contract a concrete node implements.
#[async_trait]
pub trait NodeImpl: Send + Sync {
    /// The globally unique discriminator, e.g. `"Add"`.
    fn kind(&self) -> &'static str;

    fn id(&self) -> &str;

    /// The serialized params, exactly as they appear on the wire.
    fn params(&self) -> Json;

    /// The input contract; may depend on params.
    fn input_type(&self) -> RecordType;

    /// The output contract; may depend on params.
    fn output_type(&self) -> RecordType;

    /// Executes the node against a validated input record.
    async fn run(&self, context: &dyn Context, input: Record) -> Result<NodeOutput, EngineError>;

    /// A copy of this node under a different id (used for namespacing).
    fn clone_with_id(&self, id: String) -> Node;
}

/// A cheap, clonable handle to a concrete node.
#[derive(Clone)]
pub struct Node(Arc<dyn NodeImpl>);

impl Node {
    pub fn new(node: impl NodeImpl + 'static) -> Self {
        Self(Arc::new(node))
    }

    pub fn kind(&self) -> &'static str {
        self.0.kind()
    }

    pub fn id(&self) -> &str {
        self.0.id()
    }

    pub fn params(&self) -> Json {
        self.0.params()
    }

    pub fn input_type(&self) -> RecordType {
        self.0.input_type()
    }

    pub fn output_type(&self) -> RecordType {
        self.0.output_type()
    }

    pub async fn run(
        &self,
        context: &dyn Context,
        input: Record,
    ) -> Result<NodeOutput, EngineError> {
        self.0.run(context, input).await
    }

    /// A copy of this node with `ns/` prefixed to its id.
    pub fn with_namespace(&self, ns: &str) -> Node {
        self.0.clone_with_id(format!("{ns}/{}", self.id()))
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("type", &self.kind())
            .field("id", &self.id())
            .field("params", &self.params())
            .finish()
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind() && self.id() == other.id() && self.params() == other.params()
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Wire<'a> {
            #[serde(rename = "type")]
            kind: &'a str,
            id: &'a str,
            params: Json,
        }
        Wire {
            kind: self.kind(),
            id: self.id(),
            params: self.params(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Wire {
            #[serde(rename = "type")]
            kind: String,
            id: String,
            #[serde(default = "empty_params")]
            params: Json,
        }
        let wire = Wire::deserialize(deserializer)?;
        construct(&wire.kind, wire.id, wire.params).map_err(D::Error::custom)
    }
}

fn empty_params() -> Json {
    Json::Object(serde_json::Map::new())
}

// ============================================================================
// 2. THE TYPE REGISTRY
// ============================================================================

/// Builds a node from its wire components. The id is already extracted; the
/// constructor owns params deserialization.
pub type NodeConstructor = fn(String, Json) -> Result<Node, EngineError>;

struct NodeRegistry {
    constructors: RwLock<HashMap<String, NodeConstructor>>,
    frozen: AtomicBool,
}

impl NodeRegistry {
    fn install(&self, kind: &str, constructor: NodeConstructor) -> Result<(), EngineError> {
        if self.frozen.load(Ordering::Acquire) {
            return Err(EngineError::registry(format!(
                "cannot register node type {kind:?} after the registry has been used"
            )));
        }
        let mut constructors = self.constructors.write().expect("node registry poisoned");
        if constructors.contains_key(kind) {
            return Err(EngineError::registry(format!(
                "node type {kind:?} is already registered"
            )));
        }
        log::debug!("registering node type {kind:?}");
        constructors.insert(kind.to_string(), constructor);
        Ok(())
    }

    fn get(&self, kind: &str) -> Result<NodeConstructor, EngineError> {
        self.frozen.store(true, Ordering::Release);
        self.constructors
            .read()
            .expect("node registry poisoned")
            .get(kind)
            .copied()
            .ok_or_else(|| {
                EngineError::registry(format!("node type {kind:?} is not registered"))
            })
    }
}

static NODE_REGISTRY: Lazy<NodeRegistry> = Lazy::new(|| {
    let registry = NodeRegistry {
        constructors: RwLock::new(HashMap::new()),
        frozen: AtomicBool::new(false),
    };
    for (kind, constructor) in crate::nodes::builtin_constructors() {
        registry
            .install(kind, constructor)
            .expect("builtin node types are unique");
    }
    registry
});

/// Registers a custom node type. Must happen before the first
/// deserialization; duplicate discriminators are rejected.
pub fn register_node_type(kind: &str, constructor: NodeConstructor) -> Result<(), EngineError> {
    NODE_REGISTRY.install(kind, constructor)
}

/// Builds a node from its wire form, dispatching on the discriminator.
/// Freezes the registry.
pub fn construct(kind: &str, id: String, params: Json) -> Result<Node, EngineError> {
    let constructor = NODE_REGISTRY.get(kind)?;
    constructor(id, params)
}
