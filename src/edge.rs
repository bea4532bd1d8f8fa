// src/edge.rs
//
// =============================================================================
// DAGFLOW: TYPED EDGES
// =============================================================================
//
// Three edge variants connect the graph to itself and to the outside world:
//
//   Edge        source node output  ->  target node input
//   InputEdge   workflow input      ->  target node input
//   OutputEdge  source node output  ->  workflow output
//
// The compatibility rule is the same everywhere: the source-side variant must
// be castable to the target-side variant, and a required target needs a
// required source. Edges are checked at construction (`from_nodes`) and again
// when a workflow is assembled.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::node::Node;
use crate::record::RecordType;

/// An internal dataflow edge between two nodes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source_id: String,
    pub source_key: String,
    pub target_id: String,
    pub target_key: String,
}

impl Edge {
    pub fn new(
        source_id: impl Into<String>,
        source_key: impl Into<String>,
        target_id: impl Into<String>,
        target_key: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            source_key: source_key.into(),
            target_id: target_id.into(),
            target_key: target_key.into(),
        }
    }

    /// Self-validating factory: builds the edge and type-checks it against
    /// the two nodes.
    pub fn from_nodes(
        source: &Node,
        source_key: impl Into<String>,
        target: &Node,
        target_key: impl Into<String>,
    ) -> Result<Self, EngineError> {
        let edge = Self::new(source.id(), source_key, target.id(), target_key);
        edge.validate_types(source, target)?;
        Ok(edge)
    }

    pub fn validate_types(&self, source: &Node, target: &Node) -> Result<(), EngineError> {
        let source_type = source.output_type();
        let source_field = source_type.field(&self.source_key).ok_or_else(|| {
            EngineError::validation(format!(
                "source node {} does not have a {:?} output field",
                source.id(),
                self.source_key
            ))
        })?;
        let target_type = target.input_type();
        let target_field = target_type.field(&self.target_key).ok_or_else(|| {
            EngineError::validation(format!(
                "target node {} does not have a {:?} input field",
                target.id(),
                self.target_key
            ))
        })?;

        if target_field.required && !source_field.required {
            return Err(EngineError::validation(format!(
                "edge from {}.{} to {}.{} connects an optional output to a required input",
                self.source_id, self.source_key, self.target_id, self.target_key
            )));
        }
        if !source_field.ty.can_cast_to(&target_field.ty) {
            return Err(EngineError::validation(format!(
                "edge from {}.{} to {}.{} has invalid types: {} is not assignable to {}",
                self.source_id,
                self.source_key,
                self.target_id,
                self.target_key,
                source_field.ty,
                target_field.ty
            )));
        }
        Ok(())
    }
}

/// An "edge" that maps a field of the workflow's input to a node input.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputEdge {
    pub input_key: String,
    pub target_id: String,
    pub target_key: String,
}

impl InputEdge {
    pub fn new(
        input_key: impl Into<String>,
        target_id: impl Into<String>,
        target_key: impl Into<String>,
    ) -> Self {
        Self {
            input_key: input_key.into(),
            target_id: target_id.into(),
            target_key: target_key.into(),
        }
    }

    /// Builds the edge and checks that the target field exists. The input
    /// side has no declared type of its own (the workflow input contract is
    /// derived from these edges), so there is nothing more to check here.
    pub fn from_node(
        input_key: impl Into<String>,
        target: &Node,
        target_key: impl Into<String>,
    ) -> Result<Self, EngineError> {
        let edge = Self::new(input_key, target.id(), target_key);
        edge.validate_target(target)?;
        Ok(edge)
    }

    pub fn validate_target(&self, target: &Node) -> Result<(), EngineError> {
        if !target.input_type().has_field(&self.target_key) {
            return Err(EngineError::validation(format!(
                "target node {} does not have a {:?} input field",
                target.id(),
                self.target_key
            )));
        }
        Ok(())
    }

    /// Full type check against a declared workflow input contract, for
    /// callers that have one (e.g. expansion wiring).
    pub fn validate_types(
        &self,
        input_type: &RecordType,
        target: &Node,
    ) -> Result<(), EngineError> {
        let source_field = input_type.field(&self.input_key).ok_or_else(|| {
            EngineError::validation(format!(
                "workflow input does not have a {:?} field",
                self.input_key
            ))
        })?;
        let target_type = target.input_type();
        let target_field = target_type.field(&self.target_key).ok_or_else(|| {
            EngineError::validation(format!(
                "target node {} does not have a {:?} input field",
                target.id(),
                self.target_key
            ))
        })?;

        if target_field.required && !source_field.required {
            return Err(EngineError::validation(format!(
                "input edge to {}.{} requires input {:?}, which is optional",
                self.target_id, self.target_key, self.input_key
            )));
        }
        if !source_field.ty.can_cast_to(&target_field.ty) {
            return Err(EngineError::validation(format!(
                "input edge to {}.{} has invalid types: {} is not assignable to {}",
                self.target_id, self.target_key, source_field.ty, target_field.ty
            )));
        }
        Ok(())
    }
}

/// An "edge" that projects a node output into the workflow's output.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputEdge {
    pub source_id: String,
    pub source_key: String,
    pub output_key: String,
}

impl OutputEdge {
    pub fn new(
        source_id: impl Into<String>,
        source_key: impl Into<String>,
        output_key: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            source_key: source_key.into(),
            output_key: output_key.into(),
        }
    }

    pub fn from_node(
        source: &Node,
        source_key: impl Into<String>,
        output_key: impl Into<String>,
    ) -> Result<Self, EngineError> {
        let edge = Self::new(source.id(), source_key, output_key);
        edge.validate_source(source)?;
        Ok(edge)
    }

    pub fn validate_source(&self, source: &Node) -> Result<(), EngineError> {
        if !source.output_type().has_field(&self.source_key) {
            return Err(EngineError::validation(format!(
                "source node {} does not have a {:?} output field",
                source.id(),
                self.source_key
            )));
        }
        Ok(())
    }
}
