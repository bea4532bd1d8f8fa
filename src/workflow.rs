// src/workflow.rs
//
// =============================================================================
// DAGFLOW: WORKFLOW GRAPH & STRUCTURAL OPERATIONS
// =============================================================================
//
// The Graph Brain.
//
// Responsibilities:
// 1. Hold the immutable DAG (nodes, edges, input/output projections).
// 2. Enforce the structural invariants at construction time.
// 3. Ready-set computation during execution.
// 4. Node expansion: splicing a subgraph in place of a node.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use petgraph::graph::DiGraph;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::edge::{Edge, InputEdge, OutputEdge};
use crate::error::EngineError;
use crate::node::Node;
use crate::record::{Record, RecordType};
use crate::value::{ValueMap, ValueType};

/// An in-edge of a node: either internal dataflow or external input.
#[derive(Clone, Debug)]
enum InEdge {
    Internal(Edge),
    Input(InputEdge),
}

#[derive(Debug)]
struct WorkflowIndex {
    nodes_by_id: HashMap<String, usize>,
    /// `target node -> target key -> unique in-edge`.
    in_edges: HashMap<String, BTreeMap<String, InEdge>>,
    input_type: RecordType,
    output_type: RecordType,
}

/// An immutable, validated DAG of nodes and edges plus input/output
/// projections.
///
/// Construction runs the full set of structural validators; a `Workflow`
/// value is therefore always well-formed. Serde roundtrips the canonical
/// wire form `{nodes, edges, input_edges, output_edges}`.
#[derive(Clone, Debug, Serialize)]
pub struct Workflow {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    input_edges: Vec<InputEdge>,
    output_edges: Vec<OutputEdge>,
    #[serde(skip)]
    index: Arc<WorkflowIndex>,
}

impl PartialEq for Workflow {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes
            && self.edges == other.edges
            && self.input_edges == other.input_edges
            && self.output_edges == other.output_edges
    }
}

impl Workflow {
    // ------------------------------------------------------------------------
    // Construction & validation
    // ------------------------------------------------------------------------

    pub fn new(
        nodes: Vec<Node>,
        edges: Vec<Edge>,
        input_edges: Vec<InputEdge>,
        output_edges: Vec<OutputEdge>,
    ) -> Result<Self, EngineError> {
        let index = Self::validate(&nodes, &edges, &input_edges, &output_edges)?;
        Ok(Self {
            nodes,
            edges,
            input_edges,
            output_edges,
            index: Arc::new(index),
        })
    }

    fn validate(
        nodes: &[Node],
        edges: &[Edge],
        input_edges: &[InputEdge],
        output_edges: &[OutputEdge],
    ) -> Result<WorkflowIndex, EngineError> {
        // unique node ids
        let mut nodes_by_id: HashMap<String, usize> = HashMap::new();
        for (position, node) in nodes.iter().enumerate() {
            if nodes_by_id
                .insert(node.id().to_string(), position)
                .is_some()
            {
                return Err(EngineError::validation(format!(
                    "node {} is already in the graph",
                    node.id()
                )));
            }
        }

        // `/` is reserved for namespacing during expansion: no id may be a
        // path prefix of another
        for id in nodes_by_id.keys() {
            let mut prefix = String::new();
            for segment in id.split('/') {
                if !prefix.is_empty() {
                    if nodes_by_id.contains_key(&prefix) {
                        return Err(EngineError::validation(format!(
                            "node id {prefix:?} is a namespace prefix of node id {id:?}"
                        )));
                    }
                    prefix.push('/');
                }
                prefix.push_str(segment);
            }
        }

        // unique in-edge per (target, key)
        let mut in_edges: HashMap<String, BTreeMap<String, InEdge>> = nodes
            .iter()
            .map(|node| (node.id().to_string(), BTreeMap::new()))
            .collect();
        for edge in edges {
            occupy(
                &mut in_edges,
                &edge.target_id,
                &edge.target_key,
                InEdge::Internal(edge.clone()),
            )?;
        }
        for edge in input_edges {
            occupy(
                &mut in_edges,
                &edge.target_id,
                &edge.target_key,
                InEdge::Input(edge.clone()),
            )?;
        }

        // every required input of every node is satisfied by exactly one
        // incoming edge (uniqueness was enforced above)
        for node in nodes {
            let input_type = node.input_type();
            for (key, field) in input_type.fields() {
                if field.required && !in_edges[node.id()].contains_key(key) {
                    return Err(EngineError::validation(format!(
                        "node {} has no edge for its required input {key:?}",
                        node.id()
                    )));
                }
            }
        }

        // every edge's type constraint holds (defense in depth: self-built
        // edges were already checked by their constructors)
        let node_at = |id: &str| -> Result<&Node, EngineError> {
            nodes_by_id
                .get(id)
                .map(|position| &nodes[*position])
                .ok_or_else(|| {
                    EngineError::validation(format!("edge references unknown node {id}"))
                })
        };
        for edge in edges {
            edge.validate_types(node_at(&edge.source_id)?, node_at(&edge.target_id)?)?;
        }
        for edge in input_edges {
            edge.validate_target(node_at(&edge.target_id)?)?;
        }
        for edge in output_edges {
            edge.validate_source(node_at(&edge.source_id)?)?;
        }

        // the edge relation must be acyclic
        let mut graph = DiGraph::<&str, ()>::new();
        let mut graph_ids = HashMap::new();
        for node in nodes {
            graph_ids.insert(node.id(), graph.add_node(node.id()));
        }
        for edge in edges {
            graph.add_edge(
                graph_ids[edge.source_id.as_str()],
                graph_ids[edge.target_id.as_str()],
                (),
            );
        }
        if let Err(cycle) = petgraph::algo::toposort(&graph, None) {
            return Err(EngineError::validation(format!(
                "workflow graph is not a DAG (cycle through node {})",
                graph[cycle.node_id()]
            )));
        }

        // derived external contracts
        let mut input_fields: BTreeMap<String, (ValueType, bool)> = BTreeMap::new();
        for edge in input_edges {
            let target = node_at(&edge.target_id)?;
            let target_type = target.input_type();
            let field = target_type
                .field(&edge.target_key)
                .expect("validated above");
            input_fields
                .entry(edge.input_key.clone())
                .and_modify(|(_, required)| *required |= field.required)
                .or_insert_with(|| (field.ty.clone(), field.required));
        }
        let input_type = RecordType::new(
            "WorkflowInput",
            input_fields
                .into_iter()
                .map(|(key, (ty, required))| (key, ty, required)),
        );

        let mut output_fields: BTreeMap<String, (ValueType, bool)> = BTreeMap::new();
        for edge in output_edges {
            let source = node_at(&edge.source_id)?;
            let source_type = source.output_type();
            let field = source_type
                .field(&edge.source_key)
                .expect("validated above");
            output_fields
                .entry(edge.output_key.clone())
                .or_insert_with(|| (field.ty.clone(), field.required));
        }
        let output_type = RecordType::new(
            "WorkflowOutput",
            output_fields
                .into_iter()
                .map(|(key, (ty, required))| (key, ty, required)),
        );

        Ok(WorkflowIndex {
            nodes_by_id,
            in_edges,
            input_type,
            output_type,
        })
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn input_edges(&self) -> &[InputEdge] {
        &self.input_edges
    }

    pub fn output_edges(&self) -> &[OutputEdge] {
        &self.output_edges
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index.nodes_by_id.get(id).map(|i| &self.nodes[*i])
    }

    /// The external input contract derived from the input edges.
    pub fn input_type(&self) -> &RecordType {
        &self.index.input_type
    }

    /// The external output contract derived from the output edges.
    pub fn output_type(&self) -> &RecordType {
        &self.index.output_type
    }

    // ------------------------------------------------------------------------
    // Ready-set computation
    // ------------------------------------------------------------------------

    /// Given the external input and the outputs of finished nodes, returns
    /// the nodes that are now runnable together with their raw (uncast)
    /// input maps.
    ///
    /// `partial` carries nodes already known ready but not yet run, so their
    /// readiness is not recomputed. Finished nodes are removed. An empty
    /// result means no further progress is possible.
    pub fn ready_nodes(
        &self,
        input: &ValueMap,
        node_outputs: &BTreeMap<String, Record>,
        partial: &BTreeMap<String, ValueMap>,
    ) -> BTreeMap<String, ValueMap> {
        let mut ready: BTreeMap<String, ValueMap> = partial.clone();
        for node in &self.nodes {
            if node_outputs.contains_key(node.id()) {
                ready.remove(node.id());
                continue;
            }
            if ready.contains_key(node.id()) {
                continue;
            }

            let mut raw_input = ValueMap::new();
            let mut is_ready = true;
            for (target_key, in_edge) in &self.index.in_edges[node.id()] {
                let provided = match in_edge {
                    InEdge::Input(edge) => input.get(&edge.input_key),
                    InEdge::Internal(edge) => node_outputs
                        .get(&edge.source_id)
                        .and_then(|record| record.get(&edge.source_key)),
                };
                match provided {
                    Some(value) => {
                        raw_input.insert(target_key.clone(), value.clone());
                    }
                    None => {
                        is_ready = false;
                        break;
                    }
                }
            }
            if is_ready {
                ready.insert(node.id().to_string(), raw_input);
            }
        }
        ready
    }

    // ------------------------------------------------------------------------
    // Output projection
    // ------------------------------------------------------------------------

    /// Strict output projection: every output edge must resolve.
    pub fn output(&self, node_outputs: &BTreeMap<String, Record>) -> Result<ValueMap, EngineError> {
        self.project(node_outputs, false)
    }

    /// Partial output projection: output edges that cannot resolve are
    /// silently omitted, yielding whatever was produced before a failure.
    pub fn partial_output(&self, node_outputs: &BTreeMap<String, Record>) -> ValueMap {
        self.project(node_outputs, true)
            .expect("partial projection is infallible")
    }

    fn project(
        &self,
        node_outputs: &BTreeMap<String, Record>,
        partial: bool,
    ) -> Result<ValueMap, EngineError> {
        let mut output = ValueMap::new();
        for edge in &self.output_edges {
            let value = node_outputs
                .get(&edge.source_id)
                .and_then(|record| record.get(&edge.source_key));
            match value {
                Some(value) => {
                    output.insert(edge.output_key.clone(), value.clone());
                }
                None if partial => {}
                None => {
                    return Err(EngineError::validation(format!(
                        "workflow output {:?} is unavailable: node {} produced no {:?}",
                        edge.output_key, edge.source_id, edge.source_key
                    )));
                }
            }
        }
        Ok(output)
    }

    // ------------------------------------------------------------------------
    // Namespacing & expansion
    // ------------------------------------------------------------------------

    /// A copy of this workflow with every node id prefixed by `ns/`. Input
    /// and output keys are left untouched.
    pub fn with_namespace(&self, ns: &str) -> Result<Workflow, EngineError> {
        let prefixed = |id: &str| format!("{ns}/{id}");
        Workflow::new(
            self.nodes.iter().map(|n| n.with_namespace(ns)).collect(),
            self.edges
                .iter()
                .map(|e| {
                    Edge::new(
                        prefixed(&e.source_id),
                        e.source_key.clone(),
                        prefixed(&e.target_id),
                        e.target_key.clone(),
                    )
                })
                .collect(),
            self.input_edges
                .iter()
                .map(|e| {
                    InputEdge::new(
                        e.input_key.clone(),
                        prefixed(&e.target_id),
                        e.target_key.clone(),
                    )
                })
                .collect(),
            self.output_edges
                .iter()
                .map(|e| {
                    OutputEdge::new(
                        prefixed(&e.source_id),
                        e.source_key.clone(),
                        e.output_key.clone(),
                    )
                })
                .collect(),
        )
    }

    /// Splices `subgraph` in place of the node `node_id`, producing a new
    /// workflow.
    ///
    /// The subgraph's input edges name the fields they consume from the
    /// replaced node's input; its output edges name the fields they provide
    /// in place of the replaced node's output. External edges re-point
    /// through those mappings: unmatched inputs are dropped (optional),
    /// unmatched required outputs are an error.
    pub fn expand_node(&self, node_id: &str, subgraph: &Workflow) -> Result<Workflow, EngineError> {
        let expansion_error = |source: EngineError| EngineError::Expansion {
            node_id: node_id.to_string(),
            subgraph: Box::new(subgraph.clone()),
            source: Box::new(source),
        };

        let node = self
            .node(node_id)
            .ok_or_else(|| {
                expansion_error(EngineError::validation(format!(
                    "cannot expand unknown node {node_id}"
                )))
            })?
            .clone();
        let inner = subgraph.with_namespace(node_id).map_err(&expansion_error)?;

        let mut nodes: Vec<Node> = self
            .nodes
            .iter()
            .filter(|n| n.id() != node_id)
            .cloned()
            .collect();
        nodes.extend(inner.nodes.iter().cloned());

        let output_required = |source_key: &str| -> bool {
            node.output_type()
                .field(source_key)
                .map(|field| field.required)
                .unwrap_or(false)
        };

        let mut edges: Vec<Edge> = Vec::new();
        for edge in &self.edges {
            if edge.target_id == node_id {
                // re-point the external producer at the interior consumers
                for mapping in inner
                    .input_edges
                    .iter()
                    .filter(|m| m.input_key == edge.target_key)
                {
                    edges.push(Edge::new(
                        edge.source_id.clone(),
                        edge.source_key.clone(),
                        mapping.target_id.clone(),
                        mapping.target_key.clone(),
                    ));
                }
                // no mapping: the subgraph does not consume this input
            } else if edge.source_id == node_id {
                let mut matched = false;
                for mapping in inner
                    .output_edges
                    .iter()
                    .filter(|m| m.output_key == edge.source_key)
                {
                    matched = true;
                    edges.push(Edge::new(
                        mapping.source_id.clone(),
                        mapping.source_key.clone(),
                        edge.target_id.clone(),
                        edge.target_key.clone(),
                    ));
                }
                if !matched && output_required(&edge.source_key) {
                    return Err(expansion_error(EngineError::validation(format!(
                        "subgraph provides no output {:?} required by edge to {}.{}",
                        edge.source_key, edge.target_id, edge.target_key
                    ))));
                }
            } else {
                edges.push(edge.clone());
            }
        }
        edges.extend(inner.edges.iter().cloned());

        let mut input_edges: Vec<InputEdge> = Vec::new();
        for edge in &self.input_edges {
            if edge.target_id == node_id {
                for mapping in inner
                    .input_edges
                    .iter()
                    .filter(|m| m.input_key == edge.target_key)
                {
                    input_edges.push(InputEdge::new(
                        edge.input_key.clone(),
                        mapping.target_id.clone(),
                        mapping.target_key.clone(),
                    ));
                }
            } else {
                input_edges.push(edge.clone());
            }
        }

        let mut output_edges: Vec<OutputEdge> = Vec::new();
        for edge in &self.output_edges {
            if edge.source_id == node_id {
                let mut matched = false;
                for mapping in inner
                    .output_edges
                    .iter()
                    .filter(|m| m.output_key == edge.source_key)
                {
                    matched = true;
                    output_edges.push(OutputEdge::new(
                        mapping.source_id.clone(),
                        mapping.source_key.clone(),
                        edge.output_key.clone(),
                    ));
                }
                if !matched && output_required(&edge.source_key) {
                    return Err(expansion_error(EngineError::validation(format!(
                        "subgraph provides no output {:?} required by workflow output {:?}",
                        edge.source_key, edge.output_key
                    ))));
                }
            } else {
                output_edges.push(edge.clone());
            }
        }

        Workflow::new(nodes, edges, input_edges, output_edges).map_err(expansion_error)
    }
}

fn occupy(
    in_edges: &mut HashMap<String, BTreeMap<String, InEdge>>,
    target_id: &str,
    target_key: &str,
    edge: InEdge,
) -> Result<(), EngineError> {
    let slots = in_edges
        .get_mut(target_id)
        .ok_or_else(|| EngineError::validation(format!("edge targets unknown node {target_id}")))?;
    if slots.insert(target_key.to_string(), edge).is_some() {
        return Err(EngineError::validation(format!(
            "in-edge to {target_id}.{target_key} is already in the graph"
        )));
    }
    Ok(())
}

impl<'de> Deserialize<'de> for Workflow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Wire {
            nodes: Vec<Node>,
            #[serde(default)]
            edges: Vec<Edge>,
            #[serde(default)]
            input_edges: Vec<InputEdge>,
            #[serde(default)]
            output_edges: Vec<OutputEdge>,
        }
        let wire = Wire::deserialize(deserializer)?;
        Workflow::new(wire.nodes, wire.edges, wire.input_edges, wire.output_edges)
            .map_err(D::Error::custom)
    }
}
