// Directed host graph: ingestion-time edge accumulation and the one-shot
// node aggregation pass.

use crate::features::{FeatureRegistry, FeatureValues, INDEGREE};
use crate::identity::ResolvedRequest;
use petgraph::Direction;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

pub const LABEL: &str = "label";

#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Text(String),
    Number(f64),
}

impl AttrValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttrValue::Number(n) => Some(*n),
            AttrValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            AttrValue::Number(_) => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Text(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Number(value)
    }
}

pub type NodeAttributes = BTreeMap<String, AttrValue>;

/// The `{label: id}` attribute set every node starts with.
pub fn label_attributes(id: &str) -> NodeAttributes {
    BTreeMap::from([(LABEL.to_string(), AttrValue::from(id))])
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostNode {
    pub id: String,
    pub attributes: NodeAttributes,
}

impl HostNode {
    pub fn label(&self) -> &str {
        self.attributes
            .get(LABEL)
            .and_then(AttrValue::as_text)
            .unwrap_or(self.id.as_str())
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.attributes.get(key).and_then(AttrValue::as_number)
    }
}

/// Per-feature accumulators of every request seen on one (source, target) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowEdge {
    pub values: FeatureValues,
}

impl FlowEdge {
    pub fn get(&self, feature: &str) -> Option<f64> {
        self.values.get(feature).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Empty,
    Ingesting,
}

/// Graph under construction. Consumed by [`FlowGraph::aggregate`], so no
/// ingestion can happen once node attributes have been computed.
#[derive(Debug, Clone)]
pub struct FlowGraph {
    graph: DiGraph<HostNode, FlowEdge>,
    node_index: HashMap<String, NodeIndex>,
    edge_index: HashMap<(NodeIndex, NodeIndex), EdgeIndex>,
    registry: FeatureRegistry,
    phase: Phase,
}

impl FlowGraph {
    pub fn new(registry: FeatureRegistry) -> Self {
        Self {
            graph: DiGraph::new(),
            node_index: HashMap::new(),
            edge_index: HashMap::new(),
            registry,
            phase: Phase::Empty,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    /// Create the node with `attrs`, or merge `attrs` into the existing one
    /// (new keys overwrite old).
    pub fn add_node(&mut self, id: &str, attrs: NodeAttributes) -> NodeIndex {
        self.phase = Phase::Ingesting;

        if let Some(&idx) = self.node_index.get(id) {
            self.graph[idx].attributes.extend(attrs);
            return idx;
        }

        let idx = self.graph.add_node(HostNode {
            id: id.to_string(),
            attributes: attrs,
        });
        self.node_index.insert(id.to_string(), idx);
        idx
    }

    /// Fold one resolved request into the edge `source -> target`, creating
    /// the endpoints and the edge on first sight. Returns `None` for a
    /// self-loop, which never enters the graph.
    pub fn add_edge(&mut self, req: &ResolvedRequest) -> Option<EdgeIndex> {
        if req.source == req.target {
            return None;
        }

        let source = self.add_node(&req.source, label_attributes(&req.source));
        let target = self.add_node(&req.target, label_attributes(&req.target));

        if let Some(&edge) = self.edge_index.get(&(source, target)) {
            self.registry.extract_into(&mut self.graph[edge].values, req);
            return Some(edge);
        }

        let mut values = self.registry.zero_values();
        self.registry.extract_into(&mut values, req);

        let edge = self.graph.add_edge(source, target, FlowEdge { values });
        self.edge_index.insert((source, target), edge);
        Some(edge)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node(&self, id: &str) -> Option<&HostNode> {
        self.node_index.get(id).map(|&idx| &self.graph[idx])
    }

    pub fn edge(&self, source: &str, target: &str) -> Option<&FlowEdge> {
        lookup_edge(&self.graph, &self.node_index, &self.edge_index, source, target)
    }

    /// Reduce every node's in-edges into its final attributes.
    ///
    /// Each node's result depends only on its own in-edges, and every
    /// combiner is commutative and associative, so neither node order nor
    /// edge order affects the outcome.
    pub fn aggregate(self) -> AggregatedGraph {
        let FlowGraph {
            mut graph,
            node_index,
            edge_index,
            registry,
            ..
        } = self;

        let finals: Vec<(NodeIndex, FeatureValues, usize)> = graph
            .node_indices()
            .map(|idx| {
                let mut totals = registry.zero_values();
                let mut indegree = 0;
                for edge in graph.edges_directed(idx, Direction::Incoming) {
                    registry.accumulate_into(&mut totals, &edge.weight().values);
                    indegree += 1;
                }
                (idx, registry.finalize(&totals, indegree), indegree)
            })
            .collect();

        for (idx, values, indegree) in finals {
            let attrs = &mut graph[idx].attributes;
            attrs.extend(values.into_iter().map(|(k, v)| (k, AttrValue::Number(v))));
            attrs.insert(INDEGREE.to_string(), AttrValue::Number(indegree as f64));
        }

        debug!(
            "Aggregated {} node(s) over {} edge(s)",
            graph.node_count(),
            graph.edge_count()
        );

        AggregatedGraph {
            graph,
            node_index,
            edge_index,
            registry,
        }
    }
}

impl Default for FlowGraph {
    fn default() -> Self {
        Self::new(FeatureRegistry::standard())
    }
}

/// Terminal, read-only graph with node attributes computed.
#[derive(Debug, Clone)]
pub struct AggregatedGraph {
    graph: DiGraph<HostNode, FlowEdge>,
    node_index: HashMap<String, NodeIndex>,
    edge_index: HashMap<(NodeIndex, NodeIndex), EdgeIndex>,
    registry: FeatureRegistry,
}

impl AggregatedGraph {
    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node(&self, id: &str) -> Option<&HostNode> {
        self.node_index.get(id).map(|&idx| &self.graph[idx])
    }

    pub fn edge(&self, source: &str, target: &str) -> Option<&FlowEdge> {
        lookup_edge(&self.graph, &self.node_index, &self.edge_index, source, target)
    }

    /// Nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &HostNode> {
        self.graph.node_weights()
    }

    /// `(source, target, edge)` in creation order.
    pub fn edges(&self) -> impl Iterator<Item = (&HostNode, &HostNode, &FlowEdge)> {
        self.graph
            .edge_references()
            .map(|e| (&self.graph[e.source()], &self.graph[e.target()], e.weight()))
    }

    /// Underlying petgraph structure, for structural metrics computed elsewhere.
    pub fn inner(&self) -> &DiGraph<HostNode, FlowEdge> {
        &self.graph
    }
}

fn lookup_edge<'g>(
    graph: &'g DiGraph<HostNode, FlowEdge>,
    node_index: &HashMap<String, NodeIndex>,
    edge_index: &HashMap<(NodeIndex, NodeIndex), EdgeIndex>,
    source: &str,
    target: &str,
) -> Option<&'g FlowEdge> {
    let source = node_index.get(source)?;
    let target = node_index.get(target)?;
    edge_index
        .get(&(*source, *target))
        .and_then(|&e| graph.edge_weight(e))
}
