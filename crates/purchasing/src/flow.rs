//! Document flow graph: the lineage of linked procurement documents.

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::reference::DocumentRef;

/// How two documents are related (upstream → downstream).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowRelation {
    /// Request → RFQ.
    Sourced,
    /// Request or RFQ → purchase order.
    Ordered,
    /// Blanket order → release.
    Released,
    /// Agreement → blanket order.
    Governs,
    Received,
    Billed,
    Returned,
    Matched,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowNode {
    pub reference: DocumentRef,
    pub number: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowEdge {
    pub from: DocumentRef,
    pub to: DocumentRef,
    pub relation: FlowRelation,
}

impl FlowEdge {
    pub fn new(from: impl Into<DocumentRef>, to: impl Into<DocumentRef>, relation: FlowRelation) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            relation,
        }
    }

    fn other(&self, this: DocumentRef) -> DocumentRef {
        if self.from == this { self.to } else { self.from }
    }
}

/// Read access to documents and their direct references.
pub trait DocumentLinks {
    fn node(&self, reference: DocumentRef) -> Option<FlowNode>;

    /// Every edge that touches `reference`, in either direction.
    fn links(&self, reference: DocumentRef) -> Vec<FlowEdge>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowGraph {
    pub root: DocumentRef,
    pub nodes: Vec<FlowNode>,
    pub edges: Vec<FlowEdge>,
}

impl FlowGraph {
    /// Breadth-first walk from `root` over every reachable reference.
    ///
    /// Returns `None` when the root document does not exist. Edges to
    /// documents that cannot be resolved are dropped.
    pub fn build(root: DocumentRef, source: &impl DocumentLinks) -> Option<Self> {
        let root_node = source.node(root)?;

        let mut nodes = vec![root_node];
        let mut seen = BTreeSet::from([root]);
        let mut edges = BTreeSet::new();
        let mut queue = VecDeque::from([root]);

        while let Some(current) = queue.pop_front() {
            for edge in source.links(current) {
                let next = edge.other(current);
                if !seen.contains(&next) {
                    let Some(node) = source.node(next) else {
                        continue;
                    };
                    seen.insert(next);
                    nodes.push(node);
                    queue.push_back(next);
                }
                edges.insert(edge);
            }
        }

        Some(Self {
            root,
            nodes,
            edges: edges.into_iter().collect(),
        })
    }

    pub fn node(&self, reference: DocumentRef) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.reference == reference)
    }

    pub fn contains(&self, reference: DocumentRef) -> bool {
        self.node(reference).is_some()
    }
}
