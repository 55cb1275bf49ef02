//! Flow graph model.
//!
//! Nodes and edges live in a per-build arena (`FlowArena`) and reference each
//! other through small integer handles, so loop back-edges and the
//! bidirectional incoming/outgoing lists never create ownership cycles. One
//! arena serves every graph of a build, which keeps node ids monotonically
//! increasing in creation order across the top-level graph and all function
//! graphs.

use serde::{Deserialize, Serialize};

use crate::ast::Expression;

// =============================================================================
// Handles
// =============================================================================

/// Handle of a node in the build's `FlowArena`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowNodeId(pub u32);

/// Handle of an edge in the build's `FlowArena`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowEdgeId(pub u32);

/// Identifier of a `FlowFunction`, unique within one build.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionId(pub u32);

// =============================================================================
// Nodes and edges
// =============================================================================

/// The role a node plays in its graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FlowNodeKind {
    Entry,
    SuccessExit,
    ErrorExit,
    Normal,
}

/// How control transfers along an edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EdgeKind {
    /// Unconditional transfer, no guard.
    Epsilon,
    /// Transfer taken only when the guard expression is truthy.
    Conditional,
    /// A `break`/`continue`/`return`/`throw` transition.
    AbruptCompletion,
}

/// A vertex marking a point between statements or expressions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: FlowNodeId,
    pub kind: FlowNodeKind,
    /// Edges arriving at this node, in insertion order.
    pub incoming: Vec<FlowEdgeId>,
    /// Edges leaving this node, in insertion order.
    pub outgoing: Vec<FlowEdgeId>,
}

/// A directed transfer of control between two nodes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlowEdge {
    pub id: FlowEdgeId,
    pub source: FlowNodeId,
    pub target: FlowNodeId,
    pub kind: EdgeKind,
    /// Display label; never parsed back.
    pub label: Option<String>,
    /// The surface expression justifying the edge. Present on conditional
    /// edges (the guard) and on abrupt edges that carry an argument.
    pub ast_ref: Option<Expression>,
}

// =============================================================================
// Arena
// =============================================================================

/// Arena owning every node and edge of one build.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FlowArena {
    nodes: Vec<FlowNode>,
    edges: Vec<FlowEdge>,
}

impl FlowArena {
    pub fn new() -> Self {
        FlowArena::default()
    }

    /// Allocate a node of the given kind. Ids increase in creation order.
    pub fn create_node(&mut self, kind: FlowNodeKind) -> FlowNodeId {
        let id = FlowNodeId(self.nodes.len() as u32);
        self.nodes.push(FlowNode {
            id,
            kind,
            incoming: Vec::new(),
            outgoing: Vec::new(),
        });
        id
    }

    /// Install an edge, collapsing duplicates: if `source` already has an
    /// outgoing edge with the same `(target, kind, ast_ref)`, that edge is
    /// returned instead of adding a parallel one.
    pub fn add_edge(
        &mut self,
        source: FlowNodeId,
        target: FlowNodeId,
        kind: EdgeKind,
        label: Option<String>,
        ast_ref: Option<Expression>,
    ) -> FlowEdgeId {
        for &edge_id in &self.node(source).outgoing {
            let edge = self.edge(edge_id);
            if edge.target == target && edge.kind == kind && edge.ast_ref == ast_ref {
                return edge_id;
            }
        }

        let id = FlowEdgeId(self.edges.len() as u32);
        self.edges.push(FlowEdge {
            id,
            source,
            target,
            kind,
            label,
            ast_ref,
        });
        self.node_mut(source).outgoing.push(id);
        self.node_mut(target).incoming.push(id);
        id
    }

    /// Create a fresh `Normal` node linked from `source`, returning the new
    /// node for chaining.
    pub fn append_to(
        &mut self,
        source: FlowNodeId,
        label: Option<String>,
        kind: EdgeKind,
        ast_ref: Option<Expression>,
    ) -> FlowNodeId {
        let target = self.create_node(FlowNodeKind::Normal);
        self.add_edge(source, target, kind, label, ast_ref);
        target
    }

    /// An unlabeled epsilon edge between two existing nodes.
    pub fn append_epsilon_edge(&mut self, source: FlowNodeId, target: FlowNodeId) -> FlowEdgeId {
        self.add_edge(source, target, EdgeKind::Epsilon, None, None)
    }

    /// A fresh node reached from `source` through a conditional edge guarded
    /// by `guard`.
    pub fn append_conditionally_to(
        &mut self,
        source: FlowNodeId,
        label: String,
        guard: Expression,
    ) -> FlowNodeId {
        self.append_to(source, Some(label), EdgeKind::Conditional, Some(guard))
    }

    pub fn node(&self, id: FlowNodeId) -> &FlowNode {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: FlowNodeId) -> &mut FlowNode {
        &mut self.nodes[id.0 as usize]
    }

    pub fn edge(&self, id: FlowEdgeId) -> &FlowEdge {
        &self.edges[id.0 as usize]
    }

    pub fn edge_mut(&mut self, id: FlowEdgeId) -> &mut FlowEdge {
        &mut self.edges[id.0 as usize]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Detach an edge from both of its endpoints. The edge record stays in
    /// the arena but no longer participates in any adjacency list.
    pub fn detach_edge(&mut self, id: FlowEdgeId) {
        let (source, target) = {
            let edge = self.edge(id);
            (edge.source, edge.target)
        };
        self.node_mut(source).outgoing.retain(|&e| e != id);
        self.node_mut(target).incoming.retain(|&e| e != id);
    }

    /// Point an existing edge at a new target, maintaining both incoming
    /// lists. The edge keeps its position in the source's outgoing order.
    pub fn retarget_edge(&mut self, id: FlowEdgeId, new_target: FlowNodeId) {
        let old_target = self.edge(id).target;
        self.node_mut(old_target).incoming.retain(|&e| e != id);
        self.edge_mut(id).target = new_target;
        self.node_mut(new_target).incoming.push(id);
    }
}

// =============================================================================
// Graphs, functions, programs
// =============================================================================

/// One flow graph: the top-level program's, or a single function body's.
///
/// During construction `nodes` is the roster of every node allocated for
/// this graph (graphs share one arena, so the roster is what scopes the
/// passes to their own graph); the final collection pass replaces it with
/// the reachable nodes in deterministic order and fills `edges`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ControlFlowGraph {
    pub entry: FlowNodeId,
    pub success_exit: FlowNodeId,
    pub error_exit: FlowNodeId,
    pub nodes: Vec<FlowNodeId>,
    pub edges: Vec<FlowEdgeId>,
}

impl ControlFlowGraph {
    /// Allocate the entry/exit triple for a fresh graph.
    pub fn new(arena: &mut FlowArena) -> Self {
        let entry = arena.create_node(FlowNodeKind::Entry);
        let success_exit = arena.create_node(FlowNodeKind::SuccessExit);
        let error_exit = arena.create_node(FlowNodeKind::ErrorExit);
        ControlFlowGraph {
            entry,
            success_exit,
            error_exit,
            nodes: vec![entry, success_exit, error_exit],
            edges: Vec::new(),
        }
    }
}

/// A user function together with its independent flow graph.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlowFunction {
    pub id: FunctionId,
    pub name: String,
    pub flow_graph: ControlFlowGraph,
}

/// The result of one build: the top-level graph plus one graph per function,
/// all backed by a single arena.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlowProgram {
    pub flow_graph: ControlFlowGraph,
    pub functions: Vec<FlowFunction>,
    arena: FlowArena,
}

impl FlowProgram {
    pub(crate) fn new(
        flow_graph: ControlFlowGraph,
        functions: Vec<FlowFunction>,
        arena: FlowArena,
    ) -> Self {
        FlowProgram {
            flow_graph,
            functions,
            arena,
        }
    }

    /// Resolve a node handle.
    pub fn node(&self, id: FlowNodeId) -> &FlowNode {
        self.arena.node(id)
    }

    /// Resolve an edge handle.
    pub fn edge(&self, id: FlowEdgeId) -> &FlowEdge {
        self.arena.edge(id)
    }

    /// The top-level graph followed by every function graph.
    pub fn graphs(&self) -> impl Iterator<Item = &ControlFlowGraph> {
        std::iter::once(&self.flow_graph).chain(self.functions.iter().map(|f| &f.flow_graph))
    }
}
