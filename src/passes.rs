//! Optimization passes over a finished flow graph.
//!
//! Applied once per graph, in order: constant-conditional rewriting
//! (opt-in), unreachable-node removal (always), transit-node elimination
//! (opt-in, to fixpoint), and the final collection of `nodes`/`edges`
//! (always). The pipeline is idempotent: running it a second time changes
//! nothing.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;

use crate::PassOptions;
use crate::expr_utils::static_truthiness;
use crate::graph::{ControlFlowGraph, EdgeKind, FlowArena, FlowNodeId};

/// Run the configured pipeline over one graph.
pub(crate) fn run_passes(
    arena: &mut FlowArena,
    graph: &mut ControlFlowGraph,
    options: &PassOptions,
) {
    if options.rewrite_constant_conditional_edges {
        rewrite_constant_conditional_edges(arena, graph);
    }
    remove_unreachable_nodes(arena, graph);
    if options.remove_transit_nodes {
        remove_transit_nodes(arena, graph);
    }
    collect_nodes_and_edges(arena, graph);
}

/// For a node whose two conditional out-edges are both statically decidable,
/// drop the edge that cannot be taken and downgrade the other to an
/// unguarded epsilon edge.
fn rewrite_constant_conditional_edges(arena: &mut FlowArena, graph: &ControlFlowGraph) {
    for node_id in reachable_in_bfs_order(arena, graph.entry) {
        let conditionals: Vec<_> = arena
            .node(node_id)
            .outgoing
            .iter()
            .copied()
            .filter(|&edge_id| arena.edge(edge_id).kind == EdgeKind::Conditional)
            .collect();
        if conditionals.len() != 2 {
            continue;
        }

        let truthiness: Vec<_> = conditionals
            .iter()
            .map(|&edge_id| {
                arena
                    .edge(edge_id)
                    .ast_ref
                    .as_ref()
                    .and_then(static_truthiness)
            })
            .collect();
        let (live, dead) = match (truthiness[0], truthiness[1]) {
            (Some(true), Some(false)) => (conditionals[0], conditionals[1]),
            (Some(false), Some(true)) => (conditionals[1], conditionals[0]),
            _ => continue,
        };

        arena.detach_edge(dead);
        let edge = arena.edge_mut(live);
        edge.kind = EdgeKind::Epsilon;
        edge.label = None;
        edge.ast_ref = None;
    }
}

/// Delete every node of this graph not reachable from its entry, along with
/// its edges. Scoped to the graph's own roster: other graphs share the
/// arena and are untouched.
fn remove_unreachable_nodes(arena: &mut FlowArena, graph: &ControlFlowGraph) {
    let reachable: FxHashSet<_> = reachable_in_bfs_order(arena, graph.entry)
        .into_iter()
        .collect();

    for &node_id in &graph.nodes {
        if reachable.contains(&node_id) {
            continue;
        }
        let edges: Vec<_> = {
            let node = arena.node(node_id);
            node.incoming
                .iter()
                .chain(node.outgoing.iter())
                .copied()
                .collect()
        };
        for edge_id in edges {
            arena.detach_edge(edge_id);
        }
    }
}

/// Splice out transit nodes: exactly one incoming epsilon edge, exactly one
/// outgoing *unlabeled* epsilon edge, and not one of the three distinguished
/// nodes. The incoming edge (and its label) survives, retargeted at the
/// successor. Repeats until no node qualifies.
fn remove_transit_nodes(arena: &mut FlowArena, graph: &ControlFlowGraph) {
    loop {
        let mut changed = false;
        for node_id in reachable_in_bfs_order(arena, graph.entry) {
            if node_id == graph.entry
                || node_id == graph.success_exit
                || node_id == graph.error_exit
            {
                continue;
            }

            let node = arena.node(node_id);
            if node.incoming.len() != 1 || node.outgoing.len() != 1 {
                continue;
            }
            let in_edge = node.incoming[0];
            let out_edge = node.outgoing[0];
            let (in_kind, in_source) = {
                let edge = arena.edge(in_edge);
                (edge.kind, edge.source)
            };
            let (out_kind, out_label_empty, successor) = {
                let edge = arena.edge(out_edge);
                (edge.kind, edge.label.is_none(), edge.target)
            };
            if in_kind != EdgeKind::Epsilon
                || out_kind != EdgeKind::Epsilon
                || !out_label_empty
                || in_source == node_id
                || successor == node_id
            {
                continue;
            }

            arena.detach_edge(out_edge);
            let duplicate = {
                let ast_ref = arena.edge(in_edge).ast_ref.clone();
                arena.node(in_source).outgoing.iter().any(|&edge_id| {
                    let edge = arena.edge(edge_id);
                    edge_id != in_edge
                        && edge.target == successor
                        && edge.kind == EdgeKind::Epsilon
                        && edge.ast_ref == ast_ref
                })
            };
            if duplicate {
                arena.detach_edge(in_edge);
            } else {
                arena.retarget_edge(in_edge, successor);
            }
            changed = true;
        }
        if !changed {
            break;
        }
    }
}

/// Populate `graph.nodes` and `graph.edges` by a fresh BFS from the entry:
/// nodes in visit order, edges in their source's insertion order.
fn collect_nodes_and_edges(arena: &FlowArena, graph: &mut ControlFlowGraph) {
    let order = reachable_in_bfs_order(arena, graph.entry);
    let mut edges = Vec::new();
    for &node_id in &order {
        edges.extend(arena.node(node_id).outgoing.iter().copied());
    }
    graph.nodes = order;
    graph.edges = edges;
}

fn reachable_in_bfs_order(arena: &FlowArena, entry: FlowNodeId) -> Vec<FlowNodeId> {
    let mut visited = FxHashSet::default();
    let mut order = Vec::new();
    let mut queue = VecDeque::new();
    visited.insert(entry);
    queue.push_back(entry);
    while let Some(node_id) = queue.pop_front() {
        order.push(node_id);
        for edge_id in arena.node(node_id).outgoing.clone() {
            let target = arena.edge(edge_id).target;
            if visited.insert(target) {
                queue.push_back(target);
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expression, Literal, LiteralValue};
    use crate::expr_utils::negate_truthiness;
    use crate::graph::FlowNodeKind;

    fn literal(value: bool) -> Expression {
        Expression::Literal(Literal {
            value: LiteralValue::Boolean(value),
            raw: None,
        })
    }

    fn graph_with_entry(arena: &mut FlowArena) -> ControlFlowGraph {
        ControlFlowGraph::new(arena)
    }

    /// Allocate a node and record it on the graph's roster, the way the
    /// parsing context does during construction.
    fn add_node(arena: &mut FlowArena, graph: &mut ControlFlowGraph) -> crate::graph::FlowNodeId {
        let id = arena.create_node(FlowNodeKind::Normal);
        graph.nodes.push(id);
        id
    }

    fn append_to(
        arena: &mut FlowArena,
        graph: &mut ControlFlowGraph,
        source: crate::graph::FlowNodeId,
        label: Option<&str>,
        kind: EdgeKind,
    ) -> crate::graph::FlowNodeId {
        let target = add_node(arena, graph);
        arena.add_edge(source, target, kind, label.map(str::to_string), None);
        target
    }

    #[test]
    fn removes_unreachable_nodes_and_their_edges() {
        let mut arena = FlowArena::new();
        let mut graph = graph_with_entry(&mut arena);
        let reached = arena.append_epsilon_edge(graph.entry, graph.success_exit);
        let orphan = add_node(&mut arena, &mut graph);
        // Orphan points at a reachable node; the edge must disappear too.
        arena.append_epsilon_edge(orphan, graph.success_exit);
        assert_eq!(arena.node(graph.success_exit).incoming.len(), 2);

        remove_unreachable_nodes(&mut arena, &graph);
        collect_nodes_and_edges(&arena, &mut graph);

        assert_eq!(arena.node(graph.success_exit).incoming, vec![reached]);
        assert!(!graph.nodes.contains(&orphan));
        // The error exit had no incoming edges, so it is unreachable too.
        assert!(!graph.nodes.contains(&graph.error_exit));
    }

    #[test]
    fn splices_transit_nodes_but_keeps_labeled_hops() {
        let mut arena = FlowArena::new();
        let mut graph = graph_with_entry(&mut arena);
        let entry = graph.entry;
        let labeled = append_to(&mut arena, &mut graph, entry, Some("a"), EdgeKind::Epsilon);
        let transit = append_to(&mut arena, &mut graph, labeled, None, EdgeKind::Epsilon);
        arena.append_epsilon_edge(transit, graph.success_exit);

        remove_unreachable_nodes(&mut arena, &graph);
        remove_transit_nodes(&mut arena, &graph);
        collect_nodes_and_edges(&arena, &mut graph);

        // `transit` is gone; `labeled` keeps its labeled incoming edge and
        // now points straight at the exit. `labeled` itself is spliceable
        // too once its outgoing edge leads to the exit, so only the labeled
        // edge survives.
        assert!(!graph.nodes.contains(&transit));
        assert_eq!(graph.edges.len(), 1);
        let survivor = arena.edge(graph.edges[0]);
        assert_eq!(survivor.label.as_deref(), Some("a"));
        assert_eq!(survivor.target, graph.success_exit);
    }

    #[test]
    fn rewrites_statically_decided_conditionals() {
        let mut arena = FlowArena::new();
        let mut graph = graph_with_entry(&mut arena);
        let guard = literal(true);
        let negated = negate_truthiness(&guard);
        let entry = graph.entry;
        let taken = add_node(&mut arena, &mut graph);
        arena.add_edge(
            entry,
            taken,
            EdgeKind::Conditional,
            Some("true".to_string()),
            Some(guard),
        );
        let skipped = add_node(&mut arena, &mut graph);
        arena.add_edge(
            entry,
            skipped,
            EdgeKind::Conditional,
            Some("!true".to_string()),
            Some(negated),
        );
        arena.append_epsilon_edge(taken, graph.success_exit);
        arena.append_epsilon_edge(skipped, graph.success_exit);

        let options = PassOptions {
            rewrite_constant_conditional_edges: true,
            remove_transit_nodes: false,
        };
        run_passes(&mut arena, &mut graph, &options);

        assert!(!graph.nodes.contains(&skipped));
        let out = &arena.node(graph.entry).outgoing;
        assert_eq!(out.len(), 1);
        let edge = arena.edge(out[0]);
        assert_eq!(edge.kind, EdgeKind::Epsilon);
        assert!(edge.label.is_none() && edge.ast_ref.is_none());
    }

    #[test]
    fn pipeline_is_idempotent() {
        let mut arena = FlowArena::new();
        let mut graph = graph_with_entry(&mut arena);
        let entry = graph.entry;
        let a = append_to(&mut arena, &mut graph, entry, Some("a"), EdgeKind::Epsilon);
        let b = append_to(&mut arena, &mut graph, a, None, EdgeKind::Epsilon);
        arena.append_epsilon_edge(b, graph.success_exit);

        let options = PassOptions {
            rewrite_constant_conditional_edges: true,
            remove_transit_nodes: true,
        };
        run_passes(&mut arena, &mut graph, &options);
        let nodes_first = graph.nodes.clone();
        let edges_first = graph.edges.clone();

        run_passes(&mut arena, &mut graph, &options);
        assert_eq!(graph.nodes, nodes_first);
        assert_eq!(graph.edges, edges_first);
    }
}
