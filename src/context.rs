//! Per-build parsing context.
//!
//! The context owns the arena, the function accumulator, and the state that
//! is per-graph: the graph currently under construction and the stack of
//! enclosing statements that can be jump targets. Entering a function body
//! swaps in a fresh graph and an empty stack while keeping the arena and the
//! generators, so node ids, temp names, and function ids stay unique across
//! the whole build.

use crate::ast::{BlockStatement, CatchClause, Expression};
use crate::graph::{
    ControlFlowGraph, EdgeKind, FlowArena, FlowFunction, FlowNodeId, FlowNodeKind, FunctionId,
};

/// A frame on the enclosing-statement stack.
///
/// `Other` frames come from loops, switches, and labeled statements; they
/// carry the jump targets. `Try` frames carry what the engine needs to route
/// abrupt exits through handlers and finalizers.
#[derive(Debug)]
pub(crate) struct EnclosingStatement<'ast> {
    pub label: Option<&'ast str>,
    pub break_target: Option<FlowNodeId>,
    pub continue_target: Option<FlowNodeId>,
    pub try_frame: Option<TryFrame<'ast>>,
}

impl<'ast> EnclosingStatement<'ast> {
    pub fn other(
        label: Option<&'ast str>,
        break_target: FlowNodeId,
        continue_target: Option<FlowNodeId>,
    ) -> Self {
        EnclosingStatement {
            label,
            break_target: Some(break_target),
            continue_target,
            try_frame: None,
        }
    }

    pub fn try_statement(frame: TryFrame<'ast>) -> Self {
        EnclosingStatement {
            label: None,
            break_target: None,
            continue_target: None,
            try_frame: Some(frame),
        }
    }

    pub fn is_try(&self) -> bool {
        self.try_frame.is_some()
    }
}

/// The try-specific payload of an enclosing-statement frame.
#[derive(Debug)]
pub(crate) struct TryFrame<'ast> {
    pub handler: Option<&'ast CatchClause>,
    /// Pre-created entry node of the handler body, when a handler exists.
    pub handler_body_entry: Option<FlowNodeId>,
    /// The `finally` block; re-parsed into a fresh subgraph at every replay
    /// site.
    pub finalizer: Option<&'ast BlockStatement>,
    /// True while the try block itself is being translated; a throw only
    /// routes to this frame's handler when set.
    pub in_try_block: bool,
    /// Re-entry guard set while this frame's finalizer is being replayed.
    pub in_finalizer: bool,
}

/// Mutable state threaded through one build.
pub(crate) struct ParsingContext<'ast> {
    pub arena: FlowArena,
    pub functions: Vec<FlowFunction>,
    pub current_graph: ControlFlowGraph,
    pub enclosing_statements: Vec<EnclosingStatement<'ast>>,
    temp_counter: u32,
    function_counter: u32,
}

impl<'ast> ParsingContext<'ast> {
    pub fn new() -> Self {
        let mut arena = FlowArena::new();
        let current_graph = ControlFlowGraph::new(&mut arena);
        ParsingContext {
            arena,
            functions: Vec::new(),
            current_graph,
            enclosing_statements: Vec::new(),
            temp_counter: 0,
            function_counter: 0,
        }
    }

    /// Allocate a `Normal` node in the graph under construction, recording
    /// it on the graph's roster so the passes stay scoped to their graph.
    pub fn create_node(&mut self) -> FlowNodeId {
        let id = self.arena.create_node(FlowNodeKind::Normal);
        self.current_graph.nodes.push(id);
        id
    }

    /// A fresh node in the current graph, linked from `source`.
    pub fn append_to(
        &mut self,
        source: FlowNodeId,
        label: Option<String>,
        kind: EdgeKind,
        ast_ref: Option<Expression>,
    ) -> FlowNodeId {
        let target = self.arena.append_to(source, label, kind, ast_ref);
        self.current_graph.nodes.push(target);
        target
    }

    /// A fresh node reached from `source` through a guarded conditional edge.
    pub fn append_conditionally_to(
        &mut self,
        source: FlowNodeId,
        label: String,
        guard: Expression,
    ) -> FlowNodeId {
        self.append_to(source, Some(label), EdgeKind::Conditional, Some(guard))
    }

    pub fn append_epsilon_edge(&mut self, source: FlowNodeId, target: FlowNodeId) {
        self.arena.append_epsilon_edge(source, target);
    }

    pub fn add_edge(
        &mut self,
        source: FlowNodeId,
        target: FlowNodeId,
        kind: EdgeKind,
        label: Option<String>,
        ast_ref: Option<Expression>,
    ) {
        self.arena.add_edge(source, target, kind, label, ast_ref);
    }

    /// Yield a unique synthetic local name such as `$$temp1` or `$$iter2`.
    /// The counter is shared across hints so names never collide.
    pub fn create_temporary_local_variable_name(&mut self, hint: &str) -> String {
        self.temp_counter += 1;
        format!("$${}{}", hint, self.temp_counter)
    }

    pub fn create_function_id(&mut self) -> FunctionId {
        self.function_counter += 1;
        FunctionId(self.function_counter)
    }

    /// Swap in a fresh graph and an empty enclosing-statement stack for a
    /// function body. Returns the saved outer state for `exit_function`.
    pub fn enter_function(&mut self) -> SavedGraphState<'ast> {
        let graph = ControlFlowGraph::new(&mut self.arena);
        SavedGraphState {
            graph: std::mem::replace(&mut self.current_graph, graph),
            enclosing_statements: std::mem::take(&mut self.enclosing_statements),
        }
    }

    /// Restore the outer state saved by `enter_function`, returning the
    /// finished function graph.
    pub fn exit_function(&mut self, saved: SavedGraphState<'ast>) -> ControlFlowGraph {
        self.enclosing_statements = saved.enclosing_statements;
        std::mem::replace(&mut self.current_graph, saved.graph)
    }
}

/// Outer per-graph state held while a function body is translated.
pub(crate) struct SavedGraphState<'ast> {
    graph: ControlFlowGraph,
    enclosing_statements: Vec<EnclosingStatement<'ast>>,
}
