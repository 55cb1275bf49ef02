//! Control flow graph construction for ECMAScript-like ASTs.
//!
//! Given a parsed program in the ESTree shape, `esflow` produces one flow
//! graph per lexical function body plus one for the top-level program. Each
//! vertex marks a point between statements or expressions; each edge is a
//! possible transfer of control, optionally labeled with the surface
//! expression that gates it. Downstream consumers (visualizers, analyzers,
//! verifiers) read the resulting [`FlowProgram`] as plain data.
//!
//! This crate is organized into several modules:
//! - `ast` - the supported ESTree statement/expression subset
//! - `graph` - nodes, edges, graphs, and the per-build arena
//! - `expr_utils` - expression stringification and truthiness transforms
//! - `preprocess` - named function expression lifting
//! - `context` - per-build parsing state (internal)
//! - `flow_graph_builder` - the construction engine (internal)
//! - `passes` - the optimization pipeline (internal)
//!
//! # Example
//!
//! ```
//! use esflow::{ParserOptions, parse_json_program};
//!
//! let program = parse_json_program(
//!     r#"{
//!         "type": "Program",
//!         "body": [
//!             { "type": "ExpressionStatement",
//!               "expression": { "type": "Identifier", "name": "a" } }
//!         ]
//!     }"#,
//!     ParserOptions::default(),
//! )
//! .unwrap();
//!
//! // entry -> a -> success exit; the error exit is unreachable and pruned.
//! assert_eq!(program.flow_graph.nodes.len(), 3);
//! ```

pub mod ast;
pub mod error;
pub mod expr_utils;
pub mod graph;
pub mod preprocess;

mod context;
mod flow_graph_builder;
mod passes;

use serde::{Deserialize, Serialize};

use crate::ast::Program;
use crate::flow_graph_builder::FlowGraphBuilder;

pub use crate::error::FlowError;
pub use crate::graph::{
    ControlFlowGraph, EdgeKind, FlowEdge, FlowEdgeId, FlowFunction, FlowNode, FlowNodeId,
    FlowNodeKind, FlowProgram, FunctionId,
};

/// Options accepted by the entry points.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParserOptions {
    pub passes: PassOptions,
}

/// Which opt-in optimization passes to run. Unreachable-node removal and
/// the final collection always run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PassOptions {
    pub rewrite_constant_conditional_edges: bool,
    pub remove_transit_nodes: bool,
}

/// Build a flow program from a typed AST.
///
/// The program is preprocessed (named function expressions lifted into
/// declarations), translated into graphs, and each graph is run through the
/// configured optimization pipeline. Errors surface synchronously; no
/// partial graph is returned on failure.
pub fn parse_program(program: Program, options: ParserOptions) -> Result<FlowProgram, FlowError> {
    let program = preprocess::rewrite_function_expressions(program);
    let (mut flow_graph, mut functions, mut arena) = FlowGraphBuilder::new().build(&program)?;

    passes::run_passes(&mut arena, &mut flow_graph, &options.passes);
    for function in &mut functions {
        passes::run_passes(&mut arena, &mut function.flow_graph, &options.passes);
    }

    Ok(FlowProgram::new(flow_graph, functions, arena))
}

/// Build a flow program from ESTree JSON text.
///
/// The top-level value must be an object whose `type` is `"Program"`;
/// anything else is [`FlowError::InvalidInput`]. Unknown fields on known
/// nodes (`loc`, `range`, ...) are ignored; unknown `type` tags surface as
/// [`FlowError::UnsupportedConstruct`] during construction.
pub fn parse_json_program(source: &str, options: ParserOptions) -> Result<FlowProgram, FlowError> {
    let value: serde_json::Value =
        serde_json::from_str(source).map_err(|e| FlowError::InvalidInput(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| FlowError::InvalidInput("top-level value is not an object".to_string()))?;
    let tag = object
        .get("type")
        .and_then(|tag| tag.as_str())
        .ok_or_else(|| FlowError::InvalidInput("node has no `type` tag".to_string()))?;
    if tag != "Program" {
        return Err(FlowError::InvalidInput(format!(
            "top-level node is `{tag}`, expected `Program`"
        )));
    }

    let program: Program =
        serde_json::from_value(value).map_err(|e| FlowError::InvalidInput(e.to_string()))?;
    parse_program(program, options)
}
