//! Shared AST constructors and graph assertion helpers for the
//! integration suite.

#![allow(dead_code)]

use esflow::ast::*;
use esflow::expr_utils::negate_truthiness;
use esflow::{ControlFlowGraph, EdgeKind, FlowEdge, FlowNodeKind, FlowProgram};

// =============================================================================
// AST constructors
// =============================================================================

pub fn program(body: Vec<Statement>) -> Program {
    Program { body }
}

pub fn ident(name: &str) -> Expression {
    Expression::ident(name)
}

pub fn num(value: f64) -> Expression {
    Expression::Literal(Literal {
        value: LiteralValue::Number(value),
        raw: None,
    })
}

pub fn bool_lit(value: bool) -> Expression {
    Expression::Literal(Literal {
        value: LiteralValue::Boolean(value),
        raw: None,
    })
}

/// A no-argument call `name()`.
pub fn call(name: &str) -> Expression {
    Expression::CallExpression(CallExpression {
        callee: Box::new(ident(name)),
        arguments: vec![],
    })
}

pub fn expr_stmt(expression: Expression) -> Statement {
    Statement::ExpressionStatement(ExpressionStatement { expression })
}

pub fn block(body: Vec<Statement>) -> Statement {
    Statement::BlockStatement(BlockStatement { body })
}

pub fn var_decl(name: &str, init: Option<Expression>) -> Statement {
    Statement::VariableDeclaration(VariableDeclaration {
        declarations: vec![VariableDeclarator {
            id: Identifier::new(name),
            init,
        }],
        kind: DeclarationKind::Var,
    })
}

pub fn if_stmt(test: Expression, consequent: Statement, alternate: Option<Statement>) -> Statement {
    Statement::IfStatement(IfStatement {
        test,
        consequent: Box::new(consequent),
        alternate: alternate.map(Box::new),
    })
}

pub fn while_stmt(test: Expression, body: Statement) -> Statement {
    Statement::WhileStatement(WhileStatement {
        test,
        body: Box::new(body),
    })
}

pub fn for_of(name: &str, right: Expression, body: Statement) -> Statement {
    Statement::ForOfStatement(ForOfStatement {
        left: ForInit::Declaration(VariableDeclaration {
            declarations: vec![VariableDeclarator {
                id: Identifier::new(name),
                init: None,
            }],
            kind: DeclarationKind::Var,
        }),
        right,
        body: Box::new(body),
    })
}

pub fn for_in(name: &str, right: Expression, body: Statement) -> Statement {
    Statement::ForInStatement(ForInStatement {
        left: ForInit::Declaration(VariableDeclaration {
            declarations: vec![VariableDeclarator {
                id: Identifier::new(name),
                init: None,
            }],
            kind: DeclarationKind::Var,
        }),
        right,
        body: Box::new(body),
    })
}

pub fn break_stmt(label: Option<&str>) -> Statement {
    Statement::BreakStatement(BreakStatement {
        label: label.map(Identifier::new),
    })
}

pub fn continue_stmt(label: Option<&str>) -> Statement {
    Statement::ContinueStatement(ContinueStatement {
        label: label.map(Identifier::new),
    })
}

pub fn return_stmt(argument: Option<Expression>) -> Statement {
    Statement::ReturnStatement(ReturnStatement { argument })
}

pub fn throw_stmt(argument: Expression) -> Statement {
    Statement::ThrowStatement(ThrowStatement { argument })
}

pub fn labeled(name: &str, body: Statement) -> Statement {
    Statement::LabeledStatement(LabeledStatement {
        label: Identifier::new(name),
        body: Box::new(body),
    })
}

pub fn switch_case(test: Option<Expression>, consequent: Vec<Statement>) -> SwitchCase {
    SwitchCase { test, consequent }
}

pub fn switch_stmt(discriminant: Expression, cases: Vec<SwitchCase>) -> Statement {
    Statement::SwitchStatement(SwitchStatement {
        discriminant,
        cases,
    })
}

pub fn try_stmt(
    block: Vec<Statement>,
    handler: Option<(&str, Vec<Statement>)>,
    finalizer: Option<Vec<Statement>>,
) -> Statement {
    Statement::TryStatement(TryStatement {
        block: BlockStatement { body: block },
        handler: handler.map(|(param, body)| CatchClause {
            param: Identifier::new(param),
            body: BlockStatement { body },
        }),
        finalizer: finalizer.map(|body| BlockStatement { body }),
    })
}

pub fn function_decl(name: &str, body: Vec<Statement>) -> Statement {
    Statement::FunctionDeclaration(FunctionDeclaration {
        id: Identifier::new(name),
        params: vec![],
        body: BlockStatement { body },
    })
}

// =============================================================================
// Graph helpers
// =============================================================================

/// Every collected edge of a graph, in deterministic order.
pub fn edges_of<'a>(program: &'a FlowProgram, graph: &ControlFlowGraph) -> Vec<&'a FlowEdge> {
    graph.edges.iter().map(|&id| program.edge(id)).collect()
}

/// Every collected edge label (unlabeled edges excluded), in order.
pub fn labels_of(program: &FlowProgram, graph: &ControlFlowGraph) -> Vec<String> {
    edges_of(program, graph)
        .into_iter()
        .filter_map(|edge| edge.label.clone())
        .collect()
}

/// The single edge with the given label; panics when absent or ambiguous.
pub fn find_edge<'a>(
    program: &'a FlowProgram,
    graph: &ControlFlowGraph,
    label: &str,
) -> &'a FlowEdge {
    let matches: Vec<_> = edges_of(program, graph)
        .into_iter()
        .filter(|edge| edge.label.as_deref() == Some(label))
        .collect();
    assert_eq!(
        matches.len(),
        1,
        "expected exactly one edge labeled {label:?}, found {}",
        matches.len()
    );
    matches[0]
}

pub fn count_edges_labeled(
    program: &FlowProgram,
    graph: &ControlFlowGraph,
    label: &str,
) -> usize {
    edges_of(program, graph)
        .into_iter()
        .filter(|edge| edge.label.as_deref() == Some(label))
        .count()
}

/// Check the cross-cutting structural invariants on every graph of a build.
pub fn check_structural_invariants(program: &FlowProgram) {
    for graph in program.graphs() {
        let node_set: std::collections::HashSet<_> = graph.nodes.iter().copied().collect();
        assert!(
            node_set.contains(&graph.entry),
            "entry must survive optimization"
        );

        for &node_id in &graph.nodes {
            let node = program.node(node_id);
            match node.kind {
                FlowNodeKind::Entry => assert_eq!(node_id, graph.entry),
                FlowNodeKind::SuccessExit => assert_eq!(node_id, graph.success_exit),
                FlowNodeKind::ErrorExit => assert_eq!(node_id, graph.error_exit),
                FlowNodeKind::Normal => {}
            }

            // Conditional out-edges come in complementary pairs.
            let conditionals: Vec<_> = node
                .outgoing
                .iter()
                .map(|&id| program.edge(id))
                .filter(|edge| edge.kind == EdgeKind::Conditional)
                .collect();
            assert!(
                conditionals.len() == 0 || conditionals.len() == 2,
                "node {node_id:?} has {} conditional out-edges",
                conditionals.len()
            );
            if let [first, second] = conditionals.as_slice() {
                let first_guard = first.ast_ref.as_ref().expect("conditional edge guard");
                let second_guard = second.ast_ref.as_ref().expect("conditional edge guard");
                assert_eq!(
                    &negate_truthiness(first_guard),
                    second_guard,
                    "guards of {node_id:?} are not complements"
                );
            }

            // No duplicate (target, kind, ast_ref) among out-edges.
            for (i, a) in node.outgoing.iter().enumerate() {
                for b in node.outgoing.iter().skip(i + 1) {
                    let (a, b) = (program.edge(*a), program.edge(*b));
                    assert!(
                        !(a.target == b.target && a.kind == b.kind && a.ast_ref == b.ast_ref),
                        "duplicate edges out of {node_id:?}"
                    );
                }
            }
        }

        // No edge crosses the graph boundary.
        for &edge_id in &graph.edges {
            let edge = program.edge(edge_id);
            assert!(node_set.contains(&edge.source) && node_set.contains(&edge.target));
        }

        // Every collected node except the entry has an incoming edge.
        for &node_id in &graph.nodes {
            if node_id != graph.entry {
                assert!(
                    !program.node(node_id).incoming.is_empty(),
                    "node {node_id:?} is collected but has no incoming edges"
                );
            }
        }
    }
}
