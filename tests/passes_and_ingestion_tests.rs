//! Pass pipeline behavior observed end-to-end, and the ESTree JSON
//! ingestion path.

mod common;

use common::*;
use esflow::{EdgeKind, FlowError, ParserOptions, PassOptions, parse_json_program, parse_program};
use pretty_assertions::assert_eq;
use serde_json::json;

fn options(constant: bool, transit: bool) -> ParserOptions {
    ParserOptions {
        passes: PassOptions {
            rewrite_constant_conditional_edges: constant,
            remove_transit_nodes: transit,
        },
    }
}

// =============================================================================
// Passes
// =============================================================================

#[test]
fn transit_removal_collapses_branch_plumbing() {
    // if (a) { b; } else { c; }
    let body = vec![if_stmt(
        ident("a"),
        block(vec![expr_stmt(ident("b"))]),
        Some(block(vec![expr_stmt(ident("c"))])),
    )];

    let plain = parse_program(program(body.clone()), options(false, false)).expect("build");
    let spliced = parse_program(program(body), options(false, true)).expect("build");

    // The two body nodes become direct labeled hops into the merge node.
    assert_eq!(plain.flow_graph.nodes.len(), 7);
    assert_eq!(spliced.flow_graph.nodes.len(), 5);

    // Guard structure is untouched by splicing.
    let conditional_labels = |flow: &esflow::FlowProgram| {
        let mut labels: Vec<_> = edges_of(flow, &flow.flow_graph)
            .into_iter()
            .filter(|edge| edge.kind == EdgeKind::Conditional)
            .map(|edge| edge.label.clone().unwrap_or_default())
            .collect();
        labels.sort();
        labels
    };
    assert_eq!(conditional_labels(&plain), conditional_labels(&spliced));
    assert_eq!(conditional_labels(&plain), vec!["!a".to_string(), "a".to_string()]);

    // The statement labels survive on the retargeted edges.
    let merge = find_edge(&spliced, &spliced.flow_graph, "b").target;
    assert_eq!(find_edge(&spliced, &spliced.flow_graph, "c").target, merge);
    check_structural_invariants(&spliced);
}

#[test]
fn constant_conditionals_drop_the_dead_branch() {
    // if (true) a(); else b();
    let flow = parse_program(
        program(vec![if_stmt(
            bool_lit(true),
            expr_stmt(call("a")),
            Some(expr_stmt(call("b"))),
        )]),
        options(true, false),
    )
    .expect("build");
    let graph = &flow.flow_graph;

    assert_eq!(count_edges_labeled(&flow, graph, "a()"), 1);
    assert_eq!(count_edges_labeled(&flow, graph, "b()"), 0);

    // The surviving edge out of the entry is an unguarded epsilon now.
    let out = &flow.node(graph.entry).outgoing;
    assert_eq!(out.len(), 1);
    let edge = flow.edge(out[0]);
    assert_eq!(edge.kind, EdgeKind::Epsilon);
    assert!(edge.label.is_none() && edge.ast_ref.is_none());
    check_structural_invariants(&flow);
}

#[test]
fn every_graph_of_a_build_is_optimized() {
    let flow = parse_program(
        program(vec![function_decl(
            "f",
            vec![if_stmt(bool_lit(false), expr_stmt(call("dead")), None)],
        )]),
        options(true, true),
    )
    .expect("build");

    let inner = &flow.functions[0].flow_graph;
    assert_eq!(count_edges_labeled(&flow, inner, "dead()"), 0);
    check_structural_invariants(&flow);
}

// =============================================================================
// JSON ingestion
// =============================================================================

#[test]
fn parses_estree_json_with_extra_fields() {
    let source = json!({
        "type": "Program",
        "sourceType": "script",
        "body": [
            {
                "type": "IfStatement",
                "loc": { "start": { "line": 1, "column": 0 } },
                "test": { "type": "Identifier", "name": "a" },
                "consequent": {
                    "type": "ExpressionStatement",
                    "expression": {
                        "type": "CallExpression",
                        "callee": { "type": "Identifier", "name": "b" },
                        "arguments": []
                    }
                },
                "alternate": null
            }
        ]
    })
    .to_string();

    let flow = parse_json_program(&source, ParserOptions::default()).expect("build");
    let graph = &flow.flow_graph;
    assert_eq!(count_edges_labeled(&flow, graph, "b()"), 1);
    let guard = find_edge(&flow, graph, "a");
    assert_eq!(guard.kind, EdgeKind::Conditional);
    check_structural_invariants(&flow);
}

#[test]
fn top_level_must_be_a_program() {
    let err = parse_json_program(
        &json!({ "type": "ExpressionStatement" }).to_string(),
        ParserOptions::default(),
    )
    .expect_err("must fail");
    assert!(matches!(err, FlowError::InvalidInput(_)));
}

#[test]
fn non_object_input_is_invalid() {
    let err =
        parse_json_program("[1, 2, 3]", ParserOptions::default()).expect_err("must fail");
    assert!(matches!(err, FlowError::InvalidInput(_)));

    let err = parse_json_program("not json", ParserOptions::default()).expect_err("must fail");
    assert!(matches!(err, FlowError::InvalidInput(_)));
}

#[test]
fn missing_type_tag_is_invalid() {
    let err = parse_json_program(
        &json!({ "body": [] }).to_string(),
        ParserOptions::default(),
    )
    .expect_err("must fail");
    assert!(matches!(err, FlowError::InvalidInput(_)));
}

#[test]
fn unknown_tags_surface_as_unsupported_constructs() {
    let source = json!({
        "type": "Program",
        "body": [
            { "type": "ClassDeclaration", "id": { "type": "Identifier", "name": "C" } }
        ]
    })
    .to_string();

    let err = parse_json_program(&source, ParserOptions::default()).expect_err("must fail");
    match err {
        FlowError::UnsupportedConstruct(kind) => assert_eq!(kind, "ClassDeclaration"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn serialized_programs_expose_graph_shape() {
    let flow = parse_program(
        program(vec![expr_stmt(ident("a"))]),
        ParserOptions::default(),
    )
    .expect("build");
    let value = serde_json::to_value(&flow).expect("serialize");
    assert!(value.get("flow_graph").is_some());
    assert!(value.get("functions").is_some());
    let nodes = value["flow_graph"]["nodes"].as_array().expect("nodes");
    assert_eq!(nodes.len(), 3);
}
