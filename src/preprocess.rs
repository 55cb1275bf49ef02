//! AST preprocessing: named function expression lifting.
//!
//! The construction engine only understands `FunctionDeclaration`, so this
//! pass rewrites named function expressions appearing in the recognizable
//! statement shapes into equivalent declarations bound to the function's own
//! name:
//!
//! - `var f = function g() {}`  becomes  `function g() {}  var f = g;`
//! - `f = function g() {};`     becomes  `function g() {}  f = g;`
//! - `function g() {};` as a bare expression statement becomes the
//!   declaration itself.
//!
//! Anonymous function expressions, and named ones in deeper expression
//! positions, are opaque leaves: they are neither traversed nor lifted.

use crate::ast::{
    AssignmentExpression, AssignmentOperator, BlockStatement, Expression, ExpressionStatement,
    FunctionDeclaration, Program, Statement,
};

/// Rewrite a whole program into the uniform form the builder expects.
pub fn rewrite_function_expressions(program: Program) -> Program {
    Program {
        body: rewrite_statement_list(program.body),
    }
}

fn rewrite_statement_list(statements: Vec<Statement>) -> Vec<Statement> {
    let mut out = Vec::with_capacity(statements.len());
    for statement in statements {
        rewrite_statement_into(statement, &mut out);
    }
    out
}

fn rewrite_block(block: BlockStatement) -> BlockStatement {
    BlockStatement {
        body: rewrite_statement_list(block.body),
    }
}

/// Rewrite one statement, appending it (plus any lifted declarations) to
/// `out`. Lifted declarations land immediately before the statement that
/// referenced them.
fn rewrite_statement_into(statement: Statement, out: &mut Vec<Statement>) {
    match statement {
        Statement::VariableDeclaration(mut declaration) => {
            for declarator in &mut declaration.declarations {
                let lifted = match declarator.init.take() {
                    Some(Expression::FunctionExpression(function)) if function.id.is_some() => {
                        Some(function)
                    }
                    other => {
                        declarator.init = other;
                        None
                    }
                };
                if let Some(function) = lifted
                    && let Some(name) = function.id.clone()
                {
                    declarator.init = Some(Expression::Identifier(name.clone()));
                    out.push(Statement::FunctionDeclaration(FunctionDeclaration {
                        id: name,
                        params: function.params,
                        body: rewrite_block(function.body),
                    }));
                }
            }
            out.push(Statement::VariableDeclaration(declaration));
        }

        Statement::ExpressionStatement(expr_stmt) => match expr_stmt.expression {
            // A bare named function expression is the declaration itself.
            Expression::FunctionExpression(function) if function.id.is_some() => {
                if let Some(name) = function.id.clone() {
                    out.push(Statement::FunctionDeclaration(FunctionDeclaration {
                        id: name,
                        params: function.params,
                        body: rewrite_block(function.body),
                    }));
                }
            }
            Expression::AssignmentExpression(assignment)
                if assignment.operator == AssignmentOperator::Assign =>
            {
                let AssignmentExpression {
                    operator,
                    left,
                    right,
                } = assignment;
                let right = match *right {
                    Expression::FunctionExpression(function) => match function.id.clone() {
                        Some(name) => {
                            out.push(Statement::FunctionDeclaration(FunctionDeclaration {
                                id: name.clone(),
                                params: function.params,
                                body: rewrite_block(function.body),
                            }));
                            Expression::Identifier(name)
                        }
                        None => Expression::FunctionExpression(function),
                    },
                    other => other,
                };
                out.push(Statement::ExpressionStatement(ExpressionStatement {
                    expression: Expression::AssignmentExpression(AssignmentExpression {
                        operator,
                        left,
                        right: Box::new(right),
                    }),
                }));
            }
            other => out.push(Statement::ExpressionStatement(ExpressionStatement {
                expression: other,
            })),
        },

        Statement::BlockStatement(block) => {
            out.push(Statement::BlockStatement(rewrite_block(block)));
        }

        Statement::IfStatement(mut if_stmt) => {
            if_stmt.consequent = rewrite_boxed(if_stmt.consequent);
            if_stmt.alternate = if_stmt.alternate.map(rewrite_boxed);
            out.push(Statement::IfStatement(if_stmt));
        }

        Statement::WhileStatement(mut while_stmt) => {
            while_stmt.body = rewrite_boxed(while_stmt.body);
            out.push(Statement::WhileStatement(while_stmt));
        }

        Statement::DoWhileStatement(mut do_while) => {
            do_while.body = rewrite_boxed(do_while.body);
            out.push(Statement::DoWhileStatement(do_while));
        }

        Statement::ForStatement(mut for_stmt) => {
            for_stmt.body = rewrite_boxed(for_stmt.body);
            out.push(Statement::ForStatement(for_stmt));
        }

        Statement::ForInStatement(mut for_in) => {
            for_in.body = rewrite_boxed(for_in.body);
            out.push(Statement::ForInStatement(for_in));
        }

        Statement::ForOfStatement(mut for_of) => {
            for_of.body = rewrite_boxed(for_of.body);
            out.push(Statement::ForOfStatement(for_of));
        }

        Statement::SwitchStatement(mut switch) => {
            for case in &mut switch.cases {
                let consequent = std::mem::take(&mut case.consequent);
                case.consequent = rewrite_statement_list(consequent);
            }
            out.push(Statement::SwitchStatement(switch));
        }

        Statement::LabeledStatement(mut labeled) => {
            labeled.body = rewrite_boxed(labeled.body);
            out.push(Statement::LabeledStatement(labeled));
        }

        Statement::TryStatement(mut try_stmt) => {
            try_stmt.block = rewrite_block(try_stmt.block);
            if let Some(handler) = &mut try_stmt.handler {
                let body = std::mem::replace(&mut handler.body, BlockStatement { body: vec![] });
                handler.body = rewrite_block(body);
            }
            try_stmt.finalizer = try_stmt.finalizer.map(rewrite_block);
            out.push(Statement::TryStatement(try_stmt));
        }

        Statement::WithStatement(mut with_stmt) => {
            with_stmt.body = rewrite_boxed(with_stmt.body);
            out.push(Statement::WithStatement(with_stmt));
        }

        Statement::FunctionDeclaration(mut function) => {
            function.body = rewrite_block(function.body);
            out.push(Statement::FunctionDeclaration(function));
        }

        // Leaves: nothing to lift, nothing to descend into.
        other @ (Statement::EmptyStatement
        | Statement::DebuggerStatement
        | Statement::BreakStatement(_)
        | Statement::ContinueStatement(_)
        | Statement::ReturnStatement(_)
        | Statement::ThrowStatement(_)
        | Statement::Unknown(_)) => out.push(other),
    }
}

/// Rewrite a single boxed statement body. When lifting produces more than
/// one statement, the result is wrapped in a block so the surrounding
/// construct still holds exactly one statement.
fn rewrite_boxed(statement: Box<Statement>) -> Box<Statement> {
    let mut list = Vec::with_capacity(1);
    rewrite_statement_into(*statement, &mut list);
    if list.len() == 1 {
        if let Some(only) = list.pop() {
            return Box::new(only);
        }
    }
    Box::new(Statement::BlockStatement(BlockStatement { body: list }))
}
