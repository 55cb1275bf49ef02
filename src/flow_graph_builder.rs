//! Flow graph construction engine.
//!
//! Translates statements and expressions into graph fragments, threading a
//! `Completion` through each translation: `Normal(node)` means control may
//! fall through at `node`; every other variant means control already left
//! through an abrupt-completion edge installed into a target known from the
//! enclosing-statement stack.
//!
//! Finalizers are replayed as fresh subgraphs at every exit site (return,
//! break/continue across the try, throw, and the statement's own normal
//! paths), so the graph's topology matches the operational semantics: each
//! exit path records its own pass through the `finally`.

use tracing::{Level, debug, span};

use crate::ast::{
    BinaryExpression, BinaryOperator, BlockStatement, BreakStatement, ContinueStatement,
    DoWhileStatement, Expression, ForInStatement, ForInit, ForOfStatement, ForStatement,
    FunctionDeclaration, IfStatement, LabeledStatement, MemberExpression, Program,
    ReturnStatement, Statement, SwitchStatement, ThrowStatement, TryStatement,
    VariableDeclaration, WhileStatement, WithStatement,
};
use crate::context::{EnclosingStatement, ParsingContext, TryFrame};
use crate::error::{FlowError, Result};
use crate::expr_utils::{negate_truthiness, stringify};
use crate::graph::{
    ControlFlowGraph, EdgeKind, FlowArena, FlowFunction, FlowNodeId,
};

/// Recursion budget for statement nesting.
pub(crate) const MAX_STATEMENT_DEPTH: usize = 500;

/// How a translated fragment finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Completion {
    /// Control may fall through at the carried node.
    Normal(FlowNodeId),
    Break,
    Continue,
    Return,
    Throw,
}

/// The construction engine for one build.
pub(crate) struct FlowGraphBuilder<'ast> {
    ctx: ParsingContext<'ast>,
    depth: usize,
}

impl<'ast> FlowGraphBuilder<'ast> {
    pub fn new() -> Self {
        FlowGraphBuilder {
            ctx: ParsingContext::new(),
            depth: 0,
        }
    }

    /// Translate a whole program, returning the top-level graph, the
    /// accumulated functions, and the arena backing them all.
    pub fn build(
        mut self,
        program: &'ast Program,
    ) -> Result<(ControlFlowGraph, Vec<FlowFunction>, FlowArena)> {
        let _span = span!(
            Level::DEBUG,
            "parse_program",
            num_statements = program.body.len()
        )
        .entered();

        let entry = self.ctx.current_graph.entry;
        let completion = self.parse_statements(&program.body, entry)?;
        if let Completion::Normal(node) = completion {
            let success_exit = self.ctx.current_graph.success_exit;
            self.ctx.append_epsilon_edge(node, success_exit);
        }
        debug!(
            nodes = self.ctx.arena.node_count(),
            functions = self.ctx.functions.len(),
            "flow program constructed"
        );
        Ok((self.ctx.current_graph, self.ctx.functions, self.ctx.arena))
    }

    /// Fold a statement list; the first abrupt completion short-circuits and
    /// the remaining statements are dropped as unreachable.
    fn parse_statements(
        &mut self,
        statements: &'ast [Statement],
        current: FlowNodeId,
    ) -> Result<Completion> {
        let mut completion = Completion::Normal(current);
        for statement in statements {
            let Completion::Normal(node) = completion else {
                break;
            };
            completion = self.parse_statement(statement, node, None)?;
        }
        Ok(completion)
    }

    fn parse_statement(
        &mut self,
        statement: &'ast Statement,
        current: FlowNodeId,
        label: Option<&'ast str>,
    ) -> Result<Completion> {
        if self.depth >= MAX_STATEMENT_DEPTH {
            return Err(FlowError::InputTooDeep(MAX_STATEMENT_DEPTH));
        }
        self.depth += 1;
        let completion = self.dispatch_statement(statement, current, label);
        self.depth -= 1;
        completion
    }

    fn dispatch_statement(
        &mut self,
        statement: &'ast Statement,
        current: FlowNodeId,
        label: Option<&'ast str>,
    ) -> Result<Completion> {
        match statement {
            Statement::BlockStatement(block) => self.parse_statements(&block.body, current),
            Statement::ExpressionStatement(expr_stmt) => {
                let node = self.parse_expression(&expr_stmt.expression, current)?;
                Ok(Completion::Normal(node))
            }
            Statement::EmptyStatement => {
                let node = self.ctx.append_to(
                    current,
                    Some("(empty)".to_string()),
                    EdgeKind::Epsilon,
                    None,
                );
                Ok(Completion::Normal(node))
            }
            // Debugger statements have no control flow effect.
            Statement::DebuggerStatement => Ok(Completion::Normal(current)),
            Statement::VariableDeclaration(declaration) => {
                Ok(Completion::Normal(
                    self.parse_variable_declaration(declaration, current),
                ))
            }
            Statement::IfStatement(if_stmt) => self.parse_if_statement(if_stmt, current),
            Statement::WhileStatement(while_stmt) => {
                self.parse_while_statement(while_stmt, current, label)
            }
            Statement::DoWhileStatement(do_while) => {
                self.parse_do_while_statement(do_while, current, label)
            }
            Statement::ForStatement(for_stmt) => self.parse_for_statement(for_stmt, current, label),
            Statement::ForInStatement(for_in) => {
                self.parse_for_in_statement(for_in, current, label)
            }
            Statement::ForOfStatement(for_of) => {
                self.parse_for_of_statement(for_of, current, label)
            }
            Statement::SwitchStatement(switch) => {
                self.parse_switch_statement(switch, current, label)
            }
            Statement::BreakStatement(break_stmt) => self.parse_break_statement(break_stmt, current),
            Statement::ContinueStatement(continue_stmt) => {
                self.parse_continue_statement(continue_stmt, current)
            }
            Statement::LabeledStatement(labeled) => self.parse_labeled_statement(labeled, current),
            Statement::ReturnStatement(return_stmt) => {
                self.parse_return_statement(return_stmt, current)
            }
            Statement::ThrowStatement(throw_stmt) => {
                self.parse_throw_statement(throw_stmt, current)
            }
            Statement::TryStatement(try_stmt) => self.parse_try_statement(try_stmt, current),
            Statement::WithStatement(with_stmt) => self.parse_with_statement(with_stmt, current),
            Statement::FunctionDeclaration(function) => {
                self.parse_function_declaration(function, current)
            }
            Statement::Unknown(unknown) => {
                Err(FlowError::UnsupportedConstruct(unknown.kind.clone()))
            }
        }
    }

    /// Lower an expression from `current`, returning the node at which the
    /// expression's evaluation completes. Sequence expressions fan out into a
    /// chain of nodes, one per comma operand; everything else is a single
    /// labeled node.
    fn parse_expression(
        &mut self,
        expression: &'ast Expression,
        current: FlowNodeId,
    ) -> Result<FlowNodeId> {
        match expression {
            Expression::SequenceExpression(sequence) => {
                let mut node = current;
                for operand in &sequence.expressions {
                    node = self.parse_expression(operand, node)?;
                }
                Ok(node)
            }
            Expression::Unknown(unknown) => {
                Err(FlowError::UnsupportedConstruct(unknown.kind.clone()))
            }
            other => Ok(self.ctx.append_to(
                current,
                Some(stringify(other)),
                EdgeKind::Epsilon,
                None,
            )),
        }
    }

    fn parse_variable_declaration(
        &mut self,
        declaration: &'ast VariableDeclaration,
        current: FlowNodeId,
    ) -> FlowNodeId {
        let mut node = current;
        for declarator in &declaration.declarations {
            let label = match &declarator.init {
                Some(init) => format!("{} = {}", declarator.id.name, stringify(init)),
                None => declarator.id.name.clone(),
            };
            node = self
                .ctx
                .append_to(node, Some(label), EdgeKind::Epsilon, None);
        }
        node
    }

    // =========================================================================
    // Branching
    // =========================================================================

    fn parse_if_statement(
        &mut self,
        if_stmt: &'ast IfStatement,
        current: FlowNodeId,
    ) -> Result<Completion> {
        let test = &if_stmt.test;
        let negated = negate_truthiness(test);

        match &if_stmt.alternate {
            None => {
                let then_node =
                    self.ctx
                        .append_conditionally_to(current, stringify(test), test.clone());
                let final_node = self.ctx.append_conditionally_to(
                    current,
                    stringify(&negated),
                    negated,
                );
                if let Completion::Normal(node) =
                    self.parse_statement(&if_stmt.consequent, then_node, None)?
                {
                    self.ctx.append_epsilon_edge(node, final_node);
                }
                Ok(Completion::Normal(final_node))
            }
            Some(alternate) => {
                let then_node =
                    self.ctx
                        .append_conditionally_to(current, stringify(test), test.clone());
                let else_node = self.ctx.append_conditionally_to(
                    current,
                    stringify(&negated),
                    negated,
                );
                let final_node = self.ctx.create_node();

                if let Completion::Normal(node) =
                    self.parse_statement(&if_stmt.consequent, then_node, None)?
                {
                    self.ctx.append_epsilon_edge(node, final_node);
                }
                if let Completion::Normal(node) =
                    self.parse_statement(alternate, else_node, None)?
                {
                    self.ctx.append_epsilon_edge(node, final_node);
                }
                // When both branches are abrupt the final node stays
                // unreached; the passes prune it.
                Ok(Completion::Normal(final_node))
            }
        }
    }

    // =========================================================================
    // Loops
    // =========================================================================

    fn parse_while_statement(
        &mut self,
        while_stmt: &'ast WhileStatement,
        current: FlowNodeId,
        label: Option<&'ast str>,
    ) -> Result<Completion> {
        let test = &while_stmt.test;
        let negated = negate_truthiness(test);
        let loop_body =
            self.ctx
                .append_conditionally_to(current, stringify(test), test.clone());
        let final_node =
            self.ctx
                .append_conditionally_to(current, stringify(&negated), negated);

        self.ctx
            .enclosing_statements
            .push(EnclosingStatement::other(label, final_node, Some(current)));
        let body_completion = self.parse_statement(&while_stmt.body, loop_body, None)?;
        self.ctx.enclosing_statements.pop();

        if let Completion::Normal(node) = body_completion {
            self.ctx.append_epsilon_edge(node, current);
        }
        Ok(Completion::Normal(final_node))
    }

    fn parse_do_while_statement(
        &mut self,
        do_while: &'ast DoWhileStatement,
        current: FlowNodeId,
        label: Option<&'ast str>,
    ) -> Result<Completion> {
        let test_node = self.ctx.create_node();
        let final_node = self.ctx.create_node();

        self.ctx
            .enclosing_statements
            .push(EnclosingStatement::other(label, final_node, Some(test_node)));
        let body_completion = self.parse_statement(&do_while.body, current, None)?;
        self.ctx.enclosing_statements.pop();

        let test = &do_while.test;
        let negated = negate_truthiness(test);
        self.ctx.add_edge(
            test_node,
            current,
            EdgeKind::Conditional,
            Some(stringify(test)),
            Some(test.clone()),
        );
        self.ctx.add_edge(
            test_node,
            final_node,
            EdgeKind::Conditional,
            Some(stringify(&negated)),
            Some(negated),
        );
        if let Completion::Normal(node) = body_completion {
            self.ctx.append_epsilon_edge(node, test_node);
        }
        Ok(Completion::Normal(final_node))
    }

    fn parse_for_statement(
        &mut self,
        for_stmt: &'ast ForStatement,
        current: FlowNodeId,
        label: Option<&'ast str>,
    ) -> Result<Completion> {
        let test_decision_node = match &for_stmt.init {
            Some(ForInit::Declaration(declaration)) => {
                self.parse_variable_declaration(declaration, current)
            }
            Some(ForInit::Expression(expression)) => self.parse_expression(expression, current)?,
            None => current,
        };

        let (begin_body, update_node, final_node) = match &for_stmt.test {
            Some(test) => {
                let negated = negate_truthiness(test);
                let begin_body = self.ctx.append_conditionally_to(
                    test_decision_node,
                    stringify(test),
                    test.clone(),
                );
                let update_node = self.ctx.create_node();
                let final_node = self.ctx.append_conditionally_to(
                    test_decision_node,
                    stringify(&negated),
                    negated,
                );
                (begin_body, update_node, final_node)
            }
            None => {
                // No test: plain fallthrough into the body.
                let begin_body =
                    self.ctx
                        .append_to(test_decision_node, None, EdgeKind::Epsilon, None);
                let update_node = self.ctx.create_node();
                let final_node = self.ctx.create_node();
                (begin_body, update_node, final_node)
            }
        };

        self.ctx.enclosing_statements.push(EnclosingStatement::other(
            label,
            final_node,
            Some(update_node),
        ));
        let body_completion = self.parse_statement(&for_stmt.body, begin_body, None)?;
        self.ctx.enclosing_statements.pop();

        match &for_stmt.update {
            Some(update) => {
                let update_end = self.parse_expression(update, update_node)?;
                self.ctx
                    .append_epsilon_edge(update_end, test_decision_node);
            }
            None => {
                self.ctx
                    .append_epsilon_edge(update_node, test_decision_node);
            }
        }
        if let Completion::Normal(node) = body_completion {
            self.ctx.append_epsilon_edge(node, update_node);
        }
        Ok(Completion::Normal(final_node))
    }

    fn parse_for_in_statement(
        &mut self,
        for_in: &'ast ForInStatement,
        current: FlowNodeId,
        label: Option<&'ast str>,
    ) -> Result<Completion> {
        // The current node doubles as the per-iteration decision point; the
        // guards are opaque synthetic expressions with no explicit iterator.
        let condition_node = current;
        let has_more = Expression::ident("<has more>");
        let done_guard = negate_truthiness(&has_more);

        let matched = self.ctx.append_conditionally_to(
            condition_node,
            "<has more>".to_string(),
            has_more,
        );
        let final_node = self.ctx.append_to(
            condition_node,
            Some("<done>".to_string()),
            EdgeKind::Conditional,
            Some(done_guard),
        );
        let begin_body = self.ctx.append_to(
            matched,
            Some(format!("{} = <next>", for_target_label(&for_in.left))),
            EdgeKind::Epsilon,
            None,
        );

        self.ctx.enclosing_statements.push(EnclosingStatement::other(
            label,
            final_node,
            Some(condition_node),
        ));
        let body_completion = self.parse_statement(&for_in.body, begin_body, None)?;
        self.ctx.enclosing_statements.pop();

        if let Completion::Normal(node) = body_completion {
            self.ctx.append_epsilon_edge(node, condition_node);
        }
        Ok(Completion::Normal(final_node))
    }

    fn parse_for_of_statement(
        &mut self,
        for_of: &'ast ForOfStatement,
        current: FlowNodeId,
        label: Option<&'ast str>,
    ) -> Result<Completion> {
        let iterator = self.ctx.create_temporary_local_variable_name("iter");
        let condition_node = self.ctx.append_to(
            current,
            Some(format!(
                "{} = {}[Symbol.iterator]()",
                iterator,
                stringify(&for_of.right)
            )),
            EdgeKind::Epsilon,
            None,
        );

        // Guards over the synthetic iterator: `!$$iterN.done` / `$$iterN.done`.
        let done = Expression::MemberExpression(MemberExpression {
            object: Box::new(Expression::ident(iterator.clone())),
            property: Box::new(Expression::ident("done")),
            computed: false,
        });
        let has_more = done.negated();
        let done_guard = negate_truthiness(&has_more);

        let matched = self.ctx.append_conditionally_to(
            condition_node,
            stringify(&has_more),
            has_more,
        );
        let final_node = self.ctx.append_to(
            condition_node,
            Some(stringify(&done_guard)),
            EdgeKind::Conditional,
            Some(done_guard),
        );
        let begin_body = self.ctx.append_to(
            matched,
            Some(format!(
                "{} = {}.next().value",
                for_target_label(&for_of.left),
                iterator
            )),
            EdgeKind::Epsilon,
            None,
        );

        self.ctx.enclosing_statements.push(EnclosingStatement::other(
            label,
            final_node,
            Some(condition_node),
        ));
        let body_completion = self.parse_statement(&for_of.body, begin_body, None)?;
        self.ctx.enclosing_statements.pop();

        if let Completion::Normal(node) = body_completion {
            self.ctx.append_epsilon_edge(node, condition_node);
        }
        Ok(Completion::Normal(final_node))
    }

    // =========================================================================
    // Switch
    // =========================================================================

    fn parse_switch_statement(
        &mut self,
        switch: &'ast SwitchStatement,
        current: FlowNodeId,
        label: Option<&'ast str>,
    ) -> Result<Completion> {
        let temp = self.ctx.create_temporary_local_variable_name("temp");
        let evaluated = self.ctx.append_to(
            current,
            Some(format!("{} = {}", temp, stringify(&switch.discriminant))),
            EdgeKind::Epsilon,
            None,
        );
        let final_node = self.ctx.create_node();

        self.ctx
            .enclosing_statements
            .push(EnclosingStatement::other(label, final_node, None));

        let default_index = switch.cases.iter().position(|case| case.test.is_none());
        let mut still_searching = evaluated;
        let mut prev_case_end: Option<Completion> = None;
        let mut first_after_default: Option<FlowNodeId> = None;

        for (index, case) in switch.cases.iter().enumerate() {
            let Some(test) = &case.test else {
                continue;
            };
            let eq = Expression::BinaryExpression(BinaryExpression {
                operator: BinaryOperator::StrictEqual,
                left: Box::new(Expression::ident(temp.clone())),
                right: Box::new(test.clone()),
            });
            let neq = negate_truthiness(&eq);

            let begin_body =
                self.ctx
                    .append_conditionally_to(still_searching, stringify(&eq), eq);
            if let Some(default_index) = default_index
                && index > default_index
                && first_after_default.is_none()
            {
                first_after_default = Some(begin_body);
            }
            if let Some(Completion::Normal(node)) = prev_case_end {
                // Fall-through from the previous case body.
                self.ctx.append_epsilon_edge(node, begin_body);
            }
            prev_case_end = Some(self.parse_statements(&case.consequent, begin_body)?);

            still_searching = self.ctx.append_to(
                still_searching,
                Some(stringify(&neq)),
                EdgeKind::Conditional,
                Some(neq),
            );
        }

        if let Some(Completion::Normal(node)) = prev_case_end {
            self.ctx.append_epsilon_edge(node, final_node);
        }

        match default_index {
            Some(default_index) => {
                let completion =
                    self.parse_statements(&switch.cases[default_index].consequent, still_searching)?;
                if let Completion::Normal(node) = completion {
                    match first_after_default {
                        Some(target) => {
                            self.ctx.append_epsilon_edge(node, target);
                        }
                        None => {
                            self.ctx.append_epsilon_edge(node, final_node);
                        }
                    }
                }
            }
            None => {
                // No default: an unmatched discriminant falls through.
                self.ctx.append_epsilon_edge(still_searching, final_node);
            }
        }

        self.ctx.enclosing_statements.pop();
        Ok(Completion::Normal(final_node))
    }

    // =========================================================================
    // Labels and jumps
    // =========================================================================

    fn parse_labeled_statement(
        &mut self,
        labeled: &'ast LabeledStatement,
        current: FlowNodeId,
    ) -> Result<Completion> {
        let name = labeled.label.name.as_str();
        match labeled.body.as_ref() {
            // Constructs that natively support labels get the label forwarded.
            Statement::WhileStatement(_)
            | Statement::DoWhileStatement(_)
            | Statement::ForStatement(_)
            | Statement::ForInStatement(_)
            | Statement::ForOfStatement(_)
            | Statement::SwitchStatement(_) => {
                self.parse_statement(&labeled.body, current, Some(name))
            }
            // Bodies that can contain a labeled break get a break frame.
            Statement::BlockStatement(_)
            | Statement::IfStatement(_)
            | Statement::TryStatement(_)
            | Statement::WithStatement(_)
            | Statement::LabeledStatement(_) => {
                let final_node = self.ctx.create_node();
                self.ctx
                    .enclosing_statements
                    .push(EnclosingStatement::other(Some(name), final_node, None));
                let completion = self.parse_statement(&labeled.body, current, None)?;
                self.ctx.enclosing_statements.pop();
                if let Completion::Normal(node) = completion {
                    self.ctx.append_epsilon_edge(node, final_node);
                }
                Ok(Completion::Normal(final_node))
            }
            // Everywhere else the label is ineffective.
            _ => self.parse_statement(&labeled.body, current, None),
        }
    }

    fn parse_break_statement(
        &mut self,
        break_stmt: &'ast BreakStatement,
        current: FlowNodeId,
    ) -> Result<Completion> {
        let frames = &self.ctx.enclosing_statements;
        let target_index = match &break_stmt.label {
            Some(label) => frames
                .iter()
                .rposition(|frame| frame.label == Some(label.name.as_str())),
            None => frames.iter().rposition(|frame| !frame.is_try()),
        };
        let Some(target_index) = target_index else {
            return Err(FlowError::IllegalJumpTarget(match &break_stmt.label {
                Some(label) => format!("no enclosing statement labeled '{}'", label.name),
                None => "break outside of a breakable statement".to_string(),
            }));
        };
        let Some(break_target) = frames[target_index].break_target else {
            return Err(FlowError::IllegalJumpTarget(
                "break target is not breakable".to_string(),
            ));
        };

        let node = match self.replay_finalizers(target_index + 1, current)? {
            Completion::Normal(node) => node,
            abrupt => return Ok(abrupt),
        };
        self.ctx.add_edge(
            node,
            break_target,
            EdgeKind::AbruptCompletion,
            Some("break".to_string()),
            None,
        );
        Ok(Completion::Break)
    }

    fn parse_continue_statement(
        &mut self,
        continue_stmt: &'ast ContinueStatement,
        current: FlowNodeId,
    ) -> Result<Completion> {
        let frames = &self.ctx.enclosing_statements;
        let (target_index, continue_target) = match &continue_stmt.label {
            Some(label) => {
                let Some(index) = frames
                    .iter()
                    .rposition(|frame| frame.label == Some(label.name.as_str()))
                else {
                    return Err(FlowError::IllegalJumpTarget(format!(
                        "no enclosing statement labeled '{}'",
                        label.name
                    )));
                };
                let Some(target) = frames[index].continue_target else {
                    return Err(FlowError::IllegalJumpTarget(format!(
                        "label '{}' does not mark an iteration statement",
                        label.name
                    )));
                };
                (index, target)
            }
            None => {
                let Some(index) = frames
                    .iter()
                    .rposition(|frame| !frame.is_try() && frame.continue_target.is_some())
                else {
                    return Err(FlowError::IllegalJumpTarget(
                        "continue outside of an iteration statement".to_string(),
                    ));
                };
                match frames[index].continue_target {
                    Some(target) => (index, target),
                    None => {
                        return Err(FlowError::IllegalJumpTarget(
                            "continue outside of an iteration statement".to_string(),
                        ));
                    }
                }
            }
        };

        let node = match self.replay_finalizers(target_index + 1, current)? {
            Completion::Normal(node) => node,
            abrupt => return Ok(abrupt),
        };
        self.ctx.add_edge(
            node,
            continue_target,
            EdgeKind::AbruptCompletion,
            Some("continue".to_string()),
            None,
        );
        Ok(Completion::Continue)
    }

    // =========================================================================
    // Return, throw, try
    // =========================================================================

    fn parse_return_statement(
        &mut self,
        return_stmt: &'ast ReturnStatement,
        current: FlowNodeId,
    ) -> Result<Completion> {
        let node = match self.replay_finalizers(0, current)? {
            Completion::Normal(node) => node,
            abrupt => return Ok(abrupt),
        };
        let (label, ast_ref) = match &return_stmt.argument {
            Some(argument) => (format!("return {}", stringify(argument)), argument.clone()),
            None => (
                "return undefined".to_string(),
                Expression::ident("undefined"),
            ),
        };
        let success_exit = self.ctx.current_graph.success_exit;
        self.ctx.add_edge(
            node,
            success_exit,
            EdgeKind::AbruptCompletion,
            Some(label),
            Some(ast_ref),
        );
        Ok(Completion::Return)
    }

    fn parse_throw_statement(
        &mut self,
        throw_stmt: &'ast ThrowStatement,
        current: FlowNodeId,
    ) -> Result<Completion> {
        let mut node = current;
        for index in (0..self.ctx.enclosing_statements.len()).rev() {
            let Some((handler_route, replay)) = self.throw_route_at(index) else {
                continue;
            };
            if let Some((param, handler_body_entry)) = handler_route {
                let assign = self.ctx.append_to(
                    node,
                    Some(format!("{} = {}", param, stringify(&throw_stmt.argument))),
                    EdgeKind::Epsilon,
                    None,
                );
                self.ctx.append_epsilon_edge(assign, handler_body_entry);
                return Ok(Completion::Throw);
            }
            if replay {
                node = match self.replay_finalizer_at(index, node)? {
                    Completion::Normal(node) => node,
                    abrupt => return Ok(abrupt),
                };
            }
        }

        let error_exit = self.ctx.current_graph.error_exit;
        self.ctx.add_edge(
            node,
            error_exit,
            EdgeKind::AbruptCompletion,
            Some(format!("throw {}", stringify(&throw_stmt.argument))),
            Some(throw_stmt.argument.clone()),
        );
        Ok(Completion::Throw)
    }

    /// Inspect frame `index` for throw routing: either a live handler to
    /// divert into, or a finalizer that must be replayed before continuing
    /// outward. `None` for non-try frames.
    #[allow(clippy::type_complexity)]
    fn throw_route_at(&self, index: usize) -> Option<(Option<(String, FlowNodeId)>, bool)> {
        let frame = self.ctx.enclosing_statements[index].try_frame.as_ref()?;
        if frame.in_try_block
            && let (Some(handler), Some(entry)) = (frame.handler, frame.handler_body_entry)
        {
            return Some((Some((handler.param.name.clone(), entry)), false));
        }
        Some((None, frame.finalizer.is_some() && !frame.in_finalizer))
    }

    fn parse_try_statement(
        &mut self,
        try_stmt: &'ast TryStatement,
        current: FlowNodeId,
    ) -> Result<Completion> {
        let handler_body_entry = try_stmt.handler.as_ref().map(|_| self.ctx.create_node());

        self.ctx
            .enclosing_statements
            .push(EnclosingStatement::try_statement(TryFrame {
                handler: try_stmt.handler.as_ref(),
                handler_body_entry,
                finalizer: try_stmt.finalizer.as_ref(),
                in_try_block: false,
                in_finalizer: false,
            }));
        let frame_index = self.ctx.enclosing_statements.len() - 1;

        self.set_in_try_block(frame_index, true);
        let try_completion = self.parse_statements(&try_stmt.block.body, current)?;
        self.set_in_try_block(frame_index, false);

        let handler_completion = match (&try_stmt.handler, handler_body_entry) {
            (Some(handler), Some(entry)) => Some(self.parse_statements(&handler.body.body, entry)?),
            _ => None,
        };

        self.ctx.enclosing_statements.pop();

        match (handler_completion, &try_stmt.finalizer) {
            // try/catch
            (Some(handler_completion), None) => {
                let final_node = self.ctx.create_node();
                if let Completion::Normal(node) = try_completion {
                    self.ctx.append_epsilon_edge(node, final_node);
                }
                if let Completion::Normal(node) = handler_completion {
                    self.ctx.append_epsilon_edge(node, final_node);
                }
                Ok(Completion::Normal(final_node))
            }

            // try/finally: an abrupt try block already replayed the
            // finalizer at its exit site.
            (None, Some(finalizer)) => match try_completion {
                Completion::Normal(node) => match self.parse_finalizer(finalizer, node)? {
                    Completion::Normal(end) => {
                        let final_node =
                            self.ctx.append_to(end, None, EdgeKind::Epsilon, None);
                        Ok(Completion::Normal(final_node))
                    }
                    abrupt => Ok(abrupt),
                },
                abrupt => Ok(abrupt),
            },

            // try/catch/finally
            (Some(handler_completion), Some(finalizer)) => {
                let mut merged = Vec::new();
                let mut abrupt = None;
                if let Completion::Normal(node) = try_completion {
                    match self.parse_finalizer(finalizer, node)? {
                        Completion::Normal(end) => merged.push(end),
                        other => abrupt = Some(other),
                    }
                }
                if let Completion::Normal(node) = handler_completion {
                    match self.parse_finalizer(finalizer, node)? {
                        Completion::Normal(end) => merged.push(end),
                        other => {
                            if abrupt.is_none() {
                                abrupt = Some(other);
                            }
                        }
                    }
                }
                if merged.is_empty()
                    && let Some(abrupt) = abrupt
                {
                    return Ok(abrupt);
                }
                let final_node = self.ctx.create_node();
                for end in merged {
                    self.ctx.append_epsilon_edge(end, final_node);
                }
                Ok(Completion::Normal(final_node))
            }

            // A bare try block; nothing to route through.
            (None, None) => Ok(try_completion),
        }
    }

    /// Replay the finalizers of every try frame at stack index
    /// `lowest_frame` or above, innermost first. Returns `Normal` at the
    /// node where the last finalizer fell through, or the first abrupt
    /// completion produced by a finalizer body.
    fn replay_finalizers(
        &mut self,
        lowest_frame: usize,
        mut current: FlowNodeId,
    ) -> Result<Completion> {
        for index in (lowest_frame..self.ctx.enclosing_statements.len()).rev() {
            current = match self.replay_finalizer_at(index, current)? {
                Completion::Normal(node) => node,
                abrupt => return Ok(abrupt),
            };
        }
        Ok(Completion::Normal(current))
    }

    fn replay_finalizer_at(&mut self, index: usize, current: FlowNodeId) -> Result<Completion> {
        let (finalizer, was_in_try_block) = match &self.ctx.enclosing_statements[index].try_frame {
            Some(frame) if !frame.in_finalizer => (frame.finalizer, frame.in_try_block),
            _ => (None, false),
        };
        let Some(finalizer) = finalizer else {
            return Ok(Completion::Normal(current));
        };

        // While the finalizer runs, the frame is neither re-enterable nor a
        // catch target: a throw inside a `finally` is not caught by the same
        // try's handler.
        self.set_in_finalizer(index, true);
        self.set_in_try_block(index, false);
        let completion = self.parse_finalizer(finalizer, current);
        self.set_in_try_block(index, was_in_try_block);
        self.set_in_finalizer(index, false);
        completion
    }

    /// Parse a fresh copy of a `finally` block: a new entry node linked from
    /// `current`, with the block translated into it. Every replay site gets
    /// its own subgraph.
    fn parse_finalizer(
        &mut self,
        finalizer: &'ast BlockStatement,
        current: FlowNodeId,
    ) -> Result<Completion> {
        let body_entry = self.ctx.create_node();
        self.ctx.append_epsilon_edge(current, body_entry);
        self.parse_statements(&finalizer.body, body_entry)
    }

    fn set_in_try_block(&mut self, index: usize, value: bool) {
        if let Some(frame) = &mut self.ctx.enclosing_statements[index].try_frame {
            frame.in_try_block = value;
        }
    }

    fn set_in_finalizer(&mut self, index: usize, value: bool) {
        if let Some(frame) = &mut self.ctx.enclosing_statements[index].try_frame {
            frame.in_finalizer = value;
        }
    }

    // =========================================================================
    // With, functions
    // =========================================================================

    fn parse_with_statement(
        &mut self,
        with_stmt: &'ast WithStatement,
        current: FlowNodeId,
    ) -> Result<Completion> {
        let node = self.ctx.append_to(
            current,
            Some(stringify(&with_stmt.object)),
            EdgeKind::Epsilon,
            None,
        );
        self.parse_statement(&with_stmt.body, node, None)
    }

    fn parse_function_declaration(
        &mut self,
        function: &'ast FunctionDeclaration,
        current: FlowNodeId,
    ) -> Result<Completion> {
        let _span = span!(Level::DEBUG, "parse_function", name = %function.id.name).entered();

        let function_id = self.ctx.create_function_id();
        let saved = self.ctx.enter_function();

        let entry = self.ctx.current_graph.entry;
        let completion = self.parse_statements(&function.body.body, entry)?;
        if let Completion::Normal(node) = completion {
            let success_exit = self.ctx.current_graph.success_exit;
            self.ctx.add_edge(
                node,
                success_exit,
                EdgeKind::AbruptCompletion,
                Some("return undefined".to_string()),
                Some(Expression::ident("undefined")),
            );
        }

        let flow_graph = self.ctx.exit_function(saved);
        self.ctx.functions.push(FlowFunction {
            id: function_id,
            name: function.id.name.clone(),
            flow_graph,
        });

        // Declarations do not advance flow in the outer graph.
        Ok(Completion::Normal(current))
    }
}

/// Display name of the loop variable of a `for-in`/`for-of` left side.
fn for_target_label(left: &ForInit) -> String {
    match left {
        ForInit::Declaration(declaration) => declaration
            .declarations
            .first()
            .map(|declarator| declarator.id.name.clone())
            .unwrap_or_default(),
        ForInit::Expression(expression) => stringify(expression),
    }
}
