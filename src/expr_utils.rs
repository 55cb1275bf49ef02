//! Expression utilities: display stringification and truthiness transforms.
//!
//! `stringify` produces the human-readable labels attached to edges. The
//! output is display-only; no consumer parses it back, but parenthesization
//! follows standard precedence so the labels are unambiguous to read.
//!
//! `negate_truthiness` builds the complementary guard for conditional edge
//! pairs, and `static_truthiness` evaluates guards whose truthiness is
//! statically known (used by the constant-conditional pass).

use crate::ast::{
    Expression, LiteralValue, PropertyKind, UnaryExpression, UnaryOperator,
};

// Precedence levels, loosely the ECMAScript operator table.
const PREC_SEQUENCE: u8 = 1;
const PREC_ASSIGNMENT: u8 = 2;
const PREC_CONDITIONAL: u8 = 3;
const PREC_LOGICAL_OR: u8 = 4;
const PREC_LOGICAL_AND: u8 = 5;
const PREC_BITWISE_OR: u8 = 6;
const PREC_BITWISE_XOR: u8 = 7;
const PREC_BITWISE_AND: u8 = 8;
const PREC_EQUALITY: u8 = 9;
const PREC_RELATIONAL: u8 = 10;
const PREC_SHIFT: u8 = 11;
const PREC_ADDITIVE: u8 = 12;
const PREC_MULTIPLICATIVE: u8 = 13;
const PREC_UNARY: u8 = 14;
const PREC_POSTFIX: u8 = 15;
const PREC_CALL: u8 = 17;
const PREC_MEMBER: u8 = 18;
const PREC_PRIMARY: u8 = 20;

/// Render an expression as a display label.
pub fn stringify(expr: &Expression) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr, 0);
    out
}

/// Return an expression whose truthiness is the complement of `expr`:
/// strip a prefix `!`, flip a symmetric comparison operator, or wrap in `!`.
pub fn negate_truthiness(expr: &Expression) -> Expression {
    match expr {
        Expression::UnaryExpression(unary)
            if unary.operator == UnaryOperator::Not && unary.prefix =>
        {
            (*unary.argument).clone()
        }
        Expression::BinaryExpression(binary) => match binary.operator.negated_comparison() {
            Some(flipped) => {
                let mut negated = binary.clone();
                negated.operator = flipped;
                Expression::BinaryExpression(negated)
            }
            None => expr.clone().negated(),
        },
        _ => expr.clone().negated(),
    }
}

/// Statically evaluate the truthiness of a constant-literal guard.
///
/// Covers literals and (possibly stacked) prefix negations of literals, which
/// is exactly the shape `negate_truthiness` produces for literal guards.
pub fn static_truthiness(expr: &Expression) -> Option<bool> {
    match expr {
        Expression::Literal(literal) => Some(match &literal.value {
            LiteralValue::Null => false,
            LiteralValue::Boolean(value) => *value,
            LiteralValue::Number(value) => *value != 0.0 && !value.is_nan(),
            LiteralValue::String(value) => !value.is_empty(),
        }),
        Expression::UnaryExpression(unary)
            if unary.operator == UnaryOperator::Not && unary.prefix =>
        {
            static_truthiness(&unary.argument).map(|truthy| !truthy)
        }
        _ => None,
    }
}

fn precedence(expr: &Expression) -> u8 {
    match expr {
        Expression::Identifier(_)
        | Expression::Literal(_)
        | Expression::ArrayExpression(_)
        | Expression::ObjectExpression(_)
        | Expression::FunctionExpression(_)
        | Expression::Unknown(_) => PREC_PRIMARY,
        Expression::MemberExpression(_) | Expression::NewExpression(_) => PREC_MEMBER,
        Expression::CallExpression(_) => PREC_CALL,
        Expression::UpdateExpression(update) => {
            if update.prefix {
                PREC_UNARY
            } else {
                PREC_POSTFIX
            }
        }
        Expression::UnaryExpression(_) => PREC_UNARY,
        Expression::BinaryExpression(binary) => binary_precedence(binary.operator),
        Expression::LogicalExpression(logical) => match logical.operator {
            crate::ast::LogicalOperator::And => PREC_LOGICAL_AND,
            crate::ast::LogicalOperator::Or => PREC_LOGICAL_OR,
        },
        Expression::ConditionalExpression(_) => PREC_CONDITIONAL,
        Expression::AssignmentExpression(_) => PREC_ASSIGNMENT,
        Expression::SequenceExpression(_) => PREC_SEQUENCE,
    }
}

fn binary_precedence(op: crate::ast::BinaryOperator) -> u8 {
    use crate::ast::BinaryOperator::*;
    match op {
        BitwiseOr => PREC_BITWISE_OR,
        BitwiseXor => PREC_BITWISE_XOR,
        BitwiseAnd => PREC_BITWISE_AND,
        Equal | NotEqual | StrictEqual | StrictNotEqual => PREC_EQUALITY,
        LessThan | LessThanOrEqual | GreaterThan | GreaterThanOrEqual | In | Instanceof => {
            PREC_RELATIONAL
        }
        LeftShift | RightShift | UnsignedRightShift => PREC_SHIFT,
        Add | Subtract => PREC_ADDITIVE,
        Multiply | Divide | Remainder => PREC_MULTIPLICATIVE,
    }
}

fn write_expr(out: &mut String, expr: &Expression, min_prec: u8) {
    if precedence(expr) < min_prec {
        out.push('(');
        write_inner(out, expr);
        out.push(')');
    } else {
        write_inner(out, expr);
    }
}

fn write_inner(out: &mut String, expr: &Expression) {
    match expr {
        Expression::Identifier(identifier) => out.push_str(&identifier.name),
        Expression::Literal(literal) => match &literal.raw {
            Some(raw) => out.push_str(raw),
            None => write_literal_value(out, &literal.value),
        },
        Expression::UnaryExpression(unary) => write_unary(out, unary),
        Expression::BinaryExpression(binary) => {
            let prec = binary_precedence(binary.operator);
            write_expr(out, &binary.left, prec);
            out.push(' ');
            out.push_str(binary.operator.as_str());
            out.push(' ');
            write_expr(out, &binary.right, prec + 1);
        }
        Expression::LogicalExpression(logical) => {
            let prec = precedence(expr);
            write_expr(out, &logical.left, prec);
            out.push(' ');
            out.push_str(logical.operator.as_str());
            out.push(' ');
            write_expr(out, &logical.right, prec + 1);
        }
        Expression::AssignmentExpression(assignment) => {
            write_expr(out, &assignment.left, PREC_POSTFIX);
            out.push(' ');
            out.push_str(assignment.operator.as_str());
            out.push(' ');
            write_expr(out, &assignment.right, PREC_ASSIGNMENT);
        }
        Expression::UpdateExpression(update) => {
            if update.prefix {
                out.push_str(update.operator.as_str());
                write_expr(out, &update.argument, PREC_UNARY);
            } else {
                write_expr(out, &update.argument, PREC_POSTFIX);
                out.push_str(update.operator.as_str());
            }
        }
        Expression::MemberExpression(member) => {
            write_expr(out, &member.object, PREC_CALL);
            if member.computed {
                out.push('[');
                write_expr(out, &member.property, 0);
                out.push(']');
            } else {
                out.push('.');
                match member.property.as_ref() {
                    Expression::Identifier(identifier) => out.push_str(&identifier.name),
                    property => write_expr(out, property, PREC_PRIMARY),
                }
            }
        }
        Expression::CallExpression(call) => {
            write_expr(out, &call.callee, PREC_CALL);
            out.push('(');
            write_arguments(out, &call.arguments);
            out.push(')');
        }
        Expression::NewExpression(new_expr) => {
            out.push_str("new ");
            write_expr(out, &new_expr.callee, PREC_MEMBER);
            out.push('(');
            write_arguments(out, &new_expr.arguments);
            out.push(')');
        }
        Expression::ConditionalExpression(conditional) => {
            write_expr(out, &conditional.test, PREC_CONDITIONAL + 1);
            out.push_str(" ? ");
            write_expr(out, &conditional.consequent, PREC_ASSIGNMENT);
            out.push_str(" : ");
            write_expr(out, &conditional.alternate, PREC_ASSIGNMENT);
        }
        Expression::SequenceExpression(sequence) => {
            for (i, operand) in sequence.expressions.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, operand, PREC_ASSIGNMENT);
            }
        }
        Expression::ArrayExpression(array) => {
            out.push('[');
            for (i, element) in array.elements.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                if let Some(element) = element {
                    write_expr(out, element, PREC_ASSIGNMENT);
                }
            }
            out.push(']');
        }
        Expression::ObjectExpression(object) => {
            if object.properties.is_empty() {
                out.push_str("{}");
                return;
            }
            out.push_str("{ ");
            for (i, property) in object.properties.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                match property.kind {
                    PropertyKind::Get => out.push_str("get "),
                    PropertyKind::Set => out.push_str("set "),
                    PropertyKind::Init => {}
                }
                if property.computed {
                    out.push('[');
                    write_expr(out, &property.key, 0);
                    out.push(']');
                } else {
                    write_expr(out, &property.key, PREC_PRIMARY);
                }
                if property.kind != PropertyKind::Init {
                    out.push_str("() { ... }");
                } else if !property.shorthand {
                    out.push_str(": ");
                    write_expr(out, &property.value, PREC_ASSIGNMENT);
                }
            }
            out.push_str(" }");
        }
        Expression::FunctionExpression(function) => {
            out.push_str("function ");
            if let Some(id) = &function.id {
                out.push_str(&id.name);
            }
            out.push('(');
            for (i, param) in function.params.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&param.name);
            }
            out.push_str(") { ... }");
        }
        Expression::Unknown(unknown) => {
            out.push('<');
            out.push_str(&unknown.kind);
            out.push('>');
        }
    }
}

fn write_unary(out: &mut String, unary: &UnaryExpression) {
    if !unary.prefix {
        write_expr(out, &unary.argument, PREC_POSTFIX);
        out.push_str(unary.operator.as_str());
        return;
    }

    out.push_str(unary.operator.as_str());
    if unary.operator.is_word() {
        out.push(' ');
    }

    let mut rendered = String::new();
    write_expr(&mut rendered, &unary.argument, PREC_UNARY);

    // `- -a` must not fuse into `--a`.
    let sign_collision = matches!(unary.operator, UnaryOperator::Minus | UnaryOperator::Plus)
        && rendered.starts_with(unary.operator.as_str());
    if sign_collision {
        out.push('(');
        out.push_str(&rendered);
        out.push(')');
    } else {
        out.push_str(&rendered);
    }
}

fn write_arguments(out: &mut String, arguments: &[Expression]) {
    for (i, argument) in arguments.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_expr(out, argument, PREC_ASSIGNMENT);
    }
}

fn write_literal_value(out: &mut String, value: &LiteralValue) {
    match value {
        LiteralValue::Null => out.push_str("null"),
        LiteralValue::Boolean(true) => out.push_str("true"),
        LiteralValue::Boolean(false) => out.push_str("false"),
        LiteralValue::Number(number) => {
            if number.is_nan() {
                out.push_str("NaN");
            } else if number.is_infinite() {
                out.push_str(if *number > 0.0 { "Infinity" } else { "-Infinity" });
            } else if number.fract() == 0.0 && number.abs() < 1e15 {
                out.push_str(&format!("{}", *number as i64));
            } else {
                out.push_str(&format!("{number}"));
            }
        }
        LiteralValue::String(string) => {
            out.push('"');
            for ch in string.chars() {
                match ch {
                    '"' => out.push_str("\\\""),
                    '\\' => out.push_str("\\\\"),
                    '\n' => out.push_str("\\n"),
                    other => out.push(other),
                }
            }
            out.push('"');
        }
    }
}
