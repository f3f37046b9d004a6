//! Rules that match a shape spanning several nodes, rather than a single
//! call or member access.
use qmsql_ast::{BinOp, Expr, ExprKind, Literal, Ty};

use super::{FragmentTranslator, Translate};
use crate::ir::rel::{CompareOp, SqlExpr};
use crate::Result;

type Rule = fn(&Expr, &mut dyn Translate) -> Result<Option<SqlExpr>>;

pub(super) fn translators() -> Vec<FragmentTranslator> {
    let rules: [Rule; 2] = [compare, concat];
    rules
        .into_iter()
        .map(|rule| Box::new(rule) as FragmentTranslator)
        .collect()
}

/// `string.Compare(a, b) <op> k` and `a.CompareTo(b) <op> k`, for a constant
/// `k` in {-1, 0, 1}, become a direct comparison of `a` and `b`.
fn compare(expr: &Expr, translator: &mut dyn Translate) -> Result<Option<SqlExpr>> {
    let ExprKind::Binary { op, left, right } = &expr.kind else {
        return Ok(None);
    };
    let Some(op) = compare_op(*op) else {
        return Ok(None);
    };

    // with the constant on the left, mirror so that it reads `call <op> k`
    let (call, constant, op) = match (left.as_integer_constant(), right.as_integer_constant()) {
        (None, Some(k)) => (left, k, op),
        (Some(k), None) => (right, k, op.mirror()),
        _ => return Ok(None),
    };

    let Some((a, b)) = compare_operands(call) else {
        return Ok(None);
    };
    let Some(op) = rewrite_op(op, constant) else {
        return Ok(None);
    };

    let (Some(a), Some(b)) = (translator.translate(a)?, translator.translate(b)?) else {
        return Ok(None);
    };
    Ok(Some(SqlExpr::StringCompare {
        op,
        left: Box::new(a),
        right: Box::new(b),
    }))
}

fn compare_op(op: BinOp) -> Option<CompareOp> {
    Some(match op {
        BinOp::Equal => CompareOp::Eq,
        BinOp::NotEqual => CompareOp::Ne,
        BinOp::LessThan => CompareOp::Lt,
        BinOp::LessThanOrEqual => CompareOp::Lte,
        BinOp::GreaterThan => CompareOp::Gt,
        BinOp::GreaterThanOrEqual => CompareOp::Gte,
        _ => return None,
    })
}

fn compare_operands(call: &Expr) -> Option<(&Expr, &Expr)> {
    let ExprKind::MethodCall {
        target,
        method,
        args,
    } = &call.strip_convert().kind
    else {
        return None;
    };
    if method.declaring_type != "string" {
        return None;
    }
    match (method.name.as_str(), target, args.as_slice()) {
        ("Compare", None, [a, b]) => Some((a, b)),
        ("CompareTo", Some(a), [b]) => Some((a, b)),
        _ => None,
    }
}

/// The comparison of `a` and `b` equivalent to `Compare(a, b) <op> constant`.
fn rewrite_op(op: CompareOp, constant: i64) -> Option<CompareOp> {
    use CompareOp::*;
    Some(match (constant, op) {
        (0, op) => op,

        (1, Eq) => Gt,
        (1, Ne) => Lte,
        (1, Lt) => Lte,
        (1, Gte) => Gt,

        (-1, Eq) => Lt,
        (-1, Ne) => Gte,
        (-1, Gt) => Gte,
        (-1, Lte) => Lt,

        _ => return None,
    })
}

/// `a + b` where the result is a string. Operands that are not strings are
/// cast to string; a `null` constant stays `NULL` inside the cast.
fn concat(expr: &Expr, translator: &mut dyn Translate) -> Result<Option<SqlExpr>> {
    let ExprKind::Binary {
        op: BinOp::Add,
        left,
        right,
    } = &expr.kind
    else {
        return Ok(None);
    };
    if !expr.ty.is_string() {
        return Ok(None);
    }

    let (Some(left), Some(right)) = (
        concat_operand(left, translator)?,
        concat_operand(right, translator)?,
    ) else {
        return Ok(None);
    };
    Ok(Some(SqlExpr::function("CONCAT", vec![left, right])))
}

fn concat_operand(operand: &Expr, translator: &mut dyn Translate) -> Result<Option<SqlExpr>> {
    if operand.ty.is_string() {
        return translator.translate(operand);
    }

    let inner = operand.strip_convert();
    let sql = if inner.is_null_constant() {
        Some(SqlExpr::Literal(Literal::Null))
    } else {
        translator.translate(inner)?
    };
    Ok(sql.map(|sql| sql.cast(Ty::String)))
}
