use qmsql_ast::{ExprKind, Literal, Ty, WithErrorInfo};

use super::{operand_sql, Diagnostics, MethodCall, MethodCallTranslator};
use crate::ir::rel::{SqlBinOp, SqlExpr};
use crate::Error;

type Rule = fn(&MethodCall, &mut Diagnostics) -> Option<SqlExpr>;

pub(super) fn translators() -> Vec<MethodCallTranslator> {
    let rules: [Rule; 6] = [
        has_flag,
        equals,
        get_value_or_default,
        like,
        string_method,
        math,
    ];
    rules
        .into_iter()
        .map(|rule| Box::new(rule) as MethodCallTranslator)
        .collect()
}

/// `x.HasFlag(y)` becomes `(x & y) = y`, over the underlying type.
fn has_flag(call: &MethodCall, _: &mut Diagnostics) -> Option<SqlExpr> {
    if call.method.is_static || call.method.name != "HasFlag" {
        return None;
    }
    let target = call.target.as_ref()?;
    let [flag] = call.args.as_slice() else {
        return None;
    };

    let target_ty = target.node.ty.unwrap_nullable();
    if target_ty != flag.underlying_ty() {
        return None;
    }
    let underlying = target_ty.unwrap_enum().clone();

    let value = target.sql.clone()?.convert(underlying.clone());
    let flag = flag.sql.clone()?.convert(underlying);
    Some(SqlExpr::binary(
        SqlBinOp::Eq,
        SqlExpr::binary(SqlBinOp::BitAnd, value, flag.clone()),
        flag,
    ))
}

/// `a.Equals(b)` and `Equals(a, b)`.
///
/// Operands of the same type compare with `=`. When they differ and the
/// declared parameter is `object`, the host comparison can never succeed, so
/// the call becomes the constant `false` and a warning is recorded.
fn equals(call: &MethodCall, diagnostics: &mut Diagnostics) -> Option<SqlExpr> {
    if call.method.name != "Equals" {
        return None;
    }
    let (left, right, declared) = match (&call.target, call.args.as_slice()) {
        (Some(target), [arg]) if !call.method.is_static => {
            (target, arg, call.method.params.first())
        }
        (None, [left, right]) if call.method.is_static => {
            (left, right, call.method.params.get(1))
        }
        _ => return None,
    };

    let left_node = left.node.strip_boxing();
    let right_node = right.node.strip_boxing();

    if left_node.ty.unwrap_nullable() == right_node.ty.unwrap_nullable() {
        let left = left.sql.clone()?.strip_convert();
        let right = right.sql.clone()?.strip_convert();
        return Some(SqlExpr::binary(SqlBinOp::Eq, left, right));
    }

    if declared == Some(&Ty::Object) {
        let warning = Error::new_warning(format!(
            "possible unintended use of method Equals(object) for arguments of different types: \
             `{left_node}`, `{right_node}`; this comparison will always return 'false'"
        ))
        .with_code("W0001");
        diagnostics.push(warning);
        return Some(SqlExpr::boolean(false));
    }
    None
}

/// `x.GetValueOrDefault()` and `x.GetValueOrDefault(d)` over numeric values.
fn get_value_or_default(call: &MethodCall, _: &mut Diagnostics) -> Option<SqlExpr> {
    if call.method.is_static
        || call.method.name != "GetValueOrDefault"
        || !call.node.ty.is_numeric()
    {
        return None;
    }
    let value = call.target.as_ref()?.sql.clone()?;

    let default = match call.args.as_slice() {
        [] => match call.node.ty.unwrap_nullable() {
            Ty::Float64 | Ty::Decimal => SqlExpr::Literal(Literal::Float(0.0)),
            _ => SqlExpr::int(0),
        },
        [default] => default.sql.clone()?,
        _ => return None,
    };
    Some(SqlExpr::function("COALESCE", vec![value, default]))
}

/// `DbFunctions.Like(match, pattern[, escape])`.
fn like(call: &MethodCall, _: &mut Diagnostics) -> Option<SqlExpr> {
    if !call.method.is_static || !call.method.is("DbFunctions", "Like") {
        return None;
    }
    let mut operands = operand_sql(call)?.into_iter();
    let (matched, pattern) = (operands.next()?, operands.next()?);
    let escape = operands.next().map(Box::new);
    if operands.next().is_some() {
        return None;
    }

    Some(SqlExpr::Like {
        matched: Box::new(matched),
        pattern: Box::new(pattern),
        escape,
    })
}

fn string_method(call: &MethodCall, _: &mut Diagnostics) -> Option<SqlExpr> {
    if call.method.declaring_type != "string" {
        return None;
    }

    if call.method.is_static {
        return match (call.method.name.as_str(), operand_sql(call)?.as_slice()) {
            ("IsNullOrEmpty", [value]) => Some(SqlExpr::or(
                SqlExpr::IsNull {
                    operand: Box::new(value.clone()),
                    negated: false,
                },
                SqlExpr::binary(SqlBinOp::Eq, value.clone(), SqlExpr::Literal("".into())),
            )),
            _ => None,
        };
    }

    let operands = operand_sql(call)?;
    let name = call.method.name.as_str();
    match (name, operands.as_slice()) {
        ("StartsWith" | "EndsWith" | "Contains", [value, _]) => {
            let (prefix, suffix) = match name {
                "StartsWith" => ("", "%"),
                "EndsWith" => ("%", ""),
                _ => ("%", "%"),
            };
            let pattern_node = call.args.first()?.node.strip_convert();
            Some(like_pattern(value.clone(), pattern_node, &operands[1], prefix, suffix))
        }
        ("ToUpper", [value]) => Some(SqlExpr::function("UPPER", vec![value.clone()])),
        ("ToLower", [value]) => Some(SqlExpr::function("LOWER", vec![value.clone()])),
        ("Trim", [value]) => Some(SqlExpr::function(
            "LTRIM",
            vec![SqlExpr::function("RTRIM", vec![value.clone()])],
        )),
        ("Replace", [value, old, new]) => Some(SqlExpr::function(
            "REPLACE",
            vec![value.clone(), old.clone(), new.clone()],
        )),
        ("Substring", [value, start]) => Some(SqlExpr::function(
            "SUBSTRING",
            vec![
                value.clone(),
                one_based(start.clone()),
                SqlExpr::function("LENGTH", vec![value.clone()]),
            ],
        )),
        ("Substring", [value, start, length]) => Some(SqlExpr::function(
            "SUBSTRING",
            vec![value.clone(), one_based(start.clone()), length.clone()],
        )),
        _ => None,
    }
}

/// Builds `value LIKE pattern`. Constant patterns are escaped and inlined;
/// other patterns are concatenated with the wildcards.
fn like_pattern(
    value: SqlExpr,
    pattern_node: &qmsql_ast::Expr,
    pattern: &SqlExpr,
    prefix: &str,
    suffix: &str,
) -> SqlExpr {
    if let ExprKind::Constant(Literal::String(text)) = &pattern_node.kind {
        let escaped = escape_like(text);
        let escape = (escaped != *text).then(|| Box::new(SqlExpr::Literal("\\".into())));
        return SqlExpr::Like {
            matched: Box::new(value),
            pattern: Box::new(SqlExpr::Literal(format!("{prefix}{escaped}{suffix}").into())),
            escape,
        };
    }

    let mut parts = Vec::new();
    if !prefix.is_empty() {
        parts.push(SqlExpr::Literal(prefix.into()));
    }
    parts.push(pattern.clone());
    if !suffix.is_empty() {
        parts.push(SqlExpr::Literal(suffix.into()));
    }
    SqlExpr::Like {
        matched: Box::new(value),
        pattern: Box::new(SqlExpr::function("CONCAT", parts)),
        escape: None,
    }
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn one_based(start: SqlExpr) -> SqlExpr {
    match start {
        SqlExpr::Literal(Literal::Integer(i)) => SqlExpr::int(i + 1),
        start => SqlExpr::binary(SqlBinOp::Add, start, SqlExpr::int(1)),
    }
}

fn math(call: &MethodCall, _: &mut Diagnostics) -> Option<SqlExpr> {
    if !call.method.is_static || call.method.declaring_type != "Math" {
        return None;
    }
    let mut operands = operand_sql(call)?;
    let name = match call.method.name.as_str() {
        "Abs" => "ABS",
        "Floor" => "FLOOR",
        "Ceiling" => "CEILING",
        "Round" => {
            if operands.len() == 1 {
                operands.push(SqlExpr::int(0));
            }
            "ROUND"
        }
        _ => return None,
    };
    Some(SqlExpr::function(name, operands))
}
