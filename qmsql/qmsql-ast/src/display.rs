//! Host-like notation for expression nodes, used to name the offending
//! construct in diagnostics.
use std::fmt::{self, Display, Formatter};

use itertools::Itertools;

use crate::expr::{BinOp, Expr, ExprKind, Literal, UnOp};
use crate::query::{BodyClause, QueryModel, QuerySource, ResultOperator};

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => f.write_str("null"),
            Literal::Boolean(b) => write!(f, "{b}"),
            Literal::Integer(i) => write!(f, "{i}"),
            Literal::Float(x) => write!(f, "{x:?}"),
            Literal::String(s) => write!(f, "{s:?}"),
        }
    }
}

impl Display for BinOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinOp::Add => "+",
            BinOp::Subtract => "-",
            BinOp::Multiply => "*",
            BinOp::Divide => "/",
            BinOp::Modulo => "%",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::AndAlso => "&&",
            BinOp::OrElse => "||",
            BinOp::Equal => "==",
            BinOp::NotEqual => "!=",
            BinOp::LessThan => "<",
            BinOp::LessThanOrEqual => "<=",
            BinOp::GreaterThan => ">",
            BinOp::GreaterThanOrEqual => ">=",
            BinOp::Coalesce => "??",
        })
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Constant(literal) => write!(f, "{literal}"),
            ExprKind::Parameter(name) => write!(f, "@{name}"),
            ExprKind::SourceRef(name) => f.write_str(name),
            ExprKind::MemberAccess { target, member } => match target {
                Some(target) => write!(f, "{target}.{member}"),
                None => f.write_str(member),
            },
            ExprKind::MethodCall {
                target,
                method,
                args,
            } => {
                match target {
                    Some(target) => write!(f, "{target}.")?,
                    None => write!(f, "{}.", method.declaring_type)?,
                }
                write!(f, "{}({})", method.name, args.iter().join(", "))
            }
            ExprKind::Unary { op, operand } => match op {
                UnOp::Not => write!(f, "!{operand}"),
                UnOp::Negate => write!(f, "-{operand}"),
                UnOp::Convert => write!(f, "({}){operand}", self.ty),
            },
            ExprKind::Binary { op, left, right } => write!(f, "({left} {op} {right})"),
            ExprKind::Conditional {
                test,
                if_true,
                if_false,
            } => write!(f, "({test} ? {if_true} : {if_false})"),
            ExprKind::New(members) => {
                let members = members
                    .iter()
                    .map(|(name, expr)| format!("{name} = {expr}"))
                    .join(", ");
                write!(f, "new {{ {members} }}")
            }
            ExprKind::Subquery(query) => write!(f, "{{{query}}}"),
        }
    }
}

impl Display for QueryModel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let source = match &self.from.source {
            QuerySource::Table(table) => table.name.clone(),
            QuerySource::Subquery(query) => format!("({query})"),
        };
        write!(f, "from {} in {source}", self.from.name)?;

        for clause in &self.clauses {
            match clause {
                BodyClause::Where(predicate) => write!(f, " where {predicate}")?,
                BodyClause::OrderBy(keys) | BodyClause::ThenBy(keys) => {
                    let keys = keys
                        .iter()
                        .map(|o| format!("{} {}", o.expr, o.direction))
                        .join(", ");
                    let verb = match clause {
                        BodyClause::OrderBy(_) => "orderby",
                        _ => "thenby",
                    };
                    write!(f, " {verb} {keys}")?
                }
                BodyClause::Join(join) => write!(
                    f,
                    " join {} on {} equals {}",
                    join.item.name, join.outer_key, join.inner_key
                )?,
                BodyClause::AdditionalFrom(from) => write!(f, " from {}", from.name)?,
                BodyClause::GroupBy(group) => {
                    let keys = group.keys.iter().map(|(_, k)| k).join(", ");
                    write!(f, " group by {keys} into {}", group.name)?
                }
            }
        }

        match &self.select {
            Some(select) => write!(f, " select {select}")?,
            None => write!(f, " select {}", self.from.name)?,
        }

        for operator in &self.result_operators {
            match operator {
                ResultOperator::Skip(e)
                | ResultOperator::Take(e)
                | ResultOperator::All(e)
                | ResultOperator::Contains(e) => write!(f, ".{}({e})", operator.as_ref())?,
                _ => write!(f, ".{}()", operator.as_ref())?,
            }
        }
        Ok(())
    }
}
