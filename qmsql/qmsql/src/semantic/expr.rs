use qmsql_ast::{BinOp, Expr, ExprKind, Literal, MethodId, Ty, UnOp};

use super::context::{Binding, Context, Scope};
use super::query;
use crate::ir::rel::{SqlBinOp, SqlExpr, SqlUnOp};
use crate::translate::{MemberAccess, MethodCall, Operand, Translate};
use crate::Result;

/// Translates expression nodes against the range variables of a scope.
///
/// Registered fragment rules are tried on every node first; nodes they leave
/// alone are translated structurally, delegating method calls and member
/// accesses to the registry.
pub(crate) struct ExprTranslator<'c, 's> {
    ctx: &'c mut Context,
    scope: &'s Scope<'s>,

    /// Conversions between scalar types become explicit casts only in
    /// projections; elsewhere the engine converts implicitly.
    in_projection: bool,
}

impl<'c, 's> ExprTranslator<'c, 's> {
    pub fn new(ctx: &'c mut Context, scope: &'s Scope<'s>) -> Self {
        ExprTranslator {
            ctx,
            scope,
            in_projection: false,
        }
    }

    pub fn in_projection(mut self) -> Self {
        self.in_projection = true;
        self
    }

    /// Resolves what a node stands for: a whole entity, an anonymous object,
    /// a grouping or a single value.
    pub fn bind(&mut self, expr: &Expr) -> Result<Option<Binding>> {
        Ok(match &expr.kind {
            ExprKind::SourceRef(name) => self.scope.lookup(name).cloned(),

            ExprKind::MemberAccess {
                target: Some(target),
                member,
            } => match self.bind(target)? {
                Some(Binding::Entity(members)) => members
                    .into_iter()
                    .find(|m| &m.name == member)
                    .map(|m| Binding::Scalar(m.expr, m.ty)),
                Some(Binding::Object(fields)) => fields
                    .into_iter()
                    .find(|(name, _)| name == member)
                    .map(|(_, field)| field),
                Some(Binding::Group { key, .. }) if member == "Key" => Some(*key),
                Some(Binding::Group { .. }) => None,
                Some(Binding::Scalar(sql, _)) => self
                    .translate_member(expr, target, Some(sql), member)
                    .map(|sql| Binding::Scalar(sql, expr.ty.clone())),
                None => self
                    .translate_member(expr, target, None, member)
                    .map(|sql| Binding::Scalar(sql, expr.ty.clone())),
            },

            ExprKind::New(members) => {
                let mut fields = Vec::with_capacity(members.len());
                for (name, member) in members {
                    let Some(field) = self.bind(member)? else {
                        return Ok(None);
                    };
                    fields.push((name.clone(), field));
                }
                Some(Binding::Object(fields))
            }

            // boxing an entity or a scalar does not change what it refers to
            ExprKind::Unary {
                op: UnOp::Convert,
                operand,
            } if !expr.ty.is_scalar() => self.bind(operand)?,

            _ => self
                .translate(expr)?
                .map(|sql| Binding::Scalar(sql, expr.ty.clone())),
        })
    }

    /// Translates a node used as a search condition, such as a filter.
    pub fn translate_condition(&mut self, expr: &Expr) -> Result<Option<SqlExpr>> {
        Ok(self.translate(expr)?.map(|sql| as_condition(sql, &expr.ty)))
    }

    fn translate_node(&mut self, expr: &Expr) -> Result<Option<SqlExpr>> {
        Ok(match &expr.kind {
            ExprKind::Constant(literal) => {
                if !expr.ty.is_scalar() && literal != &Literal::Null {
                    return Ok(None);
                }
                Some(SqlExpr::Literal(literal.clone()))
            }

            ExprKind::Parameter(name) => {
                if !expr.ty.is_scalar() {
                    return Ok(None);
                }
                self.ctx.declare_param(name, &expr.ty);
                Some(SqlExpr::Param(name.clone()))
            }

            ExprKind::SourceRef(_)
            | ExprKind::MemberAccess {
                target: Some(_), ..
            } => match self.bind(expr)? {
                Some(Binding::Scalar(sql, _)) => Some(sql),
                _ => None,
            },

            ExprKind::MemberAccess {
                target: None,
                member,
            } => {
                let registry = self.ctx.registry.clone();
                registry.translate_member(&MemberAccess {
                    node: expr,
                    target: None,
                    member,
                })
            }

            ExprKind::MethodCall {
                target,
                method,
                args,
            } => self.translate_method_call(expr, target.as_deref(), method, args)?,

            ExprKind::Unary { op, operand } => match op {
                UnOp::Not => self.translate_condition(operand)?.map(SqlExpr::negate),
                UnOp::Negate => self.translate(operand)?.map(|sql| SqlExpr::Unary {
                    op: SqlUnOp::Neg,
                    operand: Box::new(sql),
                }),
                UnOp::Convert => self
                    .translate(operand)?
                    .map(|sql| self.convert(sql, &operand.ty, &expr.ty)),
            },

            ExprKind::Binary { op, left, right } => self.translate_binary(*op, left, right)?,

            ExprKind::Conditional {
                test,
                if_true,
                if_false,
            } => {
                let test = self.translate_condition(test)?;
                let if_true = self.translate(if_true)?;
                let if_false = self.translate(if_false)?;
                match (test, if_true, if_false) {
                    (Some(test), Some(if_true), Some(if_false)) => Some(SqlExpr::Case {
                        cases: vec![(test, if_true)],
                        default: Some(Box::new(if_false)),
                    }),
                    _ => None,
                }
            }

            ExprKind::New(_) => None,

            ExprKind::Subquery(model) => query::translate_subquery(self.ctx, model, self.scope)?,
        })
    }

    fn translate_member(
        &mut self,
        node: &Expr,
        target: &Expr,
        sql: Option<SqlExpr>,
        member: &str,
    ) -> Option<SqlExpr> {
        let registry = self.ctx.registry.clone();
        registry.translate_member(&MemberAccess {
            node,
            target: Some(Operand { node: target, sql }),
            member,
        })
    }

    fn translate_method_call(
        &mut self,
        node: &Expr,
        target: Option<&Expr>,
        method: &MethodId,
        args: &[Expr],
    ) -> Result<Option<SqlExpr>> {
        if method.declaring_type == "Enumerable" {
            return self.translate_group_aggregate(method, args);
        }

        let target = match target {
            Some(target) => Some(Operand {
                node: target,
                sql: self.translate(target)?,
            }),
            None => None,
        };
        let mut operands = Vec::with_capacity(args.len());
        for arg in args {
            operands.push(Operand {
                node: arg,
                sql: self.translate(arg)?,
            });
        }

        let call = MethodCall {
            node,
            method,
            target,
            args: operands,
        };
        let registry = self.ctx.registry.clone();
        let known = self.ctx.diagnostics.len();
        let sql = registry.translate_method_call(&call, &mut self.ctx.diagnostics);
        for warning in &self.ctx.diagnostics[known..] {
            log::warn!("[{}] {}", warning.code.unwrap_or_default(), warning.reason);
        }
        Ok(sql)
    }

    /// `Enumerable.Count(g)`, `Enumerable.Sum(g, selector)`, ... over the
    /// range variable of a grouping. Selectors see the rows of the group.
    fn translate_group_aggregate(
        &mut self,
        method: &MethodId,
        args: &[Expr],
    ) -> Result<Option<SqlExpr>> {
        let [group, rest @ ..] = args else {
            return Ok(None);
        };
        let Some(Binding::Group { rows, .. }) = self.bind(group)? else {
            return Ok(None);
        };

        let scope = Scope {
            bindings: &rows,
            parent: Some(self.scope),
        };
        let mut translator = ExprTranslator::new(&mut *self.ctx, &scope);

        let name = method.name.as_str();
        let arg = match (name, rest) {
            (_, []) => None,
            ("Count" | "LongCount", [predicate]) => match translator.translate_condition(predicate)? {
                Some(condition) => Some((condition, Ty::Bool)),
                None => return Ok(None),
            },
            (_, [selector]) => match translator.translate(selector)? {
                Some(sql) => Some((sql, selector.ty.clone())),
                None => return Ok(None),
            },
            _ => return Ok(None),
        };
        Ok(aggregate(name, arg))
    }

    fn translate_binary(&mut self, op: BinOp, left: &Expr, right: &Expr) -> Result<Option<SqlExpr>> {
        if op.is_logical() {
            let left = self.translate_condition(left)?;
            let right = self.translate_condition(right)?;
            let (Some(left), Some(right)) = (left, right) else {
                return Ok(None);
            };
            return Ok(Some(match op {
                BinOp::AndAlso => SqlExpr::and(left, right),
                _ => SqlExpr::or(left, right),
            }));
        }

        if matches!(op, BinOp::Equal | BinOp::NotEqual) {
            let operand = match (
                left.strip_convert().is_null_constant(),
                right.strip_convert().is_null_constant(),
            ) {
                (false, true) => Some(left),
                (true, false) => Some(right),
                _ => None,
            };
            if let Some(operand) = operand {
                return Ok(self.translate(operand)?.map(|sql| SqlExpr::IsNull {
                    operand: Box::new(sql),
                    negated: op == BinOp::NotEqual,
                }));
            }
        }

        let (Some(l), Some(r)) = (self.translate(left)?, self.translate(right)?) else {
            return Ok(None);
        };
        let op = match op {
            BinOp::Coalesce => return Ok(Some(SqlExpr::function("COALESCE", vec![l, r]))),
            BinOp::Add => SqlBinOp::Add,
            BinOp::Subtract => SqlBinOp::Sub,
            BinOp::Multiply => SqlBinOp::Mul,
            BinOp::Divide => SqlBinOp::Div,
            BinOp::Modulo => SqlBinOp::Mod,
            BinOp::BitAnd => SqlBinOp::BitAnd,
            BinOp::BitOr => SqlBinOp::BitOr,
            BinOp::Equal => SqlBinOp::Eq,
            BinOp::NotEqual => SqlBinOp::Ne,
            BinOp::LessThan => SqlBinOp::Lt,
            BinOp::LessThanOrEqual => SqlBinOp::Lte,
            BinOp::GreaterThan => SqlBinOp::Gt,
            BinOp::GreaterThanOrEqual => SqlBinOp::Gte,
            BinOp::AndAlso => SqlBinOp::And,
            BinOp::OrElse => SqlBinOp::Or,
        };
        Ok(Some(SqlExpr::binary(op, l, r)))
    }

    fn convert(&self, sql: SqlExpr, from: &Ty, to: &Ty) -> SqlExpr {
        let changes_store_type = from.unwrap_enum() != to.unwrap_enum();
        if self.in_projection && changes_store_type && to.is_scalar() && from.is_scalar() {
            sql.strip_convert().cast(to.clone())
        } else {
            sql.convert(to.clone())
        }
    }
}

impl Translate for ExprTranslator<'_, '_> {
    fn translate(&mut self, expr: &Expr) -> Result<Option<SqlExpr>> {
        let registry = self.ctx.registry.clone();
        if let Some(sql) = registry.translate_fragment(expr, self)? {
            return Ok(Some(sql));
        }
        self.translate_node(expr)
    }
}

/// Coerces a translated boolean into a search condition.
pub(super) fn as_condition(sql: SqlExpr, ty: &Ty) -> SqlExpr {
    match sql {
        sql if sql.is_condition() => sql,
        SqlExpr::Literal(Literal::Boolean(value)) => {
            SqlExpr::binary(SqlBinOp::Eq, SqlExpr::int(value as i64), SqlExpr::int(1))
        }
        sql if ty.is_bool() => SqlExpr::binary(SqlBinOp::Eq, sql, SqlExpr::boolean(true)),
        sql => sql,
    }
}

/// SQL aggregate for a result operator or an `Enumerable` method of the same
/// name. `Count` takes an optional condition, the others a value.
pub(super) fn aggregate(name: &str, arg: Option<(SqlExpr, Ty)>) -> Option<SqlExpr> {
    let count = |arg: Option<(SqlExpr, Ty)>| match arg {
        None => SqlExpr::function("COUNT", vec![SqlExpr::Fragment("*".to_string())]),
        Some((condition, _)) => SqlExpr::function(
            "COUNT",
            vec![SqlExpr::Case {
                cases: vec![(condition, SqlExpr::int(1))],
                default: None,
            }],
        ),
    };

    Some(match name {
        "Count" | "LongCount" => count(arg),
        "Sum" => SqlExpr::function("SUM", vec![arg?.0]),
        "Min" => SqlExpr::function("MIN", vec![arg?.0]),
        "Max" => SqlExpr::function("MAX", vec![arg?.0]),
        "Average" => {
            let (value, ty) = arg?;
            let value = if ty.is_integer() {
                value.cast(Ty::Float64)
            } else {
                value
            };
            SqlExpr::function("AVG", vec![value])
        }
        _ => return None,
    })
}

/// Result type of an aggregate over values of type `ty`.
pub(super) fn aggregate_ty(name: &str, ty: Option<&Ty>) -> Ty {
    match (name, ty) {
        ("Count", _) => Ty::Int32,
        ("LongCount", _) => Ty::Int64,
        ("Average", Some(ty)) if ty.unwrap_nullable() == &Ty::Decimal => ty.clone(),
        ("Average", _) => Ty::Float64,
        (_, Some(ty)) => ty.clone(),
        (_, None) => Ty::Object,
    }
}
