use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use qmsql_ast::{Expr, Ordering, Reason, ResultOperator, Ty, WithErrorInfo};

use crate::ir::rel::{ParamDecl, SqlExpr, SqlQuery};
use crate::sql::Capabilities;
use crate::translate::TranslatorRegistry;
use crate::{ClientEvaluation, Error, Result};

/// State shared by all visitors of one compilation, nested ones included.
pub(crate) struct Context {
    pub query: SqlQuery,
    pub registry: Arc<TranslatorRegistry>,
    pub capabilities: Capabilities,
    pub client_evaluation: ClientEvaluation,

    /// Warnings, in the order they were raised.
    pub diagnostics: Vec<Error>,
}

impl Context {
    pub fn new(
        registry: Arc<TranslatorRegistry>,
        capabilities: Capabilities,
        client_evaluation: ClientEvaluation,
    ) -> Self {
        Context {
            query: SqlQuery::new(capabilities.max_identifier_length),
            registry,
            capabilities,
            client_evaluation,
            diagnostics: Vec::new(),
        }
    }

    pub fn declare_param(&mut self, name: &str, ty: &Ty) {
        if !self.query.parameters.iter().any(|p| p.name == name) {
            self.query.parameters.push(ParamDecl {
                name: name.to_string(),
                ty: ty.clone(),
            });
        }
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            selects: self.query.selects.len(),
            parameters: self.query.parameters.len(),
        }
    }

    /// Forgets selects and parameters added since `checkpoint`, after an
    /// attempted translation turned out to have no SQL form.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        self.query.selects.truncate(checkpoint.selects);
        self.query.parameters.truncate(checkpoint.parameters);
    }

    /// Table and column names come from the mapping and are never shortened.
    pub fn check_identifier(&self, name: &str) -> Result<()> {
        let max = self.capabilities.max_identifier_length;
        let len = name.chars().count();
        if len > max {
            return Err(Error::new(Reason::Expected {
                who: Some(format!("identifier `{name}`")),
                expected: format!("at most {max} characters"),
                found: len.to_string(),
            })
            .push_hint("map the entity or member onto a shorter name")
            .with_code("E0002"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Checkpoint {
    selects: usize,
    parameters: usize,
}

/// What a range variable or a projected member stands for.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Binding {
    /// A row of a table or derived table.
    Entity(Vec<Member>),

    /// An anonymous object, by member name.
    Object(Vec<(String, Binding)>),

    Scalar(SqlExpr, Ty),

    /// Range variable of a grouping. `rows` holds the range variables that
    /// were in scope before grouping; aggregates are evaluated against them.
    Group {
        key: Box<Binding>,
        rows: Vec<(String, Binding)>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Member {
    pub name: String,
    pub expr: SqlExpr,
    pub ty: Ty,
}

/// A scalar part of a [Binding], with the member name it is reachable under.
pub(crate) struct Leaf<'a> {
    pub member: Option<&'a str>,
    pub expr: &'a SqlExpr,
    pub ty: &'a Ty,
}

impl Binding {
    pub fn as_scalar(&self) -> Option<(&SqlExpr, &Ty)> {
        match self {
            Binding::Scalar(expr, ty) => Some((expr, ty)),
            _ => None,
        }
    }

    /// Scalar parts, depth-first. Rows of a grouping are not part of it.
    pub fn leaves(&self) -> Vec<Leaf<'_>> {
        let mut leaves = Vec::new();
        self.collect_leaves(None, &mut leaves);
        leaves
    }

    fn collect_leaves<'a>(&'a self, member: Option<&'a str>, leaves: &mut Vec<Leaf<'a>>) {
        match self {
            Binding::Entity(members) => leaves.extend(members.iter().map(|m| Leaf {
                member: None,
                expr: &m.expr,
                ty: &m.ty,
            })),
            Binding::Object(fields) => {
                for (name, field) in fields {
                    field.collect_leaves(Some(name), leaves);
                }
            }
            Binding::Scalar(expr, ty) => leaves.push(Leaf { member, expr, ty }),
            Binding::Group { key, .. } => key.collect_leaves(Some("Key"), leaves),
        }
    }

    /// Replaces every leaf, in the order of [Binding::leaves]. Rows of a
    /// grouping are dropped, as they cannot be seen through a projection.
    pub fn map_leaves<F>(self, f: &mut F) -> Binding
    where
        F: FnMut(SqlExpr, Option<&str>) -> SqlExpr,
    {
        self.map_leaves_as(None, f)
    }

    fn map_leaves_as<F>(self, member: Option<&str>, f: &mut F) -> Binding
    where
        F: FnMut(SqlExpr, Option<&str>) -> SqlExpr,
    {
        match self {
            Binding::Entity(members) => Binding::Entity(
                members
                    .into_iter()
                    .map(|m| Member {
                        expr: f(m.expr, None),
                        ..m
                    })
                    .collect(),
            ),
            Binding::Object(fields) => Binding::Object(
                fields
                    .into_iter()
                    .map(|(name, field)| {
                        let field = field.map_leaves_as(Some(name.as_str()), f);
                        (name, field)
                    })
                    .collect(),
            ),
            Binding::Scalar(expr, ty) => Binding::Scalar(f(expr, member), ty),
            Binding::Group { key, .. } => Binding::Group {
                key: Box::new(key.map_leaves_as(Some("Key"), f)),
                rows: Vec::new(),
            },
        }
    }
}

/// Range variables visible to an expression, innermost query first.
pub(crate) struct Scope<'a> {
    pub bindings: &'a [(String, Binding)],
    pub parent: Option<&'a Scope<'a>>,
}

impl Scope<'_> {
    pub fn lookup(&self, name: &str) -> Option<&Binding> {
        let local = self.bindings.iter().rev().find(|(n, _)| n == name);
        match local {
            Some((_, binding)) => Some(binding),
            None => self.parent?.lookup(name),
        }
    }
}

/// A part of the query that is left to the caller to evaluate over the rows
/// returned by the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, strum::AsRefStr)]
pub enum ClientEval {
    Filter(Expr),
    Ordering(Vec<Ordering>),
    Projection(Expr),
    ResultOperator(ResultOperator),
}

impl Display for ClientEval {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ClientEval::Filter(expr) | ClientEval::Projection(expr) => write!(f, "{expr}"),
            ClientEval::Ordering(keys) => {
                let keys = keys
                    .iter()
                    .map(|o| format!("{} {}", o.expr, o.direction))
                    .join(", ");
                f.write_str(&keys)
            }
            ClientEval::ResultOperator(operator) => match operator {
                ResultOperator::Skip(e)
                | ResultOperator::Take(e)
                | ResultOperator::All(e)
                | ResultOperator::Contains(e) => write!(f, "{}({e})", operator.as_ref()),
                _ => write!(f, "{}()", operator.as_ref()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use qmsql_ast::SortDirection;

    use super::*;
    use crate::ir::rel::ColumnOwner;

    fn column(name: &str) -> SqlExpr {
        SqlExpr::column(name, ColumnOwner::Table("c".to_string()))
    }

    #[test]
    fn test_leaves_of_object() {
        let binding = Binding::Object(vec![
            ("Name".to_string(), Binding::Scalar(column("Name"), Ty::String)),
            (
                "Customer".to_string(),
                Binding::Entity(vec![Member {
                    name: "Id".to_string(),
                    expr: column("CustomerID"),
                    ty: Ty::Int32,
                }]),
            ),
        ]);

        let members: Vec<_> = binding.leaves().iter().map(|l| l.member).collect();
        assert_eq!(members, vec![Some("Name"), None]);

        let mut seen = Vec::new();
        let mapped = binding.map_leaves(&mut |expr, member| {
            seen.push(member.map(str::to_string));
            SqlExpr::Function {
                name: "F".to_string(),
                args: vec![expr],
            }
        });
        assert_eq!(seen, vec![Some("Name".to_string()), None]);
        assert!(mapped.leaves().iter().all(|l| l.expr.is_function()));
    }

    #[test]
    fn test_scope_lookup() {
        let outer = [("c".to_string(), Binding::Scalar(column("Id"), Ty::Int32))];
        let inner = [("o".to_string(), Binding::Scalar(column("Total"), Ty::Decimal))];
        let parent = Scope {
            bindings: &outer,
            parent: None,
        };
        let scope = Scope {
            bindings: &inner,
            parent: Some(&parent),
        };

        assert!(scope.lookup("o").is_some());
        assert!(scope.lookup("c").is_some());
        assert!(scope.lookup("x").is_none());
        assert!(parent.lookup("o").is_none());
    }

    #[test]
    fn test_client_eval_display() {
        let name = Expr::source("c", Ty::class("Customer")).member("Name", Ty::String);
        let ordering = ClientEval::Ordering(vec![Ordering {
            expr: name,
            direction: SortDirection::Desc,
        }]);
        let skip = ClientEval::ResultOperator(ResultOperator::Skip(Expr::int(3)));

        assert_eq!(ordering.to_string(), "c.Name DESC");
        assert_eq!(skip.to_string(), "Skip(3)");
    }
}
