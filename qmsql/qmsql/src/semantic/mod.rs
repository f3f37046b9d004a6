//! Semantic analysis: turns a query model into a tree of selects.
//!
//! The visitor in [query] composes clauses onto selects, [expr] translates
//! predicates and projections through the translator registry, and
//! [context] holds the state they share.

mod context;
mod expr;
mod query;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use qmsql_ast::{QueryModel, Ty};

use self::context::{Binding, Context};
use self::query::QueryResult;
use crate::ir::rel::{ColumnOwner, Select, SqlExpr, SqlQuery};
use crate::sql::Capabilities;
use crate::translate::TranslatorRegistry;
use crate::{ClientEvaluation, Error, Result};

pub use self::context::ClientEval;

/// Result of translating a query model, before lowering and rendering.
#[derive(Debug)]
pub(crate) struct Translation {
    pub query: SqlQuery,
    pub columns: Vec<ProjectedColumn>,
    pub client_eval: Vec<ClientEval>,
    pub warnings: Vec<Error>,
}

/// A column of the result set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectedColumn {
    pub name: String,
    /// Member of the projected object the column is read into, if any.
    pub member: Option<String>,
    pub ty: Ty,
}

pub(crate) fn translate(
    model: &QueryModel,
    registry: Arc<TranslatorRegistry>,
    capabilities: Capabilities,
    client_evaluation: ClientEvaluation,
) -> Result<Translation> {
    let mut ctx = Context::new(registry, capabilities, client_evaluation);
    let visited = query::visit(&mut ctx, model, None, false)?;

    let (root, element) = match visited.result {
        // a quantifier yields one row with one boolean column
        QueryResult::Predicate(condition) => {
            let max_len = ctx.query.max_identifier_length;
            let mut select = Select::default();
            let value = SqlExpr::Case {
                cases: vec![(condition, SqlExpr::boolean(true))],
                default: Some(Box::new(SqlExpr::boolean(false))),
            };
            let name = select.add_projection(value, None, max_len);
            let id = ctx.query.add(select);
            let column = SqlExpr::column(name, ColumnOwner::Select(id));
            (id, Binding::Scalar(column, Ty::Bool))
        }
        QueryResult::Sequence | QueryResult::Value => {
            let element = query::project(&mut ctx, visited.select, &visited.element);
            (visited.select, element)
        }
    };
    ctx.query.root = root;

    let columns = element
        .leaves()
        .iter()
        .map(|leaf| ProjectedColumn {
            name: match leaf.expr {
                SqlExpr::Column(column) => column.name.clone(),
                _ => String::new(),
            },
            member: leaf.member.map(str::to_string),
            ty: leaf.ty.clone(),
        })
        .collect();

    log::debug!(
        "translated into {} selects, {} parts left to the client",
        ctx.query.selects.len(),
        visited.client_eval.len()
    );
    Ok(Translation {
        query: ctx.query,
        columns,
        client_eval: visited.client_eval,
        warnings: ctx.diagnostics,
    })
}
