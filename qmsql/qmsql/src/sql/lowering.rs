//! Capability-driven rewrites of the relational tree, applied after the
//! visitor is done and before rendering.
//!
//! Two passes exist:
//! - row-number paging, for engines without `OFFSET`,
//! - boolean values, for engines where a condition cannot be used as a value.
use itertools::Itertools;
use qmsql_ast::Literal;

use super::dialect::{Capabilities, DialectHandler};
use crate::ir::rel::{
    fold_expr, fold_select, ColumnOwner, Select, SelectId, SqlBinOp, SqlExpr, SqlFold,
    SqlOrdering, SqlQuery,
};
use crate::utils::OrMap;
use crate::{Error, Result};

/// Name of the column that carries the row index of an emulated page.
const ROW_NUMBER: &str = "__RowNumber__";

pub(crate) fn lower(
    query: &mut SqlQuery,
    dialect: &dyn DialectHandler,
    capabilities: &Capabilities,
) -> Result<()> {
    if !capabilities.supports_native_offset_fetch {
        // emulation appends selects, none of which has an offset
        let ids = query.ids().collect_vec();
        for id in ids {
            let select = &query[id];
            if select.offset.is_some() && !select.has_row_number() {
                emulate_row_number(query, id)?;
            }
        }
    }

    if !dialect.has_boolean_values() {
        let ids = query.ids().collect_vec();
        for id in ids {
            let select = std::mem::take(&mut query[id]);
            query[id] = BooleanValues.fold_select(select)?;
        }
    }
    Ok(())
}

/// Replaces the offset (and limit) of select `id` with a filter over a
/// `ROW_NUMBER()` computed in a derived table.
///
/// The select at `id` becomes the outer select; it exposes the same columns
/// as before. Only the root select keeps its ordering: a nested select
/// without `TOP` or `OFFSET` cannot carry an `ORDER BY`.
pub(crate) fn emulate_row_number(query: &mut SqlQuery, id: SelectId) -> Result<()> {
    if let Some(SqlExpr::Literal(Literal::Integer(offset))) = &query[id].offset {
        if *offset < 0 {
            return Err(Error::new_assert(format!(
                "row-number paging of a negative offset ({offset})"
            )));
        }
    }

    // rows must be made distinct before they are numbered
    if query[id].distinct {
        let offset = query[id].offset.take();
        let limit = query[id].limit.take();
        query.push_down(id);
        query[id].offset = offset;
        query[id].limit = limit;
    }

    let exposed = query[id].projections.len();
    let inner = query.push_down(id);
    let max_len = query.max_identifier_length;

    let inner_select = &mut query[inner];
    let offset = inner_select.offset.take();
    let limit = inner_select.limit.take();
    let mut order_by = std::mem::take(&mut inner_select.order_by)
        .into_iter()
        .map(|o| SqlOrdering {
            expr: o.expr.strip_alias().clone(),
            direction: o.direction,
        })
        .collect_vec();
    if order_by.is_empty() {
        order_by.push(SqlOrdering::asc(SqlExpr::Fragment("(SELECT 1)".to_string())));
    }

    let row_number = inner_select.unique_name(ROW_NUMBER, max_len);
    inner_select.projections.push(SqlExpr::Alias {
        name: row_number.clone(),
        inner: Box::new(SqlExpr::RowNumber { order_by }),
    });

    let row_number = SqlExpr::column(row_number, ColumnOwner::Select(inner));
    let bounds = match (offset, limit) {
        (Some(offset), limit) => {
            let lower = SqlExpr::binary(SqlBinOp::Gt, row_number.clone(), offset.clone());
            let upper = limit.map(|limit| {
                SqlExpr::binary(SqlBinOp::Lte, row_number, upper_bound(offset, limit))
            });
            Some(lower).or_map(upper, SqlExpr::and)
        }
        (None, Some(limit)) => Some(SqlExpr::binary(SqlBinOp::Lte, row_number, limit)),
        (None, None) => None,
    };

    let nested = id != query.root;
    let outer = &mut query[id];
    // columns lifted from the ordering are only needed by the inner select
    if exposed > 0 {
        outer.projections.truncate(exposed);
    }
    outer.predicate = outer.predicate.take().or_map(bounds, SqlExpr::and);
    if nested || outer.alias.is_some() {
        outer.order_by.clear();
    }

    log::debug!("emulated paging of select {} with ROW_NUMBER()", id.get());
    Ok(())
}

fn upper_bound(offset: SqlExpr, limit: SqlExpr) -> SqlExpr {
    if let (SqlExpr::Literal(Literal::Integer(o)), SqlExpr::Literal(Literal::Integer(l))) =
        (&offset, &limit)
    {
        if let Some(sum) = o.checked_add(*l) {
            return SqlExpr::int(sum);
        }
    }
    SqlExpr::binary(SqlBinOp::Add, offset, limit)
}

/// Wraps conditions that are used as values into
/// `CASE WHEN condition THEN TRUE ELSE FALSE END`.
struct BooleanValues;

impl SqlFold for BooleanValues {
    fn fold_select(&mut self, select: Select) -> Result<Select> {
        let mut select = fold_select(self, select)?;
        select.projections = select
            .projections
            .into_iter()
            .map(|p| match p {
                SqlExpr::Alias { name, inner } => SqlExpr::Alias {
                    name,
                    inner: Box::new(as_value(*inner)),
                },
                p => as_value(p),
            })
            .collect();
        select.group_by = select.group_by.into_iter().map(as_value).collect();
        Ok(select)
    }

    fn fold_ordering(&mut self, ordering: SqlOrdering) -> Result<SqlOrdering> {
        Ok(SqlOrdering {
            expr: as_value(self.fold_expr(ordering.expr)?),
            direction: ordering.direction,
        })
    }

    fn fold_expr(&mut self, expr: SqlExpr) -> Result<SqlExpr> {
        Ok(match fold_expr(self, expr)? {
            SqlExpr::Function { name, args } => SqlExpr::Function {
                name,
                args: args.into_iter().map(as_value).collect(),
            },
            SqlExpr::Case { cases, default } => SqlExpr::Case {
                cases: cases
                    .into_iter()
                    .map(|(condition, result)| (condition, as_value(result)))
                    .collect(),
                default: default.map(|d| Box::new(as_value(*d))),
            },
            SqlExpr::Binary { op, left, right } if !matches!(op, SqlBinOp::And | SqlBinOp::Or) => {
                SqlExpr::Binary {
                    op,
                    left: Box::new(as_value(*left)),
                    right: Box::new(as_value(*right)),
                }
            }
            SqlExpr::Cast { inner, ty } => SqlExpr::Cast {
                inner: Box::new(as_value(*inner)),
                ty,
            },
            expr => expr,
        })
    }
}

fn as_value(expr: SqlExpr) -> SqlExpr {
    if !expr.is_condition() {
        return expr;
    }
    SqlExpr::Case {
        cases: vec![(expr, SqlExpr::boolean(true))],
        default: Some(Box::new(SqlExpr::boolean(false))),
    }
}
