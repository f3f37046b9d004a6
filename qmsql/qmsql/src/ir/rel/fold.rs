//! A trait to "fold" the relational tree, so we can transitively apply some
//! logic to a whole select by only defining how to handle the nodes we care
//! about.
use itertools::Itertools;

use super::*;
use crate::Result;

// Default methods call free functions, so implementors can override one
// method and still fall back to the default traversal for the rest.
pub trait SqlFold {
    fn fold_select(&mut self, select: Select) -> Result<Select> {
        fold_select(self, select)
    }
    fn fold_expr(&mut self, expr: SqlExpr) -> Result<SqlExpr> {
        fold_expr(self, expr)
    }
    fn fold_column(&mut self, column: Column) -> Result<Column> {
        Ok(column)
    }
    fn fold_ordering(&mut self, ordering: SqlOrdering) -> Result<SqlOrdering> {
        Ok(SqlOrdering {
            expr: self.fold_expr(ordering.expr)?,
            direction: ordering.direction,
        })
    }
    fn fold_select_id(&mut self, id: SelectId) -> Result<SelectId> {
        Ok(id)
    }
}

pub fn fold_select<F: ?Sized + SqlFold>(fold: &mut F, select: Select) -> Result<Select> {
    Ok(Select {
        projections: fold_exprs(fold, select.projections)?,
        from: select
            .from
            .into_iter()
            .map(|table_ref| fold_table_ref(fold, table_ref))
            .try_collect()?,
        predicate: fold_optional(fold, select.predicate)?,
        group_by: fold_exprs(fold, select.group_by)?,
        having: fold_optional(fold, select.having)?,
        order_by: fold_orderings(fold, select.order_by)?,
        limit: fold_optional(fold, select.limit)?,
        offset: fold_optional(fold, select.offset)?,
        distinct: select.distinct,
        alias: select.alias,
    })
}

fn fold_table_ref<F: ?Sized + SqlFold>(fold: &mut F, table_ref: TableRef) -> Result<TableRef> {
    Ok(TableRef {
        relation: match table_ref.relation {
            Relation::Derived(id) => Relation::Derived(fold.fold_select_id(id)?),
            table => table,
        },
        join: match table_ref.join {
            Some(join) => Some(Join {
                kind: join.kind,
                on: join.on.map(|on| fold.fold_expr(on)).transpose()?,
            }),
            None => None,
        },
    })
}

pub fn fold_expr<F: ?Sized + SqlFold>(fold: &mut F, expr: SqlExpr) -> Result<SqlExpr> {
    use SqlExpr::*;
    Ok(match expr {
        Column(column) => Column(fold.fold_column(column)?),
        Alias { name, inner } => Alias {
            name,
            inner: fold_box(fold, inner)?,
        },
        Literal(_) | Param(_) | Fragment(_) => expr,
        Unary { op, operand } => Unary {
            op,
            operand: fold_box(fold, operand)?,
        },
        Binary { op, left, right } => Binary {
            op,
            left: fold_box(fold, left)?,
            right: fold_box(fold, right)?,
        },
        IsNull { operand, negated } => IsNull {
            operand: fold_box(fold, operand)?,
            negated,
        },
        Case { cases, default } => Case {
            cases: cases
                .into_iter()
                .map(|(condition, result)| -> Result<_> {
                    Ok((fold.fold_expr(condition)?, fold.fold_expr(result)?))
                })
                .try_collect()?,
            default: fold_optional_box(fold, default)?,
        },
        Exists(id) => Exists(fold.fold_select_id(id)?),
        Subquery(id) => Subquery(fold.fold_select_id(id)?),
        In { operand, subquery } => In {
            operand: fold_box(fold, operand)?,
            subquery: fold.fold_select_id(subquery)?,
        },
        RowNumber { order_by } => RowNumber {
            order_by: fold_orderings(fold, order_by)?,
        },
        Function { name, args } => Function {
            name,
            args: fold_exprs(fold, args)?,
        },
        Like {
            matched,
            pattern,
            escape,
        } => Like {
            matched: fold_box(fold, matched)?,
            pattern: fold_box(fold, pattern)?,
            escape: fold_optional_box(fold, escape)?,
        },
        StringCompare { op, left, right } => StringCompare {
            op,
            left: fold_box(fold, left)?,
            right: fold_box(fold, right)?,
        },
        Cast { inner, ty } => Cast {
            inner: fold_box(fold, inner)?,
            ty,
        },
        Convert { inner, ty } => Convert {
            inner: fold_box(fold, inner)?,
            ty,
        },
    })
}

pub fn fold_exprs<F: ?Sized + SqlFold>(fold: &mut F, exprs: Vec<SqlExpr>) -> Result<Vec<SqlExpr>> {
    exprs.into_iter().map(|e| fold.fold_expr(e)).try_collect()
}

fn fold_orderings<F: ?Sized + SqlFold>(
    fold: &mut F,
    orderings: Vec<SqlOrdering>,
) -> Result<Vec<SqlOrdering>> {
    orderings
        .into_iter()
        .map(|o| fold.fold_ordering(o))
        .try_collect()
}

fn fold_optional<F: ?Sized + SqlFold>(
    fold: &mut F,
    expr: Option<SqlExpr>,
) -> Result<Option<SqlExpr>> {
    expr.map(|e| fold.fold_expr(e)).transpose()
}

fn fold_box<F: ?Sized + SqlFold>(fold: &mut F, expr: Box<SqlExpr>) -> Result<Box<SqlExpr>> {
    Ok(Box::new(fold.fold_expr(*expr)?))
}

fn fold_optional_box<F: ?Sized + SqlFold>(
    fold: &mut F,
    expr: Option<Box<SqlExpr>>,
) -> Result<Option<Box<SqlExpr>>> {
    expr.map(|e| fold_box(fold, e)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Rename;

    impl SqlFold for Rename {
        fn fold_column(&mut self, column: Column) -> Result<Column> {
            Ok(super::Column {
                name: column.name.to_uppercase(),
                ..column
            })
        }
    }

    #[test]
    fn test_fold_reaches_nested_columns() {
        let col = SqlExpr::column("id", ColumnOwner::Table("c".to_string()));
        let expr = SqlExpr::Case {
            cases: vec![(
                SqlExpr::IsNull {
                    operand: Box::new(col.clone()),
                    negated: false,
                },
                SqlExpr::function("ABS", vec![col]),
            )],
            default: None,
        };

        let folded = Rename.fold_expr(expr).unwrap();
        let mut names = Vec::new();
        folded.walk(&mut |e| {
            if let SqlExpr::Column(c) = e {
                names.push(c.name.clone())
            }
        });
        assert_eq!(names, vec!["ID", "ID"]);
    }
}
