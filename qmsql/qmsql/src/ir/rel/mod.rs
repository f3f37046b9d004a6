//! Relational output tree, as produced by the query-model visitor and
//! consumed by lowering and rendering.
//!
//! Selects live in an arena ([SqlQuery]) and refer to each other through
//! [SelectId]s. A [Column] names its owner either by a table alias or by the
//! id of a derived select, so no node ever points back at its parent.

mod expr;
mod fold;

use std::collections::HashSet;
use std::ops::{Index, IndexMut};

use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};

use qmsql_ast::Ty;

pub use expr::*;
pub use fold::*;

use crate::utils::unique_name;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlQuery {
    pub selects: Vec<Select>,

    /// The select that produces the final result.
    pub root: SelectId,

    /// Parameters referenced by the tree, in order of first appearance.
    pub parameters: Vec<ParamDecl>,

    /// Generated aliases are cut to this length.
    pub max_identifier_length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParamDecl {
    pub name: String,
    pub ty: Ty,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Select {
    /// Each item is either a [SqlExpr::Column], exposed under its own name, an
    /// [SqlExpr::Alias], or an unnamed expression.
    pub projections: Vec<SqlExpr>,
    pub from: Vec<TableRef>,
    pub predicate: Option<SqlExpr>,
    pub group_by: Vec<SqlExpr>,
    pub having: Option<SqlExpr>,
    pub order_by: Vec<SqlOrdering>,
    pub limit: Option<SqlExpr>,
    pub offset: Option<SqlExpr>,
    pub distinct: bool,

    /// Set once the select is referenced as a derived table.
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRef {
    pub relation: Relation,
    /// `None` for the first item of a FROM clause.
    pub join: Option<Join>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumAsInner)]
pub enum Relation {
    Table {
        name: String,
        schema: Option<String>,
        alias: String,
    },
    Derived(SelectId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    pub kind: JoinKind,
    pub on: Option<SqlExpr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    Left,
    Cross,
    Lateral,
}

/// Name under which a projection item is visible to enclosing selects.
pub fn projection_name(expr: &SqlExpr) -> Option<&str> {
    match expr {
        SqlExpr::Column(column) => Some(&column.name),
        SqlExpr::Alias { name, .. } => Some(name),
        _ => None,
    }
}

impl Select {
    pub fn from_relation(relation: Relation) -> Self {
        Select {
            from: vec![TableRef {
                relation,
                join: None,
            }],
            ..Default::default()
        }
    }

    pub fn projection_names(&self) -> impl Iterator<Item = &str> {
        self.projections.iter().filter_map(projection_name)
    }

    pub fn has_projection(&self, name: &str) -> bool {
        self.projection_names().any(|n| n.eq_ignore_ascii_case(name))
    }

    /// Adds `expr` to the projection list, unless an identical expression is
    /// already projected. Returns the name the expression is exposed under.
    ///
    /// Columns keep their own name when possible; `base` names everything
    /// else, falling back to `c`.
    pub fn add_projection(&mut self, expr: SqlExpr, base: Option<&str>, max_len: usize) -> String {
        let expr = expr.strip_alias().clone();

        let existing = self.projections.iter().position(|p| p.strip_alias() == &expr);
        if let Some(index) = existing {
            if let Some(name) = projection_name(&self.projections[index]) {
                return name.to_string();
            }
            // unnamed so far; name it in place
            let name = self.unique_name(base.unwrap_or("c"), max_len);
            let inner = std::mem::replace(&mut self.projections[index], SqlExpr::int(0));
            self.projections[index] = SqlExpr::Alias {
                name: name.clone(),
                inner: Box::new(inner),
            };
            return name;
        }

        let base = match (&expr, base) {
            (_, Some(base)) => base.to_string(),
            (SqlExpr::Column(column), None) => column.name.clone(),
            _ => "c".to_string(),
        };
        let name = self.unique_name(&base, max_len);

        match expr {
            SqlExpr::Column(column) if column.name == name => {
                self.projections.push(SqlExpr::Column(column));
            }
            expr => self.projections.push(SqlExpr::Alias {
                name: name.clone(),
                inner: Box::new(expr),
            }),
        }
        name
    }

    /// A projection name derived from `base` that is not yet used.
    pub fn unique_name(&self, base: &str, max_len: usize) -> String {
        unique_name(base, max_len, |n| self.has_projection(n))
    }

    /// True when further composition onto this select needs a push-down
    /// first, because paging, DISTINCT or grouping already applies to it.
    pub fn is_bounded(&self) -> bool {
        self.limit.is_some() || self.offset.is_some() || self.distinct
    }

    pub fn has_row_number(&self) -> bool {
        self.projections
            .iter()
            .any(|p| matches!(p.strip_alias(), SqlExpr::RowNumber { .. }))
    }

    /// All expressions held directly by this select, excluding nested selects.
    pub fn exprs(&self) -> impl Iterator<Item = &SqlExpr> {
        let orderings = self.order_by.iter().map(|o| &o.expr);
        let joins = self.from.iter().filter_map(|t| t.join.as_ref()?.on.as_ref());

        self.projections
            .iter()
            .chain(joins)
            .chain(self.predicate.iter())
            .chain(self.group_by.iter())
            .chain(self.having.iter())
            .chain(orderings)
            .chain(self.limit.iter())
            .chain(self.offset.iter())
    }
}

impl SqlQuery {
    pub fn new(max_identifier_length: usize) -> Self {
        SqlQuery {
            selects: Vec::new(),
            root: SelectId::from(0),
            parameters: Vec::new(),
            max_identifier_length,
        }
    }

    pub fn add(&mut self, select: Select) -> SelectId {
        let id = SelectId::from(self.selects.len());
        self.selects.push(select);
        id
    }

    pub fn ids(&self) -> impl Iterator<Item = SelectId> {
        (0..self.selects.len()).map(SelectId::from)
    }

    /// A table alias derived from `base`, distinct (ignoring case) from every
    /// alias already present in the tree.
    pub fn fresh_alias(&self, base: &str) -> String {
        let taken: HashSet<String> = self
            .selects
            .iter()
            .flat_map(|s| {
                let tables = s
                    .from
                    .iter()
                    .filter_map(|t| t.relation.as_table().map(|(_, _, alias)| alias));
                tables.chain(s.alias.iter())
            })
            .map(|a| a.to_lowercase())
            .collect();

        unique_name(base, self.max_identifier_length, |n| {
            taken.contains(&n.to_lowercase())
        })
    }

    /// Moves the contents of select `id` into a new derived table and leaves
    /// at `id` an outer select that reads from it.
    ///
    /// The outer select re-exposes every projection of the inner one under
    /// the same name, keeps the alias the select had, and takes over its
    /// ordering. The inner select keeps its ordering only when it is paged.
    /// Returns the id of the inner select.
    pub fn push_down(&mut self, id: SelectId) -> SelectId {
        let max_len = self.max_identifier_length;
        let inner_alias = self.fresh_alias("t");
        let inner_id = SelectId::from(self.selects.len());

        let mut inner = std::mem::take(&mut self[id]);
        let outer_alias = inner.alias.replace(inner_alias);

        // everything the outer select refers to must have a name
        for index in 0..inner.projections.len() {
            if projection_name(&inner.projections[index]).is_none() {
                let expr = inner.projections[index].clone();
                inner.add_projection(expr, None, max_len);
            }
        }
        let projections = inner
            .projection_names()
            .map(|name| SqlExpr::column(name, ColumnOwner::Select(inner_id)))
            .collect();

        let order_by = std::mem::take(&mut inner.order_by);
        let lifted = order_by
            .iter()
            .map(|ordering| {
                let name = inner.add_projection(ordering.expr.clone(), None, max_len);
                SqlOrdering {
                    expr: SqlExpr::column(name, ColumnOwner::Select(inner_id)),
                    direction: ordering.direction,
                }
            })
            .collect();
        if inner.limit.is_some() || inner.offset.is_some() {
            inner.order_by = order_by;
        }

        self.selects.push(inner);
        self[id] = Select {
            projections,
            order_by: lifted,
            alias: outer_alias,
            ..Select::from_relation(Relation::Derived(inner_id))
        };
        inner_id
    }

    /// Selects reachable from `id` (itself included), through derived tables
    /// and subquery expressions.
    pub fn subtree(&self, id: SelectId) -> Vec<SelectId> {
        let mut visited = vec![id];
        let mut next = 0;
        while next < visited.len() {
            let select = &self[visited[next]];
            next += 1;

            let derived = select.from.iter().filter_map(|t| t.relation.as_derived().copied());
            let nested = select.exprs().flat_map(|e| e.subqueries());
            for child in derived.chain(nested).collect::<Vec<_>>() {
                if !visited.contains(&child) {
                    visited.push(child);
                }
            }
        }
        visited
    }

    /// True when a column somewhere in the subtree of `id` refers to a table
    /// that is not introduced within that subtree.
    pub fn is_correlated(&self, id: SelectId) -> bool {
        let subtree = self.subtree(id);

        let mut aliases = HashSet::new();
        for select in subtree.iter().map(|s| &self[*s]) {
            for table in &select.from {
                if let Relation::Table { alias, .. } = &table.relation {
                    aliases.insert(alias.as_str());
                }
            }
        }

        let mut correlated = false;
        for select in subtree.iter().map(|s| &self[*s]) {
            for expr in select.exprs() {
                expr.walk(&mut |e| {
                    if let SqlExpr::Column(column) = e {
                        let introduced = match &column.owner {
                            ColumnOwner::Table(alias) => aliases.contains(alias.as_str()),
                            ColumnOwner::Select(owner) => subtree.contains(owner),
                        };
                        correlated |= !introduced;
                    }
                });
            }
        }
        correlated
    }
}

impl Index<SelectId> for SqlQuery {
    type Output = Select;

    fn index(&self, id: SelectId) -> &Self::Output {
        &self.selects[id.get()]
    }
}

impl IndexMut<SelectId> for SqlQuery {
    fn index_mut(&mut self, id: SelectId) -> &mut Self::Output {
        &mut self.selects[id.get()]
    }
}
