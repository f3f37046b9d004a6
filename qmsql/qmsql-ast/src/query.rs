//! The declarative description of a query, as produced by a query-parsing
//! front end: a main source, body clauses, a projection and result operators.
use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};

use crate::expr::Expr;
use crate::types::Ty;

#[derive(Debug, Clone, PartialEq, Hash, Serialize, Deserialize)]
pub struct QueryModel {
    pub from: FromClause,
    pub clauses: Vec<BodyClause>,
    /// Projection selector. `None` selects the main source item itself.
    pub select: Option<Expr>,
    pub result_operators: Vec<ResultOperator>,
}

#[derive(Debug, Clone, PartialEq, Hash, Serialize, Deserialize)]
pub struct FromClause {
    /// Name of the range variable introduced by this clause.
    pub name: String,
    pub source: QuerySource,
}

#[derive(Debug, Clone, PartialEq, Hash, Serialize, Deserialize, EnumAsInner)]
pub enum QuerySource {
    Table(TableDef),
    Subquery(Box<QueryModel>),
}

/// Mapping of an entity type onto a table, as supplied by the metadata layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub schema: Option<String>,
    pub entity: String,
    pub columns: Vec<ColumnDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnDef {
    pub member: String,
    pub column: String,
    pub ty: Ty,
}

#[derive(Debug, Clone, PartialEq, Hash, Serialize, Deserialize, EnumAsInner)]
pub enum BodyClause {
    Where(Expr),
    /// Establishes a new primary ordering; earlier keys become secondary.
    OrderBy(Vec<Ordering>),
    /// Appends keys to the current ordering.
    ThenBy(Vec<Ordering>),
    Join(JoinClause),
    /// A second source; correlated subqueries become lateral joins.
    AdditionalFrom(FromClause),
    GroupBy(GroupByClause),
}

#[derive(Debug, Clone, PartialEq, Hash, Serialize, Deserialize)]
pub struct JoinClause {
    pub item: FromClause,
    pub outer_key: Expr,
    pub inner_key: Expr,
    pub kind: JoinKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    LeftOuter,
}

/// Groups rows by `keys`, introducing a grouping range variable named `name`.
///
/// The key of a single-key grouping is `g.Key`; members of a composite key
/// are `g.Key.<member>`. Aggregates are `Enumerable` calls whose first
/// argument is the grouping reference.
#[derive(Debug, Clone, PartialEq, Hash, Serialize, Deserialize)]
pub struct GroupByClause {
    pub name: String,
    pub keys: Vec<(String, Expr)>,
}

#[derive(Debug, Clone, PartialEq, Hash, Serialize, Deserialize)]
pub struct Ordering {
    pub expr: Expr,
    pub direction: SortDirection,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, strum::Display,
)]
pub enum SortDirection {
    #[default]
    #[strum(to_string = "ASC")]
    Asc,
    #[strum(to_string = "DESC")]
    Desc,
}

#[derive(Debug, Clone, PartialEq, Hash, Serialize, Deserialize, EnumAsInner, strum::AsRefStr)]
pub enum ResultOperator {
    Skip(Expr),
    Take(Expr),
    Distinct,
    First,
    FirstOrDefault,
    Single,
    SingleOrDefault,
    Any,
    All(Expr),
    Contains(Expr),
    Count,
    LongCount,
    Sum,
    Min,
    Max,
    Average,
}

impl ResultOperator {
    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            ResultOperator::Count
                | ResultOperator::LongCount
                | ResultOperator::Sum
                | ResultOperator::Min
                | ResultOperator::Max
                | ResultOperator::Average
        )
    }

    /// True for operators that reduce the sequence to a single boolean.
    pub fn is_predicate(&self) -> bool {
        matches!(
            self,
            ResultOperator::Any | ResultOperator::All(_) | ResultOperator::Contains(_)
        )
    }
}

impl TableDef {
    pub fn new<N: ToString, E: ToString>(name: N, entity: E) -> Self {
        TableDef {
            name: name.to_string(),
            schema: None,
            entity: entity.to_string(),
            columns: Vec::new(),
        }
    }

    pub fn with_schema<S: ToString>(mut self, schema: S) -> Self {
        self.schema = Some(schema.to_string());
        self
    }

    /// Adds a column named after its member.
    pub fn column<S: ToString>(self, member: S, ty: Ty) -> Self {
        let member = member.to_string();
        self.column_named(member.clone(), member, ty)
    }

    pub fn column_named<M: ToString, C: ToString>(mut self, member: M, column: C, ty: Ty) -> Self {
        self.columns.push(ColumnDef {
            member: member.to_string(),
            column: column.to_string(),
            ty,
        });
        self
    }

    pub fn ty(&self) -> Ty {
        Ty::class(&self.entity)
    }
}

impl FromClause {
    pub fn table<S: ToString>(name: S, table: TableDef) -> Self {
        FromClause {
            name: name.to_string(),
            source: QuerySource::Table(table),
        }
    }

    pub fn subquery<S: ToString>(name: S, query: QueryModel) -> Self {
        FromClause {
            name: name.to_string(),
            source: QuerySource::Subquery(Box::new(query)),
        }
    }

    /// Type of the range variable.
    pub fn item_ty(&self) -> Ty {
        match &self.source {
            QuerySource::Table(table) => table.ty(),
            QuerySource::Subquery(query) => query.element_ty(),
        }
    }

    /// Reference to the range variable, for use in expressions.
    pub fn item(&self) -> Expr {
        Expr::source(&self.name, self.item_ty())
    }
}

impl QueryModel {
    pub fn new(from: FromClause) -> Self {
        QueryModel {
            from,
            clauses: Vec::new(),
            select: None,
            result_operators: Vec::new(),
        }
    }

    pub fn from_table<S: ToString>(name: S, table: TableDef) -> Self {
        QueryModel::new(FromClause::table(name, table))
    }

    pub fn from_subquery<S: ToString>(name: S, query: QueryModel) -> Self {
        QueryModel::new(FromClause::subquery(name, query))
    }

    /// Reference to the main source item.
    pub fn item(&self) -> Expr {
        self.from.item()
    }

    /// Type of the elements of the sequence, before result operators.
    pub fn element_ty(&self) -> Ty {
        match &self.select {
            Some(select) => select.ty.clone(),
            None => self.from.item_ty(),
        }
    }

    pub fn with_clause(mut self, clause: BodyClause) -> Self {
        self.clauses.push(clause);
        self
    }

    pub fn filter(self, predicate: Expr) -> Self {
        self.with_clause(BodyClause::Where(predicate))
    }

    pub fn order_by(self, expr: Expr, direction: SortDirection) -> Self {
        self.with_clause(BodyClause::OrderBy(vec![Ordering { expr, direction }]))
    }

    pub fn then_by(self, expr: Expr, direction: SortDirection) -> Self {
        self.with_clause(BodyClause::ThenBy(vec![Ordering { expr, direction }]))
    }

    pub fn join(self, item: FromClause, outer_key: Expr, inner_key: Expr, kind: JoinKind) -> Self {
        self.with_clause(BodyClause::Join(JoinClause {
            item,
            outer_key,
            inner_key,
            kind,
        }))
    }

    pub fn additional_from(self, item: FromClause) -> Self {
        self.with_clause(BodyClause::AdditionalFrom(item))
    }

    pub fn group_by<S: ToString, K: ToString>(self, name: S, keys: Vec<(K, Expr)>) -> Self {
        let keys = keys.into_iter().map(|(k, e)| (k.to_string(), e)).collect();
        self.with_clause(BodyClause::GroupBy(GroupByClause {
            name: name.to_string(),
            keys,
        }))
    }

    pub fn select(mut self, selector: Expr) -> Self {
        self.select = Some(selector);
        self
    }

    pub fn with(mut self, operator: ResultOperator) -> Self {
        self.result_operators.push(operator);
        self
    }

    pub fn skip(self, count: Expr) -> Self {
        self.with(ResultOperator::Skip(count))
    }

    pub fn take(self, count: Expr) -> Self {
        self.with(ResultOperator::Take(count))
    }

    pub fn distinct(self) -> Self {
        self.with(ResultOperator::Distinct)
    }
}
