use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};

use qmsql_ast::{Literal, SortDirection, Ty};

/// Index of a [super::Select] within its [super::SqlQuery] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SelectId(usize);

impl SelectId {
    pub fn get(&self) -> usize {
        self.0
    }
}

impl From<usize> for SelectId {
    fn from(id: usize) -> Self {
        SelectId(id)
    }
}

/// What a [Column] belongs to: a base table (by its alias) or a derived table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumAsInner)]
pub enum ColumnOwner {
    Table(String),
    Select(SelectId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub owner: ColumnOwner,
}

/// A node of the relational output tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumAsInner)]
pub enum SqlExpr {
    Column(Column),

    /// An expression exposed under a name. Outside of a projection list this
    /// renders as the inner expression.
    Alias {
        name: String,
        inner: Box<SqlExpr>,
    },

    Literal(Literal),

    Param(String),

    /// Raw SQL, emitted verbatim.
    Fragment(String),

    Unary {
        op: SqlUnOp,
        operand: Box<SqlExpr>,
    },

    Binary {
        op: SqlBinOp,
        left: Box<SqlExpr>,
        right: Box<SqlExpr>,
    },

    IsNull {
        operand: Box<SqlExpr>,
        negated: bool,
    },

    Case {
        cases: Vec<(SqlExpr, SqlExpr)>,
        default: Option<Box<SqlExpr>>,
    },

    Exists(SelectId),

    /// Scalar subquery.
    Subquery(SelectId),

    In {
        operand: Box<SqlExpr>,
        subquery: SelectId,
    },

    RowNumber {
        order_by: Vec<SqlOrdering>,
    },

    Function {
        name: String,
        args: Vec<SqlExpr>,
    },

    Like {
        matched: Box<SqlExpr>,
        pattern: Box<SqlExpr>,
        escape: Option<Box<SqlExpr>>,
    },

    StringCompare {
        op: CompareOp,
        left: Box<SqlExpr>,
        right: Box<SqlExpr>,
    },

    /// `CAST(inner AS ty)`, with the store type chosen by the dialect.
    Cast {
        inner: Box<SqlExpr>,
        ty: Ty,
    },

    /// Change of static type only; renders as the operand.
    Convert {
        inner: Box<SqlExpr>,
        ty: Ty,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlUnOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::AsRefStr)]
pub enum SqlBinOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "%")]
    Mod,
    #[strum(serialize = "&")]
    BitAnd,
    #[strum(serialize = "|")]
    BitOr,
    #[strum(serialize = "AND")]
    And,
    #[strum(serialize = "OR")]
    Or,
    #[strum(serialize = "=")]
    Eq,
    #[strum(serialize = "<>")]
    Ne,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Lte,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Gte,
}

impl SqlBinOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            SqlBinOp::Eq | SqlBinOp::Ne | SqlBinOp::Lt | SqlBinOp::Lte | SqlBinOp::Gt | SqlBinOp::Gte
        )
    }
}

/// Relational operator of a [SqlExpr::StringCompare].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    /// The operator that gives the same result with operands swapped.
    pub fn mirror(self) -> Self {
        match self {
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Lte => CompareOp::Gte,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Gte => CompareOp::Lte,
            op => op,
        }
    }
}

impl From<CompareOp> for SqlBinOp {
    fn from(op: CompareOp) -> Self {
        match op {
            CompareOp::Eq => SqlBinOp::Eq,
            CompareOp::Ne => SqlBinOp::Ne,
            CompareOp::Lt => SqlBinOp::Lt,
            CompareOp::Lte => SqlBinOp::Lte,
            CompareOp::Gt => SqlBinOp::Gt,
            CompareOp::Gte => SqlBinOp::Gte,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlOrdering {
    pub expr: SqlExpr,
    pub direction: SortDirection,
}

impl SqlOrdering {
    pub fn asc(expr: SqlExpr) -> Self {
        SqlOrdering {
            expr,
            direction: SortDirection::Asc,
        }
    }
}

impl SqlExpr {
    pub fn column<S: ToString>(name: S, owner: ColumnOwner) -> Self {
        SqlExpr::Column(Column {
            name: name.to_string(),
            owner,
        })
    }

    pub fn int(value: i64) -> Self {
        SqlExpr::Literal(Literal::Integer(value))
    }

    pub fn boolean(value: bool) -> Self {
        SqlExpr::Literal(Literal::Boolean(value))
    }

    pub fn binary(op: SqlBinOp, left: SqlExpr, right: SqlExpr) -> Self {
        SqlExpr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn and(left: SqlExpr, right: SqlExpr) -> Self {
        SqlExpr::binary(SqlBinOp::And, left, right)
    }

    pub fn or(left: SqlExpr, right: SqlExpr) -> Self {
        SqlExpr::binary(SqlBinOp::Or, left, right)
    }

    pub fn negate(self) -> Self {
        SqlExpr::Unary {
            op: SqlUnOp::Not,
            operand: Box::new(self),
        }
    }

    pub fn function<S: ToString>(name: S, args: Vec<SqlExpr>) -> Self {
        SqlExpr::Function {
            name: name.to_string(),
            args,
        }
    }

    pub fn cast(self, ty: Ty) -> Self {
        SqlExpr::Cast {
            inner: Box::new(self),
            ty,
        }
    }

    pub fn convert(self, ty: Ty) -> Self {
        SqlExpr::Convert {
            inner: Box::new(self.strip_convert()),
            ty,
        }
    }

    pub fn strip_convert(self) -> SqlExpr {
        match self {
            SqlExpr::Convert { inner, .. } => inner.strip_convert(),
            expr => expr,
        }
    }

    /// The expression an [SqlExpr::Alias] stands for.
    pub fn strip_alias(&self) -> &SqlExpr {
        match self {
            SqlExpr::Alias { inner, .. } => inner.strip_alias(),
            expr => expr,
        }
    }

    /// True for expressions that yield a truth value in SQL grammar terms
    /// (a search condition), rather than a value.
    pub fn is_condition(&self) -> bool {
        match self {
            SqlExpr::Binary { op, .. } => {
                op.is_comparison() || matches!(op, SqlBinOp::And | SqlBinOp::Or)
            }
            SqlExpr::Unary { op, .. } => *op == SqlUnOp::Not,
            SqlExpr::Convert { inner, .. } | SqlExpr::Alias { inner, .. } => inner.is_condition(),
            SqlExpr::IsNull { .. }
            | SqlExpr::Exists(_)
            | SqlExpr::In { .. }
            | SqlExpr::Like { .. }
            | SqlExpr::StringCompare { .. } => true,
            _ => false,
        }
    }

    /// Calls `f` for this node and every nested node, depth-first. Does not
    /// descend into subqueries.
    pub fn walk<'a, F: FnMut(&'a SqlExpr)>(&'a self, f: &mut F) {
        f(self);
        match self {
            SqlExpr::Alias { inner, .. }
            | SqlExpr::Cast { inner, .. }
            | SqlExpr::Convert { inner, .. } => inner.walk(f),
            SqlExpr::Unary { operand, .. }
            | SqlExpr::IsNull { operand, .. }
            | SqlExpr::In { operand, .. } => operand.walk(f),
            SqlExpr::Binary { left, right, .. } | SqlExpr::StringCompare { left, right, .. } => {
                left.walk(f);
                right.walk(f);
            }
            SqlExpr::Case { cases, default } => {
                for (condition, result) in cases {
                    condition.walk(f);
                    result.walk(f);
                }
                if let Some(default) = default {
                    default.walk(f);
                }
            }
            SqlExpr::RowNumber { order_by } => {
                for ordering in order_by {
                    ordering.expr.walk(f);
                }
            }
            SqlExpr::Function { args, .. } => {
                for arg in args {
                    arg.walk(f);
                }
            }
            SqlExpr::Like {
                matched,
                pattern,
                escape,
            } => {
                matched.walk(f);
                pattern.walk(f);
                if let Some(escape) = escape {
                    escape.walk(f);
                }
            }
            SqlExpr::Column(_)
            | SqlExpr::Literal(_)
            | SqlExpr::Param(_)
            | SqlExpr::Fragment(_)
            | SqlExpr::Exists(_)
            | SqlExpr::Subquery(_) => {}
        }
    }

    /// Subqueries referenced directly by this expression tree.
    pub fn subqueries(&self) -> Vec<SelectId> {
        let mut ids = Vec::new();
        self.walk(&mut |e| match e {
            SqlExpr::Exists(id) | SqlExpr::Subquery(id) | SqlExpr::In { subquery: id, .. } => {
                ids.push(*id)
            }
            _ => {}
        });
        ids
    }
}

/// Conjunction of all given conditions, if any.
pub fn and_all<I: IntoIterator<Item = SqlExpr>>(conditions: I) -> Option<SqlExpr> {
    conditions.into_iter().reduce(SqlExpr::and)
}
