//! Input side of the qmsql compiler.
//!
//! A [QueryModel] describes a query as produced by a query-parsing front end:
//! a main source, body clauses (filters, orderings, joins, grouping), a
//! projection and result operators (paging, aggregates, quantifiers). The
//! predicates and projections inside it are [Expr] trees typed with host
//! types ([Ty]).
//!
//! Nothing here knows about SQL; see the `qmsql` crate for the compiler.

mod display;
pub mod error;
pub mod expr;
pub mod query;
pub mod types;

pub use error::{Error, Errors, MessageKind, Reason, WithErrorInfo};
pub use expr::{BinOp, Expr, ExprKind, Literal, MethodId, UnOp};
pub use query::{
    BodyClause, ColumnDef, FromClause, GroupByClause, JoinClause, JoinKind, Ordering,
    QueryModel, QuerySource, ResultOperator, SortDirection, TableDef,
};
pub use types::Ty;
