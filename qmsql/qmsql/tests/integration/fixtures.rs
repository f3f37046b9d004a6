//! A small shop schema shared by the integration tests.
use qmsql::ast::{Expr, QueryModel, TableDef, Ty};
use qmsql::sql::Dialect;
use qmsql::{CompiledQuery, ErrorMessages, Options, Target};

pub(crate) fn customers() -> TableDef {
    TableDef::new("customers", "Customer")
        .column_named("Id", "id", Ty::Int32)
        .column_named("Name", "name", Ty::String)
        .column_named("City", "city", Ty::String.nullable())
}

pub(crate) fn orders() -> TableDef {
    TableDef::new("orders", "Order")
        .column_named("Id", "id", Ty::Int32)
        .column_named("CustomerId", "customer_id", Ty::Int32)
        .column_named("Total", "total", Ty::Float64)
}

/// Range variable over customers.
pub(crate) fn c() -> Expr {
    Expr::source("c", Ty::class("Customer"))
}

pub(crate) fn o() -> Expr {
    Expr::source("o", Ty::class("Order"))
}

pub(crate) fn from_customers() -> QueryModel {
    QueryModel::from_table("c", customers())
}

pub(crate) fn from_orders() -> QueryModel {
    QueryModel::from_table("o", orders())
}

pub(crate) fn options(dialect: Dialect) -> Options {
    Options::default()
        .no_format()
        .no_signature()
        .with_target(Target::Sql(Some(dialect)))
}

pub(crate) fn compile_for(
    model: &QueryModel,
    dialect: Dialect,
) -> Result<CompiledQuery, ErrorMessages> {
    qmsql::compile(model, &options(dialect))
}

/// SQL of `model` for `dialect`, which must compile.
pub(crate) fn sql_for(model: &QueryModel, dialect: Dialect) -> String {
    compile_for(model, dialect).unwrap().sql
}

/// Parses `sql` with the dialect of the matching engine.
pub(crate) fn assert_parses(sql: &str, dialect: Dialect) {
    use sqlparser::dialect as sp;
    use sqlparser::parser::Parser;

    let result = match dialect {
        Dialect::Generic => Parser::parse_sql(&sp::GenericDialect {}, sql),
        Dialect::MsSql | Dialect::MsSql2008 => Parser::parse_sql(&sp::MsSqlDialect {}, sql),
        Dialect::MySql => Parser::parse_sql(&sp::MySqlDialect {}, sql),
        Dialect::Postgres => Parser::parse_sql(&sp::PostgreSqlDialect {}, sql),
        Dialect::SQLite => Parser::parse_sql(&sp::SQLiteDialect {}, sql),
    };
    if let Err(err) = result {
        panic!("{dialect} SQL does not parse: {err}\n{sql}");
    }
}
