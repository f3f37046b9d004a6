//! Runs compiled queries against an in-process SQLite database.
use rusqlite::{Connection, ToSql};

use qmsql::ast::{Expr, ResultOperator, SortDirection, Ty};
use qmsql::sql::Dialect;
use qmsql::CompiledQuery;

use super::fixtures::{c, from_customers, options};

const SCHEMA: &str = r#"
CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT NOT NULL, city TEXT);
CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER NOT NULL, total REAL NOT NULL);
INSERT INTO customers VALUES
    (1, 'Ann', 'Oslo'), (2, 'Bob', NULL), (3, 'Cid', 'Rome'), (4, 'Dee', 'Oslo'),
    (5, 'Eve', 'Lima'), (6, 'Fay', NULL), (7, 'Gus', 'Rome');
INSERT INTO orders VALUES (1, 1, 10.5), (2, 1, 20.0), (3, 3, 7.25);
"#;

fn connection() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    conn
}

/// Runs `plan`, binding `values` by placeholder name, and returns the first
/// column of every row as text.
fn names(conn: &Connection, plan: &CompiledQuery, values: &[(&str, &dyn ToSql)]) -> Vec<String> {
    let named: Vec<(String, &dyn ToSql)> = values
        .iter()
        .map(|(name, value)| (format!("@{name}"), *value))
        .collect();
    let named: Vec<(&str, &dyn ToSql)> = named.iter().map(|(n, v)| (n.as_str(), *v)).collect();

    let mut stmt = conn.prepare(&plan.sql).unwrap();
    let rows = stmt
        .query_map(named.as_slice(), |row| row.get::<_, String>(0))
        .unwrap();
    rows.map(|r| r.unwrap()).collect()
}

fn page_of_names(row_number_paging: bool) -> CompiledQuery {
    let model = from_customers()
        .order_by(c().member("Name", Ty::String), SortDirection::Desc)
        .select(c().member("Name", Ty::String))
        .skip(Expr::param("skip", Ty::Int32))
        .take(Expr::param("take", Ty::Int32));
    let options = options(Dialect::SQLite).with_row_number_paging(row_number_paging);
    qmsql::compile(&model, &options).unwrap()
}

#[test]
fn test_row_number_paging_matches_native() {
    let conn = connection();
    let values: [(&str, &dyn ToSql); 2] = [("skip", &2), ("take", &3)];

    let native = names(&conn, &page_of_names(false), &values);
    let emulated = names(&conn, &page_of_names(true), &values);

    assert_eq!(native, vec!["Eve", "Dee", "Cid"]);
    assert_eq!(emulated, native);
}

#[test]
fn test_any_and_count() {
    let conn = connection();
    let city = || c().member("City", Ty::String.nullable());

    let any = from_customers()
        .filter(city().equal(Expr::string("Rome")))
        .with(ResultOperator::Any);
    let plan = qmsql::compile(&any, &options(Dialect::SQLite)).unwrap();
    let found: i64 = conn.query_row(&plan.sql, [], |row| row.get(0)).unwrap();
    assert_eq!(found, 1);

    let count = from_customers()
        .filter(city().equal(Expr::null(Ty::String.nullable())))
        .with(ResultOperator::Count);
    let plan = qmsql::compile(&count, &options(Dialect::SQLite)).unwrap();
    let count: i64 = conn.query_row(&plan.sql, [], |row| row.get(0)).unwrap();
    assert_eq!(count, 2);
}
