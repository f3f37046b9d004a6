//! Skip and Take across dialects, including `ROW_NUMBER()` paging for
//! engines without `OFFSET`.
use insta::assert_snapshot;
use qmsql::ast::{Expr, ResultOperator, SortDirection, Ty};
use qmsql::sql::Dialect;
use rstest::rstest;

use super::fixtures::{
    assert_parses, c, compile_for, from_customers, from_orders, o, options, sql_for,
};

fn page(skip: Expr, take: Expr) -> qmsql::ast::QueryModel {
    from_customers()
        .order_by(c().member("Name", Ty::String), SortDirection::Asc)
        .skip(skip)
        .take(take)
}

#[rstest]
#[case::generic(Dialect::Generic, "SELECT c.id, c.name, c.city FROM customers AS c ORDER BY c.name LIMIT 5 OFFSET 10")]
#[case::postgres(Dialect::Postgres, "SELECT c.id, c.name, c.city FROM customers AS c ORDER BY c.name LIMIT 5 OFFSET 10")]
#[case::mysql(Dialect::MySql, "SELECT c.id, c.name, c.city FROM customers AS c ORDER BY c.name LIMIT 5 OFFSET 10")]
#[case::sqlite(Dialect::SQLite, "SELECT c.id, c.name, c.city FROM customers AS c ORDER BY c.name LIMIT 5 OFFSET 10")]
#[case::mssql(Dialect::MsSql, "SELECT c.id, c.name, c.city FROM customers AS c ORDER BY c.name OFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY")]
#[case::mssql2008(Dialect::MsSql2008, "SELECT t.id, t.name, t.city FROM (SELECT c.id, c.name, c.city, ROW_NUMBER() OVER(ORDER BY c.name) AS [__RowNumber__] FROM customers AS c) AS t WHERE t.[__RowNumber__] > 10 AND t.[__RowNumber__] <= 15 ORDER BY t.name")]
fn test_skip_take(#[case] dialect: Dialect, #[case] expected: &str) {
    let sql = sql_for(&page(Expr::int(10), Expr::int(5)), dialect);
    similar_asserts::assert_eq!(sql, expected);
    assert_parses(&sql, dialect);
}

#[test]
fn test_row_number_paging_with_parameters() {
    let model = page(
        Expr::param("skip", Ty::Int32),
        Expr::param("take", Ty::Int32),
    );

    let compiled = compile_for(&model, Dialect::MsSql2008).unwrap();
    let (_, predicate) = compiled.sql.split_once(" WHERE ").unwrap();
    assert_snapshot!(predicate, @"t.[__RowNumber__] > @skip AND t.[__RowNumber__] <= @skip + @take ORDER BY t.name");

    let names: Vec<_> = compiled.parameters.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["skip", "take"]);
}

#[test]
fn test_row_number_paging_on_request() {
    let options = options(Dialect::Postgres).with_row_number_paging(true);
    let sql = qmsql::compile(&page(Expr::int(10), Expr::int(5)), &options)
        .unwrap()
        .sql;

    assert_snapshot!(sql, @r###"SELECT t.id, t.name, t.city FROM (SELECT c.id, c.name, c.city, ROW_NUMBER() OVER(ORDER BY c.name) AS "__RowNumber__" FROM customers AS c) AS t WHERE t."__RowNumber__" > 10 AND t."__RowNumber__" <= 15 ORDER BY t.name"###);
    assert_parses(&sql, Dialect::Postgres);
}

#[test]
fn test_unordered_skip() {
    let model = from_customers().skip(Expr::int(3));

    assert_snapshot!(sql_for(&model, Dialect::SQLite), @"SELECT c.id, c.name, c.city FROM customers AS c LIMIT -1 OFFSET 3");
    assert_snapshot!(sql_for(&model, Dialect::MsSql), @"SELECT c.id, c.name, c.city FROM customers AS c ORDER BY (SELECT 1) OFFSET 3 ROWS");
    assert_snapshot!(sql_for(&model, Dialect::MsSql2008), @"SELECT t.id, t.name, t.city FROM (SELECT c.id, c.name, c.city, ROW_NUMBER() OVER(ORDER BY (SELECT 1)) AS [__RowNumber__] FROM customers AS c) AS t WHERE t.[__RowNumber__] > 3");
}

#[test]
fn test_take_only_uses_top() {
    let model = from_customers().take(Expr::int(3));
    assert_snapshot!(sql_for(&model, Dialect::MsSql2008), @"SELECT TOP(3) c.id, c.name, c.city FROM customers AS c");
}

#[test]
fn test_skip_take_skip() {
    // the second Skip applies to the page, so the page becomes a derived table
    let model = page(Expr::int(10), Expr::int(5)).skip(Expr::int(2));
    let sql = sql_for(&model, Dialect::Postgres);

    assert_snapshot!(sql, @"SELECT t.id, t.name, t.city FROM (SELECT c.id, c.name, c.city FROM customers AS c ORDER BY c.name LIMIT 5 OFFSET 10) AS t ORDER BY t.name OFFSET 2");
    assert_parses(&sql, Dialect::Postgres);
}

#[test]
fn test_paged_any() {
    let model = page(Expr::int(10), Expr::int(5)).with(ResultOperator::Any);

    let sql = sql_for(&model, Dialect::MsSql2008);
    assert!(sql.starts_with("SELECT CASE WHEN EXISTS (SELECT 1 FROM (SELECT "), "{sql}");
    assert!(sql.contains("ROW_NUMBER() OVER(ORDER BY c.name)"), "{sql}");
    assert!(!sql.contains("OFFSET"), "{sql}");
}

/// Orders from the second largest on, by total.
fn after_largest_order() -> qmsql::ast::QueryModel {
    from_orders()
        .order_by(o().member("Total", Ty::Float64), SortDirection::Desc)
        .skip(Expr::int(1))
}

#[test]
fn test_paged_in_operand() {
    let customer_ids = after_largest_order()
        .select(o().member("CustomerId", Ty::Int32))
        .with(ResultOperator::Contains(c().member("Id", Ty::Int32)));
    let model = from_customers().filter(Expr::subquery(customer_ids, Ty::Bool));

    let sql = sql_for(&model, Dialect::MsSql2008);
    let (_, operand) = sql.split_once(" IN (").unwrap();
    assert!(operand.contains("ROW_NUMBER() OVER(ORDER BY o.total DESC)"), "{sql}");
    // a nested select without TOP cannot be ordered
    assert!(!operand.contains(" ORDER BY t."), "{sql}");
    assert!(operand.ends_with("WHERE t.[__RowNumber__] > 1)"), "{sql}");
    assert_parses(&sql, Dialect::MsSql2008);
}

#[test]
fn test_paged_scalar_subquery() {
    let second_largest = after_largest_order()
        .filter(o().member("CustomerId", Ty::Int32).equal(c().member("Id", Ty::Int32)))
        .select(o().member("Total", Ty::Float64))
        .with(ResultOperator::FirstOrDefault);
    let model = from_customers().select(Expr::new_object(vec![
        ("Name", c().member("Name", Ty::String)),
        ("Runner", Expr::subquery(second_largest, Ty::Float64.nullable())),
    ]));

    let sql = sql_for(&model, Dialect::MsSql2008);
    assert!(sql.contains("ROW_NUMBER() OVER(ORDER BY o.total DESC)"), "{sql}");
    assert!(!sql.contains(" ORDER BY t."), "{sql}");
    assert!(
        sql.contains("t.[__RowNumber__] > 1 AND t.[__RowNumber__] <= 2) AS [Runner]"),
        "{sql}"
    );
    assert_parses(&sql, Dialect::MsSql2008);
}

#[test]
fn test_row_number_paging_is_deterministic() {
    let model = page(Expr::int(10), Expr::int(5))
        .then_by(c().member("Id", Ty::Int32), SortDirection::Desc);

    let first = compile_for(&model, Dialect::MsSql2008).unwrap();
    let second = compile_for(&model, Dialect::MsSql2008).unwrap();
    similar_asserts::assert_eq!(first.sql, second.sql);

    // ties on the name are broken by the later key, in declaration order
    assert!(
        first.sql.contains("ROW_NUMBER() OVER(ORDER BY c.name, c.id DESC)"),
        "{}",
        first.sql
    );
    assert!(first.sql.ends_with("ORDER BY t.name, t.id DESC"), "{}", first.sql);
}
