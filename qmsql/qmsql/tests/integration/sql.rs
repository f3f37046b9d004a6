//! Simple tests for "this query model creates this SQL" go here.
use insta::assert_snapshot;
use qmsql::ast::{Expr, FromClause, JoinKind, MethodId, QueryModel, ResultOperator, SortDirection, Ty};
use qmsql::sql::Dialect;
use rstest::rstest;

use super::fixtures::{
    assert_parses, c, compile_for, from_customers, from_orders, o, options, orders,
    sql_for,
};

fn name() -> Expr {
    c().member("Name", Ty::String)
}

fn city() -> Expr {
    c().member("City", Ty::String.nullable())
}

fn count(group: Expr) -> Expr {
    let method = MethodId::static_method("Enumerable", "Count", vec![Ty::sequence(Ty::Object)]);
    Expr::call_static(method, vec![group], Ty::Int32)
}

fn sum(group: Expr, selector: Expr) -> Expr {
    let method = MethodId::static_method(
        "Enumerable",
        "Sum",
        vec![Ty::sequence(Ty::Object), Ty::Object],
    );
    let ty = selector.ty.clone();
    Expr::call_static(method, vec![group, selector], ty)
}

#[test]
fn test_filter_order_take() {
    let model = from_customers()
        .filter(city().equal(Expr::string("London")))
        .order_by(name(), SortDirection::Asc)
        .take(Expr::int(10));

    assert_snapshot!(sql_for(&model, Dialect::Postgres), @"SELECT c.id, c.name, c.city FROM customers AS c WHERE c.city = 'London' ORDER BY c.name LIMIT 10");
    assert_snapshot!(sql_for(&model, Dialect::MsSql), @"SELECT TOP(10) c.id, c.name, c.city FROM customers AS c WHERE c.city = N'London' ORDER BY c.name");
}

#[test]
fn test_null_comparison() {
    let model = from_customers()
        .filter(city().equal(Expr::null(Ty::String.nullable())))
        .order_by(name(), SortDirection::Desc);

    assert_snapshot!(sql_for(&model, Dialect::Generic), @"SELECT c.id, c.name, c.city FROM customers AS c WHERE c.city IS NULL ORDER BY c.name DESC");
}

#[test]
fn test_join() {
    let model = from_customers()
        .join(
            FromClause::table("o", orders()),
            c().member("Id", Ty::Int32),
            o().member("CustomerId", Ty::Int32),
            JoinKind::Inner,
        )
        .select(Expr::new_object(vec![
            ("Name", name()),
            ("Total", o().member("Total", Ty::Float64)),
        ]));

    let compiled = compile_for(&model, Dialect::Postgres).unwrap();
    assert_snapshot!(compiled.sql, @r###"SELECT c.name AS "Name", o.total AS "Total" FROM customers AS c INNER JOIN orders AS o ON c.id = o.customer_id"###);

    let members: Vec<_> = compiled
        .columns
        .iter()
        .map(|c| c.member.as_deref())
        .collect();
    assert_eq!(members, vec![Some("Name"), Some("Total")]);
}

#[test]
fn test_group_by() {
    let g = Expr::source("g", Ty::class("IGrouping"));
    let model = from_orders()
        .group_by("g", vec![("Key", o().member("CustomerId", Ty::Int32))])
        .select(Expr::new_object(vec![
            ("CustomerId", g.clone().member("Key", Ty::Int32)),
            ("Orders", count(g.clone())),
            ("Total", sum(g, o().member("Total", Ty::Float64))),
        ]));

    assert_snapshot!(sql_for(&model, Dialect::Postgres), @r###"SELECT o.customer_id AS "CustomerId", COUNT(*) AS "Orders", SUM(o.total) AS "Total" FROM orders AS o GROUP BY o.customer_id"###);
}

#[rstest]
#[case::postgres(Dialect::Postgres, "SELECT CASE WHEN EXISTS (SELECT 1 FROM customers AS c WHERE c.city = 'Paris') THEN TRUE ELSE FALSE END AS c")]
#[case::sqlite(Dialect::SQLite, "SELECT CASE WHEN EXISTS (SELECT 1 FROM customers AS c WHERE c.city = 'Paris') THEN 1 ELSE 0 END AS c")]
#[case::mssql(Dialect::MsSql, "SELECT CASE WHEN EXISTS (SELECT 1 FROM customers AS c WHERE c.city = N'Paris') THEN CAST(1 AS bit) ELSE CAST(0 AS bit) END AS c")]
fn test_any(#[case] dialect: Dialect, #[case] expected: &str) {
    let model = from_customers()
        .filter(city().equal(Expr::string("Paris")))
        .order_by(name(), SortDirection::Asc)
        .with(ResultOperator::Any);

    let compiled = compile_for(&model, dialect).unwrap();
    similar_asserts::assert_eq!(compiled.sql, expected);
    assert_eq!(compiled.columns.len(), 1);
    assert_eq!(compiled.columns[0].ty, Ty::Bool);
}

#[test]
fn test_contains_becomes_in() {
    let customer_ids = from_orders()
        .select(o().member("CustomerId", Ty::Int32))
        .with(ResultOperator::Contains(c().member("Id", Ty::Int32)));
    let model = from_customers().filter(Expr::subquery(customer_ids, Ty::Bool));

    assert_snapshot!(sql_for(&model, Dialect::Generic), @"SELECT c.id, c.name, c.city FROM customers AS c WHERE c.id IN (SELECT o.customer_id FROM orders AS o)");
}

#[test]
fn test_correlated_aggregate() {
    let order_count = from_orders()
        .filter(o().member("CustomerId", Ty::Int32).equal(c().member("Id", Ty::Int32)))
        .with(ResultOperator::Count);
    let model = from_customers().select(Expr::new_object(vec![
        ("Name", name()),
        ("Orders", Expr::subquery(order_count, Ty::Int32)),
    ]));

    assert_snapshot!(sql_for(&model, Dialect::SQLite), @r###"SELECT c.name AS "Name", (SELECT COUNT(*) AS c FROM orders AS o WHERE o.customer_id = c.id) AS "Orders" FROM customers AS c"###);
}

#[test]
fn test_take_then_distinct_pushes_down() {
    let model = from_customers()
        .take(Expr::int(5))
        .select(city())
        .distinct();

    assert_snapshot!(sql_for(&model, Dialect::Postgres), @"SELECT DISTINCT t.city FROM (SELECT c.id, c.name, c.city FROM customers AS c LIMIT 5) AS t");

    let model = from_customers().select(city()).distinct().take(Expr::int(5));
    assert_snapshot!(sql_for(&model, Dialect::Postgres), @"SELECT DISTINCT c.city FROM customers AS c LIMIT 5");
}

#[test]
fn test_filter_after_take_pushes_down() {
    // clauses of one model apply before its result operators
    let model = QueryModel::from_subquery("c", from_customers().take(Expr::int(5)))
        .filter(city().equal(Expr::string("Oslo")));

    assert_snapshot!(sql_for(&model, Dialect::SQLite), @"SELECT t.id, t.name, t.city FROM (SELECT c.id, c.name, c.city FROM customers AS c LIMIT 5) AS t WHERE t.city = 'Oslo'");
}

#[test]
fn test_lateral_join() {
    let x = Expr::source("x", Ty::class("Order"));
    let recent = from_orders()
        .filter(o().member("CustomerId", Ty::Int32).equal(c().member("Id", Ty::Int32)))
        .take(Expr::int(2));
    let model = from_customers()
        .additional_from(FromClause::subquery("x", recent))
        .select(Expr::new_object(vec![
            ("Name", name()),
            ("Total", x.member("Total", Ty::Float64)),
        ]));

    let sql = sql_for(&model, Dialect::Postgres);
    assert!(sql.contains(" CROSS JOIN LATERAL (SELECT "), "{sql}");
    assert!(sql.contains("WHERE o.customer_id = c.id LIMIT 2) AS "), "{sql}");

    let sql = sql_for(&model, Dialect::MsSql);
    assert!(sql.contains(" CROSS APPLY (SELECT TOP(2) "), "{sql}");
}

#[rstest]
#[case::postgres(Dialect::Postgres, "c.name = $1 OR c.city = $1", vec!["name"])]
#[case::mysql(Dialect::MySql, "c.name = ? OR c.city = ?", vec!["name", "name"])]
#[case::mssql(Dialect::MsSql, "c.name = @name OR c.city = @name", vec!["name"])]
fn test_parameters(#[case] dialect: Dialect, #[case] predicate: &str, #[case] slots: Vec<&str>) {
    let param = || Expr::param("name", Ty::String);
    let model = from_customers().filter(Expr::binary(
        qmsql::ast::BinOp::OrElse,
        name().equal(param()),
        city().equal(param()),
    ));

    let compiled = compile_for(&model, dialect).unwrap();
    let (_, rendered) = compiled.sql.split_once(" WHERE ").unwrap();
    assert_eq!(rendered, predicate);

    let names: Vec<_> = compiled.parameters.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, slots);
    assert!(compiled.parameters.iter().all(|p| p.ty == Ty::String));
}

#[rstest]
#[case::generic(Dialect::Generic)]
#[case::mssql(Dialect::MsSql)]
#[case::mysql(Dialect::MySql)]
#[case::postgres(Dialect::Postgres)]
#[case::sqlite(Dialect::SQLite)]
fn test_output_parses(#[case] dialect: Dialect) {
    let model = from_customers()
        .join(
            FromClause::table("o", orders()),
            c().member("Id", Ty::Int32),
            o().member("CustomerId", Ty::Int32),
            JoinKind::LeftOuter,
        )
        .filter(city().equal(Expr::string("it's")))
        .order_by(name(), SortDirection::Desc)
        .select(Expr::new_object(vec![
            ("Name", name()),
            ("Total", o().member("Total", Ty::Float64)),
        ]))
        .skip(Expr::int(20))
        .take(Expr::int(10));

    assert_parses(&sql_for(&model, dialect), dialect);
}

#[test]
fn test_format_and_signature() {
    let model = from_customers().take(Expr::int(1));
    let options = options(Dialect::Postgres)
        .with_format(true)
        .with_signature_comment(true);

    let sql = qmsql::compile(&model, &options).unwrap().sql;
    assert!(sql.starts_with("SELECT\n"), "{sql}");
    assert!(sql.ends_with("(target: sql.postgres)\n"), "{sql}");
    assert!(sql.contains(&format!(
        "-- Generated by qmsql compiler version:{}",
        qmsql::compiler_version()
    )));

    let sql = qmsql::compile(&model, &options.no_format()).unwrap().sql;
    assert!(sql.starts_with("SELECT c.id, c.name, c.city FROM customers AS c LIMIT 1 -- Generated"), "{sql}");
}

#[test]
fn test_json_query_model() {
    let model = from_customers()
        .filter(city().equal(Expr::param("city", Ty::String)))
        .take(Expr::int(3));

    let json = qmsql::json::from_query_model(&model).unwrap();
    let parsed = qmsql::json::to_query_model(&json).unwrap();
    assert_eq!(parsed, model);
    assert_eq!(
        sql_for(&parsed, Dialect::SQLite),
        sql_for(&model, Dialect::SQLite)
    );

    assert!(qmsql::json::to_query_model("{").is_err());
}

#[test]
fn test_sql_tree() {
    let model = from_customers().take(Expr::int(3));
    let options = options(Dialect::SQLite);

    let tree = qmsql::internal::query_model_to_sql_tree(&model, &options).unwrap();
    let json = qmsql::json::from_sql_tree(&tree).unwrap();
    let tree = qmsql::json::to_sql_tree(&json).unwrap();

    assert_snapshot!(qmsql::internal::sql_tree_to_sql(tree, &options).unwrap(), @"SELECT c.id, c.name, c.city FROM customers AS c LIMIT 3");
}
