//! Errors the compiler reports for queries it cannot translate.
use std::collections::HashMap;

use insta::assert_snapshot;
use qmsql::ast::{Expr, FromClause, QueryModel, TableDef, Ty};
use qmsql::sql::Dialect;

use super::fixtures::{c, compile_for, from_customers, from_orders, o};

#[test]
fn test_identifier_too_long() {
    let name = "customers_with_a_table_name_that_goes_on_for_quite_a_while_longer";
    let model = QueryModel::from_table("c", TableDef::new(name, "Customer").column("id", Ty::Int32));

    assert_snapshot!(compile_for(&model, Dialect::Postgres).unwrap_err(), @r###"
    [E0002] Error: identifier `customers_with_a_table_name_that_goes_on_for_quite_a_while_longer` expected at most 63 characters, but found 65
    ↳ Hint: map the entity or member onto a shorter name
    "###);

    // fine where identifiers may be longer
    assert!(compile_for(&model, Dialect::MsSql).is_ok());
}

#[test]
fn test_lateral_join_unsupported() {
    let recent = from_orders()
        .filter(o().member("CustomerId", Ty::Int32).equal(c().member("Id", Ty::Int32)))
        .take(Expr::int(2));
    let model = from_customers().additional_from(FromClause::subquery("x", recent));

    let err = compile_for(&model, Dialect::SQLite).unwrap_err();
    assert_eq!(err.inner[0].code.as_deref(), Some("E0003"));
    assert_snapshot!(err.inner[0].reason, @"source `x` expected a source that does not refer to the enclosing query, but found a correlated subquery");

    // uncorrelated sources are a plain cross join
    let model = from_customers().additional_from(FromClause::subquery("x", from_orders().take(Expr::int(2))));
    let sql = compile_for(&model, Dialect::SQLite).unwrap().sql;
    assert!(sql.contains(" CROSS JOIN (SELECT "), "{sql}");
}

#[test]
fn test_negative_skip() {
    let model = from_customers().skip(Expr::int(-3));

    assert_snapshot!(compile_for(&model, Dialect::MsSql2008).unwrap_err(), @r###"
    [E0004] Error: Skip expected a count that is not negative, but found -3
    "###);
}

#[test]
fn test_missing_parameter_value() {
    let model = from_customers().take(Expr::param("take", Ty::Int32));
    let compiled = compile_for(&model, Dialect::Postgres).unwrap();

    let err = compiled.bind(&HashMap::new()).unwrap_err();
    assert_snapshot!(err, @r###"
    [E0005] Error: parameter `take` not found
    ↳ Hint: pass a value for every parameter of the query
    "###);
    assert!(!err.is_bug());
}

#[test]
fn test_error_json() {
    let model = from_customers().skip(Expr::int(-1));
    let err = compile_for(&model, Dialect::Generic).unwrap_err();

    assert_snapshot!(err.to_json(), @r###"{"inner":[{"kind":"Error","code":"E0004","reason":"Skip expected a count that is not negative, but found -1","hints":[]}]}"###);
}
