//! Method calls, members and fragments through the translator registry.
use std::sync::Arc;

use insta::{assert_debug_snapshot, assert_snapshot};
use qmsql::ast::{BinOp, Expr, MethodId, Ty};
use qmsql::sql::Dialect;
use qmsql::translate::TranslatorRegistry;
use qmsql::{ClientEval, ClientEvaluation, Compiler};
use rstest::rstest;

use super::fixtures::{c, compile_for, from_customers, options, sql_for};

fn name() -> Expr {
    c().member("Name", Ty::String)
}

fn string_compare(a: Expr, b: Expr) -> Expr {
    let method = MethodId::static_method("string", "Compare", vec![Ty::String, Ty::String]);
    Expr::call_static(method, vec![a, b], Ty::Int32)
}

fn soundex(value: Expr) -> Expr {
    Expr::call_static(soundex_method(), vec![value], Ty::String)
}

fn soundex_method() -> MethodId {
    MethodId::static_method("Phonetics", "Soundex", vec![Ty::String])
}

fn predicate_of(sql: &str) -> &str {
    sql.split_once(" WHERE ").map(|(_, p)| p).unwrap_or_default()
}

#[rstest]
#[case::greater_than_minus_one(BinOp::GreaterThan, -1, "c.name >= 'M'")]
#[case::equal_one(BinOp::Equal, 1, "c.name > 'M'")]
#[case::less_than_one(BinOp::LessThan, 1, "c.name <= 'M'")]
#[case::not_equal_minus_one(BinOp::NotEqual, -1, "c.name >= 'M'")]
#[case::less_than_zero(BinOp::LessThan, 0, "c.name < 'M'")]
fn test_string_compare(#[case] op: BinOp, #[case] constant: i64, #[case] expected: &str) {
    let comparison = Expr::binary(op, string_compare(name(), Expr::string("M")), Expr::int(constant));
    let model = from_customers().filter(comparison);

    let sql = sql_for(&model, Dialect::Postgres);
    assert_eq!(predicate_of(&sql), expected);
}

#[test]
fn test_string_compare_mirrored() {
    // `0 > Compare(a, b)` reads as `Compare(a, b) < 0`
    let comparison = Expr::binary(
        BinOp::GreaterThan,
        Expr::int(0),
        string_compare(name(), Expr::string("M")),
    );
    let sql = sql_for(&from_customers().filter(comparison), Dialect::Postgres);
    assert_eq!(predicate_of(&sql), "c.name < 'M'");
}

#[test]
fn test_concat_with_null() {
    let null = Expr::null(Ty::Int32.nullable()).convert(Ty::Object);
    let model = from_customers().select(Expr::binary(BinOp::Add, name(), null));

    assert_snapshot!(sql_for(&model, Dialect::Postgres), @"SELECT CONCAT(c.name, CAST(NULL AS text)) AS c FROM customers AS c");
    assert_snapshot!(sql_for(&model, Dialect::SQLite), @"SELECT c.name || CAST(NULL AS TEXT) AS c FROM customers AS c");
}

#[test]
fn test_equals_across_types_warns() {
    let equals = MethodId::static_method("object", "Equals", vec![Ty::Object, Ty::Object]);
    let model = from_customers().filter(Expr::call_static(
        equals,
        vec![
            c().member("Id", Ty::Int32).convert(Ty::Object),
            name().convert(Ty::Object),
        ],
        Ty::Bool,
    ));

    let compiled = compile_for(&model, Dialect::Postgres).unwrap();
    assert_eq!(predicate_of(&compiled.sql), "0 = 1");
    assert_debug_snapshot!(compiled.warnings.iter().map(|w| w.code.as_deref()).collect::<Vec<_>>(), @r###"
    [
        Some(
            "W0001",
        ),
    ]
    "###);
}

#[test]
fn test_equals_across_types_is_logged() {
    use qmsql::debug;

    static LOGGER: debug::MessageLogger = debug::MessageLogger;
    log::set_logger(&LOGGER).unwrap();
    log::set_max_level(log::LevelFilter::Warn);

    let equals = MethodId::instance("object", "Equals", vec![Ty::Object]);
    let model = from_customers().filter(c().member("Id", Ty::Int32).call(
        equals,
        vec![name().convert(Ty::Object)],
        Ty::Bool,
    ));

    debug::log_start();
    let compiled = compile_for(&model, Dialect::SQLite);
    let log = debug::log_finish().unwrap();
    assert!(compiled.is_ok());

    let json = log.to_json().unwrap();
    assert!(json.contains(r#""level": "WARN""#), "{json}");
    let message = r#""text": "[W0001] possible unintended use of method Equals(object)"#;
    assert!(json.contains(message), "{json}");
}

#[test]
fn test_starts_with() {
    let starts_with = MethodId::instance("string", "StartsWith", vec![Ty::String]);
    let model = from_customers().filter(name().call(starts_with, vec![Expr::string("A_")], Ty::Bool));

    let sql = sql_for(&model, Dialect::Postgres);
    assert_snapshot!(predicate_of(&sql), @r###"c.name LIKE 'A\_%' ESCAPE '\'"###);

    let sql = sql_for(&model, Dialect::MySql);
    assert_snapshot!(predicate_of(&sql), @r###"c.name LIKE 'A\\_%' ESCAPE '\\'"###);
}

#[test]
fn test_dialect_function_names() {
    let model = from_customers().select(name().member("Length", Ty::Int32));

    assert_snapshot!(sql_for(&model, Dialect::Postgres), @"SELECT LENGTH(c.name) AS c FROM customers AS c");
    assert_snapshot!(sql_for(&model, Dialect::MsSql), @"SELECT LEN(c.name) AS c FROM customers AS c");
}

#[test]
fn test_static_member() {
    let now = Expr::static_member("DateTime.Now", Ty::DateTime);
    let model = from_customers().select(now);
    assert_snapshot!(sql_for(&model, Dialect::SQLite), @"SELECT CURRENT_TIMESTAMP AS c FROM customers AS c");
}

#[test]
fn test_db_function() {
    let registry = TranslatorRegistry::new().with_db_function(soundex_method(), "SOUNDEX");
    let compiler = Compiler::new(Arc::new(registry));
    let model = from_customers().filter(soundex(name()).equal(Expr::string("A500")));

    let compiled = compiler.compile(&model, &options(Dialect::MySql)).unwrap();
    assert_eq!(predicate_of(&compiled.sql), "SOUNDEX(c.name) = 'A500'");
    assert!(compiled.client_eval.is_empty());
}

#[test]
fn test_client_evaluation() {
    let model = from_customers().filter(soundex(name()).equal(Expr::string("A500")));

    let compiled = compile_for(&model, Dialect::Postgres).unwrap();
    assert_snapshot!(compiled.sql, @"SELECT c.id, c.name, c.city FROM customers AS c");
    assert!(matches!(compiled.client_eval.as_slice(), [ClientEval::Filter(_)]));
    assert_eq!(compiled.warnings.len(), 1);
    assert_eq!(compiled.warnings[0].code.as_deref(), Some("W0002"));

    let options = options(Dialect::Postgres).with_client_evaluation(ClientEvaluation::Throw);
    let err = qmsql::compile(&model, &options).unwrap_err();
    assert_eq!(err.inner[0].code.as_deref(), Some("E0001"));
}
