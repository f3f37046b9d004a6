use std::collections::HashMap;
use std::sync::Arc;

use qmsql::ast::{Expr, Literal, Ty};
use qmsql::sql::Dialect;
use qmsql::{fingerprint, Compiler};

use super::fixtures::{c, from_customers, options};

fn by_city() -> qmsql::ast::QueryModel {
    from_customers()
        .filter(c().member("City", Ty::String.nullable()).equal(Expr::param("city", Ty::String)))
        .take(Expr::param("take", Ty::Int32))
}

#[test]
fn test_compiler_is_shareable() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Compiler>();
}

#[test]
fn test_cache_hit() {
    let compiler = Compiler::default();
    let postgres = options(Dialect::Postgres);

    let first = compiler.compile(&by_city(), &postgres).unwrap();
    let second = compiler.compile(&by_city(), &postgres).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(compiler.cache().len(), 1);

    // same model, other dialect
    let sqlite = compiler.compile(&by_city(), &options(Dialect::SQLite)).unwrap();
    assert_ne!(sqlite.sql, first.sql);
    assert_eq!(compiler.cache().len(), 2);

    compiler.cache().clear();
    let third = compiler.compile(&by_city(), &postgres).unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(first, third);
}

#[test]
fn test_fingerprint() {
    let postgres = options(Dialect::Postgres);
    let key = fingerprint(&by_city(), &postgres);

    assert_eq!(key, fingerprint(&by_city(), &postgres));
    assert_ne!(key, fingerprint(&by_city(), &postgres.clone().with_format(true)));
    assert_ne!(key, fingerprint(&by_city(), &postgres.clone().with_row_number_paging(true)));
    assert_ne!(key, fingerprint(&from_customers(), &postgres));
}

#[test]
fn test_concurrent_compilation() {
    let compiler = Compiler::default();
    let options = options(Dialect::MsSql);

    let plans: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| compiler.compile(&by_city(), &options).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(compiler.cache().len(), 1);
    assert!(plans.iter().all(|plan| plan.sql == plans[0].sql));
}

#[test]
fn test_bind() {
    let compiler = Compiler::default();
    let plan = compiler.compile(&by_city(), &options(Dialect::MySql)).unwrap();

    let values = HashMap::from([
        ("city".to_string(), Literal::from("Oslo")),
        ("take".to_string(), Literal::Integer(10)),
    ]);
    let command = plan.bind(&values).unwrap();

    assert_eq!(command.sql, plan.sql);
    let bound: Vec<_> = command
        .parameters
        .iter()
        .map(|p| (p.name.as_str(), &p.value, &p.ty))
        .collect();
    assert_eq!(
        bound,
        vec![
            ("city", &Literal::from("Oslo"), &Ty::String),
            ("take", &Literal::Integer(10), &Ty::Int32),
        ]
    );
}
