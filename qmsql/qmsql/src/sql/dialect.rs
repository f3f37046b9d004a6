//! Feature map for SQL dialects.
//!
//! Output targets the generic dialect wherever possible. A dialect overrides
//! a rule only when the generic form is not accepted by its engine (TOP
//! instead of LIMIT on SQL Server, no CONCAT on SQLite, ...).
//!
//! The capability flags that drive lowering are exposed as [Capabilities];
//! everything else is a rendering detail of [DialectHandler].
use core::fmt::Debug;
use std::any::{Any, TypeId};

use serde::{Deserialize, Serialize};
use strum::VariantNames;

use qmsql_ast::Ty;

/// SQL dialect.
///
/// This only changes the output for a relatively small subset of features.
#[derive(
    Debug,
    PartialEq,
    Eq,
    Hash,
    Clone,
    Copy,
    Serialize,
    Default,
    Deserialize,
    strum::Display,
    strum::EnumIter,
    strum::EnumString,
    strum::VariantNames,
)]
#[strum(serialize_all = "lowercase")]
pub enum Dialect {
    #[default]
    Generic,
    MsSql,
    /// SQL Server before 2012, which has no `OFFSET .. FETCH`.
    MsSql2008,
    MySql,
    Postgres,
    SQLite,
}

impl Dialect {
    pub(crate) fn handler(&self) -> Box<dyn DialectHandler> {
        match self {
            Dialect::MsSql => Box::new(MsSqlDialect),
            Dialect::MsSql2008 => Box::new(MsSql2008Dialect),
            Dialect::MySql => Box::new(MySqlDialect),
            Dialect::Postgres => Box::new(PostgresDialect),
            Dialect::SQLite => Box::new(SQLiteDialect),
            Dialect::Generic => Box::new(GenericDialect),
        }
    }

    /// Capabilities of the engine, as used by lowering.
    pub fn capabilities(&self) -> Capabilities {
        let handler = self.handler();
        Capabilities {
            supports_native_offset_fetch: handler.paging() != PagingStyle::Top,
            supports_lateral_join: handler.lateral_join().is_some(),
            max_identifier_length: handler.max_identifier_length(),
        }
    }

    pub fn names() -> &'static [&'static str] {
        Dialect::VARIANTS
    }
}

/// Feature flags of a target engine. Fixed per dialect, but can be
/// overridden through [crate::Options].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capabilities {
    pub supports_native_offset_fetch: bool,
    pub supports_lateral_join: bool,
    pub max_identifier_length: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PagingStyle {
    /// `LIMIT n OFFSET m`
    LimitOffset,
    /// `OFFSET m ROWS FETCH NEXT n ROWS ONLY`, `TOP(n)` for a bare limit
    OffsetFetch,
    /// `TOP(n)` only; offsets must be lowered away.
    Top,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placeholder {
    /// `@name`
    Named,
    /// `$1`, `$2`, ... numbered by first appearance
    Numbered,
    /// `?`, bound once per occurrence
    Positional,
}

#[derive(Debug)]
pub struct GenericDialect;
#[derive(Debug)]
pub struct MsSqlDialect;
#[derive(Debug)]
pub struct MsSql2008Dialect;
#[derive(Debug)]
pub struct MySqlDialect;
#[derive(Debug)]
pub struct PostgresDialect;
#[derive(Debug)]
pub struct SQLiteDialect;

pub(crate) trait DialectHandler: Any + Debug {
    /// Opening and closing identifier quote.
    fn ident_quote(&self) -> (char, char) {
        ('"', '"')
    }

    fn paging(&self) -> PagingStyle {
        PagingStyle::LimitOffset
    }

    /// `LIMIT` value meaning "all rows", for engines that cannot take an
    /// `OFFSET` on its own.
    fn unbounded_limit(&self) -> Option<&'static str> {
        None
    }

    /// Keyword of a lateral join, if the engine has one.
    fn lateral_join(&self) -> Option<&'static str> {
        Some("CROSS JOIN LATERAL")
    }

    fn max_identifier_length(&self) -> usize {
        128
    }

    /// Support for CONCAT function.
    /// When not supported we fallback to use `||` as concat operator.
    fn has_concat_function(&self) -> bool {
        true
    }

    /// Whether conditions are values. When they are not, conditions in a
    /// projection or ordering must be wrapped into a `CASE`.
    fn has_boolean_values(&self) -> bool {
        true
    }

    fn bool_literal(&self, value: bool) -> String {
        if value { "TRUE" } else { "FALSE" }.to_string()
    }

    /// Prefix of string literals, such as `N` for unicode strings.
    fn string_prefix(&self) -> &'static str {
        ""
    }

    /// Whether a backslash starts an escape sequence inside string literals.
    fn backslash_escapes(&self) -> bool {
        false
    }

    fn placeholder(&self) -> Placeholder {
        Placeholder::Named
    }

    /// Column type used in `CAST(.. AS type)`. `None` for types that have no
    /// store representation.
    fn store_type(&self, ty: &Ty) -> Option<&'static str> {
        Some(match ty.unwrap_enum() {
            Ty::Bool => "BOOLEAN",
            Ty::Byte | Ty::Int16 => "SMALLINT",
            Ty::Int32 => "INTEGER",
            Ty::Int64 => "BIGINT",
            Ty::Float64 => "DOUBLE PRECISION",
            Ty::Decimal => "DECIMAL(18, 2)",
            Ty::String => "VARCHAR",
            Ty::Char => "CHAR(1)",
            Ty::DateTime => "TIMESTAMP",
            Ty::Guid => "CHAR(36)",
            _ => return None,
        })
    }

    /// Name of a built-in function in this dialect.
    fn function_name<'a>(&self, name: &'a str) -> &'a str {
        name
    }
}

impl dyn DialectHandler {
    #[inline]
    pub fn is<T: DialectHandler + 'static>(&self) -> bool {
        TypeId::of::<T>() == self.type_id()
    }
}

impl DialectHandler for GenericDialect {}

impl DialectHandler for PostgresDialect {
    fn max_identifier_length(&self) -> usize {
        63
    }

    fn placeholder(&self) -> Placeholder {
        Placeholder::Numbered
    }

    fn store_type(&self, ty: &Ty) -> Option<&'static str> {
        Some(match ty.unwrap_enum() {
            Ty::Bool => "boolean",
            Ty::Byte | Ty::Int16 => "smallint",
            Ty::Int32 => "integer",
            Ty::Int64 => "bigint",
            Ty::Float64 => "double precision",
            Ty::Decimal => "numeric",
            Ty::String => "text",
            Ty::Char => "character(1)",
            Ty::DateTime => "timestamp",
            Ty::Guid => "uuid",
            _ => return None,
        })
    }
}

impl DialectHandler for SQLiteDialect {
    fn unbounded_limit(&self) -> Option<&'static str> {
        Some("-1")
    }

    fn lateral_join(&self) -> Option<&'static str> {
        None
    }

    fn max_identifier_length(&self) -> usize {
        usize::MAX
    }

    fn has_concat_function(&self) -> bool {
        false
    }

    fn bool_literal(&self, value: bool) -> String {
        if value { "1" } else { "0" }.to_string()
    }

    // https://www.sqlite.org/datatype3.html#type_affinity
    fn store_type(&self, ty: &Ty) -> Option<&'static str> {
        Some(match ty.unwrap_enum() {
            Ty::Bool | Ty::Byte | Ty::Int16 | Ty::Int32 | Ty::Int64 => "INTEGER",
            Ty::Float64 => "REAL",
            Ty::Decimal => "NUMERIC",
            Ty::String | Ty::Char | Ty::DateTime | Ty::Guid => "TEXT",
            _ => return None,
        })
    }

    fn function_name<'a>(&self, name: &'a str) -> &'a str {
        match name {
            "SUBSTRING" => "SUBSTR",
            "CEILING" => "CEIL",
            name => name,
        }
    }
}

impl DialectHandler for MySqlDialect {
    fn ident_quote(&self) -> (char, char) {
        ('`', '`')
    }

    // https://dev.mysql.com/doc/refman/8.0/en/select.html, "To retrieve all
    // rows from a certain offset up to the end of the result set"
    fn unbounded_limit(&self) -> Option<&'static str> {
        Some("18446744073709551615")
    }

    fn max_identifier_length(&self) -> usize {
        64
    }

    fn placeholder(&self) -> Placeholder {
        Placeholder::Positional
    }

    fn backslash_escapes(&self) -> bool {
        true
    }

    // CAST only accepts a handful of target types
    fn store_type(&self, ty: &Ty) -> Option<&'static str> {
        Some(match ty.unwrap_enum() {
            Ty::Bool | Ty::Byte | Ty::Int16 | Ty::Int32 | Ty::Int64 => "SIGNED",
            Ty::Float64 => "DOUBLE",
            Ty::Decimal => "DECIMAL(18, 2)",
            Ty::String | Ty::Guid => "CHAR",
            Ty::Char => "CHAR(1)",
            Ty::DateTime => "DATETIME",
            _ => return None,
        })
    }
}

impl DialectHandler for MsSqlDialect {
    fn ident_quote(&self) -> (char, char) {
        ('[', ']')
    }

    fn paging(&self) -> PagingStyle {
        PagingStyle::OffsetFetch
    }

    fn lateral_join(&self) -> Option<&'static str> {
        Some("CROSS APPLY")
    }

    fn has_boolean_values(&self) -> bool {
        false
    }

    fn bool_literal(&self, value: bool) -> String {
        format!("CAST({} AS bit)", if value { 1 } else { 0 })
    }

    fn string_prefix(&self) -> &'static str {
        "N"
    }

    fn store_type(&self, ty: &Ty) -> Option<&'static str> {
        Some(match ty.unwrap_enum() {
            Ty::Bool => "bit",
            Ty::Byte => "tinyint",
            Ty::Int16 => "smallint",
            Ty::Int32 => "int",
            Ty::Int64 => "bigint",
            Ty::Float64 => "float",
            Ty::Decimal => "decimal(18, 2)",
            Ty::String => "nvarchar(max)",
            Ty::Char => "nchar(1)",
            Ty::DateTime => "datetime2",
            Ty::Guid => "uniqueidentifier",
            _ => return None,
        })
    }

    fn function_name<'a>(&self, name: &'a str) -> &'a str {
        match name {
            "LENGTH" => "LEN",
            name => name,
        }
    }
}

// Same as SQL Server, minus OFFSET .. FETCH and CONCAT (both 2012).
impl DialectHandler for MsSql2008Dialect {
    fn ident_quote(&self) -> (char, char) {
        MsSqlDialect.ident_quote()
    }

    fn paging(&self) -> PagingStyle {
        PagingStyle::Top
    }

    fn lateral_join(&self) -> Option<&'static str> {
        MsSqlDialect.lateral_join()
    }

    fn has_concat_function(&self) -> bool {
        false
    }

    fn has_boolean_values(&self) -> bool {
        false
    }

    fn bool_literal(&self, value: bool) -> String {
        MsSqlDialect.bool_literal(value)
    }

    fn string_prefix(&self) -> &'static str {
        MsSqlDialect.string_prefix()
    }

    fn store_type(&self, ty: &Ty) -> Option<&'static str> {
        match ty.unwrap_enum() {
            Ty::DateTime => Some("datetime"),
            ty => MsSqlDialect.store_type(ty),
        }
    }

    fn function_name<'a>(&self, name: &'a str) -> &'a str {
        MsSqlDialect.function_name(name)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use insta::assert_debug_snapshot;
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_dialect_from_str() {
        assert_debug_snapshot!(Dialect::from_str("postgres"), @r###"
        Ok(
            Postgres,
        )
        "###);

        assert_debug_snapshot!(Dialect::from_str("mssql2008"), @r###"
        Ok(
            MsSql2008,
        )
        "###);

        assert_debug_snapshot!(Dialect::from_str("foo"), @r###"
        Err(
            VariantNotFound,
        )
        "###);
    }

    #[rstest]
    #[case(Dialect::Generic, true, true, 128)]
    #[case(Dialect::MsSql, true, true, 128)]
    #[case(Dialect::MsSql2008, false, true, 128)]
    #[case(Dialect::MySql, true, true, 64)]
    #[case(Dialect::Postgres, true, true, 63)]
    #[case(Dialect::SQLite, true, false, usize::MAX)]
    fn test_capabilities(
        #[case] dialect: Dialect,
        #[case] offset_fetch: bool,
        #[case] lateral: bool,
        #[case] max_len: usize,
    ) {
        assert_eq!(
            dialect.capabilities(),
            Capabilities {
                supports_native_offset_fetch: offset_fetch,
                supports_lateral_join: lateral,
                max_identifier_length: max_len,
            }
        );
    }

    #[test]
    fn test_handler_is() {
        assert!(Dialect::MsSql.handler().is::<MsSqlDialect>());
        assert!(!Dialect::MsSql2008.handler().is::<MsSqlDialect>());
    }

    #[test]
    fn test_store_type() {
        let rank = Ty::enumeration("MilitaryRank", Ty::Int16).nullable();
        assert_eq!(Dialect::MsSql.handler().store_type(&rank), Some("smallint"));
        assert_eq!(Dialect::Postgres.handler().store_type(&Ty::String), Some("text"));
        assert_eq!(Dialect::Generic.handler().store_type(&Ty::Object), None);
    }
}
