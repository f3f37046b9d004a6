//! Rewrite rules from expression nodes into SQL expressions.
//!
//! Rules are plain closures kept in three ordered lists. For a given node the
//! first rule that returns `Some` wins; `None` means "not mine" and is never
//! an error.

mod fragment;
mod member;
mod method_call;

use std::fmt::Debug;
use std::sync::{Arc, OnceLock};

use qmsql_ast::{Expr, MethodId};

use crate::ir::rel::SqlExpr;
use crate::{Error, Result};

/// Warnings produced while translating, such as always-false comparisons.
pub type Diagnostics = Vec<Error>;

/// A method call, with its operands already translated where possible.
#[derive(Debug)]
pub struct MethodCall<'a> {
    pub node: &'a Expr,
    pub method: &'a MethodId,
    pub target: Option<Operand<'a>>,
    pub args: Vec<Operand<'a>>,
}

/// A member access on a value that is not bound to a query source.
#[derive(Debug)]
pub struct MemberAccess<'a> {
    pub node: &'a Expr,
    pub target: Option<Operand<'a>>,
    pub member: &'a str,
}

#[derive(Debug, Clone)]
pub struct Operand<'a> {
    pub node: &'a Expr,
    /// `None` when the operand has no SQL form, for example an entity.
    pub sql: Option<SqlExpr>,
}

/// Callback into the expression translator, for rules that need to
/// translate sub-expressions themselves.
pub trait Translate {
    fn translate(&mut self, expr: &Expr) -> Result<Option<SqlExpr>>;
}

pub type MethodCallTranslator =
    Box<dyn Fn(&MethodCall, &mut Diagnostics) -> Option<SqlExpr> + Send + Sync>;

pub type MemberTranslator = Box<dyn Fn(&MemberAccess) -> Option<SqlExpr> + Send + Sync>;

pub type FragmentTranslator =
    Box<dyn Fn(&Expr, &mut dyn Translate) -> Result<Option<SqlExpr>> + Send + Sync>;

pub struct TranslatorRegistry {
    method_calls: Vec<MethodCallTranslator>,
    members: Vec<MemberTranslator>,
    fragments: Vec<FragmentTranslator>,
}

impl TranslatorRegistry {
    /// A registry without any rules.
    pub fn empty() -> Self {
        TranslatorRegistry {
            method_calls: Vec::new(),
            members: Vec::new(),
            fragments: Vec::new(),
        }
    }

    /// A registry with the built-in rules.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.method_calls.extend(method_call::translators());
        registry.members.extend(member::translators());
        registry.fragments.extend(fragment::translators());
        registry
    }

    /// Appends a rule for method calls. Built-in rules are tried first.
    pub fn with_method_call_translator<F>(mut self, translator: F) -> Self
    where
        F: Fn(&MethodCall, &mut Diagnostics) -> Option<SqlExpr> + Send + Sync + 'static,
    {
        self.method_calls.push(Box::new(translator));
        self
    }

    pub fn with_member_translator<F>(mut self, translator: F) -> Self
    where
        F: Fn(&MemberAccess) -> Option<SqlExpr> + Send + Sync + 'static,
    {
        self.members.push(Box::new(translator));
        self
    }

    pub fn with_fragment_translator<F>(mut self, translator: F) -> Self
    where
        F: Fn(&Expr, &mut dyn Translate) -> Result<Option<SqlExpr>> + Send + Sync + 'static,
    {
        self.fragments.push(Box::new(translator));
        self
    }

    /// Maps calls of a user-declared method onto a SQL function of the given
    /// name. The instance, if any, becomes the first argument.
    pub fn with_db_function<S: ToString>(self, method: MethodId, sql_name: S) -> Self {
        let sql_name = sql_name.to_string();
        self.with_method_call_translator(move |call, _| {
            if call.method != &method {
                return None;
            }
            Some(SqlExpr::function(&sql_name, operand_sql(call)?))
        })
    }

    pub fn translate_method_call(
        &self,
        call: &MethodCall,
        diagnostics: &mut Diagnostics,
    ) -> Option<SqlExpr> {
        self.method_calls
            .iter()
            .find_map(|t| t(call, &mut *diagnostics))
    }

    pub fn translate_member(&self, access: &MemberAccess) -> Option<SqlExpr> {
        self.members.iter().find_map(|t| t(access))
    }

    pub fn translate_fragment(
        &self,
        expr: &Expr,
        translator: &mut dyn Translate,
    ) -> Result<Option<SqlExpr>> {
        for fragment in &self.fragments {
            if let Some(sql) = fragment(expr, translator)? {
                return Ok(Some(sql));
            }
        }
        Ok(None)
    }
}

impl Default for TranslatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for TranslatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslatorRegistry")
            .field("method_calls", &self.method_calls.len())
            .field("members", &self.members.len())
            .field("fragments", &self.fragments.len())
            .finish()
    }
}

/// The process-wide registry with the built-in rules.
pub fn default_registry() -> Arc<TranslatorRegistry> {
    static DEFAULT: OnceLock<Arc<TranslatorRegistry>> = OnceLock::new();
    DEFAULT
        .get_or_init(|| Arc::new(TranslatorRegistry::new()))
        .clone()
}

impl Operand<'_> {
    /// Type of the operand, ignoring conversions and nullability.
    fn underlying_ty(&self) -> &qmsql_ast::Ty {
        self.node.strip_convert().ty.unwrap_nullable()
    }
}

/// SQL forms of all operands, target first, or `None` if any is missing.
fn operand_sql(call: &MethodCall) -> Option<Vec<SqlExpr>> {
    call.target
        .iter()
        .chain(call.args.iter())
        .map(|o| o.sql.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use qmsql_ast::{Literal, Ty};

    use super::*;
    use crate::ir::rel::ColumnOwner;

    fn operand(node: &Expr, sql: Option<SqlExpr>) -> Operand<'_> {
        Operand { node, sql }
    }

    #[test]
    fn test_db_function() {
        let soundex = MethodId::static_method("MyFunctions", "Soundex", vec![Ty::String]);
        let registry = TranslatorRegistry::empty().with_db_function(soundex.clone(), "SOUNDEX");

        let name = Expr::source("c", Ty::class("Customer")).member("Name", Ty::String);
        let node = Expr::call_static(soundex.clone(), vec![name.clone()], Ty::String);
        let column = SqlExpr::column("Name", ColumnOwner::Table("c".to_string()));
        let call = MethodCall {
            node: &node,
            method: &soundex,
            target: None,
            args: vec![operand(&name, Some(column.clone()))],
        };

        let sql = registry.translate_method_call(&call, &mut Vec::new());
        assert_eq!(sql, Some(SqlExpr::function("SOUNDEX", vec![column])));

        let untranslated = MethodCall {
            args: vec![operand(&name, None)],
            ..call
        };
        assert_eq!(registry.translate_method_call(&untranslated, &mut Vec::new()), None);
    }

    #[test]
    fn test_first_match_wins() {
        let registry = TranslatorRegistry::empty()
            .with_member_translator(|_| Some(SqlExpr::Literal(Literal::Integer(1))))
            .with_member_translator(|_| Some(SqlExpr::Literal(Literal::Integer(2))));

        let node = Expr::static_member("Foo.Bar", Ty::Int32);
        let access = MemberAccess {
            node: &node,
            target: None,
            member: "Foo.Bar",
        };
        assert_eq!(registry.translate_member(&access), Some(SqlExpr::int(1)));
    }
}
