//! Text emission of the relational tree.
//!
//! Rendering is a single depth-first pass. Columns are qualified with the
//! alias of the relation that owns them, which must be visible from the
//! select being rendered; anything else is a composition bug upstream.
use std::cmp::Ordering;
use std::fmt::Write;

use itertools::Itertools;

use qmsql_ast::{Literal, SortDirection};

use super::dialect::{DialectHandler, PagingStyle, Placeholder};
use super::keywords;
use crate::ir::rel::{
    Column, ColumnOwner, JoinKind, Relation, Select, SelectId, SqlBinOp, SqlExpr, SqlOrdering,
    SqlQuery, SqlUnOp,
};
use crate::utils::valid_ident;
use crate::{Error, Result};

/// SQL text and the names of the parameters its placeholders bind, in
/// binding order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Rendered {
    pub sql: String,
    pub parameters: Vec<String>,
}

pub(crate) fn render(query: &SqlQuery, dialect: &dyn DialectHandler) -> Result<Rendered> {
    let mut ctx = Context {
        query,
        dialect,
        scopes: Vec::new(),
        parameters: Vec::new(),
    };
    let sql = ctx.render_select(query.root)?;
    Ok(Rendered {
        sql,
        parameters: ctx.parameters,
    })
}

struct Context<'a> {
    query: &'a SqlQuery,
    dialect: &'a dyn DialectHandler,

    /// Relations of every select being rendered, innermost last. Outer
    /// frames stay visible to correlated subqueries.
    scopes: Vec<Vec<&'a Relation>>,

    parameters: Vec<String>,
}

/// Rendered expression, with the strength of its top-level operator.
#[derive(Debug)]
struct SourceExpr {
    text: String,
    binding_strength: i32,
}

impl SourceExpr {
    fn atom(text: String) -> Self {
        SourceExpr {
            text,
            binding_strength: 20,
        }
    }
}

impl<'a> Context<'a> {
    fn render_select(&mut self, id: SelectId) -> Result<String> {
        let query = self.query;
        let select = &query[id];

        self.scopes
            .push(select.from.iter().map(|t| &t.relation).collect());
        let sql = self.render_select_body(select);
        self.scopes.pop();
        sql
    }

    fn render_select_body(&mut self, select: &'a Select) -> Result<String> {
        let paging = self.dialect.paging();
        let mut sql = String::from("SELECT ");

        if select.distinct {
            sql += "DISTINCT ";
        }
        let top = match paging {
            PagingStyle::LimitOffset => None,
            PagingStyle::OffsetFetch if select.offset.is_some() => None,
            PagingStyle::OffsetFetch => select.limit.as_ref(),
            PagingStyle::Top => {
                if select.offset.is_some() {
                    return Err(Error::new_assert(
                        "OFFSET reached the renderer of a dialect without native paging",
                    ));
                }
                select.limit.as_ref()
            }
        };
        if let Some(limit) = top {
            let limit = self.render_expr(limit)?;
            write!(sql, "TOP({}) ", limit.text).ok();
        }

        if select.projections.is_empty() {
            sql += "1";
        } else {
            let projections: Vec<_> = select
                .projections
                .iter()
                .map(|p| self.render_projection(p))
                .try_collect()?;
            sql += &projections.join(", ");
        }

        for (index, table_ref) in select.from.iter().enumerate() {
            let relation = self.render_relation(&table_ref.relation)?;
            let join = match &table_ref.join {
                Some(join) if index > 0 => join,
                _ => {
                    let separator = if index == 0 { " FROM " } else { ", " };
                    write!(sql, "{separator}{relation}").ok();
                    continue;
                }
            };

            let keyword = match join.kind {
                JoinKind::Inner => "INNER JOIN",
                JoinKind::Left => "LEFT JOIN",
                JoinKind::Cross => "CROSS JOIN",
                JoinKind::Lateral => self.dialect.lateral_join().ok_or_else(|| {
                    Error::new_assert("lateral join reached a dialect without one")
                })?,
            };
            write!(sql, " {keyword} {relation}").ok();

            match (&join.on, join.kind) {
                (Some(on), _) => {
                    let on = self.render_expr(on)?;
                    write!(sql, " ON {}", on.text).ok();
                }
                (None, JoinKind::Inner | JoinKind::Left) => {
                    return Err(Error::new_assert("join without a condition"));
                }
                (None, _) => {}
            }
        }

        if let Some(predicate) = &select.predicate {
            let predicate = self.render_expr(predicate)?;
            write!(sql, " WHERE {}", predicate.text).ok();
        }

        if !select.group_by.is_empty() {
            let keys: Vec<_> = select
                .group_by
                .iter()
                .map(|e| self.render_expr(e).map(|e| e.text))
                .try_collect()?;
            write!(sql, " GROUP BY {}", keys.join(", ")).ok();
        }

        if let Some(having) = &select.having {
            let having = self.render_expr(having)?;
            write!(sql, " HAVING {}", having.text).ok();
        }

        let mut order_by = self.render_orderings(&select.order_by)?;
        // OFFSET .. FETCH is part of ORDER BY
        if order_by.is_empty() && paging == PagingStyle::OffsetFetch && select.offset.is_some() {
            order_by.push("(SELECT 1)".to_string());
        }
        if !order_by.is_empty() {
            write!(sql, " ORDER BY {}", order_by.join(", ")).ok();
        }

        match paging {
            PagingStyle::LimitOffset => {
                let limit = select.limit.as_ref().map(|l| self.render_expr(l)).transpose()?;
                let offset = select.offset.as_ref().map(|o| self.render_expr(o)).transpose()?;

                let limit = match (limit, &offset) {
                    (Some(limit), _) => Some(limit.text),
                    (None, Some(_)) => self.dialect.unbounded_limit().map(str::to_string),
                    (None, None) => None,
                };
                if let Some(limit) = limit {
                    write!(sql, " LIMIT {limit}").ok();
                }
                if let Some(offset) = offset {
                    write!(sql, " OFFSET {}", offset.text).ok();
                }
            }
            PagingStyle::OffsetFetch => {
                if let Some(offset) = &select.offset {
                    let offset = self.render_expr(offset)?;
                    write!(sql, " OFFSET {} ROWS", offset.text).ok();

                    if let Some(limit) = &select.limit {
                        let limit = self.render_expr(limit)?;
                        write!(sql, " FETCH NEXT {} ROWS ONLY", limit.text).ok();
                    }
                }
            }
            PagingStyle::Top => {}
        }

        Ok(sql)
    }

    fn render_projection(&mut self, expr: &'a SqlExpr) -> Result<String> {
        Ok(match expr {
            SqlExpr::Alias { name, inner } => {
                let inner = self.render_expr(inner)?;
                format!("{} AS {}", inner.text, self.quote(name))
            }
            expr => self.render_expr(expr)?.text,
        })
    }

    fn render_relation(&mut self, relation: &'a Relation) -> Result<String> {
        match relation {
            Relation::Table {
                name,
                schema,
                alias,
            } => {
                let mut parts = schema.iter().map(|s| self.quote(s)).collect_vec();
                parts.push(self.quote(name));
                Ok(format!("{} AS {}", parts.join("."), self.quote(alias)))
            }
            Relation::Derived(id) => {
                let Some(alias) = &self.query[*id].alias else {
                    return Err(Error::new_assert(format!(
                        "derived table {} has no alias",
                        id.get()
                    )));
                };
                let alias = self.quote(alias);
                let inner = self.render_select(*id)?;
                Ok(format!("({inner}) AS {alias}"))
            }
        }
    }

    fn render_orderings(&mut self, orderings: &'a [SqlOrdering]) -> Result<Vec<String>> {
        orderings
            .iter()
            .map(|ordering| {
                let expr = self.render_expr(&ordering.expr)?;
                Ok(match ordering.direction {
                    SortDirection::Asc => expr.text,
                    SortDirection::Desc => format!("{} DESC", expr.text),
                })
            })
            .try_collect()
    }

    fn render_expr(&mut self, expr: &'a SqlExpr) -> Result<SourceExpr> {
        Ok(match expr {
            SqlExpr::Column(column) => SourceExpr::atom(self.resolve(column)?),

            SqlExpr::Alias { inner, .. } | SqlExpr::Convert { inner, .. } => {
                return self.render_expr(inner)
            }

            SqlExpr::Literal(literal) => SourceExpr::atom(self.render_literal(literal)),

            SqlExpr::Param(name) => SourceExpr::atom(self.placeholder(name)),

            SqlExpr::Fragment(text) => SourceExpr::atom(text.clone()),

            SqlExpr::Unary { op, operand } => {
                let (keyword, strength) = match op {
                    SqlUnOp::Not => ("NOT ", 4),
                    SqlUnOp::Neg => ("-", 13),
                };
                let mut operand = self.render_operand(operand, false, strength, Associativity::Both)?;
                // `--` starts a comment
                if operand.text.starts_with('-') {
                    operand = operand.wrap_in_parenthesis();
                }
                SourceExpr {
                    text: format!("{keyword}{}", operand.text),
                    binding_strength: strength,
                }
            }

            SqlExpr::Binary { op, left, right } => self.render_binary(*op, left, right)?,

            SqlExpr::StringCompare { op, left, right } => {
                self.render_binary(SqlBinOp::from(*op), left, right)?
            }

            SqlExpr::IsNull { operand, negated } => {
                let operand = self.render_operand(operand, true, 5, Associativity::Both)?;
                let not = if *negated { "NOT " } else { "" };
                SourceExpr {
                    text: format!("{} IS {not}NULL", operand.text),
                    binding_strength: 5,
                }
            }

            SqlExpr::Case { cases, default } => {
                let mut text = String::from("CASE");
                for (condition, result) in cases {
                    let condition = self.render_expr(condition)?;
                    let result = self.render_expr(result)?;
                    write!(text, " WHEN {} THEN {}", condition.text, result.text).ok();
                }
                if let Some(default) = default {
                    let default = self.render_expr(default)?;
                    write!(text, " ELSE {}", default.text).ok();
                }
                text += " END";
                SourceExpr::atom(text)
            }

            SqlExpr::Exists(id) => SourceExpr::atom(format!("EXISTS ({})", self.render_select(*id)?)),

            SqlExpr::Subquery(id) => SourceExpr::atom(format!("({})", self.render_select(*id)?)),

            SqlExpr::In { operand, subquery } => {
                let operand = self.render_operand(operand, true, 6, Associativity::Both)?;
                let subquery = self.render_select(*subquery)?;
                SourceExpr {
                    text: format!("{} IN ({subquery})", operand.text),
                    binding_strength: 6,
                }
            }

            SqlExpr::RowNumber { order_by } => {
                let order_by = self.render_orderings(order_by)?;
                SourceExpr::atom(format!(
                    "ROW_NUMBER() OVER(ORDER BY {})",
                    order_by.join(", ")
                ))
            }

            SqlExpr::Function { name, args } => {
                if name == "CONCAT" && !self.dialect.has_concat_function() {
                    return self.render_concat_operator(args);
                }
                let args: Vec<_> = args
                    .iter()
                    .map(|a| self.render_expr(a).map(|a| a.text))
                    .try_collect()?;
                let name = self.dialect.function_name(name);
                SourceExpr::atom(format!("{name}({})", args.join(", ")))
            }

            SqlExpr::Like {
                matched,
                pattern,
                escape,
            } => {
                let matched = self.render_operand(matched, true, 7, Associativity::Both)?;
                let pattern = self.render_operand(pattern, false, 7, Associativity::Both)?;
                let mut text = format!("{} LIKE {}", matched.text, pattern.text);
                if let Some(escape) = escape {
                    let escape = self.render_expr(escape)?;
                    write!(text, " ESCAPE {}", escape.text).ok();
                }
                SourceExpr {
                    text,
                    binding_strength: 7,
                }
            }

            SqlExpr::Cast { inner, ty } => {
                let Some(store_type) = self.dialect.store_type(ty) else {
                    return Err(Error::new_assert(format!("no store type for {ty:?}")));
                };
                let inner = self.render_expr(inner)?;
                SourceExpr::atom(format!("CAST({} AS {store_type})", inner.text))
            }
        })
    }

    fn render_binary(
        &mut self,
        op: SqlBinOp,
        left: &'a SqlExpr,
        right: &'a SqlExpr,
    ) -> Result<SourceExpr> {
        let strength = op.binding_strength();
        let left = self.render_operand(left, true, strength, op.associativity())?;
        let right = self.render_operand(right, false, strength, op.associativity())?;
        Ok(SourceExpr {
            text: format!("{} {} {}", left.text, op.as_ref(), right.text),
            binding_strength: strength,
        })
    }

    /// `a || b || ...`, for engines without `CONCAT()`.
    fn render_concat_operator(&mut self, args: &'a [SqlExpr]) -> Result<SourceExpr> {
        let args: Vec<_> = args
            .iter()
            .map(|arg| {
                let arg = self.render_expr(arg)?;
                Ok(if arg.binding_strength < 20 {
                    arg.wrap_in_parenthesis().text
                } else {
                    arg.text
                })
            })
            .try_collect()?;
        Ok(SourceExpr {
            text: args.join(" || "),
            binding_strength: 9,
        })
    }

    fn render_operand(
        &mut self,
        expr: &'a SqlExpr,
        is_left: bool,
        parent_strength: i32,
        parent_associativity: Associativity,
    ) -> Result<SourceExpr> {
        let expr = self.render_expr(expr)?;

        if needs_parentheses(&expr, is_left, parent_strength, parent_associativity) {
            Ok(expr.wrap_in_parenthesis())
        } else {
            Ok(expr)
        }
    }

    fn render_literal(&self, literal: &Literal) -> String {
        match literal {
            Literal::Null => "NULL".to_string(),
            Literal::Boolean(value) => self.dialect.bool_literal(*value),
            Literal::Integer(value) => value.to_string(),
            Literal::Float(value) => format!("{value:?}"),
            Literal::String(value) => {
                let mut escaped = value.replace('\'', "''");
                if self.dialect.backslash_escapes() {
                    escaped = escaped.replace('\\', "\\\\");
                }
                format!("{}'{escaped}'", self.dialect.string_prefix())
            }
        }
    }

    fn placeholder(&mut self, name: &str) -> String {
        let position = self.parameters.iter().position(|p| p == name);
        match self.dialect.placeholder() {
            Placeholder::Named => {
                if position.is_none() {
                    self.parameters.push(name.to_string());
                }
                format!("@{name}")
            }
            Placeholder::Numbered => {
                let position = position.unwrap_or_else(|| {
                    self.parameters.push(name.to_string());
                    self.parameters.len() - 1
                });
                format!("${}", position + 1)
            }
            Placeholder::Positional => {
                self.parameters.push(name.to_string());
                "?".to_string()
            }
        }
    }

    fn resolve(&self, column: &Column) -> Result<String> {
        let qualifier = self
            .scopes
            .iter()
            .rev()
            .flatten()
            .copied()
            .find_map(|relation| match (relation, &column.owner) {
                (Relation::Table { alias, .. }, ColumnOwner::Table(owner)) if alias == owner => {
                    Some(alias.as_str())
                }
                (Relation::Derived(id), ColumnOwner::Select(owner)) if id == owner => {
                    self.query[*id].alias.as_deref()
                }
                _ => None,
            });

        let Some(qualifier) = qualifier else {
            return Err(Error::new_assert(format!(
                "column `{}` cannot be resolved",
                column.name
            )));
        };
        Ok(format!("{}.{}", self.quote(qualifier), self.quote(&column.name)))
    }

    fn quote(&self, ident: &str) -> String {
        if valid_ident().is_match(ident) && !keywords::is_keyword(ident) {
            return ident.to_string();
        }
        let (open, close) = self.dialect.ident_quote();
        let escaped = ident.replace(close, &format!("{close}{close}"));
        format!("{open}{escaped}{close}")
    }
}

impl SourceExpr {
    fn wrap_in_parenthesis(self) -> Self {
        SourceExpr::atom(format!("({})", self.text))
    }
}

/// For an operation represented as `a child b` with a surrounding parent
/// operation (e.g., `(a child b) parent c` or `a parent (b child c)`):
///
/// 1. When the child operator has higher precedence than the parent,
///    parentheses *are not* required.
///
/// 2. When the child operator has lower precedence than the parent,
///    parentheses *are* required.
///
/// 3. When the child and parent operators have the same precedence, the child
///    is on the {left,right} and the parent is {left,right} associative,
///    parentheses are not required.
fn needs_parentheses(
    expr: &SourceExpr,
    is_left: bool,
    parent_strength: i32,
    parent_associativity: Associativity,
) -> bool {
    let rule_3a = matches!(parent_associativity, Associativity::Both);
    let rule_3b = is_left && parent_associativity.left_associative();

    match expr.binding_strength.cmp(&parent_strength) {
        // Rule 1
        Ordering::Greater => false,
        // Rule 2
        Ordering::Less => true,
        // Rule 3
        Ordering::Equal => !(rule_3a || rule_3b),
    }
}

/// Associativity of an expression's operator. SQL has no right-associative
/// binary operators among the ones we emit.
#[derive(Debug, PartialEq, Eq)]
enum Associativity {
    Left,
    /// `Both` means mathematically associative, like `+` or `*`
    Both,
}

impl Associativity {
    /// Returns true iff `a + b + c = (a + b) + c`
    fn left_associative(&self) -> bool {
        matches!(self, Associativity::Left | Associativity::Both)
    }
}

impl SqlBinOp {
    // https://www.postgresql.org/docs/14/sql-syntax-lexical.html#id-1.5.3.5.13.2
    // https://docs.microsoft.com/en-us/sql/t-sql/language-elements/operator-precedence-transact-sql
    fn binding_strength(&self) -> i32 {
        use SqlBinOp::*;
        match self {
            Mod | Mul | Div => 11,
            Add | Sub => 10,
            Eq | Ne | Lt | Lte | Gt | Gte => 6,
            And => 3,
            Or => 2,
            BitAnd | BitOr => 9,
        }
    }

    fn associativity(&self) -> Associativity {
        use SqlBinOp::*;
        match self {
            Sub | Div | Mod => Associativity::Left,
            _ => Associativity::Both,
        }
    }
}
