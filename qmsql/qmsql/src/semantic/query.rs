//! Walks a query model and builds selects in the arena.
//!
//! A visitor owns one select and composes every clause of its model onto it.
//! When an operation cannot be expressed on the select as it is, because it
//! already carries paging, DISTINCT or grouping, the select is pushed down
//! into a derived table first and composition continues on the outer select.

use qmsql_ast::{
    BodyClause, Expr, ExprKind, FromClause, GroupByClause, JoinClause, Ordering, QueryModel,
    QuerySource, Reason, ResultOperator, TableDef, WithErrorInfo,
};

use super::context::{Binding, ClientEval, Context, Member, Scope};
use super::expr::{aggregate, aggregate_ty, ExprTranslator};
use crate::ir::rel::{
    and_all, ColumnOwner, Join, JoinKind, Relation, Select, SelectId, SqlBinOp, SqlExpr,
    SqlOrdering, TableRef,
};
use crate::sql::emulate_row_number;
use crate::translate::Translate;
use crate::utils::OrMap;
use crate::{ClientEvaluation, Error, Result};

/// A visited query model.
pub(super) struct Visited {
    pub select: SelectId,
    /// What one row of the select stands for.
    pub element: Binding,
    pub result: QueryResult,
    /// Parts left to the caller, in the order they apply.
    pub client_eval: Vec<ClientEval>,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum QueryResult {
    Sequence,
    /// A single row, produced by `First`, `Single` or an aggregate.
    Value,
    /// A quantifier over the select; the condition refers to it.
    Predicate(SqlExpr),
}

struct QueryVisitor<'p> {
    parent: Option<&'p Scope<'p>>,

    /// Nested visitors collect client evaluation silently; the enclosing
    /// expression then has no SQL form.
    nested: bool,

    id: SelectId,

    /// Name of the main range variable.
    main: String,
    bindings: Vec<(String, Binding)>,
    element: Binding,

    grouped: bool,
    result: QueryResult,

    client_eval: Vec<ClientEval>,
    client_pending: bool,
    client_ordered: bool,

    /// Current ordering in terms of the query model, so a deferred `ThenBy`
    /// can hand over the complete key list.
    orderings: Vec<Ordering>,
}

pub(super) fn visit(
    ctx: &mut Context,
    model: &QueryModel,
    parent: Option<&Scope<'_>>,
    nested: bool,
) -> Result<Visited> {
    log::debug!("visiting query model: {model}");

    let (id, element, grouped) = match &model.from.source {
        QuerySource::Table(table) => {
            let (relation, element) = table_source(ctx, &model.from.name, table)?;
            (ctx.query.add(Select::from_relation(relation)), element, false)
        }
        QuerySource::Subquery(inner) => {
            let visited = visit(ctx, inner, parent, true)?;
            expect_sequence(&visited, inner)?;
            let grouped = !ctx.query[visited.select].group_by.is_empty();
            (visited.select, visited.element, grouped)
        }
    };

    let mut visitor = QueryVisitor {
        parent,
        nested,
        id,
        main: model.from.name.clone(),
        bindings: vec![(model.from.name.clone(), element.clone())],
        element,
        grouped,
        result: QueryResult::Sequence,
        client_eval: Vec::new(),
        client_pending: false,
        client_ordered: false,
        orderings: Vec::new(),
    };

    for clause in &model.clauses {
        match clause {
            BodyClause::Where(predicate) => visitor.visit_where(ctx, predicate)?,
            BodyClause::OrderBy(keys) => visitor.visit_ordering(ctx, keys, false)?,
            BodyClause::ThenBy(keys) => visitor.visit_ordering(ctx, keys, true)?,
            BodyClause::Join(join) => visitor.visit_join(ctx, join)?,
            BodyClause::AdditionalFrom(item) => visitor.visit_additional_from(ctx, item)?,
            BodyClause::GroupBy(group_by) => visitor.visit_group_by(ctx, group_by)?,
        }
    }

    if let Some(selector) = &model.select {
        visitor.visit_selector(ctx, selector)?;
    }

    // the caller needs every range variable to finish the job
    if visitor.client_pending {
        visitor.element = match visitor.bindings.as_slice() {
            [(_, binding)] => binding.clone(),
            bindings => Binding::Object(bindings.to_vec()),
        };
    }

    for operator in &model.result_operators {
        visitor.visit_result_operator(ctx, operator)?;
    }

    Ok(Visited {
        select: visitor.id,
        element: visitor.element,
        result: visitor.result,
        client_eval: visitor.client_eval,
    })
}

/// Translates a query model in expression position: a quantifier, an
/// aggregate or a single value. Sequences have no SQL form there.
pub(super) fn translate_subquery(
    ctx: &mut Context,
    model: &QueryModel,
    scope: &Scope<'_>,
) -> Result<Option<SqlExpr>> {
    let checkpoint = ctx.checkpoint();
    let visited = visit(ctx, model, Some(scope), true)?;

    let sql = if !visited.client_eval.is_empty() {
        None
    } else {
        match visited.result {
            QueryResult::Predicate(condition) => Some(condition),
            QueryResult::Value if visited.element.as_scalar().is_some() => {
                project(ctx, visited.select, &visited.element);
                clear_unpaged_ordering(&mut ctx.query[visited.select]);
                Some(SqlExpr::Subquery(visited.select))
            }
            QueryResult::Value | QueryResult::Sequence => None,
        }
    };

    if sql.is_none() {
        log::debug!("subquery has no SQL form: {model}");
        ctx.rollback(checkpoint);
    }
    Ok(sql)
}

impl<'p> QueryVisitor<'p> {
    fn scope(&self) -> Scope<'_> {
        Scope {
            bindings: &self.bindings,
            parent: self.parent,
        }
    }

    /// Runs `f` with a translator over the current scope. Selects and
    /// parameters created by a failed attempt are discarded.
    fn translate_with<T, F>(&self, ctx: &mut Context, in_projection: bool, f: F) -> Result<Option<T>>
    where
        F: FnOnce(&mut ExprTranslator<'_, '_>) -> Result<Option<T>>,
    {
        let checkpoint = ctx.checkpoint();
        let scope = self.scope();
        let mut translator = ExprTranslator::new(ctx, &scope);
        if in_projection {
            translator = translator.in_projection();
        }

        let result = f(&mut translator)?;
        if result.is_none() {
            ctx.rollback(checkpoint);
        }
        Ok(result)
    }

    fn translate(&self, ctx: &mut Context, expr: &Expr) -> Result<Option<SqlExpr>> {
        self.translate_with(ctx, false, |t| t.translate(expr))
    }

    fn is_bounded(&self, ctx: &Context) -> bool {
        ctx.query[self.id].is_bounded()
    }

    fn visit_where(&mut self, ctx: &mut Context, predicate: &Expr) -> Result<()> {
        if self.is_bounded(ctx) {
            self.push_down(ctx);
        }

        let mut translated = Vec::new();
        for conjunct in conjuncts(predicate) {
            match self.translate_with(ctx, false, |t| t.translate_condition(conjunct))? {
                Some(condition) => translated.push(condition),
                None => self.defer(ctx, ClientEval::Filter(conjunct.clone()))?,
            }
        }

        let select = &mut ctx.query[self.id];
        let target = if self.grouped {
            &mut select.having
        } else {
            &mut select.predicate
        };
        *target = target.take().or_map(and_all(translated), SqlExpr::and);
        Ok(())
    }

    fn visit_ordering(&mut self, ctx: &mut Context, keys: &[Ordering], then_by: bool) -> Result<()> {
        if then_by {
            self.orderings.extend(keys.iter().cloned());
        } else {
            let earlier = std::mem::take(&mut self.orderings);
            self.orderings = keys.to_vec();
            self.orderings.extend(earlier);
        }

        if self.client_ordered {
            return self.defer_ordering(ctx, keys, then_by);
        }
        if self.is_bounded(ctx) {
            self.push_down(ctx);
        }

        let mut sql = Vec::with_capacity(keys.len());
        for key in keys {
            match self.translate(ctx, &key.expr)? {
                Some(expr) => sql.push(SqlOrdering {
                    expr,
                    direction: key.direction,
                }),
                None => return self.defer_ordering(ctx, keys, then_by),
            }
        }

        let order_by = &mut ctx.query[self.id].order_by;
        if then_by {
            order_by.extend(sql);
        } else {
            let earlier: Vec<_> = std::mem::take(order_by)
                .into_iter()
                .filter(|o| !sql.iter().any(|k| k.expr == o.expr))
                .collect();
            *order_by = sql;
            order_by.extend(earlier);
        }
        Ok(())
    }

    /// The caller sorts stably, so rows that arrive in the database order
    /// keep it as a tie-breaker. Secondary keys need the whole list instead.
    fn defer_ordering(&mut self, ctx: &mut Context, keys: &[Ordering], then_by: bool) -> Result<()> {
        self.client_ordered = true;
        let keys = if then_by {
            ctx.query[self.id].order_by.clear();
            self.orderings.clone()
        } else {
            keys.to_vec()
        };
        self.defer(ctx, ClientEval::Ordering(keys))
    }

    fn visit_join(&mut self, ctx: &mut Context, join: &JoinClause) -> Result<()> {
        if self.is_bounded(ctx) || self.grouped {
            self.push_down(ctx);
        }

        let (relation, binding) = match &join.item.source {
            QuerySource::Table(table) => table_source(ctx, &join.item.name, table)?,
            QuerySource::Subquery(model) => {
                let visited = visit(ctx, model, self.parent, true)?;
                expect_sequence(&visited, model)?;
                let element = derive(ctx, visited.select, &visited.element);
                (Relation::Derived(visited.select), element)
            }
        };

        let kind = match join.kind {
            qmsql_ast::JoinKind::Inner => JoinKind::Inner,
            qmsql_ast::JoinKind::LeftOuter => JoinKind::Left,
        };
        ctx.query[self.id].from.push(TableRef {
            relation,
            join: Some(Join { kind, on: None }),
        });
        self.bindings.push((join.item.name.clone(), binding));

        let on = self.translate_with(ctx, false, |t| {
            let (Some(outer), Some(inner)) = (t.bind(&join.outer_key)?, t.bind(&join.inner_key)?)
            else {
                return Ok(None);
            };
            let (outer, inner) = (outer.leaves(), inner.leaves());
            if outer.len() != inner.len() {
                return Ok(None);
            }
            let pairs = outer.iter().zip(inner.iter()).map(|(o, i)| {
                SqlExpr::binary(SqlBinOp::Eq, o.expr.clone(), i.expr.clone())
            });
            Ok(and_all(pairs))
        })?;

        let Some(on) = on else {
            return Err(Error::new_untranslatable(format!(
                "{} equals {}",
                join.outer_key, join.inner_key
            ))
            .push_hint("join keys must translate to SQL")
            .with_code("E0001"));
        };
        if let Some(join) = ctx.query[self.id].from.last_mut().and_then(|t| t.join.as_mut()) {
            join.on = Some(on);
        }
        Ok(())
    }

    fn visit_additional_from(&mut self, ctx: &mut Context, item: &FromClause) -> Result<()> {
        if self.is_bounded(ctx) || self.grouped {
            self.push_down(ctx);
        }

        let (relation, binding, kind) = match &item.source {
            QuerySource::Table(table) => {
                let (relation, binding) = table_source(ctx, &item.name, table)?;
                (relation, binding, JoinKind::Cross)
            }
            QuerySource::Subquery(model) => {
                let visited = {
                    let scope = self.scope();
                    visit(ctx, model, Some(&scope), true)?
                };
                expect_sequence(&visited, model)?;
                let element = derive(ctx, visited.select, &visited.element);

                let kind = if !ctx.query.is_correlated(visited.select) {
                    JoinKind::Cross
                } else if ctx.capabilities.supports_lateral_join {
                    JoinKind::Lateral
                } else {
                    return Err(Error::new(Reason::Expected {
                        who: Some(format!("source `{}`", item.name)),
                        expected: "a source that does not refer to the enclosing query".to_string(),
                        found: "a correlated subquery".to_string(),
                    })
                    .push_hint("the target dialect does not support lateral joins")
                    .with_code("E0003"));
                };
                (Relation::Derived(visited.select), element, kind)
            }
        };

        ctx.query[self.id].from.push(TableRef {
            relation,
            join: Some(Join { kind, on: None }),
        });
        self.bindings.push((item.name.clone(), binding));
        Ok(())
    }

    fn visit_group_by(&mut self, ctx: &mut Context, group_by: &GroupByClause) -> Result<()> {
        if self.is_bounded(ctx) || self.grouped {
            self.push_down(ctx);
        }

        let mut keys = Vec::with_capacity(group_by.keys.len());
        for (name, key) in &group_by.keys {
            match self.translate_with(ctx, false, |t| t.bind(key))? {
                Some(binding) if !matches!(binding, Binding::Group { .. }) => {
                    keys.push((name.clone(), binding))
                }
                _ => {
                    return Err(Error::new_untranslatable(key)
                        .push_hint("grouping keys must translate to SQL")
                        .with_code("E0001"))
                }
            }
        }
        let key = match keys.len() {
            1 => keys.remove(0).1,
            _ => Binding::Object(keys),
        };

        let select = &mut ctx.query[self.id];
        select.group_by = key.leaves().into_iter().map(|l| l.expr.clone()).collect();
        select.order_by.clear();

        let group = Binding::Group {
            key: Box::new(key),
            rows: std::mem::take(&mut self.bindings),
        };
        self.bindings = vec![(group_by.name.clone(), group.clone())];
        self.element = group;
        self.main = group_by.name.clone();
        self.grouped = true;
        Ok(())
    }

    fn visit_selector(&mut self, ctx: &mut Context, selector: &Expr) -> Result<()> {
        if self.client_pending {
            return self.defer(ctx, ClientEval::Projection(selector.clone()));
        }
        if ctx.query[self.id].distinct {
            self.push_down(ctx);
        }

        match self.translate_with(ctx, true, |t| t.bind(selector))? {
            Some(binding) if !matches!(binding, Binding::Group { .. }) => {
                self.element = binding;
                Ok(())
            }
            _ => self.defer(ctx, ClientEval::Projection(selector.clone())),
        }
    }

    fn visit_result_operator(&mut self, ctx: &mut Context, operator: &ResultOperator) -> Result<()> {
        if self.client_pending || self.result != QueryResult::Sequence {
            return self.defer(ctx, ClientEval::ResultOperator(operator.clone()));
        }

        match operator {
            ResultOperator::Skip(count) => {
                if let Some(n) = count.as_integer_constant().filter(|n| *n < 0) {
                    return Err(Error::new(Reason::Expected {
                        who: Some("Skip".to_string()),
                        expected: "a count that is not negative".to_string(),
                        found: n.to_string(),
                    })
                    .with_code("E0004"));
                }
                let Some(count) = self.translate(ctx, count)? else {
                    return self.defer(ctx, ClientEval::ResultOperator(operator.clone()));
                };
                let select = &ctx.query[self.id];
                if select.limit.is_some() || select.offset.is_some() {
                    self.push_down(ctx);
                }
                ctx.query[self.id].offset = Some(count);
            }

            ResultOperator::Take(count) => {
                let Some(count) = self.translate(ctx, count)? else {
                    return self.defer(ctx, ClientEval::ResultOperator(operator.clone()));
                };
                self.set_limit(ctx, count);
            }

            ResultOperator::Distinct => {
                let select = &ctx.query[self.id];
                if select.limit.is_some() || select.offset.is_some() {
                    self.push_down(ctx);
                }
                let select = &mut ctx.query[self.id];
                select.distinct = true;
                select.order_by.clear();
            }

            ResultOperator::First | ResultOperator::FirstOrDefault => {
                self.set_limit(ctx, SqlExpr::int(1));
                self.result = QueryResult::Value;
            }

            // two rows are enough to tell that there is more than one
            ResultOperator::Single | ResultOperator::SingleOrDefault => {
                self.set_limit(ctx, SqlExpr::int(2));
                self.result = QueryResult::Value;
            }

            ResultOperator::Any => {
                self.prepare_exists(ctx)?;
                self.result = QueryResult::Predicate(SqlExpr::Exists(self.id));
            }

            ResultOperator::All(predicate) => {
                if self.is_bounded(ctx) || self.grouped {
                    self.push_down(ctx);
                }

                let bindings = [(self.main.clone(), self.element.clone())];
                let scope = Scope {
                    bindings: &bindings,
                    parent: self.parent,
                };
                let checkpoint = ctx.checkpoint();
                let condition = ExprTranslator::new(ctx, &scope).translate_condition(predicate)?;
                let Some(condition) = condition else {
                    ctx.rollback(checkpoint);
                    return self.defer(ctx, ClientEval::ResultOperator(operator.clone()));
                };

                let select = &mut ctx.query[self.id];
                select.predicate = select.predicate.take().or_map(Some(condition.negate()), SqlExpr::and);
                self.prepare_exists(ctx)?;
                self.result = QueryResult::Predicate(SqlExpr::Exists(self.id).negate());
            }

            ResultOperator::Contains(item) => {
                let scope = Scope {
                    bindings: &[],
                    parent: self.parent,
                };
                let checkpoint = ctx.checkpoint();
                let item = ExprTranslator::new(ctx, &scope).translate(item)?;
                let (Some(item), Some(_)) = (item, self.element.as_scalar()) else {
                    ctx.rollback(checkpoint);
                    return self.defer(ctx, ClientEval::ResultOperator(operator.clone()));
                };

                project(ctx, self.id, &self.element);
                clear_unpaged_ordering(&mut ctx.query[self.id]);
                self.result = QueryResult::Predicate(SqlExpr::In {
                    operand: Box::new(item),
                    subquery: self.id,
                });
            }

            ResultOperator::Count
            | ResultOperator::LongCount
            | ResultOperator::Sum
            | ResultOperator::Min
            | ResultOperator::Max
            | ResultOperator::Average => {
                let name = operator.as_ref();
                let value = match operator {
                    ResultOperator::Count | ResultOperator::LongCount => None,
                    _ => match self.element.as_scalar() {
                        Some((_, ty)) => Some(ty.clone()),
                        None => {
                            return self.defer(ctx, ClientEval::ResultOperator(operator.clone()))
                        }
                    },
                };

                if self.is_bounded(ctx) || self.grouped {
                    self.push_down(ctx);
                }
                ctx.query[self.id].order_by.clear();

                let arg = match (&value, self.element.as_scalar()) {
                    (Some(_), Some((sql, ty))) => Some((sql.clone(), ty.clone())),
                    _ => None,
                };
                let Some(sql) = aggregate(name, arg) else {
                    return Err(Error::new_assert(format!("no SQL aggregate for {name}")));
                };
                self.element = Binding::Scalar(sql, aggregate_ty(name, value.as_ref()));
                self.result = QueryResult::Value;
            }
        }
        Ok(())
    }

    fn set_limit(&mut self, ctx: &mut Context, limit: SqlExpr) {
        if ctx.query[self.id].limit.is_some() {
            self.push_down(ctx);
        }
        ctx.query[self.id].limit = Some(limit);
    }

    /// Turns the select into the operand of an `EXISTS`.
    fn prepare_exists(&mut self, ctx: &mut Context) -> Result<()> {
        let select = &ctx.query[self.id];
        let paged = select.limit.is_some() || select.offset.is_some();
        if select.distinct && paged {
            self.push_down(ctx);
        }

        let select = &mut ctx.query[self.id];
        if select.offset.is_none() {
            select.limit = None;
            select.order_by.clear();
        } else if !ctx.capabilities.supports_native_offset_fetch {
            emulate_row_number(&mut ctx.query, self.id)?;
            ctx.query[self.id].order_by.clear();
        }

        let select = &mut ctx.query[self.id];
        select.distinct = false;
        select.projections = vec![SqlExpr::int(1)];
        Ok(())
    }

    /// Moves the select into a derived table, keeping every range variable
    /// and the element reachable through the new outer select.
    fn push_down(&mut self, ctx: &mut Context) {
        let id = self.id;
        let max_len = ctx.query.max_identifier_length;
        let select = &mut ctx.query[id];
        let distinct = select.distinct;

        // the projections of a distinct select define its rows
        select.projections.clear();
        if !distinct {
            for (_, binding) in &mut self.bindings {
                *binding = expose(select, id, binding.clone(), max_len);
            }
        }
        self.element = expose(select, id, self.element.clone(), max_len);

        let inner = ctx.query.push_down(id);
        log::debug!("pushed select {} down into {}", id.get(), inner.get());

        let mut reown = |expr: SqlExpr, _: Option<&str>| match expr {
            SqlExpr::Column(mut column) if column.owner == ColumnOwner::Select(id) => {
                column.owner = ColumnOwner::Select(inner);
                SqlExpr::Column(column)
            }
            expr => expr,
        };
        for (_, binding) in &mut self.bindings {
            *binding = binding.clone().map_leaves(&mut reown);
        }
        self.element = self.element.clone().map_leaves(&mut reown);

        if distinct {
            self.bindings = vec![(self.main.clone(), self.element.clone())];
        }
        self.grouped = false;
    }

    fn defer(&mut self, ctx: &mut Context, item: ClientEval) -> Result<()> {
        self.client_pending = true;

        if !self.nested {
            match ctx.client_evaluation {
                ClientEvaluation::Throw => {
                    return Err(Error::new_untranslatable(&item)
                        .push_hint("rewrite the query so that this part translates to SQL, or evaluate it after materializing the results")
                        .with_code("E0001"));
                }
                ClientEvaluation::Warn => {
                    log::warn!("client evaluation of {}: {item}", item.as_ref());
                    ctx.diagnostics.push(
                        Error::new_warning(format!(
                            "the expression `{item}` could not be translated to SQL and will be evaluated on the client"
                        ))
                        .with_code("W0002"),
                    );
                }
            }
        }

        self.client_eval.push(item);
        Ok(())
    }
}

fn table_source(ctx: &mut Context, name: &str, table: &TableDef) -> Result<(Relation, Binding)> {
    ctx.check_identifier(&table.name)?;

    let base = match name.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => c.to_ascii_lowercase().to_string(),
        _ => "t".to_string(),
    };
    let alias = ctx.query.fresh_alias(&base);

    let mut members = Vec::with_capacity(table.columns.len());
    for column in &table.columns {
        ctx.check_identifier(&column.column)?;
        members.push(Member {
            name: column.member.clone(),
            expr: SqlExpr::column(&column.column, ColumnOwner::Table(alias.clone())),
            ty: column.ty.clone(),
        });
    }

    let relation = Relation::Table {
        name: table.name.clone(),
        schema: table.schema.clone(),
        alias,
    };
    Ok((relation, Binding::Entity(members)))
}

fn expect_sequence(visited: &Visited, model: &QueryModel) -> Result<()> {
    if visited.client_eval.is_empty() && visited.result == QueryResult::Sequence {
        return Ok(());
    }
    Err(Error::new_untranslatable(model)
        .push_hint("a query used as a source must translate to SQL as a whole")
        .with_code("E0001"))
}

/// Top-level operands of `&&`, left to right.
fn conjuncts(expr: &Expr) -> Vec<&Expr> {
    match &expr.kind {
        ExprKind::Binary {
            op: qmsql_ast::BinOp::AndAlso,
            left,
            right,
        } => {
            let mut parts = conjuncts(left);
            parts.extend(conjuncts(right));
            parts
        }
        _ => vec![expr],
    }
}

/// Projects the leaves of `binding` from select `id`, returning a binding in
/// terms of the projected names.
fn expose(select: &mut Select, id: SelectId, binding: Binding, max_len: usize) -> Binding {
    binding.map_leaves(&mut |expr, member| {
        let name = select.add_projection(expr, member, max_len);
        SqlExpr::column(name, ColumnOwner::Select(id))
    })
}

/// Replaces the projections of select `id` with the leaves of `element`.
pub(super) fn project(ctx: &mut Context, id: SelectId, element: &Binding) -> Binding {
    let max_len = ctx.query.max_identifier_length;
    let select = &mut ctx.query[id];
    select.projections.clear();

    let exposed = expose(select, id, element.clone(), max_len);
    if select.projections.is_empty() {
        select.projections.push(SqlExpr::int(1));
    }
    exposed
}

/// Turns a visited select into a derived table of the enclosing one.
fn derive(ctx: &mut Context, id: SelectId, element: &Binding) -> Binding {
    let element = project(ctx, id, element);
    clear_unpaged_ordering(&mut ctx.query[id]);
    let alias = ctx.query.fresh_alias("t");
    ctx.query[id].alias = Some(alias);
    element
}

fn clear_unpaged_ordering(select: &mut Select) {
    if select.limit.is_none() && select.offset.is_none() {
        select.order_by.clear();
    }
}
