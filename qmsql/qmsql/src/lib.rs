//! # qmsql
//!
//! Compiler from declarative query models into dialect-specific SQL.
//!
//! You probably want to start with the [compile] wrapper function, or with a
//! [Compiler] when the same queries are compiled over and over.
//!
//! For more granular access, refer to this diagram:
//! ```ascii
//!         QueryModel
//!
//!            │        json::from_query_model
//!            │      ────────►
//!            │                QueryModel JSON
//!            │      ◄────────
//!            │        json::to_query_model
//!  (visit)   │
//!            │   translator registry: method calls, members, fragments
//!            ▼
//!                     json::from_sql_tree
//!                   ────────►
//!         SQL tree            SQL tree JSON
//!                   ◄────────
//!            │        json::to_sql_tree
//!  (lower)   │   row-number paging, boolean values
//!            │
//!  (render)  │   quoting, paging style, placeholders
//!            ▼
//!
//!     SQL + parameter slots ──► CompiledQuery::bind ──► Command
//! ```
//!
//! ## Example
//!
//! ```
//! use qmsql::ast::{Expr, QueryModel, ResultOperator, TableDef, Ty};
//! use qmsql::{compile, sql::Dialect, Options, Target};
//!
//! let customers = TableDef::new("customers", "Customer")
//!     .column_named("Id", "id", Ty::Int32)
//!     .column_named("Name", "name", Ty::String);
//! let c = Expr::source("c", Ty::class("Customer"));
//! let model = QueryModel::from_table("c", customers)
//!     .filter(c.member("Id", Ty::Int32).equal(Expr::int(3)))
//!     .with(ResultOperator::First);
//!
//! let options = Options::default()
//!     .no_format()
//!     .no_signature()
//!     .with_target(Target::Sql(Some(Dialect::Postgres)));
//! let compiled = compile(&model, &options).unwrap();
//! assert_eq!(
//!     compiled.sql,
//!     "SELECT c.id, c.name FROM customers AS c WHERE c.id = 3 LIMIT 1"
//! );
//! ```
//!
//! ## Feature flags
//!
//! * `test-dbs`: runs the integration tests against an in-process SQLite
//!   database. This increases compile times so is not enabled by default.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::VariantNames;

pub use error_message::{ErrorMessage, ErrorMessages};
pub use qmsql_ast::{self as ast, Error, Errors, MessageKind, Reason, WithErrorInfo};

pub use cache::PlanCache;
pub use semantic::{ClientEval, ProjectedColumn};

use qmsql_ast::{Literal, QueryModel, Ty};
use sql::{Capabilities, Dialect};
use translate::TranslatorRegistry;

mod cache;
pub mod debug;
mod error_message;
pub mod ir;
mod semantic;
pub mod sql;
pub mod translate;
mod utils;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Get the version of the compiler, as defined in the cargo manifest.
pub fn compiler_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Compile a query model into SQL, with the built-in translators.
///
/// # Example
///
/// ```
/// use qmsql::ast::{QueryModel, ResultOperator, TableDef, Ty};
/// use qmsql::{compile, sql::Dialect, Options, Target};
///
/// let orders = TableDef::new("orders", "Order").column_named("Id", "id", Ty::Int32);
/// let model = QueryModel::from_table("o", orders).with(ResultOperator::Count);
///
/// let opts = Options::default()
///     .with_target(Target::Sql(Some(Dialect::SQLite)))
///     .with_signature_comment(false)
///     .with_format(false);
/// let compiled = compile(&model, &opts).unwrap();
/// assert_eq!("SELECT COUNT(*) AS c FROM orders AS o", compiled.sql);
/// ```
pub fn compile(model: &QueryModel, options: &Options) -> Result<CompiledQuery, ErrorMessages> {
    compile_with(model, options, translate::default_registry())
}

fn compile_with(
    model: &QueryModel,
    options: &Options,
    registry: Arc<TranslatorRegistry>,
) -> Result<CompiledQuery, ErrorMessages> {
    let dialect = options.target.dialect();
    let capabilities = options.capabilities();

    debug::log_entry(|| debug::DebugEntryKind::ReprQueryModel(model.clone()));
    debug::log_stage(debug::Stage::Semantic);
    let translation =
        semantic::translate(model, registry, capabilities, options.client_evaluation)?;
    debug::log_entry(|| debug::DebugEntryKind::ReprSqlTree(translation.query.clone()));

    let declared = translation.query.parameters.clone();
    let rendered = sql::compile(translation.query, dialect, &capabilities, options)?;

    let parameters = rendered
        .parameters
        .into_iter()
        .map(|name| {
            let ty = declared
                .iter()
                .find(|p| p.name == name)
                .map(|p| p.ty.clone())
                .ok_or_else(|| Error::new_assert(format!("parameter `{name}` was never declared")))?;
            Ok(ParamSlot { name, ty })
        })
        .collect::<Result<_>>()?;

    Ok(CompiledQuery {
        sql: rendered.sql,
        parameters,
        columns: translation.columns,
        client_eval: translation.client_eval,
        warnings: translation
            .warnings
            .into_iter()
            .map(ErrorMessage::from)
            .collect(),
    })
}

/// Deterministic key of a compilation: the shape of the query model plus
/// everything in `options` that changes the output.
pub fn fingerprint(model: &QueryModel, options: &Options) -> u64 {
    let mut hasher = DefaultHasher::new();
    model.hash(&mut hasher);
    options.target.dialect().hash(&mut hasher);
    options.capabilities().hash(&mut hasher);
    options.format.hash(&mut hasher);
    options.signature_comment.hash(&mut hasher);
    options.client_evaluation.hash(&mut hasher);
    hasher.finish()
}

/// Compiles query models with one translator registry and caches the plans.
///
/// A compiler is `Send + Sync` and meant to be shared between threads.
#[derive(Debug)]
pub struct Compiler {
    registry: Arc<TranslatorRegistry>,
    cache: PlanCache,
}

impl Default for Compiler {
    fn default() -> Self {
        Compiler::new(translate::default_registry())
    }
}

impl Compiler {
    pub fn new(registry: Arc<TranslatorRegistry>) -> Self {
        Compiler {
            registry,
            cache: PlanCache::new(),
        }
    }

    /// Compiles `model`, or returns the plan compiled earlier for the same
    /// [fingerprint].
    pub fn compile(
        &self,
        model: &QueryModel,
        options: &Options,
    ) -> Result<Arc<CompiledQuery>, ErrorMessages> {
        let key = fingerprint(model, options);
        if let Some(plan) = self.cache.get(key) {
            log::debug!("plan cache hit for {key:016x}");
            return Ok(plan);
        }

        let plan = Arc::new(compile_with(model, options, self.registry.clone())?);
        self.cache.insert(key, plan.clone());
        Ok(plan)
    }

    pub fn registry(&self) -> &TranslatorRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &PlanCache {
        &self.cache
    }
}

/// The result of a compilation, independent of parameter values.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub sql: String,

    /// One slot per value the SQL binds, in binding order. On dialects with
    /// positional placeholders a parameter gets a slot per occurrence.
    pub parameters: Vec<ParamSlot>,

    /// Columns of the result set, in order.
    pub columns: Vec<ProjectedColumn>,

    /// Parts of the query the caller evaluates over the returned rows.
    pub client_eval: Vec<ClientEval>,

    pub warnings: Vec<ErrorMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParamSlot {
    pub name: String,
    pub ty: Ty,
}

/// SQL text with its parameter values, ready for execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Command {
    pub sql: String,
    pub parameters: Vec<BoundParameter>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundParameter {
    pub name: String,
    pub value: Literal,
    pub ty: Ty,
}

impl CompiledQuery {
    /// Pairs every parameter slot with its value.
    pub fn bind(&self, values: &HashMap<String, Literal>) -> Result<Command, ErrorMessages> {
        let parameters = self
            .parameters
            .iter()
            .map(|slot| {
                let Some(value) = values.get(&slot.name) else {
                    return Err(Error::new(Reason::NotFound {
                        name: slot.name.clone(),
                        namespace: "parameter".to_string(),
                    })
                    .push_hint("pass a value for every parameter of the query")
                    .with_code("E0005"));
                };
                Ok(BoundParameter {
                    name: slot.name.clone(),
                    ty: infer_ty(&slot.ty, value),
                    value: value.clone(),
                })
            })
            .collect::<Result<_>>()?;

        Ok(Command {
            sql: self.sql.clone(),
            parameters,
        })
    }
}

/// Declared type of a slot, or the type of the value for untyped slots.
fn infer_ty(declared: &Ty, value: &Literal) -> Ty {
    if *declared != Ty::Object {
        return declared.clone();
    }
    match value {
        Literal::Null => Ty::Object,
        Literal::Boolean(_) => Ty::Bool,
        Literal::Integer(_) => Ty::Int64,
        Literal::Float(_) => Ty::Float64,
        Literal::String(_) => Ty::String,
    }
}

/// What to do with parts of a query that have no SQL translation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClientEvaluation {
    /// Leave them to the caller and emit a warning.
    #[default]
    Warn,
    /// Fail the compilation.
    Throw,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Target {
    /// If `None` is used, the generic dialect is targeted.
    Sql(Option<Dialect>),
}

impl Default for Target {
    fn default() -> Self {
        Self::Sql(None)
    }
}

impl Target {
    pub fn names() -> Vec<String> {
        let mut names = vec!["sql.any".to_string()];

        let dialects = Dialect::VARIANTS;
        names.extend(dialects.iter().map(|d| format!("sql.{d}")));

        names
    }

    pub fn dialect(&self) -> Dialect {
        match self {
            Target::Sql(dialect) => dialect.unwrap_or_default(),
        }
    }
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Target, Self::Err> {
        if let Some(dialect) = s.strip_prefix("sql.") {
            if dialect == "any" {
                return Ok(Target::Sql(None));
            }

            if let Ok(dialect) = Dialect::from_str(dialect) {
                return Ok(Target::Sql(Some(dialect)));
            }
        }

        Err(Error::new(Reason::NotFound {
            name: format!("{s:?}"),
            namespace: "target".to_string(),
        }))
    }
}

/// Compilation options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    /// Pass generated SQL string trough a formatter that splits it
    /// into multiple lines and prettifies indentation and spacing.
    ///
    /// Defaults to true.
    pub format: bool,

    /// Target and dialect to compile to.
    pub target: Target,

    /// Emits the compiler signature as a comment after generated SQL
    ///
    /// Defaults to true.
    pub signature_comment: bool,

    /// Defaults to [ClientEvaluation::Warn].
    pub client_evaluation: ClientEvaluation,

    /// Page with `ROW_NUMBER()` even where the dialect has `OFFSET`.
    ///
    /// Defaults to false.
    pub row_number_paging: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            format: true,
            target: Target::Sql(None),
            signature_comment: true,
            client_evaluation: ClientEvaluation::default(),
            row_number_paging: false,
        }
    }
}

impl Options {
    pub fn with_format(mut self, format: bool) -> Self {
        self.format = format;
        self
    }

    pub fn no_format(self) -> Self {
        self.with_format(false)
    }

    pub fn with_signature_comment(mut self, signature_comment: bool) -> Self {
        self.signature_comment = signature_comment;
        self
    }

    pub fn no_signature(self) -> Self {
        self.with_signature_comment(false)
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    pub fn with_client_evaluation(mut self, client_evaluation: ClientEvaluation) -> Self {
        self.client_evaluation = client_evaluation;
        self
    }

    pub fn with_row_number_paging(mut self, row_number_paging: bool) -> Self {
        self.row_number_paging = row_number_paging;
        self
    }

    /// Capabilities of the target dialect, after overrides.
    pub fn capabilities(&self) -> Capabilities {
        let mut capabilities = self.target.dialect().capabilities();
        if self.row_number_paging {
            capabilities.supports_native_offset_fetch = false;
        }
        capabilities
    }
}

/// JSON serialization and deserialization functions
pub mod json {
    use super::*;
    use crate::ir::rel::SqlQuery;

    /// JSON serialization
    pub fn from_query_model(model: &QueryModel) -> Result<String, ErrorMessages> {
        serde_json::to_string(model).map_err(convert_json_err)
    }

    /// JSON deserialization
    pub fn to_query_model(json: &str) -> Result<QueryModel, ErrorMessages> {
        serde_json::from_str(json).map_err(convert_json_err)
    }

    /// JSON serialization
    pub fn from_sql_tree(query: &SqlQuery) -> Result<String, ErrorMessages> {
        serde_json::to_string(query).map_err(convert_json_err)
    }

    /// JSON deserialization
    pub fn to_sql_tree(json: &str) -> Result<SqlQuery, ErrorMessages> {
        serde_json::from_str(json).map_err(convert_json_err)
    }

    fn convert_json_err(err: serde_json::Error) -> ErrorMessages {
        ErrorMessages::from(Error::new_simple(err.to_string()))
    }
}

/// Debugging and unstable API functions
pub mod internal {
    use super::*;
    use crate::ir::rel::SqlQuery;

    /// The relational tree of `model`, before lowering.
    pub fn query_model_to_sql_tree(
        model: &QueryModel,
        options: &Options,
    ) -> Result<SqlQuery, ErrorMessages> {
        let translation = semantic::translate(
            model,
            translate::default_registry(),
            options.capabilities(),
            options.client_evaluation,
        )?;
        Ok(translation.query)
    }

    /// Lowers and renders a relational tree, as [compile] does after
    /// visiting the query model.
    pub fn sql_tree_to_sql(query: SqlQuery, options: &Options) -> Result<String, ErrorMessages> {
        let rendered = sql::compile(
            query,
            options.target.dialect(),
            &options.capabilities(),
            options,
        )?;
        Ok(rendered.sql)
    }
}
