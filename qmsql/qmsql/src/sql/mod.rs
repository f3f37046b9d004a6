//! Backend of the compiler: lowers the relational tree for a dialect and
//! renders it into SQL text.

mod dialect;
mod keywords;
mod lowering;
mod render;

pub use dialect::{Capabilities, Dialect};

pub(crate) use lowering::emulate_row_number;
pub(crate) use render::Rendered;

use crate::ir::rel::SqlQuery;
use crate::{debug, Options, Result};

/// Lowers `query` for `dialect` and renders it, applying the formatting and
/// the signature comment requested by `options`.
pub(crate) fn compile(
    mut query: SqlQuery,
    dialect: Dialect,
    capabilities: &Capabilities,
    options: &Options,
) -> Result<Rendered> {
    let handler = dialect.handler();

    debug::log_stage(debug::Stage::Sql(debug::StageSql::Lowering));
    lowering::lower(&mut query, handler.as_ref(), capabilities)?;
    debug::log_entry(|| debug::DebugEntryKind::ReprSqlTree(query.clone()));

    debug::log_stage(debug::Stage::Sql(debug::StageSql::Rendering));
    let Rendered {
        mut sql,
        parameters,
    } = render::render(&query, handler.as_ref())?;

    if options.format {
        sql = sqlformat::format(
            &sql,
            &sqlformat::QueryParams::None,
            &sqlformat::FormatOptions::default(),
        );
    }

    if options.signature_comment {
        let pre = if options.format { "\n\n" } else { " " };
        let post = if options.format { "\n" } else { "" };
        let signature = format!(
            "{pre}-- Generated by qmsql compiler version:{} (target: sql.{dialect}){post}",
            crate::compiler_version(),
        );
        sql += &signature;
    }

    debug::log_entry(|| debug::DebugEntryKind::ReprSql(sql.clone()));
    log::debug!("rendered {} bytes of {dialect} SQL", sql.len());
    Ok(Rendered { sql, parameters })
}
