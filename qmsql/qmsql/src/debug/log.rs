use std::sync::RwLock;
use std::time::SystemTime;

use chrono::prelude::*;
use serde::Serialize;
use strum_macros::AsRefStr;

use qmsql_ast::QueryModel;

use crate::ir::rel::SqlQuery;

/// Stores debug info about current compilation.
/// Is reset by [log_start] and [log_finish].
static CURRENT_LOG: RwLock<Option<DebugLog>> = RwLock::new(None);

pub fn log_start() {
    let mut lock = CURRENT_LOG.write().unwrap();
    assert!(lock.is_none());

    let started_at: DateTime<Utc> = SystemTime::now().into();
    let started_at = format!("{}", started_at.format("%+"));

    *lock = Some(DebugLog {
        started_at,
        version: crate::compiler_version().to_string(),
        entries: Vec::new(),

        current_stage: Stage::Initial,
        suppress: false,
    });
}

pub fn log_finish() -> Option<DebugLog> {
    let mut lock = CURRENT_LOG.write().unwrap();
    lock.take()
}

pub fn log_is_enabled() -> bool {
    let lock = CURRENT_LOG.read().unwrap();
    lock.as_ref().is_some_and(|log| !log.suppress)
}

pub fn log_set_suppress(suppress: bool) {
    let mut lock = CURRENT_LOG.write().unwrap();
    if let Some(log) = lock.as_mut() {
        log.suppress = suppress;
    }
}

pub fn log_stage(stage: Stage) {
    let mut lock = CURRENT_LOG.write().unwrap();
    if let Some(log) = lock.as_mut() {
        if log.suppress {
            return;
        }
        log.current_stage = stage;
    }
}

pub fn log_entry(entry: impl FnOnce() -> DebugEntryKind) {
    let mut lock = CURRENT_LOG.write().unwrap();
    if let Some(log) = lock.as_mut() {
        if log.suppress {
            return;
        }

        let entry = DebugEntry {
            stage: log.current_stage,
            kind: entry(),
        };
        log.entries.push(entry);
    }
}

#[derive(Serialize)]
pub struct DebugLog {
    started_at: String,
    version: String,
    entries: Vec<DebugEntry>,

    #[serde(skip)]
    current_stage: Stage,

    #[serde(skip)]
    suppress: bool,
}

impl DebugLog {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Kinds of the recorded entries, as `stage.kind`.
    pub fn summary(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| {
                let stage = match entry.stage.sub_stage() {
                    Some(sub) => format!("{}.{sub}", entry.stage.as_ref()),
                    None => entry.stage.as_ref().to_string(),
                };
                format!("{stage}: {}", entry.kind.as_ref())
            })
            .collect()
    }
}

#[derive(Serialize)]
struct DebugEntry {
    stage: Stage,
    kind: DebugEntryKind,
}

#[derive(Serialize, AsRefStr)]
pub enum DebugEntryKind {
    ReprQueryModel(QueryModel),
    ReprSqlTree(SqlQuery),
    ReprSql(String),
    Message(Message),
}

#[derive(Serialize)]
pub struct Message {
    pub level: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub module_path: Option<String>,
    pub text: String,
}

#[derive(Clone, Copy, Serialize, AsRefStr)]
pub enum Stage {
    Initial,
    Semantic,
    Sql(StageSql),
}

impl Stage {
    fn sub_stage(&self) -> Option<&'_ str> {
        match self {
            Stage::Initial | Stage::Semantic => None,
            Stage::Sql(s) => Some(s.as_ref()),
        }
    }
}

#[derive(Clone, Copy, Serialize, AsRefStr)]
pub enum StageSql {
    Lowering,
    Rendering,
}
