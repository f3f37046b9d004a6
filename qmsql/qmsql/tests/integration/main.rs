#![cfg(not(target_family = "wasm"))]

mod cache;
#[cfg(feature = "test-dbs")]
mod dbs;
mod error_messages;
mod fixtures;
mod paging;
mod sql;
mod translators;
