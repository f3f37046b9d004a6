//! Intermediate representations of the compiler.
//!
//! The input side (expression nodes and query models) lives in the
//! `qmsql-ast` crate; this module holds the relational output tree.

pub mod rel;
