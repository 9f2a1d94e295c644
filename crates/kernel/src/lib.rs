//! Sieve Kernel Library
//!
//! Compiles untrusted request parameters into query descriptors: filter
//! predicates, relation joins, sort order and pagination bounds. The `sieve`
//! binary is a thin command-line driver over this library.

pub mod config;
pub mod error;
pub mod query;

pub use error::{QueryError, QueryResult};
