//! Request-parameter query compiler.
//!
//! This module provides:
//! - QueryCompiler: turns raw request parameters into a QueryDescriptor
//! - OperatorSet: ordered, first-match operator registry
//! - Paginator: page / size / offset arithmetic and page results
//! - IncludeTreeBuilder: joins for dotted relational filters
//! - CompilerSettings: the same configuration, loadable from TOML or JSON

pub mod compiler;
pub mod filter;
pub mod include;
pub mod operator;
pub mod operators;
pub mod pager;
pub mod relation;
pub mod settings;
pub mod types;

pub use compiler::{CompilerOptions, QueryCompiler};
pub use filter::{FieldSpec, FilterResolver, ResolvedFilter, build_whitelist, check_field_names};
pub use include::{IncludeTreeBuilder, merge_includes};
pub use operator::{Operator, OperatorSet};
pub use operators::{
    Arity, ContainsOperator, IdentityOperator, InListOperator, SearchByFieldsOperator,
    StandardValueOperator,
};
pub use pager::{Paginator, PaginatorConfig};
pub use relation::{Association, ModelCatalog, RelationSource};
pub use settings::{CompilerSettings, OperatorSpec};
pub use types::{
    ANY_OF_KEY, ComparisonArgs, ComparisonOp, Condition, IncludeNode, JoinKey, NO_LIMIT, OrderTerm,
    PageMeta, PageResult, Predicate, QueryDescriptor, RawParams, Scalar, SortDirection, Where,
};
