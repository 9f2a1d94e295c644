//! Query compiler.
//!
//! Composes pagination, filter resolution, include building and order
//! parsing into a single [`QueryDescriptor`]:
//! - offset / limit from the [`Paginator`]
//! - `where` from simple filters
//! - `include` from relational filters, merged
//! - `order` from the sort parameter

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::filter::{FilterResolver, build_whitelist, check_field_names};
use super::include::IncludeTreeBuilder;
use super::operator::OperatorSet;
use super::pager::{Paginator, PaginatorConfig};
use super::relation::RelationSource;
use super::types::{OrderTerm, QueryDescriptor, RawParams, SortDirection};
use crate::error::{QueryError, QueryResult};

/// Prefix on a sort token selecting descending order.
const DESCENDING_PREFIX: char = '-';

/// Compiler options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Parameter names accepted as filters.
    pub allowed_filters: Vec<String>,
    /// Fields the sort parameter may name.
    pub allowed_order: Vec<String>,
    /// Public filter name to internal field or dotted relation path.
    pub filter_aliases: HashMap<String, String>,
    /// Name of the sort parameter (default: `sort`).
    pub order_param: String,
    /// Name of the search parameter used by searchable presets (default: `search`).
    pub search_param: String,
    pub paginator: PaginatorConfig,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            allowed_filters: Vec::new(),
            allowed_order: Vec::new(),
            filter_aliases: HashMap::new(),
            order_param: "sort".to_string(),
            search_param: "search".to_string(),
            paginator: PaginatorConfig::default(),
        }
    }
}

impl CompilerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_filters<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_filters.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn allow_order<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_order.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Map a public filter name to an internal field or relation path.
    pub fn alias(mut self, name: impl Into<String>, field: impl Into<String>) -> Self {
        self.filter_aliases.insert(name.into(), field.into());
        self
    }

    pub fn with_paginator(mut self, paginator: PaginatorConfig) -> Self {
        self.paginator = paginator;
        self
    }

    /// Parameters consumed by pagination and sorting, never treated as filters.
    pub fn reserved_params(&self) -> Vec<&str> {
        let mut reserved = self.paginator.control_params();
        reserved.push(self.order_param.as_str());
        reserved
    }
}

/// Compiles request parameters into query descriptors.
///
/// Immutable once built; share it across requests behind an `Arc`.
pub struct QueryCompiler {
    options: CompilerOptions,
    operators: Arc<OperatorSet>,
    relations: Option<Arc<dyn RelationSource>>,
    root_model: Option<String>,
    whitelist: Vec<String>,
}

impl fmt::Debug for QueryCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCompiler")
            .field("options", &self.options)
            .field("operators", &self.operators)
            .field("root_model", &self.root_model)
            .field("whitelist", &self.whitelist)
            .finish_non_exhaustive()
    }
}

impl QueryCompiler {
    /// Create a compiler with the identity operator only.
    pub fn new(options: CompilerOptions) -> Self {
        let operators = Arc::new(OperatorSet::identity());
        let whitelist = build_whitelist(&options.allowed_filters, &options.reserved_params(), &operators);
        Self {
            options,
            operators,
            relations: None,
            root_model: None,
            whitelist,
        }
    }

    /// Replace the operator list.
    pub fn with_operators(mut self, operators: Arc<OperatorSet>) -> Self {
        self.whitelist = build_whitelist(
            &self.options.allowed_filters,
            &self.options.reserved_params(),
            &operators,
        );
        self.operators = operators;
        self
    }

    /// Use the searchable preset: contains matching on `strict_fields` and a
    /// multi-field search on `search_fields` under the configured search
    /// parameter.
    pub fn with_searchable(self, strict_fields: Vec<String>, search_fields: Vec<String>) -> Self {
        let search_param = self.options.search_param.clone();
        self.with_operators(Arc::new(OperatorSet::searchable(
            strict_fields,
            search_fields,
            search_param,
        )))
    }

    /// Attach relation metadata, required for relational filters.
    pub fn with_model(mut self, relations: Arc<dyn RelationSource>, root_model: impl Into<String>) -> Self {
        self.relations = Some(relations);
        self.root_model = Some(root_model.into());
        self
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    pub fn operators(&self) -> &OperatorSet {
        &self.operators
    }

    /// Parameter names this compiler treats as filters.
    pub fn whitelist(&self) -> &[String] {
        &self.whitelist
    }

    /// Check that every filter can be represented in the descriptor.
    pub fn validate(&self) -> QueryResult<()> {
        check_field_names(&self.whitelist, &self.options.filter_aliases)
    }

    /// Pagination calculator for `params`, e.g. to build a page result.
    pub fn paginator<'a>(&'a self, params: &'a RawParams) -> Paginator<'a> {
        Paginator::new(params, &self.options.paginator)
    }

    /// Compile request parameters into a query descriptor.
    pub fn compile(&self, params: &RawParams) -> QueryResult<QueryDescriptor> {
        self.validate()?;
        let pager = self.paginator(params);
        let offset = pager.offset()?;
        let limit = pager.limit();

        let resolver = FilterResolver::new(&self.whitelist, &self.options.filter_aliases, &self.operators);
        let filters = resolver.resolve(params);
        let r#where = resolver.build_where(&filters)?;

        let relational: Vec<_> = filters.iter().filter(|f| f.is_relational()).collect();
        let include = match relational.first() {
            None => Vec::new(),
            Some(first) => {
                let (Some(relations), Some(root_model)) = (&self.relations, &self.root_model) else {
                    return Err(QueryError::invalid_argument(format!(
                        "filter \"{}\" walks an association but no model was configured",
                        first.spec.name
                    )));
                };
                IncludeTreeBuilder::new(relations.as_ref(), root_model, &self.operators)
                    .build_all(relational)?
            }
        };

        let order = self.parse_order(params);

        tracing::debug!(
            offset,
            limit,
            filters = filters.len(),
            joins = include.len(),
            sorted = order.is_some(),
            "query compiled"
        );

        Ok(QueryDescriptor {
            offset,
            limit,
            order,
            r#where,
            include,
        })
    }

    /// Parse the sort parameter into allowed order terms.
    ///
    /// Returns `None` when the parameter is absent, not a string, or names
    /// no allowed field.
    pub fn parse_order(&self, params: &RawParams) -> Option<Vec<OrderTerm>> {
        let value = params.scalar(&self.options.order_param)?;
        let raw = value.as_str()?;

        let terms: Vec<OrderTerm> = raw
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| match token.strip_prefix(DESCENDING_PREFIX) {
                Some(field) => OrderTerm(field.to_string(), SortDirection::Desc),
                None => OrderTerm(token.to_string(), SortDirection::Asc),
            })
            .filter(|term| self.options.allowed_order.iter().any(|f| f == term.field()))
            .collect();

        (!terms.is_empty()).then_some(terms)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::query::relation::ModelCatalog;

    fn compiler() -> QueryCompiler {
        QueryCompiler::new(
            CompilerOptions::new()
                .allow_filters(["status", "price", "page", "sort"])
                .allow_order(["id", "name"]),
        )
        .with_operators(Arc::new(OperatorSet::standard()))
    }

    #[test]
    fn whitelist_excludes_control_params() {
        assert_eq!(compiler().whitelist(), ["status", "price"]);
    }

    #[test]
    fn empty_params() {
        let descriptor = compiler().compile(&RawParams::new()).unwrap();
        assert_eq!(
            serde_json::to_value(&descriptor).unwrap(),
            json!({"offset": 0, "limit": 30, "order": null, "where": {}, "include": []})
        );
    }

    #[test]
    fn order_parsing() {
        let compiler = compiler();
        let params = RawParams::new().with("sort", " -id, name ,,secret,-");
        assert_eq!(
            compiler.parse_order(&params),
            Some(vec![
                OrderTerm("id".into(), SortDirection::Desc),
                OrderTerm("name".into(), SortDirection::Asc),
            ])
        );

        let params = RawParams::new().with("sort", "secret");
        assert_eq!(compiler.parse_order(&params), None);

        let params = RawParams::new().with("sort", 5);
        assert_eq!(compiler.parse_order(&params), None);
    }

    #[test]
    fn relational_filter_without_model() {
        let compiler = QueryCompiler::new(
            CompilerOptions::new()
                .allow_filters(["country"])
                .alias("country", "author.country"),
        );
        let params = RawParams::new().with("country", "US");
        assert!(matches!(
            compiler.compile(&params),
            Err(QueryError::InvalidArgument(_))
        ));
    }

    #[test]
    fn relational_filter_with_model() {
        let catalog = ModelCatalog::new().with_association("post", "author", "user");
        let compiler = QueryCompiler::new(
            CompilerOptions::new()
                .allow_filters(["country"])
                .alias("country", "author.country"),
        )
        .with_model(Arc::new(catalog), "post");

        let descriptor = compiler
            .compile(&RawParams::new().with("country", "US"))
            .unwrap();
        assert!(descriptor.r#where.is_empty());
        assert_eq!(descriptor.include.len(), 1);
        assert_eq!(descriptor.include[0].alias, "author");
    }

    #[test]
    fn searchable_uses_configured_search_param() {
        let options = CompilerOptions {
            search_param: "q".to_string(),
            ..CompilerOptions::default()
        };
        let compiler = QueryCompiler::new(options).with_searchable(vec![], vec!["title".into()]);
        assert_eq!(compiler.whitelist(), ["q"]);

        let descriptor = compiler.compile(&RawParams::new().with("q", "rust")).unwrap();
        assert_eq!(
            serde_json::to_value(&descriptor.r#where).unwrap(),
            json!({"or": [{"title": {"like": "%rust%"}}]})
        );
    }
}
