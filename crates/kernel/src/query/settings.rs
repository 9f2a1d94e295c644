//! Declarative compiler settings.
//!
//! Everything a [`QueryCompiler`] needs, in a form that can be read from TOML
//! or JSON:
//!
//! ```toml
//! allowed_filters = ["status", "price", "name", "country"]
//! allowed_order = ["id", "name"]
//! root_model = "post"
//!
//! [filter_aliases]
//! country = "author.country"
//!
//! [paginator]
//! default_page_size = 20
//! page_size_limit = [1, 100]
//!
//! [[operators]]
//! kind = "contains"
//! only_for_fields = ["name"]
//!
//! [[operators]]
//! kind = "standard"
//!
//! [models.post.associations]
//! author = { target = "user" }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use super::compiler::{CompilerOptions, QueryCompiler};
use super::operator::{Operator, OperatorSet};
use super::operators::{
    Arity, ContainsOperator, IdentityOperator, InListOperator, SearchByFieldsOperator,
    StandardValueOperator,
};
use super::pager::PaginatorConfig;
use super::relation::ModelCatalog;
use super::types::ComparisonOp;
use crate::error::{QueryError, QueryResult};

/// One entry of the operator list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperatorSpec {
    /// Equality with the raw value.
    Identity,
    /// The full standard set, identity included.
    Standard,
    /// A single built-in operator selected by comparison tag.
    Comparison { op: ComparisonOp },
    /// A value-encoded operator with a custom prefix and pattern.
    Custom {
        prefix: String,
        op: ComparisonOp,
        pattern: String,
        #[serde(default)]
        arity: Arity,
    },
    /// The `<<>>a,b` in-list operator.
    In,
    Contains {
        only_for_fields: Vec<String>,
        #[serde(default)]
        percent_safe: bool,
    },
    Search {
        fields: Vec<String>,
        #[serde(default)]
        percent_safe: bool,
        #[serde(default)]
        search_param: Option<String>,
    },
}

impl OperatorSpec {
    /// Instantiate the operators this entry declares.
    fn instantiate(&self, default_search_param: &str) -> QueryResult<Vec<Arc<dyn Operator>>> {
        let operator: Arc<dyn Operator> = match self {
            OperatorSpec::Identity => Arc::new(IdentityOperator),
            OperatorSpec::Standard => return Ok(OperatorSet::standard().iter().cloned().collect()),
            OperatorSpec::Comparison { op } => OperatorSet::builtin(*op).ok_or_else(|| {
                QueryError::configuration(format!("no built-in operator for \"{op}\""))
            })?,
            OperatorSpec::Custom {
                prefix,
                op,
                pattern,
                arity,
            } => Arc::new(StandardValueOperator::new(prefix.as_str(), *op, pattern, *arity)?),
            OperatorSpec::In => Arc::new(InListOperator::new()),
            OperatorSpec::Contains {
                only_for_fields,
                percent_safe,
            } => Arc::new(ContainsOperator::new(only_for_fields.clone()).percent_safe(*percent_safe)),
            OperatorSpec::Search {
                fields,
                percent_safe,
                search_param,
            } => Arc::new(
                SearchByFieldsOperator::new(fields.clone())
                    .with_search_param(search_param.as_deref().unwrap_or(default_search_param))
                    .percent_safe(*percent_safe),
            ),
        };
        Ok(vec![operator])
    }
}

fn default_operators() -> Vec<OperatorSpec> {
    vec![OperatorSpec::Identity]
}

fn default_order_param() -> String {
    "sort".to_string()
}

fn default_search_param() -> String {
    "search".to_string()
}

/// Compiler settings as loaded from a file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompilerSettings {
    #[serde(default)]
    pub allowed_filters: Vec<String>,

    #[serde(default)]
    pub allowed_order: Vec<String>,

    #[serde(default)]
    pub filter_aliases: HashMap<String, String>,

    #[serde(default = "default_order_param")]
    pub order_param: String,

    #[serde(default = "default_search_param")]
    pub search_param: String,

    /// Ordered operator list; first match wins.
    #[serde(default = "default_operators")]
    pub operators: Vec<OperatorSpec>,

    #[serde(default)]
    pub paginator: PaginatorConfig,

    /// Model relational filters start from.
    #[serde(default)]
    pub root_model: Option<String>,

    #[serde(default)]
    pub models: ModelCatalog,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            allowed_filters: Vec::new(),
            allowed_order: Vec::new(),
            filter_aliases: HashMap::new(),
            order_param: default_order_param(),
            search_param: default_search_param(),
            operators: default_operators(),
            paginator: PaginatorConfig::default(),
            root_model: None,
            models: ModelCatalog::default(),
        }
    }
}

impl CompilerSettings {
    /// Parse settings from TOML text.
    pub fn from_toml_str(text: &str) -> QueryResult<Self> {
        toml::from_str(text)
            .map_err(|e| QueryError::configuration(format!("invalid settings: {e}")))
    }

    /// Parse settings from JSON text.
    pub fn from_json_str(text: &str) -> QueryResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| QueryError::configuration(format!("invalid settings: {e}")))
    }

    /// Instantiate the operator list in declaration order.
    pub fn operator_set(&self) -> QueryResult<OperatorSet> {
        let mut operators = Vec::new();
        for spec in &self.operators {
            operators.extend(spec.instantiate(&self.search_param)?);
        }
        Ok(OperatorSet::new(operators))
    }

    /// Build a ready compiler.
    pub fn into_compiler(self) -> QueryResult<QueryCompiler> {
        let operators = self.operator_set()?;

        if self.root_model.is_none() && !self.models.is_empty() {
            return Err(QueryError::configuration(
                "models are declared but root_model is not set",
            ));
        }
        if let Some(ref root) = self.root_model
            && self.models.model(root).is_none()
        {
            return Err(QueryError::configuration(format!(
                "root_model \"{root}\" is not declared under models"
            )));
        }

        let options = CompilerOptions {
            allowed_filters: self.allowed_filters,
            allowed_order: self.allowed_order,
            filter_aliases: self.filter_aliases,
            order_param: self.order_param,
            search_param: self.search_param,
            paginator: self.paginator,
        };
        let compiler = QueryCompiler::new(options).with_operators(Arc::new(operators));
        compiler.validate()?;

        Ok(match self.root_model {
            Some(root) => compiler.with_model(Arc::new(self.models), root),
            None => compiler,
        })
    }
}
