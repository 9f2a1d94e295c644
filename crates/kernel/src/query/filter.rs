//! Filter whitelisting and alias resolution.
//!
//! Decides which request parameters are filters at all, maps public names to
//! internal fields and splits the result into simple filters (predicates on
//! the root model) and relational filters (dotted paths handed to the
//! include builder).

use std::collections::{HashMap, HashSet};

use super::operator::OperatorSet;
use super::types::{ANY_OF_KEY, PATH_SEPARATOR, RawParams, Scalar, Where};
use crate::error::{QueryError, QueryResult};

/// A whitelisted parameter together with its resolved field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// Request parameter name.
    pub name: String,
    /// Field after alias resolution; equal to `name` when unmapped.
    pub field: String,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, aliases: &HashMap<String, String>) -> Self {
        let name = name.into();
        let field = aliases.get(&name).cloned().unwrap_or_else(|| name.clone());
        Self { name, field }
    }

    /// Whether the resolved field walks through an association.
    pub fn is_relational(&self) -> bool {
        self.field.contains(PATH_SEPARATOR)
    }

    /// Column the predicate lands on: the last path segment.
    pub fn leaf(&self) -> &str {
        self.field
            .rsplit(PATH_SEPARATOR)
            .next()
            .unwrap_or(&self.field)
    }
}

/// A filter parameter present in the request.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFilter {
    pub spec: FieldSpec,
    pub value: Scalar,
}

impl ResolvedFilter {
    pub fn is_relational(&self) -> bool {
        self.spec.is_relational()
    }
}

/// Build the list of parameter names the compiler may act on.
///
/// Reserved names are removed from `allowed`; names contributed by operators
/// are appended. The first occurrence of a duplicate wins its position.
pub fn build_whitelist(allowed: &[String], reserved: &[&str], operators: &OperatorSet) -> Vec<String> {
    let mut seen = HashSet::new();
    allowed
        .iter()
        .filter(|name| !reserved.contains(&name.as_str()))
        .cloned()
        .chain(operators.extra_allowed_fields(allowed))
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

/// Reject whitelisted names whose predicate would land on the `or` key.
pub fn check_field_names(whitelist: &[String], aliases: &HashMap<String, String>) -> QueryResult<()> {
    for name in whitelist {
        let spec = FieldSpec::new(name.as_str(), aliases);
        if spec.leaf() == ANY_OF_KEY {
            return Err(QueryError::configuration(format!(
                "filter \"{name}\" resolves to field \"{}\", which is reserved for OR groups",
                spec.field
            )));
        }
    }
    Ok(())
}

/// Resolves whitelisted request parameters into filters.
pub struct FilterResolver<'a> {
    whitelist: &'a [String],
    aliases: &'a HashMap<String, String>,
    operators: &'a OperatorSet,
}

impl<'a> FilterResolver<'a> {
    pub fn new(
        whitelist: &'a [String],
        aliases: &'a HashMap<String, String>,
        operators: &'a OperatorSet,
    ) -> Self {
        Self {
            whitelist,
            aliases,
            operators,
        }
    }

    /// Collect filters present in `params`, in whitelist order.
    ///
    /// Absent parameters, non-scalar values and empty strings are skipped.
    pub fn resolve(&self, params: &RawParams) -> Vec<ResolvedFilter> {
        self.whitelist
            .iter()
            .filter_map(|name| {
                let Some(value) = params.scalar(name) else {
                    if params.contains(name) {
                        tracing::trace!(param = %name, "skipping non-scalar filter value");
                    }
                    return None;
                };
                if value.is_empty_string() {
                    tracing::trace!(param = %name, "skipping empty filter value");
                    return None;
                }
                Some(ResolvedFilter {
                    spec: FieldSpec::new(name.as_str(), self.aliases),
                    value,
                })
            })
            .collect()
    }

    /// Merge the predicates of all simple filters into one tree.
    pub fn build_where(&self, filters: &[ResolvedFilter]) -> QueryResult<Where> {
        let mut tree = Where::new();
        for filter in filters.iter().filter(|f| !f.is_relational()) {
            let predicate =
                self.operators
                    .build_predicate(&filter.value, &filter.spec.field, &filter.spec.name)?;
            tree.push(predicate);
        }
        Ok(tree)
    }
}
