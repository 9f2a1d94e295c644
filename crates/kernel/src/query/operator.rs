//! Operator trait and the ordered operator registry.
//!
//! An operator decides whether it understands a parameter value and, if so,
//! turns it into a predicate. Operators are kept in an ordered list and the
//! first applicable one wins, so catch-alls go last.

use std::fmt;
use std::sync::Arc;

use super::operators::{
    ContainsOperator, IdentityOperator, InListOperator, SearchByFieldsOperator,
    StandardValueOperator,
};
use super::types::{ComparisonArgs, ComparisonOp, Condition, Predicate, Scalar};
use crate::error::{QueryError, QueryResult};

// ---------------------------------------------------------------------------
// Operator trait
// ---------------------------------------------------------------------------

/// A value matcher plus argument transform.
///
/// `field` is the resolved field name (alias applied, leaf segment for
/// relational filters); `original_field` is the request parameter name.
/// Implementations must be immutable after construction.
pub trait Operator: Send + Sync + fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Comparison this operator produces.
    fn comparison(&self) -> ComparisonOp;

    /// Whether this operator can handle the value.
    fn is_applicable(&self, value: &Scalar, field: &str, original_field: &str) -> bool;

    /// Extract comparison arguments from the value.
    fn extract_arguments(
        &self,
        value: &Scalar,
        field: &str,
        original_field: &str,
    ) -> ComparisonArgs;

    /// Build the predicate for a value this operator accepted.
    fn build_predicate(&self, value: &Scalar, field: &str, original_field: &str) -> Predicate {
        Predicate::Field(Condition::new(
            field,
            self.comparison(),
            self.extract_arguments(value, field, original_field),
        ))
    }

    /// Parameter names this operator handles beyond the configured filters.
    fn extra_allowed_fields(&self, allowed: &[String]) -> Vec<String> {
        let _ = allowed;
        Vec::new()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Ordered operator list with first-match resolution.
///
/// Built once at startup and shared; cloning only bumps reference counts.
#[derive(Debug, Clone)]
pub struct OperatorSet {
    operators: Vec<Arc<dyn Operator>>,
}

impl Default for OperatorSet {
    fn default() -> Self {
        Self::identity()
    }
}

impl OperatorSet {
    /// Create a set from an explicit, ordered list.
    pub fn new(operators: Vec<Arc<dyn Operator>>) -> Self {
        Self { operators }
    }

    /// Equality only.
    pub fn identity() -> Self {
        Self::new(vec![Arc::new(IdentityOperator)])
    }

    /// Value-encoded comparisons, the in-list operator, then equality.
    pub fn standard() -> Self {
        let mut operators: Vec<Arc<dyn Operator>> = StandardValueOperator::builtins()
            .into_iter()
            .map(|op| Arc::new(op) as Arc<dyn Operator>)
            .collect();
        operators.push(Arc::new(InListOperator::new()));
        operators.push(Arc::new(IdentityOperator));
        Self::new(operators)
    }

    /// Contains matching for `strict_fields`, a multi-field search under
    /// `search_param`, then the standard set.
    pub fn searchable(
        strict_fields: Vec<String>,
        search_fields: Vec<String>,
        search_param: impl Into<String>,
    ) -> Self {
        let mut operators: Vec<Arc<dyn Operator>> = vec![
            Arc::new(ContainsOperator::new(strict_fields)),
            Arc::new(SearchByFieldsOperator::new(search_fields).with_search_param(search_param)),
        ];
        operators.extend(Self::standard().operators);
        Self::new(operators)
    }

    /// Standard operator producing `comparison`, if one exists.
    pub fn builtin(comparison: ComparisonOp) -> Option<Arc<dyn Operator>> {
        match comparison {
            ComparisonOp::Equals => Some(Arc::new(IdentityOperator)),
            ComparisonOp::In => Some(Arc::new(InListOperator::new())),
            other => StandardValueOperator::builtin(other).map(|op| Arc::new(op) as Arc<dyn Operator>),
        }
    }

    /// Append an operator at the lowest priority.
    pub fn push(&mut self, operator: Arc<dyn Operator>) {
        self.operators.push(operator);
    }

    /// Builder-style [`OperatorSet::push`].
    pub fn with(mut self, operator: Arc<dyn Operator>) -> Self {
        self.push(operator);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Operator>> {
        self.operators.iter()
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// First operator applicable to the value.
    pub fn resolve(
        &self,
        value: &Scalar,
        field: &str,
        original_field: &str,
    ) -> QueryResult<&dyn Operator> {
        self.operators
            .iter()
            .find(|op| op.is_applicable(value, field, original_field))
            .map(|op| &**op)
            .ok_or_else(|| {
                QueryError::configuration(format!(
                    "no operator matched the value of \"{original_field}\" (field \"{field}\"); \
                     the operator list needs a catch-all such as identity"
                ))
            })
    }

    /// Resolve an operator and build its predicate.
    pub fn build_predicate(
        &self,
        value: &Scalar,
        field: &str,
        original_field: &str,
    ) -> QueryResult<Predicate> {
        let operator = self.resolve(value, field, original_field)?;
        tracing::trace!(
            operator = operator.name(),
            field,
            original_field,
            "operator matched"
        );
        Ok(operator.build_predicate(value, field, original_field))
    }

    /// Extra parameter names contributed by all operators, in order.
    pub fn extra_allowed_fields(&self, allowed: &[String]) -> Vec<String> {
        self.operators
            .iter()
            .flat_map(|op| op.extra_allowed_fields(allowed))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn names(set: &OperatorSet) -> Vec<String> {
        set.iter().map(|op| op.name().to_string()).collect()
    }

    #[test]
    fn default_is_identity_only() {
        let set = OperatorSet::default();
        assert_eq!(names(&set), vec!["identity"]);
    }

    #[test]
    fn standard_order() {
        let set = OperatorSet::standard();
        assert_eq!(
            names(&set),
            vec!["<>", "!<>", ">", ":>", "<", ":<", "!", "<<>>", "identity"]
        );
    }

    #[test]
    fn searchable_order_and_extra_fields() {
        let set = OperatorSet::searchable(
            vec!["name".to_string()],
            vec!["title".to_string(), "body".to_string()],
            "q",
        );
        assert_eq!(names(&set)[..2], ["contains", "search"]);
        assert_eq!(set.len(), 11);
        assert_eq!(set.extra_allowed_fields(&[]), vec!["name", "q"]);
    }

    #[test]
    fn first_match_wins() {
        let operators: Vec<Arc<dyn Operator>> = vec![
            OperatorSet::builtin(ComparisonOp::GreaterThan).unwrap(),
            Arc::new(IdentityOperator),
        ];
        let set = OperatorSet::new(operators);

        let gt = set.build_predicate(&Scalar::from(">5"), "price", "price").unwrap();
        assert_eq!(
            gt,
            Predicate::Field(Condition::new(
                "price",
                ComparisonOp::GreaterThan,
                ComparisonArgs::Text("5".to_string())
            ))
        );

        let eq = set.build_predicate(&Scalar::from("5"), "price", "price").unwrap();
        assert_eq!(
            eq,
            Predicate::Field(Condition::new(
                "price",
                ComparisonOp::Equals,
                ComparisonArgs::Value(Scalar::from("5"))
            ))
        );
    }

    #[test]
    fn missing_catch_all_is_configuration_error() {
        let set = OperatorSet::new(vec![OperatorSet::builtin(ComparisonOp::GreaterThan).unwrap()]);
        let err = set
            .build_predicate(&Scalar::from("plain"), "price", "price")
            .unwrap_err();
        assert!(matches!(err, QueryError::Configuration(_)));
    }

    #[test]
    fn empty_set_never_matches() {
        let set = OperatorSet::new(vec![]);
        assert!(set.is_empty());
        assert!(set.resolve(&Scalar::from("x"), "a", "a").is_err());
    }

    #[test]
    fn builtin_lookup() {
        assert_eq!(
            OperatorSet::builtin(ComparisonOp::Between).unwrap().name(),
            "<>"
        );
        assert_eq!(OperatorSet::builtin(ComparisonOp::In).unwrap().name(), "<<>>");
        assert_eq!(
            OperatorSet::builtin(ComparisonOp::Equals).unwrap().name(),
            "identity"
        );
        assert!(OperatorSet::builtin(ComparisonOp::Like).is_none());
    }
}
