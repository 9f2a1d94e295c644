//! Built-in operators.
//!
//! Value-encoded operators read their comparison from a prefix on the value
//! (`>5`, `<>10|20`, `<<>>a,b`); name-keyed operators react to the parameter
//! name instead (contains, search).

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::operator::Operator;
use super::types::{ComparisonArgs, ComparisonOp, Condition, Predicate, Scalar};
use crate::error::{QueryError, QueryResult};

/// Separator between the two arguments of range operators.
const RANGE_SEPARATOR: char = '|';

/// Separator between in-list items.
const LIST_SEPARATOR: char = ',';

/// Number of arguments a value-encoded operator extracts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arity {
    #[default]
    One,
    Two,
}

// ---------------------------------------------------------------------------
// IdentityOperator
// ---------------------------------------------------------------------------

/// Equality with the raw value. Always applicable, so it must come last.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityOperator;

impl Operator for IdentityOperator {
    fn name(&self) -> &str {
        "identity"
    }

    fn comparison(&self) -> ComparisonOp {
        ComparisonOp::Equals
    }

    fn is_applicable(&self, _value: &Scalar, _field: &str, _original_field: &str) -> bool {
        true
    }

    fn extract_arguments(&self, value: &Scalar, _field: &str, _original_field: &str) -> ComparisonArgs {
        ComparisonArgs::Value(value.clone())
    }
}

// ---------------------------------------------------------------------------
// StandardValueOperator
// ---------------------------------------------------------------------------

struct StandardDefinition {
    prefix: &'static str,
    comparison: ComparisonOp,
    pattern: &'static str,
    arity: Arity,
}

/// Built-in value-encoded operators, in matching order.
static STANDARD_DEFINITIONS: [StandardDefinition; 7] = [
    StandardDefinition {
        prefix: "<>",
        comparison: ComparisonOp::Between,
        pattern: r"^<>[^|]+\|[^|]+$",
        arity: Arity::Two,
    },
    StandardDefinition {
        prefix: "!<>",
        comparison: ComparisonOp::NotBetween,
        pattern: r"^!<>[^|]+\|[^|]+$",
        arity: Arity::Two,
    },
    StandardDefinition {
        prefix: ">",
        comparison: ComparisonOp::GreaterThan,
        pattern: r"^>(\.|\d).*$",
        arity: Arity::One,
    },
    StandardDefinition {
        prefix: ":>",
        comparison: ComparisonOp::GreaterOrEqual,
        pattern: r"^:>(\.|\d).*$",
        arity: Arity::One,
    },
    StandardDefinition {
        prefix: "<",
        comparison: ComparisonOp::LessThan,
        pattern: r"^<(\.|\d).*$",
        arity: Arity::One,
    },
    StandardDefinition {
        prefix: ":<",
        comparison: ComparisonOp::LessOrEqual,
        pattern: r"^:<(\.|\d).*$",
        arity: Arity::One,
    },
    StandardDefinition {
        prefix: "!",
        comparison: ComparisonOp::NotEquals,
        pattern: r"^!.+$",
        arity: Arity::One,
    },
];

/// Compiled patterns, index-aligned with `STANDARD_DEFINITIONS`.
///
/// # Panics
///
/// Panics if a hard-coded regex literal is invalid (impossible in practice).
#[allow(clippy::expect_used)]
static STANDARD_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    STANDARD_DEFINITIONS
        .iter()
        .map(|def| Regex::new(def.pattern).expect("valid regex literal"))
        .collect()
});

/// Operator encoded as a prefix on the value, e.g. `>5` or `<>10|20`.
///
/// Applicable when the value is a string that starts with the prefix and
/// matches the validation pattern. The prefix is stripped and the remainder
/// trimmed; two-argument operators split it on `|`.
#[derive(Debug, Clone)]
pub struct StandardValueOperator {
    prefix: String,
    comparison: ComparisonOp,
    pattern: Regex,
    arity: Arity,
}

impl StandardValueOperator {
    /// Build an operator with a custom prefix and validation pattern.
    pub fn new(
        prefix: impl Into<String>,
        comparison: ComparisonOp,
        pattern: &str,
        arity: Arity,
    ) -> QueryResult<Self> {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Err(QueryError::configuration(format!(
                "operator \"{comparison}\" needs a non-empty prefix"
            )));
        }
        let pattern = Regex::new(pattern).map_err(|e| {
            QueryError::configuration(format!("invalid pattern for operator \"{prefix}\": {e}"))
        })?;
        Ok(Self {
            prefix,
            comparison,
            pattern,
            arity,
        })
    }

    /// Built-in operator for `comparison`, if there is one.
    pub fn builtin(comparison: ComparisonOp) -> Option<Self> {
        let index = STANDARD_DEFINITIONS
            .iter()
            .position(|def| def.comparison == comparison)?;
        let def = &STANDARD_DEFINITIONS[index];
        Some(Self {
            prefix: def.prefix.to_string(),
            comparison,
            pattern: STANDARD_PATTERNS.get(index)?.clone(),
            arity: def.arity,
        })
    }

    /// All built-in operators, in matching order.
    pub fn builtins() -> Vec<Self> {
        STANDARD_DEFINITIONS
            .iter()
            .filter_map(|def| Self::builtin(def.comparison))
            .collect()
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }
}

impl Operator for StandardValueOperator {
    fn name(&self) -> &str {
        &self.prefix
    }

    fn comparison(&self) -> ComparisonOp {
        self.comparison
    }

    fn is_applicable(&self, value: &Scalar, _field: &str, _original_field: &str) -> bool {
        value
            .as_str()
            .is_some_and(|s| s.starts_with(&self.prefix) && self.pattern.is_match(s))
    }

    fn extract_arguments(&self, value: &Scalar, _field: &str, _original_field: &str) -> ComparisonArgs {
        let text = value.to_string();
        let stripped = text.strip_prefix(&self.prefix).unwrap_or(&text).trim();

        if self.arity == Arity::Two
            && let Some((low, high)) = stripped.split_once(RANGE_SEPARATOR)
        {
            return ComparisonArgs::Range(low.to_string(), high.to_string());
        }
        ComparisonArgs::Text(stripped.to_string())
    }
}

// ---------------------------------------------------------------------------
// InListOperator
// ---------------------------------------------------------------------------

const IN_LIST_PREFIX: &str = "<<>>";

/// # Panics
///
/// Panics if the hard-coded regex literal is invalid (impossible in practice).
#[allow(clippy::expect_used)]
static IN_LIST_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^<<>>[A-Z0-9,]+$").expect("valid regex literal"));

#[allow(clippy::expect_used)]
static IN_LIST_CAPTURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<<>>(?P<items>[A-Z0-9,]+)").expect("valid regex literal"));

/// Membership test encoded as `<<>>a,b,c`.
#[derive(Debug, Clone, Copy, Default)]
pub struct InListOperator;

impl InListOperator {
    pub fn new() -> Self {
        Self
    }
}

impl Operator for InListOperator {
    fn name(&self) -> &str {
        IN_LIST_PREFIX
    }

    fn comparison(&self) -> ComparisonOp {
        ComparisonOp::In
    }

    fn is_applicable(&self, value: &Scalar, _field: &str, _original_field: &str) -> bool {
        value
            .as_str()
            .is_some_and(|s| s.starts_with(IN_LIST_PREFIX) && IN_LIST_PATTERN.is_match(s))
    }

    fn extract_arguments(&self, value: &Scalar, _field: &str, _original_field: &str) -> ComparisonArgs {
        let text = value.to_string();
        let items = IN_LIST_CAPTURE
            .captures(&text)
            .and_then(|caps| caps.name("items"))
            .map(|m| {
                m.as_str()
                    .split(LIST_SEPARATOR)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        ComparisonArgs::List(items)
    }
}

// ---------------------------------------------------------------------------
// ContainsOperator
// ---------------------------------------------------------------------------

/// Wrap a value in LIKE wildcards, escaping `%` first when asked to.
///
/// The escape character itself is escaped before `%` so input cannot undo it.
fn like_pattern(value: &Scalar, percent_safe: bool) -> String {
    let text = value.to_string();
    if percent_safe {
        format!("%{}%", text.replace('\\', "\\\\").replace('%', "\\%"))
    } else {
        format!("%{text}%")
    }
}

/// Substring match for a fixed set of parameters.
///
/// Applicable only to parameters named in `only_for_fields` with a non-empty
/// value. Those names join the filter whitelist automatically.
#[derive(Debug, Clone, Default)]
pub struct ContainsOperator {
    only_for_fields: Vec<String>,
    percent_safe: bool,
}

impl ContainsOperator {
    pub fn new(only_for_fields: Vec<String>) -> Self {
        Self {
            only_for_fields,
            percent_safe: false,
        }
    }

    /// Escape `%` and the `\` escape character so values match literally.
    pub fn percent_safe(mut self, percent_safe: bool) -> Self {
        self.percent_safe = percent_safe;
        self
    }
}

impl Operator for ContainsOperator {
    fn name(&self) -> &str {
        "contains"
    }

    fn comparison(&self) -> ComparisonOp {
        ComparisonOp::Like
    }

    fn is_applicable(&self, value: &Scalar, _field: &str, original_field: &str) -> bool {
        !value.is_empty_string()
            && *value != Scalar::Boolean(false)
            && self.only_for_fields.iter().any(|f| f == original_field)
    }

    fn extract_arguments(&self, value: &Scalar, _field: &str, _original_field: &str) -> ComparisonArgs {
        ComparisonArgs::Text(like_pattern(value, self.percent_safe))
    }

    fn extra_allowed_fields(&self, _allowed: &[String]) -> Vec<String> {
        self.only_for_fields.clone()
    }
}

// ---------------------------------------------------------------------------
// SearchByFieldsOperator
// ---------------------------------------------------------------------------

/// One search parameter matched against several fields with OR.
#[derive(Debug, Clone)]
pub struct SearchByFieldsOperator {
    search_param: String,
    fields: Vec<String>,
    percent_safe: bool,
}

impl SearchByFieldsOperator {
    /// Search `fields` through the `search` parameter.
    pub fn new(fields: Vec<String>) -> Self {
        Self {
            search_param: "search".to_string(),
            fields,
            percent_safe: false,
        }
    }

    pub fn with_search_param(mut self, search_param: impl Into<String>) -> Self {
        self.search_param = search_param.into();
        self
    }

    /// Escape `%` in values so it matches literally.
    pub fn percent_safe(mut self, percent_safe: bool) -> Self {
        self.percent_safe = percent_safe;
        self
    }

    pub fn search_param(&self) -> &str {
        &self.search_param
    }
}

impl Operator for SearchByFieldsOperator {
    fn name(&self) -> &str {
        "search"
    }

    fn comparison(&self) -> ComparisonOp {
        ComparisonOp::Like
    }

    fn is_applicable(&self, value: &Scalar, _field: &str, original_field: &str) -> bool {
        !value.is_empty_string() && original_field == self.search_param && !self.fields.is_empty()
    }

    fn extract_arguments(&self, value: &Scalar, _field: &str, _original_field: &str) -> ComparisonArgs {
        ComparisonArgs::Text(like_pattern(value, self.percent_safe))
    }

    fn build_predicate(&self, value: &Scalar, field: &str, original_field: &str) -> Predicate {
        let args = self.extract_arguments(value, field, original_field);
        Predicate::AnyOf(
            self.fields
                .iter()
                .map(|f| Condition::new(f.as_str(), ComparisonOp::Like, args.clone()))
                .collect(),
        )
    }

    fn extra_allowed_fields(&self, _allowed: &[String]) -> Vec<String> {
        vec![self.search_param.clone()]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn text(s: &str) -> Scalar {
        Scalar::from(s)
    }

    fn builtin(op: ComparisonOp) -> StandardValueOperator {
        StandardValueOperator::builtin(op).unwrap()
    }

    #[test]
    fn identity_keeps_raw_value() {
        let value = Scalar::Integer(5);
        assert!(IdentityOperator.is_applicable(&value, "id", "id"));
        assert_eq!(
            IdentityOperator.extract_arguments(&value, "id", "id"),
            ComparisonArgs::Value(Scalar::Integer(5))
        );
    }

    #[test]
    fn between_splits_into_two() {
        let op = builtin(ComparisonOp::Between);
        let value = text("<>10|20");
        assert!(op.is_applicable(&value, "price", "price"));
        assert_eq!(
            op.extract_arguments(&value, "price", "price"),
            ComparisonArgs::Range("10".into(), "20".into())
        );
    }

    #[test]
    fn between_requires_exactly_two_parts() {
        let op = builtin(ComparisonOp::Between);
        assert!(!op.is_applicable(&text("<>10"), "p", "p"));
        assert!(!op.is_applicable(&text("<>10|20|30"), "p", "p"));
        assert!(!op.is_applicable(&text("<>|20"), "p", "p"));
    }

    #[test]
    fn not_between_is_not_taken_by_not_equals_when_ordered() {
        let nb = builtin(ComparisonOp::NotBetween);
        let value = text("!<>1|5");
        assert!(nb.is_applicable(&value, "p", "p"));
        assert_eq!(
            nb.extract_arguments(&value, "p", "p"),
            ComparisonArgs::Range("1".into(), "5".into())
        );
    }

    #[test]
    fn single_argument_operators_strip_and_trim() {
        let cases = [
            (ComparisonOp::GreaterThan, ">5", "5"),
            (ComparisonOp::GreaterOrEqual, ":>.5", ".5"),
            (ComparisonOp::LessThan, "<3.2 ", "3.2"),
            (ComparisonOp::LessOrEqual, ":<7", "7"),
            (ComparisonOp::NotEquals, "!draft", "draft"),
        ];
        for (comparison, raw, expected) in cases {
            let op = builtin(comparison);
            let value = text(raw);
            assert!(op.is_applicable(&value, "f", "f"), "{raw} should match {comparison}");
            assert_eq!(
                op.extract_arguments(&value, "f", "f"),
                ComparisonArgs::Text(expected.to_string())
            );
        }
    }

    #[test]
    fn comparison_needs_numeric_start() {
        let gt = builtin(ComparisonOp::GreaterThan);
        assert!(!gt.is_applicable(&text(">abc"), "f", "f"));
        assert!(!gt.is_applicable(&text("5>"), "f", "f"));
        assert!(!gt.is_applicable(&Scalar::Integer(5), "f", "f"));
        assert!(gt.is_applicable(&text(">.5"), "f", "f"));
    }

    #[test]
    fn lt_does_not_swallow_in_list() {
        let lt = builtin(ComparisonOp::LessThan);
        assert!(!lt.is_applicable(&text("<<>>1,2"), "f", "f"));
        let between = builtin(ComparisonOp::Between);
        assert!(!between.is_applicable(&text("<<>>1,2"), "f", "f"));
    }

    #[test]
    fn in_list_extracts_items() {
        let op = InListOperator::new();
        let value = text("<<>>a1,B2,,c3");
        assert!(op.is_applicable(&value, "code", "code"));
        assert_eq!(
            op.extract_arguments(&value, "code", "code"),
            ComparisonArgs::List(vec!["a1".into(), "B2".into(), "c3".into()])
        );
        assert!(!op.is_applicable(&text("<<>>a b"), "code", "code"));
        assert!(!op.is_applicable(&text("<<>>"), "code", "code"));
    }

    #[test]
    fn custom_standard_operator() {
        let op = StandardValueOperator::new("~", ComparisonOp::Like, r"^~.+$", Arity::One).unwrap();
        assert!(op.is_applicable(&text("~abc%"), "name", "name"));
        assert_eq!(
            op.extract_arguments(&text("~abc%"), "name", "name"),
            ComparisonArgs::Text("abc%".into())
        );
    }

    #[test]
    fn custom_standard_operator_rejects_bad_pattern() {
        let err = StandardValueOperator::new("~", ComparisonOp::Like, r"^~(", Arity::One).unwrap_err();
        assert!(matches!(err, QueryError::Configuration(_)));
        assert!(StandardValueOperator::new("", ComparisonOp::Like, r".*", Arity::One).is_err());
    }

    #[test]
    fn contains_wraps_value() {
        let op = ContainsOperator::new(vec!["name".to_string()]);
        let value = text("an");
        assert!(op.is_applicable(&value, "name", "name"));
        assert!(!op.is_applicable(&value, "title", "title"));
        assert!(!op.is_applicable(&text(""), "name", "name"));
        assert_eq!(
            op.extract_arguments(&text("50%"), "name", "name"),
            ComparisonArgs::Text("%50%%".into())
        );
        assert_eq!(op.extra_allowed_fields(&[]), vec!["name".to_string()]);
    }

    #[test]
    fn contains_percent_safe_escapes() {
        let op = ContainsOperator::new(vec!["name".to_string()]).percent_safe(true);
        assert_eq!(
            op.extract_arguments(&text("50%"), "name", "name"),
            ComparisonArgs::Text("%50\\%%".into())
        );
        assert_eq!(
            op.extract_arguments(&text("\\%"), "name", "name"),
            ComparisonArgs::Text("%\\\\\\%%".into())
        );
        assert_eq!(
            op.extract_arguments(&text("a\\b"), "name", "name"),
            ComparisonArgs::Text("%a\\\\b%".into())
        );
    }

    #[test]
    fn contains_skips_false() {
        let op = ContainsOperator::new(vec!["flag".to_string()]);
        assert!(!op.is_applicable(&Scalar::Boolean(false), "flag", "flag"));
        assert!(op.is_applicable(&Scalar::Boolean(true), "flag", "flag"));
        assert!(op.is_applicable(&Scalar::Integer(0), "flag", "flag"));
    }

    #[test]
    fn contains_matches_on_parameter_name_not_alias() {
        let op = ContainsOperator::new(vec!["q_name".to_string()]);
        assert!(op.is_applicable(&text("x"), "full_name", "q_name"));
        assert!(!op.is_applicable(&text("x"), "q_name", "full_name"));
    }

    #[test]
    fn search_builds_or_group() {
        let op = SearchByFieldsOperator::new(vec!["title".into(), "body".into()]);
        let value = text("rust");
        assert!(op.is_applicable(&value, "search", "search"));
        assert!(!op.is_applicable(&value, "title", "title"));
        assert_eq!(
            op.build_predicate(&value, "search", "search"),
            Predicate::AnyOf(vec![
                Condition::new("title", ComparisonOp::Like, ComparisonArgs::Text("%rust%".into())),
                Condition::new("body", ComparisonOp::Like, ComparisonArgs::Text("%rust%".into())),
            ])
        );
        assert_eq!(op.extra_allowed_fields(&[]), vec!["search".to_string()]);
    }

    #[test]
    fn search_without_fields_never_applies() {
        let op = SearchByFieldsOperator::new(vec![]).with_search_param("q");
        assert!(!op.is_applicable(&text("rust"), "q", "q"));
        assert_eq!(op.search_param(), "q");
    }
}
