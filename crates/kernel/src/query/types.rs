//! Query compiler types.
//!
//! Provides type definitions shared by every compilation stage:
//! - RawParams / Scalar: untrusted request input
//! - ComparisonOp / ComparisonArgs / Predicate: operator output
//! - Where / IncludeNode: the filter tree and join forest
//! - QueryDescriptor / PageResult: compiler and paginator output

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Separator between relation segments in a resolved filter name.
pub const PATH_SEPARATOR: char = '.';

/// Key holding the OR groups of a serialized [`Where`].
pub const ANY_OF_KEY: &str = "or";

/// Sentinel limit meaning "no limit".
pub const NO_LIMIT: i64 = -1;

// -------------------------------------------------------------------------
// Input
// -------------------------------------------------------------------------

/// A scalar request parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Boolean value.
    Boolean(bool),
    /// Integer value.
    Integer(i64),
    /// Float value.
    Float(f64),
    /// String value.
    String(String),
}

impl Scalar {
    /// Convert a JSON value, keeping only booleans, numbers and strings.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(Scalar::Boolean(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(Scalar::Integer)
                .or_else(|| n.as_f64().map(Scalar::Float)),
            Value::String(s) => Some(Scalar::String(s.clone())),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Borrow the string payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }

    /// Whether this is the empty string.
    pub fn is_empty_string(&self) -> bool {
        matches!(self, Scalar::String(s) if s.is_empty())
    }

    /// Lenient integer conversion.
    ///
    /// Strings yield their leading integer (`"12abc"` is 12, `"abc"` is
    /// nothing), floats truncate, booleans never convert. Overflow saturates.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Integer(i) => Some(*i),
            #[allow(clippy::cast_possible_truncation)]
            Scalar::Float(f) => f.is_finite().then(|| f.trunc() as i64),
            Scalar::String(s) => parse_leading_int(s),
            Scalar::Boolean(_) => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Boolean(b) => write!(f, "{b}"),
            Scalar::Integer(i) => write!(f, "{i}"),
            Scalar::Float(x) => write!(f, "{x}"),
            Scalar::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::String(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::String(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Integer(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Boolean(value)
    }
}

fn parse_leading_int(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let (negative, rest) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let digits = &rest[..end];
    if digits.is_empty() {
        return None;
    }
    let magnitude = digits.bytes().fold(0i64, |acc, b| {
        acc.saturating_mul(10).saturating_add(i64::from(b - b'0'))
    });
    Some(if negative { -magnitude } else { magnitude })
}

/// Raw request parameters: name to JSON value.
///
/// Only scalar values take part in compilation; nulls, arrays and objects
/// are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawParams(BTreeMap<String, Value>);

impl RawParams {
    /// Create an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a URL query string (`a=1&b=x+y`).
    ///
    /// Every value is a string. A repeated name collects its values into an
    /// array, which filters then ignore as non-scalar.
    pub fn from_query_string(query: &str) -> Self {
        let mut params = Self::new();
        let query = query.strip_prefix('?').unwrap_or(query);

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            let name = decode_component(name);
            if name.is_empty() {
                continue;
            }
            let value = Value::String(decode_component(value));

            match params.0.entry(name) {
                Entry::Vacant(slot) => {
                    slot.insert(value);
                }
                Entry::Occupied(mut slot) => {
                    let existing = slot.get_mut();
                    if let Value::Array(items) = existing {
                        items.push(value);
                    } else {
                        let first = existing.take();
                        *existing = Value::Array(vec![first, value]);
                    }
                }
            }
        }

        params
    }

    /// Set a parameter.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    /// Builder-style [`RawParams::insert`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Raw JSON value of a parameter.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Scalar value of a parameter; `None` when absent or non-scalar.
    pub fn scalar(&self, name: &str) -> Option<Scalar> {
        self.0.get(name).and_then(Scalar::from_json)
    }

    /// Whether the parameter is present at all.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for RawParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    let decoded = urlencoding::decode(&spaced).map(|s| s.into_owned());
    decoded.unwrap_or(spaced)
}

// -------------------------------------------------------------------------
// Predicates
// -------------------------------------------------------------------------

/// Comparison tags an operator can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ComparisonOp {
    /// Exact match.
    #[serde(rename = "eq")]
    Equals,
    /// Not equal.
    #[serde(rename = "ne")]
    NotEquals,
    /// Greater than.
    #[serde(rename = "gt")]
    GreaterThan,
    /// Greater than or equal.
    #[serde(rename = "gte")]
    GreaterOrEqual,
    /// Less than.
    #[serde(rename = "lt")]
    LessThan,
    /// Less than or equal.
    #[serde(rename = "lte")]
    LessOrEqual,
    /// Inclusive range.
    #[serde(rename = "between")]
    Between,
    /// Outside an inclusive range.
    #[serde(rename = "not_between")]
    NotBetween,
    /// Value in list.
    #[serde(rename = "in")]
    In,
    /// Pattern match (SQL LIKE).
    #[serde(rename = "like")]
    Like,
}

impl ComparisonOp {
    /// Wire tag, as used in the serialized `where` tree.
    pub fn as_str(self) -> &'static str {
        match self {
            ComparisonOp::Equals => "eq",
            ComparisonOp::NotEquals => "ne",
            ComparisonOp::GreaterThan => "gt",
            ComparisonOp::GreaterOrEqual => "gte",
            ComparisonOp::LessThan => "lt",
            ComparisonOp::LessOrEqual => "lte",
            ComparisonOp::Between => "between",
            ComparisonOp::NotBetween => "not_between",
            ComparisonOp::In => "in",
            ComparisonOp::Like => "like",
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arguments extracted from an encoded parameter value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ComparisonArgs {
    /// The raw value, untouched.
    Value(Scalar),
    /// A single textual argument.
    Text(String),
    /// Lower and upper bound.
    Range(String, String),
    /// List of values.
    List(Vec<String>),
}

/// One field comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: ComparisonOp,
    pub args: ComparisonArgs,
}

impl Condition {
    pub fn new(field: impl Into<String>, op: ComparisonOp, args: ComparisonArgs) -> Self {
        Self {
            field: field.into(),
            op,
            args,
        }
    }
}

/// Predicate produced by an operator for one parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Condition on a single field.
    Field(Condition),
    /// Disjunction over several fields.
    AnyOf(Vec<Condition>),
}

/// Comparisons applied to one field, all of which must hold.
pub type FieldConditions = BTreeMap<ComparisonOp, ComparisonArgs>;

/// Field name to its comparisons.
pub type ConditionMap = BTreeMap<String, FieldConditions>;

/// Merged filter tree.
///
/// Serializes as `{"field": {"op": args}, "or": [{...}]}`. Field conditions
/// share the object with [`ANY_OF_KEY`], so no filter may resolve to `or`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Where {
    /// Per-field conjunctions.
    #[serde(flatten)]
    pub fields: ConditionMap,

    /// OR groups; each group matches when any of its fields matches.
    #[serde(rename = "or", skip_serializing_if = "Vec::is_empty")]
    pub any: Vec<ConditionMap>,
}

impl Where {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree holding a single predicate.
    pub fn from_predicate(predicate: Predicate) -> Self {
        let mut tree = Self::new();
        tree.push(predicate);
        tree
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.any.is_empty()
    }

    /// Comparisons recorded for a field.
    pub fn get(&self, field: &str) -> Option<&FieldConditions> {
        self.fields.get(field)
    }

    /// Add a predicate. A repeated `(field, op)` pair replaces the earlier
    /// arguments.
    pub fn push(&mut self, predicate: Predicate) {
        match predicate {
            Predicate::Field(condition) => {
                self.fields
                    .entry(condition.field)
                    .or_default()
                    .insert(condition.op, condition.args);
            }
            Predicate::AnyOf(conditions) => {
                let mut group = ConditionMap::new();
                for condition in conditions {
                    group
                        .entry(condition.field)
                        .or_default()
                        .insert(condition.op, condition.args);
                }
                if !group.is_empty() {
                    self.any.push(group);
                }
            }
        }
    }

    /// Merge another tree into this one; entries already present win.
    pub fn merge_missing(&mut self, other: Where) {
        for (field, conditions) in other.fields {
            let existing = self.fields.entry(field).or_default();
            for (op, args) in conditions {
                existing.entry(op).or_insert(args);
            }
        }
        for group in other.any {
            if !self.any.contains(&group) {
                self.any.push(group);
            }
        }
    }
}

// -------------------------------------------------------------------------
// Joins
// -------------------------------------------------------------------------

/// Identity of a join target, used to merge duplicate branches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JoinKey {
    pub association: String,
    pub model: String,
    pub alias: String,
}

/// A join generated from a relational filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncludeNode {
    /// Association handle.
    pub association: String,

    /// Target model.
    pub model: String,

    /// Join alias.
    #[serde(rename = "as")]
    pub alias: String,

    /// Inner-join semantics. Always true for filter joins.
    pub required: bool,

    /// Conditions on the joined model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#where: Option<Where>,

    /// Nested joins.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<IncludeNode>,
}

impl IncludeNode {
    pub fn key(&self) -> JoinKey {
        JoinKey {
            association: self.association.clone(),
            model: self.model.clone(),
            alias: self.alias.clone(),
        }
    }
}

// -------------------------------------------------------------------------
// Output
// -------------------------------------------------------------------------

/// Sort direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// One `(field, direction)` sort term; serializes as a two-element array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderTerm(pub String, pub SortDirection);

impl OrderTerm {
    pub fn field(&self) -> &str {
        &self.0
    }

    pub fn direction(&self) -> SortDirection {
        self.1
    }
}

/// Compiled query descriptor handed to the execution layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryDescriptor {
    /// Rows to skip.
    pub offset: u64,

    /// Maximum rows, or [`NO_LIMIT`].
    pub limit: i64,

    /// Sort terms; `None` when nothing sortable was requested.
    pub order: Option<Vec<OrderTerm>>,

    /// Conditions on the root model.
    pub r#where: Where,

    /// Joins required by relational filters.
    pub include: Vec<IncludeNode>,
}

/// Paging metadata for a result page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub total_count: i64,
    pub page_count: u64,
    pub current_page: u64,
    pub per_page: u64,
}

/// A page of results with its paging metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageResult<T> {
    pub meta: PageMeta,
    pub items: Vec<T>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_from_json_skips_non_scalars() {
        assert_eq!(Scalar::from_json(&json!(true)), Some(Scalar::Boolean(true)));
        assert_eq!(Scalar::from_json(&json!(7)), Some(Scalar::Integer(7)));
        assert_eq!(Scalar::from_json(&json!(1.5)), Some(Scalar::Float(1.5)));
        assert_eq!(Scalar::from_json(&json!("x")), Some(Scalar::from("x")));
        assert_eq!(Scalar::from_json(&json!(null)), None);
        assert_eq!(Scalar::from_json(&json!([1, 2])), None);
        assert_eq!(Scalar::from_json(&json!({"a": 1})), None);
    }

    #[test]
    fn scalar_lenient_integer() {
        assert_eq!(Scalar::from("12").as_i64(), Some(12));
        assert_eq!(Scalar::from("  12abc").as_i64(), Some(12));
        assert_eq!(Scalar::from("-3").as_i64(), Some(-3));
        assert_eq!(Scalar::from("1.9").as_i64(), Some(1));
        assert_eq!(Scalar::from("abc").as_i64(), None);
        assert_eq!(Scalar::from("").as_i64(), None);
        assert_eq!(Scalar::from("-").as_i64(), None);
        assert_eq!(Scalar::Float(2.7).as_i64(), Some(2));
        assert_eq!(Scalar::Boolean(true).as_i64(), None);
        assert_eq!(
            Scalar::from("99999999999999999999999").as_i64(),
            Some(i64::MAX)
        );
    }

    #[test]
    fn scalar_display() {
        assert_eq!(Scalar::Float(2.0).to_string(), "2");
        assert_eq!(Scalar::Boolean(false).to_string(), "false");
        assert_eq!(Scalar::from("an").to_string(), "an");
    }

    #[test]
    fn query_string_decoding() {
        let params = RawParams::from_query_string("?name=John+Doe&city=S%C3%A3o%20Paulo&flag");
        assert_eq!(params.scalar("name"), Some(Scalar::from("John Doe")));
        assert_eq!(params.scalar("city"), Some(Scalar::from("São Paulo")));
        assert_eq!(params.scalar("flag"), Some(Scalar::from("")));
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn query_string_repeated_names_become_arrays() {
        let params = RawParams::from_query_string("id=1&id=2&id=3");
        assert_eq!(params.get("id"), Some(&json!(["1", "2", "3"])));
        assert_eq!(params.scalar("id"), None);
    }

    #[test]
    fn query_string_keeps_operator_prefixes() {
        let params = RawParams::from_query_string("price=%3C%3E10%7C20&qty=%3E5");
        assert_eq!(params.scalar("price"), Some(Scalar::from("<>10|20")));
        assert_eq!(params.scalar("qty"), Some(Scalar::from(">5")));
    }

    #[test]
    fn where_push_replaces_same_operator() {
        let mut tree = Where::new();
        tree.push(Predicate::Field(Condition::new(
            "price",
            ComparisonOp::GreaterThan,
            ComparisonArgs::Text("1".into()),
        )));
        tree.push(Predicate::Field(Condition::new(
            "price",
            ComparisonOp::LessThan,
            ComparisonArgs::Text("9".into()),
        )));
        tree.push(Predicate::Field(Condition::new(
            "price",
            ComparisonOp::GreaterThan,
            ComparisonArgs::Text("2".into()),
        )));

        assert_eq!(
            serde_json::to_value(&tree).unwrap(),
            json!({"price": {"gt": "2", "lt": "9"}})
        );
    }

    #[test]
    fn where_merge_missing_keeps_existing() {
        let mut existing = Where::from_predicate(Predicate::Field(Condition::new(
            "country",
            ComparisonOp::Equals,
            ComparisonArgs::Value(Scalar::from("US")),
        )));
        let mut incoming = Where::from_predicate(Predicate::Field(Condition::new(
            "country",
            ComparisonOp::Equals,
            ComparisonArgs::Value(Scalar::from("FR")),
        )));
        incoming.push(Predicate::Field(Condition::new(
            "name",
            ComparisonOp::Like,
            ComparisonArgs::Text("%a%".into()),
        )));

        existing.merge_missing(incoming);

        assert_eq!(
            serde_json::to_value(&existing).unwrap(),
            json!({"country": {"eq": "US"}, "name": {"like": "%a%"}})
        );
    }

    #[test]
    fn where_or_groups_serialize() {
        let tree = Where::from_predicate(Predicate::AnyOf(vec![
            Condition::new("title", ComparisonOp::Like, ComparisonArgs::Text("%x%".into())),
            Condition::new("body", ComparisonOp::Like, ComparisonArgs::Text("%x%".into())),
        ]));

        assert_eq!(
            serde_json::to_value(&tree).unwrap(),
            json!({"or": [{"title": {"like": "%x%"}, "body": {"like": "%x%"}}]})
        );
    }

    #[test]
    fn descriptor_serialization_shape() {
        let descriptor = QueryDescriptor {
            offset: 0,
            limit: NO_LIMIT,
            order: Some(vec![OrderTerm("id".into(), SortDirection::Desc)]),
            r#where: Where::new(),
            include: vec![IncludeNode {
                association: "post.author".into(),
                model: "user".into(),
                alias: "author".into(),
                required: true,
                r#where: None,
                include: vec![],
            }],
        };

        assert_eq!(
            serde_json::to_value(&descriptor).unwrap(),
            json!({
                "offset": 0,
                "limit": -1,
                "order": [["id", "DESC"]],
                "where": {},
                "include": [{
                    "association": "post.author",
                    "model": "user",
                    "as": "author",
                    "required": true
                }]
            })
        );
    }

    #[test]
    fn comparison_op_tags() {
        assert_eq!(
            serde_json::to_string(&ComparisonOp::NotBetween).unwrap(),
            "\"not_between\""
        );
        let parsed: ComparisonOp = serde_json::from_str("\"gte\"").unwrap();
        assert_eq!(parsed, ComparisonOp::GreaterOrEqual);
        assert_eq!(ComparisonOp::In.as_str(), "in");
    }
}
