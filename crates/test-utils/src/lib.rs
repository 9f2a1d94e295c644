//! Sieve test utilities.
//!
//! Helpers for integration testing: parameter builders, a blog-shaped model
//! catalog, compiler fixtures and JSON assertion utilities.

use serde::Serialize;
use serde_json::Value as JsonValue;
use sieve_kernel::query::{CompilerOptions, ModelCatalog, RawParams};

/// Build request parameters from string pairs.
pub fn params(pairs: &[(&str, &str)]) -> RawParams {
    pairs.iter().map(|(k, v)| (*k, *v)).collect()
}

/// Serialize a value into JSON for comparison against `json!` literals.
pub fn to_json<T: Serialize>(value: &T) -> JsonValue {
    serde_json::to_value(value).unwrap_or(JsonValue::Null)
}

/// Model catalog for a small blog:
///
/// - post: author -> user, comments -> comment
/// - comment: author -> user, post -> post
/// - user: country -> country
pub fn blog_catalog() -> ModelCatalog {
    ModelCatalog::new()
        .with_association("post", "author", "user")
        .with_association("post", "comments", "comment")
        .with_association("comment", "author", "user")
        .with_association("comment", "post", "post")
        .with_association("user", "country", "country")
}

/// Compiler options builder for blog post listings.
#[derive(Debug, Clone)]
pub struct TestOptions {
    options: CompilerOptions,
}

/// Start from options that allow the common post filters and sorts.
pub fn post_options() -> TestOptions {
    TestOptions {
        options: CompilerOptions::new()
            .allow_filters(["status", "price", "title"])
            .allow_order(["id", "title", "created"]),
    }
}

impl TestOptions {
    /// Allow an additional filter.
    pub fn with_filter(mut self, name: &str) -> Self {
        self.options.allowed_filters.push(name.to_string());
        self
    }

    /// Allow a filter under a public name mapped to a field or relation path.
    pub fn with_alias(mut self, name: &str, field: &str) -> Self {
        self.options.allowed_filters.push(name.to_string());
        self.options
            .filter_aliases
            .insert(name.to_string(), field.to_string());
        self
    }

    /// Use an explicit offset parameter.
    pub fn with_offset_param(mut self, name: &str) -> Self {
        self.options.paginator.offset_param = Some(name.to_string());
        self
    }

    pub fn build(self) -> CompilerOptions {
        self.options
    }
}

pub mod assert {
    use serde_json::Value;

    /// Assert that a JSON value has a specific key.
    pub fn has_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_some(),
            "Expected JSON to have key '{key}', got: {value}"
        );
    }

    /// Assert that a JSON value does not have a specific key.
    pub fn lacks_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_none(),
            "Expected JSON to lack key '{key}', got: {value}"
        );
    }

    /// Assert that a JSON value equals expected.
    pub fn json_eq(actual: &Value, expected: &Value) {
        assert_eq!(
            actual,
            expected,
            "JSON mismatch:\nactual: {}\nexpected: {}",
            serde_json::to_string_pretty(actual).unwrap_or_default(),
            serde_json::to_string_pretty(expected).unwrap_or_default()
        );
    }
}
