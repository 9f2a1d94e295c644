//! Relation metadata.
//!
//! The include builder only needs to know whether a model has an association
//! of a given name, and where it leads. [`RelationSource`] is that seam;
//! [`ModelCatalog`] is an in-memory implementation that can be loaded from a
//! settings file.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A resolved association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    /// Identifies the association itself (e.g. `post.author`).
    pub handle: String,
    /// Model the association leads to.
    pub target: String,
    /// Alias the join is known by.
    pub alias: String,
}

/// Source of association metadata.
pub trait RelationSource: Send + Sync {
    /// Look up an association by name on `model`.
    fn lookup_association(&self, model: &str, association: &str) -> Option<Association>;
}

// ---------------------------------------------------------------------------
// ModelCatalog
// ---------------------------------------------------------------------------

/// Association declaration inside a [`ModelDefinition`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationDefinition {
    /// Target model.
    pub target: String,

    /// Join alias; defaults to the association name.
    #[serde(default, rename = "as", skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDefinition {
    #[serde(default)]
    pub associations: HashMap<String, AssociationDefinition>,
}

/// In-memory model metadata, as declared under `models` in compiler settings:
///
/// ```toml
/// [models.post.associations]
/// author = { target = "user" }
/// comments = { target = "comment", as = "replies" }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelCatalog {
    models: HashMap<String, ModelDefinition>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `model.name -> target`, aliased by its own name.
    pub fn with_association(
        self,
        model: impl Into<String>,
        name: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        self.with_aliased_association(model, name, target, None::<String>)
    }

    /// Declare `model.name -> target` with an explicit join alias.
    pub fn with_aliased_association(
        mut self,
        model: impl Into<String>,
        name: impl Into<String>,
        target: impl Into<String>,
        alias: Option<impl Into<String>>,
    ) -> Self {
        self.models
            .entry(model.into())
            .or_default()
            .associations
            .insert(
                name.into(),
                AssociationDefinition {
                    target: target.into(),
                    alias: alias.map(Into::into),
                },
            );
        self
    }

    pub fn model(&self, name: &str) -> Option<&ModelDefinition> {
        self.models.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl RelationSource for ModelCatalog {
    fn lookup_association(&self, model: &str, association: &str) -> Option<Association> {
        let definition = self.models.get(model)?.associations.get(association)?;
        Some(Association {
            handle: format!("{model}.{association}"),
            target: definition.target.clone(),
            alias: definition
                .alias
                .clone()
                .unwrap_or_else(|| association.to_string()),
        })
    }
}
