//! Include-tree construction for relational filters.
//!
//! A relational filter such as `author.country=US` becomes a chain of join
//! nodes, one per association segment, with the predicate on the deepest
//! node. Chains from different filters that share a prefix are merged so
//! each join appears once.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use super::filter::ResolvedFilter;
use super::operator::OperatorSet;
use super::relation::{Association, RelationSource};
use super::types::{IncludeNode, JoinKey, PATH_SEPARATOR, Where};
use crate::error::{QueryError, QueryResult};

/// Builds join chains by walking association paths from a root model.
pub struct IncludeTreeBuilder<'a> {
    source: &'a dyn RelationSource,
    root_model: &'a str,
    operators: &'a OperatorSet,
}

impl<'a> IncludeTreeBuilder<'a> {
    pub fn new(source: &'a dyn RelationSource, root_model: &'a str, operators: &'a OperatorSet) -> Self {
        Self {
            source,
            root_model,
            operators,
        }
    }

    /// Resolve each segment of `path` starting at the root model.
    pub fn resolve_path(&self, path: &[&str]) -> QueryResult<Vec<Association>> {
        let mut model = self.root_model.to_string();
        let mut chain = Vec::with_capacity(path.len());

        for segment in path {
            let association = self.source.lookup_association(&model, segment).ok_or_else(|| {
                QueryError::UnknownAssociation {
                    model: model.clone(),
                    association: (*segment).to_string(),
                }
            })?;
            model.clone_from(&association.target);
            chain.push(association);
        }

        Ok(chain)
    }

    /// Build the join chain for one relational filter.
    pub fn build(&self, filter: &ResolvedFilter) -> QueryResult<IncludeNode> {
        let segments: Vec<&str> = filter.spec.field.split(PATH_SEPARATOR).collect();
        let Some((leaf, path)) = segments.split_last() else {
            return Err(QueryError::configuration(format!(
                "filter \"{}\" has an empty relation path",
                filter.spec.name
            )));
        };
        if path.is_empty() || leaf.is_empty() {
            return Err(QueryError::configuration(format!(
                "filter \"{}\" maps to \"{}\", which has no leaf field",
                filter.spec.name, filter.spec.field
            )));
        }

        let chain = self.resolve_path(path)?;
        let predicate = self
            .operators
            .build_predicate(&filter.value, leaf, &filter.spec.name)?;

        let mut node: Option<IncludeNode> = None;
        for association in chain.into_iter().rev() {
            let r#where = node.is_none().then(|| Where::from_predicate(predicate.clone()));
            node = Some(IncludeNode {
                association: association.handle,
                model: association.target,
                alias: association.alias,
                required: true,
                r#where,
                include: node.into_iter().collect(),
            });
        }

        node.ok_or_else(|| {
            QueryError::configuration(format!("filter \"{}\" produced no join", filter.spec.name))
        })
    }

    /// Build and merge the join chains for all relational filters.
    pub fn build_all<'f, I>(&self, filters: I) -> QueryResult<Vec<IncludeNode>>
    where
        I: IntoIterator<Item = &'f ResolvedFilter>,
    {
        let nodes = filters
            .into_iter()
            .filter(|f| f.is_relational())
            .map(|f| self.build(f))
            .collect::<QueryResult<Vec<_>>>()?;
        Ok(merge_includes(nodes))
    }
}

/// Merge include nodes that denote the same join.
///
/// Nodes are matched per level on `(association, model, as)`. The first
/// occurrence keeps its position; later duplicates fold into it, with the
/// conditions already present taking precedence. Children are merged the
/// same way, so the result has unique keys at every level.
pub fn merge_includes(nodes: Vec<IncludeNode>) -> Vec<IncludeNode> {
    let mut merged: Vec<IncludeNode> = Vec::with_capacity(nodes.len());
    let mut index: HashMap<JoinKey, usize> = HashMap::new();

    for node in nodes {
        match index.entry(node.key()) {
            Entry::Occupied(slot) => absorb(&mut merged[*slot.get()], node),
            Entry::Vacant(slot) => {
                slot.insert(merged.len());
                merged.push(node);
            }
        }
    }

    for node in &mut merged {
        let children = std::mem::take(&mut node.include);
        node.include = merge_includes(children);
    }

    merged
}

fn absorb(existing: &mut IncludeNode, incoming: IncludeNode) {
    existing.required |= incoming.required;
    if let Some(conditions) = incoming.r#where {
        existing
            .r#where
            .get_or_insert_with(Where::new)
            .merge_missing(conditions);
    }
    existing.include.extend(incoming.include);
}
