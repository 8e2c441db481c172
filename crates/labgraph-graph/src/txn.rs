//! Staged transactions.
//!
//! A [`Txn`] accumulates new entities, new relations and attribute updates
//! without touching the store. `commit` applies everything in one pass, so a
//! child entity and its parent linkage land together or not at all. The store
//! is single-writer; atomicity here means "no partial unit is ever visible",
//! not cross-process durability.

use crate::{GraphError, GraphStore, NodeId};

/// Reference to a node from inside a transaction: either an entity that
/// already exists in the store, or one staged by this transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRef {
    Existing(NodeId),
    Staged(usize),
}

impl From<NodeId> for NodeRef {
    fn from(id: NodeId) -> Self {
        NodeRef::Existing(id)
    }
}

#[derive(Debug)]
struct StagedEntity {
    kind: String,
    attrs: Vec<(String, String)>,
}

#[derive(Debug)]
struct StagedRelation {
    rel: String,
    source: NodeRef,
    target: NodeRef,
}

/// A staged unit of graph mutation.
#[derive(Debug, Default)]
pub struct Txn {
    entities: Vec<StagedEntity>,
    relations: Vec<StagedRelation>,
    attr_sets: Vec<(NodeId, String, String)>,
}

impl Txn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relations.is_empty() && self.attr_sets.is_empty()
    }

    /// Stage a new entity; the returned ref is valid within this txn.
    pub fn create(&mut self, kind: &str, attrs: Vec<(&str, &str)>) -> NodeRef {
        let idx = self.entities.len();
        self.entities.push(StagedEntity {
            kind: kind.to_string(),
            attrs: attrs
                .into_iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
        });
        NodeRef::Staged(idx)
    }

    /// Stage a relation between existing and/or staged nodes.
    pub fn relate(&mut self, rel: &str, source: impl Into<NodeRef>, target: impl Into<NodeRef>) {
        self.relations.push(StagedRelation {
            rel: rel.to_string(),
            source: source.into(),
            target: target.into(),
        });
    }

    /// Stage an attribute update on an existing entity.
    pub fn update_attr(&mut self, id: NodeId, name: &str, value: &str) {
        self.attr_sets.push((id, name.to_string(), value.to_string()));
    }

    /// Apply the staged unit. Returns the store ids of created entities in
    /// staging order. Staged refs are validated before any mutation, so a
    /// malformed unit leaves the store untouched.
    pub fn commit(self, store: &mut GraphStore) -> Result<Vec<NodeId>, GraphError> {
        for rel in &self.relations {
            for node in [rel.source, rel.target] {
                if let NodeRef::Staged(idx) = node {
                    if idx >= self.entities.len() {
                        return Err(GraphError::BadStagedRef(idx));
                    }
                }
            }
        }

        let created: Vec<NodeId> = self
            .entities
            .iter()
            .map(|e| store.insert_entity(&e.kind, &e.attrs))
            .collect();

        for rel in &self.relations {
            let source = resolve(rel.source, &created);
            let target = resolve(rel.target, &created);
            store.insert_relation(&rel.rel, source, target);
        }

        for (id, name, value) in &self.attr_sets {
            store.set_attr(*id, name, value)?;
        }

        Ok(created)
    }
}

fn resolve(node: NodeRef, created: &[NodeId]) -> NodeId {
    match node {
        NodeRef::Existing(id) => id,
        NodeRef::Staged(idx) => created[idx],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_creates_entities_and_edges_together() {
        let mut store = GraphStore::new();
        let mut txn = store.begin();
        let sample = txn.create("sample", vec![("sample_identifier", "s1")]);
        let extraction = txn.create("extraction", vec![("extraction_identifier", "e1")]);
        txn.relate("extracted_from", extraction, sample);
        let created = txn.commit(&mut store).unwrap();
        assert_eq!(created.len(), 2);
        assert_eq!(
            store.parents_of(created[1], "extracted_from", "sample"),
            vec![created[0]]
        );
    }

    #[test]
    fn staged_refs_can_target_existing_nodes() {
        let mut store = GraphStore::new();
        let mut txn = store.begin();
        txn.create("sample", vec![("sample_identifier", "s1")]);
        let sample = txn.commit(&mut store).unwrap()[0];

        let mut txn = store.begin();
        let culture = txn.create("culture", vec![("culture_identifier", "c1")]);
        txn.relate("cultured_from", culture, sample);
        let created = txn.commit(&mut store).unwrap();
        assert_eq!(
            store.parents_of(created[0], "cultured_from", "sample"),
            vec![sample]
        );
    }

    #[test]
    fn bad_staged_ref_leaves_store_untouched() {
        let mut store = GraphStore::new();
        let mut txn = store.begin();
        let sample = txn.create("sample", vec![]);
        txn.relate("extracted_from", NodeRef::Staged(7), sample);
        assert!(txn.commit(&mut store).is_err());
        assert_eq!(store.entity_count(), 0);
        assert_eq!(store.relation_count(), 0);
    }

    #[test]
    fn update_attr_applies_on_commit() {
        let mut store = GraphStore::new();
        let mut txn = store.begin();
        txn.create("sample", vec![("submitted_for_sequencing", "false")]);
        let sample = txn.commit(&mut store).unwrap()[0];

        let mut txn = store.begin();
        txn.update_attr(sample, "submitted_for_sequencing", "true");
        txn.commit(&mut store).unwrap();
        assert_eq!(store.attr(sample, "submitted_for_sequencing"), Some("true"));
    }
}
