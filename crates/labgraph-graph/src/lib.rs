//! Embedded provenance graph store.
//!
//! A compact, single-writer graph of laboratory entities:
//! - **String interning**: every kind, relation, attribute name and value is
//!   stored once and referenced by a u32 id.
//! - **Columnar entities**: one kind column plus one column per attribute
//!   name, with a roaring bitmap index per kind.
//! - **Indexed relations**: edge list with forward `(source, rel)` and
//!   backward `(target, rel)` indexes for parent/child traversal.
//! - **Staged transactions**: a [`Txn`] collects new entities, new relations
//!   and attribute updates, and applies them in one commit, so a failed
//!   build/link step never leaves an orphaned entity behind.
//! - **Binary snapshots**: the whole store round-trips through bincode to a
//!   single file.
//!
//! The store knows nothing about laboratory semantics; kinds, relations and
//! attribute names are plain interned strings supplied by the schema layer.

pub mod txn;

use ahash::AHashMap;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub use txn::{NodeRef, Txn};

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("unknown entity id {0:?}")]
    UnknownEntity(NodeId),
    #[error("staged ref {0} is out of range for this transaction")]
    BadStagedRef(usize),
    #[error("snapshot encode/decode failed: {0}")]
    Snapshot(#[from] bincode::Error),
    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// String Interning
// ============================================================================

/// Interned string id (4 bytes instead of an owned String).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct StrId(u32);

impl StrId {
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Single-writer string interner.
///
/// Serialized as the ordered string table; the reverse index is rebuilt on
/// load.
#[derive(Debug, Default)]
pub struct Interner {
    strings: Vec<String>,
    index: AHashMap<String, StrId>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string, returning its id.
    pub fn intern(&mut self, s: &str) -> StrId {
        if let Some(&id) = self.index.get(s) {
            return id;
        }
        let id = StrId(self.strings.len() as u32);
        self.strings.push(s.to_string());
        self.index.insert(s.to_string(), id);
        id
    }

    /// Look up an existing id without inserting.
    pub fn get(&self, s: &str) -> Option<StrId> {
        self.index.get(s).copied()
    }

    /// Resolve an id back to its string.
    pub fn resolve(&self, id: StrId) -> Option<&str> {
        self.strings.get(id.0 as usize).map(String::as_str)
    }

    fn from_strings(strings: Vec<String>) -> Self {
        let index = strings
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), StrId(i as u32)))
            .collect();
        Self { strings, index }
    }
}

// ============================================================================
// Entity Storage (Columnar)
// ============================================================================

/// Storage-assigned surrogate identity of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct NodeId(u32);

impl NodeId {
    pub const fn raw(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct EntityStore {
    /// Kind column: entity position -> kind id.
    kinds: Vec<StrId>,
    /// Attribute columns: attr name id -> (entity id -> value id).
    attrs: AHashMap<StrId, AHashMap<u32, StrId>>,
    /// Kind index: kind id -> bitmap of entity ids.
    kind_index: AHashMap<StrId, RoaringBitmap>,
}

impl EntityStore {
    fn len(&self) -> usize {
        self.kinds.len()
    }

    fn add(&mut self, kind: StrId, attrs: Vec<(StrId, StrId)>) -> NodeId {
        let id = self.kinds.len() as u32;
        self.kinds.push(kind);
        self.kind_index.entry(kind).or_default().insert(id);
        for (name, value) in attrs {
            self.attrs.entry(name).or_default().insert(id, value);
        }
        NodeId(id)
    }

    fn kind_of(&self, id: NodeId) -> Option<StrId> {
        self.kinds.get(id.0 as usize).copied()
    }

    fn attr(&self, id: NodeId, name: StrId) -> Option<StrId> {
        self.attrs.get(&name)?.get(&id.0).copied()
    }

    fn set_attr(&mut self, id: NodeId, name: StrId, value: StrId) {
        self.attrs.entry(name).or_default().insert(id.0, value);
    }

    fn by_kind(&self, kind: StrId) -> Option<&RoaringBitmap> {
        self.kind_index.get(&kind)
    }

    /// All entities of `kind` whose attribute `name` equals `value`.
    fn with_attr_value(&self, kind: StrId, name: StrId, value: StrId) -> RoaringBitmap {
        let mut out = RoaringBitmap::new();
        let Some(kind_ids) = self.kind_index.get(&kind) else {
            return out;
        };
        let Some(col) = self.attrs.get(&name) else {
            return out;
        };
        for (&entity, &v) in col {
            if v == value && kind_ids.contains(entity) {
                out.insert(entity);
            }
        }
        out
    }
}

// ============================================================================
// Relation Storage (Edge-List with Indexes)
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Edge {
    rel: StrId,
    source: u32,
    target: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RelationStore {
    edges: Vec<Edge>,
    /// Forward index: (source, rel) -> targets.
    forward: AHashMap<(u32, StrId), Vec<u32>>,
    /// Backward index: (target, rel) -> sources.
    backward: AHashMap<(u32, StrId), Vec<u32>>,
}

impl RelationStore {
    fn len(&self) -> usize {
        self.edges.len()
    }

    fn add(&mut self, rel: StrId, source: NodeId, target: NodeId) {
        self.edges.push(Edge {
            rel,
            source: source.0,
            target: target.0,
        });
        self.forward.entry((source.0, rel)).or_default().push(target.0);
        self.backward.entry((target.0, rel)).or_default().push(source.0);
    }

    fn has_edge(&self, rel: StrId, source: NodeId, target: NodeId) -> bool {
        self.forward
            .get(&(source.0, rel))
            .is_some_and(|ts| ts.contains(&target.0))
    }

    fn targets(&self, source: NodeId, rel: StrId) -> &[u32] {
        self.forward
            .get(&(source.0, rel))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn sources(&self, target: NodeId, rel: StrId) -> &[u32] {
        self.backward
            .get(&(target.0, rel))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

// ============================================================================
// Graph Store
// ============================================================================

/// The combined store. All mutation goes through [`Txn::commit`] or the
/// narrow `set_attr` used by whitelist updates.
#[derive(Debug, Default)]
pub struct GraphStore {
    pub(crate) interner: Interner,
    entities: EntityStore,
    relations: RelationStore,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }

    pub fn begin(&self) -> Txn {
        Txn::new()
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Kind name of an entity.
    pub fn kind_of(&self, id: NodeId) -> Option<&str> {
        let kind = self.entities.kind_of(id)?;
        self.interner.resolve(kind)
    }

    /// Attribute value of an entity, if set.
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        let name = self.interner.get(name)?;
        let value = self.entities.attr(id, name)?;
        self.interner.resolve(value)
    }

    /// All entities of a kind, in creation order.
    pub fn entities_of_kind(&self, kind: &str) -> Vec<NodeId> {
        let Some(kind) = self.interner.get(kind) else {
            return Vec::new();
        };
        self.entities
            .by_kind(kind)
            .map(|b| b.iter().map(NodeId).collect())
            .unwrap_or_default()
    }

    /// Entities of `kind` matching every `(attr, value)` pair. An unknown
    /// kind, attribute or value matches nothing.
    pub fn find(&self, kind: &str, key: &[(&str, &str)]) -> Vec<NodeId> {
        let Some(kind_id) = self.interner.get(kind) else {
            return Vec::new();
        };
        let mut acc: Option<RoaringBitmap> = None;
        for (name, value) in key {
            let (Some(name), Some(value)) = (self.interner.get(name), self.interner.get(value))
            else {
                return Vec::new();
            };
            let matched = self.entities.with_attr_value(kind_id, name, value);
            acc = Some(match acc {
                None => matched,
                Some(prev) => prev & matched,
            });
            if acc.as_ref().is_some_and(RoaringBitmap::is_empty) {
                return Vec::new();
            }
        }
        let base = match acc {
            Some(bitmap) => bitmap,
            // Empty key: every entity of the kind is a candidate.
            None => self.entities.by_kind(kind_id).cloned().unwrap_or_default(),
        };
        base.iter().map(NodeId).collect()
    }

    /// Parents of `id` through `rel`, restricted to `parent_kind`.
    pub fn parents_of(&self, id: NodeId, rel: &str, parent_kind: &str) -> Vec<NodeId> {
        let (Some(rel), Some(kind)) = (self.interner.get(rel), self.interner.get(parent_kind))
        else {
            return Vec::new();
        };
        self.relations
            .targets(id, rel)
            .iter()
            .copied()
            .map(NodeId)
            .filter(|&p| self.entities.kind_of(p) == Some(kind))
            .collect()
    }

    /// Children of `id` through `rel`, restricted to `child_kind`.
    pub fn children_of(&self, id: NodeId, rel: &str, child_kind: &str) -> Vec<NodeId> {
        let (Some(rel), Some(kind)) = (self.interner.get(rel), self.interner.get(child_kind))
        else {
            return Vec::new();
        };
        self.relations
            .sources(id, rel)
            .iter()
            .copied()
            .map(NodeId)
            .filter(|&c| self.entities.kind_of(c) == Some(kind))
            .collect()
    }

    pub fn has_edge(&self, rel: &str, source: NodeId, target: NodeId) -> bool {
        match self.interner.get(rel) {
            Some(rel) => self.relations.has_edge(rel, source, target),
            None => false,
        }
    }

    /// Debug/report view of an entity's attributes, sorted by name.
    pub fn attrs_of(&self, id: NodeId) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for (&name, col) in &self.entities.attrs {
            if let Some(&value) = col.get(&id.raw()) {
                let (Some(n), Some(v)) =
                    (self.interner.resolve(name), self.interner.resolve(value))
                else {
                    continue;
                };
                out.push((n.to_string(), v.to_string()));
            }
        }
        out.sort();
        out
    }

    // ------------------------------------------------------------------
    // Writes (crate-internal; the txn module is the public mutation path)
    // ------------------------------------------------------------------

    pub(crate) fn insert_entity(&mut self, kind: &str, attrs: &[(String, String)]) -> NodeId {
        let kind = self.interner.intern(kind);
        let attrs = attrs
            .iter()
            .map(|(n, v)| (self.interner.intern(n), self.interner.intern(v)))
            .collect();
        self.entities.add(kind, attrs)
    }

    pub(crate) fn insert_relation(&mut self, rel: &str, source: NodeId, target: NodeId) {
        let rel = self.interner.intern(rel);
        if !self.relations.has_edge(rel, source, target) {
            self.relations.add(rel, source, target);
        }
    }

    /// Set one attribute on an existing entity. Whitelist updates only.
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) -> Result<(), GraphError> {
        if id.raw() as usize >= self.entities.len() {
            return Err(GraphError::UnknownEntity(id));
        }
        let name = self.interner.intern(name);
        let value = self.interner.intern(value);
        self.entities.set_attr(id, name, value);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    pub fn to_bytes(&self) -> Result<Vec<u8>, GraphError> {
        let snapshot = Snapshot {
            strings: self.interner.strings.clone(),
            entities: &self.entities,
            relations: &self.relations,
        };
        Ok(bincode::serialize(&snapshot)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GraphError> {
        let snapshot: SnapshotOwned = bincode::deserialize(bytes)?;
        Ok(Self {
            interner: Interner::from_strings(snapshot.strings),
            entities: snapshot.entities,
            relations: snapshot.relations,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), GraphError> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    /// Load a snapshot, or start empty when the file does not exist yet.
    pub fn load_or_new(path: &Path) -> Result<Self, GraphError> {
        if path.exists() {
            Self::from_bytes(&std::fs::read(path)?)
        } else {
            Ok(Self::new())
        }
    }
}

#[derive(Serialize)]
struct Snapshot<'a> {
    strings: Vec<String>,
    entities: &'a EntityStore,
    relations: &'a RelationStore,
}

#[derive(Deserialize)]
struct SnapshotOwned {
    strings: Vec<String>,
    entities: EntityStore,
    relations: RelationStore,
}

// ============================================================================
// Tests
// ============================================================================
