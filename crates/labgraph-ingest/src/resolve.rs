//! Identity resolution.
//!
//! A scoped natural-key lookup: candidates are entities of the kind whose
//! own key attributes equal the row's values; each scope constraint then
//! prunes candidates by walking ancestor paths outward and matching
//! ancestor attributes against the row. Dual-parentage kinds declare the
//! whole-sample and cultured-isolate routes as a path disjunction, so a
//! match through either satisfies the constraint (a set union, exactly as
//! downstream consumers need).
//!
//! Zero survivors is NotFound (normal; triggers creation). One is Found.
//! More than one is Ambiguous and always fatal upstream: it means the
//! uniqueness invariant was already violated, and the engine must not guess.

use crate::normalize::Row;
use labgraph_graph::{GraphStore, NodeId};
use labgraph_schema::descriptor::{FieldMatch, KeySpec, ScopePath, ValueClass};
use labgraph_schema::fields::canonical_date;
use labgraph_schema::EntityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    NotFound,
    Found(NodeId),
    Ambiguous(usize),
}

/// Canonical comparison/storage form of the row value a [`FieldMatch`]
/// names. None when the row does not carry the field or a date fails to
/// parse (the validator rejects the latter before resolution on the
/// canonical load path).
pub fn canonical_value(row: &Row, fm: &FieldMatch) -> Option<String> {
    let raw = row.get(fm.field)?;
    match fm.class {
        ValueClass::Text => Some(raw.to_string()),
        ValueClass::Date => canonical_date(raw).ok(),
    }
}

/// Render the own-key values of a spec against a row, for error messages.
pub fn render_key(key: &KeySpec, row: &Row) -> String {
    let mut parts: Vec<String> = key
        .own
        .iter()
        .map(|fm| {
            let value = canonical_value(row, fm).unwrap_or_else(|| "<blank>".to_string());
            format!("{}={}", fm.attr, value)
        })
        .collect();
    for constraint in &key.scope {
        for path in &constraint.paths {
            for hop in &path.hops {
                for fm in &hop.filters {
                    let value = canonical_value(row, fm).unwrap_or_else(|| "<blank>".to_string());
                    let part = format!("{}={}", fm.attr, value);
                    if !parts.contains(&part) {
                        parts.push(part);
                    }
                }
            }
        }
    }
    parts.join(", ")
}

pub fn resolve(store: &GraphStore, kind: EntityKind, key: &KeySpec, row: &Row) -> Resolution {
    let mut own: Vec<(String, String)> = Vec::with_capacity(key.own.len());
    for fm in &key.own {
        match canonical_value(row, fm) {
            Some(value) => own.push((fm.attr.to_string(), value)),
            // A blank key field can never match an existing record.
            None => return Resolution::NotFound,
        }
    }
    let own_refs: Vec<(&str, &str)> = own.iter().map(|(a, v)| (a.as_str(), v.as_str())).collect();

    let mut candidates = store.find(kind.as_str(), &own_refs);
    for constraint in &key.scope {
        candidates.retain(|&c| {
            constraint
                .paths
                .iter()
                .any(|path| walk_path(store, c, path, row))
        });
        if candidates.is_empty() {
            return Resolution::NotFound;
        }
    }

    match candidates.len() {
        0 => Resolution::NotFound,
        1 => Resolution::Found(candidates[0]),
        n => Resolution::Ambiguous(n),
    }
}

/// Existential walk: does any chain of ancestors along `path` satisfy every
/// hop's filters?
fn walk_path(store: &GraphStore, start: NodeId, path: &ScopePath, row: &Row) -> bool {
    let mut frontier = vec![start];
    for hop in &path.hops {
        let mut next: Vec<NodeId> = Vec::new();
        for node in frontier {
            'parents: for parent in store.parents_of(node, hop.rel.as_str(), hop.parent.as_str()) {
                for fm in &hop.filters {
                    let Some(wanted) = canonical_value(row, fm) else {
                        // A filter without a row value matches nothing.
                        continue 'parents;
                    };
                    if store.attr(parent, fm.attr) != Some(wanted.as_str()) {
                        continue 'parents;
                    }
                }
                next.push(parent);
            }
        }
        next.sort_unstable();
        next.dedup();
        if next.is_empty() {
            return false;
        }
        frontier = next;
    }
    true
}
