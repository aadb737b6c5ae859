//! Graph rebuilder
//!
//! Turns a decoded [`FlatGraph`] back into live values. Every table node gets
//! an empty shell up front, so a placeholder can always be replaced by the
//! shell at its index, including the table currently being filled. Each
//! index is visited exactly once; cycles need no special casing.
//!
//! Entity leaves are deserialized before anything touches the registry. A
//! failure anywhere leaves the registry as it was.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashSet;

use crate::core::{EntityRef, Payload, Registry, SnapshotError, SnapshotResult, Table, TableRef, Value};
use crate::graph::{FlatGraph, FlatNode, FlatValue};
use crate::types::{EntityId, ROOT_INDEX};

enum Shell {
    Table(TableRef),
    Entity(EntityRef),
}

/// Rebuild the root value of `graph`, installing its entities into
/// `registry` at their original ids.
pub fn unflatten(graph: &FlatGraph, registry: &mut Registry) -> SnapshotResult<Value> {
    unflatten_entities(graph, registry).map(|(root, _)| root)
}

/// Like [`unflatten`], also returning the ids of the installed entities in
/// index order.
pub fn unflatten_entities(graph: &FlatGraph, registry: &mut Registry) -> SnapshotResult<(Value, Vec<EntityId>)> {
    if graph.is_empty() {
        return Err(SnapshotError::corrupt("snapshot has no root node"));
    }

    let mut shells = Vec::new();
    shells.try_reserve_exact(graph.len())?;
    let mut payloads: Vec<(EntityId, Box<dyn Payload>)> = Vec::new();
    let mut seen = FxHashSet::default();

    for (index, node) in graph.iter() {
        match node {
            FlatNode::Table(_) => shells.push(Shell::Table(Rc::new(RefCell::new(Table::new())))),
            FlatNode::Entity(blob) => {
                let id = blob.id();
                if id.is_none() || !seen.insert(id) {
                    return Err(SnapshotError::corrupt(format!(
                        "node {index} reuses entity id {id}"
                    )));
                }
                let payload = registry.types().deserialize(blob.type_tag(), &blob.bytes)?;
                if payload.type_tag() != blob.type_tag() {
                    return Err(SnapshotError::corrupt(format!(
                        "entity {id} tagged {} deserialized as {}",
                        blob.type_tag(),
                        payload.type_tag()
                    )));
                }
                payloads.push((id, payload));
                shells.push(Shell::Entity(EntityRef {
                    id,
                    tag: blob.type_tag(),
                }));
            }
        }
    }

    let resolve = |value: &FlatValue| -> SnapshotResult<Value> {
        Ok(match value {
            FlatValue::Nil => Value::Nil,
            FlatValue::Bool(b) => Value::Bool(*b),
            FlatValue::Int(i) => Value::Int(*i),
            FlatValue::Float(f) => Value::Float(*f),
            FlatValue::Str(s) => Value::str(s),
            FlatValue::Ref(index) => {
                let shell = index
                    .checked_sub(ROOT_INDEX)
                    .and_then(|slot| shells.get(slot as usize))
                    .ok_or_else(|| SnapshotError::corrupt(format!("dangling reference to node {index}")))?;
                match shell {
                    Shell::Table(table) => Value::Table(Rc::clone(table)),
                    Shell::Entity(handle) => Value::Entity(*handle),
                }
            }
        })
    };

    for ((index, node), shell) in graph.iter().zip(&shells) {
        let (FlatNode::Table(flat), Shell::Table(table)) = (node, shell) else {
            continue;
        };
        for (key, value) in &flat.entries {
            let key = resolve(key)?;
            let value = resolve(value)?;
            if !table.borrow_mut().set(key, value) {
                return Err(SnapshotError::corrupt(format!("node {index} has a nil or NaN key")));
            }
        }
    }

    let root = match &shells[0] {
        Shell::Table(table) => Value::Table(Rc::clone(table)),
        Shell::Entity(handle) => Value::Entity(*handle),
    };

    let ids: Vec<EntityId> = payloads.iter().map(|(id, _)| *id).collect();
    for (id, payload) in payloads {
        registry.install(id, payload);
    }
    tracing::trace!(nodes = graph.len(), entities = ids.len(), "rebuilt value graph");
    Ok((root, ids))
}
