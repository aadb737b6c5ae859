//! Graph flattener
//!
//! Walks every table and entity reachable from a root breadth-first, giving
//! each distinct node the next dense index on first discovery. Identity is
//! `Rc` pointer identity for tables and the id for entities, so a node that is
//! reached twice (shared or cyclic) is emitted once and referenced by index
//! everywhere else.
//!
//! Flattening only reads the registry; nothing is mutated on failure.

use std::collections::VecDeque;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::core::{Registry, SnapshotError, SnapshotResult, TableRef, Value};
use crate::graph::{EntityBlob, FlatGraph, FlatNode, FlatTable, FlatValue};
use crate::types::{EntityId, ROOT_INDEX};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum NodeKey {
    Table(usize),
    Entity(EntityId),
}

struct Flattener<'a> {
    registry: &'a Registry,
    visited: FxHashMap<NodeKey, u32>,
    nodes: Vec<Option<FlatNode>>,
    /// Parent index and key per node, for error paths.
    origin: Vec<Option<(u32, FlatValue)>>,
    queue: VecDeque<(u32, TableRef)>,
}

/// Flatten the graph under `root`, which must be a table or an entity.
pub fn flatten(root: &Value, registry: &Registry) -> SnapshotResult<FlatGraph> {
    let mut flattener = Flattener {
        registry,
        visited: FxHashMap::default(),
        nodes: Vec::new(),
        origin: Vec::new(),
        queue: VecDeque::new(),
    };

    match root {
        Value::Table(_) | Value::Entity(_) => {
            flattener.intern(root, None)?;
        }
        other => {
            return Err(SnapshotError::non_serializable(format!(
                "snapshot root must be a table or entity, got {}",
                other.type_name()
            )))
        }
    }

    while let Some((index, table)) = flattener.queue.pop_front() {
        let node = flattener.flatten_table(index, &table)?;
        flattener.nodes[(index - ROOT_INDEX) as usize] = Some(FlatNode::Table(node));
    }

    let nodes = flattener
        .nodes
        .into_iter()
        .map(|node| node.ok_or_else(|| SnapshotError::corrupt("flattener left an index unfilled")))
        .collect::<SnapshotResult<Vec<_>>>()?;
    tracing::trace!(nodes = nodes.len(), "flattened value graph");
    Ok(FlatGraph::from_nodes(nodes))
}

impl Flattener<'_> {
    fn flatten_table(&mut self, index: u32, table: &TableRef) -> SnapshotResult<FlatTable> {
        let table = table.borrow();
        let mut entries = Vec::new();
        entries.try_reserve_exact(table.entry_count())?;
        for (key, value) in table.iter() {
            let key = self.intern(&key, Some((index, FlatValue::Nil)))?;
            let value = self.intern(&value, Some((index, key.clone())))?;
            entries.push((key, value));
        }
        Ok(FlatTable { entries })
    }

    /// Inline a scalar, or return a placeholder for a composite, assigning
    /// it an index and queueing it on first sight.
    fn intern(&mut self, value: &Value, origin: Option<(u32, FlatValue)>) -> SnapshotResult<FlatValue> {
        let flat = match value {
            Value::Nil => FlatValue::Nil,
            Value::Bool(b) => FlatValue::Bool(*b),
            Value::Int(i) => FlatValue::Int(*i),
            Value::Float(f) => FlatValue::Float(*f),
            Value::Str(s) => FlatValue::Str(s.to_vec()),
            Value::Table(table) => {
                let key = NodeKey::Table(Rc::as_ptr(table) as *const () as usize);
                if let Some(&index) = self.visited.get(&key) {
                    return Ok(FlatValue::Ref(index));
                }
                let index = self.reserve(key, origin);
                self.queue.push_back((index, Rc::clone(table)));
                FlatValue::Ref(index)
            }
            Value::Entity(handle) => {
                let key = NodeKey::Entity(handle.id);
                if let Some(&index) = self.visited.get(&key) {
                    return Ok(FlatValue::Ref(index));
                }
                let record = self.registry.get(handle.id).ok_or_else(|| {
                    SnapshotError::non_serializable(format!(
                        "entity {} at {} is not live",
                        handle.id,
                        self.path(origin.as_ref())
                    ))
                })?;
                let blob = EntityBlob {
                    id: handle.id.0,
                    tag: record.type_tag().0,
                    bytes: record.payload().serialize_bytes()?,
                };
                let index = self.reserve(key, origin);
                self.nodes[(index - ROOT_INDEX) as usize] = Some(FlatNode::Entity(blob));
                FlatValue::Ref(index)
            }
            Value::Function(_) | Value::Coroutine(_) => {
                return Err(SnapshotError::non_serializable(format!(
                    "{value:?} at {}",
                    self.path(origin.as_ref())
                )))
            }
        };
        Ok(flat)
    }

    fn reserve(&mut self, key: NodeKey, origin: Option<(u32, FlatValue)>) -> u32 {
        let index = self.nodes.len() as u32 + ROOT_INDEX;
        self.visited.insert(key, index);
        self.nodes.push(None);
        self.origin.push(origin);
        index
    }

    /// Render where a value sits, e.g. `root.players[2].hook`.
    fn path(&self, origin: Option<&(u32, FlatValue)>) -> String {
        let mut segments = Vec::new();
        let mut cursor = origin.cloned();
        while let Some((parent, key)) = cursor {
            segments.push(match &key {
                FlatValue::Str(s) => format!(".{}", String::from_utf8_lossy(s)),
                FlatValue::Int(i) => format!("[{i}]"),
                FlatValue::Nil => "<key>".to_string(),
                other => format!("[{other:?}]"),
            });
            cursor = self
                .origin
                .get((parent - ROOT_INDEX) as usize)
                .cloned()
                .flatten();
        }
        segments.reverse();
        format!("root{}", segments.concat())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Random, Table};

    fn table_of(entries: &[(&str, Value)]) -> Value {
        let mut t = Table::new();
        for (k, v) in entries {
            t.set_str(k, v.clone());
        }
        Value::table(t)
    }

    #[test]
    fn test_scalar_root_rejected() {
        let registry = Registry::new();
        let err = flatten(&Value::Int(3), &registry).unwrap_err();
        assert!(matches!(err, SnapshotError::NonSerializableValue(_)));
    }

    #[test]
    fn test_shared_table_gets_one_index() {
        let registry = Registry::new();
        let shared = Value::seq([Value::Int(1)]);
        let root = Value::seq([shared.clone(), shared]);
        let graph = flatten(&root, &registry).unwrap();
        assert_eq!(graph.len(), 2);
        let Some(FlatNode::Table(t)) = graph.root() else {
            panic!("root should be a table");
        };
        assert_eq!(t.entries[0].1, FlatValue::Ref(2));
        assert_eq!(t.entries[1].1, FlatValue::Ref(2));
    }

    #[test]
    fn test_self_reference_is_a_placeholder() {
        let registry = Registry::new();
        let root = Value::new_table();
        root.as_table()
            .unwrap()
            .borrow_mut()
            .set_str("self", root.clone());
        let graph = flatten(&root, &registry).unwrap();
        assert_eq!(graph.len(), 1);
        let Some(FlatNode::Table(t)) = graph.root() else {
            panic!("root should be a table");
        };
        assert_eq!(t.entries[0].1, FlatValue::Ref(1));
    }

    #[test]
    fn test_entity_is_leaf_with_serialized_bytes() {
        let mut registry = Registry::with_builtin_types();
        let rng = registry.create(Random::new(5));
        let root = table_of(&[("rng", rng.into()), ("again", rng.into())]);
        let graph = flatten(&root, &registry).unwrap();
        assert_eq!(graph.len(), 2);
        let blob = graph.entities().next().unwrap();
        assert_eq!(blob.id(), rng.id);
        assert!(!blob.bytes.is_empty());
    }

    #[test]
    fn test_function_reports_path() {
        let registry = Registry::new();
        let inner = table_of(&[("hook", Value::function("print", |_| Value::Nil))]);
        let root = table_of(&[("players", Value::seq([inner]))]);
        let err = flatten(&root, &registry).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("root.players[1].hook"), "{msg}");
    }

    #[test]
    fn test_dead_entity_rejected() {
        let mut registry = Registry::with_builtin_types();
        let rng = registry.create(Random::new(1));
        registry.destroy(rng.id);
        let root = Value::seq([rng.into()]);
        let err = flatten(&root, &registry).unwrap_err();
        assert!(matches!(err, SnapshotError::NonSerializableValue(_)));
    }

    #[test]
    fn test_table_keys_are_walked() {
        let registry = Registry::new();
        let key = Value::seq([Value::Int(9)]);
        let mut t = Table::new();
        t.set(key, Value::Bool(true));
        let graph = flatten(&Value::table(t), &registry).unwrap();
        assert_eq!(graph.len(), 2);
    }
}
