//! Flat graph - the acyclic, index-addressed form of a value graph
//!
//! Every composite (table or entity) reachable from the root gets a dense
//! index starting at [`ROOT_INDEX`]. Inside a flat table, nested composites
//! appear only as [`FlatValue::Ref`] placeholders.

use serde::Serialize;

use crate::types::{EntityId, TypeTag, ROOT_INDEX};

/// A scalar or a placeholder naming another node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FlatValue {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(#[serde(serialize_with = "lossy_str")] Vec<u8>),
    Ref(u32),
}

fn lossy_str<S: serde::Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&String::from_utf8_lossy(bytes))
}

/// Entries of one table in iteration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlatTable {
    pub entries: Vec<(FlatValue, FlatValue)>,
}

impl FlatTable {
    /// Non-empty and keyed exactly `1, 2, .., n` in order.
    pub fn is_sequence(&self) -> bool {
        !self.entries.is_empty()
            && self
                .entries
                .iter()
                .enumerate()
                .all(|(i, (k, _))| *k == FlatValue::Int(i as i64 + 1))
    }
}

/// A native entity captured as opaque bytes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityBlob {
    pub id: u32,
    pub tag: u8,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl EntityBlob {
    pub fn id(&self) -> EntityId {
        EntityId(self.id)
    }

    pub fn type_tag(&self) -> TypeTag {
        TypeTag(self.tag)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FlatNode {
    Table(FlatTable),
    Entity(EntityBlob),
}

/// Nodes keyed by dense index; `nodes[i]` holds index `i + ROOT_INDEX`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlatGraph {
    nodes: Vec<FlatNode>,
}

impl FlatGraph {
    /// Build from nodes already in index order.
    pub fn from_nodes(nodes: Vec<FlatNode>) -> Self {
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, index: u32) -> Option<&FlatNode> {
        let slot = index.checked_sub(ROOT_INDEX)?;
        self.nodes.get(slot as usize)
    }

    pub fn root(&self) -> Option<&FlatNode> {
        self.get(ROOT_INDEX)
    }

    /// `(index, node)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &FlatNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (i as u32 + ROOT_INDEX, node))
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityBlob> {
        self.nodes.iter().filter_map(|node| match node {
            FlatNode::Entity(blob) => Some(blob),
            FlatNode::Table(_) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(i: i64) -> FlatValue {
        FlatValue::Int(i)
    }

    #[test]
    fn test_sequence_detection() {
        let seq = FlatTable {
            entries: vec![(int(1), int(10)), (int(2), FlatValue::Ref(2))],
        };
        assert!(seq.is_sequence());

        let gap = FlatTable {
            entries: vec![(int(1), int(10)), (int(3), int(30))],
        };
        assert!(!gap.is_sequence());

        let keyed = FlatTable {
            entries: vec![(FlatValue::Str(b"x".to_vec()), int(1))],
        };
        assert!(!keyed.is_sequence());
        assert!(!FlatTable::default().is_sequence());
    }

    #[test]
    fn test_indices_start_at_root() {
        let graph = FlatGraph::from_nodes(vec![
            FlatNode::Table(FlatTable::default()),
            FlatNode::Table(FlatTable::default()),
        ]);
        assert!(graph.get(0).is_none());
        assert!(graph.root().is_some());
        assert!(graph.get(2).is_some());
        assert!(graph.get(3).is_none());
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_json_dump_is_readable() {
        let graph = FlatGraph::from_nodes(vec![FlatNode::Table(FlatTable {
            entries: vec![(FlatValue::Str(b"name".to_vec()), FlatValue::Str(b"tetris".to_vec()))],
        })]);
        let json = serde_json::to_string(&graph).unwrap();
        assert!(json.contains("\"tetris\""));
    }
}
