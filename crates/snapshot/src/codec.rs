//! Binary codec for flat graphs
//!
//! Layout, using the [`wire`](crate::core::wire) items:
//!
//! ```text
//! graph  := map(N) { int(index) node }*        indices 1..=N, any order
//! node   := blob(type_tag, envelope)           entity leaf
//!         | seq(n) value*                      table keyed exactly 1..=n
//!         | map(n) { value value }*            any other table
//! value  := nil | bool | int | float | str
//!         | seq(1) int(index)                  reference to another node
//! envelope := seq(3) int(entity_id) int(type_tag) str(entity bytes)
//! ```
//!
//! A one-element sequence in value position is always a reference: tables
//! never appear inline, so nothing else can take that shape there.

use crate::core::entity::{read_envelope, write_envelope};
use crate::core::wire::{Reader, Scalar, Writer, TAG_BLOB, TAG_MAP, TAG_SEQ};
use crate::core::{SnapshotError, SnapshotResult, TypeTable};
use crate::graph::{EntityBlob, FlatGraph, FlatNode, FlatTable, FlatValue};
use crate::types::{EntityId, TypeTag, ROOT_INDEX};

/// Encode a flat graph into a self-describing buffer.
pub fn encode(graph: &FlatGraph) -> SnapshotResult<Vec<u8>> {
    let mut out = Writer::with_capacity(64 * graph.len())?;
    out.map(graph.len())?;
    for (index, node) in graph.iter() {
        out.int(index as i64)?;
        match node {
            FlatNode::Entity(blob) => {
                let envelope = write_envelope(blob.id(), blob.type_tag(), &blob.bytes)?;
                out.blob(blob.type_tag(), &envelope)?;
            }
            FlatNode::Table(table) if table.is_sequence() => {
                out.seq(table.entries.len())?;
                for (_, value) in &table.entries {
                    write_value(&mut out, value)?;
                }
            }
            FlatNode::Table(table) => {
                out.map(table.entries.len())?;
                for (key, value) in &table.entries {
                    write_value(&mut out, key)?;
                    write_value(&mut out, value)?;
                }
            }
        }
    }
    Ok(out.into_bytes())
}

fn write_value(out: &mut Writer, value: &FlatValue) -> SnapshotResult<()> {
    match value {
        FlatValue::Nil => out.nil(),
        FlatValue::Bool(b) => out.bool(*b),
        FlatValue::Int(i) => out.int(*i),
        FlatValue::Float(f) => out.float(*f),
        FlatValue::Str(s) => out.str(s),
        FlatValue::Ref(index) => {
            out.seq(1)?;
            out.int(*index as i64)
        }
    }
}

/// Decode a buffer produced by [`encode`].
///
/// Every node is decoded independently; references are only checked for
/// range here; the rebuilder resolves them. Entity leaves must name a type
/// the `types` table knows.
pub fn decode(bytes: &[u8], types: &TypeTable) -> SnapshotResult<FlatGraph> {
    let mut input = Reader::new(bytes);
    let count = input.map()?;
    if count == 0 {
        return Err(SnapshotError::corrupt("snapshot has no root node"));
    }

    let mut slots: Vec<Option<FlatNode>> = Vec::new();
    slots.try_reserve_exact(count)?;
    slots.resize_with(count, || None);

    for _ in 0..count {
        let index = input.int()?;
        let slot = index
            .checked_sub(ROOT_INDEX as i64)
            .and_then(|slot| usize::try_from(slot).ok())
            .filter(|slot| *slot < count)
            .ok_or_else(|| SnapshotError::corrupt(format!("node index {index} out of range 1..={count}")))?;
        if slots[slot].is_some() {
            return Err(SnapshotError::corrupt(format!("node index {index} appears twice")));
        }
        slots[slot] = Some(read_node(&mut input, types, count)?);
    }
    input.finish()?;

    // count distinct in-range keys were read, so every slot is filled.
    let nodes = slots.into_iter().flatten().collect();
    Ok(FlatGraph::from_nodes(nodes))
}

fn read_node(input: &mut Reader<'_>, types: &TypeTable, count: usize) -> SnapshotResult<FlatNode> {
    match input.peek_tag()? {
        TAG_BLOB => {
            let (tag, envelope) = input.blob()?;
            let envelope = read_envelope(&envelope)?;
            if envelope.tag != tag {
                return Err(SnapshotError::corrupt(format!(
                    "entity {} blob tagged {tag} but envelope says {}",
                    envelope.id, envelope.tag
                )));
            }
            if !types.contains(tag) {
                tracing::warn!(%tag, id = %envelope.id, "snapshot holds an entity type this build does not know");
                return Err(SnapshotError::UnknownEntityType(tag));
            }
            Ok(FlatNode::Entity(EntityBlob {
                id: envelope.id.0,
                tag: tag.0,
                bytes: envelope.body,
            }))
        }
        TAG_SEQ => {
            let n = input.seq()?;
            let mut entries = Vec::new();
            entries.try_reserve_exact(n)?;
            for i in 0..n {
                entries.push((FlatValue::Int(i as i64 + 1), read_value(input, count)?));
            }
            Ok(FlatNode::Table(FlatTable { entries }))
        }
        TAG_MAP => {
            let n = input.map()?;
            let mut entries = Vec::new();
            entries.try_reserve_exact(n)?;
            for _ in 0..n {
                let key = read_value(input, count)?;
                let value = read_value(input, count)?;
                entries.push((key, value));
            }
            Ok(FlatNode::Table(FlatTable { entries }))
        }
        tag => Err(SnapshotError::corrupt(format!(
            "unknown node shape 0x{tag:02x} at offset {}",
            input.position()
        ))),
    }
}

fn read_value(input: &mut Reader<'_>, count: usize) -> SnapshotResult<FlatValue> {
    if input.peek_tag()? == TAG_SEQ {
        let at = input.position();
        if input.seq()? != 1 {
            return Err(SnapshotError::corrupt(format!(
                "inline sequence at offset {at} is not a reference"
            )));
        }
        let index = input.int()?;
        if index < ROOT_INDEX as i64 || index > count as i64 {
            return Err(SnapshotError::corrupt(format!(
                "dangling reference to node {index} (graph has {count})"
            )));
        }
        return Ok(FlatValue::Ref(index as u32));
    }
    Ok(match input.scalar()? {
        Scalar::Nil => FlatValue::Nil,
        Scalar::Bool(b) => FlatValue::Bool(b),
        Scalar::Int(i) => FlatValue::Int(i),
        Scalar::Float(f) => FlatValue::Float(f),
        Scalar::Str(s) => FlatValue::Str(s),
    })
}

/// Ids and type tags of the entity leaves in a flat graph, without
/// deserializing them. Useful for diagnostics.
pub fn entity_summary(graph: &FlatGraph) -> Vec<(EntityId, TypeTag)> {
    graph.entities().map(|b| (b.id(), b.type_tag())).collect()
}
