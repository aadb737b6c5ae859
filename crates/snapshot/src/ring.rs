//! Fixed-capacity snapshot ring
//!
//! Tic `t` lives in slot `t % capacity` and is overwritten unconditionally
//! when a later tic maps to the same slot. Each slot remembers the tic it was
//! written for, so a lookup never hands back a frame from a different tic.

use rustc_hash::FxHashSet;

use crate::codec::{decode, encode};
use crate::core::{Registry, SnapshotError, SnapshotResult, Value};
use crate::flatten::flatten;
use crate::rebuild::unflatten_entities;
use crate::types::{EntityId, Tic, DEFAULT_SNAPSHOT_SLOTS};

/// One encoded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    tic: Tic,
    bytes: Vec<u8>,
    next_id: EntityId,
    nodes: usize,
}

impl Snapshot {
    /// Flatten and encode `root` as the frame for `tic`.
    pub fn capture(tic: Tic, root: &Value, registry: &Registry) -> SnapshotResult<Self> {
        let graph = flatten(root, registry)?;
        let bytes = encode(&graph)?;
        Ok(Self {
            tic,
            bytes,
            next_id: registry.next_id(),
            nodes: graph.len(),
        })
    }

    pub fn tic(&self) -> Tic {
        self.tic
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The registry's next id at capture time.
    pub fn next_id(&self) -> EntityId {
        self.next_id
    }

    pub fn node_count(&self) -> usize {
        self.nodes
    }

    /// Decode this frame and make `registry` match it.
    ///
    /// Entities in the frame are installed at their ids; live entities that
    /// are not in the frame are destroyed, and the id counter is reset to the
    /// frame's `next_id`. On error the registry is unchanged.
    pub fn rebuild(&self, registry: &mut Registry) -> SnapshotResult<Value> {
        let graph = decode(&self.bytes, registry.types())?;
        if let Some(blob) = graph.entities().find(|blob| blob.id() >= self.next_id) {
            return Err(SnapshotError::corrupt(format!(
                "entity {} is not below the frame's next id {}",
                blob.id(),
                self.next_id
            )));
        }
        let (root, restored) = unflatten_entities(&graph, registry)?;

        let restored: FxHashSet<EntityId> = restored.into_iter().collect();
        for id in registry.live_ids() {
            if !restored.contains(&id) {
                registry.destroy(id);
            }
        }
        registry.rewind_ids(self.next_id);
        tracing::debug!(tic = self.tic, entities = restored.len(), "rebuilt snapshot");
        Ok(root)
    }
}

/// Ring of the most recent frames.
#[derive(Debug, Clone)]
pub struct SnapshotRing {
    slots: Vec<Option<Snapshot>>,
}

impl Default for SnapshotRing {
    fn default() -> Self {
        Self::new(DEFAULT_SNAPSHOT_SLOTS)
    }
}

impl SnapshotRing {
    /// A ring with `capacity` slots; zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: vec![None; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, tic: Tic) -> usize {
        (tic % self.slots.len() as Tic) as usize
    }

    /// Capture `root` for `tic`, replacing whatever the slot held.
    ///
    /// On error the slot keeps its previous frame.
    pub fn record(&mut self, tic: Tic, root: &Value, registry: &Registry) -> SnapshotResult<&Snapshot> {
        let snapshot = Snapshot::capture(tic, root, registry)?;
        let slot = self.slot(tic);
        tracing::debug!(
            tic,
            slot,
            bytes = snapshot.bytes.len(),
            nodes = snapshot.nodes,
            "recorded snapshot"
        );
        Ok(self.slots[slot].insert(snapshot))
    }

    /// The frame recorded for exactly `tic`, if it is still retained.
    pub fn restore(&self, tic: Tic) -> Option<&Snapshot> {
        self.slots[self.slot(tic)]
            .as_ref()
            .filter(|snapshot| snapshot.tic == tic)
    }

    /// Retained tics, ascending.
    pub fn retained_tics(&self) -> Vec<Tic> {
        let mut tics: Vec<Tic> = self.slots.iter().flatten().map(Snapshot::tic).collect();
        tics.sort_unstable();
        tics
    }

    /// The most recently labelled frame.
    pub fn latest(&self) -> Option<&Snapshot> {
        self.slots.iter().flatten().max_by_key(|snapshot| snapshot.tic)
    }

    /// Drop frames recorded after `tic`, e.g. the abandoned future after a
    /// rewind.
    pub fn discard_after(&mut self, tic: Tic) {
        for slot in &mut self.slots {
            if slot.as_ref().is_some_and(|snapshot| snapshot.tic > tic) {
                *slot = None;
            }
        }
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }
}
