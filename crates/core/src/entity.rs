//! Entity registry - stable identities for native simulation objects
//!
//! Native objects (random generators, pieces, boards, ...) are owned by the
//! [`Registry`]; scripts only ever hold an [`EntityRef`] naming the id. The
//! registry issues ids monotonically starting at 1 and is the only place that
//! frees an entity's payload.
//!
//! Per-type behavior (serialize, deserialize, destruct) is the [`EntityType`]
//! trait. The registry keeps a [`TypeTable`] of deserializers keyed by
//! [`TypeTag`] so snapshots can be rebuilt without knowing the concrete type
//! at the call site.

use std::any::Any;
use std::fmt;

use rustc_hash::FxHashMap;

use crate::error::{SnapshotError, SnapshotResult};
use crate::types::{EntityId, TypeTag};
use crate::value::EntityRef;
use crate::wire::{Reader, Writer};

/// Behavior of one native entity kind.
pub trait EntityType: fmt::Debug + Sized + 'static {
    const TAG: TypeTag;

    fn serialize(&self, out: &mut Writer) -> SnapshotResult<()>;

    /// Must accept exactly what [`EntityType::serialize`] produced.
    fn deserialize(input: &mut Reader<'_>) -> SnapshotResult<Self>;

    /// Release anything the payload holds outside of Rust ownership. Called at
    /// most once per entity.
    fn destruct(&mut self) {}
}

/// Object-safe view of an entity payload.
pub trait Payload: fmt::Debug {
    fn type_tag(&self) -> TypeTag;
    fn serialize_bytes(&self) -> SnapshotResult<Vec<u8>>;
    fn destruct(&mut self);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: EntityType> Payload for T {
    fn type_tag(&self) -> TypeTag {
        T::TAG
    }

    fn serialize_bytes(&self) -> SnapshotResult<Vec<u8>> {
        let mut out = Writer::new();
        self.serialize(&mut out)?;
        Ok(out.into_bytes())
    }

    fn destruct(&mut self) {
        EntityType::destruct(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub type DeserializeFn = fn(&[u8]) -> SnapshotResult<Box<dyn Payload>>;

fn deserialize_boxed<T: EntityType>(bytes: &[u8]) -> SnapshotResult<Box<dyn Payload>> {
    let mut input = Reader::new(bytes);
    let payload = T::deserialize(&mut input)?;
    input.finish()?;
    Ok(Box::new(payload))
}

#[derive(Clone, Copy)]
struct Behavior {
    name: &'static str,
    deserialize: DeserializeFn,
}

/// Deserializers for every registered entity kind.
#[derive(Clone, Default)]
pub struct TypeTable {
    behaviors: FxHashMap<TypeTag, Behavior>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: EntityType>(&mut self) {
        self.behaviors.insert(
            T::TAG,
            Behavior {
                name: std::any::type_name::<T>(),
                deserialize: deserialize_boxed::<T>,
            },
        );
    }

    pub fn contains(&self, tag: TypeTag) -> bool {
        self.behaviors.contains_key(&tag)
    }

    pub fn type_name(&self, tag: TypeTag) -> Option<&'static str> {
        self.behaviors.get(&tag).map(|b| b.name)
    }

    /// Rebuild a payload from its serialized bytes.
    pub fn deserialize(&self, tag: TypeTag, bytes: &[u8]) -> SnapshotResult<Box<dyn Payload>> {
        let behavior = self.behaviors.get(&tag).ok_or_else(|| {
            tracing::warn!(%tag, "no behavior registered for entity type");
            SnapshotError::UnknownEntityType(tag)
        })?;
        (behavior.deserialize)(bytes)
    }
}

impl fmt::Debug for TypeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<_> = self.behaviors.iter().map(|(t, b)| (t.0, b.name)).collect();
        tags.sort_unstable();
        f.debug_map().entries(tags).finish()
    }
}

/// One live entity.
#[derive(Debug)]
pub struct EntityRecord {
    id: EntityId,
    payload: Box<dyn Payload>,
}

impl EntityRecord {
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn type_tag(&self) -> TypeTag {
        self.payload.type_tag()
    }

    pub fn handle(&self) -> EntityRef {
        EntityRef {
            id: self.id,
            tag: self.type_tag(),
        }
    }

    pub fn payload(&self) -> &dyn Payload {
        self.payload.as_ref()
    }

    pub fn downcast_ref<T: EntityType>(&self) -> Option<&T> {
        self.payload.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: EntityType>(&mut self) -> Option<&mut T> {
        self.payload.as_any_mut().downcast_mut::<T>()
    }
}

/// Owner of every live native entity.
///
/// Not thread-safe by construction: all access happens on the simulation
/// thread between tics. Serializers must not call back into the registry.
pub struct Registry {
    next: EntityId,
    records: FxHashMap<EntityId, EntityRecord>,
    types: TypeTable,
}

impl Registry {
    /// Empty registry with no entity kinds registered.
    pub fn new() -> Self {
        Self {
            next: EntityId::FIRST,
            records: FxHashMap::default(),
            types: TypeTable::new(),
        }
    }

    /// Registry that already knows the random, piece and board kinds.
    pub fn with_builtin_types() -> Self {
        let mut registry = Self::new();
        registry.register::<crate::rng::Random>();
        registry.register::<crate::piece::Piece>();
        registry.register::<crate::board::Board>();
        registry
    }

    pub fn register<T: EntityType>(&mut self) {
        self.types.register::<T>();
    }

    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    /// Store a new entity and issue its id. Registers `T` if needed.
    ///
    /// Issued ids are always above every live id, so a new entity never
    /// lands on a restored one.
    pub fn create<T: EntityType>(&mut self, payload: T) -> EntityRef {
        if !self.types.contains(T::TAG) {
            self.types.register::<T>();
        }
        while self.records.contains_key(&self.next) {
            self.next = self.next.next();
        }
        let id = self.next;
        self.next = self.next.next();
        self.records.insert(
            id,
            EntityRecord {
                id,
                payload: Box::new(payload),
            },
        );
        tracing::trace!(%id, tag = %T::TAG, "entity created");
        EntityRef { id, tag: T::TAG }
    }

    pub fn get(&self, id: EntityId) -> Option<&EntityRecord> {
        self.records.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut EntityRecord> {
        self.records.get_mut(&id)
    }

    pub fn get_as<T: EntityType>(&self, id: EntityId) -> Option<&T> {
        self.records.get(&id)?.downcast_ref::<T>()
    }

    pub fn get_as_mut<T: EntityType>(&mut self, id: EntityId) -> Option<&mut T> {
        self.records.get_mut(&id)?.downcast_mut::<T>()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.records.contains_key(&id)
    }

    /// Destruct and remove an entity. Unknown or already-destroyed ids are a
    /// no-op. Returns whether anything was destroyed.
    pub fn destroy(&mut self, id: EntityId) -> bool {
        match self.records.remove(&id) {
            Some(mut record) => {
                record.payload.destruct();
                tracing::trace!(%id, "entity destroyed");
                true
            }
            None => false,
        }
    }

    /// The id the next `create` will issue.
    pub fn next_id(&self) -> EntityId {
        self.next
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Live ids in ascending order.
    pub fn live_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.records.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Put a restored payload at `id`, destructing whatever lived there.
    ///
    /// The id counter moves past `id` if needed.
    pub fn install(&mut self, id: EntityId, payload: Box<dyn Payload>) {
        if let Some(mut previous) = self.records.insert(id, EntityRecord { id, payload }) {
            previous.payload.destruct();
        }
        if self.next <= id {
            self.next = id.next();
        }
    }

    /// Roll the id counter back to `next`.
    ///
    /// Entities at or above `next` did not exist at the restored frame and are
    /// destroyed so that replayed creations get the same ids again.
    pub fn rewind_ids(&mut self, next: EntityId) {
        let stale: Vec<EntityId> = self
            .records
            .keys()
            .copied()
            .filter(|id| *id >= next)
            .collect();
        for id in stale {
            self.destroy(id);
        }
        self.next = next;
    }

    /// Serialize one entity into the standalone envelope
    /// `[entity_id, type_tag, serialized bytes]`.
    pub fn save_entity(&self, id: EntityId) -> SnapshotResult<Vec<u8>> {
        let record = self
            .get(id)
            .ok_or_else(|| SnapshotError::non_serializable(format!("entity {id} is not live")))?;
        let body = record.payload.serialize_bytes()?;
        write_envelope(id, record.type_tag(), &body)
    }

    /// Restore an entity saved with [`Registry::save_entity`] at its original
    /// id. The id counter is bumped past it if needed.
    pub fn load_entity(&mut self, bytes: &[u8]) -> SnapshotResult<EntityRef> {
        let envelope = read_envelope(bytes)?;
        let payload = self.types.deserialize(envelope.tag, &envelope.body)?;
        let id = envelope.id;
        self.install(id, payload);
        Ok(EntityRef {
            id,
            tag: envelope.tag,
        })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("next", &self.next)
            .field("live", &self.records.len())
            .field("types", &self.types)
            .finish()
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        for (_, mut record) in self.records.drain() {
            record.payload.destruct();
        }
    }
}

/// Decoded single-entity envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub id: EntityId,
    pub tag: TypeTag,
    pub body: Vec<u8>,
}

pub fn write_envelope(id: EntityId, tag: TypeTag, body: &[u8]) -> SnapshotResult<Vec<u8>> {
    let mut out = Writer::with_capacity(body.len() + 24)?;
    out.seq(3)?;
    out.int(id.0 as i64)?;
    out.int(tag.0 as i64)?;
    out.str(body)?;
    Ok(out.into_bytes())
}

pub fn read_envelope(bytes: &[u8]) -> SnapshotResult<Envelope> {
    let mut input = Reader::new(bytes);
    input.seq_of(3, "entity envelope")?;
    let id = EntityId(input.int_as::<u32>("entity id")?);
    let tag = TypeTag(input.int_as::<u8>("type tag")?);
    let body = input.str()?;
    input.finish()?;
    if id.is_none() {
        return Err(SnapshotError::corrupt("entity envelope names the null id"));
    }
    Ok(Envelope { id, tag, body })
}
