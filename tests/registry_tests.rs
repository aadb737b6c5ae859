//! Entity registry behavior seen from outside the core crate

use std::cell::Cell;
use std::rc::Rc;

use tetris_rewind::core::wire::{Reader, Writer};
use tetris_rewind::core::{Board, EntityType, Piece, PieceConfig, Random, Registry, SnapshotError, SnapshotResult};
use tetris_rewind::types::{EntityId, PieceKind, TypeTag};

/// A caller-defined entity kind with an observable destructor.
#[derive(Debug)]
struct Sound {
    volume: i64,
    released: Rc<Cell<u32>>,
}

impl EntityType for Sound {
    const TAG: TypeTag = TypeTag(42);

    fn serialize(&self, out: &mut Writer) -> SnapshotResult<()> {
        out.int(self.volume)
    }

    fn deserialize(input: &mut Reader<'_>) -> SnapshotResult<Self> {
        Ok(Self {
            volume: input.int()?,
            released: Rc::new(Cell::new(0)),
        })
    }

    fn destruct(&mut self) {
        self.released.set(self.released.get() + 1);
    }
}

#[test]
fn test_ids_are_sequential_and_stable() {
    let mut registry = Registry::with_builtin_types();
    let a = registry.create(Random::new(1));
    let b = registry.create(Board::new());
    let c = registry.create(Piece::spawn(PieceKind::T, PieceConfig::default()));
    assert_eq!((a.id, b.id, c.id), (EntityId(1), EntityId(2), EntityId(3)));
    assert_eq!((a.tag, b.tag, c.tag), (TypeTag::RANDOM, TypeTag::BOARD, TypeTag::PIECE));

    registry.destroy(b.id);
    let d = registry.create(Board::new());
    assert_eq!(d.id, EntityId(4));
    assert_eq!(registry.live_ids(), vec![EntityId(1), EntityId(3), EntityId(4)]);
}

#[test]
fn test_destroy_is_idempotent() {
    let mut registry = Registry::new();
    let released = Rc::new(Cell::new(0));
    let sound = registry.create(Sound {
        volume: 3,
        released: released.clone(),
    });

    assert!(registry.destroy(sound.id));
    assert!(!registry.destroy(sound.id));
    assert!(!registry.destroy(EntityId(999)));
    assert_eq!(released.get(), 1);
    assert!(registry.get(sound.id).is_none());
}

#[test]
fn test_drop_destructs_live_entities() {
    let released = Rc::new(Cell::new(0));
    {
        let mut registry = Registry::new();
        for volume in 0..3 {
            registry.create(Sound {
                volume,
                released: released.clone(),
            });
        }
        let first = registry.live_ids()[0];
        registry.destroy(first);
        assert_eq!(released.get(), 1);
    }
    assert_eq!(released.get(), 3);
}

#[test]
fn test_typed_access() {
    let mut registry = Registry::with_builtin_types();
    let board = registry.create(Board::new());
    assert!(registry.get_as::<Board>(board.id).is_some());
    assert!(registry.get_as::<Random>(board.id).is_none());

    registry
        .get_as_mut::<Board>(board.id)
        .unwrap()
        .set(0, 19, Some(PieceKind::I));
    assert_eq!(registry.get_as::<Board>(board.id).unwrap().filled_count(), 1);
}

#[test]
fn test_save_and_load_single_entity() {
    let mut source = Registry::with_builtin_types();
    let _pad = source.create(Random::new(0));
    let rng = source.create(Random::new(77));
    let saved = source.save_entity(rng.id).unwrap();

    let mut target = Registry::with_builtin_types();
    let loaded = target.load_entity(&saved).unwrap();
    assert_eq!(loaded, rng);
    assert_eq!(
        target.get_as::<Random>(rng.id).map(Random::state),
        source.get_as::<Random>(rng.id).map(Random::state)
    );
    // The counter moves past the loaded id.
    assert_eq!(target.create(Board::new()).id, EntityId(3));
}

#[test]
fn test_save_dead_entity_fails() {
    let mut registry = Registry::with_builtin_types();
    let rng = registry.create(Random::new(1));
    registry.destroy(rng.id);
    assert!(matches!(
        registry.save_entity(rng.id),
        Err(SnapshotError::NonSerializableValue(_))
    ));
}

#[test]
fn test_load_unregistered_type_fails() {
    let mut source = Registry::new();
    let sound = source.create(Sound {
        volume: 9,
        released: Rc::new(Cell::new(0)),
    });
    let saved = source.save_entity(sound.id).unwrap();

    let mut target = Registry::with_builtin_types();
    let err = target.load_entity(&saved).unwrap_err();
    assert!(matches!(err, SnapshotError::UnknownEntityType(TypeTag(42))));
    assert!(target.is_empty());

    target.register::<Sound>();
    let loaded = target.load_entity(&saved).unwrap();
    assert_eq!(target.get_as::<Sound>(loaded.id).map(|s| s.volume), Some(9));
}

#[test]
fn test_rewind_ids_destroys_newer_entities() {
    let mut registry = Registry::with_builtin_types();
    let keep = registry.create(Random::new(1));
    let mark = registry.next_id();
    let gone = registry.create(Random::new(2));

    registry.rewind_ids(mark);
    assert!(registry.contains(keep.id));
    assert!(!registry.contains(gone.id));
    assert_eq!(registry.create(Random::new(3)).id, gone.id);
}
