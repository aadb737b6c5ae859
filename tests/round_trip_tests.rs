//! Flatten -> encode -> decode -> unflatten round trips

use std::rc::Rc;

use tetris_rewind::core::{structurally_equal, Random, Registry, SnapshotError, Table, Value};
use tetris_rewind::snapshot::{decode, encode, flatten, unflatten, FlatNode, FlatValue};
use tetris_rewind::types::TypeTag;

fn round_trip(root: &Value, registry: &Registry, target: &mut Registry) -> Value {
    let graph = flatten(root, registry).unwrap();
    let bytes = encode(&graph).unwrap();
    let decoded = decode(&bytes, target.types()).unwrap();
    assert_eq!(decoded, graph);
    unflatten(&decoded, target).unwrap()
}

fn keyed(pairs: &[(&str, Value)]) -> Value {
    let mut t = Table::new();
    for (k, v) in pairs {
        t.set_str(k, v.clone());
    }
    Value::table(t)
}

#[test]
fn test_flat_scalar_table() {
    let root = Value::seq([
        Value::Bool(true),
        Value::Int(1),
        Value::Float(2.5),
        Value::str("string"),
        Value::seq([Value::Int(123), Value::Int(456)]),
        keyed(&[("x", Value::Int(123)), ("y", Value::Int(456))]),
    ]);
    let registry = Registry::new();

    let graph = flatten(&root, &registry).unwrap();
    assert_eq!(graph.len(), 3);
    assert_eq!(graph.iter().map(|(i, _)| i).collect::<Vec<_>>(), vec![1, 2, 3]);

    let rebuilt = round_trip(&root, &registry, &mut Registry::new());
    assert!(structurally_equal(&rebuilt, &root));

    let table = rebuilt.as_table().unwrap().borrow();
    assert_eq!(table.len(), 6);
    assert_eq!(table.get(&Value::Int(3)), Value::Float(2.5));
    let point = table.get(&Value::Int(6));
    assert_eq!(point.as_table().unwrap().borrow().get_str("y"), Value::Int(456));
}

#[test]
fn test_index_density() {
    let registry = Registry::new();
    let leaf = Value::seq([Value::Int(1)]);
    let mid = keyed(&[("a", leaf.clone()), ("b", leaf)]);
    let root = Value::seq([mid.clone(), mid, Value::new_table()]);

    let graph = flatten(&root, &registry).unwrap();
    let indices: Vec<u32> = graph.iter().map(|(i, _)| i).collect();
    assert_eq!(indices, (1..=graph.len() as u32).collect::<Vec<_>>());
    // root, mid, the empty table, leaf
    assert_eq!(graph.len(), 4);
}

#[test]
fn test_direct_cycle() {
    let registry = Registry::new();
    let root = Value::new_table();
    root.as_table()
        .unwrap()
        .borrow_mut()
        .set_str("me", root.clone());

    let rebuilt = round_trip(&root, &registry, &mut Registry::new());
    let table = rebuilt.as_table().unwrap();
    let me = table.borrow().get_str("me");
    assert!(Rc::ptr_eq(table, me.as_table().unwrap()));
}

#[test]
fn test_indirect_cycle() {
    let registry = Registry::new();
    let a = Value::new_table();
    let b = keyed(&[("back", a.clone())]);
    a.as_table().unwrap().borrow_mut().set_str("next", b);

    let rebuilt = round_trip(&a, &registry, &mut Registry::new());
    let a2 = rebuilt.as_table().unwrap();
    let b2 = a2.borrow().get_str("next");
    let back = b2.as_table().unwrap().borrow().get_str("back");
    assert!(Rc::ptr_eq(a2, back.as_table().unwrap()));
    assert!(structurally_equal(&rebuilt, &a));
}

#[test]
fn test_table_as_key() {
    let registry = Registry::new();
    let key = keyed(&[("name", Value::str("k"))]);
    let mut t = Table::new();
    t.set(key.clone(), Value::Int(5));
    t.set_str("same", key);
    let root = Value::table(t);

    let rebuilt = round_trip(&root, &registry, &mut Registry::new());
    let table = rebuilt.as_table().unwrap().borrow();
    let key = table.get_str("same");
    assert_eq!(table.get(&key), Value::Int(5));
}

#[test]
fn test_random_entity_round_trip() {
    let mut registry = Registry::with_builtin_types();
    let rng = registry.create(Random::new(2024));
    let root = keyed(&[("rng", rng.into())]);

    let graph = flatten(&root, &registry).unwrap();
    let blob = graph.entities().next().unwrap();
    assert_eq!(blob.type_tag(), TypeTag::RANDOM);

    let mut target = Registry::with_builtin_types();
    let rebuilt = round_trip(&root, &registry, &mut target);
    let handle = rebuilt.as_table().unwrap().borrow().get_str("rng").as_entity().unwrap();
    assert_eq!(handle, rng);

    let original = registry.get_as_mut::<Random>(rng.id).unwrap();
    let expected: Vec<u64> = (0..16).map(|_| original.next_u64()).collect();
    let restored = target.get_as_mut::<Random>(handle.id).unwrap();
    let actual: Vec<u64> = (0..16).map(|_| restored.next_u64()).collect();
    assert_eq!(actual, expected);
}

#[test]
fn test_entity_root() {
    let mut registry = Registry::with_builtin_types();
    let rng = registry.create(Random::new(8));
    let graph = flatten(&Value::Entity(rng), &registry).unwrap();
    assert_eq!(graph.len(), 1);
    assert!(matches!(graph.root(), Some(FlatNode::Entity(_))));

    let rebuilt = round_trip(&Value::Entity(rng), &registry, &mut Registry::with_builtin_types());
    assert_eq!(rebuilt.as_entity(), Some(rng));
}

#[test]
fn test_non_serializable_values() {
    let registry = Registry::new();
    let with_fn = keyed(&[("on_tick", Value::function("on_tick", |_| Value::Nil))]);
    let err = flatten(&with_fn, &registry).unwrap_err();
    assert!(matches!(err, SnapshotError::NonSerializableValue(_)));
    assert!(err.to_string().contains("root.on_tick"));

    let with_co = Value::seq([Value::coroutine("ai")]);
    assert!(matches!(
        flatten(&with_co, &registry),
        Err(SnapshotError::NonSerializableValue(_))
    ));
}

#[test]
fn test_truncated_buffer_is_corrupt() {
    let mut registry = Registry::with_builtin_types();
    let rng = registry.create(Random::new(1));
    let root = keyed(&[("rng", rng.into()), ("list", Value::seq([Value::Int(1)]))]);
    let bytes = encode(&flatten(&root, &registry).unwrap()).unwrap();

    for cut in 0..bytes.len() {
        let err = decode(&bytes[..cut], registry.types()).unwrap_err();
        assert!(err.is_corrupt(), "cut at {cut}: {err}");
    }
}

#[test]
fn test_trailing_bytes_are_corrupt() {
    let registry = Registry::new();
    let mut bytes = encode(&flatten(&Value::new_table(), &registry).unwrap()).unwrap();
    bytes.push(0);
    assert!(decode(&bytes, registry.types()).unwrap_err().is_corrupt());
}

#[test]
fn test_unknown_entity_type() {
    let mut registry = Registry::with_builtin_types();
    let rng = registry.create(Random::new(1));
    let bytes = encode(&flatten(&Value::seq([rng.into()]), &registry).unwrap()).unwrap();

    let bare = Registry::new();
    let err = decode(&bytes, bare.types()).unwrap_err();
    assert!(matches!(err, SnapshotError::UnknownEntityType(TypeTag::RANDOM)));
    assert!(err.is_corrupt());
}

#[test]
fn test_strings_keep_raw_bytes() {
    let registry = Registry::new();
    let root = Value::seq([Value::str([0xffu8, 0x00, b'a'])]);
    let graph = flatten(&root, &registry).unwrap();
    let Some(FlatNode::Table(t)) = graph.root() else {
        panic!("root should be a table");
    };
    assert_eq!(t.entries[0].1, FlatValue::Str(vec![0xff, 0x00, b'a']));

    let rebuilt = round_trip(&root, &registry, &mut Registry::new());
    assert!(structurally_equal(&rebuilt, &root));
}
