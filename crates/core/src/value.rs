//! Dynamic values - the script-facing value domain
//!
//! A [`Value`] is what the scripting layer hands to the snapshot pipeline:
//! scalars, tables and entity handles. Tables are shared by reference
//! (`Rc<RefCell<Table>>`), so graphs may contain shared nodes and cycles.
//!
//! Equality and hashing follow raw script equality: scalars compare by value,
//! tables and functions by pointer identity, entity handles by id.

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::types::{EntityId, TypeTag};

/// Shared handle to a table.
pub type TableRef = Rc<RefCell<Table>>;

/// Typed handle into the entity registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityRef {
    pub id: EntityId,
    pub tag: TypeTag,
}

/// Native function exposed to scripts. Never serializable.
pub struct NativeFunction {
    pub name: String,
    pub func: fn(&[Value]) -> Value,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function: {}", self.name)
    }
}

/// Suspended script coroutine. Never serializable.
#[derive(Debug)]
pub struct Coroutine {
    pub name: String,
}

/// A dynamically-typed script value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<[u8]>),
    Table(TableRef),
    Entity(EntityRef),
    Function(Rc<NativeFunction>),
    Coroutine(Rc<Coroutine>),
}

impl Value {
    pub fn str(s: impl AsRef<[u8]>) -> Value {
        Value::Str(Rc::from(s.as_ref()))
    }

    /// Wrap a table into a fresh shared handle.
    pub fn table(table: Table) -> Value {
        Value::Table(Rc::new(RefCell::new(table)))
    }

    pub fn new_table() -> Value {
        Value::table(Table::new())
    }

    /// Build a sequence table `{v1, v2, ...}`.
    pub fn seq(items: impl IntoIterator<Item = Value>) -> Value {
        let mut table = Table::new();
        for item in items {
            table.push(item);
        }
        Value::table(table)
    }

    pub fn function(name: &str, func: fn(&[Value]) -> Value) -> Value {
        Value::Function(Rc::new(NativeFunction {
            name: name.to_string(),
            func,
        }))
    }

    pub fn coroutine(name: &str) -> Value {
        Value::Coroutine(Rc::new(Coroutine {
            name: name.to_string(),
        }))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<EntityRef> {
        match self {
            Value::Entity(e) => Some(*e),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Script type name, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::Float(_) => "number",
            Value::Str(_) => "string",
            Value::Table(_) => "table",
            Value::Entity(_) => "entity",
            Value::Function(_) => "function",
            Value::Coroutine(_) => "thread",
        }
    }

    /// Canonical key form: integral floats become integers, nil and NaN are
    /// not valid keys.
    fn normalize_key(self) -> Option<Value> {
        match self {
            Value::Nil => None,
            Value::Float(f) if f.is_nan() => None,
            Value::Float(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                Some(Value::Int(f as i64))
            }
            other => Some(other),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => Rc::ptr_eq(a, b),
            (Value::Entity(a), Value::Entity(b)) => a.id == b.id,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Coroutine(a), Value::Coroutine(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Nil => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Str(s) => s.hash(state),
            Value::Table(t) => (Rc::as_ptr(t) as *const () as usize).hash(state),
            Value::Entity(e) => e.id.hash(state),
            Value::Function(f) => (Rc::as_ptr(f) as *const () as usize).hash(state),
            Value::Coroutine(c) => (Rc::as_ptr(c) as *const () as usize).hash(state),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Str(s) => write!(f, "{:?}", String::from_utf8_lossy(s)),
            // Tables print by address only; contents may be cyclic.
            Value::Table(t) => write!(f, "table: {:p}", Rc::as_ptr(t)),
            Value::Entity(e) => write!(f, "entity {} ({})", e.id, e.tag),
            Value::Function(func) => write!(f, "{func:?}"),
            Value::Coroutine(c) => write!(f, "thread: {}", c.name),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<EntityRef> for Value {
    fn from(e: EntityRef) -> Self {
        Value::Entity(e)
    }
}

/// Script table with an array part (`1..=n`) and an insertion-ordered hash part.
///
/// Iteration visits the array part in order, then the hash part in insertion
/// order. The snapshot flattener relies on this order being stable.
#[derive(Default)]
pub struct Table {
    array: Vec<Value>,
    hash: Vec<(Value, Value)>,
    slots: FxHashMap<Value, usize>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Length of the array part (the table's border).
    pub fn len(&self) -> usize {
        self.array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.array.is_empty() && self.hash.is_empty()
    }

    /// Number of key/value pairs.
    pub fn entry_count(&self) -> usize {
        self.array.len() + self.hash.len()
    }

    /// Append at `len() + 1`. Nil is ignored.
    pub fn push(&mut self, value: Value) {
        let key = Value::Int(self.array.len() as i64 + 1);
        self.set(key, value);
    }

    pub fn get(&self, key: &Value) -> Value {
        let Some(key) = key.clone().normalize_key() else {
            return Value::Nil;
        };
        if let Some(i) = self.array_slot(&key) {
            return self.array[i].clone();
        }
        self.slots
            .get(&key)
            .map(|&pos| self.hash[pos].1.clone())
            .unwrap_or_default()
    }

    /// Shorthand for string keys.
    pub fn get_str(&self, key: &str) -> Value {
        self.get(&Value::str(key))
    }

    pub fn set_str(&mut self, key: &str, value: Value) {
        self.set(Value::str(key), value);
    }

    /// Assign `value` to `key`; assigning nil deletes the key.
    ///
    /// Returns false if the key is nil or NaN.
    pub fn set(&mut self, key: Value, value: Value) -> bool {
        let Some(key) = key.normalize_key() else {
            return false;
        };

        if let Some(i) = self.array_slot(&key) {
            if !value.is_nil() {
                self.array[i] = value;
            } else {
                // Keep the array part dense: the tail moves to the hash part.
                let tail = self.array.split_off(i);
                for (offset, v) in tail.into_iter().enumerate().skip(1) {
                    self.hash_insert(Value::Int((i + offset + 1) as i64), v);
                }
            }
            return true;
        }

        if value.is_nil() {
            self.hash_remove(&key);
            return true;
        }

        if key == Value::Int(self.array.len() as i64 + 1) {
            self.hash_remove(&key);
            self.array.push(value);
            self.migrate_from_hash();
        } else {
            self.hash_insert(key, value);
        }
        true
    }

    /// Iterate all pairs: array part first, then hash part in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (Value, Value)> + '_ {
        self.array
            .iter()
            .enumerate()
            .map(|(i, v)| (Value::Int(i as i64 + 1), v.clone()))
            .chain(self.hash.iter().cloned())
    }

    /// Remove every pair.
    pub fn clear(&mut self) {
        self.array.clear();
        self.hash.clear();
        self.slots.clear();
    }

    fn array_slot(&self, key: &Value) -> Option<usize> {
        match key {
            Value::Int(n) if *n >= 1 && (*n as u64) <= self.array.len() as u64 => {
                Some(*n as usize - 1)
            }
            _ => None,
        }
    }

    fn hash_insert(&mut self, key: Value, value: Value) {
        if let Some(&pos) = self.slots.get(&key) {
            self.hash[pos].1 = value;
            return;
        }
        self.slots.insert(key.clone(), self.hash.len());
        self.hash.push((key, value));
    }

    fn hash_remove(&mut self, key: &Value) -> Option<Value> {
        let pos = self.slots.remove(key)?;
        let (_, value) = self.hash.remove(pos);
        for slot in self.slots.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
        Some(value)
    }

    fn migrate_from_hash(&mut self) {
        loop {
            let next = Value::Int(self.array.len() as i64 + 1);
            match self.hash_remove(&next) {
                Some(v) => self.array.push(v),
                None => break,
            }
        }
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Empty every table reachable from `root`.
///
/// Tables that reach themselves (`state.self = state`) keep each other alive
/// through their `Rc`s. Clearing them drops those edges so the graph is freed
/// once the last outside handle goes. Entities are left to their registry.
/// Returns the number of tables cleared.
pub fn release_graph(root: &Value) -> usize {
    let mut seen: FxHashSet<usize> = FxHashSet::default();
    let mut tables: Vec<TableRef> = Vec::new();
    let mut pending = vec![root.clone()];
    while let Some(value) = pending.pop() {
        let Value::Table(table) = value else {
            continue;
        };
        if !seen.insert(Rc::as_ptr(&table) as *const () as usize) {
            continue;
        }
        for (key, value) in table.borrow().iter() {
            pending.push(key);
            pending.push(value);
        }
        tables.push(table);
    }
    for table in &tables {
        table.borrow_mut().clear();
    }
    tables.len()
}

/// Observational equality of two value graphs.
///
/// Scalars must match, tables must have pairwise-equal entries (recursively),
/// entities must name the same id. Cycles are handled by assuming a pair of
/// tables already under comparison is equal, so `a = {a}` equals `b = {b}`.
/// Keys are matched by iteration position, which is stable for tables built
/// in the same insertion order.
pub fn structurally_equal(a: &Value, b: &Value) -> bool {
    let mut assumed = FxHashSet::default();
    graph_eq(a, b, &mut assumed)
}

fn graph_eq(a: &Value, b: &Value, assumed: &mut FxHashSet<(usize, usize)>) -> bool {
    match (a, b) {
        (Value::Table(ta), Value::Table(tb)) => {
            let pair = (
                Rc::as_ptr(ta) as *const () as usize,
                Rc::as_ptr(tb) as *const () as usize,
            );
            if !assumed.insert(pair) {
                return true;
            }
            let (ta, tb) = (ta.borrow(), tb.borrow());
            if ta.entry_count() != tb.entry_count() {
                return false;
            }
            let eq = ta
                .iter()
                .zip(tb.iter())
                .all(|((ka, va), (kb, vb))| graph_eq(&ka, &kb, assumed) && graph_eq(&va, &vb, assumed));
            eq
        }
        (Value::Entity(ea), Value::Entity(eb)) => ea.id == eb.id && ea.tag == eb.tag,
        _ => a == b,
    }
}
