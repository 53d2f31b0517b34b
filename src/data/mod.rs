//! Lisp data types and the heap that holds them.
//!
//! `Storage` owns every heap object. Values are small `Copy` handles
//! (`Value`); immediates (fixnums, characters) carry their payload and
//! never touch the heap, while every other variant names a slot.
//!
//! Methods take `&self`: the heap and the root set sit behind `RefCell`s,
//! so a `Rooted` guard can hold a shared borrow of the store while the
//! caller keeps allocating.
//!
//! ## Roots
//!
//! The collector treats as live:
//! -   every value on the operand stack (`push`/`pop`),
//! -   every value held by a live `Rooted` guard,
//! -   every pinned value (`pin`), which lasts as long as the store.
//!
//! Anything else a caller holds across an allocation may be freed out from
//! under it. The arguments of the allocation itself are safe.

mod bitset;
mod compare;
mod containers;
mod gc;
mod objects;
#[cfg(feature = "render")]
pub mod render;
mod symbols;
mod table;
mod tag;

pub use self::compare::hash_bytes;
pub use self::containers::{Buffer, Element, POISON_FIXNUM};
pub use self::gc::GcCounters;
pub use self::objects::*;
pub use self::table::{Probe, Slot, Table};
pub use self::tag::Tag;

pub(crate) use self::gc::Heap;
use crate::config::{Config, NilAccess};
use crate::error::{Error, OrTypeError, Result};

use std::cell::{Cell, Ref, RefCell};
use std::cmp::max;

/// Storage allows representing all persistent objects.
pub struct Storage {
    heap: RefCell<Heap>,
    roots: RefCell<RootSet>,
    config: Config,

    /// The intern table, once the first symbol exists.
    symbols: Cell<Option<Pin>>,
    gensym_counter: Cell<u64>,

    high_water: Cell<StorageStats>,
}

impl Default for Storage {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct StorageStats {
    /// Objects currently allocated, including unreclaimed garbage.
    pub objects: usize,
    /// Objects that survived the last completed collection.
    pub live_after_last_gc: usize,
    pub collections: usize,
    /// Objects ever allocated.
    pub allocated: usize,
    /// Objects ever freed.
    pub freed: usize,
}

impl StorageStats {
    fn max(&self, other: &StorageStats) -> StorageStats {
        StorageStats {
            objects: max(self.objects, other.objects),
            live_after_last_gc: max(self.live_after_last_gc, other.live_after_last_gc),
            collections: max(self.collections, other.collections),
            allocated: max(self.allocated, other.allocated),
            freed: max(self.freed, other.freed),
        }
    }
}

impl std::ops::Sub for StorageStats {
    type Output = StorageStats;

    fn sub(self, rhs: Self) -> Self::Output {
        StorageStats {
            objects: self.objects.saturating_sub(rhs.objects),
            live_after_last_gc: self.live_after_last_gc.saturating_sub(rhs.live_after_last_gc),
            collections: self.collections - rhs.collections,
            allocated: self.allocated - rhs.allocated,
            freed: self.freed - rhs.freed,
        }
    }
}

/// Everything the collector treats as live.
#[derive(Default)]
pub(crate) struct RootSet {
    registry: Vec<Option<Value>>,
    free: Vec<usize>,
    stack: Vec<Value>,
    pinned: Vec<Value>,
}

impl RootSet {
    pub fn values(&self) -> impl Iterator<Item = Value> + '_ {
        self.registry
            .iter()
            .flatten()
            .chain(self.stack.iter())
            .chain(self.pinned.iter())
            .copied()
    }

    fn register(&mut self, v: Value) -> usize {
        match self.free.pop() {
            Some(slot) => {
                self.registry[slot] = Some(v);
                slot
            }
            None => {
                self.registry.push(Some(v));
                self.registry.len() - 1
            }
        }
    }

    fn release(&mut self, slot: usize) {
        self.registry[slot] = None;
        self.free.push(slot);
    }
}

/// A value registered as a GC root for the guard's lifetime.
///
/// Guards may be dropped in any order.
pub struct Rooted<'a> {
    store: &'a Storage,
    slot: usize,
}

impl Rooted<'_> {
    pub fn get(&self) -> Value {
        self.store.roots.borrow().registry[self.slot].unwrap_or_default()
    }

    pub fn set(&self, v: Value) {
        self.store.roots.borrow_mut().registry[self.slot] = Some(v);
    }
}

impl Drop for Rooted<'_> {
    fn drop(&mut self) {
        self.store.roots.borrow_mut().release(self.slot);
    }
}

impl std::fmt::Debug for Rooted<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Rooted({})", self.get())
    }
}

/// A permanent root slot; see `Storage::pin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pin(usize);

macro_rules! typed_access {
    ($get:ident, $get_mut:ident, $variant:ident, $ty:ty, $what:literal) => {
        impl Heap {
            pub fn $get(&self, v: Value) -> Result<&$ty> {
                if !matches!(v, Value::$variant(_)) {
                    return Err(Error::Type(format!(
                        concat!("expected ", $what, ", got {}"),
                        v.type_name()
                    )));
                }
                match self.object(v)? {
                    Object::$variant(x) => Ok(x),
                    _ => Err(Error::HeapCorruption(format!("{v} is not a {}", $what))),
                }
            }

            #[allow(dead_code)]
            pub fn $get_mut(&mut self, v: Value) -> Result<&mut $ty> {
                if !matches!(v, Value::$variant(_)) {
                    return Err(Error::Type(format!(
                        concat!("expected ", $what, ", got {}"),
                        v.type_name()
                    )));
                }
                match self.object_mut(v)? {
                    Object::$variant(x) => Ok(x),
                    _ => Err(Error::HeapCorruption(format!("{v} is not a {}", $what))),
                }
            }
        }
    };
}

typed_access!(cons, cons_mut, Cons, Cons, "cons");
typed_access!(string, string_mut, String, Buffer<u8>, "string");
typed_access!(symbol, symbol_mut, Symbol, Symbol, "symbol");
typed_access!(vector, vector_mut, Vector, Buffer<Value>, "vector");
typed_access!(table, table_mut, Table, Table, "hash-table");
typed_access!(function, function_mut, Function, Function, "function");

impl Storage {
    pub fn new(config: Config) -> Self {
        Storage {
            heap: RefCell::new(Heap::new(config.collector)),
            roots: Default::default(),
            config,
            symbols: Cell::new(None),
            gensym_counter: Cell::new(0),
            high_water: Default::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Read access to the heap, for walks that do not allocate.
    pub(crate) fn heap(&self) -> Ref<'_, Heap> {
        self.heap.borrow()
    }

    pub fn current_stats(&self) -> StorageStats {
        let heap = self.heap.borrow();
        let counters = heap.counters();
        StorageStats {
            objects: heap.live(),
            live_after_last_gc: heap.survivors(),
            collections: counters.collections,
            allocated: counters.allocated,
            freed: counters.freed,
        }
    }

    pub fn max_stats(&self) -> StorageStats {
        self.current_stats().max(&self.high_water.get())
    }

    /// Name of the collector's current phase.
    pub fn gc_phase(&self) -> &'static str {
        self.heap.borrow().phase().name()
    }

    /// Store an object in the heap.
    ///
    /// May run a collection step first. Values the object refers to are
    /// kept alive through that step even if nothing else roots them.
    pub fn alloc(&self, object: impl Into<Object>) -> Result<Value> {
        let object = object.into();
        let mut heap = self.heap.borrow_mut();
        let mut roots = self.roots.borrow_mut();

        let base = roots.stack.len();
        object.for_each_child(|child| {
            if child.ptr().is_some() {
                roots.stack.push(child)
            }
        });
        let collected = self.collect_before_alloc(&mut heap, &roots);
        roots.stack.truncate(base);
        collected?;

        if let Some(limit) = self.config.heap_limit {
            if heap.live() >= limit {
                return Err(Error::OutOfMemory(format!(
                    "heap limit of {limit} objects reached"
                )));
            }
        }
        heap.insert(object)
    }

    fn collect_before_alloc(&self, heap: &mut Heap, roots: &RootSet) -> Result<()> {
        heap.step(roots)?;
        if let Some(limit) = self.config.heap_limit {
            if heap.live() >= limit {
                tracing::debug!("at heap limit of {limit} objects; collecting");
                self.note_high_water(heap);
                heap.collect(roots)?;
            }
        }
        Ok(())
    }

    fn note_high_water(&self, heap: &Heap) {
        let mut hw = self.high_water.get();
        hw.objects = max(hw.objects, heap.live());
        self.high_water.set(hw);
    }

    /// Run a full garbage-collection pass.
    pub fn gc(&self) -> Result<()> {
        let current_stats = self.current_stats();
        tracing::trace!("starting GC with stats: {:?}", current_stats);
        self.high_water.set(current_stats.max(&self.high_water.get()));
        {
            let mut heap = self.heap.borrow_mut();
            let roots = self.roots.borrow();
            heap.collect(&roots)?;
        }
        tracing::trace!("stats after GC: {:?}", self.current_stats());
        Ok(())
    }

    /// Approximate bytes used by every object in the heap.
    pub fn room(&self) -> usize {
        self.heap.borrow().objects().map(|(_, o)| o.footprint()).sum()
    }

    /// Approximate bytes used by one heap object; `None` for immediates.
    pub fn object_size(&self, v: Value) -> Result<Option<usize>> {
        if v.ptr().is_none() {
            return Ok(None);
        }
        Ok(Some(self.heap.borrow().object(v)?.footprint()))
    }

    /// Check the heap's consistency; returns the number of objects.
    pub fn verify(&self) -> Result<usize> {
        let heap = self.heap.borrow();
        let roots = self.roots.borrow();
        heap.verify(&roots)
    }

    /// Root a value until the guard is dropped.
    pub fn root(&self, v: Value) -> Rooted<'_> {
        let slot = self.roots.borrow_mut().register(v);
        Rooted { store: self, slot }
    }

    /// Root a value for the lifetime of the store.
    pub fn pin(&self, v: Value) -> Pin {
        let mut roots = self.roots.borrow_mut();
        roots.pinned.push(v);
        Pin(roots.pinned.len() - 1)
    }

    pub fn pinned(&self, pin: Pin) -> Value {
        self.roots.borrow().pinned[pin.0]
    }

    pub fn set_pinned(&self, pin: Pin, v: Value) {
        self.roots.borrow_mut().pinned[pin.0] = v;
    }

    /// Push onto the operand stack.
    pub fn push(&self, v: Value) {
        self.roots.borrow_mut().stack.push(v);
    }

    pub fn pop(&self) -> Result<Value> {
        self.roots
            .borrow_mut()
            .stack
            .pop()
            .ok_or_else(|| Error::HeapCorruption("operand stack underflow".to_owned()))
    }

    /// The value `depth` entries below the top of the stack.
    pub fn peek(&self, depth: usize) -> Result<Value> {
        let roots = self.roots.borrow();
        roots
            .stack
            .len()
            .checked_sub(depth + 1)
            .map(|i| roots.stack[i])
            .ok_or_else(|| Error::HeapCorruption("operand stack underflow".to_owned()))
    }

    pub fn stack_len(&self) -> usize {
        self.roots.borrow().stack.len()
    }

    pub fn truncate(&self, len: usize) {
        self.roots.borrow_mut().stack.truncate(len);
    }

    pub fn stack_get(&self, idx: usize) -> Result<Value> {
        self.roots
            .borrow()
            .stack
            .get(idx)
            .copied()
            .ok_or_else(|| Error::HeapCorruption(format!("stack slot {idx} is out of range")))
    }

    pub fn stack_set(&self, idx: usize, v: Value) -> Result<()> {
        let mut roots = self.roots.borrow_mut();
        let slot = roots
            .stack
            .get_mut(idx)
            .ok_or_else(|| Error::HeapCorruption(format!("stack slot {idx} is out of range")))?;
        *slot = v;
        Ok(())
    }

    /// Copy of the stack from `from` to the top.
    pub fn stack_from(&self, from: usize) -> Vec<Value> {
        let roots = self.roots.borrow();
        roots.stack.get(from..).map(<[Value]>::to_vec).unwrap_or_default()
    }

    /// Record that `stored` was written into `container`.
    fn barrier(&self, container: Value, stored: Value) {
        if stored.ptr().is_some() {
            self.heap.borrow_mut().barrier(container, stored);
        }
    }

    pub fn cons(&self, car: Value, cdr: Value) -> Result<Value> {
        self.alloc(Cons::cons(car, cdr))
    }

    pub fn car(&self, v: Value) -> Result<Value> {
        match (v, self.config.nil_access) {
            (Value::Nil, NilAccess::Lenient) => Ok(Value::Nil),
            (Value::Nil, NilAccess::Strict) => Err(Error::Type("car of nil".to_owned())),
            _ => Ok(self.heap.borrow().cons(v)?.car),
        }
    }

    pub fn cdr(&self, v: Value) -> Result<Value> {
        match (v, self.config.nil_access) {
            (Value::Nil, NilAccess::Lenient) => Ok(Value::Nil),
            (Value::Nil, NilAccess::Strict) => Err(Error::Type("cdr of nil".to_owned())),
            _ => Ok(self.heap.borrow().cons(v)?.cdr),
        }
    }

    /// Both halves of a cons; never lenient.
    pub fn uncons(&self, v: Value) -> Result<(Value, Value)> {
        let heap = self.heap.borrow();
        let c = heap.cons(v)?;
        Ok((c.car, c.cdr))
    }

    pub fn set_car(&self, cell: Value, v: Value) -> Result<()> {
        self.heap.borrow_mut().cons_mut(cell)?.car = v;
        self.barrier(cell, v);
        Ok(())
    }

    pub fn set_cdr(&self, cell: Value, v: Value) -> Result<()> {
        self.heap.borrow_mut().cons_mut(cell)?.cdr = v;
        self.barrier(cell, v);
        Ok(())
    }

    /// Build a proper list of the given values.
    ///
    /// The values must already be rooted (or immediate).
    pub fn list(&self, items: &[Value]) -> Result<Value> {
        self.list_with_tail(items, Value::Nil)
    }

    pub fn list_with_tail(&self, items: &[Value], tail: Value) -> Result<Value> {
        let acc = self.root(tail);
        for &item in items.iter().rev() {
            acc.set(self.cons(item, acc.get())?);
        }
        Ok(acc.get())
    }

    /// The elements of a proper list.
    ///
    /// A circular list is a type error.
    pub fn list_to_vec(&self, list: Value) -> Result<Vec<Value>> {
        let heap = self.heap.borrow();
        let mut out = Vec::new();
        let mut cursor = list;
        // Trails the cursor at half speed; they meet only on a cycle.
        let mut slow = list;
        loop {
            match cursor {
                Value::Nil => return Ok(out),
                Value::Cons(_) => {
                    let c = heap.cons(cursor)?;
                    out.push(c.car);
                    cursor = c.cdr;
                    if out.len() % 2 == 0 {
                        slow = heap.cons(slow)?.cdr;
                    }
                    if cursor == slow {
                        return Err(Error::Type("circular list".to_owned()));
                    }
                }
                other => {
                    return Err(Error::Type(format!(
                        "expected a proper list, found a {} tail",
                        other.type_name()
                    )))
                }
            }
        }
    }

    pub fn put_function(&self, function: Function) -> Result<Value> {
        self.alloc(function)
    }

    /// Name, arity and body of a function object.
    pub fn function(&self, v: Value) -> Result<Function> {
        Ok(self.heap.borrow().function(v)?.clone())
    }

    pub fn set_function_name(&self, f: Value, name: Value) -> Result<()> {
        self.heap.borrow_mut().function_mut(f)?.name = name;
        self.barrier(f, name);
        Ok(())
    }

    /// Replace captured slot `idx` of a closure.
    pub fn set_capture(&self, f: Value, idx: usize, v: Value) -> Result<()> {
        {
            let mut heap = self.heap.borrow_mut();
            let function = heap.function_mut(f)?;
            let slot = match &mut function.body {
                FunctionBody::Compiled { captures, .. } => captures.get_mut(idx),
                FunctionBody::Builtin(_) => None,
            };
            *slot.or_type_error("closure slot out of range")? = v;
        }
        self.barrier(f, v);
        Ok(())
    }

    pub fn capture(&self, f: Value, idx: usize) -> Result<Value> {
        let heap = self.heap.borrow();
        match &heap.function(f)?.body {
            FunctionBody::Compiled { captures, .. } => captures.get(idx).copied(),
            FunctionBody::Builtin(_) => None,
        }
        .or_type_error("closure slot out of range")
    }

    /// The printed representation of a value, for messages and logs.
    ///
    /// Bytes that are not UTF-8 are replaced; use `printer::write` where
    /// the output has to read back.
    pub fn display(&self, v: Value) -> String {
        match crate::printer::print_to_string(self, v) {
            Ok(s) => s,
            Err(e) => format!("#<unprintable {v}: {e}>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Collector;
    use crate::error::ErrorKind;

    fn stores() -> [Storage; 2] {
        [
            Storage::new(Config::default().with_collector(Collector::Incremental)),
            Storage::new(Config::default().with_collector(Collector::MarkSweep)),
        ]
    }

    #[test]
    fn gc_numbers() -> Result<()> {
        for store in stores() {
            let s = store.put_string(b"seven")?;
            let one = store.cons(Value::Fixnum(1), s)?;
            let _ = store.cons(Value::Fixnum(2), Value::Nil)?;
            assert_eq!(store.current_stats().objects, 3);

            store.push(one);
            store.gc()?;
            assert_eq!(store.current_stats().objects, 2);
            match store.uncons(store.peek(0)?)? {
                (Value::Fixnum(1), s) => assert_eq!(store.string_bytes(s)?, b"seven"),
                v => panic!("unexpected object: {:?}", v),
            }
            store.verify()?;
        }
        Ok(())
    }

    #[test]
    fn gc_pairs() -> Result<()> {
        for store in stores() {
            const A: &[u8] = b"Now this is podracing!";
            const B: &[u8] = b"This is...not really podracing.";
            let a = store.root(store.put_string(A)?);
            let b = store.root(store.put_string(B)?);

            // '(a a b) in one list; '(b b) in another, sharing the last cell.
            {
                let ls1 = store.root(store.cons(b.get(), Value::Nil)?);
                let lsa1 = store.root(store.cons(a.get(), ls1.get())?);
                let lsa = store.cons(a.get(), lsa1.get())?;
                store.push(lsa);
                let lsb = store.cons(b.get(), ls1.get())?;
                store.push(lsb);
            }
            drop(a);
            drop(b);
            assert_eq!(store.current_stats().objects, 6);
            let before = store.current_stats();
            store.gc()?;
            assert_eq!(store.current_stats().objects, before.objects);

            let lsb = store.pop()?;
            store.pop()?;
            store.push(lsb);
            store.gc()?;
            // Left: b, (b), (b b).
            assert_eq!(store.current_stats().objects, 3);
            let items = store.list_to_vec(store.peek(0)?)?;
            assert_eq!(items.len(), 2);
            assert_eq!(items[0], items[1]);
            assert_eq!(store.string_bytes(items[0])?, B);
            store.verify()?;
        }
        Ok(())
    }

    #[test]
    fn gc_under_pressure() -> Result<()> {
        for store in stores() {
            let last = store.root(Value::Nil);
            for i in 0..10_000 {
                last.set(store.cons(Value::Fixnum(i), Value::Nil)?);
            }
            assert!(store.current_stats().collections > 0);
            store.gc()?;
            assert_eq!(store.current_stats().objects, 1);
            assert_eq!(store.car(last.get())?, Value::Fixnum(9_999));
            store.verify()?;
        }
        Ok(())
    }

    #[test]
    fn long_list_survives_collections() -> Result<()> {
        for store in stores() {
            let list = store.root(Value::Nil);
            for i in 0..5_000 {
                list.set(store.cons(Value::Fixnum(i), list.get())?);
                // Garbage in between.
                store.cons(Value::Fixnum(-i), Value::Nil)?;
            }
            let items = store.list_to_vec(list.get())?;
            assert_eq!(items.len(), 5_000);
            for (n, v) in items.iter().enumerate() {
                assert_eq!(*v, Value::Fixnum(4_999 - n as i64));
            }
            store.verify()?;
        }
        Ok(())
    }

    #[test]
    fn allocation_during_marking_survives() -> Result<()> {
        let store = Storage::new(Config::default());
        let holder = store.root(store.cons(Value::Nil, Value::Nil)?);
        // Run until a cycle is in its mark phase.
        while store.gc_phase() != "marking" {
            store.cons(Value::Nil, Value::Nil)?;
        }
        // A young object, reachable only through the holder.
        let young = store.put_string(b"young")?;
        store.set_car(holder.get(), young)?;
        while store.gc_phase() == "marking" {
            store.cons(Value::Nil, Value::Nil)?;
        }
        store.gc()?;
        assert_eq!(store.string_bytes(store.car(holder.get())?)?, b"young");
        store.verify()?;
        Ok(())
    }

    #[test]
    fn rooted_guards_drop_in_any_order() -> Result<()> {
        let store = Storage::default();
        let a = store.root(store.cons(Value::Fixnum(1), Value::Nil)?);
        let b = store.root(store.cons(Value::Fixnum(2), Value::Nil)?);
        let c = store.root(store.cons(Value::Fixnum(3), Value::Nil)?);
        drop(b);
        store.gc()?;
        assert_eq!(store.current_stats().objects, 2);
        drop(a);
        let d = store.root(store.cons(Value::Fixnum(4), Value::Nil)?);
        store.gc()?;
        assert_eq!(store.current_stats().objects, 2);
        assert_eq!(store.car(c.get())?, Value::Fixnum(3));
        assert_eq!(store.car(d.get())?, Value::Fixnum(4));
        Ok(())
    }

    #[test]
    fn nil_access_modes() -> Result<()> {
        let strict = Storage::default();
        match strict.car(Value::Nil) {
            Err(e) => assert_eq!(e.kind(), ErrorKind::Type),
            Ok(v) => panic!("unexpected object: {:?}", v),
        }
        let lenient = Storage::new(Config::default().with_nil_access(NilAccess::Lenient));
        assert_eq!(lenient.car(Value::Nil)?, Value::Nil);
        assert_eq!(lenient.cdr(Value::Nil)?, Value::Nil);
        match lenient.car(Value::Fixnum(3)) {
            Err(e) => assert_eq!(e.kind(), ErrorKind::Type),
            Ok(v) => panic!("unexpected object: {:?}", v),
        }
        Ok(())
    }

    #[test]
    fn stale_handle_is_corruption() -> Result<()> {
        let store = Storage::default();
        let s = store.put_string(b"gone")?;
        store.gc()?;
        match store.string_bytes(s) {
            Err(e) => assert_eq!(e.kind(), ErrorKind::Resource),
            Ok(v) => panic!("unexpected object: {:?}", v),
        }
        Ok(())
    }

    #[test]
    fn heap_limit() -> Result<()> {
        let store = Storage::new(Config::default().with_heap_limit(Some(50)));
        // Garbage is reclaimed to stay under the limit.
        for i in 0..1_000 {
            store.cons(Value::Fixnum(i), Value::Nil)?;
        }
        // Live data is not.
        let list = store.root(Value::Nil);
        let mut result = Ok(());
        for i in 0..100 {
            match store.cons(Value::Fixnum(i), list.get()) {
                Ok(v) => list.set(v),
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        match result {
            Err(e) => assert_eq!(e.kind(), ErrorKind::Resource),
            Ok(()) => panic!("allocated past the heap limit"),
        }
        Ok(())
    }

    #[test]
    fn circular_lists_are_rejected() -> Result<()> {
        let store = Storage::default();
        for len in 1..6 {
            let items: Vec<Value> = (0..len).map(Value::Fixnum).collect();
            let l = store.root(store.list(&items)?);
            let mut last = l.get();
            while let (_, next @ Value::Cons(_)) = store.uncons(last)? {
                last = next;
            }
            store.set_cdr(last, l.get())?;
            match store.list_to_vec(l.get()) {
                Err(Error::Type(m)) => assert_eq!(m, "circular list"),
                v => panic!("unexpected result for a {len}-cycle: {:?}", v),
            }
        }
        // A shared tail is not a cycle.
        let tail = store.root(store.list(&[Value::Fixnum(9)])?);
        let l = store.list_with_tail(&[tail.get(), Value::Fixnum(1)], tail.get())?;
        assert_eq!(store.list_to_vec(l)?.len(), 3);
        Ok(())
    }

    #[test]
    fn list_helpers() -> Result<()> {
        let store = Storage::default();
        let l = store.list(&[Value::Fixnum(1), Value::Char(b'a'), Value::Nil])?;
        assert_eq!(
            store.list_to_vec(l)?,
            vec![Value::Fixnum(1), Value::Char(b'a'), Value::Nil]
        );
        let dotted = store.list_with_tail(&[Value::Fixnum(1)], Value::Fixnum(2))?;
        match store.list_to_vec(dotted) {
            Err(e) => assert_eq!(e.kind(), ErrorKind::Type),
            Ok(v) => panic!("unexpected object: {:?}", v),
        }
        Ok(())
    }
}
