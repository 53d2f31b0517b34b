//! Open-addressing hash table.
//!
//! Capacity is a power of two. A key's probe sequence starts at
//! `hash & mask` and continues with `i = (i * 5 + 1) & mask`, which visits
//! every slot exactly once before repeating. Deleted entries become
//! tombstones so later keys on the same chain stay reachable.
//!
//! The table stores each entry's hash, so rehashing never needs to look at
//! keys. Key equality needs the heap, so lookups take an equality callback;
//! `Storage` supplies structural equality.

use crate::error::{Error, Result};

use super::objects::{Object, Value};
use super::Storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Empty,
    Tombstone,
    Full { hash: u32, key: Value, value: Value },
}

/// Where a key lives, or where it would go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Found(usize),
    /// Not present; insert at this slot (the first tombstone on the chain,
    /// if any, else the empty slot that ended it).
    Vacant(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Full and tombstone slots.
    fill: usize,
    /// Full slots.
    load: usize,
    slots: Vec<Slot>,
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

/// Full-period probe order over a table of `capacity` slots.
fn probe_sequence(hash: u32, capacity: usize) -> impl Iterator<Item = usize> {
    let mask = capacity - 1;
    let mut i = hash as usize & mask;
    (0..capacity).map(move |_| {
        let here = i;
        i = (i.wrapping_mul(5).wrapping_add(1)) & mask;
        here
    })
}

impl Table {
    pub const MIN_CAPACITY: usize = 16;
    const MAX_CAPACITY: usize = 1 << 31;

    pub fn new() -> Self {
        Table {
            fill: 0,
            load: 0,
            slots: vec![Slot::Empty; Self::MIN_CAPACITY],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn fill(&self) -> usize {
        self.fill
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.load
    }

    pub fn is_empty(&self) -> bool {
        self.load == 0
    }

    /// Key/value pairs, in slot order.
    pub fn entries(&self) -> impl Iterator<Item = (Value, Value)> + '_ {
        self.slots.iter().filter_map(|slot| match *slot {
            Slot::Full { key, value, .. } => Some((key, value)),
            _ => None,
        })
    }

    /// Whether an insertion should rehash first: the table is about to pass
    /// three quarters full (tombstones included), or has fallen below an
    /// eighth occupied.
    pub fn needs_rehash(&self) -> bool {
        let capacity = self.capacity();
        (self.fill + 1) * 4 >= capacity * 3
            || (capacity > Self::MIN_CAPACITY && self.load * 8 < capacity)
    }

    /// Smallest power-of-two capacity that keeps one more entry under 3/4.
    fn capacity_for(load: usize) -> Result<usize> {
        let mut capacity = Self::MIN_CAPACITY;
        while (load + 1) * 4 >= capacity * 3 {
            if capacity >= Self::MAX_CAPACITY {
                return Err(Error::OutOfMemory(format!(
                    "hash table of {load} entries is too large"
                )));
            }
            capacity *= 2;
        }
        Ok(capacity)
    }

    /// Rebuild the slot array, dropping tombstones.
    pub fn rehash(&mut self) -> Result<()> {
        let capacity = Self::capacity_for(self.load)?;
        tracing::debug!(
            "rehashing table of {} entries from {} to {} slots",
            self.load,
            self.capacity(),
            capacity
        );
        let old = std::mem::replace(&mut self.slots, vec![Slot::Empty; capacity]);
        for slot in old {
            if let Slot::Full { hash, .. } = slot {
                let target = probe_sequence(hash, capacity)
                    .find(|&i| self.slots[i] == Slot::Empty)
                    .ok_or_else(|| Error::HeapCorruption("rehash found no free slot".to_owned()))?;
                self.slots[target] = slot;
            }
        }
        self.fill = self.load;
        Ok(())
    }

    /// Find `key`'s slot, given its hash and an equality test against stored keys.
    pub fn probe(&self, hash: u32, mut eq: impl FnMut(Value) -> Result<bool>) -> Result<Probe> {
        let mut tombstone = None;
        for i in probe_sequence(hash, self.capacity()) {
            match self.slots[i] {
                Slot::Empty => return Ok(Probe::Vacant(tombstone.unwrap_or(i))),
                Slot::Tombstone => {
                    tombstone.get_or_insert(i);
                }
                Slot::Full { hash: h, key, .. } => {
                    if h == hash && eq(key)? {
                        return Ok(Probe::Found(i));
                    }
                }
            }
        }
        // Only reachable when the table has no empty slot left.
        match tombstone {
            Some(i) => Ok(Probe::Vacant(i)),
            None => Err(Error::HeapCorruption("hash table has no free slot".to_owned())),
        }
    }

    pub fn get(&self, hash: u32, eq: impl FnMut(Value) -> Result<bool>) -> Result<Option<Value>> {
        Ok(match self.probe(hash, eq)? {
            Probe::Found(i) => match self.slots[i] {
                Slot::Full { value, .. } => Some(value),
                _ => None,
            },
            Probe::Vacant(_) => None,
        })
    }

    /// Store at a slot previously returned by `probe`, with no mutation in between.
    pub fn put_at(&mut self, at: Probe, hash: u32, key: Value, value: Value) {
        match at {
            Probe::Found(i) => {
                if let Slot::Full { value: v, .. } = &mut self.slots[i] {
                    *v = value;
                }
            }
            Probe::Vacant(i) => {
                if self.slots[i] == Slot::Empty {
                    self.fill += 1;
                }
                self.load += 1;
                self.slots[i] = Slot::Full { hash, key, value };
            }
        }
    }

    /// Remove the entry at `at`, leaving a tombstone. Returns the old value.
    pub fn remove_at(&mut self, at: Probe) -> Option<Value> {
        let Probe::Found(i) = at else {
            return None;
        };
        match std::mem::replace(&mut self.slots[i], Slot::Tombstone) {
            Slot::Full { value, .. } => {
                self.load -= 1;
                Some(value)
            }
            other => {
                self.slots[i] = other;
                None
            }
        }
    }

    /// Insert or replace, rehashing first if needed.
    /// For keys whose equality does not need the heap.
    #[cfg(test)]
    pub(crate) fn insert(&mut self, hash: u32, key: Value, value: Value) -> Result<()> {
        if self.needs_rehash() {
            self.rehash()?;
        }
        let at = self.probe(hash, |k| Ok(k == key))?;
        self.put_at(at, hash, key, value);
        Ok(())
    }
}

impl Storage {
    pub fn make_table(&self) -> Result<Value> {
        self.alloc(Object::Table(Table::new()))
    }

    pub fn table_get(&self, table: Value, key: Value) -> Result<Option<Value>> {
        let heap = self.heap();
        let hash = heap.hash(key)?;
        heap.table(table)?.get(hash, |k| heap.equal(key, k))
    }

    pub fn table_set(&self, table: Value, key: Value, value: Value) -> Result<()> {
        {
            let mut heap = self.heap.borrow_mut();
            let t = heap.table_mut(table)?;
            if t.needs_rehash() {
                t.rehash()?;
            }
        }
        let (hash, at) = {
            let heap = self.heap();
            let hash = heap.hash(key)?;
            (hash, heap.table(table)?.probe(hash, |k| heap.equal(key, k))?)
        };
        self.heap
            .borrow_mut()
            .table_mut(table)?
            .put_at(at, hash, key, value);
        self.barrier(table, key);
        self.barrier(table, value);
        Ok(())
    }

    /// Delete a key; returns the value it had.
    pub fn table_remove(&self, table: Value, key: Value) -> Result<Option<Value>> {
        let at = {
            let heap = self.heap();
            let hash = heap.hash(key)?;
            heap.table(table)?.probe(hash, |k| heap.equal(key, k))?
        };
        Ok(self.heap.borrow_mut().table_mut(table)?.remove_at(at))
    }

    pub fn table_count(&self, table: Value) -> Result<usize> {
        Ok(self.heap().table(table)?.len())
    }

    pub fn table_entries(&self, table: Value) -> Result<Vec<(Value, Value)>> {
        Ok(self.heap().table(table)?.entries().collect())
    }
}
