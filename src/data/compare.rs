//! Equality and hashing.
//!
//! `eql` is identity for heap objects and value equality for immediates.
//! `equal` descends into conses, strings and vectors; symbols, hash tables
//! and functions still compare by identity. `hash` agrees with `equal`.

use std::collections::HashSet;

use super::gc::Heap;
use super::objects::{Ptr, Value};
use super::Storage;
use crate::error::Result;

const FNV_OFFSET: u32 = 2166136261;
const FNV_PRIME: u32 = 16777619;

/// Structures nested deeper than this hash as a constant.
pub const HASH_DEPTH: usize = 16;

/// Most objects one hash visits; the rest hash as a constant.
pub const HASH_NODES: usize = 256;

/// FNV-1a, 32 bits.
pub fn hash_bytes(data: &[u8]) -> u32 {
    data.iter().fold(FNV_OFFSET, |hc, &b| {
        (hc ^ b as u32).wrapping_mul(FNV_PRIME)
    })
}

fn mix(hc: u32, word: u32) -> u32 {
    word.to_le_bytes()
        .iter()
        .fold(hc, |hc, &b| (hc ^ b as u32).wrapping_mul(FNV_PRIME))
}

pub fn eql(a: Value, b: Value) -> bool {
    a == b
}

impl Heap {
    pub fn equal(&self, a: Value, b: Value) -> Result<bool> {
        let mut pending = vec![(a, b)];
        // Pairs of containers already assumed equal; makes cycles terminate.
        let mut assumed: HashSet<(Ptr, Ptr)> = HashSet::new();
        while let Some((a, b)) = pending.pop() {
            if a == b {
                continue;
            }
            match (a, b) {
                (Value::Cons(pa), Value::Cons(pb)) => {
                    if !assumed.insert((pa, pb)) {
                        continue;
                    }
                    let (ca, cb) = (self.cons(a)?, self.cons(b)?);
                    pending.push((ca.cdr, cb.cdr));
                    pending.push((ca.car, cb.car));
                }
                (Value::String(_), Value::String(_)) => {
                    if self.string(a)?.as_slice() != self.string(b)?.as_slice() {
                        return Ok(false);
                    }
                }
                (Value::Vector(pa), Value::Vector(pb)) => {
                    if !assumed.insert((pa, pb)) {
                        continue;
                    }
                    let (va, vb) = (self.vector(a)?, self.vector(b)?);
                    if va.len() != vb.len() {
                        return Ok(false);
                    }
                    pending.extend(va.as_slice().iter().copied().zip(vb.as_slice().iter().copied()));
                }
                _ => return Ok(false),
            }
        }
        Ok(true)
    }

    pub fn hash(&self, v: Value) -> Result<u32> {
        let mut budget = HASH_NODES;
        self.hash_depth(v, 0, &mut budget)
    }

    /// Hash `v`, spending one unit of `budget` per object visited. The
    /// visiting order depends only on structure, so `equal` values agree.
    fn hash_depth(&self, v: Value, depth: usize, budget: &mut usize) -> Result<u32> {
        if depth >= HASH_DEPTH || *budget == 0 {
            return Ok(FNV_OFFSET);
        }
        *budget -= 1;
        Ok(match v {
            Value::Nil => 0,
            Value::Unbound => 1,
            Value::Fixnum(n) => (n as u64 ^ ((n as u64) >> 32)) as u32,
            Value::Char(c) => (c as u32).wrapping_mul(31),
            Value::String(_) => hash_bytes(self.string(v)?.as_slice()),
            Value::Symbol(_) => {
                let name = self.symbol(v)?.name;
                hash_bytes(self.string(name)?.as_slice())
            }
            Value::Cons(_) => {
                let c = self.cons(v)?;
                let hc = mix(FNV_OFFSET, self.hash_depth(c.car, depth + 1, budget)?);
                mix(hc, self.hash_depth(c.cdr, depth + 1, budget)?)
            }
            Value::Vector(_) => {
                let mut hc = mix(FNV_OFFSET, 0x76);
                for &item in self.vector(v)?.as_slice() {
                    if *budget == 0 {
                        break;
                    }
                    hc = mix(hc, self.hash_depth(item, depth + 1, budget)?);
                }
                hc
            }
            Value::Table(p) | Value::Function(p) => mix(FNV_OFFSET, p.idx() as u32),
        })
    }
}

impl Storage {
    pub fn eql(&self, a: Value, b: Value) -> bool {
        eql(a, b)
    }

    /// Structural equality.
    pub fn equal(&self, a: Value, b: Value) -> Result<bool> {
        self.heap().equal(a, b)
    }

    /// Structural hash, consistent with `equal`.
    pub fn hash(&self, v: Value) -> Result<u32> {
        self.heap().hash(v)
    }
}
