//! Growable buffers behind strings and vectors.
//!
//! A `Buffer` is a (length, capacity, storage) triple. The storage is always
//! exactly `capacity` elements long; slots past `length` are either zeroed
//! (never used) or poisoned (released by a shrink). Growth is in place, so
//! every handle to the owning object sees the new contents.

use crate::error::{Error, Result};

use super::objects::{Fixnum, Object, Value};
use super::Storage;

/// Types that can be stored in a `Buffer`.
pub trait Element: Copy + PartialEq + std::fmt::Debug {
    /// Fill for newly exposed slots.
    const ZERO: Self;
    /// Fill for released slots.
    const POISON: Self;
}

impl Element for u8 {
    const ZERO: Self = 0;
    const POISON: Self = 0xdd;
}

/// Poison for released value slots. It is an immediate, so the collector
/// never follows it.
pub const POISON_FIXNUM: Fixnum = 0x5a5a_5a5a;

impl Element for Value {
    const ZERO: Self = Value::Nil;
    const POISON: Self = Value::Fixnum(POISON_FIXNUM);
}

#[derive(Debug, Clone, PartialEq)]
pub struct Buffer<T> {
    length: usize,
    data: Vec<T>,
}

impl<T: Element> Default for Buffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Element> Buffer<T> {
    /// Capacity floor; the first growth allocates at least this many slots.
    pub const MIN_CAPACITY: usize = 16;
    /// Lengths are kept representable as a 32-bit count.
    pub const MAX_LENGTH: usize = u32::MAX as usize;

    pub fn new() -> Self {
        Buffer {
            length: 0,
            data: Vec::new(),
        }
    }

    pub fn from_slice(items: &[T]) -> Result<Self> {
        let mut b = Self::new();
        b.reserve(items.len())?;
        b.data[..items.len()].copy_from_slice(items);
        b.length = items.len();
        Ok(b)
    }

    /// A buffer of `length` copies of `fill`.
    pub fn filled(length: usize, fill: T) -> Result<Self> {
        let mut b = Self::new();
        b.reserve(length)?;
        b.data[..length].fill(fill);
        b.length = length;
        Ok(b)
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data[..self.length]
    }

    /// Make room for at least `wanted` elements.
    /// Capacity at least doubles, starting from `MIN_CAPACITY`.
    fn reserve(&mut self, wanted: usize) -> Result<()> {
        if wanted <= self.capacity() {
            return Ok(());
        }
        if wanted > Self::MAX_LENGTH {
            return Err(Error::OutOfMemory(format!(
                "container of {wanted} elements is too large"
            )));
        }
        let mut capacity = std::cmp::max(self.capacity(), Self::MIN_CAPACITY);
        while capacity < wanted {
            capacity = capacity.saturating_mul(2);
        }
        let capacity = std::cmp::min(capacity, Self::MAX_LENGTH);
        tracing::trace!("growing buffer from {} to {}", self.capacity(), capacity);
        self.data.resize(capacity, T::ZERO);
        Ok(())
    }

    /// Append an element, growing if needed. Returns the new length.
    pub fn push(&mut self, item: T) -> Result<usize> {
        self.reserve(self.length + 1)?;
        self.data[self.length] = item;
        self.length += 1;
        Ok(self.length)
    }

    /// Remove the last element, poisoning its slot.
    pub fn pop(&mut self) -> Option<T> {
        if self.length == 0 {
            return None;
        }
        self.length -= 1;
        let item = self.data[self.length];
        self.data[self.length] = T::POISON;
        Some(item)
    }

    pub fn get(&self, idx: usize) -> Result<T> {
        self.as_slice()
            .get(idx)
            .copied()
            .ok_or_else(|| Error::Index(format!("index {idx} of length {}", self.length)))
    }

    pub fn set(&mut self, idx: usize, item: T) -> Result<()> {
        if idx >= self.length {
            return Err(Error::Index(format!(
                "index {idx} of length {}",
                self.length
            )));
        }
        self.data[idx] = item;
        Ok(())
    }

    /// Move the fill pointer.
    ///
    /// Shrinking poisons the released slots; growing exposes zeroed slots.
    pub fn resize(&mut self, length: usize) -> Result<()> {
        if length < self.length {
            self.data[length..self.length].fill(T::POISON);
        } else if length > self.length {
            self.reserve(length)?;
            self.data[self.length..length].fill(T::ZERO);
        }
        self.length = length;
        Ok(())
    }

    /// Slots between the fill pointer and the capacity; visible to tests.
    #[cfg(test)]
    pub(crate) fn spare(&self) -> &[T] {
        &self.data[self.length..]
    }
}

impl Storage {
    pub fn put_string(&self, bytes: &[u8]) -> Result<Value> {
        self.alloc(Object::String(Buffer::from_slice(bytes)?))
    }

    pub fn make_string(&self, length: usize, fill: u8) -> Result<Value> {
        self.alloc(Object::String(Buffer::filled(length, fill)?))
    }

    /// A copy of a string's contents.
    pub fn string_bytes(&self, s: Value) -> Result<Vec<u8>> {
        Ok(self.heap().string(s)?.as_slice().to_vec())
    }

    pub fn string_push(&self, s: Value, byte: u8) -> Result<usize> {
        self.heap.borrow_mut().string_mut(s)?.push(byte)
    }

    pub fn string_pop(&self, s: Value) -> Result<Option<u8>> {
        Ok(self.heap.borrow_mut().string_mut(s)?.pop())
    }

    pub fn string_get(&self, s: Value, idx: usize) -> Result<u8> {
        self.heap().string(s)?.get(idx)
    }

    pub fn string_set(&self, s: Value, idx: usize, byte: u8) -> Result<()> {
        self.heap.borrow_mut().string_mut(s)?.set(idx, byte)
    }

    /// Append bytes to a string in place.
    pub fn string_extend(&self, s: Value, bytes: &[u8]) -> Result<usize> {
        let mut heap = self.heap.borrow_mut();
        let buffer = heap.string_mut(s)?;
        for &b in bytes {
            buffer.push(b)?;
        }
        Ok(buffer.len())
    }

    pub fn put_vector(&self, items: &[Value]) -> Result<Value> {
        self.alloc(Object::Vector(Buffer::from_slice(items)?))
    }

    pub fn make_vector(&self, length: usize, fill: Value) -> Result<Value> {
        self.alloc(Object::Vector(Buffer::filled(length, fill)?))
    }

    pub fn vector_items(&self, v: Value) -> Result<Vec<Value>> {
        Ok(self.heap().vector(v)?.as_slice().to_vec())
    }

    pub fn vector_push(&self, v: Value, item: Value) -> Result<usize> {
        let n = self.heap.borrow_mut().vector_mut(v)?.push(item)?;
        self.barrier(v, item);
        Ok(n)
    }

    pub fn vector_pop(&self, v: Value) -> Result<Option<Value>> {
        Ok(self.heap.borrow_mut().vector_mut(v)?.pop())
    }

    pub fn vector_get(&self, v: Value, idx: usize) -> Result<Value> {
        self.heap().vector(v)?.get(idx)
    }

    pub fn vector_set(&self, v: Value, idx: usize, item: Value) -> Result<()> {
        self.heap.borrow_mut().vector_mut(v)?.set(idx, item)?;
        self.barrier(v, item);
        Ok(())
    }

    /// Length of a string or vector.
    pub fn fill_pointer(&self, v: Value) -> Result<usize> {
        let heap = self.heap();
        match v {
            Value::String(_) => Ok(heap.string(v)?.len()),
            Value::Vector(_) => Ok(heap.vector(v)?.len()),
            _ => Err(Error::Type(format!(
                "expected string or vector, got {}",
                v.type_name()
            ))),
        }
    }

    /// Move the fill pointer of a string or vector.
    pub fn set_fill_pointer(&self, v: Value, length: usize) -> Result<()> {
        let mut heap = self.heap.borrow_mut();
        match v {
            Value::String(_) => heap.string_mut(v)?.resize(length),
            Value::Vector(_) => heap.vector_mut(v)?.resize(length),
            _ => Err(Error::Type(format!(
                "expected string or vector, got {}",
                v.type_name()
            ))),
        }
    }
}
