//! The collected heap.
//!
//! Objects live in an arena of slots; a `Ptr` is a slot index. Every object
//! is also threaded onto the all-objects list through its header, newest
//! first, which is what the sweeper walks.
//!
//! Two collectors share the same marking machinery, a gray queue threaded
//! through the headers (`Color::Gray(next)`):
//!
//! -   Incremental tri-color: a cycle starts once enough allocations have
//!     happened since the last one. Each later allocation blackens a bounded
//!     number of gray objects. Once the queue drains, the roots are grayed
//!     again, the queue is drained to completion and the heap is swept in
//!     one go.
//! -   Mark/sweep: once allocations since the last collection outnumber the
//!     survivors of that collection, marking runs to completion and the
//!     sweep proceeds a batch at a time on later allocations.
//!
//! Objects allocated while marking are born black, with their children
//! grayed, so a constructor's arguments survive even if nothing else holds
//! them. Stores into black objects while marking go through `barrier`.

use std::cmp::max;

use super::bitset::BitSet;
use super::objects::{Color, Header, HeapCell, Object, Ptr, Value};
use super::tag::Tag;
use super::RootSet;
use crate::config::Collector;
use crate::error::{Error, Result};

/// Gray objects blackened per allocation by the incremental collector.
const MARK_STEP: usize = 1024;
/// Objects swept per allocation by the mark/sweep collector.
const SWEEP_STEP: usize = 1024;
/// Smallest allocation count between incremental cycles.
const INCREMENTAL_FLOOR: usize = 1024;
/// Smallest allocation count between mark/sweep collections.
const MARK_SWEEP_FLOOR: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Idle,
    Marking,
    /// Sweeping the list of objects that existed when marking finished.
    /// Survivors move back to the all-objects list as they are visited.
    Sweeping { rest: Option<Ptr> },
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Marking => "marking",
            Phase::Sweeping { .. } => "sweeping",
        }
    }
}

/// Running totals kept by the collector.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GcCounters {
    pub collections: usize,
    pub allocated: usize,
    pub freed: usize,
}

pub(crate) struct Heap {
    slots: Vec<Option<HeapCell>>,
    occupied: BitSet,
    collector: Collector,

    /// Head of the all-objects list.
    all: Option<Ptr>,
    /// Head of the gray queue.
    gray: Option<Ptr>,
    phase: Phase,

    live: usize,
    /// Allocations since the last sweep completed.
    since_cycle: usize,
    /// Allocation count that starts the next incremental cycle.
    threshold: usize,
    /// Objects that survived the last completed sweep.
    survivors: usize,
    counters: GcCounters,
}

impl Heap {
    pub fn new(collector: Collector) -> Self {
        Heap {
            slots: Vec::new(),
            occupied: BitSet::new(),
            collector,
            all: None,
            gray: None,
            phase: Phase::Idle,
            live: 0,
            since_cycle: 0,
            threshold: INCREMENTAL_FLOOR,
            survivors: 0,
            counters: GcCounters::default(),
        }
    }

    /// Number of objects currently allocated, garbage included.
    pub fn live(&self) -> usize {
        self.live
    }

    pub fn survivors(&self) -> usize {
        self.survivors
    }

    pub fn counters(&self) -> GcCounters {
        self.counters
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn cell(&self, p: Ptr) -> Option<&HeapCell> {
        self.slots.get(p.idx()).and_then(Option::as_ref)
    }

    fn cell_mut(&mut self, p: Ptr) -> Option<&mut HeapCell> {
        self.slots.get_mut(p.idx()).and_then(Option::as_mut)
    }

    /// Resolve a handle, checking that it still names a live object of its tag.
    pub fn object(&self, v: Value) -> Result<&Object> {
        let p = v
            .ptr()
            .ok_or_else(|| Error::Type(format!("expected a heap object, got {}", v.type_name())))?;
        match self.cell(p) {
            Some(cell) if cell.object.tag() == v.tag() => Ok(&cell.object),
            Some(cell) => Err(Error::HeapCorruption(format!(
                "{v} refers to a {}",
                cell.object.tag().name()
            ))),
            None => Err(Error::HeapCorruption(format!("{v} refers to a free slot"))),
        }
    }

    pub fn object_mut(&mut self, v: Value) -> Result<&mut Object> {
        let p = v
            .ptr()
            .ok_or_else(|| Error::Type(format!("expected a heap object, got {}", v.type_name())))?;
        match self.cell_mut(p) {
            Some(cell) if cell.object.tag() == v.tag() => Ok(&mut cell.object),
            Some(cell) => Err(Error::HeapCorruption(format!(
                "{v} refers to a {}",
                cell.object.tag().name()
            ))),
            None => Err(Error::HeapCorruption(format!("{v} refers to a free slot"))),
        }
    }

    /// Every allocated object, in slot order.
    pub fn objects(&self) -> impl Iterator<Item = (Value, &Object)> + '_ {
        self.occupied.ones().filter_map(|idx| {
            let cell = self.slots.get(idx)?.as_ref()?;
            let p = Ptr::new(u32::try_from(idx).ok()?);
            Some((Value::from_parts(cell.object.tag(), p)?, &cell.object))
        })
    }

    /// Place an object in the first free slot and link it into the heap.
    ///
    /// The caller runs `step` first; this never collects.
    pub fn insert(&mut self, object: Object) -> Result<Value> {
        let idx = self.occupied.find_first_zero();
        let raw = u32::try_from(idx)
            .map_err(|_| Error::OutOfMemory(format!("heap slot {idx} is out of range")))?;
        let ptr = Ptr::new(raw);
        let tag = object.tag();
        let value = Value::from_parts(tag, ptr)
            .ok_or_else(|| Error::HeapCorruption(format!("cannot allocate a {}", tag.name())))?;

        let color = if self.phase == Phase::Marking {
            object.for_each_child(|child| self.gray_value(child));
            Color::Black
        } else {
            Color::White
        };
        if idx >= self.slots.len() {
            self.slots.resize_with(idx + 1, || None);
        }
        self.slots[idx] = Some(HeapCell {
            header: Header {
                tag: tag.into(),
                next: self.all,
                color,
            },
            object,
        });
        self.occupied.set(idx);
        self.all = Some(ptr);
        self.live += 1;
        self.since_cycle += 1;
        self.counters.allocated += 1;
        Ok(value)
    }

    fn gray_value(&mut self, v: Value) {
        if let Some(p) = v.ptr() {
            self.gray(p);
        }
    }

    fn gray(&mut self, p: Ptr) {
        let head = self.gray;
        if let Some(cell) = self.cell_mut(p) {
            if cell.header.color == Color::White {
                cell.header.color = Color::Gray(head);
                self.gray = Some(p);
            }
        }
    }

    fn gray_roots(&mut self, roots: &RootSet) {
        for v in roots.values() {
            self.gray_value(v);
        }
    }

    /// Blacken the object at the head of the gray queue.
    /// Returns false if the queue was empty.
    fn mark_one(&mut self) -> Result<bool> {
        let Some(p) = self.gray else {
            return Ok(false);
        };
        let Some(mut cell) = self.slots.get_mut(p.idx()).and_then(Option::take) else {
            return Err(Error::HeapCorruption(format!(
                "gray queue refers to free slot {}",
                p.idx()
            )));
        };
        self.gray = match cell.header.color {
            Color::Gray(next) => next,
            other => {
                return Err(Error::HeapCorruption(format!(
                    "slot {} is queued but {other:?}",
                    p.idx()
                )))
            }
        };
        cell.header.color = Color::Black;
        // The cell is out of its slot, so a self-reference is simply skipped.
        cell.object.for_each_child(|child| self.gray_value(child));
        self.slots[p.idx()] = Some(cell);
        Ok(true)
    }

    fn drain(&mut self) -> Result<usize> {
        let mut n = 0;
        while self.mark_one()? {
            n += 1;
        }
        Ok(n)
    }

    fn start_cycle(&mut self, roots: &RootSet) {
        tracing::debug!(
            "starting {:?} collection with {} objects",
            self.collector,
            self.live
        );
        self.phase = Phase::Marking;
        self.gray_roots(roots);
    }

    fn begin_sweep(&mut self) {
        self.phase = Phase::Sweeping {
            rest: self.all.take(),
        };
        self.survivors = 0;
    }

    /// Sweep up to `limit` objects, or all of them.
    /// Returns true once the sweep is complete.
    fn sweep(&mut self, limit: Option<usize>) -> Result<bool> {
        let Phase::Sweeping { mut rest } = self.phase else {
            return Ok(true);
        };
        let mut n = 0;
        while let Some(p) = rest {
            if limit.is_some_and(|l| n >= l) {
                self.phase = Phase::Sweeping { rest };
                return Ok(false);
            }
            n += 1;
            let idx = p.idx();
            let all = self.all;
            let Some(cell) = self.cell_mut(p) else {
                return Err(Error::HeapCorruption(format!(
                    "object list refers to free slot {idx}"
                )));
            };
            rest = cell.header.next;
            match cell.header.color {
                Color::White => {
                    self.slots[idx] = None;
                    self.occupied.clear(idx);
                    self.live -= 1;
                    self.counters.freed += 1;
                }
                Color::Black => {
                    cell.header.color = Color::White;
                    cell.header.next = all;
                    self.all = Some(p);
                    self.survivors += 1;
                }
                Color::Gray(_) => {
                    return Err(Error::HeapCorruption(format!(
                        "slot {idx} is still gray during sweep"
                    )))
                }
            }
        }

        self.phase = Phase::Idle;
        self.since_cycle = 0;
        self.threshold = max(self.survivors / 4, INCREMENTAL_FLOOR);
        self.counters.collections += 1;
        tracing::debug!(
            "collection {} done: {} survivors, {} freed in total",
            self.counters.collections,
            self.survivors,
            self.counters.freed
        );
        Ok(true)
    }

    /// Give the collector a chance to run; called before every allocation.
    pub fn step(&mut self, roots: &RootSet) -> Result<()> {
        match (self.collector, self.phase) {
            (Collector::Incremental, Phase::Idle) => {
                if self.since_cycle >= self.threshold {
                    self.start_cycle(roots);
                }
            }
            (Collector::Incremental, Phase::Marking) => {
                let mut n = 0;
                while n < MARK_STEP && self.mark_one()? {
                    n += 1;
                }
                tracing::trace!("marked {n} objects");
                if self.gray.is_none() {
                    self.finish(roots)?;
                }
            }
            (Collector::MarkSweep, Phase::Idle) => {
                if self.since_cycle >= max(self.survivors, MARK_SWEEP_FLOOR) {
                    self.start_cycle(roots);
                    let marked = self.drain()?;
                    tracing::trace!("marked {marked} objects");
                    self.begin_sweep();
                }
            }
            (Collector::MarkSweep, Phase::Marking) => {
                self.drain()?;
                self.begin_sweep();
            }
            (_, Phase::Sweeping { .. }) => {
                self.sweep(Some(SWEEP_STEP))?;
            }
        }
        Ok(())
    }

    /// Complete the current mark phase and sweep everything.
    fn finish(&mut self, roots: &RootSet) -> Result<()> {
        // Roots are not behind the barrier; catch anything new on them.
        self.gray_roots(roots);
        self.drain()?;
        self.begin_sweep();
        self.sweep(None)?;
        Ok(())
    }

    /// Run a complete collection, finishing any cycle in progress first.
    pub fn collect(&mut self, roots: &RootSet) -> Result<()> {
        if let Phase::Sweeping { .. } = self.phase {
            self.sweep(None)?;
        }
        if self.phase == Phase::Idle {
            self.start_cycle(roots);
        }
        self.finish(roots)
    }

    /// Note that `stored` was written into `container`.
    pub fn barrier(&mut self, container: Value, stored: Value) {
        if self.phase != Phase::Marking {
            return;
        }
        let black = container
            .ptr()
            .and_then(|p| self.cell(p))
            .is_some_and(|cell| cell.header.color == Color::Black);
        if black {
            self.gray_value(stored);
        }
    }

    fn check_handle(&self, v: Value) -> Result<()> {
        if v.ptr().is_some() {
            self.object(v).map(|_| ())
        } else {
            Ok(())
        }
    }

    /// Check the heap's internal consistency. Returns the object count.
    pub fn verify(&self, roots: &RootSet) -> Result<usize> {
        let mut seen = BitSet::new();
        let pending = match self.phase {
            Phase::Sweeping { rest } => rest,
            _ => None,
        };
        let mut count = 0;
        for head in [self.all, pending] {
            let mut cursor = head;
            while let Some(p) = cursor {
                if seen.get(p.idx()) {
                    return Err(Error::HeapCorruption(format!(
                        "object list visits slot {} twice",
                        p.idx()
                    )));
                }
                seen.set(p.idx());
                let cell = self.cell(p).ok_or_else(|| {
                    Error::HeapCorruption(format!("object list refers to free slot {}", p.idx()))
                })?;
                let tag = Tag::try_from(cell.header.tag)?;
                if tag != cell.object.tag() {
                    return Err(Error::HeapCorruption(format!(
                        "slot {} has header tag {} but holds a {}",
                        p.idx(),
                        tag.name(),
                        cell.object.tag().name()
                    )));
                }
                let mut bad = Ok(());
                cell.object.for_each_child(|child| {
                    if bad.is_ok() {
                        bad = self.check_handle(child);
                    }
                });
                bad.map_err(|e| e.annotate(format!("in slot {}", p.idx())))?;
                count += 1;
                cursor = cell.header.next;
            }
        }

        let occupied = self.occupied.count();
        if count != occupied || count != self.live {
            return Err(Error::HeapCorruption(format!(
                "object list has {count} objects, slot map {occupied}, counter {}",
                self.live
            )));
        }
        for root in roots.values() {
            self.check_handle(root)
                .map_err(|e| e.annotate("in root set"))?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Buffer, Cons};

    fn young_and_holder(heap: &mut Heap, roots: &mut RootSet) -> Result<(Value, Value)> {
        let holder = heap.insert(Object::Cons(Cons::cons(Value::Nil, Value::Nil)))?;
        let young = heap.insert(Object::String(Buffer::from_slice(b"young")?))?;
        roots.stack.push(holder);
        heap.start_cycle(roots);
        // Blacken the holder; the string is still white.
        assert!(heap.mark_one()?);
        assert_eq!(heap.gray, None);
        if let Object::Cons(c) = heap.object_mut(holder)? {
            c.car = young;
        }
        Ok((holder, young))
    }

    #[test]
    fn barrier_keeps_stores_into_black_objects() -> Result<()> {
        let mut heap = Heap::new(Collector::Incremental);
        let mut roots = RootSet::default();
        let (holder, young) = young_and_holder(&mut heap, &mut roots)?;
        heap.barrier(holder, young);
        heap.finish(&roots)?;
        assert!(heap.object(young).is_ok());
        assert_eq!(heap.verify(&roots)?, 2);
        Ok(())
    }

    #[test]
    fn missing_barrier_loses_the_store() -> Result<()> {
        let mut heap = Heap::new(Collector::Incremental);
        let mut roots = RootSet::default();
        let (_, young) = young_and_holder(&mut heap, &mut roots)?;
        heap.finish(&roots)?;
        assert!(heap.object(young).is_err());
        // The holder now dangles, and verification says so.
        assert!(heap.verify(&roots).is_err());
        Ok(())
    }

    #[test]
    fn mark_sweep_sweeps_in_batches() -> Result<()> {
        let mut heap = Heap::new(Collector::MarkSweep);
        let roots = RootSet::default();
        for i in 0..3_000 {
            heap.step(&roots)?;
            heap.insert(Object::Cons(Cons::cons(Value::Fixnum(i), Value::Nil)))?;
        }
        assert!(heap.counters().collections > 0);
        // Whatever remains is from the cycle in progress or since the last one.
        assert!(heap.live() < 3_000);
        heap.collect(&roots)?;
        assert_eq!(heap.live(), 0);
        assert_eq!(heap.phase(), Phase::Idle);
        Ok(())
    }

    #[test]
    fn incremental_threshold_follows_survivors() -> Result<()> {
        let mut heap = Heap::new(Collector::Incremental);
        let mut roots = RootSet::default();
        for i in 0..8_000 {
            heap.step(&roots)?;
            let v = heap.insert(Object::Cons(Cons::cons(Value::Fixnum(i), Value::Nil)))?;
            roots.stack.push(v);
        }
        heap.collect(&roots)?;
        assert_eq!(heap.survivors(), 8_000);
        assert_eq!(heap.threshold, 2_000);
        Ok(())
    }
}
