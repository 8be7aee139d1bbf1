//! Constant pools for both directions of the codec.
//!
//! The read side ([`ConstantPool`]) is a flat slot table keyed by the
//! producer-assigned 16-bit index; the producer decides when an index is
//! reused. The write side ([`PoolWriter`]) is that producer: it interns values
//! by identity and recycles the least recently used index once full.

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::error::{DecodeError, EncodeError};
use crate::limits::MIN_POOL_CAPACITY;
use crate::model::PoolValue;

// =============================================================================
// DECODING
// =============================================================================

/// Index-to-value table filled by `POOL_NEW` entries of a stream.
///
/// Cloning yields an independent snapshot; payloads are shared `Arc`s.
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    slots: Vec<Option<PoolValue>>,
}

impl ConstantPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the latest value bound to `index`.
    pub fn get(&self, index: u16) -> Result<&PoolValue, DecodeError> {
        self.slots
            .get(index as usize)
            .and_then(Option::as_ref)
            .ok_or(DecodeError::InvalidPoolIndex {
                index,
                size: self.slots.len(),
            })
    }

    /// Binds `value` to `index`, replacing any previous binding.
    pub fn add_pool_entry(&mut self, index: u16, value: PoolValue) -> PoolValue {
        let slot = index as usize;
        if slot >= self.slots.len() {
            self.slots.resize(slot + 1, None);
        }
        trace!(index, kind = ?value.kind(), "pool entry");
        self.slots[slot] = Some(value.clone());
        value
    }

    /// Drops every binding, leaving a pool indistinguishable from a new one.
    pub fn restart(&mut self) {
        *self = Self::new();
    }

    /// One past the highest index ever bound.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterates the bound slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &PoolValue)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|v| (i as u16, v)))
    }
}

// =============================================================================
// ENCODING
// =============================================================================

/// Outcome of interning a value in a [`PoolWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolRef {
    /// Already bound; write a reference to this index.
    Known(u16),
    /// Newly bound; write `POOL_NEW`, this index and the payload, then call
    /// [`PoolWriter::release`].
    New(u16),
}

/// Encoder-side pool: interns values by identity with LRU index recycling.
#[derive(Debug, Clone)]
pub struct PoolWriter {
    capacity: usize,
    index_of: FxHashMap<PoolValue, u16>,
    slots: Vec<Option<PoolValue>>,
    last_used: Vec<u64>,
    /// Indices whose payload is still being written.
    pinned: Vec<u16>,
    tick: u64,
}

impl PoolWriter {
    /// Creates a pool holding at most `capacity` live indices.
    pub fn new(capacity: usize) -> Result<Self, EncodeError> {
        if capacity < MIN_POOL_CAPACITY {
            return Err(EncodeError::PoolTooSmall {
                requested: capacity,
                min: MIN_POOL_CAPACITY,
            });
        }
        Ok(Self {
            capacity: capacity.min(u16::MAX as usize + 1),
            index_of: FxHashMap::default(),
            slots: Vec::new(),
            last_used: Vec::new(),
            pinned: Vec::new(),
            tick: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live bindings.
    pub fn len(&self) -> usize {
        self.index_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index_of.is_empty()
    }

    /// Looks `value` up, binding it to a free or recycled index if absent.
    ///
    /// A [`PoolRef::New`] index stays pinned until [`release`](Self::release),
    /// so the entries its payload defines cannot evict it.
    pub fn reference(&mut self, value: &PoolValue) -> Result<PoolRef, EncodeError> {
        self.tick += 1;
        if let Some(&index) = self.index_of.get(value) {
            self.last_used[index as usize] = self.tick;
            return Ok(PoolRef::Known(index));
        }

        let index = if self.slots.len() < self.capacity {
            self.slots.push(None);
            self.last_used.push(0);
            (self.slots.len() - 1) as u16
        } else {
            let victim = self.least_recently_used().ok_or(EncodeError::PoolTooSmall {
                requested: self.capacity,
                min: self.pinned.len() + 1,
            })?;
            if let Some(old) = self.slots[victim as usize].take() {
                self.index_of.remove(&old);
            }
            trace!(index = victim, "recycling pool index");
            victim
        };

        self.slots[index as usize] = Some(value.clone());
        self.last_used[index as usize] = self.tick;
        self.index_of.insert(value.clone(), index);
        self.pinned.push(index);
        Ok(PoolRef::New(index))
    }

    /// Unpins an index returned as [`PoolRef::New`] once its payload is written.
    pub fn release(&mut self, index: u16) {
        if let Some(pos) = self.pinned.iter().rposition(|&i| i == index) {
            self.pinned.remove(pos);
        }
    }

    fn least_recently_used(&self) -> Option<u16> {
        self.last_used
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.pinned.contains(&(*i as u16)))
            .min_by_key(|(_, tick)| **tick)
            .map(|(i, _)| i as u16)
    }
}

impl Default for PoolWriter {
    fn default() -> Self {
        Self {
            capacity: crate::limits::DEFAULT_POOL_CAPACITY,
            index_of: FxHashMap::default(),
            slots: Vec::new(),
            last_used: Vec::new(),
            pinned: Vec::new(),
            tick: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::{Klass, PoolKind};

    #[test]
    fn test_overwrite_returns_latest() {
        let mut pool = ConstantPool::new();
        pool.add_pool_entry(5, PoolValue::string("A"));
        let before = pool.get(5).unwrap().clone();
        pool.add_pool_entry(5, PoolValue::string("B"));

        assert_eq!(before, PoolValue::string("A"));
        assert_eq!(pool.get(5).unwrap(), &PoolValue::string("B"));
        assert_eq!(pool.len(), 6);
    }

    #[test]
    fn test_unbound_and_out_of_range() {
        let mut pool = ConstantPool::new();
        pool.add_pool_entry(3, PoolValue::string("x"));
        assert!(matches!(
            pool.get(1),
            Err(DecodeError::InvalidPoolIndex { index: 1, size: 4 })
        ));
        assert!(matches!(
            pool.get(4),
            Err(DecodeError::InvalidPoolIndex { index: 4, .. })
        ));
    }

    #[test]
    fn test_restart_and_snapshot_are_independent() {
        let mut pool = ConstantPool::new();
        pool.add_pool_entry(0, PoolValue::Klass(Arc::new(Klass::new("a.B"))));
        let snapshot = pool.clone();

        pool.restart();
        assert!(pool.is_empty());
        assert!(pool.get(0).is_err());
        assert_eq!(snapshot.get(0).unwrap().kind(), PoolKind::Class);
        assert_eq!(snapshot.iter().count(), 1);
    }

    #[test]
    fn test_writer_dedups_by_value() {
        let mut pool = PoolWriter::new(16).unwrap();
        let a = PoolValue::string("same");
        assert_eq!(pool.reference(&a).unwrap(), PoolRef::New(0));
        pool.release(0);
        assert_eq!(pool.reference(&PoolValue::string("same")).unwrap(), PoolRef::Known(0));
        assert_eq!(pool.reference(&PoolValue::string("other")).unwrap(), PoolRef::New(1));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_writer_recycles_least_recently_used() {
        let mut pool = PoolWriter::new(MIN_POOL_CAPACITY).unwrap();
        for i in 0..MIN_POOL_CAPACITY {
            let v = PoolValue::string(&format!("v{}", i));
            assert_eq!(pool.reference(&v).unwrap(), PoolRef::New(i as u16));
            pool.release(i as u16);
        }
        // Touch v0 so v1 becomes the oldest.
        assert_eq!(pool.reference(&PoolValue::string("v0")).unwrap(), PoolRef::Known(0));
        assert_eq!(pool.reference(&PoolValue::string("fresh")).unwrap(), PoolRef::New(1));
        pool.release(1);
        assert_eq!(pool.reference(&PoolValue::string("v1")).unwrap(), PoolRef::New(2));
        assert_eq!(pool.len(), MIN_POOL_CAPACITY);
    }

    #[test]
    fn test_writer_never_recycles_pinned() {
        let mut pool = PoolWriter::new(MIN_POOL_CAPACITY).unwrap();
        let parent = PoolValue::string("parent");
        assert_eq!(pool.reference(&parent).unwrap(), PoolRef::New(0));
        for i in 1..MIN_POOL_CAPACITY {
            let v = PoolValue::string(&format!("child{}", i));
            pool.reference(&v).unwrap();
            pool.release(i as u16);
        }
        // Index 0 is the oldest but still pinned.
        assert_eq!(pool.reference(&PoolValue::string("late")).unwrap(), PoolRef::New(1));
    }

    #[test]
    fn test_writer_rejects_tiny_capacity() {
        assert!(matches!(
            PoolWriter::new(3),
            Err(EncodeError::PoolTooSmall { requested: 3, .. })
        ));
    }
}
