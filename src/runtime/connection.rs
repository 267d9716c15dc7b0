//! Fixed-capacity connection table.
//!
//! Slot 0 belongs to the listener, so peers live in slots `1..capacity`.
//! Admission always takes the lowest empty slot, which makes slot reuse
//! order deterministic: a released slot is handed out again before any
//! higher one.

/// Returned by [`ConnectionTable::admit`] when every peer slot is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityExceeded;

/// Registry of open peer connections indexed by slot.
pub struct ConnectionTable<T> {
    slots: Vec<Option<T>>,
    /// Largest slot index occupied so far. Never shrinks.
    high_water: usize,
    len: usize,
}

impl<T> ConnectionTable<T> {
    /// Create a table with `capacity` slots, including the reserved slot 0.
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            high_water: 0,
            len: 0,
        }
    }

    /// Store `handle` in the first empty slot, scanning from slot 1.
    pub fn admit(&mut self, handle: T) -> Result<usize, CapacityExceeded> {
        let slot = self
            .slots
            .iter()
            .skip(1)
            .position(Option::is_none)
            .map(|i| i + 1)
            .ok_or(CapacityExceeded)?;

        self.slots[slot] = Some(handle);
        self.len += 1;
        if slot > self.high_water {
            self.high_water = slot;
        }
        Ok(slot)
    }

    /// Clear a slot, returning the handle it held.
    pub fn release(&mut self, slot: usize) -> Option<T> {
        if slot == 0 {
            return None;
        }
        let handle = self.slots.get_mut(slot)?.take();
        if handle.is_some() {
            self.len -= 1;
        }
        handle
    }

    pub fn get(&self, slot: usize) -> Option<&T> {
        self.slots.get(slot)?.as_ref()
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut T> {
        self.slots.get_mut(slot)?.as_mut()
    }

    pub fn contains(&self, slot: usize) -> bool {
        self.get(slot).is_some()
    }

    /// Occupied slot indices in increasing order, bounded by the high-water mark.
    pub fn occupied(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots[..=self.high_water]
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| i))
    }

    /// Remove every handle, lowest slot first.
    pub fn drain(&mut self) -> Vec<(usize, T)> {
        self.len = 0;
        self.slots[..=self.high_water]
            .iter_mut()
            .enumerate()
            .filter_map(|(i, s)| s.take().map(|h| (i, h)))
            .collect()
    }

    pub fn high_water_mark(&self) -> usize {
        self.high_water
    }

    /// Number of live peer connections.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total slot count, listener slot included.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}
