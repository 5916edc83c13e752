use crate::error::ExposureError;

use super::{TagColor, MAX_CAPACITY};

/// Palette size used by [`ColorAllocator::new`].
pub const DEFAULT_CAPACITY: usize = 254;

/// Identifier of a tagged object.
///
/// The rendered color depends on the slot index only; `generation` and
/// `epoch` make identifiers from released slots or earlier resets stale.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ColorId {
    index: u32,
    generation: u32,
    epoch: u32,
}

impl ColorId {
    #[inline]
    pub fn index(self) -> u32 {
        self.index
    }

    #[inline]
    pub fn color(self) -> TagColor {
        TagColor::from_index(self.index)
    }
}

#[derive(Debug)]
struct Slot<K> {
    generation: u32,
    object: Option<K>,
}

/// Maps objects to unique palette colors and back.
///
/// Fresh slots are handed out sequentially; released slots are reused with a
/// bumped generation. The allocator never hands out a color twice while the
/// first holder is still registered.
#[derive(Debug)]
pub struct ColorAllocator<K> {
    capacity: usize,
    slots: Vec<Slot<K>>,
    free: Vec<u32>,
    live: usize,
    epoch: u32,
}

impl<K> Default for ColorAllocator<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> ColorAllocator<K> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Palette of `capacity` colors, clamped to [`MAX_CAPACITY`].
    pub fn with_capacity(capacity: usize) -> Self {
        if capacity > MAX_CAPACITY {
            log::warn!("palette capacity {capacity} clamped to {MAX_CAPACITY}");
        }
        Self {
            capacity: capacity.min(MAX_CAPACITY),
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            epoch: 0,
        }
    }

    /// Binds `object` to an unused color.
    pub fn assign(&mut self, object: K) -> Result<ColorId, ExposureError> {
        let index = match self.free.pop() {
            Some(index) => index,
            None if self.slots.len() < self.capacity => {
                self.slots.push(Slot { generation: 0, object: None });
                (self.slots.len() - 1) as u32
            }
            None => {
                return Err(ExposureError::CapacityExceeded { capacity: self.capacity });
            }
        };

        let slot = &mut self.slots[index as usize];
        slot.object = Some(object);
        self.live += 1;

        Ok(ColorId {
            index,
            generation: slot.generation,
            epoch: self.epoch,
        })
    }

    /// Returns the slot to the pool. Stale identifiers are ignored.
    pub fn release(&mut self, id: ColorId) -> Option<K> {
        if !self.is_current(id) {
            return None;
        }
        let slot = &mut self.slots[id.index as usize];
        let object = slot.object.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(object)
    }

    /// Object currently bound to `id`, if the identifier is still valid.
    pub fn resolve(&self, id: ColorId) -> Option<&K> {
        if !self.is_current(id) {
            return None;
        }
        self.slots[id.index as usize].object.as_ref()
    }

    /// Invalidates every identifier at once.
    pub fn reset(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.live = 0;
        self.epoch = self.epoch.wrapping_add(1);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots created since the last reset, live or free. Every live index is
    /// below this.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn is_current(&self, id: ColorId) -> bool {
        id.epoch == self.epoch
            && self
                .slots
                .get(id.index as usize)
                .is_some_and(|slot| slot.generation == id.generation)
    }
}
