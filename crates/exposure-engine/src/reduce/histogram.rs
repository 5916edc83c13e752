use crate::palette::TagColor;

/// Pixel count per palette slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Histogram {
    counts: Vec<u32>,
}

impl Histogram {
    /// Zeroed histogram covering slots `0..palette_len`.
    pub fn new(palette_len: u32) -> Self {
        Self {
            counts: vec![0; palette_len as usize],
        }
    }

    pub fn from_counts(counts: Vec<u32>) -> Self {
        Self { counts }
    }

    /// Counts one texel. Returns `false` for background and out-of-palette values.
    #[inline]
    pub fn record(&mut self, color: TagColor) -> bool {
        let Some(index) = color.index() else { return false };
        match self.counts.get_mut(index as usize) {
            Some(count) => {
                *count += 1;
                true
            }
            None => false,
        }
    }

    #[inline]
    pub fn count(&self, index: u32) -> u32 {
        self.counts.get(index as usize).copied().unwrap_or(0)
    }

    /// Non-zero `(slot, count)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.counts
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c > 0)
            .map(|(i, &c)| (i as u32, c))
    }

    /// Total counted pixels.
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| c as u64).sum()
    }

    /// Number of slots covered.
    #[inline]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// No pixel counted.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_skips_background_and_out_of_range() {
        let mut h = Histogram::new(2);
        assert!(h.record(TagColor::from_index(1)));
        assert!(!h.record(TagColor::BACKGROUND));
        assert!(!h.record(TagColor::from_index(2)));
        assert_eq!(h.count(1), 1);
        assert_eq!(h.total(), 1);
    }

    #[test]
    fn iter_yields_non_zero_slots() {
        let h = Histogram::from_counts(vec![0, 3, 0, 1]);
        assert_eq!(h.iter().collect::<Vec<_>>(), vec![(1, 3), (3, 1)]);
    }
}
