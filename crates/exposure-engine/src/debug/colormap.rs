/// Display colors for palette slots; slots past the end wrap around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorMap {
    colors: Vec<[u8; 4]>,
}

impl Default for ColorMap {
    fn default() -> Self {
        Self::new(vec![
            [230, 25, 75, 255],
            [60, 180, 75, 255],
            [255, 225, 25, 255],
            [0, 130, 200, 255],
            [245, 130, 48, 255],
            [145, 30, 180, 255],
            [70, 240, 240, 255],
            [240, 50, 230, 255],
            [210, 245, 60, 255],
            [250, 190, 212, 255],
            [0, 128, 128, 255],
            [220, 190, 255, 255],
            [170, 110, 40, 255],
            [255, 250, 200, 255],
            [128, 0, 0, 255],
            [170, 255, 195, 255],
        ])
    }
}

impl ColorMap {
    /// An empty list falls back to plain white.
    pub fn new(colors: Vec<[u8; 4]>) -> Self {
        if colors.is_empty() {
            return Self { colors: vec![[255; 4]] };
        }
        Self { colors }
    }

    #[inline]
    pub fn color(&self, slot: u32) -> [u8; 4] {
        self.colors[slot as usize % self.colors.len()]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_wrap() {
        let map = ColorMap::new(vec![[1, 0, 0, 255], [2, 0, 0, 255]]);
        assert_eq!(map.color(0), map.color(2));
        assert_ne!(map.color(0), map.color(1));
    }

    #[test]
    fn empty_map_is_white() {
        assert_eq!(ColorMap::new(Vec::new()).color(5), [255; 4]);
    }
}
