//! Pixel counts to projected area.

use std::collections::HashMap;
use std::hash::Hash;

use crate::reduce::Histogram;

/// Converts per-slot pixel counts into square meters per object.
///
/// `resolve` maps a palette slot to its object; slots it cannot resolve
/// (released, reset, never drawn) are dropped. Slots resolving to the same
/// object are summed.
pub fn convert<K, F>(histogram: &Histogram, pixel_area: f64, mut resolve: F) -> HashMap<K, f64>
where
    K: Eq + Hash,
    F: FnMut(u32) -> Option<K>,
{
    let mut areas = HashMap::new();
    for (slot, count) in histogram.iter() {
        let Some(object) = resolve(slot) else { continue };
        *areas.entry(object).or_insert(0.0) += count as f64 * pixel_area;
    }
    areas
}
