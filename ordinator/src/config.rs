//! Sizing parameters of an [`Ordinator`][crate::Ordinator].

/// Sizing parameters of an [`Ordinator`][crate::Ordinator].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrdinatorConfig {
    /// Capacity of the small core, defaults to one page worth of keys.
    pub small_capacity: Option<usize>,
    /// Fill factor at which the small core transitions to a big core.
    pub small_fill_factor: f64,
    /// Fill factor at which a big core grows.
    pub big_fill_factor: f64,
}

impl Default for OrdinatorConfig {
    fn default() -> Self {
        Self {
            small_capacity: None,
            small_fill_factor: 0.6,
            big_fill_factor: 0.85,
        }
    }
}

impl OrdinatorConfig {
    /// Overrides the small core capacity.
    pub fn with_small_capacity(mut self, capacity: usize) -> Self {
        self.small_capacity = Some(capacity);
        self
    }

    /// Overrides the small core fill factor.
    pub fn with_small_fill_factor(mut self, fill_factor: f64) -> Self {
        self.small_fill_factor = fill_factor;
        self
    }

    /// Overrides the big core fill factor.
    pub fn with_big_fill_factor(mut self, fill_factor: f64) -> Self {
        self.big_fill_factor = fill_factor;
        self
    }

    /// Resolves the small core capacity for the given page size and checks all parameters.
    ///
    /// # Panics
    /// Panics when the capacity is not a power of two, does not fit into a single page of keys,
    /// or when a fill factor lies outside of `(0, 1)`.
    pub(crate) fn small_capacity_for(&self, page_size: usize) -> usize {
        let max_capacity = page_size / 8;
        let capacity = self.small_capacity.unwrap_or(max_capacity);
        assert!(
            capacity.is_power_of_two() && capacity <= max_capacity,
            "small capacity {capacity} must be a power of two not exceeding {max_capacity}"
        );
        for fill_factor in [self.small_fill_factor, self.big_fill_factor] {
            assert!(
                fill_factor > 0.0 && fill_factor < 1.0,
                "fill factor {fill_factor} outside of (0, 1)"
            );
        }
        capacity
    }
}

/// Size at which a core of `capacity` slots must transition or grow.
///
/// A core never holds `next_grow_size` entries, the insert that would reach it transitions or
/// grows first. This always leaves at least one empty slot.
pub(crate) fn next_grow_size(capacity: usize, fill_factor: f64) -> usize {
    ((capacity as f64 * fill_factor) as usize).max(1)
}
