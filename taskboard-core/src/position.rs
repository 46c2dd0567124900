//! Sparse ordering keys.
//!
//! Tasks are ordered by a numeric `position` that is never an array index.
//! Inserting computes one new key from the neighbours and leaves them alone;
//! only when two adjacent keys get closer than `min_gap` is a column
//! compacted back to evenly spaced values.

use crate::config::EngineConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Allocation {
    Position(f64),
    /// No key with enough headroom exists at this index; the column has to
    /// be compacted first.
    Degenerate,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionAllocator {
    default_position: f64,
    gap: f64,
    min_gap: f64,
}

impl Default for PositionAllocator {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl PositionAllocator {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            default_position: config.default_position,
            gap: config.gap,
            min_gap: config.min_gap,
        }
    }

    /// Key for an item inserted at `index` into `neighbors` (sorted ascending,
    /// the moved item already excluded). Indices past the end append.
    pub fn allocate(&self, neighbors: &[f64], index: usize) -> Allocation {
        let (Some(&first), Some(&last)) = (neighbors.first(), neighbors.last()) else {
            return Allocation::Position(self.default_position);
        };
        let index = index.min(neighbors.len());

        let candidate = if index == 0 {
            first - self.gap
        } else if index == neighbors.len() {
            last + self.gap
        } else {
            (neighbors[index - 1] + neighbors[index]) / 2.0
        };

        let lower = index.checked_sub(1).map(|i| neighbors[i]);
        let upper = neighbors.get(index).copied();
        let cramped = lower.is_some_and(|l| candidate - l < self.min_gap)
            || upper.is_some_and(|u| u - candidate < self.min_gap);

        if !candidate.is_finite() || cramped {
            Allocation::Degenerate
        } else {
            Allocation::Position(candidate)
        }
    }

    /// Key for appending to a column.
    pub fn append(&self, neighbors: &[f64]) -> Allocation {
        self.allocate(neighbors, neighbors.len())
    }

    /// Evenly spaced keys for a column of `count` items: gap, 2*gap, ...
    pub fn spread(&self, count: usize) -> Vec<f64> {
        (1..=count).map(|i| i as f64 * self.gap).collect()
    }

    /// True when some adjacent pair is already closer than `min_gap`
    /// (including exact ties).
    pub fn is_cramped(&self, positions: &[f64]) -> bool {
        positions.windows(2).any(|w| w[1] - w[0] < self.min_gap)
    }
}
