//! Saturating gas counter.

use std::fmt;

/// Remaining gas. Never goes below zero; running out is an outcome, not an error.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Gas(u64);

impl Gas {
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn is_exhausted(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn can_afford(self, cost: u64) -> bool {
        self.0 >= cost
    }

    /// Deduct `cost`; returns false (and clamps to zero) when it was not affordable.
    pub fn charge(&mut self, cost: u64) -> bool {
        let affordable = self.can_afford(cost);
        self.0 = self.0.saturating_sub(cost);
        affordable
    }

    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }
}

impl From<u64> for Gas {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Gas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
