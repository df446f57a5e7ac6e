//! Per-item bookkeeping shared by the Landlord managers.

use super::divider::Divider;
use super::CREDIT_REFRESH_GAIN;

/// A cached item with its size, cost and remaining credit.
#[derive(Debug)]
pub(super) struct Entry<T, D> {
    pub(super) item: T,
    pub(super) size: usize,
    pub(super) cost: f32,
    pub(super) credit: f32,
    /// Insertion order; breaks density ties.
    pub(super) seq: u64,
    divider: D,
}

impl<T, D: Divider> Entry<T, D> {
    pub(super) fn new(item: T, size: usize, cost: f32, seq: u64) -> Self {
        debug_assert!(size > 0, "cache entries must have a size");
        debug_assert!(cost >= 0.0, "negative cost {cost}");
        Self {
            item,
            size,
            cost,
            credit: cost,
            seq,
            divider: D::new(size),
        }
    }

    #[inline]
    pub(super) fn density(&self) -> f32 {
        self.density_at(self.credit)
    }

    #[inline]
    pub(super) fn density_at(&self, credit: f32) -> f32 {
        self.divider.density(credit, self.size)
    }

    /// Rent for one eviction pass.
    #[inline]
    pub(super) fn charge(&mut self, mcd: f32) {
        self.credit = (self.credit - mcd * self.size as f32).max(0.0);
    }

    /// Credit after an access, given the current credit. Never lower than
    /// `credit`.
    #[inline]
    pub(super) fn refreshed(&self, credit: f32) -> f32 {
        (CREDIT_REFRESH_GAIN * self.cost + (1.0 - CREDIT_REFRESH_GAIN) * credit).max(credit)
    }
}
