//! Credit density strategies.

/// Computes `credit / size` for one entry. Constructed once per entry so
/// implementations can precompute per-size state.
pub trait Divider: Copy {
    fn new(size: usize) -> Self;
    fn density(&self, credit: f32, size: usize) -> f32;
}

/// Plain division on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct DividerNaive;

impl Divider for DividerNaive {
    fn new(_size: usize) -> Self {
        Self
    }

    #[inline]
    fn density(&self, credit: f32, size: usize) -> f32 {
        credit / size as f32
    }
}

/// Multiplies by a reciprocal computed when the entry is created.
#[derive(Debug, Clone, Copy)]
pub struct DividerRecip {
    recip: f32,
}

impl Divider for DividerRecip {
    fn new(size: usize) -> Self {
        Self {
            recip: 1.0 / size as f32,
        }
    }

    #[inline]
    fn density(&self, credit: f32, _size: usize) -> f32 {
        credit * self.recip
    }
}
