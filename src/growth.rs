use core::fmt;

/// How much a [`PinnedVec`](crate::PinnedVec) grows its capacity by when it
/// runs out, as the fraction `num / den`.
///
/// ## Example
///
/// ```
/// use pinned_vec::GrowthFactor;
/// let g = GrowthFactor::new(3, 2);
/// assert_eq!(g.apply(100), 150);
/// assert_eq!(GrowthFactor::default(), GrowthFactor::DOUBLE);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct GrowthFactor {
    num: usize,
    den: usize,
}

impl GrowthFactor {
    /// Doubling, the default.
    pub const DOUBLE: GrowthFactor = GrowthFactor::new(2, 1);

    /// ## Notes
    ///
    /// Panics unless `num / den` is strictly greater than one.
    pub const fn new(num: usize, den: usize) -> Self {
        assert!(den > 0, "growth factor denominator must be nonzero");
        assert!(num > den, "growth factor must be greater than 1");
        GrowthFactor { num, den }
    }

    #[inline(always)]
    pub fn numerator(self) -> usize { self.num }

    #[inline(always)]
    pub fn denominator(self) -> usize { self.den }

    /// Scales a capacity, saturating.
    #[inline(always)]
    pub fn apply(self, capacity: usize) -> usize { capacity.saturating_mul(self.num) / self.den }
}

impl Default for GrowthFactor {
    #[inline(always)]
    fn default() -> Self { GrowthFactor::DOUBLE }
}

impl fmt::Debug for GrowthFactor {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "GrowthFactor[{}/{}]", self.num, self.den)
    }
}
