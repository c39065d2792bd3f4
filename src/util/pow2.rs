//! Power-of-two rounding for wheel and pool sizing.
//!
//! Slot and pool counts are kept at powers of two so index arithmetic can use
//! a bitmask instead of division. Both `Wheel` and `WheelPool` size themselves
//! through this helper.

/// Round `n` up to the next power of two. Zero and one both map to one.
#[must_use]
pub fn ceil_pow2(n: usize) -> usize {
    n.max(1).next_power_of_two()
}
