//! Deterministic numbers for the empire economy.
//!
//! Money, allocation ratios and galaxy-map positions are `I32F32` so that
//! two machines planning from the same snapshot reach the same decisions.
//! Battles run on `f64` in [`crate::kinematics`].

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Economy number: 32 integer bits, 32 fractional bits.
pub type Fixed = I32F32;

/// Position of a planet or fleet on the galaxy map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GalaxyPos {
    /// X coordinate.
    #[serde(with = "fixed_bits")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_bits")]
    pub y: Fixed,
}

/// Stores a [`Fixed`] as its raw `i64` bits so saves and state hashes are exact.
pub mod fixed_bits {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Write the raw bits.
    pub fn serialize<S: Serializer>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error> {
        value.to_bits().serialize(serializer)
    }

    /// Read the raw bits back.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Fixed, D::Error> {
        i64::deserialize(deserializer).map(Fixed::from_bits)
    }
}

impl GalaxyPos {
    /// The map origin.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Position from fixed coordinates.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Position from whole map units.
    #[must_use]
    pub fn from_ints(x: i32, y: i32) -> Self {
        Self::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    /// Straight-line distance, rounded down to the nearest fixed step.
    ///
    /// Computed on the raw bits in `u128`, so it is exact for whole-unit
    /// offsets and saturates at [`Fixed::MAX`] instead of overflowing.
    #[must_use]
    pub fn distance(self, other: Self) -> Fixed {
        let dx = (i128::from(self.x.to_bits()) - i128::from(other.x.to_bits())).unsigned_abs();
        let dy = (i128::from(self.y.to_bits()) - i128::from(other.y.to_bits())).unsigned_abs();
        // Squared bits carry 64 fractional bits; the root is back to 32.
        let squared = dx.saturating_mul(dx).saturating_add(dy.saturating_mul(dy));
        Fixed::from_bits(i64::try_from(isqrt(squared)).unwrap_or(i64::MAX))
    }
}

/// Floor square root.
fn isqrt(n: u128) -> u128 {
    if n < 2 {
        return n;
    }
    let bits = 128 - n.leading_zeros();
    let mut x = 1u128 << ((bits + 1) / 2);
    loop {
        let y = (x + n / x) / 2;
        if y >= x {
            return x;
        }
        x = y;
    }
}

/// Ratio `part / whole` clamped to `[0, 1]`; zero when `whole` is not positive.
#[must_use]
pub fn unit_ratio(part: Fixed, whole: Fixed) -> Fixed {
    if whole <= Fixed::ZERO || part <= Fixed::ZERO {
        return Fixed::ZERO;
    }
    if part >= whole {
        return Fixed::ONE;
    }
    part / whole
}
