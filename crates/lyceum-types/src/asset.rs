use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// 100% in basis points. All protocol percentages use this scale.
pub const FULL_PERCENT: u16 = 10_000;

/// One percent in basis points.
pub const ONE_PERCENT: u16 = FULL_PERCENT / 100;

/// A signed token amount.
///
/// The same scalar type carries the liquid currency, common (vesting) tokens,
/// and discipline-scoped expertise; the conservation pools they belong to are
/// tracked by the chain state, not the type. Arithmetic that could overflow
/// in consensus code goes through the checked helpers; plain `+`/`-` panic on
/// overflow, which is the desired behavior for invariant breakage.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Tokens(i64);

impl Tokens {
    pub const ZERO: Tokens = Tokens(0);

    pub const fn new(amount: i64) -> Self {
        Self(amount)
    }

    pub const fn amount(self) -> i64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Tokens) -> Result<Tokens, TypeError> {
        self.0
            .checked_add(other.0)
            .map(Tokens)
            .ok_or(TypeError::AmountOverflow)
    }

    pub fn checked_sub(self, other: Tokens) -> Result<Tokens, TypeError> {
        self.0
            .checked_sub(other.0)
            .map(Tokens)
            .ok_or(TypeError::AmountOverflow)
    }

    pub fn min(self, other: Tokens) -> Tokens {
        Tokens(self.0.min(other.0))
    }
}

/// `amount * numerator / denominator` widened through i128, floor division.
///
/// Every proportional split in the reward engine goes through this single
/// helper so rounding behavior is uniform: floor, remainder left behind.
pub fn multiply_ratio(amount: i64, numerator: i64, denominator: i64) -> i64 {
    assert!(denominator != 0, "ratio with zero denominator");
    let wide = i128::from(amount) * i128::from(numerator) / i128::from(denominator);
    i64::try_from(wide).expect("ratio result exceeds i64")
}

/// `percent` basis points of `amount` (floor).
pub fn percent_of(amount: i64, percent: u16) -> i64 {
    multiply_ratio(amount, i64::from(percent), i64::from(FULL_PERCENT))
}

/// Validates a basis-point percentage field.
pub fn validate_percent(percent: u16) -> Result<(), TypeError> {
    if percent > FULL_PERCENT {
        return Err(TypeError::PercentOutOfRange(percent));
    }
    Ok(())
}

impl Add for Tokens {
    type Output = Tokens;
    fn add(self, other: Tokens) -> Tokens {
        Tokens(self.0 + other.0)
    }
}

impl AddAssign for Tokens {
    fn add_assign(&mut self, other: Tokens) {
        self.0 += other.0;
    }
}

impl Sub for Tokens {
    type Output = Tokens;
    fn sub(self, other: Tokens) -> Tokens {
        Tokens(self.0 - other.0)
    }
}

impl SubAssign for Tokens {
    fn sub_assign(&mut self, other: Tokens) {
        self.0 -= other.0;
    }
}

impl Neg for Tokens {
    type Output = Tokens;
    fn neg(self) -> Tokens {
        Tokens(-self.0)
    }
}

impl Sum for Tokens {
    fn sum<I: Iterator<Item = Tokens>>(iter: I) -> Tokens {
        iter.fold(Tokens::ZERO, |acc, t| acc + t)
    }
}

impl fmt::Debug for Tokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tokens({})", self.0)
    }
}

impl fmt::Display for Tokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_is_exact() {
        let a = Tokens::new(100);
        let b = Tokens::new(40);
        assert_eq!((a + b).amount(), 140);
        assert_eq!((a - b).amount(), 60);
        assert_eq!((-b).amount(), -40);
    }

    #[test]
    fn checked_add_detects_overflow() {
        let a = Tokens::new(i64::MAX);
        assert!(a.checked_add(Tokens::new(1)).is_err());
        assert!(a.checked_add(Tokens::new(0)).is_ok());
    }

    #[test]
    fn percent_of_floors() {
        assert_eq!(percent_of(100, FULL_PERCENT), 100);
        assert_eq!(percent_of(100, ONE_PERCENT), 1);
        // 5% of 99 = 4.95 -> 4
        assert_eq!(percent_of(99, 5 * ONE_PERCENT), 4);
        assert_eq!(percent_of(0, FULL_PERCENT), 0);
    }

    #[test]
    fn multiply_ratio_widens_through_i128() {
        // i64 multiplication would overflow here; the i128 path must not.
        let big = i64::MAX / 2;
        assert_eq!(multiply_ratio(big, 2, 2), big);
    }

    #[test]
    fn validate_percent_bounds() {
        assert!(validate_percent(0).is_ok());
        assert!(validate_percent(FULL_PERCENT).is_ok());
        assert!(validate_percent(FULL_PERCENT + 1).is_err());
    }

    #[test]
    fn sum_of_tokens() {
        let total: Tokens = [1, 2, 3].iter().map(|v| Tokens::new(*v)).sum();
        assert_eq!(total.amount(), 6);
    }

    mod props {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            /// A proportional split never exceeds the amount being split and
            /// never flips its sign.
            #[test]
            fn prop_ratio_share_is_bounded(
                amount in 0i64..1_000_000_000_000,
                numerator in 0i64..1_000_000,
                denominator in 1i64..1_000_000,
            ) {
                prop_assume!(numerator <= denominator);
                let share = multiply_ratio(amount, numerator, denominator);
                prop_assert!(share >= 0);
                prop_assert!(share <= amount);
            }

            /// Splitting by complementary percentages leaves at most the
            /// rounding remainder behind, never mints.
            #[test]
            fn prop_percent_split_conserves(
                amount in 0i64..1_000_000_000_000,
                percent in 0u16..=FULL_PERCENT,
            ) {
                let cut = percent_of(amount, percent);
                let rest = percent_of(amount, FULL_PERCENT - percent);
                prop_assert!(cut + rest <= amount);
                // Floor loses less than one unit per division.
                prop_assert!(amount - (cut + rest) <= 1);
            }
        }
    }
}
