//! U256 fixed-point helpers shared by the Tracker and the Liquidator.
//!
//! Keeps arithmetic in native `U256` wherever possible, only dropping to
//! `f64` at the edges that genuinely need it: the gas-price formula's
//! `exp()` and config-supplied fractional thresholds.

use alloy::primitives::U256;

/// WAD constant: 1e18, the liquidation-boundary unit for health factors
/// and the fixed-point scale for all numéraire amounts (spec §3).
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000u64, 0, 0, 0]);

/// Pre-computed powers of 10 for fast decimal conversion.
const POW10: [u128; 39] = [
    1,
    10,
    100,
    1_000,
    10_000,
    100_000,
    1_000_000,
    10_000_000,
    100_000_000,
    1_000_000_000,
    10_000_000_000,
    100_000_000_000,
    1_000_000_000_000,
    10_000_000_000_000,
    100_000_000_000_000,
    1_000_000_000_000_000,
    10_000_000_000_000_000,
    100_000_000_000_000_000,
    1_000_000_000_000_000_000,
    10_000_000_000_000_000_000,
    100_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000_000_000,
];

/// Fast power of 10 lookup (up to 10^38), used to scale by `10^decimals`
/// in every reward/selection formula (spec §9's flagged source bug: the
/// raw `decimals` integer must never stand in for this).
#[inline(always)]
pub fn pow10(exp: u8) -> U256 {
    if exp < 39 {
        U256::from(POW10[exp as usize])
    } else {
        U256::from(10u64).pow(U256::from(exp))
    }
}

/// Convert WAD (18 decimals) to f64. Display/logging and the gas-price
/// formula's `exp()` input only, never further on-chain computation.
#[inline(always)]
pub fn wad_to_f64(wad: U256) -> f64 {
    if wad <= U256::from(u128::MAX) {
        let value: u128 = wad.to();
        value as f64 / 1e18
    } else {
        let limbs = wad.as_limbs();
        let high = limbs[1] as f64 * (u64::MAX as f64 + 1.0);
        let low = limbs[0] as f64;
        (high + low) / 1e18
    }
}

/// Convert a config-supplied fraction (e.g. `1e-4`, `1.01`) to WAD.
#[inline(always)]
pub fn f64_to_wad(value: f64) -> U256 {
    if value <= 0.0 {
        return U256::ZERO;
    }
    U256::from((value * 1e18) as u128)
}

/// Safe minimum of two U256 values.
#[inline(always)]
pub fn min(a: U256, b: U256) -> U256 {
    if a < b {
        a
    } else {
        b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pow10_lookup_matches_naive_pow() {
        assert_eq!(pow10(0), U256::from(1u64));
        assert_eq!(pow10(6), U256::from(1_000_000u64));
        assert_eq!(pow10(18), U256::from(1_000_000_000_000_000_000u64));
    }

    #[test]
    fn wad_to_f64_roundtrips_small_values() {
        let wad = U256::from(1000u64) * WAD;
        let value = wad_to_f64(wad);
        assert!((value - 1000.0).abs() < 0.001);
    }

    #[test]
    fn f64_to_wad_rejects_non_positive() {
        assert_eq!(f64_to_wad(0.0), U256::ZERO);
        assert_eq!(f64_to_wad(-1.0), U256::ZERO);
    }

    #[test]
    fn min_picks_the_smaller_value() {
        assert_eq!(min(U256::from(3u64), U256::from(5u64)), U256::from(3u64));
        assert_eq!(min(U256::from(5u64), U256::from(3u64)), U256::from(3u64));
    }
}
