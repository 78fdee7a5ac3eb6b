//! Binary exponential backoff

use rand::Rng;

use crate::core::{BackoffPolicy, MediumConstants};

/// Contention window for the given attempt number
///
/// `min(2^(log2(cw_min + 1) + attempt) - 1, cw_max)`, so with `cw_min = 3`
/// the window runs 3, 7, 15, 31, ... until capped.
pub fn contention_window(constants: &MediumConstants, attempt: u32) -> u32 {
    let base = constants.cw_min.saturating_add(1).ilog2();
    let exponent = base.saturating_add(attempt);
    let full = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
    let window = (full - 1).min(u64::from(constants.cw_max));
    // cw_max is a u32, so the capped window always fits
    window as u32
}

/// Number of slots to count down out of `window`
pub fn select_slots<R: Rng + ?Sized>(policy: BackoffPolicy, window: u32, rng: &mut R) -> u32 {
    match policy {
        BackoffPolicy::Max => window,
        BackoffPolicy::Random => rng.gen_range(0..=window),
    }
}
