//! Throwaway DNS names for issued certificates.

use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

/// Most names put on one certificate
pub const MAX_DOMAINS: usize = 100;

/// Generate between 1 and [`MAX_DOMAINS`] names below `base_domain`.
///
/// Each name is `r<unix seconds>z<hex nonce>.<base_domain>`.
pub fn generate_domains<R: Rng>(base_domain: &str, rng: &mut R) -> Vec<String> {
    let count = rng.gen_range(1..=MAX_DOMAINS);
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    (0..count)
        .map(|_| format!("r{now}z{:x}.{base_domain}", rng.gen_range(0..=u64::MAX >> 1)))
        .collect()
}
