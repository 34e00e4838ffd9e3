//! Delay jitter without pulling in the rand crate.

use std::time::Duration;

/// Spread `delay` uniformly over `delay * (1 ± fraction)`.
///
/// `fraction` is clamped to `0.0..=1.0`; zero returns `delay` unchanged.
pub fn jittered(delay: Duration, fraction: f64) -> Duration {
    let fraction = fraction.clamp(0.0, 1.0);
    if fraction == 0.0 || delay.is_zero() {
        return delay;
    }
    let factor = 1.0 - fraction + rand_factor() * 2.0 * fraction;
    Duration::from_secs_f64(delay.as_secs_f64() * factor)
}

/// Pseudo-random factor in [0, 1).
fn rand_factor() -> f64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
        .hash(&mut hasher);
    std::thread::current().id().hash(&mut hasher);

    let hash = hasher.finish();
    (hash % 10_000) as f64 / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_fraction_is_identity() {
        let delay = Duration::from_secs(5);
        assert_eq!(jittered(delay, 0.0), delay);
        assert_eq!(jittered(Duration::ZERO, 0.5), Duration::ZERO);
    }

    #[test]
    fn stays_within_band() {
        let delay = Duration::from_millis(1_000);
        for _ in 0..50 {
            let value = jittered(delay, 0.1);
            assert!(value >= Duration::from_millis(900), "{value:?}");
            assert!(value <= Duration::from_millis(1_100), "{value:?}");
        }
    }
}
