//! Proportional sample scaling with randomized rounding.

use rand_chacha::ChaCha8Rng;
use rand_core::{RngCore, SeedableRng};

use crate::StackToSampleCount;

/// Scaler RNG: seeded when a seed is configured, from OS entropy otherwise.
pub fn scale_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}

/// Multiplies every count by `ratio`.
///
/// Each scaled count is rounded up with probability equal to its fractional
/// part, so the expected total equals `ratio * stacks.total()`. Stacks that
/// round to zero are dropped.
pub fn scale_sample_counts<R: RngCore + ?Sized>(
    stacks: StackToSampleCount,
    ratio: f64,
    rng: &mut R,
) -> StackToSampleCount {
    if ratio == 1.0 {
        return stacks;
    }

    let mut scaled = StackToSampleCount::new();
    for (stack, count) in stacks {
        let new_count = count as f64 * ratio;
        let scaled_value = if unit_f64(rng) < new_count.fract() {
            new_count.ceil()
        } else {
            new_count.floor()
        } as u64;
        if scaled_value != 0 {
            scaled.add(stack, scaled_value);
        }
    }
    scaled
}

/// Uniform draw in `[0, 1)` from the top 53 bits.
fn unit_f64<R: RngCore + ?Sized>(rng: &mut R) -> f64 {
    (rng.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StackToSampleCount {
        [("a;b", 7), ("a;c", 3), ("a;d", 1), ("e", 13)].into_iter().collect()
    }

    #[test]
    fn ratio_one_is_identity() {
        let mut rng = scale_rng(Some(1));
        assert_eq!(scale_sample_counts(sample(), 1.0, &mut rng), sample());
    }

    #[test]
    fn integer_ratio_is_exact() {
        let mut rng = scale_rng(Some(2));
        let scaled = scale_sample_counts(sample(), 10.0, &mut rng);
        assert_eq!(scaled.get("a;b"), Some(70));
        assert_eq!(scaled.get("e"), Some(130));
        assert_eq!(scaled.total(), 240);
    }

    #[test]
    fn zero_ratio_drops_everything() {
        let mut rng = scale_rng(Some(3));
        assert!(scale_sample_counts(sample(), 0.0, &mut rng).is_empty());
    }

    #[test]
    fn same_seed_gives_same_result() {
        let a = scale_sample_counts(sample(), 0.37, &mut scale_rng(Some(42)));
        let b = scale_sample_counts(sample(), 0.37, &mut scale_rng(Some(42)));
        assert_eq!(a, b);
    }

    #[test]
    fn rounding_error_is_bounded_and_never_zero() {
        let input = sample();
        let entries = input.len() as f64;
        for seed in 0..200 {
            for ratio in [0.05, 0.3, 0.5, 1.7, 2.25] {
                let scaled = scale_sample_counts(input.clone(), ratio, &mut scale_rng(Some(seed)));
                let expected = ratio * input.total() as f64;
                assert!((scaled.total() as f64 - expected).abs() <= entries);
                assert!(scaled.iter().all(|(_, count)| count > 0));
            }
        }
    }

    #[test]
    fn rounding_is_unbiased_over_many_trials() {
        let input: StackToSampleCount = (0..50).map(|i| (format!("s{i}"), 1u64)).collect();
        let ratio = 0.3;
        let trials = 2_000u64;
        let mut rng = scale_rng(Some(7));
        let mut sum = 0u64;
        for _ in 0..trials {
            sum += scale_sample_counts(input.clone(), ratio, &mut rng).total();
        }
        let mean = sum as f64 / trials as f64;
        assert!((mean - 15.0).abs() < 0.5, "mean {mean}");
    }
}
