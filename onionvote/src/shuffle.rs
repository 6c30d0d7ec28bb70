use crate::Error;
use rand::seq::SliceRandom;
use rand::rngs::OsRng;
use rand::{CryptoRng, Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Shuffle a batch with a generator seeded from the OS for this call only.
pub fn shuffle<T>(batch: &mut [T]) -> Result<(), Error> {
    let rng = ChaCha20Rng::from_rng(OsRng)?;
    shuffle_with(rng, batch);
    Ok(())
}

/// Shuffle a batch with the given generator, consuming it.
pub fn shuffle_with<R: Rng + CryptoRng, T>(mut rng: R, batch: &mut [T]) {
    batch.shuffle(&mut rng);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shuffle_keeps_entries() {
        let mut batch = vec![10, 20, 30, 40, 50];
        shuffle(&mut batch).unwrap();

        batch.sort();
        assert_eq!(batch, vec![10, 20, 30, 40, 50]);

        let mut empty: Vec<u8> = vec![];
        shuffle(&mut empty).unwrap();
    }

    #[test]
    fn test_injected_seed_is_reproducible() {
        let mut a: Vec<u32> = (0..32).collect();
        let mut b = a.clone();

        shuffle_with(ChaCha20Rng::seed_from_u64(7), &mut a);
        shuffle_with(ChaCha20Rng::seed_from_u64(7), &mut b);
        assert_eq!(a, b);

        shuffle_with(ChaCha20Rng::seed_from_u64(8), &mut b);
        assert_ne!(a, b);
    }

    // Chi-square over the input-position to output-position frequency table
    #[test]
    fn test_shuffle_is_uniform() {
        const N: usize = 4;
        const TRIALS: u64 = 8000;

        let mut counts = [[0u64; N]; N];
        for seed in 0..TRIALS {
            let mut batch: Vec<usize> = (0..N).collect();
            shuffle_with(ChaCha20Rng::seed_from_u64(seed), &mut batch);
            for (position, input) in batch.iter().enumerate() {
                counts[*input][position] += 1;
            }
        }

        let expected = TRIALS as f64 / N as f64;
        let chi_square: f64 = counts
            .iter()
            .flat_map(|row| row.iter())
            .map(|&observed| {
                let diff = observed as f64 - expected;
                diff * diff / expected
            })
            .sum();

        // (N-1)^2 = 9 degrees of freedom, 27.88 is the 0.999 quantile
        assert!(chi_square < 27.88, "chi-square {} too large", chi_square);
    }
}
