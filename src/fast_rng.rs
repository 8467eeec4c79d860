// Per-history random number stream
//
// A 64-bit LCG with a PCG RXS-M-XS output permutation. The whole state is a
// single u64, so a stream can be created per sampled history without
// allocation, and jumping to any history's stream is O(log n).

use rand::{RngCore, SeedableRng};

const LCG_MULTIPLIER: u64 = 6364136223846793005;
const LCG_INCREMENT: u64 = 1442695040888963407;
const OUTPUT_MULTIPLIER: u64 = 12605985483714917081;

/// Number of LCG steps reserved for each history.
pub const HISTORY_STRIDE: u64 = 152917;

/// Lightweight PCG-LCG generator.
///
/// Implements `RngCore`, so it can be handed to every `sample` method that
/// takes `R: Rng + ?Sized`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FastRng {
    state: u64,
}

impl FastRng {
    #[inline]
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Stream for history `history_index`, offset `history_index * HISTORY_STRIDE`
    /// steps from `seed`. Results depend only on `(seed, history_index)`,
    /// never on which thread runs the history.
    pub fn for_history(seed: u64, history_index: u64) -> Self {
        let mut rng = Self::new(seed);
        rng.advance(history_index.wrapping_mul(HISTORY_STRIDE));
        rng
    }

    /// Skip `steps` draws in O(log steps).
    pub fn advance(&mut self, mut steps: u64) {
        let (mut multiplier, mut increment) = (LCG_MULTIPLIER, LCG_INCREMENT);
        let (mut total_multiplier, mut total_increment) = (1u64, 0u64);
        while steps > 0 {
            if steps & 1 == 1 {
                total_multiplier = total_multiplier.wrapping_mul(multiplier);
                total_increment = total_increment
                    .wrapping_mul(multiplier)
                    .wrapping_add(increment);
            }
            increment = multiplier.wrapping_add(1).wrapping_mul(increment);
            multiplier = multiplier.wrapping_mul(multiplier);
            steps >>= 1;
        }
        self.state = total_multiplier
            .wrapping_mul(self.state)
            .wrapping_add(total_increment);
    }

    /// Uniform variate in [0, 1).
    #[inline(always)]
    pub fn random(&mut self) -> f64 {
        // 2^-64
        (self.next_u64() as f64) * 5.421010862427522e-20
    }

    #[inline]
    pub fn reseed(&mut self, seed: u64) {
        self.state = seed;
    }

    #[inline(always)]
    fn step(&mut self) -> u64 {
        self.state = LCG_MULTIPLIER
            .wrapping_mul(self.state)
            .wrapping_add(LCG_INCREMENT);
        let word = ((self.state >> ((self.state >> 59) + 5)) ^ self.state)
            .wrapping_mul(OUTPUT_MULTIPLIER);
        (word >> 43) ^ word
    }
}

impl SeedableRng for FastRng {
    type Seed = [u8; 8];

    fn from_seed(seed: Self::Seed) -> Self {
        Self::new(u64::from_le_bytes(seed))
    }
}

impl RngCore for FastRng {
    #[inline(always)]
    fn next_u32(&mut self) -> u32 {
        (self.step() >> 32) as u32
    }

    #[inline(always)]
    fn next_u64(&mut self) -> u64 {
        self.step()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.step().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}
