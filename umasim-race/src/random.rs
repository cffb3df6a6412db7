//! Deterministic pseudo-random streams.
//!
//! Every randomized decision in the simulator (trigger sampling, last spurt
//! acceptance, pace-down exit distances, skill activation chances) draws from
//! a [`Rule30CARng`]. The generator is a circular 64-bit Wolfram rule 30
//! automaton; forking a stream is a plain copy of its two state words.

/// Source of randomness shared by sample policies, the HP policy and solvers.
pub trait Prng {
    /// Draw a raw 32-bit word.
    fn int32(&mut self) -> u32;
    /// Draw a float in `[0, 1)`.
    fn random(&mut self) -> f64;
    /// Draw an integer in `[0, upper)` without modulo bias.
    fn uniform(&mut self, upper: u32) -> u32;
}

const MASK_HI: u32 = 0x03ff_ffff;
const MASK_LO: u32 = 0x07ff_ffff;
const EXP: f64 = 134_217_728.0; // 2^27
const MANT: f64 = 9_007_199_254_740_992.0; // 2^53

/// Rule 30 cellular automaton generator over a circular 64-bit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule30CARng {
    lo: u32,
    hi: u32,
}

impl Rule30CARng {
    /// Seed the low word, leaving the high word zero.
    #[must_use]
    pub const fn new(seed_lo: u32) -> Self {
        Self::with_state(seed_lo, 0)
    }

    #[must_use]
    pub const fn with_state(lo: u32, hi: u32) -> Self {
        Self { lo, hi }
    }

    #[must_use]
    pub const fn lo(&self) -> u32 {
        self.lo
    }

    #[must_use]
    pub const fn hi(&self) -> u32 {
        self.hi
    }

    /// Advance the automaton by one generation.
    pub fn step(&mut self) {
        let rolhi = (self.hi << 1) | (self.lo >> 31);
        let rollo = (self.lo << 1) | (self.hi >> 31);
        let rorhi = (self.hi >> 1) | (self.lo << 31);
        let rorlo = (self.lo >> 1) | (self.hi << 31);

        self.hi = rorhi ^ (self.hi | rolhi);
        self.lo = rorlo ^ (self.lo | rollo);
    }

    /// Build two words at once, two bits of each per generation over 16 generations.
    pub fn pair(&mut self) -> (u32, u32) {
        let mut x = 0_u32;
        let mut y = 0_u32;
        for _ in 0..16 {
            x = (x << 2) | ((self.hi & 0x1_0000) >> 15) | (self.hi & 1);
            y = (y << 2) | ((self.hi & 0x100_0000) >> 23) | ((self.hi & 0x100) >> 8);
            self.step();
        }
        (x, y)
    }
}

impl Prng for Rule30CARng {
    fn int32(&mut self) -> u32 {
        self.pair().0
    }

    fn random(&mut self) -> f64 {
        let (hi, lo) = self.pair();
        (f64::from(hi & MASK_HI) * EXP + f64::from(lo & MASK_LO)) / MANT
    }

    fn uniform(&mut self, upper: u32) -> u32 {
        if upper == 0 {
            return 0;
        }
        let mask = u32::MAX >> ((upper - 1) | 1).leading_zeros();
        loop {
            let n = self.int32() & mask;
            if n < upper {
                return n;
            }
        }
    }
}

impl rand::RngCore for Rule30CARng {
    fn next_u32(&mut self) -> u32 {
        self.int32()
    }

    fn next_u64(&mut self) -> u64 {
        let (x, y) = self.pair();
        (u64::from(x) << 32) | u64::from(y)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = self.int32().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}
