//! Deterministic random-value library.
//!
//! Every draw in the simulation is keyed by `(system seed, absolute tick,
//! label)` rather than by global call order: repeating a run with the same
//! seed and the same tick boundaries reproduces every outcome, no matter how
//! the surrounding update was sliced into sub-steps.
//!
//! Draws go through a [`Draw`] key that derives a dedicated `ChaCha8Rng`
//! stream per (seed, tick, label) triple.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use crate::guide::{NormalParam, WeightedTable};

/// FNV-1a over the label bytes; stable across runs and platforms.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// splitmix64 finalizer — spreads the combined key over the full seed space.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// A single draw site: system seed + absolute reproductive tick + label.
///
/// The label is a stable string naming the draw site (e.g.
/// `"cycle.follicular"`). Per-instance draws (one ovum out of several) add
/// an index via [`Draw::index`].
#[derive(Debug, Clone, Copy)]
pub struct Draw {
    system_seed: u64,
    tick: u64,
    discriminant: u64,
}

impl Draw {
    pub fn new(system_seed: u64, tick: u64, label: &str) -> Self {
        Self {
            system_seed,
            tick,
            discriminant: fnv1a(label.as_bytes()),
        }
    }

    /// Derive a sub-draw for the `i`-th instance at this site.
    pub fn index(self, i: u64) -> Self {
        let mut state = i ^ 0xa076_1d64_78bd_642f;
        Self {
            discriminant: self.discriminant ^ splitmix64(&mut state),
            ..self
        }
    }

    fn rng(self) -> ChaCha8Rng {
        let mut state = self
            .system_seed
            .wrapping_mul(0x9e37_79b9_7f4a_7c15)
            ^ self.tick.rotate_left(32)
            ^ self.discriminant;
        let mut seed = [0u8; 32];
        for chunk in seed.chunks_exact_mut(8) {
            chunk.copy_from_slice(&splitmix64(&mut state).to_le_bytes());
        }
        ChaCha8Rng::from_seed(seed)
    }

    /// Sample a normal distribution, clamped to be non-negative.
    ///
    /// A non-positive standard deviation degenerates to the mean.
    pub fn normal(self, param: &NormalParam) -> f64 {
        if param.std_dev <= 0.0 {
            return param.mean.max(0.0);
        }
        let mut rng = self.rng();
        match Normal::new(param.mean, param.std_dev) {
            Ok(dist) => dist.sample(&mut rng).max(0.0),
            Err(_) => param.mean.max(0.0),
        }
    }

    /// Sample a normal distribution and round to whole ticks.
    pub fn normal_ticks(self, param: &NormalParam) -> u64 {
        self.normal(param).round() as u64
    }

    /// Bernoulli draw with probability `p` (clamped to [0, 1]).
    pub fn chance(self, p: f64) -> bool {
        if p <= 0.0 {
            return false;
        }
        if p >= 1.0 {
            return true;
        }
        self.rng().gen::<f64>() < p
    }

    /// Draw a value from a discrete weighted table.
    ///
    /// Returns `None` when the table is empty or its total weight is not
    /// positive.
    pub fn weighted(self, table: &WeightedTable) -> Option<u32> {
        let total: f64 = table.entries.iter().map(|e| e.weight.max(0.0)).sum();
        if total <= 0.0 {
            return None;
        }
        let mut roll = self.rng().gen::<f64>() * total;
        for entry in &table.entries {
            let w = entry.weight.max(0.0);
            if roll < w {
                return Some(entry.value);
            }
            roll -= w;
        }
        table.entries.last().map(|e| e.value)
    }
}
