//! Simulated market feed.
//!
//! Price series: `base · (1 + A·sin(2πt/P) + ε)` with ε uniform in
//! ±NOISE_SPAN, clamped to a positive floor. Identical seeds produce
//! identical series. No network, no live data.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Peak-to-trough swing of the sinusoidal component.
const AMPLITUDE: f64 = 0.05;

/// Half-width of the uniform noise term.
const NOISE_SPAN: f64 = 0.02;

/// Ticks per full sine period.
const PERIOD: f64 = 64.0;

/// Prices never fall below this fraction of base.
const FLOOR_FRACTION: f64 = 0.01;

/// Derive a feed seed from a ticker symbol (FNV-1a).
pub fn seed_for_symbol(symbol: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in symbol.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

pub struct MarketFeed {
    rng: SmallRng,
    base: f64,
    tick: u64,
}

impl MarketFeed {
    pub fn new(symbol: &str, base: f64) -> Self {
        Self::from_seed(seed_for_symbol(symbol), base)
    }

    pub fn from_seed(seed: u64, base: f64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            base,
            tick: 0,
        }
    }

    /// Next price in the series. Always positive.
    pub fn next_price(&mut self) -> f64 {
        let phase = (self.tick as f64) * std::f64::consts::TAU / PERIOD;
        self.tick += 1;
        let noise = (self.rng.random::<f64>() * 2.0 - 1.0) * NOISE_SPAN;
        let price = self.base * (1.0 + AMPLITUDE * phase.sin() + noise);
        price.max(self.base * FLOOR_FRACTION)
    }

    /// Next "field signature" sample, bounded to [-1, 1].
    pub fn next_signature(&mut self) -> f64 {
        let phase = (self.tick as f64) * std::f64::consts::TAU / PERIOD;
        let jitter = self.rng.random::<f64>() * 2.0 - 1.0;
        (phase.cos() * 0.7 + jitter * 0.3).clamp(-1.0, 1.0)
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }
}
