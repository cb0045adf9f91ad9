//! Idle "breathing" motion applied to the overlay's vertical center.

use std::f64::consts::TAU;

/// Frame-driven oscillator phase.
///
/// Each tick advances the phase by `1 / speed` radians, i.e. the n-th tick
/// corresponds to `sin(n / speed)`. The phase is kept modulo 2π so it never
/// grows, which keeps the output exact over arbitrarily long sessions.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionPhase {
    radians: f64,
}

impl MotionPhase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Phase equivalent to `ticks` ticks at the given speed
    pub fn from_ticks(ticks: u64, speed: f32) -> Self {
        let mut phase = Self::new();
        phase.radians = (ticks as f64 / speed as f64).rem_euclid(TAU);
        phase
    }

    pub fn advance(&mut self, speed: f32) {
        self.radians = (self.radians + 1.0 / speed as f64).rem_euclid(TAU);
    }

    pub fn radians(&self) -> f64 {
        self.radians
    }

    /// Vertical offset in pixels, bounded by `amplitude`
    pub fn offset(&self, amplitude: f32) -> f32 {
        (self.radians.sin() * amplitude as f64) as f32
    }
}
