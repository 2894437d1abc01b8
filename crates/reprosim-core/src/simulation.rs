//! The simulation descriptor — one immutable span of ticks to advance.
//!
//! A `Simulation` is built fresh for every sub-step of an update: it names
//! the absolute reproductive tick the span starts at, how many ticks remain
//! in the whole update, and the per-subject seed. Trackers derive all their
//! randomness from it, which ties every draw to `(seed, absolute tick,
//! label)` instead of call order.

use reprosim_logic::rng::Draw;

/// An immutable description of one plan+simulate pass.
#[derive(Debug, Clone, Copy)]
pub struct Simulation {
    start_tick: u64,
    span: u64,
    seed: u64,
}

impl Simulation {
    /// `span` must be positive; the system boundary enforces this before
    /// any tracker sees the descriptor.
    pub fn new(start_tick: u64, span: u64, seed: u64) -> Self {
        debug_assert!(span > 0);
        Self {
            start_tick,
            span,
            seed,
        }
    }

    /// Absolute reproductive tick at which this span begins.
    pub fn start_tick(&self) -> u64 {
        self.start_tick
    }

    /// Remaining ticks in the enclosing update.
    pub fn span(&self) -> u64 {
        self.span
    }

    /// Absolute tick at which the enclosing update will end.
    pub fn end_tick(&self) -> u64 {
        self.start_tick + self.span
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// A draw keyed at the span's starting tick.
    pub fn draw(&self, label: &str) -> Draw {
        Draw::new(self.seed, self.start_tick, label)
    }

    /// A draw keyed at an explicit absolute tick within (or beyond) the span.
    pub fn draw_at(&self, tick: u64, label: &str) -> Draw {
        Draw::new(self.seed, tick, label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reprosim_logic::guide::NormalParam;

    #[test]
    fn boundaries() {
        let sim = Simulation::new(100, 50, 7);
        assert_eq!(sim.start_tick(), 100);
        assert_eq!(sim.span(), 50);
        assert_eq!(sim.end_tick(), 150);
    }

    #[test]
    fn draws_are_tick_keyed_not_span_keyed() {
        // The same absolute tick yields the same draw regardless of how the
        // enclosing update was sliced.
        let param = NormalParam::new(500.0, 50.0);
        let wide = Simulation::new(0, 1000, 9);
        let narrow = Simulation::new(0, 10, 9);
        assert_eq!(
            wide.draw_at(600, "x").normal(&param),
            narrow.draw_at(600, "x").normal(&param)
        );
    }
}
