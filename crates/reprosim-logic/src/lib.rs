//! Pure reproductive-simulation logic for ReproSim.
//!
//! This crate contains the domain math that is independent of any engine or
//! runtime: guide parameter bundles, the deterministic random-value library,
//! and curve sampling. Functions take plain data and return results, making
//! them unit-testable and portable.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`constants`] | Tracker/effect/handler identifiers, tick units |
//! | [`curve`] | Piecewise-linear curves, fertilization-probability curve |
//! | [`guide`] | Guide parameter bundles and subject profiles |
//! | [`rng`] | Deterministic seeded draws (normal, weighted, chance) |

pub mod constants;
pub mod curve;
pub mod guide;
pub mod rng;
