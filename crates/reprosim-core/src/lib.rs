//! ReproSim engine — reproductive-cycle simulation for game characters.
//!
//! Each subject owns a [`system::ReproductiveSystem`] composed of pluggable
//! trackers (cycle, ovum, sperm, pregnancy, effect/handler containers).
//! Time advances on an internal reproductive clock decoupled from external
//! time by runtime-adjustable multipliers; every update runs a two-phase
//! plan→simulate protocol so event boundaries land exactly on a tick, and
//! structural changes requested mid-simulation are deferred to between
//! sub-steps.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`error`] | Error enums (system, tracker, persistence, settings) |
//! | [`events`] | Domain events and the notification sink contract |
//! | [`persist`] | Key/value tracker state, versioned bincode envelope |
//! | [`registry`] | Explicit guide/tracker/effect/handler registries |
//! | [`scheduler`] | Subject directory, active ticking vs lazy catch-up |
//! | [`settings`] | Runtime-adjustable time multipliers |
//! | [`simulation`] | Immutable per-pass span descriptor |
//! | [`system`] | The per-subject aggregate and sub-stepping loop |
//! | [`tracker`] | Shared tracker/effect/handler contract |
//! | [`trackers`] | Concrete tracker, effect, and handler variants |

pub mod error;
pub mod events;
pub mod persist;
pub mod registry;
pub mod scheduler;
pub mod settings;
pub mod simulation;
pub mod system;
pub mod tracker;
pub mod trackers;

pub use error::{PersistError, SettingsError, SystemError, TrackerError};
pub use events::{MemorySink, NotificationSink, NullSink, ReproEvent, SubjectId};
pub use registry::Registry;
pub use scheduler::Directory;
pub use settings::Settings;
pub use simulation::Simulation;
pub use system::ReproductiveSystem;
pub use tracker::{Hosted, SystemView, Tracker};
