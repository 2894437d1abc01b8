//! Shared constants — tracker/effect/handler identifiers and time units.
//!
//! Identifiers are stable `&str` values: they key the tracker table of a
//! reproductive system and name saved tracker state, so they must never
//! change once a save has been written with them.

/// Tracker type identifiers (at most one instance per system).
pub mod trackers {
    pub const CYCLE: &str = "cycle";
    pub const OVA: &str = "ova";
    pub const SPERM: &str = "sperm";
    pub const SPERM_PRODUCTION: &str = "sperm_production";
    pub const PREGNANCY: &str = "pregnancy";
    pub const EFFECTS: &str = "effects";
    pub const HANDLERS: &str = "handlers";
}

/// Effect type identifiers (hosted inside the effects tracker).
pub mod effects {
    pub const PILL: &str = "pill";
    pub const FERTILITY_BOOST: &str = "fertility_boost";
}

/// Handler type identifiers (hosted inside the handlers tracker).
pub mod handlers {
    pub const MORNING_SICKNESS: &str = "morning_sickness";
    pub const POSTPARTUM_RECOVERY: &str = "postpartum_recovery";
}

/// Time units. One reproductive tick is one reproductive minute.
pub mod time {
    pub const MINUTES_PER_HOUR: u64 = 60;
    pub const MINUTES_PER_DAY: u64 = 24 * MINUTES_PER_HOUR;

    /// How often a viable ovum rolls a fertilization opportunity while
    /// competing sperm are present.
    pub const FERTILIZATION_CHECK_INTERVAL: u64 = MINUTES_PER_HOUR;
}
