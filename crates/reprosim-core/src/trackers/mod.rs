//! Tracker variants owned by a reproductive system.

pub mod cycle;
pub mod effects;
pub mod handlers;
pub mod host;
pub mod ovum;
pub mod pregnancy;
pub mod sperm;
