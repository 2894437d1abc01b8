//! Guide parameter bundles — immutable per-subject-category configuration.
//!
//! A guide is a snapshot of the statistical parameters (distributions,
//! probability tables, curves) that trackers and effects consume when
//! generating random outcomes. Guides are resolved once per subject and
//! never mutated afterwards; a process-wide default set is always
//! available, so resolution can fall back and never fails.
//!
//! All durations are in reproductive ticks (minutes).

use serde::{Deserialize, Serialize};

use crate::constants::time::MINUTES_PER_DAY;
use crate::curve::Curve;

/// Parameters of a normal distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalParam {
    pub mean: f64,
    pub std_dev: f64,
}

impl NormalParam {
    pub fn new(mean: f64, std_dev: f64) -> Self {
        Self { mean, std_dev }
    }
}

/// One row of a discrete weighted probability table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightedEntry {
    pub value: u32,
    pub weight: f64,
}

/// A discrete weighted probability table (e.g. ova released per ovulation).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightedTable {
    pub entries: Vec<WeightedEntry>,
}

impl WeightedTable {
    pub fn new(entries: Vec<(u32, f64)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(value, weight)| WeightedEntry { value, weight })
                .collect(),
        }
    }
}

/// Biological sex of a subject, used to pick baseline trackers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sex {
    Female,
    Male,
}

/// Coarse life stage, used by guide-group matchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifeStage {
    Juvenile,
    Adult,
    Elder,
}

/// Attributes a guide-group matcher may inspect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectProfile {
    pub species: String,
    pub life_stage: LifeStage,
    pub sex: Sex,
}

impl SubjectProfile {
    pub fn adult_female(species: &str) -> Self {
        Self {
            species: species.to_string(),
            life_stage: LifeStage::Adult,
            sex: Sex::Female,
        }
    }

    pub fn adult_male(species: &str) -> Self {
        Self {
            species: species.to_string(),
            life_stage: LifeStage::Adult,
            sex: Sex::Male,
        }
    }
}

/// Menstrual-cycle parameters: per-phase durations and ova release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleGuide {
    pub follicular: NormalParam,
    pub ovulation: NormalParam,
    pub luteal: NormalParam,
    pub menstruation: NormalParam,
    /// Ova released when leaving the ovulation phase.
    pub ova_release: WeightedTable,
}

impl Default for CycleGuide {
    fn default() -> Self {
        Self {
            follicular: NormalParam::new(13.0 * MINUTES_PER_DAY as f64, 2.0 * MINUTES_PER_DAY as f64),
            ovulation: NormalParam::new(MINUTES_PER_DAY as f64, 0.25 * MINUTES_PER_DAY as f64),
            luteal: NormalParam::new(12.0 * MINUTES_PER_DAY as f64, 2.0 * MINUTES_PER_DAY as f64),
            menstruation: NormalParam::new(4.0 * MINUTES_PER_DAY as f64, MINUTES_PER_DAY as f64),
            ova_release: WeightedTable::new(vec![(1, 0.90), (2, 0.09), (3, 0.01)]),
        }
    }
}

/// Ovum lifetime, implantation, and fertilization-competition parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OvumGuide {
    pub lifetime: NormalParam,
    /// Delay between fertilization and implantation.
    pub implantation_delay: NormalParam,
    /// Sperm count at which one fertilization opportunity is a coin flip.
    pub equal_chance_count: f64,
    /// Hill-curve steepness around the equal-chance point.
    pub steepness: f64,
    /// Optional explicit probability curve over `log10(sperm count)`,
    /// overriding the Hill curve when a guide supplies the full shape.
    pub fertilization_curve: Option<Curve>,
}

impl Default for OvumGuide {
    fn default() -> Self {
        Self {
            lifetime: NormalParam::new(1080.0, 240.0),
            implantation_delay: NormalParam::new(6.0 * MINUTES_PER_DAY as f64, MINUTES_PER_DAY as f64),
            equal_chance_count: 2.0e8,
            steepness: 1.0,
            fertilization_curve: None,
        }
    }
}

/// Deposited-sperm parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpermGuide {
    pub lifetime: NormalParam,
}

impl Default for SpermGuide {
    fn default() -> Self {
        Self {
            lifetime: NormalParam::new(3.0 * MINUTES_PER_DAY as f64, MINUTES_PER_DAY as f64),
        }
    }
}

/// Sperm-reserve replenishment parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpermProductionGuide {
    pub capacity: f64,
    pub regen_per_tick: f64,
}

impl Default for SpermProductionGuide {
    fn default() -> Self {
        // Full reserve rebuilds in roughly three days.
        let capacity = 3.0e8;
        Self {
            capacity,
            regen_per_tick: capacity / (3.0 * MINUTES_PER_DAY as f64),
        }
    }
}

/// Gestation and postpartum parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PregnancyGuide {
    pub gestation: NormalParam,
    /// Interval between morning-sickness episodes.
    pub nausea_interval: NormalParam,
    /// Postpartum recovery before cycling resumes.
    pub recovery: NormalParam,
}

impl Default for PregnancyGuide {
    fn default() -> Self {
        Self {
            gestation: NormalParam::new(270.0 * MINUTES_PER_DAY as f64, 7.0 * MINUTES_PER_DAY as f64),
            nausea_interval: NormalParam::new(720.0, 240.0),
            recovery: NormalParam::new(28.0 * MINUTES_PER_DAY as f64, 7.0 * MINUTES_PER_DAY as f64),
        }
    }
}

/// Chemical-effect parameters (contraceptive pill, fertility medication).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectGuide {
    pub pill_duration: NormalParam,
    pub boost_duration: NormalParam,
    /// Fertilization-chance multiplier while the boost is active.
    pub boost_multiplier: f64,
}

impl Default for EffectGuide {
    fn default() -> Self {
        Self {
            pill_duration: NormalParam::new(MINUTES_PER_DAY as f64, 60.0),
            boost_duration: NormalParam::new(2.0 * MINUTES_PER_DAY as f64, 360.0),
            boost_multiplier: 1.5,
        }
    }
}

/// The complete guide bundle consumed by one reproductive system.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuideSet {
    pub cycle: CycleGuide,
    pub ovum: OvumGuide,
    pub sperm: SpermGuide,
    pub sperm_production: SpermProductionGuide,
    pub pregnancy: PregnancyGuide,
    pub effects: EffectGuide,
}
