//! ReproSim Headless Simulation Harness
//!
//! Validates simulation logic and scenarios without any game engine.
//! Runs entirely in-process — no DB, no networking, no rendering.
//!
//! Usage:
//!   cargo run -p reprosim-simtest
//!   cargo run -p reprosim-simtest -- --verbose

use reprosim_core::events::{MemorySink, NullSink, ReproEvent, SubjectId};
use reprosim_core::persist;
use reprosim_core::registry::Registry;
use reprosim_core::scheduler::Directory;
use reprosim_core::settings::Settings;
use reprosim_core::system::ReproductiveSystem;
use reprosim_core::trackers::cycle::{CycleEndReason, CyclePhase, CycleTracker};
use reprosim_core::trackers::ovum::OvumTracker;
use reprosim_logic::constants::trackers;
use reprosim_logic::curve::fertilization_chance;
use reprosim_logic::guide::{GuideSet, NormalParam, SubjectProfile, WeightedTable};
use reprosim_logic::rng::Draw;

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

fn main() {
    let verbose = std::env::args().any(|a| a == "--verbose");
    println!("=== ReproSim Simulation Harness ===\n");

    let mut results = Vec::new();

    // 1. Guide defaults
    results.extend(validate_guide_defaults(verbose));

    // 2. Deterministic randomness
    results.extend(validate_determinism(verbose));

    // 3. Fertilization curve
    results.extend(validate_fertilization_curve(verbose));

    // 4. Cycle scenarios
    results.extend(validate_cycle_scenarios(verbose));

    // 5. Additivity sweep
    results.extend(validate_additivity(verbose));

    // 6. Conception through birth
    results.extend(validate_conception_to_birth(verbose));

    // 7. Persistence roundtrip
    results.extend(validate_persistence(verbose));

    // 8. Directory & lazy catch-up
    results.extend(validate_directory(verbose));

    // ── Summary ──
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    for r in &results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!(
        "\n=== RESULT: {}/{} passed, {} failed ===",
        passed, total, failed
    );

    if failed > 0 {
        std::process::exit(1);
    }
}

fn exact(mean: f64) -> NormalParam {
    NormalParam::new(mean, 0.0)
}

/// Zero-variance guides with the reference cycle lengths.
fn exact_guides() -> GuideSet {
    let mut g = GuideSet::default();
    g.cycle.follicular = exact(20160.0);
    g.cycle.ovulation = exact(1440.0);
    g.cycle.luteal = exact(17280.0);
    g.cycle.menstruation = exact(5760.0);
    g.cycle.ova_release = WeightedTable::new(vec![(1, 1.0)]);
    g.ovum.lifetime = exact(1080.0);
    g.ovum.implantation_delay = exact(100.0);
    g.ovum.equal_chance_count = 1.0e-30;
    g.sperm.lifetime = exact(100_000.0);
    g.pregnancy.gestation = exact(1000.0);
    g.pregnancy.nausea_interval = exact(300.0);
    g.pregnancy.recovery = exact(500.0);
    g
}

fn female(guides: GuideSet, seed: u64) -> (ReproductiveSystem, Settings) {
    let registry = Registry::standard_with_guides(guides);
    let settings = Settings::default();
    let system = ReproductiveSystem::new(
        SubjectId(1),
        SubjectProfile::adult_female("human"),
        &registry,
        seed,
        0,
        &settings,
        &NullSink,
    );
    (system, settings)
}

// ── 1. Guide Defaults ───────────────────────────────────────────────────

fn validate_guide_defaults(verbose: bool) -> Vec<TestResult> {
    println!("--- Guide Defaults ---");
    let mut results = Vec::new();
    let g = GuideSet::default();

    let all_positive = [
        g.cycle.follicular,
        g.cycle.ovulation,
        g.cycle.luteal,
        g.cycle.menstruation,
        g.ovum.lifetime,
        g.ovum.implantation_delay,
        g.sperm.lifetime,
        g.pregnancy.gestation,
        g.pregnancy.recovery,
    ]
    .iter()
    .all(|p| p.mean > 0.0 && p.std_dev >= 0.0);
    results.push(TestResult {
        name: "guides_positive_durations".into(),
        passed: all_positive,
        detail: "all default duration distributions positive".into(),
    });

    let table_total: f64 = g.cycle.ova_release.entries.iter().map(|e| e.weight).sum();
    results.push(TestResult {
        name: "guides_ova_table_normalized".into(),
        passed: (table_total - 1.0).abs() < 1e-9,
        detail: format!("ova release weights sum to {:.3}", table_total),
    });

    // Mean cycle ≈ 30 days in minutes.
    let cycle_mean = g.cycle.follicular.mean
        + g.cycle.ovulation.mean
        + g.cycle.luteal.mean
        + g.cycle.menstruation.mean;
    results.push(TestResult {
        name: "guides_cycle_length_plausible".into(),
        passed: (25_000.0..=50_000.0).contains(&cycle_mean),
        detail: format!("mean full cycle = {:.0} minutes", cycle_mean),
    });

    results.push(TestResult {
        name: "guides_reference_ovum_lifetime".into(),
        passed: g.ovum.lifetime.mean == 1080.0,
        detail: "ovum lifetime mean is the 1080-minute reference".into(),
    });

    if verbose {
        println!(
            "  follicular {:.0} / ovulation {:.0} / luteal {:.0} / menstruation {:.0}",
            g.cycle.follicular.mean,
            g.cycle.ovulation.mean,
            g.cycle.luteal.mean,
            g.cycle.menstruation.mean
        );
    }

    results
}

// ── 2. Deterministic Randomness ─────────────────────────────────────────

fn validate_determinism(_verbose: bool) -> Vec<TestResult> {
    println!("--- Deterministic Randomness ---");
    let mut results = Vec::new();
    let param = NormalParam::new(20160.0, 2880.0);

    let mut all_repeat = true;
    let mut any_tick_diff = false;
    for tick in [0u64, 1, 20160, 999_999] {
        let a = Draw::new(42, tick, "cycle.follicular").normal(&param);
        let b = Draw::new(42, tick, "cycle.follicular").normal(&param);
        if a != b {
            all_repeat = false;
        }
        let c = Draw::new(42, tick + 1, "cycle.follicular").normal(&param);
        if a != c {
            any_tick_diff = true;
        }
    }
    results.push(TestResult {
        name: "rng_same_key_repeats".into(),
        passed: all_repeat,
        detail: "identical (seed, tick, label) keys repeat exactly".into(),
    });
    results.push(TestResult {
        name: "rng_tick_varies_stream".into(),
        passed: any_tick_diff,
        detail: "adjacent ticks draw from distinct streams".into(),
    });

    // Draws are keyed, not order-dependent: interleaving does not matter.
    let x1 = Draw::new(7, 100, "a").normal(&param);
    let _ = Draw::new(7, 200, "b").normal(&param);
    let x2 = Draw::new(7, 100, "a").normal(&param);
    results.push(TestResult {
        name: "rng_order_independent".into(),
        passed: x1 == x2,
        detail: "draw keyed by tick, not call order".into(),
    });

    // Sampled distribution is roughly centered on the mean.
    let n = 2000;
    let sum: f64 = (0..n)
        .map(|i| Draw::new(11, i, "sample").normal(&param))
        .sum();
    let avg = sum / n as f64;
    results.push(TestResult {
        name: "rng_normal_centered".into(),
        passed: (avg - param.mean).abs() < param.std_dev * 0.2,
        detail: format!("mean over {} draws = {:.0} (target {:.0})", n, avg, param.mean),
    });

    results
}

// ── 3. Fertilization Curve ──────────────────────────────────────────────

fn validate_fertilization_curve(verbose: bool) -> Vec<TestResult> {
    println!("--- Fertilization Curve ---");
    let mut results = Vec::new();
    let ecc = 2.0e8;

    let midpoint = fertilization_chance(ecc, ecc, 1.0);
    results.push(TestResult {
        name: "curve_midpoint_is_half".into(),
        passed: (midpoint - 0.5).abs() < 1e-9,
        detail: format!("chance at equal-chance count = {:.6}", midpoint),
    });

    let mut monotonic = true;
    let mut prev = -1.0;
    for exp in 0..18 {
        let count = 10f64.powi(exp);
        let p = fertilization_chance(count, ecc, 1.0);
        if p < prev {
            monotonic = false;
        }
        prev = p;
    }
    results.push(TestResult {
        name: "curve_monotonic".into(),
        passed: monotonic,
        detail: "chance never decreases with count".into(),
    });

    let zero = fertilization_chance(0.0, ecc, 1.0);
    let huge = fertilization_chance(1.0e18, ecc, 1.0);
    results.push(TestResult {
        name: "curve_extremes".into(),
        passed: zero == 0.0 && huge > 0.99 && huge <= 1.0,
        detail: format!("count 0 → {:.2}, count 1e18 → {:.6}", zero, huge),
    });

    if verbose {
        println!("  chance by count (ecc = 2e8):");
        for exp in [6, 7, 8, 9, 10] {
            let count = 10f64.powi(exp);
            println!(
                "    1e{:<2} → {:.4}",
                exp,
                fertilization_chance(count, ecc, 1.0)
            );
        }
    }

    results
}

// ── 4. Cycle Scenarios ──────────────────────────────────────────────────

fn validate_cycle_scenarios(_verbose: bool) -> Vec<TestResult> {
    println!("--- Cycle Scenarios ---");
    let mut results = Vec::new();

    // Exact transition at the follicular boundary.
    let (mut system, settings) = female(exact_guides(), 42);
    let sink = MemorySink::new();
    system.update(20160, &settings, &sink);
    let cycle = system.tracker_as::<CycleTracker>(trackers::CYCLE).unwrap();
    let transitions = sink.count_where(|e| {
        matches!(
            e,
            ReproEvent::PhaseChanged {
                from: CyclePhase::Follicular,
                to: CyclePhase::Ovulation
            }
        )
    });
    results.push(TestResult {
        name: "cycle_exact_boundary".into(),
        passed: cycle.phase() == CyclePhase::Ovulation && transitions == 1,
        detail: format!(
            "phase {:?} after 20160 ticks, {} transition(s)",
            cycle.phase(),
            transitions
        ),
    });

    // A full cycle loops back to follicular and reports completion.
    let (mut system, settings) = female(exact_guides(), 42);
    let sink = MemorySink::new();
    system.update(44_640, &settings, &sink);
    let cycle = system.tracker_as::<CycleTracker>(trackers::CYCLE).unwrap();
    results.push(TestResult {
        name: "cycle_full_loop".into(),
        passed: cycle.phase() == CyclePhase::Follicular && cycle.cycles_completed() == 1,
        detail: format!(
            "phase {:?}, {} completed",
            cycle.phase(),
            cycle.cycles_completed()
        ),
    });

    // Contraceptive suppression skips ovulation entirely. The pill must
    // outlast the follicular phase to cover the transition.
    let mut pill_guides = exact_guides();
    pill_guides.effects.pill_duration = exact(30_000.0);
    let (mut system, settings) = female(pill_guides, 42);
    let sink = MemorySink::new();
    system.consume_contraceptive(&settings, &sink);
    system.update(25_000, &settings, &sink);
    let skipped = sink.count_where(|e| matches!(e, ReproEvent::OvulationSkipped));
    let released = sink.count_where(|e| matches!(e, ReproEvent::OvaReleased { .. }));
    results.push(TestResult {
        name: "cycle_pill_skips_ovulation".into(),
        passed: skipped == 1 && released == 0,
        detail: format!("{} skip(s), {} release(s)", skipped, released),
    });

    // External cancel removes the cycle with the right reason.
    let (mut system, settings) = female(exact_guides(), 42);
    let sink = MemorySink::new();
    system.end_cycle(CycleEndReason::Canceled, &settings, &sink);
    let canceled = sink.count_where(|e| {
        matches!(
            e,
            ReproEvent::CycleEnded {
                reason: CycleEndReason::Canceled
            }
        )
    });
    results.push(TestResult {
        name: "cycle_cancel".into(),
        passed: canceled == 1 && system.tracker(trackers::CYCLE).is_none(),
        detail: "canceled cycle removed with reason Canceled".into(),
    });

    // Ovum expiry: released at 15, lifetime 1080, gone one tick after.
    let mut guides = exact_guides();
    guides.cycle.follicular = exact(10.0);
    guides.cycle.ovulation = exact(5.0);
    guides.cycle.luteal = exact(50_000.0);
    let (mut system, settings) = female(guides, 42);
    let sink = MemorySink::new();
    system.update(15 + 1081, &settings, &sink);
    let ova = system.tracker_as::<OvumTracker>(trackers::OVA).unwrap();
    let expired = sink.count_where(|e| matches!(e, ReproEvent::OvumExpired));
    results.push(TestResult {
        name: "cycle_ovum_expiry".into(),
        passed: ova.live_count() == 0 && expired == 1,
        detail: format!("{} live, {} expired", ova.live_count(), expired),
    });

    results
}

// ── 5. Additivity ───────────────────────────────────────────────────────

fn validate_additivity(_verbose: bool) -> Vec<TestResult> {
    println!("--- Additivity ---");
    let mut results = Vec::new();

    // t1 then t2 must equal t1+t2 for a spread of split points, including
    // splits that land mid-phase and exactly on phase boundaries.
    let splits: &[(u64, u64)] = &[
        (1, 44_639),
        (20_160, 24_480),
        (5000, 7000),
        (44_639, 1),
        (100, 100_000),
    ];
    let mut all_equal = true;
    for &(t1, t2) in splits {
        let (mut split, settings) = female(GuideSet::default(), 777);
        let (mut whole, _) = female(GuideSet::default(), 777);
        split.update(t1, &settings, &NullSink);
        split.update(t2, &settings, &NullSink);
        whole.update(t1 + t2, &settings, &NullSink);
        if persist::snapshot(&split) != persist::snapshot(&whole) {
            all_equal = false;
            println!("  MISMATCH at split ({}, {})", t1, t2);
        }
    }
    results.push(TestResult {
        name: "additivity_split_invariant".into(),
        passed: all_equal,
        detail: format!("{} split points produce identical state", splits.len()),
    });

    results
}

// ── 6. Conception Through Birth ─────────────────────────────────────────

fn validate_conception_to_birth(verbose: bool) -> Vec<TestResult> {
    println!("--- Conception Through Birth ---");
    let mut results = Vec::new();

    let mut guides = exact_guides();
    guides.cycle.follicular = exact(10.0);
    guides.cycle.ovulation = exact(5.0);
    guides.cycle.luteal = exact(50_000.0);
    guides.ovum.lifetime = exact(1000.0);

    let (mut system, settings) = female(guides, 42);
    let sink = MemorySink::new();
    system.deposit_sperm(1.0e30, &settings, &sink);
    // Release at 15, fertilize at 75, implant at 175, birth at 1175,
    // recovery done at 1675.
    system.update(1700, &settings, &sink);

    let fertilized = sink.count_where(|e| matches!(e, ReproEvent::OvumFertilized));
    let implanted = sink.count_where(|e| matches!(e, ReproEvent::Implanted));
    let started = sink.count_where(|e| matches!(e, ReproEvent::PregnancyStarted { .. }));
    let births = sink.count_where(|e| matches!(e, ReproEvent::Birth));
    let ended_by_pregnancy = sink.count_where(|e| {
        matches!(
            e,
            ReproEvent::CycleEnded {
                reason: CycleEndReason::Pregnancy
            }
        )
    });
    let recovered = sink.count_where(|e| matches!(e, ReproEvent::RecoveryComplete));
    let nausea = sink.count_where(|e| matches!(e, ReproEvent::Nausea));

    results.push(TestResult {
        name: "conception_event_chain".into(),
        passed: fertilized == 1 && implanted == 1 && started == 1 && ended_by_pregnancy == 1,
        detail: format!(
            "fertilized={} implanted={} started={} cycle_ended={}",
            fertilized, implanted, started, ended_by_pregnancy
        ),
    });
    results.push(TestResult {
        name: "conception_birth_and_recovery".into(),
        passed: births == 1 && recovered == 1,
        detail: format!("births={} recoveries={}", births, recovered),
    });
    results.push(TestResult {
        name: "conception_morning_sickness".into(),
        passed: nausea == 3,
        detail: format!("{} nausea episodes over a 1000-tick gestation", nausea),
    });
    results.push(TestResult {
        name: "conception_cycle_restarts".into(),
        passed: system.tracker(trackers::CYCLE).is_some()
            && system.tracker(trackers::PREGNANCY).is_none(),
        detail: "cycle restarted after postpartum recovery".into(),
    });

    if verbose {
        for (_, event) in sink.events() {
            println!("  event: {:?}", event);
        }
    }

    results
}

// ── 7. Persistence ──────────────────────────────────────────────────────

fn validate_persistence(verbose: bool) -> Vec<TestResult> {
    println!("--- Persistence ---");
    let mut results = Vec::new();

    let registry = Registry::standard_with_guides(GuideSet::default());
    let settings = Settings::default();
    let mut original = ReproductiveSystem::new(
        SubjectId(1),
        SubjectProfile::adult_female("human"),
        &registry,
        123,
        0,
        &settings,
        &NullSink,
    );
    original.update(23_456, &settings, &NullSink);

    let mut bytes = Vec::new();
    let saved = persist::save_to(&mut bytes, &original).is_ok();
    results.push(TestResult {
        name: "persist_save_bytes".into(),
        passed: saved && !bytes.is_empty(),
        detail: format!("{} bytes written", bytes.len()),
    });

    match persist::load_from(bytes.as_slice(), &registry, &settings, &NullSink) {
        Ok(mut restored) => {
            let identical = persist::snapshot(&original) == persist::snapshot(&restored);
            results.push(TestResult {
                name: "persist_roundtrip_identical".into(),
                passed: identical,
                detail: "restored snapshot matches original".into(),
            });
            original.update(10_000, &settings, &NullSink);
            restored.update(10_000, &settings, &NullSink);
            results.push(TestResult {
                name: "persist_roundtrip_continues".into(),
                passed: persist::snapshot(&original) == persist::snapshot(&restored),
                detail: "post-restore simulation stays in lockstep".into(),
            });
        }
        Err(e) => {
            results.push(TestResult {
                name: "persist_roundtrip_identical".into(),
                passed: false,
                detail: format!("load failed: {}", e),
            });
        }
    }

    if verbose {
        if let Ok(json) = serde_json::to_string_pretty(&persist::snapshot(&original)) {
            println!("  snapshot:\n{}", json);
        }
    }

    results
}

// ── 8. Directory & Lazy Catch-up ────────────────────────────────────────

fn validate_directory(_verbose: bool) -> Vec<TestResult> {
    println!("--- Directory & Lazy Catch-up ---");
    let mut results = Vec::new();

    // Active ticking and one-shot catch-up must converge on the same state.
    let mut active_dir = Directory::new(Registry::standard(), Settings::default(), 0xfeed);
    let mut lazy_dir = Directory::new(Registry::standard(), Settings::default(), 0xfeed);
    let subject = SubjectId(1);
    let profile = SubjectProfile::adult_female("human");
    active_dir.register(subject, profile.clone(), 0, &NullSink);
    active_dir.set_active(subject, true);
    lazy_dir.register(subject, profile, 0, &NullSink);

    for now in (0..=60_000).step_by(250) {
        active_dir.tick(now, &NullSink);
    }
    lazy_dir.catch_up(subject, 60_000, &NullSink);
    let same = persist::snapshot(active_dir.peek(subject).unwrap())
        == persist::snapshot(lazy_dir.peek(subject).unwrap());
    results.push(TestResult {
        name: "directory_lazy_equals_active".into(),
        passed: same,
        detail: "bulk catch-up matches 240 incremental ticks".into(),
    });

    // Insemination wires two systems together.
    let mut dir = Directory::new(Registry::standard(), Settings::default(), 1);
    let her = SubjectId(10);
    let him = SubjectId(11);
    dir.register(her, SubjectProfile::adult_female("human"), 0, &NullSink);
    dir.register(him, SubjectProfile::adult_male("human"), 0, &NullSink);
    let moved = dir.inseminate(him, her, 1.0e8, 0, &NullSink);
    results.push(TestResult {
        name: "directory_insemination".into(),
        passed: moved == 1.0e8,
        detail: format!("{:.1e} transferred from reserve", moved),
    });

    results
}
