//! Piecewise-linear curves and the fertilization-probability curve.
//!
//! Guides supply curves as sorted `(x, y)` point lists; sampling clamps at
//! both ends and interpolates linearly between neighbors.
//!
//! Fertilization chance is a Hill curve anchored at a single calibration
//! point: the sperm count at which the per-opportunity chance is exactly
//! one half. The guide data only supplies that midpoint, so the curve
//! family is a documented choice, not inferred intent.

use serde::{Deserialize, Serialize};

/// A piecewise-linear curve over `(x, y)` points sorted by `x`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    pub points: Vec<(f64, f64)>,
}

impl Curve {
    pub fn new(points: Vec<(f64, f64)>) -> Self {
        let mut points = points;
        points.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        Self { points }
    }

    /// Sample the curve at `x`, clamping outside the defined range.
    ///
    /// An empty curve samples to 0.0.
    pub fn sample(&self, x: f64) -> f64 {
        let points = &self.points;
        let Some(first) = points.first() else {
            return 0.0;
        };
        if x <= first.0 {
            return first.1;
        }
        let last = points[points.len() - 1];
        if x >= last.0 {
            return last.1;
        }
        for pair in points.windows(2) {
            let (x0, y0) = pair[0];
            let (x1, y1) = pair[1];
            if x <= x1 {
                if (x1 - x0).abs() < f64::EPSILON {
                    return y1;
                }
                let t = (x - x0) / (x1 - x0);
                return y0 + (y1 - y0) * t;
            }
        }
        last.1
    }
}

/// Per-opportunity fertilization chance for a given competing sperm count.
///
/// Hill curve: `count^k / (count^k + equal_chance^k)`, the logistic in
/// log-concentration space. Monotonically increasing in `count`, exactly
/// 0.5 at `count == equal_chance_count`, approaching 1.0 as the count
/// grows without bound.
///
/// `steepness` (`k`) controls how sharply the chance rises around the
/// midpoint; 1.0 gives the classic saturation curve `c / (c + e)`.
pub fn fertilization_chance(count: f64, equal_chance_count: f64, steepness: f64) -> f64 {
    if count <= 0.0 || equal_chance_count <= 0.0 {
        return 0.0;
    }
    let k = if steepness > 0.0 { steepness } else { 1.0 };
    // 1 / (1 + (e/c)^k), computed in log space to avoid overflow.
    let log_ratio = (equal_chance_count.ln() - count.ln()) * k;
    1.0 / (1.0 + log_ratio.exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_curve_samples_zero() {
        assert_eq!(Curve::default().sample(5.0), 0.0);
    }

    #[test]
    fn curve_clamps_at_ends() {
        let c = Curve::new(vec![(0.0, 1.0), (10.0, 3.0)]);
        assert_eq!(c.sample(-5.0), 1.0);
        assert_eq!(c.sample(99.0), 3.0);
    }

    #[test]
    fn curve_interpolates() {
        let c = Curve::new(vec![(0.0, 0.0), (10.0, 1.0)]);
        assert!((c.sample(5.0) - 0.5).abs() < 1e-12);
        assert!((c.sample(2.5) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn curve_sorts_input() {
        let c = Curve::new(vec![(10.0, 1.0), (0.0, 0.0)]);
        assert!((c.sample(5.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn fertilization_half_at_calibration_point() {
        let p = fertilization_chance(2.0e8, 2.0e8, 1.0);
        assert!((p - 0.5).abs() < 1e-12, "p={p}");
    }

    #[test]
    fn fertilization_monotonic_in_count() {
        let ecc = 2.0e8;
        let mut prev = 0.0;
        for exp in 0..16 {
            let count = 10f64.powi(exp);
            let p = fertilization_chance(count, ecc, 1.0);
            assert!(p >= prev, "not monotonic at count={count}");
            prev = p;
        }
    }

    #[test]
    fn fertilization_zero_count_zero_chance() {
        assert_eq!(fertilization_chance(0.0, 2.0e8, 1.0), 0.0);
        assert_eq!(fertilization_chance(-1.0, 2.0e8, 1.0), 0.0);
    }

    #[test]
    fn fertilization_steepness_sharpens() {
        let ecc = 1.0e8;
        let below_soft = fertilization_chance(1.0e7, ecc, 1.0);
        let below_sharp = fertilization_chance(1.0e7, ecc, 3.0);
        // Steeper curve is further from 0.5 on the same side.
        assert!(below_sharp < below_soft);
        let above_soft = fertilization_chance(1.0e9, ecc, 1.0);
        let above_sharp = fertilization_chance(1.0e9, ecc, 3.0);
        assert!(above_sharp > above_soft);
    }

    #[test]
    fn fertilization_extreme_counts_stay_finite() {
        let p = fertilization_chance(1.0e300, 2.0e8, 2.0);
        assert!(p > 0.999 && p <= 1.0);
        let p = fertilization_chance(1.0e-300, 2.0e8, 2.0);
        assert!(p >= 0.0 && p < 1.0e-3);
    }
}
