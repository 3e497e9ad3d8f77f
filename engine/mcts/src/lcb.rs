//! Cached Student-t quantiles for lower confidence bounds.
//!
//! The table is built once per search context from `ci_alpha` and shared
//! read-only across workers. Entry `v` holds the quantile at `v` visits
//! (degrees of freedom `v - 1`); beyond the table the quantile is flat
//! enough that the last entry is reused.

const ENTRY_COUNT: usize = 1000;

/// Abramowitz and Stegun formula 26.2.23; absolute error below 4.5e-4.
fn rational_approx(t: f64) -> f64 {
    const C: [f64; 3] = [2.515517, 0.802853, 0.010328];
    const D: [f64; 3] = [1.432788, 0.189269, 0.001308];
    t - ((C[2] * t + C[1]) * t + C[0]) / (((D[2] * t + D[1]) * t + D[0]) * t + 1.0)
}

/// Inverse standard normal CDF. `p` must lie strictly inside (0, 1), which
/// parameter validation guarantees before a table is built.
fn normal_cdf_inverse(p: f64) -> f64 {
    debug_assert!(p > 0.0 && p < 1.0);
    if p < 0.5 {
        -rational_approx((-2.0 * p.ln()).sqrt())
    } else {
        rational_approx((-2.0 * (1.0 - p).ln()).sqrt())
    }
}

/// Map a normal quantile onto the Student-t distribution at the given
/// degrees of freedom. Two constant sets, switching at df = 8.
fn norm_to_t_approx(z: f64, degrees_of_freedom: f64) -> f64 {
    let n = degrees_of_freedom + 2.0;
    if degrees_of_freedom > 8.0 {
        let n = n - 1.0;
        (n * (z * z * (n - 1.5) / ((n - 1.0) * (n - 1.0))).exp() - n).sqrt()
    } else {
        (n * (z * z * (n - 0.853_999_327_911) / ((n - 1.044_042_304_114) * (n - 0.954_115_472_059)))
            .exp()
            - n)
            .sqrt()
    }
}

/// Precomputed z-to-t lookup, deterministic and thread-safe once built.
#[derive(Debug)]
pub struct LcbTable {
    z_lookup: Vec<f32>,
}

impl LcbTable {
    /// Build the table for confidence level `1 - ci_alpha`.
    pub fn new(ci_alpha: f32) -> Self {
        let z = normal_cdf_inverse(1.0 - f64::from(ci_alpha));
        let z_lookup = (0..ENTRY_COUNT)
            .map(|i| norm_to_t_approx(z, i as f64) as f32)
            .collect();
        Self { z_lookup }
    }

    /// Quantile at `visits` observations.
    #[inline]
    pub fn quantile(&self, visits: u32) -> f32 {
        let idx = (visits.max(1) as usize - 1).min(ENTRY_COUNT - 1);
        self.z_lookup[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_inverse_symmetry() {
        let hi = normal_cdf_inverse(0.975);
        let lo = normal_cdf_inverse(0.025);
        assert!((hi + lo).abs() < 1e-3);
        // The classic 1.96 two-sided value.
        assert!((hi - 1.96).abs() < 5e-3);
    }

    #[test]
    fn test_quantile_decreases_with_visits() {
        let table = LcbTable::new(0.05);
        // Small samples demand a wider bound.
        assert!(table.quantile(2) > table.quantile(10));
        assert!(table.quantile(10) > table.quantile(500));
    }

    #[test]
    fn test_quantile_clamps() {
        let table = LcbTable::new(0.05);
        assert_eq!(table.quantile(0), table.quantile(1));
        assert_eq!(table.quantile(1_000_000), table.quantile(1000));
    }

    #[test]
    fn test_converges_to_normal_quantile() {
        let table = LcbTable::new(0.05);
        // At high degrees of freedom the t quantile approaches z.
        let z = normal_cdf_inverse(0.95) as f32;
        assert!((table.quantile(999) - z).abs() < 0.05);
    }

    #[test]
    fn test_piecewise_constant_sets_meet() {
        // The two approximations should roughly agree around the df = 8
        // boundary rather than jump.
        let z = normal_cdf_inverse(0.95);
        let below = norm_to_t_approx(z, 8.0);
        let above = norm_to_t_approx(z, 9.0);
        assert!((below - above).abs() < 0.1);
    }
}
