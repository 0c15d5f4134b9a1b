//! Single-Gaussian peak refinement.
//!
//! Fits `f(c) = A * exp(-(c - mu)^2 / (2 sigma^2))` to an axis amplitude
//! profile with Levenberg-Marquardt and reports `mu`. The mean is seeded with
//! the amplitude-weighted centroid, the height with the largest amplitude and
//! the width with the weighted RMS spread.

use segevent_core::{AxisRefinement, RefinementConfig, RefinementError, Sample};

const MIN_SAMPLES: usize = 2;
const LAMBDA_START: f64 = 1e-3;
const LAMBDA_MAX: f64 = 1e12;
/// Residual (relative to the summed squared amplitudes) treated as a perfect fit.
const EXACT_FIT: f64 = 1e-20;
/// Fitted peaks may sit this far (channels) outside the sampled range.
const PEAK_MARGIN: f64 = 0.5;

/// Levenberg-Marquardt Gaussian fit.
#[derive(Clone, Debug)]
pub struct GaussianRefinement {
    config: RefinementConfig,
}

impl GaussianRefinement {
    /// Create with custom configuration.
    #[must_use]
    pub fn new(config: RefinementConfig) -> Self {
        Self { config }
    }

    /// Get current configuration.
    #[must_use]
    pub fn config(&self) -> &RefinementConfig {
        &self.config
    }

    /// Fits all three parameters, returning `[height, mean, sigma]`.
    ///
    /// # Errors
    /// See [`RefinementError`].
    pub fn fit(&self, samples: &[Sample], initial_peak: f64) -> Result<[f64; 3], RefinementError> {
        if samples.len() < MIN_SAMPLES {
            return Err(RefinementError::TooFewSamples {
                required: MIN_SAMPLES,
                got: samples.len(),
            });
        }
        let total: f64 = samples.iter().map(|s| s.weight).sum();
        if total <= 0.0 {
            return Err(RefinementError::ZeroWeight);
        }

        let height = samples.iter().map(|s| s.weight).fold(0.0, f64::max);
        let variance = samples
            .iter()
            .map(|s| s.weight * (s.position - initial_peak).powi(2))
            .sum::<f64>()
            / total;
        let sigma = if variance > 0.0 && variance.is_finite() {
            variance.sqrt()
        } else {
            self.config.initial_sigma
        };

        let scale: f64 = samples.iter().map(|s| s.weight * s.weight).sum();
        let mut params = [height, initial_peak, sigma];
        let mut chi2 = chi_square(samples, &params);
        let mut lambda = LAMBDA_START;

        for _ in 0..self.config.max_iterations {
            let (jtj, jtr) = normal_equations(samples, &params);

            let mut improved = false;
            while lambda < LAMBDA_MAX {
                let mut damped = jtj;
                for (i, row) in damped.iter_mut().enumerate() {
                    row[i] += lambda * jtj[i][i].max(1e-12);
                }
                let Some(step) = solve_3x3(damped, jtr) else {
                    lambda *= 10.0;
                    continue;
                };

                let mut trial = [
                    params[0] + step[0],
                    params[1] + step[1],
                    (params[2] + step[2]).abs(),
                ];
                if trial[2] == 0.0 {
                    trial[2] = f64::EPSILON;
                }
                let trial_chi2 = chi_square(samples, &trial);

                if trial_chi2.is_finite() && trial_chi2 <= chi2 {
                    let tol = self.config.tolerance;
                    let converged = step
                        .iter()
                        .zip(params.iter())
                        .all(|(d, p)| d.abs() <= tol * (p.abs() + tol));
                    params = trial;
                    chi2 = trial_chi2;
                    lambda = (lambda / 10.0).max(f64::EPSILON);
                    improved = true;
                    if converged || chi2 <= scale * EXACT_FIT {
                        return finish(samples, params);
                    }
                    break;
                }
                lambda *= 10.0;
            }

            if !improved {
                // No downhill step at any damping: already at a minimum.
                if jtj.iter().all(|row| row.iter().all(|v| *v == 0.0)) {
                    return Err(RefinementError::Singular);
                }
                return finish(samples, params);
            }
        }

        Err(RefinementError::NotConverged(self.config.max_iterations))
    }
}

impl Default for GaussianRefinement {
    fn default() -> Self {
        Self::new(RefinementConfig::default())
    }
}

impl AxisRefinement for GaussianRefinement {
    fn name(&self) -> &'static str {
        "Gaussian"
    }

    fn refine(&self, samples: &[Sample], initial_peak: f64) -> Result<f64, RefinementError> {
        self.fit(samples, initial_peak).map(|params| params[1])
    }
}

fn finish(samples: &[Sample], params: [f64; 3]) -> Result<[f64; 3], RefinementError> {
    if params.iter().any(|p| !p.is_finite()) {
        return Err(RefinementError::NonFinite);
    }
    let (min, max) = samples
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
            (lo.min(s.position), hi.max(s.position))
        });
    let peak = params[1];
    if peak < min - PEAK_MARGIN || peak > max + PEAK_MARGIN {
        return Err(RefinementError::PeakOutOfRange { peak, min, max });
    }
    Ok(params)
}

fn gaussian(c: f64, params: &[f64; 3]) -> f64 {
    let [a, mu, sigma] = *params;
    let d = (c - mu) / sigma;
    a * (-0.5 * d * d).exp()
}

fn chi_square(samples: &[Sample], params: &[f64; 3]) -> f64 {
    samples
        .iter()
        .map(|s| (s.weight - gaussian(s.position, params)).powi(2))
        .sum()
}

/// Accumulates `J^T J` and `J^T r` for the current parameters.
fn normal_equations(samples: &[Sample], params: &[f64; 3]) -> ([[f64; 3]; 3], [f64; 3]) {
    let [a, mu, sigma] = *params;
    let mut jtj = [[0.0f64; 3]; 3];
    let mut jtr = [0.0f64; 3];

    for s in samples {
        let d = s.position - mu;
        let e = (-0.5 * d * d / (sigma * sigma)).exp();
        let grad = [
            e,
            a * e * d / (sigma * sigma),
            a * e * d * d / (sigma * sigma * sigma),
        ];
        let r = s.weight - a * e;
        for i in 0..3 {
            jtr[i] += grad[i] * r;
            for j in 0..3 {
                jtj[i][j] += grad[i] * grad[j];
            }
        }
    }
    (jtj, jtr)
}

/// Solve a 3x3 linear system `A * x = b` via Cramer's rule.
fn solve_3x3(a: [[f64; 3]; 3], b: [f64; 3]) -> Option<[f64; 3]> {
    let det = a[0][0] * (a[1][1] * a[2][2] - a[1][2] * a[2][1])
        - a[0][1] * (a[1][0] * a[2][2] - a[1][2] * a[2][0])
        + a[0][2] * (a[1][0] * a[2][1] - a[1][1] * a[2][0]);
    if det.abs() < 1e-300 || !det.is_finite() {
        return None;
    }
    let inv = 1.0 / det;

    let x = inv
        * (b[0] * (a[1][1] * a[2][2] - a[1][2] * a[2][1])
            - a[0][1] * (b[1] * a[2][2] - a[1][2] * b[2])
            + a[0][2] * (b[1] * a[2][1] - a[1][1] * b[2]));
    let y = inv
        * (a[0][0] * (b[1] * a[2][2] - a[1][2] * b[2])
            - b[0] * (a[1][0] * a[2][2] - a[1][2] * a[2][0])
            + a[0][2] * (a[1][0] * b[2] - b[1] * a[2][0]));
    let z = inv
        * (a[0][0] * (a[1][1] * b[2] - b[1] * a[2][1])
            - a[0][1] * (a[1][0] * b[2] - b[1] * a[2][0])
            + b[0] * (a[1][0] * a[2][1] - a[1][1] * a[2][0]));

    Some([x, y, z])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn profile(height: f64, mean: f64, sigma: f64, channels: std::ops::Range<i32>) -> Vec<Sample> {
        channels
            .map(|c| {
                let c = f64::from(c);
                Sample::new(c, gaussian(c, &[height, mean, sigma]))
            })
            .collect()
    }

    fn centroid(samples: &[Sample]) -> f64 {
        let total: f64 = samples.iter().map(|s| s.weight).sum();
        samples.iter().map(|s| s.position * s.weight).sum::<f64>() / total
    }

    #[test]
    fn test_recovers_exact_gaussian() {
        let samples = profile(100.0, 10.3, 1.2, 6..15);
        let fit = GaussianRefinement::default();
        let params = fit.fit(&samples, centroid(&samples)).unwrap();
        assert_abs_diff_eq!(params[0], 100.0, epsilon = 1e-4);
        assert_abs_diff_eq!(params[1], 10.3, epsilon = 1e-5);
        assert_abs_diff_eq!(params[2], 1.2, epsilon = 1e-5);
    }

    #[test]
    fn test_truncated_profile_pulls_off_centroid() {
        // Peak near the edge of the sampled range: the centroid is biased
        // inwards, the fit is not.
        let samples = profile(50.0, 3.4, 1.5, 3..10);
        let seed = centroid(&samples);
        assert!(seed > 4.0);
        let peak = GaussianRefinement::default().refine(&samples, seed).unwrap();
        assert_abs_diff_eq!(peak, 3.4, epsilon = 1e-4);
    }

    #[test]
    fn test_symmetric_pair_keeps_midpoint() {
        let samples = vec![Sample::new(5.0, 10.0), Sample::new(7.0, 10.0)];
        let peak = GaussianRefinement::default().refine(&samples, 6.0).unwrap();
        assert_abs_diff_eq!(peak, 6.0, epsilon = 1e-9);
    }

    #[test]
    fn test_single_sample_is_rejected() {
        let err = GaussianRefinement::default()
            .refine(&[Sample::new(5.0, 10.0)], 5.0)
            .unwrap_err();
        assert_eq!(
            err,
            RefinementError::TooFewSamples {
                required: 2,
                got: 1
            }
        );
    }

    #[test]
    fn test_zero_weights_are_rejected() {
        let samples = vec![Sample::new(5.0, 0.0), Sample::new(6.0, 0.0)];
        let err = GaussianRefinement::default().refine(&samples, 5.5).unwrap_err();
        assert_eq!(err, RefinementError::ZeroWeight);
    }

    #[test]
    fn test_solve_3x3_identity() {
        let a = [[1.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 4.0]];
        let x = solve_3x3(a, [1.0, 2.0, 4.0]).unwrap();
        assert_eq!(x, [1.0, 1.0, 1.0]);
        assert!(solve_3x3([[0.0; 3]; 3], [1.0, 0.0, 0.0]).is_none());
    }
}
