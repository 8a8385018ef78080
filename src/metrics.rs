//! Quasi-likelihoods and acceptance metrics for rejection sampling.

use crate::error::{StsError, StsResult};

/// How the observation noise scale is estimated from the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdMode {
    /// A single standard deviation of the first differences.
    Constant,
    /// A trailing rolling standard deviation of the first differences,
    /// window `max(4, n / 10)`.
    Rolling,
}

/// Population standard deviation of the first differences of a series.
pub fn constant_std(data: &[f64]) -> f64 {
    let diffs: Vec<f64> = data.windows(2).map(|w| w[1] - w[0]).collect();
    std_of(&diffs)
}

/// Trailing rolling standard deviation of the first differences, one value
/// per observation, each raised to `power`. The first entry reuses the
/// first window; single-element windows give 0.
pub fn rolling_std(data: &[f64], power: f64) -> Vec<f64> {
    let n = data.len();
    let diffs: Vec<f64> = data.windows(2).map(|w| w[1] - w[0]).collect();
    let window = (n / 10).max(4);

    let mut sigma = Vec::with_capacity(n);
    for j in 0..diffs.len() {
        let start = (j + 1).saturating_sub(window);
        sigma.push(std_of(&diffs[start..=j]).powf(power));
    }
    let first = sigma.first().copied().unwrap_or(0.0);
    sigma.insert(0, first);
    sigma
}

fn std_of(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let mean = xs.iter().sum::<f64>() / xs.len() as f64;
    let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / xs.len() as f64;
    var.sqrt()
}

/// Population variance, used for the default acceptance tolerance.
pub fn variance(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let mean = xs.iter().sum::<f64>() / xs.len() as f64;
    xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / xs.len() as f64
}

/// A Gaussian state-space stand-in for the unknown data likelihood.
///
/// Scores draws with a diagonal-precision quadratic form; a zero noise
/// scale contributes a zero precision entry (pseudo-inverse behavior), so
/// flat stretches of the data do not blow up the score.
#[derive(Debug, Clone)]
pub struct GaussianQuasiLikelihood {
    data: Vec<f64>,
    prec: Vec<f64>,
}

impl GaussianQuasiLikelihood {
    pub fn new(data: Vec<f64>, mode: StdMode) -> Self {
        Self::with_power(data, mode, 1.0)
    }

    /// `power` shapes the rolling noise scale; ignored in constant mode.
    pub fn with_power(data: Vec<f64>, mode: StdMode, power: f64) -> Self {
        let sigma: Vec<f64> = match mode {
            StdMode::Constant => vec![constant_std(&data); data.len()],
            StdMode::Rolling => rolling_std(&data, power),
        };
        let prec = sigma
            .iter()
            .map(|&s| {
                let s2 = s * s;
                if s2 > 0.0 {
                    1.0 / s2
                } else {
                    0.0
                }
            })
            .collect();
        Self { data, prec }
    }

    /// Batch constructor; only single-row (1-d) series are supported.
    pub fn from_rows(rows: &[Vec<f64>], mode: StdMode) -> StsResult<Self> {
        if rows.len() != 1 {
            return Err(StsError::UnsupportedShape { ndim: 2 });
        }
        Ok(Self::new(rows[0].clone(), mode))
    }

    /// `-0.5 * mean_over_batch(diff' P diff)` with `diff = data - draw`.
    pub fn lpdf(&self, draws: &[Vec<f64>]) -> f64 {
        if draws.is_empty() {
            return 0.0;
        }
        let total: f64 = draws.iter().map(|row| self.quadratic(row)).sum();
        -0.5 * total / draws.len() as f64
    }

    fn quadratic(&self, row: &[f64]) -> f64 {
        self.data
            .iter()
            .zip(row)
            .zip(&self.prec)
            .map(|((&d, &x), &p)| {
                let diff = d - x;
                diff * diff * p
            })
            .sum()
    }
}

/// Schedule for the ABC acceptance tolerance.
pub trait EpsilonStrategy {
    fn epsilon(&self, iteration: usize) -> f64;
}

/// A fixed tolerance, the default schedule.
#[derive(Debug, Clone, Copy)]
pub struct ConstantEpsilon {
    pub eps: f64,
}

impl ConstantEpsilon {
    pub fn new(eps: f64) -> Self {
        Self { eps }
    }
}

impl EpsilonStrategy for ConstantEpsilon {
    fn epsilon(&self, _iteration: usize) -> f64 {
        self.eps
    }
}

/// Decides whether a candidate path is close enough to the observed data.
///
/// The draw must cover the data's full extent; a length mismatch is a shape
/// error, not a rejection.
pub trait DistanceMetric {
    fn accept(&self, data: &[f64], draw: &[f64], iteration: usize) -> StsResult<bool>;
}

/// Accept when the mean squared error is below the tolerance.
pub struct MseDistanceMetric {
    eps: Box<dyn EpsilonStrategy>,
}

impl MseDistanceMetric {
    pub fn new(eps: Box<dyn EpsilonStrategy>) -> Self {
        Self { eps }
    }

    pub fn constant(eps: f64) -> Self {
        Self::new(Box::new(ConstantEpsilon::new(eps)))
    }
}

impl DistanceMetric for MseDistanceMetric {
    fn accept(&self, data: &[f64], draw: &[f64], iteration: usize) -> StsResult<bool> {
        if data.len() != draw.len() {
            return Err(StsError::LengthMismatch {
                data: data.len(),
                draw: draw.len(),
            });
        }
        if data.is_empty() {
            return Ok(false);
        }
        let mse = data
            .iter()
            .zip(draw)
            .map(|(&d, &x)| (d - x).powi(2))
            .sum::<f64>()
            / data.len() as f64;
        Ok(mse < self.eps.epsilon(iteration))
    }
}

/// Accept when the negative Gaussian quasi-log-likelihood is below the
/// tolerance.
pub struct GaussianDistanceMetric {
    likelihood: GaussianQuasiLikelihood,
    eps: Box<dyn EpsilonStrategy>,
}

impl GaussianDistanceMetric {
    pub fn new(likelihood: GaussianQuasiLikelihood, eps: Box<dyn EpsilonStrategy>) -> Self {
        Self { likelihood, eps }
    }
}

impl DistanceMetric for GaussianDistanceMetric {
    fn accept(&self, _data: &[f64], draw: &[f64], iteration: usize) -> StsResult<bool> {
        if draw.len() != self.likelihood.data.len() {
            return Err(StsError::LengthMismatch {
                data: self.likelihood.data.len(),
                draw: draw.len(),
            });
        }
        let score = self.likelihood.lpdf(&[draw.to_vec()]);
        Ok(-score < self.eps.epsilon(iteration))
    }
}
