use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Beta as RdBeta, Distribution as RdDistribution, StandardNormal};

use crate::error::{StsError, StsResult};

const LN_SQRT_2PI: f64 = 0.918938533204672741780329736406; // 0.5 * ln(2π)

/// Support of a scalar parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    /// (-∞, ∞)
    RealLine,
    /// (0, ∞)
    PositiveReal,
    /// [lower, upper]
    Interval { lower: f64, upper: f64 },
}

impl Bound {
    pub fn lower(&self) -> f64 {
        match *self {
            Bound::RealLine => f64::NEG_INFINITY,
            Bound::PositiveReal => 0.0,
            Bound::Interval { lower, .. } => lower,
        }
    }

    pub fn upper(&self) -> f64 {
        match *self {
            Bound::RealLine | Bound::PositiveReal => f64::INFINITY,
            Bound::Interval { upper, .. } => upper,
        }
    }

    pub fn contains(&self, x: f64) -> bool {
        x >= self.lower() && x <= self.upper()
    }
}

/// A 1-d probability distribution usable as a prior or proposal.
pub trait Distribution1D {
    /// Draw a single value.
    fn sample(&self, rng: &mut ChaCha8Rng) -> f64;

    /// Log probability density at `x`.
    fn lpdf(&self, x: f64) -> f64;
}

/// Normal distribution, log-parameterized scale.
#[derive(Debug, Clone, Copy)]
pub struct Normal1D {
    pub loc: f64,
    pub log_scale: f64,
}

impl Normal1D {
    pub fn new(loc: f64, log_scale: f64) -> Self {
        Self { loc, log_scale }
    }
}

impl Default for Normal1D {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

impl Distribution1D for Normal1D {
    fn sample(&self, rng: &mut ChaCha8Rng) -> f64 {
        let z: f64 = rng.sample(StandardNormal);
        self.loc + self.log_scale.exp() * z
    }

    fn lpdf(&self, x: f64) -> f64 {
        let sigma = self.log_scale.exp();
        let z = (x - self.loc) / sigma;
        -LN_SQRT_2PI - self.log_scale - 0.5 * z * z
    }
}

/// Log-normal distribution: exp of a Normal1D.
#[derive(Debug, Clone, Copy)]
pub struct LogNormal1D {
    pub loc: f64,
    pub log_scale: f64,
}

impl LogNormal1D {
    pub fn new(loc: f64, log_scale: f64) -> Self {
        Self { loc, log_scale }
    }
}

impl Default for LogNormal1D {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

impl Distribution1D for LogNormal1D {
    fn sample(&self, rng: &mut ChaCha8Rng) -> f64 {
        let z: f64 = rng.sample(StandardNormal);
        (self.loc + self.log_scale.exp() * z).exp()
    }

    fn lpdf(&self, x: f64) -> f64 {
        if x <= 0.0 {
            return f64::NEG_INFINITY;
        }
        let sigma = self.log_scale.exp();
        let z = (x.ln() - self.loc) / sigma;
        -x.ln() - LN_SQRT_2PI - self.log_scale - 0.5 * z * z
    }
}

/// Beta distribution, log-parameterized shape parameters.
#[derive(Debug, Clone)]
pub struct Beta1D {
    pub log_alpha: f64,
    pub log_beta: f64,
    dist: RdBeta<f64>,
}

impl Beta1D {
    pub fn new(log_alpha: f64, log_beta: f64) -> StsResult<Self> {
        let dist = RdBeta::new(log_alpha.exp(), log_beta.exp())
            .map_err(|e| StsError::InvalidDistribution(e.to_string()))?;
        Ok(Self {
            log_alpha,
            log_beta,
            dist,
        })
    }
}

impl Distribution1D for Beta1D {
    fn sample(&self, rng: &mut ChaCha8Rng) -> f64 {
        self.dist.sample(rng)
    }

    fn lpdf(&self, x: f64) -> f64 {
        if !(0.0..=1.0).contains(&x) {
            return f64::NEG_INFINITY;
        }
        let a = self.log_alpha.exp();
        let b = self.log_beta.exp();
        (a - 1.0) * x.ln() + (b - 1.0) * (1.0 - x).ln() - ln_beta(a, b)
    }
}

/// Independent factorization q(z) = ∏ q_n(z_n).
pub struct ProductDistribution1D {
    pub factors: Vec<Box<dyn Distribution1D>>,
}

impl ProductDistribution1D {
    pub fn new(factors: Vec<Box<dyn Distribution1D>>) -> Self {
        Self { factors }
    }

    /// One draw per factor, in factor order.
    pub fn sample(&self, rng: &mut ChaCha8Rng) -> Vec<f64> {
        self.factors.iter().map(|d| d.sample(rng)).collect()
    }

    /// log q(z) = Σ log q_n(z_n).
    pub fn lpdf(&self, x: &[f64]) -> f64 {
        self.factors
            .iter()
            .zip(x)
            .map(|(d, &xi)| d.lpdf(xi))
            .sum()
    }
}

/// Suggest a proposal/guide distribution for a bound.
///
/// Normal for the whole real line, LogNormal for the positive half-line,
/// Beta for the unit interval. Any other interval has no suggestion and the
/// parameter is left unmodeled for the caller to pin or model by hand.
pub fn suggest_distribution(bound: Bound) -> StsResult<Option<Box<dyn Distribution1D>>> {
    match bound {
        Bound::RealLine => Ok(Some(Box::new(Normal1D::default()))),
        Bound::PositiveReal => Ok(Some(Box::new(LogNormal1D::default()))),
        Bound::Interval { lower, upper } if lower == 0.0 && upper == 1.0 => {
            Ok(Some(Box::new(Beta1D::new(0.0, 0.0)?)))
        }
        Bound::Interval { .. } => Ok(None),
    }
}

fn ln_beta(a: f64, b: f64) -> f64 {
    ln_gamma(a) + ln_gamma(b) - ln_gamma(a + b)
}

/// Lanczos approximation of ln Γ(x) (g = 7), relative error < 2e-10 for x > 0.
fn ln_gamma(x: f64) -> f64 {
    #[allow(clippy::excessive_precision)]
    const COEFFICIENTS: [f64; 9] = [
        0.99999999999980993,
        676.5203681218851,
        -1259.1392167224028,
        771.32342877765313,
        -176.61502916214059,
        12.507343278686905,
        -0.13857109526572012,
        9.9843695780195716e-6,
        1.5056327351493116e-7,
    ];
    const G: f64 = 7.0;

    if x < 0.5 {
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }

    let x = x - 1.0;
    let mut sum = COEFFICIENTS[0];
    for (i, &c) in COEFFICIENTS[1..].iter().enumerate() {
        sum += c / (x + i as f64 + 1.0);
    }

    let t = x + G + 0.5;
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + sum.ln()
}
