//! Approximate-Bayesian-computation rejection sampler.
//!
//! Each iteration pins a candidate parameter vector from the guide onto the
//! graph inside a proposal effect, simulates one path, scores it against
//! the observed data, and restores the graph — strictly sequentially.

use rand_chacha::ChaCha8Rng;

use crate::effects::with_proposal;
use crate::error::{StsError, StsResult};
use crate::graph::{BlockId, Graph};
use crate::guide::{AutoGuide, Guide};
use crate::metrics::{variance, DistanceMetric, MseDistanceMetric};
use crate::progress::Progress;
use crate::sample::sample;

/// Termination policy of the rejection loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Monte Carlo: run exactly this many iterations; the number of
    /// accepted draws is random and may be zero.
    Iterations(usize),
    /// Las Vegas: run until `nsample` draws are accepted. `max_iter` is the
    /// safety bound — exceeding it fails with `DidNotConverge`; `None`
    /// removes the bound, and a tolerance that is too tight for the
    /// prior/model mismatch will then loop forever.
    Acceptances {
        nsample: usize,
        max_iter: Option<usize>,
    },
}

/// Configuration for the ABC sampler.
#[derive(Debug, Clone, Copy)]
pub struct AbcConfig {
    pub termination: Termination,
    /// Fraction of iterations that print a progress line.
    pub verbosity: f64,
}

impl Default for AbcConfig {
    fn default() -> Self {
        Self {
            termination: Termination::Acceptances {
                nsample: 100,
                max_iter: None,
            },
            verbosity: 0.01,
        }
    }
}

/// Accepted draws from a sampling run.
///
/// `posterior[i]` is the candidate parameter vector (guide traversal order)
/// whose simulated path `predictive[i]` was accepted; the two always have
/// the same length.
#[derive(Debug, Clone)]
pub struct AbcResult {
    pub posterior: Vec<Vec<f64>>,
    pub predictive: Vec<Vec<f64>>,
    pub iterations: usize,
}

/// Rejection sampler over the approximate posterior of a block graph.
pub struct AbcSampler {
    root: BlockId,
    data: Vec<f64>,
    guide: Box<dyn Guide>,
    metric: Box<dyn DistanceMetric>,
    config: AbcConfig,
}

impl AbcSampler {
    /// Build a sampler with the default guide (`AutoGuide` over `root`) and
    /// the default metric (MSE with tolerance `0.5 * var(data)`).
    pub fn new(g: &Graph, root: BlockId, data: Vec<f64>, config: AbcConfig) -> StsResult<Self> {
        if data.is_empty() {
            return Err(StsError::MissingData);
        }
        let guide = Box::new(AutoGuide::new(g, root)?);
        let metric = Box::new(MseDistanceMetric::constant(0.5 * variance(&data)));
        Ok(Self::with_parts(root, data, guide, metric, config))
    }

    /// Build a sampler with an explicit guide and metric.
    pub fn with_parts(
        root: BlockId,
        data: Vec<f64>,
        guide: Box<dyn Guide>,
        metric: Box<dyn DistanceMetric>,
        config: AbcConfig,
    ) -> Self {
        Self {
            root,
            data,
            guide,
            metric,
            config,
        }
    }

    /// Run the rejection loop to completion per the configured termination.
    pub fn sample(&self, g: &mut Graph, rng: &mut ChaCha8Rng) -> StsResult<AbcResult> {
        match self.config.termination {
            Termination::Iterations(niter) => self.mc_sample(g, rng, niter),
            Termination::Acceptances { nsample, max_iter } => {
                self.lv_sample(g, rng, nsample, max_iter)
            }
        }
    }

    /// One proposal → simulate → score round. The proposal effect restores
    /// the pinned parameters whether or not the draw is accepted.
    fn step(
        &self,
        g: &mut Graph,
        rng: &mut ChaCha8Rng,
        iteration: usize,
    ) -> StsResult<Option<(Vec<f64>, Vec<f64>)>> {
        with_proposal(g, self.root, |g| {
            let draw = self.guide.sample(rng);
            self.guide.set_model_rvs(g, &draw)?;
            let path = sample(g, self.root, 1, rng)?
                .into_iter()
                .next()
                .unwrap_or_default();
            if self.metric.accept(&self.data, &path, iteration)? {
                Ok(Some((draw, path)))
            } else {
                Ok(None)
            }
        })
    }

    fn mc_sample(
        &self,
        g: &mut Graph,
        rng: &mut ChaCha8Rng,
        niter: usize,
    ) -> StsResult<AbcResult> {
        let progress = Progress::new(self.config.verbosity, Some(niter), false);
        let mut posterior = Vec::new();
        let mut predictive = Vec::new();

        for n in 0..niter {
            if let Some((draw, path)) = self.step(g, rng, n)? {
                posterior.push(draw);
                predictive.push(path);
            }
            progress.tick(n, posterior.len());
        }
        progress.finish(niter, posterior.len());

        Ok(AbcResult {
            posterior,
            predictive,
            iterations: niter,
        })
    }

    fn lv_sample(
        &self,
        g: &mut Graph,
        rng: &mut ChaCha8Rng,
        nsample: usize,
        max_iter: Option<usize>,
    ) -> StsResult<AbcResult> {
        let progress = Progress::new(self.config.verbosity, Some(nsample), true);
        let mut posterior = Vec::new();
        let mut predictive = Vec::new();

        let mut n = 0;
        while posterior.len() < nsample {
            if let Some(bound) = max_iter {
                if n >= bound {
                    progress.finish(n, posterior.len());
                    return Err(StsError::DidNotConverge {
                        accepted: posterior.len(),
                        target: nsample,
                        iterations: n,
                    });
                }
            }
            if let Some((draw, path)) = self.step(g, rng, n)? {
                posterior.push(draw);
                predictive.push(path);
            }
            n += 1;
            progress.tick(n, posterior.len());
        }
        progress.finish(n, posterior.len());

        Ok(AbcResult {
            posterior,
            predictive,
            iterations: n,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Param;
    use crate::metrics::ConstantEpsilon;
    use rand::SeedableRng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(99)
    }

    fn fixed_walk(g: &mut Graph) -> BlockId {
        g.random_walk(0, 50, 0.0, 1.0, 0.0)
    }

    #[test]
    fn test_empty_data_rejected() {
        let mut g = Graph::new();
        let root = fixed_walk(&mut g);
        // `AbcSampler` boxes trait objects and has no Debug impl, so take
        // the error arm by hand rather than through unwrap_err.
        let err = match AbcSampler::new(&g, root, Vec::new(), AbcConfig::default()) {
            Err(e) => e,
            Ok(_) => panic!("empty data must be rejected"),
        };
        assert_eq!(err, StsError::MissingData);
    }

    #[test]
    fn test_end_to_end_las_vegas() {
        let mut g = Graph::new();
        let root = fixed_walk(&mut g);
        let mut r = rng();
        let data = sample(&mut g, root, 1, &mut r).unwrap().remove(0);

        // A generous tolerance keeps the scenario fast and deterministic in
        // count: every iteration accepts.
        let guide = Box::new(AutoGuide::new(&g, root).unwrap());
        let metric = Box::new(MseDistanceMetric::new(Box::new(ConstantEpsilon::new(
            f64::INFINITY,
        ))));
        let sampler = AbcSampler::with_parts(
            root,
            data,
            guide,
            metric,
            AbcConfig {
                termination: Termination::Acceptances {
                    nsample: 20,
                    max_iter: Some(10_000),
                },
                verbosity: 0.0,
            },
        );

        let result = sampler.sample(&mut g, &mut r).unwrap();
        assert_eq!(result.posterior.len(), 20);
        assert_eq!(result.predictive.len(), 20);
        assert!(result.predictive.iter().all(|p| p.len() == 50));
    }

    #[test]
    fn test_monte_carlo_runs_exact_iterations() {
        let mut g = Graph::new();
        let root = g.random_walk(0, 30, Param::Free, 1.0, 0.0);
        let mut r = rng();
        let data = sample(&mut g, root, 1, &mut r).unwrap().remove(0);

        let sampler = AbcSampler::new(
            &g,
            root,
            data,
            AbcConfig {
                termination: Termination::Iterations(50),
                verbosity: 0.0,
            },
        )
        .unwrap();

        let result = sampler.sample(&mut g, &mut r).unwrap();
        assert_eq!(result.iterations, 50);
        assert!(result.posterior.len() <= 50);
        assert_eq!(result.posterior.len(), result.predictive.len());
    }

    #[test]
    fn test_las_vegas_did_not_converge() {
        let mut g = Graph::new();
        let root = fixed_walk(&mut g);
        let mut r = rng();
        let data = sample(&mut g, root, 1, &mut r).unwrap().remove(0);

        // A zero tolerance can never accept (strict inequality).
        let guide = Box::new(AutoGuide::new(&g, root).unwrap());
        let metric = Box::new(MseDistanceMetric::constant(0.0));
        let sampler = AbcSampler::with_parts(
            root,
            data,
            guide,
            metric,
            AbcConfig {
                termination: Termination::Acceptances {
                    nsample: 5,
                    max_iter: Some(40),
                },
                verbosity: 0.0,
            },
        );

        let err = sampler.sample(&mut g, &mut r).unwrap_err();
        assert_eq!(
            err,
            StsError::DidNotConverge {
                accepted: 0,
                target: 5,
                iterations: 40,
            }
        );
    }

    #[test]
    fn test_proposal_values_restored_after_sampling() {
        let mut g = Graph::new();
        let root = g.random_walk(0, 30, Param::Free, Param::Free, 0.0);
        let mut r = rng();
        let data = sample(&mut g, root, 1, &mut r).unwrap().remove(0);

        let sampler = AbcSampler::new(
            &g,
            root,
            data,
            AbcConfig {
                termination: Termination::Iterations(10),
                verbosity: 0.0,
            },
        )
        .unwrap();
        sampler.sample(&mut g, &mut r).unwrap();

        // Free slots are free again after every iteration's restore.
        assert_eq!(g.node(root).params[0].value, Param::Free);
        assert_eq!(g.node(root).params[1].value, Param::Free);
    }
}
