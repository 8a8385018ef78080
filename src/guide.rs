use rand_chacha::ChaCha8Rng;

use crate::distributions::{suggest_distribution, Distribution1D};
use crate::error::StsResult;
use crate::graph::{BlockId, Graph, Param};

/// A proposal/prior over the free parameters of a graph.
///
/// Draws, densities, and scatter-back all index positionally against the
/// same traversal order, so a draw can be pinned onto the graph and read
/// back without reordering.
pub trait Guide {
    /// One value per tracked free parameter, in traversal order.
    fn sample(&self, rng: &mut ChaCha8Rng) -> Vec<f64>;

    /// Joint log-density of a draw under the per-parameter factorization.
    fn lpdf(&self, draw: &[f64]) -> f64;

    /// Scatter a draw back onto the live graph as constant values.
    fn set_model_rvs(&self, g: &mut Graph, draw: &[f64]) -> StsResult<()>;
}

/// A free parameter with its assigned distribution.
pub struct TrackedParam {
    pub block: BlockId,
    pub slot: usize,
    pub name: &'static str,
    pub dist: Box<dyn Distribution1D>,
}

/// A guide that assigns a distribution to each free parameter from its
/// bound: Normal on the real line, LogNormal on the positive half-line,
/// Beta on the unit interval.
///
/// Parameters whose bound has no suggestion end up in `unmodeled` and are
/// excluded from sampling; it is the caller's responsibility to pin or model
/// them separately. The tracked set is fixed at construction and is not
/// refreshed if the graph is restructured afterwards.
pub struct AutoGuide {
    pub root: BlockId,
    pub tracked: Vec<TrackedParam>,
    pub unmodeled: Vec<(BlockId, &'static str)>,
}

impl AutoGuide {
    pub fn new(g: &Graph, root: BlockId) -> StsResult<Self> {
        let mut tracked = Vec::new();
        let mut unmodeled = Vec::new();
        for fp in g.free_params_from(root) {
            match suggest_distribution(fp.bound)? {
                Some(dist) => tracked.push(TrackedParam {
                    block: fp.block,
                    slot: fp.slot,
                    name: fp.name,
                    dist,
                }),
                None => unmodeled.push((fp.block, fp.name)),
            }
        }
        Ok(Self {
            root,
            tracked,
            unmodeled,
        })
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }
}

impl Guide for AutoGuide {
    fn sample(&self, rng: &mut ChaCha8Rng) -> Vec<f64> {
        self.tracked.iter().map(|tp| tp.dist.sample(rng)).collect()
    }

    fn lpdf(&self, draw: &[f64]) -> f64 {
        debug_assert_eq!(draw.len(), self.tracked.len());
        self.tracked
            .iter()
            .zip(draw)
            .map(|(tp, &x)| tp.dist.lpdf(x))
            .sum()
    }

    fn set_model_rvs(&self, g: &mut Graph, draw: &[f64]) -> StsResult<()> {
        debug_assert_eq!(draw.len(), self.tracked.len());
        for (tp, &x) in self.tracked.iter().zip(draw) {
            g.node_mut(tp.block).params[tp.slot].value = Param::Scalar(x);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::Normal1D;
    use rand::SeedableRng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(3)
    }

    #[test]
    fn test_tracks_free_parameters_in_traversal_order() {
        let mut g = Graph::new();
        let rw = g.random_walk(0, 10, Param::Free, Param::Free, 0.0);
        let trend = g.global_trend(0, 10, Param::Free, 1.0);
        let root = g.added(rw, trend);

        let guide = AutoGuide::new(&g, root).unwrap();
        let names: Vec<_> = guide.tracked.iter().map(|tp| (tp.block, tp.name)).collect();
        assert_eq!(names, vec![(rw, "loc"), (rw, "scale"), (trend, "a")]);
        assert!(guide.unmodeled.is_empty());
    }

    #[test]
    fn test_unmodeled_interval_excluded() {
        let mut g = Graph::new();
        // frac's unit interval gets a Beta; an ad-hoc interval on another
        // block would be unmodeled — emulate via a changepoint whose frac is
        // free (modeled) and verify the modeled count.
        let left = g.random_walk(0, 10, 0.0, 1.0, 0.0);
        let right = g.random_walk(0, 10, 0.0, 1.0, 0.0);
        let cp = g.changepoint(left, right, Param::Free);
        let guide = AutoGuide::new(&g, cp).unwrap();
        assert_eq!(guide.len(), 1);
        assert_eq!(guide.tracked[0].name, "frac");
    }

    #[test]
    fn test_round_trip_scatter_and_read_back() {
        let mut g = Graph::new();
        let rw = g.random_walk(0, 10, Param::Free, Param::Free, Param::Free);
        let guide = AutoGuide::new(&g, rw).unwrap();
        let mut r = rng();

        let draw = guide.sample(&mut r);
        assert_eq!(draw.len(), 3);
        guide.set_model_rvs(&mut g, &draw).unwrap();

        let read_back: Vec<f64> = guide
            .tracked
            .iter()
            .map(|tp| match g.node(tp.block).params[tp.slot].value {
                Param::Scalar(v) => v,
                _ => panic!("expected pinned scalar"),
            })
            .collect();
        assert_eq!(read_back, draw);
    }

    #[test]
    fn test_lpdf_sums_tracked_densities() {
        let mut g = Graph::new();
        // Two real-line parameters, both assigned standard Normals.
        let trend = g.global_trend(0, 10, Param::Free, Param::Free);
        let guide = AutoGuide::new(&g, trend).unwrap();
        assert_eq!(guide.len(), 2);

        let expected = Normal1D::default().lpdf(0.4) + Normal1D::default().lpdf(-1.2);
        assert!((guide.lpdf(&[0.4, -1.2]) - expected).abs() < 1e-12);
    }
}
