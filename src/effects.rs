//! Scoped, restorable mutations of graph state.
//!
//! Each effect snapshots the affected nodes on entry, applies its mutation,
//! runs the caller's closure, and restores every snapshot before returning —
//! including when the closure fails. The closure-scoped shape makes the
//! enter/exit pairing structural; nesting two effects that mutate the same
//! slot is still unsupported (the inner restore wins).

use crate::error::{StsError, StsResult};
use crate::graph::{BlockId, Graph, Param};

/// Pre-mutation state of one node.
struct NodeSnapshot {
    id: BlockId,
    t0: i64,
    t1: i64,
    params: Vec<Param>,
    cached: bool,
}

fn snapshot(g: &Graph, nodes: &[BlockId]) -> Vec<NodeSnapshot> {
    nodes
        .iter()
        .map(|&id| {
            let n = g.node(id);
            NodeSnapshot {
                id,
                t0: n.t0,
                t1: n.t1,
                params: n.params.iter().map(|s| s.value.clone()).collect(),
                cached: n.cached,
            }
        })
        .collect()
}

fn restore(g: &mut Graph, snaps: Vec<NodeSnapshot>) {
    for snap in snaps {
        let n = g.node_mut(snap.id);
        n.t0 = snap.t0;
        n.t1 = snap.t1;
        n.cached = snap.cached;
        for (slot, value) in n.params.iter_mut().zip(snap.params) {
            slot.value = value;
        }
    }
}

/// Fast-forward the time window of every block reachable from `root` by
/// `nt` steps past its current end, pin initial conditions to the last
/// column of each block's cached raw draw, and disable caching, for the
/// duration of `f`.
pub fn with_forecast<T>(
    g: &mut Graph,
    root: BlockId,
    nt: usize,
    f: impl FnOnce(&mut Graph) -> StsResult<T>,
) -> StsResult<T> {
    let nodes = g.nodes_from(root);
    let snaps = snapshot(g, &nodes);

    for &id in &nodes {
        let ic_slot = g.node(id).slot_index("ic");
        let node = g.node_mut(id);
        let old_t1 = node.t1;
        node.t0 = old_t1 + 1;
        node.t1 = old_t1 + nt as i64 + 1;
        if let Some(idx) = ic_slot {
            if let Some(cache) = &node.cache {
                let last: Vec<f64> = cache
                    .iter()
                    .map(|row| row.last().copied().unwrap_or(0.0))
                    .collect();
                node.params[idx].value = Param::Vector(last);
            }
        }
        node.cached = false;
    }

    let out = f(g);
    restore(g, snaps);
    out
}

/// Disable caching and let `f` pin candidate parameter values onto the live
/// graph; every mutated value is restored afterwards.
pub fn with_proposal<T>(
    g: &mut Graph,
    root: BlockId,
    f: impl FnOnce(&mut Graph) -> StsResult<T>,
) -> StsResult<T> {
    let nodes = g.nodes_from(root);
    let snaps = snapshot(g, &nodes);

    for &id in &nodes {
        g.node_mut(id).cached = false;
    }

    let out = f(g);
    restore(g, snaps);
    out
}

/// Value applied to a slot by an intervention.
#[derive(Debug, Clone)]
pub enum Intervention {
    Set(Param),
    /// Use the last column of the node's cached raw draw instead of a
    /// literal value.
    LastCachedDraw,
}

/// Single-node intervention: overwrite the named slots of one block for the
/// duration of `f`, then restore them.
pub fn with_intervene<T>(
    g: &mut Graph,
    id: BlockId,
    assignments: &[(&str, Intervention)],
    f: impl FnOnce(&mut Graph) -> StsResult<T>,
) -> StsResult<T> {
    let mut slots = Vec::with_capacity(assignments.len());
    for (name, _) in assignments {
        match g.node(id).slot_index(name) {
            Some(idx) => slots.push(idx),
            None => {
                return Err(StsError::UnknownParameter {
                    block: id,
                    name: name.to_string(),
                })
            }
        }
    }

    // Resolve every value before mutating anything, so a failed sentinel
    // leaves the graph untouched.
    let mut resolved = Vec::with_capacity(assignments.len());
    for (&idx, (_, intervention)) in slots.iter().zip(assignments) {
        let value = match intervention {
            Intervention::Set(p) => p.clone(),
            Intervention::LastCachedDraw => match &g.node(id).cache {
                Some(cache) => Param::Vector(
                    cache
                        .iter()
                        .map(|row| row.last().copied().unwrap_or(0.0))
                        .collect(),
                ),
                None => return Err(StsError::EmptyCache(id)),
            },
        };
        resolved.push((idx, value));
    }

    let saved: Vec<(usize, Param)> = slots
        .iter()
        .map(|&idx| (idx, g.node(id).params[idx].value.clone()))
        .collect();

    for (idx, value) in resolved {
        g.node_mut(id).params[idx].value = value;
    }

    let out = f(g);
    for (idx, value) in saved {
        g.node_mut(id).params[idx].value = value;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::sample;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(11)
    }

    #[test]
    fn test_forecast_effect_shifts_and_restores() {
        let mut g = Graph::new();
        let rw = g.random_walk(0, 10, 0.0, 1.0, 1.0);
        g.set_cached(rw, true);
        let mut r = rng();
        sample(&mut g, rw, 2, &mut r).unwrap();
        let last: Vec<f64> = g.node(rw).cache.as_ref().unwrap()
            .iter()
            .map(|row| *row.last().unwrap())
            .collect();

        with_forecast(&mut g, rw, 5, |g| {
            let n = g.node(rw);
            assert_eq!((n.t0, n.t1), (11, 16));
            assert!(!n.cached);
            // ic pinned to the last cached column, per row.
            assert_eq!(n.params[2].value, Param::Vector(last.clone()));
            Ok(())
        })
        .unwrap();

        let n = g.node(rw);
        assert_eq!((n.t0, n.t1), (0, 10));
        assert!(n.cached);
        assert_eq!(n.params[2].value, Param::Scalar(1.0));
    }

    #[test]
    fn test_proposal_restores_on_success_and_error() {
        let mut g = Graph::new();
        let rw = g.random_walk(0, 10, Param::Free, Param::Free, 0.0);
        g.set_cached(rw, true);

        with_proposal(&mut g, rw, |g| {
            assert!(!g.node(rw).cached);
            g.set_param(rw, "loc", Param::Scalar(9.0))?;
            g.set_param(rw, "scale", Param::Scalar(2.0))?;
            Ok(())
        })
        .unwrap();
        assert_eq!(g.node(rw).params[0].value, Param::Free);
        assert_eq!(g.node(rw).params[1].value, Param::Free);
        assert!(g.node(rw).cached);

        // Restoration also happens when the closure fails.
        let err: StsResult<()> = with_proposal(&mut g, rw, |g| {
            g.set_param(rw, "loc", Param::Scalar(9.0))?;
            Err(StsError::MissingData)
        });
        assert!(matches!(err, Err(StsError::MissingData)));
        assert_eq!(g.node(rw).params[0].value, Param::Free);
    }

    #[test]
    fn test_proposal_covers_whole_reachable_set() {
        let mut g = Graph::new();
        let trend = g.global_trend(0, 10, Param::Free, 0.5);
        let rw = g.random_walk(0, 10, trend, Param::Free, 0.0);
        let root = g.added(rw, trend);

        with_proposal(&mut g, root, |g| {
            g.set_param(trend, "a", Param::Scalar(1.0))?;
            g.set_param(rw, "scale", Param::Scalar(3.0))?;
            Ok(())
        })
        .unwrap();
        assert_eq!(g.node(trend).params[0].value, Param::Free);
        assert_eq!(g.node(rw).params[1].value, Param::Free);
    }

    #[test]
    fn test_intervene_named_slots() {
        let mut g = Graph::new();
        let rw = g.random_walk(0, 10, 0.0, 1.0, 0.0);

        with_intervene(
            &mut g,
            rw,
            &[("loc", Intervention::Set(Param::Scalar(4.0)))],
            |g| {
                assert_eq!(g.node(rw).params[0].value, Param::Scalar(4.0));
                Ok(())
            },
        )
        .unwrap();
        assert_eq!(g.node(rw).params[0].value, Param::Scalar(0.0));

        let err: StsResult<()> =
            with_intervene(&mut g, rw, &[("nope", Intervention::Set(Param::Free))], |_| Ok(()));
        assert!(matches!(err, Err(StsError::UnknownParameter { .. })));
    }

    #[test]
    fn test_intervene_last_cached_draw_sentinel() {
        let mut g = Graph::new();
        let rw = g.random_walk(0, 10, 0.0, 1.0, 0.0);

        // Sentinel without a cache is a usage error.
        let err: StsResult<()> =
            with_intervene(&mut g, rw, &[("ic", Intervention::LastCachedDraw)], |_| Ok(()));
        assert!(matches!(err, Err(StsError::EmptyCache(_))));

        g.set_cached(rw, true);
        let mut r = rng();
        sample(&mut g, rw, 1, &mut r).unwrap();
        let last = *g.node(rw).cache.as_ref().unwrap()[0].last().unwrap();

        with_intervene(&mut g, rw, &[("ic", Intervention::LastCachedDraw)], |g| {
            assert_eq!(g.node(rw).params[2].value, Param::Vector(vec![last]));
            Ok(())
        })
        .unwrap();
        assert_eq!(g.node(rw).params[2].value, Param::Scalar(0.0));
    }
}
