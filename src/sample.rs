//! Draws sample paths from the block graph.
//!
//! Graph structure lives in `graph`; this module walks it. A draw of a
//! composite block recursively draws its operand blocks, so every node's
//! own cache and transform stack participate.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use crate::effects::with_forecast;
use crate::error::{StsError, StsResult};
use crate::graph::{BlockId, BlockKind, Graph, Param};
use crate::transforms::apply_stack;

/// Built-in distribution drawn for a `Free` slot at sample time.
#[derive(Debug, Clone, Copy)]
enum DefaultDraw {
    StdNormal,
    StdLogNormal,
    Uniform,
    Zero,
}

/// Draw a batch of `size` paths from `root`, shape (size, timesteps).
///
/// With the replay cache enabled on `root`, the first call stores the raw
/// (pre-transform) draw and later calls replay it — ignoring `size` — until
/// the cache is cleared. Transforms are re-applied on every call.
pub fn sample(
    g: &mut Graph,
    root: BlockId,
    size: usize,
    rng: &mut ChaCha8Rng,
) -> StsResult<Vec<Vec<f64>>> {
    let node = g.node(root);
    let transforms = node.transforms.clone();

    if node.cached {
        if let Some(cache) = &node.cache {
            return Ok(apply_stack(&transforms, cache.clone()));
        }
        let raw = draw_raw(g, root, size, rng)?;
        g.node_mut(root).cache = Some(raw.clone());
        return Ok(apply_stack(&transforms, raw));
    }

    let raw = draw_raw(g, root, size, rng)?;
    Ok(apply_stack(&transforms, raw))
}

/// Forecast `nt` timesteps past the cached draw, continuing each path from
/// its last cached value with the parameters left untouched.
///
/// Requires the replay cache to be enabled and populated on `root`, and
/// `size` to match the cached batch size.
pub fn forecast(
    g: &mut Graph,
    root: BlockId,
    size: usize,
    nt: usize,
    rng: &mut ChaCha8Rng,
) -> StsResult<Vec<Vec<f64>>> {
    let node = g.node(root);
    if !node.cached {
        return Err(StsError::CacheDisabled(root));
    }
    let cached = match &node.cache {
        Some(cache) => cache.len(),
        None => return Err(StsError::EmptyCache(root)),
    };
    if size != cached {
        return Err(StsError::SizeMismatch {
            requested: size,
            cached,
        });
    }

    // For a changepoint root the split is fixed in the past: the future is
    // generated by the right operand alone.
    let target = match g.node(root).kind {
        BlockKind::Changepoint => match g.node(root).params[1].value {
            Param::Dep(right) => right,
            _ => root,
        },
        _ => root,
    };

    with_forecast(g, root, nt, |g| sample(g, target, size, rng))
}

fn draw_raw(
    g: &mut Graph,
    id: BlockId,
    size: usize,
    rng: &mut ChaCha8Rng,
) -> StsResult<Vec<Vec<f64>>> {
    let node = g.node(id);
    let kind = node.kind;
    let t0 = node.t0;
    let t1 = node.t1;
    let t = node.timesteps();
    let values: Vec<Param> = node.params.iter().map(|s| s.value.clone()).collect();

    match kind {
        BlockKind::RandomWalk => {
            let loc = resolve_matrix(g, &values[0], size, t, DefaultDraw::StdNormal, rng)?;
            let scale = resolve_matrix(g, &values[1], size, t, DefaultDraw::StdLogNormal, rng)?;
            let ic = resolve_column(g, &values[2], size, DefaultDraw::Zero, rng)?;

            let mut paths = vec![vec![0.0; t]; size];
            for r in 0..size {
                let mut acc = ic[r];
                for j in 0..t {
                    let z: f64 = rng.sample(StandardNormal);
                    acc += loc[r][j] + scale[r][j] * z;
                    paths[r][j] = acc;
                }
            }
            Ok(paths)
        }
        BlockKind::Ar1 => {
            let beta = resolve_matrix(g, &values[0], size, t, DefaultDraw::Uniform, rng)?;
            let scale = resolve_matrix(g, &values[1], size, t, DefaultDraw::StdLogNormal, rng)?;
            let ic = resolve_column(g, &values[2], size, DefaultDraw::Zero, rng)?;

            let mut paths = vec![vec![0.0; t]; size];
            for r in 0..size {
                for j in 0..t {
                    let z: f64 = rng.sample(StandardNormal);
                    let noise = scale[r][j] * z;
                    paths[r][j] = if j == 0 {
                        ic[r] + noise
                    } else {
                        beta[r][j] * paths[r][j - 1] + noise
                    };
                }
            }
            Ok(paths)
        }
        BlockKind::Ma1 => {
            let loc = resolve_matrix(g, &values[0], size, t, DefaultDraw::Uniform, rng)?;
            let scale = resolve_matrix(g, &values[1], size, t, DefaultDraw::StdLogNormal, rng)?;
            let theta = resolve_matrix(g, &values[2], size, t, DefaultDraw::Uniform, rng)?;

            let mut paths = vec![vec![0.0; t]; size];
            for r in 0..size {
                // One extra leading noise column so e(t-1) exists at t = 0.
                let mut noise = Vec::with_capacity(t + 1);
                let z: f64 = rng.sample(StandardNormal);
                noise.push(scale[r].first().copied().unwrap_or(0.0) * z);
                for j in 0..t {
                    let z: f64 = rng.sample(StandardNormal);
                    noise.push(scale[r][j] * z);
                }
                for j in 0..t {
                    paths[r][j] = loc[r][j] + noise[j + 1] + theta[r][j] * noise[j];
                }
            }
            Ok(paths)
        }
        BlockKind::GlobalTrend => {
            let a = resolve_matrix(g, &values[0], size, t, DefaultDraw::StdNormal, rng)?;
            let b = resolve_matrix(g, &values[1], size, t, DefaultDraw::StdNormal, rng)?;

            let step = if t > 1 {
                (t1 - t0) as f64 / (t - 1) as f64
            } else {
                0.0
            };
            let paths = (0..size)
                .map(|r| {
                    (0..t)
                        .map(|j| {
                            let time = t0 as f64 + step * j as f64;
                            a[r][j] + b[r][j] * time
                        })
                        .collect()
                })
                .collect();
            Ok(paths)
        }
        BlockKind::Added => {
            let left = sample_dep(g, &values[0], size, t, rng)?;
            let right = sample_dep(g, &values[1], size, t, rng)?;
            Ok(left
                .into_iter()
                .zip(right)
                .map(|(l, r)| l.iter().zip(&r).map(|(a, b)| a + b).collect())
                .collect())
        }
        BlockKind::Changepoint => {
            let left = sample_dep(g, &values[0], size, t, rng)?;
            let right = sample_dep(g, &values[1], size, t, rng)?;
            let frac = resolve_frac(g, &values[2], size, rng)?;

            let cut = |f: f64| ((f * t as f64).round() as usize).min(t);
            if frac.len() == 1 {
                let k = cut(frac[0]);
                Ok(splice_rows(&left, &right, |_| k))
            } else {
                // Per-row splice: the changepoint varies across the batch.
                Ok(splice_rows(&left, &right, |r| cut(frac[r])))
            }
        }
    }
}

fn splice_rows(
    left: &[Vec<f64>],
    right: &[Vec<f64>],
    cut: impl Fn(usize) -> usize,
) -> Vec<Vec<f64>> {
    left.iter()
        .zip(right)
        .enumerate()
        .map(|(r, (l, rt))| {
            let k = cut(r).min(l.len()).min(rt.len());
            let mut row = Vec::with_capacity(rt.len());
            row.extend_from_slice(&l[..k]);
            row.extend_from_slice(&rt[k..]);
            row
        })
        .collect()
}

fn sample_dep(
    g: &mut Graph,
    value: &Param,
    size: usize,
    t: usize,
    rng: &mut ChaCha8Rng,
) -> StsResult<Vec<Vec<f64>>> {
    match value {
        Param::Dep(dep) => {
            let rows = sample(g, *dep, size, rng)?;
            expect_shape(*dep, rows, size, t)
        }
        // Combinator slots are always dependency edges by construction.
        _ => unreachable!("combinator operand is not a dependency edge"),
    }
}

/// Validate a dependent draw against its consumer's batch size and
/// timesteps before any indexing happens. A `diff`-like transform on the
/// dependency, or a mismatched time extent, surfaces here.
fn expect_shape(
    id: BlockId,
    rows: Vec<Vec<f64>>,
    size: usize,
    t: usize,
) -> StsResult<Vec<Vec<f64>>> {
    if rows.len() != size {
        return Err(StsError::BatchMismatch {
            len: rows.len(),
            size,
        });
    }
    if let Some(row) = rows.iter().find(|r| r.len() != t) {
        return Err(StsError::ShapeMismatch {
            block: id,
            expected: t,
            got: row.len(),
        });
    }
    Ok(rows)
}

/// Resolve a parameter slot to a (size, timesteps) matrix.
///
/// Scalars broadcast everywhere, vectors are per-row batch values, free
/// slots draw one default value per row, and dependencies sample the
/// predecessor block.
fn resolve_matrix(
    g: &mut Graph,
    value: &Param,
    size: usize,
    t: usize,
    default: DefaultDraw,
    rng: &mut ChaCha8Rng,
) -> StsResult<Vec<Vec<f64>>> {
    match value {
        Param::Scalar(v) => Ok(vec![vec![*v; t]; size]),
        Param::Vector(v) => {
            let col = broadcast_rows(v, size)?;
            Ok(col.into_iter().map(|x| vec![x; t]).collect())
        }
        Param::Free => Ok((0..size)
            .map(|_| vec![default_draw(default, rng); t])
            .collect()),
        Param::Dep(dep) => {
            let rows = sample(g, *dep, size, rng)?;
            expect_shape(*dep, rows, size, t)
        }
    }
}

/// Resolve a per-row column (used for initial conditions).
fn resolve_column(
    g: &mut Graph,
    value: &Param,
    size: usize,
    default: DefaultDraw,
    rng: &mut ChaCha8Rng,
) -> StsResult<Vec<f64>> {
    match value {
        Param::Scalar(v) => Ok(vec![*v; size]),
        Param::Vector(v) => broadcast_rows(v, size),
        Param::Free => Ok((0..size).map(|_| default_draw(default, rng)).collect()),
        Param::Dep(dep) => {
            let rows = sample(g, *dep, size, rng)?;
            if rows.len() != size {
                return Err(StsError::BatchMismatch {
                    len: rows.len(),
                    size,
                });
            }
            Ok(rows
                .iter()
                .map(|r| r.last().copied().unwrap_or(0.0))
                .collect())
        }
    }
}

/// Resolve a changepoint fraction: length 1 (single splice) or `size`
/// (per-row splice).
fn resolve_frac(
    g: &mut Graph,
    value: &Param,
    size: usize,
    rng: &mut ChaCha8Rng,
) -> StsResult<Vec<f64>> {
    match value {
        Param::Scalar(v) => Ok(vec![*v]),
        Param::Free => Ok(vec![rng.gen::<f64>()]),
        Param::Vector(v) => {
            if v.len() == 1 || v.len() == size {
                Ok(v.clone())
            } else {
                Err(StsError::BatchMismatch {
                    len: v.len(),
                    size,
                })
            }
        }
        Param::Dep(dep) => {
            let rows = sample(g, *dep, size, rng)?;
            if rows.len() != size {
                return Err(StsError::BatchMismatch {
                    len: rows.len(),
                    size,
                });
            }
            Ok(rows
                .iter()
                .map(|r| r.first().copied().unwrap_or(0.0))
                .collect())
        }
    }
}

fn broadcast_rows(v: &[f64], size: usize) -> StsResult<Vec<f64>> {
    if v.len() == size {
        Ok(v.to_vec())
    } else if v.len() == 1 {
        Ok(vec![v[0]; size])
    } else {
        Err(StsError::BatchMismatch {
            len: v.len(),
            size,
        })
    }
}

fn default_draw(kind: DefaultDraw, rng: &mut ChaCha8Rng) -> f64 {
    match kind {
        DefaultDraw::StdNormal => rng.sample(StandardNormal),
        DefaultDraw::StdLogNormal => {
            let z: f64 = rng.sample(StandardNormal);
            z.exp()
        }
        DefaultDraw::Uniform => rng.gen::<f64>(),
        DefaultDraw::Zero => 0.0,
    }
}
