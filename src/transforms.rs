/// Unary transforms applied, in stack order, to a block's raw draw.
///
/// `Diff` and `LogDiff` lower the time dimension by one; every other
/// transform is elementwise and shape-preserving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    Log,
    Exp,
    Tanh,
    InvTanh,
    InvLogit,
    Logit,
    Floor,
    Sin,
    Cos,
    Softplus,
    Diff,
    LogDiff,
}

/// Cutoff above which softplus(x) is numerically indistinguishable from x.
const SOFTPLUS_LIMIT: f64 = 30.0;

fn softplus(x: f64) -> f64 {
    if x < SOFTPLUS_LIMIT {
        (-x.abs()).exp().ln_1p() + x.max(0.0)
    } else {
        x
    }
}

impl Transform {
    /// Apply the transform to a batch of rows.
    pub fn apply(self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        match self {
            Transform::Diff => rows
                .iter()
                .map(|r| r.windows(2).map(|w| w[1] - w[0]).collect())
                .collect(),
            Transform::LogDiff => rows
                .iter()
                .map(|r| r.windows(2).map(|w| w[1].ln() - w[0].ln()).collect())
                .collect(),
            _ => rows
                .iter()
                .map(|r| r.iter().map(|&x| self.apply_scalar(x)).collect())
                .collect(),
        }
    }

    fn apply_scalar(self, x: f64) -> f64 {
        match self {
            Transform::Log => x.ln(),
            Transform::Exp => x.exp(),
            Transform::Tanh => x.tanh(),
            Transform::InvTanh => x.atanh(),
            Transform::InvLogit => 1.0 / (1.0 + (-x).exp()),
            Transform::Logit => (x / (1.0 - x)).ln(),
            Transform::Floor => x.floor(),
            Transform::Sin => x.sin(),
            Transform::Cos => x.cos(),
            Transform::Softplus => softplus(x),
            Transform::Diff | Transform::LogDiff => unreachable!("row-wise transform"),
        }
    }
}

/// Apply a transform stack in order.
pub fn apply_stack(stack: &[Transform], rows: Vec<Vec<f64>>) -> Vec<Vec<f64>> {
    let mut out = rows;
    for t in stack {
        out = t.apply(&out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_exp_round_trip() {
        let rows = vec![vec![0.5, 1.0, 2.0, 10.0]];
        let out = apply_stack(&[Transform::Log, Transform::Exp], rows.clone());
        for (a, b) in rows[0].iter().zip(&out[0]) {
            assert!((a - b).abs() < 1e-12, "expected {}, got {}", a, b);
        }
    }

    #[test]
    fn test_diff_shrinks_time_axis() {
        let rows = vec![vec![1.0, 3.0, 6.0], vec![0.0, 0.0, 5.0]];
        let out = Transform::Diff.apply(&rows);
        assert_eq!(out[0], vec![2.0, 3.0]);
        assert_eq!(out[1], vec![0.0, 5.0]);
    }

    #[test]
    fn test_logdiff_matches_log_then_diff() {
        let rows = vec![vec![1.0, 2.0, 8.0]];
        let direct = Transform::LogDiff.apply(&rows);
        let composed = apply_stack(&[Transform::Log, Transform::Diff], rows);
        for (a, b) in direct[0].iter().zip(&composed[0]) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_softplus_stable_for_large_inputs() {
        assert_eq!(Transform::Softplus.apply(&[vec![1000.0]])[0][0], 1000.0);
        let small = Transform::Softplus.apply(&[vec![0.0]])[0][0];
        assert!((small - 2.0f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_invlogit_logit_inverse() {
        let p = Transform::InvLogit.apply(&[vec![0.3]])[0][0];
        let back = Transform::Logit.apply(&[vec![p]])[0][0];
        assert!((back - 0.3).abs() < 1e-12);
    }
}
