use std::collections::HashSet;
use std::fmt;

use crate::distributions::Bound;
use crate::error::{StsError, StsResult};
use crate::transforms::Transform;

/// Unique identifier for a block in the compute graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub usize);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Value held by a named parameter slot.
///
/// `Free` is the null placeholder: a built-in default distribution is drawn
/// at sample time, and the slot is tracked as a free parameter by guides.
/// `Dep` is a dependency edge on a predecessor block — not a free parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Free,
    Scalar(f64),
    Vector(Vec<f64>),
    Dep(BlockId),
}

impl From<f64> for Param {
    fn from(v: f64) -> Self {
        Param::Scalar(v)
    }
}

impl From<Vec<f64>> for Param {
    fn from(v: Vec<f64>) -> Self {
        Param::Vector(v)
    }
}

impl From<BlockId> for Param {
    fn from(id: BlockId) -> Self {
        Param::Dep(id)
    }
}

/// A named parameter slot with the support of its free value.
#[derive(Debug, Clone)]
pub struct ParamSlot {
    pub name: &'static str,
    pub value: Param,
    pub bound: Bound,
}

/// Generating process of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// f(t) = f(t-1) + loc + scale * w(t), f(0) shifted by ic.
    RandomWalk,
    /// f(t) = beta * f(t-1) + scale * e(t), f(0) = ic + e(0).
    Ar1,
    /// f(t) = loc + e(t) + theta * e(t-1).
    Ma1,
    /// f(t) = a + b * t over linspace(t0, t1).
    GlobalTrend,
    /// Elementwise sum of two operand blocks.
    Added,
    /// Left operand before the changepoint index, right operand after.
    Changepoint,
}

/// A single block record in the graph arena.
#[derive(Debug, Clone)]
pub struct BlockNode {
    pub id: BlockId,
    pub kind: BlockKind,
    pub t0: i64,
    pub t1: i64,
    pub params: Vec<ParamSlot>,
    pub transforms: Vec<Transform>,
    pub preds: Vec<BlockId>,
    pub succs: Vec<BlockId>,
    /// Replay cache mode. When enabled, the first raw draw is stored and
    /// replayed by subsequent sample calls until the cache is cleared.
    pub cached: bool,
    /// The stored raw (pre-transform) draw, shape (size, timesteps).
    pub cache: Option<Vec<Vec<f64>>>,
}

impl BlockNode {
    /// Number of timesteps the block produces (before `diff`-like transforms).
    pub fn timesteps(&self) -> usize {
        (self.t1 - self.t0).max(0) as usize
    }

    /// Index of the named slot, if declared.
    pub fn slot_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|s| s.name == name)
    }
}

/// A free parameter discovered by graph traversal: the owning block, the
/// slot index within it, and the slot's declared support.
#[derive(Debug, Clone)]
pub struct FreeParam {
    pub block: BlockId,
    pub slot: usize,
    pub name: &'static str,
    pub bound: Bound,
}

/// The compute graph: an append-only arena of block records.
///
/// Dependency slots can only name blocks that already exist in the arena, so
/// every edge points backwards and the predecessor relation is acyclic by
/// construction. Edges are fixed at construction time and never rewired.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<BlockNode>,
}

impl Graph {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: BlockId) -> &BlockNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: BlockId) -> &mut BlockNode {
        &mut self.nodes[id.0]
    }

    fn add_node(
        &mut self,
        kind: BlockKind,
        t0: i64,
        t1: i64,
        params: Vec<ParamSlot>,
    ) -> BlockId {
        let id = BlockId(self.nodes.len());
        let preds: Vec<BlockId> = params
            .iter()
            .filter_map(|s| match s.value {
                Param::Dep(dep) => Some(dep),
                _ => None,
            })
            .collect();
        for &dep in &preds {
            self.nodes[dep.0].succs.push(id);
        }
        self.nodes.push(BlockNode {
            id,
            kind,
            t0,
            t1,
            params,
            transforms: Vec::new(),
            preds,
            succs: Vec::new(),
            cached: false,
            cache: None,
        });
        id
    }

    /// Random walk with drift: `f(t) = f(t-1) + loc + scale * w(t)`.
    pub fn random_walk(
        &mut self,
        t0: i64,
        t1: i64,
        loc: impl Into<Param>,
        scale: impl Into<Param>,
        ic: impl Into<Param>,
    ) -> BlockId {
        self.add_node(
            BlockKind::RandomWalk,
            t0,
            t1,
            vec![
                ParamSlot { name: "loc", value: loc.into(), bound: Bound::RealLine },
                ParamSlot { name: "scale", value: scale.into(), bound: Bound::PositiveReal },
                ParamSlot { name: "ic", value: ic.into(), bound: Bound::RealLine },
            ],
        )
    }

    /// Autoregressive process of order 1.
    pub fn ar1(
        &mut self,
        t0: i64,
        t1: i64,
        beta: impl Into<Param>,
        scale: impl Into<Param>,
        ic: impl Into<Param>,
    ) -> BlockId {
        self.add_node(
            BlockKind::Ar1,
            t0,
            t1,
            vec![
                ParamSlot { name: "beta", value: beta.into(), bound: Bound::RealLine },
                ParamSlot { name: "scale", value: scale.into(), bound: Bound::PositiveReal },
                ParamSlot { name: "ic", value: ic.into(), bound: Bound::RealLine },
            ],
        )
    }

    /// Moving average of order 1.
    pub fn ma1(
        &mut self,
        t0: i64,
        t1: i64,
        loc: impl Into<Param>,
        scale: impl Into<Param>,
        theta: impl Into<Param>,
    ) -> BlockId {
        self.add_node(
            BlockKind::Ma1,
            t0,
            t1,
            vec![
                ParamSlot { name: "loc", value: loc.into(), bound: Bound::RealLine },
                ParamSlot { name: "scale", value: scale.into(), bound: Bound::PositiveReal },
                ParamSlot { name: "theta", value: theta.into(), bound: Bound::RealLine },
            ],
        )
    }

    /// Global linear trend `a + b * t`.
    pub fn global_trend(
        &mut self,
        t0: i64,
        t1: i64,
        a: impl Into<Param>,
        b: impl Into<Param>,
    ) -> BlockId {
        self.add_node(
            BlockKind::GlobalTrend,
            t0,
            t1,
            vec![
                ParamSlot { name: "a", value: a.into(), bound: Bound::RealLine },
                ParamSlot { name: "b", value: b.into(), bound: Bound::RealLine },
            ],
        )
    }

    /// Sum combinator: sampling the result adds the operands' draws.
    pub fn added(&mut self, left: BlockId, right: BlockId) -> BlockId {
        let t0 = self.node(left).t0;
        let t1 = self.node(right).t1;
        self.add_node(
            BlockKind::Added,
            t0,
            t1,
            vec![
                ParamSlot { name: "left", value: Param::Dep(left), bound: Bound::RealLine },
                ParamSlot { name: "right", value: Param::Dep(right), bound: Bound::RealLine },
            ],
        )
    }

    /// Changepoint combinator: left's draw before index
    /// `round(frac * timesteps)`, right's draw after.
    pub fn changepoint(
        &mut self,
        left: BlockId,
        right: BlockId,
        frac: impl Into<Param>,
    ) -> BlockId {
        let t0 = self.node(left).t0;
        let t1 = self.node(right).t1;
        self.add_node(
            BlockKind::Changepoint,
            t0,
            t1,
            vec![
                ParamSlot { name: "left", value: Param::Dep(left), bound: Bound::RealLine },
                ParamSlot { name: "right", value: Param::Dep(right), bound: Bound::RealLine },
                ParamSlot {
                    name: "frac",
                    value: frac.into(),
                    bound: Bound::Interval { lower: 0.0, upper: 1.0 },
                },
            ],
        )
    }

    /// Update a named parameter slot with a constant or `Free` value.
    ///
    /// Dependency edges are fixed at construction and cannot be introduced
    /// here; passing `Param::Dep` would rewire the graph and is rejected.
    pub fn set_param(&mut self, id: BlockId, name: &str, value: Param) -> StsResult<()> {
        debug_assert!(
            !matches!(value, Param::Dep(_)),
            "edges are fixed at construction"
        );
        let node = self.node_mut(id);
        match node.params.iter_mut().find(|s| s.name == name) {
            Some(slot) => {
                slot.value = value;
                Ok(())
            }
            None => Err(StsError::UnknownParameter {
                block: id,
                name: name.to_string(),
            }),
        }
    }

    /// Enable or disable the replay cache on a block. Disabling does not
    /// clear a stored draw.
    pub fn set_cached(&mut self, id: BlockId, cached: bool) {
        self.node_mut(id).cached = cached;
    }

    pub fn clear_cache(&mut self, id: BlockId) {
        self.node_mut(id).cache = None;
    }

    fn push_transform(&mut self, id: BlockId, t: Transform) -> BlockId {
        let stack = &mut self.node_mut(id).transforms;
        // Suppress duplicates only against the top of the stack.
        if stack.last() != Some(&t) {
            stack.push(t);
        }
        id
    }

    /// x -> log x. Block paths must be positive for valid output.
    pub fn log(&mut self, id: BlockId) -> BlockId {
        self.push_transform(id, Transform::Log)
    }

    /// x -> exp(x).
    pub fn exp(&mut self, id: BlockId) -> BlockId {
        self.push_transform(id, Transform::Exp)
    }

    /// x -> tanh(x).
    pub fn tanh(&mut self, id: BlockId) -> BlockId {
        self.push_transform(id, Transform::Tanh)
    }

    /// x -> arctanh(x).
    pub fn invtanh(&mut self, id: BlockId) -> BlockId {
        self.push_transform(id, Transform::InvTanh)
    }

    /// x -> 1 / (1 + exp(-x)).
    pub fn invlogit(&mut self, id: BlockId) -> BlockId {
        self.push_transform(id, Transform::InvLogit)
    }

    /// x -> log(x / (1 - x)).
    pub fn logit(&mut self, id: BlockId) -> BlockId {
        self.push_transform(id, Transform::Logit)
    }

    /// x -> floor(x).
    pub fn floor(&mut self, id: BlockId) -> BlockId {
        self.push_transform(id, Transform::Floor)
    }

    /// x -> sin x.
    pub fn sin(&mut self, id: BlockId) -> BlockId {
        self.push_transform(id, Transform::Sin)
    }

    /// x -> cos x.
    pub fn cos(&mut self, id: BlockId) -> BlockId {
        self.push_transform(id, Transform::Cos)
    }

    /// x -> log(1 + exp(x)).
    pub fn softplus(&mut self, id: BlockId) -> BlockId {
        self.push_transform(id, Transform::Softplus)
    }

    /// x -> x[1:] - x[:-1]. Lowers the time dimension by one.
    pub fn diff(&mut self, id: BlockId) -> BlockId {
        self.push_transform(id, Transform::Diff)
    }

    /// x -> log x[1:] - log x[:-1]. Lowers the time dimension by one.
    pub fn logdiff(&mut self, id: BlockId) -> BlockId {
        self.push_transform(id, Transform::LogDiff)
    }

    /// Breadth-first enumeration of all blocks reachable from `root` via
    /// predecessor edges, root first, each block exactly once.
    ///
    /// The order is deterministic for a fixed graph shape: guide draws and
    /// scatter-back operations index positionally against it.
    pub fn nodes_from(&self, root: BlockId) -> Vec<BlockId> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = std::collections::VecDeque::new();
        queue.push_back(root);
        seen.insert(root.0);
        while let Some(id) = queue.pop_front() {
            order.push(id);
            for &pred in &self.node(id).preds {
                if seen.insert(pred.0) {
                    queue.push_back(pred);
                }
            }
        }
        order
    }

    /// Free parameters of every block reachable from `root`, in the same
    /// traversal order as `nodes_from`, slots in declaration order.
    pub fn free_params_from(&self, root: BlockId) -> Vec<FreeParam> {
        let mut out = Vec::new();
        for id in self.nodes_from(root) {
            for (slot, s) in self.node(id).params.iter().enumerate() {
                if matches!(s.value, Param::Free) {
                    out.push(FreeParam {
                        block: id,
                        slot,
                        name: s.name,
                        bound: s.bound,
                    });
                }
            }
        }
        out
    }
}
