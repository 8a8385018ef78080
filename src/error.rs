use crate::graph::BlockId;
use thiserror::Error;

/// Errors surfaced by the block graph, effects, and samplers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StsError {
    /// Forecasting requires the replay cache to be enabled on the root.
    #[error("caching is not enabled for block {0}; enable it before forecasting")]
    CacheDisabled(BlockId),

    /// The cache is enabled but holds no draw yet.
    #[error("cache of block {0} is empty; call sample(...) before forecasting")]
    EmptyCache(BlockId),

    /// A requested batch size disagrees with the cached batch size.
    #[error("requested size {requested} does not match cached batch size {cached}")]
    SizeMismatch { requested: usize, cached: usize },

    /// A time-axis utility was handed an array with an unsupported axis count.
    #[error("expected a 1-d series, got {ndim} axes")]
    UnsupportedShape { ndim: usize },

    /// A named parameter slot does not exist on the block.
    #[error("block {block} has no parameter named `{name}`")]
    UnknownParameter { block: BlockId, name: String },

    /// A vector parameter cannot be broadcast across the batch.
    #[error("vector parameter of length {len} incompatible with batch size {size}")]
    BatchMismatch { len: usize, size: usize },

    /// A dependent block's draw has the wrong number of timesteps for its
    /// consumer (shorter extent, or a `diff`-like transform on the way).
    #[error("block {block} produced rows of length {got}, expected {expected}")]
    ShapeMismatch {
        block: BlockId,
        expected: usize,
        got: usize,
    },

    /// Two series of different lengths cannot be scored against each other.
    #[error("series of length {data} cannot be scored against a draw of length {draw}")]
    LengthMismatch { data: usize, draw: usize },

    /// A distribution was constructed with invalid parameters.
    #[error("invalid distribution parameters: {0}")]
    InvalidDistribution(String),

    /// Las-Vegas sampling hit its safety bound before collecting enough draws.
    #[error("sampler did not converge: {accepted}/{target} accepted after {iterations} iterations")]
    DidNotConverge {
        accepted: usize,
        target: usize,
        iterations: usize,
    },

    /// Posterior sampling was requested without observed data.
    #[error("observed data is required; to sample from the prior call sample(...) on the root block")]
    MissingData,
}

pub type StsResult<T> = Result<T, StsError>;
