pub mod distributions;
pub mod effects;
pub mod error;
pub mod graph;
pub mod guide;
pub mod metrics;
pub mod progress;
pub mod sample;
pub mod sampler;
pub mod transforms;

pub use error::{StsError, StsResult};
pub use graph::{BlockId, Graph, Param};
pub use sample::{forecast, sample};
pub use sampler::{AbcConfig, AbcResult, AbcSampler, Termination};

// Future: importance-weighted posteriors — guides already expose lpdf, so
// accepted draws can be reweighted without touching the rejection loop.
