pub mod error;
pub mod types;

mod linalg;

pub mod allocation;
pub mod engine;
pub mod metrics;
pub mod optimizer;
pub mod prices;
pub mod returns;
pub mod risk;

pub use error::EngineError;
pub use types::*;

/// Standard result type for all engine operations
pub type EngineResult<T> = Result<T, EngineError>;
