use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("Invalid input: {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Misaligned data: asset '{asset}' date index differs from '{reference}' ({detail})")]
    MisalignedData {
        asset: String,
        reference: String,
        detail: String,
    },

    #[error("Dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    #[error("Degenerate variance: portfolio variance {variance:e} is at or below {epsilon:e}")]
    DegenerateVariance { variance: f64, epsilon: f64 },

    #[error("Infeasible region: {0}")]
    InfeasibleRegion(String),

    #[error("Optimization did not converge after {iterations} iterations: {reason}")]
    NotConverged { iterations: u32, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EngineError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn dimension(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        EngineError::DimensionMismatch {
            context: context.into(),
            expected,
            actual,
        }
    }

    pub(crate) fn misaligned_at(
        asset: &str,
        reference: &str,
        position: usize,
        found: Option<NaiveDate>,
        expected: Option<NaiveDate>,
    ) -> Self {
        let show = |d: Option<NaiveDate>| d.map_or_else(|| "<none>".to_string(), |d| d.to_string());
        EngineError::MisalignedData {
            asset: asset.to_string(),
            reference: reference.to_string(),
            detail: format!(
                "row {}: found {}, expected {}",
                position,
                show(found),
                show(expected)
            ),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Serialization(e.to_string())
    }
}
