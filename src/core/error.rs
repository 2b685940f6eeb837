use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Failures raised by the projection engine. All of them are deterministic
/// for a given input, so callers should not retry without changing inputs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// An input is outside its documented domain. Raised before any
    /// projection work starts.
    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// The search range cannot reach the target even at its upper bound.
    #[error(
        "target {target} is unreachable: upper bound {upper_bound} only achieves {achievable}"
    )]
    UnreachableTarget {
        target: f64,
        achievable: f64,
        upper_bound: f64,
    },

    /// Engine configuration is internally inconsistent.
    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl EngineError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}
