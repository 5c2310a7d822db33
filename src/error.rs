use thiserror::Error;

/// Error taxonomy for push and delete workflows.
///
/// `Config` and `Remote` are fatal to the run; `NotFound` style mismatches
/// are reported as warnings/outcomes by the callers rather than raised, and
/// `Interrupted` signals that a phase stopped because the shared context
/// entered the error state.
#[derive(Debug, Error)]
pub enum CourierError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("pulp operation failed: {0}")]
    Remote(String),

    #[error("cache flush failed: {0}")]
    CacheFlush(String),

    #[error("interrupted while {0}")]
    Interrupted(String),

    #[error("invalid content: {0}")]
    Invalid(String),

    #[error("push pipeline failed at {0}")]
    Pipeline(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CourierError {
    /// True for errors raised purely because the run was already failing.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, CourierError::Interrupted(_))
    }
}

pub type Result<T> = std::result::Result<T, CourierError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = CourierError::NotFound {
            kind: "advisory",
            name: "RHSA-1234".to_string(),
        };
        assert_eq!(err.to_string(), "advisory not found: RHSA-1234");

        let err = CourierError::Interrupted("writing to queue".to_string());
        assert!(err.is_interrupted());
        assert_eq!(err.to_string(), "interrupted while writing to queue");
    }
}
