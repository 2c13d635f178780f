//! Error types shared across Strata components.

/// The result type used throughout strata-core.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An identifier failed to parse.
    #[error("invalid identifier: {message}")]
    InvalidId {
        /// Description of the parse failure.
        message: String,
    },

    /// A configuration value was missing or malformed.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },
}

impl Error {
    /// Creates a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_id_display() {
        let err = Error::InvalidId {
            message: "expected integer".into(),
        };
        assert!(err.to_string().contains("invalid identifier"));
    }

    #[test]
    fn configuration_display() {
        let err = Error::configuration("missing STRATA_BUCKET");
        assert!(err.to_string().contains("missing STRATA_BUCKET"));
    }
}
