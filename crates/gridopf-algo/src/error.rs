use gridopf_core::{ElementType, GridError};
use thiserror::Error;

/// OPF engine errors.
///
/// Only contract violations end up here. Suspicious data and solver failures
/// are logged and reported through the run result instead.
#[derive(Debug, Error)]
pub enum OpfError {
    /// Reading from or writing to the network failed
    #[error("Network model error: {0}")]
    Network(#[from] GridError),

    /// Invalid parameters
    #[error("OPF configuration error: {0}")]
    Config(String),

    /// An element type was passed where it has no meaning
    #[error("Unsupported element type for {context}: {element_type}")]
    UnsupportedElementType {
        context: &'static str,
        element_type: ElementType,
    },

    /// The model was driven out of order (e.g. applying before solving)
    #[error("OPF model error: {0}")]
    Model(String),
}

pub type OpfResult<T> = Result<T, OpfError>;

impl From<toml::de::Error> for OpfError {
    fn from(err: toml::de::Error) -> Self {
        OpfError::Config(err.to_string())
    }
}

impl From<std::io::Error> for OpfError {
    fn from(err: std::io::Error) -> Self {
        OpfError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_element_display() {
        let err = OpfError::UnsupportedElementType {
            context: "reactive capability curve",
            element_type: ElementType::Line,
        };
        assert_eq!(
            err.to_string(),
            "Unsupported element type for reactive capability curve: line"
        );
    }

    #[test]
    fn test_network_error_conversion() {
        let err: OpfError = GridError::unknown("bus", "B9").into();
        assert!(matches!(err, OpfError::Network(_)));
        assert!(err.to_string().contains("B9"));
    }
}
