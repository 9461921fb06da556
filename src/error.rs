//! Error types for the switchsim circuit simulator.
//!
//! This module provides a unified error type [`SimError`] that covers
//! all error conditions that can occur during netlist parsing, topology
//! validation, and simulation. [`SimError::kind`] groups the variants into
//! the families an embedding application usually branches on.

use thiserror::Error;

/// Result type alias using [`SimError`].
pub type Result<T> = std::result::Result<T, SimError>;

/// Broad classification of a [`SimError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed netlist, invalid parameter, or invalid topology.
    Config,
    /// A runtime API call named a missing element or the wrong element type.
    Lookup,
    /// The conductance matrix could not be factorized or solved.
    Numerical,
    /// The per-step iteration caps were exhausted.
    Convergence,
    /// The transformer flux target lies outside the search bracket.
    SearchBounds,
    /// Writing simulation output failed.
    Io,
}

/// Unified error type for all switchsim operations.
#[derive(Error, Debug)]
pub enum SimError {
    // ============ Netlist / Configuration Errors ============
    /// Malformed netlist line
    #[error("Parse error at line {line}: {message}")]
    ParseError { line: usize, message: String },

    /// Element name prefix does not select a known type
    #[error("Can't determine element type of '{name}' at line {line}")]
    UnknownElementType { name: String, line: usize },

    /// Invalid parameter value or parameter not valid for the element type
    #[error("Invalid parameter '{param}' for element '{element}': {message}")]
    InvalidParameter {
        element: String,
        param: String,
        message: String,
    },

    /// Required parameter missing
    #[error("Element '{element}' must have parameter '{param}'")]
    MissingParameter { element: String, param: String },

    /// Duplicate element name
    #[error("Element '{name}' already used")]
    DuplicateElement { name: String },

    /// Gap in the node numbering
    #[error("Node {node} not seen - node numbers must be dense")]
    NodeNotSeen { node: usize },

    /// Fewer than two nodes referenced
    #[error("Circuit must have at least 2 nodes")]
    TooFewNodes,

    /// Invalid circuit topology (transformer grouping and similar)
    #[error("Invalid circuit topology: {message}")]
    InvalidTopology { message: String },

    /// Invalid simulation parameter
    #[error("Invalid simulation parameter: {message}")]
    InvalidSimulationParam { message: String },

    /// Error reading a netlist file
    #[error("Failed to read netlist file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    // ============ Lookup Errors ============
    /// No element with this name
    #[error("Element '{name}' not found")]
    ElementNotFound { name: String },

    /// Element exists but has a different type
    #[error("Element '{name}' is not a {expected}")]
    WrongElementType { name: String, expected: &'static str },

    // ============ Numerical Errors ============
    /// Matrix is singular and cannot be LU decomposed
    #[error("Can't LU decompose - circuit may have a floating node or short circuit")]
    SingularMatrix,

    /// Triangular solve failed or produced non-finite voltages
    #[error("Can't solve system of equations")]
    SolveFailed,

    // ============ Convergence Errors ============
    /// Iteration caps exhausted in both the primary and the fallback pass
    #[error("Recalc loop did not settle after {iterations} iterations, even with forced diode states")]
    ConvergenceFailure { iterations: usize },

    /// Flux target outside the configured transformer voltage bracket
    #[error(
        "Transformer '{transformer}' out of voltage bounds \
         (target flux {target:.3e}, low bound flux {lobo_flux:.3e}, high bound flux {hibo_flux:.3e})"
    )]
    SearchBounds {
        transformer: String,
        target: f64,
        lobo_flux: f64,
        hibo_flux: f64,
    },

    // ============ Output Errors ============
    /// Error writing probe samples
    #[error("Failed to write trace output: {message}")]
    TraceOutputError { message: String },
}

impl SimError {
    /// Create a parse error
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::ParseError {
            line,
            message: message.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(
        element: impl Into<String>,
        param: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            element: element.into(),
            param: param.into(),
            message: message.into(),
        }
    }

    /// Create a missing parameter error
    pub fn missing_parameter(element: impl Into<String>, param: impl Into<String>) -> Self {
        Self::MissingParameter {
            element: element.into(),
            param: param.into(),
        }
    }

    /// Create an invalid topology error
    pub fn topology(message: impl Into<String>) -> Self {
        Self::InvalidTopology {
            message: message.into(),
        }
    }

    /// The error family this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ParseError { .. }
            | Self::UnknownElementType { .. }
            | Self::InvalidParameter { .. }
            | Self::MissingParameter { .. }
            | Self::DuplicateElement { .. }
            | Self::NodeNotSeen { .. }
            | Self::TooFewNodes
            | Self::InvalidTopology { .. }
            | Self::InvalidSimulationParam { .. }
            | Self::FileReadError { .. } => ErrorKind::Config,
            Self::ElementNotFound { .. } | Self::WrongElementType { .. } => ErrorKind::Lookup,
            Self::SingularMatrix | Self::SolveFailed => ErrorKind::Numerical,
            Self::ConvergenceFailure { .. } => ErrorKind::Convergence,
            Self::SearchBounds { .. } => ErrorKind::SearchBounds,
            Self::TraceOutputError { .. } => ErrorKind::Io,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(SimError::NodeNotSeen { node: 3 }.kind(), ErrorKind::Config);
        assert_eq!(SimError::SingularMatrix.kind(), ErrorKind::Numerical);
        assert_eq!(
            SimError::ConvergenceFailure { iterations: 2048 }.kind(),
            ErrorKind::Convergence
        );
        assert_eq!(
            SimError::ElementNotFound { name: "S1".into() }.kind(),
            ErrorKind::Lookup
        );
    }

    #[test]
    fn test_error_messages() {
        let err = SimError::parse(4, "Two same nodes 1 1");
        assert_eq!(err.to_string(), "Parse error at line 4: Two same nodes 1 1");

        let err = SimError::WrongElementType {
            name: "R1".into(),
            expected: "switch",
        };
        assert_eq!(err.to_string(), "Element 'R1' is not a switch");
    }
}
