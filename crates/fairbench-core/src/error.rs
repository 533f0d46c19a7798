// Error types for the benchmark pipeline

use thiserror::Error;

/// Result type alias for benchmark operations
pub type Result<T> = std::result::Result<T, BenchError>;

/// Errors that can occur while measuring a backend
///
/// Only `Config` and `PortsExhausted` are fatal: they abort the run before
/// any measurement starts. Everything else is contained by the orchestrator,
/// which emits a sentinel (all-zero) row and moves on.
#[derive(Debug, Error)]
pub enum BenchError {
    /// Configuration error (bad flag, invalid port range)
    #[error("Configuration error: {0}")]
    Config(String),

    /// No free (address, port) pair within the search budget
    #[error("No free port on {addr} in range {start}..{start}+{attempts}")]
    PortsExhausted {
        addr: String,
        start: u16,
        attempts: u16,
    },

    /// A required external tool is not installed or not on PATH
    #[error("Required tool not available: {0}")]
    ToolMissing(String),

    /// An engine command (docker, multipass) failed
    #[error("Engine command failed: {0}")]
    Engine(String),

    /// The backend never became ready within the probe budget
    #[error("Backend '{0}' did not become ready within the probe budget")]
    NotReady(String),

    /// Load tool invocation failed
    #[error("Load tool error: {0}")]
    LoadTool(String),

    /// Filesystem error (output dir, CSV file)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl BenchError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        BenchError::Config(msg.into())
    }

    /// Create a missing-tool error
    pub fn tool_missing(name: impl Into<String>) -> Self {
        BenchError::ToolMissing(name.into())
    }

    /// Create an engine error
    pub fn engine(msg: impl Into<String>) -> Self {
        BenchError::Engine(msg.into())
    }

    /// Create a load tool error
    pub fn load_tool(msg: impl Into<String>) -> Self {
        BenchError::LoadTool(msg.into())
    }

    /// Whether this error must abort the whole run
    ///
    /// Recoverable errors degrade to a sentinel record instead.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BenchError::Config(_) | BenchError::PortsExhausted { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(BenchError::config("bad port").is_fatal());
        assert!(BenchError::PortsExhausted {
            addr: "127.0.0.1".into(),
            start: 8080,
            attempts: 5,
        }
        .is_fatal());

        assert!(!BenchError::tool_missing("ab").is_fatal());
        assert!(!BenchError::NotReady("vm".into()).is_fatal());
        assert!(!BenchError::load_tool("exit status 1").is_fatal());
    }
}
