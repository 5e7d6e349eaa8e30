//! Error types for canopy-core.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for canopy-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in canopy-core.
///
/// Stage failures of the build pipeline are reported separately through
/// [`crate::pipeline::StageFailure`], which carries a classification. This
/// enum covers the operations those stages are built from.
#[derive(Debug, Error)]
pub enum Error {
    /// A required build input was empty or malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Filesystem operation failed on a specific path.
    #[error("I/O error at {}: {source}", path.display())]
    Fs {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// IO error without path context.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An external tool could not be launched.
    #[error("failed to launch {}: {source}", program.display())]
    ToolSpawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Probing the ambient environment failed.
    #[error("environment error: {0}")]
    Environment(String),
}

impl Error {
    /// Create an I/O error with path context.
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Fs {
            path: path.into(),
            source,
        }
    }

    /// Create a tool launch error.
    pub fn tool_spawn(program: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ToolSpawn {
            program: program.into(),
            source,
        }
    }

    /// Get a recovery hint for this error, if one applies.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ToolSpawn { .. } => Some(
                "the toolchain may be incomplete; delete the versioned directory under ~/.config/canopy and rebuild",
            ),
            Self::Environment(_) => {
                Some("set CANOPY_RUNTIME_DIR to the canopy runtime template directory")
            }
            _ => None,
        }
    }

    /// Format the error together with its recovery hint.
    pub fn with_hint(&self) -> String {
        match self.hint() {
            Some(hint) => format!("{self}\n  hint: {hint}"),
            None => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fs_error_mentions_path() {
        let err = Error::fs(
            "/tmp/build/file_names.txt",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let message = err.to_string();
        assert!(message.contains("/tmp/build/file_names.txt"));
        assert!(message.contains("denied"));
    }

    #[test]
    fn test_with_hint() {
        let err = Error::Environment("runtime template not found".to_string());
        assert!(err.with_hint().contains("CANOPY_RUNTIME_DIR"));

        let err = Error::InvalidInput("empty canister name".to_string());
        assert_eq!(err.with_hint(), "invalid input: empty canister name");
    }
}
