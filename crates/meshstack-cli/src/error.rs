//! Error types for the CLI

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration, cluster, or release error from the library
    #[error(transparent)]
    Stack(#[from] meshstack_common::Error),

    /// A fatal install stage failed
    #[error("install aborted at stage {stage} ({name}): {cause}")]
    InstallAborted {
        /// Ordinal of the failed stage
        stage: usize,
        /// Name of the failed stage
        name: String,
        /// Why it failed
        cause: String,
    },

    /// Any other command failure
    #[error("command failed: {message}")]
    CommandFailed {
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a command failure
    pub fn command_failed(message: impl Into<String>) -> Self {
        Error::CommandFailed {
            message: message.into(),
        }
    }
}
