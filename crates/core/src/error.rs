use ghidra_assistant_model::{ErrorKind, ModelProviderError};

/// An error that ends a conversation.
///
/// Tool failures are not represented here, they are handed back to the
/// model as tool results instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The model backend stayed unavailable for every attempt.
    #[error("model backend unavailable after {attempts} attempts: {reason}")]
    ModelUnavailable {
        /// How many requests were sent.
        attempts: u32,
        /// The error of the last attempt.
        reason: String,
    },
    /// The model backend failed in a way that retrying won't fix.
    #[error("model request failed: {reason}")]
    Model {
        /// The kind reported by the provider.
        kind: ErrorKind,
        /// The provider's error message.
        reason: String,
    },
    /// A tool result does not answer a call of the preceding assistant
    /// message.
    #[error("tool result `{0}` does not answer the preceding assistant message")]
    UnpairedToolResult(String),
}

impl Error {
    pub(crate) fn from_provider(err: &dyn ModelProviderError) -> Self {
        Error::Model {
            kind: err.kind(),
            reason: err.to_string(),
        }
    }
}
