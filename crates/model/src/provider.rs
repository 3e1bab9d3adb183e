use std::error::Error;

use crate::error::ErrorKind;
use crate::request::ModelRequest;
use crate::response::ModelResponse;

/// The error type for a model provider.
pub trait ModelProviderError: Error + Send + Sync + 'static {
    /// Returns the kind of this error.
    fn kind(&self) -> ErrorKind;
}

/// A type that represents a model backend.
///
/// Once the provider is created, it should behave like a stateless object,
/// since many conversation runs share one provider at the same time. It
/// can still have internal state (connection pools and the like), but
/// callers should not rely on it.
pub trait ModelProvider: Send + Sync {
    /// The error type that may be returned by the provider.
    type Error: ModelProviderError;

    /// The response type for this provider.
    type Response: ModelResponse<Error = Self::Error>;

    /// Sends a request to the model.
    ///
    /// When [`ModelRequest::stream`] is `false`, implementations may wait
    /// for the complete answer before resolving, but must still report it
    /// through the same event interface as a streaming response.
    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static;
}
