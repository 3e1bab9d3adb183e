/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The model backend could not be reached (connection refused, DNS
    /// failure, etc.). Requests failing with this kind may be retried.
    Unavailable,
    /// The request took longer than the configured timeout.
    Timeout,
    /// The content is moderated.
    Moderated,
    /// The model provider is rate limited.
    RateLimitExceeded,
    /// Any other errors.
    Other,
}

impl ErrorKind {
    /// Returns `true` if a request failing with this kind is worth sending
    /// again unchanged.
    #[inline]
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::Unavailable)
    }
}
