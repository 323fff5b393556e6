use thiserror::Error;

/// Coarse classification of an [`NntpError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// `4xx` reply.
    Temporary,
    /// `5xx` reply.
    Permanent,
    /// Well-formed reply carrying a code the command does not expect.
    ReplyMismatch,
    /// Status line does not start with `1`–`5`.
    ProtocolViolation,
    /// Malformed response payload or oversized line.
    DataError,
    /// The peer closed the stream mid-exchange.
    EndOfStream,
    Io,
    Tls,
    Timeout,
    /// Caller misuse detected before anything was sent.
    Usage,
}

#[derive(Debug, Error)]
pub enum NntpError {
    #[error("temporary failure: {0}")]
    Temporary(String),

    #[error("permanent failure: {0}")]
    Permanent(String),

    #[error("unexpected reply: {0}")]
    Reply(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid response data: {0}")]
    Data(String),

    #[error("connection closed by server")]
    Eof,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("operation timed out")]
    Timeout,

    #[error("invalid session state: {0}")]
    InvalidState(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl NntpError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NntpError::Temporary(_) => ErrorKind::Temporary,
            NntpError::Permanent(_) => ErrorKind::Permanent,
            NntpError::Reply(_) => ErrorKind::ReplyMismatch,
            NntpError::Protocol(_) => ErrorKind::ProtocolViolation,
            NntpError::Data(_) => ErrorKind::DataError,
            NntpError::Eof => ErrorKind::EndOfStream,
            NntpError::Io(_) => ErrorKind::Io,
            NntpError::Tls(_) => ErrorKind::Tls,
            NntpError::Timeout => ErrorKind::Timeout,
            NntpError::InvalidState(_) | NntpError::InvalidArgument(_) => ErrorKind::Usage,
        }
    }

    /// Raw server text attached to the error, if any.
    pub fn response(&self) -> Option<&str> {
        match self {
            NntpError::Temporary(resp)
            | NntpError::Permanent(resp)
            | NntpError::Reply(resp)
            | NntpError::Protocol(resp)
            | NntpError::Data(resp) => Some(resp),
            _ => None,
        }
    }

    /// Whether the session can no longer be trusted after this error.
    ///
    /// Stream-level failures leave the reply framing in an unknown position,
    /// so the session has to be closed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            NntpError::Protocol(_)
                | NntpError::Eof
                | NntpError::Io(_)
                | NntpError::Tls(_)
                | NntpError::Timeout
        )
    }
}
