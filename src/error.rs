use thiserror::Error;

/// Error taxonomy for the server side of the smart-socket protocol.
///
/// `Protocol` and `ConnectionClosed` are framing-level: the session engine
/// decides whether to answer with `FAIL` (the former) or close silently
/// (the latter). The rest surface from route resolution, handler bodies,
/// and the filesystem abstraction.
#[derive(Error, Debug)]
pub enum AdbServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("unsupported operation")]
    NoRoute,

    #[error("command execution failed: {0}")]
    Handler(String),

    #[error("{0}")]
    Filesystem(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type AdbResult<T> = Result<T, AdbServerError>;
