use std::error::Error;
use std::fmt;

pub type ClientResult<T> = Result<T, ClientError>;

/// User-facing failures surfaced by the session core and the primitive
/// wrappers.
#[derive(Debug)]
pub enum ClientError {
    /// A caller-supplied argument was rejected before any RPC was issued
    /// (empty partition set, out-of-range index, closed session).
    InvalidArgument(String),
    /// The transport could not be established or kept up within the
    /// configured retry budget.
    Unavailable(String),
    /// The stream handshake window elapsed before OPEN_STREAM arrived.
    Timeout,
    /// The server answered with status ERROR.
    Unknown,
    /// The caller went away before the call completed.
    Canceled,
    NotFound(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::Unavailable(msg) => write!(f, "unavailable: {msg}"),
            Self::Timeout => write!(f, "handshake timed out"),
            Self::Unknown => write!(f, "an unknown error occurred"),
            Self::Canceled => write!(f, "operation canceled"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
        }
    }
}

impl Error for ClientError {}

impl From<anyhow::Error> for ClientError {
    fn from(err: anyhow::Error) -> Self {
        ClientError::Unavailable(format!("{err:#}"))
    }
}

impl From<RpcError> for ClientError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Canceled => ClientError::Canceled,
            RpcError::Transport(err) => ClientError::Unavailable(format!("{err:#}")),
        }
    }
}

pub type RpcResult<T> = Result<T, RpcError>;

/// Transport-level failure of a single RPC attempt. The dispatch loop
/// retries `Transport` under backoff and never retries `Canceled`.
#[derive(Debug)]
pub enum RpcError {
    Transport(anyhow::Error),
    Canceled,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(err) => write!(f, "transport error: {err}"),
            Self::Canceled => write!(f, "rpc canceled"),
        }
    }
}

impl Error for RpcError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transport(err) => Some(err.as_ref()),
            Self::Canceled => None,
        }
    }
}

impl From<anyhow::Error> for RpcError {
    fn from(err: anyhow::Error) -> Self {
        RpcError::Transport(err)
    }
}
