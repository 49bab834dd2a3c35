use super::session::arena::SessionId;
use std::{error::Error as StdError, fmt, sync::Arc};
use tokio::io::Error as IoError;

/// Errors raised while driving a lazy iterable.
///
/// The error is `Clone` so that a shared in-flight materialization can hand
/// the same failure to every waiter.
#[derive(Debug, Clone)]
pub enum Error {
    /// A synchronous consumer encountered a pending result.
    UnexpectedSuspension,
    /// A snapshot was requested before materialization completed.
    NotResolved,
    /// No session lives in the requested arena slot.
    UnknownSession(SessionId),
    /// A consumer aborted the iteration with a reason.
    Aborted(String),
    IoError(Arc<IoError>),
    /// An error raised by a source or a transform callback.
    Source(Arc<dyn StdError + Send + Sync>),
}

impl Error {
    /// Wraps an arbitrary error raised by a source or a callback.
    pub fn other(e: impl StdError + Send + Sync + 'static) -> Self {
        Self::Source(Arc::new(e))
    }

    pub fn aborted(reason: impl fmt::Display) -> Self {
        Self::Aborted(reason.to_string())
    }
}

impl From<IoError> for Error {
    fn from(e: IoError) -> Self {
        Self::IoError(Arc::new(e))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedSuspension => write!(
                f,
                "encountered a pending result while iterating synchronously"
            ),
            Self::NotResolved => write!(
                f,
                "can not serialize an iterable before it has been materialized"
            ),
            Self::UnknownSession(id) => write!(f, "no open session with id {}", id),
            Self::Aborted(reason) => write!(f, "iteration aborted: {}", reason),
            Self::IoError(e) => write!(f, "encountered an IO error: {:?}", e),
            Self::Source(e) => write!(f, "encountered an error in the source: {}", e),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::IoError(e) => Some(e.as_ref()),
            Self::Source(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}
