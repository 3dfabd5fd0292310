/*!
    Error taxonomy shared by every stage of a pipeline.
*/

use thiserror::Error;

/**
    Result alias used across the workspace.
*/
pub type Result<T, E = Error> = std::result::Result<T, E>;

/**
    Errors reported by readers, writers and the stages below them.

    Errors are `Clone` so a pipeline in the `ERROR` state can hand the same
    error back on every later call.
*/
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum Error {
    /// A source or sink cannot be opened, or a format, codec or conversion
    /// is not supported.
    #[error("resource error: {0}")]
    Resource(String),

    /// Malformed container or stream structure.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Sustained decode corruption.
    #[error("decode error: {0}")]
    Decode(String),

    /// Encoder rejection or frame ordering violation.
    #[error("encode error: {0}")]
    Encode(String),

    /// A network session failed while reading or writing.
    #[error("transport error: {0}")]
    Transport(String),

    /// A blocking call did not complete in time. The call may be retried.
    #[error("operation timed out")]
    Timeout,

    /// The pipeline, or the buffer behind it, has been closed.
    #[error("pipeline is closed")]
    Closed,

    /// A lifecycle transition was requested from the wrong state.
    #[error("invalid state transition: {0}")]
    InvalidState(String),
}

impl Error {
    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /**
        Returns true for failures of the network session itself, which a
        reconnect may cure.
    */
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /**
        Returns true if the failed call may simply be retried.
    */
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Resource(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_timeout_is_retryable() {
        assert!(Error::Timeout.is_retryable());
        assert!(!Error::resource("x").is_retryable());
        assert!(!Error::Closed.is_retryable());
    }

    #[test]
    fn display_carries_category() {
        assert_eq!(
            Error::encode("pts 3 <= 4").to_string(),
            "encode error: pts 3 <= 4"
        );
        assert!(Error::transport("reset").is_transport());
    }

    #[test]
    fn io_errors_become_resource_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.mp4");
        assert!(matches!(Error::from(io), Error::Resource(_)));
    }
}
