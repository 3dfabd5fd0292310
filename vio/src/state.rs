/*!
    Pipeline lifecycle.
*/

use std::fmt;

use tracing::debug;

use vio_types::{Error, Result};

/**
    Lifecycle of a reader or writer.

    ```text
    Closed -> Opening -> Streaming -> Draining -> Closed
                 \           \
                  +-----------+---> Error -> Closed
    ```

    `Draining` is only used by writers. `Error` keeps the failure so every
    later call can report it. Closing is valid from every state.
*/
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum PipelineState {
    #[default]
    Closed,
    Opening,
    Streaming,
    Draining,
    Error(Error),
}

impl PipelineState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Opening => "opening",
            Self::Streaming => "streaming",
            Self::Draining => "draining",
            Self::Error(_) => "error",
        }
    }

    pub fn begin_open(&mut self) -> Result<()> {
        match self {
            Self::Closed => self.enter(Self::Opening),
            _ => Err(self.invalid("opening")),
        }
    }

    pub fn opened(&mut self) -> Result<()> {
        match self {
            Self::Opening => self.enter(Self::Streaming),
            _ => Err(self.invalid("streaming")),
        }
    }

    pub fn begin_drain(&mut self) -> Result<()> {
        match self {
            Self::Streaming => self.enter(Self::Draining),
            _ => Err(self.invalid("draining")),
        }
    }

    /**
        Record a terminal failure. The first failure is kept.
    */
    pub fn fail(&mut self, error: Error) -> Result<()> {
        match self {
            Self::Opening | Self::Streaming => self.enter(Self::Error(error)),
            _ => Err(self.invalid("error")),
        }
    }

    pub fn close(&mut self) {
        if *self != Self::Closed {
            let _ = self.enter(Self::Closed);
        }
    }

    /**
        Succeeds while streaming; otherwise reports why not.
    */
    pub fn ensure_streaming(&self) -> Result<()> {
        match self {
            Self::Streaming => Ok(()),
            Self::Error(e) => Err(e.clone()),
            Self::Closed | Self::Draining => Err(Error::Closed),
            Self::Opening => Err(Error::InvalidState("pipeline is still opening".into())),
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming)
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            Self::Error(e) => Some(e),
            _ => None,
        }
    }

    fn enter(&mut self, next: Self) -> Result<()> {
        debug!(from = self.name(), to = next.name(), "pipeline state change");
        *self = next;
        Ok(())
    }

    fn invalid(&self, to: &str) -> Error {
        Error::InvalidState(format!("cannot go from {} to {to}", self.name()))
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_lifecycle() {
        let mut state = PipelineState::default();
        state.begin_open().unwrap();
        assert!(state.ensure_streaming().is_err());
        state.opened().unwrap();
        state.ensure_streaming().unwrap();
        state.begin_drain().unwrap();
        assert_eq!(state.ensure_streaming(), Err(Error::Closed));
        state.close();
        assert_eq!(state, PipelineState::Closed);
    }

    #[test]
    fn error_is_sticky() {
        let mut state = PipelineState::default();
        state.begin_open().unwrap();
        state.opened().unwrap();
        state.fail(Error::decode("bad")).unwrap();
        assert_eq!(state.ensure_streaming(), Err(Error::decode("bad")));
        assert_eq!(state.ensure_streaming(), Err(Error::decode("bad")));
        assert!(matches!(state.fail(Error::Timeout), Err(Error::InvalidState(_))));
        assert_eq!(state.error(), Some(&Error::decode("bad")));
        state.close();
        assert_eq!(state.ensure_streaming(), Err(Error::Closed));
    }

    #[test]
    fn invalid_transitions_are_errors() {
        let mut state = PipelineState::default();
        assert!(matches!(state.opened(), Err(Error::InvalidState(_))));
        assert!(matches!(state.begin_drain(), Err(Error::InvalidState(_))));
        state.begin_open().unwrap();
        assert!(matches!(state.begin_open(), Err(Error::InvalidState(_))));
        assert!(matches!(state.begin_drain(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn close_is_idempotent() {
        let mut state = PipelineState::Streaming;
        state.close();
        state.close();
        assert_eq!(state, PipelineState::Closed);
    }
}
