/*!
    Network session recovery.
*/

use tracing::{error, info, warn};

use vio_types::{Error, Result};

use crate::location::ReconnectPolicy;
use crate::worker::CancelToken;

/**
    Re-opens network sessions after transport failures.

    Only transport failures and timeouts are retried; anything else is
    returned as is. Backoff waits end early when the pipeline is closed, in
    which case the result is `Closed`.

    The policy's attempts are a budget shared by every recovery until a
    session does useful work and the owner calls
    [`session_healthy`](Self::session_healthy). A source that accepts the
    connection and drops it straight away therefore runs out of attempts
    like one that refuses outright. Once the budget is spent the last
    failure surfaces as `Resource`.
*/
#[derive(Debug)]
pub struct ReconnectionManager {
    policy: ReconnectPolicy,
    reconnects: u64,
    /// Attempts used since a session last did useful work.
    spent: u32,
}

impl ReconnectionManager {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            reconnects: 0,
            spent: 0,
        }
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /**
        Number of successful recoveries so far.
    */
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    /**
        Reconnect attempts left before the next failure becomes fatal.
    */
    pub fn attempts_left(&self) -> u32 {
        self.policy.max_attempts.saturating_sub(self.spent)
    }

    /**
        Mark the current session as working, restoring the full attempt
        budget.
    */
    pub fn session_healthy(&mut self) {
        self.spent = 0;
    }

    /**
        Open a session, retrying if the first attempt hits a transport
        failure.
    */
    pub fn open<T>(
        &mut self,
        uri: &str,
        cancel: &CancelToken,
        mut connect: impl FnMut() -> Result<T>,
    ) -> Result<T> {
        match connect() {
            Err(e) if is_recoverable(&e) => {
                warn!(uri, error = %e, "initial connection failed");
                self.retry(uri, cancel, e, connect)
            }
            other => other,
        }
    }

    /**
        Replace a session that failed with `failure`. The caller tears the old
        session down first.
    */
    pub fn recover<T>(
        &mut self,
        uri: &str,
        cancel: &CancelToken,
        failure: &Error,
        connect: impl FnMut() -> Result<T>,
    ) -> Result<T> {
        let session = self.retry(uri, cancel, failure.clone(), connect)?;
        self.reconnects += 1;
        Ok(session)
    }

    fn retry<T>(
        &mut self,
        uri: &str,
        cancel: &CancelToken,
        mut last: Error,
        mut connect: impl FnMut() -> Result<T>,
    ) -> Result<T> {
        let max_attempts = self.policy.max_attempts;

        while self.spent < max_attempts {
            self.spent += 1;
            let attempt = self.spent;
            let delay = self.policy.delay(attempt);
            info!(
                uri,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                "reconnecting"
            );
            if !cancel.sleep(delay) {
                return Err(Error::Closed);
            }

            match connect() {
                Ok(session) => {
                    info!(uri, attempt, "reconnected");
                    return Ok(session);
                }
                Err(e) if is_recoverable(&e) => {
                    warn!(uri, attempt, error = %e, "reconnect attempt failed");
                    last = e;
                }
                Err(e) => return Err(e),
            }
        }

        error!(uri, max_attempts, error = %last, "giving up on reconnecting");
        Err(Error::resource(format!(
            "{uri}: no connection after {max_attempts} reconnect attempts: {last}"
        )))
    }
}

fn is_recoverable(e: &Error) -> bool {
    e.is_transport() || e.is_retryable()
}
