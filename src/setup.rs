//! Startup sequencing: waiting for the backing store and seeding the fixtures.
//!
//! The server usually starts together with its database in one compose file, so the
//! first connection attempts are expected to fail. The [`Backoff`] helper retries a
//! fallible startup routine with fibonacci-spaced delays until it succeeds or the
//! attempt budget is spent, at which point the caller should exit with the last error.
//!
//! [`Backoff`]: struct.Backoff.html
use std::fmt;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::config::{Fixtures, StartupConfig};
use crate::primitives::directory::UserMap;
use crate::primitives::registrar::ClientMap;

/// Bounded retry with fibonacci-spaced delays.
#[derive(Clone, Debug)]
pub struct Backoff {
    attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
}

impl Backoff {
    /// Retry up to `attempts` times, starting at `initial_delay` between tries and
    /// growing along the fibonacci sequence up to `max_delay`.
    pub fn new(attempts: u32, initial_delay: Duration, max_delay: Duration) -> Backoff {
        Backoff {
            attempts,
            initial_delay,
            max_delay,
        }
    }

    /// Run `operation` until it succeeds or the attempt budget is spent.
    ///
    /// The operation receives the current attempt number, starting at 1. On exhaustion
    /// the error of the final attempt is returned.
    pub fn retry<T, E, F>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Result<T, E>,
        E: fmt::Display,
    {
        let mut delays = self.delays();

        for attempt in 1.. {
            match operation(attempt) {
                Ok(value) => {
                    info!("startup succeeded on attempt {}", attempt);
                    return Ok(value);
                }
                Err(err) if attempt >= self.attempts => {
                    warn!("startup failed, giving up after {} attempts: {}", attempt, err);
                    return Err(err);
                }
                Err(err) => {
                    let delay = delays.next().unwrap_or(self.max_delay);
                    warn!(
                        "startup attempt {} failed, retrying in {:?}: {}",
                        attempt, delay, err
                    );
                    thread::sleep(delay);
                }
            }
        }

        unreachable!("the attempt budget bounds the loop")
    }

    fn delays(&self) -> impl Iterator<Item = Duration> {
        let max = self.max_delay;
        let mut current = self.initial_delay;
        let mut next = self.initial_delay;

        std::iter::from_fn(move || {
            let delay = current.min(max);
            let following = (current + next).min(max);
            current = next;
            next = following;
            Some(delay)
        })
    }
}

impl From<&StartupConfig> for Backoff {
    fn from(config: &StartupConfig) -> Backoff {
        Backoff::new(config.attempts, config.initial_delay, config.max_delay)
    }
}

/// Populate the credential stores from a fixture set.
///
/// Seeding stamps each user's last-seen timestamp, exactly as a fresh login would.
pub fn seed(directory: &mut UserMap, registrar: &mut ClientMap, fixtures: Fixtures) {
    debug!(
        "seeding {} users and {} clients",
        fixtures.users.len(),
        fixtures.clients.len()
    );

    directory.extend(fixtures.users.into_iter().map(Into::into));
    registrar.extend(fixtures.clients.into_iter().map(Into::into));
}
