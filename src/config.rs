use std::time::Duration;

use crate::constants::{DEFAULT_MAX_IDLE_CONNS, DEFAULT_TIMEOUT};

/// Client settings, fixed once the client is built.
#[derive(Debug, Clone)]
pub struct Config {
    /// Deadline for dialing and for each request/response exchange.
    pub timeout: Duration,
    /// Speak the binary protocol instead of the text protocol.
    pub binary: bool,
    /// Idle connections kept per address; extra ones are closed on release.
    pub max_idle_per_address: usize,
    /// Reject larger values locally. `None` leaves the limit to the server.
    pub max_value_size: Option<usize>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            timeout: DEFAULT_TIMEOUT,
            binary: false,
            max_idle_per_address: DEFAULT_MAX_IDLE_CONNS,
            max_value_size: None,
        }
    }
}

impl Config {
    pub fn timeout(mut self, timeout: Duration) -> Config {
        self.timeout = timeout;
        self
    }

    pub fn binary(mut self, binary: bool) -> Config {
        self.binary = binary;
        self
    }

    pub fn max_idle_per_address(mut self, max_idle: usize) -> Config {
        self.max_idle_per_address = max_idle;
        self
    }

    pub fn max_value_size(mut self, max: Option<usize>) -> Config {
        self.max_value_size = max;
        self
    }
}
