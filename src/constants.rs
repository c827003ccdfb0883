use std::time::Duration;

/// Longest key, in bytes, memcached accepts.
pub const KEY_MAXIMUM_SIZE: usize = 250;

/// Per-call deadline used when the caller does not configure one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// Idle connections kept per address when the caller does not configure it.
pub const DEFAULT_MAX_IDLE_CONNS: usize = 2;

pub(crate) const CRLF: &[u8] = b"\r\n";

/// Largest value a reply may announce. Matches memcached's default item size
/// limit; longer announcements are treated as a corrupt stream.
pub const MAX_VALUE_DATA_LEN: usize = 1024 * 1024;
