use crate::constants::KEY_MAXIMUM_SIZE;
use crate::errors::{ErrorKind, Result};

/// Checks a key before it goes anywhere near the wire.
///
/// Keys must be 1 to 250 bytes long and may not contain spaces, control
/// bytes or DEL. Any other byte, including multi-byte UTF-8, is allowed.
pub fn validate_key(key: &str) -> Result<()> {
    if legal_key(key) {
        Ok(())
    } else {
        trace!("Rejecting malformed key {:?}", key);
        bail!(ErrorKind::MalformedKey)
    }
}

fn legal_key(key: &str) -> bool {
    let bytes = key.as_bytes();
    if bytes.is_empty() || bytes.len() > KEY_MAXIMUM_SIZE {
        return false;
    }
    bytes.iter().all(|&b| b > b' ' && b != 0x7f)
}

/// Validates a whole batch; one bad key fails all of them.
pub fn validate_keys(keys: &[&str]) -> Result<()> {
    keys.iter().try_for_each(|key| validate_key(key))
}
