//! Error taxonomy shared by every layer of the client.
//!
//! Protocol-level outcomes (`CacheMiss`, `NotStored`, `CasConflict`,
//! `ClientError`, `ServerError`) leave the connection healthy. Transport
//! failures (`Io`, `Timeout`, `Protocol`) always discard it.

error_chain! {
    foreign_links {
        Io(::std::io::Error);
        Timeout(::async_std::future::TimeoutError);
    }

    errors {
        CacheMiss {
            description("cache miss")
            display("memcache: cache miss")
        }
        NotStored {
            description("item not stored")
            display("memcache: item not stored")
        }
        MalformedKey {
            description("malformed key")
            display("malformed: key is too long or contains invalid characters")
        }
        ClientError(reason: String) {
            description("client error")
            display("memcache: client error: {}", reason)
        }
        ServerError(reason: String) {
            description("server error")
            display("memcache: server error: {}", reason)
        }
        CasConflict {
            description("compare-and-swap conflict")
            display("memcache: compare-and-swap conflict")
        }
        Unsupported {
            description("operation not supported")
            display("memcache: operation not supported in this protocol mode")
        }
        NoServers {
            description("no servers configured")
            display("memcache: no servers configured or available")
        }
        MissingCasToken {
            description("item has no CAS token")
            display("memcache: item has no CAS token, fetch it with get first")
        }
        ValueTooLarge(len: usize, max: usize) {
            description("value too large")
            display("memcache: value of {} bytes exceeds the {} byte limit", len, max)
        }
        Protocol(detail: String) {
            description("protocol error")
            display("memcache: protocol error: {}", detail)
        }
    }
}

impl ErrorKind {
    /// True for failures that leave the connection in an unknown state.
    pub fn is_transport(&self) -> bool {
        match self {
            ErrorKind::Io(_) | ErrorKind::Timeout(_) | ErrorKind::Protocol(_) => true,
            _ => false,
        }
    }
}

impl Error {
    pub fn is_transport(&self) -> bool {
        self.kind().is_transport()
    }

    pub fn is_cache_miss(&self) -> bool {
        matches!(self.kind(), ErrorKind::CacheMiss)
    }
}
