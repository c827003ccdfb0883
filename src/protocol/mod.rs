//! Wire codecs. The client only talks to [`Codec`]; the text and binary
//! encodings are interchangeable behind it.

use std::collections::HashMap;
use std::fmt;

use async_std::io::BufRead;
use async_trait::async_trait;

use crate::errors::Result;
use crate::item::Item;

pub mod binary;
pub mod text;

pub use self::binary::BinaryCodec;
pub use self::text::TextCodec;

/// Storage commands sharing the `<verb> <key> <flags> <exptime> <bytes>` shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreVerb {
    Set,
    Add,
    Replace,
    Append,
    Prepend,
    Cas,
}

impl StoreVerb {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreVerb::Set => "set",
            StoreVerb::Add => "add",
            StoreVerb::Replace => "replace",
            StoreVerb::Append => "append",
            StoreVerb::Prepend => "prepend",
            StoreVerb::Cas => "cas",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithVerb {
    Incr,
    Decr,
}

impl ArithVerb {
    pub fn as_str(self) -> &'static str {
        match self {
            ArithVerb::Incr => "incr",
            ArithVerb::Decr => "decr",
        }
    }
}

#[derive(Debug)]
pub enum Request<'a> {
    Get { key: &'a str },
    GetMulti { keys: &'a [&'a str] },
    Store { verb: StoreVerb, item: &'a Item },
    Delete { key: &'a str },
    Arith { verb: ArithVerb, key: &'a str, delta: u64 },
    Touch { key: &'a str, expiration: i32 },
    FlushAll,
    Version,
    Stats,
}

/// A decoded server reply. Error replies are values here, the client
/// decides what they mean for each request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Values(Vec<Item>),
    Stored,
    NotStored,
    Exists,
    NotFound,
    Deleted,
    Touched,
    Ok,
    Numeric(u64),
    Version(String),
    Stats(HashMap<String, String>),
    Error,
    ClientError(String),
    ServerError(String),
}

#[async_trait]
pub trait Codec: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this encoding can carry `request` at all. Checked before any
    /// I/O so unsupported calls never touch the network.
    fn supports(&self, request: &Request<'_>) -> bool;

    fn encode(&self, request: &Request<'_>, buf: &mut Vec<u8>) -> Result<()>;

    /// Reads exactly one reply to `request`. Any error leaves the stream
    /// mid-frame, so the caller must drop the connection.
    async fn decode(
        &self,
        request: &Request<'_>,
        reader: &mut (dyn BufRead + Unpin + Send),
    ) -> Result<Response>;
}
