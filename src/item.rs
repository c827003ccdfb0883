/// A record stored in or fetched from memcached.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Item {
    pub key: String,
    pub value: Vec<u8>,
    /// Opaque bits round-tripped by the server.
    pub flags: u32,
    /// Seconds from now, 0 for no expiry. Negative and very large values are
    /// passed through for the server to interpret.
    pub expiration: i32,
    /// Version token assigned by the server. Only set on fetched items.
    pub cas_id: Option<u64>,
}

impl Item {
    pub fn new<K, V>(key: K, value: V) -> Item
    where
        K: Into<String>,
        V: Into<Vec<u8>>,
    {
        Item {
            key: key.into(),
            value: value.into(),
            ..Item::default()
        }
    }

    pub fn with_flags(mut self, flags: u32) -> Item {
        self.flags = flags;
        self
    }

    pub fn with_expiration(mut self, seconds: i32) -> Item {
        self.expiration = seconds;
        self
    }
}
