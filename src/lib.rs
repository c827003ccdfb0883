/*!
A memcached client implemented only in rust, speaking either the text protocol or
the binary protocol (`get`/`set` only), with per-address connection pooling and
consistent hashing to spread keys over several servers.
# Example
```rust,no_run
use async_std::sync::Arc;
use async_std::task;

use memcache_async::{Item, MemcachedClient};

#[async_std::main]
async fn main() {
    // Use arc for threading support
    let client = Arc::new(MemcachedClient::new("127.0.0.1:11211"));

    client.set(&Item::new("string", "value").with_flags(42)).await.unwrap();
    let item = client.get("string").await.unwrap();
    assert_eq!(item.value, b"value");
    assert_eq!(item.flags, 42);

    // Tasks example
    let mut handles = vec![];
    for i in 0..4 {
        let client = client.clone();
        handles.push(task::spawn(async move {
            let data = format!("data_n{}", i);
            client.set(&Item::new(data.as_str(), data.as_str())).await.unwrap();
            let item = client.get(&data).await.unwrap();
            client.delete(&data).await.unwrap();
            item.value
        }));
    }
    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await, format!("data_n{}", i).into_bytes());
    }
}
```
*/
#![forbid(unsafe_code)]
extern crate byteorder;
extern crate conhash;
#[macro_use]
extern crate enum_primitive;
#[macro_use]
extern crate log;
#[macro_use]
extern crate error_chain;

mod client;
pub mod config;
pub mod connection;
pub mod constants;
pub mod errors;
pub mod item;
pub mod keys;
pub mod pool;
pub mod protocol;
pub mod selector;

pub use client::MemcachedClient;
pub use config::Config;
pub use connection::Address;
pub use errors::{Error, ErrorKind, Result};
pub use item::Item;
pub use selector::{ServerList, ServerSelector};
