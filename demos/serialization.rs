/*!
This is an example of how to keep your own types in memcached, using serde for serializing
and deserializing and the item flags to tag the encoding.
*/
#[macro_use]
extern crate serde_derive;
extern crate serde;
extern crate serde_json;

use async_std::task;
use memcache_async::{Item, MemcachedClient};

const JSON_FLAG: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Data {
    name: String,
    age: u8,
    registered: bool,
}

fn main() {
    task::block_on(async {
        let data = Data {
            name: "Testing".to_owned(),
            age: 8,
            registered: false,
        };
        let memcached = MemcachedClient::new("127.0.0.1:11211");
        println!("Storing {:?}", data);
        let encoded = serde_json::to_vec(&data).unwrap();
        let item = Item::new("testing", encoded)
            .with_flags(JSON_FLAG)
            .with_expiration(10000);
        memcached.set(&item).await.unwrap();

        let rv = memcached.get("testing").await.unwrap();
        println!("Raw data {:?}", String::from_utf8_lossy(&rv.value));
        assert_eq!(rv.flags, JSON_FLAG);
        let parsed: Data = serde_json::from_slice(&rv.value).unwrap();
        println!("Parsed data {:?}", parsed);
    });
}
