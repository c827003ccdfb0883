use std::fmt;

use conhash::{ConsistentHash, Node};

use crate::connection::Address;
use crate::errors::{ErrorKind, Result};

/// Virtual nodes per server on the hash ring.
const NODE_REPLICAS: usize = 100;

/// Maps keys to the server that owns them.
pub trait ServerSelector: Send + Sync {
    fn pick_server(&self, key: &str) -> Result<Address>;

    /// Every server, for commands that fan out (flush, stats, ping).
    fn servers(&self) -> Vec<Address>;
}

#[derive(Debug, Clone)]
struct ServerNode {
    address: Address,
}

impl Node for ServerNode {
    fn name(&self) -> String {
        self.address.to_string()
    }
}

/// A fixed set of servers spread over a consistent-hash ring.
pub struct ServerList {
    addresses: Vec<Address>,
    ring: ConsistentHash<ServerNode>,
}

impl ServerList {
    pub fn new<A: AsRef<str>>(addrs: &[A]) -> ServerList {
        let mut ring = ConsistentHash::new();
        let mut addresses = Vec::with_capacity(addrs.len());
        for addr in addrs {
            let address = Address::parse(addr.as_ref());
            if addresses.contains(&address) {
                continue;
            }
            ring.add(&ServerNode { address: address.clone() }, NODE_REPLICAS);
            addresses.push(address);
        }
        ServerList { addresses, ring }
    }
}

impl fmt::Debug for ServerList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerList")
            .field("addresses", &self.addresses)
            .finish()
    }
}

impl ServerSelector for ServerList {
    fn pick_server(&self, key: &str) -> Result<Address> {
        match self.addresses.len() {
            0 => bail!(ErrorKind::NoServers),
            1 => Ok(self.addresses[0].clone()),
            _ => match self.ring.get(key.as_bytes()) {
                Some(node) => Ok(node.address.clone()),
                None => bail!(ErrorKind::NoServers),
            },
        }
    }

    fn servers(&self) -> Vec<Address> {
        self.addresses.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;

    #[test]
    fn single_server_owns_every_key() {
        let list = ServerList::new(&["127.0.0.1:11211"]);
        for key in &["a", "b", "Hello_世界"] {
            assert_eq!(
                list.pick_server(key).unwrap(),
                Address::Tcp("127.0.0.1:11211".into())
            );
        }
    }

    #[test]
    fn picks_are_stable_and_cover_servers() {
        let list = ServerList::new(&["10.0.0.1:11211", "10.0.0.2:11211", "/tmp/mc.sock"]);
        assert_eq!(list.servers().len(), 3);
        let mut seen = vec![];
        for i in 0..500 {
            let key = format!("key-{}", i);
            let first = list.pick_server(&key).unwrap();
            assert_eq!(first, list.pick_server(&key).unwrap());
            if !seen.contains(&first) {
                seen.push(first);
            }
        }
        assert_eq!(seen.len(), 3);
        assert!(seen.contains(&Address::Unix("/tmp/mc.sock".into())));
    }

    #[test]
    fn duplicates_are_ignored_and_empty_list_fails() {
        let list = ServerList::new(&["a:1", "a:1"]);
        assert_eq!(list.servers().len(), 1);
        let empty = ServerList::new::<&str>(&[]);
        match empty.pick_server("k") {
            Err(Error(ErrorKind::NoServers, _)) => {}
            other => panic!("expected NoServers, got {:?}", other),
        }
    }
}
