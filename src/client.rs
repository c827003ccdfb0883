use std::collections::HashMap;

use async_std::future;

use crate::config::Config;
use crate::connection::Address;
use crate::errors::{Error, ErrorKind, Result};
use crate::item::Item;
use crate::keys::{validate_key, validate_keys};
use crate::pool::ConnectionPool;
use crate::protocol::{ArithVerb, BinaryCodec, Codec, Request, Response, StoreVerb, TextCodec};
use crate::selector::{ServerList, ServerSelector};

fn codec_for(binary: bool) -> Box<dyn Codec> {
    if binary {
        Box::new(BinaryCodec)
    } else {
        Box::new(TextCodec)
    }
}

/// Routes commands to the right server and reuses connections between calls.
///
/// Every operation validates its keys, borrows a pooled connection for the
/// owning server, runs one request/response exchange under the configured
/// timeout and hands the connection back. Transport failures drop the
/// connection instead. Nothing is retried.
pub struct MemcachedClient {
    selector: Box<dyn ServerSelector>,
    codec: Box<dyn Codec>,
    pool: ConnectionPool,
    config: Config,
}

impl MemcachedClient {
    /// A text-protocol client for a single server with default settings.
    pub fn new(addr: &str) -> MemcachedClient {
        MemcachedClient::with_config(&[addr], Config::default())
    }

    pub fn with_config<A: AsRef<str>>(addrs: &[A], config: Config) -> MemcachedClient {
        MemcachedClient::with_selector(Box::new(ServerList::new(addrs)), config)
    }

    pub fn with_selector(selector: Box<dyn ServerSelector>, config: Config) -> MemcachedClient {
        MemcachedClient {
            selector,
            codec: codec_for(config.binary),
            pool: ConnectionPool::new(config.max_idle_per_address),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Switches between the text and binary protocols. Idle connections
    /// opened under the previous mode are closed.
    pub fn set_binary(&mut self, binary: bool) {
        if self.config.binary == binary {
            return;
        }
        debug!("Switching protocol to {}", if binary { "binary" } else { "text" });
        self.config.binary = binary;
        self.codec = codec_for(binary);
        self.pool.close_all();
    }

    /// Idle connections currently pooled for `addr`.
    pub fn idle_connections(&self, addr: &str) -> usize {
        self.pool.idle_count(&Address::parse(addr))
    }

    /// Fails with `Unsupported` when the active codec cannot carry `request`.
    fn check_supported(&self, request: &Request<'_>) -> Result<()> {
        if self.codec.supports(request) {
            Ok(())
        } else {
            trace!("{:?} is not supported by the {} codec", request, self.codec.name());
            bail!(ErrorKind::Unsupported)
        }
    }

    /// Runs one exchange against `address` and interprets the reply with
    /// `interpret`. The configured timeout bounds the dial and the exchange
    /// together. The connection goes back to the pool unless the outcome is a
    /// transport failure; on timeout it is dropped mid-exchange.
    async fn execute<T, F>(&self, address: &Address, request: &Request<'_>, interpret: F) -> Result<T>
    where
        F: FnOnce(Response) -> Result<T>,
    {
        let mut payload = Vec::new();
        self.codec.encode(request, &mut payload)?;
        let call = async {
            let mut conn = self.pool.acquire(address, self.config.timeout).await?;
            let response = conn.exchange(&*self.codec, request, &payload).await;
            Ok::<_, Error>((conn, response))
        };
        let outcome = match future::timeout(self.config.timeout, call).await {
            Ok(outcome) => outcome,
            Err(elapsed) => Err(elapsed.into()),
        };
        let (conn, response) = match outcome {
            Ok(done) => done,
            Err(err) => {
                warn!("Request to {} failed: {}", address, err);
                return Err(err);
            }
        };
        let result = response.and_then(interpret);
        let healthy = match &result {
            Ok(_) => true,
            Err(err) => !err.is_transport(),
        };
        if let Err(err) = &result {
            if !healthy {
                warn!("Request to {} failed: {}", address, err);
            }
        }
        self.pool.release(conn, healthy);
        result
    }

    pub async fn get(&self, key: &str) -> Result<Item> {
        let request = Request::Get { key };
        self.check_supported(&request)?;
        validate_key(key)?;
        let address = self.selector.pick_server(key)?;
        self.execute(&address, &request, |response| match response {
            Response::Values(items) => items.into_iter().next().ok_or_else(|| ErrorKind::CacheMiss.into()),
            Response::NotFound => Err(ErrorKind::CacheMiss.into()),
            other => Err(error_response(other)),
        })
        .await
    }

    /// Fetches several keys at once. Missing keys are simply absent from
    /// the returned map.
    pub async fn get_multi(&self, keys: &[&str]) -> Result<HashMap<String, Item>> {
        self.check_supported(&Request::GetMulti { keys })?;
        validate_keys(keys)?;
        let mut by_server: Vec<(Address, Vec<&str>)> = Vec::new();
        for &key in keys {
            let address = self.selector.pick_server(key)?;
            match by_server.iter_mut().find(|(a, _)| *a == address) {
                Some((_, batch)) => batch.push(key),
                None => by_server.push((address, vec![key])),
            }
        }
        let mut found = HashMap::with_capacity(keys.len());
        for (address, batch) in &by_server {
            let request = Request::GetMulti { keys: batch };
            let items = self
                .execute(address, &request, |response| match response {
                    Response::Values(items) => Ok(items),
                    other => Err(error_response(other)),
                })
                .await?;
            for item in items {
                found.insert(item.key.clone(), item);
            }
        }
        Ok(found)
    }

    async fn store(&self, verb: StoreVerb, item: &Item) -> Result<()> {
        let request = Request::Store { verb, item };
        self.check_supported(&request)?;
        validate_key(&item.key)?;
        if verb == StoreVerb::Cas && item.cas_id.is_none() {
            bail!(ErrorKind::MissingCasToken);
        }
        if let Some(max) = self.config.max_value_size {
            if item.value.len() > max {
                bail!(ErrorKind::ValueTooLarge(item.value.len(), max));
            }
        }
        let address = self.selector.pick_server(&item.key)?;
        self.execute(&address, &request, |response| match response {
            Response::Stored => Ok(()),
            Response::NotStored => Err(ErrorKind::NotStored.into()),
            Response::Exists => Err(ErrorKind::CasConflict.into()),
            Response::NotFound => Err(ErrorKind::CacheMiss.into()),
            other => Err(error_response(other)),
        })
        .await
    }

    /// Stores the item whether or not the key already exists.
    pub async fn set(&self, item: &Item) -> Result<()> {
        self.store(StoreVerb::Set, item).await
    }

    /// Stores the item only if the key does not exist yet.
    pub async fn add(&self, item: &Item) -> Result<()> {
        self.store(StoreVerb::Add, item).await
    }

    /// Stores the item only if the key already exists.
    pub async fn replace(&self, item: &Item) -> Result<()> {
        self.store(StoreVerb::Replace, item).await
    }

    pub async fn append(&self, item: &Item) -> Result<()> {
        self.store(StoreVerb::Append, item).await
    }

    pub async fn prepend(&self, item: &Item) -> Result<()> {
        self.store(StoreVerb::Prepend, item).await
    }

    /// Stores the item only if nobody changed it since it was fetched.
    /// The item must come from `get` or `get_multi`.
    pub async fn compare_and_swap(&self, item: &Item) -> Result<()> {
        self.store(StoreVerb::Cas, item).await
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        let request = Request::Delete { key };
        self.check_supported(&request)?;
        validate_key(key)?;
        let address = self.selector.pick_server(key)?;
        self.execute(&address, &request, |response| match response {
            Response::Deleted => Ok(()),
            Response::NotFound => Err(ErrorKind::CacheMiss.into()),
            other => Err(error_response(other)),
        })
        .await
    }

    /// Flushes every server.
    pub async fn delete_all(&self) -> Result<()> {
        let request = Request::FlushAll;
        self.check_supported(&request)?;
        for address in self.servers()? {
            self.execute(&address, &request, |response| match response {
                Response::Ok => Ok(()),
                other => Err(error_response(other)),
            })
            .await?;
        }
        Ok(())
    }

    async fn arith(&self, verb: ArithVerb, key: &str, delta: u64) -> Result<u64> {
        let request = Request::Arith { verb, key, delta };
        self.check_supported(&request)?;
        validate_key(key)?;
        let address = self.selector.pick_server(key)?;
        self.execute(&address, &request, |response| match response {
            Response::Numeric(value) => Ok(value),
            Response::NotFound => Err(ErrorKind::CacheMiss.into()),
            other => Err(error_response(other)),
        })
        .await
    }

    /// Adds `delta` to a decimal counter and returns the new value.
    pub async fn increment(&self, key: &str, delta: u64) -> Result<u64> {
        self.arith(ArithVerb::Incr, key, delta).await
    }

    /// Subtracts `delta` from a decimal counter. The server stops at zero.
    pub async fn decrement(&self, key: &str, delta: u64) -> Result<u64> {
        self.arith(ArithVerb::Decr, key, delta).await
    }

    /// Resets a key's expiration without touching its value.
    pub async fn touch(&self, key: &str, seconds: i32) -> Result<()> {
        let request = Request::Touch { key, expiration: seconds };
        self.check_supported(&request)?;
        validate_key(key)?;
        let address = self.selector.pick_server(key)?;
        self.execute(&address, &request, |response| match response {
            Response::Touched => Ok(()),
            Response::NotFound => Err(ErrorKind::CacheMiss.into()),
            other => Err(error_response(other)),
        })
        .await
    }

    /// Checks that every server answers.
    pub async fn ping(&self) -> Result<()> {
        let request = Request::Version;
        self.check_supported(&request)?;
        for address in self.servers()? {
            self.execute(&address, &request, |response| match response {
                Response::Version(version) => {
                    trace!("Server {} runs {}", address, version);
                    Ok(())
                }
                other => Err(error_response(other)),
            })
            .await?;
        }
        Ok(())
    }

    /// General statistics of every server, keyed by address.
    pub async fn stats(&self) -> Result<HashMap<String, HashMap<String, String>>> {
        let request = Request::Stats;
        self.check_supported(&request)?;
        let mut all = HashMap::new();
        for address in self.servers()? {
            let stats = self
                .execute(&address, &request, |response| match response {
                    Response::Stats(stats) => Ok(stats),
                    other => Err(error_response(other)),
                })
                .await?;
            all.insert(address.to_string(), stats);
        }
        Ok(all)
    }

    /// Closes all idle connections. Later calls dial new ones.
    pub fn close(&self) -> Result<()> {
        self.pool.close_all();
        Ok(())
    }

    fn servers(&self) -> Result<Vec<Address>> {
        let servers = self.selector.servers();
        if servers.is_empty() {
            bail!(ErrorKind::NoServers);
        }
        Ok(servers)
    }
}

/// Maps the error replies shared by every command. Anything else is a reply
/// the command cannot produce, so the stream can no longer be trusted.
fn error_response(response: Response) -> Error {
    match response {
        Response::ClientError(reason) => ErrorKind::ClientError(reason).into(),
        Response::ServerError(reason) => ErrorKind::ServerError(reason).into(),
        Response::Error => ErrorKind::ClientError("unknown command".into()).into(),
        other => ErrorKind::Protocol(format!("unexpected response {:?}", other)).into(),
    }
}
