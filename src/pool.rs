//! Per-address free lists of idle connections.
//!
//! The outer map lock is only held long enough to find an address's list, so
//! traffic to different servers never waits on the same lock. Nothing is held
//! across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::connection::{Address, Connection};
use crate::errors::Result;

type FreeList = Arc<Mutex<Vec<Connection>>>;

#[derive(Debug)]
pub struct ConnectionPool {
    max_idle: usize,
    free: Mutex<HashMap<Address, FreeList>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic while holding the lock cannot leave a list half-updated.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ConnectionPool {
    pub fn new(max_idle: usize) -> ConnectionPool {
        ConnectionPool {
            max_idle,
            free: Mutex::new(HashMap::new()),
        }
    }

    fn free_list(&self, address: &Address) -> FreeList {
        let mut free = lock(&self.free);
        match free.get(address) {
            Some(list) => list.clone(),
            None => {
                let list = FreeList::default();
                free.insert(address.clone(), list.clone());
                list
            }
        }
    }

    /// Hands out an idle connection for `address`, dialing a new one when
    /// none is idle. Dial failures are returned as is, never retried.
    pub async fn acquire(&self, address: &Address, timeout: Duration) -> Result<Connection> {
        let idle = lock(&self.free_list(address)).pop();
        match idle {
            Some(conn) => {
                trace!("Reusing idle connection to {}", address);
                Ok(conn)
            }
            None => Connection::connect(address, timeout).await,
        }
    }

    /// Returns a connection after use. Broken connections and connections
    /// beyond the idle limit are closed instead of kept.
    pub fn release(&self, conn: Connection, healthy: bool) {
        if !healthy {
            debug!("Discarding broken connection to {}", conn.address());
            return;
        }
        let list = self.free_list(conn.address());
        let mut idle = lock(&list);
        if idle.len() < self.max_idle {
            idle.push(conn);
        } else {
            trace!("Idle limit reached for {}, closing connection", conn.address());
        }
    }

    /// Closes every idle connection. The pool stays usable afterwards.
    pub fn close_all(&self) {
        let lists: Vec<FreeList> = lock(&self.free).drain().map(|(_, list)| list).collect();
        let closed: usize = lists.iter().map(|list| lock(list).drain(..).count()).sum();
        debug!("Closed {} idle connections", closed);
    }

    pub fn idle_count(&self, address: &Address) -> usize {
        match lock(&self.free).get(address) {
            Some(list) => lock(list).len(),
            None => 0,
        }
    }
}
