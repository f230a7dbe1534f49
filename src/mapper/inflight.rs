//! At-most-one download per key.
//!
//! Callers asking for a key that is already being downloaded get a clone of
//! the pending shared future instead of starting a second request. The entry
//! removes itself when the download settles, so a later request for a key
//! whose download failed starts a fresh one.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use crate::mapper::source::lock;

pub(crate) type Pending<V> = Shared<BoxFuture<'static, V>>;

pub(crate) struct InFlight<K, V: Clone> {
    pending: Arc<Mutex<HashMap<K, Pending<V>>>>,
}

impl<K, V> InFlight<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Join the download for `key`, starting it with `start` if none is
    /// pending. The returned future may be awaited by any number of callers.
    pub fn join<F, Fut>(&self, key: K, start: F) -> Pending<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let mut pending = lock(&self.pending);
        if let Some(existing) = pending.get(&key) {
            return existing.clone();
        }

        let registry = Arc::clone(&self.pending);
        let settled_key = key.clone();
        let download = start();
        let shared = async move {
            let outcome = download.await;
            lock(&registry).remove(&settled_key);
            outcome
        }
        .boxed()
        .shared();

        pending.insert(key, shared.clone());
        shared
    }

    pub fn is_pending(&self, key: &K) -> bool {
        lock(&self.pending).contains_key(key)
    }
}
