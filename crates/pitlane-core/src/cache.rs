use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Result every waiter on a construction observes. Errors are shared, not cloned.
pub type Resolution<A, E> = std::result::Result<Arc<A>, Arc<E>>;

type Construction<A, E> = Shared<BoxFuture<'static, Resolution<A, E>>>;

/// Default number of agents kept alive by the web server.
pub const DEFAULT_CAPACITY: usize = 100;

struct Entry<A> {
    agent: Arc<A>,
    /// Recency marker; key into `State::order`.
    tick: u64,
}

struct State<A, E> {
    entries: HashMap<String, Entry<A>>,
    /// tick → key, least recently used first.
    order: BTreeMap<u64, String>,
    pending: HashMap<String, Construction<A, E>>,
    /// Monotonic; every recency event takes a fresh value, so there are no ties.
    tick: u64,
}

impl<A, E> State<A, E> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            pending: HashMap::new(),
            tick: 0,
        }
    }

    /// Mark `key` most recently used and return its agent.
    fn touch(&mut self, key: &str) -> Option<Arc<A>> {
        let entry = self.entries.get_mut(key)?;
        self.tick += 1;
        self.order.remove(&entry.tick);
        self.order.insert(self.tick, key.to_string());
        entry.tick = self.tick;
        Some(entry.agent.clone())
    }

    /// Insert a freshly constructed agent, evicting the LRU entry first when full.
    fn commit(&mut self, key: &str, agent: Arc<A>, capacity: usize) -> Option<String> {
        debug_assert!(!self.entries.contains_key(key));

        let mut victim = None;
        if self.entries.len() >= capacity {
            if let Some((_, lru)) = self.order.pop_first() {
                self.entries.remove(&lru);
                victim = Some(lru);
            }
        }

        self.tick += 1;
        self.order.insert(self.tick, key.to_string());
        self.entries.insert(
            key.to_string(),
            Entry {
                agent,
                tick: self.tick,
            },
        );
        victim
    }

    fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.order.remove(&entry.tick);
                true
            }
            None => false,
        }
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    constructions: AtomicU64,
    failures: AtomicU64,
    evictions: AtomicU64,
    removals: AtomicU64,
}

struct Inner<A, E> {
    capacity: usize,
    state: Mutex<State<A, E>>,
    counters: Counters,
}

impl<A, E> Inner<A, E> {
    // Critical sections never panic, so a poisoned lock still holds consistent state.
    fn lock(&self) -> MutexGuard<'_, State<A, E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Called exactly once per construction, from inside the shared future.
    fn settle(&self, key: &str, resolution: &Resolution<A, E>)
    where
        E: fmt::Display,
    {
        let mut state = self.lock();
        state.pending.remove(key);

        match resolution {
            Ok(agent) => {
                self.counters.constructions.fetch_add(1, Ordering::Relaxed);
                if let Some(victim) = state.commit(key, agent.clone(), self.capacity) {
                    self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                    info!(
                        "Agent cache full ({}), evicted least recently used session: {}",
                        self.capacity, victim
                    );
                }
                debug!("Agent cache size: {}/{}", state.entries.len(), self.capacity);
            }
            Err(e) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                warn!("Agent construction failed for session {}: {}", key, e);
            }
        }
    }
}

/// Poll `construction` to completion on the ambient tokio runtime, independent
/// of any caller. Outside a runtime the callers drive it themselves.
fn drive<A, E>(construction: Construction<A, E>)
where
    A: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(construction.map(|_| ()));
    }
}

/// Clears the pending marker if a construction unwinds before settling.
struct PendingGuard<A, E> {
    inner: Weak<Inner<A, E>>,
    key: String,
    armed: bool,
}

impl<A, E> Drop for PendingGuard<A, E> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(inner) = self.inner.upgrade() {
            inner.lock().pending.remove(&self.key);
        }
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub pending: usize,
    /// Lookups answered from a committed entry.
    pub hits: u64,
    /// Lookups that started a construction.
    pub misses: u64,
    /// Lookups that joined a construction already in flight.
    pub coalesced: u64,
    pub constructions: u64,
    pub failures: u64,
    /// Entries dropped to make room for a new one.
    pub evictions: u64,
    /// Entries dropped through `evict`.
    pub removals: u64,
}

/// Bounded, single-flight, least-recently-used map from session id to agent.
///
/// Bookkeeping sits behind one short-held mutex; constructors run outside it.
/// Concurrent callers asking for a key that is being built all await the same
/// shared construction, which commits its own result into the cache when it
/// resolves. Inside a tokio runtime the construction is also spawned as its own
/// task, so it completes even if every caller goes away mid-wait.
///
/// Cloning is cheap and yields a handle to the same cache.
pub struct AgentCache<A, E> {
    inner: Arc<Inner<A, E>>,
}

impl<A, E> Clone for AgentCache<A, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A, E> fmt::Debug for AgentCache<A, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("AgentCache")
            .field("capacity", &self.inner.capacity)
            .field("size", &state.entries.len())
            .field("pending", &state.pending.len())
            .finish()
    }
}

impl<A, E> AgentCache<A, E>
where
    A: Send + Sync + 'static,
    E: fmt::Display + Send + Sync + 'static,
{
    /// Create a cache holding at most `capacity` agents.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "agent cache capacity must be positive");
        Self {
            inner: Arc::new(Inner {
                capacity,
                state: Mutex::new(State::new()),
                counters: Counters::default(),
            }),
        }
    }

    /// Return the agent for `key`, building it with `constructor` if absent.
    ///
    /// A committed entry is returned immediately and marked most recently used.
    /// If another caller is already building `key`, this call waits for that
    /// construction and shares its outcome. Otherwise this call starts the only
    /// construction for `key`; a failure is handed to every waiter and leaves
    /// the key absent so the next caller retries.
    pub async fn get_or_create<F, Fut>(
        &self,
        key: impl Into<String>,
        constructor: F,
    ) -> Resolution<A, E>
    where
        F: FnOnce(String) -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<A, E>> + Send + 'static,
    {
        let key = key.into();

        let (construction, started) = {
            let mut state = self.inner.lock();

            if let Some(agent) = state.touch(&key) {
                self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Using cached agent for session: {}", key);
                return Ok(agent);
            }

            match state.pending.get(&key) {
                Some(construction) => {
                    self.inner.counters.coalesced.fetch_add(1, Ordering::Relaxed);
                    debug!("Waiting on in-flight agent construction for session: {}", key);
                    (construction.clone(), false)
                }
                None => {
                    self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
                    let construction = self.construction(key.clone(), constructor);
                    state.pending.insert(key, construction.clone());
                    (construction, true)
                }
            }
        };

        if started {
            drive(construction.clone());
        }
        construction.await
    }

    fn construction<F, Fut>(&self, key: String, constructor: F) -> Construction<A, E>
    where
        F: FnOnce(String) -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<A, E>> + Send + 'static,
    {
        let inner = Arc::downgrade(&self.inner);

        async move {
            let mut guard = PendingGuard {
                inner: inner.clone(),
                key: key.clone(),
                armed: true,
            };

            info!("Creating new agent for session: {}", key);
            let resolution = constructor(key.clone())
                .await
                .map(Arc::new)
                .map_err(Arc::new);

            if let Some(inner) = inner.upgrade() {
                inner.settle(&key, &resolution);
            }
            guard.armed = false;

            resolution
        }
        .boxed()
        .shared()
    }

    /// Return the committed agent for `key` without constructing one.
    ///
    /// A hit counts as a use for eviction purposes.
    pub fn get(&self, key: &str) -> Option<Arc<A>> {
        let agent = self.inner.lock().touch(key);
        if agent.is_some() {
            self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
        }
        agent
    }

    /// Remove the committed entry for `key`. Returns whether one was removed.
    ///
    /// Agents already handed out stay valid; in-flight constructions are untouched.
    pub fn evict(&self, key: &str) -> bool {
        let removed = self.inner.lock().remove(key);
        if removed {
            self.inner.counters.removals.fetch_add(1, Ordering::Relaxed);
            info!("Manually evicted agent for session: {}", key);
        }
        removed
    }

    /// Drop every committed entry. Constructions in flight still commit afterwards.
    pub fn clear(&self) {
        let count = {
            let mut state = self.inner.lock();
            let count = state.entries.len();
            state.entries.clear();
            state.order.clear();
            count
        };
        info!("Cleared agent cache ({} agents removed)", count);
    }
}

impl<A, E> AgentCache<A, E> {
    /// Number of committed entries. Pending constructions are not counted.
    pub fn size(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Whether `key` has a committed entry. Does not affect recency.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Committed keys from least to most recently used.
    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().order.values().cloned().collect()
    }

    pub fn stats(&self) -> CacheStats {
        let (size, pending) = {
            let state = self.inner.lock();
            (state.entries.len(), state.pending.len())
        };
        let c = &self.inner.counters;

        CacheStats {
            size,
            capacity: self.inner.capacity,
            pending,
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            coalesced: c.coalesced.load(Ordering::Relaxed),
            constructions: c.constructions.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
            evictions: c.evictions.load(Ordering::Relaxed),
            removals: c.removals.load(Ordering::Relaxed),
        }
    }
}
