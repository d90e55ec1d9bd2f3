//! Shared, reference-counted repository handles.
//!
//! [`HandlePool`] opens one handle per location and lends it out through
//! scope-bound [`Lease`]s. Releasing a lease never closes the handle; a
//! background sweeper, woken by every release, waits for a quiet period and
//! then closes handles nobody has borrowed for the idle timeout.
//!
//! Borrow, release and eviction all run under the pool mutex, so a handle is
//! removed from the map and closed in one step and can never be closed while
//! borrowed.

use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::error::SdkResult;

/// A handle the pool can open and close.
pub trait PooledResource: Send + Sync + Sized + 'static {
    /// Settings passed to every `open`.
    type Options: Send + Sync + 'static;

    fn open(location: &Path, options: &Self::Options) -> SdkResult<Self>;

    /// Called exactly once, when the handle is evicted or the pool dropped.
    fn close(&self) -> SdkResult<()>;
}

struct Entry<H> {
    handle: Arc<H>,
    borrowers: usize,
    released_at: Instant,
}

struct State<H> {
    entries: HashMap<PathBuf, Entry<H>>,
    next_sweep: Option<Instant>,
    shutdown: bool,
}

struct Shared<H: PooledResource> {
    state: Mutex<State<H>>,
    wake: Condvar,
    sweep_delay: Duration,
    idle_timeout: Duration,
    options: H::Options,
}

impl<H: PooledResource> Shared<H> {
    fn lock(&self) -> MutexGuard<'_, State<H>> {
        self.state.lock().expect("lock poisoned")
    }

    /// Close every unborrowed handle idle for at least the timeout, and
    /// schedule the next sweep for whatever is still waiting to expire.
    fn evict_idle(&self, state: &mut State<H>, now: Instant) {
        let expired: Vec<PathBuf> = state
            .entries
            .iter()
            .filter(|(_, e)| e.borrowers == 0 && now.duration_since(e.released_at) >= self.idle_timeout)
            .map(|(location, _)| location.clone())
            .collect();

        for location in expired {
            if let Some(entry) = state.entries.remove(&location) {
                match entry.handle.close() {
                    Ok(()) => info!(location = %location.display(), "evicted idle handle"),
                    Err(e) => warn!(location = %location.display(), error = %e, "closing evicted handle failed"),
                }
            }
        }

        state.next_sweep = state
            .entries
            .values()
            .filter(|e| e.borrowers == 0)
            .map(|e| e.released_at + self.idle_timeout)
            .min();
    }
}

/// Per-location diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandleStats {
    pub borrowers: usize,
}

pub struct HandlePool<H: PooledResource> {
    shared: Arc<Shared<H>>,
    sweeper: Option<JoinHandle<()>>,
}

impl<H: PooledResource> HandlePool<H> {
    pub fn new(config: &PoolConfig, options: H::Options) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                entries: HashMap::new(),
                next_sweep: None,
                shutdown: false,
            }),
            wake: Condvar::new(),
            sweep_delay: config.sweep_delay(),
            idle_timeout: config.idle_timeout(),
            options,
        });
        let sweeper = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("godb-pool-sweeper".into())
                .spawn(move || sweep_loop(&shared))
                .ok()
        };
        if sweeper.is_none() {
            warn!("could not spawn pool sweeper; idle handles close when the pool drops");
        }
        Self { shared, sweeper }
    }

    /// Borrow the handle for `location`, opening it on first use.
    pub fn borrow(&self, location: impl AsRef<Path>) -> SdkResult<Lease<'_, H>> {
        let location = location.as_ref().to_path_buf();
        let mut state = self.shared.lock();
        let handle = match state.entries.get_mut(&location) {
            Some(entry) => {
                entry.borrowers += 1;
                Arc::clone(&entry.handle)
            }
            None => {
                let handle = Arc::new(H::open(&location, &self.shared.options)?);
                debug!(location = %location.display(), "opened handle");
                state.entries.insert(
                    location.clone(),
                    Entry {
                        handle: Arc::clone(&handle),
                        borrowers: 1,
                        released_at: Instant::now(),
                    },
                );
                handle
            }
        };
        Ok(Lease {
            pool: self,
            location,
            handle,
            _not_send: PhantomData,
        })
    }

    fn release(&self, location: &Path) {
        let mut state = self.shared.lock();
        let now = Instant::now();
        if let Some(entry) = state.entries.get_mut(location) {
            entry.borrowers = entry.borrowers.saturating_sub(1);
            entry.released_at = now;
        }
        state.next_sweep = Some(now + self.shared.sweep_delay);
        self.shared.wake.notify_all();
    }

    /// Borrower counts per cached location.
    pub fn stats(&self) -> BTreeMap<PathBuf, HandleStats> {
        self.shared
            .lock()
            .entries
            .iter()
            .map(|(location, e)| (location.clone(), HandleStats { borrowers: e.borrowers }))
            .collect()
    }

    pub fn is_cached(&self, location: impl AsRef<Path>) -> bool {
        self.shared.lock().entries.contains_key(location.as_ref())
    }

    pub fn options(&self) -> &H::Options {
        &self.shared.options
    }
}

impl<H: PooledResource> Drop for HandlePool<H> {
    fn drop(&mut self) {
        self.shared.lock().shutdown = true;
        self.shared.wake.notify_all();
        if let Some(sweeper) = self.sweeper.take() {
            let _ = sweeper.join();
        }
        // Leases borrow the pool, so nothing is borrowed any more.
        let mut state = self.shared.lock();
        for (location, entry) in state.entries.drain() {
            if let Err(e) = entry.handle.close() {
                warn!(location = %location.display(), error = %e, "closing handle failed");
            }
        }
    }
}

fn sweep_loop<H: PooledResource>(shared: &Shared<H>) {
    let mut state = shared.lock();
    loop {
        if state.shutdown {
            return;
        }
        match state.next_sweep {
            None => {
                state = shared.wake.wait(state).expect("lock poisoned");
            }
            Some(due) => {
                let now = Instant::now();
                if now < due {
                    state = shared
                        .wake
                        .wait_timeout(state, due - now)
                        .expect("lock poisoned")
                        .0;
                } else {
                    shared.evict_idle(&mut state, now);
                }
            }
        }
    }
}

/// A borrowed handle. Releases on drop; bound to the borrowing scope.
pub struct Lease<'p, H: PooledResource> {
    pool: &'p HandlePool<H>,
    location: PathBuf,
    handle: Arc<H>,
    _not_send: PhantomData<*const ()>,
}

impl<H: PooledResource> Lease<'_, H> {
    pub fn location(&self) -> &Path {
        &self.location
    }
}

impl<H: PooledResource> Deref for Lease<'_, H> {
    type Target = H;

    fn deref(&self) -> &H {
        &self.handle
    }
}

impl<H: PooledResource> Drop for Lease<'_, H> {
    fn drop(&mut self) {
        self.pool.release(&self.location);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    #[derive(Default)]
    struct Counters {
        opened: AtomicUsize,
        closed: AtomicUsize,
    }

    struct CountingHandle {
        counters: Arc<Counters>,
        closed: AtomicUsize,
    }

    impl PooledResource for CountingHandle {
        type Options = Arc<Counters>;

        fn open(_location: &Path, counters: &Arc<Counters>) -> SdkResult<Self> {
            counters.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Self {
                counters: Arc::clone(counters),
                closed: AtomicUsize::new(0),
            })
        }

        fn close(&self) -> SdkResult<()> {
            assert_eq!(self.closed.fetch_add(1, Ordering::SeqCst), 0, "closed twice");
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn pool(sweep_delay_ms: u64, idle_timeout_ms: u64) -> (HandlePool<CountingHandle>, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let config = PoolConfig {
            sweep_delay_ms,
            idle_timeout_ms,
        };
        (HandlePool::new(&config, Arc::clone(&counters)), counters)
    }

    fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        done()
    }

    // ---- Borrowing ----

    #[test]
    fn one_handle_per_location() {
        let (pool, counters) = pool(1_000, 1_000);
        let a = pool.borrow("/repo/a").unwrap();
        let b = pool.borrow("/repo/a").unwrap();
        let c = pool.borrow("/repo/c").unwrap();
        assert!(std::ptr::eq(&*a, &*b));
        assert!(!std::ptr::eq(&*a, &*c));
        assert_eq!(counters.opened.load(Ordering::SeqCst), 2);
        assert_eq!(pool.stats()[Path::new("/repo/a")].borrowers, 2);
        drop((a, b, c));
        assert_eq!(pool.stats()[Path::new("/repo/a")].borrowers, 0);
        assert!(pool.is_cached("/repo/a"));
    }

    #[test]
    fn open_failure_is_not_cached() {
        struct Broken;
        impl PooledResource for Broken {
            type Options = ();
            fn open(location: &Path, _: &()) -> SdkResult<Self> {
                Err(crate::SdkError::Open {
                    location: location.to_path_buf(),
                    reason: "unreachable".into(),
                })
            }
            fn close(&self) -> SdkResult<()> {
                Ok(())
            }
        }
        let pool = HandlePool::<Broken>::new(&PoolConfig::default(), ());
        assert!(pool.borrow("/nowhere").is_err());
        assert!(!pool.is_cached("/nowhere"));
    }

    // ---- Eviction ----

    #[test]
    fn idle_handle_closed_once_after_timeout() {
        let (pool, counters) = pool(10, 30);
        drop(pool.borrow("/repo").unwrap());
        assert!(wait_until(Duration::from_secs(2), || !pool.is_cached("/repo")));
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);

        // A fresh borrow reopens.
        drop(pool.borrow("/repo").unwrap());
        assert_eq!(counters.opened.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn borrowed_handle_is_never_closed() {
        let (pool, counters) = pool(5, 10);
        let held = pool.borrow("/repo").unwrap();
        // Another location's release triggers sweeps.
        drop(pool.borrow("/other").unwrap());
        assert!(wait_until(Duration::from_secs(2), || !pool.is_cached("/other")));
        thread::sleep(Duration::from_millis(50));
        assert!(pool.is_cached("/repo"));
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
        drop(held);
    }

    #[test]
    fn drop_closes_remaining_handles() {
        let (pool, counters) = pool(60_000, 60_000);
        drop(pool.borrow("/a").unwrap());
        drop(pool.borrow("/b").unwrap());
        drop(pool);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_borrowers_share_one_open() {
        const BORROWERS: usize = 8;
        let (pool, counters) = pool(5, 20);
        let all_holding = Barrier::new(BORROWERS);
        let all_checked = Barrier::new(BORROWERS);
        thread::scope(|scope| {
            for _ in 0..BORROWERS {
                scope.spawn(|| {
                    let lease = pool.borrow("/shared").unwrap();
                    all_holding.wait();
                    assert_eq!(pool.stats()[Path::new("/shared")].borrowers, BORROWERS);
                    assert_eq!(lease.closed.load(Ordering::SeqCst), 0);
                    all_checked.wait();
                });
            }
        });
        assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
        assert!(wait_until(Duration::from_secs(2), || !pool.is_cached("/shared")));
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn churning_borrowers_never_see_a_closed_handle() {
        let (pool, counters) = pool(5, 20);
        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        let lease = pool.borrow("/shared").unwrap();
                        assert_eq!(lease.closed.load(Ordering::SeqCst), 0);
                    }
                });
            }
        });
        assert!(wait_until(Duration::from_secs(2), || !pool.is_cached("/shared")));
        let opened = counters.opened.load(Ordering::SeqCst);
        assert!(opened >= 1);
        assert_eq!(counters.closed.load(Ordering::SeqCst), opened);
    }
}
