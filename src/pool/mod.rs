//! Generic fixed-capacity pool of long-lived items.
//!
//! Capacity is tracked by two bounded channels: `queue` holds idle items and
//! `tokens` holds rights-to-create. At any moment
//! `|queue| + |tokens| + |in flight| == size`. A dedicated spawner task turns
//! tokens into items; an optional recycler retires items past their
//! lifetime. Item creation failures never kill the spawner; local failures
//! (no alive connection) additionally back off to avoid a hot loop.

pub mod stats;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::Error;
use crate::pool::stats::PoolStats;

const DEFAULT_CREATE_TIMEOUT: Duration = Duration::from_secs(3);
const MIN_CREATE_TIMEOUT: Duration = Duration::from_secs(1);
const MIN_ITEM_LIFETIME: Duration = Duration::from_secs(300);
const RECYCLE_TICK: Duration = Duration::from_secs(2);
const CREATE_RETRY_DELAY_ON_LOCAL_ERRORS: Duration = Duration::from_secs(1);
const MIN_POOL_SIZE: usize = 1;

/// Items the pool can manage.
#[async_trait]
pub trait PoolItem: Send + Sync + 'static {
    fn id(&self) -> u64;
    fn alive(&self) -> bool;
    async fn close(&self);
}

/// Creates one pool item within the given timeout.
pub type CreateFn<T> =
    Arc<dyn Fn(Duration) -> BoxFuture<'static, Result<T, Error>> + Send + Sync>;

pub struct PoolConfig<T> {
    pub create_fn: CreateFn<T>,

    /// Limits one creation attempt. Values below 1 s fall back to the 3 s
    /// default.
    pub create_timeout: Duration,

    /// Lifetime after which an item is closed and replaced. Zero disables
    /// recycling; non-zero values below 5 min are treated as zero.
    pub item_lifetime: Duration,

    /// Expiry noise half-width, spreading out recycling of items created
    /// together.
    pub recycle_window: Duration,

    /// Fixed number of items the pool maintains.
    pub pool_size: usize,

    /// Readiness hysteresis thresholds in percent of `pool_size`;
    /// `low < high <= 100` or the pair falls back to (0, 50).
    pub ready_high_pct: u8,
    pub ready_low_pct: u8,
}

impl<T> PoolConfig<T> {
    fn validate(&mut self) {
        if self.create_timeout < MIN_CREATE_TIMEOUT {
            self.create_timeout = DEFAULT_CREATE_TIMEOUT;
        }
        if !self.item_lifetime.is_zero() && self.item_lifetime < MIN_ITEM_LIFETIME {
            self.item_lifetime = Duration::ZERO;
        }
        if self.pool_size < MIN_POOL_SIZE {
            self.pool_size = MIN_POOL_SIZE;
        }
    }
}

struct Inner<T: PoolItem> {
    create_fn: CreateFn<T>,
    create_timeout: Duration,

    item_lifetime: Duration,
    recycle_window: Duration,
    recycling: bool,

    queue_tx: async_channel::Sender<T>,
    queue_rx: async_channel::Receiver<T>,
    tokens_tx: async_channel::Sender<()>,
    tokens_rx: async_channel::Receiver<()>,

    expiry: RwLock<HashMap<u64, Instant>>,

    stats: PoolStats,

    token: CancellationToken,
    closed: AtomicBool,
}

pub struct Pool<T: PoolItem> {
    inner: Arc<Inner<T>>,
    tasks: Arc<parking_lot::Mutex<Vec<JoinHandle<()>>>>,
    close_lock: Arc<tokio::sync::Mutex<bool>>,
}

impl<T: PoolItem> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            tasks: self.tasks.clone(),
            close_lock: self.close_lock.clone(),
        }
    }
}

impl<T: PoolItem> Pool<T> {
    pub fn new(mut cfg: PoolConfig<T>) -> Self {
        cfg.validate();
        Self::start(cfg)
    }

    /// Test hook that skips the minimum-value floors, mirroring production
    /// wiring otherwise.
    #[cfg(test)]
    pub(crate) fn new_unvalidated(cfg: PoolConfig<T>) -> Self {
        Self::start(cfg)
    }

    fn start(cfg: PoolConfig<T>) -> Self {
        let (queue_tx, queue_rx) = async_channel::bounded(cfg.pool_size);
        let (tokens_tx, tokens_rx) = async_channel::bounded(cfg.pool_size);
        for _ in 0..cfg.pool_size {
            tokens_tx
                .try_send(())
                .expect("token channel holds pool_size tokens");
        }

        let (high, low) = stats::thresholds(cfg.pool_size, cfg.ready_high_pct, cfg.ready_low_pct);

        let inner = Arc::new(Inner {
            create_fn: cfg.create_fn,
            create_timeout: cfg.create_timeout,
            item_lifetime: cfg.item_lifetime,
            recycle_window: cfg.recycle_window,
            recycling: !cfg.item_lifetime.is_zero(),
            queue_tx,
            queue_rx,
            tokens_tx,
            tokens_rx,
            expiry: RwLock::new(HashMap::new()),
            stats: PoolStats::new(high, low),
            token: CancellationToken::new(),
            closed: AtomicBool::new(false),
        });

        let mut tasks = vec![tokio::spawn(Self::spawn_items(inner.clone()))];
        if inner.recycling {
            tasks.push(tokio::spawn(Self::recycle_items(inner.clone())));
        }

        debug!(size = cfg.pool_size, "pool created");

        Self {
            inner,
            tasks: Arc::new(parking_lot::Mutex::new(tasks)),
            close_lock: Arc::new(tokio::sync::Mutex::new(false)),
        }
    }

    pub fn ready(&self) -> bool {
        if self.inner.closed.load(Ordering::Acquire) {
            return false;
        }
        self.inner.stats.ready()
    }

    /// Takes an item from the pool, waiting for one to become available.
    /// Dead items encountered on the way are closed and replaced. Returns
    /// `None` once the pool is closed.
    pub async fn acquire(&self) -> Option<T> {
        struct WaitGuard<'a>(&'a PoolStats);
        impl Drop for WaitGuard<'_> {
            fn drop(&mut self) {
                self.0.waiting.dec();
            }
        }

        self.inner.stats.waiting.inc();
        let _guard = WaitGuard(&self.inner.stats);
        self.acquire_inner().await
    }

    async fn acquire_inner(&self) -> Option<T> {
        let inner = &self.inner;
        loop {
            let received = tokio::select! {
                _ = inner.token.cancelled() => return None,
                received = inner.queue_rx.recv() => received,
            };
            let item = received.ok()?;

            inner.stats.idle.dec();
            inner.stats.update_ready();

            if item.alive() {
                inner.stats.in_use.inc();
                inner.stats.update_ready();
                trace!(id = item.id(), "item retrieved from pool");
                return Some(item);
            }

            item.close().await;
            if inner.tokens_tx.try_send(()).is_err() {
                return None;
            }
        }
    }

    /// Returns an item to the pool. Alive, unexpired items go back to the
    /// queue; everything else is closed and a creation token is emitted so
    /// the spawner rebuilds capacity. Never blocks, so it is safe to call
    /// from `Drop` implementations.
    pub fn release(&self, item: T) {
        let inner = &self.inner;
        inner.stats.in_use.dec();

        if item.alive() && (!inner.recycling || !inner.expired(item.id())) {
            inner.stats.idle.inc();
            match inner.queue_tx.try_send(item) {
                Ok(()) => {
                    trace!("item returned to pool");
                    inner.stats.update_ready();
                    return;
                }
                Err(err) => {
                    // Pool is closing; fall through to the recycle path.
                    inner.stats.idle.dec();
                    self.close_detached(err.into_inner());
                    inner.stats.update_ready();
                    return;
                }
            }
        }

        trace!(id = item.id(), "item recycled on release");
        self.close_detached(item);
        inner.stats.update_ready();
    }

    /// Closes `item` on a tracked background task so the caller never
    /// blocks; [`close`](Self::close) joins these tasks.
    fn close_detached(&self, item: T) {
        let tokens_tx = self.inner.tokens_tx.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let task = handle.spawn(async move {
                item.close().await;
                let _ = tokens_tx.try_send(());
            });
            self.tasks.lock().push(task);
        }
    }

    /// Closes the pool: stops background tasks, closes every idle item and
    /// waits for all of it to finish. Safe to call more than once.
    pub async fn close(&self) {
        let mut guard = self.close_lock.lock().await;
        if *guard {
            return;
        }
        *guard = true;

        let inner = &self.inner;
        inner.closed.store(true, Ordering::Release);
        inner.token.cancel();

        // Joins the spawner, the recycler and any in-flight item closes;
        // releases may add more while joining, so drain until empty.
        loop {
            let handles: Vec<_> = self.tasks.lock().drain(..).collect();
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                let _ = handle.await;
            }
        }

        while let Ok(item) = inner.queue_rx.try_recv() {
            inner.stats.idle.dec();
            item.close().await;
        }
        inner.stats.update_ready();

        inner.queue_rx.close();
        inner.tokens_rx.close();

        debug!("pool closed");
    }

    async fn spawn_items(inner: Arc<Inner<T>>) {
        trace!("pool spawner started");
        'spawn: loop {
            let received = tokio::select! {
                _ = inner.token.cancelled() => break 'spawn,
                received = inner.tokens_rx.recv() => received,
            };
            if received.is_err() {
                break 'spawn;
            }

            // One token means one item; retry creation until it exists.
            'create: loop {
                match (inner.create_fn)(inner.create_timeout).await {
                    Ok(item) => {
                        if inner.recycling {
                            inner.set_expiry(item.id());
                        }
                        match inner.queue_tx.send(item).await {
                            Ok(()) => {
                                inner.stats.idle.inc();
                                inner.stats.update_ready();
                            }
                            Err(err) => {
                                // Queue closed mid-shutdown.
                                err.into_inner().close().await;
                                break 'spawn;
                            }
                        }
                        break 'create;
                    }
                    Err(err) => {
                        debug!(error = %err, "pool item create error");
                        if err.is_local_failure() {
                            // Local errors return instantly; wait a bit to
                            // avoid flooding create attempts.
                            tokio::select! {
                                _ = inner.token.cancelled() => break 'spawn,
                                _ = tokio::time::sleep(CREATE_RETRY_DELAY_ON_LOCAL_ERRORS) => {}
                            }
                        }
                        if inner.token.is_cancelled() {
                            break 'spawn;
                        }
                    }
                }
            }
        }
        trace!("pool spawner exited");
    }

    async fn recycle_items(inner: Arc<Inner<T>>) {
        trace!("pool recycler started");
        loop {
            tokio::select! {
                _ = inner.token.cancelled() => break,
                _ = tokio::time::sleep(RECYCLE_TICK) => {}
            }

            let Ok(item) = inner.queue_rx.try_recv() else {
                continue;
            };

            if item.alive() && !inner.expired(item.id()) {
                // Alive and fresh; put it right back.
                let _ = inner.queue_tx.try_send(item);
                continue;
            }

            inner.stats.idle.dec();
            inner.stats.update_ready();
            trace!(id = item.id(), "item recycled");
            item.close().await;
            let _ = inner.tokens_tx.try_send(());
        }
        trace!("pool recycler exited");
    }
}

impl<T: PoolItem> Inner<T> {
    fn set_expiry(&self, id: u64) {
        self.expiry
            .write()
            .insert(id, Instant::now() + self.item_lifetime);
    }

    /// Expiry check with uniform noise in `[-recycle_window, recycle_window)`
    /// so that items created together do not all retire on the same tick.
    fn expired(&self, id: u64) -> bool {
        let expire_at = match self.expiry.read().get(&id).copied() {
            Some(at) => at,
            None => return false,
        };

        let adjusted = if self.recycle_window.is_zero() {
            expire_at
        } else {
            let width = self.recycle_window.as_secs_f64();
            let jitter = rand::thread_rng().gen_range(-width..width);
            if jitter >= 0.0 {
                expire_at + Duration::from_secs_f64(jitter)
            } else {
                expire_at
                    .checked_sub(Duration::from_secs_f64(-jitter))
                    .unwrap_or(expire_at)
            }
        };

        adjusted < Instant::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    struct TestItem {
        id: u64,
        alive: AtomicBool,
        closed: AtomicU64,
    }

    impl TestItem {
        fn new(id: u64) -> Arc<Self> {
            Arc::new(Self {
                id,
                alive: AtomicBool::new(true),
                closed: AtomicU64::new(0),
            })
        }
    }

    #[async_trait]
    impl PoolItem for Arc<TestItem> {
        fn id(&self) -> u64 {
            self.id
        }

        fn alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }

        async fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    type Registry = Arc<parking_lot::Mutex<Vec<Arc<TestItem>>>>;

    /// Creator returning items with strictly increasing ids, recording every
    /// created item.
    fn counting_creator(registry: Registry) -> CreateFn<Arc<TestItem>> {
        let next = Arc::new(AtomicU64::new(1));
        Arc::new(move |_timeout| {
            let registry = registry.clone();
            let next = next.clone();
            Box::pin(async move {
                let item = TestItem::new(next.fetch_add(1, Ordering::SeqCst));
                registry.lock().push(item.clone());
                Ok(item)
            })
        })
    }

    fn config(
        create_fn: CreateFn<Arc<TestItem>>,
        size: usize,
        lifetime: Duration,
        window: Duration,
    ) -> PoolConfig<Arc<TestItem>> {
        PoolConfig {
            create_fn,
            create_timeout: Duration::from_secs(1),
            item_lifetime: lifetime,
            recycle_window: window,
            pool_size: size,
            ready_high_pct: 50,
            ready_low_pct: 0,
        }
    }

    async fn wait_ready(pool: &Pool<Arc<TestItem>>) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !pool.ready() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("pool must become ready");
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_release() {
        let registry: Registry = Default::default();
        let pool = Pool::new(config(
            counting_creator(registry.clone()),
            1,
            Duration::ZERO,
            Duration::ZERO,
        ));

        let item = tokio::time::timeout(Duration::from_secs(1), pool.acquire())
            .await
            .expect("first acquire must not block")
            .expect("pool is open");

        // Pool of one: second acquire blocks until release.
        let second = tokio::time::timeout(Duration::from_millis(100), pool.acquire()).await;
        assert!(second.is_err(), "second acquire must block");

        let id = item.id();
        pool.release(item);

        let item = tokio::time::timeout(Duration::from_secs(1), pool.acquire())
            .await
            .expect("acquire after release must not block")
            .expect("pool is open");
        assert_eq!(item.id(), id, "same item must be reused");
        pool.release(item);

        pool.close().await;
        assert_eq!(registry.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_item_is_replaced_on_acquire() {
        let registry: Registry = Default::default();
        let pool = Pool::new(config(
            counting_creator(registry.clone()),
            1,
            Duration::ZERO,
            Duration::ZERO,
        ));

        let item = pool.acquire().await.expect("pool is open");
        let first_id = item.id();
        item.alive.store(false, Ordering::SeqCst);
        pool.release(item);

        // The dead item was closed and a fresh one spawned in its place.
        let item = tokio::time::timeout(Duration::from_secs(2), pool.acquire())
            .await
            .expect("acquire must observe the replacement")
            .expect("pool is open");
        assert_ne!(item.id(), first_id);
        pool.release(item);

        pool.close().await;
        let registry = registry.lock();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry[0].closed.load(Ordering::SeqCst), 1);
    }

    /// A dead item released right before close is still closed exactly once
    /// by the time close returns; its close runs on a tracked task, not a
    /// fire-and-forget one.
    #[tokio::test(start_paused = true)]
    async fn test_close_joins_in_flight_item_closes() {
        let registry: Registry = Default::default();
        let pool = Pool::new(config(
            counting_creator(registry.clone()),
            1,
            Duration::ZERO,
            Duration::ZERO,
        ));

        let item = pool.acquire().await.expect("pool is open");
        item.alive.store(false, Ordering::SeqCst);
        pool.release(item);

        pool.close().await;

        let registry = registry.lock();
        for item in registry.iter() {
            assert_eq!(item.closed.load(Ordering::SeqCst), 1, "closed exactly once");
        }
    }

    /// Lifetime 5 s with a 1 s recycle window and a 2 s recycler tick:
    /// after 7 s exactly two items were ever created and the first was
    /// closed exactly once by the recycler.
    #[tokio::test(start_paused = true)]
    async fn test_recycle_by_lifetime() {
        let registry: Registry = Default::default();
        let pool = Pool::new_unvalidated(config(
            counting_creator(registry.clone()),
            1,
            Duration::from_secs(5),
            Duration::from_secs(1),
        ));

        tokio::time::sleep(Duration::from_secs(7)).await;

        {
            let registry = registry.lock();
            assert_eq!(registry.len(), 2, "exactly two items must exist");
            assert_eq!(registry[0].closed.load(Ordering::SeqCst), 1);
            assert_eq!(registry[1].closed.load(Ordering::SeqCst), 0);
        }

        pool.close().await;
        let registry = registry.lock();
        assert_eq!(registry.len(), 2);
        for item in registry.iter() {
            assert_eq!(item.closed.load(Ordering::SeqCst), 1);
        }
    }

    /// A creator failing with a local error is retried on the fixed 1 s
    /// back-off: at 0 s, 1 s and 2 s within a 2.5 s window, three calls.
    #[tokio::test(start_paused = true)]
    async fn test_local_error_backoff() {
        let calls = Arc::new(AtomicU64::new(0));
        let create_calls = calls.clone();
        let create_fn: CreateFn<Arc<TestItem>> = Arc::new(move |_timeout| {
            let calls = create_calls.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::LocalFailure)
            })
        });

        let pool = Pool::new(config(create_fn, 1, Duration::ZERO, Duration::ZERO));

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        pool.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_is_idempotent() {
        let registry: Registry = Default::default();
        let pool = Pool::new(config(
            counting_creator(registry.clone()),
            2,
            Duration::ZERO,
            Duration::ZERO,
        ));
        wait_ready(&pool).await;

        pool.close().await;
        pool.close().await;

        assert!(!pool.ready());
        let registry = registry.lock();
        for item in registry.iter() {
            assert_eq!(item.closed.load(Ordering::SeqCst), 1, "closed exactly once");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_after_close_returns_none() {
        let registry: Registry = Default::default();
        let pool = Pool::new(config(
            counting_creator(registry),
            1,
            Duration::ZERO,
            Duration::ZERO,
        ));
        pool.close().await;
        assert!(pool.acquire().await.is_none());
    }

    /// Readiness follows the hysteresis thresholds: pool of 4 at (50, 0)
    /// becomes ready with 2 live items and stays ready until it drains.
    #[tokio::test(start_paused = true)]
    async fn test_ready_indicator() {
        let registry: Registry = Default::default();
        let pool = Pool::new(config(
            counting_creator(registry.clone()),
            4,
            Duration::ZERO,
            Duration::ZERO,
        ));

        wait_ready(&pool).await;
        assert!(pool.ready());

        // Items in use still count towards readiness.
        let a = pool.acquire().await.expect("pool is open");
        let b = pool.acquire().await.expect("pool is open");
        assert!(pool.ready());

        pool.release(a);
        pool.release(b);
        pool.close().await;
        assert!(!pool.ready());
    }
}
