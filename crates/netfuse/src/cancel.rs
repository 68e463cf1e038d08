//! Cancellation plumbing between the native call path and the call channel.
//!
//! The native side hands each operation a receive-only [`Interrupt`]; the
//! channel side needs an explicit "tear this call down" action. A pooled
//! [`CancelToken`] bridges the two: it arms a watcher task that forwards a
//! fire of one side into the other, and its release is epoch-guarded so a
//! stale watcher can never cancel a call that reused the token.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use tokio::sync::{Notify, watch};

/// Receive-only cancellation signal handed to every native operation.
///
/// Cloning is cheap and all clones observe the same fire. Once fired it
/// stays fired for the lifetime of the call.
#[derive(Clone, Default)]
pub struct Interrupt {
    inner: Arc<InterruptInner>,
}

#[derive(Default)]
struct InterruptInner {
    fired: AtomicBool,
    notify: Notify,
}

impl Interrupt {
    pub fn new() -> Interrupt {
        Interrupt::default()
    }

    pub fn fire(&self) {
        self.inner.fired.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_fired(&self) -> bool {
        self.inner.fired.load(Ordering::SeqCst)
    }

    /// Completes once the signal has fired. Cancellation safe.
    pub async fn fired(&self) {
        loop {
            if self.is_fired() {
                return;
            }
            let notified = self.inner.notify.notified();
            if self.is_fired() {
                return;
            }
            notified.await;
        }
    }
}

/// One reusable token core: a watch channel carrying an epoch counter.
///
/// Arming subscribes a watcher at the current epoch; releasing bumps the
/// epoch, which both wakes any parked watcher and invalidates a watcher
/// that is already past its select but has not acted yet.
struct TokenCore {
    epoch: u64,
    tx: watch::Sender<u64>,
}

/// Pool of cancellation tokens, one acquired per in-flight call.
///
/// Tokens return to the pool on every exit path via the guard's `Drop`, so
/// steady-state operation allocates nothing per call.
#[derive(Default)]
pub(crate) struct CancelPool {
    free: Mutex<Vec<TokenCore>>,
}

impl CancelPool {
    pub(crate) fn new() -> CancelPool {
        CancelPool::default()
    }

    /// Takes a token out of the pool, minting one if the pool is empty.
    pub(crate) fn acquire(&self) -> CancelToken<'_> {
        let mut core = {
            let mut free = self.free.lock().expect("cancel pool poisoned");
            free.pop()
        }
        .unwrap_or_else(|| TokenCore {
            epoch: 0,
            tx: watch::channel(0).0,
        });

        core.epoch += 1;
        let _ = core.tx.send_replace(core.epoch);

        CancelToken {
            pool: self,
            core: Some(core),
        }
    }

    #[cfg(test)]
    fn idle(&self) -> usize {
        self.free.lock().expect("cancel pool poisoned").len()
    }
}

/// Guard for one call's exclusive use of a pooled token.
pub(crate) struct CancelToken<'a> {
    pool: &'a CancelPool,
    core: Option<TokenCore>,
}

impl CancelToken<'_> {
    /// Arms a watcher that runs `target` when `fire` completes, unless the
    /// token has been released first.
    pub(crate) fn forward<F, T>(&self, fire: F, target: T)
    where
        F: Future<Output = ()> + Send + 'static,
        T: FnOnce() + Send + 'static,
    {
        let core = self.core.as_ref().expect("token already released");
        let epoch = core.epoch;
        let mut rx = core.tx.subscribe();

        tokio::spawn(async move {
            tokio::select! {
                _ = fire => {
                    // A release may have slipped in between the wakeup and
                    // this check; the epoch comparison keeps a recycled
                    // token from cancelling somebody else's call.
                    if *rx.borrow() == epoch {
                        target();
                    }
                }
                _ = rx.changed() => {}
            }
        });
    }
}

impl Drop for CancelToken<'_> {
    fn drop(&mut self) {
        if let Some(mut core) = self.core.take() {
            core.epoch += 1;
            let _ = core.tx.send_replace(core.epoch);
            if let Ok(mut free) = self.pool.free.lock() {
                free.push(core);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn interrupt_fires_all_clones() {
        let intr = Interrupt::new();
        let other = intr.clone();

        let waiter = tokio::spawn(async move { other.fired().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        intr.fire();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(intr.is_fired());
    }

    #[tokio::test]
    async fn interrupt_fired_before_wait_returns_immediately() {
        let intr = Interrupt::new();
        intr.fire();
        tokio::time::timeout(Duration::from_millis(100), intr.fired())
            .await
            .expect("already-fired interrupt must not block");
    }

    #[tokio::test]
    async fn armed_token_forwards_fire() {
        let pool = CancelPool::new();
        let intr = Interrupt::new();
        let target = Interrupt::new();

        let token = pool.acquire();
        let src = intr.clone();
        let dst = target.clone();
        token.forward(async move { src.fired().await }, move || dst.fire());

        intr.fire();
        tokio::time::timeout(Duration::from_secs(1), target.fired())
            .await
            .expect("cancellation should propagate");
        drop(token);
    }

    #[tokio::test]
    async fn released_token_does_not_forward() {
        let pool = CancelPool::new();
        let intr = Interrupt::new();
        let target = Interrupt::new();

        let token = pool.acquire();
        let src = intr.clone();
        let dst = target.clone();
        token.forward(async move { src.fired().await }, move || dst.fire());
        drop(token);

        intr.fire();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!target.is_fired());
    }

    #[tokio::test]
    async fn token_returns_to_pool_once() {
        let pool = CancelPool::new();
        assert_eq!(pool.idle(), 0);

        let token = pool.acquire();
        assert_eq!(pool.idle(), 0);
        drop(token);
        assert_eq!(pool.idle(), 1);

        // Reuse keeps the pool at a single core.
        let token = pool.acquire();
        drop(token);
        assert_eq!(pool.idle(), 1);
    }

    #[tokio::test]
    async fn recycled_token_still_forwards_for_new_call() {
        let pool = CancelPool::new();

        let first = pool.acquire();
        drop(first);

        let intr = Interrupt::new();
        let target = Interrupt::new();
        let token = pool.acquire();
        let src = intr.clone();
        let dst = target.clone();
        token.forward(async move { src.fired().await }, move || dst.fire());

        intr.fire();
        tokio::time::timeout(Duration::from_secs(1), target.fired())
            .await
            .expect("recycled token must forward for its new owner");
        drop(token);
    }
}
