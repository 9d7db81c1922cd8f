use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

struct Inner {
    flag: AtomicBool,
    lock: Mutex<()>,
    cond: Condvar,
    notify: Notify,
}

/// Process-wide shutdown flag. Monotonic: once triggered it never resets.
///
/// Clones share the same flag. Reads are lock-free; blocking and async
/// waiters are both supported.
#[derive(Clone)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                flag: AtomicBool::new(false),
                lock: Mutex::new(()),
                cond: Condvar::new(),
                notify: Notify::new(),
            }),
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.flag.load(Ordering::Acquire)
    }

    /// Set the flag and wake every waiter. Returns `true` only for the call
    /// that performed the false -> true transition.
    pub fn trigger(&self) -> bool {
        let guard = self.inner.lock.lock();
        let first = !self.inner.flag.swap(true, Ordering::AcqRel);
        drop(guard);
        if first {
            self.inner.cond.notify_all();
            self.inner.notify.notify_waiters();
        }
        first
    }

    /// Block up to `timeout`. Returns whether shutdown has been triggered.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.inner.lock.lock();
        while !self.is_triggered() {
            if self.inner.cond.wait_until(&mut guard, deadline).timed_out() {
                return self.is_triggered();
            }
        }
        true
    }

    pub async fn wait(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownSignal")
            .field("triggered", &self.is_triggered())
            .finish()
    }
}
