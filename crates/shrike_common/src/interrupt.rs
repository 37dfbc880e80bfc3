//! Cooperative cancellation.
//!
//! Every blocking call on a store takes an [`Interruptor`]. Firing it
//! makes those calls return `StoreError::Interrupted` promptly: blocked
//! waiters are woken through registered condvars, and every suspension
//! point re-checks the flag.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::error::StoreError;

#[derive(Clone, Default)]
pub struct Interruptor {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    fired: AtomicBool,
    wakers: Mutex<Vec<Weak<Condvar>>>,
}

impl Interruptor {
    pub fn new() -> Interruptor {
        Interruptor::default()
    }

    /// Signal cancellation and wake every registered waiter.
    pub fn fire(&self) {
        self.inner.fired.store(true, Ordering::SeqCst);
        let mut wakers = self.inner.wakers.lock();
        wakers.retain(|weak| match weak.upgrade() {
            Some(cv) => {
                cv.notify_all();
                true
            }
            None => false,
        });
    }

    pub fn is_fired(&self) -> bool {
        self.inner.fired.load(Ordering::SeqCst)
    }

    /// Fail fast at a suspension point.
    pub fn check(&self) -> Result<(), StoreError> {
        if self.is_fired() {
            return Err(StoreError::Interrupted);
        }
        Ok(())
    }

    /// Register a condvar to be notified on `fire`. Registration is
    /// idempotent per condvar; entries are pruned once the condvar drops.
    pub fn register_waker(&self, cv: &Arc<Condvar>) {
        let mut wakers = self.inner.wakers.lock();
        wakers.retain(|weak| weak.strong_count() > 0);
        if !wakers
            .iter()
            .any(|weak| weak.upgrade().is_some_and(|w| Arc::ptr_eq(&w, cv)))
        {
            wakers.push(Arc::downgrade(cv));
        }
    }
}

impl std::fmt::Debug for Interruptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interruptor")
            .field("fired", &self.is_fired())
            .finish()
    }
}
