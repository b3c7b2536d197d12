//! Single-resolution completion handle.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::Arguments;

/// A handle that is resolved at most once.
///
/// Clones share the same slot. Only the first [`Promise::resolve`] stores a
/// value; later calls return `false` and change nothing.
#[derive(Clone)]
pub struct Promise {
    inner: Arc<PromiseInner>,
}

struct PromiseInner {
    value: Mutex<Option<Arguments>>,
    notify: Notify,
}

impl Promise {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(PromiseInner {
                value: Mutex::new(None),
                notify: Notify::new(),
            }),
        }
    }

    /// A promise that is already resolved with `args`.
    pub fn fulfilled(args: Arguments) -> Self {
        let promise = Self::new();
        promise.resolve(args);
        promise
    }

    /// Store `args` if unresolved. Returns whether this call resolved it.
    pub fn resolve(&self, args: Arguments) -> bool {
        {
            let mut slot = self.inner.value.lock();
            if slot.is_some() {
                return false;
            }
            *slot = Some(args);
        }
        self.inner.notify.notify_waiters();
        true
    }

    pub fn is_ready(&self) -> bool {
        self.inner.value.lock().is_some()
    }

    /// A copy of the resolved value, if any.
    pub fn value(&self) -> Option<Arguments> {
        self.inner.value.lock().clone()
    }

    /// Wait until the promise is resolved and return its value.
    pub async fn resolved(&self) -> Arguments {
        loop {
            // Registered before the check so a concurrent resolve is not missed.
            let notified = self.inner.notify.notified();
            if let Some(value) = self.value() {
                return value;
            }
            notified.await;
        }
    }

    /// True if both handles share the same slot.
    pub fn ptr_eq(&self, other: &Promise) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Promise {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("ready", &self.is_ready())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;

    #[test]
    fn second_resolution_is_ignored() {
        let promise = Promise::new();
        assert!(!promise.is_ready());
        assert!(promise.resolve(Arguments::new(vec![Value::U8(1)])));
        assert!(!promise.resolve(Arguments::new(vec![Value::U8(2)])));
        assert_eq!(promise.value(), Some(Arguments::new(vec![Value::U8(1)])));
    }

    #[test]
    fn clones_share_resolution() {
        let promise = Promise::new();
        let clone = promise.clone();
        clone.resolve(Arguments::default());
        assert!(promise.is_ready());
        assert!(promise.ptr_eq(&clone));
        assert!(!promise.ptr_eq(&Promise::new()));
    }

    #[tokio::test]
    async fn resolved_wakes_other_task() {
        let promise = Promise::new();
        let waiter = tokio::spawn({
            let promise = promise.clone();
            async move { promise.resolved().await }
        });
        tokio::task::yield_now().await;
        promise.resolve(Arguments::new(vec![Value::U32(42)]));
        let value = waiter.await.unwrap();
        assert_eq!(value.first(), Some(&Value::U32(42)));
    }
}
