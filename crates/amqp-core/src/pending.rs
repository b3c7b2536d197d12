//! Pending-wait registry: one visible completion handle per signature.
//!
//! Each signature maps to a stack of registrations. The top of the stack is
//! the handle dispatch will resolve. [`PendingRegistry::register`] pushes and
//! returns a [`WaitToken`]; [`PendingRegistry::unregister`] removes exactly
//! that registration, wherever it sits. Used LIFO this restores the previous
//! handle verbatim (or removes the signature if there was none); used out of
//! order the registry still shows the newest registration that has not been
//! unregistered.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::{MethodSig, Promise};

/// Save-token returned by [`PendingRegistry::register`].
#[must_use = "dropping a WaitToken leaks the registration; pass it to unregister"]
#[derive(Debug)]
pub struct WaitToken {
    sig: MethodSig,
    id: u64,
}

impl WaitToken {
    pub fn sig(&self) -> MethodSig {
        self.sig
    }
}

#[derive(Default)]
pub struct PendingRegistry {
    inner: Mutex<PendingInner>,
}

#[derive(Default)]
struct PendingInner {
    next_id: u64,
    stacks: HashMap<MethodSig, Vec<(u64, Promise)>>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `promise` the visible handle for `sig`, shadowing any previous one.
    pub fn register(&self, sig: MethodSig, promise: Promise) -> WaitToken {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        let stack = inner.stacks.entry(sig).or_default();
        stack.push((id, promise));
        tracing::trace!(%sig, depth = stack.len(), "registered pending wait");
        WaitToken { sig, id }
    }

    /// Drop the registration behind `token`.
    ///
    /// A no-op if dispatch already consumed it.
    pub fn unregister(&self, token: WaitToken) {
        let mut inner = self.inner.lock();
        let Some(stack) = inner.stacks.get_mut(&token.sig) else {
            return;
        };
        if let Some(pos) = stack.iter().position(|(id, _)| *id == token.id) {
            stack.remove(pos);
        }
        let depth = stack.len();
        if depth == 0 {
            inner.stacks.remove(&token.sig);
        }
        tracing::trace!(sig = %token.sig, depth, "unregistered pending wait");
    }

    /// Remove and return the visible handle for `sig` (one-shot delivery).
    ///
    /// Handles that are already resolved are discarded on the way; they
    /// belong to waits that completed through another signature.
    pub fn take(&self, sig: MethodSig) -> Option<Promise> {
        let mut inner = self.inner.lock();
        let stack = inner.stacks.get_mut(&sig)?;
        let mut found = None;
        while let Some((_, promise)) = stack.pop() {
            if !promise.is_ready() {
                found = Some(promise);
                break;
            }
        }
        if stack.is_empty() {
            inner.stacks.remove(&sig);
        }
        found
    }

    /// The visible handle for `sig`, without removing it.
    pub fn current(&self, sig: MethodSig) -> Option<Promise> {
        self.inner
            .lock()
            .stacks
            .get(&sig)
            .and_then(|stack| stack.last())
            .map(|(_, promise)| promise.clone())
    }

    pub fn contains(&self, sig: MethodSig) -> bool {
        self.inner.lock().stacks.contains_key(&sig)
    }

    /// Signatures with at least one registration, sorted (for diagnostics).
    pub fn signatures(&self) -> Vec<MethodSig> {
        let mut sigs: Vec<MethodSig> = self.inner.lock().stacks.keys().copied().collect();
        sigs.sort_unstable();
        sigs
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().stacks.is_empty()
    }

    /// Register `promise` under every signature in `sigs` until the returned
    /// scope is dropped.
    pub fn scope(&self, sigs: &[MethodSig], promise: &Promise) -> WaitScope<'_> {
        let tokens = sigs
            .iter()
            .map(|&sig| self.register(sig, promise.clone()))
            .collect();
        WaitScope {
            registry: self,
            tokens,
        }
    }
}

/// Registrations that are undone when the scope is dropped, whether the
/// wait finished, failed, timed out or was cancelled.
pub struct WaitScope<'a> {
    registry: &'a PendingRegistry,
    tokens: Vec<WaitToken>,
}

impl Drop for WaitScope<'_> {
    fn drop(&mut self) {
        for token in self.tokens.drain(..).rev() {
            self.registry.unregister(token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Arguments, Value};

    const SIG: MethodSig = MethodSig::new(60, 71);
    const OTHER: MethodSig = MethodSig::new(60, 72);

    #[test]
    fn nested_registration_restores_outer_handle() {
        let registry = PendingRegistry::new();
        let outer = Promise::new();
        let inner = Promise::new();

        let outer_token = registry.register(SIG, outer.clone());
        let inner_token = registry.register(SIG, inner.clone());
        assert!(registry.current(SIG).unwrap().ptr_eq(&inner));

        registry.unregister(inner_token);
        assert!(registry.current(SIG).unwrap().ptr_eq(&outer));

        registry.unregister(outer_token);
        assert!(!registry.contains(SIG));
    }

    #[test]
    fn out_of_order_unregistration_keeps_newest() {
        let registry = PendingRegistry::new();
        let first = Promise::new();
        let second = Promise::new();

        let first_token = registry.register(SIG, first);
        let second_token = registry.register(SIG, second.clone());

        registry.unregister(first_token);
        assert!(registry.current(SIG).unwrap().ptr_eq(&second));

        registry.unregister(second_token);
        assert!(registry.is_empty());
    }

    #[test]
    fn take_consumes_top_and_skips_resolved_handles() {
        let registry = PendingRegistry::new();
        let outer = Promise::new();
        let stale = Promise::fulfilled(Arguments::default());

        let _outer_token = registry.register(SIG, outer.clone());
        let stale_token = registry.register(SIG, stale);

        let taken = registry.take(SIG).unwrap();
        assert!(taken.ptr_eq(&outer));
        assert!(!registry.contains(SIG));

        // Token for an already-consumed registration is harmless.
        registry.unregister(stale_token);
        assert!(registry.take(SIG).is_none());
    }

    #[test]
    fn scope_unregisters_every_signature_on_drop() {
        let registry = PendingRegistry::new();
        let previous = Promise::new();
        let _token = registry.register(OTHER, previous.clone());

        let promise = Promise::new();
        {
            let _scope = registry.scope(&[SIG, OTHER], &promise);
            assert_eq!(registry.signatures(), vec![SIG, OTHER]);
            assert!(registry.current(OTHER).unwrap().ptr_eq(&promise));
            registry
                .take(SIG)
                .unwrap()
                .resolve(Arguments::new(vec![Value::U8(1)]));
        }

        assert!(!registry.contains(SIG));
        assert!(registry.current(OTHER).unwrap().ptr_eq(&previous));
        assert!(promise.is_ready());
    }
}
