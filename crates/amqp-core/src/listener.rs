//! Persistent listeners and send callbacks.
//!
//! Whether a callback may suspend is part of its type: `Sync` variants run to
//! completion inline, `Async` variants return a boxed future that dispatch
//! (or `send_method`) awaits before continuing.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;

use crate::{Arguments, ChannelError, MethodSig};

/// Future returned by suspending listeners and callbacks.
pub type ListenerFuture = BoxFuture<'static, Result<(), ChannelError>>;

/// A signature-keyed callback invoked on every matching dispatch.
#[derive(Clone)]
pub enum Listener {
    Sync(Arc<dyn Fn(&Arguments) -> Result<(), ChannelError> + Send + Sync>),
    Async(Arc<dyn Fn(Arguments) -> ListenerFuture + Send + Sync>),
}

impl Listener {
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&Arguments) -> Result<(), ChannelError> + Send + Sync + 'static,
    {
        Listener::Sync(Arc::new(f))
    }

    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ChannelError>> + Send + 'static,
    {
        Listener::Async(Arc::new(move |args| -> ListenerFuture { Box::pin(f(args)) }))
    }

    pub async fn invoke(&self, args: &Arguments) -> Result<(), ChannelError> {
        match self {
            Listener::Sync(f) => f(args),
            Listener::Async(f) => f(args.clone()).await,
        }
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Listener::Sync(_) => f.write_str("Listener::Sync"),
            Listener::Async(_) => f.write_str("Listener::Async"),
        }
    }
}

/// Callback run by `send_method` right after the frame is written.
pub enum Callback {
    Sync(Box<dyn FnOnce() -> Result<(), ChannelError> + Send>),
    Async(Box<dyn FnOnce() -> ListenerFuture + Send>),
}

impl Callback {
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<(), ChannelError> + Send + 'static,
    {
        Callback::Sync(Box::new(f))
    }

    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), ChannelError>> + Send + 'static,
    {
        Callback::Async(Box::new(move || -> ListenerFuture { Box::pin(f()) }))
    }

    pub async fn invoke(self) -> Result<(), ChannelError> {
        match self {
            Callback::Sync(f) => f(),
            Callback::Async(f) => f().await,
        }
    }
}

impl std::fmt::Debug for Callback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Callback::Sync(_) => f.write_str("Callback::Sync"),
            Callback::Async(_) => f.write_str("Callback::Async"),
        }
    }
}

/// Per-channel map of persistent listeners.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Mutex<HashMap<MethodSig, Listener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `listener` for `sig`, returning the one it replaces.
    pub fn insert(&self, sig: MethodSig, listener: Listener) -> Option<Listener> {
        self.listeners.lock().insert(sig, listener)
    }

    pub fn remove(&self, sig: MethodSig) -> Option<Listener> {
        self.listeners.lock().remove(&sig)
    }

    pub fn get(&self, sig: MethodSig) -> Option<Listener> {
        self.listeners.lock().get(&sig).cloned()
    }

    pub fn contains(&self, sig: MethodSig) -> bool {
        self.listeners.lock().contains_key(&sig)
    }
}
