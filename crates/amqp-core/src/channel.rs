//! ChannelCore: method sending, waiting and dispatch for one channel.
//!
//! Every channel of a connection, including the connection's own control
//! channel 0, is backed by a [`ChannelCore`]. The core owns two registries:
//!
//! - **pending waits**: one-shot [`Promise`]s keyed by the method signature
//!   they expect, stacked so nested waits on the same signature compose
//! - **listeners**: persistent callbacks keyed by signature
//!
//! ```text
//!   send_method ──► transport.send_frame
//!        │
//!        └─► wait ──► register promise for each signature (WaitScope)
//!                 └─► loop { connection.drain_events() }
//!                                   │
//!                    dispatch_method ◄──┘
//!                          │
//!              listener? ──┴── pending? ──► resolve promise ──► wait returns
//! ```
//!
//! Only `wait` drains the connection. Dispatch recipients run inside the drain
//! and may call `send_method`/`wait` again on the same channel; no registry
//! lock is held while they run.

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::catalog::{CHANNEL_CLOSE, CHANNEL_CLOSE_OK, CHANNEL_OPEN, CHANNEL_OPEN_OK, CLOSE_ARGS};
use crate::connection::ConnectionInner;
use crate::{
    Arguments, Callback, ChannelError, Content, Frame, Listener, ListenerRegistry, MethodSig,
    MethodTable, PendingRegistry, Promise, ReplyCode, Value, dumps, loads,
};

/// Lifecycle of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Open,
    Closing,
    Closed,
}

/// One outgoing method, built up before [`ChannelCore::send_method`].
#[derive(Debug)]
pub struct MethodCall {
    sig: MethodSig,
    args: Option<(String, Vec<Value>)>,
    content: Option<Content>,
    wait_for: Vec<MethodSig>,
    callback: Option<Callback>,
    timeout: Option<Duration>,
}

impl MethodCall {
    pub fn new(sig: MethodSig) -> Self {
        Self {
            sig,
            args: None,
            content: None,
            wait_for: Vec::new(),
            callback: None,
            timeout: None,
        }
    }

    /// Encode `values` with `format`. Without this the payload is empty.
    pub fn args(mut self, format: impl Into<String>, values: Vec<Value>) -> Self {
        self.args = Some((format.into(), values));
        self
    }

    pub fn content(mut self, content: Content) -> Self {
        self.content = Some(content);
        self
    }

    /// Wait for `sig` after sending. May be called repeatedly; the first
    /// method to arrive among all of them completes the call.
    pub fn wait_for(mut self, sig: MethodSig) -> Self {
        self.wait_for.push(sig);
        self
    }

    pub fn wait_for_any(mut self, sigs: impl IntoIterator<Item = MethodSig>) -> Self {
        self.wait_for.extend(sigs);
        self
    }

    /// Run `callback` once the frame has been written.
    pub fn callback(mut self, callback: Callback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Per-drain timeout for the wait.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub(crate) fn timeout_opt(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Result of [`ChannelCore::send_method`].
#[derive(Debug)]
pub struct Sent {
    /// Resolved as soon as the frame was handed to the transport.
    pub marker: Promise,
    /// Arguments of the method that answered, when the call waited.
    pub reply: Option<Arguments>,
}

/// Shutdown handshake of a concrete channel kind.
#[allow(async_fn_in_trait)]
pub trait Close {
    /// Close the channel. Closing an already closed channel succeeds.
    async fn close(&self) -> Result<(), ChannelError>;
}

pub struct ChannelCore {
    channel_id: u16,
    /// Cleared when the channel is detached; every later send or wait fails.
    connection: Mutex<Option<Weak<ConnectionInner>>>,
    methods: Arc<MethodTable>,
    pending: PendingRegistry,
    listeners: ListenerRegistry,
    auto_decode: AtomicBool,
    state: Mutex<ChannelState>,
}

impl ChannelCore {
    /// Create a core bound to `connection`. The caller inserts it into the
    /// connection's channel map.
    pub(crate) fn new(connection: &Arc<ConnectionInner>, channel_id: u16) -> Arc<Self> {
        Arc::new(Self {
            channel_id,
            connection: Mutex::new(Some(Arc::downgrade(connection))),
            methods: connection.methods.clone(),
            pending: PendingRegistry::new(),
            listeners: ListenerRegistry::new(),
            auto_decode: AtomicBool::new(connection.config.auto_decode),
            state: Mutex::new(ChannelState::Open),
        })
    }

    pub fn channel_id(&self) -> u16 {
        self.channel_id
    }

    pub fn state(&self) -> ChannelState {
        *self.state.lock()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    pub(crate) fn set_state(&self, state: ChannelState) {
        *self.state.lock() = state;
    }

    pub fn auto_decode(&self) -> bool {
        self.auto_decode.load(Ordering::Relaxed)
    }

    pub fn set_auto_decode(&self, enabled: bool) {
        self.auto_decode.store(enabled, Ordering::Relaxed);
    }

    pub fn pending(&self) -> &PendingRegistry {
        &self.pending
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    /// Install a persistent listener, replacing any previous one for `sig`.
    pub fn add_listener(&self, sig: MethodSig, listener: Listener) -> Option<Listener> {
        self.listeners.insert(sig, listener)
    }

    pub fn remove_listener(&self, sig: MethodSig) -> Option<Listener> {
        self.listeners.remove(sig)
    }

    pub(crate) fn connection(&self) -> Result<Arc<ConnectionInner>, ChannelError> {
        self.connection
            .lock()
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(ChannelError::ConnectionClosed)
    }

    /// Drop the connection reference and mark the channel closed, without
    /// touching the connection's channel map.
    pub(crate) fn mark_closed(&self) {
        self.connection.lock().take();
        self.set_state(ChannelState::Closed);
    }

    /// Remove this channel from its connection and mark it closed.
    pub(crate) fn detach(&self) {
        let connection = self.connection.lock().take().and_then(|weak| weak.upgrade());
        self.set_state(ChannelState::Closed);
        if let Some(connection) = connection {
            connection.remove_channel(self);
        }
        tracing::debug!(channel_id = self.channel_id, "channel detached");
    }

    /// Encode and send one method, then optionally wait for its answer.
    pub async fn send_method(&self, call: MethodCall) -> Result<Sent, ChannelError> {
        let connection = self.connection()?;
        let MethodCall {
            sig,
            args,
            content,
            wait_for,
            callback,
            timeout,
        } = call;

        let payload = match &args {
            Some((format, values)) => dumps(format, values)?,
            None => Bytes::new(),
        };

        tracing::debug!(
            channel_id = self.channel_id,
            %sig,
            payload_len = payload.len(),
            has_content = content.is_some(),
            waits = wait_for.len(),
            "send_method"
        );

        let frame = Frame {
            channel_id: self.channel_id,
            sig,
            payload,
            content,
        };
        connection.transport.send_frame(frame).await?;
        drop(connection);

        let marker = Promise::fulfilled(Arguments::default());

        if let Some(callback) = callback {
            callback.invoke().await?;
        }

        let reply = if wait_for.is_empty() {
            None
        } else {
            Some(self.wait(&wait_for, timeout).await?)
        };

        Ok(Sent { marker, reply })
    }

    /// Drain the connection until one of `sigs` is dispatched to this channel.
    ///
    /// `timeout` bounds each drain call. Whatever happens, the registrations
    /// made here are undone before returning.
    pub async fn wait(
        &self,
        sigs: &[MethodSig],
        timeout: Option<Duration>,
    ) -> Result<Arguments, ChannelError> {
        if sigs.is_empty() {
            return Err(ChannelError::InvalidArgument(
                "wait needs at least one method signature".into(),
            ));
        }
        self.connection()?;

        let promise = Promise::new();
        let _scope = self.pending.scope(sigs, &promise);

        loop {
            if let Some(args) = promise.value() {
                return Ok(args);
            }
            let connection = self.connection()?;
            // Another waiter on this connection may drain our method while we
            // queue for the transport; the drain stops receiving once it does.
            if let Err(e) = connection.drain_events(timeout, Some(&promise)).await {
                if let Some(args) = promise.value() {
                    return Ok(args);
                }
                tracing::debug!(
                    channel_id = self.channel_id,
                    sigs = ?sigs,
                    error = %e,
                    "wait: drain failed"
                );
                return Err(e);
            }
        }
    }

    /// Route one inbound method to this channel's listener and pending waiter.
    pub async fn dispatch_method(
        &self,
        sig: MethodSig,
        payload: Bytes,
        content: Option<Content>,
    ) -> Result<(), ChannelError> {
        if self.state() == ChannelState::Closed {
            return Err(ChannelError::ConnectionClosed);
        }

        let mut content = content;
        if self.auto_decode()
            && let Some(content) = content.as_mut()
            && let Err(e) = content.auto_decode()
        {
            tracing::trace!(
                channel_id = self.channel_id,
                %sig,
                error = %e,
                "content auto-decode failed; keeping raw body"
            );
        }

        let spec = self
            .methods
            .resolve(sig)
            .ok_or(ChannelError::UnimplementedMethod(sig))?;

        let listener = self.listeners.get(sig);
        let one_shot = self.pending.take(sig);
        if listener.is_none() && one_shot.is_none() {
            if let Some(content) = &content {
                tracing::debug!(
                    channel_id = self.channel_id,
                    %sig,
                    method = spec.name,
                    body_len = content.body.len(),
                    "dropping content: no listener or waiter"
                );
            } else {
                tracing::trace!(
                    channel_id = self.channel_id,
                    %sig,
                    method = spec.name,
                    "no listener or waiter"
                );
            }
            return Ok(());
        }

        let values = if spec.args.is_empty() {
            Vec::new()
        } else {
            loads(spec.args, &payload, 0)?.0
        };
        let args = Arguments {
            values,
            content: if spec.content { content } else { None },
        };

        tracing::debug!(
            channel_id = self.channel_id,
            %sig,
            method = spec.name,
            listener = listener.is_some(),
            one_shot = one_shot.is_some(),
            "dispatch_method"
        );

        let listened = match &listener {
            Some(listener) => listener.invoke(&args).await,
            None => Ok(()),
        };
        if let Some(promise) = one_shot {
            promise.resolve(args);
        }
        listened
    }
}

impl std::fmt::Debug for ChannelCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelCore")
            .field("channel_id", &self.channel_id)
            .field("state", &self.state())
            .field("auto_decode", &self.auto_decode())
            .field("pending", &self.pending.signatures())
            .finish_non_exhaustive()
    }
}

/// Arguments for connection.close / channel.close.
pub(crate) fn close_args(code: ReplyCode, text: &str) -> Vec<Value> {
    vec![
        Value::U16(code as u16),
        Value::ShortStr(text.to_owned()),
        Value::U16(0),
        Value::U16(0),
    ]
}

/// Reply code and text of a received close method.
pub(crate) fn reply_of(args: &Arguments) -> (u16, String) {
    let code = args
        .get(0)
        .and_then(Value::as_u64)
        .and_then(|c| u16::try_from(c).ok())
        .unwrap_or(0);
    let text = args
        .get(1)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    (code, text)
}

/// Outcome surfaced to the drainer when the peer closes something.
pub(crate) fn peer_close_result(code: u16, text: String) -> Result<(), ChannelError> {
    if code == ReplyCode::ReplySuccess as u16 {
        Ok(())
    } else {
        Err(ChannelError::Status {
            code,
            message: text,
        })
    }
}

/// A user channel (id ≥ 1).
#[derive(Debug, Clone)]
pub struct Channel {
    core: Arc<ChannelCore>,
}

impl Channel {
    /// Wrap a freshly registered core and install its close handler.
    pub(crate) fn attach(core: Arc<ChannelCore>) -> Self {
        let weak = Arc::downgrade(&core);
        core.add_listener(
            CHANNEL_CLOSE,
            Listener::from_async(move |args: Arguments| {
                let weak = weak.clone();
                async move {
                    let Some(core) = weak.upgrade() else {
                        return Ok(());
                    };
                    let (code, text) = reply_of(&args);
                    tracing::warn!(
                        channel_id = core.channel_id(),
                        reply_code = code,
                        reply_text = %text,
                        "channel closed by peer"
                    );
                    core.set_state(ChannelState::Closing);
                    let sent = core.send_method(MethodCall::new(CHANNEL_CLOSE_OK)).await;
                    core.detach();
                    sent?;
                    peer_close_result(code, text)
                }
            }),
        );
        Self { core }
    }

    pub(crate) fn from_core(core: Arc<ChannelCore>) -> Self {
        Self { core }
    }

    pub fn core(&self) -> &Arc<ChannelCore> {
        &self.core
    }

    /// channel.open / channel.open-ok handshake.
    pub async fn open(&self) -> Result<(), ChannelError> {
        let timeout = self.core.connection()?.config.close_timeout;
        self.core
            .send_method(
                MethodCall::new(CHANNEL_OPEN)
                    .args("s", vec![Value::ShortStr(String::new())])
                    .wait_for(CHANNEL_OPEN_OK)
                    .timeout_opt(timeout),
            )
            .await?;
        tracing::debug!(channel_id = self.core.channel_id(), "channel opened");
        Ok(())
    }
}

impl Deref for Channel {
    type Target = ChannelCore;

    fn deref(&self) -> &ChannelCore {
        &self.core
    }
}

impl Close for Channel {
    async fn close(&self) -> Result<(), ChannelError> {
        if self.core.state() == ChannelState::Closed {
            return Ok(());
        }
        let timeout = match self.core.connection() {
            Ok(connection) => connection.config.close_timeout,
            Err(_) => {
                self.core.detach();
                return Ok(());
            }
        };

        self.core.set_state(ChannelState::Closing);
        let result = self
            .core
            .send_method(
                MethodCall::new(CHANNEL_CLOSE)
                    .args(CLOSE_ARGS, close_args(ReplyCode::ReplySuccess, "Normal shutdown"))
                    .wait_for(CHANNEL_CLOSE_OK)
                    .timeout_opt(timeout),
            )
            .await;
        self.core.detach();
        result.map(|_| ())
    }
}
