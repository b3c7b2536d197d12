//! Connection: channel 0, the channel map and the frame pump.
//!
//! A [`Connection`] owns the transport and every channel multiplexed over it.
//! It is itself a channel (id 0) and derefs to that channel's [`ChannelCore`].
//! Frames are only read from the transport inside [`Connection::drain_events`],
//! which waiters call from [`ChannelCore::wait`].

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;

use crate::catalog::{CLOSE_ARGS, CONNECTION_CLOSE, CONNECTION_CLOSE_OK, amqp_0_9_1};
use crate::channel::{close_args, peer_close_result, reply_of};
use crate::{
    Arguments, Channel, ChannelCore, ChannelError, ChannelState, Close, ConnectionConfig, Frame,
    Listener, MethodCall, MethodTable, Promise, ReplyCode, Transport,
};

/// Id of the connection's own control channel.
pub const CONTROL_CHANNEL_ID: u16 = 0;

pub(crate) struct ConnectionInner {
    pub(crate) transport: Transport,
    pub(crate) methods: Arc<MethodTable>,
    pub(crate) config: ConnectionConfig,
    channels: Mutex<HashMap<u16, Arc<ChannelCore>>>,
}

impl ConnectionInner {
    /// Read one frame and dispatch it to the channel it names.
    ///
    /// If `done` resolves while still waiting for a frame, return without
    /// reading one. A frame already received is always dispatched in full.
    pub(crate) fn drain_events<'a>(
        &'a self,
        timeout: Option<Duration>,
        done: Option<&'a Promise>,
    ) -> BoxFuture<'a, Result<(), ChannelError>> {
        async move {
            let recv = async {
                let recv = self.transport.recv_frame();
                let frame = match timeout {
                    Some(limit) => tokio::time::timeout(limit, recv)
                        .await
                        .map_err(|_| ChannelError::Timeout)??,
                    None => recv.await?,
                };
                Ok::<Frame, ChannelError>(frame)
            };
            let frame = match done {
                Some(done) => tokio::select! {
                    biased;
                    _ = done.resolved() => return Ok(()),
                    frame = recv => frame?,
                },
                None => recv.await?,
            };

            let channel = self.channels.lock().get(&frame.channel_id).cloned();
            let Some(channel) = channel else {
                tracing::warn!(
                    channel_id = frame.channel_id,
                    sig = %frame.sig,
                    "dropping frame for unknown channel"
                );
                return Ok(());
            };

            channel
                .dispatch_method(frame.sig, frame.payload, frame.content)
                .await
        }
        .boxed()
    }

    /// Forget `core` if it is still the registered channel for its id.
    pub(crate) fn remove_channel(&self, core: &ChannelCore) {
        let mut channels = self.channels.lock();
        let registered = channels
            .get(&core.channel_id())
            .is_some_and(|entry| std::ptr::eq(Arc::as_ptr(entry), core));
        if registered {
            channels.remove(&core.channel_id());
        }
    }

    /// Detach every channel and close the transport.
    fn teardown(&self) {
        let cores: Vec<Arc<ChannelCore>> = self.channels.lock().drain().map(|(_, c)| c).collect();
        let detached = cores.len();
        for core in cores {
            core.mark_closed();
        }
        self.transport.close();
        tracing::debug!(channels = detached, "connection torn down");
    }
}

/// A connection and its control channel.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
    control: Arc<ChannelCore>,
}

impl Connection {
    /// Connection speaking the AMQP 0-9-1 method catalog with default settings.
    pub fn new(transport: Transport) -> Self {
        Self::with_config(transport, ConnectionConfig::default())
    }

    pub fn with_config(transport: Transport, config: ConnectionConfig) -> Self {
        Self::with_methods(transport, Arc::new(amqp_0_9_1()), config)
    }

    /// Connection dispatching through a caller-supplied method table.
    pub fn with_methods(
        transport: Transport,
        methods: Arc<MethodTable>,
        config: ConnectionConfig,
    ) -> Self {
        let inner = Arc::new(ConnectionInner {
            transport,
            methods,
            config,
            channels: Mutex::new(HashMap::new()),
        });

        let control = ChannelCore::new(&inner, CONTROL_CHANNEL_ID);
        inner
            .channels
            .lock()
            .insert(CONTROL_CHANNEL_ID, control.clone());

        let weak_inner = Arc::downgrade(&inner);
        let weak_control = Arc::downgrade(&control);
        control.add_listener(
            CONNECTION_CLOSE,
            Listener::from_async(move |args: Arguments| {
                let weak_inner = weak_inner.clone();
                let weak_control = weak_control.clone();
                async move {
                    let (Some(inner), Some(control)) = (weak_inner.upgrade(), weak_control.upgrade())
                    else {
                        return Ok(());
                    };
                    let (code, text) = reply_of(&args);
                    tracing::warn!(
                        reply_code = code,
                        reply_text = %text,
                        "connection closed by peer"
                    );
                    control.set_state(ChannelState::Closing);
                    let sent = control.send_method(MethodCall::new(CONNECTION_CLOSE_OK)).await;
                    inner.teardown();
                    sent?;
                    peer_close_result(code, text)
                }
            }),
        );

        tracing::debug!(
            channel_max = inner.config.channel_max,
            frame_max = inner.config.frame_max,
            methods = inner.methods.len(),
            "connection created"
        );

        Self { inner, control }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn methods(&self) -> &Arc<MethodTable> {
        &self.inner.methods
    }

    pub fn transport(&self) -> &Transport {
        &self.inner.transport
    }

    pub fn is_closed(&self) -> bool {
        self.control.state() == ChannelState::Closed
    }

    /// Register a new channel.
    ///
    /// With `None` the lowest free id in `1..=channel_max` is used.
    pub fn channel(&self, channel_id: Option<u16>) -> Result<Channel, ChannelError> {
        self.control.connection()?;
        let max = self.inner.config.channel_max;

        let mut channels = self.inner.channels.lock();
        let channel_id = match channel_id {
            Some(CONTROL_CHANNEL_ID) => {
                return Err(ChannelError::InvalidArgument(
                    "channel 0 is reserved for the connection".into(),
                ));
            }
            Some(id) if id > max => {
                return Err(ChannelError::InvalidArgument(format!(
                    "channel id {id} exceeds channel_max {max}"
                )));
            }
            Some(id) if channels.contains_key(&id) => {
                return Err(ChannelError::ChannelIdInUse(id));
            }
            Some(id) => id,
            None => (1..=max)
                .find(|id| !channels.contains_key(id))
                .ok_or(ChannelError::NoFreeChannelIds { max })?,
        };

        let core = ChannelCore::new(&self.inner, channel_id);
        channels.insert(channel_id, core.clone());
        drop(channels);

        tracing::debug!(channel_id, "channel registered");
        Ok(Channel::attach(core))
    }

    /// [`Connection::channel`] followed by the channel.open handshake.
    pub async fn open_channel(&self, channel_id: Option<u16>) -> Result<Channel, ChannelError> {
        let channel = self.channel(channel_id)?;
        if let Err(e) = channel.open().await {
            channel.detach();
            return Err(e);
        }
        Ok(channel)
    }

    /// The registered channel with `channel_id`, if any.
    pub fn get_channel(&self, channel_id: u16) -> Option<Channel> {
        if channel_id == CONTROL_CHANNEL_ID {
            return None;
        }
        self.inner
            .channels
            .lock()
            .get(&channel_id)
            .cloned()
            .map(Channel::from_core)
    }

    /// Ids of all registered channels, control channel included, ascending.
    pub fn channel_ids(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self.inner.channels.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Read and dispatch exactly one frame.
    ///
    /// Fails with [`ChannelError::Timeout`] if nothing arrives within
    /// `timeout`.
    pub fn drain_events(
        &self,
        timeout: Option<Duration>,
    ) -> BoxFuture<'_, Result<(), ChannelError>> {
        if self.is_closed() {
            return futures::future::ready(Err(ChannelError::ConnectionClosed)).boxed();
        }
        self.inner.drain_events(timeout, None)
    }
}

impl Deref for Connection {
    type Target = ChannelCore;

    fn deref(&self) -> &ChannelCore {
        &self.control
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.control.state())
            .field("channels", &self.channel_ids())
            .field("transport", &self.inner.transport)
            .finish()
    }
}

impl Close for Connection {
    async fn close(&self) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Ok(());
        }
        self.control.set_state(ChannelState::Closing);
        let result = self
            .control
            .send_method(
                MethodCall::new(CONNECTION_CLOSE)
                    .args(CLOSE_ARGS, close_args(ReplyCode::ReplySuccess, "Normal shutdown"))
                    .wait_for(CONNECTION_CLOSE_OK)
                    .timeout_opt(self.inner.config.close_timeout),
            )
            .await;
        self.inner.teardown();
        result.map(|_| ())
    }
}
