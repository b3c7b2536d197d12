//! Frame carriers between a connection and its peer.
//!
//! [`Transport`] moves whole [`Frame`]s: a method with its channel id and,
//! for content-bearing methods, the assembled content. `Mem` passes frames
//! in-process; `Stream` speaks AMQP 0-9-1 wire framing over any byte stream.
//! Backends implement the crate-private [`TransportBackend`] trait.

use crate::{Frame, TransportError};

pub(crate) trait TransportBackend: Send + Sync + Clone + 'static {
    async fn send_frame(&self, frame: Frame) -> Result<(), TransportError>;
    async fn recv_frame(&self) -> Result<Frame, TransportError>;
    fn close(&self);
    fn is_closed(&self) -> bool;
}

#[derive(Clone, Debug)]
pub enum Transport {
    #[cfg(feature = "mem")]
    Mem(mem::MemTransport),
    #[cfg(feature = "stream")]
    Stream(stream::StreamTransport),
}

impl Transport {
    /// Hand one frame to the peer.
    ///
    /// Fails with [`TransportError::Closed`] once the transport is closed.
    pub async fn send_frame(&self, frame: Frame) -> Result<(), TransportError> {
        match self {
            #[cfg(feature = "mem")]
            Transport::Mem(t) => t.send_frame(frame).await,
            #[cfg(feature = "stream")]
            Transport::Stream(t) => t.send_frame(frame).await,
        }
    }

    /// Receive the next complete frame.
    pub async fn recv_frame(&self) -> Result<Frame, TransportError> {
        match self {
            #[cfg(feature = "mem")]
            Transport::Mem(t) => t.recv_frame().await,
            #[cfg(feature = "stream")]
            Transport::Stream(t) => t.recv_frame().await,
        }
    }

    pub fn close(&self) {
        match self {
            #[cfg(feature = "mem")]
            Transport::Mem(t) => t.close(),
            #[cfg(feature = "stream")]
            Transport::Stream(t) => t.close(),
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            #[cfg(feature = "mem")]
            Transport::Mem(t) => t.is_closed(),
            #[cfg(feature = "stream")]
            Transport::Stream(t) => t.is_closed(),
        }
    }

    #[cfg(feature = "mem")]
    pub fn mem_pair() -> (Self, Self) {
        let (a, b) = mem::MemTransport::pair();
        (Transport::Mem(a), Transport::Mem(b))
    }

    #[cfg(feature = "stream")]
    pub fn stream<S>(stream: S, methods: std::sync::Arc<crate::MethodTable>, frame_max: u32) -> Self
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + Sync + 'static,
    {
        Transport::Stream(stream::StreamTransport::new(stream, methods, frame_max))
    }

    #[cfg(feature = "stream")]
    pub fn stream_pair(methods: std::sync::Arc<crate::MethodTable>) -> (Self, Self) {
        let (a, b) = stream::StreamTransport::pair(methods);
        (Transport::Stream(a), Transport::Stream(b))
    }
}

#[cfg(feature = "mem")]
pub mod mem;
#[cfg(feature = "stream")]
pub mod stream;
