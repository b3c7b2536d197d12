//! Frame type exchanged between channels and transports.

use bytes::Bytes;

use crate::{Content, MethodSig};

/// One method on one channel, with its content if the method carries any.
///
/// `payload` holds the encoded arguments only; the signature travels
/// separately so transports can route without decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub channel_id: u16,
    pub sig: MethodSig,
    pub payload: Bytes,
    pub content: Option<Content>,
}

impl Frame {
    /// Create a frame without content.
    pub fn new(channel_id: u16, sig: MethodSig, payload: impl Into<Bytes>) -> Self {
        Self {
            channel_id,
            sig,
            payload: payload.into(),
            content: None,
        }
    }

    /// Create a frame carrying content.
    pub fn with_content(
        channel_id: u16,
        sig: MethodSig,
        payload: impl Into<Bytes>,
        content: Content,
    ) -> Self {
        Self {
            channel_id,
            sig,
            payload: payload.into(),
            content: Some(content),
        }
    }

    /// Borrow the argument payload.
    pub fn payload_bytes(&self) -> &[u8] {
        &self.payload
    }
}
