//! amqp-core: method dispatch and request/response core for AMQP channels.
//!
//! This crate defines:
//! - Method signatures and schemas ([`MethodSig`], [`MethodSpec`], [`MethodTable`])
//! - Argument codec ([`dumps`], [`loads`], [`Value`])
//! - Content bodies and properties ([`Content`], [`Properties`])
//! - The per-channel core ([`ChannelCore`]) with its pending-wait and
//!   listener registries ([`PendingRegistry`], [`ListenerRegistry`])
//! - Channels and connections ([`Channel`], [`Connection`], [`Close`])
//! - Transports ([`Transport`]) and wire framing ([`framing`])
//! - Errors ([`ChannelError`], [`TransportError`], [`ReplyCode`])

#![forbid(unsafe_code)]

mod arguments;
mod channel;
mod config;
mod connection;
mod content;
mod error;
mod frame;
mod listener;
mod method;
mod pending;
mod promise;
mod serialization;
mod transport;

pub mod catalog;
pub mod framing;

pub use arguments::*;
pub use channel::*;
pub use config::*;
pub use connection::*;
pub use content::*;
pub use error::*;
pub use frame::*;
pub use listener::*;
pub use method::*;
pub use pending::*;
pub use promise::*;
pub use serialization::*;
pub use transport::*;
