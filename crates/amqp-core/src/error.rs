//! Error codes and error types.

use core::fmt;

use crate::MethodSig;

/// AMQP reply codes carried by close methods.
///
/// Codes below 300 are informational, 3xx-5xx are channel or connection
/// exceptions as defined by AMQP 0-9-1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ReplyCode {
    ReplySuccess = 200,
    ContentTooLarge = 311,
    NoConsumers = 313,
    ConnectionForced = 320,
    InvalidPath = 402,
    AccessRefused = 403,
    NotFound = 404,
    ResourceLocked = 405,
    PreconditionFailed = 406,
    FrameError = 501,
    SyntaxError = 502,
    CommandInvalid = 503,
    ChannelError = 504,
    UnexpectedFrame = 505,
    ResourceError = 506,
    NotAllowed = 530,
    NotImplemented = 540,
    InternalError = 541,
}

impl ReplyCode {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            200 => Some(Self::ReplySuccess),
            311 => Some(Self::ContentTooLarge),
            313 => Some(Self::NoConsumers),
            320 => Some(Self::ConnectionForced),
            402 => Some(Self::InvalidPath),
            403 => Some(Self::AccessRefused),
            404 => Some(Self::NotFound),
            405 => Some(Self::ResourceLocked),
            406 => Some(Self::PreconditionFailed),
            501 => Some(Self::FrameError),
            502 => Some(Self::SyntaxError),
            503 => Some(Self::CommandInvalid),
            504 => Some(Self::ChannelError),
            505 => Some(Self::UnexpectedFrame),
            506 => Some(Self::ResourceError),
            530 => Some(Self::NotAllowed),
            540 => Some(Self::NotImplemented),
            541 => Some(Self::InternalError),
            _ => None,
        }
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReplySuccess => write!(f, "reply success"),
            Self::ContentTooLarge => write!(f, "content too large"),
            Self::NoConsumers => write!(f, "no consumers"),
            Self::ConnectionForced => write!(f, "connection forced"),
            Self::InvalidPath => write!(f, "invalid path"),
            Self::AccessRefused => write!(f, "access refused"),
            Self::NotFound => write!(f, "not found"),
            Self::ResourceLocked => write!(f, "resource locked"),
            Self::PreconditionFailed => write!(f, "precondition failed"),
            Self::FrameError => write!(f, "frame error"),
            Self::SyntaxError => write!(f, "syntax error"),
            Self::CommandInvalid => write!(f, "command invalid"),
            Self::ChannelError => write!(f, "channel error"),
            Self::UnexpectedFrame => write!(f, "unexpected frame"),
            Self::ResourceError => write!(f, "resource error"),
            Self::NotAllowed => write!(f, "not allowed"),
            Self::NotImplemented => write!(f, "not implemented"),
            Self::InternalError => write!(f, "internal error"),
        }
    }
}

/// Transport-level errors.
#[derive(Debug)]
pub enum TransportError {
    Closed,
    Io(std::io::Error),
    /// The peer sent bytes that do not form a valid frame sequence.
    Framing(String),
    Encode(EncodeError),
    Decode(DecodeError),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "transport closed"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Framing(msg) => write!(f, "framing error: {msg}"),
            Self::Encode(e) => write!(f, "serialize error: {e}"),
            Self::Decode(e) => write!(f, "deserialize error: {e}"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Encode(e) => Some(e),
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<EncodeError> for TransportError {
    fn from(e: EncodeError) -> Self {
        Self::Encode(e)
    }
}

impl From<DecodeError> for TransportError {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

/// Argument encoding errors.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodeError {
    /// The format string names a type the codec does not know.
    UnknownFormat(char),
    /// Fewer or more values than the format string describes.
    ArgumentCount { expected: usize, actual: usize },
    /// A value does not match the format character at `index`.
    TypeMismatch {
        index: usize,
        expected: char,
        found: &'static str,
    },
    /// Short strings are limited to 255 bytes.
    StringTooLong { len: usize },
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownFormat(c) => write!(f, "unknown format character {c:?}"),
            Self::ArgumentCount { expected, actual } => {
                write!(f, "format expects {expected} arguments, got {actual}")
            }
            Self::TypeMismatch {
                index,
                expected,
                found,
            } => {
                write!(
                    f,
                    "argument {index}: format {expected:?} cannot encode a {found} value"
                )
            }
            Self::StringTooLong { len } => {
                write!(f, "short string of {len} bytes exceeds 255")
            }
        }
    }
}

impl std::error::Error for EncodeError {}

/// Argument decoding errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    UnexpectedEof,
    InvalidData(String),
    UnknownFormat(char),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected end of input"),
            Self::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            Self::UnknownFormat(c) => write!(f, "unknown format character {c:?}"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Errors surfaced by channel operations and the event drain.
#[derive(Debug)]
pub enum ChannelError {
    /// The channel (or its connection) is closed; nothing was sent.
    ConnectionClosed,
    /// The peer sent a method the method table does not know.
    UnimplementedMethod(MethodSig),
    /// No frame arrived before the drain deadline.
    Timeout,
    InvalidArgument(String),
    ChannelIdInUse(u16),
    NoFreeChannelIds {
        max: u16,
    },
    /// A failure reported by a listener or by the peer's close method.
    Status {
        code: u16,
        message: String,
    },
    Transport(TransportError),
    Encode(EncodeError),
    Decode(DecodeError),
}

impl ChannelError {
    /// True for [`ChannelError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// True for [`ChannelError::ConnectionClosed`].
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed)
    }
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionClosed => write!(f, "connection already closed"),
            Self::UnimplementedMethod(sig) => write!(f, "unknown AMQP method {sig}"),
            Self::Timeout => write!(f, "timed out waiting for a frame"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::ChannelIdInUse(id) => write!(f, "channel {id} is already in use"),
            Self::NoFreeChannelIds { max } => {
                write!(f, "no free channel ids (channel_max {max})")
            }
            Self::Status { code, message } => match ReplyCode::from_u16(*code) {
                Some(reply) => write!(f, "{code} ({reply}): {message}"),
                None => write!(f, "{code}: {message}"),
            },
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::Encode(e) => write!(f, "serialize error: {e}"),
            Self::Decode(e) => write!(f, "deserialize error: {e}"),
        }
    }
}

impl std::error::Error for ChannelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            Self::Encode(e) => Some(e),
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for ChannelError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Closed => Self::ConnectionClosed,
            other => Self::Transport(other),
        }
    }
}

impl From<EncodeError> for ChannelError {
    fn from(e: EncodeError) -> Self {
        Self::Encode(e)
    }
}

impl From<DecodeError> for ChannelError {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}
