use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex as AsyncMutex;

use crate::framing::{self, DEFAULT_FRAME_MAX, FrameAssembler};
use crate::{Frame, MethodTable, TransportError};

use super::TransportBackend;

const READ_CHUNK: usize = 8 * 1024;

/// Transport over any byte stream, using AMQP 0-9-1 wire framing.
#[derive(Clone)]
pub struct StreamTransport {
    inner: Arc<StreamInner>,
}

impl std::fmt::Debug for StreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("frame_max", &self.inner.frame_max)
            .finish_non_exhaustive()
    }
}

struct StreamInner {
    reader: AsyncMutex<ReadState>,
    writer: AsyncMutex<Box<dyn AsyncWrite + Unpin + Send + Sync>>,
    closed: AtomicBool,
    frame_max: u32,
}

/// Read side. Bytes are buffered here rather than read with `read_exact`, so
/// a `recv_frame` dropped mid-frame (e.g. by a drain timeout) loses nothing.
struct ReadState {
    io: Box<dyn AsyncRead + Unpin + Send + Sync>,
    buf: BytesMut,
    assembler: FrameAssembler,
}

impl StreamTransport {
    pub fn new<S>(stream: S, methods: Arc<MethodTable>, frame_max: u32) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            inner: Arc::new(StreamInner {
                reader: AsyncMutex::new(ReadState {
                    io: Box::new(reader),
                    buf: BytesMut::with_capacity(READ_CHUNK),
                    assembler: FrameAssembler::new(methods),
                }),
                writer: AsyncMutex::new(Box::new(writer)),
                closed: AtomicBool::new(false),
                frame_max,
            }),
        }
    }

    pub fn pair(methods: Arc<MethodTable>) -> (Self, Self) {
        let (a, b) = tokio::io::duplex(65536);
        (
            Self::new(a, methods.clone(), DEFAULT_FRAME_MAX),
            Self::new(b, methods, DEFAULT_FRAME_MAX),
        )
    }

    fn is_closed_inner(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl TransportBackend for StreamTransport {
    async fn send_frame(&self, frame: Frame) -> Result<(), TransportError> {
        if self.is_closed_inner() {
            return Err(TransportError::Closed);
        }

        let mut wire = BytesMut::new();
        framing::encode_frame(&frame, self.inner.frame_max, &mut wire)?;

        let mut writer = self.inner.writer.lock().await;
        writer.write_all(&wire).await.map_err(io_error)?;
        writer.flush().await.map_err(io_error)?;
        Ok(())
    }

    async fn recv_frame(&self) -> Result<Frame, TransportError> {
        if self.is_closed_inner() {
            return Err(TransportError::Closed);
        }

        let mut guard = self.inner.reader.lock().await;
        let state = &mut *guard;
        loop {
            while let Some(raw) = framing::parse_raw_frame(&mut state.buf, self.inner.frame_max)? {
                if let Some(frame) = state.assembler.push(raw)? {
                    return Ok(frame);
                }
            }

            state.buf.reserve(READ_CHUNK);
            let n = state.io.read_buf(&mut state.buf).await.map_err(io_error)?;
            if n == 0 {
                return Err(TransportError::Closed);
            }
        }
    }

    fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.is_closed_inner()
    }
}

fn io_error(e: std::io::Error) -> TransportError {
    match e.kind() {
        std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::UnexpectedEof => TransportError::Closed,
        _ => TransportError::Io(e),
    }
}
