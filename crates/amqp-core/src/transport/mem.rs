use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex as AsyncMutex, Notify, mpsc};

use crate::{Frame, TransportError};

use super::TransportBackend;

const CHANNEL_CAPACITY: usize = 64;

/// In-process transport passing [`Frame`] values over tokio channels.
///
/// Both ends share one link: closing either end closes it for both, like a
/// socket shutdown. Frames already queued are still delivered.
#[derive(Clone, Debug)]
pub struct MemTransport {
    end: Arc<MemEnd>,
}

#[derive(Debug)]
struct MemEnd {
    outbound: mpsc::Sender<Frame>,
    inbound: AsyncMutex<mpsc::Receiver<Frame>>,
    link: Arc<Link>,
}

#[derive(Debug, Default)]
struct Link {
    closed: AtomicBool,
    wake: Notify,
}

impl Link {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.wake.notify_waiters();
        }
    }

    async fn closed(&self) {
        loop {
            let notified = self.wake.notified();
            if self.is_closed() {
                return;
            }
            notified.await;
        }
    }
}

impl MemTransport {
    pub fn pair() -> (Self, Self) {
        let (to_b, from_a) = mpsc::channel(CHANNEL_CAPACITY);
        let (to_a, from_b) = mpsc::channel(CHANNEL_CAPACITY);
        let link = Arc::new(Link::default());

        let a = MemEnd {
            outbound: to_b,
            inbound: AsyncMutex::new(from_b),
            link: link.clone(),
        };
        let b = MemEnd {
            outbound: to_a,
            inbound: AsyncMutex::new(from_a),
            link,
        };

        (Self { end: Arc::new(a) }, Self { end: Arc::new(b) })
    }
}

impl TransportBackend for MemTransport {
    async fn send_frame(&self, frame: Frame) -> Result<(), TransportError> {
        if self.end.link.is_closed() {
            return Err(TransportError::Closed);
        }
        tracing::trace!(channel_id = frame.channel_id, sig = %frame.sig, "mem: send");
        self.end
            .outbound
            .send(frame)
            .await
            .map_err(|_| TransportError::Closed)
    }

    async fn recv_frame(&self) -> Result<Frame, TransportError> {
        let mut inbound = self.end.inbound.lock().await;
        tokio::select! {
            biased;
            frame = inbound.recv() => frame.ok_or(TransportError::Closed),
            _ = self.end.link.closed() => {
                // Drain what the peer queued before closing.
                inbound.try_recv().map_err(|_| TransportError::Closed)
            }
        }
    }

    fn close(&self) {
        tracing::debug!("mem: link closed");
        self.end.link.close();
    }

    fn is_closed(&self) -> bool {
        self.end.link.is_closed()
    }
}
