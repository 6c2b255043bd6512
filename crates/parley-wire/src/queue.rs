//! The inbound queue: every connection reader feeds one consumer.

use parley_types::session::InboundMessage;
use tokio::sync::mpsc;

/// Create a bounded inbound queue.
///
/// The sender is cloned into every reader task; the receiver is the single
/// consumer. A full queue makes readers wait, which in turn stops them
/// reading from their sockets.
pub fn inbound_queue(capacity: usize) -> (InboundSender, InboundReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (InboundSender { tx }, InboundReceiver { rx })
}

/// Producer side, one clone per reader.
#[derive(Debug, Clone)]
pub struct InboundSender {
    tx: mpsc::Sender<InboundMessage>,
}

impl InboundSender {
    /// Enqueue a chunk. Returns `false` once the consumer is gone.
    pub async fn push(&self, msg: InboundMessage) -> bool {
        self.tx.send(msg).await.is_ok()
    }

    /// Whether the consumer has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side. There is exactly one per [`ChatNode`](crate::ChatNode).
#[derive(Debug)]
pub struct InboundReceiver {
    rx: mpsc::Receiver<InboundMessage>,
}

impl InboundReceiver {
    /// Next chunk in arrival order. `None` once the node has shut down and
    /// every reader has exited.
    pub async fn recv(&mut self) -> Option<InboundMessage> {
        self.rx.recv().await
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<InboundMessage> {
        self.rx.try_recv().ok()
    }

    /// Unwrap into the underlying tokio receiver.
    pub fn into_inner(self) -> mpsc::Receiver<InboundMessage> {
        self.rx
    }
}
