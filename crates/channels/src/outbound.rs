//! The single outbound response queue.

use {
    hal_common::types::OutboundResponse,
    tokio::sync::mpsc,
};

use crate::{Error, Result};

/// Cloneable producer handle. Plugins and the dispatcher enqueue responses
/// here; only the delivery worker consumes them.
#[derive(Debug, Clone)]
pub struct OutboundSender {
    tx: mpsc::Sender<OutboundResponse>,
}

impl OutboundSender {
    /// Enqueue `response`, waiting for room if the queue is full.
    pub async fn send(&self, response: OutboundResponse) -> Result<()> {
        self.tx
            .send(response)
            .await
            .map_err(|_| Error::unavailable("outbound queue closed"))
    }

    /// Enqueue a plain text reply to a raw destination reference.
    pub async fn reply(&self, to: &str, text: impl Into<String>) -> Result<()> {
        self.send(OutboundResponse::text(to, text)).await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer end, owned by the delivery worker.
#[derive(Debug)]
pub struct OutboundReceiver {
    rx: mpsc::Receiver<OutboundResponse>,
}

impl OutboundReceiver {
    pub async fn recv(&mut self) -> Option<OutboundResponse> {
        self.rx.recv().await
    }

    /// Next queued response, without waiting.
    pub fn try_recv(&mut self) -> Option<OutboundResponse> {
        self.rx.try_recv().ok()
    }

    /// Stop accepting new responses. Already queued ones can still be
    /// received.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

/// Create a bounded outbound queue.
pub fn outbound_queue(capacity: usize) -> (OutboundSender, OutboundReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (OutboundSender { tx }, OutboundReceiver { rx })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, hal_common::types::Destination};

    #[tokio::test]
    async fn preserves_arrival_order() {
        let (tx, mut rx) = outbound_queue(4);
        tx.reply("C1", "one").await.unwrap();
        tx.reply("#ops", "two").await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.content.unwrap().text, "one");
        let second = rx.recv().await.unwrap();
        assert_eq!(
            second.destination,
            Some(Destination::ChannelName("ops".into()))
        );
    }

    #[tokio::test]
    async fn send_fails_once_closed() {
        let (tx, mut rx) = outbound_queue(4);
        rx.close();
        assert!(tx.is_closed());
        assert!(matches!(
            tx.reply("C1", "late").await,
            Err(Error::Unavailable { .. })
        ));
    }
}
