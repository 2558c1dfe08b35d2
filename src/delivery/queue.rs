//! Delivery Hand-off Queue
//!
//! Once a DATA transaction completes, the session hands the envelope and body
//! to the delivery backend through this queue. The session never waits for
//! delivery: submitting is a non-blocking push onto an unbounded channel.

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

/// One captured message, ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Identity of the session that captured the message
    pub session: u64,
    /// The client's HELO identity
    pub identity: String,
    /// Sender mailbox from MAIL FROM
    pub sender: String,
    /// Recipient mailbox from RCPT TO
    pub recipient: String,
    /// Message body, dot-stuffing removed, terminator line excluded
    pub body: Bytes,
}

/// Errors returned when handing off a message.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The receiving side of the queue is gone
    #[error("delivery queue is closed")]
    QueueClosed(Box<Envelope>),
}

/// Sending half of the delivery queue, cloned into every session.
#[derive(Debug, Clone)]
pub struct DeliveryQueue {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl DeliveryQueue {
    /// Creates a queue and returns its receiving half.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Hands a message off for asynchronous delivery.
    pub fn submit(&self, envelope: Envelope) -> Result<(), DeliveryError> {
        self.tx
            .send(envelope)
            .map_err(|mpsc::error::SendError(envelope)| {
                DeliveryError::QueueClosed(Box::new(envelope))
            })
    }

    /// Returns `true` once the receiver has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope() -> Envelope {
        Envelope {
            session: 7,
            identity: "a.com".to_string(),
            sender: "a@b.com".to_string(),
            recipient: "c@d.com".to_string(),
            body: Bytes::from("hello\n"),
        }
    }

    #[tokio::test]
    async fn test_submit_and_receive() {
        let (queue, mut rx) = DeliveryQueue::channel();
        queue.submit(envelope()).unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received, envelope());
    }

    #[tokio::test]
    async fn test_submit_after_receiver_dropped() {
        let (queue, rx) = DeliveryQueue::channel();
        drop(rx);

        assert!(queue.is_closed());
        match queue.submit(envelope()) {
            Err(DeliveryError::QueueClosed(returned)) => assert_eq!(*returned, envelope()),
            Ok(()) => panic!("submit should fail on a closed queue"),
        }
    }
}
