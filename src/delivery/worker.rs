//! Background Delivery Worker
//!
//! This is the stand-in for a real delivery backend. It drains the delivery
//! queue as a Tokio task, logs each message and counts it. Relaying to another
//! server is not implemented.
//!
//! ## Lifecycle
//!
//! The worker runs until one of:
//! 1. The returned handle is dropped (or `stop()` is called)
//! 2. Every `DeliveryQueue` sender has been dropped

use crate::delivery::Envelope;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

/// A handle to the running delivery worker.
///
/// When this handle is dropped, the worker task will be stopped.
#[derive(Debug)]
pub struct DeliveryWorker {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,

    /// Number of envelopes taken off the queue
    delivered: Arc<AtomicU64>,
}

impl DeliveryWorker {
    /// Starts the worker as a background task draining `rx`.
    pub fn start(rx: mpsc::UnboundedReceiver<Envelope>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let delivered = Arc::new(AtomicU64::new(0));

        tokio::spawn(worker_loop(rx, Arc::clone(&delivered), shutdown_rx));

        info!("Delivery worker started");

        Self {
            shutdown_tx,
            delivered,
        }
    }

    /// Number of messages handed to the backend so far.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Stops the worker.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        info!("Delivery worker stopped");
    }
}

impl Drop for DeliveryWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn worker_loop(
    mut rx: mpsc::UnboundedReceiver<Envelope>,
    delivered: Arc<AtomicU64>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            envelope = rx.recv() => {
                let Some(envelope) = envelope else {
                    debug!("Delivery queue closed, worker exiting");
                    return;
                };
                // No relay backend yet: the message is accounted for and dropped.
                info!(
                    session = envelope.session,
                    from = %envelope.sender,
                    to = %envelope.recipient,
                    bytes = envelope.body.len(),
                    "Message accepted for delivery"
                );
                delivered.fetch_add(1, Ordering::Relaxed);
            }
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Delivery worker received shutdown signal");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::DeliveryQueue;
    use bytes::Bytes;
    use std::time::Duration;

    fn envelope(n: u64) -> Envelope {
        Envelope {
            session: n,
            identity: "client.example".to_string(),
            sender: "a@b.com".to_string(),
            recipient: "c@d.com".to_string(),
            body: Bytes::from("Subject: hi\n\nhello\n"),
        }
    }

    #[tokio::test]
    async fn test_worker_drains_queue() {
        let (queue, rx) = DeliveryQueue::channel();
        let worker = DeliveryWorker::start(rx);

        for i in 0..5 {
            queue.submit(envelope(i)).unwrap();
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(worker.delivered(), 5);
    }

    #[tokio::test]
    async fn test_worker_stops_on_drop() {
        let (queue, rx) = DeliveryQueue::channel();

        {
            let _worker = DeliveryWorker::start(rx);
            tokio::time::sleep(Duration::from_millis(20)).await;
            // Worker is dropped here
        }

        tokio::time::sleep(Duration::from_millis(50)).await;

        // The receiver went away with the worker task
        assert!(queue.is_closed());
        assert!(queue.submit(envelope(1)).is_err());
    }
}
