use crate::models::QueuedPayment;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, Notify};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("payment queue is closed")]
pub struct QueueClosed;

/// Bounded FIFO hand-off between the ingestion API and the worker pool.
///
/// `publish` waits while the queue is full; that wait is the only backpressure in the
/// system. Workers share the receiving end, so each item is consumed exactly once.
#[derive(Clone)]
pub struct PaymentQueue {
    sender: mpsc::Sender<QueuedPayment>,
    receiver: Arc<Mutex<mpsc::Receiver<QueuedPayment>>>,
    capacity: usize,
    closed: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

impl PaymentQueue {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            capacity,
            closed: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub async fn publish(&self, payment: QueuedPayment) -> Result<(), QueueClosed> {
        if self.is_closed() {
            return Err(QueueClosed);
        }
        self.sender.send(payment).await.map_err(|_| QueueClosed)
    }

    /// Waits for the next item. `None` once the queue is closed and drained.
    pub async fn consume(&self) -> Option<QueuedPayment> {
        let mut receiver = self.receiver.lock().await;

        loop {
            let shutdown = self.shutdown.notified();

            if self.is_closed() {
                // Fails any publisher still parked on a full queue, then drains the buffer.
                receiver.close();
                return receiver.recv().await;
            }

            tokio::select! {
                item = receiver.recv() => return item,
                _ = shutdown => continue,
            }
        }
    }

    /// Stops accepting new items. Items already queued can still be consumed.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.shutdown.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.capacity - self.sender.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
