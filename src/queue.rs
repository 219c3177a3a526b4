//! Bounded frame queues
//!
//! Every input writes into, and every output reads from, a bounded
//! `tokio::sync::mpsc` channel of [`Bytes`]. [`OutputQueue`] adds the
//! close/drain/done handshake outputs need: producers may hold clones of the
//! sender, so closing is signalled to the consumer, which closes the receiving
//! side and drains what is already buffered.

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use crate::signal::Signal;

/// Default capacity of every frame queue
pub const OUTPUT_CHANNEL_SIZE: usize = 32;

/// Producer side of a frame queue
pub type FrameSender = mpsc::Sender<Bytes>;

/// Consumer side of a frame queue
pub type FrameReceiver = mpsc::Receiver<Bytes>;

/// Create a frame queue with the given capacity
pub fn channel(capacity: usize) -> (FrameSender, FrameReceiver) {
    mpsc::channel(capacity.max(1))
}

/// Enqueue without waiting
///
/// Returns `false` if the queue is full or closed; the frame is dropped.
pub fn try_enqueue(queue: &FrameSender, frame: Bytes) -> bool {
    queue.try_send(frame).is_ok()
}

/// Queue owned by an output: sender for producers, receiver for the run loop
#[derive(Debug)]
pub struct OutputQueue {
    sender: FrameSender,
    receiver: Mutex<Option<FrameReceiver>>,
    closing: Signal,
    done: Signal,
}

impl OutputQueue {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = channel(capacity);
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            closing: Signal::new(),
            done: Signal::new(),
        }
    }

    /// Producer handle
    pub fn sender(&self) -> FrameSender {
        self.sender.clone()
    }

    /// Hand the receiving side to the run loop. Only the first call succeeds.
    pub(crate) fn take_reader(&self) -> Option<QueueReader> {
        let receiver = self.receiver.lock().take()?;
        Some(QueueReader {
            receiver,
            closing: self.closing.subscribe(),
            closed: false,
        })
    }

    /// Close the queue and wait for the run loop to report completion
    pub(crate) async fn close(&self) {
        self.closing.fire();
        self.done.wait().await;
    }

    /// Called by the run loop once it has drained and released its resources
    pub(crate) fn mark_done(&self) {
        self.done.fire();
    }

    pub fn is_closing(&self) -> bool {
        self.closing.is_fired()
    }
}

/// Receiving side of an [`OutputQueue`]
#[derive(Debug)]
pub(crate) struct QueueReader {
    receiver: FrameReceiver,
    closing: watch::Receiver<bool>,
    closed: bool,
}

impl QueueReader {
    /// Next frame, or `None` once the queue is closed and drained
    pub async fn recv(&mut self) -> Option<Bytes> {
        loop {
            if self.closed {
                return self.receiver.recv().await;
            }
            tokio::select! {
                biased;
                _ = fired(&mut self.closing) => {
                    self.receiver.close();
                    self.closed = true;
                }
                frame = self.receiver.recv() => return frame,
            }
        }
    }

    /// True if no frame is immediately available
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

async fn fired(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|fired| *fired).await;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_try_enqueue_full_queue() {
        let (tx, mut rx) = channel(1);

        assert!(try_enqueue(&tx, Bytes::from_static(b"one")));
        assert!(!try_enqueue(&tx, Bytes::from_static(b"two")));

        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"one"));
        assert!(try_enqueue(&tx, Bytes::from_static(b"three")));
    }

    #[tokio::test]
    async fn test_try_enqueue_closed_queue() {
        let (tx, rx) = channel(4);
        drop(rx);
        assert!(!try_enqueue(&tx, Bytes::from_static(b"lost")));
    }

    #[tokio::test]
    async fn test_reader_taken_once() {
        let queue = OutputQueue::new(OUTPUT_CHANNEL_SIZE);
        assert!(queue.take_reader().is_some());
        assert!(queue.take_reader().is_none());
    }

    #[tokio::test]
    async fn test_close_drains_buffered_frames() {
        let queue = Arc::new(OutputQueue::new(4));
        let tx = queue.sender();
        tx.send(Bytes::from_static(b"a")).await.unwrap();
        tx.send(Bytes::from_static(b"b")).await.unwrap();

        let mut reader = queue.take_reader().unwrap();
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(frame) = reader.recv().await {
                    seen.push(frame);
                }
                queue.mark_done();
                seen
            })
        };

        tokio::time::timeout(Duration::from_secs(1), queue.close())
            .await
            .expect("close should complete once drained");
        assert!(queue.is_closing());

        let seen = consumer.await.unwrap();
        assert_eq!(seen, vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]);

        // Producers holding a sender see the queue as closed
        assert!(tx.send(Bytes::from_static(b"late")).await.is_err());
    }
}
