//! Fan-out output
//!
//! Copies every inbound frame to each registered output without waiting: a
//! frame is dropped for an output whose queue is full, and only for that
//! output. Frames are `Bytes`, so a copy is a reference count bump.
//!
//! The registered outputs' own run loops are started by the caller; closing
//! the mirror closes them in registration order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use super::Output;
use crate::queue::{try_enqueue, FrameSender, OutputQueue, OUTPUT_CHANNEL_SIZE};

/// Output broadcasting to several outputs
pub struct MirrorOutput {
    queue: OutputQueue,
    outputs: Vec<Arc<dyn Output>>,
    drops: Vec<AtomicU64>,
}

impl MirrorOutput {
    pub fn new() -> Self {
        Self::with_capacity(OUTPUT_CHANNEL_SIZE)
    }

    /// Mirror whose inbound queue holds `capacity` frames
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: OutputQueue::new(capacity),
            outputs: Vec::new(),
            drops: Vec::new(),
        }
    }

    /// Register an output; only before the run loop starts
    pub fn add(&mut self, output: Arc<dyn Output>) {
        self.outputs.push(output);
        self.drops.push(AtomicU64::new(0));
    }

    /// Registered outputs, in registration order
    pub fn outputs(&self) -> &[Arc<dyn Output>] {
        &self.outputs
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Frames dropped for the output registered at `index`
    pub fn dropped(&self, index: usize) -> u64 {
        self.drops
            .get(index)
            .map_or(0, |count| count.load(Ordering::Relaxed))
    }

    /// Frames dropped across all outputs
    pub fn dropped_total(&self) -> u64 {
        self.drops
            .iter()
            .map(|count| count.load(Ordering::Relaxed))
            .sum()
    }
}

impl Default for MirrorOutput {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Output for MirrorOutput {
    fn output_channel(&self) -> FrameSender {
        self.queue.sender()
    }

    async fn run_output_loop(&self) {
        let mut reader = match self.queue.take_reader() {
            Some(reader) => reader,
            None => {
                tracing::warn!("Mirror output loop already started");
                return;
            }
        };

        let sinks: Vec<FrameSender> = self.outputs.iter().map(|o| o.output_channel()).collect();

        while let Some(frame) = reader.recv().await {
            for (index, sink) in sinks.iter().enumerate() {
                if !try_enqueue(sink, frame.clone()) {
                    let dropped = self.drops[index].fetch_add(1, Ordering::Relaxed) + 1;
                    tracing::trace!(output = index, dropped, "Mirror dropped frame");
                }
            }
        }
        drop(sinks);

        for output in &self.outputs {
            output.close().await;
        }
        self.queue.mark_done();
    }

    async fn close(&self) {
        self.queue.close().await;
    }
}
