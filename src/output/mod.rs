//! Frame outputs
//!
//! An output owns a bounded queue. Producers push frames through
//! [`Output::output_channel`]; [`Output::run_output_loop`] consumes the queue
//! until [`Output::close`] is called, drains what is left, and releases the
//! destination.
//!
//! ```text
//!  sink queue ──> MirrorOutput ──┬──> SocketOutput ──> collector
//!                                ├──> SocketOutput ──> collector
//!                                └──> FileOutput   ──> file
//! ```

pub mod config;
pub mod file;
pub mod mirror;
pub mod socket;

use async_trait::async_trait;

use crate::queue::FrameSender;

pub use config::OutputConfig;
pub use file::FileOutput;
pub use mirror::MirrorOutput;
pub use socket::SocketOutput;

/// Destination for frames
#[async_trait]
pub trait Output: Send + Sync {
    /// Producer handle for this output's queue
    fn output_channel(&self) -> FrameSender;

    /// Consume the queue until closed; call once
    async fn run_output_loop(&self);

    /// Close the queue and wait until everything queued has been handled
    ///
    /// Must only be called once `run_output_loop` has been started.
    async fn close(&self);
}
