//! Frame inputs
//!
//! An input reads frames from somewhere and pushes them into a sink queue.
//!
//! ```text
//!  producer ──┐
//!  producer ──┼──> SocketInput ──> ConnectionReader (per connection) ──> sink
//!  producer ──┘
//! ```

pub mod config;
pub mod connection;
pub mod registry;
pub mod socket;
pub mod stream;

use async_trait::async_trait;

use crate::queue::FrameSender;

pub use config::InputConfig;
pub use connection::ConnectionReader;
pub use registry::{ConnectionHandle, ConnectionRegistry};
pub use socket::SocketInput;
pub use stream::FrameStreamInput;

/// Source of frames
#[async_trait]
pub trait Input: Send + Sync {
    /// Read frames into `output` until the input is exhausted or closed
    async fn read_into(&self, output: FrameSender);

    /// Resolve once `read_into` has finished and released its resources
    async fn wait(&self);
}
