//! dnstap Frame Streams transport
//!
//! Moves opaque dnstap frames between DNS software and collectors over
//! Frame Streams sockets and files.
//!
//! ```text
//!  producers ──> SocketInput ──> queue ──> MirrorOutput ──┬──> SocketOutput ──> collector
//!                                                         └──> FileOutput
//! ```
//!
//! - [`input::SocketInput`] accepts many producer connections and reads them
//!   concurrently into one queue.
//! - [`output::SocketOutput`] keeps a connection to a collector alive,
//!   retrying and replaying unconfirmed frames after failures.
//! - [`output::MirrorOutput`] copies one stream to several outputs without
//!   letting a slow output hold back the others.
//! - [`codec`] and [`framing`] implement the wire format.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use dnstap_rs::input::{Input, SocketInput};
//! use dnstap_rs::output::{Output, SocketOutput};
//!
//! # async fn run() -> dnstap_rs::Result<()> {
//! let input = Arc::new(SocketInput::from_path("/var/run/dnstap.sock").await?);
//! let output = Arc::new(SocketOutput::new("collector.example:6000".parse()?));
//!
//! let sender = output.output_channel();
//! let out = Arc::clone(&output);
//! tokio::spawn(async move { out.run_output_loop().await });
//! input.read_into(sender).await;
//! output.close().await;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod error;
pub mod framing;
pub mod input;
pub mod logging;
pub mod net;
pub mod output;
pub mod queue;

mod signal;

pub use codec::{Decoder, Encoder, Message};
pub use error::{Error, FramingError, Result};
pub use input::{FrameStreamInput, Input, SocketInput};
pub use logging::{Logger, NullLogger, SharedLogger, TracingLogger};
pub use net::SocketAddress;
pub use output::{FileOutput, MirrorOutput, Output, OutputConfig, SocketOutput};
pub use queue::{FrameSender, OUTPUT_CHANNEL_SIZE};
