//! Socket plumbing shared by inputs and outputs

pub mod address;
pub mod dialer;
pub mod stream;

pub use address::SocketAddress;
pub use dialer::{Dialer, NetDialer, DEFAULT_DIAL_TIMEOUT};
pub use stream::{Connection, Listener};
