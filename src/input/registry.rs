//! Registry of open connections
//!
//! Every accepted connection is registered under its id until its worker
//! finishes. During shutdown the listener drains the registry and
//! force-closes whatever is left.

use std::collections::HashMap;
use std::net::SocketAddr;

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Handle to one open connection
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Peer address (TCP only)
    pub peer: Option<SocketAddr>,

    close: oneshot::Sender<()>,
}

impl ConnectionHandle {
    /// Ask the worker to drop the connection
    pub fn close(self) {
        let _ = self.close.send(());
    }
}

/// Open connections of one listener, keyed by connection id
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<u64, ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection
    ///
    /// The returned receiver resolves when the connection is force-closed.
    pub fn insert(&self, id: u64, peer: Option<SocketAddr>) -> oneshot::Receiver<()> {
        let (close, closed) = oneshot::channel();
        self.connections
            .lock()
            .insert(id, ConnectionHandle { peer, close });
        closed
    }

    /// Deregister a connection whose worker has finished
    pub fn remove(&self, id: u64) -> Option<ConnectionHandle> {
        self.connections.lock().remove(&id)
    }

    /// Force-close every registered connection; returns how many there were
    pub fn close_all(&self) -> usize {
        let drained: Vec<ConnectionHandle> = {
            let mut connections = self.connections.lock();
            connections.drain().map(|(_, handle)| handle).collect()
        };
        let count = drained.len();
        for handle in drained {
            handle.close();
        }
        count
    }

    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.connections.lock().contains_key(&id)
    }
}
