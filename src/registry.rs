//! The set of connected clients.
//!
//! The registry is only a guarded container: it knows nothing about sockets,
//! and it does not deliver anything. Delivery happens on a [`Registry::snapshot`],
//! after the lock has been released.

use std::{
    collections::HashMap,
    fmt::Display,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::serial::SerialMessage;

/// Identifies a single connection for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(Uuid);

impl ClientId {
    /// A fresh, unique id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The first group is plenty to tell clients apart in logs.
        let id = self.0.simple().to_string();
        write!(f, "{}", &id[..8])
    }
}

/// What the rest of the hub needs to reach one client.
///
/// The session owning the client holds the receiving end of the outbox;
/// clones of this handle only allow queueing lines and asking the session to stop.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: ClientId,
    peer: Option<SocketAddr>,
    outbox: mpsc::Sender<SerialMessage>,
    shutdown: CancellationToken,
}

impl ClientHandle {
    /// Create a handle along with the receiving end of its outbox.
    pub fn new(
        peer: Option<SocketAddr>,
        outbox_capacity: usize,
    ) -> (Self, mpsc::Receiver<SerialMessage>) {
        let (outbox, inbox) = mpsc::channel(outbox_capacity.max(1));

        (
            Self {
                id: ClientId::new(),
                peer,
                outbox,
                shutdown: CancellationToken::new(),
            },
            inbox,
        )
    }

    /// The client's id.
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// The client's remote address, if it has one.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Where lines for this client are queued.
    pub fn outbox(&self) -> &mpsc::Sender<SerialMessage> {
        &self.outbox
    }

    /// Ask the client's session to stop.
    /// Safe to call any number of times.
    pub fn disconnect(&self) {
        self.shutdown.cancel();
    }

    /// Whether the client has been asked to stop.
    pub fn is_disconnected(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// The termination signal shared by the client's tasks.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

impl Display for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.peer {
            Some(peer) => write!(f, "{}@{peer}", self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

/// The operations the hub needs from a set of clients.
///
/// Implementations must be safe to use from many tasks at once,
/// and must never hold internal locks while callers deliver to clients.
pub trait Registry: Send + Sync {
    /// Start tracking a client.
    /// Adding the same client twice is a no-op.
    fn add(&self, client: ClientHandle);

    /// Stop tracking a client.
    /// Returns `true` only for the call which actually removed it.
    fn remove(&self, id: ClientId) -> bool;

    /// The clients registered right now.
    fn snapshot(&self) -> Vec<ClientHandle>;

    /// How many clients are registered.
    fn len(&self) -> usize;

    /// Whether no clients are registered.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A registry shared between the server, the pump, and sessions.
pub type SharedRegistry = Arc<dyn Registry>;

/// A [`Registry`] backed by a mutex guarded map.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<ClientId, ClientHandle>>,
}

impl ClientRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty registry, ready to be shared.
    pub fn shared() -> SharedRegistry {
        Arc::new(Self::new())
    }

    fn clients(&self) -> std::sync::MutexGuard<'_, HashMap<ClientId, ClientHandle>> {
        // Nothing can panic while the lock is held, but if it ever did
        // the map itself would still be consistent.
        self.clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Registry for ClientRegistry {
    fn add(&self, client: ClientHandle) {
        let id = client.id();
        let mut clients = self.clients();

        if clients.contains_key(&id) {
            debug!(%id, "Already registered");
            return;
        }

        clients.insert(id, client);
        debug!(%id, clients = clients.len(), "Registered");
    }

    fn remove(&self, id: ClientId) -> bool {
        let mut clients = self.clients();
        let removed = clients.remove(&id).is_some();

        if removed {
            debug!(%id, clients = clients.len(), "Unregistered");
        }

        removed
    }

    fn snapshot(&self) -> Vec<ClientHandle> {
        self.clients().values().cloned().collect()
    }

    fn len(&self) -> usize {
        self.clients().len()
    }
}
