//! Tracking of live connections.

use dashmap::DashMap;
use std::{
    fmt,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};
use tokio::sync::Notify;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    #[inline]
    fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline(always)]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// What the registry knows about one connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub peer: SocketAddr,
    pub opened: Instant,
}

struct LiveConnection {
    info: ConnectionInfo,
    close: Arc<Notify>,
}

#[derive(Default)]
struct Shared {
    map: DashMap<ConnectionId, LiveConnection>,
    closing: AtomicBool,
}

/// Every connection currently being served.
///
/// Cloning is cheap; all clones see the same table.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    shared: Arc<Shared>,
}

impl ConnectionRegistry {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection. It stays registered until the guard is dropped.
    pub(crate) fn register(&self, peer: SocketAddr) -> ConnectionGuard {
        let id = ConnectionId::next();
        let close = Arc::new(Notify::new());

        let info = ConnectionInfo {
            id,
            peer,
            opened: Instant::now(),
        };
        self.shared.map.insert(
            id,
            LiveConnection {
                info,
                close: close.clone(),
            },
        );

        // a connection accepted while shutting down closes right away
        if self.shared.closing.load(Ordering::Acquire) {
            close.notify_one();
        }

        tracing::trace!(%id, %peer, "connection registered");
        ConnectionGuard {
            id,
            close,
            registry: self.clone(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.shared.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shared.map.is_empty()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.shared.map.contains_key(&id)
    }

    /// Copies the info of every live connection, in no particular order.
    pub fn snapshot(&self) -> Vec<ConnectionInfo> {
        self.shared
            .map
            .iter()
            .map(|entry| entry.value().info.clone())
            .collect()
    }

    /// Asks every live connection, and every later one, to close.
    pub(crate) fn close_all(&self) {
        self.shared.closing.store(true, Ordering::Release);

        for entry in self.shared.map.iter() {
            entry.value().close.notify_one();
        }
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("live", &self.len())
            .field("closing", &self.shared.closing.load(Ordering::Relaxed))
            .finish()
    }
}

/// Registration of one connection; deregisters on drop.
pub(crate) struct ConnectionGuard {
    id: ConnectionId,
    close: Arc<Notify>,
    registry: ConnectionRegistry,
}

impl ConnectionGuard {
    #[inline(always)]
    pub(crate) fn id(&self) -> ConnectionId {
        self.id
    }

    /// Completes once the server asks this connection to close.
    ///
    /// The notification is stored, so asking before this is awaited still counts.
    #[inline]
    pub(crate) async fn closed(&self) {
        self.close.notified().await
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.shared.map.remove(&self.id);
        tracing::trace!(id = %self.id, "connection deregistered");
    }
}
