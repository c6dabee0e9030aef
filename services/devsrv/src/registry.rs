//! Process-wide map of device identifier to live session
//!
//! Registering an identifier that already has a session cancels the old
//! session. Removal only succeeds for the session that is still current, so
//! a replaced session shutting down never evicts its successor.
//!
//! Successive sessions of one identifier share an online lock. Any write of
//! the online flag that depends on which session is current happens under it.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Non-owning reference to a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: u64,
    cancel: CancellationToken,
    online: Arc<Mutex<()>>,
}

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Ask the session to stop
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Serialize online-flag writes with the other sessions of this device
    pub async fn lock_online(&self) -> MutexGuard<'_, ()> {
        self.online.lock().await
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, SessionHandle>>,
    next_id: Arc<AtomicU64>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a session for `mac`, cancelling whichever session held it
    pub fn register(&self, mac: &str, cancel: CancellationToken) -> SessionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        match self.sessions.entry(mac.to_string()) {
            Entry::Occupied(mut entry) => {
                let handle = SessionHandle {
                    id,
                    cancel,
                    online: Arc::clone(&entry.get().online),
                };
                let previous = entry.insert(handle.clone());
                info!("{} reconnected, stopping session #{}", mac, previous.id);
                previous.cancel();
                handle
            },
            Entry::Vacant(entry) => {
                let handle = SessionHandle {
                    id,
                    cancel,
                    online: Arc::default(),
                };
                entry.insert(handle.clone());
                handle
            },
        }
    }

    /// Remove the entry for `mac` if it still belongs to session `id`
    pub fn unregister(&self, mac: &str, id: u64) -> bool {
        self.sessions.remove_if(mac, |_, h| h.id == id).is_some()
    }

    pub fn lookup(&self, mac: &str) -> Option<SessionHandle> {
        self.sessions.get(mac).map(|h| h.clone())
    }
}
