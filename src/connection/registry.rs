//! Connection registry
//!
//! Tracks every live session, enforces the client limit and closes
//! sessions that stay idle for too long.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::connection::handle::{SessionHandle, SessionId};
use crate::error::RegistryError;

/// Registry for tracking active control connections
pub struct ConnectionManager {
    connections: Mutex<HashMap<SessionId, SessionHandle>>,
    max_connections: usize,
    idle_timeout: Option<Duration>,
}

impl ConnectionManager {
    pub fn new(max_connections: usize, idle_timeout: Option<Duration>) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            max_connections,
            idle_timeout,
        }
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Adds a session, unless the limit is already reached.
    pub async fn register(&self, handle: SessionHandle) -> Result<(), RegistryError> {
        let mut connections = self.connections.lock().await;
        if connections.contains_key(&handle.id()) {
            return Err(RegistryError::Duplicate(handle.id()));
        }
        if connections.len() >= self.max_connections {
            return Err(RegistryError::LimitReached(self.max_connections));
        }

        info!(
            "Registered session {} for {} ({}/{} clients)",
            handle.id(),
            handle.client_address(),
            connections.len() + 1,
            self.max_connections
        );
        connections.insert(handle.id(), handle);
        Ok(())
    }

    /// Removes a session. Called by the session itself once torn down.
    pub async fn deregister(&self, id: SessionId) -> Option<SessionHandle> {
        let removed = self.connections.lock().await.remove(&id);
        if removed.is_some() {
            debug!("Deregistered session {}", id);
        }
        removed
    }

    /// Asks one session to close. It leaves the registry when its task ends.
    pub async fn close_connection(&self, id: SessionId) -> bool {
        match self.connections.lock().await.get(&id) {
            Some(handle) => {
                handle.close();
                true
            }
            None => false,
        }
    }

    /// Asks every session to close; returns how many were asked.
    pub async fn close_all(&self) -> usize {
        let connections = self.connections.lock().await;
        for handle in connections.values() {
            handle.close();
        }
        connections.len()
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }

    pub async fn sessions(&self) -> Vec<SessionHandle> {
        self.connections.lock().await.values().cloned().collect()
    }

    /// Closes sessions idle for longer than the configured timeout.
    pub async fn sweep_idle(&self, now: Instant) -> usize {
        let Some(timeout) = self.idle_timeout else {
            return 0;
        };

        let connections = self.connections.lock().await;
        let mut closed = 0;
        for handle in connections.values() {
            if !handle.is_closing() && handle.idle_time(now) > timeout {
                info!(
                    "Closing idle session {} for {} (idle > {:?})",
                    handle.id(),
                    handle.client_address(),
                    timeout
                );
                handle.close();
                closed += 1;
            }
        }
        closed
    }

    /// Runs `sweep_idle` every `interval`. Returns `None` when no idle
    /// timeout is configured.
    pub fn spawn_idle_sweeper(self: &Arc<Self>, interval: Duration) -> Option<JoinHandle<()>> {
        self.idle_timeout?;
        let manager = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                manager.sweep_idle(Instant::now()).await;
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::handle::next_session_id;

    fn handle() -> SessionHandle {
        SessionHandle::new(next_session_id(), "127.0.0.1:50000".parse().unwrap())
    }

    #[tokio::test]
    async fn test_limit_enforced() {
        let manager = ConnectionManager::new(2, None);
        manager.register(handle()).await.unwrap();
        manager.register(handle()).await.unwrap();

        let err = manager.register(handle()).await.unwrap_err();
        assert!(matches!(err, RegistryError::LimitReached(2)));
        assert_eq!(manager.len().await, 2);
    }

    #[tokio::test]
    async fn test_duplicate_rejected() {
        let manager = ConnectionManager::new(4, None);
        let handle = handle();
        manager.register(handle.clone()).await.unwrap();
        assert!(matches!(
            manager.register(handle).await,
            Err(RegistryError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn test_deregister_frees_slot() {
        let manager = ConnectionManager::new(1, None);
        let first = handle();
        manager.register(first.clone()).await.unwrap();
        assert!(manager.deregister(first.id()).await.is_some());
        assert!(manager.deregister(first.id()).await.is_none());
        manager.register(handle()).await.unwrap();
    }

    #[tokio::test]
    async fn test_close_connection_is_idempotent() {
        let manager = ConnectionManager::new(4, None);
        let handle = handle();
        manager.register(handle.clone()).await.unwrap();

        assert!(manager.close_connection(handle.id()).await);
        assert!(manager.close_connection(handle.id()).await);
        assert!(handle.is_closing());
        assert!(!manager.close_connection(9_999_999).await);
    }

    #[tokio::test]
    async fn test_sweep_idle() {
        let manager = ConnectionManager::new(4, Some(Duration::from_secs(60)));
        let first = handle();
        let second = handle();
        manager.register(first.clone()).await.unwrap();
        manager.register(second.clone()).await.unwrap();
        second.close();

        let soon = Instant::now() + Duration::from_secs(30);
        assert_eq!(manager.sweep_idle(soon).await, 0);
        assert!(!first.is_closing());

        // The second session is already closing and is not counted again.
        let later = Instant::now() + Duration::from_secs(120);
        assert_eq!(manager.sweep_idle(later).await, 1);
        assert!(first.is_closing());
        assert_eq!(manager.sweep_idle(later).await, 0);
    }

    #[tokio::test]
    async fn test_sweep_disabled_without_timeout() {
        let manager = Arc::new(ConnectionManager::new(4, None));
        manager.register(handle()).await.unwrap();
        let later = Instant::now() + Duration::from_secs(3600);
        assert_eq!(manager.sweep_idle(later).await, 0);
        assert!(manager.spawn_idle_sweeper(Duration::from_secs(1)).is_none());
    }

    #[tokio::test]
    async fn test_close_all() {
        let manager = ConnectionManager::new(4, None);
        let a = handle();
        let b = handle();
        manager.register(a.clone()).await.unwrap();
        manager.register(b.clone()).await.unwrap();
        assert_eq!(manager.close_all().await, 2);
        assert!(a.is_closing() && b.is_closing());
    }
}
