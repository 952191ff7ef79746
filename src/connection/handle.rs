//! Session handle
//!
//! The part of a session other tasks may hold: its id, its address, and the
//! means to ask it to close. Closing through a handle is safe from any
//! thread, any number of times; the teardown itself always runs on the
//! session's own task.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Notify;

/// Identifier of one control connection, unique for the process lifetime.
pub type SessionId = u64;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_session_id() -> SessionId {
    NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug)]
struct Shared {
    close_requested: AtomicBool,
    closed: AtomicBool,
    wakeup: Notify,
    last_activity: Mutex<Instant>,
}

#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    client_address: SocketAddr,
    shared: Arc<Shared>,
}

impl SessionHandle {
    pub(crate) fn new(id: SessionId, client_address: SocketAddr) -> Self {
        Self {
            id,
            client_address,
            shared: Arc::new(Shared {
                close_requested: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                wakeup: Notify::new(),
                last_activity: Mutex::new(Instant::now()),
            }),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn client_address(&self) -> SocketAddr {
        self.client_address
    }

    /// Asks the session to close. A read blocked on the control channel is
    /// woken up; the session then tears itself down.
    pub fn close(&self) {
        if !self.shared.close_requested.swap(true, Ordering::AcqRel) {
            self.shared.wakeup.notify_one();
        }
    }

    /// True once a close was requested or performed.
    pub fn is_closing(&self) -> bool {
        self.shared.close_requested.load(Ordering::Acquire) || self.is_closed()
    }

    /// True once the teardown has run.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Time since the session last waited for a command.
    pub fn idle_time(&self, now: Instant) -> Duration {
        let last = *self
            .shared
            .last_activity
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        now.saturating_duration_since(last)
    }

    pub(crate) fn touch(&self) {
        let mut last = self
            .shared
            .last_activity
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *last = Instant::now();
    }

    /// Sets the closed flag. Returns true only for the first caller.
    pub(crate) fn mark_closed(&self) -> bool {
        !self.shared.closed.swap(true, Ordering::AcqRel)
    }

    /// Resolves once `close` has been called.
    pub(crate) async fn close_requested(&self) {
        while !self.shared.close_requested.load(Ordering::Acquire) {
            self.shared.wakeup.notified().await;
        }
    }
}
