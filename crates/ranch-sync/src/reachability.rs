//! # Reachability
//!
//! The connectivity signal the engine branches on.
//!
//! `is_reachable()` is a synchronous read of the last known state. Changes
//! arrive through a `watch` channel, so a subscriber that falls behind only
//! ever sees the latest state, never a backlog of flaps.

use std::fmt;
use tokio::sync::watch;
use tracing::info;

/// Last known connectivity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub fn is_online(self) -> bool {
        matches!(self, Connectivity::Online)
    }
}

impl From<bool> for Connectivity {
    fn from(online: bool) -> Self {
        if online {
            Connectivity::Online
        } else {
            Connectivity::Offline
        }
    }
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connectivity::Online => write!(f, "online"),
            Connectivity::Offline => write!(f, "offline"),
        }
    }
}

/// Platform connectivity signal.
///
/// Dropping the receiver returned by `subscribe` is the unsubscribe.
pub trait ReachabilityObserver: Send + Sync {
    fn is_reachable(&self) -> bool;

    fn subscribe(&self) -> watch::Receiver<Connectivity>;
}

/// A reachability signal flipped by hand.
///
/// Used by tests and by embedders that learn about connectivity from their
/// own transport.
#[derive(Debug)]
pub struct ManualReachability {
    tx: watch::Sender<Connectivity>,
}

impl ManualReachability {
    pub fn new(initial: Connectivity) -> Self {
        let (tx, _rx) = watch::channel(initial);
        ManualReachability { tx }
    }

    pub fn online() -> Self {
        Self::new(Connectivity::Online)
    }

    pub fn offline() -> Self {
        Self::new(Connectivity::Offline)
    }

    /// Publishes a new state. Subscribers are only woken on a real change.
    pub fn set(&self, state: Connectivity) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
        if changed {
            info!(%state, "Connectivity changed");
        }
    }

    pub fn go_online(&self) {
        self.set(Connectivity::Online);
    }

    pub fn go_offline(&self) {
        self.set(Connectivity::Offline);
    }
}

impl ReachabilityObserver for ManualReachability {
    fn is_reachable(&self) -> bool {
        self.tx.borrow().is_online()
    }

    fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_see_real_changes_only() {
        let reachability = ManualReachability::offline();
        let mut rx = reachability.subscribe();
        assert!(!reachability.is_reachable());

        reachability.go_offline();
        assert!(!rx.has_changed().unwrap());

        reachability.go_online();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Connectivity::Online);
        assert!(reachability.is_reachable());
    }
}
