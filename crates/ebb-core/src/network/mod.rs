//! Connectivity status contract and a manually driven implementation.

use tokio::sync::watch;

/// Observable online/offline state
///
/// Only the transition contract matters to the queue: every change published
/// on [`NetworkStatus::subscribe`] is inspected, and a change into online
/// triggers a drain cycle.
pub trait NetworkStatus: Send + Sync {
    /// Whether the device is currently offline
    fn is_offline(&self) -> bool;

    /// Receive every subsequent state change (`true` = offline)
    ///
    /// Dropping the receiver unsubscribes.
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Network status driven by the application (e.g. from platform reachability callbacks)
pub struct ManualNetworkStatus {
    sender: watch::Sender<bool>,
}

impl ManualNetworkStatus {
    /// Start online
    pub fn online() -> Self {
        Self::with_offline(false)
    }

    /// Start offline
    pub fn offline() -> Self {
        Self::with_offline(true)
    }

    fn with_offline(offline: bool) -> Self {
        let (sender, _receiver) = watch::channel(offline);
        Self { sender }
    }

    /// Publish a new state; repeated identical states are not re-published
    pub fn set_online(&self, online: bool) {
        let offline = !online;
        let changed = self.sender.send_if_modified(|current| {
            if *current == offline {
                false
            } else {
                *current = offline;
                true
            }
        });
        if changed {
            tracing::debug!("Network status changed: {}", if online { "online" } else { "offline" });
        }
    }
}

impl Default for ManualNetworkStatus {
    fn default() -> Self {
        Self::online()
    }
}

impl NetworkStatus for ManualNetworkStatus {
    fn is_offline(&self) -> bool {
        *self.sender.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        assert!(!ManualNetworkStatus::online().is_offline());
        assert!(ManualNetworkStatus::offline().is_offline());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_subscribers_see_transitions() {
        let status = ManualNetworkStatus::offline();
        let mut receiver = status.subscribe();

        status.set_online(true);
        receiver.changed().await.unwrap();
        assert!(!*receiver.borrow_and_update());
        assert!(!status.is_offline());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_identical_state_is_not_republished() {
        let status = ManualNetworkStatus::online();
        let receiver = status.subscribe();

        status.set_online(true);
        assert!(!receiver.has_changed().unwrap());
    }
}
