use std::sync::Arc;

use dashmap::DashMap;

use crate::connection::{Connection, ConnectionId, Mailbox, Wake, WakeOutcome};

#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<DashMap<ConnectionId, Arc<Connection>>>,
}

pub struct Registration {
    pub connection: Arc<Connection>,
    pub mailbox: Mailbox,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanoutReport {
    pub delivered: usize,
    pub coalesced: usize,
    pub closed: usize,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, display_name: impl Into<String>) -> Registration {
        let (connection, mailbox) = Connection::new(display_name.into());
        let connection = Arc::new(connection);
        self.inner
            .insert(connection.id().clone(), Arc::clone(&connection));
        Registration {
            connection,
            mailbox,
        }
    }

    pub fn lookup(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.inner.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.inner.remove(id).map(|(_, connection)| connection)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Wakes every registered session without waiting on any of them.
    ///
    /// Connections whose mailbox has gone away are evicted.
    pub fn notify_all(&self) -> FanoutReport {
        // Collect first so no DashMap guard is held while we evict.
        let targets: Vec<Arc<Connection>> = self
            .inner
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut report = FanoutReport::default();
        for connection in targets {
            match connection.wake(Wake::Broadcast) {
                WakeOutcome::Delivered => report.delivered += 1,
                WakeOutcome::Coalesced => report.coalesced += 1,
                WakeOutcome::Closed => {
                    report.closed += 1;
                    self.inner
                        .remove_if(connection.id(), |_, entry| Arc::ptr_eq(entry, &connection));
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn create_then_lookup_returns_same_connection() {
        let registry = ConnectionRegistry::new();
        let reg = registry.create("alice");
        let found = registry.lookup(reg.connection.id()).expect("registered");
        assert!(Arc::ptr_eq(&found, &reg.connection));
        assert_eq!(found.display_name(), "alice");
        assert_eq!(registry.len(), 1);
    }

    #[test_timeout::timeout]
    fn lookup_unknown_is_none() {
        let registry = ConnectionRegistry::new();
        assert!(registry.lookup(&ConnectionId::from("missing")).is_none());
    }

    #[test_timeout::timeout]
    fn remove_drops_entry() {
        let registry = ConnectionRegistry::new();
        let reg = registry.create("alice");
        assert!(registry.remove(reg.connection.id()).is_some());
        assert!(registry.is_empty());
        assert!(registry.remove(reg.connection.id()).is_none());
    }

    #[test_timeout::timeout]
    fn notify_all_reports_each_outcome_and_evicts_closed() {
        let registry = ConnectionRegistry::new();
        let _fresh = registry.create("fresh");
        let busy = registry.create("busy");
        busy.connection.wake(Wake::Draft);
        let gone = registry.create("gone");
        let gone_id = gone.connection.id().clone();
        drop(gone.mailbox);

        let report = registry.notify_all();
        assert_eq!(
            report,
            FanoutReport {
                delivered: 1,
                coalesced: 1,
                closed: 1
            }
        );
        assert!(registry.lookup(&gone_id).is_none());
        assert_eq!(registry.len(), 2);
    }
}
