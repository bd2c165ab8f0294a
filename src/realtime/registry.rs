use std::collections::HashMap;

use parking_lot::RwLock;

use crate::db::PollId;
use crate::error::RealtimeError;
use crate::realtime::connection::{Connection, ConnectionId, Subscription};

/// Snapshot of the connections a broadcast targets. Each connection appears once.
#[derive(Debug, Default, Clone)]
pub struct Audience {
    members: HashMap<ConnectionId, Connection>,
}

impl Audience {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.members.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.members.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.members.values()
    }

    /// Union with another audience.
    pub fn merge(&mut self, other: Audience) {
        self.members.extend(other.members);
    }
}

impl FromIterator<Connection> for Audience {
    fn from_iter<I: IntoIterator<Item = Connection>>(iter: I) -> Self {
        Self {
            members: iter.into_iter().map(|c| (c.id(), c)).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub active: usize,
    pub global: usize,
    pub poll_watchers: usize,
    pub polls: usize,
}

#[derive(Default)]
struct RegistryState {
    poll_connections: HashMap<PollId, HashMap<ConnectionId, Connection>>,
    global_connections: HashMap<ConnectionId, Connection>,
    subscriptions: HashMap<ConnectionId, Subscription>,
}

impl RegistryState {
    fn remove(&mut self, id: &ConnectionId) -> Option<Subscription> {
        let target = self.subscriptions.remove(id)?;
        match target {
            Subscription::Global => {
                self.global_connections.remove(id);
            }
            Subscription::Poll(poll_id) => {
                if let Some(watchers) = self.poll_connections.get_mut(&poll_id) {
                    watchers.remove(id);
                    if watchers.is_empty() {
                        self.poll_connections.remove(&poll_id);
                    }
                }
            }
        }
        Some(target)
    }
}

/// Every live connection and what it is subscribed to.
///
/// The forward sets and the reverse index live behind one lock and are
/// always mutated together. Reads hand out owned snapshots.
#[derive(Default)]
pub struct ConnectionRegistry {
    state: RwLock<RegistryState>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        connection: Connection,
        target: Subscription,
    ) -> Result<(), RealtimeError> {
        let id = connection.id();
        let mut state = self.state.write();

        if state.subscriptions.contains_key(&id) {
            return Err(RealtimeError::AlreadyRegistered(id));
        }

        state.subscriptions.insert(id, target);
        match target {
            Subscription::Global => {
                state.global_connections.insert(id, connection);
            }
            Subscription::Poll(poll_id) => {
                state
                    .poll_connections
                    .entry(poll_id)
                    .or_default()
                    .insert(id, connection);
            }
        }
        Ok(())
    }

    /// Remove a connection. Unknown ids are a no-op.
    pub fn unregister(&self, id: &ConnectionId) -> Option<Subscription> {
        self.state.write().remove(id)
    }

    pub fn target_of(&self, id: &ConnectionId) -> Option<Subscription> {
        self.state.read().subscriptions.get(id).copied()
    }

    pub fn global_audience(&self) -> Audience {
        self.state
            .read()
            .global_connections
            .values()
            .cloned()
            .collect()
    }

    pub fn poll_audience(&self, poll_id: PollId) -> Audience {
        self.state
            .read()
            .poll_connections
            .get(&poll_id)
            .map(|watchers| watchers.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn all_connections(&self) -> Audience {
        let state = self.state.read();
        state
            .global_connections
            .values()
            .chain(state.poll_connections.values().flat_map(|w| w.values()))
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> RegistryStats {
        let state = self.state.read();
        RegistryStats {
            active: state.subscriptions.len(),
            global: state.global_connections.len(),
            poll_watchers: state.poll_connections.values().map(HashMap::len).sum(),
            polls: state.poll_connections.len(),
        }
    }

    /// Drop every connection. Used on shutdown.
    pub fn clear(&self) -> usize {
        let mut state = self.state.write();
        let removed = state.subscriptions.len();
        *state = RegistryState::default();
        removed
    }

    pub(crate) fn log_state(&self, event: &str, target: Option<Subscription>) {
        let stats = self.stats();
        info!(
            change = event,
            subscription = %target.map(|t| t.to_string()).unwrap_or_else(|| "none".to_string()),
            active = stats.active,
            global = stats.global,
            poll_watchers = stats.poll_watchers,
            "WebSocket registry changed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        Connection::open(8).0
    }

    #[test]
    fn register_sets_target() {
        let registry = ConnectionRegistry::new();
        let global = conn();
        let watcher = conn();

        registry.register(global.clone(), Subscription::Global).unwrap();
        registry.register(watcher.clone(), Subscription::Poll(7)).unwrap();

        assert_eq!(registry.target_of(&global.id()), Some(Subscription::Global));
        assert_eq!(registry.target_of(&watcher.id()), Some(Subscription::Poll(7)));

        assert!(registry.global_audience().contains(&global.id()));
        assert!(!registry.global_audience().contains(&watcher.id()));
        assert!(registry.poll_audience(7).contains(&watcher.id()));
        assert!(!registry.poll_audience(7).contains(&global.id()));
    }

    #[test]
    fn duplicate_registration_rejected() {
        let registry = ConnectionRegistry::new();
        let c = conn();
        registry.register(c.clone(), Subscription::Global).unwrap();

        let err = registry.register(c.clone(), Subscription::Poll(1)).unwrap_err();
        assert!(matches!(err, RealtimeError::AlreadyRegistered(id) if id == c.id()));
        // the first registration is untouched
        assert_eq!(registry.target_of(&c.id()), Some(Subscription::Global));
        assert!(registry.poll_audience(1).is_empty());
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let c = conn();
        registry.register(c.clone(), Subscription::Poll(3)).unwrap();

        assert_eq!(registry.unregister(&c.id()), Some(Subscription::Poll(3)));
        assert_eq!(registry.target_of(&c.id()), None);
        assert!(registry.poll_audience(3).is_empty());
        assert!(registry.all_connections().is_empty());

        assert_eq!(registry.unregister(&c.id()), None);
    }

    #[test]
    fn empty_poll_sets_are_removed() {
        let registry = ConnectionRegistry::new();
        let a = conn();
        let b = conn();
        registry.register(a.clone(), Subscription::Poll(5)).unwrap();
        registry.register(b.clone(), Subscription::Poll(5)).unwrap();
        assert_eq!(registry.stats().polls, 1);

        registry.unregister(&a.id());
        assert_eq!(registry.stats().polls, 1);
        registry.unregister(&b.id());
        assert_eq!(registry.stats().polls, 0);
    }

    #[test]
    fn poll_audience_is_exact() {
        let registry = ConnectionRegistry::new();
        let on_two: Vec<_> = (0..3).map(|_| conn()).collect();
        let on_four = conn();

        // interleave to make sure order does not matter
        registry.register(on_two[2].clone(), Subscription::Poll(2)).unwrap();
        registry.register(on_four.clone(), Subscription::Poll(4)).unwrap();
        registry.register(on_two[0].clone(), Subscription::Poll(2)).unwrap();
        registry.register(conn(), Subscription::Global).unwrap();
        registry.register(on_two[1].clone(), Subscription::Poll(2)).unwrap();

        let audience = registry.poll_audience(2);
        assert_eq!(audience.len(), 3);
        for c in &on_two {
            assert!(audience.contains(&c.id()));
        }
        assert!(registry.poll_audience(99).is_empty());
    }

    #[test]
    fn snapshots_do_not_follow_later_changes() {
        let registry = ConnectionRegistry::new();
        let a = conn();
        registry.register(a.clone(), Subscription::Global).unwrap();

        let snapshot = registry.global_audience();
        registry.unregister(&a.id());
        registry.register(conn(), Subscription::Global).unwrap();

        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains(&a.id()));
    }

    #[test]
    fn stats_and_clear() {
        let registry = ConnectionRegistry::new();
        registry.register(conn(), Subscription::Global).unwrap();
        registry.register(conn(), Subscription::Poll(1)).unwrap();
        registry.register(conn(), Subscription::Poll(2)).unwrap();

        assert_eq!(
            registry.stats(),
            RegistryStats {
                active: 3,
                global: 1,
                poll_watchers: 2,
                polls: 2,
            }
        );
        assert_eq!(registry.all_connections().len(), 3);

        assert_eq!(registry.clear(), 3);
        assert_eq!(registry.stats().active, 0);
        assert!(registry.all_connections().is_empty());
    }

    #[test]
    fn concurrent_register_and_unregister() {
        use std::sync::Arc;

        let registry = Arc::new(ConnectionRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let c = conn();
                        registry.register(c.clone(), Subscription::Poll(i % 2)).unwrap();
                        let _ = registry.poll_audience(i % 2);
                        registry.unregister(&c.id());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.stats().active, 0);
        assert_eq!(registry.stats().polls, 0);
    }
}
