//! Keyed, sorted, observable set of tunnels

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

use super::tunnel::Tunnel;
use crate::error::{TunnelError, TunnelResult};

/// Membership change, with the position it happened at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListEvent {
    Inserted { index: usize, name: String },
    Removed { index: usize, name: String },
}

/// Sort key: case-insensitive first, then exact, so "Home" and "home" both fit
#[derive(Debug, Clone, PartialEq, Eq)]
struct NameKey {
    folded: String,
    name: String,
}

impl NameKey {
    fn new(name: &str) -> Self {
        Self {
            folded: name.to_lowercase(),
            name: name.to_string(),
        }
    }
}

impl Ord for NameKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.folded
            .cmp(&other.folded)
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl PartialOrd for NameKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compare two tunnel names the way the collection orders them
pub fn compare_names(a: &str, b: &str) -> Ordering {
    NameKey::new(a).cmp(&NameKey::new(b))
}

/// Tunnels keyed by name, iterated in name order.
///
/// A tunnel is keyed by the name it had when added; callers remove a tunnel
/// before renaming it and add it back afterwards.
pub struct TunnelList {
    entries: Mutex<BTreeMap<NameKey, Arc<Tunnel>>>,
    events: broadcast::Sender<ListEvent>,
}

impl TunnelList {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(128);
        Self {
            entries: Mutex::new(BTreeMap::new()),
            events,
        }
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<NameKey, Arc<Tunnel>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ListEvent> {
        self.events.subscribe()
    }

    /// Insert a tunnel under its current name
    pub fn add(&self, tunnel: Arc<Tunnel>) -> TunnelResult<()> {
        let name = tunnel.name();
        let key = NameKey::new(&name);
        let index = {
            let mut entries = self.entries();
            if entries.contains_key(&key) {
                return Err(TunnelError::AlreadyExists(name));
            }
            let index = entries.range(..&key).count();
            entries.insert(key, tunnel);
            index
        };
        let _ = self.events.send(ListEvent::Inserted { index, name });
        Ok(())
    }

    /// Remove this exact tunnel; a different tunnel under the same name is left alone
    pub fn remove(&self, tunnel: &Arc<Tunnel>) -> bool {
        let name = tunnel.name();
        let key = NameKey::new(&name);
        let index = {
            let mut entries = self.entries();
            match entries.get(&key) {
                Some(existing) if Arc::ptr_eq(existing, tunnel) => {}
                _ => return false,
            }
            let index = entries.range(..&key).count();
            entries.remove(&key);
            index
        };
        let _ = self.events.send(ListEvent::Removed { index, name });
        true
    }

    pub fn get(&self, name: &str) -> Option<Arc<Tunnel>> {
        self.entries().get(&NameKey::new(name)).cloned()
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.entries().contains_key(&NameKey::new(name))
    }

    /// Whether this exact handle is the one stored under its name
    pub fn contains(&self, tunnel: &Arc<Tunnel>) -> bool {
        self.get(&tunnel.name())
            .map(|existing| Arc::ptr_eq(&existing, tunnel))
            .unwrap_or(false)
    }

    /// Snapshot of all tunnels in name order
    pub fn to_vec(&self) -> Vec<Arc<Tunnel>> {
        self.entries().values().cloned().collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries().keys().map(|key| key.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl Default for TunnelList {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tunnel::State;

    fn tunnel(name: &str) -> Arc<Tunnel> {
        Tunnel::detached(name, None, State::Down)
    }

    #[test]
    fn test_sorted_case_insensitively_then_exactly() {
        let list = TunnelList::new();
        for name in ["beta", "Alpha", "alpha", "Gamma", "delta"] {
            list.add(tunnel(name)).unwrap();
        }
        assert_eq!(list.names(), ["Alpha", "alpha", "beta", "delta", "Gamma"]);
        assert_eq!(compare_names("Alpha", "alpha"), Ordering::Less);
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let list = TunnelList::new();
        list.add(tunnel("wg0")).unwrap();
        assert!(matches!(list.add(tunnel("wg0")), Err(TunnelError::AlreadyExists(_))));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_events_carry_sorted_index() {
        let list = TunnelList::new();
        let mut events = list.subscribe();
        list.add(tunnel("b")).unwrap();
        list.add(tunnel("a")).unwrap();
        let c = tunnel("c");
        list.add(c.clone()).unwrap();
        assert!(list.remove(&c));

        let received: Vec<_> = std::iter::from_fn(|| events.try_recv().ok()).collect();
        assert_eq!(
            received,
            vec![
                ListEvent::Inserted { index: 0, name: "b".into() },
                ListEvent::Inserted { index: 0, name: "a".into() },
                ListEvent::Inserted { index: 2, name: "c".into() },
                ListEvent::Removed { index: 2, name: "c".into() },
            ]
        );
    }

    #[test]
    fn test_remove_requires_same_handle() {
        let list = TunnelList::new();
        let original = tunnel("wg0");
        list.add(original.clone()).unwrap();

        let impostor = tunnel("wg0");
        assert!(!list.remove(&impostor));
        assert!(list.contains(&original));
        assert!(!list.contains(&impostor));

        assert!(list.remove(&original));
        assert!(list.is_empty());
        assert!(!list.remove(&original));
    }

    #[test]
    fn test_readd_after_rename_resorts() {
        let list = TunnelList::new();
        let a = tunnel("a");
        list.add(a.clone()).unwrap();
        list.add(tunnel("m")).unwrap();

        assert!(list.remove(&a));
        a.on_name_changed("z".to_string());
        list.add(a).unwrap();

        assert_eq!(list.names(), ["m", "z"]);
        assert!(list.get("a").is_none());
    }
}
