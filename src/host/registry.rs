//! Registry - maps window identifiers to their shared state
//!
//! Written by the host thread (insert on window creation) and by the
//! connection threads (lookup on registration, remove on disconnect).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::window::WindowShared;
use crate::protocol::WindowId;

#[derive(Clone, Default)]
pub(crate) struct Registry {
    windows: Arc<Mutex<HashMap<WindowId, Arc<WindowShared>>>>,
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, HashMap<WindowId, Arc<WindowShared>>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn insert(&self, window: Arc<WindowShared>) {
        self.lock().insert(window.id(), window);
    }

    pub(crate) fn get(&self, id: WindowId) -> Option<Arc<WindowShared>> {
        self.lock().get(&id).cloned()
    }

    pub(crate) fn remove(&self, id: WindowId) -> Option<Arc<WindowShared>> {
        self.lock().remove(&id)
    }

    pub(crate) fn contains(&self, id: WindowId) -> bool {
        self.lock().contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    /// Remove and return every window that has no connection yet
    pub(crate) fn take_unattached(&self) -> Vec<Arc<WindowShared>> {
        let mut windows = self.lock();
        let ids: Vec<WindowId> = windows
            .iter()
            .filter(|(_, window)| !window.is_connected())
            .map(|(id, _)| *id)
            .collect();
        ids.iter().filter_map(|id| windows.remove(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::socket_pair;

    #[test]
    fn test_insert_get_remove() {
        let registry = Registry::default();
        let window = Arc::new(WindowShared::new(WindowId::new()));
        let id = window.id();

        registry.insert(window.clone());
        assert!(registry.contains(id));
        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(&registry.get(id).unwrap(), &window));
        assert!(registry.get(WindowId::new()).is_none());

        assert!(registry.remove(id).is_some());
        assert!(registry.remove(id).is_none());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_take_unattached() {
        let registry = Registry::default();
        let waiting = Arc::new(WindowShared::new(WindowId::new()));
        let connected = Arc::new(WindowShared::new(WindowId::new()));
        let (host_side, _terminal_side) = socket_pair();
        assert!(connected.attach(host_side));

        registry.insert(waiting.clone());
        registry.insert(connected.clone());

        let taken = registry.take_unattached();
        assert_eq!(taken.len(), 1);
        assert_eq!(taken[0].id(), waiting.id());
        assert!(registry.contains(connected.id()));
        assert!(!registry.contains(waiting.id()));
    }
}
