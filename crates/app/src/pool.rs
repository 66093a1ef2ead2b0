//! Append-only pool of controllers, indexed by id.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use homewatch_domain::id::ControllerId;

/// Controllers created so far. Entries are never removed while the service
/// runs, so a controller dropped from the routing table keeps its state and
/// may be reused when the topology grows again.
#[derive(Debug)]
pub struct ControllerPool<C> {
    controllers: RwLock<BTreeMap<ControllerId, Arc<C>>>,
}

impl<C> Default for ControllerPool<C> {
    fn default() -> Self {
        Self {
            controllers: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<C> ControllerPool<C> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Controller with `id`, if it exists.
    pub fn get(&self, id: ControllerId) -> Option<Arc<C>> {
        self.controllers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Controller with `id`, creating it with `create` if missing.
    ///
    /// The flag is `true` when a new controller was inserted.
    pub fn get_or_insert_with(
        &self,
        id: ControllerId,
        create: impl FnOnce() -> C,
    ) -> (Arc<C>, bool) {
        let mut controllers = self
            .controllers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = controllers.get(&id) {
            return (Arc::clone(existing), false);
        }
        let controller = Arc::new(create());
        controllers.insert(id, Arc::clone(&controller));
        (controller, true)
    }

    pub fn len(&self) -> usize {
        self.controllers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All controllers in id order.
    pub fn all(&self) -> Vec<Arc<C>> {
        self.controllers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}
