//! Active-child registration for the displayed scene
//!
//! A consuming parent (the preview source) announces the scene it currently
//! shows to the host. The announcement lives exactly as long as the guard
//! returned by [`register_active`].
//!
//! # Lifecycle
//! - `register_active` calls `add_active_child` immediately
//! - `ActiveGuard::release` or dropping the guard calls `remove_active_child`
//! - Release happens at most once, so an explicit release followed by a drop
//!   never unregisters twice

use std::fmt;
use std::sync::Arc;

use crate::graph::ObjectId;
use crate::host::{HostHandle, ObjectHost};

/// RAII guard that unregisters an active child on drop
pub struct ActiveGuard {
    host: Arc<dyn ObjectHost>,
    parent: HostHandle,
    child: HostHandle,
    released: bool,
}

/// Announce `child` as actively displayed by `parent`
pub fn register_active(
    host: Arc<dyn ObjectHost>,
    parent: HostHandle,
    child: HostHandle,
) -> ActiveGuard {
    host.add_active_child(parent, child);
    tracing::debug!("Registered active child {:?} under {:?}", child, parent);
    ActiveGuard {
        host,
        parent,
        child,
        released: false,
    }
}

impl ActiveGuard {
    pub fn parent(&self) -> HostHandle {
        self.parent
    }

    pub fn child(&self) -> HostHandle {
        self.child
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Unregister now instead of waiting for drop
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.host.remove_active_child(self.parent, self.child);
        tracing::debug!("Released active child {:?} under {:?}", self.child, self.parent);
    }
}

impl fmt::Debug for ActiveGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveGuard")
            .field("parent", &self.parent)
            .field("child", &self.child)
            .field("released", &self.released)
            .finish()
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// The currently displayed scene of a coordinator
#[derive(Debug)]
pub struct ActiveSelection {
    pub name: String,
    pub object: ObjectId,
    pub guard: ActiveGuard,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ParameterTree;
    use crate::host::Scope;
    use crate::host::memory::MemoryHost;

    fn setup() -> (Arc<MemoryHost>, HostHandle, HostHandle) {
        let host = Arc::new(MemoryHost::new());
        let parent = host
            .create_object("preview", "Preview", &ParameterTree::new(), Scope::Global)
            .unwrap();
        let child = host
            .create_object("scene", "Main", &ParameterTree::new(), Scope::Private)
            .unwrap();
        (host, parent, child)
    }

    #[test]
    fn test_guard_registers_and_unregisters_on_drop() {
        let (host, parent, child) = setup();
        {
            let _guard = register_active(host.clone(), parent, child);
            assert_eq!(host.active_children(parent), vec![child]);
        }
        assert!(host.active_children(parent).is_empty());
    }

    #[test]
    fn test_release_is_idempotent() {
        let (host, parent, child) = setup();
        let mut guard = register_active(host.clone(), parent, child);

        guard.release();
        guard.release();
        assert!(guard.is_released());
        drop(guard);

        assert_eq!(host.active_removals(), 1);
    }
}
