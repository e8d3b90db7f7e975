//! Named slot store for intermediate device objects.
//!
//! Task nodes exchange render targets and buffers through a [`ResourceTable`]:
//! a producer publishes a handle under its output name and consumers look it up
//! through their input bindings. The table only hands out shared handles; the
//! object itself belongs to the node that created it (or a renderer-owned pool).
//!
//! A lookup of a name nobody published yet returns `None`. Ordering producers
//! before consumers is the graph's job, not the table's.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

/// Shared, type-erased handle to a device object.
///
/// Cloning is cheap; two clones compare equal under [`ResourceHandle::ptr_eq`].
#[derive(Clone)]
pub struct ResourceHandle(Arc<dyn Any + Send + Sync>);

impl ResourceHandle {
    /// Wrap a device object.
    pub fn new<T: Any + Send + Sync>(object: T) -> Self {
        Self(Arc::new(object))
    }

    /// Wrap an already shared device object.
    pub fn from_arc<T: Any + Send + Sync>(object: Arc<T>) -> Self {
        Self(object)
    }

    /// Borrow the object as `T`, if that is its type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Whether both handles point at the same object.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResourceHandle")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

/// Name-keyed store of [`ResourceHandle`]s shared by all nodes of one graph.
///
/// Safe to use from worker threads concurrently.
#[derive(Debug, Default)]
pub struct ResourceTable {
    slots: RwLock<HashMap<String, ResourceHandle>>,
}

impl ResourceTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `handle` under `name`, returning the handle it replaced.
    pub fn add(&self, name: impl Into<String>, handle: ResourceHandle) -> Option<ResourceHandle> {
        let name = name.into();
        log::trace!("resource table: publish `{name}`");
        self.slots.write().insert(name, handle)
    }

    /// Look up a handle by name.
    pub fn get(&self, name: &str) -> Option<ResourceHandle> {
        self.slots.read().get(name).cloned()
    }

    /// Whether a handle is published under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.slots.read().contains_key(name)
    }

    /// Remove and return the handle published under `name`.
    pub fn remove(&self, name: &str) -> Option<ResourceHandle> {
        self.slots.write().remove(name)
    }

    /// Number of published handles.
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Published names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.slots.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop every handle.
    pub fn clear(&self) {
        self.slots.write().clear();
    }
}
