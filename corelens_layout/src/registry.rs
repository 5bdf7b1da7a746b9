//! Session-scoped state shared between concurrent conversions.

use std::{
    hash::Hash,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
};

use corelens_data_type::{LayoutId, LayoutTable};
use indexmap::IndexMap;

/// The shared state for one conversion session.
///
/// A session bundles the layout table, the named-aggregate registry, and
/// the anonymous name allocator. Multiple independent root-type conversions
/// may run concurrently on separate threads against one session; each
/// component serializes its own mutations. Independent sessions (e.g. for
/// different binaries) do not contaminate each other.
///
/// `N` is the node handle type of the [TypeNodeSource](crate::TypeNodeSource)
/// the session is used with.
#[derive(Debug)]
pub struct Session<N> {
    table: LayoutTable,
    registry: StructRegistry<N>,
    anon_names: AnonNameAllocator,
}

impl<N: Copy + Eq + Hash> Session<N> {
    /// Create a session using the host's native pointer width.
    pub fn new() -> Self {
        Self {
            table: LayoutTable::new(),
            registry: StructRegistry::new(),
            anon_names: AnonNameAllocator::new(),
        }
    }

    /// Create a session for a target with the given pointer width in bytes.
    pub fn with_pointer_size(pointer_size: u64) -> Self {
        Self {
            table: LayoutTable::with_pointer_size(pointer_size),
            registry: StructRegistry::new(),
            anon_names: AnonNameAllocator::new(),
        }
    }

    /// The layout table holding every descriptor of this session.
    pub fn table(&self) -> &LayoutTable {
        &self.table
    }

    /// The named-aggregate registry.
    pub fn registry(&self) -> &StructRegistry<N> {
        &self.registry
    }

    /// The anonymous name allocator.
    pub fn anon_names(&self) -> &AnonNameAllocator {
        &self.anon_names
    }
}

impl<N: Copy + Eq + Hash> Default for Session<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
struct RegistryEntry {
    id: LayoutId,
    completed: bool,
}

/// The cache mapping a named aggregate to its shared layout.
///
/// An entry is created in a forward-declared state the first time a name is
/// reached, so recursive and mutually-recursive discovery can find it, and
/// is marked completed once its member layout has been filled in. The
/// pending table records names seen only as incomplete declarations, along
/// with the definition node to convert once the dependency-ordered pass is
/// done.
#[derive(Debug)]
pub struct StructRegistry<N> {
    inner: Mutex<RegistryInner<N>>,
}

#[derive(Debug)]
struct RegistryInner<N> {
    entries: IndexMap<String, RegistryEntry>,
    pending: IndexMap<String, N>,
}

impl<N: Copy + Eq + Hash> StructRegistry<N> {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                entries: IndexMap::new(),
                pending: IndexMap::new(),
            }),
        }
    }

    /// Look up a name, returning its handle and whether it is completed.
    pub fn lookup(&self, name: &str) -> Option<(LayoutId, bool)> {
        let inner = self.inner.lock().unwrap();
        inner
            .entries
            .get(name)
            .map(|entry| (entry.id, entry.completed))
    }

    /// Fetch the handle for a name, reserving a forward-declared entry via
    /// `make_forward` if the name is new.
    ///
    /// Returns the handle and whether the entry is already completed. The
    /// closure runs inside the registry's critical section so two racing
    /// conversions of the same name agree on one handle.
    pub fn get_or_insert_forward(
        &self,
        name: &str,
        make_forward: impl FnOnce() -> LayoutId,
    ) -> (LayoutId, bool) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.entries.get(name) {
            return (entry.id, entry.completed);
        }
        let id = make_forward();
        inner.entries.insert(
            name.to_string(),
            RegistryEntry {
                id,
                completed: false,
            },
        );
        (id, false)
    }

    /// Mark a name's entry as completed.
    pub fn mark_completed(&self, name: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.entries.get_mut(name) {
            entry.completed = true;
        }
    }

    /// Record a name seen only as a declaration, with the definition node
    /// to convert later.
    pub fn register_pending(&self, name: &str, node: N) {
        let mut inner = self.inner.lock().unwrap();
        inner.pending.entry(name.to_string()).or_insert(node);
    }

    /// Drop a name from the pending table once its definition is converted.
    pub fn remove_pending(&self, name: &str) -> Option<N> {
        let mut inner = self.inner.lock().unwrap();
        inner.pending.shift_remove(name)
    }

    /// Pop one outstanding declaration, if any remain.
    pub fn take_pending(&self) -> Option<(String, N)> {
        let mut inner = self.inner.lock().unwrap();
        inner.pending.shift_remove_index(0)
    }
}

impl<N: Copy + Eq + Hash> Default for StructRegistry<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// A monotonic counter producing unique synthetic names for nameless
/// aggregates.
#[derive(Debug)]
pub struct AnonNameAllocator {
    counter: AtomicU64,
}

impl AnonNameAllocator {
    /// A fresh allocator starting at 1.
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// Produce the next name, e.g. `anon_struct_3` for prefix `struct`.
    pub fn next_name(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("anon_{}_{}", prefix, n)
    }
}

impl Default for AnonNameAllocator {
    fn default() -> Self {
        Self::new()
    }
}
