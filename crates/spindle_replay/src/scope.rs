//! Scope snapshot storage.
//!
//! Every visited step owns three scope maps (local, global, queues),
//! reachable through integer handles the client can pass back to the
//! variables query. Maps are cloned from their derivation source when a
//! step is first visited and never rebuilt afterwards; memory grows with
//! trace length, which is acceptable for the bounded traces the simulator
//! is run with.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use spindle_core::Variable;
use std::collections::HashMap;

/// Handle to one materialized scope map
pub type VarScopeHandle = u32;

/// The three scope handles recorded for one step index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeSet {
    /// Process-local variables
    pub local: VarScopeHandle,
    /// Global variables
    pub global: VarScopeHandle,
    /// Message queues
    pub queues: VarScopeHandle,
}

/// Table of materialized scope maps, keyed by handle
#[derive(Debug, Default)]
pub struct ScopeTable {
    maps: HashMap<VarScopeHandle, IndexMap<String, String>>,
    next_handle: VarScopeHandle,
}

impl ScopeTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self { maps: HashMap::new(), next_handle: 1 }
    }

    /// Allocate a handle for the given variable map
    pub fn allocate(&mut self, vars: IndexMap<String, String>) -> VarScopeHandle {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.maps.insert(handle, vars);
        handle
    }

    /// Allocate three empty scope maps
    pub fn allocate_empty_set(&mut self) -> ScopeSet {
        ScopeSet {
            local: self.allocate(IndexMap::new()),
            global: self.allocate(IndexMap::new()),
            queues: self.allocate(IndexMap::new()),
        }
    }

    /// The variable map behind `handle`
    ///
    /// # Panics
    ///
    /// Panics if the handle was never allocated; scope handles only come
    /// from this table, so an unknown one is gateway misuse.
    #[must_use]
    pub fn vars(&self, handle: VarScopeHandle) -> &IndexMap<String, String> {
        self.maps
            .get(&handle)
            .unwrap_or_else(|| panic!("unknown scope handle {}", handle))
    }

    /// Materialize the scope behind `handle` as client-visible variables
    ///
    /// # Panics
    ///
    /// Panics if the handle was never allocated.
    #[must_use]
    pub fn variables(&self, handle: VarScopeHandle) -> Vec<Variable> {
        self.vars(handle)
            .iter()
            .map(|(name, value)| Variable::new(name.clone(), value.clone()))
            .collect()
    }
}
