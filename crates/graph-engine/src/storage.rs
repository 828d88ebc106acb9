//! Runtime storage for a single execution run
//!
//! Holds socket values, executed markers and graph variables behind
//! concurrent maps, so parallel initiators and stream branches can read and
//! write at the same time.
//!
//! # Generations
//!
//! Every socket write is stamped with a fresh value of a run-wide generation
//! counter. A data-only node's executed marker stores the generation observed
//! when it started; the runtime compares it with the stamps of the values the
//! node reads to decide whether a memoized result is still current.
//!
//! # Scopes
//!
//! [`RuntimeStorage::create_child`] opens an isolated scope with its own value
//! and marker maps. Reads that miss fall through to the parent chain; writes
//! stay in the child. Scopes of one run share the generation counter so stamps
//! remain comparable across the scope tree.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use crate::types::NodeId;

/// Name of the outermost scope
pub const ROOT_SCOPE: &str = "root";

#[derive(Debug, Clone)]
struct StampedValue {
    value: Value,
    generation: u64,
}

/// Thread-safe per-run key/value store
#[derive(Debug)]
pub struct RuntimeStorage {
    scope: Vec<String>,
    parent: Option<Arc<RuntimeStorage>>,
    values: DashMap<(NodeId, String), StampedValue>,
    executed: DashMap<NodeId, u64>,
    variables: Arc<DashMap<String, Value>>,
    generation: Arc<AtomicU64>,
}

impl RuntimeStorage {
    /// Create an empty root storage
    pub fn new() -> Self {
        Self {
            scope: vec![ROOT_SCOPE.to_string()],
            parent: None,
            values: DashMap::new(),
            executed: DashMap::new(),
            variables: Arc::new(DashMap::new()),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Open an isolated child scope.
    ///
    /// With `inherit_variables` the child shares this storage's variables;
    /// otherwise it starts with an empty variable map of its own.
    pub fn create_child(self: &Arc<Self>, scope_name: &str, inherit_variables: bool) -> Arc<Self> {
        let mut scope = self.scope.clone();
        scope.push(scope_name.to_string());
        let variables = if inherit_variables {
            self.variables.clone()
        } else {
            Arc::new(DashMap::new())
        };
        Arc::new(Self {
            scope,
            parent: Some(self.clone()),
            values: DashMap::new(),
            executed: DashMap::new(),
            variables,
            generation: self.generation.clone(),
        })
    }

    /// Scope path, e.g. `root/stream:list-1:3`
    pub fn scope_path(&self) -> String {
        self.scope.join("/")
    }

    /// Number of nested scopes, 1 for the root
    pub fn scope_depth(&self) -> usize {
        self.scope.len()
    }

    /// The parent scope, if this is a child
    pub fn parent(&self) -> Option<&Arc<RuntimeStorage>> {
        self.parent.as_ref()
    }

    /// Current value of the generation counter
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    // ------------------------------------------------------------------
    // Socket values
    // ------------------------------------------------------------------

    /// Read a socket value, falling through to parent scopes
    pub fn get_value(&self, node_id: &str, socket: &str) -> Option<Value> {
        self.lookup(node_id, socket).map(|v| v.value)
    }

    /// Generation at which the visible value of a socket was written
    pub fn value_generation(&self, node_id: &str, socket: &str) -> Option<u64> {
        self.lookup(node_id, socket).map(|v| v.generation)
    }

    /// Whether a value is visible for this socket
    pub fn has_value(&self, node_id: &str, socket: &str) -> bool {
        self.lookup(node_id, socket).is_some()
    }

    /// Write a socket value in this scope, returning its generation stamp
    pub fn set_value(&self, node_id: &str, socket: &str, value: Value) -> u64 {
        let generation = self.next_generation();
        self.values.insert(
            (node_id.to_string(), socket.to_string()),
            StampedValue { value, generation },
        );
        generation
    }

    /// Remove a socket value from this scope
    pub fn remove_value(&self, node_id: &str, socket: &str) -> Option<Value> {
        self.values
            .remove(&(node_id.to_string(), socket.to_string()))
            .map(|(_, v)| v.value)
    }

    fn lookup(&self, node_id: &str, socket: &str) -> Option<StampedValue> {
        let key = (node_id.to_string(), socket.to_string());
        let mut current = Some(self);
        while let Some(storage) = current {
            if let Some(entry) = storage.values.get(&key) {
                return Some(entry.value().clone());
            }
            current = storage.parent.as_deref();
        }
        None
    }

    // ------------------------------------------------------------------
    // Executed markers
    // ------------------------------------------------------------------

    /// Record that a node executed, observing the given generation
    pub fn mark_executed(&self, node_id: &str, generation: u64) {
        self.executed.insert(node_id.to_string(), generation);
    }

    /// Generation recorded when the node last executed, searching parents
    pub fn executed_at(&self, node_id: &str) -> Option<u64> {
        let mut current = Some(self);
        while let Some(storage) = current {
            if let Some(entry) = storage.executed.get(node_id) {
                return Some(*entry.value());
            }
            current = storage.parent.as_deref();
        }
        None
    }

    pub fn is_executed(&self, node_id: &str) -> bool {
        self.executed_at(node_id).is_some()
    }

    /// Forget this scope's marker for a node
    pub fn clear_executed(&self, node_id: &str) {
        self.executed.remove(node_id);
    }

    // ------------------------------------------------------------------
    // Variables
    // ------------------------------------------------------------------

    pub fn get_variable(&self, name: &str) -> Option<Value> {
        self.variables.get(name).map(|v| v.value().clone())
    }

    pub fn set_variable(&self, name: &str, value: Value) {
        self.variables.insert(name.to_string(), value);
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Snapshot of all variables visible to this scope
    pub fn variables(&self) -> HashMap<String, Value> {
        self.variables
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Drop every socket value and executed marker in this scope.
    ///
    /// Variables are kept.
    pub fn clear(&self) {
        self.values.clear();
        self.executed.clear();
    }
}

impl Default for RuntimeStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_values_are_stamped_in_order() {
        let storage = RuntimeStorage::new();
        let first = storage.set_value("a", "Out", json!(1));
        let second = storage.set_value("b", "Out", json!(2));

        assert!(second > first);
        assert_eq!(storage.get_value("a", "Out"), Some(json!(1)));
        assert_eq!(storage.value_generation("b", "Out"), Some(second));
        assert_eq!(storage.generation(), second);
        assert!(storage.get_value("a", "Missing").is_none());
    }

    #[test]
    fn test_executed_markers() {
        let storage = RuntimeStorage::new();
        assert!(!storage.is_executed("a"));

        storage.mark_executed("a", 4);
        assert_eq!(storage.executed_at("a"), Some(4));

        storage.clear_executed("a");
        assert!(!storage.is_executed("a"));
    }

    #[test]
    fn test_child_scope_isolates_writes() {
        let root = Arc::new(RuntimeStorage::new());
        root.set_value("const", "Value", json!("shared"));
        root.mark_executed("const", 1);

        let child = root.create_child("iteration-0", true);
        child.set_value("loop", "Index", json!(0));

        // Reads fall through, writes stay local
        assert_eq!(child.get_value("const", "Value"), Some(json!("shared")));
        assert!(child.is_executed("const"));
        assert!(root.get_value("loop", "Index").is_none());
        assert_eq!(child.scope_path(), "root/iteration-0");
        assert_eq!(child.scope_depth(), 2);
    }

    #[test]
    fn test_sibling_scopes_do_not_clobber() {
        let root = Arc::new(RuntimeStorage::new());
        let a = root.create_child("a", true);
        let b = root.create_child("b", true);

        a.set_value("n", "Out", json!("from a"));
        b.set_value("n", "Out", json!("from b"));

        assert_eq!(a.get_value("n", "Out"), Some(json!("from a")));
        assert_eq!(b.get_value("n", "Out"), Some(json!("from b")));
        assert!(root.get_value("n", "Out").is_none());
    }

    #[test]
    fn test_variable_inheritance() {
        let root = Arc::new(RuntimeStorage::new());
        root.set_variable("score", json!(10));

        let shared = root.create_child("shared", true);
        shared.set_variable("score", json!(11));
        assert_eq!(root.get_variable("score"), Some(json!(11)));

        let isolated = root.create_child("isolated", false);
        assert!(!isolated.has_variable("score"));
        isolated.set_variable("score", json!(99));
        assert_eq!(root.get_variable("score"), Some(json!(11)));
    }

    #[test]
    fn test_child_shares_generation_counter() {
        let root = Arc::new(RuntimeStorage::new());
        let child = root.create_child("c", true);
        let g1 = root.set_value("a", "Out", json!(1));
        let g2 = child.set_value("b", "Out", json!(2));
        assert!(g2 > g1);
    }
}
