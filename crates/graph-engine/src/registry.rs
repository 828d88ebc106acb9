//! Node definition registry and link-time discovery
//!
//! The registry maps definition ids to shared [`NodeDefinition`]s. Hosts fill
//! it from discovery, register their own definitions, and query it for
//! catalogs and search.
//!
//! # Discovery
//!
//! Node types submit a [`NodeRegistration`] at link time through `inventory`,
//! usually with the [`register_node!`](crate::register_node) macro:
//!
//! ```ignore
//! graph_engine::register_node!(Branch, Sequence);
//!
//! let registry = NodeRegistry::with_discovered(&["graph_nodes"])?;
//! ```
//!
//! # Composability
//!
//! Registries can be composed by merging:
//! ```ignore
//! let mut registry = NodeRegistry::with_discovered(&[])?;
//! registry.merge(plugin_registry); // Add plugin nodes
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::definition::{NodeDefinition, NodeMetadata};
use crate::error::{EngineError, Result};
use crate::types::GraphVariable;
use crate::variables;

/// Link-time registration of a node type
pub struct NodeRegistration {
    /// Module path of the submitting code, for filtering by crate or module
    pub module: &'static str,
    /// Builds the definition
    pub definition: fn() -> Result<NodeDefinition>,
}

impl NodeRegistration {
    pub const fn new(module: &'static str, definition: fn() -> Result<NodeDefinition>) -> Self {
        Self { module, definition }
    }
}

inventory::collect!(NodeRegistration);

/// Build the definitions registered under any of the given module prefixes.
///
/// An empty prefix list selects everything. Results are sorted by id.
pub fn discover(modules: &[&str]) -> Result<Vec<NodeDefinition>> {
    let mut definitions = Vec::new();
    for registration in inventory::iter::<NodeRegistration> {
        let selected = modules.is_empty()
            || modules.iter().any(|m| registration.module.starts_with(m));
        if selected {
            definitions.push((registration.definition)()?);
        }
    }
    definitions.sort_by(|a, b| a.id().cmp(b.id()));
    log::debug!(
        "Discovered {} node definitions in {:?}",
        definitions.len(),
        modules
    );
    Ok(definitions)
}

/// Build every linked definition
pub fn discover_all() -> Result<Vec<NodeDefinition>> {
    discover(&[])
}

/// Registry of node definitions keyed by id
#[derive(Clone, Default)]
pub struct NodeRegistry {
    definitions: HashMap<String, Arc<NodeDefinition>>,
}

impl NodeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the definitions discovered under `modules`
    pub fn with_discovered(modules: &[&str]) -> Result<Self> {
        let mut registry = Self::new();
        for definition in discover(modules)? {
            registry.register(definition)?;
        }
        Ok(registry)
    }

    /// Register a definition; its id must not be taken
    pub fn register(&mut self, definition: NodeDefinition) -> Result<()> {
        if self.definitions.contains_key(definition.id()) {
            return Err(EngineError::DuplicateDefinition(definition.id().to_string()));
        }
        self.definitions
            .insert(definition.id().to_string(), Arc::new(definition));
        Ok(())
    }

    /// Register a definition, returning the one it replaced
    pub fn register_or_replace(&mut self, definition: NodeDefinition) -> Option<Arc<NodeDefinition>> {
        self.definitions
            .insert(definition.id().to_string(), Arc::new(definition))
    }

    pub fn unregister(&mut self, id: &str) -> Option<Arc<NodeDefinition>> {
        self.definitions.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<NodeDefinition>> {
        self.definitions.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.definitions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// All definitions, sorted by id
    pub fn definitions(&self) -> Vec<Arc<NodeDefinition>> {
        let mut definitions: Vec<_> = self.definitions.values().cloned().collect();
        definitions.sort_by(|a, b| a.id().cmp(b.id()));
        definitions
    }

    /// Metadata grouped by category, each group sorted by name
    pub fn catalog(&self) -> BTreeMap<String, Vec<NodeMetadata>> {
        let mut catalog: BTreeMap<String, Vec<NodeMetadata>> = BTreeMap::new();
        for definition in self.definitions.values() {
            catalog
                .entry(definition.category().to_string())
                .or_default()
                .push(definition.metadata.clone());
        }
        for group in catalog.values_mut() {
            group.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        }
        catalog
    }

    /// Case-insensitive search over id, name, category and description
    pub fn search(&self, text: &str) -> Vec<NodeMetadata> {
        let needle = text.trim().to_lowercase();
        let mut found: Vec<NodeMetadata> = self
            .definitions
            .values()
            .map(|d| &d.metadata)
            .filter(|m| {
                needle.is_empty()
                    || [&m.id, &m.name, &m.category, &m.description]
                        .iter()
                        .any(|field| field.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        found
    }

    /// Merge another registry into this one
    ///
    /// Entries from `other` override entries in `self` if they share the same id.
    pub fn merge(&mut self, other: NodeRegistry) {
        self.definitions.extend(other.definitions);
    }

    /// Register the getter and setter definitions of a variable,
    /// replacing earlier ones for the same name
    pub fn declare_variable(&mut self, variable: &GraphVariable) -> Result<()> {
        let get = variables::get_definition(variable)?;
        let set = variables::set_definition(variable)?;
        self.register_or_replace(get);
        self.register_or_replace(set);
        log::debug!("Declared variable '{}'", variable.name);
        Ok(())
    }

    /// Unregister a variable's getter and setter, returning whether any existed
    pub fn remove_variable(&mut self, name: &str) -> bool {
        let get = self.unregister(&variables::get_definition_id(name));
        let set = self.unregister(&variables::set_definition_id(name));
        get.is_some() || set.is_some()
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&String> = self.definitions.keys().collect();
        ids.sort();
        f.debug_struct("NodeRegistry").field("definitions", &ids).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::NodeBuilder;
    use crate::definition::InlineOutputs;
    use crate::types::DataType;
    use serde_json::json;

    fn test_definition(id: &str, name: &str, category: &str) -> NodeDefinition {
        NodeBuilder::new(id)
            .name(name)
            .category(category)
            .description(format!("Test {}", id))
            .output::<String>("Out")
            .inline(|_| Ok(InlineOutputs::new()))
            .build()
            .unwrap()
    }

    fn discovered_probe() -> Result<NodeDefinition> {
        Ok(test_definition("test.discovered", "Discovered", "Test"))
    }

    inventory::submit!(NodeRegistration::new(module_path!(), discovered_probe));

    #[test]
    fn test_register_and_lookup() {
        let mut registry = NodeRegistry::new();
        registry
            .register(test_definition("text.upper", "To Upper", "String"))
            .unwrap();

        assert!(registry.contains("text.upper"));
        assert!(!registry.contains("unknown"));
        assert_eq!(registry.get("text.upper").unwrap().name(), "To Upper");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_register_rejected() {
        let mut registry = NodeRegistry::new();
        registry.register(test_definition("a", "A", "X")).unwrap();
        let result = registry.register(test_definition("a", "A2", "X"));
        assert!(matches!(result, Err(EngineError::DuplicateDefinition(ref id)) if id == "a"));

        let replaced = registry.register_or_replace(test_definition("a", "A2", "X"));
        assert_eq!(replaced.unwrap().name(), "A");
        assert_eq!(registry.get("a").unwrap().name(), "A2");
    }

    #[test]
    fn test_unregister() {
        let mut registry = NodeRegistry::new();
        registry.register(test_definition("a", "A", "X")).unwrap();
        assert!(registry.unregister("a").is_some());
        assert!(registry.unregister("a").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_catalog_grouped_and_sorted() {
        let mut registry = NodeRegistry::new();
        registry.register(test_definition("m.sub", "Subtract", "Math")).unwrap();
        registry.register(test_definition("m.add", "Add", "Math")).unwrap();
        registry.register(test_definition("s.len", "Length", "String")).unwrap();

        let catalog = registry.catalog();
        let categories: Vec<&String> = catalog.keys().collect();
        assert_eq!(categories, vec!["Math", "String"]);
        let math: Vec<&str> = catalog["Math"].iter().map(|m| m.name.as_str()).collect();
        assert_eq!(math, vec!["Add", "Subtract"]);
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let mut registry = NodeRegistry::new();
        registry.register(test_definition("m.add", "Add", "Math")).unwrap();
        registry.register(test_definition("s.upper", "To Upper", "String")).unwrap();

        let hits = registry.search("UPPER");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "s.upper");
        assert_eq!(registry.search("math").len(), 1);
        assert_eq!(registry.search("").len(), 2);
        assert!(registry.search("nothing").is_empty());
    }

    #[test]
    fn test_merge_override() {
        let mut registry1 = NodeRegistry::new();
        registry1.register(test_definition("a", "Original", "X")).unwrap();

        let mut registry2 = NodeRegistry::new();
        registry2.register(test_definition("a", "Override", "X")).unwrap();
        registry2.register(test_definition("b", "B", "X")).unwrap();

        registry1.merge(registry2);
        assert_eq!(registry1.len(), 2);
        assert_eq!(registry1.get("a").unwrap().name(), "Override");
    }

    #[test]
    fn test_declare_and_remove_variable() {
        let mut registry = NodeRegistry::new();
        let variable = GraphVariable::new("lives", DataType::Integer, json!(3));

        registry.declare_variable(&variable).unwrap();
        assert!(registry.contains("variables.get.lives"));
        assert!(registry.contains("variables.set.lives"));

        // Re-declaring replaces instead of failing
        registry.declare_variable(&variable).unwrap();
        assert_eq!(registry.len(), 2);

        assert!(registry.remove_variable("lives"));
        assert!(registry.is_empty());
        assert!(!registry.remove_variable("lives"));
    }

    #[test]
    fn test_discovery_filters_by_module() {
        let found = discover(&[module_path!()]).unwrap();
        assert!(found.iter().any(|d| d.id() == "test.discovered"));

        assert!(discover(&["no_such_crate"]).unwrap().is_empty());

        let registry = NodeRegistry::with_discovered(&[module_path!()]).unwrap();
        assert!(registry.contains("test.discovered"));
    }
}
