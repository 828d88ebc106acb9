//! Typed service map handed to nodes when they are created.
//!
//! Hosts insert runtime objects (clients, handles, clocks) before a run; a
//! node looks them up in [`Node::on_created`](crate::node::Node::on_created)
//! and keeps what it needs for its execution.
//!
//! ```ignore
//! let mut services = NodeServices::new();
//! services.insert(Arc::new(MyClient::new()));
//!
//! // In a node:
//! fn on_created(&mut self, services: &NodeServices) -> Result<()> {
//!     self.client = services.get::<Arc<MyClient>>().cloned();
//!     Ok(())
//! }
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;

/// Services keyed by their Rust type
#[derive(Default)]
pub struct NodeServices {
    inner: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl NodeServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a service, replacing any previous value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.inner.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Builder-style [`NodeServices::insert`].
    pub fn with<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.insert(value);
        self
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.inner
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.inner.contains_key(&TypeId::of::<T>())
    }
}

impl std::fmt::Debug for NodeServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeServices")
            .field("count", &self.inner.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_insert_and_get() {
        let mut services = NodeServices::new();
        services.insert("hello".to_string());

        assert_eq!(services.get::<String>(), Some(&"hello".to_string()));
        assert!(services.contains::<String>());
        assert!(!services.contains::<u32>());
    }

    #[test]
    fn test_replace_value() {
        let services = NodeServices::new()
            .with(Arc::new(vec![1, 2, 3]))
            .with(Arc::new(vec![4]));

        let retrieved = services.get::<Arc<Vec<i32>>>().unwrap();
        assert_eq!(retrieved.as_ref(), &vec![4]);
    }
}
