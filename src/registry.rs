//! Name registry: ordered name → queue handle directory
//!
//! Owned by the service core task and never shared, so it needs no locking.
//! Entries iterate in ascending name order.

use std::collections::BTreeMap;
use thiserror::Error;

use crate::mailbox::{QueueHandle, QueueProbe};
use crate::protocol::Status;

/// Expected, client-visible registry outcomes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("name '{0}' is already registered")]
    NameExists(String),

    #[error("queue {0} does not exist")]
    QueueNotExists(QueueHandle),

    #[error("name '{0}' is not registered")]
    NotSubscribed(String),
}

impl RegistryError {
    /// Status string reported to the client for this outcome
    pub fn status(&self) -> Status {
        match self {
            Self::NameExists(_) => Status::PortExists,
            Self::QueueNotExists(_) => Status::QueueNotExists,
            Self::NotSubscribed(_) => Status::PortNotSubscribed,
        }
    }
}

#[derive(Debug, Default)]
pub struct NameRegistry {
    entries: BTreeMap<String, QueueHandle>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` for a live queue
    pub fn add(
        &mut self,
        name: &str,
        handle: QueueHandle,
        probe: &dyn QueueProbe,
    ) -> Result<(), RegistryError> {
        if self.entries.contains_key(name) {
            return Err(RegistryError::NameExists(name.to_string()));
        }
        if !probe.is_live(handle) {
            return Err(RegistryError::QueueNotExists(handle));
        }
        self.entries.insert(name.to_string(), handle);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<QueueHandle, RegistryError> {
        self.entries
            .remove(name)
            .ok_or_else(|| RegistryError::NotSubscribed(name.to_string()))
    }

    pub fn find(&self, name: &str) -> Result<QueueHandle, RegistryError> {
        self.entries
            .get(name)
            .copied()
            .ok_or_else(|| RegistryError::NotSubscribed(name.to_string()))
    }

    /// Entries in ascending name order
    pub fn entries(&self) -> impl Iterator<Item = (&str, QueueHandle)> {
        self.entries.iter().map(|(name, handle)| (name.as_str(), *handle))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct FixedProbe(HashSet<u32>);

    impl QueueProbe for FixedProbe {
        fn is_live(&self, handle: QueueHandle) -> bool {
            self.0.contains(&handle.get())
        }
    }

    fn probe() -> FixedProbe {
        FixedProbe([42, 99, 7].into_iter().collect())
    }

    #[test]
    fn test_add_then_find() {
        let mut registry = NameRegistry::new();
        registry.add("printer1", QueueHandle::new(42), &probe()).unwrap();
        assert_eq!(registry.find("printer1"), Ok(QueueHandle::new(42)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_name_keeps_first_mapping() {
        let mut registry = NameRegistry::new();
        registry.add("printer1", QueueHandle::new(42), &probe()).unwrap();

        let err = registry
            .add("printer1", QueueHandle::new(99), &probe())
            .unwrap_err();
        assert_eq!(err, RegistryError::NameExists("printer1".into()));
        assert_eq!(err.status(), Status::PortExists);
        assert_eq!(registry.find("printer1"), Ok(QueueHandle::new(42)));
    }

    #[test]
    fn test_dangling_handle_rejected() {
        let mut registry = NameRegistry::new();
        let err = registry.add("x", QueueHandle::new(999_999), &probe()).unwrap_err();
        assert_eq!(err.status(), Status::QueueNotExists);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_and_unknown_names() {
        let mut registry = NameRegistry::new();
        registry.add("printer1", QueueHandle::new(42), &probe()).unwrap();

        assert_eq!(registry.remove("printer1"), Ok(QueueHandle::new(42)));
        for _ in 0..2 {
            assert_eq!(
                registry.find("printer1").unwrap_err().status(),
                Status::PortNotSubscribed
            );
            assert_eq!(
                registry.remove("nope").unwrap_err().status(),
                Status::PortNotSubscribed
            );
        }
    }

    #[test]
    fn test_entries_are_ordered() {
        let mut registry = NameRegistry::new();
        for (name, id) in [("zeta", 7), ("alpha", 42), ("mid", 99)] {
            registry.add(name, QueueHandle::new(id), &probe()).unwrap();
        }
        let names: Vec<&str> = registry.entries().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }
}
