//! Group Registry
//!
//! Name → group table shared by the local API and the peer server. Built once
//! at startup and passed to whoever needs it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use super::{Group, GroupConfig, Loader};
use crate::error::{Error, Result};

/// Registry of named groups
#[derive(Debug, Default)]
pub struct GroupRegistry {
    groups: RwLock<HashMap<String, Arc<Group>>>,
    reject_duplicates: bool,
}

impl GroupRegistry {
    /// Create an empty registry that overwrites duplicate names
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject duplicate names with [`Error::DuplicateGroup`] instead of
    /// replacing the existing group
    pub fn with_duplicate_guard(mut self, enabled: bool) -> Self {
        self.reject_duplicates = enabled;
        self
    }

    /// Register a group, returning the group it replaced if any
    pub fn register(&self, group: Arc<Group>) -> Result<Option<Arc<Group>>> {
        let name = group.name().to_string();
        let mut groups = self.groups.write();

        if groups.contains_key(&name) {
            if self.reject_duplicates {
                return Err(Error::DuplicateGroup(name));
            }
            warn!("Group {} already registered, replacing it", name);
        } else {
            info!("Registered group {}", name);
        }

        Ok(groups.insert(name, group))
    }

    /// Create and register a group in one step
    pub fn new_group(
        &self,
        name: impl Into<String>,
        config: GroupConfig,
        loader: Arc<dyn Loader>,
    ) -> Result<Arc<Group>> {
        let group = Arc::new(Group::new(name, config, loader));
        self.register(group.clone())?;
        Ok(group)
    }

    /// Find a group by name
    pub fn lookup(&self, name: &str) -> Option<Arc<Group>> {
        self.groups.read().get(name).cloned()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// All registered groups, sorted by name
    pub fn groups(&self) -> Vec<Arc<Group>> {
        let mut groups: Vec<Arc<Group>> = self.groups.read().values().cloned().collect();
        groups.sort_by(|a, b| a.name().cmp(b.name()));
        groups
    }

    /// Number of registered groups
    pub fn len(&self) -> usize {
        self.groups.read().len()
    }

    /// Check if no group is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
