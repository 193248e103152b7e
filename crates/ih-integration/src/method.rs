// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reflection metadata: which methods a class exposes and how.

use ih_core::Capability;
use std::collections::BTreeMap;

/// Where a method's implementation comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodOrigin {
    /// The class implements the method itself.
    Override,
    /// The method is a generic fallback inherited from a base class.
    Inherited,
}

/// Declared shape of one method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub name: String,
    /// Positional parameters, not counting the receiver.
    pub params: usize,
    pub asynchronous: bool,
    pub origin: MethodOrigin,
}

impl MethodDescriptor {
    /// A synchronous override.
    pub fn sync(name: impl Into<String>, params: usize) -> Self {
        Self {
            name: name.into(),
            params,
            asynchronous: false,
            origin: MethodOrigin::Override,
        }
    }

    /// An asynchronous override.
    pub fn asynchronous(name: impl Into<String>, params: usize) -> Self {
        Self {
            asynchronous: true,
            ..Self::sync(name, params)
        }
    }

    /// The canonical shape for a capability.
    pub fn for_capability(capability: Capability) -> Self {
        let params = usize::from(capability.expected_params());
        if capability.is_async() {
            Self::asynchronous(capability.as_str(), params)
        } else {
            Self::sync(capability.as_str(), params)
        }
    }

    /// Mark the method as an inherited fallback.
    pub fn inherited(mut self) -> Self {
        self.origin = MethodOrigin::Inherited;
        self
    }
}

/// Methods a class exposes, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodTable {
    methods: BTreeMap<String, MethodDescriptor>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the canonical shape for each capability.
    pub fn for_capabilities(capabilities: &[Capability]) -> Self {
        capabilities
            .iter()
            .map(|c| MethodDescriptor::for_capability(*c))
            .collect()
    }

    /// Add or replace a method.
    pub fn with(mut self, method: MethodDescriptor) -> Self {
        self.insert(method);
        self
    }

    pub fn insert(&mut self, method: MethodDescriptor) {
        self.methods.insert(method.name.clone(), method);
    }

    pub fn remove(&mut self, name: &str) -> Option<MethodDescriptor> {
        self.methods.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// `true` if any of `capabilities` appears by name.
    pub fn exposes_any(&self, capabilities: &[Capability]) -> bool {
        capabilities.iter().any(|c| self.contains(c.as_str()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &MethodDescriptor> {
        self.methods.values()
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl FromIterator<MethodDescriptor> for MethodTable {
    fn from_iter<I: IntoIterator<Item = MethodDescriptor>>(iter: I) -> Self {
        let mut table = Self::new();
        for m in iter {
            table.insert(m);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ih_core::MODEL_CONTRACT;

    #[test]
    fn canonical_shapes() {
        let table = MethodTable::for_capabilities(MODEL_CONTRACT);
        assert_eq!(table.len(), 6);
        let ainvoke = table.get("ainvoke").unwrap();
        assert!(ainvoke.asynchronous);
        assert_eq!(ainvoke.params, 1);
        assert!(!table.get("invoke").unwrap().asynchronous);
    }

    #[test]
    fn with_replaces_by_name() {
        let table = MethodTable::new()
            .with(MethodDescriptor::sync("invoke", 1))
            .with(MethodDescriptor::sync("invoke", 3).inherited());
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("invoke").unwrap().origin, MethodOrigin::Inherited);
    }

    #[test]
    fn exposes_any_matches_names() {
        let table = MethodTable::new().with(MethodDescriptor::sync("embed_query", 1));
        assert!(table.exposes_any(&[Capability::Invoke, Capability::EmbedQuery]));
        assert!(!table.exposes_any(&[Capability::Invoke]));
    }
}
