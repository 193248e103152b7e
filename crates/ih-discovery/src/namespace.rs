// SPDX-License-Identifier: MIT OR Apache-2.0
//! Namespaces: the unit discovery imports.

use crate::DiscoveryError;
use ih_integration::IntegrationClass;
use std::sync::Arc;

/// Outcome of importing one class from a namespace.
pub type ClassImport = Result<Arc<dyn IntegrationClass>, DiscoveryError>;

/// Priority given to namespaces that do not choose one.
pub const DEFAULT_PRIORITY: u32 = 100;

/// A registry of integration classes contributed by one provider package.
pub trait Namespace: Send + Sync {
    fn name(&self) -> &str;

    /// Lower values are visited first.
    fn priority(&self) -> u32 {
        DEFAULT_PRIORITY
    }

    /// Import every class the namespace exports.
    ///
    /// An outer error means the namespace itself is unusable; an inner error
    /// means one class failed and the rest are still usable.
    fn import(&self) -> Result<Vec<ClassImport>, DiscoveryError>;
}

/// A namespace assembled in code from class handles.
#[derive(Clone)]
pub struct StaticNamespace {
    name: String,
    priority: u32,
    entries: Vec<ClassImport>,
    missing: Option<String>,
}

impl StaticNamespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: DEFAULT_PRIORITY,
            entries: Vec::new(),
            missing: None,
        }
    }

    /// A namespace whose import always fails, e.g. an uninstalled package.
    pub fn unavailable(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            missing: Some(reason.into()),
            ..Self::new(name)
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_class(mut self, class: Arc<dyn IntegrationClass>) -> Self {
        self.entries.push(Ok(class));
        self
    }

    pub fn with_classes(
        mut self,
        classes: impl IntoIterator<Item = Arc<dyn IntegrationClass>>,
    ) -> Self {
        self.entries.extend(classes.into_iter().map(Ok));
        self
    }

    /// Register a symbol that fails to import.
    pub fn with_import_failure(
        mut self,
        symbol: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        self.entries.push(Err(DiscoveryError::ImportFailed {
            namespace: self.name.clone(),
            symbol: symbol.into(),
            reason: reason.into(),
        }));
        self
    }
}

impl std::fmt::Debug for StaticNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticNamespace")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("entries", &self.entries.len())
            .field("missing", &self.missing)
            .finish()
    }
}

impl Namespace for StaticNamespace {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn import(&self) -> Result<Vec<ClassImport>, DiscoveryError> {
        match &self.missing {
            Some(reason) => Err(DiscoveryError::NamespaceMissing {
                namespace: self.name.clone(),
                reason: reason.clone(),
            }),
            None => Ok(self.entries.clone()),
        }
    }
}
