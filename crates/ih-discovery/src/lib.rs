// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! Discovery of integration classes.
//!
//! [`Discovery`] walks registered [`Namespace`]s in `(priority, registration)`
//! order and yields every concrete class that looks like an integration of its
//! declared kind. A namespace is imported only when the iterator reaches it, and
//! import failures become [`DiscoveryWarning`]s instead of errors.

pub mod namespace;

pub use namespace::{ClassImport, DEFAULT_PRIORITY, Namespace, StaticNamespace};

use globset::{Glob, GlobSet, GlobSetBuilder};
use ih_core::{IntegrationIdentity, IntegrationKind};
use ih_error::{Coded, ErrorCode};
use ih_integration::{IntegrationClass, panic_message};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Errors and warnings
// ---------------------------------------------------------------------------

/// Failures that can occur while importing namespaces.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscoveryError {
    /// The namespace could not be imported at all.
    #[error("namespace '{namespace}' unavailable: {reason}")]
    NamespaceMissing { namespace: String, reason: String },

    /// A single exported symbol failed to import.
    #[error("failed to import '{symbol}' from '{namespace}': {reason}")]
    ImportFailed {
        namespace: String,
        symbol: String,
        reason: String,
    },

    /// A namespace filter pattern did not compile.
    #[error("invalid discovery pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

impl Coded for DiscoveryError {
    fn code(&self) -> ErrorCode {
        match self {
            Self::NamespaceMissing { .. } => ErrorCode::DiscoveryNamespaceMissing,
            Self::ImportFailed { .. } => ErrorCode::DiscoveryImportFailed,
            Self::InvalidPattern { .. } => ErrorCode::ConfigInvalid,
        }
    }
}

/// A non-fatal problem met during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryWarning {
    pub namespace: String,
    /// The failing symbol, or `None` when the whole namespace failed.
    pub symbol: Option<String>,
    pub message: String,
}

impl DiscoveryWarning {
    fn from_error(namespace: &str, err: &DiscoveryError) -> Self {
        let symbol = match err {
            DiscoveryError::ImportFailed { symbol, .. } => Some(symbol.clone()),
            _ => None,
        };
        Self {
            namespace: namespace.to_string(),
            symbol,
            message: err.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// One integration found by discovery.
#[derive(Clone)]
pub struct DiscoveredIntegration {
    pub identity: IntegrationIdentity,
    pub kind: IntegrationKind,
    pub class: Arc<dyn IntegrationClass>,
}

impl DiscoveredIntegration {
    /// Wrap a class handle found in `package`.
    pub fn new(package: &str, class: Arc<dyn IntegrationClass>) -> Self {
        Self {
            identity: IntegrationIdentity::new(class.name(), package, class.version()),
            kind: class.kind(),
            class,
        }
    }
}

impl std::fmt::Debug for DiscoveredIntegration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveredIntegration")
            .field("identity", &self.identity)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Everything a full scan produced.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    pub integrations: Vec<DiscoveredIntegration>,
    pub warnings: Vec<DiscoveryWarning>,
}

impl From<Vec<DiscoveredIntegration>> for DiscoveryReport {
    fn from(integrations: Vec<DiscoveredIntegration>) -> Self {
        Self {
            integrations,
            warnings: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Scans a fixed set of namespaces. Holds no state between scans.
#[derive(Clone, Default)]
pub struct Discovery {
    namespaces: Vec<Arc<dyn Namespace>>,
    patterns: Option<GlobSet>,
}

impl Discovery {
    /// Discovery over `namespaces`, in registration order.
    pub fn new(namespaces: Vec<Arc<dyn Namespace>>) -> Self {
        Self {
            namespaces,
            patterns: None,
        }
    }

    /// Register one more namespace.
    pub fn with_namespace(mut self, namespace: impl Namespace + 'static) -> Self {
        self.namespaces.push(Arc::new(namespace));
        self
    }

    /// Only scan namespaces whose name matches one of `patterns` (`*` wildcard).
    /// An empty list keeps every namespace.
    pub fn with_patterns(mut self, patterns: &[String]) -> Result<Self, DiscoveryError> {
        if patterns.is_empty() {
            self.patterns = None;
            return Ok(self);
        }
        let mut builder = GlobSetBuilder::new();
        for p in patterns {
            let glob = Glob::new(p).map_err(|e| DiscoveryError::InvalidPattern {
                pattern: p.clone(),
                reason: e.to_string(),
            })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|e| DiscoveryError::InvalidPattern {
            pattern: patterns.join(","),
            reason: e.to_string(),
        })?;
        self.patterns = Some(set);
        Ok(self)
    }

    /// Start a fresh scan.
    pub fn discover(&self) -> DiscoveryIter<'_> {
        let mut order: Vec<&Arc<dyn Namespace>> = self
            .namespaces
            .iter()
            .filter(|ns| {
                let keep = self.patterns.as_ref().is_none_or(|set| set.is_match(ns.name()));
                if !keep {
                    debug!(
                        target: "ih.discovery",
                        namespace = ns.name(),
                        "namespace filtered out by pattern"
                    );
                }
                keep
            })
            .collect();
        // Stable: equal priorities keep registration order.
        order.sort_by_key(|ns| ns.priority());
        DiscoveryIter {
            order: order.into(),
            pending: VecDeque::new(),
            warnings: Vec::new(),
        }
    }

    /// Run a scan to completion.
    pub fn discover_all(&self) -> DiscoveryReport {
        let mut iter = self.discover();
        let integrations: Vec<_> = iter.by_ref().collect();
        DiscoveryReport {
            integrations,
            warnings: iter.into_warnings(),
        }
    }
}

impl std::fmt::Debug for Discovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.namespaces.iter().map(|ns| ns.name()).collect();
        f.debug_struct("Discovery")
            .field("namespaces", &names)
            .field("filtered", &self.patterns.is_some())
            .finish()
    }
}

/// `true` if `class` should be probed as an integration of its declared kind.
pub fn looks_like_integration(class: &dyn IntegrationClass) -> bool {
    !class.is_abstract() && class.methods().exposes_any(class.kind().contract())
}

/// Lazy iterator over one scan.
pub struct DiscoveryIter<'a> {
    order: VecDeque<&'a Arc<dyn Namespace>>,
    pending: VecDeque<DiscoveredIntegration>,
    warnings: Vec<DiscoveryWarning>,
}

impl DiscoveryIter<'_> {
    /// Warnings recorded so far.
    pub fn warnings(&self) -> &[DiscoveryWarning] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<DiscoveryWarning> {
        self.warnings
    }

    fn record(&mut self, namespace: &str, err: &DiscoveryError) {
        warn!(target: "ih.discovery", namespace, error = %err, "discovery failure");
        self.warnings.push(DiscoveryWarning::from_error(namespace, err));
    }

    fn load(&mut self, ns: &dyn Namespace) {
        let name = ns.name().to_string();
        let imports = match catch_unwind(AssertUnwindSafe(|| ns.import())) {
            Ok(Ok(imports)) => imports,
            Ok(Err(err)) => {
                self.record(&name, &err);
                return;
            }
            Err(payload) => {
                let err = DiscoveryError::NamespaceMissing {
                    namespace: name.clone(),
                    reason: format!("panicked: {}", panic_message(payload.as_ref())),
                };
                self.record(&name, &err);
                return;
            }
        };

        let mut found = Vec::new();
        for (index, import) in imports.into_iter().enumerate() {
            let class = match import {
                Ok(class) => class,
                Err(err) => {
                    self.record(&name, &err);
                    continue;
                }
            };
            match catch_unwind(AssertUnwindSafe(|| admit(&name, &class))) {
                Ok(Some(integration)) => found.push(integration),
                Ok(None) => {}
                Err(payload) => {
                    let symbol = catch_unwind(AssertUnwindSafe(|| class.name().to_string()))
                        .unwrap_or_else(|_| format!("#{index}"));
                    let err = DiscoveryError::ImportFailed {
                        namespace: name.clone(),
                        symbol,
                        reason: format!("panicked: {}", panic_message(payload.as_ref())),
                    };
                    self.record(&name, &err);
                }
            }
        }
        found.sort_by(|a, b| a.identity.name.cmp(&b.identity.name));
        debug!(
            target: "ih.discovery",
            namespace = %name,
            count = found.len(),
            "namespace imported"
        );
        self.pending.extend(found);
    }
}

/// Wrap `class` if it passes the shape filter. Calls into the class.
fn admit(package: &str, class: &Arc<dyn IntegrationClass>) -> Option<DiscoveredIntegration> {
    if looks_like_integration(class.as_ref()) {
        Some(DiscoveredIntegration::new(package, Arc::clone(class)))
    } else {
        debug!(
            target: "ih.discovery",
            namespace = package,
            class = class.name(),
            "skipping non-integration class"
        );
        None
    }
}

impl Iterator for DiscoveryIter<'_> {
    type Item = DiscoveredIntegration;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(item);
            }
            let ns = self.order.pop_front()?;
            self.load(ns.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ih_core::Capability;
    use ih_integration::MethodTable;
    use ih_integration_mock::ScriptedClass;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingNamespace {
        inner: StaticNamespace,
        imports: Arc<AtomicUsize>,
    }

    impl Namespace for CountingNamespace {
        fn name(&self) -> &str {
            self.inner.name()
        }
        fn import(&self) -> Result<Vec<ClassImport>, DiscoveryError> {
            self.imports.fetch_add(1, Ordering::SeqCst);
            self.inner.import()
        }
    }

    struct ExplodingNamespace;

    impl Namespace for ExplodingNamespace {
        fn name(&self) -> &str {
            "exploding"
        }
        fn import(&self) -> Result<Vec<ClassImport>, DiscoveryError> {
            panic!("import exploded")
        }
    }

    /// Imports fine, then panics when the shape filter reflects on it.
    struct UnreflectableClass;

    impl IntegrationClass for UnreflectableClass {
        fn name(&self) -> &str {
            "Unreflectable"
        }
        fn kind(&self) -> IntegrationKind {
            IntegrationKind::ChatModel
        }
        fn methods(&self) -> MethodTable {
            panic!("no metadata")
        }
        fn construct(
            &self,
            _: &ih_integration::ConstructArgs,
        ) -> Result<Arc<dyn ih_integration::ModelIntegration>, ih_integration::IntegrationError>
        {
            Err(ih_integration::IntegrationError::Construction("never".into()))
        }
    }

    /// A namespace exporting one class.
    fn single(namespace: &str, class: ScriptedClass) -> StaticNamespace {
        StaticNamespace::new(namespace).with_class(class.into_handle())
    }

    fn names(report: &DiscoveryReport) -> Vec<&str> {
        report
            .integrations
            .iter()
            .map(|d| d.identity.name.as_str())
            .collect()
    }

    #[test]
    fn classes_are_alphabetical_within_namespace() {
        let ns = StaticNamespace::new("pkg")
            .with_class(ScriptedClass::chat("Zeta").into_handle())
            .with_class(ScriptedClass::chat("Alpha").into_handle());
        let report = Discovery::default().with_namespace(ns).discover_all();
        assert_eq!(names(&report), vec!["Alpha", "Zeta"]);
        assert_eq!(report.integrations[0].identity.package, "pkg");
    }

    #[test]
    fn priority_then_registration_order() {
        let d = Discovery::default()
            .with_namespace(single("late", ScriptedClass::llm("A")).with_priority(200))
            .with_namespace(single("first", ScriptedClass::llm("B")).with_priority(10))
            .with_namespace(single("second", ScriptedClass::llm("C")).with_priority(10));
        assert_eq!(names(&d.discover_all()), vec!["B", "C", "A"]);
    }

    #[test]
    fn shape_filter_skips_abstract_and_foreign_classes() {
        let ns = StaticNamespace::new("pkg")
            .with_class(ScriptedClass::chat("BaseChat").abstract_class().into_handle())
            .with_class(
                ScriptedClass::new("Helper", IntegrationKind::Embeddings)
                    .with_behavior(Capability::Invoke, ih_integration_mock::Behavior::Pass)
                    .into_handle(),
            )
            .with_class(ScriptedClass::embeddings("RealEmbeddings").into_handle());
        let report = Discovery::default().with_namespace(ns).discover_all();
        assert_eq!(names(&report), vec!["RealEmbeddings"]);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn failures_become_warnings() {
        let d = Discovery::default()
            .with_namespace(StaticNamespace::unavailable("gone", "not installed"))
            .with_namespace(
                StaticNamespace::new("partial")
                    .with_import_failure("BrokenLLM", "syntax error")
                    .with_class(ScriptedClass::llm("GoodLLM").into_handle()),
            );
        let report = d.discover_all();
        assert_eq!(names(&report), vec!["GoodLLM"]);
        assert_eq!(report.warnings.len(), 2);
        assert_eq!(report.warnings[0].symbol, None);
        assert_eq!(report.warnings[1].symbol.as_deref(), Some("BrokenLLM"));
    }

    #[test]
    fn panics_are_contained_to_their_namespace_or_class() {
        let d = Discovery::default()
            .with_namespace(single("pkg_a", ScriptedClass::llm("A")))
            .with_namespace(ExplodingNamespace)
            .with_namespace(
                StaticNamespace::new("pkg_c")
                    .with_class(Arc::new(UnreflectableClass))
                    .with_class(ScriptedClass::chat("C").into_handle()),
            );
        let report = d.discover_all();

        assert_eq!(names(&report), vec!["A", "C"]);
        assert_eq!(report.warnings.len(), 2);
        assert_eq!(report.warnings[0].namespace, "exploding");
        assert_eq!(report.warnings[0].symbol, None);
        assert!(report.warnings[0].message.ends_with("panicked: import exploded"));
        assert_eq!(report.warnings[1].namespace, "pkg_c");
        assert_eq!(report.warnings[1].symbol.as_deref(), Some("Unreflectable"));
        assert!(report.warnings[1].message.ends_with("panicked: no metadata"));
    }

    #[test]
    fn namespaces_import_lazily() {
        let imports = Arc::new(AtomicUsize::new(0));
        let d = Discovery::default()
            .with_namespace(single("a", ScriptedClass::llm("A")))
            .with_namespace(CountingNamespace {
                inner: single("b", ScriptedClass::llm("B")),
                imports: imports.clone(),
            });
        let mut iter = d.discover();
        assert_eq!(iter.next().map(|i| i.identity.name), Some("A".to_string()));
        assert_eq!(imports.load(Ordering::SeqCst), 0);
        assert!(iter.next().is_some());
        assert_eq!(imports.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn scans_are_restartable() {
        let d = Discovery::default()
            .with_namespace(StaticNamespace::new("pkg").with_classes([
                ScriptedClass::llm("One").into_handle(),
                ScriptedClass::llm("Two").into_handle(),
            ]));
        let first: Vec<_> = d.discover().map(|i| i.identity).collect();
        let second: Vec<_> = d.discover().map(|i| i.identity).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn patterns_filter_namespaces() {
        let d = Discovery::default()
            .with_namespace(single("langchain_openai", ScriptedClass::chat("ChatOpenAI")))
            .with_namespace(single("other_pkg", ScriptedClass::chat("Other")))
            .with_patterns(&["langchain_*".to_string()])
            .unwrap();
        assert_eq!(names(&d.discover_all()), vec!["ChatOpenAI"]);
    }

    #[test]
    fn bad_pattern_is_rejected() {
        let err = Discovery::default()
            .with_patterns(&["[unclosed".to_string()])
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConfigInvalid);
    }

    #[test]
    fn identity_carries_version() {
        let ns = StaticNamespace::new("pkg")
            .with_class(ScriptedClass::llm("V").with_version("2.1.0").into_handle())
            .with_class(ScriptedClass::llm("W").into_handle());
        let report = Discovery::default().with_namespace(ns).discover_all();
        assert_eq!(report.integrations[0].identity.version, "2.1.0");
        assert_eq!(report.integrations[1].identity.version, "unknown");
    }
}
