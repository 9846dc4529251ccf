//! The contracts the core resolves against but never implements itself (spec.md §6).
//!
//! Configuration parsing, metadata fetching, attribute/variant matching, artifact download, the
//! build-operation execution pool, and reporting all live on the other side of these traits. Each
//! one ships a minimal in-memory or no-op implementation here so the engine and its tests don't
//! need a real build tool to exercise the loop.

use std::collections::HashMap;

use crate::graph::{Capability, ComponentMetadata};
use crate::ids::ComponentId;
use crate::module::{ModuleId, ModuleVersionId};
use crate::selector::{ComponentIdResolveResult, IdResolveFailure};
use crate::version::VersionConstraint;

/// A declared selector: the version constraint plus the module it targets. `component_selector`
/// is left as an opaque string (a project path, a classifier, ...) for id resolvers that need
/// more than group/name/version to find a candidate.
#[derive(Debug, Clone)]
pub struct ComponentSelector {
    pub module: ModuleId,
    pub constraint: VersionConstraint,
    pub component_selector: Option<String>,
}

/// Raw output of an [`IdResolver`]: either a resolved module version plus an external key, or a
/// failure. `metadata` lets a resolver hand back already-fetched metadata (e.g. for a locally
/// built project) so the engine can skip a later `MetadataResolver::resolve` call.
pub struct IdResolveResult {
    pub key: Option<ComponentKey>,
    pub module_version: Option<ModuleVersionId>,
    pub metadata: Option<ComponentMetadata>,
    pub failure: Option<IdResolveFailure>,
}

impl IdResolveResult {
    pub fn resolved(key: ComponentKey, module_version: ModuleVersionId) -> Self {
        Self {
            key: Some(key),
            module_version: Some(module_version),
            metadata: None,
            failure: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            key: None,
            module_version: None,
            metadata: None,
            failure: Some(IdResolveFailure { message: message.into() }),
        }
    }
}

/// An opaque identifier a component is known by to the outside world — the thing spec.md §3
/// calls "component id": "an opaque identifier assigned by the id resolver (may or may not be a
/// module version)". The engine interns this into its own arena-stable [`ComponentId`] via
/// `ResolveState::get_revision`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComponentKey(pub String);

/// Resolves a declared selector to a concrete component id. May perform network I/O; treated as
/// synchronous from the traversal loop's perspective (spec.md §5).
pub trait IdResolver {
    fn resolve(&mut self, selector: &ComponentSelector) -> IdResolveResult;
}

/// Fetches metadata for an already-resolved component, and reports whether doing so is cheap
/// enough to skip the parallel prefetch fan-out.
///
/// `Send` so a resolve can share one boxed instance across the scoped threads
/// `BuildOperationQueue::run_all` spawns for the prefetch fan-out (spec.md §5).
pub trait MetadataResolver: Send {
    fn is_fetching_metadata_cheap(&self, key: &ComponentKey) -> bool;
    fn resolve(&mut self, key: &ComponentKey) -> Result<ComponentMetadata, IdResolveFailure>;
}

/// Resolves the root module's context into its component (spec.md §6: `ContextResolver`).
pub trait ContextResolver {
    fn resolve(&mut self) -> Result<(ComponentKey, ModuleVersionId, ComponentMetadata), IdResolveFailure>;
}

/// Picks which configuration(s) on a target component satisfy a requested configuration name.
/// Attribute/variant matching inside a single component is out of scope (spec.md §1); this trait
/// is the seam the core calls into rather than doing that matching itself.
pub trait AttributeMatcher {
    fn select<'a>(
        &self,
        component: &'a ComponentMetadata,
        requested: Option<&str>,
    ) -> Option<&'a crate::graph::ConfigurationMetadata>;
}

/// Default matcher: configuration by exact name, falling back to the first declared
/// configuration when none was requested.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAttributeMatcher;

impl AttributeMatcher for DefaultAttributeMatcher {
    fn select<'a>(
        &self,
        component: &'a ComponentMetadata,
        requested: Option<&str>,
    ) -> Option<&'a crate::graph::ConfigurationMetadata> {
        match requested {
            Some(name) => component.configuration(name),
            None => component.configurations.first(),
        }
    }
}

/// A pluggable strategy for picking between conflicting components on one module
/// (spec.md §4.3.1 step 4, §4.4).
pub trait ModuleConflictResolver {
    fn select(&mut self, candidates: &[ComponentIdResolveResult]) -> Result<ComponentId, IdResolveFailure>;
}

/// "Highest version wins" — the common default strategy named in spec.md §4.4.
#[derive(Debug, Default, Clone, Copy)]
pub struct HighestVersionWins;

impl ModuleConflictResolver for HighestVersionWins {
    fn select(&mut self, candidates: &[ComponentIdResolveResult]) -> Result<ComponentId, IdResolveFailure> {
        candidates
            .iter()
            .max_by(|a, b| a.version.cmp(&b.version))
            .map(|r| r.component)
            .ok_or_else(|| IdResolveFailure {
                message: "module conflict resolver received no candidates".into(),
            })
    }
}

/// Analogous to [`ModuleConflictResolver`], but for capability collisions.
pub trait CapabilitiesConflictResolver {
    fn select(&mut self, providers: &[ComponentId]) -> Result<ComponentId, IdResolveFailure>;
}

impl CapabilitiesConflictResolver for HighestVersionWins {
    fn select(&mut self, providers: &[ComponentId]) -> Result<ComponentId, IdResolveFailure> {
        providers
            .first()
            .copied()
            .ok_or_else(|| IdResolveFailure {
                message: "capability conflict resolver received no providers".into(),
            })
    }
}

/// External data mapping one module id to another, consulted during module conflict
/// registration (spec.md §4.4).
#[derive(Debug, Default, Clone)]
pub struct ModuleReplacementsData {
    replacements: HashMap<ModuleId, ModuleId>,
}

impl ModuleReplacementsData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, from: ModuleId, to: ModuleId) {
        self.replacements.insert(from, to);
    }

    pub fn replacement_for(&self, module: &ModuleId) -> Option<&ModuleId> {
        self.replacements.get(module)
    }
}

/// Rewrites a dependency before resolution (e.g. a project-local substitution rule).
pub trait DependencySubstitutionApplicator {
    fn apply(&self, selector: ComponentSelector) -> ComponentSelector;
}

impl DependencySubstitutionApplicator for () {
    fn apply(&self, selector: ComponentSelector) -> ComponentSelector {
        selector
    }
}

/// Drops edges up front, before they ever reach selection.
pub trait EdgeFilter {
    fn excludes(&self, declaration: &crate::graph::DependencyDeclaration) -> bool;
}

impl EdgeFilter for () {
    fn excludes(&self, _declaration: &crate::graph::DependencyDeclaration) -> bool {
        false
    }
}

/// A bounded parallel executor for the metadata-prefetch fan-out (spec.md §4.1 step 2, §5).
/// Exposed as an interface so tests can run it in-thread deterministically (spec.md §9).
pub trait BuildOperationQueue {
    fn run_all(&self, tasks: Vec<Box<dyn FnOnce() + Send>>);
}

/// Runs every task sequentially on the calling thread. Deterministic; used by tests and for the
/// single-edge case that spec.md §4.1 says should stay serial.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineOperationQueue;

impl BuildOperationQueue for InlineOperationQueue {
    fn run_all(&self, tasks: Vec<Box<dyn FnOnce() + Send>>) {
        for task in tasks {
            task();
        }
    }
}

/// Runs tasks on scoped threads and joins before returning. No thread-pool dependency: a resolve
/// only ever has as many in-flight prefetches as there are edges in one node's dependency set, so
/// one thread per task is fine.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadScopedOperationQueue;

impl BuildOperationQueue for ThreadScopedOperationQueue {
    fn run_all(&self, tasks: Vec<Box<dyn FnOnce() + Send>>) {
        if tasks.len() <= 1 {
            for task in tasks {
                task();
            }
            return;
        }
        std::thread::scope(|scope| {
            for task in tasks {
                scope.spawn(task);
            }
        });
    }
}

/// Output sink for the assembled graph (spec.md §4.6).
pub trait DependencyGraphVisitor {
    fn start(&mut self, root: ComponentId);
    fn visit_selector(&mut self, selector: &crate::selector::SelectorState);
    fn visit_node(&mut self, node: &crate::graph::NodeState);
    fn visit_edges(&mut self, node: &crate::graph::NodeState, edges: &[&crate::graph::EdgeState]);
    fn finish(&mut self, root: ComponentId);
}

/// A capability registered for conflict detection, alongside the component declaring it.
#[derive(Debug, Clone)]
pub struct CapabilityDeclaration {
    pub capability: Capability,
    pub component: ComponentId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ArenaId;
    use crate::version::Version;

    #[test]
    fn default_attribute_matcher_falls_back_to_first() {
        let meta = ComponentMetadata {
            configurations: vec![crate::graph::ConfigurationMetadata {
                name: "compile".into(),
                dependencies: vec![],
                capabilities: vec![],
            }],
        };
        let matcher = DefaultAttributeMatcher;
        assert_eq!(matcher.select(&meta, None).unwrap().name, "compile");
        assert!(matcher.select(&meta, Some("missing")).is_none());
    }

    #[test]
    fn highest_version_wins_picks_max() {
        let mut resolver = HighestVersionWins;
        let low = ComponentIdResolveResult {
            component: ComponentId::from_usize(0),
            version: Version::parse("1.0.0").unwrap(),
        };
        let high = ComponentIdResolveResult {
            component: ComponentId::from_usize(1),
            version: Version::parse("2.0.0").unwrap(),
        };
        let chosen = ModuleConflictResolver::select(&mut resolver, &[low, high]).unwrap();
        assert_eq!(chosen, ComponentId::from_usize(1));
    }

    #[test]
    fn module_replacements_round_trip() {
        let mut data = ModuleReplacementsData::new();
        let from = ModuleId::new("g", "old");
        let to = ModuleId::new("g", "new");
        data.replace(from.clone(), to.clone());
        assert_eq!(data.replacement_for(&from), Some(&to));
        assert_eq!(data.replacement_for(&to), None);
    }

    #[test]
    fn inline_queue_runs_in_order() {
        use std::sync::{Arc, Mutex};
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = log.clone();
        let b = log.clone();
        let queue = InlineOperationQueue;
        queue.run_all(vec![
            Box::new(move || a.lock().unwrap().push(1)),
            Box::new(move || b.lock().unwrap().push(2)),
        ]);
        assert_eq!(*log.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn thread_scoped_queue_runs_every_task() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;
        let counter = Arc::new(AtomicUsize::new(0));
        let queue = ThreadScopedOperationQueue;
        let tasks: Vec<Box<dyn FnOnce() + Send>> = (0..4)
            .map(|_| {
                let counter = counter.clone();
                Box::new(move || { counter.fetch_add(1, Ordering::SeqCst); }) as Box<dyn FnOnce() + Send>
            })
            .collect();
        queue.run_all(tasks);
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }
}
