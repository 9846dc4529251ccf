//! One [`SelectorState`] per (edge → target module) declaration, and the small per-module cache
//! ([`SelectorStateResolverResults`]) of resolved results that lets a compatible new selector
//! reuse an already-picked version instead of resolving from scratch (spec.md §4.2).

use crate::ids::{ComponentId, SelectorId};
use crate::module::ModuleId;
use crate::version::{Version, VersionConstraint, VersionSelector};

/// A failed id resolution. Recorded, not thrown — spec.md §7 policy: local failures are kept
/// around so the caller can see every failure, not just the first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdResolveFailure {
    pub message: String,
}

impl std::fmt::Display for IdResolveFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for IdResolveFailure {}

/// The concrete component a selector resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentIdResolveResult {
    pub component: ComponentId,
    pub version: Version,
}

pub type SelectorResolveOutcome = Result<ComponentIdResolveResult, IdResolveFailure>;

/// Declares a constraint from one edge onto a target module.
///
/// Created once per edge declaration. `cached_result`/`selected` let re-entry into
/// `performSelection` (spec.md §4.3) skip straight to "already started" rather than relying on
/// null checks scattered across call sites, per the design notes.
pub struct SelectorState {
    pub id: SelectorId,
    pub target_module: ModuleId,
    pub constraint: VersionConstraint,
    pub cached_result: Option<SelectorResolveOutcome>,
    pub selected: Option<ComponentId>,
}

impl SelectorState {
    pub fn new(id: SelectorId, target_module: ModuleId, constraint: VersionConstraint) -> Self {
        Self {
            id,
            target_module,
            constraint,
            cached_result: None,
            selected: None,
        }
    }

    pub fn is_force(&self) -> bool {
        self.constraint.force
    }

    pub fn select(&mut self, component: ComponentId) {
        self.selected = Some(component);
    }

    pub fn preferred(&self) -> Option<&VersionSelector> {
        self.constraint.preferred.as_ref()
    }
}

struct CacheEntry {
    selector: SelectorId,
    force: bool,
    preferred: Option<VersionSelector>,
    outcome: SelectorResolveOutcome,
}

/// Per-module cache of selector → resolved-component-id results.
///
/// Order of entries is irrelevant; lookups are linear scans over a typically tiny set (one entry
/// per declared dependency edge onto the module) — small enough that a `Vec` scan beats the
/// overhead of a hash map keyed by selector id.
#[derive(Default)]
pub struct SelectorStateResolverResults {
    entries: Vec<CacheEntry>,
}

impl SelectorStateResolverResults {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// If some already-resolved selector's version is accepted by `preferred`, and `preferred` can
    /// short-circuit, return that cached result for reuse. Matching spec.md §4.2: "if any
    /// succeeded result's version is accepted by dep.preferredSelector and that selector's
    /// canShortCircuitWhenVersionAlreadyPreselected() is true".
    ///
    /// Takes the selector's fields by value rather than `&SelectorState` so callers don't need to
    /// hold a live borrow into the selector arena across this call.
    pub fn already_have_resolution(
        &self,
        preferred: Option<&VersionSelector>,
        version_of: impl Fn(ComponentId) -> Version,
    ) -> Option<SelectorResolveOutcome> {
        let preferred = preferred?;
        if !preferred.can_short_circuit_when_version_already_preselected() {
            return None;
        }
        self.entries.iter().find_map(|entry| match &entry.outcome {
            Ok(res) if preferred.accepts(&version_of(res.component)) => Some(Ok(res.clone())),
            _ => None,
        })
    }

    /// Store a selector's result, and propagate it to any other cached selector whose preferred
    /// selector also accepts the newly resolved version (spec.md §4.2: "propagates a newer
    /// compatible result to older selectors").
    pub fn register_resolution(
        &mut self,
        selector_id: SelectorId,
        force: bool,
        preferred: Option<VersionSelector>,
        outcome: SelectorResolveOutcome,
        version_of: impl Fn(ComponentId) -> Version,
    ) {
        let dep_entry = CacheEntry {
            selector: selector_id,
            force,
            preferred,
            outcome: outcome.clone(),
        };
        match self.entries.iter_mut().find(|e| e.selector == selector_id) {
            Some(slot) => *slot = dep_entry,
            None => self.entries.push(dep_entry),
        }

        if let Ok(res) = &outcome {
            let version = version_of(res.component);
            for entry in self.entries.iter_mut().filter(|e| e.selector != selector_id) {
                let reuse = entry
                    .preferred
                    .as_ref()
                    .is_some_and(|sel| {
                        sel.can_short_circuit_when_version_already_preselected()
                            && sel.accepts(&version)
                    });
                if reuse {
                    entry.outcome = Ok(res.clone());
                }
            }
        }
    }

    /// Fold every cached result into the set of distinct components this module must resolve to.
    /// A `force`d selector short-circuits to just its own component; any failure is surfaced
    /// verbatim (spec.md §4.2).
    pub fn get_resolved(&self) -> Result<Vec<ComponentId>, IdResolveFailure> {
        if let Some(forced) = self.entries.iter().find(|e| e.force) {
            return forced.outcome.clone().map(|res| vec![res.component]);
        }

        let mut distinct = Vec::new();
        for entry in &self.entries {
            match &entry.outcome {
                Ok(res) => {
                    if !distinct.contains(&res.component) {
                        distinct.push(res.component);
                    }
                }
                Err(failure) => return Err(failure.clone()),
            }
        }
        Ok(distinct)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
