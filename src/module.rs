//! Module identity and per-module resolution state.

use std::fmt;

use crate::ids::{ComponentId, EdgeId, SelectorId};
use crate::selector::SelectorStateResolverResults;
use crate::version::Version;

/// A module's identity: `(group, name)`. May have many versions across the graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId {
    pub group: String,
    pub name: String,
}

impl ModuleId {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.name)
    }
}

/// A specific version of a module: `(group, name, version)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleVersionId {
    pub module: ModuleId,
    pub version: Version,
}

impl fmt::Display for ModuleVersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.version)
    }
}

/// One per target module identity. Owns the set of known versions, the selectors that target
/// this module, and the currently selected component, if any.
///
/// Created on first reference and never destroyed for the lifetime of a resolve — `restart` and
/// conflict resolution replace `selected`, they never tear the module down, since edges elsewhere
/// in the graph keep pointing at `SelectorState`s which keep pointing at this module by id.
pub struct ModuleResolveState {
    pub id: ModuleId,
    /// Known component versions for this module, in the order they were first selected.
    pub versions: Vec<ComponentId>,
    /// Selectors declared against this module by any edge in the graph.
    pub selectors: Vec<SelectorId>,
    pub selected: Option<ComponentId>,
    /// Edges that targeted this module before a restart tore down the previous selection, and
    /// need to be re-attached to whatever gets selected next.
    pub unattached_edges: Vec<EdgeId>,
    pub cache: SelectorStateResolverResults,
}

impl ModuleResolveState {
    pub fn new(id: ModuleId) -> Self {
        Self {
            id,
            versions: Vec::new(),
            selectors: Vec::new(),
            selected: None,
            unattached_edges: Vec::new(),
            cache: SelectorStateResolverResults::new(),
        }
    }

    pub fn register_version(&mut self, component: ComponentId) {
        if !self.versions.contains(&component) {
            self.versions.push(component);
        }
    }

    pub fn register_selector(&mut self, selector: SelectorId) {
        if !self.selectors.contains(&selector) {
            self.selectors.push(selector);
        }
    }

    /// Replace the current selection outright (used by restart and conflict resolution). Returns
    /// the previous selection, if any, so the caller can deselect its subtree.
    pub fn select(&mut self, component: ComponentId) -> Option<ComponentId> {
        self.register_version(component);
        self.selected.replace(component)
    }

    pub fn restart(&mut self, component: ComponentId) -> Option<ComponentId> {
        self.select(component)
    }
}
