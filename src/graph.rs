//! The graph entities: [`ComponentState`], [`NodeState`], [`EdgeState`] (spec.md §3), plus the
//! metadata shapes a [`crate::external::MetadataResolver`] hands back.

use crate::ids::{ComponentId, EdgeId, NodeId, SelectorId};
use crate::module::ModuleVersionId;
use crate::selector::IdResolveFailure;
use crate::version::VersionConstraint;

/// A `(group, name)` capability a component provides. Two components that declare the same
/// capability conflict (spec.md §4.4).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Capability {
    pub group: String,
    pub name: String,
}

/// One outgoing dependency declared by a configuration.
#[derive(Debug, Clone)]
pub struct DependencyDeclaration {
    pub target_module: crate::module::ModuleId,
    pub constraint: VersionConstraint,
    pub target_configuration: Option<String>,
}

/// A named configuration/variant within a component's metadata.
#[derive(Debug, Clone)]
pub struct ConfigurationMetadata {
    pub name: String,
    pub dependencies: Vec<DependencyDeclaration>,
    pub capabilities: Vec<Capability>,
}

/// Resolved metadata for a component, fetched lazily through a
/// [`MetadataResolver`](crate::external::MetadataResolver).
#[derive(Debug, Clone, Default)]
pub struct ComponentMetadata {
    pub configurations: Vec<ConfigurationMetadata>,
}

impl ComponentMetadata {
    pub fn configuration(&self, name: &str) -> Option<&ConfigurationMetadata> {
        self.configurations.iter().find(|c| c.name == name)
    }
}

/// A specific resolved version of a module, with lazily-fetched metadata.
///
/// Created on first candidate selection via `ResolveState::get_revision`; never destroyed.
/// `selected`/`rejected` flip as conflict resolution and `maybeMarkRejected` run; `selected_by`
/// always equals the live set of selectors pointing at this component (spec.md §3 invariant).
pub struct ComponentState {
    pub id: ComponentId,
    pub module_version: Option<ModuleVersionId>,
    pub metadata: Option<ComponentMetadata>,
    pub selected: bool,
    pub rejected: bool,
    pub already_resolved: bool,
    pub root: bool,
    pub nodes: Vec<NodeId>,
    pub selected_by: Vec<SelectorId>,
}

impl ComponentState {
    pub fn new(id: ComponentId, module_version: Option<ModuleVersionId>) -> Self {
        Self {
            id,
            module_version,
            metadata: None,
            selected: false,
            rejected: false,
            already_resolved: false,
            root: false,
            nodes: Vec::new(),
            selected_by: Vec::new(),
        }
    }

    pub fn is_fetching_metadata_cheap(&self, cheap: bool) -> bool {
        self.already_resolved || cheap
    }

    pub fn add_selected_by(&mut self, selector: SelectorId) {
        if !self.selected_by.contains(&selector) {
            self.selected_by.push(selector);
        }
    }

    pub fn remove_selected_by(&mut self, selector: SelectorId) {
        self.selected_by.retain(|s| *s != selector);
    }
}

/// One configuration/variant of a component participating in the graph.
///
/// Created when a component is selected and a configuration on it is reached via an edge.
/// Removed from traversal (but not from the arena) when its owning component is deselected.
pub struct NodeState {
    pub id: NodeId,
    pub component: ComponentId,
    pub configuration: String,
    pub incoming: Vec<EdgeId>,
    pub outgoing: Vec<EdgeId>,
    pub selected: bool,
    /// Set while outgoing dependencies are still being resolved; gates re-entrant visits.
    pub pending_deps: bool,
}

impl NodeState {
    pub fn new(id: NodeId, component: ComponentId, configuration: impl Into<String>) -> Self {
        Self {
            id,
            component,
            configuration: configuration.into(),
            incoming: Vec::new(),
            outgoing: Vec::new(),
            selected: true,
            pending_deps: false,
        }
    }
}

/// A dependency arrow from one node to a target module (later, a target component/configuration).
///
/// Created during outgoing enumeration; attached to the target's configurations after selection;
/// detached (target cleared) on restart so the next selection round re-attaches it.
pub struct EdgeState {
    pub id: EdgeId,
    pub source: NodeId,
    pub selector: SelectorId,
    pub target: Option<ComponentId>,
    pub filtered: bool,
    pub failure: Option<IdResolveFailure>,
}

impl EdgeState {
    pub fn new(id: EdgeId, source: NodeId, selector: SelectorId) -> Self {
        Self {
            id,
            source,
            selector,
            target: None,
            filtered: false,
            failure: None,
        }
    }

    pub fn start(&mut self, target: ComponentId) {
        self.target = Some(target);
        self.failure = None;
    }

    pub fn fail(&mut self, failure: IdResolveFailure) {
        self.target = None;
        self.failure = Some(failure);
    }

    pub fn detach(&mut self) {
        self.target = None;
    }
}
