//! The resolve loop: node queue draining, per-edge selection, conflict resolution, and final
//! graph assembly (spec.md §4.1, §4.3, §4.5, §4.6).

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tracing::{debug, instrument, trace, warn};

use crate::conflict::{CapabilitiesConflictHandler, ModuleConflictHandler};
use crate::error::ResolveError;
use crate::external::{
    AttributeMatcher, BuildOperationQueue, CapabilitiesConflictResolver, ComponentKey,
    ComponentSelector, ContextResolver, DependencyGraphVisitor, DependencySubstitutionApplicator,
    EdgeFilter, IdResolver, MetadataResolver, ModuleConflictResolver, ModuleReplacementsData,
};
use crate::graph::{Capability, ComponentMetadata, ComponentState, EdgeState, NodeState};
use crate::ids::{Arena, ArenaId, ComponentId, EdgeId, NodeId, SelectorId};
use crate::module::{ModuleId, ModuleResolveState};
use crate::selector::{ComponentIdResolveResult, IdResolveFailure, SelectorState};
use crate::version::Version;

/// Everything the core traversal needs from the outside world, gathered into one bundle so
/// `ResolveState::new` doesn't take a dozen separate parameters.
///
/// `metadata_resolver` is shared behind `Arc<Mutex<_>>` rather than owned outright: the prefetch
/// fan-out in `resolve_edges` hands clones of it to the tasks `operation_queue.run_all` runs on
/// scoped threads (spec.md §5).
pub struct ResolveCollaborators {
    pub context_resolver: Box<dyn ContextResolver>,
    pub id_resolver: Box<dyn IdResolver>,
    pub metadata_resolver: Arc<Mutex<Box<dyn MetadataResolver>>>,
    pub attribute_matcher: Box<dyn AttributeMatcher>,
    pub module_conflict_resolver: Box<dyn ModuleConflictResolver>,
    pub capabilities_conflict_resolver: Box<dyn CapabilitiesConflictResolver>,
    pub module_replacements: ModuleReplacementsData,
    pub substitutions: Box<dyn DependencySubstitutionApplicator>,
    pub edge_filter: Box<dyn EdgeFilter>,
    pub operation_queue: Box<dyn BuildOperationQueue>,
}

/// The graph produced by a successful resolve: every selected component, in dependency-first
/// topological order, rooted at `root` (spec.md §4.6).
pub struct ResolvedGraph {
    pub root: ComponentId,
    pub order: Vec<ComponentId>,
}

/// Outcome of resolving one edge's selector against its target module: either a component to
/// attach, or a failure to record on the edge. Kept distinct from a hard `ResolveError` so
/// ordinary per-edge id-resolution misses (recorded, non-aborting) don't have to share a `Result`
/// arm with the genuinely fatal `ModuleConflictResolver` failure (spec.md §4.3, §7).
enum SelectionOutcome {
    Component(ComponentId),
    Failed(IdResolveFailure),
}

/// Mutable state for one resolve. Single-threaded except for the metadata prefetch phase inside
/// `resolve_edges`, which is allowed to fan out through `operation_queue` (spec.md §5).
pub struct ResolveState {
    modules: HashMap<ModuleId, ModuleResolveState>,
    components: Arena<ComponentId, ComponentState>,
    nodes: Arena<NodeId, NodeState>,
    edges: Arena<EdgeId, EdgeState>,
    selectors: Arena<SelectorId, SelectorState>,
    component_keys: HashMap<ComponentKey, ComponentId>,
    queue: VecDeque<NodeId>,
    module_conflicts: ModuleConflictHandler,
    capability_conflicts: CapabilitiesConflictHandler,
    capability_providers: HashMap<Capability, ComponentId>,
    collaborators: ResolveCollaborators,
}

/// Looks up (creating if absent) the module entry for `id`. A free function over an explicit
/// `&mut HashMap` rather than a `&mut self` method, so callers can borrow `modules` mutably and
/// another field of `ResolveState` (e.g. `components`) immutably in the same expression.
fn module_entry<'a>(
    modules: &'a mut HashMap<ModuleId, ModuleResolveState>,
    id: &ModuleId,
) -> &'a mut ModuleResolveState {
    modules.entry(id.clone()).or_insert_with(|| ModuleResolveState::new(id.clone()))
}

fn version_of(components: &Arena<ComponentId, ComponentState>, id: ComponentId) -> Version {
    components
        .get(id)
        .module_version
        .as_ref()
        .map(|mv| mv.version.clone())
        .unwrap_or_else(|| Version::new(0, 0, 0))
}

impl ResolveState {
    pub fn new(collaborators: ResolveCollaborators) -> Self {
        Self {
            modules: HashMap::new(),
            components: Arena::new(),
            nodes: Arena::new(),
            edges: Arena::new(),
            selectors: Arena::new(),
            component_keys: HashMap::new(),
            queue: VecDeque::new(),
            module_conflicts: ModuleConflictHandler::new(),
            capability_conflicts: CapabilitiesConflictHandler::new(),
            capability_providers: HashMap::new(),
            collaborators,
        }
    }

    /// Interns an externally-opaque component key into a stable arena id, creating the
    /// `ComponentState` on first sight (spec.md §3: component ids are assigned once, never
    /// reassigned).
    fn get_or_create_component(
        &mut self,
        key: ComponentKey,
        module_version: Option<crate::module::ModuleVersionId>,
    ) -> ComponentId {
        if let Some(existing) = self.component_keys.get(&key) {
            return *existing;
        }
        let id = self.components.insert(ComponentState::new(ComponentId::from_usize(0), module_version));
        self.components.get_mut(id).id = id;
        self.component_keys.insert(key, id);
        id
    }

    /// Runs the whole resolve: root resolution, queue drain, conflict resolution, validation, and
    /// consumer-first assembly.
    #[instrument(skip(self, visitor))]
    pub fn resolve(&mut self, visitor: &mut dyn DependencyGraphVisitor) -> Result<ResolvedGraph, ResolveError> {
        let root = self.resolve_root()?;
        let root_node = self.components.get(root).nodes[0];
        self.queue.push_back(root_node);

        // Node expansion always runs to quiescence before a conflict is resolved, so a module
        // sees every competing selector that's reachable before anything restarts (spec.md §4.1:
        // "node-first, conflicts-batched").
        loop {
            if let Some(node_id) = self.queue.pop_front() {
                self.resolve_node(node_id)?;
            } else if self.module_conflicts.has_pending() {
                self.resolve_one_module_conflict()?;
            } else if self.capability_conflicts.has_pending() {
                self.resolve_one_capability_conflict();
            } else {
                break;
            }
        }

        self.validate_graph()?;
        let order = self.assemble_result(root, visitor);
        Ok(ResolvedGraph { root, order })
    }

    fn resolve_root(&mut self) -> Result<ComponentId, ResolveError> {
        let resolved = self.collaborators.context_resolver.resolve();
        let (key, module_version, metadata) = resolved.map_err(|failure| ResolveError::IdResolveFailure {
            module: ModuleId::new("<root>", "<root>"),
            source: anyhow::anyhow!(failure.message),
        })?;

        let module = module_version.module.clone();
        let root = self.get_or_create_component(key, Some(module_version));
        {
            let component = self.components.get_mut(root);
            component.metadata = Some(metadata);
            component.root = true;
            component.selected = true;
            component.already_resolved = true;
        }
        module_entry(&mut self.modules, &module).select(root);

        let node_id = self.nodes.insert(NodeState::new(NodeId::from_usize(0), root, "default"));
        self.nodes.get_mut(node_id).id = node_id;
        self.components.get_mut(root).nodes.push(node_id);

        debug!(component = %root, "root resolved");
        Ok(root)
    }

    /// Enumerate a node's declared dependencies into edges/selectors, then run the
    /// selection → metadata-prefetch → attachment pipeline over them (spec.md §4.1 step 2).
    fn resolve_node(&mut self, node_id: NodeId) -> Result<(), ResolveError> {
        if !self.nodes.get(node_id).selected {
            trace!(node = %node_id, "skipping deselected node");
            return Ok(());
        }

        self.register_capabilities(node_id);
        self.nodes.get_mut(node_id).pending_deps = true;
        let component_id = self.nodes.get(node_id).component;
        let config_name = self.nodes.get(node_id).configuration.clone();

        let declarations = {
            let component = self.components.get(component_id);
            let requested = if config_name.is_empty() { None } else { Some(config_name.as_str()) };
            component
                .metadata
                .as_ref()
                .and_then(|m| self.collaborators.attribute_matcher.select(m, requested))
                .map(|c| c.dependencies.clone())
                .unwrap_or_default()
        };

        let mut new_edges = Vec::new();
        for declaration in declarations {
            if self.collaborators.edge_filter.excludes(&declaration) {
                continue;
            }
            let target_module = self
                .collaborators
                .module_replacements
                .replacement_for(&declaration.target_module)
                .cloned()
                .unwrap_or(declaration.target_module.clone());

            let selector_id = self.selectors.insert(SelectorState::new(
                SelectorId::from_usize(0),
                target_module.clone(),
                declaration.constraint.clone(),
            ));
            self.selectors.get_mut(selector_id).id = selector_id;
            module_entry(&mut self.modules, &target_module).register_selector(selector_id);

            let edge_id = self.edges.insert(EdgeState::new(EdgeId::from_usize(0), node_id, selector_id));
            self.edges.get_mut(edge_id).id = edge_id;
            self.nodes.get_mut(node_id).outgoing.push(edge_id);
            new_edges.push(edge_id);
        }

        self.resolve_edges(new_edges)?;
        self.nodes.get_mut(node_id).pending_deps = false;
        Ok(())
    }

    /// Three-phase pipeline: (1) serial selection of a target component per edge, (2) metadata
    /// prefetch for edges whose target isn't cheap to fetch, fanned out through the external
    /// `BuildOperationQueue` when more than one qualifies, (3) serial attachment of the resulting
    /// nodes back onto the graph (spec.md §4.1 step 2, §5).
    fn resolve_edges(&mut self, edge_ids: Vec<EdgeId>) -> Result<(), ResolveError> {
        let mut selected: Vec<(EdgeId, ComponentId)> = Vec::new();
        for edge_id in &edge_ids {
            match self.perform_selection(*edge_id)? {
                SelectionOutcome::Component(component) => selected.push((*edge_id, component)),
                SelectionOutcome::Failed(failure) => self.edges.get_mut(*edge_id).fail(failure),
            }
        }

        let to_fetch: Vec<ComponentId> = selected
            .iter()
            .map(|(_, c)| *c)
            .filter(|c| {
                let component = self.components.get(*c);
                if !component.selected {
                    return false;
                }
                let cheap = match self.external_key_for(*c) {
                    Some(key) => self
                        .collaborators
                        .metadata_resolver
                        .lock()
                        .expect("metadata resolver lock poisoned")
                        .is_fetching_metadata_cheap(&key),
                    None => false,
                };
                !component.is_fetching_metadata_cheap(cheap)
            })
            .collect();

        self.prefetch_metadata(&to_fetch);

        for (edge_id, component) in selected {
            self.attach_edge(edge_id, component);
        }
        Ok(())
    }

    /// A single qualifying component is fetched on the calling thread; more than one is submitted
    /// as independent tasks to the external `BuildOperationQueue` and awaited together (spec.md
    /// §4.1 step 2, §5).
    fn prefetch_metadata(&mut self, components: &[ComponentId]) {
        if components.len() <= 1 {
            for &component in components {
                if let Err(err) = self.fetch_metadata(component) {
                    warn!(component = %component, error = %err, "metadata fetch failed");
                }
            }
            return;
        }

        let results: Arc<Mutex<HashMap<ComponentId, Result<ComponentMetadata, IdResolveFailure>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let mut tasks: Vec<Box<dyn FnOnce() + Send>> = Vec::new();
        for &component in components {
            let Some(key) = self.external_key_for(component) else {
                continue;
            };
            let resolver = self.collaborators.metadata_resolver.clone();
            let results = results.clone();
            tasks.push(Box::new(move || {
                let outcome = resolver.lock().expect("metadata resolver lock poisoned").resolve(&key);
                results.lock().expect("results lock poisoned").insert(component, outcome);
            }));
        }

        self.collaborators.operation_queue.run_all(tasks);

        let results = Arc::try_unwrap(results)
            .map(|m| m.into_inner().expect("results lock poisoned"))
            .unwrap_or_default();
        for (component, outcome) in results {
            match outcome {
                Ok(metadata) => {
                    self.components.get_mut(component).metadata = Some(metadata);
                    self.components.get_mut(component).already_resolved = true;
                }
                Err(failure) => warn!(component = %component, error = %failure, "metadata fetch failed"),
            }
        }
    }

    fn external_key_for(&self, component: ComponentId) -> Option<ComponentKey> {
        self.component_keys.iter().find(|(_, v)| **v == component).map(|(k, _)| k.clone())
    }

    fn fetch_metadata(&mut self, component: ComponentId) -> Result<(), ResolveError> {
        let key = self.external_key_for(component).ok_or_else(|| ResolveError::MetadataResolveFailure {
            component: component.to_string(),
            source: anyhow::anyhow!("no external key for component"),
        })?;

        let outcome = self.collaborators.metadata_resolver.lock().expect("metadata resolver lock poisoned").resolve(&key);
        match outcome {
            Ok(metadata) => {
                self.components.get_mut(component).metadata = Some(metadata);
                self.components.get_mut(component).already_resolved = true;
                Ok(())
            }
            Err(failure) => Err(ResolveError::MetadataResolveFailure {
                component: component.to_string(),
                source: anyhow::anyhow!(failure.message),
            }),
        }
    }

    /// `performSelection` (spec.md §4.3): short-circuit if the selector already started, else
    /// resolve it to a candidate and reconcile that candidate against the module's current
    /// winner via `chooseBest`.
    fn perform_selection(&mut self, edge_id: EdgeId) -> Result<SelectionOutcome, ResolveError> {
        let selector_id = self.edges.get(edge_id).selector;

        if let Some(selected) = self.selectors.get(selector_id).selected {
            self.edges.get_mut(edge_id).start(selected);
            return Ok(SelectionOutcome::Component(selected));
        }

        let target_module = self.selectors.get(selector_id).target_module.clone();

        let resolved = self.resolve_selector(&target_module, selector_id);
        self.selectors.get_mut(selector_id).cached_result = Some(resolved.clone());
        let outcome = match resolved {
            Ok(outcome) => outcome,
            Err(failure) => return Ok(SelectionOutcome::Failed(failure)),
        };
        let candidate = outcome.component;
        let current = self.modules.get(&target_module).and_then(|m| m.selected);

        self.edges.get_mut(edge_id).start(candidate);
        self.selectors.get_mut(selector_id).select(candidate);
        self.components.get_mut(candidate).add_selected_by(selector_id);

        if let Some(conflict) = self.module_conflicts.register_candidate(target_module.clone(), outcome.clone()) {
            trace!(module = %target_module, candidates = conflict.candidates.len(), "module conflict registered");
        }

        let Some(current) = current else {
            if !self.module_conflicts.conflict_exists(&target_module) {
                module_entry(&mut self.modules, &target_module).select(candidate);
                self.components.get_mut(candidate).selected = true;
            }
            return Ok(SelectionOutcome::Component(candidate));
        };

        let current_version = version_of(&self.components, current);
        let chosen =
            self.choose_best(&target_module, selector_id, current, &current_version, candidate, &outcome.version)?;

        if chosen == current {
            self.edges.get_mut(edge_id).start(current);
            self.selectors.get_mut(selector_id).select(current);
            self.maybe_mark_rejected(&target_module, current, &current_version);
            return Ok(SelectionOutcome::Component(current));
        }

        self.restart_module(&target_module, candidate);
        self.maybe_mark_rejected(&target_module, candidate, &outcome.version);
        Ok(SelectionOutcome::Component(candidate))
    }

    /// `r = selector.resolve()` (spec.md §4.2/§4.3): reuse a cached result that this selector's
    /// preferred constraint can short-circuit to, otherwise resolve a fresh id through the
    /// external resolver and cache it.
    fn resolve_selector(
        &mut self,
        module_id: &ModuleId,
        selector_id: SelectorId,
    ) -> Result<ComponentIdResolveResult, IdResolveFailure> {
        let (force, preferred, constraint) = {
            let dep = self.selectors.get(selector_id);
            (dep.is_force(), dep.preferred().cloned(), dep.constraint.clone())
        };

        let cached = self.modules.get(module_id).and_then(|m| {
            m.cache.already_have_resolution(preferred.as_ref(), |id| version_of(&self.components, id))
        });

        if let Some(outcome) = cached {
            module_entry(&mut self.modules, module_id).cache.register_resolution(
                selector_id,
                force,
                preferred,
                outcome.clone(),
                |id| version_of(&self.components, id),
            );
            return outcome;
        }

        let external_selector = ComponentSelector {
            module: module_id.clone(),
            constraint,
            component_selector: None,
        };
        let external_selector = self.collaborators.substitutions.apply(external_selector);

        let resolved = self.collaborators.id_resolver.resolve(&external_selector);
        let outcome: Result<ComponentIdResolveResult, IdResolveFailure> = match (resolved.key, resolved.module_version) {
            (Some(key), Some(module_version)) => {
                let version = module_version.version.clone();
                let component = self.get_or_create_component(key, Some(module_version));
                if let Some(metadata) = resolved.metadata {
                    self.components.get_mut(component).metadata = Some(metadata);
                    self.components.get_mut(component).already_resolved = true;
                }
                Ok(ComponentIdResolveResult { component, version })
            }
            _ => Err(resolved.failure.unwrap_or(IdResolveFailure { message: "id resolver returned no result".into() })),
        };

        module_entry(&mut self.modules, module_id).cache.register_resolution(
            selector_id,
            force,
            preferred,
            outcome.clone(),
            |id| version_of(&self.components, id),
        );

        outcome
    }

    /// `chooseBest` (spec.md §4.3.1): decide whether a module's existing selection should be
    /// kept or replaced by a freshly resolved candidate for one edge's selector.
    ///
    /// Step order follows the spec literally: (1) trivial if the two are already the same
    /// component, (2) keep the current selection if the selector being resolved itself agrees
    /// with it, (3) take the candidate if every *other* selector on the module (excluding ones
    /// that already resolved to the candidate) either has no preference or agrees with it and
    /// none of them reject it, (4) otherwise defer to the pluggable conflict resolver, whose
    /// failure is fatal rather than recorded per edge.
    fn choose_best(
        &mut self,
        module_id: &ModuleId,
        selector_id: SelectorId,
        current: ComponentId,
        current_version: &Version,
        candidate: ComponentId,
        candidate_version: &Version,
    ) -> Result<ComponentId, ResolveError> {
        if current == candidate {
            return Ok(current);
        }

        if self.selectors.get(selector_id).constraint.agrees_with(current_version) {
            return Ok(current);
        }

        let module_selectors = self.modules.get(module_id).map(|m| m.selectors.clone()).unwrap_or_default();
        let already_selected_by_candidate = self.components.get(candidate).selected_by.clone();
        let consulted: Vec<SelectorId> =
            module_selectors.into_iter().filter(|id| !already_selected_by_candidate.contains(id)).collect();

        let all_agree = !consulted.is_empty()
            && consulted.iter().all(|id| {
                let constraint = &self.selectors.get(*id).constraint;
                let agrees = constraint.preferred.is_none() || constraint.agrees_with(candidate_version);
                agrees && !constraint.rejects(candidate_version)
            });

        if all_agree {
            return Ok(candidate);
        }

        let current_result = ComponentIdResolveResult { component: current, version: current_version.clone() };
        let candidate_result = ComponentIdResolveResult { component: candidate, version: candidate_version.clone() };
        self.collaborators.module_conflict_resolver.select(&[current_result, candidate_result]).map_err(|failure| {
            ResolveError::ConflictResolverFailure { module: module_id.clone(), source: anyhow::anyhow!(failure.message) }
        })
    }

    /// `maybeMarkRejected` (spec.md §4.3.2): if any selector targeting this module declares a
    /// rejected range that matches the version just chosen, mark the component rejected so
    /// `validateGraph` can catch a selection that turns out to be invalid. Already-rejected
    /// components are skipped.
    fn maybe_mark_rejected(&mut self, module_id: &ModuleId, component: ComponentId, version: &Version) {
        if self.components.get(component).rejected {
            return;
        }
        let is_rejected = self.modules.get(module_id).is_some_and(|module| {
            module.selectors.iter().any(|sel_id| self.selectors.get(*sel_id).constraint.rejects(version))
        });
        if is_rejected {
            self.components.get_mut(component).rejected = true;
        }
    }

    /// Pop and resolve one queued module conflict, restarting the affected module's subtree when
    /// the winner differs from the previous selection (spec.md §4.4).
    fn resolve_one_module_conflict(&mut self) -> Result<(), ResolveError> {
        let resolver = &mut self.collaborators.module_conflict_resolver;
        let outcome = self.module_conflicts.resolve_next_conflict(|_module, candidates| resolver.select(candidates));
        match outcome {
            Some(Ok((module, winner))) => {
                self.restart_module(&module, winner);
                Ok(())
            }
            Some(Err((module, failure))) => Err(ResolveError::ConflictResolverFailure {
                module,
                source: anyhow::anyhow!(failure.message),
            }),
            None => Ok(()),
        }
    }

    /// Pop and resolve one queued capability conflict. Losing providers are deselected: a
    /// capability conflict only exists once concrete versions are chosen, so "the winner provides
    /// this capability" means every other provider's subtree is pruned the same way a losing
    /// module candidate is (spec.md §4.4).
    fn resolve_one_capability_conflict(&mut self) {
        let resolver = &mut self.collaborators.capabilities_conflict_resolver;
        let mut providers = Vec::new();
        let outcome = self.capability_conflicts.resolve_next_conflict(|_cap, candidates| {
            providers = candidates.to_vec();
            resolver.select(candidates)
        });
        if let Some(Ok((capability, winner))) = outcome {
            self.capability_providers.insert(capability, winner);
            for loser in providers {
                if loser != winner {
                    self.deselect_component(loser);
                }
            }
        }
    }

    /// `registerCapabilities` (spec.md §4.1, §4.4): for each capability the node's configuration
    /// declares, register it against the conflict handler, pre-seeding the provider list with any
    /// module whose own `(group, name)` identity matches the capability — a module implicitly
    /// provides a capability shaped like its own identity.
    fn register_capabilities(&mut self, node_id: NodeId) {
        let component_id = self.nodes.get(node_id).component;
        let config_name = self.nodes.get(node_id).configuration.clone();
        let capabilities = {
            let component = self.components.get(component_id);
            let requested = if config_name.is_empty() { None } else { Some(config_name.as_str()) };
            component
                .metadata
                .as_ref()
                .and_then(|m| self.collaborators.attribute_matcher.select(m, requested))
                .map(|c| c.capabilities.clone())
                .unwrap_or_default()
        };

        for capability in capabilities {
            let implicit_module = ModuleId::new(capability.group.clone(), capability.name.clone());
            if let Some(implicit) = self.modules.get(&implicit_module).and_then(|m| m.selected) {
                if implicit != component_id {
                    self.capability_conflicts.register_candidate(capability.clone(), implicit);
                }
            }
            if let Some(conflict) = self.capability_conflicts.register_candidate(capability.clone(), component_id) {
                trace!(capability = %capability.name, providers = conflict.candidates.len(), "capability conflict registered");
            }
        }
    }

    /// Replace a module's selection, deselect the loser's subtree, and re-enqueue the winner's
    /// configuration so outgoing edges get (re-)attached. `restart` is idempotent: if the winner
    /// is already the current selection (a conflict resolver re-confirming the status quo), this
    /// is a no-op, per the design note that `start`/`restart` must tolerate being called more than
    /// once for the same target.
    fn restart_module(&mut self, module: &ModuleId, winner: ComponentId) {
        let previous = module_entry(&mut self.modules, module).restart(winner);
        if previous == Some(winner) {
            return;
        }
        if let Some(loser) = previous {
            self.deselect_component(loser);
            // Every edge still pointing at the old selection gets re-attached to the winner, the
            // way `unattached_edges` is named for in `ModuleResolveState` — a restart doesn't
            // leave dangling edges behind.
            let affected: Vec<EdgeId> = self
                .edges
                .ids()
                .filter(|id| self.edges.get(*id).target == Some(loser))
                .collect();
            for edge_id in affected {
                self.attach_edge(edge_id, winner);
            }
        }

        self.components.get_mut(winner).selected = true;
        if self.components.get(winner).nodes.is_empty() {
            let node_id = self.nodes.insert(NodeState::new(NodeId::from_usize(0), winner, "default"));
            self.nodes.get_mut(node_id).id = node_id;
            self.components.get_mut(winner).nodes.push(node_id);
            self.queue.push_back(node_id);
        }
    }

    fn deselect_component(&mut self, component: ComponentId) {
        self.components.get_mut(component).selected = false;
        let nodes = self.components.get(component).nodes.clone();
        for node in nodes {
            self.nodes.get_mut(node).selected = false;
        }
    }

    fn attach_edge(&mut self, edge_id: EdgeId, component: ComponentId) {
        self.edges.get_mut(edge_id).start(component);
        if self.components.get(component).nodes.is_empty() {
            let node_id = self.nodes.insert(NodeState::new(NodeId::from_usize(0), component, "default"));
            self.nodes.get_mut(node_id).id = node_id;
            self.components.get_mut(component).nodes.push(node_id);
            self.queue.push_back(node_id);
        }
        for node in self.components.get(component).nodes.clone() {
            self.nodes.get_mut(node).incoming.push(edge_id);
        }
    }

    /// `validateGraph` (spec.md §4.5): a component that is both selected and rejected is a hard
    /// failure — some selector's exclusion filter ruled out exactly the version another selector
    /// forced the module to.
    fn validate_graph(&self) -> Result<(), ResolveError> {
        for (_, component) in self.components.iter() {
            if component.selected && component.rejected {
                let module = component
                    .module_version
                    .as_ref()
                    .map(|mv| mv.module.clone())
                    .unwrap_or_else(|| ModuleId::new("unknown", "unknown"));
                return Err(ResolveError::RejectedSelectionFailure {
                    module: module.clone(),
                    version: component
                        .module_version
                        .as_ref()
                        .map(|mv| mv.version.clone())
                        .unwrap_or_else(|| Version::new(0, 0, 0)),
                    by: module,
                });
            }
        }
        Ok(())
    }

    /// `assembleResult` (spec.md §4.6): `start`, then `visitSelector` for every selector, then
    /// `visitNode` for every selected node, then an iterative postorder DFS over outgoing edges
    /// with a tri-state visited marker so a dependency's own edges are reported before its
    /// consumer's (spec.md §8 S1: "A→B before root→A") and cycles terminate at a back-edge to a
    /// still-open ancestor.
    fn assemble_result(&self, root: ComponentId, visitor: &mut dyn DependencyGraphVisitor) -> Vec<ComponentId> {
        visitor.start(root);

        for selector_id in self.selectors.ids() {
            visitor.visit_selector(self.selectors.get(selector_id));
        }

        for (_, node) in self.nodes.iter() {
            if node.selected {
                visitor.visit_node(node);
            }
        }

        #[derive(Clone, Copy, PartialEq)]
        enum VisitState {
            Visiting,
            Visited,
        }

        let mut state: HashMap<ComponentId, VisitState> = HashMap::new();
        let mut order = Vec::new();
        let mut stack = vec![root];

        while let Some(&component_id) = stack.last() {
            match state.get(&component_id) {
                None => {
                    state.insert(component_id, VisitState::Visiting);
                    for node_id in &self.components.get(component_id).nodes {
                        let node = self.nodes.get(*node_id);
                        if !node.selected {
                            continue;
                        }
                        for edge_id in &node.outgoing {
                            if let Some(target) = self.edges.get(*edge_id).target {
                                if state.get(&target).is_none() {
                                    stack.push(target);
                                }
                            }
                        }
                    }
                }
                Some(VisitState::Visiting) => {
                    state.insert(component_id, VisitState::Visited);
                    order.push(component_id);
                    self.emit_edges(component_id, visitor);
                    stack.pop();
                }
                Some(VisitState::Visited) => {
                    stack.pop();
                }
            }
        }

        visitor.finish(root);
        order
    }

    fn emit_edges(&self, component_id: ComponentId, visitor: &mut dyn DependencyGraphVisitor) {
        let component = self.components.get(component_id);
        for node_id in &component.nodes {
            let node = self.nodes.get(*node_id);
            if !node.selected {
                continue;
            }
            let edges: Vec<&EdgeState> = node.outgoing.iter().map(|e| self.edges.get(*e)).collect();
            visitor.visit_edges(node, &edges);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{
        DefaultAttributeMatcher, HighestVersionWins, IdResolveResult, InlineOperationQueue,
    };
    use crate::graph::{ComponentMetadata, ConfigurationMetadata, DependencyDeclaration};
    use crate::module::ModuleVersionId;
    use crate::version::{VersionConstraint, VersionSelector};

    /// A tiny fixed catalog keyed by module name, used to drive the engine end to end without a
    /// real build tool behind it.
    struct FixedCatalog {
        components: HashMap<String, (Version, ComponentMetadata)>,
    }

    struct TestIdResolver(Arc<Mutex<FixedCatalog>>);
    struct TestMetadataResolver(Arc<Mutex<FixedCatalog>>);
    struct TestContextResolver {
        root_metadata: ComponentMetadata,
    }

    impl IdResolver for TestIdResolver {
        fn resolve(&mut self, selector: &ComponentSelector) -> IdResolveResult {
            let catalog = self.0.lock().expect("catalog lock poisoned");
            match catalog.components.get(&selector.module.name) {
                Some((version, _)) if selector.constraint.preferred.as_ref().is_none_or(|s| s.accepts(version)) => {
                    IdResolveResult::resolved(
                        ComponentKey(format!("{}:{}", selector.module.name, version)),
                        ModuleVersionId { module: selector.module.clone(), version: version.clone() },
                    )
                }
                _ => IdResolveResult::failed(format!("no candidate for {}", selector.module)),
            }
        }
    }

    impl MetadataResolver for TestMetadataResolver {
        fn is_fetching_metadata_cheap(&self, _key: &ComponentKey) -> bool {
            true
        }

        fn resolve(&mut self, key: &ComponentKey) -> Result<ComponentMetadata, IdResolveFailure> {
            let name = key.0.split(':').next().unwrap_or_default();
            self.0
                .lock()
                .expect("catalog lock poisoned")
                .components
                .get(name)
                .map(|(_, meta)| meta.clone())
                .ok_or_else(|| IdResolveFailure { message: "unknown component".into() })
        }
    }

    impl ContextResolver for TestContextResolver {
        fn resolve(&mut self) -> Result<(ComponentKey, ModuleVersionId, ComponentMetadata), IdResolveFailure> {
            Ok((
                ComponentKey("root:1.0.0".into()),
                ModuleVersionId { module: ModuleId::new("app", "root"), version: Version::new(1, 0, 0) },
                self.root_metadata.clone(),
            ))
        }
    }

    fn leaf_metadata() -> ComponentMetadata {
        ComponentMetadata {
            configurations: vec![ConfigurationMetadata {
                name: "default".into(),
                dependencies: vec![],
                capabilities: vec![],
            }],
        }
    }

    fn collaborators(catalog: Arc<Mutex<FixedCatalog>>, root_metadata: ComponentMetadata) -> ResolveCollaborators {
        ResolveCollaborators {
            context_resolver: Box::new(TestContextResolver { root_metadata }),
            id_resolver: Box::new(TestIdResolver(catalog.clone())),
            metadata_resolver: Arc::new(Mutex::new(Box::new(TestMetadataResolver(catalog)) as Box<dyn MetadataResolver>)),
            attribute_matcher: Box::new(DefaultAttributeMatcher),
            module_conflict_resolver: Box::new(HighestVersionWins),
            capabilities_conflict_resolver: Box::new(HighestVersionWins),
            module_replacements: ModuleReplacementsData::new(),
            substitutions: Box::new(()),
            edge_filter: Box::new(()),
            operation_queue: Box::new(InlineOperationQueue),
        }
    }

    struct RecordingVisitor {
        visited: Vec<ComponentId>,
    }

    impl DependencyGraphVisitor for RecordingVisitor {
        fn start(&mut self, _root: ComponentId) {}
        fn visit_selector(&mut self, _selector: &SelectorState) {}
        fn visit_node(&mut self, node: &NodeState) {
            self.visited.push(node.component);
        }
        fn visit_edges(&mut self, _node: &NodeState, _edges: &[&EdgeState]) {}
        fn finish(&mut self, _root: ComponentId) {}
    }

    #[test]
    fn resolves_a_single_leaf_dependency() {
        let mut components = HashMap::new();
        components.insert("lib".to_string(), (Version::new(1, 0, 0), leaf_metadata()));
        let catalog = Arc::new(Mutex::new(FixedCatalog { components }));

        let root_metadata = ComponentMetadata {
            configurations: vec![ConfigurationMetadata {
                name: "default".into(),
                dependencies: vec![DependencyDeclaration {
                    target_module: ModuleId::new("app", "lib"),
                    constraint: VersionConstraint::prefer(VersionSelector::range(">=1.0.0").unwrap()),
                    target_configuration: None,
                }],
                capabilities: vec![],
            }],
        };

        let mut state = ResolveState::new(collaborators(catalog, root_metadata));
        let mut visitor = RecordingVisitor { visited: Vec::new() };
        let result = state.resolve(&mut visitor).expect("resolve should succeed");

        assert_eq!(result.order.len(), 2);
        assert_eq!(visitor.visited.len(), 2);
    }

    #[test]
    fn resolution_failure_surfaces_as_edge_failure_not_a_hard_error() {
        let catalog = Arc::new(Mutex::new(FixedCatalog { components: HashMap::new() }));
        let root_metadata = ComponentMetadata {
            configurations: vec![ConfigurationMetadata {
                name: "default".into(),
                dependencies: vec![DependencyDeclaration {
                    target_module: ModuleId::new("app", "missing"),
                    constraint: VersionConstraint::prefer(VersionSelector::Latest),
                    target_configuration: None,
                }],
                capabilities: vec![],
            }],
        };

        let mut state = ResolveState::new(collaborators(catalog, root_metadata));
        let mut visitor = RecordingVisitor { visited: Vec::new() };
        let result = state.resolve(&mut visitor).expect("a missing leaf should not abort the whole resolve");
        // Only the root was ever attached; the failed edge never produced a node.
        assert_eq!(result.order, vec![result.root]);
    }
}
