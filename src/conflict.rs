//! Batched conflict queues (spec.md §4.4).
//!
//! Both handlers share the same shape: candidates accumulate under a key as the traversal
//! discovers them, and nothing is resolved until `resolveNextConflict` pops one batch and hands
//! it to a pluggable resolver. Batching lets a single module conflict be detected once even
//! though dozens of edges may point at it.

use std::collections::HashMap;

use crate::graph::Capability;
use crate::ids::ComponentId;
use crate::module::ModuleId;
use crate::selector::{ComponentIdResolveResult, IdResolveFailure};

/// A conflict waiting to be resolved: the key it was registered under, and every candidate seen
/// so far.
#[derive(Debug, Clone)]
pub struct PotentialConflict<K, C> {
    pub key: K,
    pub candidates: Vec<C>,
}

/// Queues module-version candidates per module and resolves them in registration order.
///
/// A module only ever has one conflict in flight: subsequent `registerCandidate` calls for an
/// already-queued module just extend its candidate list (spec.md §4.4, "registerCandidate(x)
/// returns a PotentialConflict").
#[derive(Default)]
pub struct ModuleConflictHandler {
    queue: Vec<ModuleId>,
    candidates: HashMap<ModuleId, Vec<ComponentIdResolveResult>>,
    /// Modules already resolved once; re-registering one triggers a restart rather than a second
    /// queue entry (spec.md design notes on `restart`).
    resolved: HashMap<ModuleId, ComponentId>,
}

impl ModuleConflictHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a candidate for `module`. Returns the full set of candidates registered so far if
    /// there is more than one distinct component — i.e. a real conflict exists.
    pub fn register_candidate(
        &mut self,
        module: ModuleId,
        candidate: ComponentIdResolveResult,
    ) -> Option<PotentialConflict<ModuleId, ComponentIdResolveResult>> {
        let bucket = self.candidates.entry(module.clone()).or_default();
        if !bucket.iter().any(|c| c.component == candidate.component) {
            bucket.push(candidate);
        }
        if !self.queue.contains(&module) {
            self.queue.push(module.clone());
        }

        if bucket.len() > 1 {
            Some(PotentialConflict {
                key: module,
                candidates: bucket.clone(),
            })
        } else {
            None
        }
    }

    pub fn conflict_exists(&self, module: &ModuleId) -> bool {
        self.candidates.get(module).is_some_and(|c| c.len() > 1)
    }

    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Pop the next queued module and resolve it via `replace_action`, which implements the
    /// pluggable "highest version wins" (or user-supplied) strategy.
    pub fn resolve_next_conflict(
        &mut self,
        mut replace_action: impl FnMut(&ModuleId, &[ComponentIdResolveResult]) -> Result<ComponentId, IdResolveFailure>,
    ) -> Option<Result<(ModuleId, ComponentId), (ModuleId, IdResolveFailure)>> {
        let module = self.queue.pop()?;
        let candidates = self.candidates.get(&module).cloned().unwrap_or_default();
        match replace_action(&module, &candidates) {
            Ok(winner) => {
                self.resolved.insert(module.clone(), winner);
                Some(Ok((module, winner)))
            }
            Err(failure) => Some(Err((module, failure))),
        }
    }

    pub fn previous_resolution(&self, module: &ModuleId) -> Option<ComponentId> {
        self.resolved.get(module).copied()
    }
}

/// Queues capability collisions: more than one component declaring the same `(group, name)`
/// capability.
#[derive(Default)]
pub struct CapabilitiesConflictHandler {
    queue: Vec<Capability>,
    providers: HashMap<Capability, Vec<ComponentId>>,
}

impl CapabilitiesConflictHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_candidate(
        &mut self,
        capability: Capability,
        provider: ComponentId,
    ) -> Option<PotentialConflict<Capability, ComponentId>> {
        let bucket = self.providers.entry(capability.clone()).or_default();
        if !bucket.contains(&provider) {
            bucket.push(provider);
        }
        if !self.queue.contains(&capability) {
            self.queue.push(capability.clone());
        }

        if bucket.len() > 1 {
            Some(PotentialConflict {
                key: capability,
                candidates: bucket.clone(),
            })
        } else {
            None
        }
    }

    pub fn conflict_exists(&self, capability: &Capability) -> bool {
        self.providers.get(capability).is_some_and(|p| p.len() > 1)
    }

    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn resolve_next_conflict(
        &mut self,
        mut replace_action: impl FnMut(&Capability, &[ComponentId]) -> Result<ComponentId, IdResolveFailure>,
    ) -> Option<Result<(Capability, ComponentId), (Capability, IdResolveFailure)>> {
        let capability = self.queue.pop()?;
        let providers = self.providers.get(&capability).cloned().unwrap_or_default();
        match replace_action(&capability, &providers) {
            Ok(winner) => Some(Ok((capability, winner))),
            Err(failure) => Some(Err((capability, failure))),
        }
    }
}
