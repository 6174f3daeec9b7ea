//! # Reference Binding
//!
//! A `ReferenceManager` tracks the candidates of one declared reference and
//! decides which of them are bound. It performs no I/O: every operation
//! returns a [`BindingDelta`] that the owning component manager applies to the
//! live instance (dynamic references) or turns into a rebind cycle (static
//! references).
//!
//! ## Ordering
//!
//! Candidates and bound services are both kept best-first: higher
//! `service.ranking` first, ties broken by the lower (older) service id.
//!
//! ## Invariants
//!
//! - `bound.len() <= cardinality.max()`
//! - `satisfied == bound.len() >= cardinality.min()`
//! - every bound token is also a candidate

use serde::Serialize;
use shared_types::{ReferenceDescription, ServiceId, ServiceToken};

/// Result of a binding operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingDelta {
    /// Newly bound services, best first.
    pub bound: Vec<ServiceToken>,
    /// Services that lost their binding.
    pub unbound: Vec<ServiceToken>,
    pub satisfied_before: bool,
    pub satisfied_after: bool,
}

impl BindingDelta {
    fn unchanged(satisfied: bool) -> Self {
        Self {
            satisfied_before: satisfied,
            satisfied_after: satisfied,
            ..Self::default()
        }
    }

    /// True if the bound set did not change.
    pub fn is_empty(&self) -> bool {
        self.bound.is_empty() && self.unbound.is_empty()
    }

    pub fn satisfaction_changed(&self) -> bool {
        self.satisfied_before != self.satisfied_after
    }

    /// Fold a later delta into this one. A service bound then unbound (or the
    /// reverse) cancels out.
    pub fn absorb(&mut self, later: BindingDelta) {
        for token in later.unbound {
            if let Some(pos) = self.bound.iter().position(|t| t.id == token.id) {
                self.bound.remove(pos);
            } else {
                self.unbound.push(token);
            }
        }
        for token in later.bound {
            if let Some(pos) = self.unbound.iter().position(|t| t.id == token.id) {
                self.unbound.remove(pos);
            } else {
                self.bound.push(token);
            }
        }
        self.satisfied_after = later.satisfied_after;
    }
}

/// Read-only view of a reference for management output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceSnapshot {
    pub description: ReferenceDescription,
    pub satisfied: bool,
    pub bound: Vec<ServiceToken>,
    pub candidates: usize,
}

/// Binding policy engine for one reference.
#[derive(Debug, Clone)]
pub struct ReferenceManager {
    description: ReferenceDescription,
    candidates: Vec<ServiceToken>,
    bound: Vec<ServiceToken>,
}

impl ReferenceManager {
    pub fn new(description: ReferenceDescription) -> Self {
        Self {
            description,
            candidates: Vec::new(),
            bound: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.description.name
    }

    pub fn description(&self) -> &ReferenceDescription {
        &self.description
    }

    pub fn is_satisfied(&self) -> bool {
        self.bound.len() >= self.description.cardinality.min()
    }

    /// Eligible candidates, best first.
    pub fn candidates(&self) -> &[ServiceToken] {
        &self.candidates
    }

    /// Bound services, best first.
    pub fn bound(&self) -> &[ServiceToken] {
        &self.bound
    }

    pub fn is_bound(&self, id: ServiceId) -> bool {
        self.bound.iter().any(|t| t.id == id)
    }

    pub fn is_candidate(&self, id: ServiceId) -> bool {
        self.candidates.iter().any(|t| t.id == id)
    }

    /// Whether a service is eligible: right interface and target filter.
    pub fn matches(&self, token: &ServiceToken) -> bool {
        token.provides(&self.description.interface)
            && self
                .description
                .target
                .as_ref()
                .map_or(true, |filter| filter.matches(&token.properties))
    }

    pub fn snapshot(&self) -> ReferenceSnapshot {
        ReferenceSnapshot {
            description: self.description.clone(),
            satisfied: self.is_satisfied(),
            bound: self.bound.clone(),
            candidates: self.candidates.len(),
        }
    }

    /// A service became available (or was seen in a snapshot).
    pub fn candidate_added(&mut self, token: ServiceToken) -> BindingDelta {
        if self.is_candidate(token.id) {
            return self.candidate_modified(token);
        }
        let satisfied = self.is_satisfied();
        if !self.matches(&token) {
            return BindingDelta::unchanged(satisfied);
        }

        insert_sorted(&mut self.candidates, token.clone());
        let mut delta = BindingDelta::unchanged(satisfied);
        self.offer(token, &mut delta);
        delta.satisfied_after = self.is_satisfied();
        delta
    }

    /// A service went away.
    pub fn candidate_removed(&mut self, id: ServiceId) -> BindingDelta {
        let satisfied = self.is_satisfied();
        let mut delta = BindingDelta::unchanged(satisfied);

        self.candidates.retain(|t| t.id != id);
        if let Some(pos) = self.bound.iter().position(|t| t.id == id) {
            delta.unbound.push(self.bound.remove(pos));
            self.refill(&mut delta);
        }

        delta.satisfied_after = self.is_satisfied();
        delta
    }

    /// A service's properties (and possibly rank) changed.
    pub fn candidate_modified(&mut self, token: ServiceToken) -> BindingDelta {
        if !self.is_candidate(token.id) {
            return self.candidate_added(token);
        }
        if !self.matches(&token) {
            return self.candidate_removed(token.id);
        }

        let satisfied = self.is_satisfied();
        let mut delta = BindingDelta::unchanged(satisfied);

        self.candidates.retain(|t| t.id != token.id);
        insert_sorted(&mut self.candidates, token.clone());

        if let Some(pos) = self.bound.iter().position(|t| t.id == token.id) {
            self.bound.remove(pos);
            insert_sorted(&mut self.bound, token);
        } else {
            self.offer(token, &mut delta);
        }

        delta.satisfied_after = self.is_satisfied();
        delta
    }

    /// A bound service could not be acquired. It is dropped from the
    /// candidates and the next-best candidate takes its slot.
    pub fn drop_unavailable(&mut self, id: ServiceId) -> BindingDelta {
        self.candidate_removed(id)
    }

    /// Replace the candidate set with a fresh registry snapshot.
    pub fn resync(&mut self, snapshot: Vec<ServiceToken>) -> BindingDelta {
        let mut delta = BindingDelta::unchanged(self.is_satisfied());

        let stale: Vec<ServiceId> = self
            .candidates
            .iter()
            .map(|t| t.id)
            .filter(|id| !snapshot.iter().any(|t| t.id == *id))
            .collect();
        for id in stale {
            delta.absorb(self.candidate_removed(id));
        }
        for token in snapshot {
            delta.absorb(self.candidate_added(token));
        }

        delta
    }

    /// Forget every candidate and binding.
    pub fn clear(&mut self) -> BindingDelta {
        let satisfied = self.is_satisfied();
        self.candidates.clear();
        BindingDelta {
            bound: Vec::new(),
            unbound: std::mem::take(&mut self.bound),
            satisfied_before: satisfied,
            satisfied_after: self.is_satisfied(),
        }
    }

    /// Bind `token` if there is room, or swap it in for the worst bound
    /// service when greedy and it outranks that service.
    fn offer(&mut self, token: ServiceToken, delta: &mut BindingDelta) {
        if self.description.cardinality.has_room(self.bound.len()) {
            insert_sorted(&mut self.bound, token.clone());
            delta.bound.push(token);
            return;
        }

        if !self.description.is_greedy() {
            return;
        }

        let worst_is_outranked = self.bound.last().is_some_and(|worst| token.outranks(worst));
        if worst_is_outranked {
            if let Some(worst) = self.bound.pop() {
                delta.unbound.push(worst);
            }
            insert_sorted(&mut self.bound, token.clone());
            delta.bound.push(token);
        }
    }

    fn refill(&mut self, delta: &mut BindingDelta) {
        while self.description.cardinality.has_room(self.bound.len()) {
            let next = self
                .candidates
                .iter()
                .find(|c| !self.bound.iter().any(|b| b.id == c.id))
                .cloned();
            match next {
                Some(token) => {
                    insert_sorted(&mut self.bound, token.clone());
                    delta.bound.push(token);
                }
                None => break,
            }
        }
    }
}

fn insert_sorted(tokens: &mut Vec<ServiceToken>, token: ServiceToken) {
    let pos = tokens
        .iter()
        .position(|t| token.outranks(t))
        .unwrap_or(tokens.len());
    tokens.insert(pos, token);
}
