// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Resource Accounter
//!
//! The accounting kernel of the arbiter: one aggregate owning the platform
//! resource tree and the arena of accounting views.
//!
//! ## Views
//!
//! A view is a complete, independent usage ledger over the tree, addressed
//! by an opaque token. The distinguished system view is the committed
//! truth; every other view is speculative. Policies book candidate
//! allocations on scratch views; the synchronisation protocol replays the
//! surviving bookings on a dedicated sync view and finally promotes it to
//! system view in one step — or drops it, leaving the committed state
//! untouched.
//!
//! ## Booking
//!
//! Booking is two-phase. The binder first computes per-leaf amounts for
//! every request against a snapshot of the view (accounting amounts
//! already claimed by earlier requests of the same set); only when the
//! whole set fits is the view mutated. A failed booking therefore never
//! leaves partial state behind, and the conservation invariant
//! `used + available = total - reserved` holds after every operation on
//! every view.
//!
//! ## Concurrency
//!
//! The aggregate is single-writer by construction: every mutating method
//! takes `&mut self` and the composition root serialises access behind
//! one lock, which is the rewrite of the original reentrant critical
//! section.

use std::collections::{BTreeMap, HashMap};

use crate::entities::resource_node::ResourceNode;
use crate::entities::schedulable::SchedUid;
use crate::entities::working_mode::{Assignment, Binding};
use crate::error::ArbiterError;
use crate::services::resource_binder::{bind_request, Candidate};
use crate::value_objects::{
    DeclaredUnit, ResourcePath, ResourceRequest, ResourceType, ViewToken, MAX_TOKEN_PROBES,
    SYSTEM_VIEW,
};

/// The request set a schedulable holds in one view, together with the
/// concrete per-leaf amounts it was bound to.
#[derive(Debug, Clone)]
pub struct Holding {
    pub requests: Vec<ResourceRequest>,
    pub binding: Binding,
    pub assignment: Assignment,
}

/// One row of the resource status report.
#[derive(Debug, Clone)]
pub struct ResourceStatus {
    pub path: ResourcePath,
    pub total: u64,
    pub reserved: u64,
    pub used: u64,
}

/// A usage ledger over the tree.
#[derive(Debug, Default, Clone)]
struct View {
    /// Per-node, per-owner charged amounts
    usages: BTreeMap<ResourcePath, BTreeMap<SchedUid, u64>>,
    /// Request sets held per owner
    holdings: HashMap<SchedUid, Holding>,
}

impl View {
    fn used_on(&self, path: &ResourcePath) -> u64 {
        self.usages
            .get(path)
            .map(|owners| owners.values().fold(0u64, |acc, v| acc.saturating_add(*v)))
            .unwrap_or(0)
    }

    fn used_by_on(&self, path: &ResourcePath, owner: SchedUid) -> u64 {
        self.usages
            .get(path)
            .and_then(|owners| owners.get(&owner).copied())
            .unwrap_or(0)
    }

    fn credit(&mut self, path: &ResourcePath, owner: SchedUid, amount: u64) {
        *self
            .usages
            .entry(path.clone())
            .or_default()
            .entry(owner)
            .or_insert(0) += amount;
    }

    fn debit(&mut self, path: &ResourcePath, owner: SchedUid) {
        if let Some(owners) = self.usages.get_mut(path) {
            owners.remove(&owner);
            if owners.is_empty() {
                self.usages.remove(path);
            }
        }
    }
}

/// An open synchronisation session.
#[derive(Debug, Clone, Copy)]
struct SyncSession {
    view: ViewToken,
    id: u32,
}

/// The accounting kernel: resource tree plus view arena.
#[derive(Debug)]
pub struct ResourceAccounter {
    /// All registered nodes, indexed by exact path (tree order)
    nodes: BTreeMap<ResourcePath, ResourceNode>,
    /// View arena, keyed by token
    views: HashMap<ViewToken, View>,
    /// Names the tokens were derived from
    view_names: HashMap<ViewToken, String>,
    /// The open sync session, if any
    sync_session: Option<SyncSession>,
    /// Monotonic sync session counter
    sync_count: u32,
}

impl Default for ResourceAccounter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceAccounter {
    /// Creates an accounter with an empty tree and the system view.
    pub fn new() -> Self {
        let mut views = HashMap::new();
        views.insert(SYSTEM_VIEW, View::default());
        let mut view_names = HashMap::new();
        view_names.insert(SYSTEM_VIEW, "system".to_string());
        Self {
            nodes: BTreeMap::new(),
            views,
            view_names,
            sync_session: None,
            sync_count: 0,
        }
    }

    // ------------------------------------------------------------------
    // Tree registration and queries
    // ------------------------------------------------------------------

    /// Registers a resource at an exact path.
    ///
    /// Re-registering with the same declared unit and amount is
    /// idempotent. Missing ancestors are created on the fly; aggregate
    /// ancestors accumulate the capacity of contributing children so that
    /// the total of a CPU is always the sum of its processing elements.
    ///
    /// # Errors
    /// - `InvalidPath` when the path is malformed or not exact
    /// - `AlreadyExists` when the node exists with a different declaration
    pub fn register(
        &mut self,
        path_str: &str,
        unit: DeclaredUnit,
        amount: u64,
    ) -> Result<(), ArbiterError> {
        let path: ResourcePath = path_str.parse()?;
        let node = ResourceNode::new(path.clone(), unit, amount)?;

        if let Some(existing) = self.nodes.get(&path) {
            if existing.same_declaration(unit, amount) {
                return Ok(());
            }
            return Err(ArbiterError::AlreadyExists(format!(
                "{}: already registered with a different declaration",
                path
            )));
        }

        // Create missing ancestors (zero capacity of their own)
        let mut ancestor = path.parent();
        while let Some(a) = ancestor {
            if !self.nodes.contains_key(&a) {
                let filler = ResourceNode::new(a.clone(), DeclaredUnit::Count, 0)?;
                self.nodes.insert(a.clone(), filler);
            }
            ancestor = a.parent();
        }

        let internal = node.total();
        let contributes = node.rtype().contributes_to_aggregates();
        self.nodes.insert(path.clone(), node);

        // Propagate contributing capacity into aggregate ancestors
        if contributes && internal > 0 {
            let mut child_type = path.last_type();
            let mut ancestor = path.parent();
            while let Some(a) = ancestor {
                if !child_type.contributes_to_aggregates() {
                    break;
                }
                if let Some(parent) = self.nodes.get_mut(&a) {
                    if parent.rtype().is_aggregate() {
                        parent.add_total(internal);
                    }
                    child_type = parent.rtype();
                }
                ancestor = a.parent();
            }
        }
        Ok(())
    }

    /// Returns the nodes matching a path or template (same depth).
    pub fn get(&self, path: &ResourcePath) -> Vec<&ResourceNode> {
        if path.is_exact() {
            return self.nodes.get(path).into_iter().collect();
        }
        self.nodes
            .values()
            .filter(|node| path.matches(node.path()))
            .collect()
    }

    /// Whether at least one node matches the path or template.
    pub fn exists(&self, path: &ResourcePath) -> bool {
        !self.get(path).is_empty()
    }

    /// Number of registered nodes of a type.
    pub fn count_per_type(&self, rtype: ResourceType) -> usize {
        self.nodes.values().filter(|n| n.rtype() == rtype).count()
    }

    /// Read access to one exact node.
    pub fn node(&self, path: &ResourcePath) -> Option<&ResourceNode> {
        self.nodes.get(path)
    }

    /// Mutable access to one exact node (power profile updates).
    pub fn node_mut(&mut self, path: &ResourcePath) -> Option<&mut ResourceNode> {
        self.nodes.get_mut(path)
    }

    /// All registered paths, in tree order.
    pub fn paths(&self) -> impl Iterator<Item = &ResourcePath> {
        self.nodes.keys()
    }

    /// Whether a node has no registered descendants.
    fn is_leaf(&self, path: &ResourcePath) -> bool {
        !self
            .nodes
            .keys()
            .any(|other| other.len() > path.len() && other.starts_with(path))
    }

    /// The leaves reachable under a (possibly open) path prefix, in tree
    /// order.
    fn leaves_under(&self, prefix: &ResourcePath) -> Vec<&ResourceNode> {
        self.nodes
            .values()
            .filter(|node| prefix.prefix_matches(node.path()) && self.is_leaf(node.path()))
            .collect()
    }

    /// Total capacity under a path: the node's own total for an exact
    /// registered path, otherwise the saturating sum over all leaves
    /// reachable under the matching prefix.
    pub fn total(&self, path: &ResourcePath) -> u64 {
        if path.is_exact() {
            if let Some(node) = self.nodes.get(path) {
                return node.total();
            }
        }
        self.leaves_under(path)
            .iter()
            .map(|n| n.total())
            .fold(0u64, u64::saturating_add)
    }

    /// Amount charged under a path in a view (saturating sum).
    ///
    /// # Errors
    /// Returns `MissingView` for an unknown token.
    pub fn used(&self, path: &ResourcePath, token: ViewToken) -> Result<u64, ArbiterError> {
        let view = self.view(token)?;
        Ok(self
            .nodes
            .values()
            .filter(|node| path.prefix_matches(node.path()))
            .map(|node| view.used_on(node.path()))
            .fold(0u64, u64::saturating_add))
    }

    /// Availability under a path in a view, optionally from the
    /// perspective of an owner (its own charge counts as available to it).
    ///
    /// Only leaves contribute: aggregate capacity is exactly the capacity
    /// of the leaves below it.
    pub fn available(
        &self,
        path: &ResourcePath,
        token: ViewToken,
        owner: Option<SchedUid>,
    ) -> Result<u64, ArbiterError> {
        let view = self.view(token)?;
        Ok(self
            .leaves_under(path)
            .iter()
            .map(|node| Self::leaf_available(view, node, owner))
            .fold(0u64, u64::saturating_add))
    }

    fn leaf_available(view: &View, node: &ResourceNode, owner: Option<SchedUid>) -> u64 {
        let mut used = view.used_on(node.path());
        if let Some(owner) = owner {
            used -= view.used_by_on(node.path(), owner);
        }
        node.capacity().saturating_sub(used)
    }

    // ------------------------------------------------------------------
    // View arena
    // ------------------------------------------------------------------

    fn view(&self, token: ViewToken) -> Result<&View, ArbiterError> {
        self.views
            .get(&token)
            .ok_or_else(|| ArbiterError::MissingView(format!("token {}", token)))
    }

    fn view_mut(&mut self, token: ViewToken) -> Result<&mut View, ArbiterError> {
        self.views
            .get_mut(&token)
            .ok_or_else(|| ArbiterError::MissingView(format!("token {}", token)))
    }

    /// Creates (or resets) the view named `name` and returns its token.
    ///
    /// Tokens are derived from the name; colliding names are probed to
    /// the next free slot a bounded number of times.
    ///
    /// # Errors
    /// - `InvalidConfiguration` for an empty name
    /// - `TokenExhausted` when probing runs out of slots
    pub fn get_view(&mut self, name: &str) -> Result<ViewToken, ArbiterError> {
        if name.is_empty() {
            return Err(ArbiterError::InvalidConfiguration(
                "view name must not be empty".into(),
            ));
        }
        let mut token = ViewToken::from_name(name);
        for _ in 0..MAX_TOKEN_PROBES {
            match self.view_names.get(&token) {
                None => {
                    self.views.insert(token, View::default());
                    self.view_names.insert(token, name.to_string());
                    return Ok(token);
                }
                Some(existing) if existing == name => {
                    // Same name asked again: hand out a fresh ledger
                    self.views.insert(token, View::default());
                    return Ok(token);
                }
                Some(_) => token = token.probe_next(),
            }
        }
        Err(ArbiterError::TokenExhausted(format!(
            "no free token within {} probes of '{}'",
            MAX_TOKEN_PROBES, name
        )))
    }

    /// Drops a speculative view.
    ///
    /// # Errors
    /// - `InvalidConfiguration` when asked to drop the system view
    /// - `MissingView` for an unknown token
    pub fn put_view(&mut self, token: ViewToken) -> Result<(), ArbiterError> {
        if token.is_system() {
            return Err(ArbiterError::InvalidConfiguration(
                "the system view cannot be released".into(),
            ));
        }
        if self.views.remove(&token).is_none() {
            return Err(ArbiterError::MissingView(format!("token {}", token)));
        }
        self.view_names.remove(&token);
        Ok(())
    }

    /// Number of live views (system view included).
    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    // ------------------------------------------------------------------
    // Booking
    // ------------------------------------------------------------------

    /// Atomically books a request set for `uid` on a view.
    ///
    /// Each request is bound by the binder over the leaves its path
    /// reaches, restricted by `binding`; `Sequential` fills leaves to
    /// saturation in tree order, `Balanced` spreads proportionally to
    /// availability. The whole set is booked or nothing is.
    ///
    /// The `check` flag mirrors the protocol contract: sessions replay
    /// pre-validated sets with `check = false`. Capacity is enforced
    /// either way — a set that does not fit fails with `Overbooked`
    /// without touching the view, so the conservation invariant survives
    /// even a misbehaving caller.
    ///
    /// # Errors
    /// - `MissingView` for an unknown token
    /// - `AlreadyHolds` when `uid` already holds a set in this view
    /// - `Overbooked` when the set does not fit
    pub fn book_resources(
        &mut self,
        uid: SchedUid,
        requests: &[ResourceRequest],
        binding: &Binding,
        token: ViewToken,
        check: bool,
    ) -> Result<Assignment, ArbiterError> {
        let _ = check;
        if requests.is_empty() {
            return Err(ArbiterError::InvalidConfiguration(format!(
                "uid {}: empty resource request set",
                uid
            )));
        }
        let assignment = self.compute_binding(uid, requests, binding, token)?;
        self.apply_booking(uid, requests, binding, &assignment, token)?;
        Ok(assignment)
    }

    /// Phase one: bind every request against a snapshot of the view,
    /// accounting amounts claimed by earlier requests of the same set.
    fn compute_binding(
        &self,
        uid: SchedUid,
        requests: &[ResourceRequest],
        binding: &Binding,
        token: ViewToken,
    ) -> Result<Assignment, ArbiterError> {
        let view = self.view(token)?;
        if view.holdings.contains_key(&uid) {
            return Err(ArbiterError::AlreadyHolds(format!(
                "uid {} already holds a request set in view {}",
                uid, token
            )));
        }

        let mut pending: HashMap<ResourcePath, u64> = HashMap::new();
        let mut entries = Vec::new();
        for request in requests {
            let candidates: Vec<Candidate> = self
                .leaves_under(&request.path)
                .into_iter()
                .filter(|node| binding.allows(node.path()))
                .map(|node| {
                    let claimed = pending.get(node.path()).copied().unwrap_or(0);
                    Candidate::new(
                        node.path().clone(),
                        Self::leaf_available(view, node, None).saturating_sub(claimed),
                    )
                })
                .collect();

            let bound = bind_request(request, &candidates)?;
            for (path, amount) in bound {
                *pending.entry(path.clone()).or_insert(0) += amount;
                entries.push((path, amount));
            }
        }
        Ok(Assignment::new(entries))
    }

    /// Phase two: credit the bound amounts and record the holding.
    fn apply_booking(
        &mut self,
        uid: SchedUid,
        requests: &[ResourceRequest],
        binding: &Binding,
        assignment: &Assignment,
        token: ViewToken,
    ) -> Result<(), ArbiterError> {
        let view = self.view_mut(token)?;
        for (path, amount) in assignment.entries() {
            view.credit(path, uid, *amount);
        }
        view.holdings.insert(
            uid,
            Holding {
                requests: requests.to_vec(),
                binding: binding.clone(),
                assignment: assignment.clone(),
            },
        );
        Ok(())
    }

    /// Replays a pre-bound assignment on a view, validating capacity.
    ///
    /// Used by the sync session to charge exactly what the scheduler
    /// booked (and the platform mapped), leaf by leaf.
    fn apply_assignment(
        &mut self,
        uid: SchedUid,
        holding: Holding,
        token: ViewToken,
    ) -> Result<(), ArbiterError> {
        {
            let view = self.view(token)?;
            if view.holdings.contains_key(&uid) {
                return Err(ArbiterError::AlreadyHolds(format!(
                    "uid {} already holds a request set in view {}",
                    uid, token
                )));
            }
            for (path, amount) in holding.assignment.entries() {
                let node = self.nodes.get(path).ok_or_else(|| {
                    ArbiterError::NotFound(format!("{}: not a registered resource", path))
                })?;
                let available = Self::leaf_available(view, node, None);
                if *amount > available {
                    return Err(ArbiterError::Overbooked(format!(
                        "{}: replaying {} exceeds availability {}",
                        path, amount, available
                    )));
                }
            }
        }
        let view = self.view_mut(token)?;
        for (path, amount) in holding.assignment.entries() {
            view.credit(path, uid, *amount);
        }
        view.holdings.insert(uid, holding);
        Ok(())
    }

    /// Releases the request set `uid` holds in a view.
    ///
    /// During a sync session, a release on the system view cascades into
    /// the sync view so the speculative ledger never resurrects a
    /// workload the committed one dropped.
    ///
    /// # Errors
    /// - `MissingView` for an unknown token
    /// - `NotFound` when `uid` holds nothing in the view
    pub fn release_resources(&mut self, uid: SchedUid, token: ViewToken) -> Result<(), ArbiterError> {
        let view = self.view_mut(token)?;
        let holding = view.holdings.remove(&uid).ok_or_else(|| {
            ArbiterError::NotFound(format!("uid {} holds nothing in view {}", uid, token))
        })?;
        let paths: Vec<ResourcePath> = holding
            .assignment
            .entries()
            .iter()
            .map(|(path, _)| path.clone())
            .collect();
        for path in paths {
            view.debit(&path, uid);
        }

        if token == SYSTEM_VIEW {
            if let Some(session) = self.sync_session {
                // Tolerate a workload that never made it into the session
                let _ = self.release_resources(uid, session.view);
            }
        }
        Ok(())
    }

    /// The request set `uid` holds in a view, if any.
    pub fn holding(&self, uid: SchedUid, token: ViewToken) -> Option<&Holding> {
        self.views.get(&token).and_then(|v| v.holdings.get(&uid))
    }

    /// The owners holding anything in a view.
    pub fn holders(&self, token: ViewToken) -> Vec<SchedUid> {
        self.views
            .get(&token)
            .map(|v| v.holdings.keys().copied().collect())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Synchronisation session
    // ------------------------------------------------------------------

    /// Opens a sync session: allocates the sync view and replays the
    /// committed holdings of every still-running workload into it.
    ///
    /// # Errors
    /// Returns `SyncInitFailed` when a session is already open or a
    /// running workload cannot be replayed; the half-open session is
    /// dropped before returning.
    pub fn sync_start(&mut self, running: &[SchedUid]) -> Result<(), ArbiterError> {
        if self.sync_session.is_some() {
            return Err(ArbiterError::SyncInitFailed(
                "a sync session is already open".into(),
            ));
        }
        self.sync_count = self.sync_count.wrapping_add(1);
        let id = self.sync_count;
        let token = self
            .get_view(&format!("sync.{}", id))
            .map_err(|e| ArbiterError::SyncInitFailed(e.to_string()))?;

        for uid in running {
            let holding = match self.holding(*uid, SYSTEM_VIEW) {
                Some(holding) => holding.clone(),
                None => {
                    let _ = self.put_view(token);
                    return Err(ArbiterError::SyncInitFailed(format!(
                        "running uid {} holds nothing in the system view",
                        uid
                    )));
                }
            };
            if let Err(e) = self.apply_assignment(*uid, holding, token) {
                let _ = self.put_view(token);
                return Err(ArbiterError::SyncInitFailed(format!(
                    "cannot replay uid {}: {}",
                    uid, e
                )));
            }
        }

        self.sync_session = Some(SyncSession { view: token, id });
        Ok(())
    }

    /// Charges a reconfigured workload on the sync view.
    ///
    /// When the scheduler's booking is passed in, its exact per-leaf
    /// amounts are replayed (what the platform was mapped with);
    /// otherwise the request set is re-bound against the sync view.
    ///
    /// # Errors
    /// - `SyncInitFailed` when no session is open
    /// - booking errors as per [`book_resources`](Self::book_resources)
    pub fn sync_acquire(
        &mut self,
        uid: SchedUid,
        requests: &[ResourceRequest],
        binding: &Binding,
        assignment: Option<&Assignment>,
    ) -> Result<Assignment, ArbiterError> {
        let session = self.sync_session.ok_or_else(|| {
            ArbiterError::SyncInitFailed("sync_acquire outside a sync session".into())
        })?;
        match assignment {
            Some(assignment) => {
                let holding = Holding {
                    requests: requests.to_vec(),
                    binding: binding.clone(),
                    assignment: assignment.clone(),
                };
                self.apply_assignment(uid, holding, session.view)?;
                Ok(assignment.clone())
            }
            None => self.book_resources(uid, requests, binding, session.view, false),
        }
    }

    /// Promotes the sync view to system view in one step.
    ///
    /// # Errors
    /// Returns `SyncInitFailed` when no session is open.
    pub fn sync_commit(&mut self) -> Result<(), ArbiterError> {
        let session = self.sync_session.take().ok_or_else(|| {
            ArbiterError::SyncInitFailed("sync_commit outside a sync session".into())
        })?;
        let view = self
            .views
            .remove(&session.view)
            .ok_or_else(|| ArbiterError::MissingView(format!("token {}", session.view)))?;
        self.view_names.remove(&session.view);
        self.views.insert(SYSTEM_VIEW, view);
        Ok(())
    }

    /// Drops the sync view, leaving the system view untouched.
    pub fn sync_abort(&mut self) {
        if let Some(session) = self.sync_session.take() {
            self.views.remove(&session.view);
            self.view_names.remove(&session.view);
        }
    }

    /// Whether a sync session is open.
    pub fn sync_active(&self) -> bool {
        self.sync_session.is_some()
    }

    /// The token of the open sync view, if any.
    pub fn sync_view(&self) -> Option<ViewToken> {
        self.sync_session.map(|s| s.view)
    }

    /// The identifier of the current (or last) sync session.
    pub fn sync_session_id(&self) -> u32 {
        self.sync_count
    }

    // ------------------------------------------------------------------
    // Reporting and auditing
    // ------------------------------------------------------------------

    /// One row per registered node with its committed usage.
    pub fn status_report(&self) -> Vec<ResourceStatus> {
        let system = match self.views.get(&SYSTEM_VIEW) {
            Some(view) => view,
            None => return Vec::new(),
        };
        self.nodes
            .values()
            .map(|node| ResourceStatus {
                path: node.path().clone(),
                total: node.total(),
                reserved: node.reserved(),
                used: system.used_on(node.path()),
            })
            .collect()
    }

    /// Verifies the conservation invariant on every view and node.
    ///
    /// # Errors
    /// Returns `InternalError` naming the first violating node.
    pub fn audit(&self) -> Result<(), ArbiterError> {
        for (token, view) in &self.views {
            for (path, owners) in &view.usages {
                let node = self.nodes.get(path).ok_or_else(|| {
                    ArbiterError::InternalError(format!(
                        "view {} charges unregistered resource {}",
                        token, path
                    ))
                })?;
                let used: u64 = owners.values().sum();
                if used > node.capacity() {
                    return Err(ArbiterError::InternalError(format!(
                        "view {}: {} used {} over capacity {}",
                        token,
                        path,
                        used,
                        node.capacity()
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::FillPolicy;

    fn path(s: &str) -> ResourcePath {
        s.parse().unwrap()
    }

    /// A platform with one CPU of four 100-unit processing elements and
    /// 512 Mb of memory.
    fn small_platform() -> ResourceAccounter {
        let mut ra = ResourceAccounter::new();
        for pe in 0..4 {
            ra.register(&format!("sys0.cpu0.pe{}", pe), DeclaredUnit::Count, 100)
                .unwrap();
        }
        ra.register("sys0.mem0", DeclaredUnit::Mb, 512).unwrap();
        ra
    }

    fn pe_request(amount: u64, policy: FillPolicy) -> Vec<ResourceRequest> {
        vec![ResourceRequest::new(path("sys.cpu.pe"), amount, policy)]
    }

    /// Tests registration: idempotence, conflicting declarations and
    /// aggregate roll-up of contributing children.
    #[test]
    fn test_registration_and_aggregation() {
        let mut ra = small_platform();

        // Idempotent on the same declaration
        ra.register("sys0.cpu0.pe0", DeclaredUnit::Count, 100).unwrap();
        // Conflicting declaration is rejected
        assert!(matches!(
            ra.register("sys0.cpu0.pe0", DeclaredUnit::Count, 50),
            Err(ArbiterError::AlreadyExists(_))
        ));

        // Ancestors were created and aggregated the PE quotas
        assert_eq!(ra.total(&path("sys0.cpu0")), 400);
        assert_eq!(ra.total(&path("sys0")), 400);
        // Memory does not pollute processing totals
        assert_eq!(ra.total(&path("sys0.mem0")), 512 * 1024 * 1024);
        assert_eq!(ra.count_per_type(ResourceType::ProcessingElement), 4);
        assert_eq!(ra.count_per_type(ResourceType::Cpu), 1);
    }

    #[test]
    fn test_template_queries() {
        let ra = small_platform();
        assert_eq!(ra.get(&path("sys.cpu.pe")).len(), 4);
        assert_eq!(ra.get(&path("sys0.cpu0.pe2")).len(), 1);
        assert!(ra.exists(&path("sys.mem")));
        assert!(!ra.exists(&path("sys.gpu")));
        assert_eq!(ra.total(&path("sys.cpu.pe")), 400);
    }

    /// Tests a balanced booking and the conservation invariant.
    #[test]
    fn test_booking_balanced() {
        let mut ra = small_platform();
        let assignment = ra
            .book_resources(1, &pe_request(200, FillPolicy::Balanced), &Binding::new(), SYSTEM_VIEW, true)
            .unwrap();
        assert_eq!(assignment.total(), 200);
        assert_eq!(ra.used(&path("sys.cpu.pe"), SYSTEM_VIEW).unwrap(), 200);
        assert_eq!(
            ra.available(&path("sys.cpu.pe"), SYSTEM_VIEW, None).unwrap(),
            200
        );
        ra.audit().unwrap();
    }

    /// Tests that a booking is all-or-nothing across requests.
    #[test]
    fn test_booking_atomicity_across_requests() {
        let mut ra = small_platform();
        let requests = vec![
            ResourceRequest::new(path("sys.cpu.pe"), 300, FillPolicy::Sequential),
            // This one cannot fit: only 100 left after the first
            ResourceRequest::new(path("sys.cpu.pe"), 200, FillPolicy::Sequential),
        ];
        let err = ra.book_resources(1, &requests, &Binding::new(), SYSTEM_VIEW, true);
        assert!(matches!(err, Err(ArbiterError::Overbooked(_))));
        // Nothing was charged
        assert_eq!(ra.used(&path("sys.cpu.pe"), SYSTEM_VIEW).unwrap(), 0);
        assert!(ra.holding(1, SYSTEM_VIEW).is_none());
    }

    #[test]
    fn test_booking_respects_binding_masks() {
        let mut ra = small_platform();
        let mut binding = Binding::new();
        binding.bind(ResourceType::ProcessingElement, [0, 1]);
        let assignment = ra
            .book_resources(1, &pe_request(200, FillPolicy::Balanced), &binding, SYSTEM_VIEW, true)
            .unwrap();
        assert_eq!(assignment.amount_on(&path("sys0.cpu0.pe0")), 100);
        assert_eq!(assignment.amount_on(&path("sys0.cpu0.pe1")), 100);
        assert_eq!(assignment.amount_on(&path("sys0.cpu0.pe2")), 0);
    }

    #[test]
    fn test_one_holding_per_view() {
        let mut ra = small_platform();
        ra.book_resources(1, &pe_request(100, FillPolicy::Sequential), &Binding::new(), SYSTEM_VIEW, true)
            .unwrap();
        let err = ra.book_resources(
            1,
            &pe_request(100, FillPolicy::Sequential),
            &Binding::new(),
            SYSTEM_VIEW,
            true,
        );
        assert!(matches!(err, Err(ArbiterError::AlreadyHolds(_))));
    }

    #[test]
    fn test_release_restores_availability() {
        let mut ra = small_platform();
        ra.book_resources(1, &pe_request(250, FillPolicy::Balanced), &Binding::new(), SYSTEM_VIEW, true)
            .unwrap();
        ra.release_resources(1, SYSTEM_VIEW).unwrap();
        assert_eq!(ra.used(&path("sys.cpu.pe"), SYSTEM_VIEW).unwrap(), 0);
        assert_eq!(
            ra.available(&path("sys.cpu.pe"), SYSTEM_VIEW, None).unwrap(),
            400
        );
        assert!(matches!(
            ra.release_resources(1, SYSTEM_VIEW),
            Err(ArbiterError::NotFound(_))
        ));
    }

    /// Tests speculative views: independent ledgers, token probing and
    /// release.
    #[test]
    fn test_view_arena() {
        let mut ra = small_platform();
        let scratch = ra.get_view("policy.scratch").unwrap();
        assert_ne!(scratch, SYSTEM_VIEW);

        ra.book_resources(7, &pe_request(400, FillPolicy::Sequential), &Binding::new(), scratch, true)
            .unwrap();
        // The committed truth is untouched
        assert_eq!(ra.used(&path("sys.cpu.pe"), SYSTEM_VIEW).unwrap(), 0);
        assert_eq!(ra.used(&path("sys.cpu.pe"), scratch).unwrap(), 400);

        ra.put_view(scratch).unwrap();
        assert!(ra.used(&path("sys.cpu.pe"), scratch).is_err());
        assert!(ra.put_view(SYSTEM_VIEW).is_err());
    }

    /// Tests the owner-perspective availability filter.
    #[test]
    fn test_available_with_owner_filter() {
        let mut ra = small_platform();
        ra.book_resources(1, &pe_request(300, FillPolicy::Sequential), &Binding::new(), SYSTEM_VIEW, true)
            .unwrap();
        // A third party sees 100 free
        assert_eq!(
            ra.available(&path("sys.cpu.pe"), SYSTEM_VIEW, Some(2)).unwrap(),
            100
        );
        // The holder sees its own charge as available again
        assert_eq!(
            ra.available(&path("sys.cpu.pe"), SYSTEM_VIEW, Some(1)).unwrap(),
            400
        );
    }

    /// Tests the sync session happy path: replay of running holdings,
    /// acquire, and atomic promotion.
    #[test]
    fn test_sync_session_commit() {
        let mut ra = small_platform();
        // uid 1 is running with 100 units committed
        ra.book_resources(1, &pe_request(100, FillPolicy::Sequential), &Binding::new(), SYSTEM_VIEW, true)
            .unwrap();

        ra.sync_start(&[1]).unwrap();
        assert!(ra.sync_active());

        // uid 2 reconfigures into the session with a pre-bound assignment
        let assignment = Assignment::new(vec![(path("sys0.cpu0.pe2"), 80)]);
        ra.sync_acquire(
            2,
            &pe_request(80, FillPolicy::Sequential),
            &Binding::new(),
            Some(&assignment),
        )
        .unwrap();

        ra.sync_commit().unwrap();
        assert!(!ra.sync_active());
        assert_eq!(ra.used(&path("sys.cpu.pe"), SYSTEM_VIEW).unwrap(), 180);
        assert_eq!(ra.used(&path("sys0.cpu0.pe2"), SYSTEM_VIEW).unwrap(), 80);
        ra.audit().unwrap();
    }

    /// Tests abort purity: after an abort every observable query answers
    /// as before the session.
    #[test]
    fn test_sync_abort_purity() {
        let mut ra = small_platform();
        ra.book_resources(1, &pe_request(100, FillPolicy::Sequential), &Binding::new(), SYSTEM_VIEW, true)
            .unwrap();
        let before_used = ra.used(&path("sys.cpu.pe"), SYSTEM_VIEW).unwrap();
        let before_views = ra.view_count();

        ra.sync_start(&[1]).unwrap();
        ra.sync_acquire(2, &pe_request(50, FillPolicy::Sequential), &Binding::new(), None)
            .unwrap();
        ra.sync_abort();

        assert_eq!(ra.used(&path("sys.cpu.pe"), SYSTEM_VIEW).unwrap(), before_used);
        assert_eq!(ra.view_count(), before_views);
        assert!(!ra.sync_active());
        assert!(ra.holding(2, SYSTEM_VIEW).is_none());
    }

    /// Tests commit idempotence: with no reconfiguration the committed
    /// ledger is unchanged.
    #[test]
    fn test_empty_sync_commit_is_noop() {
        let mut ra = small_platform();
        ra.book_resources(1, &pe_request(100, FillPolicy::Sequential), &Binding::new(), SYSTEM_VIEW, true)
            .unwrap();
        let before: Vec<_> = ra
            .status_report()
            .into_iter()
            .map(|row| (row.path.to_string(), row.used))
            .collect();

        ra.sync_start(&[1]).unwrap();
        ra.sync_commit().unwrap();

        let after: Vec<_> = ra
            .status_report()
            .into_iter()
            .map(|row| (row.path.to_string(), row.used))
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_sync_start_requires_committed_holdings() {
        let mut ra = small_platform();
        let err = ra.sync_start(&[42]);
        assert!(matches!(err, Err(ArbiterError::SyncInitFailed(_))));
        assert!(!ra.sync_active());
        // The half-open sync view was dropped
        assert_eq!(ra.view_count(), 1);
    }

    #[test]
    fn test_release_cascades_into_sync_view() {
        let mut ra = small_platform();
        ra.book_resources(1, &pe_request(100, FillPolicy::Sequential), &Binding::new(), SYSTEM_VIEW, true)
            .unwrap();
        ra.sync_start(&[1]).unwrap();
        let sync_view = ra.sync_view().unwrap();
        assert!(ra.holding(1, sync_view).is_some());

        ra.release_resources(1, SYSTEM_VIEW).unwrap();
        assert!(ra.holding(1, sync_view).is_none());
        assert_eq!(ra.used(&path("sys.cpu.pe"), sync_view).unwrap(), 0);
    }
}
