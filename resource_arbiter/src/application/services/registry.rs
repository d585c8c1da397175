// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Workload Registry
//!
//! The bookkeeping core shared by the application and process managers: a
//! uid-keyed map of workload handles plus per-state queues, with
//! erase-safe *retained* iteration.
//!
//! ## Retained Iteration
//!
//! Workloads can be destroyed while another thread walks a state queue
//! (an agent disconnects during a sync session, an operator removes a
//! process). A retained iterator registers itself with the registry:
//! when the element it currently points at is erased or leaves the
//! bucket, the registry repositions the iterator onto the next valid
//! element, which the following `next` call then returns without
//! advancing again.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::RwLock;

use resource_arbiter_domain::{SchedUid, State};

/// Handle of a live retained iteration.
#[derive(Debug)]
pub struct RetainedIterator {
    id: u64,
}

#[derive(Debug)]
struct IterState {
    bucket: State,
    /// The element the iterator currently points at
    current: Option<SchedUid>,
    /// Set when the registry repositioned the iterator: the next `next`
    /// call returns `current` without advancing
    repositioned: bool,
}

/// Uid-keyed workload map with per-state queues and retained iteration.
pub struct StateRegistry<T> {
    items: BTreeMap<SchedUid, Arc<RwLock<T>>>,
    states: HashMap<SchedUid, State>,
    queues: HashMap<State, BTreeSet<SchedUid>>,
    iterators: HashMap<u64, IterState>,
    next_iterator_id: u64,
}

impl<T> Default for StateRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> StateRegistry<T> {
    pub fn new() -> Self {
        Self {
            items: BTreeMap::new(),
            states: HashMap::new(),
            queues: HashMap::new(),
            iterators: HashMap::new(),
            next_iterator_id: 0,
        }
    }

    /// Inserts a workload under its uid and state bucket.
    pub fn insert(&mut self, uid: SchedUid, item: T, state: State) -> Arc<RwLock<T>> {
        let handle = Arc::new(RwLock::new(item));
        self.items.insert(uid, Arc::clone(&handle));
        self.states.insert(uid, state);
        self.queues.entry(state).or_default().insert(uid);
        handle
    }

    /// Removes a workload, repositioning every live iterator that points
    /// at it.
    pub fn remove(&mut self, uid: SchedUid) -> Option<Arc<RwLock<T>>> {
        let state = self.states.remove(&uid)?;
        self.reposition_before_erase(state, uid);
        if let Some(queue) = self.queues.get_mut(&state) {
            queue.remove(&uid);
        }
        self.items.remove(&uid)
    }

    /// Moves a workload between state buckets. Iterators inspecting it in
    /// the old bucket are repositioned as if it were erased there.
    pub fn move_state(&mut self, uid: SchedUid, new_state: State) {
        let old = match self.states.get(&uid) {
            Some(old) => *old,
            None => return,
        };
        if old == new_state {
            return;
        }
        self.reposition_before_erase(old, uid);
        if let Some(queue) = self.queues.get_mut(&old) {
            queue.remove(&uid);
        }
        self.states.insert(uid, new_state);
        self.queues.entry(new_state).or_default().insert(uid);
    }

    fn reposition_before_erase(&mut self, bucket: State, uid: SchedUid) {
        let successor = self
            .queues
            .get(&bucket)
            .and_then(|q| q.range((Bound::Excluded(uid), Bound::Unbounded)).next())
            .copied();
        for iter in self.iterators.values_mut() {
            if iter.bucket == bucket && iter.current == Some(uid) {
                iter.current = successor;
                iter.repositioned = true;
            }
        }
    }

    pub fn get(&self, uid: SchedUid) -> Option<Arc<RwLock<T>>> {
        self.items.get(&uid).cloned()
    }

    pub fn state_of(&self, uid: SchedUid) -> Option<State> {
        self.states.get(&uid).copied()
    }

    pub fn count(&self, state: State) -> usize {
        self.queues.get(&state).map(|q| q.len()).unwrap_or(0)
    }

    pub fn any(&self, state: State) -> bool {
        self.count(state) > 0
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Snapshot of the uids in a state bucket, in uid order.
    pub fn uids(&self, state: State) -> Vec<SchedUid> {
        self.queues
            .get(&state)
            .map(|q| q.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Snapshot of every registered uid.
    pub fn all_uids(&self) -> Vec<SchedUid> {
        self.items.keys().copied().collect()
    }

    /// Snapshot of the handles in a state bucket.
    pub fn handles(&self, state: State) -> Vec<Arc<RwLock<T>>> {
        self.uids(state)
            .into_iter()
            .filter_map(|uid| self.get(uid))
            .collect()
    }

    /// Opens a retained iteration over a state bucket and returns its
    /// first element.
    pub fn iter_first(&mut self, state: State) -> (RetainedIterator, Option<Arc<RwLock<T>>>) {
        let id = self.next_iterator_id;
        self.next_iterator_id = self.next_iterator_id.wrapping_add(1);
        let first = self
            .queues
            .get(&state)
            .and_then(|q| q.iter().next())
            .copied();
        self.iterators.insert(
            id,
            IterState {
                bucket: state,
                current: first,
                repositioned: false,
            },
        );
        let item = first.and_then(|uid| self.get(uid));
        (RetainedIterator { id }, item)
    }

    /// Advances a retained iteration. After a repositioning erase the
    /// element the iterator was moved onto is returned first.
    pub fn iter_next(&mut self, iter: &RetainedIterator) -> Option<Arc<RwLock<T>>> {
        let state = self.iterators.get_mut(&iter.id)?;
        if state.repositioned {
            state.repositioned = false;
        } else {
            let current = state.current?;
            state.current = self
                .queues
                .get(&state.bucket)
                .and_then(|q| {
                    q.range((Bound::Excluded(current), Bound::Unbounded))
                        .next()
                })
                .copied();
        }
        let uid = self.iterators.get(&iter.id)?.current?;
        self.get(uid)
    }

    /// Closes a retained iteration.
    pub fn iter_release(&mut self, iter: RetainedIterator) {
        self.iterators.remove(&iter.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(uids: &[SchedUid]) -> StateRegistry<SchedUid> {
        let mut reg = StateRegistry::new();
        for uid in uids {
            reg.insert(*uid, *uid, State::Ready);
        }
        reg
    }

    fn value(handle: Option<Arc<RwLock<SchedUid>>>) -> Option<SchedUid> {
        handle.map(|h| *h.read())
    }

    #[test]
    fn test_insert_and_state_queues() {
        let mut reg = registry_with(&[1, 2, 3]);
        assert_eq!(reg.count(State::Ready), 3);
        reg.move_state(2, State::Running);
        assert_eq!(reg.count(State::Ready), 2);
        assert_eq!(reg.count(State::Running), 1);
        assert_eq!(reg.uids(State::Ready), vec![1, 3]);
        assert_eq!(reg.state_of(2), Some(State::Running));
    }

    #[test]
    fn test_plain_iteration() {
        let mut reg = registry_with(&[10, 20, 30]);
        let (iter, first) = reg.iter_first(State::Ready);
        assert_eq!(value(first), Some(10));
        assert_eq!(value(reg.iter_next(&iter)), Some(20));
        assert_eq!(value(reg.iter_next(&iter)), Some(30));
        assert!(reg.iter_next(&iter).is_none());
        reg.iter_release(iter);
    }

    /// Erasing the element under inspection advances the iterator to the
    /// next valid element.
    #[test]
    fn test_erase_under_iteration_advances() {
        let mut reg = registry_with(&[10, 20, 30]);
        let (iter, first) = reg.iter_first(State::Ready);
        assert_eq!(value(first), Some(10));

        reg.remove(10);
        // The iterator was moved onto 20 and returns it without skipping
        assert_eq!(value(reg.iter_next(&iter)), Some(20));
        assert_eq!(value(reg.iter_next(&iter)), Some(30));
        assert!(reg.iter_next(&iter).is_none());
        reg.iter_release(iter);
    }

    /// Erasing the last element under inspection ends the iteration.
    #[test]
    fn test_erase_last_under_iteration_ends() {
        let mut reg = registry_with(&[10]);
        let (iter, first) = reg.iter_first(State::Ready);
        assert_eq!(value(first), Some(10));
        reg.remove(10);
        assert!(reg.iter_next(&iter).is_none());
        reg.iter_release(iter);
    }

    /// A state move repositions iterators in the old bucket exactly like
    /// an erase.
    #[test]
    fn test_state_move_repositions_iterators() {
        let mut reg = registry_with(&[10, 20, 30]);
        let (iter, first) = reg.iter_first(State::Ready);
        assert_eq!(value(first), Some(10));

        reg.move_state(10, State::Running);
        assert_eq!(value(reg.iter_next(&iter)), Some(20));
        reg.iter_release(iter);
    }

    #[test]
    fn test_erase_elsewhere_does_not_disturb_iterator() {
        let mut reg = registry_with(&[10, 20, 30]);
        let (iter, first) = reg.iter_first(State::Ready);
        assert_eq!(value(first), Some(10));
        reg.remove(30);
        assert_eq!(value(reg.iter_next(&iter)), Some(20));
        assert!(reg.iter_next(&iter).is_none());
        reg.iter_release(iter);
    }
}
