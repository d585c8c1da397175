// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Resource Binder
//!
//! Stateless domain service that turns one resource request into concrete
//! per-leaf amounts, given the candidate leaves and their availability in
//! the target view.
//!
//! The binder walks candidates in tree order and spreads the requested
//! amount according to the request's fill policy:
//!
//! - **Sequential** fills one leaf to saturation before moving on — the
//!   packing strategy that keeps siblings free;
//! - **Balanced** spreads in proportion to per-leaf availability — the
//!   strategy that equalises pressure across siblings.
//!
//! Binding never mutates accounting state: the caller applies the returned
//! amounts, or drops them, atomically.

use crate::error::ArbiterError;
use crate::value_objects::{FillPolicy, ResourcePath, ResourceRequest};

/// One candidate leaf offered to the binder.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Exact path of the leaf
    pub path: ResourcePath,
    /// Availability of the leaf in the target view
    pub available: u64,
}

impl Candidate {
    pub fn new(path: ResourcePath, available: u64) -> Self {
        Self { path, available }
    }
}

/// Binds one request against the candidate leaves.
///
/// Candidates must be passed in tree order; the per-leaf split is
/// deterministic for a given candidate list. Leaves that end up with a
/// zero amount are omitted from the result.
///
/// # Errors
/// Returns `Overbooked` when the candidates' combined availability cannot
/// cover the requested amount. No partial result is produced.
pub fn bind_request(
    request: &ResourceRequest,
    candidates: &[Candidate],
) -> Result<Vec<(ResourcePath, u64)>, ArbiterError> {
    if request.amount == 0 {
        return Ok(Vec::new());
    }

    let total_available: u64 = candidates
        .iter()
        .map(|c| c.available)
        .fold(0u64, u64::saturating_add);
    if total_available < request.amount {
        return Err(ArbiterError::Overbooked(format!(
            "{}: requested {} but only {} available across {} candidates",
            request.path,
            request.amount,
            total_available,
            candidates.len()
        )));
    }

    match request.policy {
        FillPolicy::Sequential => Ok(bind_sequential(request.amount, candidates)),
        FillPolicy::Balanced => Ok(bind_balanced(request.amount, total_available, candidates)),
    }
}

/// Fills candidates to saturation, in order.
fn bind_sequential(amount: u64, candidates: &[Candidate]) -> Vec<(ResourcePath, u64)> {
    let mut remaining = amount;
    let mut bound = Vec::new();
    for candidate in candidates {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(candidate.available);
        if take > 0 {
            bound.push((candidate.path.clone(), take));
            remaining -= take;
        }
    }
    bound
}

/// Spreads the amount proportionally to per-candidate availability.
///
/// Shares are floored; the rounding remainder is handed out in candidate
/// order, capped by each candidate's residual availability. Since the
/// amount fits the combined availability, one pass always settles it.
fn bind_balanced(amount: u64, total_available: u64, candidates: &[Candidate]) -> Vec<(ResourcePath, u64)> {
    let mut shares: Vec<u64> = candidates
        .iter()
        .map(|c| {
            ((u128::from(amount) * u128::from(c.available)) / u128::from(total_available)) as u64
        })
        .collect();

    let assigned: u64 = shares.iter().sum();
    let mut remainder = amount - assigned;
    for (share, candidate) in shares.iter_mut().zip(candidates.iter()) {
        if remainder == 0 {
            break;
        }
        let headroom = candidate.available - *share;
        let extra = remainder.min(headroom);
        *share += extra;
        remainder -= extra;
    }

    candidates
        .iter()
        .zip(shares)
        .filter(|(_, share)| *share > 0)
        .map(|(candidate, share)| (candidate.path.clone(), share))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(avails: &[(&str, u64)]) -> Vec<Candidate> {
        avails
            .iter()
            .map(|(path, available)| Candidate::new(path.parse().unwrap(), *available))
            .collect()
    }

    fn request(amount: u64, policy: FillPolicy) -> ResourceRequest {
        ResourceRequest::new("sys.cpu.pe".parse().unwrap(), amount, policy)
    }

    /// Tests sequential filling: one leaf saturates before the next is
    /// touched.
    #[test]
    fn test_sequential_fills_in_order() {
        let cands = candidates(&[("sys0.cpu0.pe0", 100), ("sys0.cpu0.pe1", 100)]);
        let bound = bind_request(&request(150, FillPolicy::Sequential), &cands).unwrap();
        assert_eq!(bound.len(), 2);
        assert_eq!(bound[0].1, 100);
        assert_eq!(bound[1].1, 50);
    }

    /// Tests balanced spreading over equally available leaves.
    #[test]
    fn test_balanced_even_spread() {
        let cands = candidates(&[("sys0.cpu0.pe0", 100), ("sys0.cpu0.pe1", 100)]);
        let bound = bind_request(&request(200, FillPolicy::Balanced), &cands).unwrap();
        assert_eq!(bound.len(), 2);
        assert_eq!(bound[0].1, 100);
        assert_eq!(bound[1].1, 100);

        let four = candidates(&[
            ("sys0.cpu0.pe0", 100),
            ("sys0.cpu0.pe1", 100),
            ("sys0.cpu0.pe2", 100),
            ("sys0.cpu0.pe3", 100),
        ]);
        let bound = bind_request(&request(200, FillPolicy::Balanced), &four).unwrap();
        assert!(bound.iter().all(|(_, amount)| *amount == 50));
    }

    /// Tests balanced spreading proportional to uneven availability.
    #[test]
    fn test_balanced_proportional_spread() {
        let cands = candidates(&[("sys0.cpu0.pe0", 60), ("sys0.cpu0.pe1", 30)]);
        let bound = bind_request(&request(60, FillPolicy::Balanced), &cands).unwrap();
        assert_eq!(bound[0].1, 40);
        assert_eq!(bound[1].1, 20);
    }

    /// Tests that the rounding remainder lands within availability.
    #[test]
    fn test_balanced_remainder_distribution() {
        let cands = candidates(&[
            ("sys0.cpu0.pe0", 100),
            ("sys0.cpu0.pe1", 100),
            ("sys0.cpu0.pe2", 100),
        ]);
        let bound = bind_request(&request(100, FillPolicy::Balanced), &cands).unwrap();
        let total: u64 = bound.iter().map(|(_, amount)| amount).sum();
        assert_eq!(total, 100);
        for (pos, (_, amount)) in bound.iter().enumerate() {
            assert!(*amount <= cands[pos].available);
        }
    }

    #[test]
    fn test_overbooking_is_detected_up_front() {
        let cands = candidates(&[("sys0.cpu0.pe0", 100)]);
        let err = bind_request(&request(150, FillPolicy::Sequential), &cands);
        assert!(matches!(err, Err(ArbiterError::Overbooked(_))));
        let err = bind_request(&request(150, FillPolicy::Balanced), &cands);
        assert!(matches!(err, Err(ArbiterError::Overbooked(_))));
    }

    #[test]
    fn test_zero_amount_binds_nothing() {
        let cands = candidates(&[("sys0.cpu0.pe0", 100)]);
        let bound = bind_request(&request(0, FillPolicy::Balanced), &cands).unwrap();
        assert!(bound.is_empty());
    }

    #[test]
    fn test_zero_availability_leaves_are_skipped() {
        let cands = candidates(&[("sys0.cpu0.pe0", 0), ("sys0.cpu0.pe1", 80)]);
        let bound = bind_request(&request(80, FillPolicy::Balanced), &cands).unwrap();
        assert_eq!(bound.len(), 1);
        assert_eq!(bound[0].0.to_string(), "sys0.cpu0.pe1");
        assert_eq!(bound[0].1, 80);
    }
}
