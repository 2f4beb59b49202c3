//! Conflict resolution across fragments.
//!
//! # Precedence (evaluated in order)
//! 1. Exact and prefix routes on the same base path never conflict; each
//!    is resolved in its own lane and both win
//! 2. Any override candidate beats every app candidate; among overrides
//!    the most recently modified wins
//! 3. Otherwise the most recently modified app candidate wins
//!
//! Remaining ties break on source identity so the outcome never depends on
//! input order. A stored decision is reused when it was made over exactly
//! the current candidate set; an automatic one also needs every candidate's
//! modification time unchanged.

use std::collections::BTreeMap;

use crate::compose::diagnostics::{ConflictReport, SkipReason};
use crate::fragments::{Origin, SourceId};
use crate::parser::RouteRecord;
use crate::resolver::decisions::{CandidateTimes, DecisionSet, ResolutionDecision, Strategy};

/// Independent competition bucket inside a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Lane {
    Exact,
    Prefix,
    Regex,
}

impl Lane {
    pub fn of(record: &RouteRecord) -> Self {
        if record.match_type.is_regex() {
            Lane::Regex
        } else if record.match_type.is_prefix_like() {
            Lane::Prefix
        } else {
            Lane::Exact
        }
    }

    /// Key a decision for this lane is stored under.
    pub fn decision_key(self, normalized_key: &str) -> String {
        match self {
            Lane::Exact => format!("= {}", normalized_key),
            Lane::Prefix | Lane::Regex => normalized_key.to_string(),
        }
    }
}

/// All candidates sharing a normalized key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteGroup {
    pub normalized_key: String,
    pub candidates: Vec<RouteRecord>,
    /// One winner, or one per lane when exact and prefix coexist.
    pub winners: Vec<RouteRecord>,
    pub conflict: bool,
    pub reason: String,
}

/// Output of the resolver.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub groups: Vec<RouteGroup>,
    pub winners: Vec<RouteRecord>,
    pub losers: Vec<(RouteRecord, SkipReason)>,
    pub conflicts: Vec<ConflictReport>,
    /// Decisions for every lane that had a conflict this run.
    pub decisions: BTreeMap<String, ResolutionDecision>,
}

/// Group records by normalized key and pick winners.
pub fn resolve(records: Vec<RouteRecord>, previous: &DecisionSet, now: u64) -> Resolution {
    let mut by_key: BTreeMap<String, Vec<RouteRecord>> = BTreeMap::new();
    for record in records {
        by_key
            .entry(record.normalized_key.clone())
            .or_default()
            .push(record);
    }

    let mut resolution = Resolution::default();
    for (key, mut candidates) in by_key {
        candidates.sort_by(|a, b| (&a.source, a.line).cmp(&(&b.source, b.line)));

        let mut lanes: BTreeMap<Lane, Vec<RouteRecord>> = BTreeMap::new();
        for record in &candidates {
            lanes.entry(Lane::of(record)).or_default().push(record.clone());
        }

        let mut winners = Vec::new();
        let mut reasons = Vec::new();
        let mut conflict = false;
        for (lane, lane_candidates) in lanes {
            let outcome = resolve_lane(lane, &key, lane_candidates, previous, now);
            if let Some(report) = outcome.report {
                conflict = true;
                reasons.push(report.reason.clone());
                resolution.conflicts.push(report);
            }
            if let Some(decision) = outcome.decision {
                resolution
                    .decisions
                    .insert(decision.normalized_key.clone(), decision);
            }
            resolution.losers.extend(outcome.losers);
            winners.push(outcome.winner);
        }

        if winners.len() > 1 {
            reasons.push("exact and prefix coexist".to_string());
        }
        let reason = if reasons.is_empty() {
            "sole candidate".to_string()
        } else {
            reasons.join("; ")
        };

        resolution.winners.extend(winners.iter().cloned());
        resolution.groups.push(RouteGroup {
            normalized_key: key,
            candidates,
            winners,
            conflict,
            reason,
        });
    }

    resolution
}

struct LaneOutcome {
    winner: RouteRecord,
    losers: Vec<(RouteRecord, SkipReason)>,
    report: Option<ConflictReport>,
    decision: Option<ResolutionDecision>,
}

fn resolve_lane(
    lane: Lane,
    key: &str,
    candidates: Vec<RouteRecord>,
    previous: &DecisionSet,
    now: u64,
) -> LaneOutcome {
    // One route per fragment per lane; repeats inside a fragment are the
    // author's mistake, not a cross-fragment conflict.
    let mut losers = Vec::new();
    let mut first_line: BTreeMap<SourceId, usize> = BTreeMap::new();
    let mut unique = Vec::new();
    for record in candidates {
        match first_line.get(&record.source) {
            Some(&line) => losers.push((record, SkipReason::DuplicateInFragment { first_line: line })),
            None => {
                first_line.insert(record.source.clone(), record.line);
                unique.push(record);
            }
        }
    }

    if unique.len() == 1 {
        return LaneOutcome {
            winner: unique.remove(0),
            losers,
            report: None,
            decision: None,
        };
    }

    let decision_key = lane.decision_key(key);
    let observed: CandidateTimes = unique
        .iter()
        .map(|r| (r.source.as_str().to_string(), r.mod_time_ms))
        .collect();
    let has_override = unique.iter().any(|r| r.origin == Origin::Override);

    let stored = previous.get(&decision_key).filter(|d| {
        let usable = d.covers(&observed)
            && unique
                .iter()
                .any(|r| r.source == d.winner && (!has_override || r.origin == Origin::Override));
        if !usable {
            tracing::debug!(key = %decision_key, "Stored decision no longer applies");
        }
        usable
    });

    let (winner_idx, strategy, resolved_at, reused) = match stored {
        Some(d) => {
            let idx = unique
                .iter()
                .position(|r| r.source == d.winner)
                .unwrap_or_default();
            (idx, d.strategy, d.resolved_at, true)
        }
        None => {
            let strategy = if has_override {
                Strategy::OverridePrecedence
            } else {
                Strategy::Recency
            };
            (pick_winner(&unique, has_override), strategy, now, false)
        }
    };

    let winner = unique.remove(winner_idx);
    let loser_ids: Vec<SourceId> = unique.iter().map(|r| r.source.clone()).collect();

    let same_upstream = {
        let mut logical = unique
            .iter()
            .chain(std::iter::once(&winner))
            .map(|r| r.upstream.as_ref().map(|u| u.logical()));
        let first = logical.next().flatten();
        first.is_some() && logical.all(|l| l == first)
    };

    let reason = if reused {
        format!("{} (stored decision)", strategy)
    } else {
        strategy.to_string()
    };

    tracing::info!(
        key = %decision_key,
        winner = %winner.source,
        losers = loser_ids.len(),
        strategy = %strategy,
        reused,
        "Conflict resolved"
    );

    for record in unique {
        let reason = if winner.origin == Origin::Override && record.origin == Origin::App {
            SkipReason::LostToOverride
        } else {
            SkipReason::LostTo(winner.source.clone())
        };
        losers.push((record, reason));
    }

    let report = ConflictReport {
        normalized_key: decision_key.clone(),
        winner: winner.source.clone(),
        losers: loser_ids.clone(),
        strategy,
        reason,
        reused,
        same_upstream,
    };
    let decision = ResolutionDecision {
        normalized_key: decision_key,
        winner: winner.source.clone(),
        alternatives: loser_ids,
        resolved_at,
        strategy,
        candidate_mtimes: observed,
    };

    LaneOutcome {
        winner,
        losers,
        report: Some(report),
        decision: Some(decision),
    }
}

/// Most recent candidate among the eligible pool; ties go to the smallest
/// source identity.
fn pick_winner(candidates: &[RouteRecord], overrides_only: bool) -> usize {
    candidates
        .iter()
        .enumerate()
        .filter(|(_, r)| !overrides_only || r.origin == Origin::Override)
        .max_by(|(_, a), (_, b)| {
            a.mod_time_ms
                .cmp(&b.mod_time_ms)
                .then_with(|| b.source.cmp(&a.source))
        })
        .map(|(idx, _)| idx)
        .unwrap_or_default()
}
