//! Heuristic detection of recurring wrong answers and their lifecycle.
//!
//! Matching is plain string comparison: normalized equality, or one answer
//! contained in the other. It deliberately over-detects; a misconception that
//! was a fluke resolves after two correct answers anyway.

use chrono::{DateTime, Duration, Utc};

use crate::models::{KnowledgeNode, Misconception, MisconceptionOccurrence, MisconceptionStatus};

pub const LOOKBACK_DAYS: i64 = 30;

/// What an incorrect answer did to a node's misconceptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    /// Joined an existing misconception. `relapsed` is set when it was resolving.
    Matched { index: usize, relapsed: bool },
    /// New misconception seeded from a recent occurrence plus this one.
    Created { index: usize },
    /// First error on the node; tracked but not yet confirmed.
    Placeholder { index: usize },
    /// Nothing recorded (blank answer, or no recent history to pair with).
    Untracked,
}

impl MisconceptionStatus {
    pub fn after_correct(self) -> Self {
        match self {
            MisconceptionStatus::Active => MisconceptionStatus::Resolving,
            MisconceptionStatus::Resolving | MisconceptionStatus::Resolved => {
                MisconceptionStatus::Resolved
            }
        }
    }

    pub fn after_relapse(self) -> Self {
        match self {
            MisconceptionStatus::Resolving => MisconceptionStatus::Active,
            other => other,
        }
    }
}

pub fn normalize_answer(answer: &str) -> String {
    answer
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn matches_pattern(pattern: &str, answer: &str) -> bool {
    let pattern = normalize_answer(pattern);
    let answer = normalize_answer(answer);
    if pattern.is_empty() || answer.is_empty() {
        return false;
    }
    pattern == answer || pattern.contains(&answer) || answer.contains(&pattern)
}

impl Misconception {
    fn seeded(
        id: String,
        occurrences: Vec<MisconceptionOccurrence>,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        let current = occurrences.last()?;
        let first_detected = occurrences
            .iter()
            .map(|o| o.timestamp)
            .min()
            .unwrap_or(now);
        Some(Self {
            id,
            pattern: normalize_answer(&current.learner_answer),
            correct_understanding: current.expected_answer.clone(),
            status: MisconceptionStatus::Active,
            first_detected,
            last_detected: now,
            resolution_attempts: 0,
            resolved_at: None,
            occurrences,
        })
    }

    fn observe(&mut self, occurrence: MisconceptionOccurrence, now: DateTime<Utc>) -> bool {
        self.occurrences.push(occurrence);
        self.last_detected = now;

        let relapsed = self.status == MisconceptionStatus::Resolving;
        if relapsed {
            self.resolution_attempts += 1;
        }
        self.status = self.status.after_relapse();
        relapsed
    }

    // Returns true when this call moved it to Resolved
    fn advance(&mut self, now: DateTime<Utc>) -> bool {
        let before = self.status;
        self.status = before.after_correct();
        if before != MisconceptionStatus::Resolved && self.status == MisconceptionStatus::Resolved {
            self.resolved_at = Some(now);
            return true;
        }
        false
    }
}

fn next_id(node: &KnowledgeNode) -> String {
    format!("{}#{}", node.concept_id, node.misconceptions.len() + 1)
}

fn latest_recent_occurrence(
    node: &KnowledgeNode,
    now: DateTime<Utc>,
) -> Option<MisconceptionOccurrence> {
    let since = now - Duration::days(LOOKBACK_DAYS);
    node.misconceptions
        .iter()
        .flat_map(|m| m.occurrences.iter())
        .filter(|o| o.timestamp >= since && o.timestamp <= now)
        .max_by_key(|o| o.timestamp)
        .cloned()
}

/// Fold an incorrect answer into the node's misconceptions.
pub fn record_error(
    node: &mut KnowledgeNode,
    occurrence: MisconceptionOccurrence,
    now: DateTime<Utc>,
) -> Detection {
    if normalize_answer(&occurrence.learner_answer).is_empty() {
        return Detection::Untracked;
    }

    if let Some(index) = node
        .misconceptions
        .iter()
        .position(|m| m.is_open() && matches_pattern(&m.pattern, &occurrence.learner_answer))
    {
        let relapsed = node.misconceptions[index].observe(occurrence, now);
        return Detection::Matched { index, relapsed };
    }

    if node.misconceptions.is_empty() {
        let id = next_id(node);
        return match Misconception::seeded(id, vec![occurrence], now) {
            Some(m) => {
                node.misconceptions.push(m);
                Detection::Placeholder {
                    index: node.misconceptions.len() - 1,
                }
            }
            None => Detection::Untracked,
        };
    }

    match latest_recent_occurrence(node, now) {
        Some(previous) => {
            let id = next_id(node);
            match Misconception::seeded(id, vec![previous, occurrence], now) {
                Some(m) => {
                    node.misconceptions.push(m);
                    Detection::Created {
                        index: node.misconceptions.len() - 1,
                    }
                }
                None => Detection::Untracked,
            }
        }
        None => Detection::Untracked,
    }
}

/// Advance every open misconception after a correct answer. Returns the
/// indices that became resolved.
pub fn record_success(node: &mut KnowledgeNode, now: DateTime<Utc>) -> Vec<usize> {
    node.misconceptions
        .iter_mut()
        .enumerate()
        .filter_map(|(i, m)| m.advance(now).then_some(i))
        .collect()
}
