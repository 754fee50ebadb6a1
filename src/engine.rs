//! Interaction recorder: folds one graded answer into a learner profile.

use std::collections::btree_map::Entry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::mastery::update_mastery;
use crate::misconception::{self, Detection};
use crate::models::{
    BloomsLevel, Calibration, KnowledgeNode, LearnerProfile, LearningMode, MasteryBand,
    MisconceptionOccurrence, MisconceptionRef, UpdateEvent,
};
use crate::schedule::schedule_review;

pub const DIVERGENCE_THRESHOLD: f64 = 0.2;

/// A graded answer, as handed over by the tutoring session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Interaction {
    pub concept_id: String,
    pub concept_name: String,
    pub subject: String,
    pub topic: String,
    pub is_correct: bool,
    pub learner_answer: String,
    pub expected_answer: String,
    pub learner_confidence: Option<f64>,
    pub session_id: String,
    pub mode: LearningMode,
    #[serde(default)]
    pub curriculum_refs: Vec<String>,
    pub blooms_level: Option<BloomsLevel>,
}

impl Interaction {
    pub fn new(
        concept_id: impl Into<String>,
        concept_name: impl Into<String>,
        subject: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            concept_id: concept_id.into(),
            concept_name: concept_name.into(),
            subject: subject.into(),
            topic: topic.into(),
            ..Default::default()
        }
    }

    pub fn answered(
        mut self,
        is_correct: bool,
        learner_answer: impl Into<String>,
        expected_answer: impl Into<String>,
    ) -> Self {
        self.is_correct = is_correct;
        self.learner_answer = learner_answer.into();
        self.expected_answer = expected_answer.into();
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.learner_confidence = Some(confidence);
        self
    }

    pub fn in_session(mut self, session_id: impl Into<String>, mode: LearningMode) -> Self {
        self.session_id = session_id.into();
        self.mode = mode;
        self
    }

    pub fn with_curriculum_refs(mut self, refs: Vec<String>) -> Self {
        self.curriculum_refs = refs;
        self
    }

    pub fn with_blooms_level(mut self, level: BloomsLevel) -> Self {
        self.blooms_level = Some(level);
        self
    }

    // NaN counts as "not reported"; anything else is clamped into [0, 1]
    fn reported_confidence(&self) -> Option<f64> {
        self.learner_confidence
            .filter(|c| !c.is_nan())
            .map(|c| c.clamp(0.0, 1.0))
    }
}

pub fn classify_calibration(student_confidence: f64, mastery: f64) -> Calibration {
    if student_confidence > mastery + DIVERGENCE_THRESHOLD {
        Calibration::Overconfident
    } else if mastery > student_confidence + DIVERGENCE_THRESHOLD {
        Calibration::Underconfident
    } else {
        Calibration::Calibrated
    }
}

fn merge_refs(existing: &mut Vec<String>, incoming: &[String]) {
    for r in incoming {
        let r = r.trim();
        if !r.is_empty() && !existing.iter().any(|e| e == r) {
            existing.push(r.to_string());
        }
    }
}

fn misconception_ref(node: &KnowledgeNode, index: usize) -> MisconceptionRef {
    MisconceptionRef {
        concept_id: node.concept_id.clone(),
        misconception_id: node.misconceptions[index].id.clone(),
    }
}

impl LearnerProfile {
    pub fn record_interaction(&mut self, interaction: Interaction) -> Result<Vec<UpdateEvent>> {
        self.record_interaction_at(interaction, Utc::now())
    }

    pub fn record_interaction_at(
        &mut self,
        interaction: Interaction,
        now: DateTime<Utc>,
    ) -> Result<Vec<UpdateEvent>> {
        let concept_id = interaction.concept_id.trim().to_string();
        if concept_id.is_empty() {
            return Err(Error::InvalidInteraction(
                "concept_id must not be empty".to_string(),
            ));
        }

        let mut events = Vec::new();
        let mut confirmed = Vec::new();
        let mut resolved = Vec::new();

        let node = match self.knowledge_nodes.entry(concept_id.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let concept_name = if interaction.concept_name.trim().is_empty() {
                    concept_id.clone()
                } else {
                    interaction.concept_name.clone()
                };
                info!(
                    learner_id = %self.learner_id,
                    concept_id = %concept_id,
                    "new concept encountered"
                );
                events.push(UpdateEvent::ConceptEncountered {
                    concept_id: concept_id.clone(),
                    concept_name: concept_name.clone(),
                });
                entry.insert(KnowledgeNode::new(
                    concept_id.clone(),
                    concept_name,
                    interaction.subject.clone(),
                    interaction.topic.clone(),
                    now,
                ))
            }
        };

        node.interaction_count += 1;
        node.last_updated = now;
        merge_refs(&mut node.curriculum_refs, &interaction.curriculum_refs);
        if interaction.is_correct {
            node.correct_count += 1;
            if let Some(level) = interaction.blooms_level {
                node.blooms_level = Some(node.blooms_level.map_or(level, |l| l.max(level)));
            }
        }

        // Mastery
        let previous = node.mastery;
        node.mastery = update_mastery(previous, interaction.is_correct);
        debug!(
            concept_id = %concept_id,
            correct = interaction.is_correct,
            previous,
            posterior = node.mastery,
            "mastery updated"
        );
        events.push(UpdateEvent::MasteryUpdate {
            concept_id: concept_id.clone(),
            previous,
            current: node.mastery,
        });

        // Misconceptions
        if interaction.is_correct {
            for index in misconception::record_success(node, now) {
                let m = &node.misconceptions[index];
                if !m.is_confirmed() {
                    continue;
                }
                info!(concept_id = %concept_id, misconception_id = %m.id, "misconception resolved");
                events.push(UpdateEvent::MisconceptionResolved {
                    concept_id: concept_id.clone(),
                    misconception_id: m.id.clone(),
                    pattern: m.pattern.clone(),
                });
                resolved.push(misconception_ref(node, index));
            }
        } else {
            let occurrence = MisconceptionOccurrence {
                session_id: interaction.session_id.clone(),
                timestamp: now,
                learner_answer: interaction.learner_answer.clone(),
                expected_answer: interaction.expected_answer.clone(),
                context: interaction.mode.as_str().to_string(),
            };
            match misconception::record_error(node, occurrence, now) {
                Detection::Matched { index, .. } | Detection::Created { index }
                    if node.misconceptions[index].is_confirmed() =>
                {
                    let m = &node.misconceptions[index];
                    info!(
                        concept_id = %concept_id,
                        misconception_id = %m.id,
                        occurrences = m.occurrence_count(),
                        "misconception detected"
                    );
                    events.push(UpdateEvent::MisconceptionDetected {
                        concept_id: concept_id.clone(),
                        misconception_id: m.id.clone(),
                        pattern: m.pattern.clone(),
                        occurrence_count: m.occurrence_count(),
                    });
                    confirmed.push(misconception_ref(node, index));
                }
                Detection::Placeholder { index } => {
                    debug!(
                        concept_id = %concept_id,
                        misconception_id = %node.misconceptions[index].id,
                        "watching first error"
                    );
                }
                _ => {}
            }
        }

        // Review schedule
        if interaction.is_correct {
            let (interval, next_review_date) = schedule_review(node, now);
            events.push(UpdateEvent::ReviewScheduled {
                concept_id: concept_id.clone(),
                interval,
                next_review_date,
            });
        }

        // Confidence
        let reported = interaction.reported_confidence();
        match reported {
            Some(c) => {
                node.student_confidence = c;
                node.confidence_reported = true;
            }
            None if !node.confidence_reported => node.student_confidence = node.mastery,
            None => {}
        }
        node.confidence = (1.0 - node.divergence()).clamp(0.0, 1.0);
        if reported.is_some() {
            events.push(UpdateEvent::ConfidenceUpdate {
                concept_id: concept_id.clone(),
                student_confidence: node.student_confidence,
                mastery: node.mastery,
                calibration: classify_calibration(node.student_confidence, node.mastery),
            });
        }

        for r in confirmed {
            if !self.active_misconceptions.contains(&r) {
                self.active_misconceptions.push(r);
            }
        }
        for r in resolved {
            self.active_misconceptions.retain(|a| a != &r);
            if !self.resolved_misconceptions.contains(&r) {
                self.resolved_misconceptions.push(r);
            }
        }

        self.total_interactions += 1;
        self.updated_at = now;
        self.refresh_aggregates();

        Ok(events)
    }

    /// Recompute every rolled-up field from the nodes.
    pub fn refresh_aggregates(&mut self) {
        let mut mastered = 0;
        let mut learning = 0;
        let mut struggling = 0;
        let mut mastery_sum = 0.0;
        let mut divergence_sum = 0.0;
        let mut overconfident = Vec::new();
        let mut underconfident = Vec::new();

        for node in self.knowledge_nodes.values() {
            match node.band() {
                MasteryBand::Mastered => mastered += 1,
                MasteryBand::Learning => learning += 1,
                MasteryBand::Struggling => struggling += 1,
            }
            mastery_sum += node.mastery;
            divergence_sum += node.divergence();

            match classify_calibration(node.student_confidence, node.mastery) {
                Calibration::Overconfident => overconfident.push(node.concept_name.clone()),
                Calibration::Underconfident => underconfident.push(node.concept_name.clone()),
                Calibration::Calibrated => {}
            }
        }

        let count = self.knowledge_nodes.len();
        self.concepts_mastered = mastered;
        self.concepts_learning = learning;
        self.concepts_struggling = struggling;
        if count == 0 {
            self.overall_mastery = 0.0;
            self.confidence_divergence = 0.0;
        } else {
            self.overall_mastery = mastery_sum / count as f64;
            self.confidence_divergence = divergence_sum / count as f64;
        }
        self.overconfident_topics = overconfident;
        self.underconfident_topics = underconfident;

        self.reconcile_misconceptions();
    }

    // Keep profile-level references in step with node-level status
    fn reconcile_misconceptions(&mut self) {
        let nodes = &self.knowledge_nodes;
        let lookup = |r: &MisconceptionRef| {
            nodes
                .get(&r.concept_id)
                .and_then(|n| n.misconceptions.iter().find(|m| m.id == r.misconception_id))
        };

        self.active_misconceptions
            .retain(|r| lookup(r).is_some_and(|m| m.is_confirmed() && m.is_open()));
        self.resolved_misconceptions
            .retain(|r| lookup(r).is_some_and(|m| m.is_confirmed() && !m.is_open()));

        for node in nodes.values() {
            for m in node.misconceptions.iter().filter(|m| m.is_confirmed()) {
                let r = MisconceptionRef {
                    concept_id: node.concept_id.clone(),
                    misconception_id: m.id.clone(),
                };
                let list = if m.is_open() {
                    &mut self.active_misconceptions
                } else {
                    &mut self.resolved_misconceptions
                };
                if !list.contains(&r) {
                    list.push(r);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MisconceptionStatus, INITIAL_EASE_FACTOR, INITIAL_MASTERY};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn answer(concept_id: &str, correct: bool, given: &str, expected: &str) -> Interaction {
        Interaction::new(concept_id, format!("Concept {}", concept_id), "math", "algebra")
            .answered(correct, given, expected)
            .in_session("s1", LearningMode::Practice)
    }

    mod validation_tests {
        use super::*;

        #[test]
        fn empty_concept_id_is_rejected() {
            let mut profile = LearnerProfile::new_at("learner", t0());
            let result = profile.record_interaction_at(answer("  ", true, "a", "a"), t0());
            assert!(matches!(result, Err(Error::InvalidInteraction(_))));
            assert!(profile.knowledge_nodes.is_empty());
            assert_eq!(profile.total_interactions, 0);
        }

        #[test]
        fn unknown_concept_creates_node() {
            let mut profile = LearnerProfile::new_at("learner", t0());
            let events = profile
                .record_interaction_at(answer("c1", true, "4", "4"), t0())
                .unwrap();

            assert!(matches!(
                events[0],
                UpdateEvent::ConceptEncountered { ref concept_id, .. } if concept_id == "c1"
            ));
            let node = &profile.knowledge_nodes["c1"];
            assert_eq!(node.concept_name, "Concept c1");
            assert_eq!(node.first_encountered, t0());
            assert_eq!(node.interaction_count, 1);
        }

        #[test]
        fn blank_name_falls_back_to_id() {
            let mut profile = LearnerProfile::new_at("learner", t0());
            let interaction = Interaction::new("c9", "", "math", "algebra").answered(true, "", "");
            profile.record_interaction_at(interaction, t0()).unwrap();
            assert_eq!(profile.knowledge_nodes["c9"].concept_name, "c9");
        }

        #[test]
        fn confidence_is_clamped() {
            let mut profile = LearnerProfile::new_at("learner", t0());
            profile
                .record_interaction_at(answer("c1", true, "4", "4").with_confidence(3.0), t0())
                .unwrap();
            assert_eq!(profile.knowledge_nodes["c1"].student_confidence, 1.0);

            profile
                .record_interaction_at(answer("c1", true, "4", "4").with_confidence(-1.0), t0())
                .unwrap();
            assert_eq!(profile.knowledge_nodes["c1"].student_confidence, 0.0);
        }

        #[test]
        fn nan_confidence_is_ignored() {
            let mut profile = LearnerProfile::new_at("learner", t0());
            let events = profile
                .record_interaction_at(
                    answer("c1", true, "4", "4").with_confidence(f64::NAN),
                    t0(),
                )
                .unwrap();
            assert!(!profile.knowledge_nodes["c1"].confidence_reported);
            assert!(events.iter().all(|e| e.kind() != "confidence_update"));
        }
    }

    mod mastery_scenario_tests {
        use super::*;

        #[test]
        fn three_correct_answers_raise_mastery_monotonically() {
            let mut profile = LearnerProfile::new_at("learner", t0());
            let mut last = INITIAL_MASTERY;
            for i in 0..3 {
                let at = t0() + Duration::days(i);
                profile
                    .record_interaction_at(answer("c1", true, "4", "4"), at)
                    .unwrap();
                let mastery = profile.get_node_mastery("c1");
                assert!(mastery > last);
                assert!(mastery < 1.0);
                last = mastery;
            }
        }

        #[test]
        fn first_wrong_answer_lowers_mastery_and_opens_placeholder() {
            let mut profile = LearnerProfile::new_at("learner", t0());
            let events = profile
                .record_interaction_at(answer("c2", false, "2x", "2x+1"), t0())
                .unwrap();

            let node = &profile.knowledge_nodes["c2"];
            assert!(node.mastery < INITIAL_MASTERY);
            assert!((node.mastery - 0.01 / 0.685).abs() < 1e-9);
            assert_eq!(node.misconceptions.len(), 1);
            assert_eq!(node.misconceptions[0].status, MisconceptionStatus::Active);
            assert!(profile.active_misconceptions.is_empty());
            assert!(events.iter().all(|e| e.kind() != "misconception_detected"));
        }

        #[test]
        fn repeated_wrong_answer_confirms_misconception() {
            let mut profile = LearnerProfile::new_at("learner", t0());
            profile
                .record_interaction_at(answer("c2", false, "2x", "2x+1"), t0())
                .unwrap();
            let events = profile
                .record_interaction_at(answer("c2", false, "2x", "2x+1"), t0() + Duration::hours(1))
                .unwrap();

            let node = &profile.knowledge_nodes["c2"];
            assert_eq!(node.misconceptions.len(), 1);
            assert_eq!(node.misconceptions[0].occurrence_count(), 2);
            assert_eq!(profile.active_misconceptions.len(), 1);
            assert_eq!(profile.active_misconceptions[0].misconception_id, "c2#1");
            assert!(events.iter().any(|e| matches!(
                e,
                UpdateEvent::MisconceptionDetected { occurrence_count: 2, .. }
            )));
        }

        #[test]
        fn two_correct_answers_resolve_misconception() {
            let mut profile = LearnerProfile::new_at("learner", t0());
            profile
                .record_interaction_at(answer("c2", false, "2x", "2x+1"), t0())
                .unwrap();
            profile
                .record_interaction_at(answer("c2", false, "2x", "2x+1"), t0())
                .unwrap();

            profile
                .record_interaction_at(answer("c2", true, "2x+1", "2x+1"), t0() + Duration::hours(1))
                .unwrap();
            assert_eq!(
                profile.knowledge_nodes["c2"].misconceptions[0].status,
                MisconceptionStatus::Resolving
            );
            assert_eq!(profile.active_misconceptions.len(), 1);

            let events = profile
                .record_interaction_at(answer("c2", true, "2x+1", "2x+1"), t0() + Duration::hours(2))
                .unwrap();
            let m = &profile.knowledge_nodes["c2"].misconceptions[0];
            assert_eq!(m.status, MisconceptionStatus::Resolved);
            assert_eq!(m.resolved_at, Some(t0() + Duration::hours(2)));
            assert!(profile.active_misconceptions.is_empty());
            assert_eq!(profile.resolved_misconceptions.len(), 1);
            assert!(events.iter().any(|e| e.kind() == "misconception_resolved"));
        }
    }

    mod schedule_integration_tests {
        use super::*;

        #[test]
        fn incorrect_answers_do_not_schedule() {
            let mut profile = LearnerProfile::new_at("learner", t0());
            let events = profile
                .record_interaction_at(answer("c1", false, "5", "4"), t0())
                .unwrap();
            let node = &profile.knowledge_nodes["c1"];
            assert!(node.next_review_date.is_none());
            assert_eq!(node.review_count, 0);
            assert_eq!(node.ease_factor, INITIAL_EASE_FACTOR);
            assert!(events.iter().all(|e| e.kind() != "review_scheduled"));
        }

        #[test]
        fn intervals_never_shrink_across_correct_reviews() {
            let mut profile = LearnerProfile::new_at("learner", t0());
            let mut previous = profile
                .knowledge_nodes
                .get("c1")
                .map_or(1, |n| n.interval);
            for i in 0..8 {
                profile
                    .record_interaction_at(answer("c1", true, "4", "4"), t0() + Duration::days(i))
                    .unwrap();
                let node = &profile.knowledge_nodes["c1"];
                assert!(node.interval >= previous);
                assert!(node.ease_factor >= crate::schedule::MIN_EASE_FACTOR);
                assert!(node.next_review_date > node.last_reviewed);
                previous = node.interval;
            }
            assert_eq!(profile.knowledge_nodes["c1"].review_count, 8);
        }

        #[test]
        fn long_correct_streak_stays_schedulable() {
            let mut profile = LearnerProfile::new_at("learner", t0());
            let mut previous = 1;
            for _ in 0..100 {
                let events = profile
                    .record_interaction_at(answer("c1", true, "4", "4"), t0())
                    .unwrap();
                let node = &profile.knowledge_nodes["c1"];
                assert!(node.interval >= previous);
                assert!(node.interval <= crate::schedule::MAX_INTERVAL_DAYS);
                assert!(node.next_review_date > node.last_reviewed);
                assert!(node.mastery < 1.0);
                assert!(events.iter().any(|e| e.kind() == "review_scheduled"));
                previous = node.interval;
            }
            assert_eq!(previous, crate::schedule::MAX_INTERVAL_DAYS);

            let before = profile.knowledge_nodes["c1"].mastery;
            profile
                .record_interaction_at(answer("c1", false, "5", "4"), t0())
                .unwrap();
            assert!(profile.knowledge_nodes["c1"].mastery < before);
        }
    }

    mod sequence_tests {
        use super::*;

        // Deterministic linear congruential stream, enough to vary a script
        struct Script(u64);

        impl Script {
            fn next(&mut self) -> u64 {
                self.0 = self
                    .0
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                self.0 >> 33
            }
        }

        #[test]
        fn invariants_hold_across_a_long_mixed_sequence() {
            let concepts = ["c1", "c2", "c3", "c4"];
            let answers = ["2x", "x^2", "2x+1", "0"];
            let mut script = Script(7);
            let mut profile = LearnerProfile::new_at("learner", t0());

            for step in 0..600 {
                let id = concepts[(script.next() % 4) as usize];
                // Skew towards correct answers so long streaks happen
                let correct = script.next() % 5 != 0;
                let given = answers[(script.next() % 4) as usize];
                let mut interaction = answer(id, correct, given, "2x+1");
                if script.next() % 3 == 0 {
                    interaction = interaction.with_confidence((script.next() % 11) as f64 / 10.0);
                }
                let now = t0() + Duration::hours(step);
                let previous_interval = profile.knowledge_nodes.get(id).map(|n| n.interval);

                profile.record_interaction_at(interaction, now).unwrap();

                let node = &profile.knowledge_nodes[id];
                if correct {
                    assert!(node.interval >= previous_interval.unwrap_or(1), "step {}", step);
                    assert_eq!(node.last_reviewed, Some(now));
                }
                for n in profile.knowledge_nodes.values() {
                    assert!((0.0..=1.0).contains(&n.mastery), "step {}", step);
                    assert!((0.0..=1.0).contains(&n.student_confidence), "step {}", step);
                    assert!(n.ease_factor >= crate::schedule::MIN_EASE_FACTOR);
                    if n.last_reviewed.is_some() {
                        assert!(n.next_review_date > n.last_reviewed, "step {}", step);
                    }
                }

                let mean = profile.knowledge_nodes.values().map(|n| n.mastery).sum::<f64>()
                    / profile.knowledge_nodes.len() as f64;
                assert!((profile.overall_mastery - mean).abs() < 1e-9, "step {}", step);
                assert!(
                    profile
                        .overconfident_topics
                        .iter()
                        .all(|t| !profile.underconfident_topics.contains(t)),
                    "step {}",
                    step
                );
                for r in &profile.active_misconceptions {
                    let m = profile.knowledge_nodes[&r.concept_id]
                        .misconceptions
                        .iter()
                        .find(|m| m.id == r.misconception_id)
                        .unwrap();
                    assert!(m.is_confirmed() && m.is_open());
                }
            }

            assert_eq!(profile.total_interactions, 600);
        }
    }

    mod confidence_tests {
        use super::*;

        #[test]
        fn unreported_concepts_are_calibrated() {
            let mut profile = LearnerProfile::new_at("learner", t0());
            for _ in 0..5 {
                profile
                    .record_interaction_at(answer("c1", true, "4", "4"), t0())
                    .unwrap();
            }
            let node = &profile.knowledge_nodes["c1"];
            assert_eq!(node.student_confidence, node.mastery);
            assert_eq!(node.confidence, 1.0);
            assert!(profile.overconfident_topics.is_empty());
            assert!(profile.underconfident_topics.is_empty());
        }

        #[test]
        fn high_self_report_on_weak_concept_is_overconfident() {
            let mut profile = LearnerProfile::new_at("learner", t0());
            let events = profile
                .record_interaction_at(answer("c1", false, "5", "4").with_confidence(0.9), t0())
                .unwrap();

            let node = &profile.knowledge_nodes["c1"];
            assert!((node.confidence - (1.0 - (0.9 - node.mastery))).abs() < 1e-12);
            assert_eq!(profile.overconfident_topics, vec!["Concept c1".to_string()]);
            assert!(profile.underconfident_topics.is_empty());
            assert!(events.iter().any(|e| matches!(
                e,
                UpdateEvent::ConfidenceUpdate {
                    calibration: Calibration::Overconfident,
                    ..
                }
            )));
        }

        #[test]
        fn classification_moves_between_lists() {
            let mut profile = LearnerProfile::new_at("learner", t0());
            profile
                .record_interaction_at(answer("c1", true, "4", "4").with_confidence(0.0), t0())
                .unwrap();
            profile
                .record_interaction_at(answer("c1", true, "4", "4"), t0())
                .unwrap();
            // mastery is now well above the remembered self-report of 0
            assert_eq!(profile.underconfident_topics, vec!["Concept c1".to_string()]);

            profile
                .record_interaction_at(answer("c1", true, "4", "4").with_confidence(1.0), t0())
                .unwrap();
            assert!(profile.underconfident_topics.is_empty());
            for name in &profile.overconfident_topics {
                assert!(!profile.underconfident_topics.contains(name));
            }
        }

        #[test]
        fn classify_thresholds() {
            assert_eq!(classify_calibration(0.71, 0.5), Calibration::Overconfident);
            assert_eq!(classify_calibration(0.29, 0.5), Calibration::Underconfident);
            assert_eq!(classify_calibration(0.6, 0.5), Calibration::Calibrated);
        }
    }

    mod aggregate_tests {
        use super::*;

        #[test]
        fn overall_mastery_is_the_mean_of_nodes() {
            let mut profile = LearnerProfile::new_at("learner", t0());
            let script = [
                ("c1", true),
                ("c2", false),
                ("c1", true),
                ("c3", true),
                ("c2", true),
                ("c1", false),
            ];
            for (id, correct) in script {
                profile
                    .record_interaction_at(answer(id, correct, "x", "x"), t0())
                    .unwrap();
                let mean = profile.knowledge_nodes.values().map(|n| n.mastery).sum::<f64>()
                    / profile.knowledge_nodes.len() as f64;
                assert!((profile.overall_mastery - mean).abs() < 1e-12);
                assert_eq!(
                    profile.concepts_mastered
                        + profile.concepts_learning
                        + profile.concepts_struggling,
                    profile.knowledge_nodes.len()
                );
            }
            assert_eq!(profile.total_interactions, script.len() as u64);
        }

        #[test]
        fn curriculum_refs_and_blooms_are_merged() {
            let mut profile = LearnerProfile::new_at("learner", t0());
            profile
                .record_interaction_at(
                    answer("c1", true, "4", "4")
                        .with_curriculum_refs(vec!["CCSS.8.EE".into(), "CCSS.8.F".into()])
                        .with_blooms_level(BloomsLevel::Apply),
                    t0(),
                )
                .unwrap();
            profile
                .record_interaction_at(
                    answer("c1", true, "4", "4")
                        .with_curriculum_refs(vec!["CCSS.8.F".into()])
                        .with_blooms_level(BloomsLevel::Remember),
                    t0(),
                )
                .unwrap();

            let node = &profile.knowledge_nodes["c1"];
            assert_eq!(node.curriculum_refs, vec!["CCSS.8.EE", "CCSS.8.F"]);
            assert_eq!(node.blooms_level, Some(BloomsLevel::Apply));
            assert_eq!(node.correct_count, 2);
        }

        #[test]
        fn refresh_drops_stale_references() {
            let mut profile = LearnerProfile::new_at("learner", t0());
            profile.active_misconceptions.push(MisconceptionRef {
                concept_id: "ghost".into(),
                misconception_id: "ghost#1".into(),
            });
            profile.refresh_aggregates();
            assert!(profile.active_misconceptions.is_empty());
        }
    }
}
