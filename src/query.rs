//! Read-only views over a learner profile. Nothing here mutates state.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::models::{
    ConceptCluster, ConceptMastery, ConfidenceDivergenceReport, KnowledgeNode, LearnerProfile,
    LearningMode, MasteryBand, MisconceptionSummary, ProfileStats, ReviewItem, SubjectSummary,
    MASTERED_THRESHOLD,
};

const TOP_CONCEPTS: usize = 3;
const FOCUS_CONCEPTS: usize = 5;
const PRACTICE_THRESHOLD: f64 = 0.6;

// Low mastery and long intervals first
pub fn review_priority(node: &KnowledgeNode) -> f64 {
    (1.0 - node.mastery) * 10.0 + f64::from(node.interval)
}

pub fn suggest_mode(average_mastery: f64, active_misconceptions: usize) -> LearningMode {
    if average_mastery >= MASTERED_THRESHOLD {
        LearningMode::Review
    } else if average_mastery >= PRACTICE_THRESHOLD {
        LearningMode::Practice
    } else if active_misconceptions > 0 {
        LearningMode::Debug
    } else {
        LearningMode::Learn
    }
}

fn by_mastery(a: &&KnowledgeNode, b: &&KnowledgeNode) -> Ordering {
    a.mastery
        .total_cmp(&b.mastery)
        .then_with(|| a.concept_id.cmp(&b.concept_id))
}

fn concept_mastery(node: &KnowledgeNode) -> ConceptMastery {
    ConceptMastery {
        concept_id: node.concept_id.clone(),
        concept_name: node.concept_name.clone(),
        mastery: node.mastery,
    }
}

fn average(nodes: &[&KnowledgeNode]) -> f64 {
    if nodes.is_empty() {
        0.0
    } else {
        nodes.iter().map(|n| n.mastery).sum::<f64>() / nodes.len() as f64
    }
}

impl LearnerProfile {
    pub fn get_node(&self, concept_id: &str) -> Option<&KnowledgeNode> {
        self.knowledge_nodes.get(concept_id)
    }

    /// Current mastery, or 0 for a concept the learner has never touched.
    pub fn get_node_mastery(&self, concept_id: &str) -> f64 {
        self.get_node(concept_id).map_or(0.0, |n| n.mastery)
    }

    pub fn review_due(&self) -> Vec<ReviewItem> {
        self.review_due_at(Utc::now())
    }

    pub fn review_due_at(&self, now: DateTime<Utc>) -> Vec<ReviewItem> {
        let mut due: Vec<ReviewItem> = self
            .knowledge_nodes
            .values()
            .filter_map(|node| {
                let next_review_date = node.next_review_date.filter(|next| *next <= now)?;
                Some(ReviewItem {
                    concept_id: node.concept_id.clone(),
                    concept_name: node.concept_name.clone(),
                    subject: node.subject.clone(),
                    topic: node.topic.clone(),
                    mastery: node.mastery,
                    interval: node.interval,
                    next_review_date,
                    priority: review_priority(node),
                })
            })
            .collect();

        due.sort_by(|a, b| {
            b.priority
                .total_cmp(&a.priority)
                .then_with(|| a.concept_id.cmp(&b.concept_id))
        });
        due
    }

    pub fn subject_summaries(&self) -> Vec<SubjectSummary> {
        let mut by_subject: BTreeMap<&str, Vec<&KnowledgeNode>> = BTreeMap::new();
        for node in self.knowledge_nodes.values() {
            by_subject.entry(node.subject.as_str()).or_default().push(node);
        }

        by_subject
            .into_iter()
            .map(|(subject, mut nodes)| {
                nodes.sort_by(by_mastery);

                let count_band =
                    |band: MasteryBand| nodes.iter().filter(|n| n.band() == band).count();

                SubjectSummary {
                    subject: subject.to_string(),
                    total_concepts: nodes.len(),
                    mastered: count_band(MasteryBand::Mastered),
                    learning: count_band(MasteryBand::Learning),
                    struggling: count_band(MasteryBand::Struggling),
                    average_mastery: average(&nodes),
                    active_misconceptions: nodes
                        .iter()
                        .map(|n| n.open_misconception_count())
                        .sum(),
                    strongest: nodes
                        .iter()
                        .rev()
                        .take(TOP_CONCEPTS)
                        .map(|n| concept_mastery(n))
                        .collect(),
                    weakest: nodes
                        .iter()
                        .take(TOP_CONCEPTS)
                        .map(|n| concept_mastery(n))
                        .collect(),
                    recommended_focus: nodes
                        .iter()
                        .filter(|n| n.mastery < MASTERED_THRESHOLD)
                        .take(FOCUS_CONCEPTS)
                        .map(|n| concept_mastery(n))
                        .collect(),
                }
            })
            .collect()
    }

    pub fn concept_clusters(&self) -> Vec<ConceptCluster> {
        let mut clusters: BTreeMap<String, Vec<&KnowledgeNode>> = BTreeMap::new();
        for node in self.knowledge_nodes.values() {
            clusters
                .entry(format!("{}:{}", node.subject, node.topic))
                .or_default()
                .push(node);
        }

        clusters
            .into_iter()
            .map(|(key, nodes)| {
                let average_mastery = average(&nodes);
                let active_misconceptions = nodes
                    .iter()
                    .map(|n| n.open_misconception_count())
                    .sum();
                ConceptCluster {
                    subject: nodes[0].subject.clone(),
                    topic: nodes[0].topic.clone(),
                    concept_ids: nodes.iter().map(|n| n.concept_id.clone()).collect(),
                    average_mastery,
                    active_misconceptions,
                    suggested_mode: suggest_mode(average_mastery, active_misconceptions),
                    key,
                }
            })
            .collect()
    }

    pub fn active_misconceptions(&self) -> Vec<MisconceptionSummary> {
        self.active_misconceptions
            .iter()
            .filter_map(|r| {
                let node = self.knowledge_nodes.get(&r.concept_id)?;
                let m = node
                    .misconceptions
                    .iter()
                    .find(|m| m.id == r.misconception_id)?;
                Some(MisconceptionSummary {
                    concept_id: node.concept_id.clone(),
                    concept_name: node.concept_name.clone(),
                    misconception_id: m.id.clone(),
                    pattern: m.pattern.clone(),
                    occurrence_count: m.occurrence_count(),
                    status: m.status,
                })
            })
            .collect()
    }

    pub fn confidence_divergence(&self) -> ConfidenceDivergenceReport {
        ConfidenceDivergenceReport {
            overconfident: self.overconfident_topics.clone(),
            underconfident: self.underconfident_topics.clone(),
            avg_divergence: self.confidence_divergence,
        }
    }

    pub fn stats(&self) -> ProfileStats {
        self.stats_at(Utc::now())
    }

    pub fn stats_at(&self, now: DateTime<Utc>) -> ProfileStats {
        ProfileStats {
            total_concepts: self.knowledge_nodes.len(),
            mastered: self.concepts_mastered,
            learning: self.concepts_learning,
            struggling: self.concepts_struggling,
            overall_mastery: self.overall_mastery,
            due_now: self
                .knowledge_nodes
                .values()
                .filter(|n| n.is_due(now))
                .count(),
            total_interactions: self.total_interactions,
            active_misconceptions: self.active_misconceptions.len(),
        }
    }
}
