use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const INITIAL_MASTERY: f64 = 0.1;
pub const INITIAL_CONFIDENCE: f64 = 0.1;
pub const INITIAL_EASE_FACTOR: f64 = 2.5;
pub const INITIAL_INTERVAL: u32 = 1;

pub const MASTERED_THRESHOLD: f64 = 0.8;
pub const LEARNING_THRESHOLD: f64 = 0.3;

// Tutoring modes; doubles as the suggested mode of a concept cluster
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LearningMode {
    #[default]
    Learn,
    Practice,
    Review,
    Debug,
}

impl LearningMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LearningMode::Learn => "learn",
            LearningMode::Practice => "practice",
            LearningMode::Review => "review",
            LearningMode::Debug => "debug",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "learn" | "l" => Some(LearningMode::Learn),
            "practice" | "p" => Some(LearningMode::Practice),
            "review" | "r" => Some(LearningMode::Review),
            "debug" | "d" => Some(LearningMode::Debug),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LearningMode::Learn => "LEARN",
            LearningMode::Practice => "PRACTICE",
            LearningMode::Review => "REVIEW",
            LearningMode::Debug => "DEBUG",
        }
    }
}

// Bloom's taxonomy, lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BloomsLevel {
    Remember = 1,
    Understand = 2,
    Apply = 3,
    Analyze = 4,
    Evaluate = 5,
    Create = 6,
}

impl BloomsLevel {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            1 => Some(BloomsLevel::Remember),
            2 => Some(BloomsLevel::Understand),
            3 => Some(BloomsLevel::Apply),
            4 => Some(BloomsLevel::Analyze),
            5 => Some(BloomsLevel::Evaluate),
            6 => Some(BloomsLevel::Create),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BloomsLevel::Remember => "Remember",
            BloomsLevel::Understand => "Understand",
            BloomsLevel::Apply => "Apply",
            BloomsLevel::Analyze => "Analyze",
            BloomsLevel::Evaluate => "Evaluate",
            BloomsLevel::Create => "Create",
        }
    }

    /// Accepts a level name or its number, 1 to 6.
    pub fn from_str(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        if let Ok(n) = s.parse::<i32>() {
            return Self::from_i32(n);
        }
        match s.as_str() {
            "remember" => Some(BloomsLevel::Remember),
            "understand" => Some(BloomsLevel::Understand),
            "apply" => Some(BloomsLevel::Apply),
            "analyze" | "analyse" => Some(BloomsLevel::Analyze),
            "evaluate" => Some(BloomsLevel::Evaluate),
            "create" => Some(BloomsLevel::Create),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MasteryBand {
    Mastered,
    Learning,
    Struggling,
}

impl MasteryBand {
    pub fn from_mastery(mastery: f64) -> Self {
        if mastery >= MASTERED_THRESHOLD {
            MasteryBand::Mastered
        } else if mastery >= LEARNING_THRESHOLD {
            MasteryBand::Learning
        } else {
            MasteryBand::Struggling
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MasteryBand::Mastered => "Mastered",
            MasteryBand::Learning => "Learning",
            MasteryBand::Struggling => "Struggling",
        }
    }
}

/// Lifecycle of a misconception. `Resolved` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MisconceptionStatus {
    Active,
    Resolving,
    Resolved,
}

impl MisconceptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MisconceptionStatus::Active => "active",
            MisconceptionStatus::Resolving => "resolving",
            MisconceptionStatus::Resolved => "resolved",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "active" => Some(MisconceptionStatus::Active),
            "resolving" => Some(MisconceptionStatus::Resolving),
            "resolved" => Some(MisconceptionStatus::Resolved),
            _ => None,
        }
    }

    pub fn is_open(&self) -> bool {
        !matches!(self, MisconceptionStatus::Resolved)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MisconceptionOccurrence {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub learner_answer: String,
    pub expected_answer: String,
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Misconception {
    pub id: String,
    pub pattern: String,
    pub correct_understanding: String,
    pub occurrences: Vec<MisconceptionOccurrence>,
    pub status: MisconceptionStatus,
    pub first_detected: DateTime<Utc>,
    pub last_detected: DateTime<Utc>,
    #[serde(default)]
    pub resolution_attempts: u32,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Misconception {
    pub fn occurrence_count(&self) -> usize {
        self.occurrences.len()
    }

    // A single unmatched error only opens a placeholder; a second occurrence confirms it
    pub fn is_confirmed(&self) -> bool {
        self.occurrences.len() >= 2
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeNode {
    pub concept_id: String,
    pub concept_name: String,
    pub subject: String,
    pub topic: String,

    pub mastery: f64,
    pub confidence: f64,
    pub student_confidence: f64,
    #[serde(default)]
    pub confidence_reported: bool,

    // Spaced repetition
    pub ease_factor: f64,
    pub interval: u32,
    pub review_count: u32,
    pub last_reviewed: Option<DateTime<Utc>>,
    pub next_review_date: Option<DateTime<Utc>>,

    pub misconceptions: Vec<Misconception>,

    pub interaction_count: u32,
    #[serde(default)]
    pub correct_count: u32,
    pub first_encountered: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,

    #[serde(default)]
    pub curriculum_refs: Vec<String>,
    #[serde(default)]
    pub blooms_level: Option<BloomsLevel>,
}

impl KnowledgeNode {
    pub fn new(
        concept_id: impl Into<String>,
        concept_name: impl Into<String>,
        subject: impl Into<String>,
        topic: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            concept_id: concept_id.into(),
            concept_name: concept_name.into(),
            subject: subject.into(),
            topic: topic.into(),
            mastery: INITIAL_MASTERY,
            confidence: INITIAL_CONFIDENCE,
            student_confidence: INITIAL_MASTERY,
            confidence_reported: false,
            ease_factor: INITIAL_EASE_FACTOR,
            interval: INITIAL_INTERVAL,
            review_count: 0,
            last_reviewed: None,
            next_review_date: None,
            misconceptions: Vec::new(),
            interaction_count: 0,
            correct_count: 0,
            first_encountered: now,
            last_updated: now,
            curriculum_refs: Vec::new(),
            blooms_level: None,
        }
    }

    pub fn band(&self) -> MasteryBand {
        MasteryBand::from_mastery(self.mastery)
    }

    pub fn divergence(&self) -> f64 {
        (self.student_confidence - self.mastery).abs()
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review_date.is_some_and(|next| next <= now)
    }

    /// Confirmed misconceptions that have not been resolved yet.
    pub fn open_misconception_count(&self) -> usize {
        self.misconceptions
            .iter()
            .filter(|m| m.is_confirmed() && m.is_open())
            .count()
    }

    pub fn accuracy(&self) -> f64 {
        if self.interaction_count == 0 {
            0.0
        } else {
            (self.correct_count as f64 / self.interaction_count as f64) * 100.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MisconceptionRef {
    pub concept_id: String,
    pub misconception_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerProfile {
    pub learner_id: String,
    #[serde(with = "crate::snapshot::node_entries")]
    pub knowledge_nodes: BTreeMap<String, KnowledgeNode>,

    pub concepts_mastered: usize,
    pub concepts_learning: usize,
    pub concepts_struggling: usize,
    pub overall_mastery: f64,

    pub active_misconceptions: Vec<MisconceptionRef>,
    pub resolved_misconceptions: Vec<MisconceptionRef>,

    pub overconfident_topics: Vec<String>,
    pub underconfident_topics: Vec<String>,
    pub confidence_divergence: f64,

    #[serde(default)]
    pub total_interactions: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LearnerProfile {
    pub fn new(learner_id: impl Into<String>) -> Self {
        Self::new_at(learner_id, Utc::now())
    }

    pub fn new_at(learner_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            learner_id: learner_id.into(),
            knowledge_nodes: BTreeMap::new(),
            concepts_mastered: 0,
            concepts_learning: 0,
            concepts_struggling: 0,
            overall_mastery: 0.0,
            active_misconceptions: Vec::new(),
            resolved_misconceptions: Vec::new(),
            overconfident_topics: Vec::new(),
            underconfident_topics: Vec::new(),
            confidence_divergence: 0.0,
            total_interactions: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Calibration {
    Overconfident,
    Underconfident,
    Calibrated,
}

/// One distinct change produced by an interaction, for observers and UIs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpdateEvent {
    ConceptEncountered {
        concept_id: String,
        concept_name: String,
    },
    MasteryUpdate {
        concept_id: String,
        previous: f64,
        current: f64,
    },
    MisconceptionDetected {
        concept_id: String,
        misconception_id: String,
        pattern: String,
        occurrence_count: usize,
    },
    MisconceptionResolved {
        concept_id: String,
        misconception_id: String,
        pattern: String,
    },
    ConfidenceUpdate {
        concept_id: String,
        student_confidence: f64,
        mastery: f64,
        calibration: Calibration,
    },
    ReviewScheduled {
        concept_id: String,
        interval: u32,
        next_review_date: DateTime<Utc>,
    },
}

impl UpdateEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            UpdateEvent::ConceptEncountered { .. } => "concept_encountered",
            UpdateEvent::MasteryUpdate { .. } => "mastery_update",
            UpdateEvent::MisconceptionDetected { .. } => "misconception_detected",
            UpdateEvent::MisconceptionResolved { .. } => "misconception_resolved",
            UpdateEvent::ConfidenceUpdate { .. } => "confidence_update",
            UpdateEvent::ReviewScheduled { .. } => "review_scheduled",
        }
    }
}

// === Query views ===

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewItem {
    pub concept_id: String,
    pub concept_name: String,
    pub subject: String,
    pub topic: String,
    pub mastery: f64,
    pub interval: u32,
    pub next_review_date: DateTime<Utc>,
    pub priority: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptMastery {
    pub concept_id: String,
    pub concept_name: String,
    pub mastery: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectSummary {
    pub subject: String,
    pub total_concepts: usize,
    pub mastered: usize,
    pub learning: usize,
    pub struggling: usize,
    pub average_mastery: f64,
    pub active_misconceptions: usize,
    pub strongest: Vec<ConceptMastery>,
    pub weakest: Vec<ConceptMastery>,
    pub recommended_focus: Vec<ConceptMastery>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptCluster {
    pub key: String,
    pub subject: String,
    pub topic: String,
    pub concept_ids: Vec<String>,
    pub average_mastery: f64,
    pub active_misconceptions: usize,
    pub suggested_mode: LearningMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MisconceptionSummary {
    pub concept_id: String,
    pub concept_name: String,
    pub misconception_id: String,
    pub pattern: String,
    pub occurrence_count: usize,
    pub status: MisconceptionStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceDivergenceReport {
    pub overconfident: Vec<String>,
    pub underconfident: Vec<String>,
    pub avg_divergence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileStats {
    pub total_concepts: usize,
    pub mastered: usize,
    pub learning: usize,
    pub struggling: usize,
    pub overall_mastery: f64,
    pub due_now: usize,
    pub total_interactions: u64,
    pub active_misconceptions: usize,
}

// JSON output wrapper for CLI
#[derive(Debug, Serialize)]
pub struct JsonOutput<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> JsonOutput<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
