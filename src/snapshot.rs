//! Snapshot format for handing a profile to and from storage.
//!
//! JSON, with the concept map written as an explicit list of `{key, value}`
//! pairs and every timestamp in RFC 3339.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::models::{LearnerProfile, INITIAL_INTERVAL, INITIAL_MASTERY};
use crate::schedule::{MAX_INTERVAL_DAYS, MIN_EASE_FACTOR};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    profile: &'a LearnerProfile,
}

#[derive(Deserialize)]
struct Snapshot {
    version: u32,
    profile: LearnerProfile,
}

/// Serde adapter: `BTreeMap<String, KnowledgeNode>` <-> `[{key, value}, ...]`.
pub mod node_entries {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::models::KnowledgeNode;

    #[derive(Serialize)]
    struct EntryRef<'a> {
        key: &'a str,
        value: &'a KnowledgeNode,
    }

    #[derive(Deserialize)]
    struct Entry {
        key: String,
        value: KnowledgeNode,
    }

    pub fn serialize<S>(
        nodes: &BTreeMap<String, KnowledgeNode>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(nodes.iter().map(|(key, value)| EntryRef { key, value }))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<String, KnowledgeNode>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let entries = Vec::<Entry>::deserialize(deserializer)?;
        Ok(entries.into_iter().map(|e| (e.key, e.value)).collect())
    }
}

pub fn serialize(profile: &LearnerProfile) -> Result<String> {
    let snapshot = SnapshotRef {
        version: SNAPSHOT_VERSION,
        profile,
    };
    Ok(serde_json::to_string(&snapshot)?)
}

/// Parse a snapshot, surfacing any corruption as an error.
pub fn try_deserialize(snapshot: &str) -> Result<LearnerProfile> {
    let parsed: Snapshot = serde_json::from_str(snapshot)?;
    if parsed.version != SNAPSHOT_VERSION {
        return Err(Error::Snapshot(<serde_json::Error as serde::de::Error>::custom(
            format!("unsupported snapshot version {}", parsed.version),
        )));
    }

    let mut profile = parsed.profile;
    sanitize(&mut profile);
    Ok(profile)
}

/// Parse a snapshot for `learner_id`. A corrupt snapshot yields a fresh,
/// empty profile rather than an error.
pub fn deserialize(learner_id: &str, snapshot: &str) -> LearnerProfile {
    match try_deserialize(snapshot) {
        Ok(mut profile) => {
            profile.learner_id = learner_id.to_string();
            profile
        }
        Err(e) => {
            warn!(learner_id, error = %e, "discarding unreadable profile snapshot");
            LearnerProfile::new(learner_id)
        }
    }
}

// Stored data is not trusted: pull every numeric field back into range
fn sanitize(profile: &mut LearnerProfile) {
    for (key, node) in profile.knowledge_nodes.iter_mut() {
        node.concept_id = key.clone();
        node.mastery = unit_or(node.mastery, INITIAL_MASTERY);
        node.student_confidence = unit_or(node.student_confidence, node.mastery);
        node.confidence = unit_or(node.confidence, 0.0);
        if !node.ease_factor.is_finite() || node.ease_factor < MIN_EASE_FACTOR {
            node.ease_factor = MIN_EASE_FACTOR;
        }
        node.interval = node.interval.clamp(INITIAL_INTERVAL, MAX_INTERVAL_DAYS);
    }
    profile.refresh_aggregates();
}

fn unit_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        fallback
    }
}
