//! SM-2 style review scheduling, driven by the current mastery estimate.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::models::KnowledgeNode;

pub const MIN_EASE_FACTOR: f64 = 1.3;
/// Upper bound on a review interval, roughly a century.
pub const MAX_INTERVAL_DAYS: u32 = 36_500;

const FIRST_INTERVAL: u32 = 1;
const SECOND_INTERVAL: u32 = 6;

// Map mastery onto the 0-5 SM-2 quality scale
pub fn quality_from_mastery(mastery: f64) -> u8 {
    (mastery.clamp(0.0, 1.0) * 5.0).round() as u8
}

pub fn next_ease_factor(ease_factor: f64, quality: u8) -> f64 {
    let miss = 5.0 - f64::from(quality.min(5));
    let ease = ease_factor + 0.1 - miss * (0.08 + miss * 0.02);
    ease.max(MIN_EASE_FACTOR)
}

/// Interval in days for the review about to be recorded.
///
/// `review_count` is the number of reviews completed before this one. The
/// result never shrinks below `previous_interval` and never grows past
/// [`MAX_INTERVAL_DAYS`].
pub fn next_interval(review_count: u32, previous_interval: u32, ease_factor: f64) -> u32 {
    let interval = match review_count {
        0 => FIRST_INTERVAL,
        1 => SECOND_INTERVAL,
        _ => (f64::from(previous_interval) * ease_factor).round() as u32,
    };
    interval
        .min(MAX_INTERVAL_DAYS)
        .max(previous_interval)
        .max(FIRST_INTERVAL)
}

// Saturates at the end of chrono's range instead of overflowing
fn due_date(now: DateTime<Utc>, interval: u32) -> DateTime<Utc> {
    now.checked_add_signed(Duration::days(i64::from(interval)))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Apply one successful review to `node` and return the new interval and due date.
pub fn schedule_review(node: &mut KnowledgeNode, now: DateTime<Utc>) -> (u32, DateTime<Utc>) {
    let quality = quality_from_mastery(node.mastery);
    let ease_factor = next_ease_factor(node.ease_factor, quality);
    let interval = next_interval(node.review_count, node.interval, ease_factor);
    let next_review = due_date(now, interval);

    node.ease_factor = ease_factor;
    node.interval = interval;
    node.next_review_date = Some(next_review);
    node.last_reviewed = Some(now);
    node.review_count = node.review_count.saturating_add(1);

    debug!(
        concept_id = %node.concept_id,
        quality,
        ease_factor = node.ease_factor,
        interval = node.interval,
        "review scheduled"
    );

    (node.interval, next_review)
}
