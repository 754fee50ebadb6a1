//! Bayesian Knowledge Tracing: one posterior step per graded answer.

/// P(wrong | mastered)
pub const SLIP: f64 = 0.1;
/// P(correct | not mastered)
pub const GUESS: f64 = 0.25;

const EPSILON: f64 = 1e-12;

/// Posteriors stay this far inside (0, 1) so that rounding can never land on
/// an absorbing boundary.
pub const MASTERY_MARGIN: f64 = 1e-9;

/// Posterior mastery after observing one answer.
///
/// Priors at (or beyond) 0 and 1 are absorbing and returned unchanged, so the
/// denominator can never vanish. Every other prior yields a posterior within
/// [`MASTERY_MARGIN`] of the open interval's edges. Non-finite priors are
/// treated as the empty belief.
pub fn update_mastery(prior: f64, is_correct: bool) -> f64 {
    if !prior.is_finite() {
        return 0.0;
    }
    if prior <= 0.0 {
        return 0.0;
    }
    if prior >= 1.0 {
        return 1.0;
    }

    let (evidence_mastered, evidence_unmastered) = if is_correct {
        ((1.0 - SLIP) * prior, GUESS * (1.0 - prior))
    } else {
        (SLIP * prior, (1.0 - GUESS) * (1.0 - prior))
    };

    let denominator = evidence_mastered + evidence_unmastered;
    if denominator <= EPSILON {
        return prior;
    }

    (evidence_mastered / denominator).clamp(MASTERY_MARGIN, 1.0 - MASTERY_MARGIN)
}
