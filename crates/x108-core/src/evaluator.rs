// ─────────────────────────────────────────────────────────────────────
// X-108 Gate — Evaluator
// ─────────────────────────────────────────────────────────────────────
//! The pure decision function.
//!
//! Checks run in a fixed order and the first failure wins:
//! 1. safety (only when the request carries a safety score)
//! 2. coherence
//! 3. temporal hold (only when a prior qualifying action exists)
//!
//! The evaluator never reads a clock and never touches shared state:
//! the caller passes `now` and the current `GateState` in and receives
//! the decision plus the state to persist.

use x108_types::decision::round_ms;
use x108_types::{ActionRequest, GateDecision, GateDetails, GatePolicy, GateReason, GateState};

/// Evaluate one proposed action.
///
/// Returns the decision and the state to persist. The state only changes
/// when the decision is ACT and the request carries a positive amount;
/// zero-amount actions never start a hold window.
///
/// Inputs are assumed validated (`GatePolicy::check_request`). Scores are
/// compared as given, without clamping. A `now` earlier than the stored
/// timestamp yields a negative elapsed time and therefore a HOLD.
/// Every comparison fails closed: a NaN score, a non-finite `now` or a
/// NaN stored timestamp all yield HOLD.
pub fn evaluate(
    request: &ActionRequest,
    state: &GateState,
    policy: &GatePolicy,
    now: f64,
) -> (GateDecision, GateState) {
    let decision = decide(request, state, policy, now);

    let new_state = if decision.allow() && request.is_irreversible() {
        log::debug!("gate armed at {now:.3} by {} USDC -> {}", request.amount, request.recipient);
        GateState::armed_at(now)
    } else {
        *state
    };

    (decision, new_state)
}

/// `value >= floor`, false for NaN on either side.
#[inline]
fn meets(value: f64, floor: f64) -> bool {
    value >= floor
}

fn decide(
    request: &ActionRequest,
    state: &GateState,
    policy: &GatePolicy,
    now: f64,
) -> GateDecision {
    let audit = GateDetails {
        amount: Some(request.amount),
        recipient: Some(request.recipient.clone()),
        coherence_score: Some(request.coherence_score),
        evaluated_at: Some(now),
        ..Default::default()
    };

    // Check 1: Safety score
    if let Some(safety) = request.safety_score {
        if !meets(safety, policy.safety_threshold) {
            log::warn!(
                "HOLD: safety score {safety:.4} < threshold {}",
                policy.safety_threshold
            );
            return GateDecision::new(
                GateReason::SafetyBelowThreshold,
                GateDetails {
                    safety_score: Some(safety),
                    safety_threshold: Some(policy.safety_threshold),
                    ..audit
                },
            );
        }
    }

    // Check 2: Coherence
    if !meets(request.coherence_score, policy.coherence_threshold) {
        log::warn!(
            "HOLD: coherence {:.4} < threshold {}",
            request.coherence_score,
            policy.coherence_threshold
        );
        return GateDecision::new(
            GateReason::CoherenceBelowThreshold,
            GateDetails {
                coherence_threshold: Some(policy.coherence_threshold),
                ..audit
            },
        );
    }

    // Check 3: Temporal hold
    let elapsed = state.last_signal_ts.map(|last| now - last);
    let window_open =
        now.is_finite() && elapsed.map_or(true, |e| meets(e, policy.min_hold_seconds));
    if !window_open {
        log::warn!(
            "HOLD: {:.3}s elapsed < {}s hold window (now={now})",
            elapsed.unwrap_or(f64::NAN),
            policy.min_hold_seconds
        );
        return GateDecision::new(
            GateReason::TemporalHold,
            GateDetails {
                elapsed_seconds: elapsed.map(round_ms),
                min_hold_seconds: Some(round_ms(policy.min_hold_seconds)),
                temporal_passed: Some(false),
                ..audit
            },
        );
    }
    let elapsed_seconds = elapsed.map(round_ms);

    log::info!(
        "ACT: {} USDC -> {} (coherence {:.4})",
        request.amount,
        request.recipient,
        request.coherence_score
    );
    GateDecision::new(
        GateReason::Passed,
        GateDetails {
            safety_score: request.safety_score,
            safety_threshold: request.safety_score.map(|_| policy.safety_threshold),
            coherence_threshold: Some(policy.coherence_threshold),
            elapsed_seconds,
            min_hold_seconds: Some(round_ms(policy.min_hold_seconds)),
            temporal_passed: Some(true),
            ..audit
        },
    )
}
