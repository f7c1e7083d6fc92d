// ─────────────────────────────────────────────────────────────────────
// X-108 Gate — End-to-End Payment Scenarios
// ─────────────────────────────────────────────────────────────────────

use x108_core::{dispatch, evaluate, InMemoryFeed, SafetyGate, SimulatedPayments};
use x108_types::{ActionRequest, GateAction, GatePolicy, GateReason, GateState};

const T: f64 = 1_700_000_000.0;

fn request(intent: &str, amount: f64, recipient: &str, coherence: f64) -> ActionRequest {
    ActionRequest::payment(amount, recipient)
        .with_intent(intent)
        .with_coherence(coherence)
}

#[test]
fn test_scenario_sequence_pure() {
    let policy = GatePolicy::guard();

    // 1. Normal payment, no prior state.
    let s0 = GateState::new();
    let (d1, s1) = evaluate(&request("buy_api", 3.0, "api_provider", 1.0), &s0, &policy, T);
    assert_eq!(d1.action(), GateAction::Act);
    assert_eq!(s1.last_signal_ts, Some(T));

    // 2. Same agent, two seconds later.
    let (d2, s2) = evaluate(
        &request("buy_data", 2.0, "data_provider", 1.0),
        &s1,
        &policy,
        T + 2.0,
    );
    assert_eq!(d2.action(), GateAction::Hold);
    assert_eq!(d2.reason(), GateReason::TemporalHold);
    assert_eq!(d2.details().elapsed_seconds, Some(2.0));
    assert_eq!(s2, s1);

    // 3. Low coherence, no prior state: blocked regardless of timing.
    for now in [T, T + 2.0, T + 1_000.0] {
        let (d3, s3) = evaluate(
            &request("suspicious_action", 5.0, "unknown_merchant", 0.3),
            &GateState::new(),
            &policy,
            now,
        );
        assert_eq!(d3.reason(), GateReason::CoherenceBelowThreshold);
        assert_eq!(s3, GateState::new());
    }

    // 4. Continuing scenario 1, after the window.
    let (d4, s4) = evaluate(
        &request("buy_compute", 4.0, "compute_provider", 1.0),
        &s2,
        &policy,
        T + 11.0,
    );
    assert_eq!(d4.action(), GateAction::Act);
    assert_eq!(s4.last_signal_ts, Some(T + 11.0));

    // 5. High coherence as the very first call.
    let (d5, _) = evaluate(
        &request("buy_premium_api", 7.0, "trusted_provider", 0.95),
        &GateState::new(),
        &policy,
        T,
    );
    assert_eq!(d5.action(), GateAction::Act);
}

#[test]
fn test_scenario_sequence_through_gate_and_collaborators() {
    let gate = SafetyGate::default();
    let payments = SimulatedPayments::new();
    let feed = InMemoryFeed::default();

    let steps = [
        (request("buy_api", 3.0, "api_provider", 1.0), T, true),
        (request("buy_data", 2.0, "data_provider", 1.0), T + 2.0, false),
        (request("suspicious_action", 5.0, "unknown_merchant", 0.3), T + 4.0, false),
        (request("buy_compute", 4.0, "compute_provider", 1.0), T + 14.0, true),
    ];

    for (req, now, expect_allow) in steps {
        let decision = gate.evaluate(&req, now).unwrap();
        assert_eq!(decision.allow(), expect_allow, "{} at {now}", req.intent);
        let out = dispatch(decision, Some(&payments), Some(&feed));
        assert_eq!(out.payment_submitted(), expect_allow);
    }

    assert_eq!(payments.submitted().len(), 2);
    assert!((payments.total_submitted() - 7.0).abs() < 1e-12);
    let stats = feed.stats();
    assert_eq!(stats.total_posts, 4);
    assert_eq!(stats.allowed_posts, 2);
    assert_eq!(stats.blocked_posts, 2);
    assert_eq!(gate.state().last_signal_ts, Some(T + 14.0));
}

#[test]
fn test_informational_action_never_starts_hold() {
    let gate = SafetyGate::default();
    let info = request("quote_lookup", 0.0, "api_provider", 1.0);
    for i in 0..5 {
        assert!(gate.evaluate(&info, T + f64::from(i)).unwrap().allow());
    }
    assert!(!gate.state().is_armed());
    let pay = request("buy_api", 1.0, "api_provider", 1.0);
    assert!(gate.evaluate(&pay, T + 5.0).unwrap().allow());
}

#[test]
fn test_strict_preset_scenarios() {
    let gate = SafetyGate::new(GatePolicy::strict()).unwrap();

    let risky = request("buy_api", 3.0, "api_provider", 0.95).with_safety(5.0);
    let d = gate.evaluate(&risky, T).unwrap();
    assert_eq!(d.reason(), GateReason::SafetyBelowThreshold);

    let vague = request("buy_api", 3.0, "api_provider", 0.65).with_safety(9.0);
    let d = gate.evaluate(&vague, T).unwrap();
    assert_eq!(d.reason(), GateReason::CoherenceBelowThreshold);

    let good = request("buy_api", 3.0, "api_provider", 0.9).with_safety(9.0);
    assert!(gate.evaluate(&good, T).unwrap().allow());
    // Guard preset would pass at 11s; strict holds until 15s.
    assert_eq!(
        gate.evaluate(&good, T + 11.0).unwrap().reason(),
        GateReason::TemporalHold
    );
    assert!(gate.evaluate(&good, T + 15.0).unwrap().allow());
}

#[test]
fn test_details_mapping_for_audit() {
    let (d, _) = evaluate(
        &request("buy_api", 3.0, "api_provider", 0.9),
        &GateState::armed_at(T - 20.0),
        &GatePolicy::guard(),
        T,
    );
    let map = d.details().to_map();
    assert_eq!(map["amount"], serde_json::json!(3.0));
    assert_eq!(map["recipient"], serde_json::json!("api_provider"));
    assert_eq!(map["coherence_score"], serde_json::json!(0.9));
    assert_eq!(map["temporal_passed"], serde_json::json!(true));
    assert_eq!(map["elapsed_seconds"], serde_json::json!(20.0));
    assert_eq!(map["min_hold_seconds"], serde_json::json!(10.0));
    assert_eq!(map["evaluated_at"], serde_json::json!(T));

    let json = serde_json::to_value(&d).unwrap();
    assert_eq!(json["action"], "ACT");
    assert_eq!(json["allow"], true);
    assert_eq!(json["reason"], "passed");
}
