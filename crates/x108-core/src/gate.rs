// ─────────────────────────────────────────────────────────────────────
// X-108 Gate — Stateful Gates (single clock + per-key clocks)
// ─────────────────────────────────────────────────────────────────────
//! Owners of `GateState` that make evaluate-and-commit atomic.
//!
//! Two concurrent callers must never both observe the same stale
//! `last_signal_ts` and both receive ACT. Both gates hold a lock across
//! the read of the state, the threshold checks and the write of the new
//! timestamp.
//!
//! - `SafetyGate`: one clock for every caller (system-wide throttle).
//! - `KeyedSafetyGate`: one clock per key (agent, account); distinct
//!   keys never block each other.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};

use x108_types::{
    ActionRequest, GateDecision, GateError, GatePolicy, GateResult, GateState, PolicyOverrides,
};

use crate::evaluator::evaluate;

/// Current wall-clock time in seconds since the Unix epoch.
///
/// Only the `*_now` convenience methods call this; the evaluator itself
/// always receives `now` from its caller.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn check_now(now: f64) -> GateResult<()> {
    if now.is_finite() {
        Ok(())
    } else {
        Err(GateError::Validation(format!("now must be finite, got {now}")))
    }
}

fn resolve_policy(base: &RwLock<GatePolicy>, overrides: &PolicyOverrides) -> GateResult<GatePolicy> {
    let base = base.read();
    if overrides.is_empty() {
        Ok(base.clone())
    } else {
        base.with_overrides(overrides)
    }
}

fn swap_policy(slot: &RwLock<GatePolicy>, policy: GatePolicy) -> GateResult<()> {
    policy.validate()?;
    log::info!(
        "gate policy updated: safety={} coherence={} hold={}s require_safety={}",
        policy.safety_threshold,
        policy.coherence_threshold,
        policy.min_hold_seconds,
        policy.require_safety_score
    );
    *slot.write() = policy;
    Ok(())
}

/// Gate with a single, process-wide hold clock.
///
/// Thread-safe: the state is guarded by a `parking_lot::Mutex` held for
/// the whole evaluate-and-commit step.
pub struct SafetyGate {
    policy: RwLock<GatePolicy>,
    state: Mutex<GateState>,
}

impl Default for SafetyGate {
    fn default() -> Self {
        Self {
            policy: RwLock::new(GatePolicy::default()),
            state: Mutex::new(GateState::new()),
        }
    }
}

impl SafetyGate {
    pub fn new(policy: GatePolicy) -> GateResult<Self> {
        policy.validate()?;
        Ok(Self {
            policy: RwLock::new(policy),
            state: Mutex::new(GateState::new()),
        })
    }

    /// Seed a previously persisted state.
    pub fn with_state(self, state: GateState) -> GateResult<Self> {
        state.validate()?;
        *self.state.lock() = state;
        Ok(self)
    }

    /// Validate, evaluate and commit under the deployment policy.
    pub fn evaluate(&self, request: &ActionRequest, now: f64) -> GateResult<GateDecision> {
        self.evaluate_with(request, &PolicyOverrides::default(), now)
    }

    /// Same as [`SafetyGate::evaluate`] with per-call overrides.
    pub fn evaluate_with(
        &self,
        request: &ActionRequest,
        overrides: &PolicyOverrides,
        now: f64,
    ) -> GateResult<GateDecision> {
        check_now(now)?;
        let policy = resolve_policy(&self.policy, overrides)?;
        policy.check_request(request)?;

        let mut state = self.state.lock();
        let (decision, next) = evaluate(request, &state, &policy, now);
        *state = next;
        Ok(decision)
    }

    /// Evaluate at the current wall-clock time.
    pub fn evaluate_now(&self, request: &ActionRequest) -> GateResult<GateDecision> {
        self.evaluate(request, unix_now())
    }

    /// Snapshot of the current state, for persistence.
    pub fn state(&self) -> GateState {
        *self.state.lock()
    }

    /// Replace the state, e.g. with one loaded at startup.
    pub fn restore(&self, state: GateState) -> GateResult<()> {
        state.validate()?;
        *self.state.lock() = state;
        Ok(())
    }

    pub fn policy(&self) -> GatePolicy {
        self.policy.read().clone()
    }

    /// Swap the deployment policy. Invalid policies are rejected and the
    /// current one is kept.
    pub fn update_policy(&self, policy: GatePolicy) -> GateResult<()> {
        swap_policy(&self.policy, policy)
    }

    /// Apply governance overrides to the deployment policy.
    pub fn apply_overrides(&self, overrides: &PolicyOverrides) -> GateResult<()> {
        let merged = self.policy.read().with_overrides(overrides)?;
        swap_policy(&self.policy, merged)
    }
}

/// One key's clock. `retired` is set by `forget` under the slot lock;
/// a caller that finds its slot retired goes back to the map.
#[derive(Default)]
struct Slot {
    state: GateState,
    retired: bool,
}

type SharedSlot = Arc<Mutex<Slot>>;

/// Gate with an independent hold clock per key.
///
/// The map lock is held only long enough to find or create a key's slot;
/// evaluation and commit then run under that key's own mutex. `forget`
/// retires a slot under both locks, so no commit can land in a slot that
/// has left the map.
pub struct KeyedSafetyGate<K> {
    policy: RwLock<GatePolicy>,
    slots: Mutex<HashMap<K, SharedSlot>>,
}

impl<K: Eq + Hash + Clone> Default for KeyedSafetyGate<K> {
    fn default() -> Self {
        Self {
            policy: RwLock::new(GatePolicy::default()),
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedSafetyGate<K> {
    pub fn new(policy: GatePolicy) -> GateResult<Self> {
        policy.validate()?;
        Ok(Self {
            policy: RwLock::new(policy),
            slots: Mutex::new(HashMap::new()),
        })
    }

    fn slot(&self, key: &K) -> SharedSlot {
        let mut slots = self.slots.lock();
        slots.entry(key.clone()).or_default().clone()
    }

    /// Run `f` on the key's live state under its slot lock.
    fn with_live_state<R>(&self, key: &K, mut f: impl FnMut(&mut GateState) -> R) -> R {
        loop {
            let slot = self.slot(key);
            let mut guard = slot.lock();
            if !guard.retired {
                return f(&mut guard.state);
            }
        }
    }

    pub fn evaluate(&self, key: &K, request: &ActionRequest, now: f64) -> GateResult<GateDecision> {
        self.evaluate_with(key, request, &PolicyOverrides::default(), now)
    }

    pub fn evaluate_with(
        &self,
        key: &K,
        request: &ActionRequest,
        overrides: &PolicyOverrides,
        now: f64,
    ) -> GateResult<GateDecision> {
        check_now(now)?;
        let policy = resolve_policy(&self.policy, overrides)?;
        policy.check_request(request)?;

        Ok(self.with_live_state(key, |state| {
            let (decision, next) = evaluate(request, state, &policy, now);
            *state = next;
            decision
        }))
    }

    pub fn evaluate_now(&self, key: &K, request: &ActionRequest) -> GateResult<GateDecision> {
        self.evaluate(key, request, unix_now())
    }

    /// Snapshot of a key's state. Unknown keys report an empty state.
    pub fn state(&self, key: &K) -> GateState {
        let slot = self.slots.lock().get(key).cloned();
        slot.map(|s| s.lock().state).unwrap_or_default()
    }

    pub fn restore(&self, key: &K, state: GateState) -> GateResult<()> {
        state.validate()?;
        self.with_live_state(key, |slot| *slot = state);
        Ok(())
    }

    /// Drop a key's clock, e.g. when its session ends.
    ///
    /// The returned state includes every commit made to the key before
    /// the call; later evaluations start from an empty clock.
    pub fn forget(&self, key: &K) -> Option<GateState> {
        let mut slots = self.slots.lock();
        let slot = slots.remove(key)?;
        let mut guard = slot.lock();
        guard.retired = true;
        Some(guard.state)
    }

    pub fn keys_tracked(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn policy(&self) -> GatePolicy {
        self.policy.read().clone()
    }

    pub fn update_policy(&self, policy: GatePolicy) -> GateResult<()> {
        swap_policy(&self.policy, policy)
    }

    pub fn apply_overrides(&self, overrides: &PolicyOverrides) -> GateResult<()> {
        let merged = self.policy.read().with_overrides(overrides)?;
        swap_policy(&self.policy, merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use x108_types::{GateError, GateReason};

    const T: f64 = 1_000.0;

    #[test]
    fn test_gate_commits_state() {
        let gate = SafetyGate::default();
        let d = gate.evaluate(&ActionRequest::payment(3.0, "a"), T).unwrap();
        assert!(d.allow());
        assert_eq!(gate.state().last_signal_ts, Some(T));
    }

    #[test]
    fn test_gate_rejects_invalid_input_without_touching_state() {
        let gate = SafetyGate::default();
        let err = gate.evaluate(&ActionRequest::payment(-1.0, "a"), T);
        assert!(matches!(err, Err(GateError::Validation(_))));
        assert!(!gate.state().is_armed());
    }

    #[test]
    fn test_gate_strict_requires_safety() {
        let gate = SafetyGate::new(GatePolicy::strict()).unwrap();
        assert!(gate.evaluate(&ActionRequest::payment(3.0, "a"), T).is_err());
        let d = gate
            .evaluate(&ActionRequest::payment(3.0, "a").with_safety(8.0), T)
            .unwrap();
        assert!(d.allow());
    }

    #[test]
    fn test_gate_per_call_override() {
        let gate = SafetyGate::default()
            .with_state(GateState::armed_at(T))
            .unwrap();
        let req = ActionRequest::payment(1.0, "a");
        assert!(gate.evaluate(&req, T + 5.0).unwrap().is_hold());
        let short = PolicyOverrides {
            min_hold_seconds: Some(2.0),
            ..Default::default()
        };
        assert!(gate.evaluate_with(&req, &short, T + 5.0).unwrap().allow());
        // Deployment policy is untouched by the override.
        assert_eq!(gate.policy().min_hold_seconds, 10.0);
    }

    #[test]
    fn test_gate_invalid_override_rejected() {
        let gate = SafetyGate::default();
        let bad = PolicyOverrides {
            coherence_threshold: Some(-1.0),
            ..Default::default()
        };
        assert!(matches!(
            gate.evaluate_with(&ActionRequest::payment(1.0, "a"), &bad, T),
            Err(GateError::Config(_))
        ));
    }

    #[test]
    fn test_update_policy_validates() {
        let gate = SafetyGate::default();
        let mut bad = GatePolicy::guard();
        bad.min_hold_seconds = f64::NAN;
        assert!(gate.update_policy(bad).is_err());
        assert_eq!(gate.policy(), GatePolicy::guard());
        assert!(gate.update_policy(GatePolicy::strict()).is_ok());
        assert_eq!(gate.policy(), GatePolicy::strict());
    }

    #[test]
    fn test_apply_overrides_persists() {
        let gate = SafetyGate::default();
        gate.apply_overrides(&PolicyOverrides {
            coherence_threshold: Some(0.8),
            ..Default::default()
        })
        .unwrap();
        let d = gate
            .evaluate(&ActionRequest::payment(1.0, "a").with_coherence(0.7), T)
            .unwrap();
        assert_eq!(d.reason(), GateReason::CoherenceBelowThreshold);
    }

    #[test]
    fn test_restore() {
        let gate = SafetyGate::default();
        gate.restore(GateState::armed_at(T)).unwrap();
        assert!(gate.evaluate(&ActionRequest::payment(1.0, "a"), T + 1.0).unwrap().is_hold());
    }

    #[test]
    fn test_non_finite_now_rejected() {
        let gate = SafetyGate::default().with_state(GateState::armed_at(T)).unwrap();
        let req = ActionRequest::payment(2.0, "a");
        for now in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(gate.evaluate(&req, now), Err(GateError::Validation(_))));
        }
        assert_eq!(gate.state().last_signal_ts, Some(T));
        assert!(gate.evaluate(&req, T + 0.5).unwrap().is_hold());

        let keyed: KeyedSafetyGate<u8> = KeyedSafetyGate::default();
        assert!(matches!(keyed.evaluate(&1, &req, f64::NAN), Err(GateError::Validation(_))));
        assert_eq!(keyed.keys_tracked(), 0);
    }

    #[test]
    fn test_backwards_now_holds() {
        let gate = SafetyGate::default();
        let req = ActionRequest::payment(2.0, "a");
        assert!(gate.evaluate(&req, T).unwrap().allow());
        let d = gate.evaluate(&req, T - 100.0).unwrap();
        assert_eq!(d.reason(), GateReason::TemporalHold);
        assert_eq!(gate.state().last_signal_ts, Some(T));
    }

    #[test]
    fn test_non_finite_state_rejected() {
        let nan = GateState::armed_at(f64::NAN);
        assert!(matches!(
            SafetyGate::default().with_state(nan),
            Err(GateError::Validation(_))
        ));

        let gate = SafetyGate::default();
        gate.restore(GateState::armed_at(T)).unwrap();
        assert!(gate.restore(nan).is_err());
        assert_eq!(gate.state().last_signal_ts, Some(T));

        let keyed: KeyedSafetyGate<u8> = KeyedSafetyGate::default();
        assert!(keyed.restore(&1, nan).is_err());
        assert_eq!(keyed.keys_tracked(), 0);
    }

    #[test]
    fn test_forget_retires_held_slot() {
        let gate: KeyedSafetyGate<&str> = KeyedSafetyGate::default();
        let req = ActionRequest::payment(2.0, "a");
        let stale = gate.slot(&"dave");
        assert!(gate.evaluate(&"dave", &req, T).unwrap().allow());

        assert_eq!(gate.forget(&"dave"), Some(GateState::armed_at(T)));
        assert!(stale.lock().retired);

        // A caller still holding the old slot never commits into it.
        assert!(gate.evaluate(&"dave", &req, T + 1.0).unwrap().allow());
        assert_eq!(stale.lock().state.last_signal_ts, Some(T));
        assert!(gate.evaluate(&"dave", &req, T + 2.0).unwrap().is_hold());
        assert_eq!(gate.state(&"dave").last_signal_ts, Some(T + 1.0));
    }

    #[test]
    fn test_evaluate_now_uses_wall_clock() {
        let gate = SafetyGate::default();
        let d = gate.evaluate_now(&ActionRequest::payment(1.0, "a")).unwrap();
        assert!(d.allow());
        assert!(d.details().evaluated_at.unwrap() > 1_600_000_000.0);
    }

    #[test]
    fn test_keyed_isolation() {
        let gate: KeyedSafetyGate<String> = KeyedSafetyGate::default();
        let req = ActionRequest::payment(3.0, "merchant");
        assert!(gate.evaluate(&"alice".into(), &req, T).unwrap().allow());
        assert!(gate.evaluate(&"bob".into(), &req, T + 1.0).unwrap().allow());
        assert!(gate.evaluate(&"alice".into(), &req, T + 2.0).unwrap().is_hold());
        assert_eq!(gate.keys_tracked(), 2);
    }

    #[test]
    fn test_keyed_state_and_forget() {
        let gate: KeyedSafetyGate<&str> = KeyedSafetyGate::default();
        assert_eq!(gate.state(&"carol"), GateState::new());
        // Reading an unknown key does not create a slot.
        assert_eq!(gate.keys_tracked(), 0);

        gate.restore(&"carol", GateState::armed_at(T)).unwrap();
        assert_eq!(gate.state(&"carol").last_signal_ts, Some(T));
        assert_eq!(gate.forget(&"carol"), Some(GateState::armed_at(T)));
        assert_eq!(gate.keys_tracked(), 0);
        assert!(gate.forget(&"carol").is_none());
    }

    #[test]
    fn test_keyed_policy_update() {
        let gate: KeyedSafetyGate<u32> = KeyedSafetyGate::new(GatePolicy::guard()).unwrap();
        gate.apply_overrides(&PolicyOverrides {
            min_hold_seconds: Some(1.0),
            ..Default::default()
        })
        .unwrap();
        let req = ActionRequest::payment(1.0, "a");
        assert!(gate.evaluate(&7, &req, T).unwrap().allow());
        assert!(gate.evaluate(&7, &req, T + 1.0).unwrap().allow());
    }
}
