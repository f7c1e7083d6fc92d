// ─────────────────────────────────────────────────────────────────────
// X-108 Gate — Decision and State Types
// ─────────────────────────────────────────────────────────────────────

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GateError, GateResult};

/// Round to millisecond precision for audit output.
#[inline]
pub fn round_ms(seconds: f64) -> f64 {
    (seconds * 1000.0).round() / 1000.0
}

/// The one fact the gate carries between calls.
///
/// `last_signal_ts` is the time (seconds) of the last approved action with
/// a positive amount. Only the evaluator's result produces a new value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GateState {
    pub last_signal_ts: Option<f64>,
}

impl GateState {
    pub fn new() -> Self {
        Self::default()
    }

    /// State as if an irreversible action had been approved at `ts`.
    pub fn armed_at(ts: f64) -> Self {
        Self {
            last_signal_ts: Some(ts),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.last_signal_ts.is_some()
    }

    /// Reject a persisted timestamp that could never be compared against.
    pub fn validate(&self) -> GateResult<()> {
        match self.last_signal_ts {
            Some(ts) if !ts.is_finite() => Err(GateError::Validation(format!(
                "last_signal_ts must be finite, got {ts}"
            ))),
            _ => Ok(()),
        }
    }
}

/// Terminal outcome of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GateAction {
    Act,
    Hold,
}

impl GateAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Act => "ACT",
            Self::Hold => "HOLD",
        }
    }
}

impl fmt::Display for GateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the gate reached its outcome. The first failing check wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateReason {
    SafetyBelowThreshold,
    CoherenceBelowThreshold,
    TemporalHold,
    Passed,
}

impl GateReason {
    pub fn action(&self) -> GateAction {
        match self {
            Self::Passed => GateAction::Act,
            _ => GateAction::Hold,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::SafetyBelowThreshold => "safety score below threshold",
            Self::CoherenceBelowThreshold => "coherence below threshold",
            Self::TemporalHold => "temporal hold window not satisfied",
            Self::Passed => "gate passed",
        }
    }
}

impl fmt::Display for GateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Values that produced a decision.
///
/// Serialized as a flat mapping; absent values are omitted. The audit
/// fields (`amount`, `recipient`, `temporal_passed`, `evaluated_at`) are
/// present on every decision the evaluator builds, so downstream
/// collaborators never need to re-derive them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coherence_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coherence_threshold: Option<f64>,
    /// Seconds since the last qualifying action, rounded to ms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_seconds: Option<f64>,
    /// Hold window in seconds, rounded to ms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_hold_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    /// `None` when an earlier check short-circuited before the temporal one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal_passed: Option<bool>,
    /// The injected `now` of the evaluation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluated_at: Option<f64>,
}

impl GateDetails {
    /// Details as a string-keyed JSON mapping.
    pub fn to_map(&self) -> BTreeMap<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        }
    }
}

/// Immutable outcome of one gate evaluation.
///
/// `action` is derived from `reason`, so a decision can only be ACT when
/// every check passed. Deserialization rebuilds the decision from its
/// reason and rejects a payload whose `allow`/`action` disagree with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DecisionRecord")]
pub struct GateDecision {
    allow: bool,
    action: GateAction,
    reason: GateReason,
    details: GateDetails,
}

impl GateDecision {
    pub fn new(reason: GateReason, details: GateDetails) -> Self {
        let action = reason.action();
        Self {
            allow: action == GateAction::Act,
            action,
            reason,
            details,
        }
    }

    pub fn allow(&self) -> bool {
        self.allow
    }

    pub fn action(&self) -> GateAction {
        self.action
    }

    pub fn reason(&self) -> GateReason {
        self.reason
    }

    pub fn details(&self) -> &GateDetails {
        &self.details
    }

    pub fn is_hold(&self) -> bool {
        self.action == GateAction::Hold
    }
}

/// Wire form accepted when reading a decision back.
#[derive(Deserialize)]
struct DecisionRecord {
    #[serde(default)]
    allow: Option<bool>,
    #[serde(default)]
    action: Option<GateAction>,
    reason: GateReason,
    #[serde(default)]
    details: GateDetails,
}

impl TryFrom<DecisionRecord> for GateDecision {
    type Error = GateError;

    fn try_from(record: DecisionRecord) -> GateResult<Self> {
        let decision = GateDecision::new(record.reason, record.details);
        if record.action.is_some_and(|a| a != decision.action)
            || record.allow.is_some_and(|a| a != decision.allow)
        {
            return Err(GateError::Validation(format!(
                "decision with reason '{}' must be {}",
                decision.reason, decision.action
            )));
        }
        Ok(decision)
    }
}

impl fmt::Display for GateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.action, self.reason)
    }
}
