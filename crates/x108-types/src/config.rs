// ─────────────────────────────────────────────────────────────────────
// X-108 Gate — Policy Configuration
// ─────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};

use crate::error::{GateError, GateResult};
use crate::request::ActionRequest;

/// Threshold policy applied by the gate.
///
/// Constant per deployment, but every field can be overridden per call
/// through [`PolicyOverrides`] or swapped wholesale by a governance layer.
/// Two named presets exist: [`GatePolicy::guard`] (the default) and
/// [`GatePolicy::strict`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatePolicy {
    /// Safety score must be >= this to pass (only checked when a safety
    /// score is supplied).
    /// Default: 7.0.
    pub safety_threshold: f64,

    /// Coherence must be >= this to pass.
    /// Default: 0.6 (guard preset), 0.7 (strict preset).
    pub coherence_threshold: f64,

    /// Minimum seconds between two qualifying irreversible actions.
    /// Default: 10 (guard preset), 15 (strict preset).
    pub min_hold_seconds: f64,

    /// Reject requests that carry no safety score at the boundary.
    /// Default: false (guard preset), true (strict preset).
    #[serde(default)]
    pub require_safety_score: bool,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self::guard()
    }
}

impl GatePolicy {
    pub const DEFAULT_SAFETY_THRESHOLD: f64 = 7.0;

    /// Lightweight preset: coherence + temporal hold, safety optional.
    pub fn guard() -> Self {
        Self {
            safety_threshold: Self::DEFAULT_SAFETY_THRESHOLD,
            coherence_threshold: 0.6,
            min_hold_seconds: 10.0,
            require_safety_score: false,
        }
    }

    /// Payment preset: safety score required, tighter coherence, longer hold.
    pub fn strict() -> Self {
        Self {
            safety_threshold: Self::DEFAULT_SAFETY_THRESHOLD,
            coherence_threshold: 0.7,
            min_hold_seconds: 15.0,
            require_safety_score: true,
        }
    }

    /// Look up a preset by name (`"guard"` or `"strict"`).
    pub fn preset(name: &str) -> GateResult<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "guard" | "default" => Ok(Self::guard()),
            "strict" => Ok(Self::strict()),
            other => Err(GateError::Config(format!(
                "unknown policy preset '{other}', expected 'guard' or 'strict'"
            ))),
        }
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> GateResult<()> {
        if !(1.0..=10.0).contains(&self.safety_threshold) {
            return Err(GateError::Config(format!(
                "safety_threshold must be in [1, 10], got {}",
                self.safety_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.coherence_threshold) {
            return Err(GateError::Config(format!(
                "coherence_threshold must be in [0, 1], got {}",
                self.coherence_threshold
            )));
        }
        if !self.min_hold_seconds.is_finite() || self.min_hold_seconds < 0.0 {
            return Err(GateError::Config(format!(
                "min_hold_seconds must be finite and >= 0, got {}",
                self.min_hold_seconds
            )));
        }
        Ok(())
    }

    /// Load from JSON string. Missing fields are an error; call
    /// [`GatePolicy::validate`] afterwards.
    pub fn from_json(json: &str) -> GateResult<Self> {
        serde_json::from_str(json).map_err(|e| GateError::Config(format!("JSON parse error: {e}")))
    }

    /// Return a copy with `overrides` applied, validated.
    pub fn with_overrides(&self, overrides: &PolicyOverrides) -> GateResult<Self> {
        let merged = Self {
            safety_threshold: overrides.safety_threshold.unwrap_or(self.safety_threshold),
            coherence_threshold: overrides
                .coherence_threshold
                .unwrap_or(self.coherence_threshold),
            min_hold_seconds: overrides.min_hold_seconds.unwrap_or(self.min_hold_seconds),
            require_safety_score: overrides
                .require_safety_score
                .unwrap_or(self.require_safety_score),
        };
        merged.validate()?;
        Ok(merged)
    }

    /// Boundary check of a request against this policy.
    ///
    /// Runs [`ActionRequest::validate`] and, if the policy requires it,
    /// rejects a request that carries no safety score. A request that
    /// fails here never reaches the evaluator.
    pub fn check_request(&self, request: &ActionRequest) -> GateResult<()> {
        request.validate()?;
        if self.require_safety_score && request.safety_score.is_none() {
            return Err(GateError::Validation(
                "policy requires a safety score but none was supplied".to_string(),
            ));
        }
        Ok(())
    }
}

/// Partial policy: every `Some` field replaces the base policy's value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coherence_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_hold_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_safety_score: Option<bool>,
}

impl PolicyOverrides {
    pub fn is_empty(&self) -> bool {
        self.safety_threshold.is_none()
            && self.coherence_threshold.is_none()
            && self.min_hold_seconds.is_none()
            && self.require_safety_score.is_none()
    }

    pub fn from_json(json: &str) -> GateResult<Self> {
        serde_json::from_str(json).map_err(|e| GateError::Config(format!("JSON parse error: {e}")))
    }
}

/// Parameters as published by a governance contract.
///
/// The contract stores the coherence threshold as an integer percentage
/// (60 means 0.6) and the temporal window in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceParams {
    pub temporal_window: u64,
    pub coherence_threshold: u32,
}

impl Default for GovernanceParams {
    fn default() -> Self {
        Self {
            temporal_window: 10,
            coherence_threshold: 60,
        }
    }
}

impl GovernanceParams {
    pub fn to_overrides(&self) -> PolicyOverrides {
        PolicyOverrides {
            coherence_threshold: Some(f64::from(self.coherence_threshold) / 100.0),
            min_hold_seconds: Some(self.temporal_window as f64),
            ..Default::default()
        }
    }
}
