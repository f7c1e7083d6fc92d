// ─────────────────────────────────────────────────────────────────────
// X-108 Gate — Action Request
// ─────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};

use crate::error::{GateError, GateResult};

/// Clamp a score to [lo, hi]. NaN maps to `lo`.
#[inline]
pub fn clamp_score(value: f64, lo: f64, hi: f64) -> f64 {
    if value.is_nan() {
        return lo;
    }
    value.clamp(lo, hi)
}

fn default_intent() -> String {
    ActionRequest::DEFAULT_INTENT.to_string()
}

/// A proposed irreversible action, as seen by the gate.
///
/// Scores are produced upstream; the gate only compares them. Out-of-range
/// values are evaluated as given. Callers that want clamping must call
/// [`ActionRequest::sanitized`] explicitly before evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Free-form label, e.g. `"buy_premium_api"`.
    #[serde(default = "default_intent")]
    pub intent: String,
    /// Amount in USDC. `0` carries no irreversibility weight.
    pub amount: f64,
    /// Opaque recipient identifier.
    pub recipient: String,
    /// Coherence proxy, domain [0, 1].
    pub coherence_score: f64,
    /// Safety proxy, domain [1, 10]. `None` means not evaluated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_score: Option<f64>,
}

impl ActionRequest {
    pub const DEFAULT_INTENT: &'static str = "payment";
    /// Coherence assumed when the caller has no scorer output.
    pub const DEFAULT_COHERENCE: f64 = 1.0;

    pub fn new(
        intent: impl Into<String>,
        amount: f64,
        recipient: impl Into<String>,
        coherence_score: f64,
    ) -> Self {
        Self {
            intent: intent.into(),
            amount,
            recipient: recipient.into(),
            coherence_score,
            safety_score: None,
        }
    }

    /// Payment with the caller-boundary default coherence of 1.0.
    pub fn payment(amount: f64, recipient: impl Into<String>) -> Self {
        Self::new(
            Self::DEFAULT_INTENT,
            amount,
            recipient,
            Self::DEFAULT_COHERENCE,
        )
    }

    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = intent.into();
        self
    }

    pub fn with_coherence(mut self, coherence_score: f64) -> Self {
        self.coherence_score = coherence_score;
        self
    }

    pub fn with_safety(mut self, safety_score: f64) -> Self {
        self.safety_score = Some(safety_score);
        self
    }

    /// Whether this action arms the temporal hold when approved.
    pub fn is_irreversible(&self) -> bool {
        self.amount > 0.0
    }

    /// Caller-side validation. The evaluator assumes this has passed.
    pub fn validate(&self) -> GateResult<()> {
        if !self.amount.is_finite() {
            return Err(GateError::Validation(format!(
                "amount must be finite, got {}",
                self.amount
            )));
        }
        if self.amount < 0.0 {
            return Err(GateError::Validation(format!(
                "amount must be >= 0, got {}",
                self.amount
            )));
        }
        if !self.coherence_score.is_finite() {
            return Err(GateError::Validation(format!(
                "coherence_score must be finite, got {}",
                self.coherence_score
            )));
        }
        if let Some(safety) = self.safety_score {
            if !safety.is_finite() {
                return Err(GateError::Validation(format!(
                    "safety_score must be finite, got {safety}"
                )));
            }
        }
        Ok(())
    }

    /// Copy with scores clamped to their domains.
    ///
    /// This masks bad upstream data, so every adjustment is logged.
    pub fn sanitized(&self) -> Self {
        let mut out = self.clone();
        let coherence = clamp_score(self.coherence_score, 0.0, 1.0);
        if coherence != self.coherence_score {
            log::warn!(
                "sanitized: coherence {} clamped to {coherence:.4}",
                self.coherence_score
            );
        }
        out.coherence_score = coherence;
        if let Some(safety) = self.safety_score {
            let clamped = clamp_score(safety, 1.0, 10.0);
            if clamped != safety {
                log::warn!("sanitized: safety {safety} clamped to {clamped:.4}");
            }
            out.safety_score = Some(clamped);
        }
        out
    }
}
