// ─────────────────────────────────────────────────────────────────────
// X-108 Gate — PyO3 FFI Bindings
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
// Note: #[deny(unsafe_code)] not applied; PyO3 proc macros expand to
// unsafe blocks. Hand-written code in this crate is safe.
//! Python-callable wrappers around the X-108 safety gate.
//!
//! Exposes `GatePolicy`, `ActionRequest`, `GateDecision`, the pure
//! `evaluate` function, `RustSafetyGate`, `RustKeyedSafetyGate` and a
//! `dispatch` helper to the Python front-ends.
//!
//! # FFI Safety
//!
//! - GIL acquired via `Python::with_gil` before every Python callback.
//! - Python exceptions raised by payment/publication callbacks become
//!   collaborator errors in the dispatch result, never a changed decision.
//! - All policies validated before storage (`GatePolicy::validate()`).
//!
//! Install: `pip install -e crates/x108-ffi` (requires maturin).
//!
//! Usage from Python:
//! ```python
//! from x108_gate import ActionRequest, RustSafetyGate
//!
//! gate = RustSafetyGate()
//! decision = gate.evaluate(ActionRequest(3.0, "api_provider", coherence_score=0.9))
//! print(decision.action, decision.reason)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use x108_core::{
    dispatch as dispatch_decision, evaluate as evaluate_pure, unix_now, DecisionPublisher,
    ExternalPayments, ExternalPublisher, KeyedSafetyGate, PaymentExecutor, PaymentReceipt,
    PublicationRecord, PublishReceipt, SafetyGate,
};
use x108_types::{
    ActionRequest, GateDecision, GateError, GatePolicy, GateState, GovernanceParams,
    PolicyOverrides,
};

fn to_py_err(e: GateError) -> PyErr {
    match e {
        GateError::Validation(_) | GateError::Config(_) => PyValueError::new_err(e.to_string()),
        GateError::Payment(_) | GateError::Publication(_) => {
            PyRuntimeError::new_err(e.to_string())
        }
    }
}

fn overrides_from(
    safety_threshold: Option<f64>,
    coherence_threshold: Option<f64>,
    min_hold_seconds: Option<f64>,
) -> PolicyOverrides {
    PolicyOverrides {
        safety_threshold,
        coherence_threshold,
        min_hold_seconds,
        require_safety_score: None,
    }
}

// ─── PyGatePolicy ───────────────────────────────────────────────────

/// Python-visible gate policy.
#[pyclass(name = "GatePolicy")]
#[derive(Clone)]
struct PyGatePolicy {
    inner: GatePolicy,
}

#[pymethods]
impl PyGatePolicy {
    #[new]
    #[pyo3(signature = (
        safety_threshold = 7.0,
        coherence_threshold = 0.6,
        min_hold_seconds = 10.0,
        require_safety_score = false,
    ))]
    fn new(
        safety_threshold: f64,
        coherence_threshold: f64,
        min_hold_seconds: f64,
        require_safety_score: bool,
    ) -> PyResult<Self> {
        let policy = GatePolicy {
            safety_threshold,
            coherence_threshold,
            min_hold_seconds,
            require_safety_score,
        };
        policy.validate().map_err(to_py_err)?;
        Ok(Self { inner: policy })
    }

    /// Named preset: "guard" or "strict".
    #[staticmethod]
    fn preset(name: &str) -> PyResult<Self> {
        let policy = GatePolicy::preset(name).map_err(to_py_err)?;
        Ok(Self { inner: policy })
    }

    /// Construct from JSON string.
    #[staticmethod]
    fn from_json(json: &str) -> PyResult<Self> {
        let policy = GatePolicy::from_json(json).map_err(to_py_err)?;
        policy.validate().map_err(to_py_err)?;
        Ok(Self { inner: policy })
    }

    /// Copy with governance contract parameters applied.
    ///
    /// `coherence_percent` is the contract's integer percentage (60 = 0.6).
    fn with_governance(&self, temporal_window: u64, coherence_percent: u32) -> PyResult<Self> {
        let params = GovernanceParams {
            temporal_window,
            coherence_threshold: coherence_percent,
        };
        let policy = self
            .inner
            .with_overrides(&params.to_overrides())
            .map_err(to_py_err)?;
        Ok(Self { inner: policy })
    }

    #[getter]
    fn safety_threshold(&self) -> f64 {
        self.inner.safety_threshold
    }

    #[getter]
    fn coherence_threshold(&self) -> f64 {
        self.inner.coherence_threshold
    }

    #[getter]
    fn min_hold_seconds(&self) -> f64 {
        self.inner.min_hold_seconds
    }

    #[getter]
    fn require_safety_score(&self) -> bool {
        self.inner.require_safety_score
    }

    fn __repr__(&self) -> String {
        format!(
            "GatePolicy(safety={}, coherence={}, hold={}s, require_safety={})",
            self.inner.safety_threshold,
            self.inner.coherence_threshold,
            self.inner.min_hold_seconds,
            self.inner.require_safety_score
        )
    }
}

// ─── PyActionRequest ────────────────────────────────────────────────

/// Python-visible action request.
///
/// Coherence defaults to 1.0 when the front-end has no scorer output.
/// Scores are not clamped unless `sanitized()` is called.
#[pyclass(name = "ActionRequest")]
#[derive(Clone)]
struct PyActionRequest {
    inner: ActionRequest,
}

#[pymethods]
impl PyActionRequest {
    #[new]
    #[pyo3(signature = (amount, recipient, coherence_score = 1.0, safety_score = None, intent = None))]
    fn new(
        amount: f64,
        recipient: String,
        coherence_score: f64,
        safety_score: Option<f64>,
        intent: Option<String>,
    ) -> PyResult<Self> {
        let mut request = ActionRequest::payment(amount, recipient).with_coherence(coherence_score);
        request.safety_score = safety_score;
        if let Some(intent) = intent {
            request.intent = intent;
        }
        request.validate().map_err(to_py_err)?;
        Ok(Self { inner: request })
    }

    /// Copy with scores clamped to their domains.
    fn sanitized(&self) -> Self {
        Self {
            inner: self.inner.sanitized(),
        }
    }

    #[getter]
    fn intent(&self) -> &str {
        &self.inner.intent
    }

    #[getter]
    fn amount(&self) -> f64 {
        self.inner.amount
    }

    #[getter]
    fn recipient(&self) -> &str {
        &self.inner.recipient
    }

    #[getter]
    fn coherence_score(&self) -> f64 {
        self.inner.coherence_score
    }

    #[getter]
    fn safety_score(&self) -> Option<f64> {
        self.inner.safety_score
    }

    fn __repr__(&self) -> String {
        format!(
            "ActionRequest(intent={:?}, amount={}, recipient={:?}, coherence={}, safety={:?})",
            self.inner.intent,
            self.inner.amount,
            self.inner.recipient,
            self.inner.coherence_score,
            self.inner.safety_score
        )
    }
}

// ─── PyGateDecision ─────────────────────────────────────────────────

/// Python-visible gate decision (read-only).
#[pyclass(name = "GateDecision", frozen)]
#[derive(Clone)]
struct PyGateDecision {
    inner: GateDecision,
}

#[pymethods]
impl PyGateDecision {
    #[getter]
    fn allow(&self) -> bool {
        self.inner.allow()
    }

    /// "ACT" or "HOLD".
    #[getter]
    fn action(&self) -> &'static str {
        self.inner.action().as_str()
    }

    /// Human-readable reason, e.g. "temporal hold window not satisfied".
    #[getter]
    fn reason(&self) -> &'static str {
        self.inner.reason().describe()
    }

    fn details<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let d = self.inner.details();
        let dict = PyDict::new(py);
        dict.set_item("safety_score", d.safety_score)?;
        dict.set_item("safety_threshold", d.safety_threshold)?;
        dict.set_item("coherence_score", d.coherence_score)?;
        dict.set_item("coherence_threshold", d.coherence_threshold)?;
        dict.set_item("elapsed_seconds", d.elapsed_seconds)?;
        dict.set_item("min_hold_seconds", d.min_hold_seconds)?;
        dict.set_item("amount", d.amount)?;
        dict.set_item("recipient", d.recipient.clone())?;
        dict.set_item("temporal_passed", d.temporal_passed)?;
        dict.set_item("evaluated_at", d.evaluated_at)?;
        Ok(dict)
    }

    fn to_json(&self) -> PyResult<String> {
        serde_json::to_string(&self.inner).map_err(|e| PyValueError::new_err(e.to_string()))
    }

    fn __repr__(&self) -> String {
        format!(
            "GateDecision(allow={}, action={}, reason={:?})",
            self.inner.allow(),
            self.inner.action(),
            self.inner.reason().describe()
        )
    }
}

// ─── evaluate ───────────────────────────────────────────────────────

/// Pure evaluation.
///
/// Returns: tuple(decision: GateDecision, last_signal_ts: Optional[float]).
/// The caller persists the returned timestamp.
#[pyfunction]
#[pyo3(signature = (request, now, last_signal_ts = None, policy = None))]
fn evaluate(
    request: PyActionRequest,
    now: f64,
    last_signal_ts: Option<f64>,
    policy: Option<PyGatePolicy>,
) -> PyResult<(PyGateDecision, Option<f64>)> {
    let policy = policy.map(|p| p.inner).unwrap_or_default();
    policy.check_request(&request.inner).map_err(to_py_err)?;
    let state = GateState { last_signal_ts };
    let (decision, next) = evaluate_pure(&request.inner, &state, &policy, now);
    Ok((PyGateDecision { inner: decision }, next.last_signal_ts))
}

// ─── RustSafetyGate ─────────────────────────────────────────────────

/// Single-clock gate (system-wide throttle).
#[pyclass(name = "RustSafetyGate")]
struct PySafetyGate {
    inner: SafetyGate,
}

#[pymethods]
impl PySafetyGate {
    #[new]
    #[pyo3(signature = (policy = None, last_signal_ts = None))]
    fn new(policy: Option<PyGatePolicy>, last_signal_ts: Option<f64>) -> PyResult<Self> {
        let policy = policy.map(|p| p.inner).unwrap_or_default();
        let gate = SafetyGate::new(policy)
            .and_then(|g| g.with_state(GateState { last_signal_ts }))
            .map_err(to_py_err)?;
        Ok(Self { inner: gate })
    }

    /// Evaluate and commit. `now` defaults to the wall clock.
    #[pyo3(signature = (
        request,
        now = None,
        safety_threshold = None,
        coherence_threshold = None,
        min_hold_seconds = None,
    ))]
    fn evaluate(
        &self,
        request: PyActionRequest,
        now: Option<f64>,
        safety_threshold: Option<f64>,
        coherence_threshold: Option<f64>,
        min_hold_seconds: Option<f64>,
    ) -> PyResult<PyGateDecision> {
        let overrides = overrides_from(safety_threshold, coherence_threshold, min_hold_seconds);
        let decision = self
            .inner
            .evaluate_with(&request.inner, &overrides, now.unwrap_or_else(unix_now))
            .map_err(to_py_err)?;
        Ok(PyGateDecision { inner: decision })
    }

    #[getter]
    fn last_signal_ts(&self) -> Option<f64> {
        self.inner.state().last_signal_ts
    }

    #[pyo3(signature = (last_signal_ts = None))]
    fn restore(&self, last_signal_ts: Option<f64>) -> PyResult<()> {
        self.inner
            .restore(GateState { last_signal_ts })
            .map_err(to_py_err)
    }

    #[getter]
    fn policy(&self) -> PyGatePolicy {
        PyGatePolicy {
            inner: self.inner.policy(),
        }
    }

    fn update_policy(&self, policy: PyGatePolicy) -> PyResult<()> {
        self.inner.update_policy(policy.inner).map_err(to_py_err)
    }
}

// ─── RustKeyedSafetyGate ────────────────────────────────────────────

/// Per-agent gate: one hold clock per key.
#[pyclass(name = "RustKeyedSafetyGate")]
struct PyKeyedSafetyGate {
    inner: KeyedSafetyGate<String>,
}

#[pymethods]
impl PyKeyedSafetyGate {
    #[new]
    #[pyo3(signature = (policy = None))]
    fn new(policy: Option<PyGatePolicy>) -> PyResult<Self> {
        let policy = policy.map(|p| p.inner).unwrap_or_default();
        let gate = KeyedSafetyGate::new(policy).map_err(to_py_err)?;
        Ok(Self { inner: gate })
    }

    #[pyo3(signature = (
        key,
        request,
        now = None,
        safety_threshold = None,
        coherence_threshold = None,
        min_hold_seconds = None,
    ))]
    #[allow(clippy::too_many_arguments)]
    fn evaluate(
        &self,
        key: String,
        request: PyActionRequest,
        now: Option<f64>,
        safety_threshold: Option<f64>,
        coherence_threshold: Option<f64>,
        min_hold_seconds: Option<f64>,
    ) -> PyResult<PyGateDecision> {
        let overrides = overrides_from(safety_threshold, coherence_threshold, min_hold_seconds);
        let decision = self
            .inner
            .evaluate_with(&key, &request.inner, &overrides, now.unwrap_or_else(unix_now))
            .map_err(to_py_err)?;
        Ok(PyGateDecision { inner: decision })
    }

    fn last_signal_ts(&self, key: String) -> Option<f64> {
        self.inner.state(&key).last_signal_ts
    }

    #[pyo3(signature = (key, last_signal_ts = None))]
    fn restore(&self, key: String, last_signal_ts: Option<f64>) -> PyResult<()> {
        self.inner
            .restore(&key, GateState { last_signal_ts })
            .map_err(to_py_err)
    }

    /// Drop a key's clock. Returns its last timestamp, if any.
    fn forget(&self, key: String) -> Option<f64> {
        self.inner.forget(&key).and_then(|s| s.last_signal_ts)
    }

    #[getter]
    fn keys_tracked(&self) -> usize {
        self.inner.keys_tracked()
    }

    fn update_policy(&self, policy: PyGatePolicy) -> PyResult<()> {
        self.inner.update_policy(policy.inner).map_err(to_py_err)
    }
}

// ─── dispatch ───────────────────────────────────────────────────────

/// Forward a final decision to Python collaborators.
///
/// Args:
///     decision: GateDecision from a gate.
///     pay_callback: Optional Callable[[float, str], Any], called only on
///                   ACT with a positive amount.
///     publish_callback: Optional Callable[[dict], Optional[str | int]],
///                       returns the post URL or the post id. Post ids
///                       otherwise count up from 1 per dispatch call.
///
/// Returns a dict with `decision` (unchanged), `payment_submitted`,
/// `published`, `payment_error`, `publication_error`.
#[pyfunction]
#[pyo3(signature = (decision, pay_callback = None, publish_callback = None))]
fn dispatch<'py>(
    py: Python<'py>,
    decision: PyGateDecision,
    pay_callback: Option<PyObject>,
    publish_callback: Option<PyObject>,
) -> PyResult<Bound<'py, PyDict>> {
    let executor = pay_callback.map(|cb| {
        ExternalPayments::new(move |amount: f64, recipient: &str| {
            Python::with_gil(|py| match cb.call1(py, (amount, recipient)) {
                Ok(_) => Ok(PaymentReceipt::submitted(amount, recipient)),
                Err(e) => Err(GateError::Payment(e.to_string())),
            })
        })
    });

    let publisher = publish_callback.map(|cb| {
        let next_id = AtomicU64::new(1);
        ExternalPublisher::new(move |record: &PublicationRecord| {
            Python::with_gil(|py| {
                let post = PyDict::new(py);
                let fill = || -> PyResult<()> {
                    post.set_item("status", record.status.as_str())?;
                    post.set_item("amount", record.amount)?;
                    post.set_item("recipient", record.recipient.as_str())?;
                    post.set_item("coherence", record.coherence)?;
                    post.set_item("temporal_passed", record.temporal_passed)?;
                    post.set_item("timestamp", record.timestamp)?;
                    post.set_item("reason", record.reason.as_str())?;
                    post.set_item("message", record.message())?;
                    Ok(())
                };
                fill().map_err(|e| GateError::Publication(e.to_string()))?;
                let result = cb
                    .call1(py, (post,))
                    .map_err(|e| GateError::Publication(e.to_string()))?;
                let mut receipt = PublishReceipt {
                    post_id: next_id.fetch_add(1, Ordering::Relaxed),
                    url: String::new(),
                };
                let result = result.bind(py);
                if let Ok(url) = result.extract::<String>() {
                    receipt.url = url;
                } else if let Ok(id) = result.extract::<u64>() {
                    receipt.post_id = id;
                } else if !result.is_none() {
                    log::warn!(
                        "publish callback returned {}, expected str, int or None",
                        result.get_type().name().map_or_else(|_| "?".into(), |n| n.to_string())
                    );
                }
                Ok(receipt)
            })
        })
    });

    let out = dispatch_decision(
        decision.inner,
        executor.as_ref().map(|e| e as &dyn PaymentExecutor),
        publisher.as_ref().map(|p| p as &dyn DecisionPublisher),
    );

    let result = PyDict::new(py);
    result.set_item("payment_submitted", out.payment_submitted())?;
    result.set_item("published", out.published())?;
    result.set_item(
        "payment_error",
        out.payment.as_ref().and_then(|r| r.as_ref().err()).map(|e| e.to_string()),
    )?;
    result.set_item(
        "publication_error",
        out.publication
            .as_ref()
            .and_then(|r| r.as_ref().err())
            .map(|e| e.to_string()),
    )?;
    result.set_item("decision", PyGateDecision { inner: out.decision })?;
    Ok(result)
}

// ─── Module Registration ────────────────────────────────────────────

/// X-108 Gate — Rust-backed pre-action safety gate.
///
/// - `GatePolicy`: thresholds and hold window
/// - `ActionRequest`: proposed irreversible action
/// - `GateDecision`: ACT / HOLD with reason and details
/// - `evaluate`: pure decision function
/// - `RustSafetyGate`: single hold clock
/// - `RustKeyedSafetyGate`: per-agent hold clocks
/// - `dispatch`: forward a decision to payment/publication callbacks
#[pymodule]
fn x108_gate(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyGatePolicy>()?;
    m.add_class::<PyActionRequest>()?;
    m.add_class::<PyGateDecision>()?;
    m.add_class::<PySafetyGate>()?;
    m.add_class::<PyKeyedSafetyGate>()?;
    m.add_function(wrap_pyfunction!(evaluate, m)?)?;
    m.add_function(wrap_pyfunction!(dispatch, m)?)?;
    Ok(())
}
