// ─────────────────────────────────────────────────────────────────────
// X-108 Gate — Payment Execution Interface
// ─────────────────────────────────────────────────────────────────────
//! Payment-execution collaborator.
//!
//! The gate never pays. After an ACT decision the caller may hand
//! `(amount, recipient)` to a `PaymentExecutor`. The simulated backend
//! records submissions in memory; production deployments plug a real
//! settlement client in behind the same trait.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use x108_types::GateResult;

/// Submission acknowledgement returned by an executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub status: String,
    pub asset: String,
    pub amount: f64,
    pub recipient: String,
}

impl PaymentReceipt {
    pub const ASSET: &'static str = "USDC";

    pub fn submitted(amount: f64, recipient: &str) -> Self {
        Self {
            status: "submitted".to_string(),
            asset: Self::ASSET.to_string(),
            amount,
            recipient: recipient.to_string(),
        }
    }
}

/// Trait for payment-execution backends.
pub trait PaymentExecutor: Send + Sync {
    fn execute(&self, amount: f64, recipient: &str) -> GateResult<PaymentReceipt>;
}

/// Simulated executor: logs and records payments, never fails.
#[derive(Default)]
pub struct SimulatedPayments {
    submitted: Mutex<Vec<PaymentReceipt>>,
}

impl SimulatedPayments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) -> Vec<PaymentReceipt> {
        self.submitted.lock().clone()
    }

    pub fn total_submitted(&self) -> f64 {
        self.submitted.lock().iter().map(|r| r.amount).sum()
    }
}

impl PaymentExecutor for SimulatedPayments {
    fn execute(&self, amount: f64, recipient: &str) -> GateResult<PaymentReceipt> {
        log::info!("simulated USDC payment: {amount} -> {recipient}");
        let receipt = PaymentReceipt::submitted(amount, recipient);
        self.submitted.lock().push(receipt.clone());
        Ok(receipt)
    }
}

/// External executor that calls a function pointer.
///
/// Used by the PyO3 FFI layer to delegate settlement to Python.
type PayFn = Box<dyn Fn(f64, &str) -> GateResult<PaymentReceipt> + Send + Sync>;

pub struct ExternalPayments {
    pay_fn: PayFn,
}

impl ExternalPayments {
    pub fn new(
        pay_fn: impl Fn(f64, &str) -> GateResult<PaymentReceipt> + Send + Sync + 'static,
    ) -> Self {
        Self {
            pay_fn: Box::new(pay_fn),
        }
    }
}

impl PaymentExecutor for ExternalPayments {
    fn execute(&self, amount: f64, recipient: &str) -> GateResult<PaymentReceipt> {
        (self.pay_fn)(amount, recipient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use x108_types::GateError;

    #[test]
    fn test_simulated_records() {
        let payments = SimulatedPayments::new();
        let r = payments.execute(3.0, "api_provider").unwrap();
        assert_eq!(r.status, "submitted");
        assert_eq!(r.asset, "USDC");
        payments.execute(4.5, "compute_provider").unwrap();
        assert_eq!(payments.submitted().len(), 2);
        assert!((payments.total_submitted() - 7.5).abs() < 1e-12);
    }

    #[test]
    fn test_external_payments() {
        let ok = ExternalPayments::new(|a, r| Ok(PaymentReceipt::submitted(a, r)));
        assert_eq!(ok.execute(1.0, "x").unwrap().recipient, "x");

        let failing = ExternalPayments::new(|_, _| Err(GateError::Payment("rpc down".into())));
        assert!(matches!(failing.execute(1.0, "x"), Err(GateError::Payment(_))));
    }
}
