// ─────────────────────────────────────────────────────────────────────
// X-108 Gate — Post-Decision Dispatch
// ─────────────────────────────────────────────────────────────────────
//! Forward a final decision to the execution and publication
//! collaborators.
//!
//! The decision is moved in already final and handed back unchanged.
//! Collaborator failures are recorded in the outcome and logged; they
//! never turn an ACT into a HOLD or the reverse.

use x108_types::{GateDecision, GateResult};

use crate::payment::{PaymentExecutor, PaymentReceipt};
use crate::publish::{DecisionPublisher, PublicationRecord, PublishReceipt};

/// Result of dispatching one decision.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// The gate's decision, exactly as evaluated.
    pub decision: GateDecision,
    /// `None` when no payment was attempted (HOLD, zero amount, or no
    /// executor configured).
    pub payment: Option<GateResult<PaymentReceipt>>,
    /// `None` when no publisher is configured.
    pub publication: Option<GateResult<PublishReceipt>>,
}

impl DispatchOutcome {
    pub fn payment_submitted(&self) -> bool {
        matches!(self.payment, Some(Ok(_)))
    }

    pub fn published(&self) -> bool {
        matches!(self.publication, Some(Ok(_)))
    }

    /// True when any attempted side effect failed.
    pub fn has_collaborator_error(&self) -> bool {
        matches!(self.payment, Some(Err(_))) || matches!(self.publication, Some(Err(_)))
    }
}

/// Run the side effects of a final decision.
///
/// On ACT with a positive amount the executor is called with the amount
/// and recipient echoed in the decision details. The publisher, if any,
/// receives every decision.
pub fn dispatch(
    decision: GateDecision,
    executor: Option<&dyn PaymentExecutor>,
    publisher: Option<&dyn DecisionPublisher>,
) -> DispatchOutcome {
    let details = decision.details();
    let amount = details.amount.unwrap_or(0.0);

    let payment = match executor {
        Some(executor) if decision.allow() && amount > 0.0 => {
            let recipient = details.recipient.as_deref().unwrap_or_default();
            let result = executor.execute(amount, recipient);
            if let Err(e) = &result {
                log::error!("payment collaborator failed after ACT: {e}");
            }
            Some(result)
        }
        _ => None,
    };

    let publication = publisher.map(|publisher| {
        let record = PublicationRecord::from_decision(&decision);
        let result = publisher.publish(&record);
        if let Err(e) = &result {
            log::error!("publication collaborator failed: {e}");
        }
        result
    });

    DispatchOutcome {
        decision,
        payment,
        publication,
    }
}
