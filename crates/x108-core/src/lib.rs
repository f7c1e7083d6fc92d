// ─────────────────────────────────────────────────────────────────────
// X-108 Gate — Core Engine
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Pre-action safety gate for irreversible agent actions (payments).
//!
//! Given a proposed action, its externally computed safety and coherence
//! scores, and the time of the last qualifying action, the gate answers
//! ACT or HOLD. "An agent should not pay because it can; it should pay
//! only when the action survives time."
//!
//! # Safety Invariants
//!
//! 1. **ACT means every check passed**: safety (when supplied), coherence
//!    and the temporal hold. `GateDecision` derives its action from its
//!    reason, so no caller can assemble an ACT with a failing reason.
//!
//! 2. **The evaluator is pure**: `evaluate` takes `now` and the state as
//!    arguments and returns the next state. Same inputs, same outputs.
//!
//! 3. **Only irreversible actions arm the hold**: the state advances only
//!    on ACT with `amount > 0`.
//!
//! 4. **Evaluate-and-commit is atomic per key**: `SafetyGate` and
//!    `KeyedSafetyGate` hold a `parking_lot::Mutex` across the state read,
//!    the checks and the state write. A burst of concurrent requests with
//!    the same key yields at most one ACT per hold window.
//!
//! 5. **Decisions are final before side effects**: `dispatch` receives a
//!    finished decision and returns it unchanged whatever the payment or
//!    publication collaborators do.

pub mod dispatch;
pub mod evaluator;
pub mod gate;
pub mod payment;
pub mod publish;

pub use dispatch::{dispatch, DispatchOutcome};
pub use evaluator::evaluate;
pub use gate::{unix_now, KeyedSafetyGate, SafetyGate};
pub use payment::{ExternalPayments, PaymentExecutor, PaymentReceipt, SimulatedPayments};
pub use publish::{
    DecisionPublisher, ExternalPublisher, FeedStats, InMemoryFeed, PublicationRecord,
    PublishReceipt,
};
