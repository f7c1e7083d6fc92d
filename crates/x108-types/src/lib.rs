// ─────────────────────────────────────────────────────────────────────
// X-108 Gate — Types
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Data model, policy configuration, and error hierarchy for the
//! X-108 pre-action safety gate.

pub mod config;
pub mod decision;
pub mod error;
pub mod request;

pub use config::{GatePolicy, GovernanceParams, PolicyOverrides};
pub use decision::{GateAction, GateDecision, GateDetails, GateReason, GateState};
pub use error::{GateError, GateResult};
pub use request::ActionRequest;
