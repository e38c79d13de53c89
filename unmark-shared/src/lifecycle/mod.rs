//! Task lifecycle and credential rotation
//!
//! ```text
//! user request ─► gate ─► selector ─► submitter ─┬─► task ledger
//!                                                └─► failover (on failure)
//!
//! provider webhook ─► reconciler ─► claim task ─► deliver ─► debit + credit
//!
//! worker ─► redeliver kept results ─► expiry sweep ─► notify owner
//! ```
//!
//! Components hold narrow store trait objects and never cache credential or
//! task rows between calls.

pub mod expiry;
pub mod failover;
pub mod gate;
pub mod notification;
pub mod reconciler;
pub mod selector;
pub mod submitter;

pub use expiry::TaskExpiry;
pub use failover::{FailoverController, FailoverOutcome};
pub use gate::{can_submit, EntitlementGate, GateDecision};
pub use notification::{CompletionState, Notification};
pub use reconciler::{Ack, ReconcileError, ReconcileOutcome, Redelivery, WebhookReconciler};
pub use selector::{select_from, CredentialSelector};
pub use submitter::{JobSubmitter, SubmitError};
