//! One-shot hardware agents.
//!
//! Each agent runs a single hardware operation to completion on the
//! serializer worker: it issues the asynchronous call, then suspends on its
//! listener channel — the rendezvous — until the terminal callback, a
//! timeout, or cancellation releases it. One instance per operation; agents
//! are never reused.

mod enumerate;
mod inquiry;
mod presence;

pub use enumerate::{EnumerationOutcome, ServiceSearchAgent};
pub use inquiry::{InquiryAgent, RoundOutcome};
pub use presence::{PresenceAction, PresenceCheckAgent, PresenceOutcome};
