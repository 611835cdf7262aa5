//! Alert Module
//!
//! Turns threat verdicts into deduplicated, rate-limited user notifications.
//!
//! ## Structure
//! - `dispatcher.rs` - AlertRecord store, dedup key, cool-down decision
//! - `notifier.rs` - Notification / confirmation primitives

pub mod dispatcher;
pub mod notifier;

#[cfg(test)]
mod tests;

pub use dispatcher::{dedup_key, Alert, AlertDispatcher, AlertRecord, DispatchOutcome, Severity};
pub use notifier::{CommandNotifier, LogNotifier, NotifyError, Notifier};
