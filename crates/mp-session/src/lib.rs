//! Wallet connection and mint workflow for one browsing session.
//!
//! [`MintOrchestrator`] owns the session: it reconnects silently or asks the
//! wallet for authorization, keeps a contract handle bound to the current
//! account, and reports mint completions through a [`MintSink`].

pub mod orchestrator;
pub mod session;
pub mod subscriber;

#[cfg(test)]
mod testing;

pub use orchestrator::MintOrchestrator;
pub use session::{SessionPhase, SessionState};
pub use subscriber::{EventSubscriber, MintNotifier, MintSink, MintedNotice, NoticeSource};
