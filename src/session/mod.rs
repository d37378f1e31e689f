//! Session
//!
//! The session state machine and the manager that owns it.

pub mod manager;
pub mod state;

pub use manager::{PendingGuard, SessionManager};
pub use state::SessionStateMachine;
