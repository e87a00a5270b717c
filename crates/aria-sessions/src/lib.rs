//! Active-session tracking and the process-wide inactivity timer.
//!
//! The manager guarantees at most one armed timer at any instant, bound to
//! the most recently active session, cancelled on new input, on session
//! switch, and on transport disconnect.

pub mod error;
pub mod manager;
pub mod types;

pub use error::{Result, SessionError};
pub use manager::{ReminderFire, SessionTimerManager};
pub use types::Session;
