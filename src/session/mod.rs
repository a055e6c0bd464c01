//! Transfer Session Lifecycle
//!
//! # State Machine
//!
//! ```text
//! DRAFT → SUBMITTED → RUNNING → COMPLETED
//!             ↓          ↓
//!      FAILED/CANCELLED  FAILED/CANCELLED
//! ```
//!
//! A `Session` has exactly one owner: every mutating operation takes
//! `&mut Session`, so concurrent callers must go through a single task (or wrap
//! the session in a `tokio::sync::Mutex`). Independent sessions share nothing
//! and can be monitored concurrently.

pub mod error;
pub mod machine;
pub mod monitor;
pub mod state;


pub use error::SessionError;
pub use machine::Session;
pub use monitor::{Monitor, MonitorConfig, MonitorError, await_terminal};
pub use state::{SessionState, Transition};
