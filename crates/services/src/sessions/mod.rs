mod progress;
mod state;
mod workflow;

// Public API of the test-taking subsystem.
pub use crate::error::SessionError;
pub use progress::SessionProgress;
pub use state::{Advance, FailureKind, SessionFailure, SessionLiveness, SessionState, TestSession};
pub use workflow::{SessionStep, TestSessionService};
