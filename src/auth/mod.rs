//! Session and token lifecycle
//!
//! Token inspection, the session state machine, and proactive refresh
//! scheduling.

pub mod claims;
pub mod clock;
pub mod scheduler;
pub mod session;

pub use claims::UnverifiedClaims;
pub use clock::{Clock, SystemClock};
pub use scheduler::{RefreshPlan, RefreshScheduler, RefreshTarget, RefreshTiming};
pub use session::{SessionManager, SessionPhase, SessionState};
