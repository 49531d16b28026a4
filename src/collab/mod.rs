pub mod session;

pub use session::{
    DocumentCleanup, ExpiredSession, JoinOutcome, LeaveOutcome, ReleasedState, SessionManager,
    SessionStats,
};
