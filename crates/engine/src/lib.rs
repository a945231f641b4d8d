//! Notification rules and background work: eligibility, OTP verification,
//! preferences, history, reports, job bodies and the scheduler.

pub mod context;
pub mod eligibility;
pub mod history;
pub mod jobs;
pub mod otp;
pub mod preferences;
pub mod report;
pub mod scheduler;
pub mod users;

pub use context::EngineContext;
pub use scheduler::Scheduler;
