mod schedule;
mod service;
mod tasks;

pub use schedule::{Recurrence, ScheduleSpec};
pub use service::{ScheduledJob, Scheduler};
pub use tasks::CustomPostJob;
