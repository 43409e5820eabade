use chrono::{DateTime, Utc};

/// Injectable clock, so due-at computations and "overdue" reads can be
/// pinned in tests.
pub trait TimeSource {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Default)]
pub struct SystemTime;

impl TimeSource for SystemTime {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
