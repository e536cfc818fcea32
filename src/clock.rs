//! Time source and calendar-day boundaries.

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Utc};

/// Source of "now". Injected so day boundaries can be pinned in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a single instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// The day boundaries one view computation works against.
///
/// All instants are UTC; the calendar day itself is the one observed at
/// `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start_of_today: DateTime<Utc>,
    pub start_of_tomorrow: DateTime<Utc>,
    pub end_of_upcoming: DateTime<Utc>,
}

impl DayWindow {
    pub fn new(now: DateTime<Utc>, offset: FixedOffset, upcoming_days: u32) -> Self {
        let local_midnight = now
            .with_timezone(&offset)
            .date_naive()
            .and_time(NaiveTime::MIN);
        let start_of_today = (local_midnight
            - Duration::seconds(i64::from(offset.local_minus_utc())))
        .and_utc();
        let start_of_tomorrow = start_of_today + Duration::days(1);

        Self {
            start_of_today,
            start_of_tomorrow,
            end_of_upcoming: start_of_tomorrow
                .checked_add_signed(Duration::days(i64::from(upcoming_days)))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_before_today(&self, at: DateTime<Utc>) -> bool {
        at < self.start_of_today
    }

    pub fn is_today(&self, at: DateTime<Utc>) -> bool {
        self.start_of_today <= at && at < self.start_of_tomorrow
    }

    pub fn is_upcoming(&self, at: DateTime<Utc>) -> bool {
        self.start_of_tomorrow <= at && at < self.end_of_upcoming
    }
}
