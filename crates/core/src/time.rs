use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};

/// A simple clock abstraction for deterministic time in services and tests.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    Default,
    Fixed(DateTime<Utc>),
}

impl Clock {
    /// Returns a clock that uses the current system time.
    #[must_use]
    pub fn default_clock() -> Self {
        Self::Default
    }

    /// Returns a clock fixed at the given timestamp.
    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    /// Returns the current time according to the clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::Default => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }

    /// If this is a fixed clock, advance it by the given duration.
    ///
    /// Has no effect on `Clock::Default`.
    pub fn advance(&mut self, delta: Duration) {
        if let Clock::Fixed(t) = self {
            *t += delta;
        }
    }

    /// Returns true if this clock represents real time.
    #[must_use]
    pub fn is_default(&self) -> bool {
        matches!(self, Clock::Default)
    }

    /// Returns true if this clock is fixed.
    #[must_use]
    pub fn is_fixed(&self) -> bool {
        matches!(self, Clock::Fixed(_))
    }
}

/// Truncates a timestamp to the first instant of its UTC calendar month.
///
/// Attempt quotas are counted per calendar month in UTC, so "this month"
/// always means the window starting here.
///
/// # Panics
///
/// Panics if the truncated date cannot be represented, which cannot happen
/// for any input `chrono` itself accepts.
#[must_use]
pub fn start_of_month(at: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(at.year(), at.month(), 1, 0, 0, 0)
        .single()
        .expect("first day of month should be valid")
}

/// First instant of the UTC calendar month after the one containing `at`.
///
/// This is when a monthly attempt quota resets; December rolls over into
/// January of the next year.
///
/// # Panics
///
/// Panics if the rolled-over date cannot be represented, which cannot happen
/// for any input `chrono` itself accepts.
#[must_use]
pub fn start_of_next_month(at: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if at.month() == 12 {
        (at.year() + 1, 1)
    } else {
        (at.year(), at.month() + 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .expect("first day of next month should be valid")
}

/// Deterministic timestamp for tests and examples (2023-11-14T22:13:20Z).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// Returns a deterministic `DateTime<Utc>` for tests and doc examples.
///
/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}

/// Returns a `Clock` fixed at the deterministic test timestamp.
#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_returns_fixed_time() {
        let clock = fixed_clock();
        assert_eq!(clock.now(), fixed_now());
    }

    #[test]
    fn advance_moves_fixed_clock() {
        let mut clock = fixed_clock();
        clock.advance(Duration::minutes(5));
        assert_eq!(clock.now(), fixed_now() + Duration::minutes(5));
    }

    #[test]
    fn start_of_month_truncates() {
        // fixed_now() is 2023-11-14T22:13:20Z.
        let start = start_of_month(fixed_now());
        assert_eq!(start.to_rfc3339(), "2023-11-01T00:00:00+00:00");
    }

    #[test]
    fn start_of_month_is_idempotent() {
        let start = start_of_month(fixed_now());
        assert_eq!(start_of_month(start), start);
    }

    #[test]
    fn next_month_within_year() {
        let next = start_of_next_month(fixed_now());
        assert_eq!(next.to_rfc3339(), "2023-12-01T00:00:00+00:00");
    }

    #[test]
    fn next_month_rolls_into_january() {
        let december = Utc
            .with_ymd_and_hms(2023, 12, 31, 23, 59, 59)
            .single()
            .unwrap();
        let next = start_of_next_month(december);
        assert_eq!(next.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }
}
