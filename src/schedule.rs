use std::fmt;
use std::str::FromStr;

use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::error::{ConfigError, LoopFault, ScheduleError};

/// How often the scan repeats once the first run has happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrequencyKind {
    Daily,
    Weekly,
    /// Approximately monthly: a fixed 28 days.
    EveryFourWeeks,
}

impl FrequencyKind {
    pub const ALL: [FrequencyKind; 3] = [Self::Daily, Self::Weekly, Self::EveryFourWeeks];
}

impl FromStr for FrequencyKind {
    type Err = ScheduleError;

    /// Accepts names as well as the numbered menu choices `1`, `2` and `3`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "daily" | "day" => Ok(Self::Daily),
            "2" | "weekly" | "week" => Ok(Self::Weekly),
            "3" | "monthly" | "month" | "every-4-weeks" | "4w" => Ok(Self::EveryFourWeeks),
            _ => Err(ScheduleError::UnknownFrequency(s.trim().to_string())),
        }
    }
}

impl fmt::Display for FrequencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::EveryFourWeeks => "every 4 weeks",
        })
    }
}

/// Recurrence interval for a frequency: 24h, 7d or 28d.
pub fn compute_interval(kind: FrequencyKind) -> Duration {
    match kind {
        FrequencyKind::Daily => Duration::days(1),
        FrequencyKind::Weekly => Duration::weeks(1),
        FrequencyKind::EveryFourWeeks => Duration::weeks(4),
    }
}

/// Interval for a raw frequency selector, failing on anything unrecognised.
pub fn interval_for(selector: &str) -> Result<Duration, ScheduleError> {
    selector.parse().map(compute_interval)
}

/// Time left until `first_run`. Fails unless `first_run` is strictly after `now`.
pub fn compute_first_delay(
    first_run: OffsetDateTime,
    now: OffsetDateTime,
) -> Result<std::time::Duration, ScheduleError> {
    if first_run <= now {
        return Err(ScheduleError::NotInFuture { first_run, now });
    }
    Ok((first_run - now).unsigned_abs())
}

/// Parse a first-run time in the given local offset.
///
/// `YYYY-MM-DD` means local midnight; `YYYY-MM-DD HH:MM` (or with a `T`
/// separator) pins the time of day.
pub fn parse_first_run(input: &str, offset: UtcOffset) -> Result<OffsetDateTime, ConfigError> {
    let s = input.trim();
    let invalid = || ConfigError::InvalidDate {
        input: s.to_string(),
    };

    let date_only = format_description!("[year]-[month]-[day]");
    let spaced = format_description!("[year]-[month]-[day] [hour]:[minute]");
    let t_sep = format_description!("[year]-[month]-[day]T[hour]:[minute]");

    let local = if let Ok(date) = Date::parse(s, date_only) {
        date.midnight()
    } else if let Ok(dt) = PrimitiveDateTime::parse(s, spaced) {
        dt
    } else {
        PrimitiveDateTime::parse(s, t_sep).map_err(|_| invalid())?
    };

    Ok(local.assume_offset(offset))
}

/// Validated schedule: what frequency, and when the first scan happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleSpec {
    frequency: FrequencyKind,
    first_run: OffsetDateTime,
}

impl ScheduleSpec {
    pub fn new(
        frequency: FrequencyKind,
        first_run: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Result<Self, ScheduleError> {
        compute_first_delay(first_run, now)?;
        Ok(Self {
            frequency,
            first_run,
        })
    }

    pub fn frequency(&self) -> FrequencyKind {
        self.frequency
    }

    pub fn first_run(&self) -> OffsetDateTime {
        self.first_run
    }

    pub fn interval(&self) -> Duration {
        compute_interval(self.frequency)
    }
}

/// Live recurrence state. Only the orchestration loop mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledJob {
    next_due: OffsetDateTime,
    interval: Duration,
}

impl ScheduledJob {
    /// Arm the job so that its first due time is the schedule's first run.
    pub fn arm(spec: &ScheduleSpec) -> Self {
        Self {
            next_due: spec.first_run(),
            interval: spec.interval(),
        }
    }

    pub fn next_due(&self) -> OffsetDateTime {
        self.next_due
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_due(&self, now: OffsetDateTime) -> bool {
        now >= self.next_due
    }

    /// Move `next_due` forward by one interval, then skip any further
    /// intervals that are already in the past at `now`.
    ///
    /// Returns the number of skipped runs. Due times always stay on the
    /// `first_run + k * interval` grid.
    pub fn advance(&mut self, now: OffsetDateTime) -> Result<u64, LoopFault> {
        self.next_due = self.step(self.next_due)?;
        let mut skipped = 0;
        while self.next_due <= now {
            self.next_due = self.step(self.next_due)?;
            skipped += 1;
        }
        Ok(skipped)
    }

    fn step(&self, from: OffsetDateTime) -> Result<OffsetDateTime, LoopFault> {
        from.checked_add(self.interval)
            .ok_or(LoopFault::DueOverflow {
                last_due: from,
                interval: self.interval,
            })
    }
}
