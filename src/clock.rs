use time::{OffsetDateTime, UtcOffset};

/// Source of wall-clock time for scheduling and report stamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// The real clock, reported in a fixed local offset.
///
/// The offset is resolved once at startup; on Unix it can only be read
/// reliably while the process is still single-threaded.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: UtcOffset,
}

impl SystemClock {
    pub fn new(offset: UtcOffset) -> Self {
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc().to_offset(self.offset)
    }
}

/// Wall-clock time derived from tokio's clock, starting at a fixed anchor.
///
/// Under a paused tokio runtime this advances exactly as far as the
/// runtime's sleeps do, which makes multi-day schedules testable.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    anchor: OffsetDateTime,
    started: tokio::time::Instant,
}

impl TokioClock {
    pub fn starting_at(anchor: OffsetDateTime) -> Self {
        Self {
            anchor,
            started: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> OffsetDateTime {
        self.anchor + self.started.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use time::macros::datetime;

    #[tokio::test(start_paused = true)]
    async fn tokio_clock_follows_paused_time() {
        let clock = TokioClock::starting_at(datetime!(2025-04-08 10:00 UTC));
        tokio::time::sleep(Duration::from_secs(2 * 86_400)).await;
        assert_eq!(clock.now(), datetime!(2025-04-10 10:00 UTC));
    }
}
