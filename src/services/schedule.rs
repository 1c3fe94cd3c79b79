//! Reservation time rules: operating window, lead time and the half-open
//! interval arithmetic used for overlap checks.

use chrono::{DateTime, FixedOffset, NaiveTime, TimeDelta, TimeZone, Timelike, Utc};

use crate::infra::app_error::AppError;

#[derive(Debug, Clone)]
pub struct SchedulePolicy {
    /// First local hour a reservation may start in.
    pub open_hour: u32,
    /// Local hour at which the restaurant closes (exclusive).
    pub close_hour: u32,
    /// Length of every reservation.
    pub duration: TimeDelta,
    /// How far ahead of "now" a reservation may start.
    pub max_lead: TimeDelta,
    pub utc_offset: FixedOffset,
}

/// Half-open time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Touching endpoints do not overlap.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && self.end > other.start
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

impl SchedulePolicy {
    /// Reads an `HH:MM` wall-clock time as today's date on the restaurant clock.
    pub fn resolve_start(&self, hhmm: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, AppError> {
        let time = NaiveTime::parse_from_str(hhmm.trim(), "%H:%M").map_err(|_| {
            AppError::BadRequest(format!("Reservation time {hhmm:?} must be formatted as HH:MM"))
        })?;

        let today = now.with_timezone(&self.utc_offset).date_naive();
        let local = self
            .utc_offset
            .from_local_datetime(&today.and_time(time))
            .single()
            .ok_or_else(|| AppError::BadRequest(format!("Reservation time {hhmm:?} is ambiguous")))?;

        Ok(local.with_timezone(&Utc))
    }

    /// Checks operating hours, past time and lead time, in that order, and
    /// returns the interval the reservation would occupy.
    ///
    /// Only the start is checked against closing time; the end may run past it.
    pub fn validate_start(
        &self,
        start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Interval, AppError> {
        let local_hour = start.with_timezone(&self.utc_offset).hour();
        if local_hour < self.open_hour || local_hour >= self.close_hour {
            return Err(AppError::ScheduleConflict {
                reason: format!(
                    "Reservations are only accepted between {:02}:00 and {:02}:00",
                    self.open_hour, self.close_hour
                ),
                boundary: None,
            });
        }

        if start < now {
            return Err(AppError::ScheduleConflict {
                reason: "Reservation time cannot be in the past".into(),
                boundary: None,
            });
        }

        let latest = now + self.max_lead;
        if start > latest {
            let latest_local = latest.with_timezone(&self.utc_offset).format("%H:%M").to_string();
            return Err(AppError::ScheduleConflict {
                reason: format!("Reservations can only be made up to {latest_local}"),
                boundary: Some(latest_local),
            });
        }

        Ok(Interval::new(start, start + self.duration))
    }
}
