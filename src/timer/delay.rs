use std::num::NonZeroU32;

use chrono::{DateTime, Days, LocalResult, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Timelike};

use crate::timer::config::{Mode, Program, WidgetConfig};

const MILLIS_PER_MINUTE: i64 = 60_000;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TimeDisplayMode {
    Hour24,
    Hour12,
}

#[derive(Debug, Clone)]
pub struct DelayOutcome<Tz: TimeZone> {
    /// Next occurrence of the selected time of day, strictly after `now`.
    pub target: DateTime<Tz>,
    /// Moment the device timer counts down to: the program start in start
    /// mode, the program completion in end mode.
    pub effective: DateTime<Tz>,
    pub raw_delay_ms: i64,
    pub delay_minutes: u64,
}

impl<Tz> DelayOutcome<Tz>
where
    Tz: TimeZone,
    Tz::Offset: Copy,
{
    pub fn starts_now(&self) -> bool {
        self.delay_minutes == 0
    }

    pub fn raw_delay_minutes(&self) -> f64 {
        self.raw_delay_ms as f64 / MILLIS_PER_MINUTE as f64
    }

    /// When the device timer runs out once the rounded delay is applied.
    pub fn timer_elapses_at(&self, now: &DateTime<Tz>) -> DateTime<Tz> {
        let minutes = i64::try_from(self.delay_minutes).unwrap_or(i64::MAX);
        TimeDelta::try_minutes(minutes)
            .and_then(|delay| now.checked_add_signed(delay))
            .unwrap_or(self.effective)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DelayCalculator {
    mode: Mode,
    interval_minutes: NonZeroU32,
}

impl DelayCalculator {
    pub fn new(mode: Mode, interval_minutes: NonZeroU32) -> Self {
        Self {
            mode,
            interval_minutes,
        }
    }

    pub fn from_config(config: &WidgetConfig) -> Self {
        Self::new(config.mode, config.device_timer_interval_minutes)
    }

    pub fn interval_minutes(&self) -> u32 {
        self.interval_minutes.get()
    }

    pub fn compute<Tz>(
        &self,
        now: &DateTime<Tz>,
        selected: NaiveTime,
        program: Option<&Program>,
    ) -> DelayOutcome<Tz>
    where
        Tz: TimeZone,
        Tz::Offset: Copy,
    {
        let target = target_timestamp(now, selected);
        let effective = match self.mode {
            Mode::Start => target,
            Mode::End => {
                let run = program.map_or(0, Program::run_minutes);
                TimeDelta::try_minutes(run)
                    .and_then(|offset| target.checked_add_signed(offset))
                    .unwrap_or(target)
            }
        };
        let raw_delay_ms = effective.signed_duration_since(*now).num_milliseconds();

        DelayOutcome {
            target,
            effective,
            raw_delay_ms,
            delay_minutes: self.round_up(raw_delay_ms),
        }
    }

    fn round_up(&self, raw_delay_ms: i64) -> u64 {
        let Ok(raw_ms) = u64::try_from(raw_delay_ms) else {
            return 0;
        };
        if raw_ms == 0 {
            return 0;
        }
        let interval = u64::from(self.interval_minutes.get());
        let interval_ms = interval * MILLIS_PER_MINUTE as u64;
        raw_ms.div_ceil(interval_ms) * interval
    }
}

/// Today at `time_of_day`, or the same wall-clock time tomorrow when that
/// moment is not after `now`.
pub fn target_timestamp<Tz>(now: &DateTime<Tz>, time_of_day: NaiveTime) -> DateTime<Tz>
where
    Tz: TimeZone,
    Tz::Offset: Copy,
{
    let timezone = now.timezone();
    let time_of_day = time_of_day.with_nanosecond(0).unwrap_or(time_of_day);
    let today = now.date_naive();
    for day_offset in 0_u64..=1 {
        let Some(date) = today.checked_add_days(Days::new(day_offset)) else {
            break;
        };
        if let Some(candidate) = resolve_wall_clock(&timezone, date.and_time(time_of_day))
            && candidate > *now
        {
            return candidate;
        }
    }
    *now + TimeDelta::days(1)
}

fn resolve_wall_clock<Tz>(timezone: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>>
where
    Tz: TimeZone,
    Tz::Offset: Copy,
{
    match timezone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(first, _second) => Some(first),
        // spring-forward gap: the wall clock resumes an hour later
        LocalResult::None => timezone
            .from_local_datetime(&(naive + TimeDelta::hours(1)))
            .earliest(),
    }
}

pub fn format_time_of_day(time: NaiveTime, mode: TimeDisplayMode) -> String {
    match mode {
        TimeDisplayMode::Hour24 => format!("{:02}:{:02}", time.hour(), time.minute()),
        TimeDisplayMode::Hour12 => {
            let (is_pm, hour12) = time.hour12();
            let meridiem = if is_pm { "PM" } else { "AM" };
            format!("{hour12}:{:02} {meridiem}", time.minute())
        }
    }
}

pub fn format_delay(delay_minutes: u64) -> String {
    if delay_minutes == 0 {
        return "Start now".to_string();
    }
    let hours = delay_minutes / 60;
    let minutes = delay_minutes % 60;
    format!("{hours}h {minutes:02}m")
}
