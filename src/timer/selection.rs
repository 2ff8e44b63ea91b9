use std::num::NonZeroU32;

use chrono::{DateTime, NaiveTime, TimeDelta, TimeZone, Timelike};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::timer::config::WidgetConfig;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Error)]
pub enum SelectionError {
    #[error("program index {index} is out of range; {count} program(s) configured")]
    InvalidProgramIndex { index: usize, count: usize },
}

/// The user's current choice. The selected time is always a whole minute of a
/// valid time of day.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct SelectionState {
    selected: NaiveTime,
    program_index: usize,
    use_best_price: bool,
    last_manual: Option<NaiveTime>,
}

impl SelectionState {
    pub fn new(initial: NaiveTime) -> Self {
        Self {
            selected: whole_minute(initial),
            program_index: 0,
            use_best_price: false,
            last_manual: None,
        }
    }

    pub fn time(&self) -> NaiveTime {
        self.selected
    }

    pub fn hour(&self) -> u32 {
        self.selected.hour()
    }

    pub fn minute(&self) -> u32 {
        self.selected.minute()
    }

    pub fn program_index(&self) -> usize {
        self.program_index
    }

    pub fn use_best_price(&self) -> bool {
        self.use_best_price
    }

    pub fn last_manual(&self) -> Option<NaiveTime> {
        self.last_manual
    }
}

#[derive(Debug, Clone)]
pub struct TimeTargetResolver {
    selection: SelectionState,
    best_price: Option<NaiveTime>,
    ui_step_minutes: NonZeroU32,
    program_count: usize,
    price_configured: bool,
}

impl TimeTargetResolver {
    pub fn new(
        initial: NaiveTime,
        ui_step_minutes: NonZeroU32,
        program_count: usize,
        price_configured: bool,
    ) -> Self {
        Self {
            selection: SelectionState::new(initial),
            best_price: None,
            ui_step_minutes,
            program_count,
            price_configured,
        }
    }

    /// Starts from the configured default time, or the current time of day.
    pub fn from_config<Tz>(config: &WidgetConfig, now: &DateTime<Tz>) -> Self
    where
        Tz: TimeZone,
    {
        let initial = config.default_time.unwrap_or_else(|| now.time());
        Self::new(
            initial,
            config.ui_time_step_minutes,
            config.programs.len(),
            config.price_configured(),
        )
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn best_price(&self) -> Option<NaiveTime> {
        self.best_price
    }

    pub fn price_configured(&self) -> bool {
        self.price_configured
    }

    /// Records the latest "seconds until cheapest price" value. `None` marks
    /// the signal as unknown.
    pub fn apply_price_signal<Tz>(
        &mut self,
        now: &DateTime<Tz>,
        seconds_from_now: Option<u64>,
    ) -> Option<NaiveTime>
    where
        Tz: TimeZone,
    {
        if !self.price_configured {
            debug!("price signal ignored; no price entity configured");
            return None;
        }

        match seconds_from_now.and_then(|seconds| best_price_time(now, seconds)) {
            Some(best) => {
                self.best_price = Some(best);
                if self.selection.use_best_price {
                    self.selection.selected = best;
                }
                debug!(
                    best_price = %best.format("%H:%M"),
                    following = self.selection.use_best_price,
                    "price signal applied"
                );
            }
            None => {
                self.best_price = None;
                if self.selection.use_best_price {
                    self.selection.use_best_price = false;
                    info!("price signal unavailable; best-price toggle switched off");
                }
            }
        }
        self.best_price
    }

    pub fn step_hour(&mut self, delta: i32) {
        let hour = (i64::from(self.selection.hour()) + i64::from(delta)).rem_euclid(24);
        self.apply_manual(hour, i64::from(self.selection.minute()));
    }

    pub fn step_minute(&mut self, delta: i32) {
        let step = i64::from(self.ui_step_minutes.get());
        let minute = (i64::from(self.selection.minute()) + i64::from(delta) * step).rem_euclid(60);
        self.apply_manual(i64::from(self.selection.hour()), minute);
    }

    /// Returns whether the toggle is on afterwards. Turning it on needs a
    /// configured price entity and a known best-price time.
    pub fn set_toggle(&mut self, enabled: bool) -> bool {
        if enabled {
            let Some(best) = self.best_price.filter(|_| self.price_configured) else {
                debug!("best-price toggle stays off; no best-price time known");
                return false;
            };
            if !self.selection.use_best_price {
                self.selection.last_manual = Some(self.selection.selected);
            }
            self.selection.use_best_price = true;
            self.selection.selected = best;
        } else {
            if let Some(manual) = self.selection.last_manual {
                self.selection.selected = manual;
            }
            self.selection.use_best_price = false;
        }
        info!(
            use_best_price = self.selection.use_best_price,
            selected = %self.selection.selected.format("%H:%M"),
            "best-price toggle set"
        );
        self.selection.use_best_price
    }

    pub fn select_program(&mut self, index: usize) -> Result<(), SelectionError> {
        if self.program_count == 0 {
            debug!(index, "program selection ignored; no programs configured");
            return Ok(());
        }
        if index >= self.program_count {
            warn!(index, count = self.program_count, "rejected program selection");
            return Err(SelectionError::InvalidProgramIndex {
                index,
                count: self.program_count,
            });
        }
        self.selection.program_index = index;
        Ok(())
    }

    fn apply_manual(&mut self, hour: i64, minute: i64) {
        let (Ok(hour), Ok(minute)) = (u32::try_from(hour), u32::try_from(minute)) else {
            return;
        };
        let Some(selected) = NaiveTime::from_hms_opt(hour, minute, 0) else {
            return;
        };
        self.selection.selected = selected;
        self.selection.last_manual = Some(selected);
        self.selection.use_best_price = self.price_configured && self.best_price == Some(selected);
        debug!(
            selected = %selected.format("%H:%M"),
            use_best_price = self.selection.use_best_price,
            "manual time step"
        );
    }
}

/// Wall-clock hour and minute of `now + seconds`, or `None` when the offset
/// cannot be represented.
pub fn best_price_time<Tz>(now: &DateTime<Tz>, seconds_from_now: u64) -> Option<NaiveTime>
where
    Tz: TimeZone,
{
    let seconds = i64::try_from(seconds_from_now).ok()?;
    let best = now
        .clone()
        .checked_add_signed(TimeDelta::try_seconds(seconds)?)?;
    Some(whole_minute(best.time()))
}

fn whole_minute(time: NaiveTime) -> NaiveTime {
    NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time)
}
