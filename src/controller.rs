use chrono::{DateTime, Local, NaiveTime};
use serde::Serialize;
use tracing::debug;

use crate::clock::Clock;
use crate::timer::config::{Mode, WidgetConfig};
use crate::timer::delay::{DelayCalculator, DelayOutcome, format_delay, format_time_of_day};
use crate::timer::price::parse_price_state;
use crate::timer::selection::{SelectionError, SelectionState, TimeTargetResolver};

/// Everything a display surface needs to draw the widget at one instant.
#[derive(Debug, Clone, Serialize)]
pub struct WidgetSnapshot {
    pub title: Option<String>,
    pub now_local: String,
    pub clock_source: String,
    pub mode: Mode,
    pub selected_hour: u32,
    pub selected_minute: u32,
    pub selected_time: String,
    pub toggle_visible: bool,
    pub use_best_price: bool,
    pub best_price_available: bool,
    pub best_price_time: Option<String>,
    /// Manual time restored when the best-price toggle is switched off.
    pub manual_time: Option<String>,
    pub programs: Vec<String>,
    pub selected_program_index: usize,
    pub selected_program: Option<String>,
    pub target_local: String,
    pub effective_local: String,
    pub timer_elapses_local: String,
    pub timer_elapses_time: String,
    pub raw_delay_minutes: f64,
    pub delay_minutes: u64,
    pub delay_text: String,
    pub starts_now: bool,
    pub device_timer_interval: u32,
}

pub struct WidgetController {
    config: WidgetConfig,
    resolver: TimeTargetResolver,
    calculator: DelayCalculator,
    clock: Box<dyn Clock>,
}

impl WidgetController {
    pub fn new(config: WidgetConfig, clock: Box<dyn Clock>) -> Self {
        let now = clock.now();
        let resolver = TimeTargetResolver::from_config(&config, &now);
        let calculator = DelayCalculator::from_config(&config);
        debug!(
            mode = config.mode.as_str(),
            selected = %resolver.selection().time().format("%H:%M"),
            clock = clock.label(),
            "widget controller ready"
        );
        Self {
            config,
            resolver,
            calculator,
            clock,
        }
    }

    pub fn config(&self) -> &WidgetConfig {
        &self.config
    }

    pub fn selection(&self) -> &SelectionState {
        self.resolver.selection()
    }

    pub fn apply_price_signal(&mut self, seconds_from_now: Option<u64>) -> Option<NaiveTime> {
        let now = self.clock.now();
        self.resolver.apply_price_signal(&now, seconds_from_now)
    }

    /// Feeds the raw state of the price entity, as the host reports it.
    pub fn apply_price_state(&mut self, raw: &str) -> Option<NaiveTime> {
        self.apply_price_signal(parse_price_state(raw))
    }

    pub fn step_hour(&mut self, delta: i32) {
        self.resolver.step_hour(delta);
    }

    pub fn step_minute(&mut self, delta: i32) {
        self.resolver.step_minute(delta);
    }

    pub fn set_toggle(&mut self, enabled: bool) -> bool {
        self.resolver.set_toggle(enabled)
    }

    pub fn select_program(&mut self, index: usize) -> Result<(), SelectionError> {
        self.resolver.select_program(index)
    }

    pub fn delay(&self) -> (DateTime<Local>, DelayOutcome<Local>) {
        let now = self.clock.now();
        let selection = self.selection();
        let program = self.config.program(selection.program_index());
        let outcome = self.calculator.compute(&now, selection.time(), program);
        (now, outcome)
    }

    pub fn snapshot(&self) -> WidgetSnapshot {
        let (now, outcome) = self.delay();
        let selection = self.selection();
        let display = self.config.time_format;
        let best_price = self.resolver.best_price();
        let elapses = outcome.timer_elapses_at(&now);

        WidgetSnapshot {
            title: self.config.title.clone(),
            now_local: now.to_rfc3339(),
            clock_source: self.clock.label().to_string(),
            mode: self.config.mode,
            selected_hour: selection.hour(),
            selected_minute: selection.minute(),
            selected_time: format_time_of_day(selection.time(), display),
            toggle_visible: self.resolver.price_configured(),
            use_best_price: selection.use_best_price(),
            best_price_available: best_price.is_some(),
            best_price_time: best_price.map(|time| format_time_of_day(time, display)),
            manual_time: selection
                .last_manual()
                .map(|time| format_time_of_day(time, display)),
            programs: self
                .config
                .programs
                .iter()
                .map(|program| program.name.clone())
                .collect(),
            selected_program_index: selection.program_index(),
            selected_program: self
                .config
                .program(selection.program_index())
                .map(|program| program.name.clone()),
            target_local: outcome.target.to_rfc3339(),
            effective_local: outcome.effective.to_rfc3339(),
            timer_elapses_local: elapses.to_rfc3339(),
            timer_elapses_time: format_time_of_day(elapses.time(), display),
            raw_delay_minutes: outcome.raw_delay_minutes(),
            delay_minutes: outcome.delay_minutes,
            delay_text: format_delay(outcome.delay_minutes),
            starts_now: outcome.starts_now(),
            device_timer_interval: self.calculator.interval_minutes(),
        }
    }
}
