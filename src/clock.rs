use anyhow::{Result, anyhow};
use chrono::{DateTime, Local, LocalResult, NaiveDateTime, TimeZone};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ClockSourceKind {
    System,
    Fixed(NaiveDateTime),
}

/// Source of "now". Read on every computation, never cached by callers.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
    fn label(&self) -> &'static str;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    fn label(&self) -> &'static str {
        "SYSTEM"
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    at: DateTime<Local>,
}

impl FixedClock {
    pub fn new(at: DateTime<Local>) -> Self {
        Self { at }
    }

    pub fn from_local(naive: NaiveDateTime) -> Result<Self> {
        let at = match Local.from_local_datetime(&naive) {
            LocalResult::Single(dt) => dt,
            LocalResult::Ambiguous(first, _second) => first,
            LocalResult::None => {
                return Err(anyhow!(
                    "local time {naive} does not exist in the current timezone"
                ));
            }
        };
        Ok(Self::new(at))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        self.at
    }

    fn label(&self) -> &'static str {
        "FIXED"
    }
}

pub fn select_clock(kind: ClockSourceKind) -> Result<Box<dyn Clock>> {
    match kind {
        ClockSourceKind::System => Ok(Box::new(SystemClock)),
        ClockSourceKind::Fixed(naive) => Ok(Box::new(FixedClock::from_local(naive)?)),
    }
}

pub fn parse_local_datetime(input: &str) -> Result<NaiveDateTime> {
    let trimmed = input.trim();
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M"))
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M"))
        .map_err(|_| anyhow!("invalid local datetime '{input}', expected YYYY-MM-DDTHH:MM[:SS]"))
}
