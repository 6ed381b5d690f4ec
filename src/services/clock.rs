use chrono::{Local, Utc};
use chrono_tz::Tz;

const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Wall clock used for `currentTime`. Uses the configured IANA timezone, or
/// the machine's local timezone when none is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct Clock {
    timezone: Option<Tz>,
}

impl Clock {
    pub fn new(timezone: Option<Tz>) -> Self {
        Self { timezone }
    }

    pub fn timezone(&self) -> Option<Tz> {
        self.timezone
    }

    pub fn now_string(&self) -> String {
        match self.timezone {
            Some(tz) => Utc::now().with_timezone(&tz).format(DISPLAY_FORMAT).to_string(),
            None => Local::now().format(DISPLAY_FORMAT).to_string(),
        }
    }
}
