//! Exchange session calendar, used to annotate a run.

use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Timelike, Utc, Weekday};

use crate::domain::error::SettlerError;
use crate::ports::config_port::ConfigPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradingWindow {
    pub offset: FixedOffset,
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl Default for TradingWindow {
    /// Taiwan Stock Exchange: UTC+8, single session 09:00-13:30.
    fn default() -> Self {
        Self {
            offset: FixedOffset::east_opt(8 * 3600).expect("constant offset"),
            open: NaiveTime::from_hms_opt(9, 0, 0).expect("constant time"),
            close: NaiveTime::from_hms_opt(13, 30, 0).expect("constant time"),
        }
    }
}

impl TradingWindow {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SettlerError> {
        let defaults = Self::default();

        let hours = config.get_int("market", "utc_offset_hours", 8)?;
        let offset = i32::try_from(hours)
            .ok()
            .filter(|h| (-14..=14).contains(h))
            .and_then(|h| FixedOffset::east_opt(h * 3600))
            .ok_or_else(|| SettlerError::ConfigInvalid {
                section: "market".into(),
                key: "utc_offset_hours".into(),
                reason: format!("{hours} is outside -14..=14"),
            })?;

        let open = parse_session_time(config, "open")?.unwrap_or(defaults.open);
        let close = parse_session_time(config, "close")?.unwrap_or(defaults.close);
        if close <= open {
            return Err(SettlerError::ConfigInvalid {
                section: "market".into(),
                key: "close".into(),
                reason: format!("session close {close} is not after open {open}"),
            });
        }

        Ok(Self {
            offset,
            open,
            close,
        })
    }

    /// True on a local weekday between open and close, inclusive to the minute.
    pub fn is_open_at(&self, at: DateTime<Utc>) -> bool {
        let local = at.with_timezone(&self.offset);
        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        let minute = match NaiveTime::from_hms_opt(local.hour(), local.minute(), 0) {
            Some(t) => t,
            None => return false,
        };
        minute >= self.open && minute <= self.close
    }

    pub fn is_open_now(&self) -> bool {
        self.is_open_at(Utc::now())
    }
}

fn parse_session_time(
    config: &dyn ConfigPort,
    key: &str,
) -> Result<Option<NaiveTime>, SettlerError> {
    match config.get_string("market", key) {
        None => Ok(None),
        Some(raw) => NaiveTime::parse_from_str(raw.trim(), "%H:%M")
            .map(Some)
            .map_err(|_| SettlerError::ConfigInvalid {
                section: "market".into(),
                key: key.into(),
                reason: format!("'{raw}' is not HH:MM"),
            }),
    }
}
