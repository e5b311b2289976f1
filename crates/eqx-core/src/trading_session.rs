//! US equity trading session utilities.
//!
//! Classifies instants into New York exchange sessions. Used for:
//! - Market vs extended-hours limit routing
//! - Session-aware logging

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::America::New_York;
use serde::{Deserialize, Serialize};

/// Exchange session classification (America/New_York).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EquitySession {
    /// 04:00 – 09:30 ET on trading days.
    PreMarket,
    /// 09:30 – 16:00 ET on trading days.
    Regular,
    /// 16:00 – 20:00 ET on trading days.
    AfterHours,
    /// Overnight, weekends and exchange holidays.
    Closed,
}

impl std::fmt::Display for EquitySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PreMarket => write!(f, "PreMarket"),
            Self::Regular => write!(f, "Regular"),
            Self::AfterHours => write!(f, "AfterHours"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

fn hm(hour: u32, min: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, min, 0).unwrap_or_default()
}

/// Regular-session calendar with an operator-supplied holiday list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCalendar {
    /// Full-day exchange closures, as New York calendar dates.
    #[serde(default)]
    pub holidays: Vec<NaiveDate>,
}

impl SessionCalendar {
    pub fn new(holidays: Vec<NaiveDate>) -> Self {
        Self { holidays }
    }

    /// Check whether a New York calendar date is a trading day.
    #[must_use]
    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }

    /// Get the session at a given UTC datetime.
    #[must_use]
    pub fn session_at(&self, dt: DateTime<Utc>) -> EquitySession {
        let local = dt.with_timezone(&New_York);
        if !self.is_trading_day(local.date_naive()) {
            return EquitySession::Closed;
        }

        let t = local.time();
        if t >= hm(9, 30) && t < hm(16, 0) {
            EquitySession::Regular
        } else if t >= hm(4, 0) && t < hm(9, 30) {
            EquitySession::PreMarket
        } else if t >= hm(16, 0) && t < hm(20, 0) {
            EquitySession::AfterHours
        } else {
            EquitySession::Closed
        }
    }

    #[must_use]
    pub fn is_regular_open_at(&self, dt: DateTime<Utc>) -> bool {
        self.session_at(dt) == EquitySession::Regular
    }

    #[must_use]
    pub fn is_regular_open_now(&self) -> bool {
        self.is_regular_open_at(Utc::now())
    }
}
