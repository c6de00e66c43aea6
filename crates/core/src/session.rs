//! Market session calendar for the primary US options exchanges.
//!
//! Pure function of wall-clock time and a static holiday table. The engine
//! queries this once per cycle to pick its cadence; nothing here performs IO.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::America::New_York;
use serde::{Deserialize, Serialize};

/// Exchange session state at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketSession {
    Closed,
    PreMarket,
    Regular,
    AfterHours,
}

/// Session state plus the instant of the next session transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionState {
    pub session: MarketSession,
    pub next_transition: DateTime<Utc>,
}

impl SessionState {
    /// Seconds from `now` until the next transition.
    pub fn seconds_until_transition(&self, now: DateTime<Utc>) -> i64 {
        (self.next_transition - now).num_seconds().max(0)
    }
}

/// Full-day exchange holidays.
const HOLIDAYS: &[(i32, u32, u32)] = &[
    // 2025
    (2025, 1, 1),
    (2025, 1, 20),
    (2025, 2, 17),
    (2025, 4, 18),
    (2025, 5, 26),
    (2025, 6, 19),
    (2025, 7, 4),
    (2025, 9, 1),
    (2025, 11, 27),
    (2025, 12, 25),
    // 2026
    (2026, 1, 1),
    (2026, 1, 19),
    (2026, 2, 16),
    (2026, 4, 3),
    (2026, 5, 25),
    (2026, 6, 19),
    (2026, 7, 3),
    (2026, 9, 7),
    (2026, 11, 26),
    (2026, 12, 25),
];

/// Sessions that close early at 13:00 ET.
const HALF_DAYS: &[(i32, u32, u32)] = &[
    (2025, 7, 3),
    (2025, 11, 28),
    (2025, 12, 24),
    (2026, 11, 27),
    (2026, 12, 24),
];

/// Determines session state from wall-clock time and the holiday calendar.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarketSessionClock;

impl MarketSessionClock {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Classifies `now` into a session and computes the next transition.
    pub fn session_at(&self, now: DateTime<Utc>) -> SessionState {
        let local = now.with_timezone(&New_York);
        let date = local.date_naive();

        if !Self::is_trading_day(date) {
            return SessionState {
                session: MarketSession::Closed,
                next_transition: Self::next_open_boundary(date),
            };
        }

        let time = local.time();
        let pre_start = NaiveTime::from_hms_opt(4, 0, 0).unwrap();
        let open = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
        let close = if Self::is_half_day(date) {
            NaiveTime::from_hms_opt(13, 0, 0).unwrap()
        } else {
            NaiveTime::from_hms_opt(16, 0, 0).unwrap()
        };
        let after_end = NaiveTime::from_hms_opt(20, 0, 0).unwrap();

        let (session, boundary) = if time < pre_start {
            (MarketSession::Closed, pre_start)
        } else if time < open {
            (MarketSession::PreMarket, open)
        } else if time < close {
            (MarketSession::Regular, close)
        } else if time < after_end {
            (MarketSession::AfterHours, after_end)
        } else {
            return SessionState {
                session: MarketSession::Closed,
                next_transition: Self::next_open_boundary(date),
            };
        };

        SessionState {
            session,
            next_transition: Self::local_to_utc(date, boundary),
        }
    }

    fn is_trading_day(date: NaiveDate) -> bool {
        use chrono::Datelike;
        let weekday = date.weekday().number_from_monday();
        if weekday > 5 {
            return false;
        }
        !HOLIDAYS
            .iter()
            .any(|&(y, m, d)| NaiveDate::from_ymd_opt(y, m, d) == Some(date))
    }

    fn is_half_day(date: NaiveDate) -> bool {
        HALF_DAYS
            .iter()
            .any(|&(y, m, d)| NaiveDate::from_ymd_opt(y, m, d) == Some(date))
    }

    /// Pre-market start (04:00 ET) of the next trading day after `date`.
    fn next_open_boundary(date: NaiveDate) -> DateTime<Utc> {
        let mut next = date + Duration::days(1);
        while !Self::is_trading_day(next) {
            next += Duration::days(1);
        }
        Self::local_to_utc(next, NaiveTime::from_hms_opt(4, 0, 0).unwrap())
    }

    fn local_to_utc(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        let naive = date.and_time(time);
        // Session boundaries never land in the spring-forward gap; the
        // fallback pins to EST if they ever did.
        New_York
            .from_local_datetime(&naive)
            .earliest()
            .map_or_else(
                || Utc.from_utc_datetime(&(naive + Duration::hours(5))),
                |t| t.with_timezone(&Utc),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock() -> MarketSessionClock {
        MarketSessionClock::new()
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn regular_session_midday() {
        // Wednesday 2026-08-05 12:00 ET = 16:00 UTC (EDT)
        let state = clock().session_at(utc(2026, 8, 5, 16, 0));
        assert_eq!(state.session, MarketSession::Regular);
    }

    #[test]
    fn after_hours_at_1605_local() {
        // 16:05 ET = 20:05 UTC during EDT
        let state = clock().session_at(utc(2026, 8, 5, 20, 5));
        assert_eq!(state.session, MarketSession::AfterHours);
    }

    #[test]
    fn pre_market_before_open() {
        // 08:00 ET = 12:00 UTC
        let state = clock().session_at(utc(2026, 8, 5, 12, 0));
        assert_eq!(state.session, MarketSession::PreMarket);
    }

    #[test]
    fn closed_overnight() {
        // 02:00 ET
        let state = clock().session_at(utc(2026, 8, 5, 6, 0));
        assert_eq!(state.session, MarketSession::Closed);
    }

    #[test]
    fn closed_on_weekend() {
        // Saturday 2026-08-08 noon ET
        let state = clock().session_at(utc(2026, 8, 8, 16, 0));
        assert_eq!(state.session, MarketSession::Closed);
    }

    #[test]
    fn closed_on_holiday() {
        // 2026-07-03 is the observed Independence Day holiday (a Friday)
        let state = clock().session_at(utc(2026, 7, 3, 16, 0));
        assert_eq!(state.session, MarketSession::Closed);
    }

    #[test]
    fn half_day_closes_at_1300() {
        // 2026-12-24 is a half day; 14:00 ET = 19:00 UTC (EST)
        let state = clock().session_at(utc(2026, 12, 24, 19, 0));
        assert_eq!(state.session, MarketSession::AfterHours);
    }

    #[test]
    fn regular_session_transition_is_at_close() {
        // 15:59 ET on a full day -> one minute to the close
        let now = utc(2026, 8, 5, 19, 59);
        let state = clock().session_at(now);
        assert_eq!(state.session, MarketSession::Regular);
        assert_eq!(state.seconds_until_transition(now), 60);
    }

    #[test]
    fn weekend_transition_points_at_monday_premarket() {
        // Saturday -> next transition is Monday 04:00 ET = 08:00 UTC
        let state = clock().session_at(utc(2026, 8, 8, 16, 0));
        assert_eq!(state.next_transition, utc(2026, 8, 10, 8, 0));
    }

    #[test]
    fn late_evening_is_closed() {
        // 21:00 ET
        let state = clock().session_at(utc(2026, 8, 6, 1, 0));
        assert_eq!(state.session, MarketSession::Closed);
    }
}
