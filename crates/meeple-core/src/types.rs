//! # Domain Types
//!
//! Customers and seat sessions.
//!
//! ## Seat Session Timer
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  open ──► (no timer)  ──start_timer──►  RUNNING  ──stop_timer──► BILLED │
//! │              │                            │                      │      │
//! │              │                     charge_at(now)          charge_at    │
//! │              │                     = live charge           = frozen     │
//! │              │                                                   │      │
//! │              └──────────── payment (order-only) ─────────► CLOSED ◄┘    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `billed_minutes` and `billed_charge_minor` are written exactly once, by
//! `stop_timer`. After that only the frozen values are authoritative.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::billing::{calculate_time_charge, RateTable, TimeCharge};
use crate::error::{CoreError, CoreResult};
use crate::money::Money;

// =============================================================================
// Customer
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub email: Option<String>,

    /// Cached sum of the customer's ledger. Never negative.
    pub points_balance: i64,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Seat Session
// =============================================================================

/// One customer occupying one seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SeatSession {
    pub id: String,
    pub seat_label: String,
    pub customer_id: Option<String>,

    #[ts(as = "String")]
    pub opened_at: DateTime<Utc>,

    #[ts(as = "Option<String>")]
    pub started_at: Option<DateTime<Utc>>,

    #[ts(as = "Option<String>")]
    pub ended_at: Option<DateTime<Utc>>,

    /// Frozen at stop.
    pub billed_minutes: Option<i64>,

    /// The time line item, frozen at stop.
    pub billed_charge_minor: Option<i64>,

    /// Set when payment completes.
    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,
}

/// What a session currently owes for seat time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionCharge {
    /// Timer running; recomputed on every call.
    Live(TimeCharge),
    /// Timer stopped; the frozen line item.
    Billed {
        billed_minutes: i64,
        charge_minor: i64,
    },
}

impl SessionCharge {
    pub fn total(&self) -> Money {
        match self {
            SessionCharge::Live(charge) => charge.total(),
            SessionCharge::Billed { charge_minor, .. } => Money::from_minor(*charge_minor),
        }
    }
}

impl SeatSession {
    /// Opens a session with no timer.
    pub fn open(seat_label: impl Into<String>, customer_id: Option<String>, now: DateTime<Utc>) -> Self {
        SeatSession {
            id: Uuid::new_v4().to_string(),
            seat_label: seat_label.into(),
            customer_id,
            opened_at: now,
            started_at: None,
            ended_at: None,
            billed_minutes: None,
            billed_charge_minor: None,
            closed_at: None,
        }
    }

    #[inline]
    pub fn is_timer_running(&self) -> bool {
        self.started_at.is_some() && self.ended_at.is_none()
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed_at.is_some()
    }

    pub fn start_timer(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        if self.ended_at.is_some() {
            return Err(CoreError::TimerAlreadyStopped {
                session_id: self.id.clone(),
            });
        }
        if self.started_at.is_some() {
            return Err(CoreError::TimerAlreadyStarted {
                session_id: self.id.clone(),
            });
        }

        self.started_at = Some(now);
        Ok(())
    }

    /// Live charge while running, the frozen line item once stopped.
    pub fn charge_at(&self, now: DateTime<Utc>, rates: &RateTable) -> CoreResult<SessionCharge> {
        if let (Some(minutes), Some(charge)) = (self.billed_minutes, self.billed_charge_minor) {
            return Ok(SessionCharge::Billed {
                billed_minutes: minutes,
                charge_minor: charge,
            });
        }

        let started_at = self.started_at.ok_or_else(|| CoreError::TimerNotStarted {
            session_id: self.id.clone(),
        })?;

        calculate_time_charge(rates, started_at, None, now).map(SessionCharge::Live)
    }

    /// Stops the timer and freezes the billed minutes and charge.
    pub fn stop_timer(&mut self, now: DateTime<Utc>, rates: &RateTable) -> CoreResult<TimeCharge> {
        if self.ended_at.is_some() {
            return Err(CoreError::TimerAlreadyStopped {
                session_id: self.id.clone(),
            });
        }

        let started_at = self.started_at.ok_or_else(|| CoreError::TimerNotStarted {
            session_id: self.id.clone(),
        })?;

        let charge = calculate_time_charge(rates, started_at, Some(now), now)?;
        self.ended_at = Some(now);
        self.billed_minutes = Some(charge.elapsed_minutes);
        self.billed_charge_minor = Some(charge.total_charge_minor);
        Ok(charge)
    }

    /// Billed time in hours, for membership usage.
    pub fn billed_hours(&self) -> Option<f64> {
        self.billed_minutes.map(|m| m as f64 / 60.0)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::RateTier;
    use chrono::Duration;

    #[test]
    fn test_timer_lifecycle() {
        let rates = RateTable::default();
        let t0 = Utc::now() - Duration::hours(3);
        let mut session = SeatSession::open("A-3", None, t0);

        assert!(matches!(
            session.charge_at(t0, &rates),
            Err(CoreError::TimerNotStarted { .. })
        ));

        session.start_timer(t0).unwrap();
        assert!(session.is_timer_running());
        assert!(matches!(
            session.start_timer(t0),
            Err(CoreError::TimerAlreadyStarted { .. })
        ));

        let live = session.charge_at(t0 + Duration::minutes(65), &rates).unwrap();
        assert_eq!(live.total().minor(), 50_000);

        let stopped = session.stop_timer(t0 + Duration::minutes(125), &rates).unwrap();
        assert_eq!(stopped.rate_applied, RateTier::Standard);
        assert_eq!(session.billed_minutes, Some(125));
        assert!(!session.is_timer_running());

        // Frozen: later reads do not recompute
        let later = session.charge_at(t0 + Duration::hours(10), &rates).unwrap();
        assert_eq!(
            later,
            SessionCharge::Billed {
                billed_minutes: 125,
                charge_minor: stopped.total_charge_minor,
            }
        );

        assert!(matches!(
            session.stop_timer(t0 + Duration::hours(11), &rates),
            Err(CoreError::TimerAlreadyStopped { .. })
        ));
        assert!(matches!(
            session.start_timer(t0 + Duration::hours(11)),
            Err(CoreError::TimerAlreadyStopped { .. })
        ));
    }

    #[test]
    fn test_stop_without_start() {
        let mut session = SeatSession::open("B-1", Some("c1".to_string()), Utc::now());
        assert!(matches!(
            session.stop_timer(Utc::now(), &RateTable::default()),
            Err(CoreError::TimerNotStarted { .. })
        ));
        assert_eq!(session.billed_hours(), None);
    }

    #[test]
    fn test_billed_hours() {
        let rates = RateTable::default();
        let t0 = Utc::now() - Duration::hours(5);
        let mut session = SeatSession::open("C-2", None, t0);
        session.start_timer(t0).unwrap();
        session.stop_timer(t0 + Duration::minutes(90), &rates).unwrap();
        assert_eq!(session.billed_hours(), Some(1.5));
    }

    #[test]
    fn test_live_charge_rejects_clock_skew() {
        let rates = RateTable::default();
        let now = Utc::now();
        let mut session = SeatSession::open("D-4", None, now);
        session.start_timer(now + Duration::minutes(2)).unwrap();
        assert!(matches!(
            session.charge_at(now, &rates),
            Err(CoreError::StartInFuture { .. })
        ));
    }
}
