//! # Seat Settlement
//!
//! Seat timer → time charge → membership hours → payment → points.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  open_session ──► start_timer ──► live_charge (any number of times)     │
//! │                                        │                                │
//! │                                        ▼                                │
//! │  stop_timer   (one transaction)                                         │
//! │    ├── freeze billed minutes                                            │
//! │    ├── grace?   line item = 0, no hours committed                       │
//! │    ├── member?  track_hour_usage_in → line item = overage charge        │
//! │    └── walk-in? line item = tiered calculator charge                    │
//! │                                        │                                │
//! │                                        ▼                                │
//! │  complete_payment (one transaction)                                     │
//! │    ├── award points on the paid amount                                  │
//! │    └── close session                                                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! After `stop_timer` the frozen line item is the only charge reported;
//! nothing is recomputed.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};
use ts_rs::TS;

use meeple_core::points::LedgerOp;
use meeple_core::types::SessionCharge;
use meeple_core::validation::{validate_amount_minor, validate_description, validate_name};
use meeple_core::{PointsTransaction, RateTier, SeatSession, TimeCharge};
use meeple_db::{Database, MembershipRepository, SeatSessionRepository};

use crate::config::ServiceConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::ledger::PointsLedgerService;
use crate::membership::{MembershipService, RecordedUsage};

/// What `stop_timer` froze.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StoppedSession {
    pub session: SeatSession,
    /// The tiered charge for the stay.
    pub time_charge: TimeCharge,
    /// The amount that goes on the order.
    pub line_item_minor: i64,
    /// Present when the hours were charged to a membership.
    pub membership_usage: Option<RecordedUsage>,
}

/// What `complete_payment` did.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SettledPayment {
    pub session: SeatSession,
    pub points_earned: i64,
    pub transaction: Option<PointsTransaction>,
}

/// Seat session settlement.
#[derive(Debug, Clone)]
pub struct SeatSettlement {
    db: Arc<Database>,
    config: Arc<ServiceConfig>,
    ledger: PointsLedgerService,
}

impl SeatSettlement {
    pub fn new(db: Arc<Database>, config: Arc<ServiceConfig>) -> Self {
        let ledger = PointsLedgerService::new(db.clone(), config.clone());
        SeatSettlement { db, config, ledger }
    }

    /// Occupies a seat. The timer is not started.
    pub async fn open_session(&self, seat_label: &str, customer_id: Option<&str>) -> ServiceResult<SeatSession> {
        validate_name("seat_label", seat_label)?;

        if let Some(id) = customer_id {
            self.db
                .customers()
                .get_by_id(id)
                .await?
                .ok_or_else(|| ServiceError::not_found("Customer", id))?;
        }

        let session = SeatSession::open(seat_label.trim(), customer_id.map(str::to_string), Utc::now());
        self.db.seat_sessions().insert(&session).await?;

        info!(session_id = %session.id, seat = %session.seat_label, "Seat session opened");
        Ok(session)
    }

    pub async fn start_timer(&self, session_id: &str) -> ServiceResult<SeatSession> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let mut session = SeatSessionRepository::lock(&mut tx, session_id, now).await?;
        ensure_open(&session)?;
        session.start_timer(now)?;
        SeatSessionRepository::set_started(&mut tx, session_id, now).await?;

        tx.commit().await?;

        debug!(session_id = %session_id, "Seat timer started");
        Ok(session)
    }

    /// The running charge, or the frozen line item once stopped.
    pub async fn live_charge(&self, session_id: &str) -> ServiceResult<SessionCharge> {
        let session = self.get_session(session_id).await?;
        Ok(session.charge_at(Utc::now(), &self.config.billing)?)
    }

    /// Stops the timer and freezes the line item.
    ///
    /// For a customer with an active membership the billed hours are
    /// committed to the membership in the same transaction, and the line
    /// item is the overage charge. A stay inside the grace period commits
    /// no hours.
    pub async fn stop_timer(&self, session_id: &str) -> ServiceResult<StoppedSession> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let mut session = SeatSessionRepository::lock(&mut tx, session_id, now).await?;
        ensure_open(&session)?;
        let time_charge = session.stop_timer(now, &self.config.billing)?;

        // Stays inside the grace period are free for everyone
        let membership = match &session.customer_id {
            _ if time_charge.rate_applied == RateTier::Grace => None,
            Some(customer_id) => MembershipRepository::active_for_customer_in(&mut tx, customer_id)
                .await?
                .into_iter()
                .find(|m| m.is_active_at(now)),
            None => None,
        };

        let (line_item_minor, membership_usage) = match membership {
            Some(membership) => {
                let hours = session.billed_hours().unwrap_or(0.0);
                let description = format!("Seat {}", session.seat_label);
                let recorded = MembershipService::track_hour_usage_in(
                    &mut tx,
                    &membership.id,
                    hours,
                    Some(&session.id),
                    Some(&description),
                    now,
                )
                .await?;
                (recorded.usage.overage_charge_minor, Some(recorded))
            }
            None => (time_charge.total_charge_minor, None),
        };

        session.billed_charge_minor = Some(line_item_minor);
        SeatSessionRepository::freeze(&mut tx, &session).await?;

        tx.commit().await?;

        info!(
            session_id = %session.id,
            billed_minutes = time_charge.elapsed_minutes,
            rate = time_charge.rate_applied.as_tag(),
            line_item_minor,
            member = membership_usage.is_some(),
            "Seat timer stopped"
        );

        Ok(StoppedSession {
            session,
            time_charge,
            line_item_minor,
            membership_usage,
        })
    }

    /// Records payment for a session and awards points on the paid amount.
    ///
    /// A running timer must be stopped first. Payments too small to earn a
    /// point close the session without a ledger row.
    pub async fn complete_payment(
        &self,
        session_id: &str,
        paid_amount_minor: i64,
        order_id: Option<&str>,
    ) -> ServiceResult<SettledPayment> {
        validate_amount_minor("paid_amount_minor", paid_amount_minor)?;
        if let Some(id) = order_id {
            validate_description("order_id", id)?;
        }

        let session = self.get_session(session_id).await?;
        ensure_open(&session)?;
        if session.is_timer_running() {
            return Err(ServiceError::invalid_state(format!(
                "Seat session {} still has a running timer",
                session_id
            )));
        }

        let points_earned = match &session.customer_id {
            Some(customer_id) => {
                self.ledger
                    .calculate_points_earned(paid_amount_minor, Some(customer_id))
                    .await?
            }
            None => 0,
        };

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let mut session = SeatSessionRepository::lock(&mut tx, session_id, now).await?;
        ensure_open(&session)?;

        let transaction = match (&session.customer_id, points_earned) {
            (Some(customer_id), points) if points > 0 => {
                let description = format!("Seat {}", session.seat_label);
                let posted = PointsLedgerService::post_in(
                    &mut tx,
                    customer_id,
                    LedgerOp::Earn(points),
                    order_id,
                    Some(&description),
                    now,
                )
                .await?;
                Some(posted.transaction)
            }
            _ => None,
        };

        SeatSessionRepository::close(&mut tx, session_id, now).await?;
        tx.commit().await?;

        session.closed_at = Some(now);

        info!(
            session_id = %session_id,
            paid_amount_minor,
            points_earned,
            "Seat session paid"
        );

        Ok(SettledPayment {
            session,
            points_earned,
            transaction,
        })
    }

    /// Sessions not yet paid, oldest first.
    pub async fn list_open_sessions(&self) -> ServiceResult<Vec<SeatSession>> {
        Ok(self.db.seat_sessions().list_open().await?)
    }

    pub async fn get_session(&self, session_id: &str) -> ServiceResult<SeatSession> {
        self.db
            .seat_sessions()
            .get_by_id(session_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("SeatSession", session_id))
    }
}

fn ensure_open(session: &SeatSession) -> ServiceResult<()> {
    if session.is_closed() {
        return Err(ServiceError::invalid_state(format!(
            "Seat session {} is already closed",
            session.id
        )));
    }
    Ok(())
}
