//! End-to-end checkout flows and concurrent ledger/membership writes.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, Utc};
use meeple_core::{MembershipPlan, RateTable, SeatSession};
use meeple_db::{Database, DbConfig};
use meeple_services::{
    MembershipService, NewPlan, PointsLedgerService, SeatSettlement, ServiceConfig, ServiceError,
};
use uuid::Uuid;

struct Cafe {
    db: Arc<Database>,
    ledger: PointsLedgerService,
    memberships: MembershipService,
    settlement: SeatSettlement,
}

impl Cafe {
    fn new(db: Database) -> Self {
        let db = Arc::new(db);
        let config = Arc::new(ServiceConfig::default());
        Cafe {
            ledger: PointsLedgerService::new(db.clone(), config.clone()),
            memberships: MembershipService::new(db.clone(), config.clone()),
            settlement: SeatSettlement::new(db.clone(), config),
            db,
        }
    }

    async fn in_memory() -> Self {
        Cafe::new(Database::new(DbConfig::in_memory()).await.unwrap())
    }

    async fn regular_plan(&self) -> MembershipPlan {
        self.memberships
            .create_plan(NewPlan {
                name: "Regular".into(),
                description: None,
                price_minor: 500_000,
                hours_included: 20.0,
                overage_rate_minor: 30_000,
                points_on_purchase: 0,
                earn_rate_denominator: None,
            })
            .await
            .unwrap()
    }

    /// A session whose timer started `minutes` ago.
    async fn session_started_ago(&self, customer_id: Option<&str>, minutes: i64) -> SeatSession {
        let started = Utc::now() - Duration::minutes(minutes);
        let mut session = SeatSession::open("T-5", customer_id.map(str::to_string), started);
        session.start_timer(started).unwrap();
        self.db.seat_sessions().insert(&session).await.unwrap();
        session
    }
}

/// A file-backed database so several connections can contend.
struct TempDb {
    path: PathBuf,
}

impl TempDb {
    fn new() -> Self {
        let path = std::env::temp_dir().join(format!("meeple-test-{}.db", Uuid::new_v4()));
        TempDb { path }
    }

    async fn open(&self) -> Database {
        Database::new(DbConfig::new(&self.path).max_connections(4))
            .await
            .unwrap()
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut path = self.path.clone().into_os_string();
            path.push(suffix);
            let _ = std::fs::remove_file(path);
        }
    }
}

#[tokio::test]
async fn member_two_hour_stay_is_free_and_earns_member_points() {
    let cafe = Cafe::in_memory().await;
    let plan = cafe.regular_plan().await;
    let customer = cafe.db.customers().create("Hina Suzuki", None).await.unwrap();

    let membership = cafe
        .memberships
        .purchase_membership(&customer.id, &plan.id, false)
        .await
        .unwrap();

    let quote = cafe
        .memberships
        .calculate_time_charges(Some(&customer.id), 2.0, None)
        .await
        .unwrap();
    assert_eq!(quote.total_charge_minor, 0);
    assert_eq!(quote.included_hours_used, 2.0);

    let session = cafe.session_started_ago(Some(&customer.id), 120).await;
    let stopped = cafe.settlement.stop_timer(&session.id).await.unwrap();
    assert_eq!(stopped.line_item_minor, 0);
    assert!(stopped.time_charge.total_charge_minor > 0);

    let usage = stopped.membership_usage.unwrap();
    assert_eq!(usage.usage.membership_id, membership.id);
    assert_eq!(usage.usage.overage_hours, 0.0);

    // ¥3,000 of food at the member rate of 40 yen per point
    let paid = cafe
        .settlement
        .complete_payment(&session.id, 300_000, Some("order-42"))
        .await
        .unwrap();
    assert_eq!(paid.points_earned, 75);

    let stored = cafe.db.customers().get_by_id(&customer.id).await.unwrap().unwrap();
    assert_eq!(stored.points_balance, 75);
    assert!(cafe.ledger.reconcile_ledger(&customer.id).await.unwrap().is_consistent());
    assert!(cafe.memberships.reconcile_usage(&membership.id).await.unwrap().is_consistent());
}

#[tokio::test]
async fn walk_in_is_billed_by_the_rate_table() {
    let cafe = Cafe::in_memory().await;

    let session = cafe.session_started_ago(None, 120).await;
    let stopped = cafe.settlement.stop_timer(&session.id).await.unwrap();

    let expected = RateTable::default().charge_for_minutes(stopped.time_charge.elapsed_minutes);
    assert_eq!(stopped.line_item_minor, expected.total_charge_minor);
    assert_eq!(stopped.session.billed_charge_minor, Some(expected.total_charge_minor));
    assert!(stopped.membership_usage.is_none());

    // A second stop is refused; the frozen line item stands
    assert!(matches!(
        cafe.settlement.stop_timer(&session.id).await,
        Err(ServiceError::InvalidState(_))
    ));
    let charge = cafe.settlement.live_charge(&session.id).await.unwrap();
    assert_eq!(charge.total().minor(), expected.total_charge_minor);
}

#[tokio::test]
async fn member_long_stay_is_billed_overage_only() {
    let cafe = Cafe::in_memory().await;
    let plan = cafe.regular_plan().await;
    let customer = cafe.db.customers().create("Yuto Ito", None).await.unwrap();
    let membership = cafe
        .memberships
        .purchase_membership(&customer.id, &plan.id, false)
        .await
        .unwrap();
    cafe.memberships
        .track_hour_usage(&membership.id, 18.0, None, None)
        .await
        .unwrap();

    let session = cafe.session_started_ago(Some(&customer.id), 300).await;
    let stopped = cafe.settlement.stop_timer(&session.id).await.unwrap();

    // 5 hours against 2 remaining: 3 overage hours at ¥300
    let usage = stopped.membership_usage.unwrap();
    assert_eq!(usage.included_hours_used, 2.0);
    assert_eq!(usage.usage.overage_hours, 3.0);
    assert_eq!(stopped.line_item_minor, 90_000);
}

#[tokio::test]
async fn redeeming_past_the_balance_changes_nothing() {
    let cafe = Cafe::in_memory().await;
    let customer = cafe.db.customers().create("Sota Sato", None).await.unwrap();
    cafe.ledger.award_points(&customer.id, 50, None, None).await.unwrap();

    let err = cafe
        .ledger
        .redeem_points(&customer.id, 51, Some("order-1"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InsufficientPoints { .. }));

    let stored = cafe.db.customers().get_by_id(&customer.id).await.unwrap().unwrap();
    assert_eq!(stored.points_balance, 50);
    assert_eq!(cafe.db.points().for_order("order-1").await.unwrap().len(), 0);
}

#[tokio::test]
async fn concurrent_postings_reconcile() {
    let temp = TempDb::new();
    let cafe = Arc::new(Cafe::new(temp.open().await));
    let customer = cafe.db.customers().create("Riku Watanabe", None).await.unwrap();
    cafe.ledger.award_points(&customer.id, 100, None, None).await.unwrap();

    let mut tasks = Vec::new();
    for n in 0..24 {
        let cafe = cafe.clone();
        let customer_id = customer.id.clone();
        tasks.push(tokio::spawn(async move {
            match n % 3 {
                0 => cafe
                    .ledger
                    .award_points(&customer_id, 10, None, None)
                    .await
                    .map(|_| ()),
                1 => cafe
                    .ledger
                    .redeem_points(&customer_id, 7, None, None)
                    .await
                    .map(|_| ()),
                _ => cafe
                    .ledger
                    .adjust_points(&customer_id, -3, "Recount")
                    .await
                    .map(|_| ()),
            }
        }));
    }

    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let report = cafe.ledger.reconcile_ledger(&customer.id).await.unwrap();
    assert!(report.is_consistent(), "{:?}", report);
    assert_eq!(report.transaction_count, 25);
    // 100 + 8×10 − 8×7 − 8×3; never low enough to clamp
    assert_eq!(report.cached_balance, 100);

    cafe.db.close().await;
}

#[tokio::test]
async fn concurrent_hour_usage_never_double_spends() {
    let temp = TempDb::new();
    let cafe = Arc::new(Cafe::new(temp.open().await));
    let plan = cafe.regular_plan().await;
    let customer = cafe.db.customers().create("Sakura Tanaka", None).await.unwrap();
    let membership = cafe
        .memberships
        .purchase_membership(&customer.id, &plan.id, false)
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let cafe = cafe.clone();
        let membership_id = membership.id.clone();
        tasks.push(tokio::spawn(async move {
            cafe.memberships
                .track_hour_usage(&membership_id, 3.0, None, None)
                .await
        }));
    }

    let mut included = 0.0;
    let mut overage = 0.0;
    for task in tasks {
        let recorded = task.await.unwrap().unwrap();
        included += recorded.included_hours_used;
        overage += recorded.usage.overage_hours;
    }

    assert_eq!(included, 20.0);
    assert_eq!(overage, 10.0);

    let stored = cafe.db.memberships().get_by_id(&membership.id).await.unwrap().unwrap();
    assert_eq!(stored.hours_used, 30.0);
    assert!(cafe.memberships.reconcile_usage(&membership.id).await.unwrap().is_consistent());

    cafe.db.close().await;
}

#[tokio::test]
async fn concurrent_purchases_leave_one_membership() {
    let temp = TempDb::new();
    let cafe = Arc::new(Cafe::new(temp.open().await));
    let plan = cafe.regular_plan().await;
    let customer = cafe.db.customers().create("Yui Sato", None).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let cafe = cafe.clone();
        let customer_id = customer.id.clone();
        let plan_id = plan.id.clone();
        tasks.push(tokio::spawn(async move {
            cafe.memberships
                .purchase_membership(&customer_id, &plan_id, false)
                .await
        }));
    }

    let mut succeeded = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(ServiceError::Conflict(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(succeeded, 1);

    let active = cafe.db.memberships().active_for_customer(&customer.id).await.unwrap();
    assert_eq!(active.len(), 1);

    cafe.db.close().await;
}
