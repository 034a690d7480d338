//! # Expiry Sweeper
//!
//! Background task that expires or renews lapsed memberships.
//!
//! ## Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   interval.tick() ──► MembershipService::process_expired_memberships() │
//! │        ▲                         │                                      │
//! │        │              Ok(n) ─► info!   Err(e) ─► error!, keep looping   │
//! │        └─────────────────────────┘                                      │
//! │                                                                         │
//! │   shutdown_rx.recv() ──► break                                          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A cycle runs to completion before the next tick is taken, so sweeps
//! never overlap. Ticks missed during a long sweep are delayed, not
//! bunched up.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info};

use crate::error::{ServiceError, ServiceResult};
use crate::membership::MembershipService;

/// Runs the expiry sweep on an interval.
pub struct ExpirySweeper {
    memberships: MembershipService,
    interval: Duration,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for stopping a running sweeper.
#[derive(Clone)]
pub struct ExpirySweeperHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl ExpirySweeperHandle {
    /// Asks the sweeper to stop after the current cycle.
    pub async fn shutdown(&self) -> ServiceResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| ServiceError::invalid_state("Expiry sweeper already stopped"))
    }
}

impl ExpirySweeper {
    /// Creates a sweeper and its handle.
    pub fn new(memberships: MembershipService, interval: Duration) -> (Self, ExpirySweeperHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let sweeper = ExpirySweeper {
            memberships,
            interval,
            shutdown_rx,
        };

        (sweeper, ExpirySweeperHandle { shutdown_tx })
    }

    /// One sweep.
    pub async fn run_once(&self) -> ServiceResult<usize> {
        self.memberships.process_expired_memberships().await
    }

    /// Sweeps on every tick until shut down. The first tick fires
    /// immediately.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!(interval_secs = self.interval.as_secs(), "Expiry sweeper starting");

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.run_once().await {
                        Ok(processed) => info!(processed, "Expiry sweep cycle complete"),
                        Err(e) => error!(error = %e, "Expiry sweep cycle failed"),
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Expiry sweeper shutting down");
                    break;
                }
            }
        }

        info!("Expiry sweeper stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use meeple_db::{Database, DbConfig};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let db = Arc::new(Database::new(DbConfig::in_memory()).await.unwrap());
        let memberships = MembershipService::new(db, Arc::new(ServiceConfig::default()));
        let (sweeper, handle) = ExpirySweeper::new(memberships, Duration::from_millis(10));

        assert_eq!(sweeper.run_once().await.unwrap(), 0);

        let task = tokio::spawn(sweeper.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.shutdown().await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("sweeper did not stop")
            .unwrap();

        // Receiver is gone once the loop exits
        assert!(handle.shutdown().await.is_err());
    }
}
