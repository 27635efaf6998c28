//! Background expiration sweeper
//!
//! Periodically deletes expired session and password-reset rows. The job is
//! advisory: every consuming operation re-checks expiration, so a failed
//! sweep only delays cleanup. Email verification rows are kept for audit;
//! their expiry is computed at check time.

use keygate_db::Database;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Spawn the sweeper on its own schedule, independent of request lifetimes.
pub fn spawn_sweeper(db: Arc<Database>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            sweep(&db).await;
        }
    })
}

async fn sweep(db: &Database) {
    match db.session_repo().delete_expired().await {
        Ok(0) => debug!("sweep: no expired sessions"),
        Ok(count) => info!(count, "sweep: deleted expired sessions"),
        Err(e) => warn!(error = %e, "sweep: expired session cleanup failed"),
    }

    match db.reset_repo().delete_expired().await {
        Ok(0) => debug!("sweep: no expired password resets"),
        Ok(count) => info!(count, "sweep: deleted expired password resets"),
        Err(e) => warn!(error = %e, "sweep: expired password reset cleanup failed"),
    }
}
