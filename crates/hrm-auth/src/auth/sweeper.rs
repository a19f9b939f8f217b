use std::sync::Arc;
use std::time::Duration;

use sea_orm::DatabaseConnection;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::auth::session;

/// Background task that periodically deactivates expired sessions.
///
/// Refresh always re-checks expiry, so the sweeper only keeps the table tidy.
pub struct SessionSweeper {
    stop: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl SessionSweeper {
    /// Start sweeping every `interval`. The first sweep runs immediately.
    pub fn spawn(db: DatabaseConnection, interval: Duration) -> Self {
        let stop = Arc::new(Notify::new());
        let signal = stop.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = signal.notified() => break,
                    _ = ticker.tick() => {
                        match session::sweep_expired(&db).await {
                            Ok(0) => {}
                            Ok(swept) => tracing::info!(swept, "expired sessions deactivated"),
                            Err(e) => tracing::warn!(error = %e, "session sweep failed"),
                        }
                    }
                }
            }
            tracing::debug!("session sweeper stopped");
        });

        SessionSweeper { stop, handle }
    }

    /// Stop the task and wait for it to finish.
    pub async fn stop(self) {
        self.stop.notify_one();
        let _ = self.handle.await;
    }
}
