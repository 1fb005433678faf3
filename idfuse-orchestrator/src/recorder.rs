//! Event recorder
//!
//! Background task draining the event bus into SQLite. The orchestrator
//! never waits on it; a lagging recorder loses the oldest events and says
//! so in the log.

use crate::db::{insert_access_log, insert_service_log, retry_on_lock, ServiceLogEntry};
use idfuse_common::events::{EventBus, IdfuseEvent};
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Upper bound on lock retries for a single insert
const MAX_LOCK_WAIT_MS: u64 = 2000;

pub struct Recorder;

impl Recorder {
    /// Subscribe to `bus` and record events until every sender is dropped
    ///
    /// The subscription is taken before this returns, so events emitted
    /// right after spawning are not missed.
    pub fn spawn(pool: SqlitePool, bus: &EventBus) -> JoinHandle<()> {
        let rx = bus.subscribe();
        tokio::spawn(run(pool, rx))
    }
}

async fn run(pool: SqlitePool, mut rx: broadcast::Receiver<IdfuseEvent>) {
    debug!("Recorder started");

    loop {
        match rx.recv().await {
            Ok(event) => record(&pool, &event).await,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Recorder lagged, events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }

    debug!("Recorder stopped");
}

async fn record(pool: &SqlitePool, event: &IdfuseEvent) {
    let result = match event {
        IdfuseEvent::RequestCompleted { record } => {
            retry_on_lock("insert_access_log", MAX_LOCK_WAIT_MS, || {
                insert_access_log(pool, record)
            })
            .await
        }
        other => match ServiceLogEntry::from_event(other) {
            Ok(Some(entry)) => {
                retry_on_lock("insert_service_log", MAX_LOCK_WAIT_MS, || {
                    insert_service_log(pool, &entry)
                })
                .await
            }
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        error!(error = %e, "Failed to record event");
    }
}
