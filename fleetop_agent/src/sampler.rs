//! Background sampler: refreshes the cached snapshot once per `cached_time`, so request
//! handlers only read it.

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use fleetop::timer::Counter;

use crate::metrics::collect_stats;
use crate::state::{AppState, Snapshot};

async fn sample(state: &AppState) -> Snapshot {
    let counter = Counter::new();
    let snap = Snapshot::new(collect_stats(state).await);
    *state.snapshot.write().await = snap.clone();
    debug!("stats refreshed in {:?}", counter.get());
    snap
}

pub fn spawn_sampler(state: AppState, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            sample(&state).await;
            tokio::select! {
                _ = sleep(state.cached_time) => {}
                _ = cancel.cancelled() => break,
            }
        }
    })
}

/// Latest snapshot; collected inline on a cold start.
pub async fn current(state: &AppState) -> Snapshot {
    {
        let snap = state.snapshot.read().await;
        if !snap.blob.is_null() {
            return snap.clone();
        }
    }
    sample(state).await
}
