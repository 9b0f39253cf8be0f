//! Periodic sync while the gate is active

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use super::engine::SyncEngine;
use super::remote::{ProfileService, RemoteBackend};
use super::SyncError;
use crate::models::Collection;

/// One background task per collection. Each waits for the gate to open,
/// syncs immediately, then every `SyncSettings::interval` until the gate
/// closes. Dropping the dispatcher stops every task.
pub struct SyncDispatcher {
    tasks: Vec<JoinHandle<()>>,
}

impl SyncDispatcher {
    pub fn start<B, P>(engine: Arc<SyncEngine<B, P>>) -> Self
    where
        B: RemoteBackend,
        P: ProfileService,
    {
        let tasks = Collection::ALL
            .into_iter()
            .map(|collection| tokio::spawn(run_periodic(Arc::clone(&engine), collection)))
            .collect();
        Self { tasks }
    }

    pub fn shutdown(mut self) {
        self.abort_all();
    }

    fn abort_all(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for SyncDispatcher {
    fn drop(&mut self) {
        self.abort_all();
    }
}

async fn run_periodic<B, P>(engine: Arc<SyncEngine<B, P>>, collection: Collection)
where
    B: RemoteBackend,
    P: ProfileService,
{
    let mut gate = engine.gate().subscribe();
    let period = engine.settings().interval;

    loop {
        while !gate.borrow_and_update().is_active() {
            if gate.changed().await.is_err() {
                return;
            }
        }

        tracing::debug!("Periodic sync of {} started", collection);
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match engine.sync_collection(collection).await {
                        Ok(report) => {
                            tracing::trace!("Periodic sync of {} done: {:?}", collection, report);
                        }
                        Err(SyncError::Inactive) => break,
                        Err(error) => {
                            tracing::warn!("Periodic sync of {} failed: {}", collection, error);
                        }
                    }
                }
                changed = gate.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    if !gate.borrow_and_update().is_active() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("Periodic sync of {} stopped", collection);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::SyncSettings;
    use crate::models::{Profile, SubscriptionStatus};
    use crate::store::{EnvelopeStore, MemoryBlobStorage};
    use crate::sync::{MemoryRemote, RemoteCall, Session};

    fn selects_of(remote: &MemoryRemote, collection: Collection) -> usize {
        remote
            .calls()
            .iter()
            .filter(|call| matches!(call, RemoteCall::Select { collection: c, .. } if *c == collection))
            .count()
    }

    async fn setup() -> (Arc<MemoryRemote>, Arc<SyncEngine<MemoryRemote, MemoryRemote>>) {
        let store =
            Arc::new(EnvelopeStore::open("root", Arc::new(MemoryBlobStorage::new())).unwrap());
        let remote = Arc::new(MemoryRemote::new());
        remote.set_subscription("u1", SubscriptionStatus::Active);
        remote.set_profile(Profile {
            user_id: "u1".to_string(),
            cloud_sync_enabled: true,
            last_synced: None,
        });
        let engine = Arc::new(SyncEngine::new(
            store,
            Arc::clone(&remote),
            Arc::clone(&remote),
            SyncSettings::default().with_interval(Duration::from_secs(30)),
        ));
        (remote, engine)
    }

    #[tokio::test(start_paused = true)]
    async fn test_syncs_on_activation_then_every_interval() {
        let (remote, engine) = setup().await;
        let dispatcher = SyncDispatcher::start(Arc::clone(&engine));

        time::sleep(Duration::from_secs(120)).await;
        assert_eq!(selects_of(&remote, Collection::Notes), 0);

        engine.sign_in(Session::new("u1", "token")).await.unwrap();
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(selects_of(&remote, Collection::Notes), 1);

        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(selects_of(&remote, Collection::Notes), 2);

        engine.gate().set_cloud_sync_enabled(false);
        time::sleep(Duration::from_secs(90)).await;
        assert_eq!(selects_of(&remote, Collection::Notes), 2);

        dispatcher.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_dispatcher_stops_syncing() {
        let (remote, engine) = setup().await;
        engine.sign_in(Session::new("u1", "token")).await.unwrap();

        let dispatcher = SyncDispatcher::start(Arc::clone(&engine));
        time::sleep(Duration::from_millis(10)).await;
        let before = selects_of(&remote, Collection::Todos);
        assert_eq!(before, 1);

        drop(dispatcher);
        time::sleep(Duration::from_secs(300)).await;
        assert_eq!(selects_of(&remote, Collection::Todos), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_pass_is_retried_next_interval() {
        let (remote, engine) = setup().await;
        engine.sign_in(Session::new("u1", "token")).await.unwrap();
        remote.fail_next(crate::sync::RemoteOp::Select);

        let _dispatcher = SyncDispatcher::start(Arc::clone(&engine));
        time::sleep(Duration::from_secs(31)).await;

        let total_selects = remote
            .calls()
            .iter()
            .filter(|call| matches!(call, RemoteCall::Select { .. }))
            .count();
        assert!(total_selects >= 7);
        assert!(engine.state().is_active());
    }
}
