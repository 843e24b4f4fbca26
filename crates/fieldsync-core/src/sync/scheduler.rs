//! Background loop driving connectivity probes and sync cycles.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::engine::SyncEngine;
use crate::config::SyncSettings;
use crate::connectivity::{ConnectivityMonitor, HealthProbe, Transition};
use crate::remote::RemoteStore;

/// Periodic sync for a long-running client.
///
/// Connectivity checks and cycles run as spawned tasks, so a slow remote
/// never delays the next heartbeat or shutdown. The engine's single-flight
/// guards turn overlapping cycles into no-ops.
pub struct AutoSync<R, P> {
    engine: Arc<SyncEngine<R>>,
    monitor: Arc<ConnectivityMonitor<P>>,
    sync_interval: Duration,
    heartbeat_interval: Duration,
}

/// What asked for a connectivity check, deciding the follow-up cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckReason {
    Startup,
    Heartbeat,
    Interval,
    Attached,
}

impl<R: RemoteStore, P: HealthProbe> AutoSync<R, P> {
    pub fn new(
        engine: Arc<SyncEngine<R>>,
        monitor: Arc<ConnectivityMonitor<P>>,
        settings: &SyncSettings,
    ) -> Self {
        Self {
            engine,
            monitor,
            sync_interval: settings.sync_interval(),
            heartbeat_interval: settings.heartbeat_interval(),
        }
    }

    /// Run until `shutdown` resolves.
    ///
    /// `platform` carries the host's network-attached signal; the loop keeps
    /// running on timers alone once the sender is dropped.
    pub async fn run(self, mut platform: mpsc::Receiver<bool>, shutdown: impl Future<Output = ()>) {
        tracing::info!(
            sync_interval = ?self.sync_interval,
            heartbeat_interval = ?self.heartbeat_interval,
            "Auto-sync running"
        );

        let mut cycles = JoinSet::new();
        let mut checks = JoinSet::new();
        self.spawn_check(&mut checks, CheckReason::Startup);

        let mut heartbeat = interval_after(self.heartbeat_interval);
        let mut sync = interval_after(self.sync_interval);
        let mut platform_open = true;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,

                _ = heartbeat.tick() => self.spawn_check(&mut checks, CheckReason::Heartbeat),

                // Re-probe so a stale flag never hides a reachable remote
                _ = sync.tick() => self.spawn_check(&mut checks, CheckReason::Interval),

                message = platform.recv(), if platform_open => match message {
                    Some(true) => self.spawn_check(&mut checks, CheckReason::Attached),
                    Some(false) => {
                        self.monitor.platform_changed(false).await;
                    }
                    None => {
                        tracing::debug!("Platform connectivity signal closed");
                        platform_open = false;
                    }
                },

                Some(joined) = checks.join_next() => match joined {
                    Ok((reason, transition)) => self.after_check(&mut cycles, reason, transition),
                    Err(error) => tracing::error!("Connectivity check task failed: {error}"),
                },

                Some(joined) = cycles.join_next() => {
                    if let Err(error) = joined {
                        tracing::error!("Sync cycle task failed: {error}");
                    }
                }
            }
        }

        checks.shutdown().await;
        cycles.shutdown().await;
        tracing::info!("Auto-sync stopped");
    }

    fn spawn_check(&self, checks: &mut JoinSet<(CheckReason, Transition)>, reason: CheckReason) {
        let monitor = Arc::clone(&self.monitor);
        checks.spawn(async move { (reason, monitor.check().await) });
    }

    fn after_check(&self, cycles: &mut JoinSet<()>, reason: CheckReason, transition: Transition) {
        match reason {
            CheckReason::Startup => self.spawn_cycle(cycles, "startup"),
            CheckReason::Interval if self.monitor.is_online() => {
                self.spawn_cycle(cycles, "interval");
            }
            CheckReason::Heartbeat | CheckReason::Attached if transition.became_online() => {
                self.spawn_cycle(cycles, "reconnected");
            }
            _ => {}
        }
    }

    fn spawn_cycle(&self, cycles: &mut JoinSet<()>, trigger: &'static str) {
        let engine = Arc::clone(&self.engine);
        cycles.spawn(async move {
            tracing::debug!(trigger, "Starting sync cycle");
            let report = engine.run_cycle().await;
            if report.is_ok() {
                tracing::debug!(trigger, "Sync cycle finished");
            }
        });
    }
}

fn interval_after(period: Duration) -> time::Interval {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::testing::FakeProbe;
    use crate::connectivity::Connectivity;
    use crate::db::LocalStore;
    use crate::events::{SyncEvent, Topic};
    use crate::models::{Gender, Registration, RegistrationFields, RegistrationId, SyncStatus};
    use crate::sync::testing::FakeRemote;
    use crate::util::format_timestamp;
    use serde_json::json;
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    struct Harness {
        engine: Arc<SyncEngine<FakeRemote>>,
        remote: FakeRemote,
        probe: FakeProbe,
        platform: mpsc::Sender<bool>,
        stop: oneshot::Sender<()>,
        task: tokio::task::JoinHandle<()>,
    }

    fn start(reachable: bool) -> Harness {
        let remote = FakeRemote::new();
        let probe = FakeProbe::new(reachable);
        let engine = Arc::new(SyncEngine::new(
            LocalStore::open_in_memory().unwrap(),
            remote.clone(),
            Connectivity::default(),
            "registrations",
        ));
        let monitor = Arc::new(ConnectivityMonitor::new(
            probe.clone(),
            engine.connectivity().clone(),
            engine.events().clone(),
            false,
        ));

        let (platform, platform_rx) = mpsc::channel(4);
        let (stop, stop_rx) = oneshot::channel::<()>();
        let auto = AutoSync::new(Arc::clone(&engine), monitor, &SyncSettings::default());
        let task = tokio::spawn(auto.run(platform_rx, async move {
            stop_rx.await.ok();
        }));

        Harness {
            engine,
            remote,
            probe,
            platform,
            stop,
            task,
        }
    }

    fn fields(first_name: &str) -> RegistrationFields {
        RegistrationFields {
            first_name: first_name.into(),
            last_name: "Sebego".into(),
            gender: Gender::M,
            age: Some(33),
            ..RegistrationFields::default()
        }
    }

    async fn wait_for_status(engine: &SyncEngine<FakeRemote>, record: &Registration, status: SyncStatus) {
        for _ in 0..240 {
            let current = engine.store().get(record.local_id).await.unwrap().unwrap();
            if current.sync_status == status {
                return;
            }
            time::sleep(Duration::from_millis(500)).await;
        }
        panic!("record never reached {status}");
    }

    #[tokio::test(start_paused = true)]
    async fn startup_cycle_pushes_captured_records() {
        let harness = start(true);
        let record = harness.engine.store().create(fields("Gofaone")).await.unwrap();

        wait_for_status(&harness.engine, &record, SyncStatus::Synced).await;
        assert!(harness.engine.connectivity().is_online());

        harness.stop.send(()).unwrap();
        harness.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn sync_interval_pulls_remote_changes() {
        let harness = start(true);
        time::sleep(Duration::from_secs(1)).await;

        let uuid = RegistrationId::new();
        harness.remote.seed(json!({
            "uuid": uuid.to_string(),
            "first_name": "Remote",
            "last_name": "Row",
            "updated_at": format_timestamp(5_000),
        }));

        time::sleep(Duration::from_secs(31)).await;
        assert!(harness.engine.store().find_by_uuid(&uuid).await.unwrap().is_some());

        harness.stop.send(()).unwrap();
        harness.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn platform_signal_toggles_connectivity_and_resyncs() {
        let harness = start(true);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        harness
            .engine
            .events()
            .subscribe(Topic::ConnectivityChanged, move |event| {
                if let SyncEvent::ConnectivityChanged { online } = event {
                    sink.lock().unwrap().push(*online);
                }
            });
        time::sleep(Duration::from_secs(1)).await;
        seen.lock().unwrap().clear();

        harness.platform.send(false).await.unwrap();
        time::sleep(Duration::from_millis(10)).await;
        assert!(!harness.engine.connectivity().is_online());

        let record = harness.engine.store().create(fields("Offline")).await.unwrap();
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            harness.engine.store().get(record.local_id).await.unwrap().unwrap().sync_status,
            SyncStatus::Pending
        );

        harness.platform.send(true).await.unwrap();
        wait_for_status(&harness.engine, &record, SyncStatus::Synced).await;
        assert_eq!(*seen.lock().unwrap(), vec![false, true]);

        harness.stop.send(()).unwrap();
        harness.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn slow_health_check_does_not_hold_up_shutdown() {
        let harness = start(true);
        harness.probe.set_delay(Duration::from_secs(600));
        let record = harness.engine.store().create(fields("Waiting")).await.unwrap();

        time::sleep(Duration::from_secs(20)).await;
        assert!(!harness.engine.connectivity().is_online());
        assert_eq!(
            harness.engine.store().get(record.local_id).await.unwrap().unwrap().sync_status,
            SyncStatus::Pending
        );

        harness.stop.send(()).unwrap();
        let stopped = time::timeout(Duration::from_secs(1), harness.task).await;
        assert!(stopped.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_detects_lost_endpoint() {
        let harness = start(true);
        time::sleep(Duration::from_secs(1)).await;
        assert!(harness.engine.connectivity().is_online());

        harness.probe.set(false);
        time::sleep(Duration::from_secs(16)).await;
        assert!(!harness.engine.connectivity().is_online());
        assert_eq!(harness.remote.rows().len(), 0);

        harness.stop.send(()).unwrap();
        harness.task.await.unwrap();
    }
}
