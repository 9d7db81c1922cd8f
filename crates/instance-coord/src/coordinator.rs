use crate::record::now_millis;
use crate::{CoordError, Health, InstanceRecord, Result, Role, StatusStore};
use command_core::{ClusterSummary, ClusterView, PeerSummary, ShutdownSignal};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub instance_id: u32,
    /// Expected number of instances, ids `0..cluster_size`.
    pub cluster_size: u32,
    pub heartbeat_interval_ms: u64,
    /// Peers silent for longer than this are reported unreachable.
    pub stale_after_ms: u64,
    /// Upper bound on one read of the shared channel.
    pub read_timeout_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            instance_id: 0,
            cluster_size: 1,
            heartbeat_interval_ms: 1_000,
            stale_after_ms: 5_000,
            read_timeout_ms: 500,
        }
    }
}

impl CoordinatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cluster_size == 0 {
            return Err(CoordError::InvalidConfig("cluster_size must be at least 1".into()));
        }
        if self.instance_id >= self.cluster_size {
            return Err(CoordError::InvalidConfig(format!(
                "instance_id {} outside cluster of size {}",
                self.instance_id, self.cluster_size
            )));
        }
        if self.heartbeat_interval_ms == 0 || self.stale_after_ms <= self.heartbeat_interval_ms {
            return Err(CoordError::InvalidConfig(
                "stale_after_ms must exceed a non-zero heartbeat_interval_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerStatus {
    pub instance_id: u32,
    pub role: Role,
    pub health: Health,
    /// `None` when the peer never published a record.
    pub heartbeat_age_ms: Option<u64>,
    pub pid: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub instance_id: u32,
    pub role: Role,
    pub cluster_size: u32,
    pub peers: Vec<PeerStatus>,
    /// The shared channel could not be read in time; peer health is unknown.
    pub degraded: bool,
}

impl ClusterStatus {
    pub fn healthy_peers(&self) -> usize {
        self.peers
            .iter()
            .filter(|p| p.health == Health::Healthy)
            .count()
    }

    pub fn unhealthy_peers(&self) -> usize {
        self.peers.len() - self.healthy_peers()
    }
}

/// Health of every instance expected from `cluster_size` plus any other
/// instance that published a record. Expected instances with no record are
/// unreachable.
pub fn assess_peers(
    records: &[InstanceRecord],
    cluster_size: u32,
    exclude: Option<u32>,
    now_ms: u64,
    stale_after_ms: u64,
) -> Vec<PeerStatus> {
    let mut ids: Vec<u32> = (0..cluster_size).collect();
    for record in records {
        if !ids.contains(&record.instance_id) {
            ids.push(record.instance_id);
        }
    }
    ids.sort_unstable();

    ids.into_iter()
        .filter(|id| Some(*id) != exclude)
        .map(|id| match records.iter().find(|r| r.instance_id == id) {
            Some(r) => {
                let age = r.age_ms(now_ms);
                let fresh = age <= stale_after_ms && r.health == Health::Healthy;
                PeerStatus {
                    instance_id: id,
                    role: r.role(),
                    health: if fresh { Health::Healthy } else { Health::Unreachable },
                    heartbeat_age_ms: Some(age),
                    pid: Some(r.pid),
                }
            }
            None => PeerStatus {
                instance_id: id,
                role: Role::for_instance(id),
                health: Health::Unreachable,
                heartbeat_age_ms: None,
                pid: None,
            },
        })
        .collect()
}

/// One per process. Publishes this instance's record and reads its peers'.
pub struct InstanceCoordinator {
    config: CoordinatorConfig,
    store: Arc<dyn StatusStore>,
    shutdown: ShutdownSignal,
    record: Mutex<InstanceRecord>,
    started_ms: u64,
    /// Set while a reader thread is inside `StatusStore::snapshot`.
    read_in_flight: Arc<AtomicBool>,
}

/// Clears the in-flight flag when the reader thread ends, panicking or not.
struct ReadGuard(Arc<AtomicBool>);

impl Drop for ReadGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl InstanceCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        store: Arc<dyn StatusStore>,
        shutdown: ShutdownSignal,
    ) -> Result<Self> {
        config.validate()?;
        let record = InstanceRecord::new(config.instance_id, config.cluster_size);
        tracing::info!(
            instance = config.instance_id,
            role = %record.role(),
            cluster_size = config.cluster_size,
            "instance coordinator created"
        );
        Ok(Self {
            started_ms: record.last_heartbeat_ms,
            record: Mutex::new(record),
            config,
            store,
            shutdown,
            read_in_flight: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn instance_id(&self) -> u32 {
        self.config.instance_id
    }

    pub fn role(&self) -> Role {
        Role::for_instance(self.config.instance_id)
    }

    pub fn is_master(&self) -> bool {
        self.role() == Role::Master
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Publish a fresh record. The master's record carries the shutdown flag.
    pub fn heartbeat(&self) -> Result<()> {
        let record = {
            let mut record = self.record.lock();
            record.last_heartbeat_ms = now_millis();
            record.health = Health::Healthy;
            record.shutdown_requested = self.is_master() && self.shutdown.is_triggered();
            record.clone()
        };
        self.store.put(&record)
    }

    /// Heartbeat, then, on a worker, follow a shutdown published by the master.
    pub fn sync_once(&self) -> Result<()> {
        self.heartbeat()?;
        if self.is_master() || self.shutdown.is_triggered() {
            return Ok(());
        }
        let records = self.snapshot_bounded()?;
        let now = now_millis();
        let master_stopping = records.iter().any(|r| {
            r.is_master
                && r.shutdown_requested
                && r.last_heartbeat_ms >= self.started_ms
                && r.age_ms(now) <= self.config.stale_after_ms
        });
        if master_stopping && self.shutdown.trigger() {
            tracing::info!(instance = self.instance_id(), "master requested shutdown; following");
        }
        Ok(())
    }

    /// Read the shared channel on a helper thread, waiting at most
    /// `read_timeout`. A read that overruns is abandoned, and no new reader
    /// starts until it returns: at most one reader thread exists at a time.
    pub fn snapshot_bounded(&self) -> Result<Vec<InstanceRecord>> {
        if self.read_in_flight.swap(true, Ordering::AcqRel) {
            tracing::debug!("previous status read still pending");
            return Err(CoordError::ReadPending);
        }
        let guard = ReadGuard(Arc::clone(&self.read_in_flight));
        let (tx, rx) = mpsc::channel();
        let store = Arc::clone(&self.store);
        std::thread::Builder::new()
            .name("coord-read".into())
            .spawn(move || {
                let result = store.snapshot();
                // Cleared before sending so the caller never sees its own read pending.
                drop(guard);
                let _ = tx.send(result);
            })
            .map_err(|e| CoordError::Store(format!("failed to spawn reader: {e}")))?;
        let timeout = self.config.read_timeout();
        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(CoordError::Timeout(timeout)),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(CoordError::Store("status reader exited without a result".into()))
            }
        }
    }

    /// Local role, expected size and advisory peer health. Never blocks longer
    /// than the read timeout; an unreadable channel marks every peer unreachable.
    pub fn cluster_status(&self) -> ClusterStatus {
        let (records, degraded) = match self.snapshot_bounded() {
            Ok(records) => (records, false),
            Err(e) => {
                tracing::warn!("cluster status degraded: {}", e);
                (Vec::new(), true)
            }
        };
        let me = self.instance_id();
        let peers = assess_peers(
            &records,
            self.config.cluster_size,
            Some(me),
            now_millis(),
            self.config.stale_after_ms,
        );

        ClusterStatus {
            instance_id: me,
            role: self.role(),
            cluster_size: self.config.cluster_size.max(peers.len() as u32 + 1),
            peers,
            degraded,
        }
    }

    /// Start the heartbeat thread. It exits once the shutdown signal fires:
    /// the master publishes a last record carrying the shutdown flag, a
    /// worker withdraws its record.
    pub fn spawn_heartbeat(self: &Arc<Self>) -> Result<HeartbeatHandle> {
        let coord = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name(format!("heartbeat-{}", self.instance_id()))
            .spawn(move || coord.heartbeat_loop())
            .map_err(|e| CoordError::Store(format!("failed to spawn heartbeat thread: {e}")))?;
        Ok(HeartbeatHandle {
            handle: Some(handle),
        })
    }

    fn heartbeat_loop(&self) {
        let interval = self.config.heartbeat_interval();
        loop {
            if let Err(e) = self.sync_once() {
                tracing::warn!(instance = self.instance_id(), "heartbeat failed: {}", e);
            }
            if self.shutdown.wait_timeout(interval) {
                break;
            }
        }
        let outcome = if self.is_master() {
            self.heartbeat()
        } else {
            self.store.remove(self.instance_id())
        };
        match outcome {
            Ok(()) => tracing::info!(instance = self.instance_id(), "heartbeat stopped"),
            Err(e) => tracing::warn!(instance = self.instance_id(), "final status update failed: {}", e),
        }
    }
}

impl ClusterView for InstanceCoordinator {
    fn summary(&self) -> ClusterSummary {
        let status = self.cluster_status();
        ClusterSummary {
            instance_id: status.instance_id,
            role: status.role.as_str().to_string(),
            cluster_size: status.cluster_size as usize,
            healthy_peers: status.healthy_peers(),
            unhealthy_peers: status.unhealthy_peers(),
            peers: status
                .peers
                .iter()
                .map(|p| PeerSummary {
                    instance_id: p.instance_id,
                    role: p.role.as_str().to_string(),
                    healthy: p.health == Health::Healthy,
                    heartbeat_age_ms: p.heartbeat_age_ms,
                })
                .collect(),
        }
    }
}

pub struct HeartbeatHandle {
    handle: Option<JoinHandle<()>>,
}

impl HeartbeatHandle {
    /// Wait for the heartbeat thread; returns once shutdown has been observed.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("heartbeat thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FileStatusStore, MemoryStatusStore};
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    #[test]
    fn test_assess_peers_includes_unexpected_instances() {
        let mut fresh = InstanceRecord::new(0, 2);
        fresh.last_heartbeat_ms = 10_000;
        let mut extra = InstanceRecord::new(4, 2);
        extra.last_heartbeat_ms = 1_000;
        let peers = assess_peers(&[fresh, extra], 2, None, 10_500, 2_000);

        let ids: Vec<u32> = peers.iter().map(|p| p.instance_id).collect();
        assert_eq!(ids, vec![0, 1, 4]);
        assert_eq!(peers[0].health, Health::Healthy);
        assert_eq!(peers[0].heartbeat_age_ms, Some(500));
        assert_eq!(peers[1].health, Health::Unreachable);
        assert_eq!(peers[1].heartbeat_age_ms, None);
        assert_eq!(peers[2].health, Health::Unreachable);
        assert_eq!(peers[2].role, Role::Worker);
    }

    fn config(instance_id: u32, cluster_size: u32) -> CoordinatorConfig {
        CoordinatorConfig {
            instance_id,
            cluster_size,
            heartbeat_interval_ms: 20,
            stale_after_ms: 1_000,
            read_timeout_ms: 200,
        }
    }

    fn coordinator(
        instance_id: u32,
        cluster_size: u32,
        store: &Arc<dyn StatusStore>,
    ) -> InstanceCoordinator {
        InstanceCoordinator::new(
            config(instance_id, cluster_size),
            Arc::clone(store),
            ShutdownSignal::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_config_validation() {
        assert!(config(0, 1).validate().is_ok());
        assert!(config(2, 2).validate().is_err());
        assert!(config(0, 0).validate().is_err());
        let mut bad = config(0, 1);
        bad.stale_after_ms = 10;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_stale_and_missing_peers_are_unreachable() {
        let store: Arc<dyn StatusStore> = Arc::new(MemoryStatusStore::new());
        let master = coordinator(0, 3, &store);
        master.heartbeat().unwrap();

        let mut stale = InstanceRecord::new(1, 3);
        stale.last_heartbeat_ms = now_millis() - 10_000;
        store.put(&stale).unwrap();

        let status = master.cluster_status();
        assert_eq!(status.role, Role::Master);
        assert_eq!(status.cluster_size, 3);
        assert!(!status.degraded);
        assert_eq!(status.peers.len(), 2);
        assert_eq!(status.peers[0].health, Health::Unreachable);
        assert!(status.peers[0].heartbeat_age_ms.unwrap() >= 10_000);
        assert_eq!(status.peers[1].instance_id, 2);
        assert_eq!(status.peers[1].heartbeat_age_ms, None);
        assert_eq!(status.healthy_peers(), 0);
    }

    #[test]
    fn test_worker_sees_healthy_master() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn StatusStore> = Arc::new(FileStatusStore::new(dir.path()).unwrap());
        let master = coordinator(0, 2, &store);
        let worker = coordinator(1, 2, &store);
        master.heartbeat().unwrap();
        worker.sync_once().unwrap();

        let summary = worker.summary();
        assert_eq!(summary.role, "worker");
        assert_eq!(summary.healthy_peers, 1);
        assert_eq!(summary.unhealthy_peers, 0);
        assert!(summary.peers[0].healthy);
    }

    #[test]
    fn test_master_shutdown_propagates_to_worker() {
        let store: Arc<dyn StatusStore> = Arc::new(MemoryStatusStore::new());
        let master = coordinator(0, 2, &store);
        let worker = coordinator(1, 2, &store);

        master.heartbeat().unwrap();
        worker.sync_once().unwrap();
        assert!(!worker.shutdown_signal().is_triggered());

        master.shutdown_signal().trigger();
        master.heartbeat().unwrap();
        worker.sync_once().unwrap();
        assert!(worker.shutdown_signal().is_triggered());
    }

    #[test]
    fn test_stale_shutdown_marker_is_ignored() {
        let store: Arc<dyn StatusStore> = Arc::new(MemoryStatusStore::new());
        let mut old_master = InstanceRecord::new(0, 2);
        old_master.shutdown_requested = true;
        old_master.last_heartbeat_ms = now_millis() - 60_000;
        store.put(&old_master).unwrap();

        let worker = coordinator(1, 2, &store);
        worker.sync_once().unwrap();
        assert!(!worker.shutdown_signal().is_triggered());
    }

    struct SlowStore;

    impl StatusStore for SlowStore {
        fn put(&self, _record: &InstanceRecord) -> Result<()> {
            Ok(())
        }

        fn snapshot(&self) -> Result<Vec<InstanceRecord>> {
            std::thread::sleep(Duration::from_millis(800));
            Ok(Vec::new())
        }

        fn remove(&self, _instance_id: u32) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_slow_channel_does_not_block_status() {
        let store: Arc<dyn StatusStore> = Arc::new(SlowStore);
        let mut cfg = config(0, 2);
        cfg.read_timeout_ms = 50;
        let coord = InstanceCoordinator::new(cfg, store, ShutdownSignal::new()).unwrap();

        let started = Instant::now();
        let status = coord.cluster_status();
        assert!(started.elapsed() < Duration::from_millis(600));
        assert!(status.degraded);
        assert_eq!(status.peers.len(), 1);
        assert_eq!(status.peers[0].health, Health::Unreachable);
    }

    /// Blocks every read until the gate's sender is dropped.
    struct HungStore {
        reads: AtomicUsize,
        gate: Mutex<mpsc::Receiver<()>>,
    }

    impl StatusStore for HungStore {
        fn put(&self, _record: &InstanceRecord) -> Result<()> {
            Ok(())
        }

        fn snapshot(&self) -> Result<Vec<InstanceRecord>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let _ = self.gate.lock().recv();
            Ok(Vec::new())
        }

        fn remove(&self, _instance_id: u32) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_hung_channel_keeps_one_reader() {
        let (release, gate) = mpsc::channel::<()>();
        let hung = Arc::new(HungStore {
            reads: AtomicUsize::new(0),
            gate: Mutex::new(gate),
        });
        let store: Arc<dyn StatusStore> = hung.clone();
        let mut cfg = config(0, 2);
        cfg.read_timeout_ms = 5;
        let coord = InstanceCoordinator::new(cfg, store, ShutdownSignal::new()).unwrap();

        for _ in 0..200 {
            assert!(coord.cluster_status().degraded);
        }
        assert_eq!(hung.reads.load(Ordering::SeqCst), 1);
        assert!(matches!(coord.snapshot_bounded(), Err(CoordError::ReadPending)));

        drop(release);
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut recovered = false;
        while Instant::now() < deadline {
            if coord.snapshot_bounded().is_ok() {
                recovered = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(recovered);
        assert!(hung.reads.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn test_heartbeat_thread_withdraws_worker_record() {
        let dir = tempfile::tempdir().unwrap();
        let files = FileStatusStore::new(dir.path()).unwrap();
        let store: Arc<dyn StatusStore> = Arc::new(files.clone());
        let worker = Arc::new(coordinator(1, 2, &store));

        let handle = worker.spawn_heartbeat().unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while !files.record_path(1).exists() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(files.record_path(1).exists());

        worker.shutdown_signal().trigger();
        handle.join();
        assert!(!files.record_path(1).exists());
    }

    #[test]
    fn test_master_leaves_shutdown_marker() {
        let store: Arc<dyn StatusStore> = Arc::new(MemoryStatusStore::new());
        let master = Arc::new(coordinator(0, 1, &store));
        let handle = master.spawn_heartbeat().unwrap();
        master.shutdown_signal().trigger();
        handle.join();
        let records = store.snapshot().unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].shutdown_requested);
    }
}
