//! Periodic process enumeration with lifecycle events.
//!
//! Each poll produces a complete pid set, diffs it against the previous
//! snapshot, publishes `Started`/`Stopped` events, then swaps the snapshot
//! atomically. Subscribers are bounded channels; a full subscriber is
//! skipped rather than stalling the poll loop.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use ahash::AHashMap;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{Notify, broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{debug, warn};
use warden_common::Signal;

use crate::{
    critical,
    error::InventoryError,
    platform::{self, RawProcess},
    record::{ProcessEvent, ProcessEventKind, ProcessRecord},
};

/// Bound on each subscriber's event channel.
const SUBSCRIBER_CAPACITY: usize = 100;

/// How long a graceful termination waits before forcing.
const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(5);

/// Inventory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryConfig {
    /// Seconds between enumeration polls.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

const fn default_poll_interval_secs() -> u64 {
    10
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

/// Snapshot-based view of the host's processes.
pub struct ProcessInventory {
    config: InventoryConfig,
    snapshot: Mutex<AHashMap<u32, ProcessRecord>>,
    subscribers: RwLock<Vec<mpsc::Sender<ProcessEvent>>>,
    running: AtomicBool,
    stop_signal: Notify,
}

impl ProcessInventory {
    #[must_use]
    pub fn new(config: InventoryConfig) -> Self {
        Self {
            config,
            snapshot: Mutex::new(AHashMap::new()),
            subscribers: RwLock::new(Vec::new()),
            running: AtomicBool::new(false),
            stop_signal: Notify::new(),
        }
    }

    /// Start the poll loop. A second call while running fails with
    /// [`InventoryError::AlreadyRunning`].
    pub fn start(
        self: &Arc<Self>,
        mut shutdown: broadcast::Receiver<Signal>,
    ) -> Result<JoinHandle<()>, InventoryError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(InventoryError::AlreadyRunning);
        }

        let inventory = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_secs(inventory.config.poll_interval_secs.max(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if !inventory.running.load(Ordering::SeqCst) {
                            break;
                        }
                        inventory.poll_now();
                    }
                    _ = inventory.stop_signal.notified() => break,
                    _ = shutdown.recv() => break,
                }
            }

            inventory.running.store(false, Ordering::SeqCst);
            debug!("process inventory stopped");
        }))
    }

    /// Stop the poll loop. Idempotent.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        // notify_one stores a permit, so a stop that lands mid-poll still
        // wakes the loop on its next await.
        self.stop_signal.notify_one();
    }

    /// Run one enumeration cycle immediately.
    ///
    /// An enumeration-root failure is logged and swallowed; the previous
    /// snapshot stays in place.
    pub fn poll_now(&self) {
        match platform::enumerate() {
            Ok(raw) => self.apply(raw),
            Err(err) => warn!(%err, "process enumeration failed"),
        }
    }

    /// Diff `raw` against the previous snapshot, publish lifecycle events,
    /// and swap the snapshot in.
    pub(crate) fn apply(&self, raw: Vec<RawProcess>) {
        let now = Utc::now();
        let mut events = Vec::new();

        {
            let mut snapshot = self.snapshot.lock();
            let mut next = AHashMap::with_capacity(raw.len());

            for process in raw {
                if let Some(existing) = snapshot.remove(&process.pid) {
                    // Known pid: keep the original record and its first_seen.
                    next.insert(process.pid, existing);
                } else {
                    let record = ProcessRecord {
                        pid: process.pid,
                        ppid: process.ppid,
                        name: process.name,
                        path: process.path,
                        cmdline: process.cmdline,
                        first_seen: now,
                    };
                    events.push(ProcessEvent::new(ProcessEventKind::Started, record.clone()));
                    next.insert(process.pid, record);
                }
            }

            // Everything left over vanished since the previous poll.
            for (_, record) in snapshot.drain() {
                events.push(ProcessEvent::new(ProcessEventKind::Stopped, record));
            }

            *snapshot = next;
        }

        if !events.is_empty() {
            self.publish(&events);
        }
    }

    fn publish(&self, events: &[ProcessEvent]) {
        let mut saw_closed = false;
        {
            let subscribers = self.subscribers.read();
            for subscriber in subscribers.iter() {
                for event in events {
                    match subscriber.try_send(event.clone()) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            // Slow consumer: the event is dropped, the
                            // snapshot remains the source of truth.
                            debug!("subscriber channel full, dropping event");
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            saw_closed = true;
                            break;
                        }
                    }
                }
            }
        }

        if saw_closed {
            self.subscribers
                .write()
                .retain(|subscriber| !subscriber.is_closed());
        }
    }

    /// Bounded stream of lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> mpsc::Receiver<ProcessEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        self.subscribers.write().push(tx);
        rx
    }

    /// Snapshot of every currently observed process.
    #[must_use]
    pub fn list(&self) -> Vec<ProcessRecord> {
        let mut records: Vec<_> = self.snapshot.lock().values().cloned().collect();
        records.sort_by_key(|record| record.pid);
        records
    }

    pub fn get(&self, pid: u32) -> Result<ProcessRecord, InventoryError> {
        self.snapshot
            .lock()
            .get(&pid)
            .cloned()
            .ok_or(InventoryError::NotFound(pid))
    }

    /// Cheap membership test against the current snapshot.
    #[must_use]
    pub fn is_running(&self, pid: u32) -> bool {
        self.snapshot.lock().contains_key(&pid)
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.snapshot.lock().len()
    }

    /// Terminate a process, refusing critical targets.
    ///
    /// Graceful termination sends SIGTERM and waits up to five seconds for
    /// the process to exit before escalating to SIGKILL; non-graceful kills
    /// outright.
    pub async fn terminate(&self, pid: u32, graceful: bool) -> Result<(), InventoryError> {
        let name = self
            .snapshot
            .lock()
            .get(&pid)
            .map(|record| record.name.clone())
            .or_else(|| platform::read_one(pid).map(|raw| raw.name))
            .unwrap_or_default();

        if critical::is_protected(pid, &name) {
            return Err(InventoryError::RefusedCritical { pid, name });
        }

        if !graceful {
            return platform::send_signal(pid, platform::SIGKILL);
        }

        platform::send_signal(pid, platform::SIGTERM)?;

        let deadline = tokio::time::Instant::now() + GRACEFUL_TIMEOUT;
        while tokio::time::Instant::now() < deadline {
            if !platform::alive(pid) {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        debug!(pid, "graceful shutdown timed out, forcing");
        match platform::send_signal(pid, platform::SIGKILL) {
            // Lost the race with the process exiting on its own.
            Err(InventoryError::NotFound(_)) | Ok(()) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pid: u32, name: &str) -> RawProcess {
        RawProcess {
            pid,
            ppid: 1,
            name: name.to_string(),
            path: format!("/usr/bin/{name}"),
            cmdline: name.to_string(),
        }
    }

    fn inventory() -> ProcessInventory {
        ProcessInventory::new(InventoryConfig::default())
    }

    #[test]
    fn apply_publishes_started_then_stopped() {
        let inv = inventory();
        let mut events = inv.subscribe();

        inv.apply(vec![raw(200, "alpha"), raw(201, "beta")]);
        assert_eq!(inv.count(), 2);

        let first = events.try_recv().unwrap();
        assert_eq!(first.kind, ProcessEventKind::Started);

        // `alpha` vanishes on the next poll.
        inv.apply(vec![raw(201, "beta")]);
        let mut kinds = Vec::new();
        while let Ok(event) = events.try_recv() {
            kinds.push((event.kind, event.record.pid));
        }
        assert!(kinds.contains(&(ProcessEventKind::Stopped, 200)));
        assert!(!inv.is_running(200));
        assert!(inv.is_running(201));
    }

    #[test]
    fn exactly_one_stopped_event_per_vanished_pid() {
        let inv = inventory();
        let mut events = inv.subscribe();

        inv.apply(vec![raw(300, "gamma")]);
        inv.apply(vec![]);
        inv.apply(vec![]);

        let mut stopped = 0;
        while let Ok(event) = events.try_recv() {
            if event.kind == ProcessEventKind::Stopped && event.record.pid == 300 {
                stopped += 1;
            }
        }
        assert_eq!(stopped, 1);
    }

    #[test]
    fn first_seen_is_preserved_across_polls() {
        let inv = inventory();
        inv.apply(vec![raw(400, "delta")]);
        let before = inv.get(400).unwrap().first_seen;

        std::thread::sleep(Duration::from_millis(5));
        inv.apply(vec![raw(400, "delta")]);
        assert_eq!(inv.get(400).unwrap().first_seen, before);
    }

    #[test]
    fn full_subscriber_drops_events_without_stalling() {
        let inv = inventory();
        let mut events = inv.subscribe();

        let herd: Vec<_> = (1000..1000 + 150)
            .map(|pid| raw(pid, "herd"))
            .collect();
        inv.apply(herd);

        let mut received = 0;
        while events.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, SUBSCRIBER_CAPACITY);
        // The snapshot itself saw everything.
        assert_eq!(inv.count(), 150);
    }

    #[test]
    fn get_missing_pid_is_not_found() {
        let inv = inventory();
        assert!(matches!(inv.get(9999), Err(InventoryError::NotFound(9999))));
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let inv = Arc::new(inventory());
        let (tx, _) = broadcast::channel(1);

        let handle = inv.start(tx.subscribe()).unwrap();
        assert!(matches!(
            inv.start(tx.subscribe()),
            Err(InventoryError::AlreadyRunning)
        ));

        inv.stop();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("poll loop should stop promptly")
            .unwrap();
    }

    #[tokio::test]
    async fn terminate_refuses_critical_pids() {
        let inv = inventory();
        let err = inv.terminate(1, true).await.unwrap_err();
        assert!(matches!(err, InventoryError::RefusedCritical { pid: 1, .. }));
    }

    #[tokio::test]
    async fn terminate_refuses_critical_names_at_any_pid() {
        let inv = inventory();
        inv.apply(vec![raw(5000, "sshd")]);
        let err = inv.terminate(5000, false).await.unwrap_err();
        assert!(matches!(
            err,
            InventoryError::RefusedCritical { pid: 5000, .. }
        ));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn terminate_kills_a_spawned_child() {
        let mut child = std::process::Command::new("sleep")
            .arg("300")
            .spawn()
            .expect("spawn sleep");
        let pid = child.id();

        let inv = inventory();
        inv.poll_now();
        assert!(inv.is_running(pid));

        inv.terminate(pid, true).await.unwrap();

        // Reap and confirm it is gone.
        let status = child.wait().expect("wait on child");
        assert!(!status.success() || status.code().is_none());
        inv.poll_now();
        assert!(!inv.is_running(pid));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn poll_now_observes_the_test_process() {
        let inv = inventory();
        inv.poll_now();
        let own = inv.get(std::process::id()).unwrap();
        assert!(!own.name.is_empty());
        assert!(inv.count() > 1);
    }
}
