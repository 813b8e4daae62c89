//! Spawned process units and the concurrent process table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use hako_types::{ExecError, ExecResult, Pid, ProcessState, ProcessStatus};

use crate::context::ExecContext;

struct Record {
    state: ProcessState,
    /// The process's isolated continuation, set when the worker finishes.
    /// Never the sandbox's shared context.
    context: Option<Arc<ExecContext>>,
    result: Option<ExecResult>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

/// One spawned background execution unit.
///
/// Mutated only by its own worker (`mark_running`, `finish`) and by the
/// sandbox's kill path (`signal_cancel`). Waiters hold their own `Arc`, so a
/// process removed from the table still resolves pending waits.
pub struct Process {
    pid: Pid,
    cancel: CancellationToken,
    record: StdMutex<Record>,
    done: watch::Sender<bool>,
}

impl Process {
    /// Create a process in the Starting state, stamped with the submission time.
    pub fn new(pid: Pid) -> Arc<Self> {
        let (done, _) = watch::channel(false);
        Arc::new(Self {
            pid,
            cancel: CancellationToken::new(),
            record: StdMutex::new(Record {
                state: ProcessState::Starting,
                context: None,
                result: None,
                started_at: Utc::now(),
                finished_at: None,
            }),
            done,
        })
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// The token the worker selects on for cooperative termination.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request cooperative termination. The worker is responsible for
    /// observing the signal and reaching the Exited state.
    pub fn signal_cancel(&self) {
        self.cancel.cancel();
    }

    /// Worker transition: Starting → Running.
    pub fn mark_running(&self) {
        let mut record = self.record.lock().unwrap();
        if record.state == ProcessState::Starting {
            record.state = ProcessState::Running;
        }
    }

    /// Worker transition to Exited: stores the isolated context and the
    /// result, stamps the end time, and wakes waiters. The result is set
    /// exactly once; a second call is ignored.
    pub fn finish(&self, context: Arc<ExecContext>, result: ExecResult) {
        {
            let mut record = self.record.lock().unwrap();
            if record.result.is_some() {
                tracing::debug!(pid = %self.pid, "duplicate finish ignored");
                return;
            }
            record.context = Some(context);
            record.result = Some(result);
            record.finished_at = Some(Utc::now());
            record.state = ProcessState::Exited;
        }
        let _ = self.done.send(true);
    }

    /// Point-in-time snapshot of this process.
    pub fn status(&self) -> ProcessStatus {
        let record = self.record.lock().unwrap();
        ProcessStatus {
            pid: self.pid,
            state: record.state,
            result: record.result.clone(),
            started_at: record.started_at,
            finished_at: record.finished_at,
        }
    }

    /// The isolated continuation produced by the worker, once exited.
    pub fn context(&self) -> Option<Arc<ExecContext>> {
        self.record.lock().unwrap().context.clone()
    }

    pub fn is_exited(&self) -> bool {
        self.record.lock().unwrap().state == ProcessState::Exited
    }

    /// Resolve to the eventual result. Returns immediately if the process
    /// has already exited.
    pub async fn wait(&self) -> ExecResult {
        let mut rx = self.done.subscribe();
        loop {
            if let Some(result) = self.record.lock().unwrap().result.clone() {
                return result;
            }
            if rx.changed().await.is_err() {
                return ExecResult::failure(ExecError::Runtime(
                    "process abandoned without a result".into(),
                ));
            }
        }
    }
}

/// Concurrent table of spawned processes.
///
/// Safe for simultaneous insert/remove/lookup from the execution loop's
/// reclamation pass, spawn, kill, status, and wait. The pid counter is
/// monotonic, never reset, never reused.
pub struct ProcessTable {
    next_pid: AtomicU64,
    procs: Mutex<HashMap<Pid, Arc<Process>>>,
}

impl ProcessTable {
    /// An empty table. Pid 0 is reserved for the sandbox; allocation starts at 1.
    pub fn new() -> Self {
        Self {
            next_pid: AtomicU64::new(1),
            procs: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate the next pid atomically.
    pub fn alloc_pid(&self) -> Pid {
        Pid(self.next_pid.fetch_add(1, Ordering::SeqCst))
    }

    /// Insert a process. Returns false if the pid is already present —
    /// cannot happen with atomic allocation, but checked defensively.
    pub async fn insert(&self, process: Arc<Process>) -> bool {
        let mut procs = self.procs.lock().await;
        match procs.entry(process.pid()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(process);
                true
            }
        }
    }

    /// Look up a process by pid.
    pub async fn get(&self, pid: Pid) -> Option<Arc<Process>> {
        self.procs.lock().await.get(&pid).cloned()
    }

    /// Remove a process by pid, returning it if present.
    pub async fn remove(&self, pid: Pid) -> Option<Arc<Process>> {
        self.procs.lock().await.remove(&pid)
    }

    /// All currently tracked pids, ascending.
    pub async fn pids(&self) -> Vec<Pid> {
        let mut pids: Vec<Pid> = self.procs.lock().await.keys().copied().collect();
        pids.sort();
        pids
    }

    /// Reclamation pass: drop every entry whose worker has exited.
    pub async fn reap(&self) {
        self.procs.lock().await.retain(|_, p| !p.is_exited());
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}
