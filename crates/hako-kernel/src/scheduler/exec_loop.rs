//! The background execution loop.
//!
//! A single long-lived worker that invokes a caller-supplied action each
//! iteration and then reclaims exited processes from the table. A faulty
//! iteration is reported to the diagnostic sink and never terminates the
//! loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::host::DiagnosticSink;
use crate::sandbox::SandboxError;
use crate::scheduler::ProcessTable;

/// Host-side per-iteration work (e.g. REPL input processing).
pub type LoopAction = Box<dyn FnMut() -> anyhow::Result<()> + Send>;

/// Delay between iterations; keeps reclamation prompt without spinning.
const TICK: Duration = Duration::from_millis(10);

struct LoopHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Drives the loop action and the reclamation pass until stopped.
pub struct ExecutionLoop {
    running: AtomicBool,
    handle: Mutex<Option<LoopHandle>>,
}

impl ExecutionLoop {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            handle: Mutex::new(None),
        }
    }

    /// True between a successful `run` and the matching `stop`.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the loop worker. Errors if the loop is already running.
    pub async fn run(
        &self,
        mut action: LoopAction,
        table: Arc<ProcessTable>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Result<(), SandboxError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SandboxError::AlreadyRunning);
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                while !cancel.is_cancelled() {
                    let outcome =
                        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| action()));
                    match outcome {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            tracing::warn!("loop action failed: {:#}", e);
                            sink.write_line(&format!("sandbox loop error: {:#}", e));
                        }
                        Err(_) => {
                            tracing::warn!("loop action panicked");
                            sink.write_line("sandbox loop error: action panicked");
                        }
                    }

                    table.reap().await;

                    tokio::select! {
                        _ = tokio::time::sleep(TICK) => {}
                        _ = cancel.cancelled() => break,
                    }
                }
            }
        });

        *self.handle.lock().await = Some(LoopHandle { cancel, task });
        Ok(())
    }

    /// Signal the loop worker to stop after its current iteration.
    pub async fn stop(&self) {
        if let Some(handle) = self.handle.lock().await.as_ref() {
            handle.cancel.cancel();
        }
        self.running.store(false, Ordering::SeqCst);
    }

    /// Block until the loop worker has fully terminated after a `stop`.
    pub async fn wait_for_stop(&self) {
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            if handle.task.await.is_err() {
                tracing::warn!("execution loop task panicked");
            }
        }
    }
}

impl Default for ExecutionLoop {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecContext;
    use crate::host::BufferSink;
    use crate::scheduler::Process;
    use hako_types::ExecResult;
    use std::sync::atomic::AtomicUsize;

    fn counter_action(count: Arc<AtomicUsize>) -> LoopAction {
        Box::new(move || {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[tokio::test]
    async fn loop_invokes_action_until_stopped() {
        let exec_loop = ExecutionLoop::new();
        let table = Arc::new(ProcessTable::new());
        let sink = Arc::new(BufferSink::new());
        let count = Arc::new(AtomicUsize::new(0));

        exec_loop
            .run(counter_action(count.clone()), table, sink)
            .await
            .unwrap();
        assert!(exec_loop.is_running());

        tokio::time::sleep(Duration::from_millis(50)).await;
        exec_loop.stop().await;
        exec_loop.wait_for_stop().await;

        assert!(!exec_loop.is_running());
        assert!(count.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn run_while_running_is_an_error() {
        let exec_loop = ExecutionLoop::new();
        let table = Arc::new(ProcessTable::new());
        let sink = Arc::new(BufferSink::new());

        exec_loop
            .run(Box::new(|| Ok(())), table.clone(), sink.clone())
            .await
            .unwrap();
        let err = exec_loop.run(Box::new(|| Ok(())), table, sink).await;
        assert!(matches!(err, Err(SandboxError::AlreadyRunning)));

        exec_loop.stop().await;
        exec_loop.wait_for_stop().await;
    }

    #[tokio::test]
    async fn faulty_iteration_does_not_kill_the_loop() {
        let exec_loop = ExecutionLoop::new();
        let table = Arc::new(ProcessTable::new());
        let sink = Arc::new(BufferSink::new());
        let count = Arc::new(AtomicUsize::new(0));

        let action: LoopAction = Box::new({
            let count = count.clone();
            move || {
                let n = count.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    anyhow::bail!("transient failure");
                }
                Ok(())
            }
        });

        exec_loop.run(action, table, sink.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        exec_loop.stop().await;
        exec_loop.wait_for_stop().await;

        assert!(count.load(Ordering::SeqCst) >= 2);
        assert!(sink
            .lines()
            .iter()
            .any(|l| l.contains("transient failure")));
    }

    #[tokio::test]
    async fn exited_processes_are_reclaimed() {
        let exec_loop = ExecutionLoop::new();
        let table = Arc::new(ProcessTable::new());
        let sink = Arc::new(BufferSink::new());

        let process = Process::new(table.alloc_pid());
        process.finish(Arc::new(ExecContext::empty()), ExecResult::unit());
        table.insert(process).await;

        exec_loop
            .run(Box::new(|| Ok(())), table.clone(), sink)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        exec_loop.stop().await;
        exec_loop.wait_for_stop().await;

        assert!(table.pids().await.is_empty());
    }
}
