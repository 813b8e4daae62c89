//! The Sandbox — the top-level engine.
//!
//! Owns the single shared continuation used by sequential top-level
//! submissions, the process table for spawned units, and the background
//! execution loop. An explicit instance, not process-wide state: multiple
//! independent sandboxes can coexist.
//!
//! # Shared-context commit
//!
//! `execute` snapshots the current context handle under a read lock, runs the
//! executor with no lock held, and commits under a write lock only if the
//! slot still holds the handle observed on entry (pointer identity). If a
//! nested top-level submission replaced the context while the outer call was
//! in flight, the outer call keeps the newer context and discards its own —
//! its value or error is still returned to the caller.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use hako_types::{Binding, ExecError, ExecResult, Pid, ProcessStatus};

use crate::context::{same_context, ExecContext};
use crate::executor::CodeExecutor;
use crate::host::{DiagnosticSink, FileStore, LocalFiles, StderrSink};
use crate::manifest::{
    Capability, CapabilityManifest, ManifestBuilder, ModuleEnumerator, StaticModules,
};
use crate::scheduler::{ExecutionLoop, LoopAction, Process, ProcessTable};

/// Engine-level usage errors. Evaluation failures are never errors — they are
/// `ExecResult` data.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// `run` was called while the execution loop was already active.
    #[error("sandbox loop is already running")]
    AlreadyRunning,
}

/// Configuration for sandbox construction.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Name of this sandbox (for identification).
    pub name: String,
    /// Namespaces imported into every fragment by default.
    pub imports: Vec<String>,
    /// Capability markers denied in addition to the standard set.
    pub denied: Vec<Capability>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            name: "sandbox".to_string(),
            imports: vec![
                "core".to_string(),
                "collections".to_string(),
                "text".to_string(),
            ],
            denied: Vec::new(),
        }
    }
}

impl SandboxConfig {
    /// Create a config with the given name.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Replace the default import list.
    pub fn with_imports(mut self, imports: impl IntoIterator<Item = String>) -> Self {
        self.imports = imports.into_iter().collect();
        self
    }

    /// Deny an additional capability marker.
    pub fn deny(mut self, cap: Capability) -> Self {
        self.denied.push(cap);
        self
    }
}

/// The sandbox engine.
pub struct Sandbox {
    /// Sandbox name.
    name: String,
    /// The injected evaluation backend.
    executor: Arc<dyn CodeExecutor>,
    /// Built once at construction, shared read-only by every execution.
    manifest: Arc<CapabilityManifest>,
    /// The shared top-level continuation. None until the first submission.
    context: RwLock<Option<Arc<ExecContext>>>,
    /// File access for file-backed submissions.
    files: Arc<dyn FileStore>,
    /// Diagnostic text sink.
    sink: Arc<dyn DiagnosticSink>,
    /// Spawned background units.
    table: Arc<ProcessTable>,
    /// The background loop worker.
    exec_loop: ExecutionLoop,
}

impl Sandbox {
    /// Create a sandbox with the default collaborators: the host's built-in
    /// module catalog, the local filesystem, and stderr diagnostics.
    pub fn new(executor: Arc<dyn CodeExecutor>, config: SandboxConfig) -> Self {
        Self::with_collaborators(
            executor,
            config,
            &StaticModules::host_defaults(),
            Arc::new(LocalFiles),
            Arc::new(StderrSink),
        )
    }

    /// Create a sandbox with explicit collaborators.
    pub fn with_collaborators(
        executor: Arc<dyn CodeExecutor>,
        config: SandboxConfig,
        modules: &dyn ModuleEnumerator,
        files: Arc<dyn FileStore>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        let mut builder =
            ManifestBuilder::new().default_imports(config.imports.iter().cloned());
        for cap in &config.denied {
            builder = builder.deny(*cap);
        }
        let manifest = Arc::new(builder.build(modules));

        Self {
            name: config.name,
            executor,
            manifest,
            context: RwLock::new(None),
            files,
            sink,
            table: Arc::new(ProcessTable::new()),
            exec_loop: ExecutionLoop::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The capability manifest every execution runs under.
    pub fn manifest(&self) -> &CapabilityManifest {
        &self.manifest
    }

    // ===== top-level evaluation =====

    /// Evaluate a fragment against the shared continuation.
    pub async fn execute(&self, code: &str) -> ExecResult {
        self.execute_with_cancel(code, CancellationToken::new())
            .await
    }

    /// Evaluate a fragment against the shared continuation, aborting when
    /// `cancel` fires. On failure the shared context is left unchanged and
    /// the failure is returned as data.
    #[tracing::instrument(level = "debug", skip(self, code, cancel), fields(sandbox = %self.name, fragment_len = code.len()))]
    pub async fn execute_with_cancel(&self, code: &str, cancel: CancellationToken) -> ExecResult {
        let before = self.context.read().await.clone();

        let eval = self
            .executor
            .execute(code, before.clone(), &self.manifest, cancel)
            .await;

        if eval.result.ok() {
            let mut current = self.context.write().await;
            if same_context(&current, &before) {
                *current = Some(eval.context);
            } else {
                // A nested submission committed first; keep the newer context.
                tracing::debug!("stale context snapshot, outer result context discarded");
            }
        }

        eval.result
    }

    /// One-shot evaluation against a fresh context. The shared continuation
    /// is neither read nor updated; the fragment sees no prior bindings and
    /// leaves none behind.
    pub async fn evaluate(&self, code: &str) -> ExecResult {
        self.executor
            .execute(code, None, &self.manifest, CancellationToken::new())
            .await
            .result
    }

    /// A cancellation token that fires on its own after `timeout`. Pass it to
    /// `execute_with_cancel` to bound an evaluation.
    pub fn timeout_token(timeout: std::time::Duration) -> CancellationToken {
        let token = CancellationToken::new();
        let timer = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            timer.cancel();
        });
        token
    }

    /// Read a file through the file collaborator and evaluate its contents.
    pub async fn execute_file(&self, path: &Path) -> ExecResult {
        match self.files.read_to_string(path).await {
            Ok(code) => self.execute(&code).await,
            Err(e) => ExecResult::failure(ExecError::Runtime(format!(
                "cannot read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Discard the shared continuation. The next submission starts fresh.
    pub async fn reset(&self) {
        *self.context.write().await = None;
    }

    /// Snapshot of every binding in the shared continuation, in declaration
    /// order. Empty if nothing has been evaluated yet.
    pub async fn variables(&self) -> Vec<Binding> {
        self.context
            .read()
            .await
            .as_ref()
            .map(|ctx| ctx.bindings().to_vec())
            .unwrap_or_default()
    }

    // ===== process lifecycle =====

    /// Spawn a background unit evaluating `code` against a fresh, isolated
    /// continuation. Returns None if the table insert races (defensive; pids
    /// are allocated atomically).
    pub async fn spawn(&self, code: &str) -> Option<Pid> {
        let pid = self.table.alloc_pid();
        let process = Process::new(pid);

        if !self.table.insert(process.clone()).await {
            tracing::warn!(pid = %pid, "spawn failed: pid already present");
            return None;
        }

        let executor = self.executor.clone();
        let manifest = self.manifest.clone();
        let fragment = code.to_string();
        let worker = process.clone();
        tokio::spawn(async move {
            worker.mark_running();
            let cancel = worker.cancel_token();
            // Spawned units never see the shared top-level continuation. The
            // executor runs in its own task so that even a panic inside it
            // still drives this process to Exited.
            let eval = tokio::spawn(async move {
                executor.execute(&fragment, None, &manifest, cancel).await
            })
            .await;
            match eval {
                Ok(eval) => worker.finish(eval.context, eval.result),
                Err(e) => worker.finish(
                    Arc::new(ExecContext::empty()),
                    ExecResult::failure(ExecError::Runtime(format!("worker panicked: {}", e))),
                ),
            }
        });

        tracing::debug!(pid = %pid, "process spawned");
        Some(pid)
    }

    /// Read a file through the file collaborator and spawn its contents.
    pub async fn spawn_file(&self, path: &Path) -> Option<Pid> {
        match self.files.read_to_string(path).await {
            Ok(code) => self.spawn(&code).await,
            Err(e) => {
                tracing::debug!("spawn_file failed: cannot read {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Signal cancellation and remove the process from the table. Returns
    /// false if the pid is unknown.
    ///
    /// Removal is immediate: `status`/`wait` issued after a successful kill
    /// report "not found" even though the worker may still be unwinding. A
    /// wait obtained before the kill still resolves, to `Cancelled`, once
    /// the worker observes the signal.
    pub async fn kill(&self, pid: Pid) -> bool {
        match self.table.remove(pid).await {
            Some(process) => {
                process.signal_cancel();
                tracing::debug!(pid = %pid, "process killed");
                true
            }
            None => false,
        }
    }

    /// Snapshot of a process's state, result, and timestamps.
    pub async fn status(&self, pid: Pid) -> Option<ProcessStatus> {
        Some(self.table.get(pid).await?.status())
    }

    /// Resolve to a process's eventual result, immediately if it has already
    /// exited. None if the pid is unknown at call time.
    pub async fn wait(&self, pid: Pid) -> Option<ExecResult> {
        let process = self.table.get(pid).await?;
        Some(process.wait().await)
    }

    /// All currently tracked pids, ascending.
    pub async fn pids(&self) -> Vec<Pid> {
        self.table.pids().await
    }

    // ===== execution loop =====

    /// Start the background loop with a host-supplied per-iteration action.
    /// Errors if the loop is already running.
    pub async fn run(&self, action: LoopAction) -> Result<(), SandboxError> {
        self.exec_loop
            .run(action, self.table.clone(), self.sink.clone())
            .await
    }

    /// Start the background loop with an empty action.
    pub async fn run_idle(&self) -> Result<(), SandboxError> {
        self.run(Box::new(|| Ok(()))).await
    }

    /// Signal the loop to stop.
    pub async fn stop(&self) {
        self.exec_loop.stop().await;
    }

    /// Block until the loop worker has terminated.
    pub async fn wait_for_stop(&self) {
        self.exec_loop.wait_for_stop().await;
    }

    pub fn is_running(&self) -> bool {
        self.exec_loop.is_running()
    }
}
