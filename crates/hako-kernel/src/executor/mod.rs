//! CodeExecutor — the seam between the engine and an evaluation backend.
//!
//! The engine does not interpret code itself. Any evaluation engine that can
//! compile-and-run a text fragment against a prior continuation and return a
//! new continuation plus a result satisfies this trait and is substitutable
//! without changing the engine above it.
//!
//! # Contract
//!
//! - On failure the returned context must be the prior one unchanged (or the
//!   empty context if there was no prior).
//! - Cancellation surfaces as `ExecError::Cancelled`, never as a panic.
//! - Compile diagnostics are joined into a single message.

mod calc;

pub use calc::CalcExecutor;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use hako_types::ExecResult;

use crate::context::ExecContext;
use crate::manifest::CapabilityManifest;

/// What one executor invocation produces: the continuation to carry forward
/// plus the fragment's outcome.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// The continuation state after this fragment.
    pub context: Arc<ExecContext>,
    /// The fragment's outcome.
    pub result: ExecResult,
}

impl Evaluation {
    /// An evaluation that failed, carrying the prior context forward.
    pub fn failed(prior: Option<Arc<ExecContext>>, result: ExecResult) -> Self {
        Self {
            context: prior.unwrap_or_else(|| Arc::new(ExecContext::empty())),
            result,
        }
    }
}

/// Compile-and-run a fragment against a prior continuation.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    /// Evaluate `fragment` starting from `prior` (None means a fresh state),
    /// restricted to the modules in `manifest`, aborting when `cancel` fires.
    async fn execute(
        &self,
        fragment: &str,
        prior: Option<Arc<ExecContext>>,
        manifest: &CapabilityManifest,
        cancel: CancellationToken,
    ) -> Evaluation;
}
