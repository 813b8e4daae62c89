//! hako-kernel (箱): the sandbox engine of hako.
//!
//! This crate provides:
//!
//! - **Context**: Immutable continuation snapshots carried between fragments
//! - **Manifest**: The capability-restricted set of modules fragments may use
//! - **Executor**: The `CodeExecutor` seam any evaluation engine can fill
//! - **Scheduler**: Process table and the background execution loop
//! - **Sandbox**: The top-level engine tying the pieces together
//! - **Host**: Collaborator traits for diagnostics and file access
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Sandbox                              │
//! │  ┌───────────────┐  ┌────────────────┐  ┌────────────────┐   │
//! │  │ ExecContext   │  │ Capability     │  │ CodeExecutor   │   │
//! │  │ (shared,      │  │ Manifest       │  │ (injected)     │   │
//! │  │  CAS commit)  │  │ (built once)   │  │                │   │
//! │  └───────────────┘  └────────────────┘  └────────────────┘   │
//! │  ┌──────────────────────────────┐  ┌────────────────────┐    │
//! │  │ ProcessTable (spawned units) │  │ ExecutionLoop      │    │
//! │  └──────────────────────────────┘  └────────────────────┘    │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod context;
pub mod executor;
pub mod host;
pub mod manifest;
pub mod sandbox;
pub mod scheduler;

pub use context::{same_context, ExecContext};
pub use executor::{CalcExecutor, CodeExecutor, Evaluation};
pub use host::{BufferSink, DiagnosticSink, FileStore, LocalFiles, MemoryFiles, StderrSink};
pub use manifest::{
    Capability, CapabilityManifest, IntrospectError, ManifestBuilder, ModuleEnumerator,
    ModuleSurface, StaticModules,
};
pub use sandbox::{Sandbox, SandboxConfig, SandboxError};
pub use scheduler::{ExecutionLoop, LoopAction, Process, ProcessTable};

// Re-export the data types so embedders need only one crate.
pub use hako_types::{Binding, ExecError, ExecResult, Pid, ProcessState, ProcessStatus, Value};
